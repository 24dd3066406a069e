//! Expression tokenizer.
//!
//! Produces one [`ExpressionItem`] per call.  Numbers are decimal or `0x`
//! hex integers (`Int`), or floats when a `.` appears (`Float`, 32-bit).
//! Identifiers may contain letters, digits, `_`, `$` and `.`; a leading `$`
//! names a user function.  An identifier directly followed by `(` names a
//! built-in function.

use crate::error::ExprError;

use super::builtins;
use super::item::{Delimiter, ExpressionItem, Function, Operator};
use super::value::Value;

pub struct Lexer {
    src: Vec<char>,
    pos: usize,
}

impl Lexer {
    pub fn new(src: &str) -> Self {
        Lexer {
            src: src.chars().collect(),
            pos: 0,
        }
    }

    /// Tokenize a whole expression.
    pub fn tokenize(src: &str) -> Result<Vec<ExpressionItem>, ExprError> {
        let mut lexer = Lexer::new(src);
        let mut items = Vec::new();
        while let Some(item) = lexer.next_item()? {
            items.push(item);
        }
        Ok(items)
    }

    fn peek(&self) -> Option<char> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.src.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    /// Next non-whitespace character, without consuming anything.
    fn peek_past_ws(&self) -> Option<char> {
        self.src[self.pos..].iter().copied().find(|c| !c.is_whitespace())
    }

    /// Read the next item, or `None` at end of input.
    pub fn next_item(&mut self) -> Result<Option<ExpressionItem>, ExprError> {
        self.skip_ws();
        let Some(ch) = self.peek() else {
            return Ok(None);
        };
        let item = match ch {
            '0'..='9' => ExpressionItem::Value(self.read_number()?),
            '"' => {
                self.pos += 1;
                ExpressionItem::Value(Value::Str(self.read_string()?))
            }
            ',' => {
                self.pos += 1;
                ExpressionItem::Delimiter(Delimiter::Comma)
            }
            '(' => {
                self.pos += 1;
                ExpressionItem::Delimiter(Delimiter::Open)
            }
            ')' => {
                self.pos += 1;
                ExpressionItem::Delimiter(Delimiter::Close)
            }
            c if is_ident_start(c) => self.read_identifier()?,
            c if is_operator_char(c) => ExpressionItem::Operator(self.read_operator()?),
            c => return Err(ExprError::UnexpectedChar(c)),
        };
        Ok(Some(item))
    }

    fn read_number(&mut self) -> Result<Value, ExprError> {
        let start = self.pos;
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X')) {
            self.pos += 2;
            let digits_start = self.pos;
            while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            let text: String = self.src[start..self.pos].iter().collect();
            let digits: String = self.src[digits_start..self.pos].iter().collect();
            self.reject_trailing_ident(&text)?;
            return i64::from_str_radix(&digits, 16)
                .map(Value::Int)
                .map_err(|_| ExprError::BadNumber(text));
        }

        while matches!(self.peek(), Some('0'..='9')) {
            self.pos += 1;
        }
        let is_float = self.peek() == Some('.');
        if is_float {
            self.pos += 1;
            while matches!(self.peek(), Some('0'..='9')) {
                self.pos += 1;
            }
        }
        let text: String = self.src[start..self.pos].iter().collect();
        self.reject_trailing_ident(&text)?;
        if is_float {
            text.parse::<f32>()
                .map(Value::Float)
                .map_err(|_| ExprError::BadNumber(text))
        } else {
            text.parse::<i64>()
                .map(Value::Int)
                .map_err(|_| ExprError::BadNumber(text))
        }
    }

    /// `12abc` is one malformed number, not a number and a variable.
    fn reject_trailing_ident(&mut self, text: &str) -> Result<(), ExprError> {
        match self.peek() {
            Some(c) if is_ident_char(c) => {
                let mut bad = text.to_owned();
                while let Some(c) = self.peek().filter(|c| is_ident_char(*c)) {
                    bad.push(c);
                    self.pos += 1;
                }
                Err(ExprError::BadNumber(bad))
            }
            _ => Ok(()),
        }
    }

    fn read_string(&mut self) -> Result<String, ExprError> {
        let mut s = String::new();
        loop {
            match self.advance() {
                None => return Err(ExprError::UnterminatedString),
                Some('"') => return Ok(s),
                Some('\\') => s.push(self.read_escape()?),
                Some(c) => s.push(c),
            }
        }
    }

    fn read_escape(&mut self) -> Result<char, ExprError> {
        let Some(c) = self.advance() else {
            return Err(ExprError::UnterminatedString);
        };
        Ok(match c {
            'n' => '\n',
            't' => '\t',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'r' => '\r',
            '\\' => '\\',
            '"' => '"',
            '\'' => '\'',
            'u' => {
                let mut hex = String::new();
                for _ in 0..4 {
                    match self.advance() {
                        Some(h) if h.is_ascii_hexdigit() => hex.push(h),
                        _ => return Err(ExprError::BadEscape(format!("u{hex}"))),
                    }
                }
                u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| ExprError::BadEscape(format!("u{hex}")))?
            }
            other => return Err(ExprError::BadEscape(other.to_string())),
        })
    }

    fn read_identifier(&mut self) -> Result<ExpressionItem, ExprError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if is_ident_char(c)) {
            self.pos += 1;
        }
        let name: String = self.src[start..self.pos].iter().collect();

        if let Some(user) = name.strip_prefix('$') {
            if user.is_empty() {
                return Err(ExprError::UnexpectedChar('$'));
            }
            return Ok(ExpressionItem::Function(Function::User(user.to_owned())));
        }
        match name.as_str() {
            "true" => return Ok(ExpressionItem::Value(Value::Bool(true))),
            "false" => return Ok(ExpressionItem::Value(Value::Bool(false))),
            _ => {}
        }
        if self.peek_past_ws() == Some('(') {
            return builtins::find(&name)
                .map(|f| ExpressionItem::Function(Function::Builtin(f)))
                .ok_or(ExprError::UnknownFunction(name));
        }
        Ok(ExpressionItem::Variable(name))
    }

    /// Maximal munch over the operator keywords.
    fn read_operator(&mut self) -> Result<Operator, ExprError> {
        let two: String = self.src[self.pos..].iter().take(2).collect();
        if two.chars().count() == 2 {
            if let Some(op) = Operator::from_keyword(&two) {
                self.pos += 2;
                return Ok(op);
            }
        }
        let one = self.src[self.pos].to_string();
        self.pos += 1;
        Operator::from_keyword(&one).ok_or(ExprError::UnknownOperator(one))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '$' | '.')
}

fn is_operator_char(c: char) -> bool {
    matches!(c, '+' | '-' | '*' | '/' | '%' | '=' | '!' | '<' | '>' | '&' | '|' | '^')
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<String> {
        Lexer::tokenize(src)
            .unwrap()
            .iter()
            .map(|i| i.to_string())
            .collect()
    }

    #[test]
    fn numbers() {
        let items = Lexer::tokenize("42 0x1f 2.5").unwrap();
        assert!(matches!(items[0], ExpressionItem::Value(Value::Int(42))));
        assert!(matches!(items[1], ExpressionItem::Value(Value::Int(31))));
        assert!(matches!(items[2], ExpressionItem::Value(Value::Float(x)) if x == 2.5));
    }

    #[test]
    fn bad_numbers() {
        assert_eq!(
            Lexer::tokenize("12abc").unwrap_err(),
            ExprError::BadNumber("12abc".into())
        );
        assert_eq!(
            Lexer::tokenize("0x").unwrap_err(),
            ExprError::BadNumber("0x".into())
        );
        assert!(matches!(
            Lexer::tokenize("99999999999999999999").unwrap_err(),
            ExprError::BadNumber(_)
        ));
    }

    #[test]
    fn strings_and_escapes() {
        let items = Lexer::tokenize(r#""a\tb\"c\u0041""#).unwrap();
        match &items[0] {
            ExpressionItem::Value(Value::Str(s)) => assert_eq!(s, "a\tb\"cA"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn string_errors() {
        assert_eq!(
            Lexer::tokenize("\"open").unwrap_err(),
            ExprError::UnterminatedString
        );
        assert_eq!(
            Lexer::tokenize(r#""\u12""#).unwrap_err(),
            ExprError::BadEscape("u12".into())
        );
        assert_eq!(
            Lexer::tokenize(r#""\q""#).unwrap_err(),
            ExprError::BadEscape("q".into())
        );
    }

    #[test]
    fn identifiers_and_booleans() {
        let items = Lexer::tokenize("true env.HOME false __line__").unwrap();
        assert!(matches!(items[0], ExpressionItem::Value(Value::Bool(true))));
        assert!(matches!(&items[1], ExpressionItem::Variable(n) if n == "env.HOME"));
        assert!(matches!(items[2], ExpressionItem::Value(Value::Bool(false))));
        assert!(matches!(&items[3], ExpressionItem::Variable(n) if n == "__line__"));
    }

    #[test]
    fn functions() {
        let items = Lexer::tokenize("strlen (x) $hook(1)").unwrap();
        assert!(matches!(&items[0], ExpressionItem::Function(Function::Builtin(f)) if f.name == "strlen"));
        assert!(matches!(&items[4], ExpressionItem::Function(Function::User(n)) if n == "hook"));
        assert_eq!(
            Lexer::tokenize("nosuch(1)").unwrap_err(),
            ExprError::UnknownFunction("nosuch".into())
        );
    }

    #[test]
    fn operators_maximal_munch() {
        assert_eq!(kinds("a<=b"), vec!["a", "<=", "b"]);
        assert_eq!(kinds("a!=-1"), vec!["a", "!=", "-", "1"]);
        assert_eq!(kinds("!!x"), vec!["!", "!", "x"]);
        assert_eq!(kinds("(a,b)"), vec!["(", "a", ",", "b", ")"]);
    }

    #[test]
    fn operator_errors() {
        assert_eq!(
            Lexer::tokenize("a = b").unwrap_err(),
            ExprError::UnknownOperator("=".into())
        );
        assert_eq!(
            Lexer::tokenize("a & b").unwrap_err(),
            ExprError::UnknownOperator("&".into())
        );
        assert_eq!(Lexer::tokenize("a # b").unwrap_err(), ExprError::UnexpectedChar('#'));
    }

    #[test]
    fn incremental() {
        let mut lexer = Lexer::new("1 + 2");
        assert!(lexer.next_item().unwrap().is_some());
        assert!(matches!(
            lexer.next_item().unwrap(),
            Some(ExpressionItem::Operator(Operator::Add))
        ));
        assert!(lexer.next_item().unwrap().is_some());
        assert!(lexer.next_item().unwrap().is_none());
        assert!(Lexer::tokenize("   ").unwrap().is_empty());
    }
}
