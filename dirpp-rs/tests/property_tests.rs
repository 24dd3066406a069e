use std::rc::Rc;

use proptest::prelude::*;
use dirpp::context::VariableContext;
use dirpp::expr::{eval_str, Lookup};
use dirpp::pattern::PathPattern;
use dirpp::{Config, ErrorKind, MemoryFs, Preprocessor, Value};

fn pp() -> Preprocessor {
    Preprocessor::with_fs(Config::default(), Rc::new(MemoryFs::new()))
}

#[derive(Debug, Clone)]
enum Block {
    Marker,
    If(bool, Vec<Block>, Option<Vec<Block>>),
}

fn blocks() -> impl Strategy<Value = Vec<Block>> {
    let block = Just(Block::Marker).prop_recursive(4, 32, 4, |inner| {
        (
            any::<bool>(),
            prop::collection::vec(inner.clone(), 0..4),
            prop::option::of(prop::collection::vec(inner, 0..4)),
        )
            .prop_map(|(cond, then, otherwise)| Block::If(cond, then, otherwise))
    });
    prop::collection::vec(block, 0..6)
}

/// Append the lines for `blocks`, recording the markers that sit in taken
/// branches only.
fn render(blocks: &[Block], taken: bool, lines: &mut Vec<String>, shown: &mut Vec<String>) {
    for block in blocks {
        match block {
            Block::Marker => {
                let marker = format!("m{}", lines.len());
                if taken {
                    shown.push(marker.clone());
                }
                lines.push(marker);
            }
            Block::If(cond, then, otherwise) => {
                lines.push(format!("//#if {cond}"));
                render(then, taken && *cond, lines, shown);
                if let Some(otherwise) = otherwise {
                    lines.push("//#else".to_owned());
                    render(otherwise, taken && !*cond, lines, shown);
                }
                lines.push("//#endif".to_owned());
            }
        }
    }
}

fn text_of(lines: &[String]) -> String {
    lines.iter().map(|l| format!("{l}\n")).collect()
}

proptest! {
    /// The expression parser and evaluator return Ok or Err on any input;
    /// they never panic.
    #[test]
    fn evaluator_does_not_panic(s in "\\PC*") {
        let mut ctx = VariableContext::new();
        let _ = eval_str(&s, &mut ctx, Lookup::Lenient);
    }

    /// Multiplication binds tighter than addition.
    #[test]
    fn arithmetic_precedence(a in 0i64..1000, b in 0i64..1000, c in 0i64..1000) {
        let mut ctx = VariableContext::new();
        let v = eval_str(&format!("{a} + {b} * {c}"), &mut ctx, Lookup::Enforced).unwrap();
        prop_assert_eq!(v, Value::Int(a + b * c));
        let v = eval_str(&format!("({a} + {b}) * {c}"), &mut ctx, Lookup::Enforced).unwrap();
        prop_assert_eq!(v, Value::Int((a + b) * c));
    }

    #[test]
    fn integer_comparison(a in -1000i64..1000, b in -1000i64..1000) {
        let mut ctx = VariableContext::new();
        ctx.set_global("a", Value::Int(a)).unwrap();
        ctx.set_global("b", Value::Int(b)).unwrap();
        let v = eval_str("a < b", &mut ctx, Lookup::Enforced).unwrap();
        prop_assert_eq!(v, Value::Bool(a < b));
    }

    /// Plain text without comment markers passes through line for line.
    #[test]
    fn plain_text_is_unchanged(lines in prop::collection::vec("[a-zA-Z0-9 ,.;=]{0,40}", 0..20)) {
        let text: String = lines.iter().map(|l| format!("{l}\n")).collect();
        let out = pp().process_str("p.txt", &text).unwrap();
        prop_assert_eq!(out, text);
    }

    /// A marker is emitted exactly when every enclosing branch is taken.
    #[test]
    fn markers_follow_taken_branches(tree in blocks()) {
        let (mut lines, mut shown) = (Vec::new(), Vec::new());
        render(&tree, true, &mut lines, &mut shown);
        let out = pp().process_str("p.txt", &text_of(&lines)).unwrap();
        prop_assert_eq!(out, text_of(&shown));
    }

    /// Dropping one `endif` leaves a single conditional open, and the error
    /// cites the line that opened it.
    #[test]
    fn missing_endif_cites_unclosed_if(
        cond in any::<bool>(),
        tree in blocks(),
        pick in any::<prop::sample::Index>(),
    ) {
        let (mut lines, mut shown) = (Vec::new(), Vec::new());
        render(&[Block::If(cond, tree, None)], true, &mut lines, &mut shown);
        let endifs: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, l)| *l == "//#endif")
            .map(|(i, _)| i)
            .collect();
        lines.remove(endifs[pick.index(endifs.len())]);

        let mut open = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            if line.starts_with("//#if ") {
                open.push(i + 1);
            } else if line == "//#endif" {
                open.pop();
            }
        }
        prop_assert_eq!(open.len(), 1);

        let err = pp().process_str("p.txt", &text_of(&lines)).unwrap_err();
        prop_assert_eq!(err.kind, ErrorKind::Structural);
        prop_assert_eq!(err.position().map(|p| p.line), Some(open[0]));
    }

    /// A while loop counting to `n` emits exactly `n` lines.
    #[test]
    fn loop_iterates_exactly(n in 0i64..20) {
        let text = format!("//#define i 0\n//#while i < {n}\n/*$i$*/\n//#define i i + 1\n//#end\n");
        let out = pp().process_str("p.txt", &text).unwrap();
        let expected: String = (0..n).map(|i| format!("{i}\n")).collect();
        prop_assert_eq!(out, expected);
    }

    /// A glob without wildcards matches exactly its own text.
    #[test]
    fn literal_glob_matches_itself(path in "[a-z]{1,8}(/[a-z]{1,8}){0,3}") {
        let p = PathPattern::new(&path).unwrap();
        prop_assert!(p.matches(&path));
        let longer = format!("{path}x");
        prop_assert!(!p.matches(&longer));
    }

    /// `*` stays inside one path segment; `**` crosses them.
    #[test]
    fn star_does_not_cross_separator(a in "[a-z]{1,8}", b in "[a-z]{1,8}", c in "[a-z]{1,8}") {
        let path = format!("{a}/{b}/{c}");
        let star = format!("{a}/*");
        let deep = format!("{a}/**");
        prop_assert!(!PathPattern::new(&star).unwrap().matches(&path));
        prop_assert!(PathPattern::new(&deep).unwrap().matches(&path));
    }
}
