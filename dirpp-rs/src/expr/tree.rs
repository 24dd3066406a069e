//! Priority-climbing expression tree builder.
//!
//! Nodes live in an arena addressed by [`NodeId`]; parent and child links
//! are indices.  Items are inserted one at a time against the most recently
//! inserted node (the tail):
//!
//! - a lower-priority node climbs towards the root and becomes an ancestor;
//! - an equal-priority node takes the tail's place and adopts it (left
//!   associativity), or fills the tail's free slot when the tail is a
//!   prefix operator still waiting for its operand;
//! - a higher-priority node fills the tail's free slot, or displaces the
//!   tail's last child when that child binds tighter still.
//!
//! Bracketed sub-expressions are built as independent sub-trees and then
//! inserted as a single node at [`Priority::Bracket`].

use crate::error::ExprError;

use super::item::{Delimiter, ExpressionItem, Function, Operator, Priority, MAX_ARGS, MAX_DEPTH};
use super::lexer::Lexer;
use super::value::Value;
use super::EvalContext;

pub type NodeId = usize;

#[derive(Debug, Clone)]
pub struct Node {
    pub item: ExpressionItem,
    pub priority: Priority,
    /// Number of child slots.
    pub arity: usize,
    /// Filled slots, left to right.  Never longer than `arity`.
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
}

impl Node {
    fn new(item: ExpressionItem, arity: usize) -> Self {
        Node {
            priority: item.priority(),
            item,
            arity,
            children: Vec::with_capacity(arity),
            parent: None,
        }
    }

    pub fn is_full(&self) -> bool {
        self.children.len() >= self.arity
    }
}

/// Where a sub-sequence of items ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    TopLevel,
    Bracket,
    Argument,
}

/// A built expression.  An empty tree is distinct from a one-node tree.
#[derive(Debug, Clone, Default)]
pub struct ExpressionTree {
    nodes: Vec<Node>,
    root: Option<NodeId>,
}

struct Builder<'c> {
    items: std::iter::Peekable<std::vec::IntoIter<ExpressionItem>>,
    nodes: Vec<Node>,
    ctx: &'c dyn EvalContext,
}

impl ExpressionTree {
    /// Tokenize, build and constant-fold `src`.
    ///
    /// `ctx` is consulted only for the arity of `$name` user functions.
    pub fn parse(src: &str, ctx: &dyn EvalContext) -> Result<Self, ExprError> {
        let items = Lexer::tokenize(src)?;
        let mut builder = Builder {
            items: items.into_iter().peekable(),
            nodes: Vec::new(),
            ctx,
        };
        let (root, _) = builder.sequence(Stop::TopLevel, 0)?;
        let mut tree = ExpressionTree {
            nodes: builder.nodes,
            root,
        };
        tree.check_height()?;
        tree.postprocess();
        Ok(tree)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Number of nodes reachable from the root.
    pub fn len(&self) -> usize {
        let mut count = 0;
        let mut stack: Vec<NodeId> = self.root.into_iter().collect();
        while let Some(id) = stack.pop() {
            count += 1;
            stack.extend(self.nodes[id].children.iter().copied());
        }
        count
    }

    /// Fully bracketed rendering, for diagnostics and tests.
    pub fn render(&self) -> String {
        match self.root {
            Some(root) => self.render_node(root),
            None => String::new(),
        }
    }

    fn render_node(&self, id: NodeId) -> String {
        let node = &self.nodes[id];
        let args: Vec<String> = node.children.iter().map(|c| self.render_node(*c)).collect();
        match &node.item {
            ExpressionItem::Operator(op) if args.len() == 2 => {
                format!("({} {} {})", args[0], op.keyword(), args[1])
            }
            ExpressionItem::Operator(op) => format!("({}{})", op.keyword(), args.join(" ")),
            ExpressionItem::Function(f) => format!("{}({})", f.name(), args.join(", ")),
            item => item.to_string(),
        }
    }

    /// Reject trees taller than [`MAX_DEPTH`] before anything walks them
    /// recursively.
    fn check_height(&self) -> Result<(), ExprError> {
        let mut stack: Vec<(NodeId, usize)> = self.root.map(|r| (r, 1)).into_iter().collect();
        while let Some((id, height)) = stack.pop() {
            let node = &self.nodes[id];
            if height > MAX_DEPTH {
                return Err(ExprError::Unexpected(node.item.to_string()));
            }
            stack.extend(node.children.iter().map(|&c| (c, height + 1)));
        }
        Ok(())
    }

    // ── Constant folding ──────────────────────────────────────────────────────

    fn postprocess(&mut self) {
        if let Some(root) = self.root {
            self.fold(root);
        }
    }

    /// Fold unary minus over a numeric literal, bottom-up.  The operator
    /// node becomes the negated literal; its old child is left unreachable.
    fn fold(&mut self, id: NodeId) {
        let children = self.nodes[id].children.clone();
        for child in children {
            self.fold(child);
        }
        let node = &self.nodes[id];
        if !matches!(node.item, ExpressionItem::Operator(Operator::Neg)) || node.children.len() != 1
        {
            return;
        }
        let negated = match &self.nodes[node.children[0]].item {
            ExpressionItem::Value(Value::Int(n)) => Value::Int(n.wrapping_neg()),
            ExpressionItem::Value(Value::Float(x)) => Value::Float(-x),
            _ => return,
        };
        let child = node.children[0];
        self.nodes[child].parent = None;
        let node = &mut self.nodes[id];
        node.item = ExpressionItem::Value(negated);
        node.children.clear();
        node.arity = 0;
        if node.priority != Priority::Bracket {
            node.priority = Priority::Value;
        }
    }
}

impl<'c> Builder<'c> {
    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Build one sub-sequence and return its root plus the delimiter that
    /// closed it (`None` at end of input).  `depth` counts the enclosing
    /// brackets and argument lists.
    fn sequence(
        &mut self,
        stop: Stop,
        depth: usize,
    ) -> Result<(Option<NodeId>, Option<Delimiter>), ExprError> {
        if depth > MAX_DEPTH {
            return Err(ExprError::Unexpected("(".into()));
        }
        let mut tail: Option<NodeId> = None;
        let mut last_op: Option<Operator> = None;
        let mut expect_operand = true;

        let closer = loop {
            let Some(item) = self.items.next() else {
                if stop != Stop::TopLevel {
                    return Err(ExprError::UnmatchedBracket);
                }
                break None;
            };
            let id = match item {
                ExpressionItem::Delimiter(Delimiter::Close) => {
                    if stop == Stop::TopLevel {
                        return Err(ExprError::UnmatchedBracket);
                    }
                    break Some(Delimiter::Close);
                }
                ExpressionItem::Delimiter(Delimiter::Comma) => {
                    if stop != Stop::Argument {
                        return Err(ExprError::Unexpected(",".into()));
                    }
                    break Some(Delimiter::Comma);
                }
                ExpressionItem::Delimiter(Delimiter::Open) => {
                    let (inner, _) = self.sequence(Stop::Bracket, depth + 1)?;
                    let inner = inner.ok_or(ExprError::Empty)?;
                    self.nodes[inner].priority = Priority::Bracket;
                    expect_operand = false;
                    inner
                }
                ExpressionItem::Operator(op) => {
                    let op = match (op, expect_operand) {
                        (Operator::Sub, true) => Operator::Neg,
                        (op, true) if op.arity() == 2 => {
                            return Err(ExprError::Unexpected(op.keyword().into()))
                        }
                        (op, false) if op.arity() == 1 => {
                            return Err(ExprError::Unexpected(op.keyword().into()))
                        }
                        (op, _) => op,
                    };
                    last_op = Some(op);
                    expect_operand = true;
                    self.push(Node::new(ExpressionItem::Operator(op), op.arity()))
                }
                ExpressionItem::Function(func) => {
                    expect_operand = false;
                    self.call(func, depth + 1)?
                }
                item @ (ExpressionItem::Value(_) | ExpressionItem::Variable(_)) => {
                    expect_operand = false;
                    self.push(Node::new(item, 0))
                }
            };
            self.insert(id, tail)?;
            tail = Some(id);
        };

        if expect_operand {
            if let Some(op) = last_op.filter(|_| tail.is_some()) {
                return Err(ExprError::MissingOperand(op.keyword().into()));
            }
        }
        Ok((tail.map(|t| self.root_of(t)), closer))
    }

    /// Read a function's bracketed argument list and build its node.
    fn call(&mut self, func: Function, depth: usize) -> Result<NodeId, ExprError> {
        let arity = match &func {
            Function::Builtin(f) => f.arity(),
            Function::User(name) => self
                .ctx
                .user_function_arity(name)
                .ok_or_else(|| ExprError::UnknownFunction(format!("${name}")))?,
        };
        match self.items.next() {
            Some(ExpressionItem::Delimiter(Delimiter::Open)) => {}
            Some(other) => return Err(ExprError::Unexpected(other.to_string())),
            None => return Err(ExprError::Unexpected(func.name())),
        }

        let mut args = Vec::new();
        loop {
            let (arg, closer) = self.sequence(Stop::Argument, depth)?;
            match (arg, closer) {
                (Some(arg), _) => args.push(arg),
                (None, Some(Delimiter::Close)) if args.is_empty() => break,
                _ => return Err(ExprError::Unexpected(",".into())),
            }
            if args.len() > MAX_ARGS {
                break;
            }
            if closer == Some(Delimiter::Close) {
                break;
            }
        }

        if !arity.accepts(args.len()) || (arity.is_zero() && !args.is_empty()) {
            return Err(ExprError::WrongArity {
                name: func.name(),
                expected: arity.describe(),
                got: args.len(),
            });
        }

        let mut node = Node::new(ExpressionItem::Function(func), args.len());
        node.children = args.clone();
        let id = self.push(node);
        for arg in args {
            self.nodes[arg].parent = Some(id);
        }
        Ok(id)
    }

    fn root_of(&self, mut id: NodeId) -> NodeId {
        while let Some(parent) = self.nodes[id].parent {
            id = parent;
        }
        id
    }

    fn placement(&self, id: NodeId) -> ExprError {
        ExprError::Placement(self.nodes[id].item.to_string())
    }

    /// Attach `child` to the next free slot of `parent`.
    fn attach(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent].children.push(child);
        self.nodes[child].parent = Some(parent);
    }

    /// Put `new` where `old` was and make `old` its next child.
    fn adopt(&mut self, new: NodeId, old: NodeId) -> Result<(), ExprError> {
        if self.nodes[new].is_full() {
            return Err(self.placement(new));
        }
        let grand = self.nodes[old].parent;
        if let Some(g) = grand {
            if let Some(slot) = self.nodes[g].children.iter_mut().find(|c| **c == old) {
                *slot = new;
            }
        }
        self.nodes[new].parent = grand;
        self.attach(new, old);
        Ok(())
    }

    fn insert(&mut self, new: NodeId, tail: Option<NodeId>) -> Result<(), ExprError> {
        let Some(mut t) = tail else {
            return Ok(());
        };
        let p = self.nodes[new].priority;
        loop {
            let tp = self.nodes[t].priority;
            if p < tp {
                match self.nodes[t].parent {
                    Some(parent) => t = parent,
                    None => return self.adopt(new, t),
                }
            } else if p == tp {
                if !self.nodes[t].is_full() {
                    self.attach(t, new);
                    return Ok(());
                }
                return self.adopt(new, t);
            } else {
                if !self.nodes[t].is_full() {
                    self.attach(t, new);
                    return Ok(());
                }
                let Some(&last) = self.nodes[t].children.last() else {
                    return Err(self.placement(new));
                };
                if self.nodes[last].priority > p {
                    return self.adopt(new, last);
                }
                return Err(self.placement(new));
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::item::Arity;

    struct NoUser;

    impl EvalContext for NoUser {
        fn resolve(&self, _: &str) -> Option<Value> {
            None
        }
    }

    struct WithHooks;

    impl EvalContext for WithHooks {
        fn resolve(&self, _: &str) -> Option<Value> {
            None
        }

        fn user_function_arity(&self, name: &str) -> Option<Arity> {
            match name {
                "pair" => Some(Arity::exactly(2)),
                "many" => Some(Arity::Variable),
                "now" => Some(Arity::exactly(0)),
                _ => None,
            }
        }
    }

    fn shape(src: &str) -> String {
        ExpressionTree::parse(src, &NoUser).unwrap().render()
    }

    fn err(src: &str) -> ExprError {
        ExpressionTree::parse(src, &NoUser).unwrap_err()
    }

    #[test]
    fn precedence() {
        assert_eq!(shape("2+3*4"), "(2 + (3 * 4))");
        assert_eq!(shape("2*3+4"), "((2 * 3) + 4)");
        assert_eq!(shape("(2+3)*4"), "((2 + 3) * 4)");
        assert_eq!(shape("a + b * c - d"), "((a + (b * c)) - d)");
        assert_eq!(shape("a < b && c == d"), "((a < b) && (c == d))");
    }

    #[test]
    fn left_associativity() {
        assert_eq!(shape("1-2-3"), "((1 - 2) - 3)");
        assert_eq!(shape("8/4/2"), "((8 / 4) / 2)");
        assert_eq!(shape("a && b || c"), "((a && b) || c)");
    }

    #[test]
    fn prefix_operators() {
        assert_eq!(shape("!a && b"), "((!a) && b)");
        assert_eq!(shape("!!a"), "(!(!a))");
        assert_eq!(shape("a * !b"), "(a * (!b))");
        assert_eq!(shape("-x * 2"), "((-x) * 2)");
        assert_eq!(shape("2 - -x"), "(2 - (-x))");
    }

    #[test]
    fn negative_literal_folds() {
        let tree = ExpressionTree::parse("-5", &NoUser).unwrap();
        let root = tree.node(tree.root().unwrap());
        assert!(matches!(root.item, ExpressionItem::Value(Value::Int(-5))));
        assert!(root.children.is_empty());
        assert_eq!(tree.len(), 1);
        assert_eq!(shape("3 * -2.5"), "(3 * -2.5)");
        assert_eq!(shape("- -3"), "3");
    }

    #[test]
    fn brackets_protect_structure() {
        assert_eq!(shape("2*(3+4)"), "(2 * (3 + 4))");
        assert_eq!(shape("((1))"), "1");
        assert_eq!(shape("-(1+2)"), "(-(1 + 2))");
    }

    #[test]
    fn functions() {
        assert_eq!(shape("strlen(\"ab\") + 1"), "(strlen(\"ab\") + 1)");
        assert_eq!(shape("1 + abs(-2) * 3"), "(1 + (abs(-2) * 3))");
        assert_eq!(shape("issubstr(a, b + c)"), "issubstr(a, (b + c))");
        assert_eq!(shape("!defined(\"x\")"), "(!defined(\"x\"))");
    }

    #[test]
    fn user_function_arity() {
        let parse = |s| ExpressionTree::parse(s, &WithHooks);
        assert_eq!(parse("$pair(1, 2)").unwrap().render(), "$pair(1, 2)");
        assert_eq!(parse("$many()").unwrap().render(), "$many()");
        assert_eq!(parse("$many(1,2,3)").unwrap().render(), "$many(1, 2, 3)");
        assert_eq!(parse("$now()").unwrap().render(), "$now()");
        assert!(matches!(
            parse("$pair(1)").unwrap_err(),
            ExprError::WrongArity { got: 1, .. }
        ));
        assert!(matches!(
            parse("$now(1)").unwrap_err(),
            ExprError::WrongArity { got: 1, .. }
        ));
        assert_eq!(
            parse("$nosuch(1)").unwrap_err(),
            ExprError::UnknownFunction("$nosuch".into())
        );
        let too_many = format!("$many({})", vec!["1"; MAX_ARGS + 1].join(","));
        assert!(matches!(
            parse(&too_many).unwrap_err(),
            ExprError::WrongArity { .. }
        ));
    }

    #[test]
    fn empty_is_distinct() {
        let empty = ExpressionTree::parse("", &NoUser).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.len(), 0);
        let one = ExpressionTree::parse("x", &NoUser).unwrap();
        assert!(!one.is_empty());
        assert_eq!(one.len(), 1);
    }

    #[test]
    fn structural_errors() {
        assert_eq!(err("(1+2"), ExprError::UnmatchedBracket);
        assert_eq!(err("1+2)"), ExprError::UnmatchedBracket);
        assert_eq!(err("()"), ExprError::Empty);
        assert_eq!(err("1 +"), ExprError::MissingOperand("+".into()));
        assert_eq!(err("* 2"), ExprError::Unexpected("*".into()));
        assert_eq!(err("a !"), ExprError::Unexpected("!".into()));
        assert_eq!(err("a, b"), ExprError::Unexpected(",".into()));
        assert!(matches!(err("a b"), ExprError::Placement(_)));
        assert!(matches!(err("(a) (b)"), ExprError::Placement(_)));
        assert!(matches!(err("abs(1,,2)"), ExprError::Unexpected(_)));
        assert!(matches!(err("abs 1"), ExprError::Placement(_)));
        assert!(matches!(err("strlen()"), ExprError::WrongArity { got: 0, .. }));
    }

    #[test]
    fn nesting_is_capped() {
        let ok = format!("{}1{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        assert!(ExpressionTree::parse(&ok, &NoUser).is_ok());
        assert_eq!(err(&"(".repeat(10_000)), ExprError::Unexpected("(".into()));
        assert_eq!(err(&"abs(".repeat(10_000)), ExprError::Unexpected("(".into()));

        let chain = vec!["1"; 10_000].join(" + ");
        assert!(matches!(err(&chain), ExprError::Unexpected(_)));
        let negations = format!("{}x", "! ".repeat(10_000));
        assert!(matches!(err(&negations), ExprError::Unexpected(_)));
    }
}
