//! Operator dispatch tables.
//!
//! Every operator owns a static table of rows keyed by operand type tags.
//! A binary application first looks for an exact `(left, right)` row, then
//! for a row whose left side is `Any`, then for one whose right side is
//! `Any`.

use std::cmp::Ordering;

use crate::error::ExprError;

use super::builtins::type_list;
use super::item::Operator;
use super::value::{Value, ValueType};

use ValueType::{Any, Bool, Float, Int, Str};

type BinaryFn = fn(&Value, &Value) -> Result<Value, ExprError>;
type UnaryFn = fn(&Value) -> Result<Value, ExprError>;

struct BinaryRow {
    left: ValueType,
    right: ValueType,
    apply: BinaryFn,
}

struct UnaryRow {
    operand: ValueType,
    apply: UnaryFn,
}

const fn row(left: ValueType, right: ValueType, apply: BinaryFn) -> BinaryRow {
    BinaryRow { left, right, apply }
}

// ── Operand helpers ───────────────────────────────────────────────────────────

fn ints(l: &Value, r: &Value) -> Result<(i64, i64), ExprError> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => Ok((*a, *b)),
        _ => Err(internal(l, r)),
    }
}

/// Both operands as floats, promoting integers.
fn floats(l: &Value, r: &Value) -> Result<(f32, f32), ExprError> {
    match (to_f32(l), to_f32(r)) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(internal(l, r)),
    }
}

fn bools(l: &Value, r: &Value) -> Result<(bool, bool), ExprError> {
    match (l, r) {
        (Value::Bool(a), Value::Bool(b)) => Ok((*a, *b)),
        _ => Err(internal(l, r)),
    }
}

fn strs<'a>(l: &'a Value, r: &'a Value) -> Result<(&'a str, &'a str), ExprError> {
    match (l, r) {
        (Value::Str(a), Value::Str(b)) => Ok((a, b)),
        _ => Err(internal(l, r)),
    }
}

fn to_f32(v: &Value) -> Option<f32> {
    match v {
        Value::Int(n) => Some(*n as f32),
        Value::Float(x) => Some(*x),
        _ => None,
    }
}

fn internal(l: &Value, r: &Value) -> ExprError {
    ExprError::Internal(format!(
        "operator row applied to {}, {}",
        l.value_type(),
        r.value_type()
    ))
}

fn div_by_zero() -> ExprError {
    ExprError::Arithmetic("division by zero".into())
}

// ── Arithmetic ────────────────────────────────────────────────────────────────

fn add_int(l: &Value, r: &Value) -> Result<Value, ExprError> {
    let (a, b) = ints(l, r)?;
    Ok(Value::Int(a.wrapping_add(b)))
}

fn add_float(l: &Value, r: &Value) -> Result<Value, ExprError> {
    let (a, b) = floats(l, r)?;
    Ok(Value::Float(a + b))
}

fn concat(l: &Value, r: &Value) -> Result<Value, ExprError> {
    Ok(Value::Str(format!("{l}{r}")))
}

fn sub_int(l: &Value, r: &Value) -> Result<Value, ExprError> {
    let (a, b) = ints(l, r)?;
    Ok(Value::Int(a.wrapping_sub(b)))
}

fn sub_float(l: &Value, r: &Value) -> Result<Value, ExprError> {
    let (a, b) = floats(l, r)?;
    Ok(Value::Float(a - b))
}

fn mul_int(l: &Value, r: &Value) -> Result<Value, ExprError> {
    let (a, b) = ints(l, r)?;
    Ok(Value::Int(a.wrapping_mul(b)))
}

fn mul_float(l: &Value, r: &Value) -> Result<Value, ExprError> {
    let (a, b) = floats(l, r)?;
    Ok(Value::Float(a * b))
}

fn div_int(l: &Value, r: &Value) -> Result<Value, ExprError> {
    let (a, b) = ints(l, r)?;
    if b == 0 {
        return Err(div_by_zero());
    }
    Ok(Value::Int(a.wrapping_div(b)))
}

fn div_float(l: &Value, r: &Value) -> Result<Value, ExprError> {
    let (a, b) = floats(l, r)?;
    if b == 0.0 {
        return Err(div_by_zero());
    }
    Ok(Value::Float(a / b))
}

fn rem_int(l: &Value, r: &Value) -> Result<Value, ExprError> {
    let (a, b) = ints(l, r)?;
    if b == 0 {
        return Err(div_by_zero());
    }
    Ok(Value::Int(a.wrapping_rem(b)))
}

fn rem_float(l: &Value, r: &Value) -> Result<Value, ExprError> {
    let (a, b) = floats(l, r)?;
    if b == 0.0 {
        return Err(div_by_zero());
    }
    Ok(Value::Float(a % b))
}

// ── Comparison ────────────────────────────────────────────────────────────────

fn cmp_int(l: &Value, r: &Value) -> Result<Ordering, ExprError> {
    let (a, b) = ints(l, r)?;
    Ok(a.cmp(&b))
}

fn cmp_float(l: &Value, r: &Value) -> Result<Option<Ordering>, ExprError> {
    let (a, b) = floats(l, r)?;
    Ok(a.partial_cmp(&b))
}

fn cmp_str(l: &Value, r: &Value) -> Result<Ordering, ExprError> {
    let (a, b) = strs(l, r)?;
    Ok(a.cmp(b))
}

fn eq_int(l: &Value, r: &Value) -> Result<Value, ExprError> {
    Ok(Value::Bool(cmp_int(l, r)? == Ordering::Equal))
}

fn eq_float(l: &Value, r: &Value) -> Result<Value, ExprError> {
    Ok(Value::Bool(cmp_float(l, r)? == Some(Ordering::Equal)))
}

fn eq_str(l: &Value, r: &Value) -> Result<Value, ExprError> {
    Ok(Value::Bool(cmp_str(l, r)? == Ordering::Equal))
}

fn eq_bool(l: &Value, r: &Value) -> Result<Value, ExprError> {
    let (a, b) = bools(l, r)?;
    Ok(Value::Bool(a == b))
}

fn ne_int(l: &Value, r: &Value) -> Result<Value, ExprError> {
    Ok(Value::Bool(cmp_int(l, r)? != Ordering::Equal))
}

fn ne_float(l: &Value, r: &Value) -> Result<Value, ExprError> {
    Ok(Value::Bool(cmp_float(l, r)? != Some(Ordering::Equal)))
}

fn ne_str(l: &Value, r: &Value) -> Result<Value, ExprError> {
    Ok(Value::Bool(cmp_str(l, r)? != Ordering::Equal))
}

fn ne_bool(l: &Value, r: &Value) -> Result<Value, ExprError> {
    let (a, b) = bools(l, r)?;
    Ok(Value::Bool(a != b))
}

fn lt_int(l: &Value, r: &Value) -> Result<Value, ExprError> {
    Ok(Value::Bool(cmp_int(l, r)?.is_lt()))
}

fn lt_float(l: &Value, r: &Value) -> Result<Value, ExprError> {
    Ok(Value::Bool(cmp_float(l, r)?.is_some_and(Ordering::is_lt)))
}

fn lt_str(l: &Value, r: &Value) -> Result<Value, ExprError> {
    Ok(Value::Bool(cmp_str(l, r)?.is_lt()))
}

fn le_int(l: &Value, r: &Value) -> Result<Value, ExprError> {
    Ok(Value::Bool(cmp_int(l, r)?.is_le()))
}

fn le_float(l: &Value, r: &Value) -> Result<Value, ExprError> {
    Ok(Value::Bool(cmp_float(l, r)?.is_some_and(Ordering::is_le)))
}

fn le_str(l: &Value, r: &Value) -> Result<Value, ExprError> {
    Ok(Value::Bool(cmp_str(l, r)?.is_le()))
}

fn gt_int(l: &Value, r: &Value) -> Result<Value, ExprError> {
    Ok(Value::Bool(cmp_int(l, r)?.is_gt()))
}

fn gt_float(l: &Value, r: &Value) -> Result<Value, ExprError> {
    Ok(Value::Bool(cmp_float(l, r)?.is_some_and(Ordering::is_gt)))
}

fn gt_str(l: &Value, r: &Value) -> Result<Value, ExprError> {
    Ok(Value::Bool(cmp_str(l, r)?.is_gt()))
}

fn ge_int(l: &Value, r: &Value) -> Result<Value, ExprError> {
    Ok(Value::Bool(cmp_int(l, r)?.is_ge()))
}

fn ge_float(l: &Value, r: &Value) -> Result<Value, ExprError> {
    Ok(Value::Bool(cmp_float(l, r)?.is_some_and(Ordering::is_ge)))
}

fn ge_str(l: &Value, r: &Value) -> Result<Value, ExprError> {
    Ok(Value::Bool(cmp_str(l, r)?.is_ge()))
}

// ── Logical ───────────────────────────────────────────────────────────────────

fn and_bool(l: &Value, r: &Value) -> Result<Value, ExprError> {
    let (a, b) = bools(l, r)?;
    Ok(Value::Bool(a && b))
}

fn and_int(l: &Value, r: &Value) -> Result<Value, ExprError> {
    let (a, b) = ints(l, r)?;
    Ok(Value::Int(a & b))
}

fn or_bool(l: &Value, r: &Value) -> Result<Value, ExprError> {
    let (a, b) = bools(l, r)?;
    Ok(Value::Bool(a || b))
}

fn or_int(l: &Value, r: &Value) -> Result<Value, ExprError> {
    let (a, b) = ints(l, r)?;
    Ok(Value::Int(a | b))
}

fn xor_bool(l: &Value, r: &Value) -> Result<Value, ExprError> {
    let (a, b) = bools(l, r)?;
    Ok(Value::Bool(a ^ b))
}

fn xor_int(l: &Value, r: &Value) -> Result<Value, ExprError> {
    let (a, b) = ints(l, r)?;
    Ok(Value::Int(a ^ b))
}

fn not(v: &Value) -> Result<Value, ExprError> {
    match v {
        Value::Bool(b) => Ok(Value::Bool(!b)),
        Value::Int(n) => Ok(Value::Int(!n)),
        other => Err(ExprError::Internal(format!("'!' row applied to {}", other.value_type()))),
    }
}

fn neg(v: &Value) -> Result<Value, ExprError> {
    match v {
        Value::Int(n) => Ok(Value::Int(n.wrapping_neg())),
        Value::Float(x) => Ok(Value::Float(-x)),
        other => Err(ExprError::Internal(format!("'-' row applied to {}", other.value_type()))),
    }
}

// ── Tables ────────────────────────────────────────────────────────────────────

static ADD: &[BinaryRow] = &[
    row(Int, Int, add_int),
    row(Float, Float, add_float),
    row(Int, Float, add_float),
    row(Float, Int, add_float),
    row(Str, Str, concat),
    row(Any, Str, concat),
    row(Str, Any, concat),
];

static SUB: &[BinaryRow] = &[
    row(Int, Int, sub_int),
    row(Float, Float, sub_float),
    row(Int, Float, sub_float),
    row(Float, Int, sub_float),
];

static MUL: &[BinaryRow] = &[
    row(Int, Int, mul_int),
    row(Float, Float, mul_float),
    row(Int, Float, mul_float),
    row(Float, Int, mul_float),
];

static DIV: &[BinaryRow] = &[
    row(Int, Int, div_int),
    row(Float, Float, div_float),
    row(Int, Float, div_float),
    row(Float, Int, div_float),
];

static MOD: &[BinaryRow] = &[
    row(Int, Int, rem_int),
    row(Float, Float, rem_float),
    row(Int, Float, rem_float),
    row(Float, Int, rem_float),
];

static EQ: &[BinaryRow] = &[
    row(Int, Int, eq_int),
    row(Float, Float, eq_float),
    row(Int, Float, eq_float),
    row(Float, Int, eq_float),
    row(Str, Str, eq_str),
    row(Bool, Bool, eq_bool),
];

static NE: &[BinaryRow] = &[
    row(Int, Int, ne_int),
    row(Float, Float, ne_float),
    row(Int, Float, ne_float),
    row(Float, Int, ne_float),
    row(Str, Str, ne_str),
    row(Bool, Bool, ne_bool),
];

static LT: &[BinaryRow] = &[
    row(Int, Int, lt_int),
    row(Float, Float, lt_float),
    row(Int, Float, lt_float),
    row(Float, Int, lt_float),
    row(Str, Str, lt_str),
];

static LE: &[BinaryRow] = &[
    row(Int, Int, le_int),
    row(Float, Float, le_float),
    row(Int, Float, le_float),
    row(Float, Int, le_float),
    row(Str, Str, le_str),
];

static GT: &[BinaryRow] = &[
    row(Int, Int, gt_int),
    row(Float, Float, gt_float),
    row(Int, Float, gt_float),
    row(Float, Int, gt_float),
    row(Str, Str, gt_str),
];

static GE: &[BinaryRow] = &[
    row(Int, Int, ge_int),
    row(Float, Float, ge_float),
    row(Int, Float, ge_float),
    row(Float, Int, ge_float),
    row(Str, Str, ge_str),
];

static AND: &[BinaryRow] = &[row(Bool, Bool, and_bool), row(Int, Int, and_int)];
static OR: &[BinaryRow] = &[row(Bool, Bool, or_bool), row(Int, Int, or_int)];
static XOR: &[BinaryRow] = &[row(Bool, Bool, xor_bool), row(Int, Int, xor_int)];

static NOT: &[UnaryRow] = &[
    UnaryRow { operand: Bool, apply: not },
    UnaryRow { operand: Int, apply: not },
];

static NEG: &[UnaryRow] = &[
    UnaryRow { operand: Int, apply: neg },
    UnaryRow { operand: Float, apply: neg },
];

fn binary_table(op: Operator) -> &'static [BinaryRow] {
    match op {
        Operator::Add => ADD,
        Operator::Sub => SUB,
        Operator::Mul => MUL,
        Operator::Div => DIV,
        Operator::Mod => MOD,
        Operator::Eq => EQ,
        Operator::Ne => NE,
        Operator::Lt => LT,
        Operator::Le => LE,
        Operator::Gt => GT,
        Operator::Ge => GE,
        Operator::And => AND,
        Operator::Or => OR,
        Operator::Xor => XOR,
        Operator::Not | Operator::Neg => &[],
    }
}

fn unary_table(op: Operator) -> &'static [UnaryRow] {
    match op {
        Operator::Not => NOT,
        Operator::Neg => NEG,
        _ => &[],
    }
}

// ── Dispatch ──────────────────────────────────────────────────────────────────

/// Apply an operator to already-evaluated operands.
pub fn apply(op: Operator, args: &[Value]) -> Result<Value, ExprError> {
    match args {
        [v] if op.arity() == 1 => apply_unary(op, v),
        [l, r] if op.arity() == 2 => apply_binary(op, l, r),
        _ => Err(ExprError::MissingOperand(op.keyword().to_owned())),
    }
}

fn apply_unary(op: Operator, v: &Value) -> Result<Value, ExprError> {
    let t = v.value_type();
    unary_table(op)
        .iter()
        .find(|r| r.operand == t)
        .or_else(|| unary_table(op).iter().find(|r| r.operand == Any))
        .ok_or_else(|| unsupported(op, std::slice::from_ref(v)))
        .and_then(|r| (r.apply)(v))
}

fn apply_binary(op: Operator, l: &Value, r: &Value) -> Result<Value, ExprError> {
    let (lt, rt) = (l.value_type(), r.value_type());
    let rows = binary_table(op);
    let found = rows
        .iter()
        .find(|row| row.left == lt && row.right == rt)
        .or_else(|| rows.iter().find(|row| row.left == Any && row.right == rt))
        .or_else(|| rows.iter().find(|row| row.left == lt && row.right == Any));
    match found {
        Some(row) => (row.apply)(l, r),
        None => Err(unsupported(op, &[l.clone(), r.clone()])),
    }
}

fn unsupported(op: Operator, args: &[Value]) -> ExprError {
    ExprError::UnsupportedOperands {
        op: op.keyword().to_owned(),
        types: type_list(args),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn bin(op: Operator, l: impl Into<Value>, r: impl Into<Value>) -> Result<Value, ExprError> {
        apply(op, &[l.into(), r.into()])
    }

    #[test]
    fn integer_arithmetic() {
        assert_eq!(bin(Operator::Add, 2i64, 3i64), Ok(Value::Int(5)));
        assert_eq!(bin(Operator::Sub, 2i64, 3i64), Ok(Value::Int(-1)));
        assert_eq!(bin(Operator::Mul, 4i64, 3i64), Ok(Value::Int(12)));
        assert_eq!(bin(Operator::Div, 7i64, 2i64), Ok(Value::Int(3)));
        assert_eq!(bin(Operator::Mod, 7i64, 2i64), Ok(Value::Int(1)));
    }

    #[test]
    fn mixed_numeric_promotes() {
        assert_eq!(bin(Operator::Add, 1i64, 0.5f32), Ok(Value::Float(1.5)));
        assert_eq!(bin(Operator::Mul, 0.5f32, 4i64), Ok(Value::Float(2.0)));
        assert_eq!(bin(Operator::Eq, 2i64, 2.0f32), Ok(Value::Bool(true)));
        assert_eq!(bin(Operator::Lt, 1i64, 1.5f32), Ok(Value::Bool(true)));
    }

    #[test]
    fn division_by_zero() {
        assert!(matches!(bin(Operator::Div, 1i64, 0i64), Err(ExprError::Arithmetic(_))));
        assert!(matches!(bin(Operator::Mod, 1i64, 0i64), Err(ExprError::Arithmetic(_))));
        assert!(matches!(bin(Operator::Div, 1.0f32, 0i64), Err(ExprError::Arithmetic(_))));
    }

    #[test]
    fn string_concat_uses_any_fallback() {
        assert_eq!(bin(Operator::Add, "a", "b"), Ok(Value::Str("ab".into())));
        assert_eq!(bin(Operator::Add, "n=", 3i64), Ok(Value::Str("n=3".into())));
        assert_eq!(bin(Operator::Add, true, "!"), Ok(Value::Str("true!".into())));
    }

    #[test]
    fn unsupported_operand_types() {
        assert_eq!(
            bin(Operator::Sub, "a", "b"),
            Err(ExprError::UnsupportedOperands {
                op: "-".into(),
                types: "string, string".into()
            })
        );
        assert!(matches!(
            bin(Operator::And, true, 1i64),
            Err(ExprError::UnsupportedOperands { .. })
        ));
        assert!(matches!(
            apply(Operator::Neg, &["x".into()]),
            Err(ExprError::UnsupportedOperands { .. })
        ));
    }

    #[test]
    fn comparisons() {
        assert_eq!(bin(Operator::Lt, "abc", "abd"), Ok(Value::Bool(true)));
        assert_eq!(bin(Operator::Ge, 3i64, 3i64), Ok(Value::Bool(true)));
        assert_eq!(bin(Operator::Ne, true, false), Ok(Value::Bool(true)));
        assert_eq!(bin(Operator::Eq, "x", "x"), Ok(Value::Bool(true)));
    }

    #[test]
    fn logical_and_bitwise() {
        assert_eq!(bin(Operator::And, true, false), Ok(Value::Bool(false)));
        assert_eq!(bin(Operator::Or, true, false), Ok(Value::Bool(true)));
        assert_eq!(bin(Operator::Xor, true, true), Ok(Value::Bool(false)));
        assert_eq!(bin(Operator::And, 6i64, 3i64), Ok(Value::Int(2)));
        assert_eq!(bin(Operator::Or, 4i64, 1i64), Ok(Value::Int(5)));
        assert_eq!(apply(Operator::Not, &[Value::Bool(true)]), Ok(Value::Bool(false)));
        assert_eq!(apply(Operator::Not, &[Value::Int(0)]), Ok(Value::Int(-1)));
        assert_eq!(apply(Operator::Neg, &[Value::Float(2.5)]), Ok(Value::Float(-2.5)));
    }

    #[test]
    fn wrong_operand_count() {
        assert_eq!(
            apply(Operator::Add, &[Value::Int(1)]),
            Err(ExprError::MissingOperand("+".into()))
        );
    }
}
