//! Tree-walking evaluator over a read-only view of an intent.

use crate::condition::parser::{ArithOp, CmpOp, Expr, LogicOp, Name};
use crate::condition::ConditionError;
use serde_json::{Map, Number, Value};
use std::borrow::Cow;
use std::cmp::Ordering;

/// The variable namespace a condition is evaluated against.
///
/// Built once per intent evaluation and shared by every rule's condition.
#[derive(Debug, Clone)]
pub struct Scope {
    args: Value,
    resource: Value,
    action: Value,
}

impl Scope {
    pub fn new(resource: &str, action: &str, args: &Map<String, Value>) -> Self {
        Self {
            args: Value::Object(args.clone()),
            resource: Value::String(resource.to_string()),
            action: Value::String(action.to_string()),
        }
    }

    fn lookup(&self, name: Name) -> &Value {
        match name {
            Name::Args => &self.args,
            Name::Resource => &self.resource,
            Name::Action => &self.action,
        }
    }
}

/// Evaluate an expression. Values borrowed from the scope are not cloned.
pub fn evaluate<'s>(expr: &Expr, scope: &'s Scope) -> Result<Cow<'s, Value>, ConditionError> {
    match expr {
        Expr::Literal(value) => Ok(Cow::Owned(value.clone())),
        Expr::Name(name) => Ok(Cow::Borrowed(scope.lookup(*name))),
        Expr::Member(base, field) => {
            let base = evaluate(base, scope)?;
            project(base, |v| member(v, field))
        }
        Expr::Index(base, index) => {
            let base = evaluate(base, scope)?;
            let index = evaluate(index, scope)?;
            project(base, |v| subscript(v, &index))
        }
        Expr::List(items) => {
            let values = items
                .iter()
                .map(|item| evaluate(item, scope).map(Cow::into_owned))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Cow::Owned(Value::Array(values)))
        }
        Expr::Neg(inner) => {
            let value = evaluate(inner, scope)?;
            match &*value {
                Value::Number(n) => Ok(Cow::Owned(Value::Number(negate(n)?))),
                other => Err(ConditionError::type_mismatch(format!(
                    "cannot negate {}",
                    type_name(other)
                ))),
            }
        }
        Expr::Not(inner) => {
            let value = as_bool(&*evaluate(inner, scope)?, "not")?;
            Ok(Cow::Owned(Value::Bool(!value)))
        }
        Expr::Logic(op, left, right) => {
            let keyword = match op {
                LogicOp::And => "and",
                LogicOp::Or => "or",
            };
            let left = as_bool(&*evaluate(left, scope)?, keyword)?;
            // Short-circuit so guards like `args.x != null and args.x.y > 1` work.
            let result = match (op, left) {
                (LogicOp::And, false) => false,
                (LogicOp::Or, true) => true,
                _ => as_bool(&*evaluate(right, scope)?, keyword)?,
            };
            Ok(Cow::Owned(Value::Bool(result)))
        }
        Expr::Arith(op, left, right) => {
            let left = evaluate(left, scope)?;
            let right = evaluate(right, scope)?;
            arithmetic(*op, &left, &right).map(Cow::Owned)
        }
        Expr::Compare(first, links) => {
            let mut left = evaluate(first, scope)?;
            for (op, right_expr) in links {
                let right = evaluate(right_expr, scope)?;
                if !compare(*op, &left, &right)? {
                    return Ok(Cow::Owned(Value::Bool(false)));
                }
                left = right;
            }
            Ok(Cow::Owned(Value::Bool(true)))
        }
    }
}

/// Apply an accessor while keeping the borrow when the base was borrowed.
fn project<'s, F>(base: Cow<'s, Value>, access: F) -> Result<Cow<'s, Value>, ConditionError>
where
    F: for<'v> Fn(&'v Value) -> Result<&'v Value, ConditionError>,
{
    match base {
        Cow::Borrowed(value) => access(value).map(Cow::Borrowed),
        Cow::Owned(value) => access(&value).map(|v| Cow::Owned(v.clone())),
    }
}

fn member<'v>(value: &'v Value, field: &str) -> Result<&'v Value, ConditionError> {
    match value {
        Value::Object(map) => map
            .get(field)
            .ok_or_else(|| ConditionError::MissingKey(field.to_string())),
        other => Err(ConditionError::type_mismatch(format!(
            "cannot read field '{}' of {}",
            field,
            type_name(other)
        ))),
    }
}

fn subscript<'v>(value: &'v Value, index: &Value) -> Result<&'v Value, ConditionError> {
    match (value, index) {
        (Value::Object(map), Value::String(key)) => map
            .get(key)
            .ok_or_else(|| ConditionError::MissingKey(key.clone())),
        (Value::Array(items), Value::Number(n)) => {
            let position = n.as_i64().ok_or_else(|| {
                ConditionError::type_mismatch(format!("list index must be an integer, got {}", n))
            })?;
            // Negative indices count from the end.
            let resolved = if position < 0 {
                items.len() as i64 + position
            } else {
                position
            };
            usize::try_from(resolved)
                .ok()
                .and_then(|i| items.get(i))
                .ok_or(ConditionError::IndexOutOfRange {
                    index: position,
                    len: items.len(),
                })
        }
        (base, index) => Err(ConditionError::type_mismatch(format!(
            "cannot index {} with {}",
            type_name(base),
            type_name(index)
        ))),
    }
}

fn as_bool(value: &Value, keyword: &str) -> Result<bool, ConditionError> {
    match value {
        Value::Bool(b) => Ok(*b),
        other => Err(ConditionError::type_mismatch(format!(
            "'{}' expects booleans, got {}",
            keyword,
            type_name(other)
        ))),
    }
}

fn negate(n: &Number) -> Result<Number, ConditionError> {
    if let Some(i) = n.as_i64() {
        if let Some(negated) = i.checked_neg() {
            return Ok(Number::from(negated));
        }
    }
    float_number(-to_f64(n))
}

fn arithmetic(op: ArithOp, left: &Value, right: &Value) -> Result<Value, ConditionError> {
    match (left, right) {
        (Value::String(a), Value::String(b)) if op == ArithOp::Add => {
            Ok(Value::String(format!("{}{}", a, b)))
        }
        (Value::Number(a), Value::Number(b)) => {
            numeric(op, a, b).map(Value::Number)
        }
        (a, b) => Err(ConditionError::type_mismatch(format!(
            "unsupported operands for {:?}: {} and {}",
            op,
            type_name(a),
            type_name(b)
        ))),
    }
}

fn numeric(op: ArithOp, a: &Number, b: &Number) -> Result<Number, ConditionError> {
    // Integer arithmetic stays exact unless it overflows; division is always
    // true division.
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        let exact = match op {
            ArithOp::Add => x.checked_add(y),
            ArithOp::Sub => x.checked_sub(y),
            ArithOp::Mul => x.checked_mul(y),
            ArithOp::Rem => {
                if y == 0 {
                    return Err(ConditionError::DivisionByZero);
                }
                x.checked_rem_euclid(y)
            }
            ArithOp::Div => None,
        };
        if let Some(result) = exact {
            return Ok(Number::from(result));
        }
    }

    let (x, y) = (to_f64(a), to_f64(b));
    let result = match op {
        ArithOp::Add => x + y,
        ArithOp::Sub => x - y,
        ArithOp::Mul => x * y,
        ArithOp::Div | ArithOp::Rem if y == 0.0 => return Err(ConditionError::DivisionByZero),
        ArithOp::Div => x / y,
        ArithOp::Rem => x.rem_euclid(y),
    };
    float_number(result)
}

fn float_number(value: f64) -> Result<Number, ConditionError> {
    Number::from_f64(value)
        .ok_or_else(|| ConditionError::type_mismatch("arithmetic produced a non-finite number"))
}

fn to_f64(n: &Number) -> f64 {
    n.as_f64().unwrap_or(f64::NAN)
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, ConditionError> {
    match op {
        CmpOp::Eq => equals(left, right),
        CmpOp::NotEq => equals(left, right).map(|eq| !eq),
        CmpOp::In => contains(right, left),
        CmpOp::NotIn => contains(right, left).map(|found| !found),
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
            let ordering = order(left, right)?;
            Ok(match op {
                CmpOp::Lt => ordering == Ordering::Less,
                CmpOp::Le => ordering != Ordering::Greater,
                CmpOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
    }
}

/// Strict equality: values of different types are not comparable, except
/// that anything may be compared against null.
fn equals(left: &Value, right: &Value) -> Result<bool, ConditionError> {
    match (left, right) {
        (Value::Null, other) | (other, Value::Null) => Ok(other.is_null()),
        (Value::Number(a), Value::Number(b)) => Ok(numbers_equal(a, b)),
        (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
        (Value::String(a), Value::String(b)) => Ok(a == b),
        (Value::Array(a), Value::Array(b)) => Ok(a == b),
        (Value::Object(a), Value::Object(b)) => Ok(a == b),
        (a, b) => Err(ConditionError::type_mismatch(format!(
            "cannot compare {} with {}",
            type_name(a),
            type_name(b)
        ))),
    }
}

fn numbers_equal(a: &Number, b: &Number) -> bool {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => x == y,
        _ => to_f64(a) == to_f64(b),
    }
}

fn order(left: &Value, right: &Value) -> Result<Ordering, ConditionError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
                return Ok(x.cmp(&y));
            }
            to_f64(a)
                .partial_cmp(&to_f64(b))
                .ok_or_else(|| ConditionError::type_mismatch("numbers are not ordered"))
        }
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        (a, b) => Err(ConditionError::type_mismatch(format!(
            "cannot order {} against {}",
            type_name(a),
            type_name(b)
        ))),
    }
}

fn contains(container: &Value, needle: &Value) -> Result<bool, ConditionError> {
    match (container, needle) {
        (Value::String(haystack), Value::String(part)) => Ok(haystack.contains(part.as_str())),
        (Value::Array(items), needle) => Ok(items
            .iter()
            .any(|item| equals(item, needle).unwrap_or(false))),
        (Value::Object(map), Value::String(key)) => Ok(map.contains_key(key)),
        (c, n) => Err(ConditionError::type_mismatch(format!(
            "cannot test {} membership in {}",
            type_name(n),
            type_name(c)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::parser::parse;
    use serde_json::json;

    fn scope(args: Value) -> Scope {
        let args = args.as_object().cloned().unwrap_or_default();
        Scope::new("stripe.charge", "charge", &args)
    }

    fn eval(source: &str, args: Value) -> Result<Value, ConditionError> {
        let expr = parse(source)?;
        let scope = scope(args);
        let value = evaluate(&expr, &scope)?.into_owned();
        Ok(value)
    }

    #[test]
    fn test_numeric_comparisons() {
        assert_eq!(eval("args.amount <= 50", json!({"amount": 30})), Ok(json!(true)));
        assert_eq!(eval("args.amount > 50", json!({"amount": 5000})), Ok(json!(true)));
        assert_eq!(eval("args.amount > 50", json!({"amount": 50})), Ok(json!(false)));
        assert_eq!(eval("args.amount == 49.5", json!({"amount": 49.5})), Ok(json!(true)));
        assert_eq!(eval("args.n == 2.0", json!({"n": 2})), Ok(json!(true)));
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("args.a * 2 + 1", json!({"a": 20})), Ok(json!(41)));
        assert_eq!(eval("7 / 2", json!({})), Ok(json!(3.5)));
        assert_eq!(eval("-7 % 3", json!({})), Ok(json!(2)));
        assert_eq!(eval("'ab' + 'cd'", json!({})), Ok(json!("abcd")));
        assert_eq!(eval("1 / 0", json!({})), Err(ConditionError::DivisionByZero));
    }

    #[test]
    fn test_string_comparison_is_lexicographic() {
        assert_eq!(eval("'apple' < 'banana'", json!({})), Ok(json!(true)));
        assert_eq!(eval("resource == 'stripe.charge'", json!({})), Ok(json!(true)));
        assert_eq!(eval("action != 'refund'", json!({})), Ok(json!(true)));
    }

    #[test]
    fn test_no_implicit_coercion() {
        assert!(matches!(
            eval("args.amount > 50", json!({"amount": "5000"})),
            Err(ConditionError::TypeMismatch(_))
        ));
        assert!(matches!(
            eval("args.amount == '30'", json!({"amount": 30})),
            Err(ConditionError::TypeMismatch(_))
        ));
        assert!(matches!(
            eval("args.flag + 1", json!({"flag": true})),
            Err(ConditionError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_null_equality_is_allowed() {
        assert_eq!(eval("args.memo == null", json!({"memo": null})), Ok(json!(true)));
        assert_eq!(eval("args.memo != None", json!({"memo": "x"})), Ok(json!(true)));
    }

    #[test]
    fn test_missing_key_is_an_error() {
        assert_eq!(
            eval("args.amount > 50", json!({})),
            Err(ConditionError::MissingKey("amount".into()))
        );
    }

    #[test]
    fn test_nested_access() {
        let args = json!({"customer": {"tier": "gold", "tags": ["vip", "eu"]}});
        assert_eq!(eval("args.customer.tier == 'gold'", args.clone()), Ok(json!(true)));
        assert_eq!(eval("args['customer']['tags'][0]", args.clone()), Ok(json!("vip")));
        assert_eq!(eval("args.customer.tags[-1]", args.clone()), Ok(json!("eu")));
        assert!(matches!(
            eval("args.customer.tags[5]", args),
            Err(ConditionError::IndexOutOfRange { index: 5, len: 2 })
        ));
    }

    #[test]
    fn test_membership() {
        let args = json!({"region": "eu-west", "tags": ["a", "b"], "meta": {"k": 1}});
        assert_eq!(eval("args.region in ['eu-west', 'us-east']", args.clone()), Ok(json!(true)));
        assert_eq!(eval("'west' in args.region", args.clone()), Ok(json!(true)));
        assert_eq!(eval("'c' not in args.tags", args.clone()), Ok(json!(true)));
        assert_eq!(eval("'k' in args.meta", args), Ok(json!(true)));
    }

    #[test]
    fn test_logic_short_circuits() {
        // The right-hand side would fail on the missing key if evaluated.
        assert_eq!(
            eval("args.limit != null and args.limit.max > 1", json!({"limit": null})),
            Ok(json!(false))
        );
        assert_eq!(eval("true or args.missing", json!({})), Ok(json!(true)));
    }

    #[test]
    fn test_logic_requires_booleans() {
        assert!(matches!(
            eval("args.amount and true", json!({"amount": 1})),
            Err(ConditionError::TypeMismatch(_))
        ));
        assert!(matches!(
            eval("not args.name", json!({"name": "x"})),
            Err(ConditionError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_chained_comparison() {
        assert_eq!(eval("10 < args.x < 20", json!({"x": 15})), Ok(json!(true)));
        assert_eq!(eval("10 < args.x < 20", json!({"x": 25})), Ok(json!(false)));
    }

    #[test]
    fn test_member_on_scalar_is_an_error() {
        assert!(matches!(
            eval("resource.length > 1", json!({})),
            Err(ConditionError::TypeMismatch(_))
        ));
    }
}
