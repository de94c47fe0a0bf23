use serde_json::{Number, Value};

use crate::document::resolve_or_null;
use crate::error::{Error, Result};
use crate::value::IndexValue;

/// Reducers usable both as expression operators over arrays
/// (`{"$avg": "$reviews.rating"}`) and as `$group` accumulators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reducer {
    Sum,
    Avg,
    Min,
    Max,
}

#[derive(Debug, Clone)]
pub(crate) enum Expression {
    Literal(Value),
    FieldRef(String),
    Add(Vec<Expression>),
    Subtract(Box<Expression>, Box<Expression>),
    Multiply(Vec<Expression>),
    Divide(Box<Expression>, Box<Expression>),
    Reduce(Reducer, Vec<Expression>),
    Size(Box<Expression>),
}

pub(crate) fn to_f64(v: &Value) -> Option<f64> {
    v.as_f64()
}

/// Whole floats come back as integers so counts and sums print as `3`, not `3.0`.
pub(crate) fn number_to_value(n: f64) -> Value {
    if n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 {
        Value::Number((n as i64).into())
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

fn binary_args(op: &str, arg: &Value) -> Result<(Box<Expression>, Box<Expression>)> {
    match arg.as_array().map(Vec::as_slice) {
        Some([a, b]) => Ok((
            Box::new(parse_expression(a)?),
            Box::new(parse_expression(b)?),
        )),
        _ => Err(Error::InvalidPipeline(format!(
            "{op} requires an array of exactly 2 arguments"
        ))),
    }
}

fn list_args(op: &str, arg: &Value) -> Result<Vec<Expression>> {
    let arr = arg
        .as_array()
        .ok_or_else(|| Error::InvalidPipeline(format!("{op} requires an array")))?;
    arr.iter().map(parse_expression).collect()
}

/// Reducer operators take either a single operand or a list of operands.
fn reducer_args(arg: &Value) -> Result<Vec<Expression>> {
    match arg {
        Value::Array(items) => items.iter().map(parse_expression).collect(),
        single => Ok(vec![parse_expression(single)?]),
    }
}

pub(crate) fn parse_expression(val: &Value) -> Result<Expression> {
    match val {
        Value::String(s) if s.starts_with('$') => Ok(Expression::FieldRef(s[1..].to_string())),
        Value::Object(map) if map.len() == 1 => {
            let Some((key, arg)) = map.iter().next() else {
                return Ok(Expression::Literal(val.clone()));
            };
            match key.as_str() {
                "$add" => Ok(Expression::Add(list_args(key, arg)?)),
                "$multiply" => Ok(Expression::Multiply(list_args(key, arg)?)),
                "$subtract" => {
                    let (a, b) = binary_args(key, arg)?;
                    Ok(Expression::Subtract(a, b))
                }
                "$divide" => {
                    let (a, b) = binary_args(key, arg)?;
                    Ok(Expression::Divide(a, b))
                }
                "$sum" => Ok(Expression::Reduce(Reducer::Sum, reducer_args(arg)?)),
                "$avg" => Ok(Expression::Reduce(Reducer::Avg, reducer_args(arg)?)),
                "$min" => Ok(Expression::Reduce(Reducer::Min, reducer_args(arg)?)),
                "$max" => Ok(Expression::Reduce(Reducer::Max, reducer_args(arg)?)),
                "$size" => Ok(Expression::Size(Box::new(parse_expression(arg)?))),
                "$literal" => Ok(Expression::Literal(arg.clone())),
                op if op.starts_with('$') => Err(Error::InvalidPipeline(format!(
                    "unknown expression operator: {op}"
                ))),
                _ => Ok(Expression::Literal(val.clone())),
            }
        }
        _ => Ok(Expression::Literal(val.clone())),
    }
}

impl Expression {
    pub(crate) fn eval(&self, doc: &Value) -> Value {
        match self {
            Expression::Literal(v) => v.clone(),
            Expression::FieldRef(path) => resolve_or_null(doc, path),
            Expression::Add(exprs) => {
                let mut sum = 0.0_f64;
                for e in exprs {
                    match to_f64(&e.eval(doc)) {
                        Some(n) => sum += n,
                        None => return Value::Null,
                    }
                }
                number_to_value(sum)
            }
            Expression::Subtract(a, b) => match (to_f64(&a.eval(doc)), to_f64(&b.eval(doc))) {
                (Some(a), Some(b)) => number_to_value(a - b),
                _ => Value::Null,
            },
            Expression::Multiply(exprs) => {
                let mut product = 1.0_f64;
                for e in exprs {
                    match to_f64(&e.eval(doc)) {
                        Some(n) => product *= n,
                        None => return Value::Null,
                    }
                }
                number_to_value(product)
            }
            Expression::Divide(a, b) => match (to_f64(&a.eval(doc)), to_f64(&b.eval(doc))) {
                (Some(a), Some(b)) if b != 0.0 => number_to_value(a / b),
                _ => Value::Null,
            },
            Expression::Reduce(reducer, args) => {
                // A single operand that evaluates to an array is reduced over
                // its elements; otherwise each operand is one input.
                let inputs: Vec<Value> = match args.as_slice() {
                    [single] => match single.eval(doc) {
                        Value::Array(items) => items,
                        other => vec![other],
                    },
                    many => many.iter().map(|e| e.eval(doc)).collect(),
                };
                reduce(*reducer, &inputs)
            }
            Expression::Size(inner) => match inner.eval(doc) {
                Value::Array(items) => Value::Number(items.len().into()),
                _ => Value::Null,
            },
        }
    }
}

/// Reduce a list of values. Non-numeric inputs are ignored by `$sum` and
/// `$avg`; `$avg` of no numbers is `null`, `$sum` of no numbers is `0`.
pub(crate) fn reduce(reducer: Reducer, inputs: &[Value]) -> Value {
    match reducer {
        Reducer::Sum => number_to_value(inputs.iter().filter_map(to_f64).sum()),
        Reducer::Avg => {
            let nums: Vec<f64> = inputs.iter().filter_map(to_f64).collect();
            if nums.is_empty() {
                Value::Null
            } else {
                number_to_value(nums.iter().sum::<f64>() / nums.len() as f64)
            }
        }
        Reducer::Min | Reducer::Max => inputs
            .iter()
            .filter(|v| !v.is_null())
            .map(|v| (IndexValue::from_json(v), v))
            .reduce(|best, next| {
                let keep_next = match reducer {
                    Reducer::Min => next.0 < best.0,
                    _ => next.0 > best.0,
                };
                if keep_next { next } else { best }
            })
            .map(|(_, v)| v.clone())
            .unwrap_or(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(expr: Value, doc: Value) -> Value {
        parse_expression(&expr).unwrap().eval(&doc)
    }

    #[test]
    fn field_ref_and_missing_field() {
        let doc = json!({"name": "Sony WH-1000XM5 Headphones"});
        assert_eq!(eval(json!("$name"), doc.clone()), json!("Sony WH-1000XM5 Headphones"));
        assert_eq!(eval(json!("$missing"), doc), Value::Null);
    }

    #[test]
    fn avg_over_embedded_array() {
        let doc = json!({"reviews": [{"rating": 5}, {"rating": 4}]});
        assert_eq!(eval(json!({"$avg": "$reviews.rating"}), doc), json!(4.5));
    }

    #[test]
    fn avg_of_empty_array_is_null_not_zero() {
        let doc = json!({"reviews": []});
        assert_eq!(eval(json!({"$avg": "$reviews.rating"}), doc), Value::Null);
        assert_eq!(eval(json!({"$avg": "$reviews.rating"}), json!({})), Value::Null);
    }

    #[test]
    fn avg_of_whole_ratings_is_integer() {
        let doc = json!({"reviews": [{"rating": 4}, {"rating": 4}]});
        assert_eq!(eval(json!({"$avg": "$reviews.rating"}), doc), json!(4));
    }

    #[test]
    fn sum_min_max_size() {
        let doc = json!({"stock": [150, 45, 200]});
        assert_eq!(eval(json!({"$sum": "$stock"}), doc.clone()), json!(395));
        assert_eq!(eval(json!({"$min": "$stock"}), doc.clone()), json!(45));
        assert_eq!(eval(json!({"$max": "$stock"}), doc.clone()), json!(200));
        assert_eq!(eval(json!({"$size": "$stock"}), doc), json!(3));
        assert_eq!(eval(json!({"$sum": "$missing"}), json!({})), json!(0));
    }

    #[test]
    fn reducer_with_operand_list() {
        let doc = json!({"a": 2, "b": 6});
        assert_eq!(eval(json!({"$avg": ["$a", "$b"]}), doc), json!(4));
    }

    #[test]
    fn arithmetic() {
        let doc = json!({"price": 79999.0, "stock": 150});
        assert_eq!(
            eval(json!({"$multiply": ["$price", "$stock"]}), doc.clone()),
            json!(11999850)
        );
        assert_eq!(eval(json!({"$subtract": ["$stock", 50]}), doc.clone()), json!(100));
        assert_eq!(eval(json!({"$divide": ["$stock", 0]}), doc.clone()), Value::Null);
        assert_eq!(eval(json!({"$add": ["$stock", "$missing"]}), doc), Value::Null);
    }

    #[test]
    fn unknown_operator_is_rejected() {
        assert!(matches!(
            parse_expression(&json!({"$median": "$price"})),
            Err(Error::InvalidPipeline(_))
        ));
        assert!(matches!(
            parse_expression(&json!({"$divide": [1]})),
            Err(Error::InvalidPipeline(_))
        ));
    }
}
