use serde_json::Value as JsonValue;

use crate::document::resolve_path;
use crate::error::{Error, Result};
use crate::projection::Projection;
use crate::value::IndexValue;

// ---------------------------------------------------------------------------
// Find options: projection / sort / skip / limit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub(crate) fn from_json(dir: &JsonValue) -> Option<Self> {
        match dir.as_i64() {
            Some(1) => Some(SortOrder::Asc),
            Some(-1) => Some(SortOrder::Desc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub projection: Option<Projection>,
    pub sort: Option<Vec<(String, SortOrder)>>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

impl FindOptions {
    pub fn projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort.get_or_insert_with(Vec::new).push((field.into(), order));
        self
    }

    pub fn skip(mut self, n: u64) -> Self {
        self.skip = Some(n);
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }
}

// ---------------------------------------------------------------------------
// Query AST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum QueryOp {
    Eq(IndexValue),
    Ne(IndexValue),
    Gt(IndexValue),
    Gte(IndexValue),
    Lt(IndexValue),
    Lte(IndexValue),
    In(Vec<IndexValue>),
    Exists(bool),
}

#[derive(Debug, Clone)]
pub enum Query {
    Field { field: String, op: QueryOp },
    And(Vec<Query>),
    Or(Vec<Query>),
    All,
}

// ---------------------------------------------------------------------------
// Parsing: JSON → Query AST
// ---------------------------------------------------------------------------

pub fn parse_query(query: &JsonValue) -> Result<Query> {
    let obj = query
        .as_object()
        .ok_or_else(|| Error::InvalidQuery("query must be a JSON object".into()))?;

    let mut conditions: Vec<Query> = Vec::new();

    for (key, value) in obj {
        match key.as_str() {
            "$and" | "$or" => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| Error::InvalidQuery(format!("{key} must be an array")))?;
                let subs = arr.iter().map(parse_query).collect::<Result<Vec<_>>>()?;
                conditions.push(if key == "$and" {
                    Query::And(subs)
                } else {
                    Query::Or(subs)
                });
            }
            op if op.starts_with('$') => {
                return Err(Error::InvalidQuery(format!(
                    "unknown top-level operator: {op}"
                )));
            }
            field => match value.as_object() {
                // Operator object: {"price": {"$lt": 50000}}
                Some(ops) if ops.keys().any(|k| k.starts_with('$')) => {
                    for (op_key, op_val) in ops {
                        conditions.push(Query::Field {
                            field: field.to_string(),
                            op: parse_op(op_key, op_val)?,
                        });
                    }
                }
                _ => conditions.push(Query::Field {
                    field: field.to_string(),
                    op: QueryOp::Eq(IndexValue::from_json(value)),
                }),
            },
        }
    }

    Ok(match conditions.len() {
        0 => Query::All,
        1 => conditions.remove(0),
        _ => Query::And(conditions),
    })
}

fn parse_op(op_key: &str, op_val: &JsonValue) -> Result<QueryOp> {
    match op_key {
        "$eq" => Ok(QueryOp::Eq(IndexValue::from_json(op_val))),
        "$ne" => Ok(QueryOp::Ne(IndexValue::from_json(op_val))),
        "$gt" => Ok(QueryOp::Gt(IndexValue::from_json(op_val))),
        "$gte" => Ok(QueryOp::Gte(IndexValue::from_json(op_val))),
        "$lt" => Ok(QueryOp::Lt(IndexValue::from_json(op_val))),
        "$lte" => Ok(QueryOp::Lte(IndexValue::from_json(op_val))),
        "$in" => {
            let arr = op_val
                .as_array()
                .ok_or_else(|| Error::InvalidQuery("$in must be an array".into()))?;
            Ok(QueryOp::In(arr.iter().map(IndexValue::from_json).collect()))
        }
        "$exists" => {
            let b = op_val
                .as_bool()
                .ok_or_else(|| Error::InvalidQuery("$exists must be a boolean".into()))?;
            Ok(QueryOp::Exists(b))
        }
        _ => Err(Error::InvalidQuery(format!("unknown operator: {op_key}"))),
    }
}

// ---------------------------------------------------------------------------
// Filter: evaluate a query against a single document
// ---------------------------------------------------------------------------

pub fn matches_value(query: &Query, data: &JsonValue) -> bool {
    match query {
        Query::All => true,
        Query::Field { field, op } => matches_op(op, resolve_path(data, field).as_ref()),
        Query::And(subs) => subs.iter().all(|s| matches_value(s, data)),
        Query::Or(subs) => subs.iter().any(|s| matches_value(s, data)),
    }
}

fn matches_op(op: &QueryOp, field_val: Option<&JsonValue>) -> bool {
    match op {
        QueryOp::Exists(expected) => field_val.is_some() == *expected,
        QueryOp::Ne(v) => !matches_op(&QueryOp::Eq(v.clone()), field_val),
        _ => match field_val {
            None => false,
            // Array fields match when any element does; equality also
            // compares against the array as a whole.
            Some(whole @ JsonValue::Array(items)) => {
                items.iter().any(|item| matches_scalar(op, item))
                    || (matches!(op, QueryOp::Eq(_) | QueryOp::In(_))
                        && matches_scalar(op, whole))
            }
            Some(val) => matches_scalar(op, val),
        },
    }
}

fn matches_scalar(op: &QueryOp, val: &JsonValue) -> bool {
    let iv = IndexValue::from_json(val);
    match op {
        QueryOp::Eq(v) => iv == *v,
        QueryOp::In(vals) => vals.contains(&iv),
        QueryOp::Gt(v) => same_kind(&iv, v) && iv > *v,
        QueryOp::Gte(v) => same_kind(&iv, v) && iv >= *v,
        QueryOp::Lt(v) => same_kind(&iv, v) && iv < *v,
        QueryOp::Lte(v) => same_kind(&iv, v) && iv <= *v,
        QueryOp::Ne(_) | QueryOp::Exists(_) => false,
    }
}

/// Range operators only compare within a type bracket: a null or string
/// price is neither below nor above a numeric bound.
fn same_kind(a: &IndexValue, b: &IndexValue) -> bool {
    use IndexValue::*;
    matches!(
        (a, b),
        (Integer(_) | Float(_), Integer(_) | Float(_))
            | (Boolean(_), Boolean(_))
            | (DateTime(_), DateTime(_))
            | (String(_), String(_))
    )
}
