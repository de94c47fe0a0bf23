use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::document::{resolve_or_null, set_field};
use crate::error::{Error, Result};
use crate::expression::{Expression, number_to_value, parse_expression, to_f64};
use crate::projection::Projection;
use crate::query::{self, Query, SortOrder};
use crate::value::IndexValue;

// ---------------------------------------------------------------------------
// Group key & accumulators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum GroupKey {
    Null,
    Expr(Expression),
}

/// Identity of a group. Scalars group by value, so `1` and `1.0` share a
/// group; arrays and objects group by their serialized form.
#[derive(PartialEq, Eq, Hash)]
enum GroupId {
    Scalar(IndexValue),
    Composite(String),
}

impl GroupId {
    fn of(key: &Value) -> Self {
        match key {
            Value::Array(_) | Value::Object(_) => GroupId::Composite(key.to_string()),
            scalar => GroupId::Scalar(IndexValue::from_json(scalar)),
        }
    }
}

#[derive(Debug, Clone)]
enum Accumulator {
    Sum(Expression),
    Avg(Expression),
}

enum AccumulatorState {
    Sum(f64),
    Avg { sum: f64, count: u64 },
}

impl Accumulator {
    fn initial_state(&self) -> AccumulatorState {
        match self {
            Accumulator::Sum(_) => AccumulatorState::Sum(0.0),
            Accumulator::Avg(_) => AccumulatorState::Avg { sum: 0.0, count: 0 },
        }
    }
}

impl AccumulatorState {
    fn feed(&mut self, acc: &Accumulator, doc: &Value) {
        match (acc, self) {
            (Accumulator::Sum(expr), AccumulatorState::Sum(s)) => {
                if let Some(n) = to_f64(&expr.eval(doc)) {
                    *s += n;
                }
            }
            (Accumulator::Avg(expr), AccumulatorState::Avg { sum, count }) => {
                if let Some(n) = to_f64(&expr.eval(doc)) {
                    *sum += n;
                    *count += 1;
                }
            }
            _ => {}
        }
    }

    fn finish(self) -> Value {
        match self {
            AccumulatorState::Sum(s) => number_to_value(s),
            AccumulatorState::Avg { count: 0, .. } => Value::Null,
            AccumulatorState::Avg { sum, count } => number_to_value(sum / count as f64),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline stages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Stage {
    Match { raw: Value, query: Query },
    AddFields(Vec<(String, Expression)>),
    Project(Projection),
    Group {
        key: GroupKey,
        accumulators: Vec<(String, Accumulator)>,
    },
    Sort(Vec<(String, SortOrder)>),
}

/// A parsed aggregation pipeline.
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

// ---------------------------------------------------------------------------
// Stage parsing
// ---------------------------------------------------------------------------

fn pipeline_err(e: Error) -> Error {
    match e {
        Error::InvalidQuery(msg) => Error::InvalidPipeline(msg),
        other => other,
    }
}

fn parse_accumulator(val: &Value) -> Result<Accumulator> {
    let (op, arg) = match val.as_object() {
        Some(obj) if obj.len() == 1 => obj.iter().next(),
        _ => None,
    }
    .ok_or_else(|| {
        Error::InvalidPipeline("accumulator must be an object with exactly one operator".into())
    })?;
    let expr = parse_expression(arg).map_err(pipeline_err)?;
    match op.as_str() {
        "$sum" => Ok(Accumulator::Sum(expr)),
        "$avg" => Ok(Accumulator::Avg(expr)),
        _ => Err(Error::InvalidPipeline(format!("unknown accumulator: {op}"))),
    }
}

fn parse_group_stage(val: &Value) -> Result<Stage> {
    let obj = val
        .as_object()
        .ok_or_else(|| Error::InvalidPipeline("$group must be an object".into()))?;

    let id_val = obj
        .get("_id")
        .ok_or_else(|| Error::InvalidPipeline("$group requires '_id' field".into()))?;

    let key = match id_val {
        Value::Null => GroupKey::Null,
        other => GroupKey::Expr(parse_expression(other).map_err(pipeline_err)?),
    };

    let accumulators = obj
        .iter()
        .filter(|(name, _)| *name != "_id")
        .map(|(name, spec)| Ok((name.clone(), parse_accumulator(spec)?)))
        .collect::<Result<Vec<_>>>()?;

    Ok(Stage::Group { key, accumulators })
}

fn parse_sort(val: &Value) -> Result<Vec<(String, SortOrder)>> {
    let obj = val
        .as_object()
        .filter(|o| !o.is_empty())
        .ok_or_else(|| Error::InvalidPipeline("$sort must be a non-empty object".into()))?;
    obj.iter()
        .map(|(field, dir)| {
            SortOrder::from_json(dir)
                .map(|order| (field.clone(), order))
                .ok_or_else(|| Error::InvalidPipeline("sort direction must be 1 or -1".into()))
        })
        .collect()
}

fn parse_stage(name: &str, body: &Value) -> Result<Stage> {
    let stage = match name {
        "$match" => Stage::Match {
            raw: body.clone(),
            query: query::parse_query(body).map_err(pipeline_err)?,
        },
        "$addFields" | "$set" => {
            let obj = body
                .as_object()
                .ok_or_else(|| Error::InvalidPipeline(format!("{name} must be an object")))?;
            let fields = obj
                .iter()
                .map(|(k, v)| Ok((k.clone(), parse_expression(v).map_err(pipeline_err)?)))
                .collect::<Result<Vec<_>>>()?;
            Stage::AddFields(fields)
        }
        "$project" => Stage::Project(Projection::parse(body).map_err(pipeline_err)?),
        "$group" => parse_group_stage(body)?,
        "$sort" => Stage::Sort(parse_sort(body)?),
        _ => return Err(Error::InvalidPipeline(format!("unknown stage: {name}"))),
    };
    Ok(stage)
}

// ---------------------------------------------------------------------------
// Stage execution
// ---------------------------------------------------------------------------

fn exec_group(
    docs: Vec<Value>,
    key: &GroupKey,
    accumulators: &[(String, Accumulator)],
) -> Vec<Value> {
    // Output keeps first-seen order; the first key seen names the group.
    let mut groups: HashMap<GroupId, usize> = HashMap::new();
    let mut ordered: Vec<(Value, Vec<AccumulatorState>)> = Vec::new();

    for doc in &docs {
        let key_val = match key {
            GroupKey::Null => Value::Null,
            GroupKey::Expr(expr) => expr.eval(doc),
        };

        let slot = *groups.entry(GroupId::of(&key_val)).or_insert_with(|| {
            let initial = accumulators.iter().map(|(_, acc)| acc.initial_state()).collect();
            ordered.push((key_val, initial));
            ordered.len() - 1
        });

        let states = &mut ordered[slot].1;
        for ((_, acc), state) in accumulators.iter().zip(states.iter_mut()) {
            state.feed(acc, doc);
        }
    }

    ordered
        .into_iter()
        .map(|(key_val, states)| {
            let mut out = Map::new();
            out.insert("_id".to_string(), key_val);
            for ((name, _), state) in accumulators.iter().zip(states) {
                out.insert(name.clone(), state.finish());
            }
            Value::Object(out)
        })
        .collect()
}

/// Stable, type-aware sort; ties keep their input order.
pub(crate) fn sort_docs(docs: &mut [Value], sort_fields: &[(String, SortOrder)]) {
    docs.sort_by(|a, b| {
        for (field, order) in sort_fields {
            let av = IndexValue::from_json(&resolve_or_null(a, field));
            let bv = IndexValue::from_json(&resolve_or_null(b, field));
            let cmp = match order {
                SortOrder::Asc => av.cmp(&bv),
                SortOrder::Desc => bv.cmp(&av),
            };
            if cmp.is_ne() {
                return cmp;
            }
        }
        std::cmp::Ordering::Equal
    });
}

impl Pipeline {
    pub fn parse(pipeline_json: &Value) -> Result<Self> {
        let arr = pipeline_json
            .as_array()
            .ok_or_else(|| Error::InvalidPipeline("pipeline must be an array".into()))?;

        let stages = arr
            .iter()
            .map(|stage_val| {
                let (name, body) = match stage_val.as_object() {
                    Some(obj) if obj.len() == 1 => obj.iter().next(),
                    _ => None,
                }
                .ok_or_else(|| {
                    Error::InvalidPipeline(
                        "each pipeline stage must be an object with exactly one key".into(),
                    )
                })?;
                parse_stage(name, body)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Pipeline { stages })
    }

    /// If the first stage is `$match`, return its filter and the index to
    /// start execution from, so the collection can apply it while scanning.
    pub fn take_leading_match(&self) -> (Option<&Value>, usize) {
        match self.stages.first() {
            Some(Stage::Match { raw, .. }) => (Some(raw), 1),
            _ => (None, 0),
        }
    }

    pub fn execute(&self, docs: Vec<Value>) -> Vec<Value> {
        self.execute_from(0, docs)
    }

    pub fn execute_from(&self, start: usize, docs: Vec<Value>) -> Vec<Value> {
        let mut current = docs;
        for stage in self.stages.iter().skip(start) {
            current = match stage {
                Stage::Match { query, .. } => current
                    .into_iter()
                    .filter(|doc| query::matches_value(query, doc))
                    .collect(),
                Stage::AddFields(fields) => current
                    .into_iter()
                    .map(|mut doc| {
                        for (name, expr) in fields {
                            let val = expr.eval(&doc);
                            set_field(&mut doc, name, val);
                        }
                        doc
                    })
                    .collect(),
                Stage::Project(projection) => {
                    current.iter().map(|doc| projection.apply(doc)).collect()
                }
                Stage::Group { key, accumulators } => exec_group(current, key, accumulators),
                Stage::Sort(fields) => {
                    sort_docs(&mut current, fields);
                    current
                }
            };
        }
        current
    }
}
