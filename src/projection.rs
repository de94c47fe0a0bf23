use serde_json::{Map, Value};

use crate::document::{remove_field, resolve_path, set_field};
use crate::error::{Error, Result};
use crate::expression::{Expression, parse_expression};

#[derive(Debug, Clone)]
enum ProjectionField {
    Include,
    Exclude,
    Compute(Expression),
}

/// Field selection applied to `find` results and by the `$project` stage.
///
/// Inclusion mode keeps only the listed fields plus `_id` (unless `_id: 0`).
/// Exclusion mode keeps everything except the listed fields. The two cannot be
/// mixed, apart from excluding `_id` in an inclusion projection.
#[derive(Debug, Clone, Default)]
pub struct Projection {
    fields: Vec<(String, ProjectionField)>,
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of `{field: 1}`. Unlike [`Projection::parse`], the builder
    /// does not reject a mix: once any field is included, exclusions other
    /// than `_id` have no effect.
    pub fn include(mut self, field: impl Into<String>) -> Self {
        self.fields.push((field.into(), ProjectionField::Include));
        self
    }

    /// Builder form of `{field: 0}`; see [`Projection::include`].
    pub fn exclude(mut self, field: impl Into<String>) -> Self {
        self.fields.push((field.into(), ProjectionField::Exclude));
        self
    }

    /// Parse `{"name": 1, "price": 1, "_id": 0}`. Values other than 0/1/bool
    /// are computed expressions.
    pub fn parse(spec: &Value) -> Result<Self> {
        let obj = spec
            .as_object()
            .ok_or_else(|| Error::InvalidQuery("projection must be an object".into()))?;
        let mut fields = Vec::with_capacity(obj.len());
        for (field, val) in obj {
            let pf = match val {
                Value::Number(n) if n.as_f64() == Some(1.0) => ProjectionField::Include,
                Value::Number(n) if n.as_f64() == Some(0.0) => ProjectionField::Exclude,
                Value::Bool(true) => ProjectionField::Include,
                Value::Bool(false) => ProjectionField::Exclude,
                _ => ProjectionField::Compute(parse_expression(val)?),
            };
            fields.push((field.clone(), pf));
        }
        let projection = Self { fields };
        projection.validate()?;
        Ok(projection)
    }

    fn validate(&self) -> Result<()> {
        let excludes_other = self
            .fields
            .iter()
            .any(|(name, pf)| name != "_id" && matches!(pf, ProjectionField::Exclude));
        if excludes_other && self.is_inclusion() {
            return Err(Error::InvalidQuery(
                "projection cannot mix inclusion and exclusion".into(),
            ));
        }
        Ok(())
    }

    fn is_inclusion(&self) -> bool {
        self.fields
            .iter()
            .any(|(_, pf)| !matches!(pf, ProjectionField::Exclude))
    }

    pub fn apply(&self, doc: &Value) -> Value {
        if !self.is_inclusion() {
            let mut result = doc.clone();
            for (name, _) in &self.fields {
                remove_field(&mut result, name);
            }
            return result;
        }

        let mut result = Value::Object(Map::new());
        let id_excluded = self
            .fields
            .iter()
            .any(|(name, pf)| name == "_id" && matches!(pf, ProjectionField::Exclude));
        if !id_excluded {
            if let Some(id) = doc.get("_id") {
                set_field(&mut result, "_id", id.clone());
            }
        }
        for (name, pf) in &self.fields {
            match pf {
                ProjectionField::Include => {
                    if let Some(val) = resolve_path(doc, name) {
                        set_field(&mut result, name, val);
                    }
                }
                ProjectionField::Compute(expr) => set_field(&mut result, name, expr.eval(doc)),
                ProjectionField::Exclude => {}
            }
        }
        result
    }
}
