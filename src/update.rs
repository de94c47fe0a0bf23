use serde_json::{Map, Value};

use crate::document::{remove_field, resolve_path, set_field};
use crate::error::{Error, Result};
use crate::expression::number_to_value;

/// Apply all update operators in `update` to `doc`.
///
/// `update` maps operator names (`$set`, `$push`, ...) to objects of
/// field path → operand. Operators are applied in the order given.
pub fn apply_update(doc: &mut Value, update: &Value) -> Result<()> {
    let obj = update
        .as_object()
        .ok_or_else(|| Error::InvalidQuery("update must be an object".into()))?;
    if obj.is_empty() {
        return Err(Error::InvalidQuery(
            "update must contain at least one operator".into(),
        ));
    }

    for (op, fields) in obj {
        let fields = fields
            .as_object()
            .ok_or_else(|| Error::InvalidQuery(format!("{op} value must be an object")))?;
        if fields.keys().any(|path| path == "_id" || path.starts_with("_id.")) {
            return Err(Error::InvalidQuery(format!("{op} cannot modify _id")));
        }
        match op.as_str() {
            "$set" => apply_set(doc, fields),
            "$unset" => apply_unset(doc, fields),
            "$inc" => apply_inc(doc, fields)?,
            "$push" => apply_push(doc, fields)?,
            _ => {
                return Err(Error::InvalidQuery(format!(
                    "unknown update operator: {op}"
                )));
            }
        }
    }
    Ok(())
}

fn apply_set(doc: &mut Value, fields: &Map<String, Value>) {
    for (path, value) in fields {
        set_field(doc, path, value.clone());
    }
}

fn apply_unset(doc: &mut Value, fields: &Map<String, Value>) {
    for path in fields.keys() {
        remove_field(doc, path);
    }
}

fn apply_inc(doc: &mut Value, fields: &Map<String, Value>) -> Result<()> {
    for (path, inc_val) in fields {
        let inc = inc_val.as_f64().ok_or_else(|| {
            Error::InvalidQuery(format!("$inc value for '{path}' must be numeric"))
        })?;
        let new_val = match resolve_path(doc, path) {
            None | Some(Value::Null) => inc,
            Some(v) => {
                let cur = v.as_f64().ok_or_else(|| {
                    Error::InvalidQuery(format!(
                        "$inc cannot be applied to non-numeric field '{path}'"
                    ))
                })?;
                cur + inc
            }
        };
        set_field(doc, path, number_to_value(new_val));
    }
    Ok(())
}

/// Borrow the array at `path` mutably, creating it when the field is absent.
fn array_at<'a>(doc: &'a mut Value, path: &str, op: &str) -> Result<&'a mut Vec<Value>> {
    if matches!(resolve_path(doc, path), None | Some(Value::Null)) {
        set_field(doc, path, Value::Array(Vec::new()));
    }
    let mut current = doc;
    for part in path.split('.') {
        current = match current {
            Value::Object(map) => map.get_mut(part),
            _ => None,
        }
        .ok_or_else(|| Error::InvalidQuery(format!("{op} cannot traverse '{path}'")))?;
    }
    match current {
        Value::Array(arr) => Ok(arr),
        _ => Err(Error::InvalidQuery(format!(
            "{op} requires field '{path}' to be an array"
        ))),
    }
}

fn apply_push(doc: &mut Value, fields: &Map<String, Value>) -> Result<()> {
    for (path, value) in fields {
        array_at(doc, path, "$push")?.push(value.clone());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn review(user: &str, rating: u8) -> Value {
        json!({"user_id": user, "rating": rating})
    }

    #[test]
    fn push_appends_after_existing_reviews() {
        let mut doc = json!({"product_id": "ELEC001", "reviews": [review("U001", 5), review("U012", 4)]});
        apply_update(&mut doc, &json!({"$push": {"reviews": review("U999", 4)}})).unwrap();
        let reviews = doc["reviews"].as_array().unwrap();
        assert_eq!(reviews.len(), 3);
        assert_eq!(reviews[0]["user_id"], "U001");
        assert_eq!(reviews[1]["user_id"], "U012");
        assert_eq!(reviews[2]["user_id"], "U999");
    }

    #[test]
    fn push_creates_missing_array() {
        let mut doc = json!({"product_id": "NEW"});
        apply_update(&mut doc, &json!({"$push": {"reviews": review("U1", 3)}})).unwrap();
        assert_eq!(doc["reviews"], json!([review("U1", 3)]));
    }

    #[test]
    fn push_onto_scalar_fails() {
        let mut doc = json!({"reviews": "none yet"});
        let err = apply_update(&mut doc, &json!({"$push": {"reviews": 1}})).unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));
        assert_eq!(doc["reviews"], "none yet");
    }

    #[test]
    fn set_unset_inc() {
        let mut doc = json!({"stock": 150, "price": 79999.0});
        apply_update(
            &mut doc,
            &json!({"$inc": {"stock": -5}, "$set": {"price": 74999.0}, "$unset": {"discount": ""}}),
        )
        .unwrap();
        assert_eq!(doc["stock"], 145);
        assert_eq!(doc["price"], 74999.0);

        apply_update(&mut doc, &json!({"$unset": {"price": ""}})).unwrap();
        assert!(doc.get("price").is_none());
    }

    #[test]
    fn rejects_bad_updates() {
        let mut doc = json!({"_id": 1});
        assert!(apply_update(&mut doc, &json!({})).is_err());
        assert!(apply_update(&mut doc, &json!({"$rename": {"a": "b"}})).is_err());
        assert!(apply_update(&mut doc, &json!({"$set": {"_id": 2}})).is_err());
        assert!(apply_update(&mut doc, &json!({"$inc": {"stock": "x"}})).is_err());
        assert_eq!(doc["_id"], 1);
    }
}
