//! Selector evaluation, sorting, and projection over JSON documents.
//!
//! Follows the server's matching rules: a missing field matches nothing but
//! `{"$exists": false}`, values compare by collation, and `$allMatch` needs
//! a non-empty array.

use std::cmp::Ordering;

use regex::Regex;
use serde_json::{Map, Value as Json};
use sofa_common::types::Value;
use sofa_common::utils::error::{DatabaseError, Result};

/// Returns true if `doc` matches `selector`.
pub(crate) fn matches(doc: &Json, selector: &Json) -> Result<bool> {
    matches_condition(Some(doc), selector)
}

/// Evaluates `condition` against a value that may be missing.
fn matches_condition(value: Option<&Json>, condition: &Json) -> Result<bool> {
    let Json::Object(entries) = condition else {
        // A bare value is shorthand for equality.
        return Ok(value.is_some_and(|v| collate(v, condition) == Ordering::Equal));
    };

    let Some(value) = value else {
        return Ok(only_requires_absence(entries));
    };

    for (key, argument) in entries {
        let matched = if key.starts_with('$') {
            apply_operator(key, value, argument)?
        } else {
            matches_condition(lookup(value, key), argument)?
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn only_requires_absence(entries: &Map<String, Json>) -> bool {
    !entries.is_empty()
        && entries
            .iter()
            .all(|(key, argument)| key == "$exists" && argument == &Json::Bool(false))
}

fn apply_operator(op: &str, value: &Json, argument: &Json) -> Result<bool> {
    let result = match op {
        "$and" => {
            for condition in conditions(op, argument)? {
                if !matches_condition(Some(value), condition)? {
                    return Ok(false);
                }
            }
            true
        }
        "$or" => {
            for condition in conditions(op, argument)? {
                if matches_condition(Some(value), condition)? {
                    return Ok(true);
                }
            }
            false
        }
        "$nor" => {
            for condition in conditions(op, argument)? {
                if matches_condition(Some(value), condition)? {
                    return Ok(false);
                }
            }
            true
        }
        "$not" => !matches_condition(Some(value), argument)?,
        "$eq" => collate(value, argument) == Ordering::Equal,
        "$ne" => collate(value, argument) != Ordering::Equal,
        "$lt" => collate(value, argument) == Ordering::Less,
        "$lte" => collate(value, argument) != Ordering::Greater,
        "$gt" => collate(value, argument) == Ordering::Greater,
        "$gte" => collate(value, argument) != Ordering::Less,
        "$in" => {
            let set = array(op, argument)?;
            match value {
                Json::Array(items) => items.iter().any(|item| contains(set, item)),
                other => contains(set, other),
            }
        }
        "$nin" => {
            let set = array(op, argument)?;
            match value {
                Json::Array(items) => !items.iter().any(|item| contains(set, item)),
                other => !contains(set, other),
            }
        }
        "$all" => {
            let required = array(op, argument)?;
            match value {
                Json::Array(items) => required.iter().all(|needle| contains(items, needle)),
                _ => false,
            }
        }
        "$elemMatch" => match value {
            Json::Array(items) => {
                let mut found = false;
                for item in items {
                    if matches_condition(Some(item), argument)? {
                        found = true;
                        break;
                    }
                }
                found
            }
            _ => false,
        },
        "$allMatch" => match value {
            Json::Array(items) if !items.is_empty() => {
                let mut all = true;
                for item in items {
                    if !matches_condition(Some(item), argument)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            _ => false,
        },
        "$exists" => argument.as_bool().ok_or_else(|| bad_argument(op, "a boolean"))?,
        "$type" => {
            let name = argument.as_str().ok_or_else(|| bad_argument(op, "a type name"))?;
            Value::from(value.clone()).json_type().as_str() == name
        }
        "$size" => {
            let size = argument.as_u64().ok_or_else(|| bad_argument(op, "an integer"))?;
            value.as_array().is_some_and(|items| items.len() as u64 == size)
        }
        "$mod" => {
            let pair = array(op, argument)?;
            let (Some(divisor), Some(remainder)) = (
                pair.first().and_then(Json::as_i64),
                pair.get(1).and_then(Json::as_i64),
            ) else {
                return Err(bad_argument(op, "[divisor, remainder]").into());
            };
            if pair.len() != 2 || divisor == 0 {
                return Err(bad_argument(op, "[divisor, remainder]").into());
            }
            value.as_i64().is_some_and(|v| v % divisor == remainder)
        }
        "$regex" => {
            let pattern = argument.as_str().ok_or_else(|| bad_argument(op, "a pattern"))?;
            let regex = Regex::new(pattern)
                .map_err(|e| DatabaseError::from_response(400, "invalid_regex", &e.to_string()))?;
            value.as_str().is_some_and(|s| regex.is_match(s))
        }
        other => {
            return Err(DatabaseError::from_response(
                400,
                "invalid_operator",
                &format!("Invalid operator: {other}"),
            )
            .into());
        }
    };
    Ok(result)
}

fn conditions<'j>(op: &str, argument: &'j Json) -> Result<&'j [Json]> {
    argument
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| bad_argument(op, "an array of selectors").into())
}

fn array<'j>(op: &str, argument: &'j Json) -> Result<&'j [Json]> {
    argument
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| bad_argument(op, "an array").into())
}

fn bad_argument(op: &str, expected: &str) -> DatabaseError {
    DatabaseError::from_response(
        400,
        "bad_request",
        &format!("{op} expects {expected}"),
    )
}

fn contains(set: &[Json], needle: &Json) -> bool {
    set.iter().any(|item| collate(item, needle) == Ordering::Equal)
}

/// Compares two JSON values by collation.
pub(crate) fn collate(a: &Json, b: &Json) -> Ordering {
    Value::from(a.clone()).collate(&Value::from(b.clone()))
}

/// Follows a dotted path into a JSON value.
pub(crate) fn lookup<'j>(value: &'j Json, path: &str) -> Option<&'j Json> {
    path.split('.')
        .try_fold(value, |current, segment| current.as_object()?.get(segment))
}

/// One `sort` entry: field and whether it is descending.
pub(crate) fn sort_keys(sort: &Json) -> Result<Vec<(String, bool)>> {
    let entries = array("sort", sort)?;
    entries
        .iter()
        .map(|entry| match entry {
            Json::String(field) => Ok((field.clone(), false)),
            Json::Object(map) if map.len() == 1 => {
                let (field, direction) = map
                    .iter()
                    .next()
                    .ok_or_else(|| bad_argument("sort", "a field"))?;
                match direction.as_str() {
                    Some("asc") => Ok((field.clone(), false)),
                    Some("desc") => Ok((field.clone(), true)),
                    _ => Err(bad_argument("sort", "\"asc\" or \"desc\"").into()),
                }
            }
            _ => Err(bad_argument("sort", "field names or {field: direction}").into()),
        })
        .collect()
}

/// Sorts documents in place. The sort is stable; missing fields sort first.
pub(crate) fn sort(docs: &mut [Json], keys: &[(String, bool)]) {
    docs.sort_by(|a, b| {
        for (field, descending) in keys {
            let ordering = match (lookup(a, field), lookup(b, field)) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(x), Some(y)) => collate(x, y),
            };
            let ordering = if *descending {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

/// Keeps only the listed dotted fields of a document.
pub(crate) fn project(doc: &Json, fields: &[String]) -> Json {
    let mut projected = Map::new();
    for field in fields {
        let Some(value) = lookup(doc, field) else {
            continue;
        };
        let segments: Vec<&str> = field.split('.').collect();
        insert_path(&mut projected, &segments, value.clone());
    }
    Json::Object(projected)
}

fn insert_path(target: &mut Map<String, Json>, segments: &[&str], value: Json) {
    match segments {
        [] => {}
        [last] => {
            target.insert((*last).to_string(), value);
        }
        [first, rest @ ..] => {
            let child = target
                .entry((*first).to_string())
                .or_insert_with(|| Json::Object(Map::new()));
            if let Json::Object(child) = child {
                insert_path(child, rest, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn luke() -> Json {
        json!({
            "_id": "luke",
            "name": "Luke",
            "age": 19,
            "isJedi": true,
            "vehicle": {"model": "X-wing"},
            "ranks": [3, 5, 8],
            "friends": [{"name": "Leia"}, {"name": "Han"}]
        })
    }

    fn check(selector: Json) -> bool {
        matches(&luke(), &selector).unwrap()
    }

    #[test]
    fn test_implicit_and_explicit_equality() {
        assert!(check(json!({})));
        assert!(check(json!({"name": "Luke"})));
        assert!(check(json!({"age": {"$eq": 19.0}})));
        assert!(check(json!({"vehicle.model": "X-wing"})));
        assert!(check(json!({"vehicle": {"model": "X-wing"}})));
        assert!(!check(json!({"name": "Leia"})));
    }

    #[test]
    fn test_missing_fields() {
        assert!(!check(json!({"surname": {"$ne": "Solo"}})));
        assert!(check(json!({"surname": {"$exists": false}})));
        assert!(check(json!({"name": {"$exists": true}})));
        assert!(!check(json!({"_id": {"$exists": false}})));
    }

    #[test]
    fn test_ranges_and_sets() {
        assert!(check(json!({"age": {"$gte": 18, "$lt": 20}})));
        assert!(!check(json!({"age": {"$gt": 19}})));
        assert!(check(json!({"name": {"$in": ["Luke", "Leia"]}})));
        assert!(check(json!({"name": {"$nin": ["Han"]}})));
        assert!(check(json!({"ranks": {"$in": [8]}})));
        assert!(check(json!({"ranks": {"$all": [3, 8]}})));
        assert!(!check(json!({"ranks": {"$all": [3, 4]}})));
    }

    #[test]
    fn test_logical_operators() {
        assert!(check(json!({"$and": [{"name": "Luke"}, {"isJedi": true}]})));
        assert!(check(json!({"$or": [{"name": "Leia"}, {"age": 19}]})));
        assert!(check(json!({"$nor": [{"name": "Leia"}, {"name": "Han"}]})));
        assert!(check(json!({"$not": {"age": {"$lt": 18}}})));
        assert!(!check(json!({"$not": {}})));
    }

    #[test]
    fn test_array_operators() {
        assert!(check(json!({"ranks": {"$elemMatch": {"$gt": 7}}})));
        assert!(check(json!({"ranks": {"$allMatch": {"$gt": 2}}})));
        assert!(check(json!({"friends": {"$elemMatch": {"name": "Han"}}})));
        assert!(check(json!({"ranks": {"$size": 3}})));
        assert!(!check(json!({"ranks": {"$allMatch": {"$gt": 3}}})));
        assert!(!matches(&json!({"ranks": []}), &json!({"ranks": {"$allMatch": {}}})).unwrap());
    }

    #[test]
    fn test_type_mod_regex() {
        assert!(check(json!({"vehicle": {"$type": "object"}})));
        assert!(check(json!({"age": {"$type": "number"}})));
        assert!(check(json!({"age": {"$mod": [2, 1]}})));
        assert!(check(json!({"name": {"$regex": "^Lu"}})));
        assert!(!check(json!({"age": {"$regex": "19"}})));
    }

    #[test]
    fn test_malformed_selectors_are_rejected() {
        assert!(matches(&luke(), &json!({"age": {"$near": 1}})).is_err());
        assert!(matches(&luke(), &json!({"age": {"$mod": [0, 1]}})).is_err());
        assert!(matches(&luke(), &json!({"name": {"$regex": "("}})).is_err());
        assert!(matches(&luke(), &json!({"$and": {"name": "Luke"}})).is_err());
    }

    #[test]
    fn test_sort_and_project() {
        let mut docs = vec![
            json!({"name": "Yoda", "age": 900}),
            json!({"name": "Luke", "age": 19}),
            json!({"name": "Anakin", "age": 19}),
        ];
        sort(&mut docs, &sort_keys(&json!(["age", "name"])).unwrap());
        let names: Vec<_> = docs.iter().map(|d| d["name"].clone()).collect();
        assert_eq!(names, vec![json!("Anakin"), json!("Luke"), json!("Yoda")]);

        sort(&mut docs, &sort_keys(&json!([{"age": "desc"}])).unwrap());
        assert_eq!(docs[0]["name"], json!("Yoda"));

        assert_eq!(
            project(&luke(), &["name".to_string(), "vehicle.model".to_string()]),
            json!({"name": "Luke", "vehicle": {"model": "X-wing"}})
        );
    }
}
