//! Query-filter composition for appliance list endpoints.
//!
//! TrueNAS accepts a JSON body of the form
//! `{"query-filters": [[field, op, value]], "query-options": {"extra": ...}}`
//! on GET requests. Only the operators the adapter needs are modeled.

use serde_json::{Value, json};

/// A single server-side filter term.
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub op: &'static str,
    pub value: Value,
}

impl Filter {
    /// Equality filter.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op: "=",
            value: value.into(),
        }
    }

    /// Prefix filter (`^` operator).
    pub fn starts_with(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op: "^",
            value: Value::String(prefix.into()),
        }
    }
}

/// Compose the request body, or `None` when there is nothing to send.
pub fn query_body(filter: Option<&Filter>, extras: Option<&Value>) -> Option<Value> {
    if filter.is_none() && extras.is_none() {
        return None;
    }

    let filters = match filter {
        Some(f) => json!([[f.field, f.op, f.value]]),
        None => json!([]),
    };
    let options = match extras {
        Some(extra) => json!({ "extra": extra }),
        None => json!({}),
    };

    Some(json!({
        "query-filters": filters,
        "query-options": options,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eq_filter_body() {
        let filter = Filter::eq("name", "tank/pvc-1");
        let body = query_body(Some(&filter), None).unwrap();
        assert_eq!(
            body,
            json!({
                "query-filters": [["name", "=", "tank/pvc-1"]],
                "query-options": {},
            })
        );
    }

    #[test]
    fn test_prefix_filter_body() {
        let filter = Filter::starts_with("origin.value", "tank/pvc-1@");
        let body = query_body(Some(&filter), None).unwrap();
        assert_eq!(
            body["query-filters"],
            json!([["origin.value", "^", "tank/pvc-1@"]])
        );
    }

    #[test]
    fn test_extras_body() {
        let filter = Filter::eq("dataset", "tank/pvc-1");
        let body = query_body(Some(&filter), Some(&json!({"holds": true}))).unwrap();
        assert_eq!(body["query-options"], json!({"extra": {"holds": true}}));
    }

    #[test]
    fn test_empty_query() {
        assert!(query_body(None, None).is_none());
    }
}
