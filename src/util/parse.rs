//! Typed accessors for operation parameter bags
//!
//! Operation parameters arrive as free-form JSON maps. Runners and parameter
//! sources read them through these helpers so that a badly typed value
//! surfaces as a syntax error naming the parameter instead of a panic.

use serde_json::Value;

use crate::error::{BenchError, BenchResult};
use crate::workload::Params;

pub fn string_param(params: &Params, key: &str) -> BenchResult<String> {
    match params.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::String(_)) | None => Err(BenchError::WorkloadSyntax(format!(
            "mandatory parameter '{key}' is missing"
        ))),
        Some(_) => Err(BenchError::WorkloadSyntax(format!(
            "parameter '{key}' must be a string"
        ))),
    }
}

pub fn string_param_or(params: &Params, key: &str, default: &str) -> BenchResult<String> {
    match params.get(key) {
        None => Ok(default.to_string()),
        Some(Value::String(s)) if s.is_empty() => Ok(default.to_string()),
        _ => string_param(params, key),
    }
}

pub fn opt_string_param(params: &Params, key: &str) -> BenchResult<Option<String>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(BenchError::WorkloadSyntax(format!(
            "parameter '{key}' must be a string"
        ))),
    }
}

pub fn int_param(params: &Params, key: &str) -> BenchResult<i64> {
    match params.get(key) {
        Some(Value::Number(n)) if n.is_i64() || n.is_u64() => n
            .as_i64()
            .ok_or_else(|| BenchError::WorkloadSyntax(format!("parameter '{key}' is out of range"))),
        Some(_) => Err(BenchError::WorkloadSyntax(format!(
            "parameter '{key}' must be an integer"
        ))),
        None => Err(BenchError::WorkloadSyntax(format!(
            "mandatory parameter '{key}' is missing"
        ))),
    }
}

pub fn int_param_or(params: &Params, key: &str, default: i64) -> BenchResult<i64> {
    if params.contains_key(key) {
        int_param(params, key)
    } else {
        Ok(default)
    }
}

pub fn bool_param_or(params: &Params, key: &str, default: bool) -> BenchResult<bool> {
    match params.get(key) {
        None => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(BenchError::WorkloadSyntax(format!(
            "parameter '{key}' must be a boolean"
        ))),
    }
}

/// Read a float parameter and check it against `[min, max]` or `(min, max]`
/// when `min_exclusive` is set.
pub fn float_param_in_range(
    params: &Params,
    key: &str,
    default: f64,
    min: f64,
    max: f64,
    min_exclusive: bool,
) -> BenchResult<f64> {
    let value = match params.get(key) {
        None => default,
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| BenchError::WorkloadSyntax(format!("parameter '{key}' must be numeric")))?,
        Some(_) => {
            return Err(BenchError::WorkloadSyntax(format!(
                "parameter '{key}' must be numeric"
            )))
        }
    };
    let below_min = if min_exclusive { value <= min } else { value < min };
    if below_min || value > max {
        let open = if min_exclusive { "(" } else { "[" };
        return Err(BenchError::WorkloadSyntax(format!(
            "'{key}' must be in the range {open}{min:.1}, {max:.1}] but was {value:.1}"
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Params {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_string_param() {
        let p = params(json!({"index": "logs"}));
        assert_eq!(string_param(&p, "index").unwrap(), "logs");
        assert!(string_param(&p, "missing").is_err());
    }

    #[test]
    fn test_int_param_rejects_strings() {
        let p = params(json!({"bulk-size": "5000"}));
        assert!(int_param(&p, "bulk-size").is_err());
    }

    #[test]
    fn test_float_param_range_boundaries() {
        let p = params(json!({"ingest-percentage": 0.0}));
        // (0, 100] excludes zero
        assert!(float_param_in_range(&p, "ingest-percentage", 100.0, 0.0, 100.0, true).is_err());
        // [0, 100] admits it
        assert_eq!(
            float_param_in_range(&p, "ingest-percentage", 100.0, 0.0, 100.0, false).unwrap(),
            0.0
        );
        // absent key falls back to the default
        let empty = params(json!({}));
        assert_eq!(
            float_param_in_range(&empty, "ingest-percentage", 100.0, 0.0, 100.0, true).unwrap(),
            100.0
        );
    }
}
