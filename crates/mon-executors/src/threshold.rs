//! Threshold rule engine shared by `json-http`, `json-metrics`, and
//! `custom-ssh-json`: extract a numeric value from a JSON document via a
//! restricted path grammar and compare it against a configured bound.
//!
//! Path grammar: `$` (the document root), `$.field`, `$.field.sub`,
//! `$.items.0.value`, `$.items[0].value` — dot-separated segments; a segment
//! that is purely numeric, or that carries a trailing `[n]` index, indexes
//! into an array. No wildcards, no escaped dots.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl ThresholdOp {
    fn holds(&self, actual: f64, expected: f64) -> bool {
        match self {
            ThresholdOp::Lt => actual < expected,
            ThresholdOp::Le => actual <= expected,
            ThresholdOp::Gt => actual > expected,
            ThresholdOp::Ge => actual >= expected,
            ThresholdOp::Eq => (actual - expected).abs() < f64::EPSILON,
            ThresholdOp::Ne => (actual - expected).abs() >= f64::EPSILON,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdRule {
    pub path: String,
    pub op: ThresholdOp,
    pub value: f64,
    pub severity: Severity,
}

#[derive(Debug, Clone)]
pub struct ThresholdFailure {
    pub path: String,
    pub expected: f64,
    pub actual: Option<f64>,
    pub severity: Severity,
}

/// Resolve a path against a JSON document. Returns `None` for a missing
/// field, an out-of-range index, or a malformed path — callers treat this
/// the same as "rule failed, no numeric value present".
pub fn resolve_path<'a>(json: &'a Value, path: &str) -> Option<&'a Value> {
    if path == "$" {
        return Some(json);
    }
    let rest = path.strip_prefix("$.")?;
    let mut cur = json;
    for segment in rest.split('.') {
        cur = resolve_segment(cur, segment)?;
    }
    Some(cur)
}

/// Resolve one dot-separated segment, which may carry trailing `[n]` array
/// indices (e.g. `items[0]`) in addition to the plain numeric-segment form
/// (`0`) already used for dotted indices like `$.items.0.value`.
fn resolve_segment<'a>(cur: &'a Value, segment: &str) -> Option<&'a Value> {
    if let Ok(index) = segment.parse::<usize>() {
        return cur.as_array()?.get(index);
    }

    let Some(bracket_start) = segment.find('[') else {
        return cur.as_object()?.get(segment);
    };

    let name = &segment[..bracket_start];
    let mut rest = &segment[bracket_start..];
    let mut value = if name.is_empty() {
        cur
    } else {
        cur.as_object()?.get(name)?
    };

    while let Some(stripped) = rest.strip_prefix('[') {
        let close = stripped.find(']')?;
        let index: usize = stripped[..close].parse().ok()?;
        value = value.as_array()?.get(index)?;
        rest = &stripped[close + 1..];
    }

    Some(value)
}

/// Evaluate every rule against `document`, returning the ones that failed.
pub fn evaluate(document: &Value, rules: &[ThresholdRule]) -> Vec<ThresholdFailure> {
    rules
        .iter()
        .filter_map(|rule| {
            let actual = resolve_path(document, &rule.path).and_then(Value::as_f64);
            let holds = actual.map(|a| rule.op.holds(a, rule.value)).unwrap_or(false);
            if holds {
                None
            } else {
                Some(ThresholdFailure {
                    path: rule.path.clone(),
                    expected: rule.value,
                    actual,
                    severity: rule.severity,
                })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_nested_field() {
        let doc = serde_json::json!({"a": {"b": 42}});
        assert_eq!(resolve_path(&doc, "$.a.b"), Some(&serde_json::json!(42)));
    }

    #[test]
    fn resolves_array_index() {
        let doc = serde_json::json!({"items": [{"value": 7}]});
        assert_eq!(resolve_path(&doc, "$.items.0.value"), Some(&serde_json::json!(7)));
    }

    #[test]
    fn resolves_bracket_array_index() {
        let doc = serde_json::json!({"items": [{"value": 7}]});
        assert_eq!(resolve_path(&doc, "$.items[0].value"), Some(&serde_json::json!(7)));
    }

    #[test]
    fn missing_field_resolves_to_none() {
        let doc = serde_json::json!({"a": 1});
        assert!(resolve_path(&doc, "$.b").is_none());
    }

    #[test]
    fn evaluate_reports_only_failures() {
        let doc = serde_json::json!({"latency_ms": 450});
        let rules = vec![ThresholdRule {
            path: "$.latency_ms".into(),
            op: ThresholdOp::Lt,
            value: 500.0,
            severity: Severity::Critical,
        }];
        assert!(evaluate(&doc, &rules).is_empty());

        let rules = vec![ThresholdRule {
            path: "$.latency_ms".into(),
            op: ThresholdOp::Lt,
            value: 100.0,
            severity: Severity::Critical,
        }];
        let failures = evaluate(&doc, &rules);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].actual, Some(450.0));
    }
}
