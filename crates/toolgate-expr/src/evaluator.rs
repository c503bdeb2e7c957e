//! The typed expression grammar: selectors, operators, and fail-closed
//! boolean composition (§4.6.2).
//!
//! Grounded verbatim on `original_source/tests/test_yaml_engine/
//! test_evaluator.py`'s selector/operator semantics and the three-way
//! `_PolicyError` sentinel, carried here as [`EvalResult`].

use regex::Regex;
use serde_json::Value;
use toolgate_core::Envelope;

/// The result of evaluating an expression or a single leaf. Deliberately
/// not `bool`: a type-mismatched operator (or any other unresolvable
/// condition) produces [`EvalResult::Error`], a third state that must
/// never be silently coerced to `false` (§4.6.2's fail-closed composition).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalResult {
    /// The expression's condition was met.
    True,
    /// The expression's condition was not met.
    False,
    /// The expression could not be resolved (e.g. a type mismatch).
    Error(String),
}

impl EvalResult {
    /// Whether the contract this expression guards should fire: `true` for
    /// both [`EvalResult::True`] and [`EvalResult::Error`] — "at the top
    /// level, a PolicyError evaluates as condition met" (§4.6.2).
    pub fn is_truthy(&self) -> bool {
        !matches!(self, EvalResult::False)
    }

    /// The error detail, if this is [`EvalResult::Error`].
    pub fn error_message(&self) -> Option<&str> {
        match self {
            EvalResult::Error(msg) => Some(msg),
            _ => None,
        }
    }
}

/// Evaluate an expression tree against `envelope` (and, for `post`
/// contracts, `output_text`). `expr` is a raw JSON value because the
/// grammar is recursive and selector-keyed (see `src/bundle.rs`'s module
/// doc for why this isn't a derived enum).
pub fn evaluate_expression(expr: &Value, envelope: &Envelope, output_text: Option<&str>) -> EvalResult {
    let Some(obj) = expr.as_object() else {
        return EvalResult::Error("expression must be a mapping".to_string());
    };

    if let Some(Value::Array(items)) = obj.get("all") {
        return evaluate_all(items, envelope, output_text);
    }
    if let Some(Value::Array(items)) = obj.get("any") {
        return evaluate_any(items, envelope, output_text);
    }
    if let Some(inner) = obj.get("not") {
        return evaluate_not(inner, envelope, output_text);
    }

    if obj.len() != 1 {
        return EvalResult::Error(
            "leaf expression must be a single-entry mapping {selector: {operator: operand}}".to_string(),
        );
    }
    let (selector, operand) = obj.iter().next().expect("checked len == 1 above");
    evaluate_leaf(selector, operand, envelope, output_text)
}

fn evaluate_all(items: &[Value], envelope: &Envelope, output_text: Option<&str>) -> EvalResult {
    let mut saw_false = false;
    let mut error: Option<String> = None;
    for item in items {
        match evaluate_expression(item, envelope, output_text) {
            EvalResult::Error(msg) => {
                error.get_or_insert(msg);
            }
            EvalResult::False => saw_false = true,
            EvalResult::True => {}
        }
    }
    if let Some(msg) = error {
        return EvalResult::Error(msg);
    }
    if saw_false { EvalResult::False } else { EvalResult::True }
}

fn evaluate_any(items: &[Value], envelope: &Envelope, output_text: Option<&str>) -> EvalResult {
    let mut saw_true = false;
    let mut error: Option<String> = None;
    for item in items {
        match evaluate_expression(item, envelope, output_text) {
            EvalResult::Error(msg) => {
                error.get_or_insert(msg);
            }
            EvalResult::True => saw_true = true,
            EvalResult::False => {}
        }
    }
    if let Some(msg) = error {
        return EvalResult::Error(msg);
    }
    if saw_true { EvalResult::True } else { EvalResult::False }
}

fn evaluate_not(inner: &Value, envelope: &Envelope, output_text: Option<&str>) -> EvalResult {
    match evaluate_expression(inner, envelope, output_text) {
        EvalResult::Error(msg) => EvalResult::Error(msg),
        EvalResult::True => EvalResult::False,
        EvalResult::False => EvalResult::True,
    }
}

fn evaluate_leaf(selector: &str, operand: &Value, envelope: &Envelope, output_text: Option<&str>) -> EvalResult {
    let Some(operand_map) = operand.as_object() else {
        return EvalResult::Error(format!("operand for selector '{selector}' must be a mapping"));
    };
    if operand_map.len() != 1 {
        return EvalResult::Error(format!(
            "operand for selector '{selector}' must have exactly one operator"
        ));
    }
    let (op, operand_value) = operand_map.iter().next().expect("checked len == 1 above");
    evaluate_operator(selector, op, operand_value, envelope, output_text)
}

fn evaluate_operator(
    selector: &str,
    op: &str,
    operand_value: &Value,
    envelope: &Envelope,
    output_text: Option<&str>,
) -> EvalResult {
    if op == "exists" {
        let Some(expected) = operand_value.as_bool() else {
            return EvalResult::Error("'exists' operand must be a boolean".to_string());
        };
        let present = resolve_selector(selector, envelope, output_text).is_some();
        return bool_result(present == expected);
    }

    let Some(value) = resolve_selector(selector, envelope, output_text) else {
        // Absent values compare false for every operator but `exists` (§4.6.2).
        return EvalResult::False;
    };

    match op {
        "equals" => bool_result(values_equal(&value, operand_value)),
        "not_equals" => bool_result(!values_equal(&value, operand_value)),
        "in" => match operand_value.as_array() {
            Some(list) => bool_result(list.iter().any(|item| values_equal(&value, item))),
            None => EvalResult::Error("'in' operand must be a list".to_string()),
        },
        "not_in" => match operand_value.as_array() {
            Some(list) => bool_result(!list.iter().any(|item| values_equal(&value, item))),
            None => EvalResult::Error("'not_in' operand must be a list".to_string()),
        },
        "contains" => match (require_str(&value, op), operand_value.as_str()) {
            (Ok(s), Some(needle)) => bool_result(s.contains(needle)),
            (Err(e), _) => e,
            (_, None) => EvalResult::Error("'contains' operand must be a string".to_string()),
        },
        "contains_any" => match require_str(&value, op) {
            Ok(s) => match operand_value.as_array() {
                Some(list) => bool_result(list.iter().any(|p| p.as_str().is_some_and(|p| s.contains(p)))),
                None => EvalResult::Error("'contains_any' operand must be a list".to_string()),
            },
            Err(e) => e,
        },
        "starts_with" => match (require_str(&value, op), operand_value.as_str()) {
            (Ok(s), Some(prefix)) => bool_result(s.starts_with(prefix)),
            (Err(e), _) => e,
            (_, None) => EvalResult::Error("'starts_with' operand must be a string".to_string()),
        },
        "ends_with" => match (require_str(&value, op), operand_value.as_str()) {
            (Ok(s), Some(suffix)) => bool_result(s.ends_with(suffix)),
            (Err(e), _) => e,
            (_, None) => EvalResult::Error("'ends_with' operand must be a string".to_string()),
        },
        "matches" => match (require_str(&value, op), operand_value.as_str()) {
            (Ok(s), Some(pattern)) => match Regex::new(pattern) {
                Ok(re) => bool_result(re.is_match(s)),
                Err(err) => EvalResult::Error(format!("invalid regex '{pattern}': {err}")),
            },
            (Err(e), _) => e,
            (_, None) => EvalResult::Error("'matches' operand must be a string".to_string()),
        },
        "matches_any" => match require_str(&value, op) {
            Ok(s) => match operand_value.as_array() {
                Some(list) => {
                    for pattern in list {
                        let Some(pattern) = pattern.as_str() else {
                            return EvalResult::Error("'matches_any' operand entries must be strings".to_string());
                        };
                        match Regex::new(pattern) {
                            Ok(re) => {
                                if re.is_match(s) {
                                    return EvalResult::True;
                                }
                            }
                            Err(err) => return EvalResult::Error(format!("invalid regex '{pattern}': {err}")),
                        }
                    }
                    EvalResult::False
                }
                None => EvalResult::Error("'matches_any' operand must be a list".to_string()),
            },
            Err(e) => e,
        },
        "gt" => numeric_cmp(&value, operand_value, op, |a, b| a > b),
        "gte" => numeric_cmp(&value, operand_value, op, |a, b| a >= b),
        "lt" => numeric_cmp(&value, operand_value, op, |a, b| a < b),
        "lte" => numeric_cmp(&value, operand_value, op, |a, b| a <= b),
        other => EvalResult::Error(format!("unknown operator '{other}'")),
    }
}

fn numeric_cmp(value: &Value, operand: &Value, op: &str, cmp: impl Fn(f64, f64) -> bool) -> EvalResult {
    match (require_f64(value, op), operand.as_f64()) {
        (Ok(a), Some(b)) => bool_result(cmp(a, b)),
        (Err(e), _) => e,
        (_, None) => EvalResult::Error(format!("'{op}' operand must be numeric")),
    }
}

fn require_str<'a>(value: &'a Value, op: &str) -> Result<&'a str, EvalResult> {
    value
        .as_str()
        .ok_or_else(|| EvalResult::Error(format!("Type mismatch: '{op}' requires a string value")))
}

fn require_f64(value: &Value, op: &str) -> Result<f64, EvalResult> {
    value
        .as_f64()
        .ok_or_else(|| EvalResult::Error(format!("Type mismatch: '{op}' requires a numeric value")))
}

fn bool_result(b: bool) -> EvalResult {
    if b { EvalResult::True } else { EvalResult::False }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    a == b
}

/// Resolves a selector against `envelope`/`output_text`, returning `None`
/// if it is absent (missing key, null value, or an unknown selector) —
/// §4.6.2's "absent" state, distinct from resolving to `false` or `0`.
fn resolve_selector(selector: &str, envelope: &Envelope, output_text: Option<&str>) -> Option<Value> {
    match selector {
        "environment" => Some(Value::String(envelope.environment().to_string())),
        "tool.name" => Some(Value::String(envelope.tool_name().to_string())),
        "output.text" => output_text.map(|s| Value::String(s.to_string())),
        _ => {
            if let Some(path) = selector.strip_prefix("args.") {
                envelope.get_arg(path).filter(|v| !v.is_null()).cloned()
            } else if let Some(field) = selector.strip_prefix("principal.") {
                resolve_principal_field(envelope, field)
            } else {
                None
            }
        }
    }
}

fn resolve_principal_field(envelope: &Envelope, field: &str) -> Option<Value> {
    let principal = envelope.principal()?;
    if let Some(key) = field.strip_prefix("claims.") {
        return principal.claims.get(key).filter(|v| !v.is_null()).cloned();
    }
    let value = match field {
        "user_id" => principal.user_id.clone(),
        "service_id" => principal.service_id.clone(),
        "org_id" => principal.org_id.clone(),
        "role" => principal.role.clone(),
        "ticket_ref" => principal.ticket_ref.clone(),
        _ => None,
    };
    value.map(Value::String)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use toolgate_core::Principal;

    fn envelope(tool_name: &str, args: serde_json::Map<String, Value>, environment: &str) -> Envelope {
        Envelope::builder(tool_name)
            .tool_input(args)
            .environment(environment)
            .build()
    }

    fn map(json_val: Value) -> serde_json::Map<String, Value> {
        json_val.as_object().unwrap().clone()
    }

    #[test]
    fn selector_environment_and_tool_name() {
        let env = envelope("read_file", map(json!({})), "staging");
        assert_eq!(
            evaluate_expression(&json!({"environment": {"equals": "staging"}}), &env, None),
            EvalResult::True
        );
        assert_eq!(
            evaluate_expression(&json!({"tool.name": {"equals": "read_file"}}), &env, None),
            EvalResult::True
        );
    }

    #[test]
    fn selector_nested_args() {
        let env = envelope("x", map(json!({"config": {"timeout": 30}})), "production");
        assert_eq!(
            evaluate_expression(&json!({"args.config.timeout": {"equals": 30}}), &env, None),
            EvalResult::True
        );
    }

    #[test]
    fn selector_output_text() {
        let env = envelope("x", map(json!({})), "production");
        assert_eq!(
            evaluate_expression(
                &json!({"output.text": {"contains": "secret"}}),
                &env,
                Some("this has a secret in it")
            ),
            EvalResult::True
        );
        assert_eq!(
            evaluate_expression(&json!({"output.text": {"contains": "secret"}}), &env, None),
            EvalResult::False
        );
    }

    #[test]
    fn missing_selectors_compare_false() {
        let env = envelope("x", map(json!({})), "production");
        assert_eq!(
            evaluate_expression(&json!({"args.nonexistent": {"equals": "x"}}), &env, None),
            EvalResult::False
        );
        assert_eq!(
            evaluate_expression(&json!({"principal.role": {"equals": "admin"}}), &env, None),
            EvalResult::False
        );
    }

    #[test]
    fn principal_claims_resolve() {
        let mut claims = std::collections::BTreeMap::new();
        claims.insert("department".to_string(), json!("platform"));
        let principal = Principal {
            claims,
            ..Default::default()
        };
        let env = Envelope::builder("x").principal(principal).build();
        assert_eq!(
            evaluate_expression(&json!({"principal.claims.department": {"equals": "platform"}}), &env, None),
            EvalResult::True
        );
    }

    #[test]
    fn exists_distinguishes_absent_from_false_values() {
        let env = envelope("x", map(json!({"path": "/tmp/file"})), "production");
        assert_eq!(
            evaluate_expression(&json!({"args.path": {"exists": true}}), &env, None),
            EvalResult::True
        );
        let empty = envelope("x", map(json!({})), "production");
        assert_eq!(
            evaluate_expression(&json!({"args.path": {"exists": true}}), &empty, None),
            EvalResult::False
        );
        assert_eq!(
            evaluate_expression(&json!({"args.path": {"exists": false}}), &empty, None),
            EvalResult::True
        );
    }

    #[test]
    fn exists_true_on_explicit_null_is_absent() {
        let principal = Principal {
            role: None,
            ..Default::default()
        };
        let env = Envelope::builder("x").principal(principal).build();
        assert_eq!(
            evaluate_expression(&json!({"principal.role": {"exists": true}}), &env, None),
            EvalResult::False
        );
    }

    #[test]
    fn string_operators() {
        let env = envelope("x", map(json!({"path": "/home/.env"})), "production");
        assert_eq!(
            evaluate_expression(&json!({"args.path": {"contains_any": [".env", ".secret"]}}), &env, None),
            EvalResult::True
        );
        assert_eq!(
            evaluate_expression(&json!({"args.path": {"starts_with": "/home"}}), &env, None),
            EvalResult::True
        );
        assert_eq!(
            evaluate_expression(&json!({"args.path": {"ends_with": ".yaml"}}), &env, None),
            EvalResult::False
        );
    }

    #[test]
    fn regex_operators() {
        let env = envelope("x", map(json!({"command": "rm -rf /tmp"})), "production");
        assert_eq!(
            evaluate_expression(
                &json!({"args.command": {"matches": r"\brm\s+(-rf?|--recursive)\b"}}),
                &env,
                None
            ),
            EvalResult::True
        );
        let env2 = envelope("x", map(json!({"command": "mkfs /dev/sda"})), "production");
        assert_eq!(
            evaluate_expression(
                &json!({"args.command": {"matches_any": [r"\brm\b", r"\bmkfs\b"]}}),
                &env2,
                None
            ),
            EvalResult::True
        );
    }

    #[test]
    fn numeric_operators() {
        let env = envelope("x", map(json!({"count": 10})), "production");
        assert_eq!(evaluate_expression(&json!({"args.count": {"gt": 5}}), &env, None), EvalResult::True);
        assert_eq!(evaluate_expression(&json!({"args.count": {"gte": 10}}), &env, None), EvalResult::True);
        assert_eq!(evaluate_expression(&json!({"args.count": {"lt": 10}}), &env, None), EvalResult::False);
    }

    #[test]
    fn type_mismatch_is_policy_error_and_truthy() {
        let env = envelope("x", map(json!({"count": 42})), "production");
        let result = evaluate_expression(&json!({"args.count": {"contains": "4"}}), &env, None);
        assert!(matches!(result, EvalResult::Error(_)));
        assert!(result.is_truthy());
        assert!(result.error_message().unwrap().contains("Type mismatch"));
    }

    #[test]
    fn gt_on_string_is_policy_error() {
        let env = envelope("x", map(json!({"name": "alice"})), "production");
        let result = evaluate_expression(&json!({"args.name": {"gt": 5}}), &env, None);
        assert!(matches!(result, EvalResult::Error(_)));
    }

    #[test]
    fn boolean_all_any_not() {
        let env = envelope("deploy", map(json!({})), "production");
        let expr = json!({"all": [
            {"tool.name": {"equals": "deploy"}},
            {"environment": {"equals": "production"}},
        ]});
        assert_eq!(evaluate_expression(&expr, &env, None), EvalResult::True);

        let expr_false = json!({"all": [
            {"tool.name": {"equals": "deploy"}},
            {"environment": {"equals": "staging"}},
        ]});
        assert_eq!(evaluate_expression(&expr_false, &env, None), EvalResult::False);

        let not_expr = json!({"not": {"tool.name": {"equals": "other"}}});
        assert_eq!(evaluate_expression(&not_expr, &env, None), EvalResult::True);
    }

    #[test]
    fn policy_error_propagates_through_boolean_composition() {
        let env = envelope("x", map(json!({"count": "not_a_number"})), "production");
        let all_expr = json!({"all": [{"args.count": {"gt": 5}}]});
        assert!(matches!(evaluate_expression(&all_expr, &env, None), EvalResult::Error(_)));
        let any_expr = json!({"any": [{"args.count": {"gt": 5}}]});
        assert!(matches!(evaluate_expression(&any_expr, &env, None), EvalResult::Error(_)));
        let not_expr = json!({"not": {"args.count": {"gt": 5}}});
        assert!(matches!(evaluate_expression(&not_expr, &env, None), EvalResult::Error(_)));
    }

    #[test]
    fn any_short_circuit_does_not_hide_error_from_other_branch() {
        // Even though one branch is unambiguously true, an error elsewhere
        // in the same "any" must still surface, not be swallowed as "true".
        let env = envelope("x", map(json!({"count": "not_a_number"})), "production");
        let expr = json!({"any": [
            {"args.count": {"gt": 5}},
            {"tool.name": {"equals": "x"}},
        ]});
        assert!(matches!(evaluate_expression(&expr, &env, None), EvalResult::Error(_)));
    }
}
