//! Rule matcher (C3).
//!
//! Given an endpoint's rules and an inbound request, picks the highest
//! priority eligible rule (ties broken by earliest creation), or reports
//! that none apply so the caller falls back to the endpoint's defaults.

use crate::matcher::{self, PathParams};
use crate::model::Rule;

/// The outcome of rule selection: the winning rule, plus the path
/// parameters in effect for it (the rule's own capture if it declared a
/// path pattern, otherwise the endpoint-level capture passed in).
pub struct RuleMatch<'a> {
    pub rule: &'a Rule,
    pub path_params: PathParams,
}

pub fn select_rule<'a>(
    rules: &'a [Rule],
    method: &str,
    path: &str,
    headers: &[(String, String)],
    endpoint_params: &PathParams,
) -> Option<RuleMatch<'a>> {
    let mut best: Option<(RuleMatch<'a>, &Rule)> = None;

    for rule in rules {
        let Some(params) = eligible_params(rule, method, path, headers, endpoint_params) else {
            continue;
        };

        let is_better = match &best {
            None => true,
            Some((_, current)) => {
                rule.priority > current.priority
                    || (rule.priority == current.priority && rule.created_at < current.created_at)
            }
        };

        if is_better {
            best = Some((RuleMatch { rule, path_params: params }, rule));
        }
    }

    best.map(|(m, _)| m)
}

fn eligible_params(
    rule: &Rule,
    method: &str,
    path: &str,
    headers: &[(String, String)],
    endpoint_params: &PathParams,
) -> Option<PathParams> {
    if !rule.active {
        return None;
    }

    if let Some(required_method) = &rule.match_method {
        if !required_method.eq_ignore_ascii_case(method) {
            return None;
        }
    }

    let params = if let Some(pattern) = &rule.match_path {
        matcher::match_path(pattern, path)?
    } else {
        endpoint_params.clone()
    };

    if let Some(required_headers) = &rule.match_headers {
        let required: serde_json::Value = serde_json::from_str(required_headers).ok()?;
        let required_obj = required.as_object()?;
        for (name, expected) in required_obj {
            let expected_str = expected.as_str()?;
            let found = headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str());
            if found != Some(expected_str) {
                return None;
            }
        }
    }

    Some(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{EndpointId, RuleId};
    use chrono::{Duration, Utc};
    use std::collections::HashMap;

    fn base_rule(priority: i64, created_offset_secs: i64) -> Rule {
        Rule {
            id: RuleId::new(),
            endpoint_id: EndpointId::new(),
            priority,
            match_method: None,
            match_path: None,
            match_headers: None,
            response_body: "{}".to_string(),
            response_headers: None,
            response_status: 200,
            response_delay_ms: 0,
            active: true,
            created_at: Utc::now() + Duration::seconds(created_offset_secs),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn highest_priority_wins() {
        let rules = vec![base_rule(1, 0), base_rule(10, 0), base_rule(5, 0)];
        let params = HashMap::new();
        let m = select_rule(&rules, "GET", "/x", &[], &params).unwrap();
        assert_eq!(m.rule.priority, 10);
    }

    #[test]
    fn ties_break_by_earliest_creation() {
        let rules = vec![base_rule(5, 10), base_rule(5, -10)];
        let params = HashMap::new();
        let m = select_rule(&rules, "GET", "/x", &[], &params).unwrap();
        assert_eq!(m.rule.created_at, rules[1].created_at);
    }

    #[test]
    fn inactive_rules_are_never_selected() {
        let mut rule = base_rule(100, 0);
        rule.active = false;
        let rules = vec![rule];
        let params = HashMap::new();
        assert!(select_rule(&rules, "GET", "/x", &[], &params).is_none());
    }

    #[test]
    fn method_filter_excludes_mismatched_requests() {
        let mut rule = base_rule(1, 0);
        rule.match_method = Some("POST".to_string());
        let rules = vec![rule];
        let params = HashMap::new();
        assert!(select_rule(&rules, "GET", "/x", &[], &params).is_none());
        assert!(select_rule(&rules, "post", "/x", &[], &params).is_some());
    }

    #[test]
    fn rule_path_pattern_replaces_endpoint_params() {
        let mut rule = base_rule(1, 0);
        rule.match_path = Some("/users/:name".to_string());
        let rules = vec![rule];
        let mut endpoint_params = HashMap::new();
        endpoint_params.insert("id".to_string(), "99".to_string());
        let m = select_rule(&rules, "GET", "/users/ann", &[], &endpoint_params).unwrap();
        assert_eq!(m.path_params.get("name"), Some(&"ann".to_string()));
        assert!(m.path_params.get("id").is_none());
    }

    #[test]
    fn header_match_is_case_insensitive_name_exact_value() {
        let mut rule = base_rule(1, 0);
        rule.match_headers = Some(r#"{"X-Foo":"bar"}"#.to_string());
        let rules = vec![rule];
        let params = HashMap::new();
        let headers = vec![("x-foo".to_string(), "bar".to_string())];
        assert!(select_rule(&rules, "GET", "/x", &headers, &params).is_some());
        let wrong_headers = vec![("x-foo".to_string(), "baz".to_string())];
        assert!(select_rule(&rules, "GET", "/x", &wrong_headers, &params).is_none());
    }

    #[test]
    fn no_eligible_rule_returns_none() {
        let rules: Vec<Rule> = vec![];
        let params = HashMap::new();
        assert!(select_rule(&rules, "GET", "/x", &[], &params).is_none());
    }
}
