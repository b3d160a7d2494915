//! Template engine (C2).
//!
//! A flat token-rewriter over `{{NAME}}` tokens: no AST, no dependency
//! graph. Every occurrence is resolved independently, and unknown names
//! pass through untouched rather than erroring — both are load-bearing
//! semantics, not missing features.

use crate::matcher::PathParams;
use chrono::Utc;
use rand::Rng;
use std::collections::HashMap;
use std::fmt::Write as _;

const FIRST_NAMES: [&str; 12] = [
    "Alice", "Bob", "Carol", "Dave", "Eve", "Frank", "Grace", "Heidi", "Ivan", "Judy", "Mallory",
    "Niaj",
];
const LAST_NAMES: [&str; 12] = [
    "Anderson", "Brooks", "Chen", "Diaz", "Evans", "Foster", "Garcia", "Hughes", "Ibrahim",
    "Johnson", "Kumar", "Lopez",
];
const DOMAINS: [&str; 6] = [
    "example.com",
    "example.org",
    "example.net",
    "mailinator.test",
    "acme.test",
    "mock.test",
];

/// Everything the template engine needs to know about the request it is
/// rendering a response for.
pub struct RenderContext<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub headers: &'a [(String, String)],
    pub query: &'a HashMap<String, String>,
    pub body: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub path_params: &'a PathParams,
}

/// Renders `template`, replacing every `{{NAME}}` occurrence.
pub fn render(template: &str, ctx: &RenderContext<'_>) -> String {
    rewrite_tokens(template, |name| resolve(name, ctx))
}

/// Walks `input`, invoking `resolve` for the inner text of every
/// `{{...}}` token found, and returns the rewritten string. `resolve`
/// returns `None` to pass the token through unchanged (including its
/// braces).
fn rewrite_tokens(input: &str, mut resolve: impl FnMut(&str) -> Option<String>) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '{' && i + 1 < chars.len() && chars[i + 1] == '{' {
            if let Some(end) = find_closing_char(&chars, i + 2) {
                let name: String = chars[i + 2..end].iter().collect();
                match resolve(&name) {
                    Some(value) => out.push_str(&value),
                    None => {
                        out.push_str("{{");
                        out.push_str(&name);
                        out.push_str("}}");
                    }
                }
                i = end + 2;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

fn resolve(name: &str, ctx: &RenderContext<'_>) -> Option<String> {
    if let Some(value) = resolve_generator(name) {
        return Some(value);
    }
    if let Some(rest) = name.strip_prefix("request.") {
        return Some(resolve_request(rest, ctx));
    }
    if is_identifier(name) {
        return ctx.path_params.get(name).cloned();
    }
    None
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn resolve_generator(name: &str) -> Option<String> {
    if !name.starts_with('$') {
        return None;
    }
    let mut rng = rand::rng();
    match name {
        "$uuid" => Some(uuid::Uuid::new_v4().to_string()),
        "$randomInt" => Some(rng.random_range(0..=1000).to_string()),
        "$randomFloat" => {
            let v: f64 = rng.random_range(0.0..=1.0);
            Some(format!("{:.2}", v))
        }
        "$randomBool" => Some(if rng.random_bool(0.5) { "true" } else { "false" }.to_string()),
        "$timestamp" => Some(Utc::now().to_rfc3339()),
        "$timestampUnix" => Some(Utc::now().timestamp().to_string()),
        "$date" => Some(Utc::now().format("%Y-%m-%d").to_string()),
        "$randomEmail" => {
            let first = FIRST_NAMES[rng.random_range(0..FIRST_NAMES.len())].to_lowercase();
            let last = LAST_NAMES[rng.random_range(0..LAST_NAMES.len())].to_lowercase();
            let domain = DOMAINS[rng.random_range(0..DOMAINS.len())];
            Some(format!("{first}.{last}@{domain}"))
        }
        "$randomName" => {
            let first = FIRST_NAMES[rng.random_range(0..FIRST_NAMES.len())];
            let last = LAST_NAMES[rng.random_range(0..LAST_NAMES.len())];
            Some(format!("{first} {last}"))
        }
        "$randomString" => {
            const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
            let mut s = String::with_capacity(16);
            for _ in 0..16 {
                let idx = rng.random_range(0..ALPHABET.len());
                s.push(ALPHABET[idx] as char);
            }
            Some(s)
        }
        _ => None,
    }
}

fn resolve_request(rest: &str, ctx: &RenderContext<'_>) -> String {
    match rest {
        "method" => return ctx.method.to_string(),
        "path" => return ctx.path.to_string(),
        "body" => return ctx.body.unwrap_or("").to_string(),
        _ => {}
    }
    if let Some(header_name) = rest.strip_prefix("header.") {
        return ctx
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(header_name))
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
    }
    if let Some(key) = rest.strip_prefix("query.") {
        return ctx.query.get(key).cloned().unwrap_or_default();
    }
    if let Some(path) = rest.strip_prefix("body.") {
        return resolve_body_path(path, ctx);
    }
    String::new()
}

fn is_form_urlencoded(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| {
            ct.split(';')
                .next()
                .unwrap_or("")
                .trim()
                .eq_ignore_ascii_case("application/x-www-form-urlencoded")
        })
        .unwrap_or(false)
}

fn resolve_body_path(dot_path: &str, ctx: &RenderContext<'_>) -> String {
    let Some(body) = ctx.body else {
        return String::new();
    };

    if is_form_urlencoded(ctx.content_type) {
        return form_decode(body)
            .get(dot_path)
            .cloned()
            .unwrap_or_default();
    }

    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return String::new();
    };

    let mut current = &value;
    for field in dot_path.split('.') {
        match current.as_object().and_then(|obj| obj.get(field)) {
            Some(next) => current = next,
            None => return String::new(),
        }
    }

    match current {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn form_decode(body: &str) -> HashMap<String, String> {
    body.split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?;
            let value = parts.next().unwrap_or("");
            Some((percent_decode(key), percent_decode(value)))
        })
        .collect()
}

fn percent_decode(s: &str) -> String {
    let replaced = s.replace('+', " ");
    let bytes = replaced.as_bytes();
    let mut out = String::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(byte) = u8::from_str_radix(&replaced[i + 1..i + 3], 16) {
                out.push(byte as char);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i] as char);
        i += 1;
    }
    out
}

/// Rewrites template tokens into JSON-parseable placeholders: tokens found
/// inside a JSON string value become the unquoted text `__tpl__`; tokens
/// outside a string become the quoted literal `"__tpl__"`. Used by the
/// admin surface to validate a rule/endpoint body without actually
/// rendering it.
pub fn strip_templates_for_validation(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '{' && i + 1 < chars.len() && chars[i + 1] == '{' {
            if let Some(end) = find_closing_char(&chars, i + 2) {
                if in_string {
                    let _ = write!(out, "__tpl__");
                } else {
                    let _ = write!(out, "\"__tpl__\"");
                }
                i = end + 2;
                continue;
            }
        }
        if !escaped && c == '"' {
            in_string = !in_string;
        }
        escaped = in_string && !escaped && c == '\\';
        out.push(c);
        i += 1;
    }
    out
}

fn find_closing_char(chars: &[char], from: usize) -> Option<usize> {
    let mut i = from;
    while i + 1 < chars.len() {
        if chars[i] == '}' && chars[i + 1] == '}' {
            return Some(i);
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_ctx<'a>(path_params: &'a PathParams, query: &'a HashMap<String, String>) -> RenderContext<'a> {
        RenderContext {
            method: "GET",
            path: "/x",
            headers: &[],
            query,
            body: None,
            content_type: None,
            path_params,
        }
    }

    #[test]
    fn template_without_tokens_is_byte_identical() {
        let params = PathParams::new();
        let query = HashMap::new();
        let ctx = empty_ctx(&params, &query);
        assert_eq!(render("plain text, no tokens", &ctx), "plain text, no tokens");
    }

    #[test]
    fn unknown_tokens_pass_through_verbatim() {
        let params = PathParams::new();
        let query = HashMap::new();
        let ctx = empty_ctx(&params, &query);
        assert_eq!(render("{{not.a.thing}}", &ctx), "{{not.a.thing}}");
    }

    #[test]
    fn path_param_is_substituted() {
        let mut params = PathParams::new();
        params.insert("id".to_string(), "42".to_string());
        let query = HashMap::new();
        let ctx = empty_ctx(&params, &query);
        assert_eq!(render(r#"{"id":"{{id}}"}"#, &ctx), r#"{"id":"42"}"#);
    }

    #[test]
    fn independent_generator_occurrences_differ() {
        let params = PathParams::new();
        let query = HashMap::new();
        let ctx = empty_ctx(&params, &query);
        let first = render("{{$uuid}}", &ctx);
        let second = render("{{$uuid}}", &ctx);
        assert_ne!(first, second);
    }

    #[test]
    fn request_header_lookup_is_case_insensitive() {
        let params = PathParams::new();
        let query = HashMap::new();
        let ctx = RenderContext {
            method: "POST",
            path: "/x",
            headers: &[("X-Foo".to_string(), "bar".to_string())],
            query: &query,
            body: None,
            content_type: None,
            path_params: &params,
        };
        assert_eq!(
            render(r#"{"m":"{{request.method}}","h":"{{request.header.x-foo}}"}"#, &ctx),
            r#"{"m":"POST","h":"bar"}"#
        );
    }

    #[test]
    fn body_dot_path_navigates_json() {
        let params = PathParams::new();
        let query = HashMap::new();
        let ctx = RenderContext {
            method: "POST",
            path: "/x",
            headers: &[],
            query: &query,
            body: Some(r#"{"user":{"name":"Ann"}}"#),
            content_type: Some("application/json"),
            path_params: &params,
        };
        assert_eq!(render("{{request.body.user.name}}", &ctx), "Ann");
    }

    #[test]
    fn non_json_body_yields_empty_string_not_error() {
        let params = PathParams::new();
        let query = HashMap::new();
        let ctx = RenderContext {
            method: "POST",
            path: "/x",
            headers: &[],
            query: &query,
            body: Some("not json"),
            content_type: Some("application/json"),
            path_params: &params,
        };
        assert_eq!(render("{{request.body.field}}", &ctx), "");
    }

    #[test]
    fn form_urlencoded_body_with_charset_is_parsed() {
        let params = PathParams::new();
        let query = HashMap::new();
        let ctx = RenderContext {
            method: "POST",
            path: "/x",
            headers: &[],
            query: &query,
            body: Some("name=Jane+Doe&city=NY"),
            content_type: Some("application/x-www-form-urlencoded; charset=utf-8"),
            path_params: &params,
        };
        assert_eq!(render("{{request.body.name}}", &ctx), "Jane Doe");
    }

    #[test]
    fn strip_templates_quotes_tokens_outside_strings() {
        let stripped = strip_templates_for_validation(r#"{"status":{{$randomInt}}}"#);
        assert_eq!(stripped, r#"{"status":"__tpl__"}"#);
        let parsed: serde_json::Value = serde_json::from_str(&stripped).unwrap();
        assert!(parsed.is_object());
    }

    #[test]
    fn strip_templates_leaves_string_tokens_unquoted() {
        let stripped = strip_templates_for_validation(r#"{"id":"{{id}}"}"#);
        assert_eq!(stripped, r#"{"id":"__tpl__"}"#);
    }
}
