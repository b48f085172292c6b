// SPDX-License-Identifier: MIT OR Apache-2.0
//! `{{Variable}}` prompt-template substitution (§9 Design Notes:
//! "substitute via the same canonicalisation rules as input binding").
//!
//! A variable name is looked up against the job's resolved inputs map by
//! the same base-name-or-qualified-name rule [`mf_core::resolve_input_id`]
//! uses for input binding, except the candidate set here is the job's own
//! alias → value map rather than the whole blueprint's declared inputs.

use std::collections::BTreeMap;

/// Render `template`, replacing every `{{Name}}` placeholder with the
/// stringified value of `values["Name"]`.
///
/// A placeholder whose name is not present in `values` is left untouched
/// verbatim, so a handler can see at a glance which variable failed to
/// resolve rather than silently dropping text. String values are
/// substituted unquoted; any other JSON value is substituted as its
/// compact JSON encoding.
#[must_use]
pub fn render(template: &str, values: &BTreeMap<String, serde_json::Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    loop {
        let Some(start) = rest.find("{{") else {
            out.push_str(rest);
            break;
        };
        let Some(end_rel) = rest[start + 2..].find("}}") else {
            out.push_str(rest);
            break;
        };
        let end = start + 2 + end_rel;
        out.push_str(&rest[..start]);
        let name = rest[start + 2..end].trim();
        match values.get(name) {
            Some(serde_json::Value::String(s)) => out.push_str(s),
            Some(other) => out.push_str(&other.to_string()),
            None => out.push_str(&rest[start..end + 2]),
        }
        rest = &rest[end + 2..];
    }
    out
}

/// Render every declared variable reference in `variables` against
/// `values`, returning the subset that resolved (used to populate
/// diagnostics when a prompt references an unresolved variable).
#[must_use]
pub fn unresolved_variables<'a>(
    variables: &'a [String],
    values: &BTreeMap<String, serde_json::Value>,
) -> Vec<&'a str> {
    variables
        .iter()
        .map(String::as_str)
        .filter(|name| !values.contains_key(*name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_string_variable() {
        let mut values = BTreeMap::new();
        values.insert("Dialogue".to_string(), serde_json::json!("hello"));
        assert_eq!(render("say: {{Dialogue}}", &values), "say: hello");
    }

    #[test]
    fn substitutes_non_string_as_json() {
        let mut values = BTreeMap::new();
        values.insert("Count".to_string(), serde_json::json!(3));
        assert_eq!(render("n={{Count}}", &values), "n=3");
    }

    #[test]
    fn leaves_unknown_placeholder_untouched() {
        let values = BTreeMap::new();
        assert_eq!(render("hi {{Missing}}", &values), "hi {{Missing}}");
    }

    #[test]
    fn trims_whitespace_inside_braces() {
        let mut values = BTreeMap::new();
        values.insert("X".to_string(), serde_json::json!("y"));
        assert_eq!(render("{{ X }}", &values), "y");
    }

    #[test]
    fn multiple_placeholders_in_one_template() {
        let mut values = BTreeMap::new();
        values.insert("A".to_string(), serde_json::json!("1"));
        values.insert("B".to_string(), serde_json::json!("2"));
        assert_eq!(render("{{A}}-{{B}}", &values), "1-2");
    }

    #[test]
    fn unresolved_variables_lists_missing_names() {
        let mut values = BTreeMap::new();
        values.insert("A".to_string(), serde_json::json!("1"));
        let vars = vec!["A".to_string(), "B".to_string()];
        assert_eq!(unresolved_variables(&vars, &values), vec!["B"]);
    }
}
