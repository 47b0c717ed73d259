//! Placeholder scanning and substitution
//!
//! Two placeholder syntaxes are recognised throughout a collection:
//! `{{name}}` and `${name}`. A closed set of pseudo-variables (uuid,
//! timestamps, randoms) is generated inline instead of resolved from the
//! run scope.

use crate::model::VariableScope;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use std::collections::BTreeSet;

/// Pseudo-variables that are generated, never resolved from a scope.
pub const PSEUDO_VARIABLES: &[&str] = &[
    "uuid",
    "timestamp",
    "randomInt",
    "randomAlpha",
    "guid",
    "$randomInt",
    "$randomString",
    "$timestamp",
    "$guid",
];

static BRACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*(\$?[A-Za-z_][A-Za-z0-9_.-]*)\s*\}\}").expect("valid regex"));
static DOLLAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{\s*(\$?[A-Za-z_][A-Za-z0-9_.-]*)\s*\}").expect("valid regex"));

/// Whether a name belongs to the generated pseudo-variable set
pub fn is_pseudo_variable(name: &str) -> bool {
    PSEUDO_VARIABLES.contains(&name)
}

/// Collect the variable names referenced by `input`, excluding
/// pseudo-variables.
pub fn referenced_variables(input: &str) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for re in [&*BRACE_RE, &*DOLLAR_RE] {
        for caps in re.captures_iter(input) {
            let name = &caps[1];
            if !is_pseudo_variable(name) {
                names.insert(name.to_string());
            }
        }
    }
    names
}

/// Substitute every `{{name}}` and `${name}` token from the scope.
///
/// Pseudo-variables expand to generated values. Names the scope does not
/// know stay in place so the caller can detect unresolved tokens.
pub fn substitute(input: &str, scope: &VariableScope) -> String {
    let replace = |caps: &regex::Captures| -> String {
        let name = &caps[1];
        if is_pseudo_variable(name) {
            return generate_pseudo(name);
        }
        match scope.get(name) {
            Some(value) => value.to_string(),
            None => caps[0].to_string(),
        }
    };
    let pass = BRACE_RE.replace_all(input, replace);
    DOLLAR_RE.replace_all(&pass, replace).into_owned()
}

/// Whether any placeholder token survives in `input`.
pub fn has_unresolved(input: &str) -> bool {
    BRACE_RE.is_match(input) || DOLLAR_RE.is_match(input)
}

fn generate_pseudo(name: &str) -> String {
    match name {
        "uuid" | "guid" | "$guid" => uuid::Uuid::new_v4().to_string(),
        "timestamp" | "$timestamp" => chrono::Utc::now().timestamp().to_string(),
        "randomInt" | "$randomInt" => rand::rng().random_range(0..=1000).to_string(),
        "randomAlpha" | "$randomString" => {
            let mut rng = rand::rng();
            (0..10)
                .map(|_| (b'a' + rng.random_range(0..26u8)) as char)
                .collect()
        }
        _ => name.to_string(),
    }
}
