//! Script normalisation to the canonical `pm.*` surface
//!
//! Pure text transformation: dialect-specific idioms (`bru.*`,
//! `insomnia.*`, `res.*`, Insomnia `_.name` references) are rewritten so
//! the runtime only ever implements one API. Normalisation is a fixed
//! point: running it on already-normalised text is the identity.

use once_cell::sync::Lazy;
use regex::Regex;

static INSOMNIA_NAMESPACE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\binsomnia\.(environment|globals|request|response)\.").expect("valid regex")
});
static BRACKET_HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\b(pm\.(?:request|response)\.headers)\[\s*(?:'([^'\]]+)'|"([^"\]]+)")\s*\]"#)
        .expect("valid regex")
});
static BARE_ENV_REF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|[^\w$.])_\.([A-Za-z_][A-Za-z0-9_]*)").expect("valid regex"));
static RES_STATUS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:res|pm\.response)\.status\b").expect("valid regex"));
static RES_BODY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:res\.getBody\(\)|res\.body\b|pm\.response\.body\b)").expect("valid regex")
});

/// Rewrite a dialect script into the canonical `pm.*` surface.
pub fn normalize_script(source: &str) -> String {
    let mut out = source.to_string();

    // Bruno variable helpers first, then the blanket namespace rename.
    out = out.replace("bru.setEnvVar(", "pm.environment.set(");
    out = out.replace("bru.getEnvVar(", "pm.environment.get(");
    out = out.replace("bru.setVar(", "pm.environment.set(");
    out = out.replace("bru.getVar(", "pm.environment.get(");
    out = out.replace("bru.", "pm.");

    // Insomnia namespaces map 1:1 onto pm ones.
    out = INSOMNIA_NAMESPACE_RE.replace_all(&out, "pm.$1.").into_owned();

    // Response accessors. getBody()/body → json(), status → code().
    // `status` uses a word boundary so `statusText` survives untouched.
    out = RES_BODY_RE.replace_all(&out, "pm.response.json()").into_owned();
    out = RES_STATUS_RE.replace_all(&out, "pm.response.code()").into_owned();

    // Header bracket access becomes the case-insensitive get().
    out = BRACKET_HEADER_RE
        .replace_all(&out, |caps: &regex::Captures| {
            let name = caps.get(2).or_else(|| caps.get(3)).expect("one quote variant matches");
            format!("{}.get(\"{}\")", &caps[1], name.as_str())
        })
        .into_owned();

    // Insomnia bare environment references.
    out = BARE_ENV_REF_RE
        .replace_all(&out, |caps: &regex::Captures| {
            format!("{}pm.environment.get('{}')", &caps[1], &caps[2])
        })
        .into_owned();

    out
}
