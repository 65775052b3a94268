use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::env::EnvMap;

static TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_.-]*)\}").expect("valid regex"));

/// Substitutes `{VAR}` tokens from `vars`. Tokens without a matching
/// variable are left verbatim; an unterminated `{` is literal text.
pub fn resolve(template: &str, vars: &EnvMap) -> String {
    let mut output = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((_, ch)) = chars.next() {
        if ch != '{' {
            output.push(ch);
            continue;
        }

        let mut key = String::new();
        let mut terminated = false;
        while let Some(&(_, next)) = chars.peek() {
            chars.next();
            if next == '}' {
                terminated = true;
                break;
            }
            key.push(next);
        }

        if !terminated {
            output.push('{');
            output.push_str(&key);
            continue;
        }

        match vars.get(&key) {
            Some(value) => output.push_str(value),
            None => {
                output.push('{');
                output.push_str(&key);
                output.push('}');
            }
        }
    }

    output
}

/// Resolves a URL template. After whole-string substitution, query-string
/// values are substituted independently and the query re-encoded, so
/// variable values containing reserved characters survive intact. The
/// re-encode only happens when a query value actually changed.
pub fn resolve_url(template: &str, vars: &EnvMap) -> String {
    let resolved = resolve(template, vars);

    let Ok(mut url) = Url::parse(&resolved) else {
        return resolved;
    };
    if url.query().is_none() {
        return resolved;
    }

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    let substituted: Vec<(String, String)> = pairs
        .iter()
        .map(|(name, value)| (name.clone(), resolve(value, vars)))
        .collect();

    if substituted == pairs {
        return resolved;
    }

    url.query_pairs_mut().clear().extend_pairs(&substituted);
    url.into()
}

/// First `{TOKEN}` remaining in `input`, if any.
pub fn unresolved_token(input: &str) -> Option<String> {
    TOKEN
        .captures(input)
        .map(|captures| captures[1].to_string())
}
