use crate::Error;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

// field-name = token
static NAME_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[!#$%&'*+\-.^_`|~0-9A-Za-z]+$").unwrap());

/// Normalize request headers before they go on the wire.
///
/// Names are trimmed and lower-cased, values are trimmed. When two names collapse to the same key
/// the later one wins. The caller's headers are left untouched.
pub fn normalize<'a, I>(headers: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = &'a (String, String)>,
{
    headers
        .into_iter()
        .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

/// Check that normalized headers can be written into a request head as they are.
///
/// Names must be tokens. Values must not hold control characters other than horizontal tab, so
/// a line break can never end a header early.
pub(crate) fn validate(headers: &HashMap<String, String>) -> Result<(), Error> {
    for (name, value) in headers {
        if !NAME_REGEX.is_match(name) {
            return Err(Error::invalid_input(format!("invalid header name: {name:?}")));
        }
        if value.chars().any(|c| c.is_control() && c != '\t') {
            return Err(Error::invalid_input(format!("invalid value for header {name}")));
        }
    }
    Ok(())
}
