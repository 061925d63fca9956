//! Module-argument parsing.
//!
//! Virtual table modules receive their configuration as a list of raw
//! argument strings from the statement that created or connected the
//! table. The conventional form is `key=value` with optional single or
//! double quoting around the value; these helpers split, dequote, and
//! interpret such arguments.

use crate::error::{BridgeError, Result};

/// Strips one level of matching single or double quotes.
///
/// Strings shorter than two characters, or with mismatched ends, are
/// returned unchanged.
///
/// # Examples
///
/// ```
/// use vtab_bridge_core::args::dequote;
///
/// assert_eq!(dequote("'rows'"), "rows");
/// assert_eq!(dequote("\"rows\""), "rows");
/// assert_eq!(dequote("rows"), "rows");
/// assert_eq!(dequote("'"), "'");
/// ```
#[must_use]
pub fn dequote(s: &str) -> &str {
    if s.len() < 2 {
        return s;
    }
    let bytes = s.as_bytes();
    match bytes[0] {
        b'\'' | b'"' if bytes[bytes.len() - 1] == bytes[0] => &s[1..s.len() - 1],
        _ => s,
    }
}

/// Interprets a boolean argument value.
///
/// Accepts `1`/`yes`/`on`/`true` and `0`/`no`/`off`/`false`, case
/// insensitively; anything else is `None`.
#[must_use]
pub fn parse_boolean(s: &str) -> Option<bool> {
    if s.eq_ignore_ascii_case("yes")
        || s.eq_ignore_ascii_case("on")
        || s.eq_ignore_ascii_case("true")
        || s == "1"
    {
        Some(true)
    } else if s.eq_ignore_ascii_case("no")
        || s.eq_ignore_ascii_case("off")
        || s.eq_ignore_ascii_case("false")
        || s == "0"
    {
        Some(false)
    } else {
        None
    }
}

/// Splits a `key=value` module argument into its trimmed, dequoted parts.
///
/// # Errors
///
/// Returns [`BridgeError::ModuleArgument`] when the argument has no `=`.
///
/// # Examples
///
/// ```
/// use vtab_bridge_core::args::parameter;
///
/// assert_eq!(parameter("rows=5").unwrap(), ("rows", "5"));
/// assert_eq!(parameter("name='a=b'").unwrap(), ("name", "a=b"));
/// assert!(parameter("rows").is_err());
/// ```
pub fn parameter(arg: &str) -> Result<(&str, &str)> {
    match arg.trim().split_once('=') {
        Some((key, value)) => Ok((key.trim(), dequote(value.trim()))),
        None => Err(BridgeError::ModuleArgument(arg.trim().to_string())),
    }
}
