// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use regex::Regex;

use crate::error::ConfigError;

/// Separator between actor path segments. `*` and `?` never cross it.
pub const PATH_SEPARATOR: char = '/';

#[derive(Clone)]
enum Matcher {
    Exact(String),
    Glob(Regex),
}

/// A glob pattern compiled once into an anchored full-match matcher.
///
/// | glob | matches |
/// |------|---------|
/// | `*`  | any run of characters except `/` |
/// | `**` | any run of characters, `/` included |
/// | `?`  | exactly one character other than `/` |
///
/// Every other character is literal, regex metacharacters included. A pattern
/// without wildcards is compared by plain string equality.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    matcher: Matcher,
}

impl Pattern {
    /// Compiles `glob` into a matcher.
    ///
    /// Fails with [`ConfigError::EmptyPattern`] for blank input and with
    /// [`ConfigError::InvalidPattern`] for runs of three or more `*`, which
    /// have no single reading.
    pub fn compile(glob: &str) -> Result<Self, ConfigError> {
        if glob.trim().is_empty() {
            return Err(ConfigError::EmptyPattern);
        }
        if glob.contains("***") {
            return Err(ConfigError::InvalidPattern {
                pattern: glob.to_string(),
                reason: "more than two consecutive '*'".to_string(),
            });
        }

        if !glob.contains(|c: char| c == '*' || c == '?') {
            return Ok(Self {
                source: glob.to_string(),
                matcher: Matcher::Exact(glob.to_string()),
            });
        }

        let regex = Regex::new(&translate(glob)).map_err(|e| ConfigError::InvalidPattern {
            pattern: glob.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            source: glob.to_string(),
            matcher: Matcher::Glob(regex),
        })
    }

    /// Returns true if the whole of `candidate` matches this pattern.
    #[inline]
    pub fn is_match(&self, candidate: &str) -> bool {
        match &self.matcher {
            Matcher::Exact(literal) => literal == candidate,
            Matcher::Glob(regex) => regex.is_match(candidate),
        }
    }

    /// The glob this pattern was compiled from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Returns true if the pattern has no wildcards.
    pub fn is_exact(&self) -> bool {
        matches!(self.matcher, Matcher::Exact(_))
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.source).finish()
    }
}

/// Translates a glob into an anchored regular expression.
fn translate(glob: &str) -> String {
    // (?s) lets `.*` cross newlines as well as separators.
    let mut out = String::with_capacity(glob.len() * 2 + 8);
    out.push_str("(?s)^");

    let mut chars = glob.chars().peekable();
    let mut buf = [0u8; 4];
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str(".*");
            }
            '*' => {
                out.push_str("[^");
                out.push_str(&regex::escape(PATH_SEPARATOR.encode_utf8(&mut buf)));
                out.push_str("]*");
            }
            '?' => {
                out.push_str("[^");
                out.push_str(&regex::escape(PATH_SEPARATOR.encode_utf8(&mut buf)));
                out.push(']');
            }
            other => out.push_str(&regex::escape(other.encode_utf8(&mut buf))),
        }
    }

    out.push('$');
    out
}
