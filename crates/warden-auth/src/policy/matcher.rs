//! The `<...>` pattern dialect used in policy subjects, resources and actions.
//!
//! A template without `<` matches by string equality. Otherwise every
//! `<...>` segment is a regular expression group and the text between
//! segments is literal; the whole template is anchored at both ends.
//! Delimiters nest, so `<[a-z<]+>` is one segment only if balanced.
//!
//! ```ignore
//! let matcher = PatternMatcher::new();
//! assert!(matcher.matches(&["rn:hydra:token<.*>".into()], "rn:hydra:token:abc")?);
//! ```

use std::collections::HashMap;
use std::sync::RwLock;

use regex::Regex;

use crate::{AuthError, AuthResult};

const DELIMITER_START: u8 = b'<';
const DELIMITER_END: u8 = b'>';

/// Returns `true` if `template` contains an embedded expression.
#[must_use]
pub fn has_pattern(template: &str) -> bool {
    template.as_bytes().contains(&DELIMITER_START)
}

/// Compiles a template into an anchored regular expression.
///
/// # Errors
///
/// Returns `AuthError::InvalidArgument` if the delimiters are unbalanced or
/// an embedded expression does not compile.
pub fn compile_template(template: &str) -> AuthResult<Regex> {
    let segments = delimiter_indices(template)?;

    let mut pattern = String::with_capacity(template.len() + 8);
    pattern.push('^');
    let mut end = 0;
    for (seg_start, seg_end) in segments {
        pattern.push_str(&regex::escape(&template[end..seg_start]));
        pattern.push('(');
        pattern.push_str(&template[seg_start + 1..seg_end - 1]);
        pattern.push(')');
        end = seg_end;
    }
    pattern.push_str(&regex::escape(&template[end..]));
    pattern.push('$');

    Regex::new(&pattern).map_err(|e| {
        AuthError::invalid_argument(format!("invalid pattern in '{template}': {e}"))
    })
}

/// Byte ranges of the outermost `<...>` segments, delimiters included.
fn delimiter_indices(template: &str) -> AuthResult<Vec<(usize, usize)>> {
    let mut level = 0usize;
    let mut start = 0usize;
    let mut segments = Vec::new();

    for (i, b) in template.bytes().enumerate() {
        match b {
            DELIMITER_START => {
                level += 1;
                if level == 1 {
                    start = i;
                }
            }
            DELIMITER_END => {
                if level == 0 {
                    return Err(unbalanced(template));
                }
                level -= 1;
                if level == 0 {
                    segments.push((start, i + 1));
                }
            }
            _ => {}
        }
    }

    if level != 0 {
        return Err(unbalanced(template));
    }

    Ok(segments)
}

fn unbalanced(template: &str) -> AuthError {
    AuthError::invalid_argument(format!("unbalanced braces in pattern '{template}'"))
}

/// Matches needles against policy templates, caching compiled expressions.
#[derive(Debug)]
pub struct PatternMatcher {
    regex_cache: RwLock<HashMap<String, Regex>>,
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternMatcher {
    /// Create a new pattern matcher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            regex_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Returns `true` if any template in `templates` matches `needle`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidArgument` if a template fails to compile.
    pub fn matches(&self, templates: &[String], needle: &str) -> AuthResult<bool> {
        for template in templates {
            if !has_pattern(template) {
                if template == needle {
                    return Ok(true);
                }
                continue;
            }

            if self.get_or_compile_regex(template)?.is_match(needle) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn get_or_compile_regex(&self, template: &str) -> AuthResult<Regex> {
        if let Some(re) = self
            .regex_cache
            .read()
            .ok()
            .and_then(|cache| cache.get(template).cloned())
        {
            return Ok(re);
        }

        let re = compile_template(template)?;
        if let Ok(mut cache) = self.regex_cache.write() {
            cache.insert(template.to_string(), re.clone());
        }
        Ok(re)
    }

    /// Number of compiled templates held in the cache.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.regex_cache.read().map(|c| c.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> Vec<String> {
        vec![s.to_string()]
    }

    #[test]
    fn test_compile_anchors_and_escapes() {
        let re = compile_template("rn:hydra:token<.*>").unwrap();
        assert_eq!(re.as_str(), "^rn:hydra:token(.*)$");

        let re = compile_template("a.b<[0-9]+>c").unwrap();
        assert_eq!(re.as_str(), r"^a\.b([0-9]+)c$");
        assert!(re.is_match("a.b42c"));
        assert!(!re.is_match("axb42c"));
    }

    #[test]
    fn test_compile_multiple_segments() {
        let re = compile_template("users:<[a-z]+>:posts:<[0-9]+>").unwrap();
        assert!(re.is_match("users:ken:posts:7"));
        assert!(!re.is_match("users:ken:posts:seven"));
    }

    #[test]
    fn test_nested_delimiters() {
        let re = compile_template("<[<>a-z]+>").unwrap();
        assert!(re.is_match("a<b>"));
    }

    #[test]
    fn test_unbalanced_delimiters() {
        assert!(compile_template("rn:<.*").is_err());
        assert!(compile_template("rn:.*>").is_err());
        assert!(compile_template("<a>>").is_err());
    }

    #[test]
    fn test_invalid_expression() {
        let err = compile_template("rn:<(>").unwrap_err();
        assert!(matches!(err, AuthError::InvalidArgument { .. }));
    }

    #[test]
    fn test_exact_match_without_pattern() {
        let matcher = PatternMatcher::new();
        assert!(matcher.matches(&t("matrix"), "matrix").unwrap());
        assert!(!matcher.matches(&t("matrix"), "forbidden_matrix").unwrap());
        assert!(!matcher.matches(&t("matrix"), "Matrix").unwrap());
        // '.' is literal outside of delimiters
        assert!(!matcher.matches(&t("a.c"), "abc").unwrap());
        assert_eq!(matcher.cached(), 0);
    }

    #[test]
    fn test_pattern_match_is_anchored() {
        let matcher = PatternMatcher::new();
        let templates = t("rn:hydra:token<.*>");
        assert!(matcher.matches(&templates, "rn:hydra:token").unwrap());
        assert!(matcher.matches(&templates, "rn:hydra:token:abc").unwrap());
        assert!(!matcher.matches(&templates, "xrn:hydra:token").unwrap());
        assert_eq!(matcher.cached(), 1);
    }

    #[test]
    fn test_wildcard_subject() {
        let matcher = PatternMatcher::new();
        assert!(matcher.matches(&t("<.*>"), "anything").unwrap());
        assert!(matcher.matches(&t("<.*>"), "").unwrap());
    }

    #[test]
    fn test_any_template_matches() {
        let matcher = PatternMatcher::new();
        let templates = vec!["alice".to_string(), "group<[0-9]>".to_string()];
        assert!(matcher.matches(&templates, "group1").unwrap());
        assert!(matcher.matches(&templates, "alice").unwrap());
        assert!(!matcher.matches(&templates, "group12").unwrap());
        assert!(!matcher.matches(&[], "alice").unwrap());
    }
}
