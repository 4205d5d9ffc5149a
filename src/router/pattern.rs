//! Path templates with `{name}` placeholders.
//!
//! A template such as `/users/{id}/posts/{post}` is split into literal
//! segments and variable slots (always one more literal than variables) and
//! compiled into a single anchored regex. Each variable defaults to ASCII
//! word characters and can be narrowed with
//! [`UrlPattern::set_variable_pattern`].

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use smallvec::SmallVec;

use super::error::RouteError;

/// Default variable regex: one or more ASCII word characters.
pub const DEFAULT_VARIABLE_REGEX: &str = "[A-Za-z0-9_]+";

/// Maximum number of URL variables before heap allocation.
/// Most templates have ≤4 variables (e.g. /users/{id}/posts/{post}).
pub const MAX_INLINE_PARAMS: usize = 8;

/// Matched URL variables in declaration order, URL-decoded.
///
/// Names are `Arc<str>` shared with the compiled pattern, so a match only
/// allocates the values.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// Look up a matched variable by name.
#[inline]
#[must_use]
pub fn param<'a>(params: &'a ParamVec, name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k.as_ref() == name)
        .map(|(_, v)| v.as_str())
}

/// A compiled path template: matcher and URL generator.
#[derive(Clone)]
pub struct UrlPattern {
    original: String,
    literals: Vec<String>,
    variables: Vec<Arc<str>>,
    regexes: Vec<String>,
    validators: Vec<Regex>,
    matcher: Regex,
    /// Capture group index of each variable in `matcher`.
    groups: Vec<usize>,
}

impl UrlPattern {
    /// Parse and compile a template.
    ///
    /// # Errors
    ///
    /// [`RouteError::InvalidPattern`] for unbalanced braces, empty or
    /// non-word variable names, and duplicated names.
    pub fn new(template: &str) -> Result<Self, RouteError> {
        let (literals, variables) = split_template(template)?;
        let regexes = vec![DEFAULT_VARIABLE_REGEX.to_string(); variables.len()];
        let validators = regexes
            .iter()
            .zip(&variables)
            .map(|(re, name)| anchored(name, re))
            .collect::<Result<Vec<_>, _>>()?;
        let (matcher, groups) = compile_matcher(template, &literals, &regexes)?;
        Ok(Self {
            original: template.to_string(),
            literals,
            variables,
            regexes,
            validators,
            matcher,
            groups,
        })
    }

    /// The template this pattern was built from.
    #[must_use]
    pub fn original(&self) -> &str {
        &self.original
    }

    /// Variable names in declaration order.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(|v| v.as_ref())
    }

    #[must_use]
    pub fn has_variable(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Regex currently used for `name`.
    #[must_use]
    pub fn variable_pattern(&self, name: &str) -> Option<&str> {
        self.position(name).map(|i| self.regexes[i].as_str())
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|v| v.as_ref() == name)
    }

    /// Override the regex of one variable.
    ///
    /// # Errors
    ///
    /// [`RouteError::UnknownVariable`] when the template has no such
    /// variable, [`RouteError::InvalidRegex`] when `regex` does not compile.
    pub fn set_variable_pattern(&mut self, name: &str, regex: &str) -> Result<&mut Self, RouteError> {
        let index = self
            .position(name)
            .ok_or_else(|| RouteError::UnknownVariable {
                pattern: self.original.clone(),
                name: name.to_string(),
            })?;
        let validator = anchored(name, regex)?;
        let mut regexes = self.regexes.clone();
        regexes[index] = regex.to_string();
        (self.matcher, self.groups) = compile_matcher(&self.original, &self.literals, &regexes)?;
        self.regexes = regexes;
        self.validators[index] = validator;
        Ok(self)
    }

    /// Match a whole path. Returns `None` on no match; a pattern without
    /// variables matches with an empty set.
    #[must_use]
    pub fn matches(&self, path: &str) -> Option<ParamVec> {
        let captures = self.matcher.captures(path)?;
        let mut params = ParamVec::new();
        for (name, &group) in self.variables.iter().zip(&self.groups) {
            let raw = captures.get(group).map_or("", |m| m.as_str());
            let value = urlencoding::decode(raw)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| raw.to_string());
            params.push((Arc::clone(name), value));
        }
        Some(params)
    }

    /// Build a URL from variable values; the inverse of [`UrlPattern::matches`].
    ///
    /// Values are checked against their variable's regex, then
    /// percent-encoded. Literal segments are inserted verbatim. Extra values
    /// are ignored.
    ///
    /// # Errors
    ///
    /// [`RouteError::MissingParameter`] or [`RouteError::ParameterMismatch`].
    pub fn build_url<I, K, V>(&self, values: I) -> Result<String, RouteError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let values: Vec<(K, V)> = values.into_iter().collect();
        let mut url = String::with_capacity(self.original.len() + 16);
        url.push_str(&self.literals[0]);
        for (i, name) in self.variables.iter().enumerate() {
            let value = values
                .iter()
                .rev()
                .find(|(k, _)| k.as_ref() == name.as_ref())
                .map(|(_, v)| v.as_ref())
                .ok_or_else(|| RouteError::MissingParameter {
                    pattern: self.original.clone(),
                    name: name.to_string(),
                })?;
            if !self.validators[i].is_match(value) {
                return Err(RouteError::ParameterMismatch {
                    name: name.to_string(),
                    value: value.to_string(),
                    regex: self.regexes[i].clone(),
                });
            }
            url.push_str(&encode_path_value(value));
            url.push_str(&self.literals[i + 1]);
        }
        Ok(url)
    }
}

impl fmt::Debug for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlPattern")
            .field("original", &self.original)
            .field("variables", &self.variables)
            .field("regexes", &self.regexes)
            .finish()
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

/// Percent-encode a value for a path, keeping `/` so multi-segment
/// variables survive.
pub(crate) fn encode_path_value(value: &str) -> String {
    urlencoding::encode(value).replace("%2F", "/")
}

pub(crate) fn split_template(template: &str) -> Result<(Vec<String>, Vec<Arc<str>>), RouteError> {
    let invalid = |reason: &str| RouteError::InvalidPattern {
        pattern: template.to_string(),
        reason: reason.to_string(),
    };

    let mut literals = Vec::new();
    let mut variables: Vec<Arc<str>> = Vec::new();
    let mut rest = template;
    loop {
        match rest.find(['{', '}']) {
            None => {
                literals.push(rest.to_string());
                break;
            }
            Some(pos) if rest[pos..].starts_with('}') => return Err(invalid("unexpected `}`")),
            Some(open) => {
                let close = rest[open..]
                    .find('}')
                    .map(|c| open + c)
                    .ok_or_else(|| invalid("unclosed `{`"))?;
                let name = &rest[open + 1..close];
                if name.is_empty() {
                    return Err(invalid("empty variable name"));
                }
                if !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
                    return Err(invalid(&format!("variable name `{name}` is not a word")));
                }
                if variables.iter().any(|v| v.as_ref() == name) {
                    return Err(invalid(&format!("variable `{name}` declared twice")));
                }
                literals.push(rest[..open].to_string());
                variables.push(Arc::from(name));
                rest = &rest[close + 1..];
            }
        }
    }
    Ok((literals, variables))
}

fn anchored(name: &str, regex: &str) -> Result<Regex, RouteError> {
    Regex::new(&format!("^(?:{regex})$")).map_err(|source| RouteError::InvalidRegex {
        name: name.to_string(),
        source,
    })
}

fn group_name(index: usize) -> String {
    format!("__var{index}")
}

/// Compile the full-path matcher. Each variable gets a named group, so groups
/// inside user regexes cannot shift the variables that follow.
fn compile_matcher(
    template: &str,
    literals: &[String],
    regexes: &[String],
) -> Result<(Regex, Vec<usize>), RouteError> {
    let mut pattern = String::with_capacity(template.len() * 2 + 8);
    pattern.push('^');
    pattern.push_str(&regex::escape(&literals[0]));
    for (i, (regex, literal)) in regexes.iter().zip(&literals[1..]).enumerate() {
        pattern.push_str("(?P<");
        pattern.push_str(&group_name(i));
        pattern.push_str(">(?:");
        pattern.push_str(regex);
        pattern.push_str("))");
        pattern.push_str(&regex::escape(literal));
    }
    pattern.push('$');
    let matcher = Regex::new(&pattern).map_err(|source| RouteError::InvalidRegex {
        name: template.to_string(),
        source,
    })?;
    let groups = (0..regexes.len())
        .map(|i| {
            let name = group_name(i);
            matcher
                .capture_names()
                .position(|n| n == Some(name.as_str()))
                .ok_or_else(|| RouteError::InvalidPattern {
                    pattern: template.to_string(),
                    reason: format!("variable regex redefines group `{name}`"),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok((matcher, groups))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_template() {
        let (lits, vars) = split_template("/a/{b}/c/{d}").unwrap();
        assert_eq!(lits, vec!["/a/", "/c/", ""]);
        assert_eq!(vars.iter().map(|v| v.as_ref()).collect::<Vec<_>>(), vec!["b", "d"]);
    }

    #[test]
    fn test_rejects_bad_templates() {
        for bad in ["/{", "/}", "/{}", "/{a-b}", "/{a}/{a}"] {
            assert!(
                matches!(UrlPattern::new(bad), Err(RouteError::InvalidPattern { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_literal_regex_characters_are_escaped() {
        let p = UrlPattern::new("/file.txt").unwrap();
        assert!(p.matches("/file.txt").is_some());
        assert!(p.matches("/fileXtxt").is_none());
    }

    #[test]
    fn test_variable_groups_stay_aligned() {
        let mut p = UrlPattern::new("/{a}/{b}").unwrap();
        p.set_variable_pattern("a", "(x)(y)").unwrap();
        let m = p.matches("/xy/z").unwrap();
        assert_eq!(param(&m, "a"), Some("xy"));
        assert_eq!(param(&m, "b"), Some("z"));

        let mut p = UrlPattern::new("/{a}/{b}/{c}").unwrap();
        p.set_variable_pattern("b", r"(red|blue)-(\d+)").unwrap();
        let m = p.matches("/x/blue-7/end").unwrap();
        assert_eq!(param(&m, "a"), Some("x"));
        assert_eq!(param(&m, "b"), Some("blue-7"));
        assert_eq!(param(&m, "c"), Some("end"));
        assert_eq!(p.build_url([("a", "y"), ("b", "red-1"), ("c", "z")]).unwrap(), "/y/red-1/z");
    }

    #[test]
    fn test_values_are_decoded() {
        let mut p = UrlPattern::new("/q/{term}").unwrap();
        p.set_variable_pattern("term", "[^/]+").unwrap();
        let m = p.matches("/q/hello%20world").unwrap();
        assert_eq!(param(&m, "term"), Some("hello world"));
        assert_eq!(p.build_url([("term", "hello world")]).unwrap(), "/q/hello%20world");
    }
}
