//! Label matchers used to select series.
//!
//! A [`LabelMatcher`] is a predicate over one label of a series. A series
//! that lacks the label is matched as if the label had the empty string as
//! its value, which is why matchers such as `foo=""` or `foo!="bar"` cannot
//! be answered from a label index alone. [`split_filters_and_matchers`]
//! separates those out.

use std::fmt;
use std::str::FromStr;

use regex::Regex;

use crate::error::MatcherError;
use crate::model::Metric;

/// The comparison a [`LabelMatcher`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchType {
    /// `name="value"`
    Equal,
    /// `name!="value"`
    NotEqual,
    /// `name=~"regex"`
    RegexMatch,
    /// `name!~"regex"`
    RegexNoMatch,
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::RegexMatch => "=~",
            Self::RegexNoMatch => "!~",
        })
    }
}

/// A predicate over a single label name and value.
///
/// Regex matchers are fully anchored: `job=~"api"` matches `api` but not
/// `api-gateway`.
///
/// # Examples
///
/// ```rust
/// use lazyseries::matcher::{LabelMatcher, MatchType};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let m = LabelMatcher::new(MatchType::RegexMatch, "job", "api|web")?;
/// assert!(m.matches("web"));
/// assert!(!m.matches("webhook"));
///
/// let parsed: LabelMatcher = "env!=prod".parse()?;
/// assert_eq!(parsed.match_type(), MatchType::NotEqual);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LabelMatcher {
    match_type: MatchType,
    name: String,
    value: String,
    re: Option<Regex>,
}

impl LabelMatcher {
    /// Creates a new matcher.
    ///
    /// # Errors
    ///
    /// Returns [`MatcherError::InvalidRegex`] if `match_type` is a regex
    /// match and `value` does not compile.
    pub fn new(
        match_type: MatchType,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, MatcherError> {
        let value = value.into();
        let re = match match_type {
            MatchType::RegexMatch | MatchType::RegexNoMatch => Some(
                Regex::new(&format!("^(?:{value})$")).map_err(|source| {
                    MatcherError::InvalidRegex {
                        pattern: value.clone(),
                        source,
                    }
                })?,
            ),
            MatchType::Equal | MatchType::NotEqual => None,
        };

        Ok(Self {
            match_type,
            name: name.into(),
            value,
            re,
        })
    }

    /// Creates an equality matcher. Never fails.
    pub fn equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            match_type: MatchType::Equal,
            name: name.into(),
            value: value.into(),
            re: None,
        }
    }

    /// Returns the comparison this matcher performs.
    pub fn match_type(&self) -> MatchType {
        self.match_type
    }

    /// Returns the label name this matcher inspects.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the value or pattern this matcher compares against.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Checks a label value against this matcher.
    pub fn matches(&self, value: &str) -> bool {
        match (self.match_type, &self.re) {
            (MatchType::Equal, _) => self.value == value,
            (MatchType::NotEqual, _) => self.value != value,
            (MatchType::RegexMatch, Some(re)) => re.is_match(value),
            (MatchType::RegexNoMatch, Some(re)) => !re.is_match(value),
            // Regex matchers are only constructed with a compiled pattern.
            (MatchType::RegexMatch | MatchType::RegexNoMatch, None) => false,
        }
    }

    /// Checks a series against this matcher; a missing label matches as "".
    pub fn matches_metric(&self, metric: &Metric) -> bool {
        self.matches(metric.get(&self.name).unwrap_or(""))
    }
}

impl PartialEq for LabelMatcher {
    fn eq(&self, other: &Self) -> bool {
        self.match_type == other.match_type && self.name == other.name && self.value == other.value
    }
}

impl fmt::Display for LabelMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{:?}", self.name, self.match_type, self.value)
    }
}

impl FromStr for LabelMatcher {
    type Err = MatcherError;

    /// Parses `name=value`, `name!=value`, `name=~re` or `name!~re`.
    /// The value is taken verbatim; no quoting is required.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MatcherError::InvalidSyntax {
            input: s.to_string(),
        };

        let op_start = s.find(['=', '!']).ok_or_else(invalid)?;
        let (name, rest) = s.split_at(op_start);
        if name.is_empty() {
            return Err(invalid());
        }

        let (match_type, value) = if let Some(v) = rest.strip_prefix("!=") {
            (MatchType::NotEqual, v)
        } else if let Some(v) = rest.strip_prefix("!~") {
            (MatchType::RegexNoMatch, v)
        } else if let Some(v) = rest.strip_prefix("=~") {
            (MatchType::RegexMatch, v)
        } else if let Some(v) = rest.strip_prefix('=') {
            (MatchType::Equal, v)
        } else {
            return Err(invalid());
        };

        Self::new(match_type, name, value)
    }
}

/// Splits matchers into filters and index matchers.
///
/// Every matcher that matches the empty string becomes a filter: a store
/// cannot narrow its fetch with it, because series without the label would
/// be missed, so it must be applied after the chunks are fetched. All other
/// matchers can be answered from the label index. Order is preserved within
/// each group.
///
/// Returns `(filters, matchers)`.
pub fn split_filters_and_matchers(all: &[LabelMatcher]) -> (Vec<LabelMatcher>, Vec<LabelMatcher>) {
    all.iter().cloned().partition(|m| m.matches(""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_types() {
        let eq = LabelMatcher::equal("job", "api");
        assert!(eq.matches("api"));
        assert!(!eq.matches("web"));

        let ne = LabelMatcher::new(MatchType::NotEqual, "job", "api").unwrap();
        assert!(!ne.matches("api"));
        assert!(ne.matches(""));

        let re = LabelMatcher::new(MatchType::RegexMatch, "job", "a.i").unwrap();
        assert!(re.matches("api"));
        assert!(!re.matches("apis"));

        let nre = LabelMatcher::new(MatchType::RegexNoMatch, "job", "a.*").unwrap();
        assert!(!nre.matches("api"));
        assert!(nre.matches("web"));
    }

    #[test]
    fn test_invalid_regex_is_rejected() {
        let result = LabelMatcher::new(MatchType::RegexMatch, "job", "(");
        match result {
            Err(MatcherError::InvalidRegex { pattern, .. }) => assert_eq!(pattern, "("),
            other => panic!("Expected InvalidRegex error, got: {:?}", other),
        }
    }

    #[test]
    fn test_missing_label_matches_as_empty() {
        let metric = Metric::new([("__name__", "up")]);
        assert!(LabelMatcher::equal("job", "").matches_metric(&metric));
        assert!(!LabelMatcher::equal("job", "api").matches_metric(&metric));
        assert!(LabelMatcher::new(MatchType::NotEqual, "job", "api")
            .unwrap()
            .matches_metric(&metric));
    }

    #[test]
    fn test_parse() {
        let cases = [
            ("job=api", MatchType::Equal, "job", "api"),
            ("job!=api", MatchType::NotEqual, "job", "api"),
            ("job=~a.*", MatchType::RegexMatch, "job", "a.*"),
            ("job!~a.*", MatchType::RegexNoMatch, "job", "a.*"),
            ("job=", MatchType::Equal, "job", ""),
            ("path=/a=b", MatchType::Equal, "path", "/a=b"),
        ];
        for (input, match_type, name, value) in cases {
            let m: LabelMatcher = input.parse().unwrap();
            assert_eq!(m.match_type(), match_type, "{input}");
            assert_eq!(m.name(), name, "{input}");
            assert_eq!(m.value(), value, "{input}");
        }

        assert!("job".parse::<LabelMatcher>().is_err());
        assert!("=api".parse::<LabelMatcher>().is_err());
        assert!("job!api".parse::<LabelMatcher>().is_err());
    }

    #[test]
    fn test_display() {
        let m = LabelMatcher::new(MatchType::RegexNoMatch, "job", "a.*").unwrap();
        assert_eq!(m.to_string(), r#"job!~"a.*""#);
    }

    #[test]
    fn test_split_filters_and_matchers() {
        let all = vec![
            LabelMatcher::equal("__name__", "up"),
            LabelMatcher::equal("job", ""),
            LabelMatcher::new(MatchType::NotEqual, "env", "prod").unwrap(),
            LabelMatcher::new(MatchType::RegexMatch, "instance", ".+").unwrap(),
            LabelMatcher::new(MatchType::RegexMatch, "zone", ".*").unwrap(),
        ];

        let (filters, matchers) = split_filters_and_matchers(&all);

        let filter_names: Vec<_> = filters.iter().map(LabelMatcher::name).collect();
        let matcher_names: Vec<_> = matchers.iter().map(LabelMatcher::name).collect();
        assert_eq!(filter_names, vec!["job", "env", "zone"]);
        assert_eq!(matcher_names, vec!["__name__", "instance"]);
    }
}
