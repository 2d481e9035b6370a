//! Field rules applied during projection
//!
//! Rules are parsed once from configuration strings and are immutable
//! afterwards. Paths and names refer to the projected (renamed) JSON tree.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::ConfigError;

/// Separator between rules in `protobuf.json.exclude.properties`.
pub const RULE_DELIMITER: char = ',';

/// Separator between path segments inside one rule.
pub const PATH_DELIMITER: char = '.';

/// A configured projection rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRule {
    Skip(SkipRule),
    DateFormat(DateRule),
}

/// Remove `field` from the object found by walking `path` from the root.
///
/// An empty path addresses the root object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SkipRule {
    pub path: Vec<String>,
    pub field: String,
}

impl SkipRule {
    /// Parse `a.b.c` into path `[a, b]` and field `c`.
    pub fn parse(rule: &str) -> Option<Self> {
        let rule = rule.trim();
        if rule.is_empty() {
            return None;
        }
        let mut segments: Vec<String> = rule
            .split(PATH_DELIMITER)
            .map(|s| s.trim().to_string())
            .collect();
        if segments.iter().any(String::is_empty) {
            return None;
        }
        let field = segments.pop()?;
        Some(Self {
            path: segments,
            field,
        })
    }

    /// Parse a delimited rule list. Blank input yields no rules.
    pub fn parse_list(
        key: &'static str,
        list: &str,
    ) -> std::result::Result<Vec<Self>, ConfigError> {
        if list.trim().is_empty() {
            return Ok(Vec::new());
        }
        let mut rules: Vec<Self> = Vec::new();
        for raw in list.split(RULE_DELIMITER) {
            let rule = Self::parse(raw).ok_or_else(|| {
                ConfigError::invalid(key, format!("malformed field path '{}'", raw.trim()))
            })?;
            if !rules.contains(&rule) {
                rules.push(rule);
            }
        }
        Ok(rules)
    }
}

impl std::fmt::Display for SkipRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for segment in &self.path {
            write!(f, "{}{}", segment, PATH_DELIMITER)?;
        }
        write!(f, "{}", self.field)
    }
}

/// How a matched date field is rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateConversion {
    /// Leave values untouched
    #[default]
    None,
    /// Integer microseconds since the Unix epoch to
    /// `yyyy-MM-ddTHH:mm:ss.SSS+00:00`
    MicrosToRfc3339,
}

impl DateConversion {
    /// Convert a raw integer. `None` when the mode does not apply.
    pub fn convert(&self, raw: i64) -> Option<String> {
        match self {
            DateConversion::None => None,
            DateConversion::MicrosToRfc3339 => micros_to_rfc3339(raw),
        }
    }
}

impl std::str::FromStr for DateConversion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "none" => Ok(DateConversion::None),
            "micros-to-rfc3339" | "micros_to_rfc3339" => Ok(DateConversion::MicrosToRfc3339),
            other => Err(format!("unknown date conversion mode '{other}'")),
        }
    }
}

/// Render epoch microseconds as RFC 3339 with millisecond precision and an
/// explicit `+00:00` offset.
pub fn micros_to_rfc3339(micros: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_micros(micros)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, false))
}

/// Selects which fields receive date conversion, by projected name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DateRule {
    pub mode: DateConversion,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
}

impl DateRule {
    /// A rule is active when it has a mode and at least one matcher.
    pub fn is_active(&self) -> bool {
        self.mode != DateConversion::None && (self.prefix.is_some() || self.suffix.is_some())
    }

    pub fn matches(&self, name: &str) -> bool {
        if !self.is_active() {
            return false;
        }
        let by_prefix = self.prefix.as_deref().is_some_and(|p| name.starts_with(p));
        let by_suffix = self.suffix.as_deref().is_some_and(|s| name.ends_with(s));
        by_prefix || by_suffix
    }
}

/// Field name rewrite applied once per source field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaseConversion {
    /// Keep source names as-is
    None,
    /// `first_name` becomes `firstName`
    #[default]
    LowerCamel,
}

impl CaseConversion {
    pub fn apply(&self, s: &str) -> String {
        match self {
            CaseConversion::None => s.to_string(),
            CaseConversion::LowerCamel => to_lower_camel(s),
        }
    }
}

impl std::str::FromStr for CaseConversion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "preserve" => Ok(CaseConversion::None),
            "camel" | "lower_camel" | "camelcase" => Ok(CaseConversion::LowerCamel),
            other => Err(format!("unknown field case '{other}'")),
        }
    }
}

/// Lower-underscore to lower-camel.
///
/// Each underscore-separated word after the first is capitalised and the
/// rest of the word lower-cased; the first word is lower-cased. Leading,
/// trailing and repeated underscores are dropped.
pub fn to_lower_camel(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for word in s.split('_').filter(|w| !w.is_empty()) {
        if result.is_empty() {
            result.push_str(&word.to_lowercase());
            continue;
        }
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            result.extend(first.to_uppercase());
            result.push_str(&chars.as_str().to_lowercase());
        }
    }
    result
}
