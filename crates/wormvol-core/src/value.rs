//! Typed scalars for console attribute values.
//!
//! `bconsole` prints every attribute as text. Numbers are grouped with the
//! director's locale (`31,536,000`), unset dates print as the zero-date
//! sentinel, and real dates carry second precision. [`ValueCoercer`] turns one
//! raw value into a [`Value`] using first-match classification:
//!
//! 1. locale decimal (`1,234.50`) → [`Value::Float`]
//! 2. locale integer (`1,234`) → [`Value::Integer`]
//! 3. `0000-00-00 00:00:00` → [`Value::Null`]
//! 4. empty string → [`Value::Null`]
//! 5. `YYYY-MM-DD HH:MM:SS…` → [`Value::Timestamp`]
//! 6. anything else → [`Value::Text`], unchanged
//!
//! Numeric classes come first so that digit strings are never read as dates.

use std::fmt;
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Sentinel the catalog prints for a date that was never set.
pub const ZERO_DATE: &str = "0000-00-00 00:00:00";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const TIMESTAMP_LEN: usize = 19;

static TIMESTAMP_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2} [0-9]{2}:[0-9]{2}:[0-9]{2}").unwrap());

/// Digit grouping and decimal point used by the catalog's number formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumericLocale {
    /// Thousands separator; `None` when the locale does not group digits.
    pub thousands_sep: Option<char>,
    pub decimal_point: char,
}

impl NumericLocale {
    pub const EN_US: Self = Self {
        thousands_sep: Some(','),
        decimal_point: '.',
    };
    pub const DE_DE: Self = Self {
        thousands_sep: Some('.'),
        decimal_point: ',',
    };
    /// glibc groups French numbers with U+202F NARROW NO-BREAK SPACE.
    pub const FR_FR: Self = Self {
        thousands_sep: Some('\u{202f}'),
        decimal_point: ',',
    };
    pub const C: Self = Self {
        thousands_sep: None,
        decimal_point: '.',
    };

    /// Resolve a locale name such as `en_US.UTF-8`.
    ///
    /// The codeset suffix is ignored and matching is case-insensitive.
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        let base = name.split(['.', '@']).next().unwrap_or_default();
        match base.to_ascii_lowercase().as_str() {
            "en_us" | "en" => Ok(Self::EN_US),
            "de_de" | "de" => Ok(Self::DE_DE),
            "fr_fr" | "fr" => Ok(Self::FR_FR),
            "c" | "posix" => Ok(Self::C),
            _ => Err(ConfigError::UnknownLocale(name.to_string())),
        }
    }
}

impl Default for NumericLocale {
    fn default() -> Self {
        Self::EN_US
    }
}

/// One coerced attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Float(f64),
    Integer(i64),
    Timestamp(NaiveDateTime),
    Null,
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
            Self::Null => f.write_str("null"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Converts raw attribute text into [`Value`]s for one numeric locale.
#[derive(Debug, Clone)]
pub struct ValueCoercer {
    locale: NumericLocale,
    decimal: Regex,
    integer: Regex,
}

impl ValueCoercer {
    #[must_use]
    pub fn new(locale: NumericLocale) -> Self {
        let groups = locale.thousands_sep.map_or_else(
            || "[0-9]+".to_string(),
            |sep| {
                let sep = regex::escape(&sep.to_string());
                format!("[0-9]{{1,3}}(?:{sep}[0-9]{{3}})*")
            },
        );
        let point = regex::escape(&locale.decimal_point.to_string());

        Self {
            locale,
            decimal: Regex::new(&format!("^{groups}{point}[0-9]+$"))
                .expect("decimal pattern is built from escaped literals"),
            integer: Regex::new(&format!("^{groups}$"))
                .expect("integer pattern is built from escaped literals"),
        }
    }

    #[must_use]
    pub fn locale(&self) -> NumericLocale {
        self.locale
    }

    /// Classify and convert one raw value.
    #[must_use]
    pub fn coerce(&self, raw: &str) -> Value {
        if self.decimal.is_match(raw) {
            if let Some(v) = self.parse_decimal(raw) {
                return Value::Float(v);
            }
        }
        if self.integer.is_match(raw) {
            if let Ok(v) = self.strip_grouping(raw).parse::<i64>() {
                return Value::Integer(v);
            }
        }
        if raw == ZERO_DATE || raw.is_empty() {
            return Value::Null;
        }
        if TIMESTAMP_PREFIX.is_match(raw) {
            // The prefix match guarantees 19 ASCII bytes.
            if let Ok(ts) =
                NaiveDateTime::parse_from_str(&raw[..TIMESTAMP_LEN], TIMESTAMP_FORMAT)
            {
                return Value::Timestamp(ts);
            }
        }
        Value::Text(raw.to_string())
    }

    fn strip_grouping(&self, raw: &str) -> String {
        match self.locale.thousands_sep {
            Some(sep) => raw.chars().filter(|c| *c != sep).collect(),
            None => raw.to_string(),
        }
    }

    fn parse_decimal(&self, raw: &str) -> Option<f64> {
        let plain: String = self
            .strip_grouping(raw)
            .chars()
            .map(|c| if c == self.locale.decimal_point { '.' } else { c })
            .collect();
        plain.parse().ok()
    }
}

impl Default for ValueCoercer {
    fn default() -> Self {
        Self::new(NumericLocale::default())
    }
}
