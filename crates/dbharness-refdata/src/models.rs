//! Reference data models
//!
//! Two flat lookup tables of localized names: languages keyed by ISO 639 /
//! BCP-47 code, regions keyed by ISO 3166 country code. Each row carries
//! the locale (`hl`) its `name` is written in, so the same code appears
//! once per supported locale.

use dbharness_core::{HarnessError, Result, Row, Value};
use serde::{Deserialize, Serialize};

fn required_string(row: &Row, name: &str) -> Result<String> {
    row.get_by_name(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| HarnessError::Query(format!("missing column '{}'", name)))
}

/// A language name localized for one locale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct I18nLanguage {
    /// Surrogate key, assigned on insert
    pub id: Option<i32>,
    /// ISO 639 / BCP-47 language code
    pub code: String,
    /// Language name, written in the `hl` locale
    pub name: String,
    /// Locale the name is localized for
    pub hl: String,
}

impl I18nLanguage {
    pub fn new(code: impl Into<String>, name: impl Into<String>, hl: impl Into<String>) -> Self {
        Self {
            id: None,
            code: code.into(),
            name: name.into(),
            hl: hl.into(),
        }
    }

    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_by_name("id").and_then(Value::as_i32),
            code: required_string(row, "code")?,
            name: required_string(row, "name")?,
            hl: required_string(row, "hl")?,
        })
    }
}

// The surrogate key never participates in equality: a row read back from
// the database must compare equal to the value that was inserted.
impl PartialEq for I18nLanguage {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code && self.name == other.name && self.hl == other.hl
    }
}

impl Eq for I18nLanguage {}

/// A region name localized for one locale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct I18nRegion {
    /// Surrogate key, assigned on insert
    pub id: Option<i32>,
    /// Region code
    pub code: String,
    /// Region name, written in the `hl` locale
    pub name: String,
    /// Locale the name is localized for
    pub hl: String,
    /// Two-letter ISO 3166 country code
    pub gl: String,
}

impl I18nRegion {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        hl: impl Into<String>,
        gl: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            code: code.into(),
            name: name.into(),
            hl: hl.into(),
            gl: gl.into(),
        }
    }

    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_by_name("id").and_then(Value::as_i32),
            code: required_string(row, "code")?,
            name: required_string(row, "name")?,
            hl: required_string(row, "hl")?,
            gl: required_string(row, "gl")?,
        })
    }
}

impl PartialEq for I18nRegion {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
            && self.name == other.name
            && self.hl == other.hl
            && self.gl == other.gl
    }
}

impl Eq for I18nRegion {}
