//! Core data model types for staging.
//!
//! Uploaded workbooks are flattened into [`Row`]s of raw cell text, which are then checked
//! against the [`Schema`] registered for a destination [`Site`].

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// A single row of cell text, in the column order emitted by the source workbook.
pub type Row = Vec<String>;

/// Returns `true` if every cell is blank after trimming whitespace.
///
/// Empty rows are dropped before validation and never reach the staged buffer.
pub fn is_blank_row(row: &[String]) -> bool {
    row.iter().all(|cell| cell.trim().is_empty())
}

/// Declared type of a destination column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "String")]
pub enum FieldType {
    /// Free text.
    String,
    /// Base-10 signed 64-bit integer.
    Integer,
    /// 64-bit floating point number.
    Float,
    /// Boolean literal (`true`, `F`, `1`, ...).
    Boolean,
    /// Calendar date, staged as `YYYY-MM-DD`.
    Date,
    /// Civil timestamp, staged as `YYYY-MM-DD HH:MM:SS`.
    Timestamp,
    /// A type name the coercer does not know. Kept so that a misconfigured schema fails the
    /// rows it touches instead of failing at startup.
    Unsupported(String),
}

impl FieldType {
    /// Parse a declared type name (case-insensitive).
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "STRING" => Self::String,
            "INTEGER" | "INT64" => Self::Integer,
            "FLOAT" | "FLOAT64" => Self::Float,
            "BOOLEAN" | "BOOL" => Self::Boolean,
            "DATE" => Self::Date,
            "TIMESTAMP" => Self::Timestamp,
            _ => Self::Unsupported(name.to_string()),
        }
    }
}

impl From<String> for FieldType {
    fn from(name: String) -> Self {
        Self::parse(&name)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => f.write_str("STRING"),
            Self::Integer => f.write_str("INTEGER"),
            Self::Float => f.write_str("FLOAT"),
            Self::Boolean => f.write_str("BOOLEAN"),
            Self::Date => f.write_str("DATE"),
            Self::Timestamp => f.write_str("TIMESTAMP"),
            Self::Unsupported(name) => f.write_str(name),
        }
    }
}

/// A single named, typed column in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Field {
    /// Column name.
    pub name: String,
    /// Declared column type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl Field {
    /// Create a new field.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// Ordered list of fields; position `i` validates cell `i` of every data row.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct Schema {
    /// Ordered list of fields.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Create a new schema from fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Number of columns the schema validates.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the schema defines zero columns.
    ///
    /// A defined-but-empty schema is not the same as "no schema": see
    /// [`crate::schema::SchemaRegistry::schema_for`].
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Returns the index of a field by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// Closed set of destinations a staged upload can be committed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Site {
    NorthCampus,
    SouthCampus,
    LakeviewImaging,
    RiversideClinic,
    DowntownMedical,
}

impl Site {
    /// Every site, in declaration order.
    pub const ALL: [Site; 5] = [
        Site::NorthCampus,
        Site::SouthCampus,
        Site::LakeviewImaging,
        Site::RiversideClinic,
        Site::DowntownMedical,
    ];

    /// Human-readable name, as callers submit it.
    pub fn display_name(self) -> &'static str {
        match self {
            Site::NorthCampus => "North Campus",
            Site::SouthCampus => "South Campus",
            Site::LakeviewImaging => "Lakeview Imaging",
            Site::RiversideClinic => "Riverside Clinic",
            Site::DowntownMedical => "Downtown Medical",
        }
    }

    /// Storage-safe key fragment: lowercase, spaces replaced with `_`.
    pub fn key(self) -> String {
        normalize_site_name(self.display_name())
    }

    /// Parse a site from its display name or its storage key (case-insensitive).
    pub fn parse(raw: &str) -> Option<Self> {
        let wanted = normalize_site_name(raw.trim());
        Site::ALL.into_iter().find(|site| site.key() == wanted)
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Site {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Site::parse(s).ok_or_else(|| s.to_string())
    }
}

fn normalize_site_name(name: &str) -> String {
    name.to_lowercase().replace([' ', '-'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_parses_display_name_and_key() {
        assert_eq!(Site::parse("North Campus"), Some(Site::NorthCampus));
        assert_eq!(Site::parse("lakeview_imaging"), Some(Site::LakeviewImaging));
        assert_eq!(Site::parse("  riverside clinic "), Some(Site::RiversideClinic));
        assert_eq!(Site::parse("Mars Base"), None);
        assert_eq!(Site::parse(""), None);
    }

    #[test]
    fn site_key_is_storage_safe() {
        for site in Site::ALL {
            let key = site.key();
            assert!(!key.contains(' '), "{key}");
            assert_eq!(key, key.to_lowercase());
        }
        assert_eq!(Site::DowntownMedical.key(), "downtown_medical");
    }

    #[test]
    fn field_type_parse_keeps_unknown_names() {
        assert_eq!(FieldType::parse("integer"), FieldType::Integer);
        assert_eq!(FieldType::parse("TIMESTAMP"), FieldType::Timestamp);
        assert_eq!(
            FieldType::parse("GEOGRAPHY"),
            FieldType::Unsupported("GEOGRAPHY".to_string())
        );
        assert_eq!(FieldType::parse("GEOGRAPHY").to_string(), "GEOGRAPHY");
    }

    #[test]
    fn blank_rows_are_detected_after_trim() {
        assert!(is_blank_row(&[]));
        assert!(is_blank_row(&["".to_string(), "  \t".to_string()]));
        assert!(!is_blank_row(&["".to_string(), "x".to_string()]));
    }
}
