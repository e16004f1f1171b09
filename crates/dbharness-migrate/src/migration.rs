//! Migration parsing and checksums

use dbharness_core::{HarnessError, Result};
use sha2::{Digest, Sha256};

/// A single versioned migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number parsed from the filename (the `1` in `V1__...`)
    pub version: u32,
    /// Human-readable description parsed from the filename
    pub description: String,
    /// The SQL script, possibly containing multiple statements
    pub sql: String,
    /// SHA-256 checksum of the normalized script, hex-encoded
    pub checksum: String,
}

impl Migration {
    /// Parse a migration from a `V{n}__{description}.sql` filename and its
    /// script contents.
    ///
    /// Underscores in the description part become spaces, so
    /// `V1__create_i18n_language.sql` yields version 1 with description
    /// "create i18n language".
    pub fn parse(filename: &str, sql: &str) -> Result<Self> {
        let stem = filename.strip_suffix(".sql").ok_or_else(|| {
            HarnessError::Migration(format!("migration filename must end in .sql: {}", filename))
        })?;
        let rest = stem.strip_prefix('V').ok_or_else(|| {
            HarnessError::Migration(format!("migration filename must start with V: {}", filename))
        })?;
        let (version_str, description_raw) = rest.split_once("__").ok_or_else(|| {
            HarnessError::Migration(format!(
                "migration filename must contain __ between version and description: {}",
                filename
            ))
        })?;
        let version: u32 = version_str.parse().map_err(|_| {
            HarnessError::Migration(format!(
                "invalid migration version {:?} in {}",
                version_str, filename
            ))
        })?;
        if description_raw.is_empty() {
            return Err(HarnessError::Migration(format!(
                "migration description is empty: {}",
                filename
            )));
        }

        Ok(Self {
            version,
            description: description_raw.replace('_', " "),
            sql: sql.to_string(),
            checksum: checksum(sql),
        })
    }
}

/// SHA-256 checksum of a migration script, hex-encoded.
///
/// Line endings are normalized first so checking a file out with CRLF
/// does not invalidate history recorded on another machine.
pub fn checksum(sql: &str) -> String {
    let normalized = sql.replace("\r\n", "\n");
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Split a script into individual statements on top-level semicolons.
///
/// Semicolons inside single-quoted strings are left alone. Empty
/// fragments (trailing semicolon, blank lines) are dropped.
pub fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_string = false;

    for ch in sql.chars() {
        match ch {
            '\'' => {
                in_string = !in_string;
                current.push(ch);
            }
            ';' if !in_string => {
                let stmt = current.trim();
                if !stmt.is_empty() {
                    statements.push(stmt.to_string());
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }

    let stmt = current.trim();
    if !stmt.is_empty() {
        statements.push(stmt.to_string());
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_valid_filename() {
        let m = Migration::parse("V1__create_i18n_language.sql", "CREATE TABLE t (id INT)")
            .expect("parse");
        assert_eq!(m.version, 1);
        assert_eq!(m.description, "create i18n language");
        assert_eq!(m.checksum.len(), 64);
    }

    #[test]
    fn parse_rejects_bad_filenames() {
        assert!(Migration::parse("1__x.sql", "").is_err());
        assert!(Migration::parse("V1__x.txt", "").is_err());
        assert!(Migration::parse("V1_x.sql", "").is_err());
        assert!(Migration::parse("Vone__x.sql", "").is_err());
        assert!(Migration::parse("V1__.sql", "").is_err());
    }

    #[test]
    fn checksum_is_stable_across_line_endings() {
        assert_eq!(checksum("SELECT 1;\nSELECT 2;"), checksum("SELECT 1;\r\nSELECT 2;"));
        assert_ne!(checksum("SELECT 1"), checksum("SELECT 2"));
    }

    #[test]
    fn split_on_top_level_semicolons() {
        let stmts = split_statements("CREATE TABLE a (x INT);\nINSERT INTO a VALUES (1);\n");
        assert_eq!(
            stmts,
            vec!["CREATE TABLE a (x INT)", "INSERT INTO a VALUES (1)"]
        );
    }

    #[test]
    fn split_ignores_semicolons_in_strings() {
        let stmts = split_statements("INSERT INTO a VALUES ('x;y'); SELECT 1");
        assert_eq!(stmts, vec!["INSERT INTO a VALUES ('x;y')", "SELECT 1"]);
    }
}
