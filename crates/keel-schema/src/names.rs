//! Column and table name validation.
//!
//! Valid column names:
//! - Must be non-empty
//! - Must not exceed the configured maximum length (63 bytes by default)
//! - Must not contain control characters
//! - Must not start with `!`, which is reserved for backlink columns

use crate::error::{Result, SchemaError};

/// Maximum column name length in bytes, unless configured otherwise.
pub const DEFAULT_MAX_NAME_LENGTH: usize = 63;

/// Prefix reserved for generated backlink column names.
pub(crate) const BACKLINK_PREFIX: char = '!';

/// Validate a public column name, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use keel_schema::names::validate_column_name;
///
/// assert!(validate_column_name("age", 63).is_ok());
/// assert!(validate_column_name("", 63).is_err());
/// assert!(validate_column_name("!hidden", 63).is_err());
/// ```
pub fn validate_column_name(name: &str, max_len: usize) -> Result<()> {
    validate_common(name, max_len, "column")?;

    if name.starts_with(BACKLINK_PREFIX) {
        return Err(SchemaError::InvalidName {
            name: name.to_string(),
            reason: format!("must not start with {BACKLINK_PREFIX:?}"),
        });
    }

    Ok(())
}

/// Validate a table name. Same rules as column names, minus the reserved
/// prefix.
pub fn validate_table_name(name: &str, max_len: usize) -> Result<()> {
    validate_common(name, max_len, "table")
}

fn validate_common(name: &str, max_len: usize, what: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SchemaError::InvalidName {
            name: name.to_string(),
            reason: format!("{what} name must not be empty"),
        });
    }

    if name.len() > max_len {
        return Err(SchemaError::InvalidName {
            name: name.to_string(),
            reason: format!("{what} name longer than {max_len} bytes"),
        });
    }

    if let Some(ch) = name.chars().find(|c| c.is_control()) {
        return Err(SchemaError::InvalidName {
            name: name.to_string(),
            reason: format!("contains control character: {ch:?}"),
        });
    }

    Ok(())
}
