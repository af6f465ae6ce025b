//! Group configuration and declarative schemas.
//!
//! Both are plain serde types. They load from TOML:
//!
//! ```toml
//! [group]
//! replication = true
//!
//! [[tables]]
//! name = "person"
//! primary_key = "id"
//!
//! [[tables.columns]]
//! name = "id"
//! type = "int"
//!
//! [[tables.columns]]
//! name = "pets"
//! type = "link"
//! list = true
//! target = "dog"
//! strength = "strong"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use keel_schema::DEFAULT_MAX_NAME_LENGTH;
use keel_types::{DataType, LinkType};

use crate::error::{TableError, TableResult};

/// Settings shared by every table of a group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConfig {
    /// Longest accepted column or table name, in bytes.
    pub max_column_name_length: usize,
    /// Attach an in-memory change log that records every mutation.
    pub replication: bool,
    /// Reject explicit keys that named an object before, even if that
    /// object has since been removed.
    ///
    /// Each table then remembers every key it ever removed, so its memory
    /// grows with the number of removals. With this off nothing is kept:
    /// generated keys still never repeat, but an explicit key may name a
    /// removed object again.
    pub strict_key_reuse: bool,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            max_column_name_length: DEFAULT_MAX_NAME_LENGTH,
            replication: false,
            strict_key_reuse: true,
        }
    }
}

impl GroupConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> TableResult<Self> {
        toml::from_str(text).map_err(|e| TableError::Config(e.to_string()))
    }
}

/// One column of a declarative schema.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default)]
    pub nullable: bool,
    /// With `type = "link"`, makes the column a link list.
    #[serde(default)]
    pub list: bool,
    /// Target table name for link columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default)]
    pub strength: LinkType,
    #[serde(default)]
    pub indexed: bool,
}

impl ColumnConfig {
    /// The column type after applying `list`.
    pub fn resolved_type(&self) -> TableResult<DataType> {
        match (self.data_type, self.list) {
            (DataType::Link, true) | (DataType::LinkList, _) => Ok(DataType::LinkList),
            (DataType::BackLink, _) => Err(TableError::IllegalCombination(format!(
                "column {:?}: backlink columns are created implicitly",
                self.name
            ))),
            (ty, true) => Err(TableError::IllegalCombination(format!(
                "column {:?}: `list` applies to link columns only, not {ty}",
                self.name
            ))),
            (ty, false) => Ok(ty),
        }
    }
}

/// One table of a declarative schema.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnConfig>,
}

/// A complete declarative schema, optionally with group settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaConfig {
    #[serde(default)]
    pub group: GroupConfig,
    #[serde(default)]
    pub tables: Vec<TableConfig>,
}

impl SchemaConfig {
    /// Parse a schema from TOML text.
    pub fn from_toml_str(text: &str) -> TableResult<Self> {
        toml::from_str(text).map_err(|e| TableError::Config(e.to_string()))
    }

    /// Read and parse a schema file.
    pub fn load(path: &Path) -> TableResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Render the schema back to TOML.
    pub fn to_toml_string(&self) -> TableResult<String> {
        toml::to_string(self).map_err(|e| TableError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SCHEMA: &str = r#"
[group]
replication = true

[[tables]]
name = "person"
primary_key = "id"

[[tables.columns]]
name = "id"
type = "int"

[[tables.columns]]
name = "pets"
type = "link"
list = true
target = "dog"
strength = "strong"

[[tables]]
name = "dog"

[[tables.columns]]
name = "name"
type = "string"
nullable = true
"#;

    #[test]
    fn default_group_config() {
        let c = GroupConfig::default();
        assert_eq!(c.max_column_name_length, 63);
        assert!(!c.replication);
        assert!(c.strict_key_reuse);
    }

    #[test]
    fn partial_group_config_fills_defaults() {
        let c = GroupConfig::from_toml_str("replication = true").unwrap();
        assert!(c.replication);
        assert_eq!(c.max_column_name_length, 63);
    }

    #[test]
    fn parse_schema() {
        let schema = SchemaConfig::from_toml_str(SCHEMA).unwrap();
        assert!(schema.group.replication);
        assert_eq!(schema.tables.len(), 2);

        let person = &schema.tables[0];
        assert_eq!(person.primary_key.as_deref(), Some("id"));
        let pets = &person.columns[1];
        assert_eq!(pets.resolved_type().unwrap(), DataType::LinkList);
        assert_eq!(pets.strength, LinkType::Strong);
        assert_eq!(pets.target.as_deref(), Some("dog"));

        let name = &schema.tables[1].columns[0];
        assert!(name.nullable);
        assert_eq!(name.strength, LinkType::Weak);
    }

    #[test]
    fn list_on_value_column_rejected() {
        let col = ColumnConfig {
            name: "n".into(),
            data_type: DataType::Int,
            nullable: false,
            list: true,
            target: None,
            strength: LinkType::Weak,
            indexed: false,
        };
        assert!(matches!(
            col.resolved_type(),
            Err(TableError::IllegalCombination(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SCHEMA.as_bytes()).unwrap();
        let schema = SchemaConfig::load(file.path()).unwrap();
        assert_eq!(schema.tables[1].name, "dog");
    }

    #[test]
    fn malformed_schema_is_config_error() {
        let err = SchemaConfig::from_toml_str("[[tables]]\nname = 3").unwrap_err();
        assert!(matches!(err, TableError::Config(_)));
    }

    #[test]
    fn toml_roundtrip() {
        let schema = SchemaConfig::from_toml_str(SCHEMA).unwrap();
        let text = schema.to_toml_string().unwrap();
        assert_eq!(SchemaConfig::from_toml_str(&text).unwrap(), schema);
    }
}
