use serde::{Deserialize, Serialize};

use crate::page::ColumnType;

/// Which half of a Kafka record a column is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnRole {
    Key,
    Value,
}

/// Metadata for one column of the target topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnHandle {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Whether the column is encoded into the record key.
    #[serde(default)]
    pub key: bool,
    /// Encoder specific field location, e.g. a JSON field name or a raw byte range.
    #[serde(default)]
    pub mapping: Option<String>,
    #[serde(default)]
    pub data_format: Option<String>,
    #[serde(default)]
    pub format_hint: Option<String>,
    /// Connector-maintained columns (offsets, partition ids) that are never written.
    #[serde(default)]
    pub internal: bool,
}

impl ColumnHandle {
    pub fn new(name: impl Into<String>, column_type: ColumnType, role: ColumnRole) -> Self {
        Self {
            name: name.into(),
            column_type,
            key: role == ColumnRole::Key,
            mapping: None,
            data_format: None,
            format_hint: None,
            internal: false,
        }
    }

    pub fn with_mapping(mut self, mapping: impl Into<String>) -> Self {
        self.mapping = Some(mapping.into());
        self
    }

    pub fn with_data_format(mut self, data_format: impl Into<String>) -> Self {
        self.data_format = Some(data_format.into());
        self
    }

    pub fn with_format_hint(mut self, format_hint: impl Into<String>) -> Self {
        self.format_hint = Some(format_hint.into());
        self
    }

    pub fn role(&self) -> ColumnRole {
        if self.key {
            ColumnRole::Key
        } else {
            ColumnRole::Value
        }
    }
}

/// Fixed channel-to-role lookup built once per sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnClassifier {
    roles: Vec<ColumnRole>,
}

impl ColumnClassifier {
    pub fn new(columns: &[ColumnHandle]) -> Self {
        Self {
            roles: columns.iter().map(ColumnHandle::role).collect(),
        }
    }

    pub fn role(&self, channel: usize) -> Option<ColumnRole> {
        self.roles.get(channel).copied()
    }

    pub fn is_key(&self, channel: usize) -> bool {
        self.role(channel) == Some(ColumnRole::Key)
    }

    pub fn column_count(&self) -> usize {
        self.roles.len()
    }

    pub fn key_count(&self) -> usize {
        self.roles.iter().filter(|r| **r == ColumnRole::Key).count()
    }
}
