//! Datastore type registry: type tag -> semantic properties.

use std::collections::BTreeMap;

use crate::conf::derive_default_datastore_types;
use crate::spec::{RecombinantError, RecombinantResult, SpecDataTypeEntry, SpecFieldSpec};

/// Immutable lookup of [`SpecDataTypeEntry`] by tag.
///
/// Passed explicitly to the canonicalizer, record builder and template
/// writer so each can be exercised against a custom registry.
#[derive(Debug, Clone, PartialEq)]
pub struct DataTypeRegistry {
    dict_entries: BTreeMap<String, SpecDataTypeEntry>,
}

impl Default for DataTypeRegistry {
    fn default() -> Self {
        Self::from_entries(derive_default_datastore_types())
    }
}

impl DataTypeRegistry {
    /// Build from entries; a later entry replaces an earlier one with the same tag.
    pub fn from_entries(entries: impl IntoIterator<Item = SpecDataTypeEntry>) -> Self {
        let dict_entries = entries
            .into_iter()
            .map(|entry| (entry.tag.clone(), entry))
            .collect();
        Self { dict_entries }
    }

    /// Parse a JSON list of entries (`tag`, `numeric`, `default`, `xl_format`).
    pub fn from_json_str(txt: &str) -> RecombinantResult<Self> {
        let l_entries: Vec<SpecDataTypeEntry> = serde_json::from_str(txt)?;
        Ok(Self::from_entries(l_entries))
    }

    /// Look up `tag`; a miss is a schema error.
    pub fn get(&self, tag: &str) -> RecombinantResult<&SpecDataTypeEntry> {
        self.dict_entries
            .get(tag)
            .ok_or_else(|| RecombinantError::UnknownTypeTag(tag.to_string()))
    }

    /// Resolve the entry of every field, in field order.
    pub fn resolve_fields<'a>(
        &'a self,
        fields: &[SpecFieldSpec],
    ) -> RecombinantResult<Vec<&'a SpecDataTypeEntry>> {
        fields
            .iter()
            .map(|field| self.get(&field.datastore_type))
            .collect()
    }

    /// Registered tags in sorted order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.dict_entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.dict_entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dict_entries.is_empty()
    }
}
