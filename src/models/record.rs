use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable record identifier, carried exactly as it was read.
///
/// Database ids are selected as text and CSV ids are taken verbatim, so the
/// identifier written back (or reported) is byte-for-byte the one that was read.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the identifier is a well-formed UUID in any accepted spelling
    pub fn is_uuid(&self) -> bool {
        uuid::Uuid::parse_str(&self.0).is_ok()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One row-level unit of work.
///
/// `fields` holds only the input columns the transformer needs; every value is
/// read as text and `None` stands for SQL NULL (or an empty CSV cell).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub group: Option<String>,
    pub fields: BTreeMap<String, Option<String>>,
}

impl Record {
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            group: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Option<&str>) -> Self {
        self.fields.insert(name.into(), value.map(str::to_string));
        self
    }

    /// Value of an input field; NULL and absent fields are both `None`
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|value| value.as_deref())
    }

    /// Value of an input field with surrounding whitespace removed, `None` when blank
    pub fn non_blank_field(&self, name: &str) -> Option<&str> {
        self.field(name)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// The records selected for one pipeline run, fixed at query time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkingSet {
    records: Vec<Record>,
}

impl WorkingSet {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

impl FromIterator<Record> for WorkingSet {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_keeps_original_spelling() {
        let id = RecordId::new("0A60B1A9-041A-444E-BD6A-94CAAAB7591B");
        assert!(id.is_uuid());
        assert_eq!(id.to_string(), "0A60B1A9-041A-444E-BD6A-94CAAAB7591B");
    }

    #[test]
    fn blank_fields_are_treated_as_missing() {
        let record = Record::new("r1")
            .with_field("external_id", Some("   "))
            .with_field("title", None);
        assert_eq!(record.field("external_id"), Some("   "));
        assert_eq!(record.non_blank_field("external_id"), None);
        assert_eq!(record.field("title"), None);
        assert_eq!(record.field("missing"), None);
    }
}
