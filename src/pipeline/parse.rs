//! Raw model text → ordered field mapping.
//!
//! The instruction templates mandate `Label: value` lines, so parsing is a
//! line-oriented split on the FIRST colon: values like street addresses or
//! payment instructions may themselves contain colons and must survive
//! intact. Lines without a colon (separator rules, stray commentary) are
//! silently dropped. There is no validation that expected labels are
//! present — a missing label is simply absent from the map, and the export
//! renderer substitutes its sentinel.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// An insertion-ordered map from field label to value.
///
/// Label order matters: the reviewer sees fields in the order the model
/// emitted them, which the templates fix per document type. A `Vec`-backed
/// map keeps that order through serde round-trips; the handful of entries
/// per document makes linear lookup a non-issue.
///
/// Inserting an existing label overwrites its value in place (last wins).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    entries: Vec<(String, String)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a label. Overwrites keep the label's position.
    pub fn insert(&mut self, label: impl Into<String>, value: impl Into<String>) {
        let label = label.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == label) {
            Some((_, v)) => *v = value,
            None => self.entries.push((label, value)),
        }
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == label)
            .map(|(_, v)| v.as_str())
    }

    /// Remove a label, preserving the order of the remaining entries.
    pub fn remove(&mut self, label: &str) -> Option<String> {
        let idx = self.entries.iter().position(|(k, _)| k == label)?;
        Some(self.entries.remove(idx).1)
    }

    /// Rename a label in place, keeping its position and value.
    pub fn rename(&mut self, from: &str, to: &str) {
        if let Some((k, _)) = self.entries.iter_mut().find(|(k, _)| k == from) {
            *k = to.to_string();
        }
    }

    /// Overlay every entry of `patch` onto this map (last wins).
    pub fn apply(&mut self, patch: &FieldMap) {
        for (k, v) in patch.iter() {
            self.insert(k, v);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, String)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut map = FieldMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FieldMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldMapVisitor;

        impl<'de> Visitor<'de> for FieldMapVisitor {
            type Value = FieldMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of field labels to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<FieldMap, A::Error> {
                let mut map = FieldMap::new();
                while let Some((k, v)) = access.next_entry::<String, String>()? {
                    map.insert(k, v);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(FieldMapVisitor)
    }
}

/// Parse raw model output into a [`FieldMap`].
///
/// Splits on line breaks; each line containing a colon is split on the
/// first colon with both sides trimmed. Duplicate labels overwrite earlier
/// ones. Colon-less lines are dropped. Parsing the same text twice yields
/// identical maps — there is no hidden state.
pub fn parse_fields(text: &str) -> FieldMap {
    let mut fields = FieldMap::new();
    for line in text.lines() {
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        fields.insert(label.trim(), value.trim());
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_lines_without_colon() {
        let fields =
            parse_fields("Bank Name: ABC Bank\nGarbled line\nCheck Number: 1234");
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.get("Bank Name"), Some("ABC Bank"));
        assert_eq!(fields.get("Check Number"), Some("1234"));
    }

    #[test]
    fn splits_on_first_colon_only() {
        let fields = parse_fields("Payment Instructions: wire to IBAN: DE89");
        assert_eq!(
            fields.get("Payment Instructions"),
            Some("wire to IBAN: DE89")
        );
    }

    #[test]
    fn trims_both_sides() {
        let fields = parse_fields("  First Name  :   Jane  ");
        assert_eq!(fields.get("First Name"), Some("Jane"));
    }

    #[test]
    fn duplicate_labels_last_wins_in_place() {
        let fields = parse_fields("Gender: M\nAuthority: HMPO\nGender: F");
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.get("Gender"), Some("F"));
        let keys: Vec<&str> = fields.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["Gender", "Authority"]);
    }

    #[test]
    fn parsing_is_idempotent() {
        let text = "A: 1\nB: 2\nnoise\nA: 3";
        assert_eq!(parse_fields(text), parse_fields(text));
    }

    #[test]
    fn at_most_one_entry_per_colon_line() {
        let text = "A: 1\nB: 2\nC: 3\nno colon here\nanother bare line";
        let fields = parse_fields(text);
        assert_eq!(fields.len(), 3);
    }

    #[test]
    fn serde_preserves_insertion_order() {
        let mut fields = FieldMap::new();
        fields.insert("Z Label", "1");
        fields.insert("A Label", "2");
        let json = serde_json::to_string(&fields).unwrap();
        assert_eq!(json, r#"{"Z Label":"1","A Label":"2"}"#);
        let back: FieldMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fields);
    }

    #[test]
    fn crlf_input_parses_cleanly() {
        let fields = parse_fields("First Name: Jane\r\nFamily Name: Doe\r\n");
        assert_eq!(fields.get("First Name"), Some("Jane"));
        assert_eq!(fields.get("Family Name"), Some("Doe"));
    }
}
