//! Entry types and their type-specific payloads.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a checkpoint entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryType {
    /// A person passing the checkpoint.
    Personnel,
    /// A vehicle passing the checkpoint.
    Vehicle,
    /// Anything else worth logging.
    Other,
}

impl EntryType {
    /// All entry types, in display order.
    pub const ALL: [EntryType; 3] = [EntryType::Personnel, EntryType::Vehicle, EntryType::Other];

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            EntryType::Personnel => "PERSONNEL",
            EntryType::Vehicle => "VEHICLE",
            EntryType::Other => "OTHER",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-specific content of a record.
///
/// There is exactly one variant per [`EntryType`]; the variant tag must agree
/// with the record's entry type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryPayload {
    /// Personnel entry.
    #[serde(rename_all = "camelCase")]
    Personnel {
        /// Full name of the person.
        full_name: String,
        /// Badge or document number.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id_number: Option<String>,
        /// Stated purpose of the visit.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        purpose: Option<String>,
        /// Free-text note.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    /// Vehicle entry.
    #[serde(rename_all = "camelCase")]
    Vehicle {
        /// Licence plate.
        plate_number: String,
        /// Driver name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        driver_name: Option<String>,
        /// Kind of vehicle (truck, car, ...).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        vehicle_kind: Option<String>,
        /// Free-text note.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    /// Any other entry.
    #[serde(rename_all = "camelCase")]
    Other {
        /// What happened.
        description: String,
        /// Free-text note.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
}

impl EntryPayload {
    /// Creates a personnel payload with only the required field set.
    pub fn personnel(full_name: impl Into<String>) -> Self {
        Self::Personnel {
            full_name: full_name.into(),
            id_number: None,
            purpose: None,
            note: None,
        }
    }

    /// Creates a vehicle payload with only the required field set.
    pub fn vehicle(plate_number: impl Into<String>) -> Self {
        Self::Vehicle {
            plate_number: plate_number.into(),
            driver_name: None,
            vehicle_kind: None,
            note: None,
        }
    }

    /// Creates an "other" payload.
    pub fn other(description: impl Into<String>) -> Self {
        Self::Other {
            description: description.into(),
            note: None,
        }
    }

    /// Sets the free-text note.
    #[must_use]
    pub fn with_note(mut self, text: impl Into<String>) -> Self {
        let text = Some(text.into());
        match &mut self {
            Self::Personnel { note, .. } | Self::Vehicle { note, .. } | Self::Other { note, .. } => {
                *note = text;
            }
        }
        self
    }

    /// Returns the entry type implied by this variant.
    #[must_use]
    pub const fn entry_type(&self) -> EntryType {
        match self {
            Self::Personnel { .. } => EntryType::Personnel,
            Self::Vehicle { .. } => EntryType::Vehicle,
            Self::Other { .. } => EntryType::Other,
        }
    }

    /// Returns the free-text note, if any.
    #[must_use]
    pub fn note(&self) -> Option<&str> {
        match self {
            Self::Personnel { note, .. } | Self::Vehicle { note, .. } | Self::Other { note, .. } => {
                note.as_deref()
            }
        }
    }

    /// Returns a one-line summary for listings.
    #[must_use]
    pub fn summary(&self) -> &str {
        match self {
            Self::Personnel { full_name, .. } => full_name,
            Self::Vehicle { plate_number, .. } => plate_number,
            Self::Other { description, .. } => description,
        }
    }

    /// Checks the required fields of the variant.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingField`] if a required field is blank.
    pub fn validate(&self) -> CoreResult<()> {
        let (field, value) = match self {
            Self::Personnel { full_name, .. } => ("fullName", full_name),
            Self::Vehicle { plate_number, .. } => ("plateNumber", plate_number),
            Self::Other { description, .. } => ("description", description),
        };
        if value.trim().is_empty() {
            return Err(CoreError::missing(field));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_type_matches_variant() {
        assert_eq!(EntryPayload::personnel("A").entry_type(), EntryType::Personnel);
        assert_eq!(EntryPayload::vehicle("B").entry_type(), EntryType::Vehicle);
        assert_eq!(EntryPayload::other("C").entry_type(), EntryType::Other);
    }

    #[test]
    fn blank_required_field_rejected() {
        assert_eq!(
            EntryPayload::vehicle("  ").validate(),
            Err(CoreError::missing("plateNumber"))
        );
        assert!(EntryPayload::personnel("Jane Doe").validate().is_ok());
    }

    #[test]
    fn wire_shape() {
        let payload = EntryPayload::vehicle("KDA 123X").with_note("night shift");
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "VEHICLE");
        assert_eq!(json["plateNumber"], "KDA 123X");
        assert_eq!(json["note"], "night shift");
        assert!(json.get("driverName").is_none());
    }

    #[test]
    fn note_accessor() {
        assert_eq!(EntryPayload::other("gate jammed").note(), None);
        assert_eq!(
            EntryPayload::other("gate jammed").with_note("reported").note(),
            Some("reported")
        );
    }
}
