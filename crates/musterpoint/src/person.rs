//! Trackable people and the upstream records they are imported from.

use serde::{Deserialize, Serialize};

/// Zone id assigned to people whose location is not known.
pub const UNASSIGNED_ZONE: &str = "unassigned";

/// What kind of person is on site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonType {
    /// A member of staff from the staff directory.
    Staff,
    /// A signed-in visitor.
    Visitor,
    /// A contractor or supplier working on site.
    Contractor,
}

impl std::fmt::Display for PersonType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PersonType {
    /// Stable lowercase name, also used as the storage representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Staff => "staff",
            Self::Visitor => "visitor",
            Self::Contractor => "contractor",
        }
    }

    /// Parse the storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "staff" => Some(Self::Staff),
            "visitor" => Some(Self::Visitor),
            "contractor" => Some(Self::Contractor),
            _ => None,
        }
    }
}

/// Safety status of a person during a muster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyStatus {
    /// Confirmed at a muster point.
    Safe,
    /// Reported missing.
    Missing,
    /// Not yet accounted for.
    #[default]
    Unknown,
}

impl std::fmt::Display for SafetyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SafetyStatus {
    /// Stable lowercase name, also used as the storage representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Missing => "missing",
            Self::Unknown => "unknown",
        }
    }

    /// Parse the storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "safe" => Some(Self::Safe),
            "missing" => Some(Self::Missing),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// A person who must be accounted for during a muster.
///
/// Only `status` and `last_known_zone` change after import; the identity
/// fields are fixed for the lifetime of the roster entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    /// Opaque stable identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Employer or visiting company.
    pub company: String,
    /// Staff, visitor or contractor.
    #[serde(rename = "type")]
    pub person_type: PersonType,
    /// Zone the person was last seen in.
    #[serde(default = "unassigned_zone")]
    pub last_known_zone: String,
    /// Current safety status.
    #[serde(default)]
    pub status: SafetyStatus,
    /// Contact number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    /// Member of staff hosting a visitor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_name: Option<String>,
    /// Visitor or staff badge number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge_number: Option<String>,
}

fn unassigned_zone() -> String {
    UNASSIGNED_ZONE.to_string()
}

impl Person {
    /// Create a person with no contact metadata and an unknown status.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        company: impl Into<String>,
        person_type: PersonType,
        last_known_zone: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            company: company.into(),
            person_type,
            last_known_zone: last_known_zone.into(),
            status: SafetyStatus::Unknown,
            phone_number: None,
            host_name: None,
            badge_number: None,
        }
    }

    /// Whether the person has been confirmed safe.
    #[must_use]
    pub fn is_accounted_for(&self) -> bool {
        self.status == SafetyStatus::Safe
    }
}

/// Category recorded against a visitor at sign-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitorCategory {
    /// A general visitor.
    #[default]
    Visitor,
    /// A contractor doing work on site.
    Contractor,
    /// A supplier making a delivery or visit.
    Supplier,
}

/// A visitor record as produced by the registration system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VisitorRecord {
    /// Record id.
    pub id: String,
    /// Full name as entered at registration.
    pub name: String,
    /// Company the visitor represents.
    pub company: String,
    /// How the visitor registered.
    pub category: VisitorCategory,
    /// Zone recorded at sign-in, if any.
    pub zone: Option<String>,
    /// Whether the visitor has already signed out.
    pub signed_out: bool,
    /// Contact number.
    pub phone_number: Option<String>,
    /// Member of staff hosting the visit.
    pub host_name: Option<String>,
    /// Visitor badge number.
    pub badge_number: Option<String>,
}

/// A staff directory entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StaffRecord {
    /// Employee id.
    pub id: String,
    /// Full name.
    pub name: String,
    /// Employer; staff of the site operator usually leave this blank.
    pub company: String,
    /// Usual working zone, if recorded.
    pub zone: Option<String>,
    /// Contact number.
    pub phone_number: Option<String>,
    /// Staff badge number.
    pub badge_number: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_person_new_defaults() {
        let person = Person::new("p1", "Ada", "Acme", PersonType::Staff, "office");
        assert_eq!(person.status, SafetyStatus::Unknown);
        assert!(person.phone_number.is_none());
        assert!(!person.is_accounted_for());
    }

    #[test]
    fn test_person_serializes_camel_case() {
        let person = Person::new("p1", "Ada", "Acme", PersonType::Visitor, "office");
        let json = serde_json::to_string(&person).unwrap();
        assert!(json.contains("\"lastKnownZone\":\"office\""));
        assert!(json.contains("\"type\":\"visitor\""));
        assert!(json.contains("\"status\":\"unknown\""));
        assert!(!json.contains("phoneNumber"));
    }

    #[test]
    fn test_person_without_zone_is_unassigned() {
        let person: Person = serde_json::from_str(
            r#"{"id":"v-9","name":"Grace","company":"Navy","type":"visitor"}"#,
        )
        .unwrap();
        assert_eq!(person.last_known_zone, UNASSIGNED_ZONE);
        assert_eq!(person.status, SafetyStatus::Unknown);
    }

    #[test]
    fn test_status_parse() {
        for status in [SafetyStatus::Safe, SafetyStatus::Missing, SafetyStatus::Unknown] {
            assert_eq!(SafetyStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SafetyStatus::parse("lost"), None);
    }

    #[test]
    fn test_person_type_parse() {
        assert_eq!(PersonType::parse("contractor"), Some(PersonType::Contractor));
        assert_eq!(PersonType::parse("Staff"), None);
        assert_eq!(PersonType::Visitor.to_string(), "visitor");
    }

    #[test]
    fn test_visitor_record_defaults_missing_fields() {
        let json = r#"{"id": "v1", "name": "Grace"}"#;
        let record: VisitorRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.category, VisitorCategory::Visitor);
        assert!(record.zone.is_none());
        assert!(!record.signed_out);
    }

    #[test]
    fn test_staff_record_deserialize() {
        let json = r#"{"id": "s1", "name": "Linus", "zone": "production", "badgeNumber": "B-12"}"#;
        let record: StaffRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.zone.as_deref(), Some("production"));
        assert_eq!(record.badge_number.as_deref(), Some("B-12"));
    }
}
