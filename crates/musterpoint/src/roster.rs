//! The canonical roster of people on site.
//!
//! The roster is built from visitor records and the staff directory before a
//! session starts. During a session only the safety status and last known
//! zone of a person ever change.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::person::{
    Person, PersonType, SafetyStatus, StaffRecord, VisitorCategory, VisitorRecord,
};

/// Owns the list of trackable people for the site.
#[derive(Debug, Clone)]
pub struct RosterStore {
    default_zone: String,
    people: Vec<Person>,
}

impl RosterStore {
    /// Create an empty roster that places people without a recorded zone in
    /// `default_zone`.
    #[must_use]
    pub fn new(default_zone: impl Into<String>) -> Self {
        Self {
            default_zone: default_zone.into(),
            people: Vec::new(),
        }
    }

    /// The zone assigned to imported people with no recorded zone.
    #[must_use]
    pub fn default_zone(&self) -> &str {
        &self.default_zone
    }

    /// Merge visitor and staff records into a fresh roster.
    ///
    /// Visitors who have signed out are skipped. Every imported person starts
    /// with an unknown status. On error the current roster is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRecord`] if a record has a blank id or name, or
    /// if the same id appears twice across both inputs.
    pub fn load(&mut self, visitors: &[VisitorRecord], staff: &[StaffRecord]) -> Result<&[Person]> {
        let mut people = Vec::with_capacity(visitors.len() + staff.len());
        let mut seen = HashSet::new();

        for (i, record) in visitors.iter().enumerate() {
            require_identity("visitor", i, &record.id, &record.name)?;
            if record.signed_out {
                debug!(visitor_id = %record.id, "Skipping signed-out visitor");
                continue;
            }
            if !seen.insert(record.id.clone()) {
                return Err(Error::invalid_record(format!(
                    "duplicate person id: {}",
                    record.id
                )));
            }
            let person_type = match record.category {
                VisitorCategory::Visitor => PersonType::Visitor,
                VisitorCategory::Contractor | VisitorCategory::Supplier => PersonType::Contractor,
            };
            let mut person = Person::new(
                record.id.clone(),
                record.name.trim(),
                record.company.clone(),
                person_type,
                self.zone_or_default(record.zone.as_deref()),
            );
            person.phone_number.clone_from(&record.phone_number);
            person.host_name.clone_from(&record.host_name);
            person.badge_number.clone_from(&record.badge_number);
            people.push(person);
        }

        for (i, record) in staff.iter().enumerate() {
            require_identity("staff", i, &record.id, &record.name)?;
            if !seen.insert(record.id.clone()) {
                return Err(Error::invalid_record(format!(
                    "duplicate person id: {}",
                    record.id
                )));
            }
            let mut person = Person::new(
                record.id.clone(),
                record.name.trim(),
                record.company.clone(),
                PersonType::Staff,
                self.zone_or_default(record.zone.as_deref()),
            );
            person.phone_number.clone_from(&record.phone_number);
            person.badge_number.clone_from(&record.badge_number);
            people.push(person);
        }

        info!(
            visitors = visitors.len(),
            staff = staff.len(),
            people = people.len(),
            "Roster loaded"
        );
        self.people = people;
        Ok(&self.people)
    }

    fn zone_or_default(&self, zone: Option<&str>) -> String {
        match zone.map(str::trim) {
            Some(z) if !z.is_empty() => z.to_string(),
            _ => self.default_zone.clone(),
        }
    }

    /// Replace the roster wholesale, e.g. with a snapshot from storage.
    pub fn replace(&mut self, people: Vec<Person>) {
        self.people = people;
    }

    /// Force every person's status back to unknown.
    pub fn reset(&mut self) -> &[Person] {
        for person in &mut self.people {
            person.status = SafetyStatus::Unknown;
        }
        &self.people
    }

    /// Update one person's status, and their zone when `zone_id` is given.
    ///
    /// Returns `false` and leaves the roster unchanged if no person has
    /// `person_id`.
    pub fn set_status(&mut self, person_id: &str, status: SafetyStatus, zone_id: Option<&str>) -> bool {
        let Some(person) = self.people.iter_mut().find(|p| p.id == person_id) else {
            debug!(person_id, "Status update for unknown person ignored");
            return false;
        };
        person.status = status;
        if let Some(zone) = zone_id {
            person.last_known_zone = zone.to_string();
        }
        true
    }

    /// All people in roster order.
    #[must_use]
    pub fn people(&self) -> &[Person] {
        &self.people
    }

    /// Look up a person by id.
    #[must_use]
    pub fn get(&self, person_id: &str) -> Option<&Person> {
        self.people.iter().find(|p| p.id == person_id)
    }

    /// Number of people on the roster.
    #[must_use]
    pub fn len(&self) -> usize {
        self.people.len()
    }

    /// Whether the roster is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
    }

    /// Count of people with the given status.
    #[must_use]
    pub fn count_with_status(&self, status: SafetyStatus) -> usize {
        self.people.iter().filter(|p| p.status == status).count()
    }

    /// People last seen in `zone_id`.
    #[must_use]
    pub fn in_zone(&self, zone_id: &str) -> Vec<Person> {
        self.people
            .iter()
            .filter(|p| p.last_known_zone == zone_id)
            .cloned()
            .collect()
    }

    /// People with the given status.
    #[must_use]
    pub fn with_status(&self, status: SafetyStatus) -> Vec<Person> {
        self.people
            .iter()
            .filter(|p| p.status == status)
            .cloned()
            .collect()
    }

    /// Case-insensitive search over name, company and badge number.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<Person> {
        let needle = query.trim().to_lowercase();
        self.people
            .iter()
            .filter(|p| {
                p.name.to_lowercase().contains(&needle)
                    || p.company.to_lowercase().contains(&needle)
                    || p
                        .badge_number
                        .as_ref()
                        .is_some_and(|b| b.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect()
    }
}

fn require_identity(kind: &str, index: usize, id: &str, name: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(Error::invalid_record(format!(
            "{kind} record {index} has no id"
        )));
    }
    if name.trim().is_empty() {
        return Err(Error::invalid_record(format!(
            "{kind} record {id} has no name"
        )));
    }
    Ok(())
}
