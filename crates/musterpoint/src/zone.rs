//! Zone catalogue and per-zone headcount aggregates.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::person::{Person, SafetyStatus};

/// Static configuration of a physical zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneConfig {
    /// Stable zone id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Where people from this zone assemble.
    pub muster_point: String,
    /// Soft occupancy limit. Informational only.
    pub capacity: u32,
}

impl ZoneConfig {
    /// Create a zone configuration.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        muster_point: impl Into<String>,
        capacity: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            muster_point: muster_point.into(),
            capacity,
        }
    }
}

/// A zone together with its derived headcounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    /// Stable zone id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Where people from this zone assemble.
    pub muster_point: String,
    /// Soft occupancy limit.
    pub capacity: u32,
    /// People whose last known zone is this one.
    pub current_count: usize,
    /// Of those, how many are safe.
    pub safe_count: usize,
    /// Of those, how many are missing.
    pub missing_count: usize,
}

impl Zone {
    fn empty(config: &ZoneConfig) -> Self {
        Self {
            id: config.id.clone(),
            name: config.name.clone(),
            muster_point: config.muster_point.clone(),
            capacity: config.capacity,
            current_count: 0,
            safe_count: 0,
            missing_count: 0,
        }
    }

    /// People in the zone who are neither safe nor missing.
    #[must_use]
    pub fn unknown_count(&self) -> usize {
        self.current_count - self.safe_count - self.missing_count
    }

    /// Whether the headcount exceeds the soft capacity.
    #[must_use]
    pub fn over_capacity(&self) -> bool {
        self.current_count > self.capacity as usize
    }
}

/// The fixed set of zones for a site.
#[derive(Debug, Clone, Default)]
pub struct ZoneRegistry {
    zones: Vec<ZoneConfig>,
}

impl ZoneRegistry {
    /// Create a registry from a zone list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigValidation`] if the list is invalid; see
    /// [`ZoneRegistry::initialize`].
    pub fn new(zones: Vec<ZoneConfig>) -> Result<Self> {
        let mut registry = Self::default();
        registry.initialize(zones)?;
        Ok(registry)
    }

    /// Replace the zone list.
    ///
    /// The existing list is kept if validation fails.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigValidation`] if a zone id is empty or
    /// duplicated, or a capacity is zero.
    pub fn initialize(&mut self, zones: Vec<ZoneConfig>) -> Result<()> {
        let mut seen = HashSet::with_capacity(zones.len());
        for zone in &zones {
            if zone.id.trim().is_empty() {
                return Err(Error::config(format!(
                    "zone '{}' has an empty id",
                    zone.name
                )));
            }
            if !seen.insert(zone.id.as_str()) {
                return Err(Error::config(format!("duplicate zone id: {}", zone.id)));
            }
            if zone.capacity == 0 {
                return Err(Error::config(format!(
                    "zone {} must have a capacity greater than 0",
                    zone.id
                )));
            }
        }
        self.zones = zones;
        Ok(())
    }

    /// The configured zones in catalogue order.
    #[must_use]
    pub fn configs(&self) -> &[ZoneConfig] {
        &self.zones
    }

    /// Look up a zone by id.
    #[must_use]
    pub fn get(&self, zone_id: &str) -> Option<&ZoneConfig> {
        self.zones.iter().find(|z| z.id == zone_id)
    }

    /// Whether a zone with this id is configured.
    #[must_use]
    pub fn contains(&self, zone_id: &str) -> bool {
        self.get(zone_id).is_some()
    }

    /// Number of configured zones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    /// Whether no zones are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Count the roster into each zone.
    ///
    /// Pure: returns fresh summaries in catalogue order. People assigned to a
    /// zone outside the catalogue are not counted anywhere.
    #[must_use]
    pub fn recompute_aggregates(&self, roster: &[Person]) -> Vec<Zone> {
        let mut zones: Vec<Zone> = self.zones.iter().map(Zone::empty).collect();
        let index: HashMap<&str, usize> = self
            .zones
            .iter()
            .enumerate()
            .map(|(i, z)| (z.id.as_str(), i))
            .collect();

        for person in roster {
            let Some(&i) = index.get(person.last_known_zone.as_str()) else {
                continue;
            };
            let zone = &mut zones[i];
            zone.current_count += 1;
            match person.status {
                SafetyStatus::Safe => zone.safe_count += 1,
                SafetyStatus::Missing => zone.missing_count += 1,
                SafetyStatus::Unknown => {}
            }
        }

        zones
    }
}
