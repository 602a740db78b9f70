// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Media graph description and matching
//!
//! A [`MediaDevice`] describes one piece of capture hardware as a graph of
//! named entities (sensors, processing blocks, capture nodes) joined by
//! links. Pipeline handlers describe the hardware they drive with a
//! [`DeviceMatch`] and ask the [`DeviceEnumerator`] for a device satisfying it.
//!
//! # Example
//!
//! ```
//! use pipecam::media::{DeviceMatch, MediaDevice};
//!
//! let mut media = MediaDevice::new("vimc", "VIMC MDEV");
//! media.add_entity("Sensor B", None);
//! media.add_entity("Raw Capture 1", Some("/dev/video1"));
//! media.add_link("Sensor B", "Raw Capture 1");
//!
//! let mut dm = DeviceMatch::new("vimc");
//! dm.add("Raw Capture 1");
//! assert!(dm.matches(&media));
//!
//! dm.add("Scaler");
//! assert!(!dm.matches(&media));
//! ```

mod enumerator;

pub use enumerator::{DeviceEnumerator, MediaLease, MediaSource};

use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;

/// A node of the media graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaEntity {
    /// Entity id, unique within its media device
    pub id: u32,
    /// Entity name, e.g. "Raw Capture 1"
    pub name: String,
    /// Video node exposing the entity to userspace, if any (e.g. "/dev/video1")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_node: Option<String>,
}

/// A directed connection between two entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaLink {
    /// Source entity id
    pub source: u32,
    /// Sink entity id
    pub sink: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Hardware topology: driver identity plus the entity/link graph.
///
/// Immutable once enumerated. The only mutable part is the acquisition
/// flag, which [`DeviceEnumerator::acquire`] sets and [`MediaLease`]
/// clears when dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaDevice {
    driver: String,
    model: String,
    #[serde(default)]
    entities: Vec<MediaEntity>,
    #[serde(default)]
    links: Vec<MediaLink>,
    #[serde(skip)]
    acquired: Cell<bool>,
}

impl MediaDevice {
    pub fn new(driver: &str, model: &str) -> Self {
        MediaDevice {
            driver: driver.to_owned(),
            model: model.to_owned(),
            entities: Vec::new(),
            links: Vec::new(),
            acquired: Cell::new(false),
        }
    }

    /// Adds an entity and returns its id.
    pub fn add_entity(&mut self, name: &str, device_node: Option<&str>) -> u32 {
        let id = self.entities.len() as u32 + 1;
        self.entities.push(MediaEntity {
            id,
            name: name.to_owned(),
            device_node: device_node.map(str::to_owned),
        });
        id
    }

    /// Links two entities by name. Returns false if either does not exist.
    pub fn add_link(&mut self, source: &str, sink: &str) -> bool {
        match (self.entity_by_name(source), self.entity_by_name(sink)) {
            (Some(src), Some(dst)) => {
                let link = MediaLink {
                    source: src.id,
                    sink: dst.id,
                    enabled: true,
                };
                self.links.push(link);
                true
            }
            _ => false,
        }
    }

    /// Kernel driver name, e.g. "vimc" or "uvcvideo"
    pub fn driver(&self) -> &str {
        &self.driver
    }

    /// Model name reported by the driver
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn entities(&self) -> &[MediaEntity] {
        &self.entities
    }

    pub fn links(&self) -> &[MediaLink] {
        &self.links
    }

    pub fn entity_by_name(&self, name: &str) -> Option<&MediaEntity> {
        self.entities.iter().find(|e| e.name == name)
    }

    pub fn entity(&self, id: u32) -> Option<&MediaEntity> {
        self.entities.iter().find(|e| e.id == id)
    }

    /// Entities fed by `name` through enabled links.
    pub fn sinks_of(&self, name: &str) -> Vec<&MediaEntity> {
        let Some(src) = self.entity_by_name(name) else {
            return Vec::new();
        };
        self.links
            .iter()
            .filter(|l| l.enabled && l.source == src.id)
            .filter_map(|l| self.entity(l.sink))
            .collect()
    }

    pub fn is_acquired(&self) -> bool {
        self.acquired.get()
    }

    pub(crate) fn set_acquired(&self, acquired: bool) {
        self.acquired.set(acquired);
    }
}

impl fmt::Display for MediaDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {} entities, {} links)",
            self.model,
            self.driver,
            self.entities.len(),
            self.links.len()
        )
    }
}

/// Query describing the hardware a pipeline handler can drive.
///
/// A media device satisfies the match when its driver name is equal and
/// every listed entity name exists in its graph. There is no partial or
/// fuzzy matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMatch {
    driver: String,
    entities: Vec<String>,
}

impl DeviceMatch {
    pub fn new(driver: &str) -> Self {
        DeviceMatch {
            driver: driver.to_owned(),
            entities: Vec::new(),
        }
    }

    /// Requires an entity with the given name.
    pub fn add(&mut self, entity: &str) {
        self.entities.push(entity.to_owned());
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }

    pub fn entities(&self) -> &[String] {
        &self.entities
    }

    pub fn matches(&self, media: &MediaDevice) -> bool {
        if media.driver() != self.driver {
            return false;
        }

        self.entities
            .iter()
            .all(|name| media.entity_by_name(name).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topology() -> MediaDevice {
        let mut media = MediaDevice::new("vimc", "VIMC MDEV");
        media.add_entity("Sensor A", None);
        media.add_entity("Debayer A", None);
        media.add_entity("Raw Capture 0", Some("/dev/video0"));
        assert!(media.add_link("Sensor A", "Debayer A"));
        assert!(media.add_link("Sensor A", "Raw Capture 0"));
        media
    }

    #[test]
    fn test_driver_must_match() {
        let media = topology();
        let mut dm = DeviceMatch::new("uvcvideo");
        dm.add("Sensor A");
        assert!(!dm.matches(&media));
    }

    #[test]
    fn test_empty_match_selects_driver() {
        assert!(DeviceMatch::new("vimc").matches(&topology()));
    }

    #[test]
    fn test_links() {
        let mut media = topology();
        assert!(!media.add_link("Sensor A", "Missing"));
        let sinks: Vec<&str> = media
            .sinks_of("Sensor A")
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(sinks, ["Debayer A", "Raw Capture 0"]);
        assert!(media.sinks_of("Raw Capture 0").is_empty());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            topology().to_string(),
            "VIMC MDEV (vimc, 3 entities, 2 links)"
        );
    }
}
