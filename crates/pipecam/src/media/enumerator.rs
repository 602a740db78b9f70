// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Device enumerator
//!
//! This module provides the [`DeviceEnumerator`], which collects the media
//! devices exposed by a [`MediaSource`] and answers [`DeviceMatch`] queries
//! for pipeline handlers.

use std::io;
use std::ops::Deref;
use std::rc::Rc;

use super::{DeviceMatch, MediaDevice, MediaEntity};
use crate::category;
use crate::v4l2::VideoNode;
use crate::Error;

/// Host facility exposing capture hardware.
///
/// On a Linux system this is the media controller API (`/dev/media*`) plus
/// the video nodes it references. The crate ships
/// [`VirtualMediaSource`](crate::virt::VirtualMediaSource), an in-process
/// implementation.
pub trait MediaSource {
    /// Lists every media device currently present.
    fn enumerate(&self) -> io::Result<Vec<MediaDevice>>;

    /// Opens the video node behind `entity` of `media`.
    fn open_node(&self, media: &MediaDevice, entity: &MediaEntity) -> io::Result<Box<dyn VideoNode>>;
}

/// Device enumerator
///
/// Holds the media devices found by [`enumerate`](Self::enumerate) in
/// discovery order. Pipeline handlers call [`acquire`](Self::acquire) with
/// their [`DeviceMatch`]; a device can be acquired by one handler at a time.
///
/// # Example
///
/// ```
/// use pipecam::media::{DeviceEnumerator, DeviceMatch};
/// use pipecam::virt::VirtualMediaSource;
///
/// let mut enumerator = DeviceEnumerator::new(VirtualMediaSource::new().with_vimc());
/// assert_eq!(enumerator.enumerate()?, 1);
///
/// let mut dm = DeviceMatch::new("vimc");
/// dm.add("Raw Capture 1");
/// let lease = enumerator.acquire(&dm).expect("vimc present");
/// assert!(enumerator.search(&dm).is_none());
///
/// drop(lease);
/// assert!(enumerator.search(&dm).is_some());
/// # Ok::<(), pipecam::Error>(())
/// ```
pub struct DeviceEnumerator {
    source: Box<dyn MediaSource>,
    devices: Vec<Rc<MediaDevice>>,
}

impl DeviceEnumerator {
    pub fn new<S: MediaSource + 'static>(source: S) -> Self {
        DeviceEnumerator {
            source: Box::new(source),
            devices: Vec::new(),
        }
    }

    /// Discovers all media devices, replacing any previous result.
    ///
    /// Returns the number of devices found.
    pub fn enumerate(&mut self) -> Result<usize, Error> {
        let found = self.source.enumerate()?;
        for media in &found {
            log::debug!(target: category::MEDIA, "Found media device {}", media);
        }
        self.devices = found.into_iter().map(Rc::new).collect();
        Ok(self.devices.len())
    }

    pub fn devices(&self) -> &[Rc<MediaDevice>] {
        &self.devices
    }

    /// First enumerated, not yet acquired device satisfying `dm`.
    pub fn search(&self, dm: &DeviceMatch) -> Option<Rc<MediaDevice>> {
        let found = self
            .devices
            .iter()
            .find(|media| !media.is_acquired() && dm.matches(media))
            .cloned();

        match &found {
            Some(media) => {
                log::debug!(target: category::MEDIA, "{} matched {}", dm.driver(), media)
            }
            None => log::debug!(
                target: category::MEDIA,
                "No free {} device with entities {:?}",
                dm.driver(),
                dm.entities()
            ),
        }

        found
    }

    /// Searches for `dm` and marks the device acquired until the lease drops.
    pub fn acquire(&self, dm: &DeviceMatch) -> Option<MediaLease> {
        let media = self.search(dm)?;
        media.set_acquired(true);
        Some(MediaLease { media })
    }

    /// Opens the video node exposed by entity `name` of `media`.
    pub fn open_node(&self, media: &MediaDevice, name: &str) -> Result<Box<dyn VideoNode>, Error> {
        let entity = media.entity_by_name(name).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} has no entity {}", media.model(), name),
            )
        })?;

        if entity.device_node.is_none() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("entity {} has no video node", name),
            )
            .into());
        }

        Ok(self.source.open_node(media, entity)?)
    }
}

/// Exclusive claim on a media device, released on drop.
#[derive(Debug)]
pub struct MediaLease {
    media: Rc<MediaDevice>,
}

impl MediaLease {
    pub fn device(&self) -> &Rc<MediaDevice> {
        &self.media
    }
}

impl Deref for MediaLease {
    type Target = MediaDevice;

    fn deref(&self) -> &MediaDevice {
        &self.media
    }
}

impl Drop for MediaLease {
    fn drop(&mut self) {
        log::debug!(target: category::MEDIA, "Releasing {}", self.media.model());
        self.media.set_acquired(false);
    }
}
