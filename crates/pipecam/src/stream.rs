// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Streams and their configuration
//!
//! A camera exposes a fixed set of streams, each an independently
//! configurable capture output with its own buffer pool. Applications refer
//! to streams by [`StreamId`] and describe what they want with a
//! [`CameraConfiguration`], one [`StreamConfiguration`] per stream.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::buffer::BufferPool;
use crate::fourcc::FourCC;
use crate::geometry::Size;

static NEXT_STREAM_ID: AtomicU32 = AtomicU32::new(1);

/// Process-wide unique stream identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u32);

impl StreamId {
    /// Allocates a fresh id. Pipeline handlers call this while matching.
    pub fn next() -> Self {
        StreamId(NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream#{}", self.0)
    }
}

/// What the application intends to use a stream for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamRole {
    StillCapture,
    VideoRecording,
    Viewfinder,
}

/// Format, size and buffer count of one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfiguration {
    pub pixel_format: FourCC,
    pub size: Size,
    pub buffer_count: u32,
}

impl StreamConfiguration {
    pub fn new(pixel_format: FourCC, size: Size, buffer_count: u32) -> Self {
        Self {
            pixel_format,
            size,
            buffer_count,
        }
    }
}

impl fmt::Display for StreamConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.size, self.pixel_format)
    }
}

/// Per-stream configuration of a camera, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CameraConfiguration {
    entries: Vec<(StreamId, StreamConfiguration)>,
}

impl CameraConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration of `stream`, replacing any previous one.
    pub fn insert(&mut self, stream: StreamId, config: StreamConfiguration) {
        match self.entries.iter_mut().find(|(id, _)| *id == stream) {
            Some(entry) => entry.1 = config,
            None => self.entries.push((stream, config)),
        }
    }

    pub fn get(&self, stream: StreamId) -> Option<&StreamConfiguration> {
        self.entries
            .iter()
            .find(|(id, _)| *id == stream)
            .map(|(_, cfg)| cfg)
    }

    pub fn get_mut(&mut self, stream: StreamId) -> Option<&mut StreamConfiguration> {
        self.entries
            .iter_mut()
            .find(|(id, _)| *id == stream)
            .map(|(_, cfg)| cfg)
    }

    pub fn streams(&self) -> impl Iterator<Item = StreamId> + '_ {
        self.entries.iter().map(|(id, _)| *id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (StreamId, &StreamConfiguration)> {
        self.entries.iter().map(|(id, cfg)| (*id, cfg))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for CameraConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (id, cfg)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", id, cfg)?;
        }
        Ok(())
    }
}

/// One capture output of a camera, owned by the pipeline.
#[derive(Debug)]
pub struct Stream {
    id: StreamId,
    configuration: Option<StreamConfiguration>,
    pool: BufferPool,
    active: bool,
}

impl Stream {
    pub fn new(id: StreamId) -> Self {
        Stream {
            id,
            configuration: None,
            pool: BufferPool::new(),
            active: false,
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Applied configuration, `None` until the camera is configured
    pub fn configuration(&self) -> Option<&StreamConfiguration> {
        self.configuration.as_ref()
    }

    pub(crate) fn set_configuration(&mut self, config: Option<StreamConfiguration>) {
        self.active = config.is_some();
        self.configuration = config;
    }

    /// Whether the stream is part of the current configuration
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut BufferPool {
        &mut self.pool
    }
}
