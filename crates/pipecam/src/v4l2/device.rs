// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use std::fmt;
use std::io;

use super::node::VideoNode;
use crate::buffer::{BufferStatus, FrameMemory, FrameMetadata};
use crate::category;
use crate::fourcc::FourCC;
use crate::geometry::Size;
use crate::media::{DeviceEnumerator, MediaDevice};
use crate::stream::StreamId;
use crate::Error;

/// Format negotiated with a video node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFormat {
    pub fourcc: FourCC,
    pub size: Size,
    /// Line stride in bytes, 0 when unknown or compressed
    pub bytes_per_line: u32,
    /// Bytes needed for one frame, 0 when unknown
    pub size_image: usize,
}

impl DeviceFormat {
    /// Format with stride and image size derived from the pixel layout.
    pub fn new(fourcc: FourCC, size: Size) -> Self {
        let bytes_per_line = fourcc
            .bits_per_pixel()
            .map(|bpp| size.width * bpp / 8)
            .unwrap_or(0);
        let size_image = fourcc.frame_size(size.width, size.height).unwrap_or(0);
        DeviceFormat {
            fourcc,
            size,
            bytes_per_line,
            size_image,
        }
    }
}

impl fmt::Display for DeviceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.size, self.fourcc)
    }
}

/// A completed buffer, attributed to the stream its device feeds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferReady {
    pub stream: StreamId,
    pub index: u32,
    /// [`BufferStatus::Success`] or [`BufferStatus::Error`]
    pub status: BufferStatus,
    pub metadata: FrameMetadata,
}

/// One capture endpoint.
///
/// Owns its [`VideoNode`] and tracks which buffer indices the node's queue
/// currently holds, so a buffer can never be queued twice and every queued
/// buffer is accounted for on stream-off. Dropping the device stops
/// streaming, frees the buffers and closes the node.
pub struct VideoDevice {
    entity: String,
    node: Box<dyn VideoNode>,
    open: bool,
    format: Option<DeviceFormat>,
    queued: Vec<bool>,
    streaming: bool,
    stream: Option<StreamId>,
}

impl VideoDevice {
    /// Wraps a node without opening it.
    pub fn new(entity: &str, node: Box<dyn VideoNode>) -> Self {
        VideoDevice {
            entity: entity.to_owned(),
            node,
            open: false,
            format: None,
            queued: Vec::new(),
            streaming: false,
            stream: None,
        }
    }

    /// Locates the video node of `entity` in `media` and opens it.
    pub fn open_entity(
        enumerator: &DeviceEnumerator,
        media: &MediaDevice,
        entity: &str,
    ) -> Result<Self, Error> {
        let node = enumerator.open_node(media, entity)?;
        let mut device = VideoDevice::new(entity, node);
        device.open()?;
        Ok(device)
    }

    pub fn open(&mut self) -> Result<(), Error> {
        if self.open {
            return Ok(());
        }

        self.node.open().map_err(|err| {
            log::error!(target: category::V4L2, "Failed to open {}: {}", self.entity, err);
            err
        })?;
        self.open = true;
        log::debug!(target: category::V4L2, "Opened {}", self.entity);
        Ok(())
    }

    pub fn close(&mut self) {
        if !self.open {
            return;
        }

        self.stream_off();
        if !self.queued.is_empty() {
            if let Err(err) = self.release_buffers() {
                log::warn!(target: category::V4L2, "{}: {}", self.entity, err);
            }
        }
        self.node.close();
        self.open = false;
        log::debug!(target: category::V4L2, "Closed {}", self.entity);
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Entity name the device was opened for
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Routes this device's completions to `stream`.
    pub fn connect(&mut self, stream: StreamId) {
        self.stream = Some(stream);
    }

    pub fn stream(&self) -> Option<StreamId> {
        self.stream
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.open {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::NotConnected,
                format!("{} is not open", self.entity),
            )
            .into())
        }
    }

    /// Format the node would select for `format`; nothing is applied.
    pub fn try_format(&mut self, format: &DeviceFormat) -> Result<DeviceFormat, Error> {
        self.ensure_open()?;
        Ok(self.node.try_format(format)?)
    }

    /// Applies the nearest supported format and returns it.
    ///
    /// Fails with [`Error::Busy`] while buffers are allocated.
    pub fn set_format(&mut self, format: &DeviceFormat) -> Result<DeviceFormat, Error> {
        self.ensure_open()?;
        if !self.queued.is_empty() {
            return Err(Error::Busy(format!(
                "{} has {} buffers allocated",
                self.entity,
                self.queued.len()
            )));
        }

        let applied = self.node.set_format(format)?;
        if applied != *format {
            log::debug!(
                target: category::V4L2,
                "{}: requested {}, adjusted to {}",
                self.entity,
                format,
                applied
            );
        }
        self.format = Some(applied);
        Ok(applied)
    }

    pub fn format(&self) -> Option<&DeviceFormat> {
        self.format.as_ref()
    }

    /// Allocates `count` buffers and returns their memory in index order.
    pub fn export_buffers(&mut self, count: u32) -> Result<Vec<FrameMemory>, Error> {
        self.ensure_open()?;
        if !self.queued.is_empty() {
            return Err(Error::Busy(format!(
                "{} already exported {} buffers",
                self.entity,
                self.queued.len()
            )));
        }

        let memory = self.node.request_buffers(count)?;
        if memory.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::OutOfMemory,
                format!("{} allocated no buffers", self.entity),
            )
            .into());
        }
        if memory.len() != count as usize {
            log::warn!(
                target: category::V4L2,
                "{}: requested {} buffers, got {}",
                self.entity,
                count,
                memory.len()
            );
        }

        log::debug!(target: category::V4L2, "{}: exported {} buffers", self.entity, memory.len());
        self.queued = vec![false; memory.len()];
        Ok(memory)
    }

    /// Frees the exported buffers.
    ///
    /// Fails with [`Error::Busy`] while streaming or while any buffer is queued.
    pub fn release_buffers(&mut self) -> Result<(), Error> {
        self.ensure_open()?;
        if self.streaming || self.queued() > 0 {
            return Err(Error::Busy(format!(
                "{} is streaming with {} buffers queued",
                self.entity,
                self.queued()
            )));
        }

        self.node.request_buffers(0)?;
        self.queued.clear();
        log::debug!(target: category::V4L2, "{}: released buffers", self.entity);
        Ok(())
    }

    /// Number of exported buffers
    pub fn buffer_count(&self) -> usize {
        self.queued.len()
    }

    pub fn queue_buffer(&mut self, index: u32) -> Result<(), Error> {
        self.ensure_open()?;
        match self.queued.get(index as usize) {
            None => {
                return Err(Error::InvalidRequest(format!(
                    "{} has no buffer {}",
                    self.entity, index
                )))
            }
            Some(true) => {
                return Err(Error::Busy(format!(
                    "{}: buffer {} is already queued",
                    self.entity, index
                )))
            }
            Some(false) => {}
        }

        self.node.queue_buffer(index)?;
        self.queued[index as usize] = true;
        log::trace!(target: category::V4L2, "{}: queued buffer {}", self.entity, index);
        Ok(())
    }

    /// Number of buffers currently held by the node's queue
    pub fn queued(&self) -> usize {
        self.queued.iter().filter(|q| **q).count()
    }

    pub fn stream_on(&mut self) -> Result<(), Error> {
        self.ensure_open()?;
        if self.streaming {
            return Ok(());
        }

        self.node.stream_on()?;
        self.streaming = true;
        log::debug!(target: category::V4L2, "{}: stream on", self.entity);
        Ok(())
    }

    /// Stops streaming and returns the indices flushed from the queue.
    ///
    /// Best effort: a node error is logged and the queue is still considered
    /// empty, since the kernel returns every buffer on stream-off.
    pub fn stream_off(&mut self) -> Vec<u32> {
        if self.streaming {
            if let Err(err) = self.node.stream_off() {
                log::warn!(target: category::V4L2, "{}: stream off failed: {}", self.entity, err);
            }
            self.streaming = false;
            log::debug!(target: category::V4L2, "{}: stream off", self.entity);
        }

        let flushed: Vec<u32> = self
            .queued
            .iter()
            .enumerate()
            .filter(|(_, queued)| **queued)
            .map(|(index, _)| index as u32)
            .collect();
        self.queued.iter_mut().for_each(|q| *q = false);
        flushed
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Drains every completion the node has ready.
    pub fn dequeue(&mut self) -> Vec<BufferReady> {
        let mut ready = Vec::new();
        if !self.open {
            return ready;
        }

        loop {
            let completion = match self.node.dequeue_buffer() {
                Ok(Some(completion)) => completion,
                Ok(None) => break,
                Err(err) => {
                    log::warn!(target: category::V4L2, "{}: dequeue failed: {}", self.entity, err);
                    break;
                }
            };

            let index = completion.index;
            match self.queued.get_mut(index as usize) {
                Some(queued) if *queued => *queued = false,
                _ => {
                    log::warn!(
                        target: category::V4L2,
                        "{}: dropping completion of buffer {} that was not queued",
                        self.entity,
                        index
                    );
                    continue;
                }
            }

            let Some(stream) = self.stream else {
                log::warn!(target: category::V4L2, "{}: completion with no stream connected", self.entity);
                continue;
            };

            ready.push(BufferReady {
                stream,
                index,
                status: if completion.error {
                    BufferStatus::Error
                } else {
                    BufferStatus::Success
                },
                metadata: FrameMetadata {
                    sequence: completion.sequence,
                    timestamp: completion.timestamp,
                    bytes_used: completion.bytes_used,
                },
            });
        }

        ready
    }
}

impl fmt::Debug for VideoDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoDevice")
            .field("entity", &self.entity)
            .field("open", &self.open)
            .field("format", &self.format)
            .field("buffers", &self.queued.len())
            .field("queued", &self.queued())
            .field("streaming", &self.streaming)
            .finish()
    }
}

impl Drop for VideoDevice {
    fn drop(&mut self) {
        self.close();
    }
}
