// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Capture requests
//!
//! A [`Request`] is one capture cycle: a buffer index for every active
//! stream of a camera. The application creates it with
//! [`Camera::create_request`](crate::camera::Camera::create_request), fills
//! in the buffers and queues it; ownership of the request moves into the
//! pipeline and comes back through the completion callback once every buffer
//! has completed, or been cancelled by `stop`.

use std::collections::BTreeMap;
use std::fmt;

use crate::buffer::{BufferStatus, FrameMemory, FrameMetadata};
use crate::camera::CameraId;
use crate::stream::StreamId;
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestStatus {
    /// Created, not queued
    Pending,
    /// Queued to the hardware, waiting for buffers to complete
    InFlight,
    /// Every buffer completed (some may carry [`BufferStatus::Error`])
    Complete,
    /// Capture stopped before every buffer completed
    Cancelled,
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestStatus::Pending => write!(f, "pending"),
            RequestStatus::InFlight => write!(f, "in-flight"),
            RequestStatus::Complete => write!(f, "complete"),
            RequestStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A buffer assignment of a request and its fill state.
#[derive(Debug, Clone)]
pub struct RequestBuffer {
    index: u32,
    status: BufferStatus,
    memory: Option<FrameMemory>,
    metadata: Option<FrameMetadata>,
}

impl RequestBuffer {
    /// Index of the buffer in its stream's pool
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn status(&self) -> BufferStatus {
        self.status
    }

    /// Frame memory, attached once the request is queued
    pub fn memory(&self) -> Option<&FrameMemory> {
        self.memory.as_ref()
    }

    pub fn metadata(&self) -> Option<&FrameMetadata> {
        self.metadata.as_ref()
    }
}

#[derive(Debug)]
pub struct Request {
    camera: CameraId,
    cookie: u64,
    sequence: u64,
    status: RequestStatus,
    buffers: BTreeMap<StreamId, RequestBuffer>,
}

impl Request {
    pub(crate) fn new(camera: CameraId) -> Self {
        Request {
            camera,
            cookie: 0,
            sequence: 0,
            status: RequestStatus::Pending,
            buffers: BTreeMap::new(),
        }
    }

    /// Assigns buffer `index` of `stream`'s pool to this request.
    ///
    /// Fails if the stream already has a buffer or the request was queued.
    pub fn add_buffer(&mut self, stream: StreamId, index: u32) -> Result<(), Error> {
        if self.status != RequestStatus::Pending {
            return Err(Error::InvalidRequest(format!(
                "cannot add buffers to a {} request",
                self.status
            )));
        }
        if self.buffers.contains_key(&stream) {
            return Err(Error::InvalidRequest(format!(
                "{} already has a buffer in this request",
                stream
            )));
        }

        self.buffers.insert(
            stream,
            RequestBuffer {
                index,
                status: BufferStatus::Pending,
                memory: None,
                metadata: None,
            },
        );
        Ok(())
    }

    pub fn camera(&self) -> CameraId {
        self.camera
    }

    /// Opaque application value carried through completion
    pub fn cookie(&self) -> u64 {
        self.cookie
    }

    pub fn set_cookie(&mut self, cookie: u64) {
        self.cookie = cookie;
    }

    /// Queue order assigned by the pipeline, starting at 1 per camera
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn buffer(&self, stream: StreamId) -> Option<&RequestBuffer> {
        self.buffers.get(&stream)
    }

    pub fn buffers(&self) -> impl Iterator<Item = (StreamId, &RequestBuffer)> {
        self.buffers.iter().map(|(id, buf)| (*id, buf))
    }

    pub fn streams(&self) -> impl Iterator<Item = StreamId> + '_ {
        self.buffers.keys().copied()
    }

    pub fn has_pending_buffers(&self) -> bool {
        self.buffers
            .values()
            .any(|b| b.status == BufferStatus::Pending)
    }

    pub(crate) fn mark_in_flight(&mut self, sequence: u64) {
        self.sequence = sequence;
        self.status = RequestStatus::InFlight;
    }

    pub(crate) fn attach_memory(&mut self, stream: StreamId, memory: FrameMemory) {
        if let Some(buffer) = self.buffers.get_mut(&stream) {
            buffer.memory = Some(memory);
        }
    }

    /// Records the completion of `stream`'s buffer if it is `index` and still pending.
    pub(crate) fn complete_buffer(
        &mut self,
        stream: StreamId,
        index: u32,
        status: BufferStatus,
        metadata: Option<FrameMetadata>,
    ) -> bool {
        match self.buffers.get_mut(&stream) {
            Some(buffer) if buffer.index == index && buffer.status == BufferStatus::Pending => {
                buffer.status = status;
                buffer.metadata = metadata;
                true
            }
            _ => false,
        }
    }

    /// Marks every pending buffer with `status`, returning the affected streams.
    pub(crate) fn resolve_pending(&mut self, status: BufferStatus) -> Vec<(StreamId, u32)> {
        let mut resolved = Vec::new();
        for (stream, buffer) in self.buffers.iter_mut() {
            if buffer.status == BufferStatus::Pending {
                buffer.status = status;
                resolved.push((*stream, buffer.index));
            }
        }
        resolved
    }

    /// Final transition once no buffer is pending.
    pub(crate) fn finish(&mut self) {
        let cancelled = self
            .buffers
            .values()
            .any(|b| b.status == BufferStatus::Cancelled);
        self.status = if cancelled {
            RequestStatus::Cancelled
        } else {
            RequestStatus::Complete
        };
    }
}
