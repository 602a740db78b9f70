// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Application-facing camera
//!
//! A [`Camera`] is a thin handle: every control operation is forwarded to
//! the [`Pipeline`] owning the camera's hardware, tagged with the camera's
//! id. The camera itself only keeps the completed requests waiting for the
//! application and the completion callback.
//!
//! Completed requests are handed to the callback registered with
//! [`Camera::on_request_completed`], in completion order. Without a
//! callback they wait in a queue read with [`Camera::next_completed`].
//! Delivery never happens while the pipeline is borrowed, so the callback
//! may queue new requests or stop the camera.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::buffer::FrameMemory;
use crate::category;
use crate::pipeline::{CameraState, Pipeline};
use crate::request::Request;
use crate::stream::{CameraConfiguration, StreamConfiguration, StreamId, StreamRole};
use crate::Error;

static NEXT_CAMERA_ID: AtomicU32 = AtomicU32::new(1);

/// Process-wide unique camera identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CameraId(u32);

impl CameraId {
    pub(crate) fn next() -> Self {
        CameraId(NEXT_CAMERA_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "camera#{}", self.0)
    }
}

/// Buffer counts of one stream's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Allocated buffers
    pub buffers: usize,
    /// Buffers currently owned by the device queue
    pub queued: usize,
}

type CompletionCallback = Box<dyn FnMut(&Camera, Request)>;

pub struct Camera {
    id: CameraId,
    name: String,
    streams: Vec<StreamId>,
    pipeline: Rc<RefCell<Pipeline>>,
    completed: RefCell<VecDeque<Request>>,
    callback: RefCell<Option<CompletionCallback>>,
}

impl Camera {
    pub(crate) fn new(
        id: CameraId,
        name: String,
        streams: Vec<StreamId>,
        pipeline: Rc<RefCell<Pipeline>>,
    ) -> Self {
        Camera {
            id,
            name,
            streams,
            pipeline,
            completed: RefCell::new(VecDeque::new()),
            callback: RefCell::new(None),
        }
    }

    pub fn id(&self) -> CameraId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Streams of the camera, fixed at match time.
    pub fn streams(&self) -> &[StreamId] {
        &self.streams
    }

    /// Name of the pipeline handler driving the camera
    pub fn pipeline_name(&self) -> &'static str {
        self.pipeline.borrow().name()
    }

    pub fn state(&self) -> CameraState {
        self.pipeline
            .borrow()
            .state(self.id)
            .unwrap_or(CameraState::Registered)
    }

    /// Applied configuration of `stream`, if configured
    pub fn configuration(&self, stream: StreamId) -> Option<StreamConfiguration> {
        self.pipeline.borrow().configuration(self.id, stream)
    }

    pub fn pool_status(&self, stream: StreamId) -> Option<PoolStatus> {
        self.pipeline.borrow().pool_status(self.id, stream)
    }

    /// Memory of buffer `index` of `stream`, while allocated.
    pub fn buffer_memory(&self, stream: StreamId, index: u32) -> Option<FrameMemory> {
        self.pipeline.borrow().buffer_memory(self.id, stream, index)
    }

    /// Requests queued and not handed back yet.
    pub fn in_flight(&self) -> usize {
        self.pipeline.borrow().in_flight(self.id)
    }

    /// Default configuration for `roles`, one stream per role in stream order.
    pub fn generate_configuration(&self, roles: &[StreamRole]) -> CameraConfiguration {
        self.pipeline
            .borrow()
            .generate_configuration(self.id, roles)
    }

    /// Applies `config`, returning the configuration now in effect.
    pub fn configure(&self, config: &CameraConfiguration) -> Result<CameraConfiguration, Error> {
        self.pipeline.borrow_mut().configure(self.id, config)
    }

    pub fn allocate_buffers(&self, streams: &[StreamId]) -> Result<(), Error> {
        self.pipeline.borrow_mut().allocate_buffers(self.id, streams)
    }

    pub fn free_buffers(&self, streams: &[StreamId]) -> Result<(), Error> {
        self.pipeline.borrow_mut().free_buffers(self.id, streams)
    }

    pub fn start(&self) -> Result<(), Error> {
        self.pipeline.borrow_mut().start(self.id)
    }

    /// Stops capture. Every in-flight request is delivered as cancelled
    /// before this returns. Stopping a camera that is not running does
    /// nothing.
    pub fn stop(&self) {
        let cancelled = self.pipeline.borrow_mut().stop(self.id);
        for request in cancelled {
            self.deliver(request);
        }
    }

    /// An empty request for this camera.
    pub fn create_request(&self) -> Request {
        Request::new(self.id)
    }

    /// Queues `request` for capture. Returns immediately.
    pub fn queue_request(&self, request: Request) -> Result<(), Error> {
        self.pipeline.borrow_mut().queue_request(self.id, request)
    }

    /// Sets the completion callback, replacing any previous one.
    ///
    /// Requests completed before the callback was set are delivered to it
    /// right away.
    pub fn on_request_completed<F>(&self, callback: F)
    where
        F: FnMut(&Camera, Request) + 'static,
    {
        match self.callback.try_borrow_mut() {
            Ok(mut slot) => *slot = Some(Box::new(callback)),
            Err(_) => {
                log::warn!(
                    target: category::CAMERA,
                    "{}: cannot replace the completion callback from inside it",
                    self.name
                );
                return;
            }
        }
        self.dispatch();
    }

    /// Oldest completed request not taken by a callback.
    pub fn next_completed(&self) -> Option<Request> {
        self.completed.borrow_mut().pop_front()
    }

    pub(crate) fn deliver(&self, request: Request) {
        log::trace!(
            target: category::CAMERA,
            "{}: request {} {}",
            self.name,
            request.sequence(),
            request.status()
        );
        self.completed.borrow_mut().push_back(request);
        self.dispatch();
    }

    fn dispatch(&self) {
        // Already dispatching further up the stack, which drains the queue.
        let Ok(mut callback) = self.callback.try_borrow_mut() else {
            return;
        };
        let Some(callback) = callback.as_mut() else {
            return;
        };

        loop {
            let next = self.completed.borrow_mut().pop_front();
            match next {
                Some(request) => callback(self, request),
                None => break,
            }
        }
    }
}

impl fmt::Debug for Camera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Camera")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("streams", &self.streams)
            .finish()
    }
}

impl fmt::Display for Camera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
