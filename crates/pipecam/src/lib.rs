// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! pipecam - userspace camera stack
//!
//! pipecam sits between capture hardware described as a media graph (entities
//! and links, with video nodes at the capture endpoints) and applications that
//! want one uniform capture interface. Hardware-specific pipeline handlers
//! match physical topologies, build cameras out of one or more video devices,
//! negotiate stream formats, manage buffer pools and drive the asynchronous
//! request protocol that hands captured frames back to the application in the
//! order they were requested.
//!
//! # Quick Start
//!
//! ```
//! use pipecam::camera_manager::CameraManager;
//! use pipecam::stream::StreamRole;
//! use pipecam::virt::VirtualMediaSource;
//!
//! let source = VirtualMediaSource::new().with_vimc();
//! let manager = CameraManager::new(source);
//! manager.start()?;
//!
//! let camera = manager.get("VIMC Sensor B").expect("vimc camera");
//! let config = camera.generate_configuration(&[StreamRole::StillCapture]);
//! camera.configure(&config)?;
//!
//! let stream = camera.streams()[0];
//! camera.allocate_buffers(&[stream])?;
//! camera.start()?;
//!
//! let mut request = camera.create_request();
//! request.add_buffer(stream, 0)?;
//! camera.queue_request(request)?;
//!
//! while camera.in_flight() > 0 {
//!     manager.process_events();
//! }
//! let done = camera.next_completed().expect("completed request");
//! assert!(done.buffer(stream).is_some());
//! # camera.stop();
//! # Ok::<(), pipecam::Error>(())
//! ```
//!
//! # Architecture
//!
//! | Layer | Type | Role |
//! |-------|------|------|
//! | Application | [`camera::Camera`] | Thin dispatcher to the owning pipeline |
//! | Framework | [`pipeline::Pipeline`] | State machine, request queue, completion order |
//! | Variant | [`pipeline::CameraData`] | Per-camera hardware data (vimc, uvcvideo) |
//! | Device | [`v4l2::VideoDevice`] | Format, buffers, queue and streaming on one node |
//! | Kernel boundary | [`v4l2::VideoNode`] | Black-box capture node |
//!
//! Everything runs on one thread. Completions are collected when the
//! application runs [`camera_manager::CameraManager::process_events`], which
//! is one iteration of the cooperative event loop.

use std::{error, fmt, io};

use crate::pipeline::CameraState;

/// Error type for pipecam operations
#[derive(Debug)]
pub enum Error {
    /// I/O error reported by a video or media node (open, format, buffers, streaming)
    Io(io::Error),

    /// The hardware cannot satisfy a non-negotiable part of a configuration
    InvalidConfiguration(String),

    /// A request was rejected before any of its buffers reached a device
    InvalidRequest(String),

    /// The operation is not allowed in the camera's current state
    InvalidState {
        /// Camera name
        camera: String,
        /// State the camera was in
        state: CameraState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// A resource is still in use (buffers allocated, queued or streaming)
    Busy(String),

    /// A stream that does not belong to the camera was referenced
    UnknownStream(String),

    /// A pipeline handler with the same name is already registered
    DuplicatePipeline(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {}", msg),
            Error::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            Error::InvalidState {
                camera,
                state,
                operation,
            } => write!(
                f,
                "Camera {} cannot {} while {}",
                camera, operation, state
            ),
            Error::Busy(msg) => write!(f, "Resource busy: {}", msg),
            Error::UnknownStream(msg) => write!(f, "Unknown stream: {}", msg),
            Error::DuplicatePipeline(name) => {
                write!(f, "Pipeline handler {} is already registered", name)
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

/// Log targets, one per subsystem, so `RUST_LOG=VIMC=debug` style filters work.
pub(crate) mod category {
    pub const CAMERA: &str = "Camera";
    pub const PIPELINE: &str = "Pipeline";
    pub const MEDIA: &str = "Media";
    pub const V4L2: &str = "V4L2";
    pub const BUFFER: &str = "Buffer";
    pub const REQUEST: &str = "Request";
    pub const VIMC: &str = "VIMC";
    pub const UVC: &str = "UVC";
}

/// The fourcc module provides portable handling of pixel format codes.
pub mod fourcc;

/// The geometry module provides frame sizes and size ranges.
pub mod geometry;

/// The media module describes hardware topologies and matches them.
pub mod media;

/// The v4l2 module provides the low-level video device abstraction.
pub mod v4l2;

/// The buffer module provides frame buffers and their pools.
pub mod buffer;

/// The stream module provides stream identities and configurations.
pub mod stream;

/// The request module provides units of capture work.
pub mod request;

/// The pipeline module provides the pipeline handler framework and variants.
pub mod pipeline;

/// The camera module provides the application-facing capture unit.
pub mod camera;

/// The camera manager module discovers hardware and owns the cameras.
pub mod camera_manager;

/// The event module provides the cooperative event loop.
pub mod event;

/// The virt module provides in-process virtual capture hardware.
pub mod virt;
