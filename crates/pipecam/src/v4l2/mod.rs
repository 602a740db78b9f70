// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Low-level video device abstraction
//!
//! This module turns a [`VideoNode`] (the kernel-facing capture node) into a
//! [`VideoDevice`] that the pipeline handlers drive:
//!
//! - **Format negotiation**: [`VideoDevice::try_format`] and
//!   [`VideoDevice::set_format`] return the format the hardware picked,
//!   which may differ from the one asked for
//! - **Buffers**: [`VideoDevice::export_buffers`] allocates the memory a
//!   stream's pool is populated with, [`VideoDevice::release_buffers`] frees it
//! - **Queueing**: [`VideoDevice::queue_buffer`] hands a buffer index to the
//!   hardware; each one comes back exactly once as a [`BufferReady`] from
//!   [`VideoDevice::dequeue`], tagged with the stream the device was
//!   connected to at match time
//! - **Streaming**: [`VideoDevice::stream_on`] / [`VideoDevice::stream_off`]
//!
//! # Example
//!
//! ```
//! use pipecam::fourcc::FourCC;
//! use pipecam::geometry::Size;
//! use pipecam::media::DeviceEnumerator;
//! use pipecam::stream::StreamId;
//! use pipecam::v4l2::{DeviceFormat, VideoDevice};
//! use pipecam::virt::VirtualMediaSource;
//!
//! let mut enumerator = DeviceEnumerator::new(VirtualMediaSource::new().with_vimc());
//! enumerator.enumerate()?;
//! let media = enumerator.devices()[0].clone();
//!
//! let mut video = VideoDevice::open_entity(&enumerator, &media, "Raw Capture 1")?;
//! video.connect(StreamId::next());
//!
//! let format = video.set_format(&DeviceFormat::new(FourCC::RGB24, Size::new(641, 480)))?;
//! assert_eq!(format.size, Size::new(640, 480));
//!
//! let memory = video.export_buffers(4)?;
//! assert_eq!(memory.len(), 4);
//! video.queue_buffer(0)?;
//! video.stream_on()?;
//!
//! let ready = video.dequeue();
//! assert_eq!(ready[0].index, 0);
//! # Ok::<(), pipecam::Error>(())
//! ```

mod device;
mod node;

pub use device::{BufferReady, DeviceFormat, VideoDevice};
pub use node::{Completion, VideoNode};
