// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Kernel boundary for capture nodes
//!
//! [`VideoNode`] is the set of operations the stack needs from one capture
//! node. It mirrors the V4L2 streaming I/O ioctls: format negotiation
//! (`VIDIOC_TRY_FMT` / `VIDIOC_S_FMT`), buffer allocation
//! (`VIDIOC_REQBUFS` + mapping), `VIDIOC_QBUF` / `VIDIOC_DQBUF` and
//! `VIDIOC_STREAMON` / `VIDIOC_STREAMOFF`. Errors are reported as
//! [`io::Error`] the way ioctl failures are.

use std::io;
use unix_ts::Timestamp;

use super::device::DeviceFormat;
use crate::buffer::FrameMemory;

/// One dequeued buffer as reported by the node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Completion {
    /// Buffer index, as passed to [`VideoNode::queue_buffer`]
    pub index: u32,
    /// Frame counter since stream-on
    pub sequence: u32,
    pub timestamp: Timestamp,
    pub bytes_used: usize,
    /// Hardware flagged the frame as corrupt (`V4L2_BUF_FLAG_ERROR`)
    pub error: bool,
}

/// A capture node.
///
/// Implementations are black boxes: they accept format negotiation, hand
/// out buffer memory, take buffers by index and give each queued buffer
/// back exactly once through [`dequeue_buffer`](Self::dequeue_buffer),
/// unless streaming is turned off first, which returns all queued buffers
/// to userspace without a completion.
pub trait VideoNode {
    fn open(&mut self) -> io::Result<()>;

    fn close(&mut self);

    /// Returns the format the node would apply for `format`, without applying it.
    fn try_format(&mut self, format: &DeviceFormat) -> io::Result<DeviceFormat>;

    /// Applies the nearest supported format and returns it.
    fn set_format(&mut self, format: &DeviceFormat) -> io::Result<DeviceFormat>;

    /// Allocates `count` buffers for the current format, or frees all with 0.
    ///
    /// The node may return fewer buffers than requested.
    fn request_buffers(&mut self, count: u32) -> io::Result<Vec<FrameMemory>>;

    fn queue_buffer(&mut self, index: u32) -> io::Result<()>;

    /// Next completed buffer, or `None` if nothing has completed yet.
    fn dequeue_buffer(&mut self) -> io::Result<Option<Completion>>;

    fn stream_on(&mut self) -> io::Result<()>;

    fn stream_off(&mut self) -> io::Result<()>;
}
