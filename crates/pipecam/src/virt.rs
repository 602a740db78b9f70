// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! In-process virtual capture hardware
//!
//! [`VirtualMediaSource`] implements [`MediaSource`] without any kernel
//! support. It can publish a vimc-style topology (two sensors, debayers, a
//! scaler and four capture nodes) and any number of UVC-style webcams, or
//! arbitrary topologies built with [`MediaDevice`].
//!
//! Every video node is a [`VirtualNode`] sharing its state with a
//! [`NodeHandle`]. The handle is the test side of the node: by default a
//! queued buffer completes as soon as the node is polled while streaming,
//! but auto-completion can be turned off to complete buffers by hand, in any
//! order, with or without the hardware error flag. Handles also count queue
//! calls and inject open, export, queue and stream-on failures.
//!
//! ```
//! use pipecam::virt::VirtualMediaSource;
//!
//! let source = VirtualMediaSource::new().with_vimc().with_uvc("HD Webcam");
//! let raw = source.node("VIMC MDEV", "Raw Capture 1").expect("vimc node");
//! raw.set_auto_complete(false);
//! assert!(source.node("VIMC MDEV", "Scaler").is_none());
//! assert!(source.node("HD Webcam", "HD Webcam").is_some());
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::rc::Rc;
use unix_ts::Timestamp;

use crate::buffer::FrameMemory;
use crate::category;
use crate::fourcc::FourCC;
use crate::geometry::{Size, SizeRange};
use crate::media::{MediaDevice, MediaEntity, MediaSource};
use crate::v4l2::{Completion, DeviceFormat, VideoNode};

const EIO: i32 = 5;
const ENOMEM: i32 = 12;
const EBUSY: i32 = 16;
const ENODEV: i32 = 19;
const EINVAL: i32 = 22;

/// Largest number of buffers a node hands out, as `VIDEO_MAX_FRAME`.
const MAX_BUFFERS: u32 = 32;

/// Sizes accepted by the vimc capture nodes
pub const VIMC_SIZES: SizeRange = SizeRange::new(Size::new(16, 16), Size::new(4096, 2160), 2, 2);

/// Sizes accepted by the virtual webcams
pub const UVC_SIZES: SizeRange = SizeRange::new(Size::new(160, 120), Size::new(1920, 1080), 8, 8);

struct NodeState {
    entity: String,
    formats: Vec<FourCC>,
    sizes: SizeRange,
    open: bool,
    streaming: bool,
    format: Option<DeviceFormat>,
    buffers: Vec<FrameMemory>,
    pending: VecDeque<u32>,
    ready: VecDeque<Completion>,
    sequence: u32,
    auto_complete: bool,
    queue_calls: usize,
    fail_open: bool,
    fail_export: bool,
    fail_queue: bool,
    fail_stream_on: bool,
}

impl NodeState {
    fn negotiate(&self, format: &DeviceFormat) -> DeviceFormat {
        let fourcc = if self.formats.contains(&format.fourcc) {
            format.fourcc
        } else {
            self.formats.first().copied().unwrap_or(format.fourcc)
        };
        DeviceFormat::new(fourcc, self.sizes.clamp(format.size))
    }

    /// Fills the frame and moves it to the ready queue.
    fn complete(&mut self, index: u32, error: bool) -> bool {
        if !self.streaming {
            return false;
        }
        let Some(pos) = self.pending.iter().position(|i| *i == index) else {
            return false;
        };
        self.pending.remove(pos);

        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);

        let memory = &self.buffers[index as usize];
        let bytes_used = if error { 0 } else { memory.len() };
        if !error {
            let mut data = memory.data_mut();
            for (i, byte) in data.iter_mut().enumerate() {
                *byte = (i as u32).wrapping_add(sequence) as u8;
            }
        }

        self.ready.push_back(Completion {
            index,
            sequence,
            timestamp: Timestamp::now(),
            bytes_used,
            error,
        });
        true
    }
}

/// Test-side control of a virtual video node.
///
/// Clones refer to the same node.
#[derive(Clone)]
pub struct NodeHandle(Rc<RefCell<NodeState>>);

impl NodeHandle {
    pub fn new(entity: &str, formats: &[FourCC], sizes: SizeRange) -> Self {
        NodeHandle(Rc::new(RefCell::new(NodeState {
            entity: entity.to_owned(),
            formats: formats.to_vec(),
            sizes,
            open: false,
            streaming: false,
            format: None,
            buffers: Vec::new(),
            pending: VecDeque::new(),
            ready: VecDeque::new(),
            sequence: 0,
            auto_complete: true,
            queue_calls: 0,
            fail_open: false,
            fail_export: false,
            fail_queue: false,
            fail_stream_on: false,
        })))
    }

    /// A vimc-style RGB capture node.
    pub fn rgb(entity: &str) -> Self {
        NodeHandle::new(entity, &[FourCC::RGB24, FourCC::BGR24, FourCC::SBGGR8], VIMC_SIZES)
    }

    /// A webcam-style YUYV/MJPEG capture node.
    pub fn uvc(entity: &str) -> Self {
        NodeHandle::new(entity, &[FourCC::YUYV, FourCC::MJPEG], UVC_SIZES)
    }

    pub fn entity(&self) -> String {
        self.0.borrow().entity.clone()
    }

    /// Completes queued buffers in queue order whenever the node is polled.
    ///
    /// On by default.
    pub fn set_auto_complete(&self, enable: bool) {
        self.0.borrow_mut().auto_complete = enable;
    }

    /// Completes the oldest queued buffer. Returns false if none is queued
    /// or the node is not streaming.
    pub fn complete_next(&self) -> bool {
        let mut state = self.0.borrow_mut();
        let next = state.pending.front().copied();
        match next {
            Some(index) => state.complete(index, false),
            None => false,
        }
    }

    /// Completes queued buffer `index` successfully.
    pub fn complete(&self, index: u32) -> bool {
        self.0.borrow_mut().complete(index, false)
    }

    /// Completes queued buffer `index` with the hardware error flag set.
    pub fn fail(&self, index: u32) -> bool {
        self.0.borrow_mut().complete(index, true)
    }

    /// Number of `queue_buffer` calls the node received, failed ones included
    pub fn queue_calls(&self) -> usize {
        self.0.borrow().queue_calls
    }

    /// Buffers queued and not completed yet
    pub fn pending(&self) -> Vec<u32> {
        self.0.borrow().pending.iter().copied().collect()
    }

    /// Number of allocated buffers
    pub fn allocated(&self) -> usize {
        self.0.borrow().buffers.len()
    }

    pub fn format(&self) -> Option<DeviceFormat> {
        self.0.borrow().format
    }

    pub fn is_open(&self) -> bool {
        self.0.borrow().open
    }

    pub fn is_streaming(&self) -> bool {
        self.0.borrow().streaming
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.0.borrow_mut().fail_open = fail;
    }

    pub fn set_fail_export(&self, fail: bool) {
        self.0.borrow_mut().fail_export = fail;
    }

    pub fn set_fail_queue(&self, fail: bool) {
        self.0.borrow_mut().fail_queue = fail;
    }

    pub fn set_fail_stream_on(&self, fail: bool) {
        self.0.borrow_mut().fail_stream_on = fail;
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0.borrow();
        f.debug_struct("NodeHandle")
            .field("entity", &state.entity)
            .field("open", &state.open)
            .field("streaming", &state.streaming)
            .field("buffers", &state.buffers.len())
            .field("pending", &state.pending)
            .finish()
    }
}

/// Kernel side of a virtual node, handed out by [`VirtualMediaSource`].
pub struct VirtualNode {
    state: Rc<RefCell<NodeState>>,
}

impl VirtualNode {
    pub fn new(handle: NodeHandle) -> Self {
        VirtualNode { state: handle.0 }
    }
}

impl VideoNode for VirtualNode {
    fn open(&mut self) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        if state.fail_open {
            return Err(io::Error::from_raw_os_error(ENODEV));
        }
        state.open = true;
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state.borrow_mut();
        state.open = false;
        state.streaming = false;
        state.pending.clear();
        state.ready.clear();
        state.buffers.clear();
    }

    fn try_format(&mut self, format: &DeviceFormat) -> io::Result<DeviceFormat> {
        Ok(self.state.borrow().negotiate(format))
    }

    fn set_format(&mut self, format: &DeviceFormat) -> io::Result<DeviceFormat> {
        let mut state = self.state.borrow_mut();
        if !state.buffers.is_empty() {
            return Err(io::Error::from_raw_os_error(EBUSY));
        }
        let applied = state.negotiate(format);
        state.format = Some(applied);
        Ok(applied)
    }

    fn request_buffers(&mut self, count: u32) -> io::Result<Vec<FrameMemory>> {
        let mut state = self.state.borrow_mut();
        if count == 0 {
            if state.streaming {
                return Err(io::Error::from_raw_os_error(EBUSY));
            }
            state.pending.clear();
            state.ready.clear();
            state.buffers.clear();
            return Ok(Vec::new());
        }

        if state.fail_export {
            return Err(io::Error::from_raw_os_error(ENOMEM));
        }
        if !state.buffers.is_empty() {
            return Err(io::Error::from_raw_os_error(EBUSY));
        }
        let Some(format) = state.format else {
            return Err(io::Error::from_raw_os_error(EINVAL));
        };

        let len = if format.size_image > 0 {
            format.size_image
        } else {
            // compressed formats get a worst case of two bytes per pixel
            format.size.width as usize * format.size.height as usize * 2
        };
        state.buffers = (0..count.min(MAX_BUFFERS))
            .map(|_| FrameMemory::new(len))
            .collect();
        Ok(state.buffers.clone())
    }

    fn queue_buffer(&mut self, index: u32) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        state.queue_calls += 1;
        if state.fail_queue {
            return Err(io::Error::from_raw_os_error(EIO));
        }
        if index as usize >= state.buffers.len() || state.pending.contains(&index) {
            return Err(io::Error::from_raw_os_error(EINVAL));
        }
        state.pending.push_back(index);
        Ok(())
    }

    fn dequeue_buffer(&mut self) -> io::Result<Option<Completion>> {
        let mut state = self.state.borrow_mut();
        if let Some(completion) = state.ready.pop_front() {
            return Ok(Some(completion));
        }
        if state.auto_complete && state.streaming {
            if let Some(index) = state.pending.front().copied() {
                state.complete(index, false);
                return Ok(state.ready.pop_front());
            }
        }
        Ok(None)
    }

    fn stream_on(&mut self) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        if state.fail_stream_on {
            return Err(io::Error::from_raw_os_error(EIO));
        }
        if state.buffers.is_empty() {
            return Err(io::Error::from_raw_os_error(EINVAL));
        }
        state.streaming = true;
        state.sequence = 0;
        Ok(())
    }

    fn stream_off(&mut self) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        state.streaming = false;
        state.pending.clear();
        state.ready.clear();
        Ok(())
    }
}

struct VirtualMedia {
    media: MediaDevice,
    nodes: Vec<NodeHandle>,
}

impl VirtualMedia {
    fn node(&self, entity: &str) -> Option<NodeHandle> {
        self.nodes
            .iter()
            .find(|n| n.0.borrow().entity == entity)
            .cloned()
    }
}

#[derive(Default)]
struct SourceState {
    devices: Vec<VirtualMedia>,
    next_video: u32,
}

/// A [`MediaSource`] publishing virtual hardware.
///
/// Clones share the same set of devices, so a test can keep one clone to
/// reach the node handles after handing the other to a camera manager.
#[derive(Clone, Default)]
pub struct VirtualMediaSource(Rc<RefCell<SourceState>>);

impl VirtualMediaSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the vimc topology, driver "vimc", model "VIMC MDEV".
    pub fn with_vimc(self) -> Self {
        let mut media = MediaDevice::new("vimc", "VIMC MDEV");
        for name in ["Sensor A", "Sensor B", "Debayer A", "Debayer B", "Scaler"] {
            media.add_entity(name, None);
        }
        for name in ["Raw Capture 0", "Raw Capture 1", "RGB/YUV Input", "RGB/YUV Capture"] {
            let node = self.next_video_node();
            media.add_entity(name, Some(&node));
        }

        media.add_link("Sensor A", "Debayer A");
        media.add_link("Sensor B", "Debayer B");
        media.add_link("Sensor A", "Raw Capture 0");
        media.add_link("Sensor B", "Raw Capture 1");
        media.add_link("Debayer A", "Scaler");
        media.add_link("Debayer B", "Scaler");
        media.add_link("RGB/YUV Input", "Scaler");
        media.add_link("Scaler", "RGB/YUV Capture");

        self.insert(media, NodeHandle::rgb)
    }

    /// Adds a webcam, driver "uvcvideo", with one capture entity named
    /// after the model.
    pub fn with_uvc(self, model: &str) -> Self {
        let mut media = MediaDevice::new("uvcvideo", model);
        let node = self.next_video_node();
        media.add_entity(model, Some(&node));
        self.insert(media, NodeHandle::uvc)
    }

    /// Adds an arbitrary topology. Entities with a device node get a
    /// virtual node, webcam-style for "uvcvideo" and RGB otherwise.
    pub fn with_device(self, media: MediaDevice) -> Self {
        if media.driver() == "uvcvideo" {
            self.insert(media, NodeHandle::uvc)
        } else {
            self.insert(media, NodeHandle::rgb)
        }
    }

    fn next_video_node(&self) -> String {
        let mut state = self.0.borrow_mut();
        let node = format!("/dev/video{}", state.next_video);
        state.next_video += 1;
        node
    }

    fn insert(self, media: MediaDevice, node: fn(&str) -> NodeHandle) -> Self {
        let nodes = media
            .entities()
            .iter()
            .filter(|e| e.device_node.is_some())
            .map(|e| node(&e.name))
            .collect();
        self.0.borrow_mut().devices.push(VirtualMedia { media, nodes });
        self
    }

    /// Handle of the node behind `entity` of the first device named `model`.
    pub fn node(&self, model: &str, entity: &str) -> Option<NodeHandle> {
        let state = self.0.borrow();
        state
            .devices
            .iter()
            .find(|d| d.media.model() == model)?
            .node(entity)
    }

    /// Handles of every node of the `n`th device, in entity order.
    pub fn nodes(&self, n: usize) -> Vec<NodeHandle> {
        self.0
            .borrow()
            .devices
            .get(n)
            .map(|d| d.nodes.clone())
            .unwrap_or_default()
    }
}

impl MediaSource for VirtualMediaSource {
    fn enumerate(&self) -> io::Result<Vec<MediaDevice>> {
        Ok(self
            .0
            .borrow()
            .devices
            .iter()
            .map(|d| d.media.clone())
            .collect())
    }

    fn open_node(&self, media: &MediaDevice, entity: &MediaEntity) -> io::Result<Box<dyn VideoNode>> {
        let state = self.0.borrow();
        let handle = state
            .devices
            .iter()
            .filter(|d| d.media.driver() == media.driver() && d.media.model() == media.model())
            .filter(|d| {
                d.media
                    .entity_by_name(&entity.name)
                    .map_or(false, |e| e.device_node == entity.device_node)
            })
            .find_map(|d| d.node(&entity.name))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no video node behind {}", entity.name),
                )
            })?;

        log::trace!(target: category::MEDIA, "Opening virtual node {}", entity.name);
        Ok(Box::new(VirtualNode::new(handle)))
    }
}
