// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Frame buffers and buffer pools
//!
//! A [`BufferPool`] belongs to one stream and holds a fixed number of
//! [`Buffer`]s between `allocate_buffers` and `free_buffers`. Each buffer
//! has a stable index and exactly one owner at a time:
//!
//! ```text
//!             hand_to_device           hold_for_request
//! Application --------------> Device -----------------> Request
//!      ^                                                   |
//!      +---------------- return_to_application ------------+
//! ```
//!
//! A filled buffer stays with its request until the request is handed back
//! to the application, so it cannot be queued again while the frame it
//! holds is still undelivered.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;
use unix_ts::Timestamp;

use crate::category;
use crate::Error;

/// Memory region backing a buffer.
///
/// Clones share the same region, the way a device and the application both
/// map the same exported buffer.
#[derive(Clone)]
pub struct FrameMemory(Rc<RefCell<Vec<u8>>>);

impl FrameMemory {
    pub fn new(len: usize) -> Self {
        FrameMemory(Rc::new(RefCell::new(vec![0; len])))
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data(&self) -> Ref<'_, [u8]> {
        Ref::map(self.0.borrow(), |v| v.as_slice())
    }

    pub fn data_mut(&self) -> RefMut<'_, [u8]> {
        RefMut::map(self.0.borrow_mut(), |v| v.as_mut_slice())
    }

    /// True when both handles refer to the same region.
    pub fn same_region(&self, other: &FrameMemory) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for FrameMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameMemory")
            .field("len", &self.len())
            .finish()
    }
}

/// Fill state of a buffer within a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferStatus {
    /// Queued, not completed yet
    Pending,
    /// Filled by the hardware
    Success,
    /// Completed with a hardware error flag; contents are not trustworthy
    Error,
    /// Returned unfilled because capture stopped
    Cancelled,
}

impl fmt::Display for BufferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferStatus::Pending => write!(f, "pending"),
            BufferStatus::Success => write!(f, "success"),
            BufferStatus::Error => write!(f, "error"),
            BufferStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferOwner {
    Application,
    Device,
    /// Completed or abandoned by the device, waiting for its request to be delivered
    Request,
}

/// Capture metadata reported with a completed buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameMetadata {
    /// Frame sequence number counted by the device since stream-on
    pub sequence: u32,
    /// Capture time
    pub timestamp: Timestamp,
    /// Bytes of valid payload
    pub bytes_used: usize,
}

#[derive(Debug)]
pub struct Buffer {
    index: u32,
    memory: FrameMemory,
    owner: BufferOwner,
    metadata: Option<FrameMetadata>,
}

impl Buffer {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn memory(&self) -> &FrameMemory {
        &self.memory
    }

    pub fn owner(&self) -> BufferOwner {
        self.owner
    }

    /// Metadata of the last completion, if the buffer was ever filled
    pub fn metadata(&self) -> Option<&FrameMetadata> {
        self.metadata.as_ref()
    }
}

/// Fixed-size set of buffers of one stream.
#[derive(Debug, Default)]
pub struct BufferPool {
    buffers: Vec<Buffer>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of the memory exported by a device.
    ///
    /// Fails with [`Error::Busy`] if the pool already holds buffers.
    pub fn populate(&mut self, memory: Vec<FrameMemory>) -> Result<(), Error> {
        if !self.buffers.is_empty() {
            return Err(Error::Busy(format!(
                "buffer pool already holds {} buffers",
                self.buffers.len()
            )));
        }

        self.buffers = memory
            .into_iter()
            .enumerate()
            .map(|(index, memory)| Buffer {
                index: index as u32,
                memory,
                owner: BufferOwner::Application,
                metadata: None,
            })
            .collect();

        log::debug!(target: category::BUFFER, "Pool populated with {} buffers", self.buffers.len());
        Ok(())
    }

    /// Drops every buffer. Fails with [`Error::Busy`] while any is not
    /// owned by the application.
    pub fn clear(&mut self) -> Result<(), Error> {
        let in_use = self
            .buffers
            .iter()
            .filter(|b| b.owner != BufferOwner::Application)
            .count();
        if in_use > 0 {
            return Err(Error::Busy(format!(
                "{} buffers still owned by the device or a request",
                in_use
            )));
        }

        self.buffers.clear();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn get(&self, index: u32) -> Option<&Buffer> {
        self.buffers.get(index as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Buffer> {
        self.buffers.iter()
    }

    /// Number of buffers currently owned by the device queue
    pub fn queued(&self) -> usize {
        self.buffers
            .iter()
            .filter(|b| b.owner == BufferOwner::Device)
            .count()
    }

    /// Checks that `index` exists and is owned by the application.
    pub fn check_available(&self, index: u32) -> Result<(), Error> {
        match self.get(index) {
            None => Err(Error::InvalidRequest(format!(
                "buffer {} is not part of a pool of {}",
                index,
                self.len()
            ))),
            Some(buffer) if buffer.owner == BufferOwner::Device => Err(Error::InvalidRequest(
                format!("buffer {} is already queued", index),
            )),
            Some(buffer) if buffer.owner == BufferOwner::Request => Err(Error::InvalidRequest(
                format!("buffer {} belongs to an undelivered request", index),
            )),
            Some(_) => Ok(()),
        }
    }

    /// Moves a buffer to the device side and returns its memory.
    pub fn hand_to_device(&mut self, index: u32) -> Result<FrameMemory, Error> {
        self.check_available(index)?;
        let buffer = &mut self.buffers[index as usize];
        buffer.owner = BufferOwner::Device;
        Ok(buffer.memory.clone())
    }

    /// Parks a buffer with its request once the device is done with it,
    /// recording the metadata of a completed capture.
    pub fn hold_for_request(&mut self, index: u32, metadata: Option<FrameMetadata>) {
        if let Some(buffer) = self.buffers.get_mut(index as usize) {
            buffer.owner = BufferOwner::Request;
            if metadata.is_some() {
                buffer.metadata = metadata;
            }
        }
    }

    /// Moves a buffer back to the application side.
    pub fn return_to_application(&mut self, index: u32) {
        if let Some(buffer) = self.buffers.get_mut(index as usize) {
            buffer.owner = BufferOwner::Application;
        }
    }
}
