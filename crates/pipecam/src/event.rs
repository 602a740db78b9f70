// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Cooperative event loop
//!
//! Everything in the stack runs on the thread driving
//! [`CameraManager::process_events`](crate::camera_manager::CameraManager::process_events).
//! Work that should not run inside a completion callback is posted here
//! and runs at the start of the next iteration.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;

type Work = Box<dyn FnOnce()>;

/// Queue of deferred work.
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use pipecam::event::EventLoop;
///
/// let events = EventLoop::new();
/// let hits = Rc::new(Cell::new(0));
/// let counter = hits.clone();
/// events.post(move || counter.set(counter.get() + 1));
///
/// assert_eq!(events.dispatch(), 1);
/// assert_eq!(hits.get(), 1);
/// ```
#[derive(Default)]
pub struct EventLoop {
    queue: RefCell<VecDeque<Work>>,
}

impl EventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defers `work` to the next dispatch.
    pub fn post<F: FnOnce() + 'static>(&self, work: F) {
        self.queue.borrow_mut().push_back(Box::new(work));
    }

    /// Runs the work posted before this call and returns how much ran.
    ///
    /// Work posted while dispatching waits for the next call, so a closure
    /// reposting itself cannot stall the loop.
    pub fn dispatch(&self) -> usize {
        let count = self.queue.borrow().len();
        for _ in 0..count {
            let work = self.queue.borrow_mut().pop_front();
            match work {
                Some(work) => work(),
                None => return count,
            }
        }
        count
    }

    /// Work waiting for dispatch
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("pending", &self.pending())
            .finish()
    }
}
