// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Camera discovery and the event loop driver
//!
//! The [`CameraManager`] enumerates the media devices of a [`MediaSource`],
//! offers them to the registered pipeline handlers and keeps the resulting
//! cameras. [`CameraManager::process_events`] is one iteration of the
//! cooperative loop: deferred work, device completions, then delivery of
//! completed requests to the cameras.
//!
//! # Configuration
//!
//! `PIPECAM_PIPELINES` restricts matching to a comma separated list of
//! handler names, tried in the listed order, e.g. `PIPECAM_PIPELINES=uvcvideo`.

use std::cell::{Cell, RefCell};
use std::env;
use std::fmt;
use std::rc::Rc;

use crate::camera::{Camera, CameraId};
use crate::category;
use crate::event::EventLoop;
use crate::media::{DeviceEnumerator, MediaSource};
use crate::pipeline::{Pipeline, PipelineRegistry};
use crate::Error;

/// Environment variable selecting the pipeline handlers to match with
pub const PIPELINES_ENV: &str = "PIPECAM_PIPELINES";

/// Camera manager settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagerOptions {
    /// Handlers to try, in order. `None` tries every registered handler in
    /// registration order.
    pub pipelines: Option<Vec<String>>,
}

impl ManagerOptions {
    /// Reads [`PIPELINES_ENV`]. Unset or blank means every handler.
    pub fn from_env() -> Self {
        let pipelines = env::var(PIPELINES_ENV)
            .ok()
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_owned)
                    .collect::<Vec<_>>()
            })
            .filter(|names| !names.is_empty());

        ManagerOptions { pipelines }
    }

    pub fn with_pipelines(names: &[&str]) -> Self {
        ManagerOptions {
            pipelines: Some(names.iter().map(|n| n.to_string()).collect()),
        }
    }
}

pub struct CameraManager {
    enumerator: RefCell<DeviceEnumerator>,
    options: ManagerOptions,
    registry: Option<PipelineRegistry>,
    pipelines: RefCell<Vec<Rc<RefCell<Pipeline>>>>,
    cameras: RefCell<Vec<Rc<Camera>>>,
    events: EventLoop,
    started: Cell<bool>,
}

impl CameraManager {
    /// A manager over `source`, configured from the environment.
    pub fn new<S: MediaSource + 'static>(source: S) -> Self {
        Self::with_options(source, ManagerOptions::from_env())
    }

    /// A manager using the process-wide [`PipelineRegistry`].
    pub fn with_options<S: MediaSource + 'static>(source: S, options: ManagerOptions) -> Self {
        CameraManager {
            enumerator: RefCell::new(DeviceEnumerator::new(source)),
            options,
            registry: None,
            pipelines: RefCell::new(Vec::new()),
            cameras: RefCell::new(Vec::new()),
            events: EventLoop::new(),
            started: Cell::new(false),
        }
    }

    /// A manager using its own `registry` instead of the process-wide one.
    pub fn with_registry<S: MediaSource + 'static>(
        source: S,
        registry: PipelineRegistry,
        options: ManagerOptions,
    ) -> Self {
        let mut manager = Self::with_options(source, options);
        manager.registry = Some(registry);
        manager
    }

    /// Enumerates the hardware and builds the cameras.
    ///
    /// Each selected handler is instantiated again and again until an
    /// instance fails to match, so every device it supports gets a camera.
    /// Calling `start` on a started manager does nothing.
    pub fn start(&self) -> Result<(), Error> {
        if self.started.get() {
            return Ok(());
        }

        let found = self.enumerator.borrow_mut().enumerate()?;
        log::info!(target: category::CAMERA, "Found {} media devices", found);

        let registry = match &self.registry {
            Some(registry) => registry.clone(),
            None => PipelineRegistry::global().clone(),
        };
        let enumerator = self.enumerator.borrow();

        for (name, factory) in registry.select(self.options.pipelines.as_deref()) {
            loop {
                let mut handler = factory();
                let Some(specs) = handler.match_devices(&enumerator) else {
                    log::debug!(target: category::PIPELINE, "{}: no more devices", name);
                    break;
                };
                if specs.is_empty() {
                    log::warn!(target: category::PIPELINE, "{}: matched without cameras", name);
                    break;
                }

                let pipeline = Rc::new(RefCell::new(Pipeline::new(handler, specs)));
                let cameras = pipeline.borrow().cameras();
                for (id, camera, streams) in cameras {
                    let camera = self.unique_name(camera);
                    log::info!(target: category::CAMERA, "Added camera {} ({})", camera, name);
                    self.cameras
                        .borrow_mut()
                        .push(Rc::new(Camera::new(id, camera, streams, pipeline.clone())));
                }
                self.pipelines.borrow_mut().push(pipeline);
            }
        }

        self.started.set(true);
        Ok(())
    }

    fn unique_name(&self, name: String) -> String {
        let cameras = self.cameras.borrow();
        if !cameras.iter().any(|c| c.name() == name) {
            return name;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{} #{}", name, n);
            if !cameras.iter().any(|c| c.name() == candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Every camera, in discovery order.
    pub fn cameras(&self) -> Vec<Rc<Camera>> {
        self.cameras.borrow().clone()
    }

    pub fn get(&self, name: &str) -> Option<Rc<Camera>> {
        self.cameras
            .borrow()
            .iter()
            .find(|c| c.name() == name)
            .cloned()
    }

    fn camera(&self, id: CameraId) -> Option<Rc<Camera>> {
        self.cameras.borrow().iter().find(|c| c.id() == id).cloned()
    }

    /// The loop deferred work is posted to
    pub fn event_loop(&self) -> &EventLoop {
        &self.events
    }

    /// Runs one loop iteration and returns the number of requests delivered.
    pub fn process_events(&self) -> usize {
        self.events.dispatch();

        let pipelines = self.pipelines.borrow().clone();
        let mut delivered = 0;
        for pipeline in pipelines {
            let done = pipeline.borrow_mut().poll();
            for (id, request) in done {
                match self.camera(id) {
                    Some(camera) => {
                        camera.deliver(request);
                        delivered += 1;
                    }
                    None => log::warn!(
                        target: category::CAMERA,
                        "Dropping request {} of removed {}",
                        request.sequence(),
                        id
                    ),
                }
            }
        }
        delivered
    }

    /// Stops every camera and releases the hardware.
    ///
    /// Cameras still referenced by the application keep their pipeline
    /// alive until dropped.
    pub fn stop(&self) {
        if !self.started.get() {
            return;
        }

        for camera in self.cameras() {
            camera.stop();
        }
        self.cameras.borrow_mut().clear();
        self.pipelines.borrow_mut().clear();
        self.started.set(false);
        log::info!(target: category::CAMERA, "Camera manager stopped");
    }
}

impl Drop for CameraManager {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for CameraManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraManager")
            .field("options", &self.options)
            .field("cameras", &self.cameras.borrow())
            .field("started", &self.started.get())
            .finish()
    }
}
