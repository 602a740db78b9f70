// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Pipeline handler framework
//!
//! A [`PipelineHandler`] knows one family of hardware. When the camera
//! manager offers it the enumerated media devices it acquires the ones it
//! can drive, opens their video nodes and describes the resulting cameras
//! as [`CameraSpec`]s, each carrying its hardware state as a boxed
//! [`CameraData`].
//!
//! The [`Pipeline`] owns those cameras and runs everything that is common
//! to all hardware: the per-camera state machine, stream configuration
//! negotiation, buffer pools, the request queue and the completion
//! protocol. Variants only answer the narrow [`CameraData`] questions.
//!
//! ```text
//!            configure           start
//! Registered ---------> Configured -----> Running
//!                       ^  |   ^             |
//!                       +--+   +-------------+
//!                    configure      stop
//! ```
//!
//! Requests complete strictly in the order they were queued. The buffers
//! of one request may fill in any order and from independent devices; a
//! request is handed back only once it is at the head of the queue and
//! none of its buffers is pending.

pub mod registry;
pub mod uvc;
pub mod vimc;

pub use registry::{PipelineFactory, PipelineRegistry};

use std::collections::VecDeque;
use std::fmt;

use crate::buffer::{BufferStatus, FrameMemory};
use crate::camera::{CameraId, PoolStatus};
use crate::category;
use crate::media::DeviceEnumerator;
use crate::request::Request;
use crate::stream::{CameraConfiguration, Stream, StreamConfiguration, StreamId, StreamRole};
use crate::v4l2::{BufferReady, DeviceFormat, VideoDevice};
use crate::Error;

/// Lifecycle state of a camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CameraState {
    /// Matched, never configured
    Registered,
    /// Streams configured, buffers may be allocated
    Configured,
    /// Streaming, requests may be queued
    Running,
}

impl fmt::Display for CameraState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraState::Registered => write!(f, "Registered"),
            CameraState::Configured => write!(f, "Configured"),
            CameraState::Running => write!(f, "Running"),
        }
    }
}

/// Hardware-specific discovery for one family of devices.
pub trait PipelineHandler {
    /// Registry name, e.g. "vimc"
    fn name(&self) -> &'static str;

    /// Acquires matching hardware and describes the cameras built from it.
    ///
    /// Returns `None` when nothing matches. Matching is all-or-nothing: a
    /// failure after acquisition must release everything taken so far,
    /// which dropping the partially built state does. A handler instance
    /// matches at most once; the manager creates a new instance to look
    /// for more devices of the same kind.
    fn match_devices(&mut self, enumerator: &DeviceEnumerator) -> Option<Vec<CameraSpec>>;
}

/// A camera found by a handler.
pub struct CameraSpec {
    pub name: String,
    pub data: Box<dyn CameraData>,
}

impl fmt::Debug for CameraSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraSpec")
            .field("name", &self.name)
            .field("streams", &self.data.streams())
            .finish()
    }
}

/// Hardware state of one camera, owned by its pipeline.
///
/// Each stream is backed by one [`VideoDevice`] connected to it at match
/// time. The provided methods drive that device directly; variants
/// override them where their hardware needs more than one node touched.
pub trait CameraData {
    /// Streams of the camera, in the order roles are mapped onto them.
    fn streams(&self) -> Vec<StreamId>;

    /// Device backing `stream`.
    fn device_mut(&mut self, stream: StreamId) -> Option<&mut VideoDevice>;

    /// Default, hardware feasible configuration for `roles`, one stream per
    /// role. No hardware side effects.
    fn generate_configuration(&self, roles: &[StreamRole]) -> CameraConfiguration;

    /// Configuration the hardware would apply for `config`.
    fn try_configuration(
        &mut self,
        stream: StreamId,
        config: &StreamConfiguration,
    ) -> Result<StreamConfiguration, Error> {
        let device = device_for(self, stream)?;
        let format = device.try_format(&DeviceFormat::new(config.pixel_format, config.size))?;
        Ok(StreamConfiguration::new(
            format.fourcc,
            format.size,
            config.buffer_count,
        ))
    }

    /// Applies `config` and returns what the hardware selected.
    fn apply_configuration(
        &mut self,
        stream: StreamId,
        config: &StreamConfiguration,
    ) -> Result<StreamConfiguration, Error> {
        let device = device_for(self, stream)?;
        let format = device.set_format(&DeviceFormat::new(config.pixel_format, config.size))?;
        Ok(StreamConfiguration::new(
            format.fourcc,
            format.size,
            config.buffer_count,
        ))
    }

    fn export_buffers(&mut self, stream: StreamId, count: u32) -> Result<Vec<FrameMemory>, Error> {
        device_for(self, stream)?.export_buffers(count)
    }

    fn release_buffers(&mut self, stream: StreamId) -> Result<(), Error> {
        device_for(self, stream)?.release_buffers()
    }

    /// Starts every device of `streams`, or none of them.
    fn start(&mut self, streams: &[StreamId]) -> Result<(), Error> {
        for (i, stream) in streams.iter().enumerate() {
            if let Err(err) = device_for(self, *stream).and_then(|d| d.stream_on()) {
                for started in &streams[..i] {
                    if let Some(device) = self.device_mut(*started) {
                        device.stream_off();
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// Stops every device of `streams` and returns the buffers each flushed.
    fn stop(&mut self, streams: &[StreamId]) -> Vec<(StreamId, Vec<u32>)> {
        streams
            .iter()
            .filter_map(|stream| {
                self.device_mut(*stream)
                    .map(|device| (*stream, device.stream_off()))
            })
            .collect()
    }

    fn queue_buffer(&mut self, stream: StreamId, index: u32) -> Result<(), Error> {
        device_for(self, stream)?.queue_buffer(index)
    }

    /// Drains the completions of every device.
    fn process_completions(&mut self) -> Vec<BufferReady> {
        let mut ready = Vec::new();
        for stream in self.streams() {
            if let Some(device) = self.device_mut(stream) {
                ready.extend(device.dequeue());
            }
        }
        ready
    }
}

fn device_for<D: CameraData + ?Sized>(
    data: &mut D,
    stream: StreamId,
) -> Result<&mut VideoDevice, Error> {
    data.device_mut(stream)
        .ok_or_else(|| Error::UnknownStream(stream.to_string()))
}

/// Default configuration for every stream a role maps onto, in order.
///
/// Roles beyond the stream count are dropped with a log record.
pub fn configuration_for_roles(
    target: &'static str,
    streams: &[StreamId],
    roles: &[StreamRole],
    default: impl Fn(StreamRole) -> StreamConfiguration,
) -> CameraConfiguration {
    let mut config = CameraConfiguration::new();
    for (stream, role) in streams.iter().zip(roles) {
        config.insert(*stream, default(*role));
    }
    if roles.len() > streams.len() {
        log::debug!(
            target: target,
            "Ignoring {} roles, camera has {} streams",
            roles.len() - streams.len(),
            streams.len()
        );
    }
    config
}

struct CameraSlot {
    id: CameraId,
    name: String,
    data: Box<dyn CameraData>,
    streams: Vec<Stream>,
    state: CameraState,
    queue: VecDeque<Request>,
    sequence: u64,
}

impl CameraSlot {
    fn check_state(&self, operation: &'static str, allowed: &[CameraState]) -> Result<(), Error> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidState {
                camera: self.name.clone(),
                state: self.state,
                operation,
            })
        }
    }

    fn stream_mut(&mut self, id: StreamId) -> Result<&mut Stream, Error> {
        let name = &self.name;
        self.streams
            .iter_mut()
            .find(|s| s.id() == id)
            .ok_or_else(|| Error::UnknownStream(format!("{} is not a stream of {}", id, name)))
    }

    fn stream(&self, id: StreamId) -> Option<&Stream> {
        self.streams.iter().find(|s| s.id() == id)
    }

    fn active_streams(&self) -> Vec<StreamId> {
        self.streams
            .iter()
            .filter(|s| s.is_active())
            .map(|s| s.id())
            .collect()
    }

    /// Releases the pools of `streams` populated by a failed allocation.
    fn rollback_allocation(&mut self, streams: &[StreamId]) {
        for id in streams {
            if let Err(err) = self.data.release_buffers(*id) {
                log::warn!(target: category::PIPELINE, "{}: {}", self.name, err);
            }
            if let Ok(stream) = self.stream_mut(*id) {
                if let Err(err) = stream.pool_mut().clear() {
                    log::warn!(target: category::PIPELINE, "{}: {}", self.name, err);
                }
            }
        }
    }

    /// Records one completed buffer against the request holding it. The
    /// buffer stays with the request until the request is delivered.
    fn buffer_ready(&mut self, ready: BufferReady) {
        if let Ok(stream) = self.stream_mut(ready.stream) {
            stream
                .pool_mut()
                .hold_for_request(ready.index, Some(ready.metadata));
        }

        let matched = self.queue.iter_mut().any(|request| {
            request.complete_buffer(ready.stream, ready.index, ready.status, Some(ready.metadata))
        });
        if !matched {
            log::warn!(
                target: category::REQUEST,
                "{}: dropping completion of {} buffer {} with no request",
                self.name,
                ready.stream,
                ready.index
            );
        }
    }

    /// Gives every buffer of `request` back to the application.
    fn release_buffers_of(&mut self, request: &Request) {
        for (id, buffer) in request.buffers() {
            if let Ok(stream) = self.stream_mut(id) {
                stream.pool_mut().return_to_application(buffer.index());
            }
        }
    }

    /// Pops every finished request at the head of the queue.
    fn complete_head(&mut self, done: &mut Vec<(CameraId, Request)>) {
        while self
            .queue
            .front()
            .map_or(false, |request| !request.has_pending_buffers())
        {
            if let Some(mut request) = self.queue.pop_front() {
                self.release_buffers_of(&request);
                request.finish();
                log::debug!(
                    target: category::REQUEST,
                    "{}: request {} {}",
                    self.name,
                    request.sequence(),
                    request.status()
                );
                done.push((self.id, request));
            }
        }
    }
}

/// The cameras of one matched handler and the state machine driving them.
pub struct Pipeline {
    handler: Box<dyn PipelineHandler>,
    cameras: Vec<CameraSlot>,
}

impl Pipeline {
    pub fn new(handler: Box<dyn PipelineHandler>, specs: Vec<CameraSpec>) -> Self {
        let cameras = specs
            .into_iter()
            .map(|spec| {
                let streams = spec.data.streams().into_iter().map(Stream::new).collect();
                let slot = CameraSlot {
                    id: CameraId::next(),
                    name: spec.name,
                    data: spec.data,
                    streams,
                    state: CameraState::Registered,
                    queue: VecDeque::new(),
                    sequence: 0,
                };
                log::info!(
                    target: category::PIPELINE,
                    "{}: registered camera {} with {} streams",
                    handler.name(),
                    slot.name,
                    slot.streams.len()
                );
                slot
            })
            .collect();

        Pipeline { handler, cameras }
    }

    /// Name of the handler that matched the hardware
    pub fn name(&self) -> &'static str {
        self.handler.name()
    }

    /// Id, name and streams of every camera
    pub fn cameras(&self) -> Vec<(CameraId, String, Vec<StreamId>)> {
        self.cameras
            .iter()
            .map(|c| (c.id, c.name.clone(), c.streams.iter().map(|s| s.id()).collect()))
            .collect()
    }

    fn slot(&self, camera: CameraId) -> Result<&CameraSlot, Error> {
        self.cameras
            .iter()
            .find(|c| c.id == camera)
            .ok_or_else(|| Error::InvalidRequest(format!("{} is not handled by {}", camera, self.name())))
    }

    fn slot_mut(&mut self, camera: CameraId) -> Result<&mut CameraSlot, Error> {
        let name = self.handler.name();
        self.cameras
            .iter_mut()
            .find(|c| c.id == camera)
            .ok_or_else(|| Error::InvalidRequest(format!("{} is not handled by {}", camera, name)))
    }

    pub fn state(&self, camera: CameraId) -> Option<CameraState> {
        self.slot(camera).ok().map(|c| c.state)
    }

    pub fn configuration(&self, camera: CameraId, stream: StreamId) -> Option<StreamConfiguration> {
        self.slot(camera)
            .ok()?
            .stream(stream)?
            .configuration()
            .copied()
    }

    pub fn pool_status(&self, camera: CameraId, stream: StreamId) -> Option<PoolStatus> {
        let pool = self.slot(camera).ok()?.stream(stream)?.pool();
        Some(PoolStatus {
            buffers: pool.len(),
            queued: pool.queued(),
        })
    }

    pub fn buffer_memory(&self, camera: CameraId, stream: StreamId, index: u32) -> Option<FrameMemory> {
        let pool = self.slot(camera).ok()?.stream(stream)?.pool();
        pool.get(index).map(|b| b.memory().clone())
    }

    /// Number of queued requests not yet handed back
    pub fn in_flight(&self, camera: CameraId) -> usize {
        self.slot(camera).map_or(0, |c| c.queue.len())
    }

    pub fn generate_configuration(&self, camera: CameraId, roles: &[StreamRole]) -> CameraConfiguration {
        match self.slot(camera) {
            Ok(slot) => slot.data.generate_configuration(roles),
            Err(_) => CameraConfiguration::new(),
        }
    }

    /// Negotiates and applies `config`.
    ///
    /// Every stream's format is tried first. If the hardware would adjust
    /// the size or pixel format of any stream the configuration is rejected
    /// and nothing is applied. The configured streams become the active
    /// set; streams missing from `config` are deactivated.
    pub fn configure(
        &mut self,
        camera: CameraId,
        config: &CameraConfiguration,
    ) -> Result<CameraConfiguration, Error> {
        let slot = self.slot_mut(camera)?;
        slot.check_state("configure", &[CameraState::Registered, CameraState::Configured])?;

        if config.is_empty() {
            return Err(Error::InvalidConfiguration(
                "no stream configured".to_string(),
            ));
        }
        for (stream, cfg) in config.iter() {
            slot.stream_mut(stream)?;
            if cfg.buffer_count == 0 {
                return Err(Error::InvalidConfiguration(format!(
                    "{} requests no buffers",
                    stream
                )));
            }
        }
        if let Some(stream) = slot.streams.iter().find(|s| !s.pool().is_empty()) {
            return Err(Error::Busy(format!(
                "{} still has {} buffers allocated",
                stream.id(),
                stream.pool().len()
            )));
        }

        for (stream, cfg) in config.iter() {
            let adjusted = slot.data.try_configuration(stream, cfg)?;
            if adjusted.size != cfg.size || adjusted.pixel_format != cfg.pixel_format {
                log::debug!(
                    target: category::PIPELINE,
                    "{}: {} requested {}, hardware offers {}",
                    slot.name,
                    stream,
                    cfg,
                    adjusted
                );
                return Err(Error::InvalidConfiguration(format!(
                    "{} cannot capture {}, nearest is {}",
                    stream, cfg, adjusted
                )));
            }
        }

        let mut applied = CameraConfiguration::new();
        for (stream, cfg) in config.iter() {
            let result = slot.data.apply_configuration(stream, cfg)?;
            if result != *cfg {
                log::error!(
                    target: category::PIPELINE,
                    "{}: {} applied {} after accepting {}",
                    slot.name,
                    stream,
                    result,
                    cfg
                );
                return Err(Error::InvalidConfiguration(format!(
                    "{} was adjusted to {}",
                    stream, result
                )));
            }
            applied.insert(stream, result);
        }

        for stream in slot.streams.iter_mut() {
            stream.set_configuration(applied.get(stream.id()).copied());
        }
        slot.state = CameraState::Configured;
        log::info!(target: category::PIPELINE, "{}: configured {}", slot.name, applied);
        Ok(applied)
    }

    /// Exports the configured number of buffers into each pool of `streams`.
    pub fn allocate_buffers(&mut self, camera: CameraId, streams: &[StreamId]) -> Result<(), Error> {
        let slot = self.slot_mut(camera)?;
        slot.check_state("allocate buffers", &[CameraState::Configured])?;

        let mut counts = Vec::with_capacity(streams.len());
        for id in streams {
            let stream = slot.stream_mut(*id)?;
            let Some(cfg) = stream.configuration() else {
                return Err(Error::InvalidConfiguration(format!("{} is not configured", id)));
            };
            if !stream.pool().is_empty() {
                return Err(Error::Busy(format!(
                    "{} already has {} buffers",
                    id,
                    stream.pool().len()
                )));
            }
            counts.push((*id, cfg.buffer_count));
        }

        let mut populated = Vec::with_capacity(counts.len());
        for (id, count) in counts {
            let result = slot
                .data
                .export_buffers(id, count)
                .and_then(|memory| slot.stream_mut(id)?.pool_mut().populate(memory));
            populated.push(id);
            if let Err(err) = result {
                log::error!(target: category::PIPELINE, "{}: allocating {} failed: {}", slot.name, id, err);
                slot.rollback_allocation(&populated);
                return Err(err);
            }

            // The device may hand out fewer buffers than configured.
            let stream = slot.stream_mut(id)?;
            let allocated = stream.pool().len() as u32;
            let Some(mut cfg) = stream.configuration().copied() else {
                continue;
            };
            if cfg.buffer_count != allocated {
                log::info!(
                    target: category::PIPELINE,
                    "{}: {} got {} of {} buffers",
                    slot.name,
                    id,
                    allocated,
                    cfg.buffer_count
                );
                cfg.buffer_count = allocated;
                slot.stream_mut(id)?.set_configuration(Some(cfg));
            }
        }

        Ok(())
    }

    /// Releases the pools of `streams`.
    pub fn free_buffers(&mut self, camera: CameraId, streams: &[StreamId]) -> Result<(), Error> {
        let slot = self.slot_mut(camera)?;
        slot.check_state("free buffers", &[CameraState::Configured])?;

        for id in streams {
            let queued = slot.stream_mut(*id)?.pool().queued();
            if queued > 0 {
                return Err(Error::Busy(format!("{} has {} buffers queued", id, queued)));
            }
        }

        for id in streams {
            if slot.stream_mut(*id)?.pool().is_empty() {
                continue;
            }
            slot.data.release_buffers(*id)?;
            slot.stream_mut(*id)?.pool_mut().clear()?;
            log::debug!(target: category::PIPELINE, "{}: freed buffers of {}", slot.name, id);
        }
        Ok(())
    }

    pub fn start(&mut self, camera: CameraId) -> Result<(), Error> {
        let slot = self.slot_mut(camera)?;
        slot.check_state("start", &[CameraState::Configured])?;

        let active = slot.active_streams();
        for id in &active {
            if slot.stream_mut(*id)?.pool().is_empty() {
                return Err(Error::InvalidConfiguration(format!(
                    "{} has no buffers allocated",
                    id
                )));
            }
        }

        slot.data.start(&active)?;
        slot.state = CameraState::Running;
        log::info!(target: category::PIPELINE, "{}: started", slot.name);
        Ok(())
    }

    /// Stops streaming and cancels every in-flight request.
    ///
    /// Returns the cancelled requests in queue order. Does nothing unless
    /// the camera is running.
    pub fn stop(&mut self, camera: CameraId) -> Vec<Request> {
        let Ok(slot) = self.slot_mut(camera) else {
            return Vec::new();
        };
        if slot.state != CameraState::Running {
            return Vec::new();
        }

        let active = slot.active_streams();
        for (id, flushed) in slot.data.stop(&active) {
            if let Ok(stream) = slot.stream_mut(id) {
                for index in flushed {
                    stream.pool_mut().return_to_application(index);
                }
            }
        }

        let mut cancelled: Vec<Request> = slot.queue.drain(..).collect();
        for request in cancelled.iter_mut() {
            let unfilled = request.resolve_pending(BufferStatus::Cancelled);
            log::trace!(
                target: category::REQUEST,
                "{}: request {} cancelled with {} unfilled buffers",
                slot.name,
                request.sequence(),
                unfilled.len()
            );
            slot.release_buffers_of(request);
            request.finish();
        }

        slot.state = CameraState::Configured;
        log::info!(
            target: category::PIPELINE,
            "{}: stopped, {} requests cancelled",
            slot.name,
            cancelled.len()
        );
        cancelled
    }

    /// Queues every buffer of `request` to its device.
    ///
    /// The request is validated first and rejected without touching any
    /// device if it names a foreign or inactive stream, misses an active
    /// stream or uses a buffer the application does not own.
    ///
    /// Buffers are queued in [`StreamId`] order, which is the order the
    /// streams were created in at match time. The same device failure is
    /// therefore reported in two ways depending on where its stream sits
    /// in that order:
    ///
    /// - the device of the first stream refuses: nothing has been queued,
    ///   so the error is returned and the request is dropped
    /// - a later device refuses: earlier buffers are already with their
    ///   devices and cannot be recalled, so `Ok` is returned, the refused
    ///   and remaining buffers are marked [`BufferStatus::Error`] and the
    ///   request completes in order with those errored buffers
    ///
    /// The buffers of a queued request are not available to new requests
    /// until the request is delivered back.
    pub fn queue_request(&mut self, camera: CameraId, mut request: Request) -> Result<(), Error> {
        let slot = self.slot_mut(camera)?;
        slot.check_state("queue requests", &[CameraState::Running])?;

        if request.camera() != camera {
            return Err(Error::InvalidRequest(format!(
                "request of {} queued to {}",
                request.camera(),
                slot.name
            )));
        }
        if !request.has_pending_buffers() {
            return Err(Error::InvalidRequest("request has no buffers".to_string()));
        }

        let assignments: Vec<(StreamId, u32)> = request
            .buffers()
            .map(|(stream, buffer)| (stream, buffer.index()))
            .collect();
        for (id, index) in &assignments {
            let Some(stream) = slot.stream(*id) else {
                return Err(Error::InvalidRequest(format!(
                    "{} is not a stream of {}",
                    id, slot.name
                )));
            };
            if !stream.is_active() {
                return Err(Error::InvalidRequest(format!("{} is not configured", id)));
            }
            stream.pool().check_available(*index)?;
        }
        if let Some(missing) = slot
            .active_streams()
            .into_iter()
            .find(|id| request.buffer(*id).is_none())
        {
            return Err(Error::InvalidRequest(format!("no buffer for {}", missing)));
        }

        slot.sequence += 1;
        request.mark_in_flight(slot.sequence);

        for (i, (id, index)) in assignments.iter().enumerate() {
            let memory = slot.stream_mut(*id)?.pool_mut().hand_to_device(*index)?;
            if let Err(err) = slot.data.queue_buffer(*id, *index) {
                if i == 0 {
                    slot.stream_mut(*id)?.pool_mut().return_to_application(*index);
                    slot.sequence -= 1;
                    return Err(err);
                }

                log::error!(
                    target: category::REQUEST,
                    "{}: request {} degraded, queueing {} failed: {}",
                    slot.name,
                    request.sequence(),
                    id,
                    err
                );
                for (id, index) in &assignments[i..] {
                    request.complete_buffer(*id, *index, BufferStatus::Error, None);
                    slot.stream_mut(*id)?.pool_mut().hold_for_request(*index, None);
                }
                break;
            }
            request.attach_memory(*id, memory);
        }

        log::trace!(target: category::REQUEST, "{}: queued request {}", slot.name, request.sequence());
        slot.queue.push_back(request);
        Ok(())
    }

    /// Collects device completions and returns the requests they finished.
    pub fn poll(&mut self) -> Vec<(CameraId, Request)> {
        let mut done = Vec::new();
        for slot in self.cameras.iter_mut() {
            for ready in slot.data.process_completions() {
                slot.buffer_ready(ready);
            }
            slot.complete_head(&mut done);
        }
        done
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("handler", &self.handler.name())
            .field(
                "cameras",
                &self.cameras.iter().map(|c| &c.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fourcc::FourCC;
    use crate::geometry::Size;

    #[test]
    fn test_state_display() {
        assert_eq!(CameraState::Configured.to_string(), "Configured");
        assert_eq!(CameraState::Running.to_string(), "Running");
    }

    #[test]
    fn test_roles_beyond_streams_ignored() {
        let streams = [StreamId::next()];
        let config = configuration_for_roles(
            category::PIPELINE,
            &streams,
            &[StreamRole::Viewfinder, StreamRole::StillCapture],
            |role| {
                let size = if role == StreamRole::Viewfinder {
                    Size::new(320, 240)
                } else {
                    Size::new(1280, 720)
                };
                StreamConfiguration::new(FourCC::NV12, size, 3)
            },
        );
        assert_eq!(config.len(), 1);
        assert_eq!(config.get(streams[0]).unwrap().size, Size::new(320, 240));
    }
}
