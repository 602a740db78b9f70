// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies
//
// pipecam Capture Protocol Tests
//
// TESTING LAYERS:
//
// Layer 1 (Virtual hardware - No hardware required):
//   - test_vimc_end_to_end: match, configure, allocate, start, one request
//   - test_fifo_completion_two_streams: requests complete in queue order
//   - test_incomplete_request_not_queued: no partial enqueue
//   - test_stop_cancels_and_is_idempotent: stop drains in-flight requests
//   - test_configuration_round_trip: native configurations come back unchanged
//   - test_adjusted_configuration_rejected: no silent format changes
//   - test_buffer_reuse: completed buffers can be queued again
//   - test_filled_buffer_held_until_delivery: no reuse while a request is undelivered
//   - test_short_allocation_updates_configuration: device grants fewer buffers
//   - test_errored_buffer_completes_request: hardware error flag
//   - test_degraded_queue: device refusing a later buffer
//   - test_state_machine: operations outside their state
//   - test_start_and_allocation_rollback: failures leave nothing half done
//   - test_callback_requeues: requeueing from the completion callback
//
// Every test drives the vimc topology published by VirtualMediaSource. Node
// handles switch auto-completion off where a test needs to control the order
// buffers complete in.
//
// RUN:
//   cargo test --test capture

use std::cell::RefCell;
use std::rc::Rc;

use pipecam::buffer::BufferStatus;
use pipecam::camera::Camera;
use pipecam::camera_manager::{CameraManager, ManagerOptions};
use pipecam::fourcc::FourCC;
use pipecam::geometry::Size;
use pipecam::pipeline::{CameraState, PipelineRegistry};
use pipecam::request::{Request, RequestStatus};
use pipecam::stream::{CameraConfiguration, StreamConfiguration, StreamRole};
use pipecam::virt::{NodeHandle, VirtualMediaSource};
use pipecam::Error;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct Rig {
    source: VirtualMediaSource,
    manager: CameraManager,
    camera: Rc<Camera>,
}

impl Rig {
    fn vimc() -> Self {
        init_logging();
        let source = VirtualMediaSource::new().with_vimc();
        let manager = CameraManager::with_registry(
            source.clone(),
            PipelineRegistry::with_builtins(),
            ManagerOptions::default(),
        );
        manager.start().unwrap();
        let camera = manager.get("VIMC Sensor B").unwrap();
        Rig {
            source,
            manager,
            camera,
        }
    }

    fn raw(&self) -> NodeHandle {
        self.source.node("VIMC MDEV", "Raw Capture 1").unwrap()
    }

    fn processed(&self) -> NodeHandle {
        self.source.node("VIMC MDEV", "RGB/YUV Capture").unwrap()
    }

    /// Configures both streams with the defaults, allocates and starts.
    fn run_both(&self) {
        let config = self
            .camera
            .generate_configuration(&[StreamRole::VideoRecording, StreamRole::Viewfinder]);
        assert_eq!(config.len(), 2);
        self.camera.configure(&config).unwrap();
        self.camera.allocate_buffers(self.camera.streams()).unwrap();
        self.camera.start().unwrap();
    }

    fn request(&self, raw: u32, processed: u32) -> Request {
        let streams = self.camera.streams();
        let mut request = self.camera.create_request();
        request.add_buffer(streams[0], raw).unwrap();
        request.add_buffer(streams[1], processed).unwrap();
        request
    }

    /// Records every delivered request.
    fn record(&self) -> Rc<RefCell<Vec<Request>>> {
        let delivered = Rc::new(RefCell::new(Vec::new()));
        let sink = delivered.clone();
        self.camera
            .on_request_completed(move |_, request| sink.borrow_mut().push(request));
        delivered
    }
}

#[test]
fn test_vimc_end_to_end() {
    let rig = Rig::vimc();
    let camera = &rig.camera;
    assert_eq!(camera.state(), CameraState::Registered);

    let config = camera.generate_configuration(&[StreamRole::StillCapture]);
    assert_eq!(config.len(), 1);
    let stream = camera.streams()[0];
    let cfg = *config.get(stream).unwrap();
    assert_eq!(cfg.pixel_format, FourCC::RGB24);
    assert_eq!(cfg.size, Size::new(640, 480));
    assert_eq!(cfg.buffer_count, 4);

    camera.configure(&config).unwrap();
    assert_eq!(camera.state(), CameraState::Configured);
    camera.allocate_buffers(&[stream]).unwrap();
    assert_eq!(camera.pool_status(stream).unwrap().buffers, 4);
    camera.start().unwrap();
    assert_eq!(camera.state(), CameraState::Running);

    let delivered = rig.record();
    let mut request = camera.create_request();
    request.add_buffer(stream, 0).unwrap();
    camera.queue_request(request).unwrap();
    assert_eq!(camera.in_flight(), 1);

    while camera.in_flight() > 0 {
        rig.manager.process_events();
    }

    let delivered = delivered.borrow();
    assert_eq!(delivered.len(), 1);
    let done = &delivered[0];
    assert_eq!(done.status(), RequestStatus::Complete);
    let buffer = done.buffer(stream).unwrap();
    assert_eq!(buffer.index(), 0);
    assert_eq!(buffer.status(), BufferStatus::Success);
    assert_eq!(buffer.metadata().unwrap().bytes_used, 640 * 480 * 3);

    let memory = buffer.memory().unwrap();
    assert!(memory.same_region(&camera.buffer_memory(stream, 0).unwrap()));
    assert_eq!(memory.data()[7], 7);
    assert_eq!(camera.pool_status(stream).unwrap().queued, 0);
    camera.stop();
}

#[test]
fn test_fifo_completion_two_streams() {
    let rig = Rig::vimc();
    rig.run_both();
    let (raw, processed) = (rig.raw(), rig.processed());
    raw.set_auto_complete(false);
    processed.set_auto_complete(false);
    let delivered = rig.record();

    for i in 0..3 {
        rig.camera.queue_request(rig.request(i, i)).unwrap();
    }

    // R2 fills completely before R1 has anything
    assert!(processed.complete(1));
    assert!(raw.complete(1));
    assert_eq!(rig.manager.process_events(), 0);

    assert!(raw.complete(0));
    assert_eq!(rig.manager.process_events(), 0);
    assert!(processed.complete(0));
    assert_eq!(rig.manager.process_events(), 2);

    assert!(raw.complete(2));
    assert!(processed.complete(2));
    assert_eq!(rig.manager.process_events(), 1);

    let sequences: Vec<u64> = delivered.borrow().iter().map(|r| r.sequence()).collect();
    assert_eq!(sequences, [1, 2, 3]);
    for (i, request) in delivered.borrow().iter().enumerate() {
        for (_, buffer) in request.buffers() {
            assert_eq!(buffer.index(), i as u32);
            assert_eq!(buffer.status(), BufferStatus::Success);
        }
    }
}

#[test]
fn test_incomplete_request_not_queued() {
    init_logging();
    let source = VirtualMediaSource::new().with_vimc().with_uvc("Webcam");
    let manager = CameraManager::with_registry(
        source.clone(),
        PipelineRegistry::with_builtins(),
        ManagerOptions::default(),
    );
    manager.start().unwrap();
    let camera = manager.get("VIMC Sensor B").unwrap();
    let webcam = manager.get("Webcam").unwrap();

    let config = camera.generate_configuration(&[StreamRole::StillCapture, StreamRole::Viewfinder]);
    camera.configure(&config).unwrap();
    camera.allocate_buffers(camera.streams()).unwrap();
    camera.start().unwrap();
    let streams = camera.streams().to_vec();
    let raw = source.node("VIMC MDEV", "Raw Capture 1").unwrap();
    let processed = source.node("VIMC MDEV", "RGB/YUV Capture").unwrap();

    // missing the processed stream
    let mut request = camera.create_request();
    request.add_buffer(streams[0], 0).unwrap();
    assert!(matches!(camera.queue_request(request), Err(Error::InvalidRequest(_))));

    // out of range index on the second stream
    let mut request = camera.create_request();
    request.add_buffer(streams[0], 0).unwrap();
    request.add_buffer(streams[1], 4).unwrap();
    assert!(matches!(camera.queue_request(request), Err(Error::InvalidRequest(_))));

    // stream of another camera
    let mut request = camera.create_request();
    request.add_buffer(streams[0], 0).unwrap();
    request.add_buffer(streams[1], 0).unwrap();
    request.add_buffer(webcam.streams()[0], 0).unwrap();
    assert!(matches!(camera.queue_request(request), Err(Error::InvalidRequest(_))));

    // request created by another camera
    let mut request = webcam.create_request();
    request.add_buffer(streams[0], 0).unwrap();
    request.add_buffer(streams[1], 0).unwrap();
    assert!(matches!(camera.queue_request(request), Err(Error::InvalidRequest(_))));

    // empty request
    assert!(matches!(
        camera.queue_request(camera.create_request()),
        Err(Error::InvalidRequest(_))
    ));

    assert_eq!(raw.queue_calls(), 0);
    assert_eq!(processed.queue_calls(), 0);
    assert_eq!(camera.in_flight(), 0);
    for stream in &streams {
        assert_eq!(camera.pool_status(*stream).unwrap().queued, 0);
    }
}

#[test]
fn test_stop_cancels_and_is_idempotent() {
    let rig = Rig::vimc();
    rig.camera.stop();
    assert_eq!(rig.camera.state(), CameraState::Registered);

    rig.run_both();
    let (raw, processed) = (rig.raw(), rig.processed());
    raw.set_auto_complete(false);
    processed.set_auto_complete(false);
    let delivered = rig.record();

    rig.camera.queue_request(rig.request(0, 0)).unwrap();
    rig.camera.queue_request(rig.request(1, 1)).unwrap();
    assert!(raw.complete(0));

    rig.camera.stop();
    assert_eq!(rig.camera.state(), CameraState::Configured);
    assert_eq!(rig.camera.in_flight(), 0);
    assert!(!raw.is_streaming());

    {
        let delivered = delivered.borrow();
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[0].sequence(), 1);
        assert_eq!(delivered[1].sequence(), 2);
        for request in delivered.iter() {
            assert_eq!(request.status(), RequestStatus::Cancelled);
        }
        let streams = rig.camera.streams();
        // flushed by stream-off before the completion was collected
        assert_eq!(
            delivered[0].buffer(streams[0]).unwrap().status(),
            BufferStatus::Cancelled
        );
    }
    for stream in rig.camera.streams() {
        assert_eq!(rig.camera.pool_status(*stream).unwrap().queued, 0);
    }

    rig.camera.stop();
    assert_eq!(delivered.borrow().len(), 2);
    assert_eq!(rig.manager.process_events(), 0);

    // the camera can run again after a stop
    raw.set_auto_complete(true);
    processed.set_auto_complete(true);
    rig.camera.start().unwrap();
    rig.camera.queue_request(rig.request(0, 0)).unwrap();
    while rig.camera.in_flight() > 0 {
        rig.manager.process_events();
    }
    assert_eq!(delivered.borrow()[2].status(), RequestStatus::Complete);
    assert_eq!(delivered.borrow()[2].sequence(), 3);
}

#[test]
fn test_configuration_round_trip() {
    let rig = Rig::vimc();
    let streams = rig.camera.streams();
    let mut config = CameraConfiguration::new();
    config.insert(
        streams[0],
        StreamConfiguration::new(FourCC::SBGGR8, Size::new(1920, 1080), 3),
    );
    config.insert(
        streams[1],
        StreamConfiguration::new(FourCC::BGR24, Size::new(320, 240), 2),
    );

    let applied = rig.camera.configure(&config).unwrap();
    assert_eq!(applied, config);
    assert_eq!(rig.camera.configuration(streams[1]), config.get(streams[1]).copied());
    assert_eq!(rig.raw().format().unwrap().size, Size::new(1920, 1080));

    // a stream left out is no longer part of the active set
    let mut single = CameraConfiguration::new();
    single.insert(
        streams[1],
        StreamConfiguration::new(FourCC::RGB24, Size::new(640, 480), 4),
    );
    rig.camera.configure(&single).unwrap();
    assert!(rig.camera.configuration(streams[0]).is_none());
}

#[test]
fn test_adjusted_configuration_rejected() {
    let rig = Rig::vimc();
    let streams = rig.camera.streams();

    let mut odd = CameraConfiguration::new();
    odd.insert(
        streams[0],
        StreamConfiguration::new(FourCC::RGB24, Size::new(641, 480), 4),
    );
    assert!(matches!(
        rig.camera.configure(&odd),
        Err(Error::InvalidConfiguration(_))
    ));
    assert_eq!(rig.camera.state(), CameraState::Registered);
    assert!(rig.camera.configuration(streams[0]).is_none());
    assert!(rig.raw().format().is_none());

    // the scaler never outputs Bayer data
    let mut bayer = CameraConfiguration::new();
    bayer.insert(
        streams[0],
        StreamConfiguration::new(FourCC::RGB24, Size::new(640, 480), 4),
    );
    bayer.insert(
        streams[1],
        StreamConfiguration::new(FourCC::SBGGR8, Size::new(640, 480), 4),
    );
    assert!(matches!(
        rig.camera.configure(&bayer),
        Err(Error::InvalidConfiguration(_))
    ));
    assert!(rig.raw().format().is_none());

    let mut no_buffers = CameraConfiguration::new();
    no_buffers.insert(
        streams[0],
        StreamConfiguration::new(FourCC::RGB24, Size::new(640, 480), 0),
    );
    assert!(matches!(
        rig.camera.configure(&no_buffers),
        Err(Error::InvalidConfiguration(_))
    ));
    assert!(matches!(
        rig.camera.configure(&CameraConfiguration::new()),
        Err(Error::InvalidConfiguration(_))
    ));
}

#[test]
fn test_buffer_reuse() {
    let rig = Rig::vimc();
    let stream = rig.camera.streams()[0];
    let config = rig.camera.generate_configuration(&[StreamRole::StillCapture]);
    rig.camera.configure(&config).unwrap();
    rig.camera.allocate_buffers(&[stream]).unwrap();
    rig.camera.start().unwrap();
    let raw = rig.raw();
    raw.set_auto_complete(false);

    let mut first = rig.camera.create_request();
    first.add_buffer(stream, 0).unwrap();
    rig.camera.queue_request(first).unwrap();

    let mut twice = rig.camera.create_request();
    twice.add_buffer(stream, 0).unwrap();
    assert!(matches!(
        rig.camera.queue_request(twice),
        Err(Error::InvalidRequest(_))
    ));
    assert_eq!(raw.queue_calls(), 1);

    assert!(raw.complete(0));
    rig.manager.process_events();
    let done = rig.camera.next_completed().unwrap();
    assert_eq!(done.buffer(stream).unwrap().status(), BufferStatus::Success);
    assert!(rig.camera.next_completed().is_none());

    let mut again = rig.camera.create_request();
    again.add_buffer(stream, 0).unwrap();
    rig.camera.queue_request(again).unwrap();
    assert_eq!(raw.pending(), [0]);
    rig.camera.stop();
}

#[test]
fn test_filled_buffer_held_until_delivery() {
    let rig = Rig::vimc();
    rig.run_both();
    let (raw, processed) = (rig.raw(), rig.processed());
    raw.set_auto_complete(false);
    processed.set_auto_complete(false);
    let streams = rig.camera.streams().to_vec();

    rig.camera.queue_request(rig.request(0, 0)).unwrap();
    assert!(raw.complete(0));
    assert_eq!(rig.manager.process_events(), 0);
    assert_eq!(rig.camera.in_flight(), 1);

    // raw 0 holds the frame of a request still waiting for its processed buffer
    assert!(matches!(
        rig.camera.queue_request(rig.request(0, 1)),
        Err(Error::InvalidRequest(_))
    ));
    assert_eq!(raw.queue_calls(), 1);
    assert_eq!(processed.queue_calls(), 1);
    assert_eq!(rig.camera.pool_status(streams[1]).unwrap().queued, 1);

    let frame = rig.camera.buffer_memory(streams[0], 0).unwrap();
    assert_eq!(frame.data()[1], 1);

    assert!(processed.complete(0));
    assert_eq!(rig.manager.process_events(), 1);
    let done = rig.camera.next_completed().unwrap();
    let buffer = done.buffer(streams[0]).unwrap();
    assert_eq!(buffer.status(), BufferStatus::Success);
    assert_eq!(buffer.metadata().unwrap().sequence, 0);
    assert_eq!(frame.data()[1], 1);

    // delivered, so both buffers are free again
    rig.camera.queue_request(rig.request(0, 1)).unwrap();
    assert_eq!(raw.pending(), [0]);
    assert_eq!(processed.pending(), [1]);
    rig.camera.stop();
    assert_eq!(rig.camera.pool_status(streams[0]).unwrap().queued, 0);
    rig.camera.free_buffers(&streams).unwrap();
}

#[test]
fn test_short_allocation_updates_configuration() {
    let rig = Rig::vimc();
    let stream = rig.camera.streams()[0];
    let mut config = rig.camera.generate_configuration(&[StreamRole::StillCapture]);
    config.get_mut(stream).unwrap().buffer_count = 40;
    assert_eq!(rig.camera.configure(&config).unwrap().get(stream).unwrap().buffer_count, 40);

    rig.camera.allocate_buffers(&[stream]).unwrap();
    assert_eq!(rig.camera.pool_status(stream).unwrap().buffers, 32);
    assert_eq!(rig.camera.configuration(stream).unwrap().buffer_count, 32);
    assert_eq!(rig.raw().allocated(), 32);
}

#[test]
fn test_errored_buffer_completes_request() {
    let rig = Rig::vimc();
    rig.run_both();
    let (raw, processed) = (rig.raw(), rig.processed());
    raw.set_auto_complete(false);
    processed.set_auto_complete(false);

    rig.camera.queue_request(rig.request(2, 3)).unwrap();
    assert!(raw.fail(2));
    assert!(processed.complete(3));
    assert_eq!(rig.manager.process_events(), 1);

    let done = rig.camera.next_completed().unwrap();
    let streams = rig.camera.streams();
    assert_eq!(done.status(), RequestStatus::Complete);
    assert_eq!(done.buffer(streams[0]).unwrap().status(), BufferStatus::Error);
    assert_eq!(done.buffer(streams[1]).unwrap().status(), BufferStatus::Success);
}

#[test]
fn test_degraded_queue() {
    let rig = Rig::vimc();
    rig.run_both();
    let (raw, processed) = (rig.raw(), rig.processed());
    let streams = rig.camera.streams().to_vec();

    // the first device refusing rejects the whole request
    raw.set_fail_queue(true);
    assert!(matches!(
        rig.camera.queue_request(rig.request(0, 0)),
        Err(Error::Io(_))
    ));
    assert_eq!(processed.queue_calls(), 0);
    assert_eq!(rig.camera.in_flight(), 0);
    assert_eq!(rig.camera.pool_status(streams[0]).unwrap().queued, 0);

    // a later device refusing degrades the request
    raw.set_fail_queue(false);
    processed.set_fail_queue(true);
    rig.camera.queue_request(rig.request(1, 1)).unwrap();
    assert_eq!(rig.camera.pool_status(streams[1]).unwrap().queued, 0);

    // the refused buffer stays with its request until delivery
    assert!(matches!(
        rig.camera.queue_request(rig.request(2, 1)),
        Err(Error::InvalidRequest(_))
    ));
    while rig.camera.in_flight() > 0 {
        rig.manager.process_events();
    }

    let done = rig.camera.next_completed().unwrap();
    assert_eq!(done.status(), RequestStatus::Complete);
    assert_eq!(done.buffer(streams[0]).unwrap().status(), BufferStatus::Success);
    assert_eq!(done.buffer(streams[1]).unwrap().status(), BufferStatus::Error);

    processed.set_fail_queue(false);
    rig.camera.queue_request(rig.request(2, 1)).unwrap();
    rig.camera.stop();
}

#[test]
fn test_state_machine() {
    let rig = Rig::vimc();
    let camera = &rig.camera;
    let stream = camera.streams()[0];

    assert!(matches!(
        camera.allocate_buffers(&[stream]),
        Err(Error::InvalidState { state: CameraState::Registered, .. })
    ));
    assert!(matches!(camera.start(), Err(Error::InvalidState { .. })));

    let config = camera.generate_configuration(&[StreamRole::StillCapture]);
    camera.configure(&config).unwrap();
    assert!(matches!(
        camera.start(),
        Err(Error::InvalidConfiguration(_))
    ));
    assert!(matches!(
        camera.allocate_buffers(&[camera.streams()[1]]),
        Err(Error::InvalidConfiguration(_))
    ));

    camera.allocate_buffers(&[stream]).unwrap();
    assert!(matches!(camera.allocate_buffers(&[stream]), Err(Error::Busy(_))));
    assert!(matches!(camera.configure(&config), Err(Error::Busy(_))));

    let mut request = camera.create_request();
    request.add_buffer(stream, 0).unwrap();
    assert!(matches!(
        camera.queue_request(request),
        Err(Error::InvalidState { state: CameraState::Configured, .. })
    ));

    camera.start().unwrap();
    assert!(matches!(
        camera.configure(&config),
        Err(Error::InvalidState { state: CameraState::Running, .. })
    ));
    assert!(matches!(
        camera.free_buffers(&[stream]),
        Err(Error::InvalidState { .. })
    ));

    camera.stop();
    camera.free_buffers(&[stream]).unwrap();
    assert_eq!(camera.pool_status(stream).unwrap().buffers, 0);
    assert_eq!(rig.raw().allocated(), 0);
    camera.configure(&config).unwrap();
}

#[test]
fn test_start_and_allocation_rollback() {
    let rig = Rig::vimc();
    let streams = rig.camera.streams().to_vec();
    let config = rig
        .camera
        .generate_configuration(&[StreamRole::StillCapture, StreamRole::Viewfinder]);
    rig.camera.configure(&config).unwrap();
    let (raw, processed) = (rig.raw(), rig.processed());

    processed.set_fail_export(true);
    assert!(matches!(
        rig.camera.allocate_buffers(&streams),
        Err(Error::Io(_))
    ));
    assert_eq!(rig.camera.pool_status(streams[0]).unwrap().buffers, 0);
    assert_eq!(raw.allocated(), 0);

    processed.set_fail_export(false);
    rig.camera.allocate_buffers(&streams).unwrap();

    processed.set_fail_stream_on(true);
    assert!(rig.camera.start().is_err());
    assert_eq!(rig.camera.state(), CameraState::Configured);
    assert!(!raw.is_streaming());

    processed.set_fail_stream_on(false);
    rig.camera.start().unwrap();
    assert!(raw.is_streaming() && processed.is_streaming());
}

#[test]
fn test_callback_requeues() {
    let rig = Rig::vimc();
    let stream = rig.camera.streams()[0];
    let config = rig.camera.generate_configuration(&[StreamRole::VideoRecording]);
    rig.camera.configure(&config).unwrap();
    rig.camera.allocate_buffers(&[stream]).unwrap();
    rig.camera.start().unwrap();

    let frames = Rc::new(RefCell::new(Vec::new()));
    let seen = frames.clone();
    rig.camera.on_request_completed(move |camera, request| {
        let buffer = request.buffer(stream).unwrap();
        seen.borrow_mut()
            .push(buffer.metadata().map(|m| m.sequence));
        if seen.borrow().len() < 8 {
            let mut next = camera.create_request();
            next.add_buffer(stream, buffer.index()).unwrap();
            camera.queue_request(next).unwrap();
        }
    });

    for index in 0..4 {
        let mut request = rig.camera.create_request();
        request.add_buffer(stream, index).unwrap();
        rig.camera.queue_request(request).unwrap();
    }
    while rig.camera.in_flight() > 0 {
        rig.manager.process_events();
    }

    let frames = frames.borrow();
    assert_eq!(frames.len(), 11);
    let sequences: Vec<u32> = frames.iter().map(|s| s.unwrap()).collect();
    assert_eq!(sequences, (0..11).collect::<Vec<u32>>());
    rig.camera.stop();
}
