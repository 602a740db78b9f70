// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Pipeline handler for USB video class webcams
//!
//! Each webcam is its own media device with a single capture node. One
//! handler instance takes one webcam; the camera manager keeps creating
//! instances until no free webcam is left.

use super::{configuration_for_roles, CameraData, CameraSpec, PipelineHandler};
use crate::category;
use crate::fourcc::FourCC;
use crate::geometry::Size;
use crate::media::{DeviceEnumerator, DeviceMatch, MediaLease};
use crate::stream::{CameraConfiguration, StreamConfiguration, StreamId, StreamRole};
use crate::v4l2::VideoDevice;

#[derive(Debug, Default)]
pub struct UvcPipeline {
    matched: bool,
}

impl UvcPipeline {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PipelineHandler for UvcPipeline {
    fn name(&self) -> &'static str {
        "uvcvideo"
    }

    fn match_devices(&mut self, enumerator: &DeviceEnumerator) -> Option<Vec<CameraSpec>> {
        if self.matched {
            return None;
        }

        let lease = enumerator.acquire(&DeviceMatch::new("uvcvideo"))?;
        let Some(entity) = lease.entities().iter().find(|e| e.device_node.is_some()) else {
            log::warn!(target: category::UVC, "{} has no video node", lease.model());
            return None;
        };

        let mut video = match VideoDevice::open_entity(enumerator, &lease, &entity.name) {
            Ok(video) => video,
            Err(err) => {
                log::error!(target: category::UVC, "Failed to open {}: {}", entity.name, err);
                return None;
            }
        };
        let stream = StreamId::next();
        video.connect(stream);

        log::debug!(target: category::UVC, "Matched {}", lease.model());
        let name = lease.model().to_string();
        self.matched = true;
        Some(vec![CameraSpec {
            name,
            data: Box::new(UvcCameraData {
                stream,
                video,
                _lease: lease,
            }),
        }])
    }
}

struct UvcCameraData {
    stream: StreamId,
    video: VideoDevice,
    _lease: MediaLease,
}

impl CameraData for UvcCameraData {
    fn streams(&self) -> Vec<StreamId> {
        vec![self.stream]
    }

    fn device_mut(&mut self, stream: StreamId) -> Option<&mut VideoDevice> {
        (stream == self.stream).then_some(&mut self.video)
    }

    fn generate_configuration(&self, roles: &[StreamRole]) -> CameraConfiguration {
        configuration_for_roles(category::UVC, &[self.stream], roles, |_| {
            StreamConfiguration::new(FourCC::YUYV, Size::new(640, 480), 4)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virt::VirtualMediaSource;

    #[test]
    fn test_one_webcam_per_instance() {
        let source = VirtualMediaSource::new()
            .with_uvc("Webcam A")
            .with_vimc()
            .with_uvc("Webcam B");
        let mut enumerator = DeviceEnumerator::new(source.clone());
        enumerator.enumerate().unwrap();

        let first = UvcPipeline::new().match_devices(&enumerator).unwrap();
        let second = UvcPipeline::new().match_devices(&enumerator).unwrap();
        assert!(UvcPipeline::new().match_devices(&enumerator).is_none());
        assert_eq!(first[0].name, "Webcam A");
        assert_eq!(second[0].name, "Webcam B");
        assert!(source.node("Webcam B", "Webcam B").unwrap().is_open());

        drop(second);
        assert!(!source.node("Webcam B", "Webcam B").unwrap().is_open());
        assert!(UvcPipeline::new().match_devices(&enumerator).is_some());
    }

    #[test]
    fn test_open_failure_releases_device() {
        let source = VirtualMediaSource::new().with_uvc("Webcam");
        source.node("Webcam", "Webcam").unwrap().set_fail_open(true);
        let mut enumerator = DeviceEnumerator::new(source);
        enumerator.enumerate().unwrap();

        assert!(UvcPipeline::new().match_devices(&enumerator).is_none());
        assert!(!enumerator.devices()[0].is_acquired());
    }

    #[test]
    fn test_single_stream_configuration() {
        let mut enumerator = DeviceEnumerator::new(VirtualMediaSource::new().with_uvc("Webcam"));
        enumerator.enumerate().unwrap();
        let cameras = UvcPipeline::new().match_devices(&enumerator).unwrap();

        let config = cameras[0]
            .data
            .generate_configuration(&[StreamRole::Viewfinder, StreamRole::StillCapture]);
        assert_eq!(config.len(), 1);
        let (_, cfg) = config.iter().next().unwrap();
        assert_eq!(cfg.to_string(), "640x480-YUYV");
    }
}
