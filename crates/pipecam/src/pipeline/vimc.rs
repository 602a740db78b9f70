// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Pipeline handler for the virtual media controller (vimc)
//!
//! The vimc topology has two sensors feeding debayers and raw capture
//! nodes, and a scaler combining both debayered paths into the RGB/YUV
//! capture node. The handler builds one camera, "VIMC Sensor B", with two
//! streams: the raw path of sensor B and the processed scaler output.

use super::{configuration_for_roles, CameraData, CameraSpec, PipelineHandler};
use crate::buffer::FrameMemory;
use crate::category;
use crate::fourcc::FourCC;
use crate::geometry::Size;
use crate::media::{DeviceEnumerator, DeviceMatch, MediaLease};
use crate::stream::{CameraConfiguration, StreamConfiguration, StreamId, StreamRole};
use crate::v4l2::{DeviceFormat, VideoDevice};
use crate::Error;

pub const CAMERA_NAME: &str = "VIMC Sensor B";

const ENTITIES: [&str; 9] = [
    "Raw Capture 0",
    "Raw Capture 1",
    "RGB/YUV Capture",
    "Sensor A",
    "Sensor B",
    "Debayer A",
    "Debayer B",
    "RGB/YUV Input",
    "Scaler",
];

const RAW_CAPTURE: &str = "Raw Capture 1";
const PROCESSED_CAPTURE: &str = "RGB/YUV Capture";

/// Formats the scaler can output; it never passes Bayer data through.
const PROCESSED_FORMATS: [FourCC; 2] = [FourCC::RGB24, FourCC::BGR24];

#[derive(Debug, Default)]
pub struct VimcPipeline {
    matched: bool,
}

impl VimcPipeline {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PipelineHandler for VimcPipeline {
    fn name(&self) -> &'static str {
        "vimc"
    }

    fn match_devices(&mut self, enumerator: &DeviceEnumerator) -> Option<Vec<CameraSpec>> {
        if self.matched {
            return None;
        }

        let mut dm = DeviceMatch::new("vimc");
        for entity in ENTITIES {
            dm.add(entity);
        }
        let lease = enumerator.acquire(&dm)?;

        let raw = open(enumerator, &lease, RAW_CAPTURE)?;
        let processed = open(enumerator, &lease, PROCESSED_CAPTURE)?;

        let mut data = VimcCameraData {
            raw: (StreamId::next(), raw),
            processed: (StreamId::next(), processed),
            _lease: lease,
        };
        data.raw.1.connect(data.raw.0);
        data.processed.1.connect(data.processed.0);

        self.matched = true;
        Some(vec![CameraSpec {
            name: CAMERA_NAME.to_string(),
            data: Box::new(data),
        }])
    }
}

fn open(enumerator: &DeviceEnumerator, lease: &MediaLease, entity: &str) -> Option<VideoDevice> {
    match VideoDevice::open_entity(enumerator, lease, entity) {
        Ok(device) => Some(device),
        Err(err) => {
            log::error!(target: category::VIMC, "Failed to open {}: {}", entity, err);
            None
        }
    }
}

struct VimcCameraData {
    raw: (StreamId, VideoDevice),
    processed: (StreamId, VideoDevice),
    // Dropped last so the devices close before the media device is released.
    _lease: MediaLease,
}

impl CameraData for VimcCameraData {
    fn streams(&self) -> Vec<StreamId> {
        vec![self.raw.0, self.processed.0]
    }

    fn device_mut(&mut self, stream: StreamId) -> Option<&mut VideoDevice> {
        if stream == self.raw.0 {
            Some(&mut self.raw.1)
        } else if stream == self.processed.0 {
            Some(&mut self.processed.1)
        } else {
            None
        }
    }

    fn generate_configuration(&self, roles: &[StreamRole]) -> CameraConfiguration {
        configuration_for_roles(category::VIMC, &self.streams(), roles, |_| {
            StreamConfiguration::new(FourCC::RGB24, Size::new(640, 480), 4)
        })
    }

    fn try_configuration(
        &mut self,
        stream: StreamId,
        config: &StreamConfiguration,
    ) -> Result<StreamConfiguration, Error> {
        let mut config = *config;
        if stream == self.processed.0 && !PROCESSED_FORMATS.contains(&config.pixel_format) {
            log::debug!(
                target: category::VIMC,
                "Scaler cannot output {}, using {}",
                config.pixel_format,
                FourCC::RGB24
            );
            config.pixel_format = FourCC::RGB24;
        }

        let device = self
            .device_mut(stream)
            .ok_or_else(|| Error::UnknownStream(stream.to_string()))?;
        let format = device.try_format(&DeviceFormat::new(config.pixel_format, config.size))?;
        Ok(StreamConfiguration::new(
            format.fourcc,
            format.size,
            config.buffer_count,
        ))
    }

    fn export_buffers(&mut self, stream: StreamId, count: u32) -> Result<Vec<FrameMemory>, Error> {
        log::debug!(target: category::VIMC, "Requesting {} buffers for {}", count, stream);
        self.device_mut(stream)
            .ok_or_else(|| Error::UnknownStream(stream.to_string()))?
            .export_buffers(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virt::VirtualMediaSource;

    fn enumerator(source: VirtualMediaSource) -> DeviceEnumerator {
        let mut enumerator = DeviceEnumerator::new(source);
        enumerator.enumerate().unwrap();
        enumerator
    }

    #[test]
    fn test_match_once_per_instance() {
        let enumerator = enumerator(VirtualMediaSource::new().with_vimc().with_vimc());
        let mut handler = VimcPipeline::new();
        let cameras = handler.match_devices(&enumerator).unwrap();
        assert_eq!(cameras.len(), 1);
        assert_eq!(cameras[0].name, CAMERA_NAME);
        assert_eq!(cameras[0].data.streams().len(), 2);

        assert!(handler.match_devices(&enumerator).is_none());
        assert!(VimcPipeline::new().match_devices(&enumerator).is_some());
    }

    #[test]
    fn test_no_match_on_webcam() {
        let enumerator = enumerator(VirtualMediaSource::new().with_uvc("Webcam"));
        assert!(VimcPipeline::new().match_devices(&enumerator).is_none());
    }

    #[test]
    fn test_roles_map_in_order() {
        let enumerator = enumerator(VirtualMediaSource::new().with_vimc());
        let cameras = VimcPipeline::new().match_devices(&enumerator).unwrap();
        let data = &cameras[0].data;
        let streams = data.streams();

        let config = data.generate_configuration(&[
            StreamRole::Viewfinder,
            StreamRole::StillCapture,
            StreamRole::VideoRecording,
        ]);
        assert_eq!(config.streams().collect::<Vec<_>>(), streams);
        let cfg = config.get(streams[0]).unwrap();
        assert_eq!(cfg.pixel_format, FourCC::RGB24);
        assert_eq!(cfg.size, Size::new(640, 480));
        assert_eq!(cfg.buffer_count, 4);

        assert!(data.generate_configuration(&[]).is_empty());
    }

    #[test]
    fn test_processed_stream_rejects_bayer() {
        let enumerator = enumerator(VirtualMediaSource::new().with_vimc());
        let mut cameras = VimcPipeline::new().match_devices(&enumerator).unwrap();
        let data = &mut cameras[0].data;
        let streams = data.streams();
        let bayer = StreamConfiguration::new(FourCC::SBGGR8, Size::new(640, 480), 4);

        let raw = data.try_configuration(streams[0], &bayer).unwrap();
        assert_eq!(raw.pixel_format, FourCC::SBGGR8);
        let processed = data.try_configuration(streams[1], &bayer).unwrap();
        assert_eq!(processed.pixel_format, FourCC::RGB24);
    }
}
