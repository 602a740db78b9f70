// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies
//
// Pixel format codes in the V4L2 little-endian packing.

use core::{fmt, result::Result};
use serde::{Deserialize, Serialize};

/// Four-character pixel format code, e.g. `RGB3` for packed 24-bit RGB.
///
/// The numeric form packs the first character into the least significant
/// byte, which is how video nodes report and accept formats.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Packed 24-bit RGB (`V4L2_PIX_FMT_RGB24`)
    pub const RGB24: FourCC = FourCC(*b"RGB3");
    /// Packed 24-bit BGR (`V4L2_PIX_FMT_BGR24`)
    pub const BGR24: FourCC = FourCC(*b"BGR3");
    /// YUV 4:2:2 packed
    pub const YUYV: FourCC = FourCC(*b"YUYV");
    /// YUV 4:2:0 semi-planar
    pub const NV12: FourCC = FourCC(*b"NV12");
    /// 8-bit Bayer, BGGR order
    pub const SBGGR8: FourCC = FourCC(*b"BA81");
    /// 8-bit Bayer, GRBG order
    pub const SGRBG8: FourCC = FourCC(*b"GRBG");
    /// Motion JPEG
    pub const MJPEG: FourCC = FourCC(*b"MJPG");

    pub const fn as_u32(self) -> u32 {
        (self.0[0] as u32)
            | (self.0[1] as u32) << 8
            | (self.0[2] as u32) << 16
            | (self.0[3] as u32) << 24
    }

    pub const fn from_u32(val: u32) -> FourCC {
        FourCC([
            (val & 0xff) as u8,
            (val >> 8 & 0xff) as u8,
            (val >> 16 & 0xff) as u8,
            (val >> 24 & 0xff) as u8,
        ])
    }

    /// Bits per pixel of the first plane for uncompressed formats.
    ///
    /// Returns `None` for compressed formats and codes this crate does not
    /// know the layout of.
    pub fn bits_per_pixel(self) -> Option<u32> {
        match self {
            FourCC::RGB24 | FourCC::BGR24 => Some(24),
            FourCC::YUYV => Some(16),
            FourCC::NV12 | FourCC::SBGGR8 | FourCC::SGRBG8 => Some(8),
            _ => None,
        }
    }

    /// Size in bytes of one frame of `width`x`height` pixels, all planes included.
    pub fn frame_size(self, width: u32, height: u32) -> Option<usize> {
        let bpp = self.bits_per_pixel()? as usize;
        let luma = width as usize * height as usize * bpp / 8;
        match self {
            FourCC::NV12 => Some(luma + luma / 2),
            _ => Some(luma),
        }
    }
}

impl From<&[u8; 4]> for FourCC {
    fn from(buf: &[u8; 4]) -> FourCC {
        FourCC(*buf)
    }
}

impl From<u32> for FourCC {
    fn from(val: u32) -> FourCC {
        FourCC::from_u32(val)
    }
}

impl From<FourCC> for u32 {
    fn from(val: FourCC) -> Self {
        val.as_u32()
    }
}

impl From<FourCC> for String {
    fn from(val: FourCC) -> Self {
        val.to_string()
    }
}

impl TryFrom<String> for FourCC {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        let bytes = s.as_bytes();
        if bytes.len() != 4 {
            return Err(format!("fourcc must be exactly 4 characters: {:?}", s));
        }
        Ok(FourCC([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match core::str::from_utf8(&self.0) {
            Ok(s) => f.write_str(s),
            // Never return fmt::Error for odd codes, format!() would panic.
            Err(_) => write!(f, "0x{:08x}", self.as_u32()),
        }
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_tuple("FourCC")
            .field(&format_args!("{}", self))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packing() {
        // V4L2_PIX_FMT_RGB24 is v4l2_fourcc('R', 'G', 'B', '3')
        assert_eq!(FourCC::RGB24.as_u32(), 0x3342_4752);
        assert_eq!(FourCC::from_u32(0x5659_5559), FourCC::YUYV);
        assert_eq!(u32::from(FourCC::from(b"NV12")), 0x3231_564e);
    }

    #[test]
    fn test_frame_size() {
        assert_eq!(FourCC::RGB24.frame_size(640, 480), Some(640 * 480 * 3));
        assert_eq!(FourCC::YUYV.frame_size(640, 480), Some(640 * 480 * 2));
        assert_eq!(FourCC::NV12.frame_size(4, 2), Some(12));
        assert_eq!(FourCC::MJPEG.frame_size(640, 480), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(FourCC::RGB24.to_string(), "RGB3");
        assert_eq!(FourCC([0xff, 0, 0, 0]).to_string(), "0x000000ff");
        assert_eq!(format!("{:?}", FourCC::YUYV), "FourCC(YUYV)");
    }

    #[test]
    fn test_try_from_string() {
        assert_eq!(FourCC::try_from("BGR3".to_string()), Ok(FourCC::BGR24));
        assert!(FourCC::try_from("RGB".to_string()).is_err());
    }
}
