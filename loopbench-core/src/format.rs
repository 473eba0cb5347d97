//! Pixel Formats
//!
//! The small set of pixel formats the benchmark scenarios request, and the
//! negotiated format a device reports back.

use crate::capture::CaptureError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pixel format requested from a capture device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PixelFormat {
    /// Motion JPEG
    Mjpeg,
    /// Packed YUV 4:2:2
    Yuyv,
    /// H.264 elementary stream
    H264,
}

impl PixelFormat {
    /// All supported formats, in display order
    pub const ALL: [PixelFormat; 3] = [PixelFormat::Mjpeg, PixelFormat::Yuyv, PixelFormat::H264];

    /// V4L2 fourcc code
    pub fn fourcc(self) -> [u8; 4] {
        match self {
            PixelFormat::Mjpeg => *b"MJPG",
            PixelFormat::Yuyv => *b"YUYV",
            PixelFormat::H264 => *b"H264",
        }
    }

    /// Name as accepted on the command line
    pub fn name(self) -> &'static str {
        match self {
            PixelFormat::Mjpeg => "MJPEG",
            PixelFormat::Yuyv => "YUYV",
            PixelFormat::H264 => "H264",
        }
    }

    /// Rough size in bytes of one frame, used by software sources.
    pub fn estimated_frame_size(self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            PixelFormat::Yuyv => pixels * 2,
            PixelFormat::Mjpeg => (pixels / 4).max(1),
            PixelFormat::H264 => (pixels / 8).max(1),
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelFormat {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PixelFormat::ALL
            .into_iter()
            .find(|format| format.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CaptureError::UnknownFormat(s.to_string()))
    }
}

/// Format actually negotiated with the device
///
/// Drivers may adjust requested values, so this is read back after opening
/// and only used for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatInfo {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Fourcc code reported by the driver
    pub fourcc: [u8; 4],
    /// Bytes per image line
    pub bytes_per_line: u32,
    /// Maximum size of one image in bytes
    pub size_image: u32,
}

impl FormatInfo {
    /// Fourcc as printable text
    pub fn fourcc_str(&self) -> String {
        String::from_utf8_lossy(&self.fourcc).into_owned()
    }
}

impl fmt::Display for FormatInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} {}, bytesperline={}, sizeimage={}",
            self.width,
            self.height,
            self.fourcc_str(),
            self.bytes_per_line,
            self.size_image
        )
    }
}
