//! V4L2 camera capture via the `v4l` crate.
//!
//! The device and its mmap stream are owned by [`Camera`]; dropping the
//! camera stops streaming and closes the device on every exit path.

use crate::frame::{self, FrameError};
use image::RgbImage;
use rollcall_core::FrameSource;
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const REQUESTED_WIDTH: u32 = 640;
const REQUESTED_HEIGHT: u32 = 480;
const STREAM_BUFFERS: u32 = 4;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error("frame conversion failed: {0}")]
    Frame(#[from] FrameError),
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// Motion-JPEG, one JPEG image per buffer.
    Mjpg,
    /// 8-bit grayscale (1 byte/pixel).
    Grey,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(Self::Yuyv),
            b"MJPG" => Some(Self::Mjpg),
            b"GREY" => Some(Self::Grey),
            _ => None,
        }
    }
}

/// Turn a camera argument into a device path: a bare index `N` means
/// `/dev/videoN`, anything else is used as given.
pub fn resolve_device(device: &str) -> String {
    let device = device.trim();
    match device.parse::<u32>() {
        Ok(index) => format!("/dev/video{index}"),
        Err(_) => device.to_string(),
    }
}

/// V4L2 camera with an active capture stream.
///
/// The stream holds its own handle to the device, so the device stays open
/// exactly as long as the camera does.
pub struct Camera {
    stream: MmapStream<'static>,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pixel_format: PixelFormat,
    last_sequence: Option<u32>,
}

impl Camera {
    /// Open a V4L2 camera device by path (e.g., "/dev/video0") and start streaming.
    pub fn open(device_path: &str) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.raw_os_error() == Some(16) || e.to_string().contains("busy") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device
            .query_caps()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to query capabilities: {e}")))?;

        tracing::info!(device = device_path, driver = %caps.driver, card = %caps.card, "opened camera");

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        // Ask for YUYV at 640x480; accept MJPG or GREY if the driver insists.
        let mut fmt = device
            .format()
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("failed to get format: {e}")))?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = REQUESTED_WIDTH;
        fmt.height = REQUESTED_HEIGHT;

        let negotiated = device
            .set_format(&fmt)
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("failed to set format: {e}")))?;

        let fourcc = negotiated.fourcc;
        let pixel_format = PixelFormat::from_fourcc(fourcc).ok_or_else(|| {
            CameraError::FormatNegotiationFailed(format!("unsupported pixel format: {fourcc:?} (need YUYV, MJPG, or GREY)"))
        })?;

        tracing::info!(width = negotiated.width, height = negotiated.height, fourcc = ?fourcc, "negotiated format");

        let stream = MmapStream::with_buffers(&device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| CameraError::CaptureFailed(format!("failed to create mmap stream: {e}")))?;

        Ok(Self {
            stream,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            pixel_format,
            last_sequence: None,
        })
    }

    /// Capture one frame and convert it to RGB.
    pub fn capture_frame(&mut self) -> Result<RgbImage, CameraError> {
        let (buf, meta) = self
            .stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        let dropped = dropped_frames(self.last_sequence, meta.sequence);
        if dropped > 0 {
            tracing::debug!(sequence = meta.sequence, dropped, "driver dropped frames");
        }
        self.last_sequence = Some(meta.sequence);
        tracing::trace!(sequence = meta.sequence, bytes = meta.bytesused, "frame dequeued");

        // Some drivers report zero bytesused for raw formats.
        let used = meta.bytesused as usize;
        let payload = if used == 0 || used > buf.len() { buf } else { &buf[..used] };
        to_rgb(self.pixel_format, payload, self.width, self.height)
    }

    /// Discard frames while auto-exposure settles.
    pub fn discard_frames(&mut self, count: usize) -> Result<(), CameraError> {
        if count > 0 {
            tracing::info!(count, "discarding warmup frames");
        }
        for _ in 0..count {
            self.capture_frame()?;
        }
        Ok(())
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        (0..16)
            .map(|i| format!("/dev/video{i}"))
            .filter(|path| Path::new(path).exists())
            .filter_map(|path| {
                let dev = Device::with_path(&path).ok()?;
                let caps = dev.query_caps().ok()?;
                if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                    return None;
                }
                Some(DeviceInfo {
                    path,
                    name: caps.card.clone(),
                    driver: caps.driver.clone(),
                    bus: caps.bus.clone(),
                })
            })
            .collect()
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        tracing::info!(device = %self.device_path, "camera released");
    }
}

impl FrameSource for Camera {
    type Error = CameraError;

    fn next_frame(&mut self) -> Result<Option<RgbImage>, CameraError> {
        Ok(Some(self.capture_frame()?))
    }
}

/// Frames skipped between two dequeued buffers, from the driver's sequence counter.
fn dropped_frames(last: Option<u32>, current: u32) -> u32 {
    match last {
        Some(last) => current.wrapping_sub(last).saturating_sub(1),
        None => 0,
    }
}

fn to_rgb(format: PixelFormat, buf: &[u8], width: u32, height: u32) -> Result<RgbImage, CameraError> {
    let image = match format {
        PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, width, height)?,
        PixelFormat::Grey => frame::grey_to_rgb(buf, width, height)?,
        PixelFormat::Mjpg => frame::mjpeg_to_rgb(buf)?,
    };
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_device_index() {
        assert_eq!(resolve_device("0"), "/dev/video0");
        assert_eq!(resolve_device(" 2 "), "/dev/video2");
    }

    #[test]
    fn test_resolve_device_path_passthrough() {
        assert_eq!(resolve_device("/dev/v4l/by-id/usb-cam"), "/dev/v4l/by-id/usb-cam");
    }

    #[test]
    fn test_pixel_format_from_fourcc() {
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"YUYV")), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"MJPG")), Some(PixelFormat::Mjpg));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"GREY")), Some(PixelFormat::Grey));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"Y16 ")), None);
    }

    #[test]
    fn test_open_missing_device() {
        let result = Camera::open("/dev/rollcall-missing-video");
        assert!(matches!(result, Err(CameraError::DeviceNotFound(_))));
    }

    #[test]
    fn test_dropped_frames_from_sequence() {
        assert_eq!(dropped_frames(None, 7), 0);
        assert_eq!(dropped_frames(Some(7), 8), 0);
        assert_eq!(dropped_frames(Some(7), 10), 2);
        assert_eq!(dropped_frames(Some(u32::MAX), 1), 1);
    }

    #[test]
    fn test_to_rgb_dispatches_on_format() {
        let image = to_rgb(PixelFormat::Grey, &[10, 20], 2, 1).unwrap();
        assert_eq!(image.get_pixel(1, 0).0, [20, 20, 20]);
        assert!(matches!(
            to_rgb(PixelFormat::Yuyv, &[0, 0], 2, 1),
            Err(CameraError::Frame(FrameError::InvalidLength { .. }))
        ));
    }
}
