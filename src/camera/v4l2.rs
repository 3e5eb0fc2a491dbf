//! V4L2 camera source.
//!
//! Opens a local device node (e.g. /dev/video0), negotiates the ideal
//! resolution in RGB3 when the driver allows it, and hands out RGB frames from
//! an mmap stream. Drivers that refuse RGB3 are read in their native NV12 or
//! YUYV format and converted in memory.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::{CameraConstraints, CameraSource, CameraStream};
use crate::frame::Frame;

const MMAP_BUFFERS: u32 = 4;

pub struct V4l2Camera {
    device: String,
}

impl V4l2Camera {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }
}

impl CameraSource for V4l2Camera {
    fn describe(&self) -> String {
        self.device.clone()
    }

    fn open(&mut self, constraints: &CameraConstraints) -> Result<Box<dyn CameraStream>> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.device)
            .with_context(|| format!("open v4l2 device {}", self.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = constraints.ideal_width;
        format.height = constraints.ideal_height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Camera: failed to set format on {}: {}",
                    self.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        let pixel_format = pixel_format_for(&format.fourcc.repr)?;

        if constraints.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(constraints.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!("V4l2Camera: failed to set fps on {}: {}", self.device, err);
            }
        }

        // V4L2 exposes no facing direction; the device path decides which camera is used.
        log::debug!(
            "V4l2Camera: facing mode '{}' is advisory for {}",
            constraints.facing_mode,
            self.device
        );

        let state = DeviceStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, MMAP_BUFFERS)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "V4l2Camera: streaming {} ({}x{} {:?})",
            self.device,
            format.width,
            format.height,
            pixel_format
        );
        Ok(Box::new(V4l2Stream {
            device: self.device.clone(),
            state: Some(state),
            width: format.width,
            height: format.height,
            pixel_format,
        }))
    }
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

struct V4l2Stream {
    device: String,
    state: Option<DeviceState>,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
}

impl CameraStream for V4l2Stream {
    fn next_frame(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let state = self
            .state
            .as_mut()
            .ok_or_else(|| anyhow!("v4l2 stream on {} has been stopped", self.device))?;
        let expected = self.pixel_format.frame_len(self.width, self.height)?;
        let (width, height, format) = (self.width, self.height, self.pixel_format);
        let pixels = state.with_mut(|fields| -> Result<Vec<u8>> {
            let (buf, _meta) = fields.stream.next().context("capture v4l2 frame")?;
            let data = buf.get(..expected).ok_or_else(|| {
                anyhow!("short v4l2 buffer: {} < {} bytes", buf.len(), expected)
            })?;
            normalize_to_rgb(data, width, height, format)
        })?;
        Frame::from_rgb(pixels, self.width, self.height)
    }

    fn stop_tracks(&mut self) {
        // Dropping the mmap stream issues STREAMOFF and releases the buffers.
        if self.state.take().is_some() {
            log::debug!("V4l2Camera: released {}", self.device);
        }
    }

    fn is_live(&self) -> bool {
        self.state.is_some()
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

fn pixel_format_for(fourcc: &[u8; 4]) -> Result<PixelFormat> {
    match fourcc {
        b"RGB3" => Ok(PixelFormat::Rgb24),
        b"NV12" => Ok(PixelFormat::Nv12),
        b"YUYV" => Ok(PixelFormat::Yuyv),
        other => Err(anyhow!(
            "unsupported v4l2 pixel format {}",
            String::from_utf8_lossy(other)
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_fourccs() {
        assert_eq!(pixel_format_for(b"RGB3").unwrap(), PixelFormat::Rgb24);
        assert_eq!(pixel_format_for(b"NV12").unwrap(), PixelFormat::Nv12);
        assert_eq!(pixel_format_for(b"YUYV").unwrap(), PixelFormat::Yuyv);
        assert!(pixel_format_for(b"MJPG").is_err());
    }

    #[test]
    fn missing_device_fails_to_open() {
        let mut camera = V4l2Camera::new("/dev/does-not-exist-video");
        assert!(camera.open(&CameraConstraints::default()).is_err());
    }
}
