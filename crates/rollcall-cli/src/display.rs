//! Preview window for annotated frames.

use image::RgbImage;
use minifb::{Key, Window, WindowOptions};
use rollcall_core::FrameSink;

pub const WINDOW_TITLE: &str = "AI Attendance System";

/// A `minifb` window, opened on the first frame so it takes the frame's size.
///
/// Quits on `q`, Escape, or when the window is closed.
pub struct PreviewWindow {
    title: String,
    window: Option<Window>,
    size: (usize, usize),
    buffer: Vec<u32>,
}

impl PreviewWindow {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into(), window: None, size: (0, 0), buffer: Vec::new() }
    }

    fn window_for(&mut self, width: usize, height: usize) -> Result<&mut Window, minifb::Error> {
        let window = match self.window.take() {
            Some(window) if self.size == (width, height) => window,
            _ => {
                let mut window = Window::new(&self.title, width, height, WindowOptions::default())?;
                window.set_target_fps(60);
                tracing::debug!(width, height, "preview window opened");
                self.size = (width, height);
                window
            }
        };
        Ok(self.window.insert(window))
    }
}

impl FrameSink for PreviewWindow {
    type Error = minifb::Error;

    fn show(&mut self, frame: &RgbImage) -> Result<(), minifb::Error> {
        let (width, height) = (frame.width() as usize, frame.height() as usize);
        pack_rgb(frame, &mut self.buffer);
        let buffer = std::mem::take(&mut self.buffer);
        let result = self.window_for(width, height).and_then(|w| w.update_with_buffer(&buffer, width, height));
        self.buffer = buffer;
        result
    }

    fn quit_requested(&mut self) -> bool {
        match &self.window {
            Some(window) => !window.is_open() || window.is_key_down(Key::Q) || window.is_key_down(Key::Escape),
            None => false,
        }
    }
}

/// Pack RGB pixels into minifb's `0RGB` u32 layout, reusing `out`.
fn pack_rgb(frame: &RgbImage, out: &mut Vec<u32>) {
    out.clear();
    out.extend(
        frame
            .pixels()
            .map(|p| (u32::from(p[0]) << 16) | (u32::from(p[1]) << 8) | u32::from(p[2])),
    );
}
