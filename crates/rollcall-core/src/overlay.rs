//! Identification overlays drawn onto full-resolution frames.

use crate::types::{FaceLocation, Identity};
use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::Path;

const KNOWN_COLOUR: Rgb<u8> = Rgb([0, 255, 0]);
const UNKNOWN_COLOUR: Rgb<u8> = Rgb([255, 0, 0]);
const LABEL_TEXT_COLOUR: Rgb<u8> = Rgb([255, 255, 255]);
const BORDER_THICKNESS: u32 = 2;
const LABEL_STRIP_HEIGHT: u32 = 35;
const TEXT_INSET: i32 = 6;
const TEXT_SCALE: f32 = 24.0;

/// Well-known TrueType locations, tried in order.
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Regular.ttf",
    "/usr/share/fonts/truetype/freefont/FreeSans.ttf",
    "/usr/share/fonts/truetype/noto/NotoSans-Regular.ttf",
    "/usr/share/fonts/noto/NotoSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    r"C:\Windows\Fonts\arial.ttf",
];

/// Draws face boxes and name labels.
///
/// Label text needs a TrueType font; without one only boxes and label
/// strips are drawn.
pub struct Overlay {
    font: Option<FontVec>,
    scale: PxScale,
}

impl Overlay {
    pub fn new(font: Option<FontVec>) -> Self {
        Self { font, scale: PxScale::from(TEXT_SCALE) }
    }

    /// Load the label font from `path`, or from the first installed system
    /// font when no path is configured or the configured one is unusable.
    /// Without any font a warning is logged and labels are drawn without text.
    pub fn load(path: Option<&Path>) -> Self {
        if let Some(path) = path {
            match read_font(path) {
                Ok(font) => {
                    tracing::debug!(path = %path.display(), "label font loaded");
                    return Self::new(Some(font));
                }
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "cannot load label font; trying system fonts");
                }
            }
        }
        match system_font() {
            Some((path, font)) => {
                tracing::debug!(path, "system label font loaded");
                Self::new(Some(font))
            }
            None => {
                tracing::warn!("no usable label font found; overlays will not show names");
                Self::new(None)
            }
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw one annotation. `location` must already be in `image` coordinates.
    ///
    /// Recognized faces get a green box, a filled green strip along the
    /// bottom edge and the name in white. Unknown faces get a red box and
    /// red text.
    pub fn draw(&self, image: &mut RgbImage, location: &FaceLocation, identity: &Identity) {
        let (width, height) = (location.width(), location.height());
        if width == 0 || height == 0 {
            return;
        }
        let left = location.left as i32;
        let top = location.top as i32;
        let bottom = location.bottom as i32;

        let (colour, text_colour) = if identity.is_known() {
            (KNOWN_COLOUR, LABEL_TEXT_COLOUR)
        } else {
            (UNKNOWN_COLOUR, UNKNOWN_COLOUR)
        };

        for inset in 0..BORDER_THICKNESS {
            if width <= 2 * inset || height <= 2 * inset {
                break;
            }
            let rect = Rect::at(left + inset as i32, top + inset as i32)
                .of_size(width - 2 * inset, height - 2 * inset);
            draw_hollow_rect_mut(image, rect, colour);
        }

        if identity.is_known() {
            let strip = Rect::at(left, bottom - LABEL_STRIP_HEIGHT as i32).of_size(width, LABEL_STRIP_HEIGHT);
            draw_filled_rect_mut(image, strip, colour);
        }

        if let Some(font) = &self.font {
            let y = bottom - TEXT_INSET - self.scale.y as i32;
            draw_text_mut(image, text_colour, left + TEXT_INSET, y, self.scale, font, identity.label());
        }
    }
}

fn read_font(path: &Path) -> Result<FontVec, String> {
    let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
    FontVec::try_from_vec(bytes).map_err(|e| e.to_string())
}

/// First entry of [`SYSTEM_FONTS`] that exists and parses.
pub fn system_font() -> Option<(&'static str, FontVec)> {
    SYSTEM_FONTS
        .iter()
        .find_map(|&path| read_font(Path::new(path)).ok().map(|font| (path, font)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canvas() -> RgbImage {
        RgbImage::new(320, 240)
    }

    fn known() -> Identity {
        Identity::Known { name: "ALICE".into(), distance: 0.2 }
    }

    #[test]
    fn test_known_face_box_and_strip() {
        let mut image = canvas();
        let loc = FaceLocation::new(40, 200, 160, 20);
        Overlay::new(None).draw(&mut image, &loc, &known());

        assert_eq!(image.get_pixel(20, 40), &KNOWN_COLOUR);
        assert_eq!(image.get_pixel(21, 41), &KNOWN_COLOUR);
        assert_eq!(image.get_pixel(199, 100), &KNOWN_COLOUR);
        // Label strip along the bottom edge
        assert_eq!(image.get_pixel(100, 150), &KNOWN_COLOUR);
        // Interior above the strip stays untouched
        assert_eq!(image.get_pixel(100, 100), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_unknown_face_has_red_box_without_strip() {
        let mut image = canvas();
        let loc = FaceLocation::new(40, 200, 160, 20);
        Overlay::new(None).draw(&mut image, &loc, &Identity::Unknown);

        assert_eq!(image.get_pixel(20, 40), &UNKNOWN_COLOUR);
        assert_eq!(image.get_pixel(100, 150), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_box_partially_outside_frame_is_clipped() {
        let mut image = canvas();
        let loc = FaceLocation::new(200, 400, 300, 280);
        Overlay::new(None).draw(&mut image, &loc, &known());
        assert_eq!(image.get_pixel(280, 210), &KNOWN_COLOUR);
        assert_eq!(image.get_pixel(281, 230), &KNOWN_COLOUR);
    }

    #[test]
    fn test_degenerate_box_draws_nothing() {
        let mut image = canvas();
        Overlay::new(None).draw(&mut image, &FaceLocation::new(10, 10, 10, 10), &known());
        assert!(image.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn test_load_missing_font_falls_back_to_system_font() {
        let overlay = Overlay::load(Some(Path::new("/nonexistent/font.ttf")));
        assert_eq!(overlay.has_font(), system_font().is_some());
        assert_eq!(Overlay::load(None).has_font(), system_font().is_some());
    }

    #[test]
    fn test_known_label_text_is_white_inside_strip() {
        let Some((_, font)) = system_font() else {
            return;
        };
        let mut image = canvas();
        let loc = FaceLocation::new(40, 200, 160, 20);
        Overlay::new(Some(font)).draw(&mut image, &loc, &known());

        let strip_top = 160 - LABEL_STRIP_HEIGHT;
        let white = (22..198)
            .flat_map(|x| (strip_top..158).map(move |y| (x, y)))
            .filter(|&(x, y)| {
                let p = image.get_pixel(x, y).0;
                p[0] > 200 && p[2] > 200
            })
            .count();
        assert!(white > 20, "only {white} white label pixels");
    }

    #[test]
    fn test_unknown_label_text_is_red_inside_box() {
        let Some((_, font)) = system_font() else {
            return;
        };
        let mut image = canvas();
        let loc = FaceLocation::new(40, 200, 160, 20);
        Overlay::new(Some(font)).draw(&mut image, &loc, &Identity::Unknown);

        // Interior only: the 2px border is red regardless of text.
        let red = (22..198)
            .flat_map(|x| (42..158).map(move |y| (x, y)))
            .filter(|&(x, y)| {
                let p = image.get_pixel(x, y).0;
                p[0] > 200 && p[1] < 50
            })
            .count();
        assert!(red > 20, "only {red} red label pixels");
    }

    #[test]
    fn test_no_font_draws_no_text() {
        let mut image = canvas();
        let loc = FaceLocation::new(40, 200, 160, 20);
        Overlay::new(None).draw(&mut image, &loc, &known());
        let strip_top = 160 - LABEL_STRIP_HEIGHT;
        assert!((22..198).all(|x| (strip_top..158).all(|y| image.get_pixel(x, y) == &KNOWN_COLOUR)));
    }
}
