//! Draw detections onto frames.
//!
use std::{fs, path::Path};

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
    rect::Rect,
};
use rusttype::{Font, Scale};

use crate::{BoundingBox, Detection};

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 255]);
const TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
const LINE_WIDTH: i32 = 4;
const FONT_SIZE: f32 = 16.0;

/// Renders boxes with a caption of label and confidence.
pub struct Annotator {
    font: Option<Font<'static>>,
    scale: Scale,
}

impl Annotator {
    /// Without a font only the boxes are drawn.
    pub fn new(font: Option<Font<'static>>) -> Self {
        Self {
            font,
            scale: Scale::uniform(FONT_SIZE),
        }
    }

    pub fn from_font_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read(path.as_ref())?;
        let font = Font::try_from_vec(data)
            .ok_or_else(|| anyhow!("{} is not a usable font", path.as_ref().display()))?;

        Ok(Self::new(Some(font)))
    }

    pub fn draw(&self, frame: &mut RgbImage, detections: &[Detection]) {
        let (width, height) = frame.dimensions();
        let boxes: Vec<_> = detections
            .iter()
            .filter_map(|detection| {
                pixel_rect(&detection.bbox, width, height).map(|rect| (rect, detection))
            })
            .collect();

        for (rect, detection) in boxes.iter() {
            draw_thick_rect(frame, *rect);

            if let Some(font) = &self.font {
                let (text_width, text_height) =
                    text_size(self.scale, font, &detection.display_text());
                let background = Rect::at(rect.left(), rect.top())
                    .of_size((text_width + 4).max(1) as u32, (text_height + 4).max(1) as u32);
                draw_filled_rect_mut(frame, background, BOX_COLOR);
            }
        }

        // Captions go last so that no box is drawn over them
        if let Some(font) = &self.font {
            for (rect, detection) in boxes.iter() {
                draw_text_mut(
                    frame,
                    TEXT_COLOR,
                    rect.left(),
                    rect.top(),
                    self.scale,
                    font,
                    &detection.display_text(),
                );
            }
        }
    }
}

fn draw_thick_rect(frame: &mut RgbImage, rect: Rect) {
    for inset in 0..LINE_WIDTH {
        let (width, height) = (rect.width() as i32 - 2 * inset, rect.height() as i32 - 2 * inset);
        if width < 1 || height < 1 {
            break;
        }
        let inner = Rect::at(rect.left() + inset, rect.top() + inset).of_size(width as u32, height as u32);
        draw_hollow_rect_mut(frame, inner, BOX_COLOR);
    }
}

/// Integer rectangle of a box, clipped to the frame.
///
/// Inverted boxes are drawn over the area their corners span. Boxes with no
/// visible area yield `None`.
pub fn pixel_rect(bbox: &BoundingBox, frame_width: u32, frame_height: u32) -> Option<Rect> {
    let (x_min, y_min, x_max, y_max) = bbox.corners();

    let left = x_min.max(0.0).round() as i64;
    let top = y_min.max(0.0).round() as i64;
    let right = x_max.min(frame_width as f32).round() as i64;
    let bottom = y_max.min(frame_height as f32).round() as i64;

    let (width, height) = (right - left, bottom - top);
    if width < 1 || height < 1 {
        return None;
    }

    Some(Rect::at(left as i32, top as i32).of_size(width as u32, height as u32))
}
