use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageReader, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::path::Path;

use crate::constants::RESULT_JPEG_QUALITY;
use crate::detection::{DetectionBox, DetectorOutput};

const BOX_THICKNESS: i32 = 3;

// Cycled by class id
const BOX_COLORS: &[Rgb<u8>] = &[
    Rgb([34, 197, 94]),  // green
    Rgb([59, 130, 246]), // blue
    Rgb([234, 179, 8]),  // amber
    Rgb([239, 68, 68]),  // red
];

fn load_image(path: &Path) -> Result<DynamicImage> {
    ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .with_context(|| format!("Failed to decode image: {:?}", path))
}

/// Encodes an image as the JPEG that gets stored and sent to the browser.
pub fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut jpeg_data = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut jpeg_data, RESULT_JPEG_QUALITY);
    rgb.write_with_encoder(encoder)
        .with_context(|| "Failed to encode JPEG")?;
    Ok(jpeg_data)
}

/// Outlines every box on `img`, without labels or confidences.
pub fn draw_boxes(img: &mut RgbImage, boxes: &[DetectionBox]) {
    let (width, height) = (img.width() as f32, img.height() as f32);

    for detection in boxes {
        let x1 = detection.x1.max(0.0).min(width);
        let y1 = detection.y1.max(0.0).min(height);
        let x2 = detection.x2.max(0.0).min(width);
        let y2 = detection.y2.max(0.0).min(height);
        let (w, h) = ((x2 - x1) as u32, (y2 - y1) as u32);
        if w == 0 || h == 0 {
            continue;
        }

        let color = BOX_COLORS[detection.class_id as usize % BOX_COLORS.len()];
        for offset in 0..BOX_THICKNESS {
            let rect = Rect::at(x1 as i32 - offset, y1 as i32 - offset)
                .of_size(w + 2 * offset as u32, h + 2 * offset as u32);
            draw_hollow_rect_mut(img, rect, color);
        }
    }
}

/// The annotated JPEG for one upload: the model's own overlay when it wrote
/// one, otherwise the source image with the boxes drawn on it.
pub fn render_annotated(source: &Path, output: &DetectorOutput) -> Result<Vec<u8>> {
    if let Some(overlay) = &output.annotated {
        match load_image(overlay) {
            Ok(img) => return encode_jpeg(&img),
            Err(e) => tracing::warn!("Unreadable detector overlay, drawing boxes instead: {:#}", e),
        }
    }

    let mut canvas = load_image(source)?.to_rgb8();
    draw_boxes(&mut canvas, &output.boxes);
    encode_jpeg(&DynamicImage::ImageRgb8(canvas))
}
