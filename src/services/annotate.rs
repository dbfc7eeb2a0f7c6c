use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

use crate::models::label::RawDetection;

const PALETTE: [Rgb<u8>; 8] = [
    Rgb([255, 56, 56]),
    Rgb([255, 157, 151]),
    Rgb([255, 112, 31]),
    Rgb([255, 178, 29]),
    Rgb([72, 249, 10]),
    Rgb([26, 147, 52]),
    Rgb([0, 194, 255]),
    Rgb([132, 56, 255]),
];

/// Annotated image artifact, encoded in the source image's format.
#[derive(Debug, Clone)]
pub struct AnnotatedImage {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

/// Draw one rectangle outline per detection onto a copy of the image.
pub fn annotate(
    image_bytes: &[u8],
    detections: &[RawDetection],
) -> Result<AnnotatedImage, AnnotateError> {
    let format = image::guess_format(image_bytes).map_err(AnnotateError::Decode)?;
    let mut canvas = image::load_from_memory_with_format(image_bytes, format)
        .map_err(AnnotateError::Decode)?
        .to_rgb8();

    for detection in detections {
        draw_box(&mut canvas, detection);
    }

    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(canvas)
        .write_to(&mut out, format)
        .map_err(AnnotateError::Encode)?;

    Ok(AnnotatedImage {
        bytes: out.into_inner(),
        content_type: format.to_mime_type(),
    })
}

/// MIME type and file extension for a recognised image, if any.
pub fn sniff(image_bytes: &[u8]) -> Option<(&'static str, &'static str)> {
    let format = image::guess_format(image_bytes).ok()?;
    let extension = match format {
        ImageFormat::Jpeg => "jpg",
        ImageFormat::Png => "png",
        ImageFormat::WebP => "webp",
        _ => return None,
    };
    Some((format.to_mime_type(), extension))
}

fn draw_box(canvas: &mut RgbImage, detection: &RawDetection) {
    let (w, h) = canvas.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let color = PALETTE[detection.class_index.rem_euclid(PALETTE.len() as i64) as usize];
    let thickness = (w.min(h) / 150).max(2);

    let to_px = |v: f64, max: u32| -> u32 { (v * max as f64).clamp(0.0, (max - 1) as f64) as u32 };
    let x0 = to_px(detection.cx - detection.width / 2.0, w);
    let x1 = to_px(detection.cx + detection.width / 2.0, w);
    let y0 = to_px(detection.cy - detection.height / 2.0, h);
    let y1 = to_px(detection.cy + detection.height / 2.0, h);

    for y in y0..=y1 {
        for x in x0..=x1 {
            let on_edge = x < x0 + thickness
                || x + thickness > x1
                || y < y0 + thickness
                || y + thickness > y1;
            if on_edge {
                canvas.put_pixel(x, y, color);
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AnnotateError {
    #[error("Failed to decode image: {0}")]
    Decode(image::ImageError),

    #[error("Failed to encode annotated image: {0}")]
    Encode(image::ImageError),
}
