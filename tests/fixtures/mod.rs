//! Test fixtures: sample chat messages, detections and images

#![allow(dead_code)]

use detect_relay::models::chat::{IncomingMessage, PhotoAttachment};
use detect_relay::models::job::OriginId;
use detect_relay::models::label::RawDetection;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

pub const ORIGIN: &str = "chat42";
pub const ATTACHMENT_ID: &str = "A1";

/// A dog in the middle of the frame (COCO class 16).
pub const DOG: RawDetection = RawDetection {
    class_index: 16,
    cx: 0.5,
    cy: 0.5,
    width: 0.3,
    height: 0.4,
};

pub const PERSON: RawDetection = RawDetection {
    class_index: 0,
    cx: 0.25,
    cy: 0.6,
    width: 0.2,
    height: 0.7,
};

/// Class index past the end of the vocabulary.
pub const CORRUPT: RawDetection = RawDetection {
    class_index: 91,
    cx: 0.5,
    cy: 0.5,
    width: 0.1,
    height: 0.1,
};

/// A small gray JPEG, the format chat platforms deliver photos in.
pub fn jpeg_photo() -> Vec<u8> {
    encode(ImageFormat::Jpeg)
}

pub fn png_photo() -> Vec<u8> {
    encode(ImageFormat::Png)
}

fn encode(format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_pixel(64, 48, Rgb([128, 128, 128]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, format)
        .expect("encode fixture image");
    out.into_inner()
}

pub fn photo_message(origin: &str, unique_id: &str) -> IncomingMessage {
    IncomingMessage {
        origin_id: OriginId::new(origin),
        photo: Some(PhotoAttachment {
            file_id: format!("file-{unique_id}"),
            unique_id: unique_id.to_string(),
        }),
        text: None,
    }
}

pub fn text_message(origin: &str, text: &str) -> IncomingMessage {
    IncomingMessage {
        origin_id: OriginId::new(origin),
        photo: None,
        text: Some(text.to_string()),
    }
}
