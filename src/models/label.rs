use garde::Validate;
use serde::{Deserialize, Serialize};

/// Closed object vocabulary of the detection model (COCO, 80 classes),
/// indexed by the class index the detector reports.
pub const CLASS_NAMES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// Look up a class name by detector index.
pub fn class_name(index: i64) -> Option<&'static str> {
    usize::try_from(index)
        .ok()
        .and_then(|i| CLASS_NAMES.get(i))
        .copied()
}

/// One detection as reported by the detector, before translation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RawDetection {
    #[garde(skip)]
    pub class_index: i64,

    #[garde(range(min = 0.0, max = 1.0))]
    pub cx: f64,

    #[garde(range(min = 0.0, max = 1.0))]
    pub cy: f64,

    #[garde(range(min = 0.0, max = 1.0))]
    pub width: f64,

    #[garde(range(min = 0.0, max = 1.0))]
    pub height: f64,
}

/// One detected object in normalized box coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionLabel {
    pub class: String,
    pub cx: f64,
    pub cy: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum LabelError {
    #[error("class index {0} is outside the {len}-class vocabulary", len = CLASS_NAMES.len())]
    UnknownClass(i64),

    #[error("box coordinates out of bounds: {0}")]
    OutOfBounds(String),
}

impl TryFrom<&RawDetection> for DetectionLabel {
    type Error = LabelError;

    fn try_from(raw: &RawDetection) -> Result<Self, Self::Error> {
        let class = class_name(raw.class_index).ok_or(LabelError::UnknownClass(raw.class_index))?;

        let coords = [raw.cx, raw.cy, raw.width, raw.height];
        if coords.iter().any(|c| !c.is_finite()) {
            return Err(LabelError::OutOfBounds("non-finite coordinate".to_string()));
        }
        raw.validate()
            .map_err(|report| LabelError::OutOfBounds(report.to_string()))?;

        Ok(Self {
            class: class.to_string(),
            cx: raw.cx,
            cy: raw.cy,
            width: raw.width,
            height: raw.height,
        })
    }
}

/// Translate detector output into labels, preserving detector order.
/// A single bad detection rejects the whole batch.
pub fn translate(raw: &[RawDetection]) -> Result<Vec<DetectionLabel>, LabelError> {
    raw.iter().map(DetectionLabel::try_from).collect()
}
