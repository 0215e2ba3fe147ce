use log::debug;

use crate::error::{Result, SubsetError};
use crate::geometry::{extract, Object, PixelBounds, RawAnnotation};
use crate::types::TargetClasses;

/// A class-tagged box in image-relative coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub class_id: usize,
    pub x_center: f64,
    pub y_center: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn is_degenerate(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// One YOLO label line, newline-terminated.
    pub fn to_yolo_line(&self) -> String {
        format!(
            "{} {:.6} {:.6} {:.6} {:.6}\n",
            self.class_id, self.x_center, self.y_center, self.width, self.height
        )
    }
}

/// Which boxes survive into a label file.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoxPolicy {
    /// Boxes whose pixel area is below this are dropped
    pub min_area: u64,
    pub drop_degenerate: bool,
}

impl BoxPolicy {
    pub fn keeps(&self, bounds: &PixelBounds) -> bool {
        if self.drop_degenerate && bounds.is_degenerate() {
            return false;
        }
        bounds.area() >= self.min_area as f64
    }
}

/// Calculate the normalized (x_center, y_center, width, height) of pixel bounds
pub fn calculate_bounding_box(
    bounds: &PixelBounds,
    frame_width: u32,
    frame_height: u32,
) -> Result<(f64, f64, f64, f64)> {
    if frame_width == 0 || frame_height == 0 {
        return Err(SubsetError::DivisionUndefined {
            width: frame_width,
            height: frame_height,
        });
    }
    let bounds = bounds.clamp_to(frame_width, frame_height);
    let (frame_width, frame_height) = (frame_width as f64, frame_height as f64);

    let width = bounds.width / frame_width;
    let height = bounds.height / frame_height;
    let x_center = bounds.x_min / frame_width + width / 2.0;
    let y_center = bounds.y_min / frame_height + height / 2.0;

    Ok((x_center, y_center, width, height))
}

/// Convert one object into a normalized bounding box
pub fn normalize(
    object: &Object,
    class_id: usize,
    frame_width: u32,
    frame_height: u32,
) -> Result<BoundingBox> {
    let (x_center, y_center, width, height) =
        calculate_bounding_box(&object.geometry.pixel_bounds(), frame_width, frame_height)?;
    Ok(BoundingBox {
        class_id,
        x_center,
        y_center,
        width,
        height,
    })
}

/// Extract and normalize every target object of a frame, applying `policy`.
pub fn frame_boxes(
    annotation: &RawAnnotation,
    targets: &TargetClasses,
    policy: &BoxPolicy,
) -> Result<Vec<BoundingBox>> {
    let (frame_width, frame_height) = annotation.dimensions();
    let mut boxes = Vec::new();

    for object in extract(annotation, targets) {
        let class_id = match targets.class_id(&object.class) {
            Some(class_id) => class_id,
            None => continue,
        };
        let bounds = object
            .geometry
            .pixel_bounds()
            .clamp_to(frame_width, frame_height);
        if !policy.keeps(&bounds) {
            debug!(
                "Dropping {} box with pixel area {} (min_area {})",
                object.class,
                bounds.area(),
                policy.min_area
            );
            continue;
        }
        boxes.push(normalize(&object, class_id, frame_width, frame_height)?);
    }

    Ok(boxes)
}

/// Serialize boxes in YOLO format, one line per box
pub fn convert_to_yolo_format(boxes: &[BoundingBox]) -> String {
    let mut yolo_data = String::with_capacity(boxes.len() * 48);
    for bbox in boxes {
        yolo_data.push_str(&bbox.to_yolo_line());
    }
    yolo_data
}
