//! Object geometry extraction from raw annotation records.
//!
//! Two record shapes are understood: polygon records (JSON with per-object
//! point lists) and single-channel class-index masks. Both produce
//! [`Object`]s whose geometry reports pixel-space bounds.

use image::{DynamicImage, GrayImage};
use imageproc::contours::{find_contours, BorderType};
use log::warn;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::{Result, SubsetError};
use crate::types::{ClassKey, PolygonRecord, RawObject, TargetClasses};

/// A raw annotation record, dispatched by shape.
#[derive(Debug, Clone)]
pub enum RawAnnotation {
    Polygon(PolygonRecord),
    Mask(GrayImage),
}

impl RawAnnotation {
    /// Load an annotation record, choosing the decoder from the file extension.
    pub fn load(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "json" => {
                let reader = BufReader::new(File::open(path)?);
                serde_json::from_reader(reader)
                    .map(RawAnnotation::Polygon)
                    .map_err(|e| SubsetError::unsupported(path, e.to_string()))
            }
            "png" => {
                let decoded = image::open(path)
                    .map_err(|e| SubsetError::unsupported(path, e.to_string()))?;
                match decoded {
                    DynamicImage::ImageLuma8(mask) => Ok(RawAnnotation::Mask(mask)),
                    other => Err(SubsetError::unsupported(
                        path,
                        format!("expected an 8-bit single-channel mask, found {:?}", other.color()),
                    )),
                }
            }
            _ => Err(SubsetError::unsupported(
                path,
                "neither a polygon record nor a mask image",
            )),
        }
    }

    /// Width and height of the annotated frame in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            RawAnnotation::Polygon(record) => (record.img_width, record.img_height),
            RawAnnotation::Mask(mask) => mask.dimensions(),
        }
    }

    /// Distinct classes present: labels for polygon records, nonzero class
    /// indices for masks.
    pub fn classes_present(&self) -> BTreeSet<ClassKey> {
        match self {
            RawAnnotation::Polygon(record) => record.labels(),
            RawAnnotation::Mask(mask) => {
                let mut seen = [false; 256];
                for pixel in mask.as_raw() {
                    seen[*pixel as usize] = true;
                }
                (1..=u8::MAX)
                    .filter(|&index| seen[index as usize])
                    .map(ClassKey::Index)
                    .collect()
            }
        }
    }
}

/// Axis-aligned bounds in pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelBounds {
    pub x_min: f64,
    pub y_min: f64,
    pub width: f64,
    pub height: f64,
}

impl PixelBounds {
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn is_degenerate(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Restrict the bounds to a `width` x `height` frame.
    pub fn clamp_to(&self, width: u32, height: u32) -> PixelBounds {
        let (w, h) = (width as f64, height as f64);
        let x_min = self.x_min.clamp(0.0, w);
        let y_min = self.y_min.clamp(0.0, h);
        let x_max = (self.x_min + self.width).clamp(0.0, w);
        let y_max = (self.y_min + self.height).clamp(0.0, h);
        PixelBounds {
            x_min,
            y_min,
            width: x_max - x_min,
            height: y_max - y_min,
        }
    }
}

/// Object geometry in pixel space.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// Ordered polygon vertices.
    Polygon(Vec<(f64, f64)>),
    /// Border pixels of one external mask contour.
    Contour(Vec<(u32, u32)>),
}

impl Geometry {
    /// Polygons span `max - min`; contours span whole pixels, so their
    /// extent is `max - min + 1`.
    pub fn pixel_bounds(&self) -> PixelBounds {
        match self {
            Geometry::Polygon(points) => {
                if points.is_empty() {
                    return PixelBounds {
                        x_min: 0.0,
                        y_min: 0.0,
                        width: 0.0,
                        height: 0.0,
                    };
                }
                let (x_min, y_min, x_max, y_max) = points.iter().fold(
                    (f64::MAX, f64::MAX, f64::MIN, f64::MIN),
                    |(x_min, y_min, x_max, y_max), &(x, y)| {
                        (x_min.min(x), y_min.min(y), x_max.max(x), y_max.max(y))
                    },
                );
                PixelBounds {
                    x_min,
                    y_min,
                    width: x_max - x_min,
                    height: y_max - y_min,
                }
            }
            Geometry::Contour(points) => {
                if points.is_empty() {
                    return PixelBounds {
                        x_min: 0.0,
                        y_min: 0.0,
                        width: 0.0,
                        height: 0.0,
                    };
                }
                let (x_min, y_min, x_max, y_max) = points.iter().fold(
                    (u32::MAX, u32::MAX, 0, 0),
                    |(x_min, y_min, x_max, y_max), &(x, y)| {
                        (x_min.min(x), y_min.min(y), x_max.max(x), y_max.max(y))
                    },
                );
                PixelBounds {
                    x_min: x_min as f64,
                    y_min: y_min as f64,
                    width: (x_max - x_min + 1) as f64,
                    height: (y_max - y_min + 1) as f64,
                }
            }
        }
    }
}

/// One object of interest found in a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub class: ClassKey,
    pub geometry: Geometry,
}

/// Extract every object whose class is one of `targets`.
pub fn extract(annotation: &RawAnnotation, targets: &TargetClasses) -> Vec<Object> {
    match annotation {
        RawAnnotation::Polygon(record) => record
            .objects
            .iter()
            .filter_map(|object| {
                let class = ClassKey::Label(object.label.clone());
                if !targets.contains(&class) {
                    return None;
                }
                match object_points(object) {
                    Some(points) => Some(Object {
                        class,
                        geometry: Geometry::Polygon(points),
                    }),
                    None => {
                        warn!(
                            "Object '{}' in frame {:?} has no polygon, polyline or bounding box",
                            object.label, record.frame
                        );
                        None
                    }
                }
            })
            .collect(),
        RawAnnotation::Mask(mask) => targets
            .keys()
            .filter_map(|key| match key {
                ClassKey::Index(index) => Some(*index),
                ClassKey::Label(_) => None,
            })
            .flat_map(|index| {
                extract_mask_contours(mask, index)
                    .into_iter()
                    .map(move |contour| Object {
                        class: ClassKey::Index(index),
                        geometry: Geometry::Contour(contour),
                    })
            })
            .collect(),
    }
}

fn object_points(object: &RawObject) -> Option<Vec<(f64, f64)>> {
    if let Some(polygon) = &object.polygon {
        return Some(polygon.clone());
    }
    if let Some([x1, y1, x2, y2]) = object.boundingbox {
        return Some(vec![(x1, y1), (x2, y1), (x2, y2), (x1, y2)]);
    }
    object.polyline.clone()
}

/// External contours of all regions whose pixels equal `class_index`.
/// Holes and regions nested inside holes are ignored.
pub fn extract_mask_contours(mask: &GrayImage, class_index: u8) -> Vec<Vec<(u32, u32)>> {
    let binary = GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        if mask.get_pixel(x, y)[0] == class_index {
            image::Luma([255u8])
        } else {
            image::Luma([0u8])
        }
    });

    find_contours::<u32>(&binary)
        .into_iter()
        .filter(|contour| contour.border_type == BorderType::Outer && contour.parent.is_none())
        .map(|contour| contour.points.iter().map(|p| (p.x, p.y)).collect())
        .collect()
}
