//! Map viewport for a set of pins

use crate::consensus::BoundingBox;
use pinpoint_common::Coordinate;
use serde::{Deserialize, Serialize};

/// Zoom used when only one point is shown
pub const SINGLE_POINT_ZOOM: u8 = 16;

/// (max span in degrees, zoom), widest first
const ZOOM_BREAKPOINTS: [(f64, u8); 4] = [(0.02, 13), (0.01, 14), (0.005, 15), (0.002, 16)];
const CLOSEST_ZOOM: u8 = 17;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub center: Coordinate,
    pub zoom: u8,
}

/// Zoom level for a bounding-box span
pub fn zoom_for_span(max_span_deg: f64) -> u8 {
    ZOOM_BREAKPOINTS
        .iter()
        .find(|(span, _)| max_span_deg > *span)
        .map(|(_, zoom)| *zoom)
        .unwrap_or(CLOSEST_ZOOM)
}

/// Center and zoom that frame every point; `None` without points
pub fn viewport(points: &[Coordinate]) -> Option<Viewport> {
    match points {
        [] => None,
        [only] => Some(Viewport {
            center: *only,
            zoom: SINGLE_POINT_ZOOM,
        }),
        many => {
            let bbox = BoundingBox::of(many.iter().copied())?;
            Some(Viewport {
                center: bbox.center(),
                zoom: zoom_for_span(bbox.max_span()),
            })
        }
    }
}
