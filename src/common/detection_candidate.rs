use serde::ser::{Serialize, SerializeSeq, Serializer};

use crate::common::BoxEncoding;

/// One scored box taking part in non-maximum suppression.
///
/// Corners and area are fixed at construction; only the score changes
/// (soft-NMS decay).
#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub struct DetectionCandidate {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    area: f32,
    pub score: f32,
    pub index: Option<usize>,
}

impl DetectionCandidate {
    /// Builds a candidate from four encoded numbers.
    pub fn new(encoding: BoxEncoding, encoded: [f32; 4], score: f32) -> Self {
        let [a, b, c, d] = encoded;
        let candidate = match encoding {
            BoxEncoding::CenterExtent => Self::default().with_cxcy_wh(a, b, c, d),
            BoxEncoding::CornerExtent => Self::default().with_x1y1_wh(a, b, c, d),
            BoxEncoding::CornerCorner => Self::default().with_x1y1_x2y2(a, b, c, d),
        };
        candidate.with_score(score)
    }

    /// Sets the box from `(x1, y1, x2, y2)` and recomputes the area.
    pub fn with_x1y1_x2y2(mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        self.x1 = x1;
        self.y1 = y1;
        self.x2 = x2;
        self.y2 = y2;
        self.area = (x2 - x1) * (y2 - y1);
        self
    }

    /// Sets the box from `(x, y, w, h)`.
    pub fn with_x1y1_wh(self, x: f32, y: f32, w: f32, h: f32) -> Self {
        self.with_x1y1_x2y2(x, y, x + w, y + h)
    }

    /// Sets the box from `(cx, cy, w, h)`.
    pub fn with_cxcy_wh(self, cx: f32, cy: f32, w: f32, h: f32) -> Self {
        self.with_x1y1_x2y2(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn area(&self) -> f32 {
        self.area
    }

    pub fn xy1_xy2(&self) -> (f32, f32, f32, f32) {
        (self.x1, self.y1, self.x2, self.y2)
    }

    /// Area of the rectangle shared with `other`, or `None` when the two
    /// boxes do not overlap with positive area.
    pub fn intersect(&self, other: &DetectionCandidate) -> Option<f32> {
        let left = self.x1.max(other.x1);
        let top = self.y1.max(other.y1);
        let right = self.x2.min(other.x2);
        let bottom = self.y2.min(other.y2);
        if left < right && top < bottom {
            Some((right - left) * (bottom - top))
        } else {
            None
        }
    }

    /// Intersection over union. Zero for boxes without positive-area overlap.
    pub fn iou(&self, other: &DetectionCandidate) -> f32 {
        match self.intersect(other) {
            Some(inter) => inter / (self.area + other.area - inter),
            None => 0.0,
        }
    }
}

/// Serialized as `[score, x1, y1, x2, y2]`, with the source index appended
/// when it is tracked.
impl Serialize for DetectionCandidate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.index.is_some() { 6 } else { 5 };
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&self.score)?;
        seq.serialize_element(&self.x1)?;
        seq.serialize_element(&self.y1)?;
        seq.serialize_element(&self.x2)?;
        seq.serialize_element(&self.y2)?;
        if let Some(index) = self.index {
            seq.serialize_element(&index)?;
        }
        seq.end()
    }
}
