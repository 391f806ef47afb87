//! Multi-class (soft) non-maximum suppression over detection boxes.
use ndarray::{ArrayView2, Axis};
use rayon::prelude::*;
use serde::ser::{Serialize, SerializeMap, Serializer};
use thiserror::Error;

use crate::common::{BoxEncoding, DetectionCandidate};
use crate::data::{ClassLabels, Status};
use crate::engine::InferenceEngine;
use crate::port::CodecError;

#[derive(Error, Debug, PartialEq)]
pub enum NmsError {
    #[error("expected {expected} box values, got {actual}")]
    BoxCount { expected: usize, actual: usize },
    #[error("expected {expected} scores, got {actual}")]
    ScoreCount { expected: usize, actual: usize },
    #[error("unknown box encoding selector {0}")]
    UnknownEncoding(u32),
    #[error("output {0} does not exist")]
    OutputIndex(usize),
    #[error("output {0} is not a float32 tensor")]
    NotFloatTensor(usize),
    #[error("output {index} has unexpected shape {dims:?}")]
    Shape { index: usize, dims: Vec<usize> },
    #[error("malformed request: {0}")]
    Payload(#[from] CodecError),
}

impl NmsError {
    /// In-band status reported for this error.
    pub fn status(&self) -> Status {
        match self {
            NmsError::OutputIndex(_) => Status::IndexOutOfRange,
            NmsError::UnknownEncoding(_) | NmsError::NotFloatTensor(_) => Status::Unsupported,
            _ => Status::SizeMismatch,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NmsParams {
    pub encoding: BoxEncoding,
    pub iou_threshold: f32,
    pub score_threshold: f32,
    /// Gaussian decay parameter; `<= 0` selects hard suppression.
    pub sigma: f32,
    pub with_index: bool,
}

impl Default for NmsParams {
    fn default() -> Self {
        Self {
            encoding: BoxEncoding::CenterExtent,
            iou_threshold: 0.45,
            score_threshold: 0.25,
            sigma: 0.0,
            with_index: false,
        }
    }
}

impl NmsParams {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_encoding(mut self, encoding: BoxEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_iou(mut self, x: f32) -> Self {
        self.iou_threshold = x;
        self
    }

    pub fn with_score(mut self, x: f32) -> Self {
        self.score_threshold = x;
        self
    }

    pub fn with_sigma(mut self, x: f32) -> Self {
        self.sigma = x;
        self
    }

    pub fn with_index(mut self, x: bool) -> Self {
        self.with_index = x;
        self
    }

    fn is_soft(&self) -> bool {
        self.sigma > 0.0
    }
}

/// Surviving candidates grouped by class label, in class order.
///
/// Serializes as a JSON object `label -> [[score, x1, y1, x2, y2(, index)], ...]`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SuppressionResult {
    groups: Vec<(String, Vec<DetectionCandidate>)>,
}

impl SuppressionResult {
    /// Appends `kept` under `label`. Classes sharing a label share one list.
    pub fn push(&mut self, label: &str, kept: Vec<DetectionCandidate>) {
        if kept.is_empty() {
            return;
        }
        match self.groups.iter_mut().find(|(l, _)| l == label) {
            Some((_, list)) => list.extend(kept),
            None => self.groups.push((label.to_string(), kept)),
        }
    }

    pub fn get(&self, label: &str) -> Option<&[DetectionCandidate]> {
        self.groups
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, list)| list.as_slice())
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(l, _)| l.as_str())
    }

    /// Number of labels present.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of kept candidates over all labels.
    pub fn num_detections(&self) -> usize {
        self.groups.iter().map(|(_, list)| list.len()).sum()
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

impl Serialize for SuppressionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.groups.len()))?;
        for (label, list) in &self.groups {
            map.serialize_entry(label, list)?;
        }
        map.end()
    }
}

/// Suppresses one class worth of candidates, given in arrival order.
///
/// The highest score is emitted first (earliest arrival wins ties). Others
/// overlapping it by at least `iou_threshold` are dropped, or decayed by
/// `exp(-iou^2 / sigma)` under soft suppression and dropped only once they
/// fall to `score_threshold` or below.
pub fn suppress(mut pool: Vec<DetectionCandidate>, params: &NmsParams) -> Vec<DetectionCandidate> {
    let mut kept = Vec::new();
    while let Some(best) = argmax(&pool) {
        let selected = pool.remove(best);
        pool.retain_mut(|c| {
            let iou = selected.iou(c);
            if iou < params.iou_threshold {
                return true;
            }
            if params.is_soft() {
                c.score *= (-(iou * iou) / params.sigma).exp();
                c.score > params.score_threshold
            } else {
                false
            }
        });
        kept.push(selected);
    }
    kept
}

fn argmax(pool: &[DetectionCandidate]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, c) in pool.iter().enumerate() {
        match best {
            Some((_, score)) if score >= c.score => {}
            _ => best = Some((i, c.score)),
        }
    }
    best.map(|(i, _)| i)
}

/// Runs suppression per class over `boxes` (`[num_boxes, 4]`) and `scores`
/// (`[num_boxes, num_classes]`). Classes are processed in parallel.
pub fn non_max_suppression(
    boxes: ArrayView2<'_, f32>,
    scores: ArrayView2<'_, f32>,
    params: &NmsParams,
    labels: &ClassLabels,
) -> SuppressionResult {
    // no candidates, whatever the class count claims
    if boxes.nrows() == 0 || scores.nrows() == 0 {
        return SuppressionResult::default();
    }
    let num_classes = scores.len_of(Axis(1));
    let per_class: Vec<Vec<DetectionCandidate>> = (0..num_classes)
        .into_par_iter()
        .map(|class_id| {
            let pool = boxes
                .axis_iter(Axis(0))
                .zip(scores.column(class_id))
                .enumerate()
                .filter(|(_, (_, score))| **score > params.score_threshold)
                .map(|(i, (b, &score))| {
                    let c = DetectionCandidate::new(params.encoding, [b[0], b[1], b[2], b[3]], score);
                    if params.with_index {
                        c.with_index(i)
                    } else {
                        c
                    }
                })
                .collect::<Vec<_>>();
            suppress(pool, params)
        })
        .collect();

    let mut result = SuppressionResult::default();
    for (class_id, kept) in per_class.into_iter().enumerate() {
        if !kept.is_empty() {
            result.push(&labels.label(class_id), kept);
        }
    }
    result
}

/// Slice front end of [`non_max_suppression`]: `boxes` holds 4 values per
/// box, `scores` holds `num_classes` values per box. Trailing values are ignored.
pub fn non_max_suppression_multi_class(
    num_boxes: usize,
    num_classes: usize,
    boxes: &[f32],
    scores: &[f32],
    params: &NmsParams,
    labels: &ClassLabels,
) -> Result<SuppressionResult, NmsError> {
    let expected = num_boxes.checked_mul(4).ok_or(NmsError::BoxCount {
        expected: usize::MAX,
        actual: boxes.len(),
    })?;
    if boxes.len() < expected {
        return Err(NmsError::BoxCount { expected, actual: boxes.len() });
    }
    let boxes = ArrayView2::from_shape((num_boxes, 4), &boxes[..expected])
        .map_err(|_| NmsError::BoxCount { expected, actual: boxes.len() })?;

    let expected = num_boxes.checked_mul(num_classes).ok_or(NmsError::ScoreCount {
        expected: usize::MAX,
        actual: scores.len(),
    })?;
    if scores.len() < expected {
        return Err(NmsError::ScoreCount { expected, actual: scores.len() });
    }
    let scores = ArrayView2::from_shape((num_boxes, num_classes), &scores[..expected])
        .map_err(|_| NmsError::ScoreCount { expected, actual: scores.len() })?;

    Ok(non_max_suppression(boxes, scores, params, labels))
}

/// Runs suppression directly over two float32 outputs of `engine`: boxes
/// shaped `[1, num_boxes, 4]` and scores shaped `[1, num_boxes, num_classes]`.
pub fn nms_from_outputs<E: InferenceEngine + ?Sized>(
    engine: &E,
    boxes_index: usize,
    scores_index: usize,
    params: &NmsParams,
    labels: &ClassLabels,
) -> Result<SuppressionResult, NmsError> {
    let dims_of = |index: usize| {
        engine
            .outputs()
            .get(index)
            .map(|d| d.dims.clone())
            .ok_or(NmsError::OutputIndex(index))
    };

    let box_dims = dims_of(boxes_index)?;
    let num_boxes = match box_dims.as_slice() {
        [_, n, 4] => *n,
        _ => return Err(NmsError::Shape { index: boxes_index, dims: box_dims }),
    };
    let score_dims = dims_of(scores_index)?;
    let num_classes = match score_dims.as_slice() {
        [_, n, c] if *n == num_boxes => *c,
        _ => return Err(NmsError::Shape { index: scores_index, dims: score_dims }),
    };

    let boxes = engine
        .output_f32(boxes_index)
        .ok_or(NmsError::NotFloatTensor(boxes_index))?;
    let scores = engine
        .output_f32(scores_index)
        .ok_or(NmsError::NotFloatTensor(scores_index))?;

    non_max_suppression_multi_class(num_boxes, num_classes, &boxes, &scores, params, labels)
}
