//! Binary payload layouts of the tensor and NMS commands.
//!
//! Payload fields are little-endian. Tensor data is host-native, as the
//! engine stores it.
use thiserror::Error;

use crate::common::{BoxEncoding, ElementType, FROM_OUTPUTS_FLAG, WITH_INDEX_FLAG};
use crate::data::Status;
use crate::engine::InferenceEngine;
use crate::postprocess::{NmsError, NmsParams};

/// `set_input_tensor` data is copied verbatim.
pub const DTYPE_RAW: u32 = 0;
/// `set_input_tensor` data is one byte per element, scaled into `[min, max]`.
pub const DTYPE_QUANTIZED_U8: u32 = 1;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("payload ends at offset {offset}, {needed} more bytes needed")]
    Truncated { offset: usize, needed: usize },
}

/// Bounds-checked cursor over a request payload.
#[derive(Debug, Clone)]
pub struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if n > self.remaining() {
            return Err(CodecError::Truncated {
                offset: self.pos,
                needed: n - self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Everything not read yet.
    pub fn rest(&mut self) -> &'a [u8] {
        let out = &self.buf[self.pos..];
        self.pos = self.buf.len();
        out
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut a = [0u8; N];
        a.copy_from_slice(self.take(N)?);
        Ok(a)
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        self.take_array().map(u32::from_le_bytes)
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        self.take_array().map(i32::from_le_bytes)
    }

    pub fn read_f32(&mut self) -> Result<f32, CodecError> {
        self.take_array().map(f32::from_le_bytes)
    }

    pub fn read_f32_vec(&mut self, n: usize) -> Result<Vec<f32>, CodecError> {
        let bytes = match n.checked_mul(4) {
            Some(len) => self.take(len)?,
            None => {
                return Err(CodecError::Truncated {
                    offset: self.pos,
                    needed: usize::MAX,
                })
            }
        };
        Ok(bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }
}

/// Applies one `set_input_tensor` record to `engine`.
///
/// Record layout: `index u32, dtype u32, [min f32, max f32 when dtype = 1], data`.
pub fn set_input_tensor<E: InferenceEngine + ?Sized>(engine: &mut E, record: &[u8]) -> Status {
    match write_input(engine, record) {
        Ok(()) => Status::Ok,
        Err(status) => status,
    }
}

fn write_input<E: InferenceEngine + ?Sized>(engine: &mut E, record: &[u8]) -> Result<(), Status> {
    let mut r = PayloadReader::new(record);
    let index = r.read_u32().map_err(|_| Status::SizeMismatch)? as usize;
    let (dtype, element_count, byte_size) = match engine.inputs().get(index) {
        Some(desc) => (desc.dtype, desc.element_count(), desc.byte_size()),
        None => return Err(Status::IndexOutOfRange),
    };

    match r.read_u32().map_err(|_| Status::SizeMismatch)? {
        DTYPE_RAW => {
            let data = r.rest();
            if data.len() != byte_size {
                return Err(Status::SizeMismatch);
            }
            let dst = engine.input_mut(index).ok_or(Status::IndexOutOfRange)?;
            if dst.len() != data.len() {
                return Err(Status::SizeMismatch);
            }
            dst.copy_from_slice(data);
        }
        DTYPE_QUANTIZED_U8 => {
            let min = r.read_f32().map_err(|_| Status::SizeMismatch)?;
            let max = r.read_f32().map_err(|_| Status::SizeMismatch)?;
            if dtype != ElementType::Float32 {
                return Err(Status::Unsupported);
            }
            let data = r.rest();
            if data.len() != element_count {
                return Err(Status::SizeMismatch);
            }
            let dst = engine.input_mut(index).ok_or(Status::IndexOutOfRange)?;
            if dst.len() != data.len() * 4 {
                return Err(Status::SizeMismatch);
            }
            let scale = (max - min) / 255.0;
            for (out, &v) in dst.chunks_exact_mut(4).zip(data) {
                out.copy_from_slice(&(scale * v as f32 + min).to_ne_bytes());
            }
        }
        other => {
            log::debug!("Unsupported set_input_tensor dtype {}", other);
            return Err(Status::Unsupported);
        }
    }
    Ok(())
}

/// Raw bytes of the output named by `payload` (`index u32`); empty when the
/// index is missing or out of range.
pub fn get_output_tensor<E: InferenceEngine + ?Sized>(engine: &E, payload: &[u8]) -> Vec<u8> {
    let mut r = PayloadReader::new(payload);
    r.read_u32()
        .ok()
        .and_then(|index| engine.output(index as usize))
        .map(<[u8]>::to_vec)
        .unwrap_or_default()
}

/// Applies the records of a `run` payload in order, stopping at the first
/// failing one.
///
/// Layout: `count u32`, then `count` times `len u32` followed by a `len`-byte
/// `set_input_tensor` record.
pub fn apply_run_records<E: InferenceEngine + ?Sized>(
    engine: &mut E,
    payload: &[u8],
) -> Result<(), Status> {
    let mut r = PayloadReader::new(payload);
    let count = r.read_u32().map_err(|_| Status::SizeMismatch)?;
    for _ in 0..count {
        let len = r.read_u32().map_err(|_| Status::SizeMismatch)? as usize;
        let record = r.take(len).map_err(|_| Status::SizeMismatch)?;
        let status = set_input_tensor(engine, record);
        if !status.is_ok() {
            return Err(status);
        }
    }
    Ok(())
}

/// Successful `run` reply: `output_count i32`, then `len u32` and the bytes
/// of every output.
pub fn encode_outputs<E: InferenceEngine + ?Sized>(engine: &E) -> Vec<u8> {
    let count = engine.outputs().len();
    let total: usize = (0..count)
        .map(|i| 4 + engine.output(i).map_or(0, <[u8]>::len))
        .sum();

    let mut reply = Vec::with_capacity(4 + total);
    reply.extend_from_slice(&(count as i32).to_le_bytes());
    for i in 0..count {
        let bytes = engine.output(i).unwrap_or_default();
        reply.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        reply.extend_from_slice(bytes);
    }
    reply
}

/// Failed `run` reply: the negative status code alone.
pub fn encode_status_code(status: Status) -> Vec<u8> {
    status.code().to_le_bytes().to_vec()
}

/// Where an NMS request takes its boxes and scores from.
#[derive(Debug, Clone, PartialEq)]
pub enum NmsSource {
    /// Flat arrays carried in the request itself.
    Inline {
        num_boxes: usize,
        num_classes: usize,
        boxes: Vec<f32>,
        scores: Vec<f32>,
    },
    /// Two float32 outputs of the last invoke, by index.
    Outputs {
        boxes_index: usize,
        scores_index: usize,
    },
}

/// Decoded `non_max_suppression` request.
#[derive(Debug, Clone, PartialEq)]
pub struct NmsRequest {
    pub params: NmsParams,
    pub source: NmsSource,
}

impl NmsRequest {
    /// Layout: `num_boxes u32, box_encoding u32, num_classes u32,
    /// iou_threshold f32, score_threshold f32, sigma f32`, then
    /// `4 * num_boxes` box values and `num_boxes * num_classes` scores.
    ///
    /// With [`FROM_OUTPUTS_FLAG`] set in `box_encoding` the header is followed
    /// by `boxes_index u32, scores_index u32` instead, and the two counts are
    /// taken from the output shapes.
    pub fn decode(payload: &[u8]) -> Result<Self, NmsError> {
        let mut r = PayloadReader::new(payload);
        let num_boxes = r.read_u32()? as usize;
        let selector = r.read_u32()?;
        let num_classes = r.read_u32()? as usize;
        let iou_threshold = r.read_f32()?;
        let score_threshold = r.read_f32()?;
        let sigma = r.read_f32()?;

        let encoding =
            BoxEncoding::from_selector(selector).ok_or(NmsError::UnknownEncoding(selector))?;
        let params = NmsParams::new()
            .with_encoding(encoding)
            .with_iou(iou_threshold)
            .with_score(score_threshold)
            .with_sigma(sigma)
            .with_index(selector & WITH_INDEX_FLAG != 0);

        let source = if selector & FROM_OUTPUTS_FLAG != 0 {
            NmsSource::Outputs {
                boxes_index: r.read_u32()? as usize,
                scores_index: r.read_u32()? as usize,
            }
        } else {
            NmsSource::Inline {
                num_boxes,
                num_classes,
                boxes: r.read_f32_vec(num_boxes.saturating_mul(4))?,
                scores: r.read_f32_vec(num_boxes.saturating_mul(num_classes))?,
            }
        };

        Ok(Self { params, source })
    }
}
