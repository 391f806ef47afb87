#![allow(dead_code)]

use std::time::Duration;

use ort_port::common::{ElementType, PortConfig, TensorDescriptor};
use ort_port::data::ClassLabels;
use ort_port::engine::{EngineError, InferenceEngine};
use ort_port::port::Session;

/// In-memory engine: `invoke` copies input 0 into output 0 when the sizes match.
#[derive(Debug, Default)]
pub struct MockEngine {
    pub inputs: Vec<TensorDescriptor>,
    pub outputs: Vec<TensorDescriptor>,
    pub input_buffers: Vec<Vec<u8>>,
    pub output_buffers: Vec<Vec<u8>>,
    pub invoke_count: usize,
    pub fail_invoke: bool,
    pub invoke_delay: Option<Duration>,
}

impl MockEngine {
    pub fn new(inputs: Vec<TensorDescriptor>, outputs: Vec<TensorDescriptor>) -> Self {
        let input_buffers = inputs.iter().map(|d| vec![0u8; d.byte_size()]).collect();
        let output_buffers = outputs.iter().map(|d| vec![0u8; d.byte_size()]).collect();
        Self {
            inputs,
            outputs,
            input_buffers,
            output_buffers,
            ..Default::default()
        }
    }

    /// Two float32 inputs (`[1, 4]` and `[2]`) and one float32 output `[1, 4]`.
    pub fn two_inputs() -> Self {
        Self::new(
            vec![
                TensorDescriptor::new("images", ElementType::Float32, &[1, 4]),
                TensorDescriptor::new("scale", ElementType::Float32, &[2]),
            ],
            vec![TensorDescriptor::new("output0", ElementType::Float32, &[1, 4])],
        )
    }

    pub fn failing(mut self) -> Self {
        self.fail_invoke = true;
        self
    }

    pub fn with_invoke_delay(mut self, delay: Duration) -> Self {
        self.invoke_delay = Some(delay);
        self
    }

    pub fn set_output_f32(&mut self, index: usize, dims: &[usize], values: &[f32]) {
        self.outputs[index].dims = dims.to_vec();
        self.output_buffers[index] = f32_ne_bytes(values);
    }
}

impl InferenceEngine for MockEngine {
    fn inputs(&self) -> &[TensorDescriptor] {
        &self.inputs
    }

    fn outputs(&self) -> &[TensorDescriptor] {
        &self.outputs
    }

    fn input(&self, index: usize) -> Option<&[u8]> {
        self.input_buffers.get(index).map(|b| b.as_slice())
    }

    fn input_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        self.input_buffers.get_mut(index).map(|b| b.as_mut_slice())
    }

    fn output(&self, index: usize) -> Option<&[u8]> {
        self.output_buffers.get(index).map(|b| b.as_slice())
    }

    fn invoke(&mut self) -> Result<(), EngineError> {
        self.invoke_count += 1;
        if let Some(delay) = self.invoke_delay {
            std::thread::sleep(delay);
        }
        if self.fail_invoke {
            return Err(EngineError::Failed("mock failure".to_string()));
        }
        if let (Some(src), Some(dst)) = (self.input_buffers.first(), self.output_buffers.first_mut()) {
            if src.len() == dst.len() {
                dst.copy_from_slice(src);
            }
        }
        Ok(())
    }

    fn device(&self) -> &str {
        "mock"
    }
}

pub fn session(engine: MockEngine, labels: &[&str]) -> Session<MockEngine> {
    session_with_diag(engine, labels, 0)
}

pub fn session_with_diag(engine: MockEngine, labels: &[&str], diag: u32) -> Session<MockEngine> {
    let config = PortConfig::new(
        "ort_port".to_string(),
        "model.onnx".to_string(),
        "labels.txt".to_string(),
    )
    .with_diag(diag);
    let labels = ClassLabels::new(labels.iter().map(|l| l.to_string()).collect());
    Session::new(engine, config, labels)
}

pub fn f32_ne_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_ne_bytes()).collect()
}

pub fn f32_from_ne(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// `set_input_tensor` record with raw data.
pub fn raw_record(index: u32, data: &[u8]) -> Vec<u8> {
    let mut r = Vec::new();
    r.extend_from_slice(&index.to_le_bytes());
    r.extend_from_slice(&0u32.to_le_bytes());
    r.extend_from_slice(data);
    r
}

/// `set_input_tensor` record with one quantized byte per element.
pub fn quantized_record(index: u32, min: f32, max: f32, data: &[u8]) -> Vec<u8> {
    let mut r = Vec::new();
    r.extend_from_slice(&index.to_le_bytes());
    r.extend_from_slice(&1u32.to_le_bytes());
    r.extend_from_slice(&min.to_le_bytes());
    r.extend_from_slice(&max.to_le_bytes());
    r.extend_from_slice(data);
    r
}

pub fn run_payload(records: &[Vec<u8>]) -> Vec<u8> {
    let mut p = Vec::new();
    p.extend_from_slice(&(records.len() as u32).to_le_bytes());
    for record in records {
        p.extend_from_slice(&(record.len() as u32).to_le_bytes());
        p.extend_from_slice(record);
    }
    p
}

#[allow(clippy::too_many_arguments)]
pub fn nms_payload(
    num_boxes: u32,
    box_encoding: u32,
    num_classes: u32,
    iou: f32,
    score: f32,
    sigma: f32,
    boxes: &[f32],
    scores: &[f32],
) -> Vec<u8> {
    let mut p = Vec::new();
    p.extend_from_slice(&num_boxes.to_le_bytes());
    p.extend_from_slice(&box_encoding.to_le_bytes());
    p.extend_from_slice(&num_classes.to_le_bytes());
    p.extend_from_slice(&iou.to_le_bytes());
    p.extend_from_slice(&score.to_le_bytes());
    p.extend_from_slice(&sigma.to_le_bytes());
    for v in boxes.iter().chain(scores) {
        p.extend_from_slice(&v.to_le_bytes());
    }
    p
}

pub fn with_opcode(opcode: u8, payload: &[u8]) -> Vec<u8> {
    let mut m = vec![opcode];
    m.extend_from_slice(payload);
    m
}

pub fn status_of(reply: &[u8]) -> i64 {
    let v: serde_json::Value = serde_json::from_slice(reply).expect("status JSON");
    v["status"].as_i64().expect("status field")
}
