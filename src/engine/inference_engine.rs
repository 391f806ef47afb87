use thiserror::Error;

use crate::common::{ElementType, TensorDescriptor};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("ONNX Runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("tensor shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("model output `{0}` is missing from the run results")]
    MissingOutput(String),
    #[error("inference failed: {0}")]
    Failed(String),
}

/// The model runtime the port drives.
///
/// Implementations own one host buffer per input and per output tensor; each
/// buffer is exactly [`TensorDescriptor::byte_size`] long. The engine is not
/// reentrant: callers hold it exclusively for the duration of one command.
pub trait InferenceEngine {
    /// Descriptors of the model inputs, in model order.
    fn inputs(&self) -> &[TensorDescriptor];

    /// Descriptors of the model outputs, in model order.
    fn outputs(&self) -> &[TensorDescriptor];

    /// Current bytes of input `index`.
    fn input(&self, index: usize) -> Option<&[u8]>;

    /// Writable storage of input `index`.
    fn input_mut(&mut self, index: usize) -> Option<&mut [u8]>;

    /// Current bytes of output `index`.
    fn output(&self, index: usize) -> Option<&[u8]>;

    /// Runs one forward pass over the current input buffers.
    fn invoke(&mut self) -> Result<(), EngineError>;

    /// Execution device reported by `info`.
    fn device(&self) -> &str {
        "unknown"
    }

    /// Output `index` viewed as native-endian f32 values.
    fn output_f32(&self, index: usize) -> Option<Vec<f32>> {
        let desc = self.outputs().get(index)?;
        if desc.dtype != ElementType::Float32 {
            return None;
        }
        let bytes = self.output(index)?;
        Some(
            bytes
                .chunks_exact(4)
                .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        )
    }
}
