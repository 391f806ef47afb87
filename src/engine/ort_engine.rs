use anyhow::Result;
use half::{bf16, f16};
use ndarray::{Array, IxDyn};
use ort::{
    execution_providers::{CPUExecutionProvider,
                          CUDAExecutionProvider,
                          ExecutionProvider,
                          TensorRTExecutionProvider},
    session::builder::{GraphOptimizationLevel, SessionBuilder},
    session::{Session, SessionInputValue},
    tensor::TensorElementType,
    value::{DynValue, Tensor, ValueType},
};

use crate::common::{ElementType, InferenceDevice, PortConfig, TensorDescriptor};
use crate::engine::{EngineError, InferenceEngine};

const CROSS_MARK: &str = "❌";

/// ONNXRuntime backend holding host copies of every model tensor.
#[derive(Debug)]
pub struct OrtEngine {
    session: Session,
    device: String,
    inputs: Vec<TensorDescriptor>,
    outputs: Vec<TensorDescriptor>,
    input_buffers: Vec<Vec<u8>>,
    output_buffers: Vec<Vec<u8>>,
}

// Decodes native-endian bytes into a typed tensor of the given shape.
macro_rules! tensor_from_bytes {
    ($bytes:expr, $shape:expr, $n:literal, $from_bytes:expr) => {{
        let data: Vec<_> = $bytes
            .chunks_exact($n)
            .map(|c| {
                let mut a = [0u8; $n];
                a.copy_from_slice(c);
                $from_bytes(a)
            })
            .collect();
        Tensor::from_array(Array::from_shape_vec($shape, data)?)?.into_dyn()
    }};
}

// Copies a typed output tensor out as (dims, native-endian bytes).
macro_rules! tensor_to_bytes {
    ($value:expr, $ty:ty, $to_bytes:expr) => {{
        let view = $value.try_extract_tensor::<$ty>()?;
        let dims = view.shape().to_vec();
        let bytes: Vec<u8> = view.iter().flat_map(|x| $to_bytes(*x)).collect();
        (dims, bytes)
    }};
}

impl OrtEngine {
    pub fn new(config: &PortConfig) -> Result<Self> {
        match &config.ort_lib_path {
            Some(path) => ort::init_from(path).commit()?,
            None => ort::init().commit()?,
        };

        let builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.num_threads.max(1))?;

        let mut device = config.inference_device;
        let builder = match config.inference_device {
            InferenceDevice::TensorRT(device_id) => Self::build_trt(builder, device_id)?,
            InferenceDevice::CUDA(device_id) => match Self::build_cuda(builder.clone(), device_id) {
                Ok(builder) => builder,
                Err(err) => {
                    log::warn!("{err}, Using cpu");
                    device = InferenceDevice::CPU;
                    Self::build_cpu(builder)?
                }
            },
            InferenceDevice::CPU => Self::build_cpu(builder)?,
        };

        let session = builder.commit_from_file(&config.model_path)?;

        let inputs = session
            .inputs
            .iter()
            .map(|input| Self::descriptor(&input.name, &input.input_type))
            .collect::<Result<Vec<_>>>()?;
        let outputs = session
            .outputs
            .iter()
            .map(|output| Self::descriptor(&output.name, &output.output_type))
            .collect::<Result<Vec<_>>>()?;

        let input_buffers = inputs.iter().map(|d| vec![0u8; d.byte_size()]).collect();
        let output_buffers = outputs.iter().map(|d| vec![0u8; d.byte_size()]).collect();

        log::info!(
            "Backend: ONNXRuntime | Device: {} | Inputs: {} | Outputs: {}",
            device,
            inputs.len(),
            outputs.len(),
        );

        Ok(Self {
            session,
            device: device.to_string(),
            inputs,
            outputs,
            input_buffers,
            output_buffers,
        })
    }

    fn build_trt(builder: SessionBuilder, device_id: usize) -> Result<SessionBuilder> {
        let trt = TensorRTExecutionProvider::default()
            .with_device_id(device_id as i32)
            .with_engine_cache(true)
            .with_engine_cache_path("trt-cache");
        if trt.is_available()? {
            log::info!("🐢 Initial model serialization with TensorRT may takes some time...");
            Ok(builder.with_execution_providers([trt.build()])?)
        } else {
            anyhow::bail!("{CROSS_MARK} TensorRT execution provider not available")
        }
    }

    fn build_cuda(builder: SessionBuilder, device_id: usize) -> Result<SessionBuilder> {
        let ep = CUDAExecutionProvider::default().with_device_id(device_id as i32);
        if ep.is_available()? {
            Ok(builder.with_execution_providers([ep.build()])?)
        } else {
            anyhow::bail!("{CROSS_MARK} CUDA execution provider not available")
        }
    }

    fn build_cpu(builder: SessionBuilder) -> Result<SessionBuilder> {
        let ep = CPUExecutionProvider::default();
        if ep.is_available()? {
            Ok(builder.with_execution_providers([ep.build()])?)
        } else {
            anyhow::bail!("{CROSS_MARK} CPU execution provider not available")
        }
    }

    fn descriptor(name: &str, value_type: &ValueType) -> Result<TensorDescriptor> {
        let (ty, dimensions) = match value_type {
            ValueType::Tensor { ty, dimensions, .. } => (*ty, dimensions),
            other => anyhow::bail!("{CROSS_MARK} `{name}` is not a tensor: {other:?}"),
        };
        let dtype = match Self::element_type(ty) {
            Some(dtype) => dtype,
            None => anyhow::bail!("{CROSS_MARK} `{name}` has unsupported element type {ty:?}"),
        };

        // deal with the dynamic axis
        let dims = dimensions
            .iter()
            .enumerate()
            .map(|(i, &d)| {
                if d < 0 {
                    log::warn!(
                        "Tensor `{}` has a dynamic {}-th dimension. Using 1 by default.",
                        name,
                        i + 1
                    );
                    1
                } else {
                    d as usize
                }
            })
            .collect::<Vec<_>>();

        Ok(TensorDescriptor::new(name, dtype, &dims))
    }

    fn element_type(ty: TensorElementType) -> Option<ElementType> {
        match ty {
            TensorElementType::Float32 => Some(ElementType::Float32),
            TensorElementType::Float16 => Some(ElementType::Float16),
            TensorElementType::Bfloat16 => Some(ElementType::Bfloat16),
            TensorElementType::Float64 => Some(ElementType::Float64),
            TensorElementType::Int8 => Some(ElementType::Int8),
            TensorElementType::Int16 => Some(ElementType::Int16),
            TensorElementType::Int32 => Some(ElementType::Int32),
            TensorElementType::Int64 => Some(ElementType::Int64),
            TensorElementType::Uint8 => Some(ElementType::Uint8),
            TensorElementType::Uint16 => Some(ElementType::Uint16),
            TensorElementType::Uint32 => Some(ElementType::Uint32),
            TensorElementType::Uint64 => Some(ElementType::Uint64),
            TensorElementType::Bool => Some(ElementType::Bool),
            _ => None,
        }
    }

    fn tensor_preprocess(desc: &TensorDescriptor, bytes: &[u8]) -> Result<DynValue, EngineError> {
        let shape = IxDyn(&desc.dims);
        let x = match desc.dtype {
            ElementType::Float32 => tensor_from_bytes!(bytes, shape, 4, f32::from_ne_bytes),
            ElementType::Float16 => tensor_from_bytes!(bytes, shape, 2, f16::from_ne_bytes),
            ElementType::Bfloat16 => tensor_from_bytes!(bytes, shape, 2, bf16::from_ne_bytes),
            ElementType::Float64 => tensor_from_bytes!(bytes, shape, 8, f64::from_ne_bytes),
            ElementType::Int8 => tensor_from_bytes!(bytes, shape, 1, i8::from_ne_bytes),
            ElementType::Int16 => tensor_from_bytes!(bytes, shape, 2, i16::from_ne_bytes),
            ElementType::Int32 => tensor_from_bytes!(bytes, shape, 4, i32::from_ne_bytes),
            ElementType::Int64 => tensor_from_bytes!(bytes, shape, 8, i64::from_ne_bytes),
            ElementType::Uint8 => tensor_from_bytes!(bytes, shape, 1, u8::from_ne_bytes),
            ElementType::Uint16 => tensor_from_bytes!(bytes, shape, 2, u16::from_ne_bytes),
            ElementType::Uint32 => tensor_from_bytes!(bytes, shape, 4, u32::from_ne_bytes),
            ElementType::Uint64 => tensor_from_bytes!(bytes, shape, 8, u64::from_ne_bytes),
            ElementType::Bool => tensor_from_bytes!(bytes, shape, 1, |a: [u8; 1]| a[0] != 0),
        };
        Ok(x)
    }

    fn tensor_postprocess(
        dtype: ElementType,
        x: &DynValue,
    ) -> Result<(Vec<usize>, Vec<u8>), EngineError> {
        let y = match dtype {
            ElementType::Float32 => tensor_to_bytes!(x, f32, f32::to_ne_bytes),
            ElementType::Float16 => tensor_to_bytes!(x, f16, f16::to_ne_bytes),
            ElementType::Bfloat16 => tensor_to_bytes!(x, bf16, bf16::to_ne_bytes),
            ElementType::Float64 => tensor_to_bytes!(x, f64, f64::to_ne_bytes),
            ElementType::Int8 => tensor_to_bytes!(x, i8, i8::to_ne_bytes),
            ElementType::Int16 => tensor_to_bytes!(x, i16, i16::to_ne_bytes),
            ElementType::Int32 => tensor_to_bytes!(x, i32, i32::to_ne_bytes),
            ElementType::Int64 => tensor_to_bytes!(x, i64, i64::to_ne_bytes),
            ElementType::Uint8 => tensor_to_bytes!(x, u8, u8::to_ne_bytes),
            ElementType::Uint16 => tensor_to_bytes!(x, u16, u16::to_ne_bytes),
            ElementType::Uint32 => tensor_to_bytes!(x, u32, u32::to_ne_bytes),
            ElementType::Uint64 => tensor_to_bytes!(x, u64, u64::to_ne_bytes),
            ElementType::Bool => tensor_to_bytes!(x, bool, |b: bool| [b as u8]),
        };
        Ok(y)
    }
}

impl InferenceEngine for OrtEngine {
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
        // alignment
        let mut xs = Vec::with_capacity(self.inputs.len());
        for (desc, bytes) in self.inputs.iter().zip(self.input_buffers.iter()) {
            xs.push(Into::<SessionInputValue<'_>>::into(Self::tensor_preprocess(desc, bytes)?));
        }

        // run & extract
        let ys = {
            let outputs = self.session.run(&xs[..])?;
            self.outputs
                .iter()
                .map(|desc| {
                    let y = outputs
                        .get(desc.name.as_str())
                        .ok_or_else(|| EngineError::MissingOutput(desc.name.clone()))?;
                    Self::tensor_postprocess(desc.dtype, y)
                })
                .collect::<Result<Vec<_>, EngineError>>()?
        };

        for ((desc, buffer), (dims, bytes)) in self
            .outputs
            .iter_mut()
            .zip(self.output_buffers.iter_mut())
            .zip(ys)
        {
            desc.dims = dims;
            *buffer = bytes;
        }
        Ok(())
    }

    fn device(&self) -> &str {
        &self.device
    }
}
