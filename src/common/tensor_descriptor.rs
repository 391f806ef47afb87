use serde::{Deserialize, Serialize};

/// Element type of a model tensor, named the way ONNX names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Float32,
    Float16,
    Bfloat16,
    Float64,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Bool,
}

impl ElementType {
    /// Size of one element in bytes.
    pub fn byte_size(&self) -> usize {
        match self {
            ElementType::Float64 | ElementType::Int64 | ElementType::Uint64 => 8,
            ElementType::Float32 | ElementType::Int32 | ElementType::Uint32 => 4,
            ElementType::Float16
            | ElementType::Bfloat16
            | ElementType::Int16
            | ElementType::Uint16 => 2,
            ElementType::Int8 | ElementType::Uint8 | ElementType::Bool => 1,
        }
    }

    pub fn str(&self) -> &'static str {
        match self {
            ElementType::Float32 => "float32",
            ElementType::Float16 => "float16",
            ElementType::Bfloat16 => "bfloat16",
            ElementType::Float64 => "float64",
            ElementType::Int8 => "int8",
            ElementType::Int16 => "int16",
            ElementType::Int32 => "int32",
            ElementType::Int64 => "int64",
            ElementType::Uint8 => "uint8",
            ElementType::Uint16 => "uint16",
            ElementType::Uint32 => "uint32",
            ElementType::Uint64 => "uint64",
            ElementType::Bool => "bool",
        }
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.str())
    }
}

/// Read-only description of one engine tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub dtype: ElementType,
    pub dims: Vec<usize>,
}

impl TensorDescriptor {
    pub fn new(name: &str, dtype: ElementType, dims: &[usize]) -> Self {
        Self {
            name: name.to_string(),
            dtype,
            dims: dims.to_vec(),
        }
    }

    /// Number of elements. A scalar (no dims) holds one element.
    pub fn element_count(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn element_size(&self) -> usize {
        self.dtype.byte_size()
    }

    /// Size of the tensor storage in bytes.
    pub fn byte_size(&self) -> usize {
        self.element_count() * self.element_size()
    }
}
