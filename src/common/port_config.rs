use crate::common::inference_device::InferenceDevice;

/// Diagnostic flag: save the input and output tensors of every `run` cycle.
pub const DIAG_SAVE_TENSORS: u32 = 2;
/// Diagnostic flag: save the JSON result of every NMS call.
pub const DIAG_SAVE_RESULT: u32 = 4;

#[derive(Default, Debug, Clone)]
pub struct PortConfig {
    pub exe_path: String,
    pub model_path: String,
    pub labels_path: String,
    pub ort_lib_path: Option<String>,
    pub inference_device: InferenceDevice,
    pub num_threads: usize,
    pub diag: u32,
}

impl PortConfig {
    pub fn new(exe_path: String, model_path: String, labels_path: String) -> Self {
        Self {
            exe_path,
            model_path,
            labels_path,
            num_threads: 4,
            ..Default::default()
        }
    }

    pub fn with_ort_lib_path(mut self, ort_lib_path: Option<String>) -> Self {
        self.ort_lib_path = ort_lib_path;
        self
    }

    pub fn with_device(mut self, device: InferenceDevice) -> Self {
        self.inference_device = device;
        self
    }

    pub fn with_num_threads(mut self, n: usize) -> Self {
        self.num_threads = n;
        self
    }

    pub fn with_diag(mut self, diag: u32) -> Self {
        self.diag = diag;
        self
    }

    pub fn diag_enabled(&self, flag: u32) -> bool {
        self.diag & flag != 0
    }
}

impl std::fmt::Display for PortConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Model Path: {}\n\
            Labels Path: {}\n\
            OnnxRuntime Lib Path: {}\n\
            Inference Device: {}\n\
            Threads: {}\n\
            Diagnosis Flags: {}",
            self.model_path,
            self.labels_path,
            self.ort_lib_path.as_deref().unwrap_or("<default>"),
            self.inference_device,
            self.num_threads,
            self.diag
        )
    }
}
