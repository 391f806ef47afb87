//! Inference worker answering a length-prefixed binary protocol over
//! stdin/stdout, with an ONNX Runtime engine and multi-class NMS.
mod utils;
pub mod common;
pub mod data;
pub mod engine;
pub mod port;
pub mod postprocess;

use anyhow::Context;

use crate::common::PortConfig;
use crate::data::ClassLabels;
use crate::engine::OrtEngine;
use crate::port::Session;

/// Loads the labels and the model named by `config`.
pub fn init_session(config: PortConfig) -> anyhow::Result<Session<OrtEngine>> {
    log::info!("Initializing session\n{}", config);

    let labels = ClassLabels::from_file(&config.labels_path)
        .with_context(|| format!("Failed to read labels from {}", config.labels_path))?;
    log::info!("Loaded {} class labels", labels.len());

    let engine = OrtEngine::new(&config)
        .with_context(|| format!("Failed to load model {}", config.model_path))?;

    Ok(Session::new(engine, config, labels))
}
