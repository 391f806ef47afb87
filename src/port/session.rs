use std::io::{Read, Write};

use serde_json::json;

use crate::common::{PortConfig, DIAG_SAVE_RESULT, DIAG_SAVE_TENSORS};
use crate::data::{ClassLabels, Phase, Status, TimeCalc};
use crate::engine::InferenceEngine;
use crate::port::{codec, Command, FrameError, NmsRequest, NmsSource, PacketPort, UNKNOWN_COMMAND};
use crate::postprocess::{nms_from_outputs, non_max_suppression_multi_class};
use crate::utils;

/// Worker state shared by every command: the engine, the labels, the
/// configuration and the stage timer of the current cycle.
#[derive(Debug)]
pub struct Session<E> {
    engine: E,
    config: PortConfig,
    labels: ClassLabels,
    times: TimeCalc,
}

impl<E: InferenceEngine> Session<E> {
    pub fn new(engine: E, config: PortConfig, labels: ClassLabels) -> Self {
        Self {
            engine,
            config,
            labels,
            times: TimeCalc::default(),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    pub fn labels(&self) -> &ClassLabels {
        &self.labels
    }

    pub fn times(&self) -> &TimeCalc {
        &self.times
    }

    /// Answers messages from `port` until the parent closes the stream.
    ///
    /// Returns the framing error that ended the loop, if any.
    pub fn serve<R: Read, W: Write>(&mut self, port: &mut PacketPort<R, W>) -> Result<(), FrameError> {
        loop {
            let message = match port.receive()? {
                Some(message) => message,
                None => {
                    log::info!("Input stream closed");
                    return Ok(());
                }
            };
            let reply = self.dispatch(&message);
            port.send(&reply)?;
        }
    }

    /// Executes one message and returns the reply payload.
    pub fn dispatch(&mut self, message: &[u8]) -> Vec<u8> {
        let (opcode, payload) = match message.split_first() {
            Some((&opcode, payload)) => (opcode, payload),
            None => {
                log::warn!("Empty message");
                return UNKNOWN_COMMAND.to_vec();
            }
        };

        let command = match Command::try_from(opcode) {
            Ok(command) => command,
            Err(opcode) => {
                log::warn!("Unknown command {}", opcode);
                return UNKNOWN_COMMAND.to_vec();
            }
        };

        log::debug!("{} ({} payload bytes)", command, payload.len());
        match command {
            Command::Info => self.info(),
            Command::SetInputTensor => self.set_input_tensor(payload).to_json(),
            Command::Invoke => self.invoke().to_json(),
            Command::GetOutputTensor => self.get_output_tensor(payload),
            Command::Run => self.run(payload),
            Command::NonMaxSuppression => self.non_max_suppression(payload),
        }
    }

    /// Configuration, tensor layout and last cycle timings as JSON.
    pub fn info(&self) -> Vec<u8> {
        json!({
            "exe": self.config.exe_path,
            "model": self.config.model_path,
            "label": self.config.labels_path,
            "class": self.labels.len(),
            "thread": self.config.num_threads,
            "device": self.engine.device(),
            "diag": self.config.diag,
            "inputs": self.engine.inputs(),
            "outputs": self.engine.outputs(),
            "times_us": self.times.laps(),
        })
        .to_string()
        .into_bytes()
    }

    pub fn set_input_tensor(&mut self, record: &[u8]) -> Status {
        let Self { engine, times, .. } = self;
        times.measure(Phase::SetInput, || codec::set_input_tensor(engine, record))
    }

    pub fn invoke(&mut self) -> Status {
        let Self { engine, times, .. } = self;
        match times.measure(Phase::Invoke, || engine.invoke()) {
            Ok(()) => Status::Ok,
            Err(err) => {
                log::error!("Invoke failed: {}", err);
                Status::InvokeFailed
            }
        }
    }

    pub fn get_output_tensor(&mut self, payload: &[u8]) -> Vec<u8> {
        let Self { engine, times, .. } = self;
        times.measure(Phase::GetOutput, || codec::get_output_tensor(engine, payload))
    }

    /// Sets every input record, invokes once and returns all outputs, or the
    /// first failing status as a single negative i32.
    pub fn run(&mut self, payload: &[u8]) -> Vec<u8> {
        self.times.begin_cycle();

        let applied = {
            let Self { engine, times, .. } = self;
            times.measure(Phase::SetInput, || codec::apply_run_records(engine, payload))
        };
        if let Err(status) = applied {
            log::debug!("run rejected: status {}", status.code());
            return codec::encode_status_code(status);
        }

        let status = self.invoke();
        if !status.is_ok() {
            return codec::encode_status_code(status);
        }

        if self.config.diag_enabled(DIAG_SAVE_TENSORS) {
            self.save_tensors();
        }

        let Self { engine, times, .. } = self;
        times.measure(Phase::GetOutput, || codec::encode_outputs(engine))
    }

    /// Decodes an NMS request and returns the kept boxes per label as JSON.
    ///
    /// Boxes and scores come either from the request or from two outputs of
    /// the last invoke.
    pub fn non_max_suppression(&mut self, payload: &[u8]) -> Vec<u8> {
        let result = NmsRequest::decode(payload).and_then(|request| match request.source {
            NmsSource::Inline {
                num_boxes,
                num_classes,
                boxes,
                scores,
            } => non_max_suppression_multi_class(
                num_boxes,
                num_classes,
                &boxes,
                &scores,
                &request.params,
                &self.labels,
            ),
            NmsSource::Outputs {
                boxes_index,
                scores_index,
            } => nms_from_outputs(
                &self.engine,
                boxes_index,
                scores_index,
                &request.params,
                &self.labels,
            ),
        });

        let result = match result {
            Ok(result) => result,
            Err(err) => {
                log::warn!("non_max_suppression rejected: {}", err);
                return err.status().to_json();
            }
        };

        let reply = match result.to_json() {
            Ok(reply) => reply,
            Err(err) => {
                log::error!("Failed to encode NMS result: {}", err);
                return Status::Unsupported.to_json();
            }
        };
        log::debug!("non_max_suppression kept {} boxes", result.num_detections());

        if self.config.diag_enabled(DIAG_SAVE_RESULT) {
            utils::save_diag("nms_result.json", &reply);
        }
        reply
    }

    fn save_tensors(&self) {
        for (i, desc) in self.engine.inputs().iter().enumerate() {
            if let Some(bytes) = self.engine.input(i) {
                utils::save_diag(&format!("input_{}_{}.bin", i, desc.dtype), bytes);
            }
        }
        for (i, desc) in self.engine.outputs().iter().enumerate() {
            if let Some(bytes) = self.engine.output(i) {
                utils::save_diag(&format!("output_{}_{}.bin", i, desc.dtype), bytes);
            }
        }
    }
}
