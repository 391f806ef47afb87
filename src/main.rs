use std::io::{self, BufWriter, Write};
use std::process::ExitCode;

use clap::Parser;

use ort_port::common::{InferenceDevice, PortConfig};
use ort_port::port::PacketPort;

/// Serves a model to a parent process over stdin/stdout.
#[derive(Parser, Debug)]
#[command(name = "ort_port", version, about)]
struct Args {
    /// Diagnostic flags: 2 saves run tensors, 4 saves NMS results
    #[arg(short = 'd', long = "debug", default_value_t = 0)]
    diag: u32,

    /// Intra-op threads of the inference engine
    #[arg(short = 'j', long = "parallel", default_value_t = 4)]
    threads: usize,

    /// Execution device: cpu, cuda[:id] or tensorrt[:id]
    #[arg(long, default_value = "cpu", value_parser = parse_device)]
    device: InferenceDevice,

    /// Path of the ONNX Runtime shared library
    #[arg(long = "ort-lib")]
    ort_lib: Option<String>,

    /// ONNX model file
    model: String,

    /// Class label file, one label per line
    labels: String,
}

fn parse_device(s: &str) -> Result<InferenceDevice, String> {
    InferenceDevice::parse(s).ok_or_else(|| {
        format!(
            "unknown device `{}`, expected one of: {}",
            s,
            InferenceDevice::all_inference_devices().join(", ")
        )
    })
}

fn main() -> ExitCode {
    // stdout carries the protocol, so logs go to stderr
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {} - {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    let exe = std::env::current_exe()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "ort_port".to_string());
    let config = PortConfig::new(exe, args.model, args.labels)
        .with_ort_lib_path(args.ort_lib)
        .with_device(args.device)
        .with_num_threads(args.threads)
        .with_diag(args.diag);

    let mut session = match ort_port::init_session(config) {
        Ok(session) => session,
        Err(err) => {
            log::error!("{:#}", err);
            return ExitCode::FAILURE;
        }
    };

    let mut port = PacketPort::new(io::stdin().lock(), BufWriter::new(io::stdout().lock()));
    if let Err(err) = session.serve(&mut port) {
        log::error!("Port closed: {}", err);
    }
    ExitCode::SUCCESS
}
