mod common;

use std::io::{self, Cursor, Write};
use std::time::Duration;

use common::*;
use ort_port::common::{ElementType, TensorDescriptor};
use ort_port::port::{Command, FrameError, PacketPort, UNKNOWN_COMMAND};

fn read_i32(bytes: &[u8]) -> i32 {
    i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[test]
fn opcodes_round_trip() {
    for opcode in 0u8..6 {
        let command = Command::try_from(opcode).unwrap();
        assert_eq!(command.opcode(), opcode);
    }
    assert_eq!(Command::try_from(6), Err(6));
    assert_eq!(Command::NonMaxSuppression.to_string(), "non_max_suppression");
}

#[test]
fn unknown_and_empty_messages() {
    let mut session = session(MockEngine::two_inputs(), &[]);
    assert_eq!(session.dispatch(&[]), UNKNOWN_COMMAND);
    assert_eq!(session.dispatch(&[6]), UNKNOWN_COMMAND);
    assert_eq!(session.dispatch(&[255, 1, 2, 3]), UNKNOWN_COMMAND);
    assert_eq!(session.engine().invoke_count, 0);
}

#[test]
fn info_reports_configuration_and_tensors() {
    let mut session = session(MockEngine::two_inputs(), &["person", "car"]);
    let reply = session.dispatch(&[0]);
    let info: serde_json::Value = serde_json::from_slice(&reply).unwrap();

    assert_eq!(info["model"], "model.onnx");
    assert_eq!(info["label"], "labels.txt");
    assert_eq!(info["class"], 2);
    assert_eq!(info["thread"], 4);
    assert_eq!(info["device"], "mock");
    assert_eq!(info["diag"], 0);
    assert_eq!(info["inputs"].as_array().unwrap().len(), 2);
    assert_eq!(info["inputs"][0]["name"], "images");
    assert_eq!(info["inputs"][0]["type"], "float32");
    assert_eq!(info["inputs"][0]["dims"], serde_json::json!([1, 4]));
    assert_eq!(info["outputs"][0]["name"], "output0");
    for key in ["set_input", "invoke", "get_output"] {
        assert!(info["times_us"][key].is_u64(), "times_us.{}", key);
    }
}

#[test]
fn info_times_follow_the_latest_cycle() {
    let engine = MockEngine::two_inputs().with_invoke_delay(Duration::from_millis(3));
    let mut session = session(engine, &[]);
    let times = |session: &mut ort_port::port::Session<MockEngine>| {
        let info: serde_json::Value = serde_json::from_slice(&session.dispatch(&[0])).unwrap();
        info["times_us"].clone()
    };
    assert_eq!(times(&mut session)["invoke"], 0);

    let records = vec![raw_record(0, &f32_ne_bytes(&[1.0, 2.0, 3.0, 4.0]))];
    session.dispatch(&with_opcode(4, &run_payload(&records)));
    assert!(times(&mut session)["invoke"].as_u64().unwrap() >= 3_000);

    // a new input write opens the next cycle and clears the invoke bucket
    session.dispatch(&with_opcode(1, &raw_record(1, &f32_ne_bytes(&[1.0, 2.0]))));
    assert_eq!(times(&mut session)["invoke"], 0);
}

#[test]
fn set_input_invoke_get_output() {
    let mut session = session(MockEngine::two_inputs(), &[]);
    let values = [0.25f32, 0.5, 0.75, 1.0];

    let reply = session.dispatch(&with_opcode(1, &raw_record(0, &f32_ne_bytes(&values))));
    assert_eq!(status_of(&reply), 0);

    let reply = session.dispatch(&[2]);
    assert_eq!(status_of(&reply), 0);
    assert_eq!(session.engine().invoke_count, 1);

    let reply = session.dispatch(&with_opcode(3, &0u32.to_le_bytes()));
    assert_eq!(f32_from_ne(&reply), values);

    let reply = session.dispatch(&with_opcode(3, &5u32.to_le_bytes()));
    assert!(reply.is_empty());
}

#[test]
fn set_input_status_codes() {
    let mut session = session(MockEngine::two_inputs(), &[]);
    assert_eq!(status_of(&session.dispatch(&with_opcode(1, &raw_record(9, &[])))), -1);
    assert_eq!(status_of(&session.dispatch(&with_opcode(1, &raw_record(0, &[1, 2])))), -2);
    assert_eq!(
        status_of(&session.dispatch(&with_opcode(1, &quantized_record(0, 0.0, 1.0, &[1, 2])))),
        -2
    );
    assert_eq!(status_of(&session.dispatch(&[1])), -2);
}

#[test]
fn invoke_failure_keeps_worker_usable() {
    let mut session = session(MockEngine::two_inputs().failing(), &[]);
    assert_eq!(status_of(&session.dispatch(&[2])), -4);
    assert_eq!(status_of(&session.dispatch(&[2])), -4);
    assert_eq!(session.engine().invoke_count, 2);
    // other commands still answer
    let info: serde_json::Value = serde_json::from_slice(&session.dispatch(&[0])).unwrap();
    assert_eq!(info["class"], 0);
}

#[test]
fn run_returns_every_output() {
    let mut session = session(MockEngine::two_inputs(), &[]);
    let records = vec![
        raw_record(0, &f32_ne_bytes(&[1.0, 2.0, 3.0, 4.0])),
        quantized_record(1, 0.0, 255.0, &[10, 20]),
    ];
    let reply = session.dispatch(&with_opcode(4, &run_payload(&records)));

    assert_eq!(read_i32(&reply[0..4]), 1);
    assert_eq!(read_u32(&reply[4..8]), 16);
    assert_eq!(f32_from_ne(&reply[8..24]), [1.0, 2.0, 3.0, 4.0]);
    assert_eq!(reply.len(), 24);
    assert_eq!(session.engine().invoke_count, 1);
    assert_eq!(f32_from_ne(session.engine().input_buffers[1].as_slice()), [10.0, 20.0]);
}

#[test]
fn run_with_bad_second_record_never_invokes() {
    let mut session = session(MockEngine::two_inputs(), &[]);
    let records = vec![
        raw_record(0, &f32_ne_bytes(&[1.0, 2.0, 3.0, 4.0])),
        raw_record(1, &f32_ne_bytes(&[1.0, 2.0, 3.0])),
    ];
    let reply = session.dispatch(&with_opcode(4, &run_payload(&records)));
    assert_eq!(reply, (-2i32).to_le_bytes());
    assert_eq!(session.engine().invoke_count, 0);
}

#[test]
fn run_reports_bad_index_and_invoke_failure() {
    let mut session = session(MockEngine::two_inputs(), &[]);
    let reply = session.dispatch(&with_opcode(4, &run_payload(&[raw_record(3, &[])])));
    assert_eq!(reply, (-1i32).to_le_bytes());

    let mut session = common::session(MockEngine::two_inputs().failing(), &[]);
    let reply = session.dispatch(&with_opcode(4, &run_payload(&[])));
    assert_eq!(reply, (-4i32).to_le_bytes());
    assert_eq!(session.engine().invoke_count, 1);
}

#[test]
fn nms_command() {
    let mut session = session(MockEngine::two_inputs(), &[]);
    let payload = nms_payload(
        2,
        0,
        1,
        0.5,
        0.3,
        0.0,
        &[0.0, 0.0, 2.0, 2.0, 0.1, 0.1, 2.0, 2.0],
        &[0.9, 0.8],
    );
    let reply = session.dispatch(&with_opcode(5, &payload));
    let result: serde_json::Value = serde_json::from_slice(&reply).unwrap();

    let boxes = result["0"].as_array().unwrap();
    assert_eq!(boxes.len(), 1);
    let got: Vec<f64> = boxes[0]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_f64().unwrap())
        .collect();
    let want = [0.9, -1.0, -1.0, 1.0, 1.0];
    assert_eq!(got.len(), want.len());
    for (g, w) in got.iter().zip(want) {
        assert!((g - w).abs() < 1e-6, "{:?}", got);
    }
    assert_eq!(result.as_object().unwrap().len(), 1);
}

#[test]
fn nms_command_errors() {
    let mut session = session(MockEngine::two_inputs(), &[]);
    let short = nms_payload(2, 0, 1, 0.5, 0.3, 0.0, &[0.0; 8], &[]);
    assert_eq!(status_of(&session.dispatch(&with_opcode(5, &short))), -2);

    let bad = nms_payload(1, 7, 1, 0.5, 0.3, 0.0, &[0.0; 4], &[0.9]);
    assert_eq!(status_of(&session.dispatch(&with_opcode(5, &bad))), -3);
}

#[test]
fn nms_with_no_boxes_and_huge_class_count() {
    let mut session = session(MockEngine::two_inputs(), &[]);
    let payload = nms_payload(0, 0, u32::MAX, 0.5, 0.3, 0.0, &[], &[]);
    let reply = session.dispatch(&with_opcode(5, &payload));
    assert_eq!(reply, b"{}");

    // still serving
    assert_eq!(status_of(&session.dispatch(&[2])), 0);
}

fn detection_outputs() -> MockEngine {
    let mut engine = MockEngine::new(
        vec![],
        vec![
            TensorDescriptor::new("boxes", ElementType::Float32, &[1, 3, 4]),
            TensorDescriptor::new("scores", ElementType::Float32, &[1, 3, 2]),
            TensorDescriptor::new("ids", ElementType::Int64, &[1, 3, 1]),
        ],
    );
    engine.set_output_f32(
        0,
        &[1, 3, 4],
        &[
            0.0, 0.0, 10.0, 10.0, //
            0.0, 0.0, 10.0, 9.0, //
            50.0, 50.0, 60.0, 60.0,
        ],
    );
    engine.set_output_f32(1, &[1, 3, 2], &[0.9, 0.0, 0.8, 0.0, 0.0, 0.7]);
    engine
}

fn nms_outputs_payload(boxes_index: u32, scores_index: u32) -> Vec<u8> {
    let mut payload = nms_payload(0, 0x200 | 0x100 | 2, 0, 0.5, 0.3, 0.0, &[], &[]);
    payload.extend_from_slice(&boxes_index.to_le_bytes());
    payload.extend_from_slice(&scores_index.to_le_bytes());
    with_opcode(5, &payload)
}

#[test]
fn nms_command_over_engine_outputs() {
    let mut session = session(detection_outputs(), &["cat", "dog"]);
    let reply = session.dispatch(&nms_outputs_payload(0, 1));
    let result: serde_json::Value = serde_json::from_slice(&reply).unwrap();

    assert_eq!(result.as_object().unwrap().len(), 2);
    assert_eq!(result["cat"].as_array().unwrap().len(), 1);
    assert_eq!(result["cat"][0][0].as_f64().unwrap() as f32, 0.9);
    assert_eq!(result["cat"][0][5], 0);
    assert_eq!(result["dog"].as_array().unwrap().len(), 1);
    assert_eq!(result["dog"][0][5], 2);
}

#[test]
fn nms_command_over_engine_outputs_errors() {
    let mut session = session(detection_outputs(), &["cat", "dog"]);
    // no such output
    assert_eq!(status_of(&session.dispatch(&nms_outputs_payload(0, 9))), -1);
    // scores tensor used as boxes
    assert_eq!(status_of(&session.dispatch(&nms_outputs_payload(1, 1))), -2);
    // int64 scores
    assert_eq!(status_of(&session.dispatch(&nms_outputs_payload(0, 2))), -3);
}

fn framed(message: &[u8]) -> Vec<u8> {
    let mut out = (message.len() as u32).to_be_bytes().to_vec();
    out.extend_from_slice(message);
    out
}

fn unframe(mut wire: &[u8]) -> Vec<Vec<u8>> {
    let mut replies = Vec::new();
    while wire.len() >= 4 {
        let len = u32::from_be_bytes([wire[0], wire[1], wire[2], wire[3]]) as usize;
        replies.push(wire[4..4 + len].to_vec());
        wire = &wire[4 + len..];
    }
    assert!(wire.is_empty());
    replies
}

#[test]
fn serve_answers_until_eof() {
    let mut input = Vec::new();
    input.extend_from_slice(&framed(&with_opcode(
        1,
        &raw_record(0, &f32_ne_bytes(&[4.0, 3.0, 2.0, 1.0])),
    )));
    input.extend_from_slice(&framed(&[2]));
    input.extend_from_slice(&framed(&with_opcode(3, &0u32.to_le_bytes())));
    input.extend_from_slice(&framed(&[]));
    input.extend_from_slice(&framed(&[42]));

    let mut session = session(MockEngine::two_inputs(), &[]);
    let mut port = PacketPort::new(Cursor::new(input), Vec::new());
    session.serve(&mut port).unwrap();

    let (_, output) = port.into_parts();
    let replies = unframe(&output);
    assert_eq!(replies.len(), 5);
    assert_eq!(status_of(&replies[0]), 0);
    assert_eq!(status_of(&replies[1]), 0);
    assert_eq!(f32_from_ne(&replies[2]), [4.0, 3.0, 2.0, 1.0]);
    assert_eq!(replies[3], UNKNOWN_COMMAND);
    assert_eq!(replies[4], UNKNOWN_COMMAND);
}

#[test]
fn serve_stops_on_truncated_frame() {
    let mut input = framed(&[2]);
    input.extend_from_slice(&100u32.to_be_bytes());
    input.extend_from_slice(&[0u8; 10]);

    let mut session = session(MockEngine::two_inputs(), &[]);
    let mut port = PacketPort::new(Cursor::new(input), Vec::new());
    assert!(session.serve(&mut port).is_err());

    let (_, output) = port.into_parts();
    assert_eq!(unframe(&output).len(), 1);
    assert_eq!(session.engine().invoke_count, 1);
}

struct ClosedPipe;

impl Write for ClosedPipe {
    fn write(&mut self, _: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "parent went away"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn serve_stops_when_reply_cannot_be_sent() {
    let mut input = framed(&[2]);
    input.extend_from_slice(&framed(&[2]));

    let mut session = session(MockEngine::two_inputs(), &[]);
    let mut port = PacketPort::new(Cursor::new(input), ClosedPipe);
    let err = session.serve(&mut port).unwrap_err();

    assert!(matches!(err, FrameError::Io(_)), "{:?}", err);
    assert_eq!(session.engine().invoke_count, 1);
}
