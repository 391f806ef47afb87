use serde_json::json;

/// In-band result code of a tensor or run command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    IndexOutOfRange,
    SizeMismatch,
    Unsupported,
    InvokeFailed,
}

impl Status {
    pub fn code(&self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::IndexOutOfRange => -1,
            Status::SizeMismatch => -2,
            Status::Unsupported => -3,
            Status::InvokeFailed => -4,
        }
    }

    pub fn is_ok(&self) -> bool {
        *self == Status::Ok
    }

    /// `{"status": code}` as sent back for JSON-replying commands.
    pub fn to_json(&self) -> Vec<u8> {
        json!({ "status": self.code() }).to_string().into_bytes()
    }
}
