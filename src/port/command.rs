/// Reply to an empty message or an opcode outside [`Command`].
pub const UNKNOWN_COMMAND: &[u8] = b"unknown command";

/// Opcode carried in the first byte of every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Info = 0,
    SetInputTensor = 1,
    Invoke = 2,
    GetOutputTensor = 3,
    Run = 4,
    NonMaxSuppression = 5,
}

impl Command {
    pub fn opcode(&self) -> u8 {
        *self as u8
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Info => "info",
            Command::SetInputTensor => "set_input_tensor",
            Command::Invoke => "invoke",
            Command::GetOutputTensor => "get_output_tensor",
            Command::Run => "run",
            Command::NonMaxSuppression => "non_max_suppression",
        }
    }
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(opcode: u8) -> Result<Self, Self::Error> {
        match opcode {
            0 => Ok(Command::Info),
            1 => Ok(Command::SetInputTensor),
            2 => Ok(Command::Invoke),
            3 => Ok(Command::GetOutputTensor),
            4 => Ok(Command::Run),
            5 => Ok(Command::NonMaxSuppression),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
