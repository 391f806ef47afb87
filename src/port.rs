mod codec;
mod command;
mod framing;
mod session;

pub use codec::*;
pub use command::*;
pub use framing::*;
pub use session::*;
