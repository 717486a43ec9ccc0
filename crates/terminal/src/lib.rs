//! Control over an external terminal multiplexer and the per-connection
//! PTY attach bridge that rides on top of it.

pub mod attach;
pub mod error;
pub mod multiplexer;

pub use attach::Attach;
pub use error::{TerminalError, TerminalResult};
pub use multiplexer::{Multiplexer, MultiplexerSession, SESSION_PREFIX};
