//! Composer control protocol: command encoding, line framing and message parsing

pub mod command;
pub mod framing;
pub mod parser;

pub use command::{Command, Direction, LINE_ENDING};
pub use framing::LineBuffer;
pub use parser::{Message, MessageParser, PUSH_ENABLED_HEADER};
