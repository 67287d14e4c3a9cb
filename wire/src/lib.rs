//! The length-framed, opcode-tagged message protocol spoken by every
//! component, over local pipes and TCP sockets alike.
//!
//! On-wire layout: `[1-byte opcode][10 ASCII-digit zero-padded body
//! length][body bytes]`. Bodies are treated as text by callers but may
//! contain arbitrary bytes.

pub mod connection;
pub mod message;

pub use connection::{read_message, write_message, Connection};
pub use message::{Message, Opcode, HEADER_LEN, LEN_DIGITS, MAX_BODY_LEN};

use thiserror::Error;

/// Transport and framing failures.
#[derive(Error, Debug)]
pub enum WireError {
    /// The peer closed or reset the connection before a complete
    /// header/body was read.
    #[error("connection reset by peer")]
    ConnectionReset,

    #[error("malformed message header: {0}")]
    BadHeader(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WireError>;
