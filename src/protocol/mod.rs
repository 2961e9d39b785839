//! Unified test event protocol
//!
//! Provides:
//! - The closed event vocabulary every adapter speaks
//! - The wire encoder (and its inverse) for one message per line
//! - An owned output stream and the typed reporter built on top of it

pub mod message;
pub mod reporter;
pub mod stream;
pub mod vocabulary;

pub use message::{decode, encode, escape_value, unescape_value, MessageType, TestMessage};
pub use reporter::Reporter;
pub use stream::TestOutputStream;
pub use vocabulary::EventKind;
