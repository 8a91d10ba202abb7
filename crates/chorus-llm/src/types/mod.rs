pub mod message;

pub use message::{Message, MessageKind, WireMessage};
