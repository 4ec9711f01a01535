//! The wire contract: typed messages, envelopes, and framing.

pub mod envelope;
pub mod messages;
pub mod wire;

pub use envelope::{
    Method, MethodDescriptor, RequestEnvelope, ResponseEnvelope, RpcResult, WireError, METHODS,
    PROTOCOL_VERSION,
};
pub use messages::*;
pub use wire::{read_frame, write_frame};
