//! Core protocol types for streaming Twirp clients.
//!
//! This crate holds the parts of the protocol that do not depend on an HTTP
//! stack, shared by the client and by anything that needs to produce the
//! streaming wire format (test servers, demos).
//!
//! ## Contents
//!
//! - [`Code`] and [`CallError`]: Twirp error codes and the unified call error
//! - [`TwirpErrorPayload`] and [`parse_error_payload`]: JSON error payloads
//! - [`MESSAGE_TAG`], [`TRAILER_TAG`], varint codec and frame encoders
//! - [`print_bytes`] and [`hex_bytes`]: byte printing helpers

mod debug;
mod error;
mod frame;
mod payload;

pub use debug::*;
pub use error::*;
pub use frame::*;
pub use payload::*;
