//! pp_proto — wire types and error taxonomy for the PearPass secure channel.
//!
//! # Modules
//! - `rpc`   — request/response types for each named façade operation (spec §6)
//! - `error` — stable error-code taxonomy (spec §7) and its `{code, message}` wire shape

pub mod error;
pub mod rpc;

pub use error::{ErrorKind, ErrorResponse, ProtocolError};
