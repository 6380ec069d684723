//! Small shared helpers used across identity/pairing/session modules.

use base64::{engine::general_purpose::STANDARD, Engine};

pub fn b64_encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn b64_decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(s)
}
