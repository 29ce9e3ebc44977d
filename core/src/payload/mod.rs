//! Encrypted boot payloads: file format, discovery, operator selection.

pub mod discovery;
pub mod format;
pub mod selection;

pub use discovery::{
    discover_payloads, has_payload_extension, loader_digest, require_payloads, Classification,
    Origin, Payload,
};
pub use format::{Password, PayloadHeader, PayloadLayout, PAYLOAD_MAGIC, PAYLOAD_VERSION};
pub use selection::{resolve_choice, select_payload, Choice, Selection};
