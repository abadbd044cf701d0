//! Byte encoding of persisted records and version markers.
//!
//! Field maps are stored as postcard blobs. The version marker is stored as
//! its display form (`1.0.0`) so it stays readable with stock tooling.

use std::collections::BTreeMap;

use strata_migrate::{RecordId, SchemaVersion, Value};

use crate::error::StoreError;

/// Meta key under which every adapter persists the version marker.
pub const VERSION_KEY: &str = "schema_version";

pub fn encode_fields(fields: &BTreeMap<String, Value>) -> Result<Vec<u8>, StoreError> {
    postcard::to_allocvec(fields).map_err(|e| StoreError::Codec(e.to_string()))
}

pub fn decode_fields(bytes: &[u8]) -> Result<BTreeMap<String, Value>, StoreError> {
    postcard::from_bytes(bytes).map_err(|e| StoreError::Codec(e.to_string()))
}

pub fn encode_version(version: SchemaVersion) -> String {
    version.to_string()
}

pub fn decode_version(text: &str) -> Result<SchemaVersion, StoreError> {
    text.parse()
        .map_err(|e| StoreError::Corrupt(format!("version marker `{text}`: {e}")))
}

pub fn decode_id(text: &str) -> Result<RecordId, StoreError> {
    text.parse()
        .map_err(|e| StoreError::Corrupt(format!("record id `{text}`: {e}")))
}
