//! The JSON encoding boundary (§6).
//!
//! `value` in the primary table is the canonical JSON encoding of a
//! [`Collection`]; `collection_id_blob_base64` in the FTS tables is standard
//! base64 of the JSON encoding of a [`CollectionIdentifier`]. Both directions
//! go through this module exclusively so reads and writes round-trip
//! byte-for-byte (Invariant 4, §3) — `serde_json` serializes struct fields in
//! declaration order, which is deterministic by construction, so no separate
//! canonicalization pass is needed.

use base64::Engine as _;

use crate::error::Result;
use crate::identifier::CollectionIdentifier;
use crate::model::Collection;

/// Encode a collection to the bytes stored in the primary table's `value`
/// column.
pub fn encode_collection(collection: &Collection) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(collection)?)
}

/// Decode a primary-table `value` blob back into a [`Collection`].
pub fn decode_collection(bytes: &[u8]) -> Result<Collection> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Standard (non-URL-safe) base64 of the JSON encoding of an identifier —
/// the `collection_id_blob_base64` FTS column value.
pub fn identifier_base64(identifier: &CollectionIdentifier) -> Result<String> {
    let json = serde_json::to_vec(identifier)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(json))
}
