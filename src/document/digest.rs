use crate::document::{codec, DocumentError, Element};
use sha2::{Digest, Sha256};

/// Hex encoded SHA-256 over the canonical form of `doc`.
pub fn calculate_digest(doc: &Element) -> Result<String, DocumentError> {
    let canonical = codec::canonical(doc)?;
    Ok(hex::encode(Sha256::digest(&canonical)))
}

/// Digest of serialized document bytes, e.g. a file as it landed on disk.
pub fn digest_of_bytes(raw: &[u8]) -> Result<String, DocumentError> {
    let doc = codec::parse(raw)?;
    calculate_digest(&doc)
}
