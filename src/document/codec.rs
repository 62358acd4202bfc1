use crate::document::Element;
use bytes::Bytes;

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("Failed to parse document: {0}")]
    Parse(serde_json::Error),
    #[error("Failed to serialize document: {0}")]
    Serialize(serde_json::Error),
}

/// Human readable form used for files on disk.
pub fn serialize(doc: &Element) -> Result<Bytes, DocumentError> {
    serde_json::to_vec_pretty(doc)
        .map(Bytes::from)
        .map_err(DocumentError::Serialize)
}

/// Compact form with a fixed attribute order. Whitespace and formatting of whatever the
/// document was parsed from do not show up here.
pub fn canonical(doc: &Element) -> Result<Vec<u8>, DocumentError> {
    serde_json::to_vec(doc).map_err(DocumentError::Serialize)
}

pub fn parse(raw: &[u8]) -> Result<Element, DocumentError> {
    serde_json::from_slice(raw).map_err(DocumentError::Parse)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formatting_does_not_change_canonical_form() {
        let doc = Element::new("cib")
            .with_attr("epoch", "2")
            .with_attr("admin_epoch", "0")
            .with_child(Element::new("status"));

        let pretty = serialize(&doc).unwrap();
        let reparsed = parse(&pretty).unwrap();

        assert_eq!(canonical(&reparsed).unwrap(), canonical(&doc).unwrap());
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(parse(b"<cib>"), Err(DocumentError::Parse(_))));
    }
}
