use crate::call::{CallId, CallOptions, CibMessage, CibStatus, MessageKind, Payload};
use crate::document::Diff;
use crate::grpc::ProtoCibMessage;
use crate::replication::NodeId;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("Unknown message type '{0}'")]
    UnknownKind(String),
    #[error("Missing operation")]
    MissingOperation,
    #[error("Malformed calldata: {0}")]
    Calldata(serde_json::Error),
    #[error("Malformed update diff: {0}")]
    UpdateDiff(serde_json::Error),
    #[error("Failed to encode payload: {0}")]
    Encode(serde_json::Error),
}

pub(crate) fn encode_message(message: &CibMessage) -> Result<ProtoCibMessage, WireError> {
    let calldata = match &message.calldata {
        Some(payload) => serde_json::to_vec(payload).map_err(WireError::Encode)?,
        None => Vec::new(),
    };
    let update_diff = match &message.update_diff {
        Some(diff) => serde_json::to_vec(diff).map_err(WireError::Encode)?,
        None => Vec::new(),
    };

    Ok(ProtoCibMessage {
        msg_type: message.kind.as_str().to_string(),
        operation: message.operation.clone(),
        call_id: message.call_id.as_i32(),
        call_options: message.call_options.bits(),
        client_id: string_or_empty(&message.client_id),
        client_name: string_or_empty(&message.client_name),
        section: string_or_empty(&message.section),
        host: node_or_empty(&message.host),
        origin: node_or_empty(&message.origin),
        has_rc: message.result.is_some(),
        rc: message.result.map(|rc| rc.code()).unwrap_or(0),
        calldata,
        update_diff,
        is_reply: message.is_reply,
        global_update: message.global_update,
        original_operation: string_or_empty(&message.original_operation),
        delegated_from: node_or_empty(&message.delegated_from),
        notify_event: string_or_empty(&message.notify_event),
    })
}

pub(crate) fn decode_message(proto: ProtoCibMessage) -> Result<CibMessage, WireError> {
    let kind = MessageKind::from_wire(&proto.msg_type).ok_or_else(|| WireError::UnknownKind(proto.msg_type.clone()))?;
    if proto.operation.is_empty() && kind != MessageKind::Register {
        return Err(WireError::MissingOperation);
    }

    let calldata = if proto.calldata.is_empty() {
        None
    } else {
        Some(serde_json::from_slice::<Payload>(&proto.calldata).map_err(WireError::Calldata)?)
    };
    let update_diff = if proto.update_diff.is_empty() {
        None
    } else {
        Some(serde_json::from_slice::<Diff>(&proto.update_diff).map_err(WireError::UpdateDiff)?)
    };

    Ok(CibMessage {
        kind,
        operation: proto.operation,
        call_id: CallId::new(proto.call_id),
        call_options: CallOptions::from_bits(proto.call_options),
        client_id: empty_to_none(proto.client_id),
        client_name: empty_to_none(proto.client_name),
        section: empty_to_none(proto.section),
        host: empty_to_none(proto.host).map(NodeId::new),
        origin: empty_to_none(proto.origin).map(NodeId::new),
        result: if proto.has_rc {
            Some(CibStatus::from_code(proto.rc))
        } else {
            None
        },
        calldata,
        update_diff,
        is_reply: proto.is_reply,
        global_update: proto.global_update,
        original_operation: empty_to_none(proto.original_operation),
        delegated_from: empty_to_none(proto.delegated_from).map(NodeId::new),
        notify_event: empty_to_none(proto.notify_event),
    })
}

fn string_or_empty(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn node_or_empty(value: &Option<NodeId>) -> String {
    value.as_ref().map(|n| n.as_str().to_string()).unwrap_or_default()
}

fn empty_to_none(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{empty_document, Element};

    #[test]
    fn optional_fields_survive_the_wire() {
        let mut message = CibMessage::request("modify", CallOptions::SYNC_CALL | CallOptions::CAN_CREATE)
            .with_section("nodes")
            .with_document(Element::new("nodes"));
        message.call_id = CallId::new(12);
        message.origin = Some(NodeId::new("node-a"));
        message.result = Some(CibStatus::NotMaster);

        let decoded = decode_message(encode_message(&message).unwrap()).unwrap();

        assert_eq!(decoded, message);
    }

    #[test]
    fn missing_result_code_stays_missing() {
        let message = CibMessage::request("ping", CallOptions::NONE);
        let proto = encode_message(&message).unwrap();

        assert!(!proto.has_rc);
        assert_eq!(decode_message(proto).unwrap().result, None);
    }

    #[test]
    fn garbage_payload_is_rejected() {
        let mut proto = encode_message(&CibMessage::request("replace", CallOptions::NONE)).unwrap();
        proto.calldata = b"{not json".to_vec();

        assert!(matches!(decode_message(proto), Err(WireError::Calldata(_))));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let request = CibMessage::request("query", CallOptions::NONE).with_document(empty_document());
        let mut proto = encode_message(&request).unwrap();
        proto.msg_type = "crmd".to_string();

        assert!(matches!(decode_message(proto), Err(WireError::UnknownKind(_))));
    }
}
