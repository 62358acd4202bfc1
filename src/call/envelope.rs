use crate::call::{CallId, CallOptions, CibStatus};
use crate::document::{Diff, Element};
use crate::replication::NodeId;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// Requests and replies, from clients and from peers.
    Command,
    /// Document change notifications pushed on the callback channel.
    Notify,
    /// First message on a callback channel. Carries the client's token.
    Register,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Command => "cib",
            MessageKind::Notify => "cib_notify",
            MessageKind::Register => "cib_register",
        }
    }

    pub fn from_wire(kind: &str) -> Option<Self> {
        match kind {
            "cib" => Some(MessageKind::Command),
            "cib_notify" => Some(MessageKind::Notify),
            "cib_register" => Some(MessageKind::Register),
            _ => None,
        }
    }
}

/// Payload carried in `calldata`. Most operations carry a (partial) document, `apply-diff` may
/// carry a diff instead.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Document(Element),
    Diff(Diff),
}

impl Payload {
    pub fn as_document(&self) -> Option<&Element> {
        match self {
            Payload::Document(doc) => Some(doc),
            Payload::Diff(_) => None,
        }
    }

    pub fn into_document(self) -> Option<Element> {
        match self {
            Payload::Document(doc) => Some(doc),
            Payload::Diff(_) => None,
        }
    }
}

/// Notification event names.
pub mod notify_events {
    pub const DIFF: &str = "cib_diff_notify";
    pub const REFRESH: &str = "cib_refresh_notify";
}

/// CibMessage is the call envelope. Requests, replies, peer updates and notifications all use it.
#[derive(Clone, Debug, PartialEq)]
pub struct CibMessage {
    pub kind: MessageKind,
    pub operation: String,
    pub call_id: CallId,
    pub call_options: CallOptions,
    pub client_id: Option<String>,
    pub client_name: Option<String>,
    pub section: Option<String>,
    /// Target host for requests, replying host for replies.
    pub host: Option<NodeId>,
    /// Node that authored the message.
    pub origin: Option<NodeId>,
    pub result: Option<CibStatus>,
    pub calldata: Option<Payload>,
    pub update_diff: Option<Diff>,
    pub is_reply: bool,
    pub global_update: bool,
    pub original_operation: Option<String>,
    pub delegated_from: Option<NodeId>,
    pub notify_event: Option<String>,
}

impl CibMessage {
    pub fn request<O: Into<String>>(operation: O, call_options: CallOptions) -> Self {
        CibMessage {
            kind: MessageKind::Command,
            operation: operation.into(),
            call_id: CallId::NONE,
            call_options,
            client_id: None,
            client_name: None,
            section: None,
            host: None,
            origin: None,
            result: None,
            calldata: None,
            update_diff: None,
            is_reply: false,
            global_update: false,
            original_operation: None,
            delegated_from: None,
            notify_event: None,
        }
    }

    pub fn with_section<S: Into<String>>(mut self, section: S) -> Self {
        self.section = Some(section.into());
        self
    }

    pub fn with_document(mut self, doc: Element) -> Self {
        self.calldata = Some(Payload::Document(doc));
        self
    }

    pub fn with_host(mut self, host: NodeId) -> Self {
        self.host = Some(host);
        self
    }

    /// Reply skeleton echoing the request's correlation fields.
    pub fn reply(&self, result: CibStatus, output: Option<Element>) -> CibMessage {
        CibMessage {
            kind: MessageKind::Command,
            operation: self.operation.clone(),
            call_id: self.call_id,
            call_options: self.call_options,
            client_id: self.client_id.clone(),
            client_name: self.client_name.clone(),
            section: self.section.clone(),
            host: None,
            origin: None,
            result: Some(result),
            calldata: output.map(Payload::Document),
            update_diff: None,
            is_reply: true,
            global_update: false,
            original_operation: None,
            delegated_from: None,
            notify_event: None,
        }
    }

    pub fn notification(event: &str, operation: &str, result: CibStatus, diff: Option<Diff>) -> CibMessage {
        let mut message = CibMessage::request(operation, CallOptions::NONE);
        message.kind = MessageKind::Notify;
        message.result = Some(result);
        message.update_diff = diff;
        message.notify_event = Some(event.to_string());
        message
    }

    pub fn document(&self) -> Option<&Element> {
        self.calldata.as_ref().and_then(Payload::as_document)
    }

    pub fn into_document(self) -> Option<Element> {
        self.calldata.and_then(Payload::into_document)
    }
}
