mod call_id;
mod channel;
mod client;
mod envelope;
mod options;
mod session;
mod status;
mod wire;

pub use call_id::CallId;
pub(crate) use call_id::CallIdAllocator;
pub(crate) use channel::GrpcChannel;
pub(crate) use channel::LocalChannel;
pub use client::CallError;
pub use client::CallOutcome;
pub use client::CibConnection;
pub use client::NotifyCallback;
pub use client::ReplyCallback;
pub use envelope::notify_events;
pub use envelope::CibMessage;
pub use envelope::MessageKind;
pub use envelope::Payload;
pub use options::CallOptions;
pub(crate) use session::CommandReply;
pub(crate) use session::SessionError;
pub(crate) use session::SessionRouter;
pub use status::CibStatus;
pub(crate) use wire::decode_message;
pub(crate) use wire::encode_message;
pub use wire::WireError;
