//! This mod is meant to hold most of the code for the library's client-facing API.
mod client;
mod options;
mod wiring;

pub use client::CibNode;
pub use options::CibOptions;
pub use wiring::connect_remote;
pub use wiring::try_create_cib_node;
pub use wiring::CibNodeConfig;
pub use wiring::CibNodeCreationError;
pub use wiring::CibTransport;
