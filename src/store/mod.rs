mod ops;
mod state;
mod store;
mod sync;

pub(crate) use ops::process_bump;
pub(crate) use ops::process_create;
pub(crate) use ops::process_delete;
pub(crate) use ops::process_delete_absolute;
pub(crate) use ops::process_erase;
pub(crate) use ops::process_modify;
pub(crate) use ops::process_query;
pub(crate) use ops::process_replace;
pub(crate) use ops::process_upgrade;
pub(crate) use state::new as new_state_channel;
pub use state::CibStateListener;
pub(crate) use state::CibStateNotifier;
pub use state::CibStateSnapshot;
pub(crate) use store::CibStore;
pub(crate) use store::CibStoreConfig;
pub use store::FatalError;
pub use store::NodeExit;
pub(crate) use store::OpOutput;
pub(crate) use sync::process_apply_diff;
pub(crate) use sync::process_noop;
pub(crate) use sync::process_ping;
pub(crate) use sync::process_quit;
pub(crate) use sync::process_readwrite;
pub(crate) use sync::process_shutdown_req;
pub(crate) use sync::process_sync;
pub(crate) use sync::process_sync_one;

#[cfg(test)]
pub(crate) use store::test_support;
