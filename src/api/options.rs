use std::convert::TryFrom;
use tokio::time::Duration;

/// Tunables of a node. Every `None` falls back to a default.
#[derive(Clone, Debug, Default)]
pub struct CibOptions {
    /// Diff failures tolerated while a full refresh is pending before asking again.
    pub resync_threshold: Option<u32>,
    pub backup_wrap_limit: Option<u32>,
    /// Defaults to true for a node without peers.
    pub start_as_master: Option<bool>,
    pub disk_writes_enabled: Option<bool>,
    pub peer_rpc_timeout: Option<Duration>,
    /// How long sync calls of local connections wait for their reply.
    pub call_timeout: Option<Duration>,
    pub series_name: Option<String>,
    /// Move a primary copy that fails its digest check aside before falling back to backups.
    pub archive_on_digest_failure: Option<bool>,
    pub privileged_remote_clients: Option<bool>,
}

#[derive(Debug)]
pub(super) struct CibOptionsValidated {
    pub resync_threshold: u32,
    pub backup_wrap_limit: u32,
    pub start_as_master: Option<bool>,
    pub disk_writes_enabled: bool,
    pub peer_rpc_timeout: Duration,
    pub call_timeout: Duration,
    pub series_name: String,
    pub archive_on_digest_failure: bool,
    pub privileged_remote_clients: bool,
}

impl CibOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if self.resync_threshold == 0 {
            return Err("Resync threshold must be greater than 0");
        }
        if self.backup_wrap_limit == 0 {
            return Err("Backup wrap limit must be greater than 0");
        }
        if self.peer_rpc_timeout == Duration::from_secs(0) {
            return Err("Peer RPC timeout must be greater than 0");
        }
        if self.call_timeout == Duration::from_secs(0) {
            return Err("Call timeout must be greater than 0");
        }
        if self.series_name.is_empty() || self.series_name.contains('/') {
            return Err("Series name must be a non-empty file name");
        }

        Ok(())
    }
}

impl TryFrom<CibOptions> for CibOptionsValidated {
    type Error = &'static str;

    fn try_from(options: CibOptions) -> Result<Self, Self::Error> {
        let values = CibOptionsValidated {
            resync_threshold: options.resync_threshold.unwrap_or(5),
            backup_wrap_limit: options.backup_wrap_limit.unwrap_or(100),
            start_as_master: options.start_as_master,
            disk_writes_enabled: options.disk_writes_enabled.unwrap_or(true),
            peer_rpc_timeout: options.peer_rpc_timeout.unwrap_or(Duration::from_secs(2)),
            call_timeout: options.call_timeout.unwrap_or(Duration::from_secs(30)),
            series_name: options.series_name.unwrap_or_else(|| "cib".to_string()),
            archive_on_digest_failure: options.archive_on_digest_failure.unwrap_or(true),
            privileged_remote_clients: options.privileged_remote_clients.unwrap_or(false),
        };

        values.validate()?;
        Ok(values)
    }
}
