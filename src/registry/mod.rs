mod cleanup;
mod prepare;

pub(crate) use cleanup::cleanup;
pub(crate) use cleanup::CleanupKind;
pub(crate) use prepare::prepare;
pub(crate) use prepare::PrepareKind;
pub(crate) use prepare::PreparedInput;

use crate::call::{CibMessage, CibStatus};
use crate::store::{self, CibStore, OpOutput};

pub(crate) type ExecuteFn = fn(&mut CibStore, &CibMessage, &PreparedInput) -> Result<OpOutput, CibStatus>;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum OperationId {
    Query,
    Modify,
    ApplyDiff,
    Replace,
    Create,
    Delete,
    Sync,
    Bump,
    Erase,
    Noop,
    DeleteAbsolute,
    Upgrade,
    Slave,
    SlaveAll,
    SyncOne,
    Master,
    IsMaster,
    ShutdownRequest,
    Quit,
    Ping,
}

/// OperationDescriptor says what an operation may do and how to run it. Prepare, execute and
/// cleanup of one operation are always looked up together.
pub(crate) struct OperationDescriptor {
    pub(crate) id: OperationId,
    pub(crate) name: &'static str,
    pub(crate) modifies: bool,
    pub(crate) needs_privilege: bool,
    pub(crate) prepare: PrepareKind,
    pub(crate) cleanup: CleanupKind,
    pub(crate) execute: ExecuteFn,
}

impl OperationDescriptor {
    /// Role changes are the only privileged writes a slave accepts from clients.
    pub(crate) fn is_role_change(&self) -> bool {
        matches!(
            self.id,
            OperationId::Master | OperationId::Slave | OperationId::SlaveAll | OperationId::IsMaster
        )
    }
}

impl std::fmt::Debug for OperationDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

macro_rules! operation {
    ($id:ident, $name:expr, $modifies:expr, $privileged:expr, $prepare:ident, $cleanup:ident, $execute:path) => {
        OperationDescriptor {
            id: OperationId::$id,
            name: $name,
            modifies: $modifies,
            needs_privilege: $privileged,
            prepare: PrepareKind::$prepare,
            cleanup: CleanupKind::$cleanup,
            execute: $execute,
        }
    };
}

#[rustfmt::skip]
static OPERATIONS: [OperationDescriptor; 20] = [
    //         id               name                modifies priv   prepare cleanup
    operation!(Query,           "query",            false, false, None, Query,  store::process_query),
    operation!(Modify,          "modify",           true,  true,  Data, Data,   store::process_modify),
    operation!(ApplyDiff,       "apply-diff",       true,  true,  Diff, Data,   store::process_apply_diff),
    operation!(Replace,         "replace",          true,  true,  Data, Data,   store::process_replace),
    operation!(Create,          "create",           true,  true,  Data, Data,   store::process_create),
    operation!(Delete,          "delete",           true,  true,  Data, Data,   store::process_delete),
    operation!(Sync,            "sync",             false, true,  Sync, Sync,   store::process_sync),
    operation!(Bump,            "bump",             true,  true,  None, Output, store::process_bump),
    operation!(Erase,           "erase",            true,  true,  None, Output, store::process_erase),
    operation!(Noop,            "noop",             false, false, None, None,   store::process_noop),
    operation!(DeleteAbsolute,  "delete-absolute",  true,  true,  Data, Data,   store::process_delete_absolute),
    operation!(Upgrade,         "upgrade",          true,  true,  None, Output, store::process_upgrade),
    operation!(Slave,           "slave",            false, true,  None, None,   store::process_readwrite),
    operation!(SlaveAll,        "slave-all",        false, true,  None, None,   store::process_readwrite),
    operation!(SyncOne,         "sync-one",         false, true,  Sync, Sync,   store::process_sync_one),
    operation!(Master,          "master",           true,  true,  Data, Data,   store::process_readwrite),
    operation!(IsMaster,        "is-master",        false, true,  None, None,   store::process_readwrite),
    operation!(ShutdownRequest, "shutdown-request", false, true,  Sync, Sync,   store::process_shutdown_req),
    operation!(Quit,            "quit",             false, true,  None, None,   store::process_quit),
    operation!(Ping,            "ping",             false, false, None, Output, store::process_ping),
];

#[derive(Debug, PartialEq, thiserror::Error)]
pub(crate) enum RegistryError {
    #[error("Unknown operation '{0}'")]
    UnknownOperation(String),
    #[error("Operation '{0}' needs a privileged caller")]
    NotAuthorized(&'static str),
}

impl From<RegistryError> for CibStatus {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::UnknownOperation(_) => CibStatus::UnknownOperation,
            RegistryError::NotAuthorized(_) => CibStatus::NotAuthorized,
        }
    }
}

/// Exact, case-sensitive lookup.
pub(crate) fn resolve(name: &str) -> Result<&'static OperationDescriptor, RegistryError> {
    OPERATIONS
        .iter()
        .find(|op| op.name == name)
        .ok_or_else(|| RegistryError::UnknownOperation(name.to_string()))
}

/// Quorum is not checked, `quorum_override` has nothing to override.
pub(crate) fn authorize(op: &OperationDescriptor, caller_is_privileged: bool) -> Result<(), RegistryError> {
    if op.needs_privilege && !caller_is_privileged {
        return Err(RegistryError::NotAuthorized(op.name));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_name_resolves_to_its_own_row() {
        for op in OPERATIONS.iter() {
            assert_eq!(resolve(op.name).map(|d| d.id), Ok(op.id));
        }
    }

    #[test]
    fn lookup_is_exact() {
        assert!(resolve("query").is_ok());
        assert_eq!(
            resolve("Query").map(|d| d.id),
            Err(RegistryError::UnknownOperation("Query".into()))
        );
        assert!(resolve("cib_query").is_err());
        assert!(resolve("").is_err());
    }

    #[test]
    fn unprivileged_callers_only_get_reads() {
        let query = resolve("query").unwrap();
        let modify = resolve("modify").unwrap();

        assert!(authorize(query, false).is_ok());
        assert_eq!(authorize(modify, false), Err(RegistryError::NotAuthorized("modify")));
        assert!(authorize(modify, true).is_ok());
    }

    #[test]
    fn flags_match_operation_semantics() {
        let op = |name| resolve(name).unwrap();

        assert!(op("bump").modifies);
        assert!(!op("query").modifies);
        assert!(op("sync-one").needs_privilege);
        assert!(!op("ping").needs_privilege);
        assert!(op("master").is_role_change());
        assert!(!op("replace").is_role_change());
    }
}
