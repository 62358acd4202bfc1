use std::fmt;

/// CibStatus is the closed set of result codes returned for every call.
///
/// The numeric codes are the wire representation. `Ok` is 0, everything else is negative.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CibStatus {
    Ok,
    UnknownOperation,
    NotConnected,
    NotAuthorized,
    SendFailed,
    ReplyFailed,
    MissingReturnCode,
    OutputData,
    CallbackRegister,
    CallbackToken,
    Unknown,
    Exists,
    NotExists,
    Activation,
    NoSection,
    NoObject,
    NoParent,
    NotSupported,
    NotMaster,
    RemoteTimeout,
    NoQuorum,
    DiffFailed,
    DiffResync,
    OldData,
    Validation,
    BadDigest,
    BadPermissions,
    InvalidArgument,
    DiskWriteFailed,
}

const TABLE: &[(CibStatus, i32, &str)] = &[
    (CibStatus::Ok, 0, "ok"),
    (CibStatus::UnknownOperation, -1, "invalid operation"),
    (CibStatus::NotConnected, -3, "not connected"),
    (CibStatus::NotAuthorized, -4, "not authorized"),
    (CibStatus::SendFailed, -5, "send failed"),
    (CibStatus::ReplyFailed, -6, "reply failed"),
    (CibStatus::MissingReturnCode, -7, "no return code"),
    (CibStatus::OutputData, -9, "corrupt output data"),
    (CibStatus::Unknown, -19, "Unknown error"),
    (CibStatus::Exists, -21, "The object already exists"),
    (CibStatus::NotExists, -22, "The object does not exist"),
    (CibStatus::Activation, -23, "Activation Failed"),
    (CibStatus::NoSection, -24, "Required section was missing"),
    (CibStatus::NoObject, -25, "The update was empty"),
    (CibStatus::NoParent, -26, "The parent object does not exist"),
    (CibStatus::NotSupported, -29, "Supplied information is not supported"),
    (CibStatus::CallbackToken, -31, "callback token not found"),
    (CibStatus::CallbackRegister, -32, "couldnt register callback channel"),
    (CibStatus::NotMaster, -35, "Local service is not the master instance"),
    (CibStatus::RemoteTimeout, -41, "Remote node did not respond"),
    (CibStatus::NoQuorum, -42, "Write requires quorum"),
    (CibStatus::DiffFailed, -43, "Application of an update diff failed"),
    (
        CibStatus::DiffResync,
        -44,
        "Application of an update diff failed, requesting a full refresh",
    ),
    (CibStatus::OldData, -45, "Discarded old update"),
    (CibStatus::Validation, -47, "Update does not conform to the configured schema"),
    (CibStatus::BadDigest, -49, "The stored digest does not match the document"),
    (CibStatus::BadPermissions, -50, "Insufficient privileges to access the store"),
    (CibStatus::InvalidArgument, -52, "Invalid argument"),
    (CibStatus::DiskWriteFailed, -54, "Could not write to disk, writes are disabled"),
];

impl CibStatus {
    fn entry(&self) -> &'static (CibStatus, i32, &'static str) {
        // Every variant has a row.
        TABLE.iter().find(|(status, _, _)| status == self).unwrap_or(&TABLE[0])
    }

    pub fn code(&self) -> i32 {
        self.entry().1
    }

    /// Unknown codes map to `Unknown` rather than failing, so a newer peer can't wedge a reply.
    pub fn from_code(code: i32) -> CibStatus {
        TABLE
            .iter()
            .find(|(_, c, _)| *c == code)
            .map(|(status, _, _)| *status)
            .unwrap_or(CibStatus::Unknown)
    }

    pub fn description(&self) -> &'static str {
        self.entry().2
    }

    pub fn is_ok(&self) -> bool {
        *self == CibStatus::Ok
    }

    /// Ok for `CibStatus::Ok`, otherwise the status as an error.
    pub fn into_result(self) -> Result<(), CibStatus> {
        match self {
            CibStatus::Ok => Ok(()),
            failed => Err(failed),
        }
    }
}

impl fmt::Display for CibStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}

impl std::error::Error for CibStatus {}
