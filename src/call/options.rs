use std::fmt;
use std::ops::BitOr;

/// CallOptions is the bitset of caller supplied flags carried on every request.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct CallOptions(u32);

impl CallOptions {
    pub const NONE: CallOptions = CallOptions(0);
    pub const VERBOSE: CallOptions = CallOptions(0x1);
    pub const XPATH: CallOptions = CallOptions(0x2);
    pub const MULTIPLE: CallOptions = CallOptions(0x4);
    pub const CAN_CREATE: CallOptions = CallOptions(0x8);
    pub const DISCARD_REPLY: CallOptions = CallOptions(0x10);
    pub const NO_CHILDREN: CallOptions = CallOptions(0x20);
    pub const SCOPE_LOCAL: CallOptions = CallOptions(0x100);
    pub const SYNC_CALL: CallOptions = CallOptions(0x1000);
    pub const INHIBIT_NOTIFY: CallOptions = CallOptions(0x10000);
    pub const QUORUM_OVERRIDE: CallOptions = CallOptions(0x100000);
    pub const INHIBIT_BCAST: CallOptions = CallOptions(0x1000000);
    pub const FORCE_DIFF: CallOptions = CallOptions(0x10000000);

    const NAMES: [(CallOptions, &'static str); 12] = [
        (Self::VERBOSE, "verbose"),
        (Self::XPATH, "xpath"),
        (Self::MULTIPLE, "multiple"),
        (Self::CAN_CREATE, "can_create"),
        (Self::DISCARD_REPLY, "discard_reply"),
        (Self::NO_CHILDREN, "no_children"),
        (Self::SCOPE_LOCAL, "scope_local"),
        (Self::SYNC_CALL, "sync_call"),
        (Self::INHIBIT_NOTIFY, "inhibit_notify"),
        (Self::QUORUM_OVERRIDE, "quorum_override"),
        (Self::INHIBIT_BCAST, "inhibit_bcast"),
        (Self::FORCE_DIFF, "force_diff"),
    ];

    pub fn from_bits(bits: u32) -> Self {
        CallOptions(bits)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: CallOptions) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn with(self, other: CallOptions) -> Self {
        CallOptions(self.0 | other.0)
    }

    pub fn without(self, other: CallOptions) -> Self {
        CallOptions(self.0 & !other.0)
    }

    pub fn is_sync(&self) -> bool {
        self.contains(Self::SYNC_CALL)
    }

    pub fn discards_reply(&self) -> bool {
        self.contains(Self::DISCARD_REPLY)
    }
}

impl BitOr for CallOptions {
    type Output = CallOptions;

    fn bitor(self, rhs: CallOptions) -> CallOptions {
        self.with(rhs)
    }
}

impl fmt::Debug for CallOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "CallOptions({:#x} [{}])", self.0, names.join("|"))
    }
}
