use std::fmt;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Role {
    Master,
    Slave,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Master => write!(f, "master"),
            Role::Slave => write!(f, "slave"),
        }
    }
}

/// RoleState is the read-write authority of this node.
#[derive(Debug)]
pub(crate) struct RoleState {
    role: Role,
    synced_once: bool,
}

impl RoleState {
    pub(crate) fn new(role: Role) -> Self {
        RoleState {
            role,
            synced_once: false,
        }
    }

    pub(crate) fn role(&self) -> Role {
        self.role
    }

    pub(crate) fn is_master(&self) -> bool {
        self.role == Role::Master
    }

    pub(crate) fn synced_once(&self) -> bool {
        self.synced_once
    }

    /// Returns false when we were already master.
    pub(crate) fn request_master(&mut self) -> bool {
        if self.is_master() {
            return false;
        }
        self.role = Role::Master;
        self.synced_once = true;
        true
    }

    /// Returns false when we were already a slave.
    pub(crate) fn request_slave(&mut self) -> bool {
        if !self.is_master() {
            return false;
        }
        self.role = Role::Slave;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion_is_idempotent() {
        let mut state = RoleState::new(Role::Slave);

        assert!(state.request_master());
        assert!(state.synced_once());
        assert!(!state.request_master());
        assert!(state.is_master());
    }

    #[test]
    fn demotion_only_from_master() {
        let mut state = RoleState::new(Role::Slave);
        assert!(!state.request_slave());

        let mut state = RoleState::new(Role::Master);
        assert!(state.request_slave());
        assert_eq!(state.role(), Role::Slave);
    }
}
