/// ResyncState counts diffs refused since we asked for a full copy.
///
/// While the count is non-zero diffs are refused without being applied. Once it reaches the
/// threshold it is reset so a lost resync reply can't lock the node out forever.
#[derive(Debug)]
pub(crate) struct ResyncState {
    count: u32,
    threshold: u32,
}

#[derive(Debug, PartialEq)]
pub(crate) enum DiffGate {
    /// Try to apply the diff. `reset` is set when the counter just hit the ceiling.
    Proceed { reset: bool },
    /// A full copy is already on its way. `count` is the updated counter.
    Refuse { count: u32 },
}

impl ResyncState {
    pub(crate) fn new(threshold: u32) -> Self {
        ResyncState { count: 0, threshold }
    }

    pub(crate) fn count(&self) -> u32 {
        self.count
    }

    /// Masters never resync.
    pub(crate) fn pin_for_master(&mut self) {
        self.count = 0;
    }

    pub(crate) fn begin_diff(&mut self) -> DiffGate {
        if self.count >= self.threshold {
            self.count = 0;
            return DiffGate::Proceed { reset: true };
        }
        if self.count > 0 {
            self.count += 1;
            return DiffGate::Refuse { count: self.count };
        }
        DiffGate::Proceed { reset: false }
    }

    pub(crate) fn record_failure(&mut self) {
        self.count += 1;
    }

    pub(crate) fn clear(&mut self) {
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drives `failures` consecutive failing diffs. Returns whether the counter reset and how many
    /// resync requests would have gone out.
    fn fail_repeatedly(state: &mut ResyncState, failures: u32) -> (bool, u32) {
        let mut resets = false;
        let mut requests = 0;
        for _ in 0..failures {
            match state.begin_diff() {
                DiffGate::Proceed { reset } => {
                    resets |= reset;
                    state.record_failure();
                    requests += 1;
                }
                DiffGate::Refuse { .. } => {}
            }
        }
        (resets, requests)
    }

    #[test]
    fn ceiling_resets_after_threshold_plus_one_failures() {
        let threshold = 5;
        let mut state = ResyncState::new(threshold);

        let (reset, requests) = fail_repeatedly(&mut state, threshold);
        assert!(!reset);
        assert_eq!(requests, 1);

        let (reset, requests) = fail_repeatedly(&mut state, 1);
        assert!(reset);
        assert_eq!(requests, 1);
        assert_eq!(state.count(), 1);
    }

    #[test]
    fn refusals_count_up() {
        let mut state = ResyncState::new(10);
        state.record_failure();

        assert_eq!(state.begin_diff(), DiffGate::Refuse { count: 2 });
        assert_eq!(state.begin_diff(), DiffGate::Refuse { count: 3 });

        state.clear();
        assert_eq!(state.begin_diff(), DiffGate::Proceed { reset: false });
    }

    #[test]
    fn master_pin_clears() {
        let mut state = ResyncState::new(3);
        state.record_failure();
        state.pin_for_master();

        assert_eq!(state.count(), 0);
    }
}
