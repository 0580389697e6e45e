//! Metaslab load and activation states (spec §4.3, "States"/"Activation").

/// Load-state of a metaslab's in-core free tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadState {
    /// Only the space-map object id is known; the free tree is not
    /// authoritative. A metaslab in this state may still be dirty: its
    /// per-txg staging trees can hold pending changes.
    Unloaded,
    /// A load is in progress; other callers must wait on the load
    /// condition variable rather than touch the free tree.
    Loading,
    /// The free tree is authoritative.
    Loaded,
}

/// Whether a metaslab is the current target of allocation, and how.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivationState {
    /// Not currently selected by any allocation.
    Inactive,
    /// Selected as the primary target for the current copy.
    ActivePrimary,
    /// Selected as the secondary target (used by `claim`'s replay path).
    ActiveSecondary,
}

impl ActivationState {
    /// Whether this state is anything other than [`Inactive`](Self::Inactive).
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Inactive)
    }

    /// The bits ORed into `weight` by `metaslab_weight` while active
    /// (spec §4.3, "Weight"): an active metaslab always sorts above an
    /// inactive one regardless of its computed weight.
    pub fn active_bits(self) -> u64 {
        match self {
            Self::Inactive => 0,
            Self::ActivePrimary => 1 << 63,
            Self::ActiveSecondary => 1 << 62,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_bits_outrank_any_computed_weight() {
        assert!(ActivationState::ActivePrimary.active_bits() > ActivationState::ActiveSecondary.active_bits());
        assert_eq!(ActivationState::Inactive.active_bits(), 0);
        assert!(!ActivationState::Inactive.is_active());
        assert!(ActivationState::ActiveSecondary.is_active());
    }
}
