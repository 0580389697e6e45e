//! The downward "transaction manager" collaborator (spec §6,
//! "Downward"): the allocator facade consults it for the current
//! syncing txg and sync pass rather than tracking them itself.

use msa_types::Txg;

/// Facts the facade needs from the transaction-manager layer, which
/// this workspace does not implement (spec §1, out of scope:
/// "txg commit scheduling").
pub trait TxManager: Send + Sync {
    /// The txg currently being synced.
    fn tx_syncing_txg(&self) -> Txg;

    /// Which pass of the current sync this is (spec §4.4:
    /// `should_condense` only runs on `pass == 1`).
    fn tx_sync_pass(&self) -> u32;
}

/// A fixed-txg [`TxManager`] for tests and simple single-threaded
/// callers that drive sync manually.
#[derive(Clone, Copy, Debug)]
pub struct FixedTxManager {
    txg: Txg,
    pass: u32,
}

impl FixedTxManager {
    /// Construct a manager reporting `txg` at sync pass `pass`.
    pub fn new(txg: Txg, pass: u32) -> Self {
        Self { txg, pass }
    }
}

impl TxManager for FixedTxManager {
    fn tx_syncing_txg(&self) -> Txg {
        self.txg
    }

    fn tx_sync_pass(&self) -> u32 {
        self.pass
    }
}
