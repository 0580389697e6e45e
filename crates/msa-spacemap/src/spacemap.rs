//! The space map itself: an append-only log over one metaslab's
//! address range, with incremental allocated-bytes and histogram
//! accounting (spec §4.2, §3 "Space map").

use msa_rangetree::{Histogram, RangeTree};
use msa_types::Sense;

use crate::error::SpaceMapError;
use crate::object_store::ObjectStore;
use crate::record::{self, RecordKind};

/// An append-only on-disk log of alloc/free records for one metaslab.
pub struct SpaceMap {
    object: u64,
    ms_start: u64,
    ms_size: u64,
    ashift: u32,
    length_bytes: u64,
    allocated_bytes: u64,
    histogram: Histogram,
}

impl SpaceMap {
    /// Attach to (or begin describing) the space-map object for a
    /// metaslab spanning `[ms_start, ms_start + ms_size)`, whose
    /// sector size is `1 << ashift`.
    pub fn new(object: u64, ms_start: u64, ms_size: u64, ashift: u32) -> Self {
        Self {
            object,
            ms_start,
            ms_size,
            ashift,
            length_bytes: 0,
            allocated_bytes: 0,
            histogram: Histogram::new(),
        }
    }

    /// The backing object id.
    pub fn object(&self) -> u64 {
        self.object
    }

    /// Current on-disk length in bytes.
    pub fn length(&self) -> u64 {
        self.length_bytes
    }

    /// `Σ alloc_len − Σ free_len` over records appended via [`write`]
    /// since the last [`truncate`]/[`condense`] (spec §4.2).
    ///
    /// [`write`]: SpaceMap::write
    /// [`truncate`]: SpaceMap::truncate
    /// [`condense`]: SpaceMap::condense
    pub fn allocated(&self) -> u64 {
        self.allocated_bytes
    }

    /// The on-disk segment-length histogram.
    pub fn histogram(&self) -> &Histogram {
        &self.histogram
    }

    /// Zero the on-disk histogram (spec §4.2, `histogram_clear`).
    pub fn histogram_clear(&mut self) {
        self.histogram.clear();
    }

    /// Fold a range tree's size histogram into the on-disk histogram
    /// (spec §4.2, `histogram_add`).
    pub fn histogram_add(&mut self, tree: &RangeTree) {
        self.histogram.fold(tree.histogram());
    }

    fn validate_range(&self, offset: u64, len: u64) -> Result<(), SpaceMapError> {
        if offset < self.ms_start || offset + len > self.ms_start + self.ms_size {
            return Err(SpaceMapError::OutOfRange { offset, len });
        }
        if offset % (1 << self.ashift) != 0 || len % (1 << self.ashift) != 0 {
            return Err(SpaceMapError::Malformed {
                detail: format!("offset/len not a multiple of sector size (ashift {})", self.ashift),
            });
        }
        Ok(())
    }

    /// Read the raw on-disk record log, the I/O half of [`load`](Self::load).
    ///
    /// Split out so callers sharing a metaslab lock across threads can
    /// perform this read without holding it (spec §5, "Suspension
    /// points": load "release[s] the metaslab lock across the call and
    /// re-acquire[s]"); [`replay`](Self::replay) does the non-I/O half
    /// under the lock.
    pub fn read_raw(&self, store: &dyn ObjectStore) -> Result<Vec<u8>, SpaceMapError> {
        store.obj_read(self.object)
    }

    /// Replay already-read record bytes into `target`; the non-I/O half
    /// of [`load`](Self::load).
    ///
    /// For `sense = Free`, each `Alloc` record removes from `target`
    /// and each `Free` record adds to it — so starting `target` as the
    /// full metaslab range and replaying reconstructs the live free
    /// set. For `sense = Alloc` the direction is reversed.
    pub fn replay(&self, bytes: &[u8], target: &mut RangeTree, sense: Sense) -> Result<(), SpaceMapError> {
        if bytes.len() % 8 != 0 {
            return Err(SpaceMapError::Malformed {
                detail: format!("space map object {} has non-word-aligned length", self.object),
            });
        }
        for chunk in bytes.chunks_exact(8) {
            let word = u64::from_le_bytes(chunk.try_into().unwrap());
            let (kind, off_sectors, run_sectors) = record::decode_word(word);
            let offset = self.ms_start + (off_sectors << self.ashift);
            let len = run_sectors << self.ashift;
            self.validate_range(offset, len)?;

            let effective_add = match (sense, kind) {
                (Sense::Free, RecordKind::Free) => true,
                (Sense::Free, RecordKind::Alloc) => false,
                (Sense::Alloc, RecordKind::Alloc) => true,
                (Sense::Alloc, RecordKind::Free) => false,
            };
            let result = if effective_add {
                target.add(offset, len)
            } else {
                target.remove(offset, len)
            };
            result.map_err(|e| SpaceMapError::Malformed {
                detail: format!("replay of {kind:?} record [{offset}, {}) failed: {e}", offset + len),
            })?;
        }
        Ok(())
    }

    /// Read and replay the full log into `target` in one call, for
    /// callers with no need to release a lock across the I/O.
    pub fn load(&self, store: &dyn ObjectStore, target: &mut RangeTree, sense: Sense) -> Result<(), SpaceMapError> {
        let bytes = self.read_raw(store)?;
        self.replay(&bytes, target, sense)
    }

    /// Append one record per segment of `source`, tagged `kind`, and
    /// update the running allocated-bytes counter incrementally
    /// (`+len` for `Alloc`, `-len` for `Free`).
    pub fn write(
        &mut self,
        store: &mut dyn ObjectStore,
        source: &RangeTree,
        kind: RecordKind,
    ) -> Result<(), SpaceMapError> {
        let mut words = Vec::new();
        let mut delta = 0i64;
        let mut err = None;
        source.walk(|seg| {
            if err.is_some() {
                return;
            }
            let rel = seg.start - self.ms_start;
            let off_sectors = rel >> self.ashift;
            let run_sectors = seg.len() >> self.ashift;
            match record::encode_run(kind, off_sectors, run_sectors) {
                Ok(mut w) => {
                    words.append(&mut w);
                    delta += seg.len() as i64;
                }
                Err(e) => err = Some(e),
            }
        });
        if let Some(e) = err {
            return Err(e);
        }

        let mut buf = Vec::with_capacity(words.len() * 8);
        for w in &words {
            buf.extend_from_slice(&w.to_le_bytes());
        }
        store.obj_write(self.object, &buf)?;
        self.length_bytes += buf.len() as u64;

        match kind {
            RecordKind::Alloc => self.allocated_bytes += delta as u64,
            RecordKind::Free => self.allocated_bytes = self.allocated_bytes.saturating_sub(delta as u64),
        }
        Ok(())
    }

    /// Discard all records (spec §4.4, step 3 of condensation).
    pub fn truncate(&mut self, store: &mut dyn ObjectStore) -> Result<(), SpaceMapError> {
        store.obj_truncate(self.object)?;
        self.length_bytes = 0;
        Ok(())
    }

    /// Rewrite the map in its minimal representation: `allocated_tree`
    /// as `Alloc` records, then `free_tree` as `Free` records (spec
    /// §4.4, steps 3–4).
    ///
    /// Unlike [`write`](SpaceMap::write), condensation is a pure
    /// re-encoding of the same underlying allocation state, so the
    /// allocated-bytes counter is *set* to `allocated_tree.space()`
    /// rather than accumulated incrementally — a condense never
    /// changes how much space is actually allocated, only how that
    /// fact is encoded on disk.
    pub fn condense(
        &mut self,
        store: &mut dyn ObjectStore,
        allocated_tree: &RangeTree,
        free_tree: &RangeTree,
    ) -> Result<(), SpaceMapError> {
        self.truncate(store)?;
        self.write(store, allocated_tree, RecordKind::Alloc)?;
        self.write(store, free_tree, RecordKind::Free)?;
        self.allocated_bytes = allocated_tree.space();
        Ok(())
    }

    /// Number of 64-bit words the current best-case encoding of a
    /// single segment of `len` bytes would require — used by
    /// `should_condense` (spec §4.4).
    pub fn words_for_len(&self, len: u64) -> u64 {
        record::words_for_run(len >> self.ashift)
    }
}
