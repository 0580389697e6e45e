//! Process-wide configuration knobs (spec §6, "Configuration knobs").
//!
//! Modeled as a single struct constructed once at pool creation and
//! threaded through by reference; runtime changes are advisory and may
//! be re-read opportunistically (spec §9, "Global tunables").

use std::error::Error;
use std::fmt;

/// The ~15 process-wide tunables that drive allocation policy.
#[derive(Clone, Debug, PartialEq)]
pub struct Tunables {
    /// Ratio threshold above which condensing is profitable.
    /// Default 200, minimum 100.
    pub condense_pct: u32,
    /// Percent-free below which a group is deprioritized. Default 0.
    pub mg_noalloc_threshold: u8,
    /// Maximum segment size below which dynamic-fit switches to
    /// best-fit.
    pub df_alloc_threshold: u64,
    /// Free-percent below which dynamic-fit switches to best-fit.
    /// Default 4.
    pub df_free_pct: u8,
    /// Lower bound defining a "free" metaslab (used by cursor-fit and
    /// new-dynamic-fit fragmentation checks).
    pub min_alloc_size: u64,
    /// `clump_shift` used by new-dynamic-fit's best-fit fallback.
    pub ndf_clump_shift: u32,
    /// Txgs a loaded-idle metaslab may remain loaded.
    /// Default `2 * TXG_CONCURRENT_STATES`.
    pub unload_delay: u64,
    /// Max metaslabs preloaded per group per reassess.
    pub preload_limit: usize,
    /// Toggle the histogram weighting term in `metaslab_weight`.
    pub weight_factor_enable: bool,
    /// Physical size above which allocations may be forced into gang
    /// blocks, gated behind `debug_gang_bang` (spec §9, "Open question
    /// — gang trigger"). Testing-only.
    pub gang_bang: u64,
    /// Enable the mod-4 gang-block test hook gated on `gang_bang`.
    /// Off by default; treated as a debug-only fault injector per
    /// spec §9's open question.
    pub debug_gang_bang: bool,
    /// Force every metaslab load to go through the slow path, bypassing
    /// any cache, for testing.
    pub debug_load: bool,
    /// Force every metaslab unload eagerly, for testing.
    pub debug_unload: bool,
    /// Allow allocation from write-degraded devices.
    pub write_to_degraded: bool,
    /// Device-distance shift used for the first rotor pass of `alloc`
    /// (spec §4.6): `min_distance = device_asize >> dshift`.
    pub initial_dshift: u32,
}

impl Tunables {
    /// Minimum permitted `condense_pct`.
    pub const CONDENSE_PCT_MIN: u32 = 100;

    /// Validate the tunables, returning the first violation found.
    pub fn validate(&self) -> Result<(), TunablesError> {
        if self.condense_pct < Self::CONDENSE_PCT_MIN {
            return Err(TunablesError::CondensePctTooLow {
                configured: self.condense_pct,
            });
        }
        if self.df_free_pct > 100 {
            return Err(TunablesError::PercentOutOfRange {
                field: "df_free_pct",
                value: self.df_free_pct,
            });
        }
        if self.mg_noalloc_threshold > 100 {
            return Err(TunablesError::PercentOutOfRange {
                field: "mg_noalloc_threshold",
                value: self.mg_noalloc_threshold,
            });
        }
        if self.unload_delay == 0 {
            return Err(TunablesError::UnloadDelayZero);
        }
        Ok(())
    }
}

impl Default for Tunables {
    fn default() -> Self {
        use crate::id::TXG_CONCURRENT_STATES;
        Self {
            condense_pct: 200,
            mg_noalloc_threshold: 0,
            df_alloc_threshold: 128 * 1024 * 1024,
            df_free_pct: 4,
            min_alloc_size: 4096,
            ndf_clump_shift: 4,
            unload_delay: 2 * TXG_CONCURRENT_STATES,
            preload_limit: 10,
            weight_factor_enable: false,
            gang_bang: 16 * 1024 * 1024,
            debug_gang_bang: false,
            debug_load: false,
            debug_unload: false,
            write_to_degraded: false,
            initial_dshift: 3,
        }
    }
}

/// Errors detected during [`Tunables::validate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TunablesError {
    /// `condense_pct` fell below [`Tunables::CONDENSE_PCT_MIN`].
    CondensePctTooLow {
        /// The configured value.
        configured: u32,
    },
    /// A percentage field is outside `[0, 100]`.
    PercentOutOfRange {
        /// The field name.
        field: &'static str,
        /// The out-of-range value.
        value: u8,
    },
    /// `unload_delay` was zero, which would unload a metaslab the
    /// instant it becomes idle.
    UnloadDelayZero,
}

impl fmt::Display for TunablesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CondensePctTooLow { configured } => write!(
                f,
                "condense_pct {configured} is below the minimum of {}",
                Tunables::CONDENSE_PCT_MIN
            ),
            Self::PercentOutOfRange { field, value } => {
                write!(f, "{field} = {value} is not a valid percentage")
            }
            Self::UnloadDelayZero => write!(f, "unload_delay must be at least 1"),
        }
    }
}

impl Error for TunablesError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(Tunables::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_low_condense_pct() {
        let mut t = Tunables::default();
        t.condense_pct = 50;
        assert_eq!(
            t.validate(),
            Err(TunablesError::CondensePctTooLow { configured: 50 })
        );
    }

    #[test]
    fn rejects_zero_unload_delay() {
        let mut t = Tunables::default();
        t.unload_delay = 0;
        assert_eq!(t.validate(), Err(TunablesError::UnloadDelayZero));
    }
}
