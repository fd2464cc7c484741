//! Temporary UUID generation.
//!
//! Two interchangeable generators: a cryptographically random one for
//! production builds, and a deterministic pseudo generator for offline,
//! demo and reproducible test runs. Selection is by the build's offline-mode
//! flag, never hard-coded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use uuid::Uuid;

/// Source of fresh component UUIDs.
pub trait UuidGenerator: Send + Sync {
    /// Returns a new UUID in canonical hyphenated form.
    fn uuid(&self) -> String;
}

/// Cryptographically random (v4) UUID generator.
#[derive(Debug, Default)]
pub struct RandomUuidGenerator;

impl UuidGenerator for RandomUuidGenerator {
    fn uuid(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Deterministic UUID generator for offline and demo runs.
///
/// Adds an increasing counter to a fixed seed, so repeated runs produce the
/// same id sequence.
#[derive(Debug)]
pub struct PseudoUuidGenerator {
    seed: u128,
    counter: AtomicU64,
}

impl PseudoUuidGenerator {
    /// Seed shared by all offline runs.
    const DEFAULT_SEED: u128 = 0x00aa_bbcc_ddee_ff00_0000_0000_0000_0000;

    /// Creates a generator over the default seed.
    pub fn new() -> Self {
        PseudoUuidGenerator {
            seed: Self::DEFAULT_SEED,
            counter: AtomicU64::new(0),
        }
    }
}

impl Default for PseudoUuidGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl UuidGenerator for PseudoUuidGenerator {
    fn uuid(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        Uuid::from_u128(self.seed + u128::from(n)).to_string()
    }
}

/// Selects the UUID generator for a build by its offline-mode flag.
pub fn uuid_generator_for(offline_mode: bool) -> Arc<dyn UuidGenerator> {
    if offline_mode {
        Arc::new(PseudoUuidGenerator::new())
    } else {
        Arc::new(RandomUuidGenerator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_generator_produces_unique_ids() {
        let generator = RandomUuidGenerator;
        assert_ne!(generator.uuid(), generator.uuid());
    }

    #[test]
    fn test_pseudo_generator_is_deterministic() {
        let first_run: Vec<String> = {
            let g = PseudoUuidGenerator::new();
            (0..3).map(|_| g.uuid()).collect()
        };
        let second_run: Vec<String> = {
            let g = PseudoUuidGenerator::new();
            (0..3).map(|_| g.uuid()).collect()
        };
        assert_eq!(first_run, second_run);
        assert_ne!(first_run[0], first_run[1]);
    }

    #[test]
    fn test_selection_by_offline_flag() {
        let offline = uuid_generator_for(true);
        let online = uuid_generator_for(false);
        // Offline ids are drawn from the fixed seed sequence.
        assert!(offline.uuid().starts_with("00aabbcc"));
        assert!(!online.uuid().starts_with("00aabbcc"));
    }
}
