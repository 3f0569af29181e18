//! Temporary system volume boost
//!
//! A boost raises the system master volume for the lifetime of one playback and
//! is restored exactly once. The snapshot of the pre-boost level only exists while
//! the boost is in effect.

use std::sync::Arc;

use crate::audio::volume::SystemVolume;

/// Boosted level for a given system level
pub fn boosted_level(current: u8, amount: u8) -> u8 {
    current.saturating_add(amount).min(100)
}

/// Owns the single outstanding boost
pub struct BoostManager {
    volume: Arc<dyn SystemVolume>,
    /// Level to restore, present iff boosted
    original: Option<u8>,
}

impl BoostManager {
    pub fn new(volume: Arc<dyn SystemVolume>) -> Self {
        Self {
            volume,
            original: None,
        }
    }

    pub fn is_boosted(&self) -> bool {
        self.original.is_some()
    }

    pub fn original_volume(&self) -> Option<u8> {
        self.original
    }

    /// Raise the system volume by `amount` percentage points
    ///
    /// No-op when disabled or already boosted. Volume errors are logged and leave
    /// the manager unboosted. Returns whether a boost was applied.
    pub async fn apply(&mut self, enabled: bool, amount: u8) -> bool {
        if !enabled || self.is_boosted() {
            return false;
        }

        let current = match self.volume.get_volume().await {
            Ok(level) => level,
            Err(e) => {
                tracing::warn!("Volume boost skipped: {}", e);
                return false;
            }
        };

        let target = boosted_level(current, amount);
        match self.volume.set_volume(target).await {
            Ok(()) => {
                tracing::debug!("System volume boosted {} -> {}", current, target);
                self.original = Some(current);
                true
            }
            Err(e) => {
                tracing::warn!("Volume boost failed: {}", e);
                false
            }
        }
    }

    /// Put the system volume back to the snapshot
    ///
    /// Safe to call on every exit path; does nothing unless boosted. A failed
    /// write keeps the snapshot so a later restore can retry.
    pub async fn restore(&mut self) -> bool {
        let Some(original) = self.original else {
            return false;
        };

        match self.volume.set_volume(original).await {
            Ok(()) => {
                tracing::debug!("System volume restored to {}", original);
                self.original = None;
                true
            }
            Err(e) => {
                tracing::warn!("Volume restore failed: {}", e);
                false
            }
        }
    }
}
