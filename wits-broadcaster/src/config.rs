//! Validated broadcast parameters

use std::time::Duration;

use crate::error::{BroadcasterError, Result};

/// Inclusive bounds shared by record and item counts
pub const MIN_COUNT: i64 = 1;
pub const MAX_COUNT: i64 = 99;

/// Immutable broadcast configuration.
///
/// Built from the raw integers handed over by the process layer. Every bound
/// is checked here, so a `BroadcastConfig` that exists is always usable and a
/// running loop never fails on its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastConfig {
    port: u16,
    frequency: Duration,
    records: u8,
    items: u8,
}

impl BroadcastConfig {
    pub fn new(port: i64, frequency_ms: i64, records: i64, items: i64) -> Result<Self> {
        let port = u16::try_from(port)
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| {
                BroadcasterError::invalid_argument("Port must be between 1 and 65535, inclusive.")
            })?;

        if frequency_ms <= 0 {
            return Err(BroadcasterError::invalid_argument(
                "Frequency must be provided and be greater than 0.",
            ));
        }

        let records = check_count(records, "Records")?;
        let items = check_count(items, "Items")?;

        Ok(Self {
            port,
            frequency: Duration::from_millis(frequency_ms as u64),
            records,
            items,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Interval between the start of two consecutive cycles
    pub fn frequency(&self) -> Duration {
        self.frequency
    }

    pub fn records(&self) -> u8 {
        self.records
    }

    pub fn items(&self) -> u8 {
        self.items
    }
}

/// Check a record/item count against `[MIN_COUNT, MAX_COUNT]`
pub(crate) fn check_count(value: i64, what: &str) -> Result<u8> {
    if !(MIN_COUNT..=MAX_COUNT).contains(&value) {
        return Err(BroadcasterError::invalid_argument(format!(
            "{} must be between {} and {}, inclusive.",
            what, MIN_COUNT, MAX_COUNT
        )));
    }
    Ok(value as u8)
}
