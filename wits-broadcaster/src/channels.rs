//! Per-channel value generators for WITS0 data items
//!
//! Channel codes 01-07 belong to the general record header and are never
//! generated here. The default table follows the WITS0 record 01
//! (General Time-Based) layout for codes 08-40; codes 41-99 are spare in
//! that record and fall back to a generic numeric generator.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{BroadcasterError, Result};

/// First channel code available to data items
pub const FIRST_DATA_CHANNEL: u8 = 8;

/// Last channel code a record may carry
pub const LAST_CHANNEL: u8 = 99;

const MAX_DECIMALS: u8 = 6;

/// How a channel value is produced and rendered
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValueKind {
    /// Uniform value in `[min, max]` with a fixed number of fraction digits
    Float { min: f64, max: f64, decimals: u8 },
    /// Uniform integer in `[min, max]`
    Integer { min: i64, max: i64 },
}

impl ValueKind {
    pub fn render<R: Rng>(&self, rng: &mut R) -> String {
        match *self {
            ValueKind::Float { min, max, decimals } => {
                let value = rng.random_range(min..=max);
                format_fixed(value, decimals)
            }
            ValueKind::Integer { min, max } => rng.random_range(min..=max).to_string(),
        }
    }

    fn validate(&self, code: u8) -> Result<()> {
        match *self {
            ValueKind::Float { min, max, decimals } => {
                // the sampler also needs a finite span
                let finite = min.is_finite() && max.is_finite() && (max - min).is_finite();
                if !finite || min > max {
                    return Err(BroadcasterError::invalid_argument(format!(
                        "Channel {:02}: float range {}..{} is not valid",
                        code, min, max
                    )));
                }
                if decimals > MAX_DECIMALS {
                    return Err(BroadcasterError::invalid_argument(format!(
                        "Channel {:02}: at most {} decimals are supported",
                        code, MAX_DECIMALS
                    )));
                }
            }
            ValueKind::Integer { min, max } => {
                if min > max {
                    return Err(BroadcasterError::invalid_argument(format!(
                        "Channel {:02}: integer range {}..{} is not valid",
                        code, min, max
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Fixed-point text without a sign on values that round to zero
fn format_fixed(value: f64, decimals: u8) -> String {
    let text = format!("{:.*}", decimals as usize, value);
    match text.strip_prefix('-') {
        Some(unsigned) if unsigned.bytes().all(|b| b == b'0' || b == b'.') => unsigned.to_string(),
        _ => text,
    }
}

/// One entry of the channel table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub code: u8,
    pub mnemonic: String,
    pub kind: ValueKind,
}

impl ChannelSpec {
    fn new(code: u8, mnemonic: &str, kind: ValueKind) -> Self {
        Self {
            code,
            mnemonic: mnemonic.to_string(),
            kind,
        }
    }
}

const fn float(min: f64, max: f64, decimals: u8) -> ValueKind {
    ValueKind::Float { min, max, decimals }
}

const fn integer(min: i64, max: i64) -> ValueKind {
    ValueKind::Integer { min, max }
}

/// WITS0 record 01 channels 08-40
const GENERAL_TIME_BASED: &[(u8, &str, ValueKind)] = &[
    (8, "DBTM", float(0.0, 5000.0, 2)),      // depth bit (meas)
    (9, "DBTV", float(0.0, 5000.0, 2)),      // depth bit (vert)
    (10, "DMEA", float(0.0, 5000.0, 2)),     // depth hole (meas)
    (11, "DVER", float(0.0, 5000.0, 2)),     // depth hole (vert)
    (12, "BPOS", float(0.0, 40.0, 2)),       // block position
    (13, "ROPA", float(0.0, 100.0, 2)),      // rate of penetration
    (14, "HKLA", float(0.0, 500.0, 1)),      // hookload avg
    (15, "HKLX", float(0.0, 500.0, 1)),      // hookload max
    (16, "WOBA", float(0.0, 50.0, 2)),       // weight on bit avg
    (17, "WOBX", float(0.0, 50.0, 2)),       // weight on bit max
    (18, "TQA", float(0.0, 50.0, 2)),        // rotary torque avg
    (19, "TQX", float(0.0, 50.0, 2)),        // rotary torque max
    (20, "RPMA", integer(0, 200)),           // rotary speed
    (21, "SPPA", float(0.0, 350.0, 1)),      // standpipe pressure
    (22, "CHKP", float(0.0, 100.0, 1)),      // casing (choke) pressure
    (23, "SPM1", integer(0, 150)),           // pump 1 stroke rate
    (24, "SPM2", integer(0, 150)),           // pump 2 stroke rate
    (25, "SPM3", integer(0, 150)),           // pump 3 stroke rate
    (26, "TVA", float(0.0, 200.0, 2)),       // tank volume (active)
    (27, "TVCA", float(-5.0, 5.0, 2)),       // tank volume change
    (28, "MFOP", float(0.0, 100.0, 1)),      // mud flow out %
    (29, "MFOA", float(0.0, 5000.0, 1)),     // mud flow out avg
    (30, "MFIA", float(0.0, 5000.0, 1)),     // mud flow in avg
    (31, "MDOA", float(0.8, 2.5, 3)),        // mud density out
    (32, "MDIA", float(0.8, 2.5, 3)),        // mud density in
    (33, "MTOA", float(20.0, 90.0, 1)),      // mud temperature out
    (34, "MTIA", float(20.0, 90.0, 1)),      // mud temperature in
    (35, "MCOA", float(0.0, 100.0, 2)),      // mud conductivity out
    (36, "MCIA", float(0.0, 100.0, 2)),      // mud conductivity in
    (37, "STKC", integer(0, 1_000_000)),     // pump stroke count (cum)
    (38, "LSTK", integer(0, 10_000)),        // lag strokes
    (39, "DRTM", float(0.0, 5000.0, 2)),     // depth returns (meas)
    (40, "GASA", float(0.0, 100.0, 2)),      // gas (avg)
];

/// Generator used for channels without an entry
const SPARE: ValueKind = float(0.0, 1000.0, 2);

/// Channel code to value generator mapping
#[derive(Debug, Clone)]
pub struct ChannelTable {
    specs: BTreeMap<u8, ChannelSpec>,
}

impl ChannelTable {
    /// Default table following WITS0 record 01 (General Time-Based)
    pub fn wits_general_time() -> Self {
        let specs = GENERAL_TIME_BASED
            .iter()
            .map(|(code, mnemonic, kind)| (*code, ChannelSpec::new(*code, mnemonic, *kind)))
            .collect();
        Self { specs }
    }

    /// Replace or add entries on top of the default table
    pub fn with_overrides(overrides: impl IntoIterator<Item = ChannelSpec>) -> Result<Self> {
        let mut table = Self::wits_general_time();
        for spec in overrides {
            if !(FIRST_DATA_CHANNEL..=LAST_CHANNEL).contains(&spec.code) {
                return Err(BroadcasterError::invalid_argument(format!(
                    "Channel code {} must be between {} and {}, inclusive.",
                    spec.code, FIRST_DATA_CHANNEL, LAST_CHANNEL
                )));
            }
            spec.kind.validate(spec.code)?;
            table.specs.insert(spec.code, spec);
        }
        Ok(table)
    }

    pub fn get(&self, code: u8) -> Option<&ChannelSpec> {
        self.specs.get(&code)
    }

    /// Generator for `code`, falling back to the spare generator
    pub fn kind(&self, code: u8) -> ValueKind {
        self.specs.get(&code).map(|spec| spec.kind).unwrap_or(SPARE)
    }

    /// Render one value for `code`
    pub fn render<R: Rng>(&self, code: u8, rng: &mut R) -> String {
        self.kind(code).render(rng)
    }
}

impl Default for ChannelTable {
    fn default() -> Self {
        Self::wits_general_time()
    }
}
