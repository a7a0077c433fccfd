use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::data::error::StoreError;
use crate::data::segment::MAX_UNIT_SIZE;

/// Samples-per-pixel ratio at which analog traces switch from raw points
/// to min/max envelope bars.
pub const DEFAULT_ENVELOPE_THRESHOLD: f32 = 256.0;

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Samples per second for every segment created by a capture session.
    pub samplerate: u64,
    /// Number of logic channels packed into each logic sample.
    pub logic_channels: u32,
    /// Capacity hint handed to each new segment. Zero disables pre-sizing.
    pub expected_samples: u64,
    pub envelope_threshold: f32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            samplerate: 1_000_000,
            logic_channels: 8,
            expected_samples: 0,
            envelope_threshold: DEFAULT_ENVELOPE_THRESHOLD,
        }
    }
}

impl StoreConfig {
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let config: StoreConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.samplerate == 0 {
            return Err(StoreError::InvalidSampleRate);
        }
        if self.logic_channels == 0 || self.logic_channels as usize > MAX_UNIT_SIZE * 8 {
            return Err(StoreError::InvalidChannelCount(self.logic_channels));
        }
        if !(self.envelope_threshold > 0.0) {
            return Err(StoreError::InvalidEnvelopeThreshold(self.envelope_threshold));
        }
        Ok(())
    }

    /// Bytes needed to pack one sample of `logic_channels` bits.
    pub fn logic_unit_size(&self) -> usize {
        ((self.logic_channels as usize + 7) / 8).clamp(1, MAX_UNIT_SIZE)
    }
}
