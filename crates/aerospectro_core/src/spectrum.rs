//! Spectrum payload codec.
//!
//! # Responsibility
//! - Encode/decode the fixed-length sample array of a measurement to and from
//!   its persisted comma-separated text form.
//! - Map a channel index onto the physical energy axis for display.
//!
//! # Invariants
//! - `decode(encode(samples), samples.len())` reproduces the input exactly
//!   (encoding uses shortest round-trip float formatting).
//! - The channel count is carried alongside the text, never embedded in it;
//!   decode rejects any mismatch instead of truncating or padding.
//! - A zero channel count is rejected up front by `energy_at`; it must never
//!   reach the division.

use crate::model::Measurement;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from spectrum decode and energy mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum SpectrumError {
    /// Token count in the persisted text does not match the declared channel
    /// count.
    ChannelCountMismatch { expected: u32, actual: usize },
    /// A token could not be parsed as a decimal number.
    InvalidSample { index: usize, token: String },
    /// Energy mapping requested for a spectrum declaring zero channels.
    ZeroChannels,
}

impl Display for SpectrumError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChannelCountMismatch { expected, actual } => write!(
                f,
                "spectrum text has {actual} samples but declares {expected} channels"
            ),
            Self::InvalidSample { index, token } => {
                write!(f, "invalid spectrum sample `{token}` at channel {index}")
            }
            Self::ZeroChannels => write!(f, "spectrum declares zero channels"),
        }
    }
}

impl Error for SpectrumError {}

/// Encodes an ordered sample sequence as comma-separated decimal text.
///
/// Uses `f64`'s shortest round-trip formatting, so every encoded value parses
/// back to the identical bit pattern.
pub fn encode(samples: &[f64]) -> String {
    let mut out = String::new();
    for (index, sample) in samples.iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        out.push_str(&sample.to_string());
    }
    out
}

/// Decodes persisted spectrum text into exactly `channel_count` samples.
///
/// An empty blob is valid only for a zero channel count.
pub fn decode(blob: &str, channel_count: u32) -> Result<Vec<f64>, SpectrumError> {
    if blob.is_empty() {
        if channel_count == 0 {
            return Ok(Vec::new());
        }
        return Err(SpectrumError::ChannelCountMismatch {
            expected: channel_count,
            actual: 0,
        });
    }

    let tokens: Vec<&str> = blob.split(',').collect();
    if tokens.len() != channel_count as usize {
        return Err(SpectrumError::ChannelCountMismatch {
            expected: channel_count,
            actual: tokens.len(),
        });
    }

    let mut samples = Vec::with_capacity(tokens.len());
    for (index, token) in tokens.iter().enumerate() {
        let value: f64 = token
            .trim()
            .parse()
            .map_err(|_| SpectrumError::InvalidSample {
                index,
                token: (*token).to_string(),
            })?;
        samples.push(value);
    }
    Ok(samples)
}

/// Maps a channel index to its energy value over the inclusive window
/// `[energy_min, energy_max]`.
///
/// `energy_at(0, ..) == energy_min` and `energy_at(n, n, ..) == energy_max`.
pub fn energy_at(
    index: u32,
    channel_count: u32,
    energy_min: f64,
    energy_max: f64,
) -> Result<f64, SpectrumError> {
    if channel_count == 0 {
        return Err(SpectrumError::ZeroChannels);
    }
    Ok(energy_min + f64::from(index) * (energy_max - energy_min) / f64::from(channel_count))
}

impl Measurement {
    /// Decodes this measurement's persisted spectrum text.
    pub fn spectrum_samples(&self) -> Result<Vec<f64>, SpectrumError> {
        decode(&self.spectrum_data, self.spectrum_channels)
    }

    /// Energy of one channel of this measurement's spectrum.
    pub fn energy_at(&self, index: u32) -> Result<f64, SpectrumError> {
        energy_at(
            index,
            self.spectrum_channels,
            self.spectrum_energy_min,
            self.spectrum_energy_max,
        )
    }
}
