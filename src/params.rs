//! Session parameters and their valid ranges
//!
//! Values outside a range are rejected, never clamped.

use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::{AuditionError, Result};

/// Valid playback rates (multiplier of the original speed)
pub const PLAYBACK_RATE_RANGE: RangeInclusive<f32> = 0.5..=2.0;

/// Valid pitch shifts in semitones
pub const PITCH_RANGE: RangeInclusive<i32> = -12..=12;

/// Valid reverb decay times in seconds
pub const REVERB_DECAY_RANGE: RangeInclusive<f32> = 0.0..=5.0;

/// Valid equalizer band gains in dB
pub const EQ_GAIN_RANGE: RangeInclusive<i32> = -30..=30;

pub const DEFAULT_PLAYBACK_RATE: f32 = 1.0;
pub const DEFAULT_PITCH: i32 = 0;
pub const DEFAULT_REVERB_DECAY: f32 = 1.5;

/// One band of the 3-band equalizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EqBand {
    Low,
    Mid,
    High,
}

impl EqBand {
    pub const ALL: [EqBand; 3] = [EqBand::Low, EqBand::Mid, EqBand::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            EqBand::Low => "low",
            EqBand::Mid => "mid",
            EqBand::High => "high",
        }
    }
}

impl fmt::Display for EqBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EqBand {
    type Err = AuditionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(EqBand::Low),
            "mid" => Ok(EqBand::Mid),
            "high" => Ok(EqBand::High),
            _ => Err(AuditionError::out_of_range("band", s, "low, mid, or high")),
        }
    }
}

/// Gains for the three equalizer bands, in dB
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Equalizer {
    pub low: i32,
    pub mid: i32,
    pub high: i32,
}

impl Equalizer {
    /// All bands at 0 dB
    pub const FLAT: Equalizer = Equalizer {
        low: 0,
        mid: 0,
        high: 0,
    };

    pub fn gain(&self, band: EqBand) -> i32 {
        match band {
            EqBand::Low => self.low,
            EqBand::Mid => self.mid,
            EqBand::High => self.high,
        }
    }

    pub fn set_gain(&mut self, band: EqBand, gain_db: i32) {
        match band {
            EqBand::Low => self.low = gain_db,
            EqBand::Mid => self.mid = gain_db,
            EqBand::High => self.high = gain_db,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for band in EqBand::ALL {
            validate_eq_gain(band, self.gain(band))?;
        }
        Ok(())
    }
}

/// Every user-adjustable parameter of a session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionParams {
    pub playback_rate: f32,
    pub pitch_semitones: i32,
    pub reverb_decay_secs: f32,
    pub equalizer: Equalizer,
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            playback_rate: DEFAULT_PLAYBACK_RATE,
            pitch_semitones: DEFAULT_PITCH,
            reverb_decay_secs: DEFAULT_REVERB_DECAY,
            equalizer: Equalizer::FLAT,
        }
    }
}

impl SessionParams {
    /// Validate all parameters are within their ranges
    pub fn validate(&self) -> Result<()> {
        validate_playback_rate(self.playback_rate)?;
        validate_pitch(self.pitch_semitones)?;
        validate_reverb_decay(self.reverb_decay_secs)?;
        self.equalizer.validate()
    }
}

pub fn validate_playback_rate(rate: f32) -> Result<f32> {
    if !PLAYBACK_RATE_RANGE.contains(&rate) {
        return Err(AuditionError::out_of_range(
            "playback_rate",
            rate,
            "0.5 to 2.0",
        ));
    }
    Ok(rate)
}

pub fn validate_pitch(semitones: i32) -> Result<i32> {
    if !PITCH_RANGE.contains(&semitones) {
        return Err(AuditionError::out_of_range(
            "pitch_semitones",
            semitones,
            "-12 to 12",
        ));
    }
    Ok(semitones)
}

pub fn validate_reverb_decay(decay_secs: f32) -> Result<f32> {
    if !REVERB_DECAY_RANGE.contains(&decay_secs) {
        return Err(AuditionError::out_of_range(
            "reverb_decay_secs",
            decay_secs,
            "0.0 to 5.0 seconds",
        ));
    }
    Ok(decay_secs)
}

pub fn validate_eq_gain(band: EqBand, gain_db: i32) -> Result<i32> {
    if !EQ_GAIN_RANGE.contains(&gain_db) {
        return Err(AuditionError::out_of_range(
            &format!("equalizer.{}", band),
            gain_db,
            "-30 to 30 dB",
        ));
    }
    Ok(gain_db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_defaults_are_valid() {
        let params = SessionParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.equalizer, Equalizer::FLAT);
    }

    #[test_case(0.5 ; "lower bound")]
    #[test_case(1.0 ; "unity")]
    #[test_case(2.0 ; "upper bound")]
    fn test_playback_rate_accepts(rate: f32) {
        assert_eq!(validate_playback_rate(rate).unwrap(), rate);
    }

    #[test_case(0.49 ; "below range")]
    #[test_case(2.01 ; "above range")]
    #[test_case(f32::NAN ; "nan")]
    fn test_playback_rate_rejects(rate: f32) {
        assert!(validate_playback_rate(rate).is_err());
    }

    #[test]
    fn test_pitch_bounds() {
        assert!(validate_pitch(-12).is_ok());
        assert!(validate_pitch(12).is_ok());
        assert!(validate_pitch(-13).is_err());
        assert!(validate_pitch(13).is_err());
    }

    #[test]
    fn test_reverb_decay_bounds() {
        assert!(validate_reverb_decay(0.0).is_ok());
        assert!(validate_reverb_decay(5.0).is_ok());
        assert!(validate_reverb_decay(-1.0).is_err());
        assert!(validate_reverb_decay(f32::INFINITY).is_err());
    }

    #[test]
    fn test_eq_gain_error_names_band() {
        let err = validate_eq_gain(EqBand::Mid, 31).unwrap_err();
        assert!(err.to_string().contains("equalizer.mid"));
    }

    #[test]
    fn test_equalizer_set_gain() {
        let mut eq = Equalizer::FLAT;
        eq.set_gain(EqBand::High, -7);
        assert_eq!(eq.gain(EqBand::High), -7);
        assert_eq!(eq.gain(EqBand::Low), 0);
    }

    #[test]
    fn test_band_from_str() {
        assert_eq!("LOW".parse::<EqBand>().unwrap(), EqBand::Low);
        assert!("treble".parse::<EqBand>().is_err());
    }

    #[test]
    fn test_partial_params_deserialize_with_defaults() {
        let params: SessionParams =
            serde_json::from_str(r#"{"pitch_semitones": 3, "equalizer": {"low": 4}}"#).unwrap();
        assert_eq!(params.pitch_semitones, 3);
        assert_eq!(params.equalizer.low, 4);
        assert_eq!(params.equalizer.high, 0);
        assert_eq!(params.reverb_decay_secs, DEFAULT_REVERB_DECAY);
    }
}
