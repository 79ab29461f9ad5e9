//! Presentation model for the control panel
//!
//! Describes the sliders a front end draws (range, step, label), formats
//! their values, and routes slider input to the session setters.

use serde::Serialize;

use crate::engine::AudioEngine;
use crate::error::{AuditionError, Result};
use crate::params::{EqBand, SessionParams, EQ_GAIN_RANGE};
use crate::session::{AudioControlSession, PlaybackState};

/// Range and presentation of one slider
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ControlSpec {
    pub label: &'static str,
    pub min: f32,
    pub max: f32,
    pub step: f32,
}

/// Every continuous control on the panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Control {
    PlaybackRate,
    Pitch,
    ReverbDecay,
    Equalizer(EqBand),
}

impl Control {
    /// Controls in panel order
    pub const ALL: [Control; 6] = [
        Control::PlaybackRate,
        Control::Pitch,
        Control::ReverbDecay,
        Control::Equalizer(EqBand::Low),
        Control::Equalizer(EqBand::Mid),
        Control::Equalizer(EqBand::High),
    ];

    pub fn spec(&self) -> ControlSpec {
        match self {
            Control::PlaybackRate => ControlSpec {
                label: "Playback speed",
                min: 0.5,
                max: 2.0,
                step: 0.1,
            },
            Control::Pitch => ControlSpec {
                label: "Transpose",
                min: -12.0,
                max: 12.0,
                step: 1.0,
            },
            Control::ReverbDecay => ControlSpec {
                label: "Reverb",
                min: 0.0,
                max: 5.0,
                step: 0.1,
            },
            Control::Equalizer(band) => ControlSpec {
                label: match band {
                    EqBand::Low => "Bass",
                    EqBand::Mid => "Mids",
                    EqBand::High => "Treble",
                },
                min: *EQ_GAIN_RANGE.start() as f32,
                max: *EQ_GAIN_RANGE.end() as f32,
                step: 1.0,
            },
        }
    }

    /// Current slider position
    pub fn value(&self, params: &SessionParams) -> f32 {
        match self {
            Control::PlaybackRate => params.playback_rate,
            Control::Pitch => params.pitch_semitones as f32,
            Control::ReverbDecay => params.reverb_decay_secs,
            Control::Equalizer(band) => params.equalizer.gain(*band) as f32,
        }
    }

    /// Value text shown next to the label
    pub fn format_value(&self, params: &SessionParams) -> String {
        match self {
            Control::PlaybackRate => format!("{:.1}x", params.playback_rate),
            Control::Pitch => format!("{} semitones", params.pitch_semitones),
            Control::ReverbDecay => format!("{}s", params.reverb_decay_secs),
            Control::Equalizer(band) => format!("{}dB", params.equalizer.gain(*band)),
        }
    }

    /// Send a slider value to the session.
    ///
    /// Integer controls round to the nearest step.
    pub async fn apply<E: AudioEngine>(
        &self,
        session: &AudioControlSession<E>,
        value: f32,
    ) -> Result<()> {
        match self {
            Control::PlaybackRate => session.set_playback_rate(value),
            Control::Pitch => session.set_pitch(to_step(value, "pitch_semitones")?),
            Control::ReverbDecay => session.set_reverb_decay(value).await,
            Control::Equalizer(band) => {
                session.set_equalizer_band(*band, to_step(value, &format!("equalizer.{}", band))?)
            }
        }
    }
}

fn to_step(value: f32, param: &str) -> Result<i32> {
    if !value.is_finite() || value.abs() > i32::MAX as f32 {
        return Err(AuditionError::out_of_range(param, value, "a finite number"));
    }
    Ok(value.round() as i32)
}

/// Height of an equalizer visualizer bar, 0 to 100 percent
pub fn eq_bar_height_percent(gain_db: i32) -> f32 {
    let span = (EQ_GAIN_RANGE.end() - EQ_GAIN_RANGE.start()) as f32;
    (gain_db - EQ_GAIN_RANGE.start()) as f32 / span * 100.0
}

/// One slider as drawn on the panel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlView {
    pub control: Control,
    pub spec: ControlSpec,
    pub value: f32,
    pub display: String,
}

/// Everything a front end needs to draw the panel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlPanel {
    /// Sliders, play and reset are disabled until the session is ready
    pub enabled: bool,
    pub play_label: &'static str,
    pub controls: Vec<ControlView>,
    pub eq_bars: [f32; 3],
    pub error_banner: Option<String>,
}

impl ControlPanel {
    pub fn from_session<E: AudioEngine>(session: &AudioControlSession<E>) -> Self {
        let snapshot = session.snapshot();
        let params = snapshot.params;
        let controls = Control::ALL
            .iter()
            .map(|control| ControlView {
                control: *control,
                spec: control.spec(),
                value: control.value(&params),
                display: control.format_value(&params),
            })
            .collect();

        Self {
            enabled: snapshot.ready,
            play_label: match session.playback_state() {
                PlaybackState::Playing => "Pause",
                PlaybackState::Paused => "Play",
            },
            controls,
            eq_bars: EqBand::ALL.map(|band| eq_bar_height_percent(params.equalizer.gain(band))),
            error_banner: snapshot.last_error,
        }
    }

    /// Render the panel as plain text
    pub fn render(&self) -> String {
        let mut out = String::new();
        let state = if self.enabled { "" } else { " (loading)" };
        out.push_str(&format!("[{}]{}\n", self.play_label, state));
        for view in &self.controls {
            out.push_str(&format!(
                "  {:<15} {:>13}   [{} .. {}]\n",
                view.spec.label, view.display, view.spec.min, view.spec.max
            ));
        }
        if let Some(error) = &self.error_banner {
            out.push_str(&format!("  ! {}\n", error));
        }
        out
    }
}
