//! Advance notification tone.
//!
//! A short, quiet sine blip with exponential decay. The audio output is
//! opened lazily on the first blip and reused. If opening fails the
//! generator stays silent for the rest of the session: no retries, no
//! viewer errors, one warning in the log.

use std::f32::consts::TAU;
use std::time::Duration;

use log::{debug, warn};
use thiserror::Error;

/// Tone parameters
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tone {
    pub frequency_hz: f32,
    /// Starting gain
    pub gain: f32,
    /// Gain reached at the end of the decay
    pub floor_gain: f32,
    pub duration: Duration,
}

impl Default for Tone {
    fn default() -> Self {
        Self {
            frequency_hz: 800.0,
            gain: 0.05,
            floor_gain: 0.001,
            duration: Duration::from_millis(150),
        }
    }
}

impl Tone {
    /// Mono f32 samples at `sample_rate`
    pub fn samples(&self, sample_rate: u32) -> Vec<f32> {
        let rate = sample_rate.max(1) as f32;
        let secs = self.duration.as_secs_f32();
        let count = (secs * rate).round() as usize;
        let ratio = (self.floor_gain / self.gain).max(f32::MIN_POSITIVE);

        (0..count)
            .map(|i| {
                let t = i as f32 / rate;
                let envelope = self.gain * ratio.powf(t / secs);
                envelope * (TAU * self.frequency_hz * t).sin()
            })
            .collect()
    }
}

/// Audio output failures. Never shown to the user.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no audio output device")]
    NoDevice,
    #[error("audio stream error: {0}")]
    Stream(String),
}

/// Something that can play mono samples
pub trait AudioOutput {
    fn sample_rate(&self) -> u32;

    fn play(&mut self, samples: &[f32]) -> Result<(), AudioError>;
}

/// Opens the audio output on first use
pub type OutputFactory = Box<dyn FnMut() -> Result<Box<dyn AudioOutput>, AudioError>>;

/// Output used when the crate is built without the `audio` feature
pub struct LogOutput;

impl AudioOutput for LogOutput {
    fn sample_rate(&self) -> u32 {
        44_100
    }

    fn play(&mut self, samples: &[f32]) -> Result<(), AudioError> {
        debug!("Tone: {} samples (no audio backend)", samples.len());
        Ok(())
    }
}

enum OutputState {
    Unopened,
    Ready(Box<dyn AudioOutput>),
    Unavailable,
}

pub struct ToneGenerator {
    tone: Tone,
    factory: OutputFactory,
    state: OutputState,
    played: u64,
}

impl ToneGenerator {
    pub fn new(tone: Tone, factory: OutputFactory) -> Self {
        Self {
            tone,
            factory,
            state: OutputState::Unopened,
            played: 0,
        }
    }

    /// Default tone on the platform output (cpal with the `audio` feature,
    /// log-only otherwise)
    pub fn system() -> Self {
        #[cfg(feature = "audio")]
        let factory: OutputFactory = Box::new(|| {
            super::audio_cpal::CpalOutput::open().map(|out| Box::new(out) as Box<dyn AudioOutput>)
        });
        #[cfg(not(feature = "audio"))]
        let factory: OutputFactory = Box::new(|| Ok(Box::new(LogOutput) as Box<dyn AudioOutput>));

        Self::new(Tone::default(), factory)
    }

    /// Play one blip. Errors are logged and swallowed.
    pub fn play(&mut self) {
        if matches!(self.state, OutputState::Unopened) {
            self.state = match (self.factory)() {
                Ok(output) => OutputState::Ready(output),
                Err(e) => {
                    warn!("Audio unavailable, advancing silently: {}", e);
                    OutputState::Unavailable
                }
            };
        }

        if let OutputState::Ready(output) = &mut self.state {
            let samples = self.tone.samples(output.sample_rate());
            match output.play(&samples) {
                Ok(()) => self.played += 1,
                Err(e) => warn!("Error playing notification sound: {}", e),
            }
        }
    }

    /// Blips successfully handed to the output
    pub fn played(&self) -> u64 {
        self.played
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self.state, OutputState::Unavailable)
    }
}
