//! cpal-backed audio output (feature `audio`).
//!
//! One output stream is opened and kept running; `play()` pushes samples
//! into a queue the stream callback drains. Silence when the queue is empty.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{info, warn};

use super::tone::{AudioError, AudioOutput};

/// Upper bound on queued samples (about 2s at 48kHz)
const MAX_QUEUED: usize = 96_000;

pub struct CpalOutput {
    // Held to keep the stream alive
    _stream: cpal::Stream,
    queue: Arc<Mutex<VecDeque<f32>>>,
    sample_rate: u32,
}

impl CpalOutput {
    pub fn open() -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;
        let supported = device
            .default_output_config()
            .map_err(|e| AudioError::Stream(e.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels().max(1) as usize;
        let config: cpal::StreamConfig = supported.into();

        let queue: Arc<Mutex<VecDeque<f32>>> = Arc::new(Mutex::new(VecDeque::new()));
        let source = Arc::clone(&queue);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut queue = source.lock().unwrap_or_else(|e| e.into_inner());
                    for frame in data.chunks_mut(channels) {
                        let sample = queue.pop_front().unwrap_or(0.0);
                        frame.fill(sample);
                    }
                },
                |err| warn!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| AudioError::Stream(e.to_string()))?;
        stream.play().map_err(|e| AudioError::Stream(e.to_string()))?;

        info!(
            "Audio output: {} @ {}Hz",
            device.name().unwrap_or_else(|_| "unknown device".into()),
            sample_rate
        );

        Ok(Self {
            _stream: stream,
            queue,
            sample_rate,
        })
    }
}

impl AudioOutput for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn play(&mut self, samples: &[f32]) -> Result<(), AudioError> {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        if queue.len() + samples.len() > MAX_QUEUED {
            return Err(AudioError::Stream("output queue full".into()));
        }
        queue.extend(samples.iter().copied());
        Ok(())
    }
}
