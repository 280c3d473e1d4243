// src/audio.rs

use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    Arc,
};

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, SampleFormat, SizedSample, Stream, StreamConfig};
use ringbuf::traits::Consumer;

use crate::click::{ClickBank, Voice};
use crate::scheduler::ClickEvent;

/// Helper struct to hold output device info
pub struct OutputConfig {
    pub device: Device,
    pub config: StreamConfig,
    pub sample_format: SampleFormat,
    pub output_channels: usize,
    pub output_sample_rate: u32,
}

/// Finds the default audio output device and its config. Failure here is
/// recoverable: the transport reports it and stays stopped.
pub fn setup_output_device() -> Result<OutputConfig, anyhow::Error> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow::anyhow!("no audio output device available"))?;
    let supported_config = device.default_output_config()?;
    let sample_format = supported_config.sample_format();
    let config = supported_config.config();
    let output_channels = config.channels as usize;
    let output_sample_rate = config.sample_rate.0;

    println!(
        "🔊 Output device: channels: {}, sample_rate: {:?}",
        output_channels, config.sample_rate
    );

    Ok(OutputConfig {
        device,
        config,
        sample_format,
        output_channels,
        output_sample_rate,
    })
}

/// The audio clock: total samples the output callback has rendered. This is
/// the only clock the scheduler trusts — wall-clock timers drift against the
/// device, the sample counter cannot.
pub struct SampleClock {
    samples: AtomicU64,
    sample_rate: u32,
}

impl SampleClock {
    pub fn new(sample_rate: u32) -> Self {
        Self { samples: AtomicU64::new(0), sample_rate }
    }

    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }

    pub fn seconds(&self) -> f64 {
        self.samples() as f64 / self.sample_rate as f64
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn advance(&self, frames: u64) {
        self.samples.fetch_add(frames, Ordering::Relaxed);
    }
}

/// Build the CPAL output stream that turns queued `ClickEvent`s into sound.
///
/// The callback drains the event consumer, starts a `Voice` for every event
/// whose timestamp falls before the end of the current block (sample-accurate
/// within the block), mixes active voices into every output channel, and
/// advances the shared sample clock. Volume and mute are read per event at
/// voice start, so they affect subsequent clicks only, never in-flight ones.
///
/// When `is_playing` is false the callback renders silence and discards
/// queued events and voices, so a later start begins clean on the downbeat.
pub fn build_click_stream<T, C>(
    device: cpal::Device,
    config: StreamConfig,
    is_playing: Arc<AtomicBool>,
    muted: Arc<AtomicBool>,
    volume: Arc<AtomicU32>,
    clock: Arc<SampleClock>,
    bank: Arc<ClickBank>,
    mut consumer: C,
    err_fn: fn(cpal::StreamError),
) -> Result<Stream, anyhow::Error>
where
    T: cpal::Sample + cpal::FromSample<f32> + SizedSample,
    C: Consumer<Item = ClickEvent> + Send + 'static,
{
    let channels = config.channels as usize;
    let sample_rate = clock.sample_rate() as f64;

    let mut pending: VecDeque<ClickEvent> = VecDeque::with_capacity(32);
    let mut voices: Vec<Voice> = Vec::with_capacity(8);

    device
        .build_output_stream(
            &config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels;
                let block_start = clock.samples();

                if !is_playing.load(Ordering::Relaxed) {
                    while consumer.try_pop().is_some() {}
                    pending.clear();
                    voices.clear();
                    for out in data.iter_mut() {
                        *out = T::from_sample(0.0);
                    }
                    clock.advance(frames as u64);
                    return;
                }

                while let Some(event) = consumer.try_pop() {
                    pending.push_back(event);
                }

                let block_end = block_start + frames as u64;
                let vol = f32::from_bits(volume.load(Ordering::Relaxed));
                let gain = if muted.load(Ordering::Relaxed) { 0.0 } else { vol };

                // Events arrive in time order, so only the front can be due.
                while let Some(start_sample) = pending
                    .front()
                    .map(|e| (e.start_secs * sample_rate) as u64)
                    .filter(|s| *s < block_end)
                {
                    let Some(event) = pending.pop_front() else { break };
                    voices.push(Voice {
                        buffer: bank.buffer(event.timbre, event.accent),
                        // A pump hiccup can stamp an event slightly in the
                        // past; it starts at the top of this block instead.
                        start_sample: start_sample.max(block_start),
                        pos: 0,
                        gain,
                    });
                }

                for (frame_index, frame) in data.chunks_mut(channels).enumerate() {
                    let at = block_start + frame_index as u64;
                    let mut mix = 0.0f32;
                    for voice in voices.iter_mut() {
                        mix += voice.sample_at(at);
                    }
                    let sample = T::from_sample(mix);
                    for out in frame.iter_mut() {
                        *out = sample;
                    }
                }

                voices.retain(|v| !v.finished());
                clock.advance(frames as u64);
            },
            err_fn,
            None,
        )
        .map_err(Into::into)
}
