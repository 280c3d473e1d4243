// src/audio_runtime.rs

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::StreamTrait;
use cpal::{SampleFormat, Stream};
use ringbuf::storage::Heap;
use ringbuf::traits::Split;
use ringbuf::wrap::caching::Caching;
use ringbuf::{HeapRb, SharedRb};

use crate::audio::{build_click_stream, setup_output_device, SampleClock};
use crate::click::{ClickBank, Timbre};
use crate::engine::{coerce_tempo_text, meter, EngineParams, Subdivision, TimeSignature};
use crate::indicator::BeatIndicator;
use crate::ramp::{spawn_ramp_timer, AutoRamp};
use crate::scheduler::{spawn_pump, ClickEvent, TimerHandle};

type EventProducer = Caching<Arc<SharedRb<Heap<ClickEvent>>>, true, false>;

const EVENT_QUEUE_CAPACITY: usize = 256;

/// Audio-side resources, created lazily on the first successful play.
/// Dropping the stream releases the device.
struct AudioBackend {
    clock: Arc<SampleClock>,
    producer: Arc<Mutex<EventProducer>>,
    _stream: Stream,
}

/// Owns the engine parameters, the CPAL stream, and both driver timers, and
/// exposes a simple control API for a UI layer to bind to.
///
/// Single active metronome by design: the audio backend is created once and
/// shared across play/stop cycles. All control operations handle failure
/// locally — the worst outcome of any fault is silence, never a crash
/// propagated to the caller.
pub struct MetronomeRuntime {
    params: Arc<Mutex<EngineParams>>,
    is_playing: Arc<AtomicBool>,
    muted: Arc<AtomicBool>,
    volume: Arc<AtomicU32>,
    published_tick: Arc<AtomicUsize>,
    audio: Option<AudioBackend>,
    pump: Option<TimerHandle>,
    ramp_timer: Option<TimerHandle>,
}

impl MetronomeRuntime {
    /// `default_timbre` comes from the caller's persisted settings.
    pub fn new(default_timbre: Timbre) -> Self {
        Self {
            params: Arc::new(Mutex::new(EngineParams::new(default_timbre))),
            is_playing: Arc::new(AtomicBool::new(false)),
            muted: Arc::new(AtomicBool::new(false)),
            volume: Arc::new(AtomicU32::new(0.8f32.to_bits())),
            published_tick: Arc::new(AtomicUsize::new(0)),
            audio: None,
            pump: None,
            ramp_timer: None,
        }
    }

    // --- TRANSPORT ---

    /// Start the click track. Creates the audio backend on first use; if the
    /// platform has no usable output device this logs and leaves the
    /// transport stopped instead of erroring out.
    pub fn play(&mut self) {
        if self.is_playing() {
            return;
        }

        if self.audio.is_none() {
            match open_audio_backend(
                self.is_playing.clone(),
                self.muted.clone(),
                self.volume.clone(),
            ) {
                Ok(backend) => self.audio = Some(backend),
                Err(e) => {
                    eprintln!("❌ Metronome could not start audio: {e}");
                    return;
                }
            }
        }
        let Some(audio) = self.audio.as_ref() else { return };

        self.published_tick.store(0, Ordering::Relaxed);
        self.is_playing.store(true, Ordering::SeqCst);
        self.pump = Some(spawn_pump(
            self.params.clone(),
            audio.clock.clone(),
            audio.producer.clone(),
            self.published_tick.clone(),
        ));

        if self.ramp_enabled() {
            self.ramp_timer = Some(spawn_ramp_timer(
                self.params.clone(),
                self.is_playing.clone(),
            ));
        }
    }

    /// Stop the click track and rewind to the downbeat. Idempotent; both
    /// timers are cancelled together, and any clicks already queued on the
    /// audio side are discarded by the callback.
    pub fn pause(&mut self) {
        self.is_playing.store(false, Ordering::SeqCst);
        if let Some(mut pump) = self.pump.take() {
            pump.cancel();
        }
        if let Some(mut ramp) = self.ramp_timer.take() {
            ramp.cancel();
        }
        self.published_tick.store(0, Ordering::Relaxed);
    }

    pub fn toggle_play(&mut self) {
        if self.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing.load(Ordering::SeqCst)
    }

    // --- TEMPO ---

    pub fn set_tempo(&self, bpm: u32) {
        if let Ok(mut p) = self.params.lock() {
            p.set_bpm(bpm);
        }
    }

    /// Commit free-text tempo entry: garbage coerces to the default, numbers
    /// are clamped. Never fails, never loses the transport.
    pub fn commit_tempo_text(&self, text: &str) {
        self.set_tempo(coerce_tempo_text(text));
    }

    pub fn adjust_tempo(&self, delta: i32) {
        if let Ok(mut p) = self.params.lock() {
            p.adjust_bpm(delta);
        }
    }

    pub fn tempo(&self) -> u32 {
        if let Ok(p) = self.params.lock() {
            p.bpm
        } else {
            crate::engine::DEFAULT_BPM
        }
    }

    // --- MEASURE SHAPE ---

    pub fn set_signature(&self, numerator: u32, denominator: u32) {
        if let Ok(mut p) = self.params.lock() {
            p.set_signature(numerator, denominator);
        }
    }

    pub fn set_grouping(&self, option_index: usize) {
        if let Ok(mut p) = self.params.lock() {
            p.set_grouping(option_index);
        }
    }

    /// The canonical grouping choices for the current numerator (empty for
    /// simple and compound meters).
    pub fn grouping_options(&self) -> Vec<&'static [u32]> {
        let numerator = self.time_signature().numerator;
        match self.time_signature().kind {
            crate::engine::MeterKind::Asymmetric => meter::grouping_options(numerator)
                .map(|opts| opts.to_vec())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    pub fn set_subdivision(&self, subdivision: Subdivision) {
        if let Ok(mut p) = self.params.lock() {
            p.set_subdivision(subdivision);
        }
    }

    pub fn subdivision(&self) -> Subdivision {
        self.params
            .lock()
            .map(|p| p.subdivision)
            .unwrap_or_default()
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.params
            .lock()
            .map(|p| p.meter.clone())
            .unwrap_or_default()
    }

    // --- SOUND ---

    pub fn set_timbre(&self, timbre: Timbre) {
        if let Ok(mut p) = self.params.lock() {
            p.set_timbre(timbre);
        }
    }

    pub fn timbre(&self) -> Timbre {
        self.params.lock().map(|p| p.timbre).unwrap_or_default()
    }

    /// Affects subsequently scheduled clicks only; in-flight sounds finish
    /// at their original level.
    pub fn set_volume(&self, volume: f32) {
        let clamped = volume.clamp(0.0, 1.0);
        self.volume.store(clamped.to_bits(), Ordering::Relaxed);
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    pub fn toggle_mute(&self) {
        self.muted.fetch_xor(true, Ordering::Relaxed);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    // --- AUTO RAMP ---

    /// Replace the ramp configuration. Reconciles the timer like
    /// `set_auto_ramp_enabled`: enabling mid-playback starts stepping
    /// immediately, disabling cancels the running timer.
    pub fn set_auto_ramp(&mut self, ramp: AutoRamp) {
        if let Ok(mut p) = self.params.lock() {
            p.set_ramp(ramp);
        }
        self.reconcile_ramp_timer();
    }

    /// Toggle the ramp feature. While playing this also starts or stops the
    /// ramp timer immediately rather than waiting for the next transport
    /// cycle.
    pub fn set_auto_ramp_enabled(&mut self, enabled: bool) {
        if let Ok(mut p) = self.params.lock() {
            p.set_ramp_enabled(enabled);
        }
        self.reconcile_ramp_timer();
    }

    /// The ramp timer runs exactly while `playing && ramp.enabled`. Called
    /// after every mutation of either side of that condition.
    fn reconcile_ramp_timer(&mut self) {
        let should_run = self.ramp_enabled() && self.is_playing();
        if should_run && self.ramp_timer.is_none() {
            self.ramp_timer = Some(spawn_ramp_timer(
                self.params.clone(),
                self.is_playing.clone(),
            ));
        }
        if !should_run {
            if let Some(mut ramp) = self.ramp_timer.take() {
                ramp.cancel();
            }
        }
    }

    pub fn auto_ramp(&self) -> AutoRamp {
        self.params.lock().map(|p| p.ramp.clone()).unwrap_or_default()
    }

    fn ramp_enabled(&self) -> bool {
        self.params.lock().map(|p| p.ramp.enabled).unwrap_or(false)
    }

    // --- UI SNAPSHOTS ---

    /// The tick cursor as of the most recent scheduling pass. Read-only:
    /// the pump is the single writer.
    pub fn current_tick(&self) -> usize {
        self.published_tick.load(Ordering::Relaxed)
    }

    pub fn indicator(&self) -> BeatIndicator {
        let tick = self.current_tick();
        if let Ok(p) = self.params.lock() {
            BeatIndicator::for_grid(&p.grid(), tick)
        } else {
            BeatIndicator::Counter { beat: 1, of: 1 }
        }
    }

    /// Audio-clock time, or 0 before the backend exists.
    pub fn clock_seconds(&self) -> f64 {
        self.audio.as_ref().map(|a| a.clock.seconds()).unwrap_or(0.0)
    }
}

impl Drop for MetronomeRuntime {
    fn drop(&mut self) {
        // Both timers must die with the runtime; a surviving pump would keep
        // firing into freed state.
        self.pause();
    }
}

fn open_audio_backend(
    is_playing: Arc<AtomicBool>,
    muted: Arc<AtomicBool>,
    volume: Arc<AtomicU32>,
) -> anyhow::Result<AudioBackend> {
    let output = setup_output_device()?;
    let clock = Arc::new(SampleClock::new(output.output_sample_rate));
    let bank = Arc::new(ClickBank::render(output.output_sample_rate));

    let rb = HeapRb::<ClickEvent>::new(EVENT_QUEUE_CAPACITY);
    let (producer, consumer) = rb.split();

    let err_fn = |err| eprintln!("Metronome output error: {err}");
    let stream = match output.sample_format {
        SampleFormat::F32 => build_click_stream::<f32, _>(
            output.device,
            output.config,
            is_playing,
            muted,
            volume,
            clock.clone(),
            bank,
            consumer,
            err_fn,
        )?,
        SampleFormat::I16 => build_click_stream::<i16, _>(
            output.device,
            output.config,
            is_playing,
            muted,
            volume,
            clock.clone(),
            bank,
            consumer,
            err_fn,
        )?,
        SampleFormat::U16 => build_click_stream::<u16, _>(
            output.device,
            output.config,
            is_playing,
            muted,
            volume,
            clock.clone(),
            bank,
            consumer,
            err_fn,
        )?,
        other => anyhow::bail!("unsupported output sample format: {other:?}"),
    };
    stream.play()?;

    Ok(AudioBackend {
        clock,
        producer: Arc::new(Mutex::new(producer)),
        _stream: stream,
    })
}
