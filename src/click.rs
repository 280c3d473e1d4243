// src/click.rs

use std::f32::consts::PI;
use std::sync::Arc;

use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::engine::AccentLevel;

/// The closed set of supported click timbres. Each maps to exactly one
/// synthesis recipe, resolved at selection time — no string-keyed lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timbre {
    Woodblock,
    Beep,
    Click,
    Cowbell,
    HiHat,
}

pub const ALL_TIMBRES: [Timbre; 5] = [
    Timbre::Woodblock,
    Timbre::Beep,
    Timbre::Click,
    Timbre::Cowbell,
    Timbre::HiHat,
];

impl Timbre {
    pub fn name(&self) -> &'static str {
        match self {
            Timbre::Woodblock => "woodblock",
            Timbre::Beep => "beep",
            Timbre::Click => "click",
            Timbre::Cowbell => "cowbell",
            Timbre::HiHat => "hi-hat",
        }
    }

    fn recipe(&self) -> ClickRecipe {
        match self {
            Timbre::Woodblock => ClickRecipe {
                freq: 880.0,
                harmonic: None,
                shape: WaveShape::Sine,
                duration_secs: 0.06,
                decay_rate: 60.0,
                noise_mix: 0.0,
            },
            Timbre::Beep => ClickRecipe {
                freq: 1000.0,
                harmonic: None,
                shape: WaveShape::Sine,
                duration_secs: 0.08,
                decay_rate: 35.0,
                noise_mix: 0.0,
            },
            Timbre::Click => ClickRecipe {
                freq: 1600.0,
                harmonic: None,
                shape: WaveShape::Square,
                duration_secs: 0.02,
                decay_rate: 120.0,
                noise_mix: 0.1,
            },
            Timbre::Cowbell => ClickRecipe {
                // Two detuned partials give the clangy character.
                freq: 560.0,
                harmonic: Some(845.0),
                shape: WaveShape::Square,
                duration_secs: 0.12,
                decay_rate: 28.0,
                noise_mix: 0.0,
            },
            Timbre::HiHat => ClickRecipe {
                freq: 6000.0,
                harmonic: None,
                shape: WaveShape::Sine,
                duration_secs: 0.05,
                decay_rate: 80.0,
                // Mostly noise; the tonal part only tints it.
                noise_mix: 0.85,
            },
        }
    }
}

impl Default for Timbre {
    fn default() -> Self {
        Timbre::Woodblock
    }
}

#[derive(Clone, Copy, Debug)]
enum WaveShape {
    Sine,
    Square,
}

/// One synthesis recipe: frequency set, waveform, decay envelope, and an
/// optional noise layer. Durations stay under 0.2s so clicks never overlap
/// their neighbors even at high tempo and fine subdivisions.
#[derive(Clone, Copy, Debug)]
struct ClickRecipe {
    freq: f32,
    harmonic: Option<f32>,
    shape: WaveShape,
    duration_secs: f32,
    decay_rate: f32,
    noise_mix: f32,
}

impl AccentLevel {
    /// Relative loudness: downbeat and accent full, weak reduced.
    fn gain(&self) -> f32 {
        match self {
            AccentLevel::Downbeat | AccentLevel::Accent => 1.0,
            AccentLevel::Weak => 0.55,
        }
    }

    /// Downbeats move tonal timbres up a register so bar starts stand out
    /// even among full-loudness accents.
    fn pitch_factor(&self) -> f32 {
        match self {
            AccentLevel::Downbeat => 1.5,
            AccentLevel::Accent | AccentLevel::Weak => 1.0,
        }
    }
}

/// Render one click into a mono buffer at `sample_rate`.
fn render_click(recipe: &ClickRecipe, accent: AccentLevel, sample_rate: u32) -> Vec<f32> {
    let num_samples = (recipe.duration_secs * sample_rate as f32) as usize;
    let freq = recipe.freq * accent.pitch_factor();
    let harmonic = recipe.harmonic.map(|h| h * accent.pitch_factor());
    let gain = recipe.gain_scale() * accent.gain();

    let mut rng = rand::rng();
    let mut samples = Vec::with_capacity(num_samples);
    for i in 0..num_samples {
        let t = i as f32 / sample_rate as f32;
        let envelope = (-t * recipe.decay_rate).exp();

        let mut tone = osc(recipe.shape, freq, t);
        if let Some(h) = harmonic {
            tone = 0.6 * tone + 0.4 * osc(recipe.shape, h, t);
        }

        let noise: f32 = rng.random_range(-1.0..1.0);
        let sample = tone * (1.0 - recipe.noise_mix) + noise * recipe.noise_mix;
        samples.push(sample * envelope * gain);
    }
    samples
}

fn osc(shape: WaveShape, freq: f32, t: f32) -> f32 {
    let phase = 2.0 * PI * freq * t;
    match shape {
        WaveShape::Sine => phase.sin(),
        WaveShape::Square => {
            if phase.sin() >= 0.0 { 1.0 } else { -1.0 }
        }
    }
}

impl ClickRecipe {
    /// Square waves read much louder than sines at equal amplitude.
    fn gain_scale(&self) -> f32 {
        match self.shape {
            WaveShape::Sine => 0.8,
            WaveShape::Square => 0.45,
        }
    }
}

const ACCENTS: [AccentLevel; 3] = [AccentLevel::Downbeat, AccentLevel::Accent, AccentLevel::Weak];

/// Pre-rendered click buffers for every (timbre, accent) pair, built once at
/// stream creation so the audio callback only copies samples.
pub struct ClickBank {
    buffers: Vec<Arc<Vec<f32>>>,
}

impl ClickBank {
    pub fn render(sample_rate: u32) -> Self {
        let mut buffers = Vec::with_capacity(ALL_TIMBRES.len() * ACCENTS.len());
        for timbre in ALL_TIMBRES {
            let recipe = timbre.recipe();
            for accent in ACCENTS {
                buffers.push(Arc::new(render_click(&recipe, accent, sample_rate)));
            }
        }
        Self { buffers }
    }

    pub fn buffer(&self, timbre: Timbre, accent: AccentLevel) -> Arc<Vec<f32>> {
        let t = ALL_TIMBRES.iter().position(|x| *x == timbre).unwrap_or(0);
        let a = ACCENTS.iter().position(|x| *x == accent).unwrap_or(0);
        self.buffers[t * ACCENTS.len() + a].clone()
    }
}

/// A click currently sounding in the output callback. `start_sample` is the
/// absolute audio-clock sample the first buffer sample lands on.
pub struct Voice {
    pub buffer: Arc<Vec<f32>>,
    pub start_sample: u64,
    pub pos: usize,
    pub gain: f32,
}

impl Voice {
    pub fn finished(&self) -> bool {
        self.pos >= self.buffer.len()
    }

    /// Sample value at absolute clock position `at`, advancing the cursor.
    /// Zero before the start sample.
    pub fn sample_at(&mut self, at: u64) -> f32 {
        if at < self.start_sample || self.finished() {
            return 0.0;
        }
        let s = self.buffer[self.pos] * self.gain;
        self.pos += 1;
        s
    }
}
