// src/lib.rs

pub mod audio;
pub mod audio_runtime;
pub mod click;
pub mod controller;
pub mod engine;
pub mod indicator;
pub mod ramp;
pub mod scheduler;

pub use audio_runtime::MetronomeRuntime;
pub use click::Timbre;
pub use engine::{Subdivision, TimeSignature};
pub use indicator::BeatIndicator; // convenience
pub use ramp::AutoRamp;
