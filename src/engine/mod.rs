// src/engine/mod.rs

pub mod meter;
pub mod grid;

pub use meter::{MeterKind, Subdivision, TimeSignature};
pub use grid::{AccentLevel, BeatGrid};

use crate::click::Timbre;
use crate::ramp::AutoRamp;

pub const MIN_BPM: u32 = 20;
pub const MAX_BPM: u32 = 300;
pub const DEFAULT_BPM: u32 = 60;

pub fn clamp_bpm(bpm: u32) -> u32 {
    bpm.clamp(MIN_BPM, MAX_BPM)
}

/// Coerce free-text tempo entry to a valid integer BPM. Garbage gets the
/// default; anything numeric is clamped. Never an error — the last commit
/// always yields a usable tempo.
pub fn coerce_tempo_text(text: &str) -> u32 {
    match text.trim().parse::<i64>() {
        Ok(v) if v >= 0 => clamp_bpm(v.min(u32::MAX as i64) as u32),
        _ => DEFAULT_BPM,
    }
}

/// User-configured engine state shared between the control surface and the
/// scheduler pump. The pump reads it at the start of each scheduling pass;
/// `generation` bumps whenever the measure shape changes so the pump knows
/// to reset its tick cursor (stale positions would refer to a measure that
/// no longer exists).
#[derive(Clone, Debug)]
pub struct EngineParams {
    pub meter: TimeSignature,
    pub subdivision: Subdivision,
    pub bpm: u32,
    pub timbre: Timbre,
    pub ramp: AutoRamp,
    pub generation: u64,
}

impl EngineParams {
    pub fn new(default_timbre: Timbre) -> Self {
        Self {
            meter: TimeSignature::default(),
            subdivision: Subdivision::default(),
            bpm: DEFAULT_BPM,
            timbre: default_timbre,
            ramp: AutoRamp::default(),
            generation: 0,
        }
    }

    pub fn grid(&self) -> BeatGrid {
        BeatGrid::new(self.meter.clone(), self.subdivision)
    }

    pub fn set_bpm(&mut self, bpm: u32) {
        self.bpm = clamp_bpm(bpm);
    }

    pub fn adjust_bpm(&mut self, delta: i32) {
        let next = self.bpm as i64 + delta as i64;
        self.bpm = clamp_bpm(next.clamp(0, u32::MAX as i64) as u32);
    }

    pub fn set_signature(&mut self, numerator: u32, denominator: u32) {
        let numerator = numerator.clamp(1, 32);
        let denominator = if [1, 2, 4, 8, 16, 32].contains(&denominator) {
            denominator
        } else {
            4
        };
        self.meter = TimeSignature::derive(numerator, denominator, None);
        self.generation += 1;
    }

    /// Pick one of the canonical grouping options for the current asymmetric
    /// numerator. Ignored for simple/compound meters or bad indices.
    pub fn set_grouping(&mut self, option_index: usize) {
        if self.meter.kind != MeterKind::Asymmetric {
            return;
        }
        if let Some(options) = meter::grouping_options(self.meter.numerator) {
            if let Some(grouping) = options.get(option_index) {
                self.meter = TimeSignature::derive(
                    self.meter.numerator,
                    self.meter.denominator,
                    Some(grouping),
                );
                self.generation += 1;
            }
        }
    }

    pub fn set_subdivision(&mut self, subdivision: Subdivision) {
        if self.subdivision != subdivision {
            self.subdivision = subdivision;
            self.generation += 1;
        }
    }

    pub fn set_timbre(&mut self, timbre: Timbre) {
        self.timbre = timbre;
    }

    /// Replace the auto-ramp configuration. A zero step is invalid input and
    /// leaves the previous configuration in place; interval and bounds are
    /// clamped instead of rejected.
    pub fn set_ramp(&mut self, ramp: AutoRamp) {
        if ramp.step_bpm == 0 {
            return;
        }
        self.ramp = ramp.sanitized();
    }

    pub fn set_ramp_enabled(&mut self, enabled: bool) {
        self.ramp.enabled = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tempo_text_coercion() {
        assert_eq!(coerce_tempo_text("120"), 120);
        assert_eq!(coerce_tempo_text("  88 "), 88);
        assert_eq!(coerce_tempo_text("fast"), DEFAULT_BPM);
        assert_eq!(coerce_tempo_text(""), DEFAULT_BPM);
        assert_eq!(coerce_tempo_text("5"), MIN_BPM);
        assert_eq!(coerce_tempo_text("9999"), MAX_BPM);
        assert_eq!(coerce_tempo_text("-40"), DEFAULT_BPM);
    }

    #[test]
    fn test_adjust_bpm_clamps() {
        let mut params = EngineParams::new(Timbre::Woodblock);
        params.set_bpm(298);
        params.adjust_bpm(5);
        assert_eq!(params.bpm, MAX_BPM);
        params.set_bpm(22);
        params.adjust_bpm(-5);
        assert_eq!(params.bpm, MIN_BPM);
    }

    #[test]
    fn test_signature_change_bumps_generation() {
        let mut params = EngineParams::new(Timbre::Woodblock);
        let g0 = params.generation;
        params.set_signature(7, 8);
        assert!(params.generation > g0);
        let g1 = params.generation;
        params.set_subdivision(Subdivision::Sixteenth);
        assert!(params.generation > g1);
    }

    #[test]
    fn test_grouping_picker() {
        let mut params = EngineParams::new(Timbre::Woodblock);
        params.set_signature(7, 8);
        params.set_grouping(1);
        assert_eq!(params.meter.grouping, vec![2, 2, 3]);
        // Out-of-range index leaves the grouping alone.
        params.set_grouping(99);
        assert_eq!(params.meter.grouping, vec![2, 2, 3]);
        // Grouping picks are meaningless for simple meters.
        params.set_signature(4, 4);
        params.set_grouping(0);
        assert!(params.meter.grouping.is_empty());
    }

    #[test]
    fn test_zero_step_ramp_rejected() {
        let mut params = EngineParams::new(Timbre::Woodblock);
        let before = params.ramp.clone();
        params.set_ramp(AutoRamp { step_bpm: 0, ..before.clone() });
        assert_eq!(params.ramp, before);
    }
}
