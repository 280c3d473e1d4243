// src/engine/grid.rs

use serde::{Serialize, Deserialize};

use super::meter::{MeterKind, Subdivision, TimeSignature};

/// How strongly a tick is rendered. Downbeat and Accent play at full
/// loudness (the downbeat in a higher register for tonal timbres); Weak is
/// the reduced in-between click.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccentLevel {
    Downbeat,
    Accent,
    Weak,
}

/// The "Brain" that relates a musician's quarter-note BPM to actual click
/// positions and durations. BPM is always quarter-note beats per minute, even
/// when the audible pulse is an eighth (asymmetric) or a dotted quarter
/// (compound); this is the single place that reconciliation happens.
#[derive(Clone, Debug)]
pub struct BeatGrid {
    pub meter: TimeSignature,
    pub subdivision: Subdivision,
}

impl BeatGrid {
    pub fn new(meter: TimeSignature, subdivision: Subdivision) -> Self {
        Self { meter, subdivision }
    }

    /// Ticks per eighth note for compound/asymmetric meters. The eighth is
    /// the natural unit there, so the quarter divisor is remapped (handled
    /// before calling this) and the triplet divisor collapses onto the
    /// eighth grid, which already carries the ternary feel.
    fn sub_multiplier(&self) -> usize {
        match self.subdivision.divisor() {
            4 => 2,
            _ => 1,
        }
    }

    /// Total schedulable ticks in one measure.
    pub fn total_ticks(&self) -> usize {
        let divisor = self.subdivision.divisor();
        match self.meter.kind {
            MeterKind::Simple => self.meter.beat_count as usize * divisor,
            MeterKind::Compound => {
                if divisor == 1 {
                    // One tick per dotted-quarter beat.
                    self.meter.beat_count as usize
                } else {
                    self.meter.beat_count as usize
                        * self.meter.compound_subdivision_size() as usize
                        * self.sub_multiplier()
                }
            }
            MeterKind::Asymmetric => {
                if divisor == 1 {
                    // One tick per group.
                    self.meter.grouping.len()
                } else {
                    let eighths: u32 = self.meter.grouping.iter().sum();
                    eighths as usize * self.sub_multiplier()
                }
            }
        }
    }

    /// Whether `tick` starts a primary beat or group, and how strongly it
    /// should sound. Tick 0 is always the downbeat.
    pub fn accent_level(&self, tick: usize) -> AccentLevel {
        if tick == 0 {
            return AccentLevel::Downbeat;
        }

        let divisor = self.subdivision.divisor();
        let on_boundary = match self.meter.kind {
            MeterKind::Simple => tick % divisor == 0,
            MeterKind::Compound => {
                if divisor == 1 {
                    // Each tick already represents a full beat.
                    true
                } else {
                    let ticks_per_beat =
                        self.meter.compound_subdivision_size() as usize * self.sub_multiplier();
                    tick % ticks_per_beat == 0
                }
            }
            MeterKind::Asymmetric => {
                if divisor == 1 {
                    true
                } else {
                    let subm = self.sub_multiplier();
                    let mut boundary = 0usize;
                    self.meter.grouping.iter().any(|group| {
                        let start = boundary;
                        boundary += *group as usize * subm;
                        start == tick
                    })
                }
            }
        };

        if on_boundary {
            AccentLevel::Accent
        } else {
            AccentLevel::Weak
        }
    }

    /// Duration in seconds from `tick` to the next tick. Not constant for
    /// asymmetric meters at the quarter divisor: a 3-eighth group lasts 1.5x
    /// a 2-eighth group.
    pub fn interval_seconds(&self, tick: usize, bpm: u32) -> f64 {
        let seconds_per_quarter = 60.0 / bpm as f64;
        let seconds_per_eighth = seconds_per_quarter / 2.0;
        let divisor = self.subdivision.divisor();

        match self.meter.kind {
            MeterKind::Simple => {
                seconds_per_quarter * (4.0 / self.meter.denominator as f64) / divisor as f64
            }
            MeterKind::Compound => {
                if divisor == 1 {
                    // Dotted quarter.
                    seconds_per_quarter * 1.5
                } else {
                    seconds_per_eighth / self.sub_multiplier() as f64
                }
            }
            MeterKind::Asymmetric => {
                if divisor == 1 {
                    let groups = &self.meter.grouping;
                    let group = groups[tick % groups.len()];
                    group as f64 * seconds_per_eighth
                } else {
                    seconds_per_eighth / self.sub_multiplier() as f64
                }
            }
        }
    }

    /// Seconds for one full measure at `bpm`.
    pub fn measure_seconds(&self, bpm: u32) -> f64 {
        (0..self.total_ticks())
            .map(|tick| self.interval_seconds(tick, bpm))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::meter::TimeSignature;

    fn grid(num: u32, den: u32, sub: Subdivision) -> BeatGrid {
        BeatGrid::new(TimeSignature::derive(num, den, None), sub)
    }

    #[test]
    fn test_simple_total_ticks() {
        assert_eq!(grid(4, 4, Subdivision::Quarter).total_ticks(), 4);
        assert_eq!(grid(4, 4, Subdivision::Eighth).total_ticks(), 8);
        assert_eq!(grid(4, 4, Subdivision::Triplet).total_ticks(), 12);
        assert_eq!(grid(3, 4, Subdivision::Sixteenth).total_ticks(), 12);
    }

    #[test]
    fn test_simple_accents_on_beat_starts() {
        for sub in [
            Subdivision::Quarter,
            Subdivision::Eighth,
            Subdivision::Triplet,
            Subdivision::Sixteenth,
        ] {
            let g = grid(4, 4, sub);
            let divisor = sub.divisor();
            for tick in 0..g.total_ticks() {
                let level = g.accent_level(tick);
                if tick == 0 {
                    assert_eq!(level, AccentLevel::Downbeat);
                } else if tick % divisor == 0 {
                    assert_eq!(level, AccentLevel::Accent, "tick {tick} divisor {divisor}");
                } else {
                    assert_eq!(level, AccentLevel::Weak, "tick {tick} divisor {divisor}");
                }
            }
        }
    }

    #[test]
    fn test_seven_eight_eighths() {
        // 7/8 default grouping 3+2+2, eighth subdivision: 7 ticks,
        // accents at 0, 3, 5.
        let g = grid(7, 8, Subdivision::Eighth);
        assert_eq!(g.total_ticks(), 7);
        assert_eq!(g.accent_level(0), AccentLevel::Downbeat);
        for tick in 1..7 {
            let expected = if tick == 3 || tick == 5 {
                AccentLevel::Accent
            } else {
                AccentLevel::Weak
            };
            assert_eq!(g.accent_level(tick), expected, "tick {tick}");
        }
    }

    #[test]
    fn test_seven_eight_sixteenths() {
        // Group boundaries scale with the sub-multiplier: 14 ticks,
        // accents at 0, 6, 10.
        let g = grid(7, 8, Subdivision::Sixteenth);
        assert_eq!(g.total_ticks(), 14);
        assert_eq!(g.accent_level(0), AccentLevel::Downbeat);
        assert_eq!(g.accent_level(6), AccentLevel::Accent);
        assert_eq!(g.accent_level(10), AccentLevel::Accent);
        assert_eq!(g.accent_level(2), AccentLevel::Weak);
        assert_eq!(g.accent_level(12), AccentLevel::Weak);
    }

    #[test]
    fn test_compound_quarter_equivalent() {
        // 6/8 at the quarter divisor: 2 dotted-quarter ticks of 0.75s @ 120.
        let g = grid(6, 8, Subdivision::Quarter);
        assert_eq!(g.total_ticks(), 2);
        for tick in 0..2 {
            assert!((g.interval_seconds(tick, 120) - 0.75).abs() < 1e-12);
        }
        assert_eq!(g.accent_level(0), AccentLevel::Downbeat);
        assert_eq!(g.accent_level(1), AccentLevel::Accent);
    }

    #[test]
    fn test_compound_eighths() {
        // 12/8 eighths: 12 ticks, beat boundaries every 3.
        let g = grid(12, 8, Subdivision::Eighth);
        assert_eq!(g.total_ticks(), 12);
        for tick in 0..12 {
            let expected = match tick {
                0 => AccentLevel::Downbeat,
                3 | 6 | 9 => AccentLevel::Accent,
                _ => AccentLevel::Weak,
            };
            assert_eq!(g.accent_level(tick), expected, "tick {tick}");
        }
        // Eighths are even: 0.25s @ 120.
        assert!((g.interval_seconds(5, 120) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_asymmetric_group_ticks_are_uneven() {
        // 7/8 at the quarter divisor: one tick per group, durations 3:2:2
        // eighths. @ 120 an eighth is 0.25s.
        let g = grid(7, 8, Subdivision::Quarter);
        assert_eq!(g.total_ticks(), 3);
        assert!((g.interval_seconds(0, 120) - 0.75).abs() < 1e-12);
        assert!((g.interval_seconds(1, 120) - 0.50).abs() < 1e-12);
        assert!((g.interval_seconds(2, 120) - 0.50).abs() < 1e-12);
        for tick in 0..3 {
            assert_ne!(g.accent_level(tick), AccentLevel::Weak);
        }
    }

    #[test]
    fn test_tempo_reference_is_quarter_note() {
        // Changing the denominator alone scales intervals by 4/denominator;
        // the bpm value itself is untouched by the grid.
        let bpm = 120;
        let four_four = grid(4, 4, Subdivision::Quarter).interval_seconds(0, bpm);
        let four_two = grid(4, 2, Subdivision::Quarter).interval_seconds(0, bpm);
        let four_eight = grid(4, 8, Subdivision::Quarter).interval_seconds(0, bpm);
        assert!((four_two - four_four * 2.0).abs() < 1e-12);
        assert!((four_eight - four_four * 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_triplet_collapses_to_eighths_in_compound() {
        let triplet = grid(6, 8, Subdivision::Triplet);
        let eighth = grid(6, 8, Subdivision::Eighth);
        assert_eq!(triplet.total_ticks(), eighth.total_ticks());
        assert!(
            (triplet.interval_seconds(0, 90) - eighth.interval_seconds(0, 90)).abs() < 1e-12
        );
    }

    #[test]
    fn test_measure_seconds() {
        // 4/4 @ 60: four quarters = 4s, regardless of subdivision.
        for sub in [Subdivision::Quarter, Subdivision::Eighth, Subdivision::Sixteenth] {
            let g = grid(4, 4, sub);
            assert!((g.measure_seconds(60) - 4.0).abs() < 1e-9, "{:?}", sub);
        }
        // 7/8 @ 120: seven eighths = 1.75s at every divisor.
        for sub in [Subdivision::Quarter, Subdivision::Eighth, Subdivision::Sixteenth] {
            let g = grid(7, 8, sub);
            assert!((g.measure_seconds(120) - 1.75).abs() < 1e-9, "{:?}", sub);
        }
    }

    #[test]
    fn test_unsupported_thirteen_eight_is_flat() {
        // 13/8 degrades to a flat simple grid: every tick a beat at the
        // eighth duration, accent only via tick % divisor.
        let g = grid(13, 8, Subdivision::Quarter);
        assert_eq!(g.total_ticks(), 13);
        assert!((g.interval_seconds(0, 120) - 0.25).abs() < 1e-12);
        assert_eq!(g.accent_level(0), AccentLevel::Downbeat);
        assert_eq!(g.accent_level(1), AccentLevel::Accent);
    }
}
