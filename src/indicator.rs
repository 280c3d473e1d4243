// src/indicator.rs

use serde::Serialize;

use crate::engine::{AccentLevel, BeatGrid};

/// Measures with more ticks than this render as a numeric counter instead
/// of per-tick dots (a 32-dot row is unreadable at any size).
pub const DOT_DISPLAY_MAX: usize = 12;

/// Snapshot of the beat display for a UI layer to render. Computed from the
/// published tick cursor; purely visual, never fed back into scheduling.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum BeatIndicator {
    Dots {
        accents: Vec<AccentLevel>,
        current: usize,
    },
    Counter {
        beat: usize,
        of: usize,
    },
}

impl BeatIndicator {
    pub fn for_grid(grid: &BeatGrid, current_tick: usize) -> Self {
        let total = grid.total_ticks();
        let current = if total == 0 { 0 } else { current_tick % total };
        if total <= DOT_DISPLAY_MAX {
            BeatIndicator::Dots {
                accents: (0..total).map(|tick| grid.accent_level(tick)).collect(),
                current,
            }
        } else {
            BeatIndicator::Counter { beat: current + 1, of: total }
        }
    }
}
