// src/ramp.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde::{Serialize, Deserialize};

use crate::engine::{EngineParams, MAX_BPM, MIN_BPM};
use crate::scheduler::TimerHandle;

/// Auto-tempo ramp: while playing and enabled, the tempo is nudged by
/// `step_bpm` every `interval_secs`, clamped to [min_bpm, max_bpm]. The ramp
/// parks at whichever bound the step approaches — no bounce or reverse.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoRamp {
    pub enabled: bool,
    pub step_bpm: i32,
    pub interval_secs: u32,
    pub min_bpm: u32,
    pub max_bpm: u32,
}

impl Default for AutoRamp {
    fn default() -> Self {
        Self {
            enabled: false,
            step_bpm: 5,
            interval_secs: 30,
            min_bpm: MIN_BPM,
            max_bpm: MAX_BPM,
        }
    }
}

impl AutoRamp {
    /// One ramp tick: step and clamp.
    pub fn apply(&self, bpm: u32) -> u32 {
        let next = bpm as i64 + self.step_bpm as i64;
        next.clamp(self.min_bpm as i64, self.max_bpm as i64) as u32
    }

    /// Clamp interval and bounds into their domains. Zero-step configs are
    /// rejected upstream; this only normalizes the rest.
    pub fn sanitized(mut self) -> Self {
        self.interval_secs = self.interval_secs.max(1);
        self.min_bpm = self.min_bpm.clamp(MIN_BPM, MAX_BPM);
        self.max_bpm = self.max_bpm.clamp(MIN_BPM, MAX_BPM);
        if self.min_bpm > self.max_bpm {
            std::mem::swap(&mut self.min_bpm, &mut self.max_bpm);
        }
        self
    }
}

/// Spawn the auto-ramp timer: independent of the scheduler pump, it nudges
/// the shared tempo every `interval_secs` while playback is live. The
/// transport cancels it together with the pump on stop; it also goes quiet
/// (rather than stepping) if playback or the feature is switched off
/// between ticks.
pub fn spawn_ramp_timer(
    params: Arc<Mutex<EngineParams>>,
    is_playing: Arc<AtomicBool>,
) -> TimerHandle {
    const SLICE_MS: u64 = 50;

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();

    let handle = thread::spawn(move || {
        let mut elapsed_ms: u64 = 0;
        while !stop_flag.load(Ordering::SeqCst) {
            // Sleep in short slices so cancellation stays prompt even for
            // long ramp intervals.
            thread::sleep(Duration::from_millis(SLICE_MS));
            elapsed_ms += SLICE_MS;

            let interval_ms = match params.lock() {
                Ok(p) => p.ramp.interval_secs as u64 * 1000,
                Err(_) => break,
            };
            if elapsed_ms < interval_ms {
                continue;
            }
            elapsed_ms = 0;

            if !is_playing.load(Ordering::Relaxed) {
                continue;
            }
            if let Ok(mut p) = params.lock() {
                if p.ramp.enabled {
                    let next = p.ramp.apply(p.bpm);
                    if next != p.bpm {
                        p.bpm = next;
                        println!("⏩ Auto-ramp: {} BPM", next);
                    }
                }
            }
        }
    });

    TimerHandle::new(stop, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramp_clamps_at_max() {
        let ramp = AutoRamp {
            enabled: true,
            step_bpm: 10,
            interval_secs: 1,
            min_bpm: 60,
            max_bpm: 200,
        };
        // 195 + 10 parks at 200, not 205; further ticks stay there.
        let mut bpm = 195;
        bpm = ramp.apply(bpm);
        assert_eq!(bpm, 200);
        bpm = ramp.apply(bpm);
        assert_eq!(bpm, 200);
    }

    #[test]
    fn test_ramp_clamps_at_min() {
        let ramp = AutoRamp {
            enabled: true,
            step_bpm: -8,
            interval_secs: 2,
            min_bpm: 70,
            max_bpm: 180,
        };
        let mut bpm = 74;
        bpm = ramp.apply(bpm);
        assert_eq!(bpm, 70);
        bpm = ramp.apply(bpm);
        assert_eq!(bpm, 70);
    }

    #[test]
    fn test_sanitize_normalizes_bounds() {
        let ramp = AutoRamp {
            enabled: true,
            step_bpm: 5,
            interval_secs: 0,
            min_bpm: 250,
            max_bpm: 10,
        }
        .sanitized();
        assert_eq!(ramp.interval_secs, 1);
        assert_eq!(ramp.min_bpm, MIN_BPM);
        assert_eq!(ramp.max_bpm, 250);
        assert!(ramp.min_bpm <= ramp.max_bpm);
    }
}
