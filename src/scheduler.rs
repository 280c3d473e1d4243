// src/scheduler.rs

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ringbuf::traits::Producer;

use crate::audio::SampleClock;
use crate::click::Timbre;
use crate::engine::{AccentLevel, BeatGrid, EngineParams};

/// How far ahead of the audio clock sound events are queued. Large enough
/// that a late pump pass never leaves the callback starved, small enough
/// that parameter changes become audible quickly.
pub const LOOKAHEAD_SECS: f64 = 0.1;

/// Driver-timer period. The pump itself needs no precision; the audio clock
/// timestamps on the events carry the accuracy.
pub const PUMP_INTERVAL_MS: u64 = 25;

/// Offset of the first click after transport start.
pub const START_DELAY_SECS: f64 = 0.05;

/// One schedulable click, stamped with the absolute audio-clock time it
/// must sound at.
#[derive(Clone, Copy, Debug)]
pub struct ClickEvent {
    pub start_secs: f64,
    pub tick: usize,
    pub accent: AccentLevel,
    pub timbre: Timbre,
}

/// Mutable cursor state owned by the scheduler while playing. Created on
/// transport start, discarded on stop.
#[derive(Clone, Debug)]
pub struct ScheduleState {
    pub tick_cursor: usize,
    pub next_event_secs: f64,
}

impl ScheduleState {
    pub fn new(start_secs: f64) -> Self {
        Self { tick_cursor: 0, next_event_secs: start_secs }
    }

    pub fn reset(&mut self, start_secs: f64) {
        self.tick_cursor = 0;
        self.next_event_secs = start_secs;
    }
}

/// One lookahead pass: queue every tick falling inside the window, advancing
/// the cursor (wrapping at the measure boundary) and the next-event time by
/// that tick's interval. Events come out in strictly increasing time order.
pub fn run_pass(
    state: &mut ScheduleState,
    grid: &BeatGrid,
    bpm: u32,
    timbre: Timbre,
    now: f64,
    lookahead: f64,
    out: &mut Vec<ClickEvent>,
) {
    let total = grid.total_ticks();
    if total == 0 {
        return;
    }
    while state.next_event_secs < now + lookahead {
        let tick = state.tick_cursor;
        out.push(ClickEvent {
            start_secs: state.next_event_secs,
            tick,
            accent: grid.accent_level(tick),
            timbre,
        });
        state.next_event_secs += grid.interval_seconds(tick, bpm);
        state.tick_cursor = (tick + 1) % total;
    }
}

/// Cancellation handle for a periodic background task. Cancel is idempotent
/// and never panics out of teardown — a worker that already exited (or
/// panicked) is simply reaped.
pub struct TimerHandle {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TimerHandle {
    pub fn new(stop: Arc<AtomicBool>, handle: JoinHandle<()>) -> Self {
        Self { stop, handle: Some(handle) }
    }

    pub fn cancel(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Spawn the 25ms scheduler pump. Each pass re-reads the shared parameters
/// (so tempo/signature/subdivision changes apply between passes, never
/// mid-pass), resets the cursor when the measure shape changed, queues the
/// window's events, and publishes the cursor for the UI beat indicator.
pub fn spawn_pump<P>(
    params: Arc<Mutex<EngineParams>>,
    clock: Arc<SampleClock>,
    producer: Arc<Mutex<P>>,
    published_tick: Arc<AtomicUsize>,
) -> TimerHandle
where
    P: Producer<Item = ClickEvent> + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();

    let handle = thread::spawn(move || {
        let mut state = ScheduleState::new(clock.seconds() + START_DELAY_SECS);
        let mut events: Vec<ClickEvent> = Vec::with_capacity(32);
        let mut local_generation = match params.lock() {
            Ok(p) => p.generation,
            Err(_) => return,
        };

        while !stop_flag.load(Ordering::SeqCst) {
            {
                let Ok(p) = params.lock() else { break };
                if p.generation != local_generation {
                    local_generation = p.generation;
                    state.reset(clock.seconds() + START_DELAY_SECS);
                }
                let grid = p.grid();
                run_pass(
                    &mut state,
                    &grid,
                    p.bpm,
                    p.timbre,
                    clock.seconds(),
                    LOOKAHEAD_SECS,
                    &mut events,
                );
            }

            if !events.is_empty() {
                if let Ok(mut prod) = producer.lock() {
                    for event in events.drain(..) {
                        // A full queue only means the callback is behind by a
                        // few windows; dropping the overflow is inaudible
                        // compared to blocking the pump.
                        let _ = prod.try_push(event);
                    }
                } else {
                    events.clear();
                }
            }
            published_tick.store(state.tick_cursor, Ordering::Relaxed);

            thread::sleep(Duration::from_millis(PUMP_INTERVAL_MS));
        }
    });

    TimerHandle::new(stop, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{BeatGrid, Subdivision, TimeSignature};

    fn grid(num: u32, den: u32, sub: Subdivision) -> BeatGrid {
        BeatGrid::new(TimeSignature::derive(num, den, None), sub)
    }

    #[test]
    fn test_pass_fills_exactly_the_window() {
        // 4/4 quarters @ 120: 0.5s per tick. A 1.0s window starting at the
        // event origin holds ticks at 0.0 and 0.5.
        let g = grid(4, 4, Subdivision::Quarter);
        let mut state = ScheduleState::new(0.0);
        let mut out = Vec::new();
        run_pass(&mut state, &g, 120, Timbre::Woodblock, 0.0, 1.0, &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].start_secs, 0.0);
        assert_eq!(out[1].start_secs, 0.5);
        assert_eq!(state.tick_cursor, 2);
        assert!((state.next_event_secs - 1.0).abs() < 1e-12);

        // The next pass at the same clock adds nothing.
        run_pass(&mut state, &g, 120, Timbre::Woodblock, 0.0, 1.0, &mut out);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_events_strictly_ordered_and_cursor_matches() {
        let g = grid(7, 8, Subdivision::Eighth);
        let mut state = ScheduleState::new(0.0);
        let mut out = Vec::new();
        // March the clock forward across several lookahead windows.
        let mut now = 0.0;
        for _ in 0..400 {
            run_pass(&mut state, &g, 180, Timbre::Click, now, LOOKAHEAD_SECS, &mut out);
            now += PUMP_INTERVAL_MS as f64 / 1000.0;
        }

        assert!(!out.is_empty());
        for pair in out.windows(2) {
            assert!(pair[1].start_secs > pair[0].start_secs);
            assert_eq!(pair[1].tick, (pair[0].tick + 1) % g.total_ticks());
        }
        // Cursor equals elapsed ticks mod measure length.
        assert_eq!(state.tick_cursor, out.len() % g.total_ticks());
        assert_eq!(out[0].tick, 0);
        assert_eq!(out[0].accent, crate::engine::AccentLevel::Downbeat);
    }

    #[test]
    fn test_liveness_across_simulated_clock() {
        // After advancing the clock by many windows, the number of scheduled
        // ticks matches elapsed time within one tick.
        let g = grid(4, 4, Subdivision::Quarter);
        let bpm = 120;
        let mut state = ScheduleState::new(0.0);
        let mut out = Vec::new();
        let horizon = 10.0; // seconds
        let mut now = 0.0;
        while now < horizon {
            run_pass(&mut state, &g, bpm, Timbre::Beep, now, LOOKAHEAD_SECS, &mut out);
            now += 0.025;
        }
        let expected = ((horizon + LOOKAHEAD_SECS) / 0.5) as isize;
        let got = out.len() as isize;
        assert!((got - expected).abs() <= 1, "expected ~{expected}, got {got}");
    }

    #[test]
    fn test_asymmetric_intervals_vary_within_measure() {
        // 7/8 grouped 3+2+2 at the quarter divisor: event spacing alternates
        // 0.75 / 0.5 / 0.5 @ 120.
        let g = grid(7, 8, Subdivision::Quarter);
        let mut state = ScheduleState::new(0.0);
        let mut out = Vec::new();
        run_pass(&mut state, &g, 120, Timbre::Woodblock, 0.0, 3.5, &mut out);
        assert_eq!(out.len(), 6); // two full measures of 1.75s
        let deltas: Vec<f64> = out.windows(2).map(|p| p[1].start_secs - p[0].start_secs).collect();
        let expected = [0.75, 0.5, 0.5, 0.75, 0.5];
        for (d, e) in deltas.iter().zip(expected) {
            assert!((d - e).abs() < 1e-9, "{d} vs {e}");
        }
    }

    #[test]
    fn test_pump_restarts_measure_on_signature_change() {
        use ringbuf::traits::{Consumer, Split};
        use ringbuf::HeapRb;

        // Default params: 4/4 quarters @ 60, one tick per second. The clock
        // is advanced by hand, so every pass is deterministic.
        let params = Arc::new(Mutex::new(EngineParams::new(Timbre::Woodblock)));
        let clock = Arc::new(SampleClock::new(48_000));
        let published = Arc::new(AtomicUsize::new(0));
        let (producer, mut consumer) = HeapRb::<ClickEvent>::new(256).split();
        let mut pump = spawn_pump(
            params.clone(),
            clock.clone(),
            Arc::new(Mutex::new(producer)),
            published.clone(),
        );

        fn drain<C: Consumer<Item = ClickEvent>>(consumer: &mut C) -> Vec<ClickEvent> {
            let mut out = Vec::new();
            while let Some(event) = consumer.try_pop() {
                out.push(event);
            }
            out
        }

        // First window holds only the downbeat at the start delay.
        thread::sleep(Duration::from_millis(120));
        let first = drain(&mut consumer);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].tick, 0);
        assert!((first[0].start_secs - START_DELAY_SECS).abs() < 1e-9);

        // One second later the cursor is mid-measure on tick 1.
        clock.advance(48_000);
        thread::sleep(Duration::from_millis(120));
        let second = drain(&mut consumer);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].tick, 1);

        // A signature change bumps the generation; the pump must restart
        // the measure from tick 0 at a fresh origin, not continue on tick 2.
        if let Ok(mut p) = params.lock() {
            p.set_signature(3, 4);
        }
        thread::sleep(Duration::from_millis(120));
        let third = drain(&mut consumer);
        assert!(!third.is_empty());
        assert_eq!(third[0].tick, 0);
        assert!((third[0].start_secs - (1.0 + START_DELAY_SECS)).abs() < 1e-9);

        pump.cancel();
    }

    #[test]
    fn test_reset_returns_to_downbeat() {
        let g = grid(4, 4, Subdivision::Quarter);
        let mut state = ScheduleState::new(0.0);
        let mut out = Vec::new();
        run_pass(&mut state, &g, 120, Timbre::Beep, 0.0, 0.8, &mut out);
        assert_ne!(state.tick_cursor, 0);
        state.reset(5.0);
        assert_eq!(state.tick_cursor, 0);
        assert_eq!(state.next_event_secs, 5.0);
    }
}
