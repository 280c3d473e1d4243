// src/controller.rs

use std::fmt::Write as FmtWrite;
use std::io::{stdout, Write};

use crossterm::event::KeyCode;
use crossterm::{
    cursor::MoveTo,
    execute,
    terminal::{BeginSynchronizedUpdate, Clear, ClearType, EndSynchronizedUpdate},
};

use crate::audio_runtime::MetronomeRuntime;
use crate::click::{Timbre, ALL_TIMBRES};
use crate::engine::{AccentLevel, MeterKind, Subdivision};
use crate::indicator::BeatIndicator;

// Signatures reachable with the [S] key, covering all three meter families.
const SIGNATURE_PRESETS: [(u32, u32); 10] = [
    (4, 4),
    (3, 4),
    (2, 4),
    (5, 4),
    (6, 8),
    (9, 8),
    (12, 8),
    (5, 8),
    (7, 8),
    (11, 8),
];

pub struct MetronomeController {
    runtime: MetronomeRuntime,

    signature_index: usize,
    grouping_index: usize,
    timbre_index: usize,

    // Digits typed toward a tempo entry; committed with [ENTER].
    tempo_entry: String,

    // --- OPTIMIZATION STATE ---
    cached_tick: usize,
    cached_status: String,
    force_redraw: bool,

    // Reusable buffer for CLI output.
    draw_buffer: String,
}

impl MetronomeController {
    pub fn new() -> Self {
        let timbre = Timbre::default();
        let timbre_index = ALL_TIMBRES
            .iter()
            .position(|t| *t == timbre)
            .unwrap_or(0);
        Self {
            runtime: MetronomeRuntime::new(timbre),
            signature_index: 0,
            grouping_index: 0,
            timbre_index,
            tempo_entry: String::new(),
            cached_tick: usize::MAX,
            cached_status: String::new(),
            force_redraw: true,
            draw_buffer: String::with_capacity(1024),
        }
    }

    pub fn run_tick(&mut self) -> Result<(), anyhow::Error> {
        let tick = self.runtime.current_tick();
        let status = self.status_line();

        // Dirty check: only touch the terminal when something moved.
        if tick == self.cached_tick && status == self.cached_status && !self.force_redraw {
            return Ok(());
        }
        self.cached_tick = tick;
        self.cached_status = status;
        self.force_redraw = false;

        self.draw_buffer.clear();
        let _ = write!(self.draw_buffer, "{}", MoveTo(0, 0));
        let _ = write!(self.draw_buffer, "{}", Clear(ClearType::UntilNewLine));
        let _ = write!(self.draw_buffer, "{}", self.cached_status);
        let _ = write!(self.draw_buffer, "{}", MoveTo(0, 1));
        let _ = write!(self.draw_buffer, "{}", Clear(ClearType::UntilNewLine));
        self.render_beat_row();
        let _ = write!(self.draw_buffer, "{}", MoveTo(0, 2));

        let mut stdout = stdout();
        execute!(stdout, BeginSynchronizedUpdate)?;
        stdout.write_all(self.draw_buffer.as_bytes())?;
        execute!(stdout, EndSynchronizedUpdate)?;
        stdout.flush()?;

        Ok(())
    }

    fn status_line(&self) -> String {
        let ts = self.runtime.time_signature();
        let family = match ts.kind {
            MeterKind::Simple => "simple",
            MeterKind::Compound => "compound",
            MeterKind::Asymmetric => "asym",
        };
        let transport = if self.runtime.is_playing() { "▶" } else { "⏸" };
        let mute = if self.runtime.is_muted() { " 🔇" } else { "" };
        let ramp = self.runtime.auto_ramp();
        let ramp_tag = if ramp.enabled {
            format!(" | ramp {:+}bpm/{}s", ramp.step_bpm, ramp.interval_secs)
        } else {
            String::new()
        };
        let entry = if self.tempo_entry.is_empty() {
            String::new()
        } else {
            format!(" | tempo> {}_", self.tempo_entry)
        };

        let mut line = format!(
            "{} {} BPM | {}/{} ({})",
            transport,
            self.runtime.tempo(),
            ts.numerator,
            ts.denominator,
            family,
        );
        if ts.kind == MeterKind::Asymmetric {
            let groups: Vec<String> = ts.grouping.iter().map(|g| g.to_string()).collect();
            let _ = write!(line, " [{}]", groups.join("+"));
        }
        let _ = write!(
            line,
            " | sub: {} | {} | vol {:.0}%{}{}{}",
            self.runtime.subdivision().name(),
            self.runtime.timbre().name(),
            self.runtime.volume() * 100.0,
            mute,
            ramp_tag,
            entry,
        );
        line
    }

    fn render_beat_row(&mut self) {
        match self.runtime.indicator() {
            BeatIndicator::Dots { accents, current } => {
                for (i, accent) in accents.iter().enumerate() {
                    let glyph = match accent {
                        AccentLevel::Downbeat => '◆',
                        AccentLevel::Accent => '●',
                        AccentLevel::Weak => '·',
                    };
                    if i == current && self.runtime.is_playing() {
                        let _ = write!(self.draw_buffer, "[{}]", glyph);
                    } else {
                        let _ = write!(self.draw_buffer, " {} ", glyph);
                    }
                }
            }
            BeatIndicator::Counter { beat, of } => {
                let _ = write!(self.draw_buffer, "Beat {beat} / {of}");
            }
        }
    }

    pub fn handle_key(&mut self, key: KeyCode) {
        // Digits feed the tempo entry; ENTER commits, ESC abandons.
        if self.handle_tempo_entry(key) {
            self.force_redraw = true;
            return;
        }

        self.handle_transport_keys(key);
        self.handle_tempo_keys(key);
        self.handle_measure_keys(key);
        self.handle_sound_keys(key);
        self.force_redraw = true;
    }

    /// Returns true if the key was consumed by the tempo entry field.
    fn handle_tempo_entry(&mut self, key: KeyCode) -> bool {
        match key {
            KeyCode::Char(c) if c.is_ascii_digit() && self.tempo_entry.len() < 6 => {
                self.tempo_entry.push(c);
                true
            }
            KeyCode::Enter if !self.tempo_entry.is_empty() => {
                self.runtime.commit_tempo_text(&self.tempo_entry);
                self.tempo_entry.clear();
                true
            }
            KeyCode::Esc if !self.tempo_entry.is_empty() => {
                self.tempo_entry.clear();
                true
            }
            KeyCode::Backspace if !self.tempo_entry.is_empty() => {
                self.tempo_entry.pop();
                true
            }
            _ => false,
        }
    }

    fn handle_transport_keys(&mut self, key: KeyCode) {
        if key == KeyCode::Char(' ') {
            self.runtime.toggle_play();
        }
    }

    fn handle_tempo_keys(&mut self, key: KeyCode) {
        match key {
            KeyCode::Up => self.runtime.adjust_tempo(5),
            KeyCode::Down => self.runtime.adjust_tempo(-5),
            KeyCode::Right => self.runtime.adjust_tempo(1),
            KeyCode::Left => self.runtime.adjust_tempo(-1),
            _ => {}
        }
    }

    fn handle_measure_keys(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('s') | KeyCode::Char('S') => {
                self.signature_index = (self.signature_index + 1) % SIGNATURE_PRESETS.len();
                let (num, den) = SIGNATURE_PRESETS[self.signature_index];
                self.grouping_index = 0;
                self.runtime.set_signature(num, den);
            }
            KeyCode::Char('g') | KeyCode::Char('G') => {
                let options = self.runtime.grouping_options();
                if !options.is_empty() {
                    self.grouping_index = (self.grouping_index + 1) % options.len();
                    self.runtime.set_grouping(self.grouping_index);
                }
            }
            KeyCode::Char('d') | KeyCode::Char('D') => {
                let next = match self.runtime.subdivision() {
                    Subdivision::Quarter => Subdivision::Eighth,
                    Subdivision::Eighth => Subdivision::Triplet,
                    Subdivision::Triplet => Subdivision::Sixteenth,
                    Subdivision::Sixteenth => Subdivision::Quarter,
                };
                self.runtime.set_subdivision(next);
            }
            _ => {}
        }
    }

    fn handle_sound_keys(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('t') | KeyCode::Char('T') => {
                self.timbre_index = (self.timbre_index + 1) % ALL_TIMBRES.len();
                self.runtime.set_timbre(ALL_TIMBRES[self.timbre_index]);
            }
            KeyCode::Char(']') => {
                let v = self.runtime.volume();
                self.runtime.set_volume(v + 0.1);
            }
            KeyCode::Char('[') => {
                let v = self.runtime.volume();
                self.runtime.set_volume(v - 0.1);
            }
            KeyCode::Char('m') | KeyCode::Char('M') => {
                self.runtime.toggle_mute();
            }
            KeyCode::Char('a') | KeyCode::Char('A') => {
                let enabled = !self.runtime.auto_ramp().enabled;
                self.runtime.set_auto_ramp_enabled(enabled);
            }
            _ => {}
        }
    }

    pub fn should_quit(&self, key: KeyCode) -> bool {
        // While the tempo entry is active, letters are still commands but
        // quitting stays explicit.
        matches!(key, KeyCode::Char('q') | KeyCode::Char('Q'))
    }
}

impl Default for MetronomeController {
    fn default() -> Self {
        Self::new()
    }
}
