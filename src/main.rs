// src/main.rs

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::Duration;

use metro_modules::controller::MetronomeController;

fn main() -> Result<(), anyhow::Error> {
    let mut metronome = MetronomeController::new();

    println!("Press [SPACE] Start/Stop | [↑↓] Tempo ±5 | [←→] Tempo ±1 | digits+[ENTER] set tempo");
    println!("      [S] Signature | [G] Grouping | [D] Subdivision | [T] Timbre | [ [ ] ] Volume | [M] Mute | [A] Auto-ramp | [Q] Quit");

    enable_raw_mode()?;

    // Target 20 FPS (50ms per frame)
    let target_frame_duration = Duration::from_millis(50);

    // Initial draw
    metronome.run_tick()?;

    loop {
        if event::poll(target_frame_duration)? {
            if let Event::Key(ev) = event::read()? {
                if ev.kind == KeyEventKind::Press {
                    if ev.code == KeyCode::Char('c')
                        && ev.modifiers.contains(KeyModifiers::CONTROL)
                    {
                        break;
                    }

                    if metronome.should_quit(ev.code) {
                        break;
                    }

                    metronome.handle_key(ev.code);
                    // Force an immediate redraw on input for responsiveness
                    metronome.run_tick()?;
                    continue;
                }
            }
        }

        metronome.run_tick()?;
    }

    disable_raw_mode()?;
    println!("\n🛑 Metronome stopped.");
    Ok(())
}
