use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ghostloop::shared::ButtonEvent;

use super::mode::{PanelEvent, TuiState};

// poll for input from tui, tracks the held button in tuistate,
// resolves keys to sequences of panel events
pub fn poll_input(timeout: Duration, ts: &mut TuiState) -> anyhow::Result<Vec<PanelEvent>> {
    let mut events = Vec::new();
    if event::poll(timeout)? {
        if let Event::Key(key) = event::read()? {
            events = handle_key(key.code, key.kind, ts);
        }
    }
    // the long press is a matter of time, not of a key
    if ts.long_press_due(Instant::now()) {
        events.push(PanelEvent::Button(ButtonEvent::LongPress));
    }
    Ok(events)
}

fn handle_key(code: KeyCode, kind: KeyEventKind, ts: &mut TuiState) -> Vec<PanelEvent> {
    // real releases only arrive when the terminal reports event types
    if kind == KeyEventKind::Release {
        return match code {
            KeyCode::Char('r') => release(ts),
            _ => vec![],
        };
    }

    match code {
        KeyCode::Esc => vec![PanelEvent::Quit],

        // quick tap: toggle playback, or a hit while recording
        KeyCode::Char(' ') => vec![
            PanelEvent::Button(ButtonEvent::Press),
            PanelEvent::Button(ButtonEvent::Release),
        ],

        // hold the button: lowercase = down, shifted = up
        KeyCode::Char('r') => {
            if ts.press(Instant::now()) {
                vec![PanelEvent::Button(ButtonEvent::Press)]
            } else {
                vec![]
            }
        }
        KeyCode::Char('R') => release(ts),

        KeyCode::Tab => vec![PanelEvent::Button(ButtonEvent::TrackSwitch)],
        KeyCode::Char('t') => vec![PanelEvent::Button(ButtonEvent::TapTempo)],
        KeyCode::Char('X') => vec![PanelEvent::Button(ButtonEvent::Clear)],

        // knob for the current control page
        KeyCode::Char('[') => vec![PanelEvent::Knob(-1)],
        KeyCode::Char(']') => vec![PanelEvent::Knob(1)],
        KeyCode::Char('p') => vec![PanelEvent::NextPage],

        KeyCode::Char('e') => vec![PanelEvent::ToggleClock],

        _ => vec![],
    }
}

fn release(ts: &mut TuiState) -> Vec<PanelEvent> {
    if ts.release() {
        vec![PanelEvent::Button(ButtonEvent::Release)]
    } else {
        vec![]
    }
}
