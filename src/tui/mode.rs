use std::time::Instant;

use ghostloop::shared::{ButtonEvent, ControlPage};

// how long the button key has to stay down to count as a long press
pub const LONG_PRESS_MS: u128 = 400;

// what the keyboard resolves to; button gestures go straight to the looper,
// the rest is handled by the panel itself
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PanelEvent {
    Button(ButtonEvent),
    Knob(i8), // one detent, -1 or +1
    NextPage,
    ToggleClock,
    Quit,
}

// state local to tui: the held button and which CC the knob is bound to
#[derive(Clone, Debug)]
pub struct TuiState {
    pub button_down: Option<Instant>,
    pub long_sent: bool,
    pub page: ControlPage,
}

impl Default for TuiState {
    fn default() -> Self {
        Self {
            button_down: None,
            long_sent: false,
            page: ControlPage::GhostIntensity,
        }
    }
}

impl TuiState {
    pub fn press(&mut self, now: Instant) -> bool {
        if self.button_down.is_some() {
            return false; // key repeat
        }
        self.button_down = Some(now);
        self.long_sent = false;
        true
    }

    pub fn release(&mut self) -> bool {
        self.long_sent = false;
        self.button_down.take().is_some()
    }

    // fires once per hold, as soon as the threshold is crossed
    pub fn long_press_due(&mut self, now: Instant) -> bool {
        match self.button_down {
            Some(since) if !self.long_sent && now.duration_since(since).as_millis() >= LONG_PRESS_MS => {
                self.long_sent = true;
                true
            }
            _ => false,
        }
    }
}
