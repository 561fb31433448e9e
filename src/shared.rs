// Loop geometry and the small vocabulary types shared by the core and the front panel.
//
// The looper is a single-button groove box:
//   Press / Release       //  short press toggles playback, a tap while recording is a hit
//   LongPress             //  hold past the threshold: start (or finish) a recording
//   TrackSwitch           //  next track
//   TapTempo              //  tap in a new tempo
//   Clear                 //  wipe every track (or drop the take while recording)
//
// Debouncing and the long-press threshold belong to whoever produces these events;
// the looper only ever sees the already-resolved enumeration.

use serde::Serialize;

use crate::pipeline::params;

pub const DEFAULT_BPM: u32 = 120;
pub const MIN_BPM: u32 = 20;
pub const MAX_BPM: u32 = 300;

pub const BARS: usize = 2; // loop length in bars
pub const BEATS_PER_BAR: usize = 4; // 4/4
pub const STEPS_PER_BEAT: usize = 4; // 16th notes

pub const STEPS_PER_BAR: usize = STEPS_PER_BEAT * BEATS_PER_BAR;
pub const TOTAL_STEPS: usize = STEPS_PER_BAR * BARS;
pub const CLICK_DIV: usize = TOTAL_STEPS / BARS / BEATS_PER_BAR;

// one full LFO cycle every four bars
pub const LFO_RATE: u16 = (65536 / (4 * BEATS_PER_BAR * STEPS_PER_BEAT)) as u16;

// MIDI clock runs at 24 ticks per quarter note
pub const MIDI_TICKS_PER_BEAT: usize = 24;
pub const TICKS_PER_STEP: usize = MIDI_TICKS_PER_BEAT / STEPS_PER_BEAT;

pub const FULL_VELOCITY: u8 = 127;

/// Milliseconds per step at the given tempo.
pub fn step_period_ms(bpm: u32) -> u32 {
    let bpm = bpm.clamp(MIN_BPM, MAX_BPM);
    60_000 / (bpm * STEPS_PER_BEAT as u32)
}

/// Wraps any step offset into the loop.
#[inline]
pub fn wrap_step(step: usize) -> usize {
    step % TOTAL_STEPS
}

#[inline]
pub fn is_bar_start(step: usize) -> bool {
    step % STEPS_PER_BAR == 0
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LooperState {
    Waiting,
    Playing,
    Recording,
    TrackSwitch,
    TapTempo,
    ClearTracks,
    SyncMute,    // slaved to MIDI clock, silent until the next bar
    SyncPlaying, // slaved to MIDI clock, sounding
}

impl LooperState {
    pub fn label(self) -> &'static str {
        match self {
            LooperState::Waiting => "WAIT",
            LooperState::Playing => "PLAY",
            LooperState::Recording => "REC",
            LooperState::TrackSwitch => "TRACK",
            LooperState::TapTempo => "TAP",
            LooperState::ClearTracks => "CLEAR",
            LooperState::SyncMute => "SYNC-",
            LooperState::SyncPlaying => "SYNC",
        }
    }

    // states that come back to where they came from
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            LooperState::TrackSwitch | LooperState::TapTempo | LooperState::ClearTracks
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ClockSource {
    Internal,
    External,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ButtonEvent {
    Press,
    LongPress,
    Release,
    TrackSwitch,
    TapTempo,
    Clear,
}

// which control change the front panel knob is currently bound to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlPage {
    GhostIntensity,
    EuclidKMax,
    EuclidKSufficient,
    EuclidKIntensity,
    EuclidProbability,
    BoundaryBefore,
    BoundaryAfter,
    FillStartMean,
    FillStartSd,
    FillProbability,
    FillInterval,
}

impl ControlPage {
    pub fn next(self) -> Self {
        match self {
            ControlPage::GhostIntensity => ControlPage::EuclidKMax,
            ControlPage::EuclidKMax => ControlPage::EuclidKSufficient,
            ControlPage::EuclidKSufficient => ControlPage::EuclidKIntensity,
            ControlPage::EuclidKIntensity => ControlPage::EuclidProbability,
            ControlPage::EuclidProbability => ControlPage::BoundaryBefore,
            ControlPage::BoundaryBefore => ControlPage::BoundaryAfter,
            ControlPage::BoundaryAfter => ControlPage::FillStartMean,
            ControlPage::FillStartMean => ControlPage::FillStartSd,
            ControlPage::FillStartSd => ControlPage::FillProbability,
            ControlPage::FillProbability => ControlPage::FillInterval,
            ControlPage::FillInterval => ControlPage::GhostIntensity,
        }
    }

    pub fn controller(self) -> u8 {
        match self {
            ControlPage::GhostIntensity => params::CC_GHOST_INTENSITY,
            ControlPage::EuclidKMax => params::CC_EUCLID_K_MAX,
            ControlPage::EuclidKSufficient => params::CC_EUCLID_K_SUFFICIENT,
            ControlPage::EuclidKIntensity => params::CC_EUCLID_K_INTENSITY,
            ControlPage::EuclidProbability => params::CC_EUCLID_PROBABILITY,
            ControlPage::BoundaryBefore => params::CC_BOUNDARY_BEFORE,
            ControlPage::BoundaryAfter => params::CC_BOUNDARY_AFTER,
            ControlPage::FillStartMean => params::CC_FILL_START_MEAN,
            ControlPage::FillStartSd => params::CC_FILL_START_SD,
            ControlPage::FillProbability => params::CC_FILL_PROBABILITY,
            ControlPage::FillInterval => params::CC_FILL_INTERVAL,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ControlPage::GhostIntensity => "GHOST",
            ControlPage::EuclidKMax => "K MAX",
            ControlPage::EuclidKSufficient => "K SUFF",
            ControlPage::EuclidKIntensity => "K INT",
            ControlPage::EuclidProbability => "E PROB",
            ControlPage::BoundaryBefore => "BEFORE",
            ControlPage::BoundaryAfter => "AFTER",
            ControlPage::FillStartMean => "F MEAN",
            ControlPage::FillStartSd => "F SD",
            ControlPage::FillProbability => "F PROB",
            ControlPage::FillInterval => "F BARS",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LedState {
    Off,
    OnMedium, // step can take a ghost note
    OnHigh,   // recorded hit
    Blink,    // playhead
}

#[derive(Clone, Debug)]
pub struct DisplayState {
    pub leds: [LedState; TOTAL_STEPS],
    pub playing_step: Option<usize>, // None while the cursor is parked
    pub state: LooperState,
    pub clock_source: ClockSource,
    pub track_index: usize,
    pub track_name: String,
    pub bpm: u32,
    pub bar: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_defaults() {
        assert_eq!(TOTAL_STEPS, 32);
        assert_eq!(STEPS_PER_BAR, 16);
        assert_eq!(CLICK_DIV, 4);
        assert_eq!(LFO_RATE, 1024);
        assert_eq!(TICKS_PER_STEP, 6);
    }

    #[test]
    fn wrap_returns_to_start() {
        for s in 0..TOTAL_STEPS {
            assert_eq!(wrap_step(s + TOTAL_STEPS), s);
            let mut cursor = s;
            for _ in 0..TOTAL_STEPS {
                cursor = wrap_step(cursor + 1);
            }
            assert_eq!(cursor, s);
        }
    }

    #[test]
    fn step_period_at_120() {
        assert_eq!(step_period_ms(120), 125);
        // out of range tempos saturate instead of dividing by zero
        assert_eq!(step_period_ms(0), step_period_ms(MIN_BPM));
        assert_eq!(step_period_ms(u32::MAX), step_period_ms(MAX_BPM));
    }

    #[test]
    fn control_pages_cycle() {
        let mut page = ControlPage::GhostIntensity;
        let mut seen = Vec::new();
        for _ in 0..11 {
            seen.push(page.controller());
            page = page.next();
        }
        assert_eq!(page, ControlPage::GhostIntensity);
        assert_eq!(seen, (params::CC_GHOST_INTENSITY..=params::CC_FILL_INTERVAL).collect::<Vec<u8>>());
    }
}
