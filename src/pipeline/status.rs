// Session data the state machine and the clock mutate. No timers in here, those
// live behind the scheduler so this stays plain data.

use serde::Serialize;
use crate::shared::{
    ClockSource, LooperState, DEFAULT_BPM, LFO_RATE, MAX_BPM, MIN_BPM, TOTAL_STEPS,
    is_bar_start, step_period_ms,
};

#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct Timing {
    pub last_step_ms: u64,          // when the cursor last moved
    pub button_press_start_ms: u64, // when the current press began
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionStatus {
    pub bpm: u32,
    pub step_period_ms: u32,
    pub state: LooperState,
    pub resume_state: LooperState, // where a transient state returns to
    pub current_track: usize,
    pub current_step: usize,
    pub parked: bool, // cursor waits on current_step; the next advance plays it in place
    pub recording_step_count: usize,
    pub timing: Timing,
    pub ghost_bar_counter: u8,
    pub lfo_phase: u16,
    pub clock_source: ClockSource,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::new(DEFAULT_BPM)
    }
}

impl SessionStatus {
    pub fn new(bpm: u32) -> Self {
        let bpm = bpm.clamp(MIN_BPM, MAX_BPM);
        Self {
            bpm,
            step_period_ms: step_period_ms(bpm),
            state: LooperState::Waiting,
            resume_state: LooperState::Waiting,
            current_track: 0,
            current_step: 0,
            parked: true,
            recording_step_count: 0,
            timing: Timing::default(),
            ghost_bar_counter: 0,
            lfo_phase: 0,
            clock_source: ClockSource::Internal,
        }
    }

    /// Returns true when the tempo actually changed.
    pub fn update_bpm(&mut self, bpm: u32) -> bool {
        let bpm = bpm.clamp(MIN_BPM, MAX_BPM);
        if bpm == self.bpm {
            return false;
        }
        self.bpm = bpm;
        self.step_period_ms = step_period_ms(bpm);
        true
    }

    // back to step 0, which the next advance plays without moving
    pub fn rewind(&mut self) {
        self.current_step = 0;
        self.parked = true;
    }

    /// Move the cursor one step. Returns true when the new step starts a bar.
    pub fn advance_step(&mut self, now_ms: u64) -> bool {
        if self.parked {
            self.parked = false;
        } else {
            self.current_step = (self.current_step + 1) % TOTAL_STEPS;
        }
        self.timing.last_step_ms = now_ms;
        self.lfo_phase = self.lfo_phase.wrapping_add(LFO_RATE);
        let bar_start = is_bar_start(self.current_step);
        if bar_start {
            self.ghost_bar_counter = self.ghost_bar_counter.wrapping_add(1);
        }
        bar_start
    }

    /// The mode underneath any transient state.
    pub fn base_state(&self) -> LooperState {
        if self.state.is_transient() { self.resume_state } else { self.state }
    }

    pub fn enter_transient(&mut self, state: LooperState) {
        debug_assert!(state.is_transient());
        if !self.state.is_transient() {
            self.resume_state = self.state;
        }
        self.state = state;
    }

    // change the underlying mode without leaving a transient state early
    pub fn set_base_state(&mut self, state: LooperState) {
        if self.state.is_transient() {
            self.resume_state = state;
        } else {
            self.state = state;
        }
    }

    pub fn is_running(&self) -> bool {
        !matches!(self.base_state(), LooperState::Waiting | LooperState::ClearTracks)
    }

    pub fn is_sounding(&self) -> bool {
        matches!(
            self.base_state(),
            LooperState::Playing | LooperState::SyncPlaying | LooperState::Recording
        )
    }

    /// Playing state for the current clock source.
    pub fn playing_state(&self) -> LooperState {
        match self.clock_source {
            ClockSource::Internal => LooperState::Playing,
            ClockSource::External => LooperState::SyncPlaying,
        }
    }

    pub fn bar_index(&self) -> usize {
        self.current_step / crate::shared::STEPS_PER_BAR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_advance_after_rewind_is_step_zero() {
        let mut s = SessionStatus::default();
        s.current_step = 9;
        s.parked = false;
        s.rewind();
        assert_eq!(s.current_step, 0);
        assert!(s.advance_step(0));
        assert_eq!(s.current_step, 0);
        assert_eq!(s.ghost_bar_counter, 1);
        assert_eq!(s.lfo_phase, LFO_RATE);
    }

    #[test]
    fn full_loop_counts_bars_and_wraps() {
        let mut s = SessionStatus::default();
        s.current_step = 5;
        s.parked = false;
        for i in 0..TOTAL_STEPS {
            s.advance_step(i as u64);
        }
        assert_eq!(s.current_step, 5);
        assert_eq!(s.ghost_bar_counter, 2);
    }

    #[test]
    fn lfo_wraps_after_four_bars() {
        let mut s = SessionStatus::default();
        for _ in 0..(4 * crate::shared::STEPS_PER_BAR) {
            s.advance_step(0);
        }
        assert_eq!(s.lfo_phase, 0);
    }

    #[test]
    fn bpm_update_recomputes_period() {
        let mut s = SessionStatus::default();
        assert!(!s.update_bpm(120));
        assert!(s.update_bpm(60));
        assert_eq!(s.step_period_ms, 250);
        s.update_bpm(10_000);
        assert_eq!(s.bpm, MAX_BPM);
    }

    #[test]
    fn transient_state_remembers_where_it_came_from() {
        let mut s = SessionStatus::default();
        s.state = LooperState::Playing;
        s.enter_transient(LooperState::TapTempo);
        assert_eq!(s.base_state(), LooperState::Playing);
        s.enter_transient(LooperState::TrackSwitch);
        assert_eq!(s.resume_state, LooperState::Playing);
        assert!(s.is_sounding());
    }
}
