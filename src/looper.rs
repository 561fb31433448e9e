//! The looper: session state machine, step evaluation and the glue between the clock,
//! the track store and the ghost note generator.
//!
//! Everything runs on one thread. The caller feeds it, in this order each time round
//! its loop:
//! 1. MIDI input ([`Looper::handle_midi`])
//! 2. button gestures ([`Looper::handle_button`])
//! 3. due timers ([`Looper::on_timer`])
//! 4. [`Looper::process_state`], which resolves the transient states
//!
//! Each entry point takes the current time in milliseconds plus the scheduler and note
//! emitter it may need, so the whole thing can be driven by a test with a fake clock.

use log::{debug, info, trace, warn};
use serde::Serialize;

use crate::clock::{Scheduler, TempoClock, TimerId};
use crate::config::{ClickConfig, LooperConfig};
use crate::ghost::{fill_due, GhostNoteGenerator, NoteDecision};
use crate::midi_api::{MidiMessage, NoteEmitter};
use crate::pipeline::params::GhostParameters;
use crate::pipeline::status::SessionStatus;
use crate::pipeline::track::{Track, TrackStore};
use crate::shared::{
    is_bar_start, wrap_step, ButtonEvent, ClockSource, DisplayState, LedState, LooperState,
    CLICK_DIV, FULL_VELOCITY, TOTAL_STEPS,
};

// taps kept for the tempo average
const MAX_TAPS: usize = 4;

// where the single button is in its gesture
#[derive(Clone, Copy, Debug, Default)]
struct Gesture {
    held: bool,
    long: bool,   // the current hold passed the long-press threshold
    arming: bool, // this hold started the recording; its release does nothing else
    pending_hit: Option<usize>,
}

pub struct Looper {
    status: SessionStatus,
    tracks: TrackStore,
    params: GhostParameters,
    generator: GhostNoteGenerator,
    clock: TempoClock,
    click: ClickConfig,
    tap_timeout_ms: u64,
    taps: Vec<u64>,
    gesture: Gesture,
}

#[derive(Serialize)]
pub struct Snapshot<'a> {
    pub status: &'a SessionStatus,
    pub ghost: &'a GhostParameters,
    pub tracks: &'a [Track],
}

impl Default for Looper {
    fn default() -> Self {
        Self::new(&LooperConfig::default())
    }
}

impl Looper {
    pub fn new(config: &LooperConfig) -> Self {
        let generator = match config.seed {
            Some(seed) => GhostNoteGenerator::with_seed(seed),
            None => GhostNoteGenerator::new(),
        };
        let mut params = config.ghost;
        params.normalize();
        Self {
            status: SessionStatus::new(config.bpm),
            tracks: TrackStore::new(config.build_tracks()),
            params,
            generator,
            clock: TempoClock::new(),
            click: config.click,
            tap_timeout_ms: config.tap_timeout_ms,
            taps: Vec::with_capacity(MAX_TAPS + 1),
            gesture: Gesture::default(),
        }
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn state(&self) -> LooperState {
        self.status.state
    }

    pub fn tracks(&self) -> &TrackStore {
        &self.tracks
    }

    pub fn tracks_mut(&mut self) -> &mut TrackStore {
        &mut self.tracks
    }

    pub fn params(&self) -> &GhostParameters {
        &self.params
    }

    pub fn set_params(&mut self, params: GhostParameters) {
        self.params = params;
        self.params.normalize();
    }

    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            status: &self.status,
            ghost: &self.params,
            tracks: self.tracks.as_slice(),
        }
    }

    pub fn update_bpm(&mut self, bpm: u32) {
        if self.status.update_bpm(bpm) {
            info!("tempo {} bpm", self.status.bpm);
        }
    }

    // ── Buttons ───────────────────────────────────────────────────

    pub fn handle_button(
        &mut self,
        event: ButtonEvent,
        now_ms: u64,
        sched: &mut impl Scheduler,
        out: &mut impl NoteEmitter,
    ) {
        debug!("button {event:?} in {:?}", self.status.state);
        match event {
            ButtonEvent::Press => self.on_press(now_ms, out),
            ButtonEvent::LongPress => self.on_long_press(now_ms, sched),
            ButtonEvent::Release => self.on_release(now_ms, sched),
            ButtonEvent::TrackSwitch => self.on_track_switch(),
            ButtonEvent::TapTempo => self.on_tap(now_ms),
            ButtonEvent::Clear => self.on_clear(),
        }
    }

    fn on_press(&mut self, now_ms: u64, out: &mut impl NoteEmitter) {
        self.gesture.held = true;
        self.gesture.long = false;
        self.gesture.pending_hit = None;
        self.status.timing.button_press_start_ms = now_ms;

        if self.status.state == LooperState::Recording && !self.gesture.arming {
            // monitor the hit straight away, write it once we know it was a tap
            let track = self.tracks.get(self.status.current_track);
            out.emit_note(track.channel, track.note, FULL_VELOCITY);
            self.gesture.pending_hit = Some(self.quantize(now_ms));
        }
    }

    fn on_long_press(&mut self, now_ms: u64, sched: &mut impl Scheduler) {
        if !self.gesture.held || self.gesture.long {
            return;
        }
        self.gesture.long = true;
        self.gesture.pending_hit = None;
        match self.status.state {
            LooperState::Waiting
            | LooperState::Playing
            | LooperState::SyncMute
            | LooperState::SyncPlaying => self.start_recording(now_ms, sched),
            _ => {}
        }
    }

    fn on_release(&mut self, now_ms: u64, sched: &mut impl Scheduler) {
        if !self.gesture.held {
            return;
        }
        let gesture = self.gesture;
        self.gesture = Gesture::default();

        if gesture.arming {
            return;
        }
        match (self.status.state, gesture.long) {
            (LooperState::Recording, true) => self.commit_recording(),
            (LooperState::Recording, false) => {
                if let Some(step) = gesture.pending_hit {
                    let track = self.tracks.get_mut(self.status.current_track);
                    track.set_step(step, true);
                    debug!("hit on step {step} for {}", track.name);
                }
            }
            (state, false) if !state.is_transient() => self.toggle_playback(now_ms, sched),
            _ => {}
        }
    }

    fn on_track_switch(&mut self) {
        match self.status.state {
            s if s.is_transient() => {}
            LooperState::Recording => {
                // keep the take, the new track starts out playing
                self.commit_recording();
                self.status.enter_transient(LooperState::TrackSwitch);
            }
            _ => self.status.enter_transient(LooperState::TrackSwitch),
        }
    }

    fn on_tap(&mut self, now_ms: u64) {
        match self.status.state {
            LooperState::TapTempo => self.register_tap(now_ms),
            s if s.is_transient() => {}
            _ => {
                self.taps.clear();
                self.status.enter_transient(LooperState::TapTempo);
                self.register_tap(now_ms);
            }
        }
    }

    fn on_clear(&mut self) {
        match self.status.state {
            LooperState::Recording => self.discard_recording(),
            s if s.is_transient() => {}
            _ => self.status.enter_transient(LooperState::ClearTracks),
        }
    }

    fn toggle_playback(&mut self, now_ms: u64, sched: &mut impl Scheduler) {
        let next = match (self.status.state, self.status.clock_source) {
            (LooperState::Waiting, ClockSource::Internal) => {
                self.status.rewind();
                self.clock.start_internal(now_ms, sched);
                LooperState::Playing
            }
            // the external clock keeps the cursor moving, we just wait for a bar line
            (LooperState::Waiting, ClockSource::External) => LooperState::SyncMute,
            (LooperState::Playing, _) => {
                self.clock.stop_internal(sched);
                self.status.rewind();
                LooperState::Waiting
            }
            (LooperState::SyncPlaying | LooperState::SyncMute, _) => LooperState::Waiting,
            (state, _) => state,
        };
        if next != self.status.state {
            info!("{:?} -> {:?}", self.status.state, next);
            self.status.state = next;
        }
    }

    // a hit pressed in the back half of a step belongs to the next one
    fn quantize(&self, press_ms: u64) -> usize {
        let since = press_ms.saturating_sub(self.status.timing.last_step_ms);
        let step = self.status.current_step;
        if self.status.parked {
            step
        } else if since * 2 >= self.status.step_period_ms as u64 {
            wrap_step(step + 1)
        } else {
            step
        }
    }

    fn register_tap(&mut self, now_ms: u64) {
        if let Some(&last) = self.taps.last() {
            if now_ms.saturating_sub(last) > self.tap_timeout_ms {
                self.taps.clear();
            }
        }
        self.taps.push(now_ms);
        if self.taps.len() > MAX_TAPS {
            self.taps.remove(0);
        }
        if let [first, .., last] = self.taps.as_slice() {
            let intervals = (self.taps.len() - 1) as u64;
            let mean = last.saturating_sub(*first) / intervals;
            if mean > 0 {
                self.update_bpm(((60_000 + mean / 2) / mean) as u32);
            }
        }
    }

    // ── Recording ─────────────────────────────────────────────────

    fn start_recording(&mut self, now_ms: u64, sched: &mut impl Scheduler) {
        if self.status.base_state() == LooperState::Waiting
            && self.status.clock_source == ClockSource::Internal
        {
            self.status.rewind();
            self.clock.start_internal(now_ms, sched);
        }
        let track = self.tracks.get_mut(self.status.current_track);
        track.snapshot();
        track.pattern = [false; TOTAL_STEPS];
        track.clear_fill();
        self.status.recording_step_count = 0;
        self.gesture.arming = true;
        info!("{:?} -> Recording on {}", self.status.state, track.name);
        self.status.state = LooperState::Recording;
    }

    fn commit_recording(&mut self) {
        let track = self.tracks.get_mut(self.status.current_track);
        track.commit();
        info!("recorded {} hits on {}", track.hit_count(), track.name);
        self.finish_recording();
    }

    fn discard_recording(&mut self) {
        let track = self.tracks.get_mut(self.status.current_track);
        track.restore();
        info!("discarded take on {}", track.name);
        self.finish_recording();
    }

    fn finish_recording(&mut self) {
        self.status.recording_step_count = 0;
        self.gesture = Gesture::default();
        let next = self.status.playing_state();
        self.status.set_base_state(next);
    }

    // ── Transient states ──────────────────────────────────────────

    pub fn process_state(&mut self, now_ms: u64, sched: &mut impl Scheduler, out: &mut impl NoteEmitter) {
        match self.status.state {
            LooperState::TrackSwitch => {
                self.status.current_track = self.tracks.next_index(self.status.current_track);
                let track = self.tracks.get(self.status.current_track);
                out.emit_note(track.channel, track.note, FULL_VELOCITY);
                info!("track {} ({})", self.status.current_track, track.name);
                self.status.state = self.status.resume_state;
            }
            LooperState::ClearTracks => {
                self.tracks.clear_all();
                self.clock.stop_internal(sched);
                if self.status.clock_source == ClockSource::Internal {
                    self.status.rewind();
                }
                self.status.state = LooperState::Waiting;
                self.status.resume_state = LooperState::Waiting;
                info!("cleared all tracks");
            }
            LooperState::TapTempo => {
                let idle = self
                    .taps
                    .last()
                    .is_none_or(|&last| now_ms.saturating_sub(last) > self.tap_timeout_ms);
                if idle {
                    self.taps.clear();
                    self.status.state = self.status.resume_state;
                }
            }
            _ => {}
        }
    }

    // ── Clock ─────────────────────────────────────────────────────

    pub fn handle_midi(
        &mut self,
        msg: MidiMessage,
        now_ms: u64,
        sched: &mut impl Scheduler,
        out: &mut impl NoteEmitter,
    ) {
        match msg {
            MidiMessage::Clock => self.on_clock_tick(now_ms, sched, out),
            MidiMessage::Start => self.on_clock_start(now_ms, sched),
            MidiMessage::Stop => self.on_clock_stop(),
            MidiMessage::Continue => self.on_clock_continue(),
            MidiMessage::ControlChange { channel, controller, value } => {
                self.on_control_change(channel, controller, value)
            }
        }
    }

    pub fn on_clock_start(&mut self, now_ms: u64, sched: &mut impl Scheduler) {
        if self.status.base_state() == LooperState::Recording {
            self.commit_recording();
        }
        self.clock.on_midi_start(&mut self.status, now_ms, sched);
        self.status.set_base_state(LooperState::SyncMute);
    }

    pub fn on_clock_tick(&mut self, now_ms: u64, sched: &mut impl Scheduler, out: &mut impl NoteEmitter) {
        if self.clock.on_midi_tick(&mut self.status, now_ms, sched) {
            self.advance(now_ms, out);
        }
    }

    pub fn on_clock_stop(&mut self) {
        self.clock.on_midi_stop(&self.status);
        if self.status.base_state() == LooperState::SyncPlaying {
            self.status.set_base_state(LooperState::SyncMute);
        }
    }

    pub fn on_clock_continue(&mut self) {
        self.clock.on_midi_continue(&self.status);
    }

    /// CC70..=80 retune the generator. Listens on every channel.
    pub fn on_control_change(&mut self, channel: u8, controller: u8, value: u8) {
        if self.params.apply_control_change(controller, value) {
            debug!("cc{controller} = {value} (ch {})", channel + 1);
        } else {
            trace!("ignored cc{controller} on ch {}", channel + 1);
        }
    }

    pub fn on_timer(&mut self, timer: TimerId, now_ms: u64, sched: &mut impl Scheduler, out: &mut impl NoteEmitter) {
        match timer {
            TimerId::Step => {
                if !self.status.is_running() {
                    self.clock.stop_internal(sched);
                    return;
                }
                if self.clock.on_step_timer(&self.status, now_ms, sched) {
                    self.advance(now_ms, out);
                }
            }
            TimerId::Watchdog => {
                if !self.clock.on_watchdog(&mut self.status) {
                    return;
                }
                let next = match self.status.base_state() {
                    LooperState::SyncPlaying => LooperState::Playing,
                    LooperState::SyncMute => LooperState::Waiting,
                    other => other,
                };
                self.status.set_base_state(next);
                warn!("midi clock lost, falling back to internal clock ({:?})", next);
                if self.status.is_running() {
                    self.clock.start_internal(now_ms, sched);
                }
            }
        }
    }

    // ── Steps ─────────────────────────────────────────────────────

    fn advance(&mut self, now_ms: u64, out: &mut impl NoteEmitter) {
        let bar_start = self.status.advance_step(now_ms);
        let step = self.status.current_step;

        if bar_start && self.status.base_state() == LooperState::SyncMute {
            info!("SyncMute -> SyncPlaying on bar {}", self.status.bar_index() + 1);
            self.status.set_base_state(LooperState::SyncPlaying);
        }

        if self.status.base_state() == LooperState::Recording {
            if self.status.recording_step_count >= TOTAL_STEPS {
                // a full pass captured
                self.commit_recording();
            } else {
                self.status.recording_step_count += 1;
            }
        }

        if step == 0 {
            self.begin_pass();
        }

        if self.status.is_sounding() {
            self.play_step(step, out);
        }
    }

    // fresh random draws and fills for the pass starting now
    fn begin_pass(&mut self) {
        let lfo = self.status.lfo_phase;
        let fill = fill_due(self.status.ghost_bar_counter, self.params.fill.interval_bar);
        for track in self.tracks.iter_mut() {
            self.generator.begin_pass(track, &self.params, lfo);
            if fill {
                if let Some(span) = self.generator.synthesize_fill(track, &self.params.fill) {
                    debug!("fill on {} over steps {}..{}", track.name, span.start, span.end);
                }
            } else {
                track.clear_fill();
            }
        }
    }

    fn play_step(&mut self, step: usize, out: &mut impl NoteEmitter) {
        let recording = self.status.base_state() == LooperState::Recording;
        if recording && self.click.enabled && step % CLICK_DIV == 0 {
            let velocity = if is_bar_start(step) { self.click.accent_velocity } else { self.click.velocity };
            out.emit_note(self.click.channel, self.click.note, velocity);
        }

        let lfo = self.status.lfo_phase;
        for (i, track) in self.tracks.iter().enumerate() {
            let decision = if recording && i == self.status.current_track {
                // only what is being captured, no ghosts over the take
                if track.pattern[step] {
                    NoteDecision::Recorded { velocity: FULL_VELOCITY }
                } else {
                    NoteDecision::Rest
                }
            } else {
                GhostNoteGenerator::decide(track, step, &self.params, lfo)
            };
            if let Some(velocity) = decision.velocity() {
                trace!("step {step} {} vel {velocity}", track.name);
                out.emit_note(track.channel, track.note, velocity);
            }
        }
    }

    // ── Display ───────────────────────────────────────────────────

    pub fn display_state(&self) -> DisplayState {
        let track = self.tracks.get(self.status.current_track);
        let playing_step = (self.status.is_running() && !self.status.parked).then_some(self.status.current_step);

        let mut leds = [LedState::Off; TOTAL_STEPS];
        for (step, led) in leds.iter_mut().enumerate() {
            *led = if playing_step == Some(step) {
                LedState::Blink
            } else if track.pattern[step] {
                LedState::OnHigh
            } else if track.fill_pattern[step] || track.ghost_notes[step].probability > 0 {
                LedState::OnMedium
            } else {
                LedState::Off
            };
        }

        DisplayState {
            leds,
            playing_step,
            state: self.status.state,
            clock_source: self.status.clock_source,
            track_index: self.status.current_track,
            track_name: track.name.clone(),
            bpm: self.status.bpm,
            bar: self.status.bar_index() as u8 + 1,
        }
    }
}
