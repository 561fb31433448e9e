// Tempo clock: decides when the cursor moves.
//
// Two sources, one at a time:
//   Internal  //  a one-shot step timer re-armed every step period
//   External  //  MIDI clock, 24 ticks per quarter note, one step every TICKS_PER_STEP ticks
//
// Timers are owned by a Scheduler so the clock itself never sleeps or reads the wall
// clock; every entry point gets `now_ms` from the caller. A watchdog armed on each
// external tick drops the looper back to the internal clock when the ticks stop.

use log::{debug, info};

use crate::pipeline::status::SessionStatus;
use crate::shared::{ClockSource, STEPS_PER_BEAT, TICKS_PER_STEP};

// ticks must arrive at least this often, in step periods, before we give up on them
pub const WATCHDOG_STEP_PERIODS: u64 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerId {
    Step,
    Watchdog,
}

/// One-shot timers. Arming an armed timer replaces its deadline.
pub trait Scheduler {
    fn arm(&mut self, timer: TimerId, deadline_ms: u64);
    fn disarm(&mut self, timer: TimerId);
}

/// Deadline table polled by the main loop.
#[derive(Clone, Debug, Default)]
pub struct DeadlineScheduler {
    step: Option<u64>,
    watchdog: Option<u64>,
}

impl DeadlineScheduler {
    pub fn deadline(&self, timer: TimerId) -> Option<u64> {
        match timer {
            TimerId::Step => self.step,
            TimerId::Watchdog => self.watchdog,
        }
    }

    pub fn next_deadline(&self) -> Option<u64> {
        match (self.step, self.watchdog) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Take the earliest timer that is due, disarming it. The watchdog wins ties.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<TimerId> {
        let due = |d: Option<u64>| d.filter(|&d| d <= now_ms);
        let timer = match (due(self.watchdog), due(self.step)) {
            (Some(w), Some(s)) if s < w => TimerId::Step,
            (Some(_), _) => TimerId::Watchdog,
            (None, Some(_)) => TimerId::Step,
            (None, None) => return None,
        };
        self.disarm(timer);
        Some(timer)
    }
}

impl Scheduler for DeadlineScheduler {
    fn arm(&mut self, timer: TimerId, deadline_ms: u64) {
        match timer {
            TimerId::Step => self.step = Some(deadline_ms),
            TimerId::Watchdog => self.watchdog = Some(deadline_ms),
        }
    }

    fn disarm(&mut self, timer: TimerId) {
        match timer {
            TimerId::Step => self.step = None,
            TimerId::Watchdog => self.watchdog = None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TempoClock {
    tick_count: usize,         // ticks since the last step, 0..TICKS_PER_STEP
    transport_running: bool,   // cleared by MIDI Stop
    next_step_at: Option<u64>, // internal timer deadline
    beat_started_ms: Option<u64>,
    beat_steps: usize,
}

impl Default for TempoClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TempoClock {
    pub fn new() -> Self {
        Self {
            tick_count: 0,
            transport_running: false,
            next_step_at: None,
            beat_started_ms: None,
            beat_steps: 0,
        }
    }

    pub fn transport_running(&self) -> bool {
        self.transport_running
    }

    pub fn watchdog_timeout_ms(status: &SessionStatus) -> u64 {
        WATCHDOG_STEP_PERIODS * status.step_period_ms as u64
    }

    /// Start stepping on the internal timer. The first step fires at `first_step_ms`.
    pub fn start_internal(&mut self, first_step_ms: u64, sched: &mut impl Scheduler) {
        self.next_step_at = Some(first_step_ms);
        sched.arm(TimerId::Step, first_step_ms);
    }

    pub fn stop_internal(&mut self, sched: &mut impl Scheduler) {
        self.next_step_at = None;
        sched.disarm(TimerId::Step);
    }

    /// The step timer fired. Re-arms it one period after the deadline it was armed
    /// for, so jitter in servicing doesn't accumulate. Returns true when the cursor
    /// should advance.
    pub fn on_step_timer(&mut self, status: &SessionStatus, now_ms: u64, sched: &mut impl Scheduler) -> bool {
        if status.clock_source != ClockSource::Internal {
            return false;
        }
        let Some(due) = self.next_step_at else {
            return false;
        };
        let period = status.step_period_ms as u64;
        let mut next = due + period;
        if next <= now_ms {
            // fell more than a step behind; skip ahead rather than burst
            next = now_ms + period;
        }
        self.next_step_at = Some(next);
        sched.arm(TimerId::Step, next);
        true
    }

    /// MIDI Start: follow the external clock from a fresh downbeat.
    pub fn on_midi_start(&mut self, status: &mut SessionStatus, now_ms: u64, sched: &mut impl Scheduler) {
        status.clock_source = ClockSource::External;
        status.rewind();
        self.tick_count = 0;
        self.transport_running = true;
        self.beat_started_ms = None;
        self.beat_steps = 0;
        self.stop_internal(sched);
        sched.arm(TimerId::Watchdog, now_ms + Self::watchdog_timeout_ms(status));
        info!("midi start: following external clock");
    }

    pub fn on_midi_stop(&mut self, status: &SessionStatus) {
        if status.clock_source == ClockSource::External {
            self.transport_running = false;
            info!("midi stop");
        }
    }

    pub fn on_midi_continue(&mut self, status: &SessionStatus) {
        if status.clock_source == ClockSource::External {
            self.transport_running = true;
            info!("midi continue");
        }
    }

    /// MIDI timing clock. Returns true when the cursor should advance. Ticks are
    /// ignored until a Start has put us on the external clock.
    pub fn on_midi_tick(&mut self, status: &mut SessionStatus, now_ms: u64, sched: &mut impl Scheduler) -> bool {
        if status.clock_source != ClockSource::External {
            return false;
        }
        sched.arm(TimerId::Watchdog, now_ms + Self::watchdog_timeout_ms(status));
        if !self.transport_running {
            return false;
        }

        let advance = self.tick_count == 0;
        self.tick_count = (self.tick_count + 1) % TICKS_PER_STEP;
        if advance {
            self.follow_tempo(status, now_ms);
        }
        advance
    }

    /// Watchdog expired. Returns true when this dropped us back to the internal clock.
    pub fn on_watchdog(&mut self, status: &mut SessionStatus) -> bool {
        if status.clock_source != ClockSource::External {
            return false;
        }
        status.clock_source = ClockSource::Internal;
        self.tick_count = 0;
        self.transport_running = false;
        self.beat_started_ms = None;
        true
    }

    // measure one beat of external steps and adopt its tempo, so the watchdog
    // and the internal fallback both run at the host's speed
    fn follow_tempo(&mut self, status: &mut SessionStatus, now_ms: u64) {
        let Some(started) = self.beat_started_ms else {
            self.beat_started_ms = Some(now_ms);
            self.beat_steps = 0;
            return;
        };
        self.beat_steps += 1;
        if self.beat_steps < STEPS_PER_BEAT {
            return;
        }
        let beat_ms = now_ms.saturating_sub(started);
        if beat_ms > 0 {
            let bpm = ((60_000 + beat_ms / 2) / beat_ms) as u32;
            if status.update_bpm(bpm) {
                debug!("external tempo {bpm} bpm");
            }
        }
        self.beat_started_ms = Some(now_ms);
        self.beat_steps = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::MIDI_TICKS_PER_BEAT;

    #[test]
    fn scheduler_rearm_replaces_deadline() {
        let mut s = DeadlineScheduler::default();
        s.arm(TimerId::Step, 100);
        s.arm(TimerId::Step, 50);
        assert_eq!(s.deadline(TimerId::Step), Some(50));
        assert_eq!(s.pop_due(49), None);
        assert_eq!(s.pop_due(50), Some(TimerId::Step));
        assert_eq!(s.pop_due(1_000), None);
    }

    #[test]
    fn scheduler_pops_earliest_first() {
        let mut s = DeadlineScheduler::default();
        s.arm(TimerId::Watchdog, 30);
        s.arm(TimerId::Step, 20);
        assert_eq!(s.next_deadline(), Some(20));
        assert_eq!(s.pop_due(40), Some(TimerId::Step));
        assert_eq!(s.pop_due(40), Some(TimerId::Watchdog));
        assert_eq!(s.next_deadline(), None);
    }

    #[test]
    fn internal_timer_rearms_one_period_later() {
        let status = SessionStatus::new(120);
        let mut sched = DeadlineScheduler::default();
        let mut clock = TempoClock::new();
        clock.start_internal(0, &mut sched);
        assert_eq!(sched.pop_due(0), Some(TimerId::Step));
        assert!(clock.on_step_timer(&status, 3, &mut sched));
        // anchored to the deadline, not to when we got round to it
        assert_eq!(sched.deadline(TimerId::Step), Some(125));
    }

    #[test]
    fn internal_timer_skips_ahead_when_far_behind() {
        let status = SessionStatus::new(120);
        let mut sched = DeadlineScheduler::default();
        let mut clock = TempoClock::new();
        clock.start_internal(0, &mut sched);
        assert!(clock.on_step_timer(&status, 400, &mut sched));
        assert_eq!(sched.deadline(TimerId::Step), Some(525));
    }

    #[test]
    fn bpm_change_applies_on_next_rearm() {
        let mut status = SessionStatus::new(120);
        let mut sched = DeadlineScheduler::default();
        let mut clock = TempoClock::new();
        clock.start_internal(0, &mut sched);
        status.update_bpm(60);
        clock.on_step_timer(&status, 0, &mut sched);
        assert_eq!(sched.deadline(TimerId::Step), Some(250));
    }

    #[test]
    fn ticks_ignored_without_start() {
        let mut status = SessionStatus::new(120);
        let mut sched = DeadlineScheduler::default();
        let mut clock = TempoClock::new();
        assert!(!clock.on_midi_tick(&mut status, 0, &mut sched));
        assert_eq!(sched.deadline(TimerId::Watchdog), None);
        assert_eq!(status.clock_source, ClockSource::Internal);
    }

    #[test]
    fn six_ticks_per_step() {
        let mut status = SessionStatus::new(120);
        let mut sched = DeadlineScheduler::default();
        let mut clock = TempoClock::new();
        clock.start_internal(0, &mut sched);
        clock.on_midi_start(&mut status, 0, &mut sched);
        assert_eq!(status.clock_source, ClockSource::External);
        assert_eq!(status.current_step, 0);
        assert_eq!(sched.deadline(TimerId::Step), None);

        let advances: Vec<usize> = (0..MIDI_TICKS_PER_BEAT * 2)
            .filter(|&i| clock.on_midi_tick(&mut status, i as u64, &mut sched))
            .collect();
        assert_eq!(advances, vec![0, 6, 12, 18, 24, 30, 36, 42]);
    }

    #[test]
    fn every_tick_feeds_the_watchdog() {
        let mut status = SessionStatus::new(120);
        let mut sched = DeadlineScheduler::default();
        let mut clock = TempoClock::new();
        clock.on_midi_start(&mut status, 0, &mut sched);
        assert_eq!(sched.deadline(TimerId::Watchdog), Some(250));
        clock.on_midi_tick(&mut status, 10, &mut sched);
        clock.on_midi_tick(&mut status, 30, &mut sched);
        assert_eq!(sched.deadline(TimerId::Watchdog), Some(280));
    }

    #[test]
    fn stop_halts_steps_but_keeps_the_watchdog_fed() {
        let mut status = SessionStatus::new(120);
        let mut sched = DeadlineScheduler::default();
        let mut clock = TempoClock::new();
        clock.on_midi_start(&mut status, 0, &mut sched);
        clock.on_midi_stop(&status);
        assert!(!clock.on_midi_tick(&mut status, 100, &mut sched));
        assert_eq!(sched.deadline(TimerId::Watchdog), Some(350));
        clock.on_midi_continue(&status);
        assert!(clock.on_midi_tick(&mut status, 110, &mut sched));
    }

    #[test]
    fn watchdog_falls_back_to_internal() {
        let mut status = SessionStatus::new(120);
        let mut sched = DeadlineScheduler::default();
        let mut clock = TempoClock::new();
        clock.on_midi_start(&mut status, 0, &mut sched);
        assert!(clock.on_watchdog(&mut status));
        assert_eq!(status.clock_source, ClockSource::Internal);
        // already internal: nothing to do
        assert!(!clock.on_watchdog(&mut status));
        assert!(!clock.on_midi_tick(&mut status, 0, &mut sched));
    }

    #[test]
    fn external_tempo_is_followed() {
        let mut status = SessionStatus::new(120);
        let mut sched = DeadlineScheduler::default();
        let mut clock = TempoClock::new();
        clock.on_midi_start(&mut status, 0, &mut sched);
        // 100 bpm is 25 ms per tick
        for i in 0..(MIDI_TICKS_PER_BEAT * 3) as u64 {
            clock.on_midi_tick(&mut status, i * 25, &mut sched);
        }
        assert_eq!(status.bpm, 100);
        assert_eq!(status.step_period_ms, 150);
    }
}
