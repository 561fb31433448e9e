//! Ghost note generator.
//!
//! Decides, per step and per track, whether a note sounds on top of what was recorded:
//! - recorded hits always sound at full velocity
//! - a euclidean layer sprinkles quiet notes between them
//! - steps either side of a bar line get their own accent probability
//! - every few bars a fill runs from a randomly placed start to the end of its bar
//!
//! All randomness is drawn in [`GhostNoteGenerator::begin_pass`] once per trip around the
//! loop, so [`GhostNoteGenerator::decide`] is a pure function of the stored state and can be
//! asked about the same step any number of times with the same answer.

pub mod euclidean;

use std::f32::consts::TAU;
use std::ops::Range;

use crate::pipeline::params::{Fill, GhostParameters};
use crate::pipeline::track::Track;
use crate::shared::{BARS, FULL_VELOCITY, STEPS_PER_BAR, TOTAL_STEPS};

pub const GHOST_VELOCITY_MIN: u8 = 24;
pub const GHOST_VELOCITY_MAX: u8 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoteDecision {
    Rest,
    Recorded { velocity: u8 },
    Ghost { velocity: u8 },
}

impl NoteDecision {
    pub fn velocity(self) -> Option<u8> {
        match self {
            NoteDecision::Rest => None,
            NoteDecision::Recorded { velocity } | NoteDecision::Ghost { velocity } => Some(velocity),
        }
    }
}

pub struct GhostNoteGenerator {
    rng: fastrand::Rng,
}

impl Default for GhostNoteGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl GhostNoteGenerator {
    pub fn new() -> Self {
        Self { rng: fastrand::Rng::new() }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self { rng: fastrand::Rng::with_seed(seed) }
    }

    /// Number of euclidean pulses for this pass. `k_intensity` (swayed by the LFO) slides
    /// k from `k_sufficient` up towards `k_max`.
    pub fn pulses(params: &GhostParameters, lfo_phase: u16) -> usize {
        let e = &params.euclidean;
        let k_max = e.k_max.max(1) as f32;
        let k_min = (e.k_sufficient as f32).min(k_max);
        let intensity = (e.k_intensity * lfo_depth(lfo_phase)).clamp(0.0, 1.0);
        (k_min + (k_max - k_min) * intensity).round() as usize
    }

    /// Recompute per-step ghost probabilities and redraw every step's sample.
    pub fn begin_pass(&mut self, track: &mut Track, params: &GhostParameters, lfo_phase: u16) {
        let empty = track.is_empty();
        let k = Self::pulses(params, lfo_phase);
        let intensity = params.ghost_intensity.clamp(0.0, 1.0);

        for step in 0..TOTAL_STEPS {
            let probability = if empty || track.pattern[step] {
                0.0
            } else {
                // only the euclidean layer follows the ghost intensity knob
                let euclid = if euclidean::is_pulse(step, k, TOTAL_STEPS) {
                    params.euclidean.probability.clamp(0.0, 1.0) * intensity
                } else {
                    0.0
                };
                let before = if step % STEPS_PER_BAR == STEPS_PER_BAR - 1 {
                    params.boundary.before_probability
                } else {
                    0.0
                };
                let after = if step % STEPS_PER_BAR == 1 {
                    params.boundary.after_probability
                } else {
                    0.0
                };
                // independent layers: the step fires if any of them would
                let miss = (1.0 - euclid)
                    * (1.0 - before.clamp(0.0, 1.0))
                    * (1.0 - after.clamp(0.0, 1.0));
                1.0 - miss
            };

            let ghost = &mut track.ghost_notes[step];
            ghost.probability = (probability * 255.0).round() as u8;
            ghost.rand_sample = self.rng.u8(0..=254);
        }
    }

    /// Lay down a new fill overlay. Returns the span of steps the fill covers.
    pub fn synthesize_fill(&mut self, track: &mut Track, fill: &Fill) -> Option<Range<usize>> {
        track.clear_fill();
        if track.is_empty() || fill.interval_bar == 0 {
            return None;
        }

        let raw = fill.start_mean + fill.start_sd * self.standard_normal();
        let start = if raw.is_finite() {
            raw.round().clamp(0.0, (TOTAL_STEPS - 1) as f32) as usize
        } else {
            0
        };
        let end = (start / STEPS_PER_BAR + 1) * STEPS_PER_BAR;

        let probability = fill.probability.clamp(0.0, 1.0);
        for step in start..end {
            if !track.pattern[step] && self.rng.f32() < probability {
                track.fill_pattern[step] = true;
            }
        }
        Some(start..end)
    }

    /// What plays on `step` for `track`. Pure: no randomness is drawn here.
    pub fn decide(track: &Track, step: usize, params: &GhostParameters, lfo_phase: u16) -> NoteDecision {
        debug_assert!(step < TOTAL_STEPS, "step {step} out of range");
        let step = step % TOTAL_STEPS;

        if track.pattern[step] {
            return NoteDecision::Recorded { velocity: FULL_VELOCITY };
        }

        let ghost = track.ghost_notes[step];
        let layered = ghost
            .fires()
            .then(|| ghost_velocity(ghost.probability as f32 / 255.0, lfo_phase));
        let fill_velocity = track.fill_pattern[step]
            .then(|| ghost_velocity(params.fill.probability, lfo_phase));

        match layered.max(fill_velocity) {
            Some(velocity) => NoteDecision::Ghost { velocity },
            None => NoteDecision::Rest,
        }
    }

    // Box-Muller
    fn standard_normal(&mut self) -> f32 {
        let u1 = 1.0 - self.rng.f32(); // (0, 1]
        let u2 = self.rng.f32();
        (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos()
    }
}

/// Whether the pass now starting should carry a fill. `bars_started` is the bar counter
/// right after it ticked over for the first bar of the pass.
pub fn fill_due(bars_started: u8, interval_bar: u8) -> bool {
    if interval_bar == 0 {
        return false;
    }
    let last_bar = bars_started.wrapping_add(BARS as u8 - 1);
    last_bar % interval_bar == 0
}

/// Ghost velocity: rises with the contributing probability, never reaches a recorded hit.
pub fn ghost_velocity(probability: f32, lfo_phase: u16) -> u8 {
    let p = if probability.is_finite() { probability.clamp(0.0, 1.0) } else { 0.0 };
    let span = (GHOST_VELOCITY_MAX - GHOST_VELOCITY_MIN) as f32;
    let v = GHOST_VELOCITY_MIN as f32 + (span * p * lfo_depth(lfo_phase)).round();
    (v as u8).min(GHOST_VELOCITY_MAX)
}

// triangle LFO mapped onto 0.75..=1.0
fn lfo_depth(phase: u16) -> f32 {
    let tri = if phase < 0x8000 {
        phase as f32 / 32768.0
    } else {
        (u16::MAX - phase) as f32 / 32768.0
    };
    0.75 + 0.25 * tri
}
