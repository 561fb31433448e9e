// Ghost note tunables. One block for the whole looper, owned by the Looper and lent
// to the generator on every step. Knob/CC changes land here and are clamped, never rejected.

use serde::{Deserialize, Serialize};

pub const K_MAX_LIMIT: u8 = 16;
pub const FILL_MEAN_MAX: f32 = 32.0;
pub const FILL_SD_MAX: f32 = 16.0;
pub const FILL_INTERVALS: [u8; 5] = [0, 2, 4, 8, 16];

pub const CC_GHOST_INTENSITY: u8 = 70;
pub const CC_EUCLID_K_MAX: u8 = 71;
pub const CC_EUCLID_K_SUFFICIENT: u8 = 72;
pub const CC_EUCLID_K_INTENSITY: u8 = 73;
pub const CC_EUCLID_PROBABILITY: u8 = 74;
pub const CC_BOUNDARY_BEFORE: u8 = 75;
pub const CC_BOUNDARY_AFTER: u8 = 76;
pub const CC_FILL_START_MEAN: u8 = 77;
pub const CC_FILL_START_SD: u8 = 78;
pub const CC_FILL_PROBABILITY: u8 = 79;
pub const CC_FILL_INTERVAL: u8 = 80;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Euclidean {
    pub k_max: u8,        // 1..=16
    pub k_sufficient: u8, // 0..=k_max
    pub k_intensity: f32,
    pub probability: f32,
}

impl Default for Euclidean {
    fn default() -> Self {
        Self {
            k_max: 16,
            k_sufficient: 6,
            k_intensity: 0.9,
            probability: 0.7,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Boundary {
    pub before_probability: f32,
    pub after_probability: f32,
}

impl Default for Boundary {
    fn default() -> Self {
        Self {
            before_probability: 0.1,
            after_probability: 0.3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fill {
    pub interval_bar: u8, // 0 disables fills
    pub start_mean: f32,  // in steps
    pub start_sd: f32,    // in steps
    pub probability: f32,
}

impl Default for Fill {
    fn default() -> Self {
        Self {
            interval_bar: 4,
            start_mean: 15.0,
            start_sd: 5.0,
            probability: 0.6,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GhostParameters {
    pub ghost_intensity: f32,
    pub euclidean: Euclidean,
    pub boundary: Boundary,
    pub fill: Fill,
}

impl Default for GhostParameters {
    fn default() -> Self {
        Self {
            ghost_intensity: 0.843,
            euclidean: Euclidean::default(),
            boundary: Boundary::default(),
            fill: Fill::default(),
        }
    }
}

impl GhostParameters {
    /// Everything off: only recorded hits will ever sound.
    pub fn silent() -> Self {
        Self {
            ghost_intensity: 0.0,
            euclidean: Euclidean { k_max: 1, k_sufficient: 0, k_intensity: 0.0, probability: 0.0 },
            boundary: Boundary { before_probability: 0.0, after_probability: 0.0 },
            fill: Fill { interval_bar: 0, start_mean: 0.0, start_sd: 0.0, probability: 0.0 },
        }
    }

    pub fn set_k_max(&mut self, k_max: u8) {
        self.euclidean.k_max = k_max.clamp(1, K_MAX_LIMIT);
        // k_sufficient may never outgrow k_max
        self.euclidean.k_sufficient = self.euclidean.k_sufficient.min(self.euclidean.k_max);
    }

    pub fn set_k_sufficient(&mut self, k: u8) {
        self.euclidean.k_sufficient = k.min(self.euclidean.k_max);
    }

    pub fn set_fill_interval(&mut self, bars: u8) {
        // snap down onto the supported bar counts
        self.fill.interval_bar = FILL_INTERVALS
            .iter()
            .copied()
            .filter(|&i| i <= bars)
            .max()
            .unwrap_or(0);
    }

    /// Re-establish every range invariant, e.g. after loading a config file.
    pub fn normalize(&mut self) {
        self.ghost_intensity = unit(self.ghost_intensity);
        self.set_k_max(self.euclidean.k_max);
        self.euclidean.k_intensity = unit(self.euclidean.k_intensity);
        self.euclidean.probability = unit(self.euclidean.probability);
        self.boundary.before_probability = unit(self.boundary.before_probability);
        self.boundary.after_probability = unit(self.boundary.after_probability);
        self.fill.start_mean = clamp_finite(self.fill.start_mean, FILL_MEAN_MAX);
        self.fill.start_sd = clamp_finite(self.fill.start_sd, FILL_SD_MAX);
        self.fill.probability = unit(self.fill.probability);
        self.set_fill_interval(self.fill.interval_bar);
    }

    /// Map a Control Change onto a tunable. Returns false for controllers we don't listen to.
    pub fn apply_control_change(&mut self, controller: u8, value: u8) -> bool {
        let value = value.min(127);
        let scaled = value as f32 / 127.0;
        match controller {
            CC_GHOST_INTENSITY => self.ghost_intensity = scaled,
            CC_EUCLID_K_MAX => self.set_k_max(value),
            CC_EUCLID_K_SUFFICIENT => self.set_k_sufficient(value),
            CC_EUCLID_K_INTENSITY => self.euclidean.k_intensity = scaled,
            CC_EUCLID_PROBABILITY => self.euclidean.probability = scaled,
            CC_BOUNDARY_BEFORE => self.boundary.before_probability = scaled,
            CC_BOUNDARY_AFTER => self.boundary.after_probability = scaled,
            CC_FILL_START_MEAN => self.fill.start_mean = scaled * FILL_MEAN_MAX,
            CC_FILL_START_SD => self.fill.start_sd = scaled * FILL_SD_MAX,
            CC_FILL_PROBABILITY => self.fill.probability = scaled,
            CC_FILL_INTERVAL => self.set_fill_interval((scaled * 16.0) as u8),
            _ => return false,
        }
        true
    }

    /// The 7-bit value a controller would have to send to produce the current setting.
    /// Used by the front panel knob so turning it starts from where the parameter is.
    pub fn control_value(&self, controller: u8) -> u8 {
        let to_cc = |x: f32| (x.clamp(0.0, 1.0) * 127.0).round() as u8;
        match controller {
            CC_GHOST_INTENSITY => to_cc(self.ghost_intensity),
            CC_EUCLID_K_MAX => self.euclidean.k_max,
            CC_EUCLID_K_SUFFICIENT => self.euclidean.k_sufficient,
            CC_EUCLID_K_INTENSITY => to_cc(self.euclidean.k_intensity),
            CC_EUCLID_PROBABILITY => to_cc(self.euclidean.probability),
            CC_BOUNDARY_BEFORE => to_cc(self.boundary.before_probability),
            CC_BOUNDARY_AFTER => to_cc(self.boundary.after_probability),
            CC_FILL_START_MEAN => to_cc(self.fill.start_mean / FILL_MEAN_MAX),
            CC_FILL_START_SD => to_cc(self.fill.start_sd / FILL_SD_MAX),
            CC_FILL_PROBABILITY => to_cc(self.fill.probability),
            CC_FILL_INTERVAL => to_cc(self.fill.interval_bar as f32 / 16.0),
            _ => 0,
        }
    }
}

fn unit(x: f32) -> f32 {
    clamp_finite(x, 1.0)
}

fn clamp_finite(x: f32, max: f32) -> f32 {
    if x.is_finite() { x.clamp(0.0, max) } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn k_max_reclamps_k_sufficient() {
        let mut p = GhostParameters::default();
        p.set_k_max(16);
        p.set_k_sufficient(10);
        assert_eq!(p.euclidean.k_sufficient, 10);
        p.set_k_max(5);
        assert!(p.euclidean.k_sufficient <= 5);
    }

    #[test]
    fn cc_k_sufficient_cannot_exceed_k_max() {
        let mut p = GhostParameters::default();
        assert!(p.apply_control_change(CC_EUCLID_K_MAX, 4));
        assert!(p.apply_control_change(CC_EUCLID_K_SUFFICIENT, 127));
        assert_eq!(p.euclidean.k_sufficient, 4);
        // k_max floors at one
        p.apply_control_change(CC_EUCLID_K_MAX, 0);
        assert_eq!(p.euclidean.k_max, 1);
        assert_eq!(p.euclidean.k_sufficient, 1);
    }

    #[test]
    fn cc_scaling() {
        let mut p = GhostParameters::default();
        p.apply_control_change(CC_GHOST_INTENSITY, 127);
        assert_eq!(p.ghost_intensity, 1.0);
        p.apply_control_change(CC_BOUNDARY_AFTER, 0);
        assert_eq!(p.boundary.after_probability, 0.0);
        p.apply_control_change(CC_FILL_START_MEAN, 127);
        assert_eq!(p.fill.start_mean, 32.0);
        p.apply_control_change(CC_FILL_START_SD, 127);
        assert_eq!(p.fill.start_sd, 16.0);
        // values above 7 bits are treated as 127
        p.apply_control_change(CC_EUCLID_PROBABILITY, 200);
        assert_eq!(p.euclidean.probability, 1.0);
        assert!(!p.apply_control_change(7, 100));
    }

    #[test]
    fn fill_interval_snaps_to_supported_bars() {
        let mut p = GhostParameters::default();
        let cases = [(0, 0), (8, 0), (16, 2), (30, 2), (32, 4), (63, 4), (64, 8), (126, 8), (127, 16)];
        for (cc, bars) in cases {
            p.apply_control_change(CC_FILL_INTERVAL, cc);
            assert_eq!(p.fill.interval_bar, bars, "cc value {cc}");
        }
    }

    #[test]
    fn normalize_repairs_out_of_range_values() {
        let mut p = GhostParameters::default();
        p.ghost_intensity = 3.0;
        p.euclidean.k_max = 40;
        p.euclidean.k_sufficient = 30;
        p.fill.start_sd = f32::NAN;
        p.fill.interval_bar = 5;
        p.normalize();
        assert_eq!(p.ghost_intensity, 1.0);
        assert_eq!(p.euclidean.k_max, 16);
        assert_eq!(p.euclidean.k_sufficient, 16);
        assert_eq!(p.fill.start_sd, 0.0);
        assert_eq!(p.fill.interval_bar, 4);
    }

    #[test]
    fn control_value_tracks_setting() {
        let mut p = GhostParameters::default();
        p.apply_control_change(CC_FILL_PROBABILITY, 64);
        assert_eq!(p.control_value(CC_FILL_PROBABILITY), 64);
        p.apply_control_change(CC_EUCLID_K_MAX, 9);
        assert_eq!(p.control_value(CC_EUCLID_K_MAX), 9);
    }
}
