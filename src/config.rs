// Startup configuration, read once from an optional JSON file. Every field has a
// default so a partial file (or none at all) gives a playable kit.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::pipeline::params::GhostParameters;
use crate::pipeline::track::{default_tracks, Track};
use crate::shared::{DEFAULT_BPM, MAX_BPM, MIN_BPM};

pub const DEFAULT_TAP_TIMEOUT_MS: u64 = 2_000;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    pub name: String,
    pub note: u8,
    pub channel: u8, // 0-based
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self { name: "Track".to_string(), note: 36, channel: 9 }
    }
}

// metronome heard while recording
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickConfig {
    pub enabled: bool,
    pub note: u8,
    pub channel: u8,
    pub velocity: u8,
    pub accent_velocity: u8, // first beat of each bar
}

impl Default for ClickConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            note: 76, // hi wood block
            channel: 9,
            velocity: 64,
            accent_velocity: 100,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LooperConfig {
    pub bpm: u32,
    pub seed: Option<u64>, // fixed seed for a repeatable groove
    pub tracks: Vec<TrackConfig>,
    pub ghost: GhostParameters,
    pub click: ClickConfig,
    pub tap_timeout_ms: u64,
    // port name fragments for the `midi` feature; None takes the first port
    pub midi_input: Option<String>,
    pub midi_output: Option<String>,
}

impl Default for LooperConfig {
    fn default() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            seed: None,
            tracks: default_tracks()
                .into_iter()
                .map(|t| TrackConfig { name: t.name, note: t.note, channel: t.channel })
                .collect(),
            ghost: GhostParameters::default(),
            click: ClickConfig::default(),
            tap_timeout_ms: DEFAULT_TAP_TIMEOUT_MS,
            midi_input: None,
            midi_output: None,
        }
    }
}

impl LooperConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json(&data).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_json(data: &str) -> anyhow::Result<Self> {
        let mut config: LooperConfig = serde_json::from_str(data)?;
        config.normalize();
        Ok(config)
    }

    // values out of range are pulled back in, not rejected
    pub fn normalize(&mut self) {
        self.bpm = self.bpm.clamp(MIN_BPM, MAX_BPM);
        self.ghost.normalize();
        for t in &mut self.tracks {
            t.note = t.note.min(127);
            t.channel = t.channel.min(15);
        }
        self.click.note = self.click.note.min(127);
        self.click.channel = self.click.channel.min(15);
        self.click.velocity = self.click.velocity.min(127);
        self.click.accent_velocity = self.click.accent_velocity.min(127);
        if self.tap_timeout_ms == 0 {
            self.tap_timeout_ms = DEFAULT_TAP_TIMEOUT_MS;
        }
    }

    pub fn build_tracks(&self) -> Vec<Track> {
        self.tracks
            .iter()
            .map(|t| Track::new(t.name.clone(), t.note, t.channel))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_is_the_default_kit() {
        let c = LooperConfig::from_json("{}").unwrap();
        assert_eq!(c, LooperConfig::default());
        let names: Vec<_> = c.build_tracks().into_iter().map(|t| t.name).collect();
        assert_eq!(names, ["Bass Drum", "Snare", "Closed Hi-Hat", "Open Hi-Hat"]);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let c = LooperConfig::from_json(
            r#"{
                "bpm": 96,
                "seed": 7,
                "tracks": [{ "name": "Rim", "note": 37 }],
                "ghost": { "ghost_intensity": 0.5, "fill": { "interval_bar": 8 } }
            }"#,
        )
        .unwrap();
        assert_eq!(c.bpm, 96);
        assert_eq!(c.seed, Some(7));
        assert_eq!(c.tracks, vec![TrackConfig { name: "Rim".into(), note: 37, channel: 9 }]);
        assert_eq!(c.ghost.ghost_intensity, 0.5);
        assert_eq!(c.ghost.fill.interval_bar, 8);
        assert_eq!(c.ghost.fill.start_mean, 15.0);
        assert_eq!(c.ghost.euclidean.k_max, 16);
        assert_eq!(c.click, ClickConfig::default());
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let c = LooperConfig::from_json(
            r#"{ "bpm": 1000, "tap_timeout_ms": 0,
                 "tracks": [{ "note": 200, "channel": 40 }],
                 "ghost": { "euclidean": { "k_max": 3, "k_sufficient": 9 } } }"#,
        )
        .unwrap();
        assert_eq!(c.bpm, MAX_BPM);
        assert_eq!(c.tap_timeout_ms, DEFAULT_TAP_TIMEOUT_MS);
        assert_eq!(c.tracks[0].note, 127);
        assert_eq!(c.tracks[0].channel, 15);
        assert_eq!(c.ghost.euclidean.k_sufficient, 3);
    }

    #[test]
    fn bad_json_is_an_error() {
        assert!(LooperConfig::from_json("{ bpm: ").is_err());
        assert!(LooperConfig::from_json(r#"{ "bpm": "fast" }"#).is_err());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = LooperConfig::load(Path::new("/nonexistent/ghostloop.json")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/ghostloop.json"));
    }
}
