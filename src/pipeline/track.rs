// The track store. Plain data: patterns, the hold snapshot for the recording gesture,
// per-step ghost note state and the fill overlay. Nothing in here makes musical decisions.

use serde::Serialize;
use crate::shared::TOTAL_STEPS;

// Ghost note state for one step. Probability and sample live on the same 0..=255 scale
// so a step fires when `rand_sample < probability`; the sample is redrawn once per loop pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GhostNote {
    pub probability: u8,
    pub rand_sample: u8,
}

impl GhostNote {
    pub fn fires(&self) -> bool {
        self.rand_sample < self.probability
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Track {
    pub name: String,
    pub note: u8,
    pub channel: u8,
    #[serde(serialize_with = "steps_as_seq")]
    pub pattern: [bool; TOTAL_STEPS],
    #[serde(skip)]
    pub hold_pattern: [bool; TOTAL_STEPS],
    #[serde(skip)]
    pub ghost_notes: [GhostNote; TOTAL_STEPS],
    #[serde(serialize_with = "steps_as_seq")]
    pub fill_pattern: [bool; TOTAL_STEPS],
}

fn steps_as_seq<S: serde::Serializer>(steps: &[bool; TOTAL_STEPS], s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(steps.iter())
}

impl Track {
    pub fn new(name: impl Into<String>, note: u8, channel: u8) -> Self {
        Self {
            name: name.into(),
            note: note.min(127),
            channel: channel.min(15),
            pattern: [false; TOTAL_STEPS],
            hold_pattern: [false; TOTAL_STEPS],
            ghost_notes: [GhostNote::default(); TOTAL_STEPS],
            fill_pattern: [false; TOTAL_STEPS],
        }
    }

    pub fn hit_count(&self) -> usize {
        self.pattern.iter().filter(|&&hit| hit).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.pattern.iter().any(|&hit| hit)
    }

    pub fn step(&self, step: usize) -> bool {
        debug_assert!(step < TOTAL_STEPS, "step {step} out of range");
        self.pattern[step % TOTAL_STEPS]
    }

    pub fn set_step(&mut self, step: usize, hit: bool) {
        debug_assert!(step < TOTAL_STEPS, "step {step} out of range");
        self.pattern[step % TOTAL_STEPS] = hit;
    }

    // called on button down, before the gesture is known to be a recording
    pub fn snapshot(&mut self) {
        self.hold_pattern = self.pattern;
    }

    pub fn restore(&mut self) {
        self.pattern = self.hold_pattern;
    }

    // keep what was recorded; the snapshot becomes the current pattern
    pub fn commit(&mut self) {
        self.hold_pattern = self.pattern;
    }

    pub fn clear_fill(&mut self) {
        self.fill_pattern = [false; TOTAL_STEPS];
    }

    pub fn clear(&mut self) {
        self.pattern = [false; TOTAL_STEPS];
        self.hold_pattern = [false; TOTAL_STEPS];
        self.ghost_notes = [GhostNote::default(); TOTAL_STEPS];
        self.clear_fill();
    }
}

/// Fixed set of tracks, created once at startup.
#[derive(Clone, Debug)]
pub struct TrackStore {
    tracks: Box<[Track]>,
}

impl TrackStore {
    pub fn new(tracks: Vec<Track>) -> Self {
        // an empty store would make every track index invalid
        let tracks = if tracks.is_empty() { default_tracks() } else { tracks };
        Self { tracks: tracks.into_boxed_slice() }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, index: usize) -> &Track {
        debug_assert!(index < self.tracks.len(), "track {index} out of range");
        &self.tracks[index % self.tracks.len()]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut Track {
        debug_assert!(index < self.tracks.len(), "track {index} out of range");
        let len = self.tracks.len();
        &mut self.tracks[index % len]
    }

    pub fn next_index(&self, index: usize) -> usize {
        (index + 1) % self.tracks.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Track> {
        self.tracks.iter_mut()
    }

    pub fn as_slice(&self) -> &[Track] {
        &self.tracks
    }

    pub fn clear_all(&mut self) {
        for track in self.tracks.iter_mut() {
            track.clear();
        }
    }
}

impl Default for TrackStore {
    fn default() -> Self {
        Self::new(default_tracks())
    }
}

// General MIDI percussion, channel 10
pub fn default_tracks() -> Vec<Track> {
    vec![
        Track::new("Bass Drum", 36, 9),
        Track::new("Snare", 38, 9),
        Track::new("Closed Hi-Hat", 42, 9),
        Track::new("Open Hi-Hat", 46, 9),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discard_restores_pre_gesture_pattern() {
        let mut store = TrackStore::default();
        let track = store.get_mut(1);
        track.set_step(0, true);
        track.set_step(12, true);
        let before = track.pattern;

        track.snapshot();
        track.set_step(0, false);
        track.set_step(5, true);
        track.set_step(31, true);
        assert_ne!(track.pattern, before);

        track.restore();
        assert_eq!(track.pattern, before);
    }

    #[test]
    fn commit_keeps_new_pattern() {
        let mut track = Track::new("Snare", 38, 9);
        track.snapshot();
        track.set_step(3, true);
        track.commit();
        track.restore();
        assert!(track.step(3));
    }

    #[test]
    fn clear_all_zeroes_every_layer() {
        let mut store = TrackStore::default();
        for track in store.iter_mut() {
            track.set_step(4, true);
            track.fill_pattern[7] = true;
            track.ghost_notes[9].probability = 200;
        }
        store.clear_all();
        for track in store.iter() {
            assert!(track.is_empty());
            assert!(!track.fill_pattern.iter().any(|&f| f));
            assert!(track.ghost_notes.iter().all(|g| g.probability == 0));
        }
    }

    #[test]
    fn track_index_wraps() {
        let store = TrackStore::default();
        assert_eq!(store.len(), 4);
        assert_eq!(store.next_index(3), 0);
        assert_eq!(store.get(2).note, 42);
    }

    #[test]
    fn empty_store_gets_default_kit() {
        let store = TrackStore::new(Vec::new());
        assert!(!store.is_empty());
    }

    #[test]
    fn ghost_note_threshold() {
        assert!(!GhostNote { probability: 0, rand_sample: 0 }.fires());
        assert!(GhostNote { probability: 255, rand_sample: 254 }.fires());
        assert!(!GhostNote { probability: 100, rand_sample: 100 }.fires());
    }
}
