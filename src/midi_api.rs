// The looper's only outward surface: notes go out through a NoteEmitter, clock and
// control changes come in as MidiMessage. Whatever sits on the other side (a midir
// port, a channel to another thread, a Vec in a test) is the caller's business.

use crossbeam_channel::Sender;

pub const NOTE_ON: u8 = 0x90;
pub const NOTE_OFF: u8 = 0x80;
pub const CONTROL_CHANGE: u8 = 0xB0;
pub const TIMING_CLOCK: u8 = 0xF8;
pub const START: u8 = 0xFA;
pub const CONTINUE: u8 = 0xFB;
pub const STOP: u8 = 0xFC;

pub trait NoteEmitter {
    /// Fire-and-forget. Channel is 0-based.
    fn emit_note(&mut self, channel: u8, note: u8, velocity: u8);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NoteEvent {
    pub channel: u8,
    pub note: u8,
    pub velocity: u8,
}

impl NoteEvent {
    pub fn note_on(&self) -> [u8; 3] {
        [NOTE_ON | (self.channel & 0x0F), self.note & 0x7F, self.velocity & 0x7F]
    }

    // percussion notes are one-shots, the off is sent right behind the on
    pub fn note_off(&self) -> [u8; 3] {
        [NOTE_OFF | (self.channel & 0x0F), self.note & 0x7F, 0]
    }
}

// collects notes, for tests and for the front panel's activity display
impl NoteEmitter for Vec<NoteEvent> {
    fn emit_note(&mut self, channel: u8, note: u8, velocity: u8) {
        self.push(NoteEvent { channel, note, velocity });
    }
}

/// Hands notes to another thread. Drops the note if the receiver is full or gone.
pub struct ChannelEmitter {
    tx: Sender<NoteEvent>,
}

impl ChannelEmitter {
    pub fn new(tx: Sender<NoteEvent>) -> Self {
        Self { tx }
    }
}

impl NoteEmitter for ChannelEmitter {
    fn emit_note(&mut self, channel: u8, note: u8, velocity: u8) {
        let _ = self.tx.try_send(NoteEvent { channel, note, velocity });
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MidiMessage {
    Clock,
    Start,
    Continue,
    Stop,
    ControlChange { channel: u8, controller: u8, value: u8 },
}

impl MidiMessage {
    /// Parse one raw message. Anything the looper doesn't listen to is None.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let (&status, data) = bytes.split_first()?;
        match status {
            TIMING_CLOCK => Some(MidiMessage::Clock),
            START => Some(MidiMessage::Start),
            CONTINUE => Some(MidiMessage::Continue),
            STOP => Some(MidiMessage::Stop),
            s if s & 0xF0 == CONTROL_CHANGE => match data {
                [controller, value, ..] if controller & 0x80 == 0 && value & 0x80 == 0 => {
                    Some(MidiMessage::ControlChange {
                        channel: s & 0x0F,
                        controller: *controller,
                        value: *value,
                    })
                }
                _ => None,
            },
            _ => None,
        }
    }

    pub fn to_bytes(self) -> Vec<u8> {
        match self {
            MidiMessage::Clock => vec![TIMING_CLOCK],
            MidiMessage::Start => vec![START],
            MidiMessage::Continue => vec![CONTINUE],
            MidiMessage::Stop => vec![STOP],
            MidiMessage::ControlChange { channel, controller, value } => {
                vec![CONTROL_CHANGE | (channel & 0x0F), controller & 0x7F, value & 0x7F]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_realtime_messages() {
        assert_eq!(MidiMessage::from_bytes(&[0xF8]), Some(MidiMessage::Clock));
        assert_eq!(MidiMessage::from_bytes(&[0xFA]), Some(MidiMessage::Start));
        assert_eq!(MidiMessage::from_bytes(&[0xFB]), Some(MidiMessage::Continue));
        assert_eq!(MidiMessage::from_bytes(&[0xFC]), Some(MidiMessage::Stop));
    }

    #[test]
    fn parses_control_change_on_any_channel() {
        assert_eq!(
            MidiMessage::from_bytes(&[0xB3, 74, 100]),
            Some(MidiMessage::ControlChange { channel: 3, controller: 74, value: 100 })
        );
    }

    #[test]
    fn ignores_what_we_dont_use() {
        assert_eq!(MidiMessage::from_bytes(&[]), None);
        assert_eq!(MidiMessage::from_bytes(&[0x90, 36, 100]), None);
        assert_eq!(MidiMessage::from_bytes(&[0xFE]), None);
        // truncated or malformed control change
        assert_eq!(MidiMessage::from_bytes(&[0xB0, 70]), None);
        assert_eq!(MidiMessage::from_bytes(&[0xB0, 0x80, 1]), None);
    }

    #[test]
    fn note_bytes() {
        let n = NoteEvent { channel: 9, note: 38, velocity: 127 };
        assert_eq!(n.note_on(), [0x99, 38, 127]);
        assert_eq!(n.note_off(), [0x89, 38, 0]);
    }

    #[test]
    fn channel_emitter_forwards_notes() {
        let (tx, rx) = crossbeam_channel::bounded(4);
        let mut out = ChannelEmitter::new(tx);
        out.emit_note(9, 36, 100);
        assert_eq!(rx.try_recv().ok(), Some(NoteEvent { channel: 9, note: 36, velocity: 100 }));
    }

    #[test]
    fn channel_emitter_drops_when_full() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let mut out = ChannelEmitter::new(tx);
        out.emit_note(9, 36, 100);
        out.emit_note(9, 38, 100);
        assert_eq!(rx.try_iter().count(), 1);
    }
}
