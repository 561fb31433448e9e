// Getting MIDI in and out of the looper thread.
//
// Input arrives on other threads (the midir callback, the clock emulator) and is queued
// on a bounded channel; the main loop drains it before touching anything else. Output
// goes through a NoteEmitter, which for real hardware is a midir connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use log::{debug, info};

use crate::midi_api::MidiMessage;
use crate::shared::{MAX_BPM, MIDI_TICKS_PER_BEAT, MIN_BPM};

const INBOX_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct MidiSender {
    tx: Sender<MidiMessage>,
}

impl MidiSender {
    /// Queue a message. False when the inbox is full or the looper is gone.
    pub fn send(&self, msg: MidiMessage) -> bool {
        self.tx.try_send(msg).is_ok()
    }

    // raw bytes from a port; anything we don't understand is dropped here
    pub fn send_bytes(&self, bytes: &[u8]) -> bool {
        match MidiMessage::from_bytes(bytes) {
            Some(msg) => self.send(msg),
            None => false,
        }
    }
}

pub struct MidiInbox {
    rx: Receiver<MidiMessage>,
}

impl MidiInbox {
    /// Everything queued so far, oldest first. Never blocks.
    pub fn drain(&self) -> impl Iterator<Item = MidiMessage> + '_ {
        self.rx.try_iter()
    }
}

pub fn midi_channel() -> (MidiSender, MidiInbox) {
    let (tx, rx) = crossbeam_channel::bounded(INBOX_CAPACITY);
    (MidiSender { tx }, MidiInbox { rx })
}

/// Stand-in for a clock master: sends Start, then 24 ticks per beat until stopped,
/// then Stop.
pub struct ClockEmulator {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ClockEmulator {
    pub fn spawn(sender: MidiSender, bpm: u32) -> anyhow::Result<Self> {
        let bpm = bpm.clamp(MIN_BPM, MAX_BPM);
        let tick = Duration::from_secs_f64(60.0 / (bpm as f64 * MIDI_TICKS_PER_BEAT as f64));
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();

        let handle = thread::Builder::new()
            .name("midi-clock".into())
            .spawn(move || {
                sender.send(MidiMessage::Start);
                let mut next = Instant::now();
                while !flag.load(Ordering::Relaxed) {
                    sender.send(MidiMessage::Clock);
                    // schedule against the start so sleep overshoot doesn't drift the tempo
                    next += tick;
                    let now = Instant::now();
                    if next > now {
                        thread::sleep(next - now);
                    }
                }
                sender.send(MidiMessage::Stop);
            })?;

        info!("clock emulator running at {bpm} bpm");
        Ok(Self { stop, handle: Some(handle) })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            debug!("clock emulator stopped");
        }
    }
}

impl Drop for ClockEmulator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(feature = "midi")]
pub mod ports {
    use anyhow::{anyhow, Context};
    use log::{info, warn};
    use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};

    use super::MidiSender;
    use crate::midi_api::{NoteEmitter, NoteEvent};

    const CLIENT_NAME: &str = "ghostloop";

    // first port whose name contains `wanted`, or the first port at all
    fn pick<P: Clone>(ports: &[P], name_of: impl Fn(&P) -> Option<String>, wanted: Option<&str>) -> Option<(P, String)> {
        ports
            .iter()
            .filter_map(|p| name_of(p).map(|name| (p.clone(), name)))
            .find(|(_, name)| wanted.is_none_or(|w| name.contains(w)))
    }

    /// Listen on a hardware input, forwarding clock and control changes to the looper.
    pub fn connect_input(sender: MidiSender, wanted: Option<&str>) -> anyhow::Result<MidiInputConnection<()>> {
        let mut input = MidiInput::new(CLIENT_NAME).context("initialising midi input")?;
        // timing clock is filtered by default
        input.ignore(Ignore::None);
        let ports = input.ports();
        let (port, name) = pick(&ports, |p| input.port_name(p).ok(), wanted)
            .ok_or_else(|| anyhow!("no midi input port matching {:?}", wanted.unwrap_or("*")))?;

        let conn = input
            .connect(
                &port,
                "ghostloop-in",
                move |_stamp, bytes, _| {
                    sender.send_bytes(bytes);
                },
                (),
            )
            .map_err(|e| anyhow!("connecting midi input {name}: {e}"))?;
        info!("midi in: {name}");
        Ok(conn)
    }

    pub struct MidirEmitter {
        conn: MidiOutputConnection,
    }

    impl MidirEmitter {
        pub fn connect(wanted: Option<&str>) -> anyhow::Result<Self> {
            let output = MidiOutput::new(CLIENT_NAME).context("initialising midi output")?;
            let ports = output.ports();
            let (port, name) = pick(&ports, |p| output.port_name(p).ok(), wanted)
                .ok_or_else(|| anyhow!("no midi output port matching {:?}", wanted.unwrap_or("*")))?;
            let conn = output
                .connect(&port, "ghostloop-out")
                .map_err(|e| anyhow!("connecting midi output {name}: {e}"))?;
            info!("midi out: {name}");
            Ok(Self { conn })
        }
    }

    impl NoteEmitter for MidirEmitter {
        fn emit_note(&mut self, channel: u8, note: u8, velocity: u8) {
            let ev = NoteEvent { channel, note, velocity };
            if let Err(e) = self.conn.send(&ev.note_on()).and_then(|_| self.conn.send(&ev.note_off())) {
                warn!("midi out: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbox_drains_in_order() {
        let (tx, inbox) = midi_channel();
        assert!(tx.send(MidiMessage::Start));
        assert!(tx.send_bytes(&[0xF8]));
        assert!(tx.send_bytes(&[0xB0, 70, 12]));
        // note on isn't for us
        assert!(!tx.send_bytes(&[0x90, 36, 100]));
        let got: Vec<_> = inbox.drain().collect();
        assert_eq!(
            got,
            vec![
                MidiMessage::Start,
                MidiMessage::Clock,
                MidiMessage::ControlChange { channel: 0, controller: 70, value: 12 },
            ]
        );
        assert_eq!(inbox.drain().count(), 0);
    }

    #[test]
    fn inbox_refuses_when_full() {
        let (tx, inbox) = midi_channel();
        for _ in 0..INBOX_CAPACITY {
            assert!(tx.send(MidiMessage::Clock));
        }
        assert!(!tx.send(MidiMessage::Clock));
        assert_eq!(inbox.drain().count(), INBOX_CAPACITY);
    }

    #[test]
    fn emulator_sends_start_ticks_then_stop() {
        let (tx, inbox) = midi_channel();
        let emu = ClockEmulator::spawn(tx, MAX_BPM).unwrap();
        assert!(emu.is_running());

        // block until the first tick lands instead of guessing how long that takes
        let start = inbox.rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let tick = inbox.rx.recv_timeout(Duration::from_secs(5)).unwrap();
        emu.stop();

        assert_eq!(start, MidiMessage::Start);
        assert_eq!(tick, MidiMessage::Clock);
        let rest: Vec<_> = inbox.drain().collect();
        assert_eq!(rest.last(), Some(&MidiMessage::Stop));
        assert!(rest[..rest.len() - 1].iter().all(|m| *m == MidiMessage::Clock));
    }
}
