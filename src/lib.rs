pub mod clock;
pub mod config;
pub mod ghost;
pub mod looper;
pub mod midi_api;
pub mod pipeline;
pub mod shared;
pub mod transport;

pub use clock::{DeadlineScheduler, Scheduler, TempoClock, TimerId};
pub use config::LooperConfig;
pub use looper::Looper;
pub use midi_api::{MidiMessage, NoteEmitter, NoteEvent};
