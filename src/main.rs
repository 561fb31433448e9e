mod tui;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use crossterm::terminal;
use log::info;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use ghostloop::clock::DeadlineScheduler;
use ghostloop::config::LooperConfig;
use ghostloop::midi_api::{NoteEmitter, NoteEvent};
use ghostloop::pipeline::params::FILL_INTERVALS;
use ghostloop::shared::ControlPage;
use ghostloop::transport::{self, ClockEmulator};
use ghostloop::Looper;
use tui::mode::PanelEvent;
use tui::view::PanelView;

const FRAME: Duration = Duration::from_millis(16); // ~60fps
const FLASH: Duration = Duration::from_millis(120);

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    init_logging()?;
    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => LooperConfig::load(&path)?,
        None => LooperConfig::default(),
    };

    let (midi_tx, inbox) = transport::midi_channel();
    #[cfg(feature = "midi")]
    let _midi_in = transport::ports::connect_input(midi_tx.clone(), config.midi_input.as_deref())
        .map_err(|e| log::warn!("{e:#}"))
        .ok();
    let mut out = PanelOutput::new(&config);
    let mut looper = Looper::new(&config);
    let mut sched = DeadlineScheduler::default();
    let mut emulator: Option<ClockEmulator> = None;

    terminal::enable_raw_mode()?;
    // Enable keyboard enhancement for real press/release detection.
    // Falls back to the shifted release key if the terminal doesn't support it.
    let _ = crossterm::execute!(
        std::io::stdout(),
        crossterm::event::PushKeyboardEnhancementFlags(
            crossterm::event::KeyboardEnhancementFlags::REPORT_EVENT_TYPES
        )
    );
    let guard = RawModeGuard; // auto drops when out of scope
    let backend = CrosstermBackend::new(std::io::stdout());
    let mut term = Terminal::new(backend)?;
    term.clear()?;

    let started = Instant::now();
    let mut tui_state = tui::mode::TuiState::default();
    info!("ghostloop up, {} tracks at {} bpm", looper.tracks().len(), looper.status().bpm);

    loop {
        let now_ms = started.elapsed().as_millis() as u64;
        for msg in inbox.drain() {
            looper.handle_midi(msg, now_ms, &mut sched, &mut out);
        }

        let blink_on = (started.elapsed().as_millis() / 250) % 2 == 0;
        let ds = looper.display_state();
        let panel = PanelView {
            page: tui_state.page,
            page_value: looper.params().control_value(tui_state.page.controller()),
            emulator_on: emulator.is_some(),
            tracks: looper
                .tracks()
                .iter()
                .map(|t| (t.name.clone(), out.sounded(t.channel, t.note)))
                .collect(),
        };
        term.draw(|frame| {
            tui::view::render(frame, frame.area(), &ds, &panel, blink_on);
        })?;

        // don't sleep through the next step
        let timeout = sched
            .next_deadline()
            .map(|d| Duration::from_millis(d.saturating_sub(now_ms)))
            .map_or(FRAME, |d| d.min(FRAME));
        let events = tui::input::poll_input(timeout, &mut tui_state)?;
        let now_ms = started.elapsed().as_millis() as u64;
        for event in events {
            match event {
                PanelEvent::Quit => {
                    drop(emulator);
                    drop(term);
                    drop(guard);
                    // leave the session on stdout for whoever wants it
                    println!("{}", serde_json::to_string_pretty(&looper.snapshot())?);
                    return Ok(());
                }
                PanelEvent::Button(button) => looper.handle_button(button, now_ms, &mut sched, &mut out),
                PanelEvent::Knob(dir) => turn_knob(&mut looper, tui_state.page, dir),
                PanelEvent::NextPage => tui_state.page = tui_state.page.next(),
                PanelEvent::ToggleClock => match emulator.take() {
                    Some(emu) => emu.stop(),
                    None => {
                        let bpm = looper.status().bpm;
                        emulator = Some(ClockEmulator::spawn(midi_tx.clone(), bpm)?);
                    }
                },
            }
        }

        while let Some(timer) = sched.pop_due(now_ms) {
            looper.on_timer(timer, now_ms, &mut sched, &mut out);
        }
        looper.process_state(now_ms, &mut sched, &mut out);
    }
}

// the front panel knob talks to the looper the same way an external controller does
fn turn_knob(looper: &mut Looper, page: ControlPage, dir: i8) {
    let cc = page.controller();
    let current = looper.params().control_value(cc);
    let value = match page {
        ControlPage::EuclidKMax | ControlPage::EuclidKSufficient => current as i16 + dir as i16,
        ControlPage::FillInterval => {
            // step through the supported bar counts instead of raw values
            let bars = looper.params().fill.interval_bar;
            let idx = FILL_INTERVALS.iter().position(|&b| b == bars).unwrap_or(0) as i16;
            let next = FILL_INTERVALS[(idx + dir as i16).clamp(0, FILL_INTERVALS.len() as i16 - 1) as usize];
            (next as i16 * 127 + 15) / 16
        }
        _ => current as i16 + 8 * dir as i16,
    };
    looper.on_control_change(0, cc, value.clamp(0, 127) as u8);
}

// the terminal belongs to the panel, so logging only happens when asked for, into a file
fn init_logging() -> anyhow::Result<()> {
    let Some(path) = std::env::var_os("GHOSTLOOP_LOG") else {
        return Ok(());
    };
    let file = std::fs::File::create(&path)
        .with_context(|| format!("creating log file {}", PathBuf::from(&path).display()))?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .format_timestamp_millis()
        .init();
    Ok(())
}

// notes go to the midi port when there is one, and light up the track row
struct PanelOutput {
    recent: Vec<(Instant, NoteEvent)>,
    #[cfg(feature = "midi")]
    port: Option<transport::ports::MidirEmitter>,
}

impl PanelOutput {
    #[cfg_attr(not(feature = "midi"), allow(unused_variables))]
    fn new(config: &LooperConfig) -> Self {
        Self {
            recent: Vec::new(),
            #[cfg(feature = "midi")]
            port: transport::ports::MidirEmitter::connect(config.midi_output.as_deref())
                .map_err(|e| log::warn!("{e:#}"))
                .ok(),
        }
    }

    fn sounded(&self, channel: u8, note: u8) -> bool {
        self.recent
            .iter()
            .any(|(at, n)| n.channel == channel && n.note == note && at.elapsed() < FLASH)
    }
}

impl NoteEmitter for PanelOutput {
    fn emit_note(&mut self, channel: u8, note: u8, velocity: u8) {
        let now = Instant::now();
        self.recent.retain(|(at, _)| now.duration_since(*at) < FLASH);
        self.recent.push((now, NoteEvent { channel, note, velocity }));
        #[cfg(feature = "midi")]
        if let Some(port) = self.port.as_mut() {
            port.emit_note(channel, note, velocity);
        }
    }
}

struct RawModeGuard;
impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = crossterm::execute!(
            std::io::stdout(),
            crossterm::event::PopKeyboardEnhancementFlags
        );
        let _ = terminal::disable_raw_mode();
    }
}
