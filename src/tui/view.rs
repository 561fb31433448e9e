use ghostloop::shared::{ClockSource, ControlPage, DisplayState, LooperState};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use super::grid;

// what the panel knows that the looper doesn't
pub struct PanelView {
    pub page: ControlPage,
    pub page_value: u8,
    pub emulator_on: bool,
    pub tracks: Vec<(String, bool)>, // name, sounded just now
}

const HELP: &str =
    "space tap  r/R hold  tab track  t tap tempo  X clear  [ ] knob  p page  e clock  esc quit";

pub fn render(frame: &mut Frame, area: Rect, state: &DisplayState, panel: &PanelView, blink_on: bool) {
    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // lcd screen
            Constraint::Length(3), // tracks row
            Constraint::Min(6),    // step grid
            Constraint::Length(1), // key help
        ])
        .split(area);

    draw_screen(frame, sections[0], state, panel);
    draw_tracks(frame, sections[1], state, panel);
    grid::draw_step_grid(frame, sections[2], &state.leds, blink_on);
    frame.render_widget(
        Paragraph::new(HELP).style(Style::default().fg(Color::DarkGray)),
        sections[3],
    );
}

fn draw_screen(frame: &mut Frame, area: Rect, state: &DisplayState, panel: &PanelView) {
    let mode_color = match state.state {
        LooperState::Recording => Color::Red,
        LooperState::Playing | LooperState::SyncPlaying => Color::Green,
        LooperState::SyncMute => Color::Yellow,
        _ => Color::Gray,
    };
    let clock = match state.clock_source {
        ClockSource::Internal => "INT",
        ClockSource::External => "MIDI",
    };
    let step = match state.playing_step {
        Some(s) => format!("{:02}", s + 1),
        None => "--".to_string(),
    };

    let top = Line::from(vec![
        Span::styled(
            format!(" {:<6}", state.state.label()),
            Style::default().fg(mode_color).add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!("{:>3} BPM  {clock}  bar {}  step {step}", state.bpm, state.bar)),
        Span::styled(
            if panel.emulator_on { "  [emu]" } else { "" },
            Style::default().fg(Color::Yellow),
        ),
    ]);
    let bottom = Line::from(vec![
        Span::raw(format!(" {}  ", state.track_name)),
        Span::styled(
            format!("{} {:>3}", panel.page.label(), panel.page_value),
            Style::default().fg(Color::Cyan),
        ),
        Span::raw(format!("  (cc{})", panel.page.controller())),
    ]);

    let screen = Paragraph::new(vec![top, bottom])
        .block(Block::default().borders(Borders::ALL).title(" ghostloop "));
    frame.render_widget(screen, area);
}

fn draw_tracks(frame: &mut Frame, area: Rect, state: &DisplayState, panel: &PanelView) {
    let spans: Vec<Span> = panel
        .tracks
        .iter()
        .enumerate()
        .map(|(i, (name, sounding))| {
            let mut style = Style::default().fg(Color::DarkGray);
            if i == state.track_index {
                style = style.fg(Color::White).add_modifier(Modifier::BOLD);
            }
            if *sounding {
                style = style.bg(Color::Magenta);
            }
            Span::styled(format!(" {name} "), style)
        })
        .collect();
    let row = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    frame.render_widget(row, area);
}
