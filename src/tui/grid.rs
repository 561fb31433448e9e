use ghostloop::shared::{LedState, BARS, STEPS_PER_BAR, STEPS_PER_BEAT, TOTAL_STEPS};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::widgets::{Block, Borders};
use ratatui::Frame;

// one row per bar, one cell per step
pub fn draw_step_grid(frame: &mut Frame, area: Rect, leds: &[LedState; TOTAL_STEPS], blink_on: bool) {
    let row_constraints = [Constraint::Ratio(1, BARS as u32); BARS];
    let col_constraints = [Constraint::Ratio(1, STEPS_PER_BAR as u32); STEPS_PER_BAR];

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(row_constraints)
        .split(area);

    for (row_idx, row_area) in rows.iter().enumerate() {
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(col_constraints)
            .split(*row_area);

        for (col_idx, cell_area) in cols.iter().enumerate() {
            let step = row_idx * STEPS_PER_BAR + col_idx;
            let beat_line = col_idx % STEPS_PER_BEAT == 0;
            let style = led_style(leds[step], blink_on, beat_line);
            let block = Block::default()
                .borders(Borders::ALL)
                .border_style(style)
                .style(style);
            frame.render_widget(block, *cell_area);
        }
    }
}

fn led_style(led: LedState, blink_on: bool, beat_line: bool) -> Style {
    let idle = if beat_line { Color::Gray } else { Color::DarkGray };
    match led {
        LedState::Off => Style::default().fg(idle),
        LedState::OnMedium => Style::default().fg(Color::Magenta),
        LedState::OnHigh => Style::default().fg(Color::LightMagenta).bg(Color::Magenta),
        LedState::Blink if blink_on => Style::default().fg(Color::White).bg(Color::LightCyan),
        LedState::Blink => Style::default().fg(Color::LightCyan),
    }
}
