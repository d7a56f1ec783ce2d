//! Terminal UI rendering with ratatui

use quadblox::board::{BOARD_WIDTH, BUFFER_HEIGHT, GARBAGE_COLOR, Grid, TOTAL_HEIGHT};
use quadblox::controller::Controller;
use quadblox::mode::{GameMode, format_frames};
use quadblox::settings::Settings;
use quadblox::sync::Opponent;
use quadblox::tetromino::{Rotation, TetrominoType};
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Style, Stylize},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
};

const EMPTY: &str = "  ";

/// Total width needed: hold(12) + board(22) + next/stats(16) = 50
const GAME_WIDTH: u16 = 50;
/// Total height needed: board(20) + 2 buffer rows + 2 for borders = 24
const GAME_HEIGHT: u16 = 24;
/// Number of buffer rows to show above the visible board (spawn area)
const VISIBLE_BUFFER: usize = 2;
/// Opponent boards: 4 columns of 2 mini boards, 12 wide each
const OPPONENTS_WIDTH: u16 = 48;
const MINI_BOARD_HEIGHT: u16 = 12;

/// Everything the game screen shows
pub struct View<'a> {
    pub controller: &'a Controller,
    pub settings: &'a Settings,
    pub paused: bool,
    /// Name of the last line clear, e.g. "DOUBLE"
    pub last_clear: Option<&'a str>,
    pub versus: Option<VersusView<'a>>,
}

pub struct VersusView<'a> {
    pub game_id: u32,
    pub seat: usize,
    pub opponents: &'a [Opponent],
}

/// Palette index to terminal color
fn cell_color(color: u8) -> Color {
    match color {
        1 => Color::Cyan,
        2 => Color::Blue,
        3 => Color::Rgb(255, 165, 0), // Orange
        4 => Color::Yellow,
        5 => Color::Green,
        6 => Color::Magenta,
        7 => Color::Red,
        GARBAGE_COLOR => Color::DarkGray,
        _ => Color::Reset,
    }
}

fn piece_color(piece_type: TetrominoType) -> Color {
    cell_color(piece_type.color_index())
}

/// Render the entire game UI
pub fn render_game(frame: &mut Frame, view: &View) {
    let area = frame.area();
    let (block_char, _) = view.settings.visual.block_chars();
    let controller = view.controller;

    let width = match view.versus {
        Some(_) => GAME_WIDTH + OPPONENTS_WIDTH,
        None => GAME_WIDTH,
    };
    let screen = center_rect(area, width, GAME_HEIGHT);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(GAME_WIDTH),
            Constraint::Length(OPPONENTS_WIDTH),
        ])
        .split(screen);

    // Create main layout: hold | board | next + stats
    let main_layout = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(12), // Hold box
            Constraint::Length(22), // Board (10*2 + 2 for borders)
            Constraint::Length(16), // Next queue + stats
        ])
        .split(columns[0]);

    render_hold(frame, main_layout[0], controller.held(), block_char);
    render_board(frame, main_layout[1], view);

    let right_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(12), // Next queue
            Constraint::Min(8),     // Stats
        ])
        .split(main_layout[2]);

    render_next_queue(frame, right_layout[0], &controller.preview(), block_char);
    render_stats(frame, right_layout[1], view);

    if let Some(versus) = &view.versus {
        render_opponents(frame, columns[1], versus.opponents, block_char);
    }

    // Overlays
    if let Some(record) = controller.run_record() {
        render_overlay(
            frame,
            area,
            "COMPLETE!",
            &format!("Time: {}", format_frames(record.frames)),
        );
    } else if controller.is_game_over() {
        render_overlay(frame, area, "GAME OVER", "Press Q to quit");
    } else if view.paused {
        render_overlay(frame, area, "PAUSED", "Press P to resume");
    }
}

/// Center a rect within another rect
fn center_rect(area: Rect, width: u16, height: u16) -> Rect {
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    Rect {
        x,
        y,
        width: width.min(area.width),
        height: height.min(area.height),
    }
}

/// Render the hold piece box
fn render_hold(frame: &mut Frame, area: Rect, hold: Option<TetrominoType>, block_char: &str) {
    let block = Block::default()
        .title(" HOLD ")
        .title_alignment(Alignment::Center)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Gray));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    if let Some(piece_type) = hold {
        render_mini_piece(frame, inner, piece_type, block_char);
    }
}

/// Render the next piece queue
fn render_next_queue(frame: &mut Frame, area: Rect, queue: &[TetrominoType], block_char: &str) {
    let block = Block::default()
        .title(" NEXT ")
        .title_alignment(Alignment::Center)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Gray));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    if queue.is_empty() {
        return;
    }

    let piece_areas = Layout::default()
        .direction(Direction::Vertical)
        .constraints(vec![Constraint::Length(2); queue.len()])
        .split(inner);

    for (piece_area, &piece_type) in piece_areas.iter().zip(queue) {
        render_mini_piece(frame, *piece_area, piece_type, block_char);
    }
}

/// Render a small piece preview (for hold and next queue)
fn render_mini_piece(frame: &mut Frame, area: Rect, piece_type: TetrominoType, block_char: &str) {
    if area.height < 1 || area.width < 4 {
        return;
    }

    let color = piece_color(piece_type);
    let cells = piece_type.cells(Rotation::North);
    let top = cells.iter().map(|&(r, _)| r).min().unwrap_or(0);

    // Every spawn orientation fits in two rows
    let mut lines: Vec<Line> = Vec::new();
    for row in top..top + 2 {
        let spans: Vec<Span> = (0..4)
            .map(|col| {
                if cells.contains(&(row, col)) {
                    Span::styled(block_char, Style::default().fg(color))
                } else {
                    Span::raw(EMPTY)
                }
            })
            .collect();
        lines.push(Line::from(spans));
    }

    let paragraph = Paragraph::new(lines).alignment(Alignment::Center);
    frame.render_widget(paragraph, area);
}

/// Render the game board
fn render_board(frame: &mut Frame, area: Rect, view: &View) {
    let (block_char, ghost_char) = view.settings.visual.block_chars();
    let controller = view.controller;
    let board = &controller.board;

    let title = format!(" {} ", controller.mode().name());
    let block = Block::default()
        .title(title)
        .title_alignment(Alignment::Center)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::White));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let active = controller.active();
    let ghost = if view.settings.visual.show_ghost {
        controller.ghost()
    } else {
        None
    };

    let mut lines: Vec<Line> = Vec::new();
    for row in BUFFER_HEIGHT - VISIBLE_BUFFER..TOTAL_HEIGHT {
        let mut spans = Vec::new();
        for col in 0..BOARD_WIDTH {
            let pos = (row as i32, col as i32);
            let on_active = active.filter(|p| p.blocks().contains(&pos));
            let on_ghost = ghost.as_ref().filter(|p| p.blocks().contains(&pos));

            let (text, style) = if let Some(piece) = on_active {
                (block_char, Style::default().fg(piece_color(piece.piece_type)))
            } else if let Some(piece) = on_ghost {
                (ghost_char, Style::default().fg(piece_color(piece.piece_type)).dim())
            } else {
                match board.get(pos.0, pos.1) {
                    Some(color) if color != 0 => (block_char, Style::default().fg(cell_color(color))),
                    _ => (EMPTY, Style::default()),
                }
            };
            spans.push(Span::styled(text, style));
        }
        lines.push(Line::from(spans));
    }

    let paragraph = Paragraph::new(lines);
    frame.render_widget(paragraph, inner);
}

fn label(text: &str) -> Line<'static> {
    Line::from(Span::styled(text.to_string(), Style::default().fg(Color::Gray)))
}

/// Render stats panel
fn render_stats(frame: &mut Frame, area: Rect, view: &View) {
    let controller = view.controller;
    let score = &controller.board.score;

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Gray));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let mut lines = Vec::new();
    match controller.mode() {
        GameMode::TimeAttack => {
            lines.push(label("TIME"));
            lines.push(Line::styled(
                format_frames(controller.elapsed_frames()),
                Style::default().fg(Color::Yellow).bold(),
            ));
            lines.push(label("LINES LEFT"));
            lines.push(Line::styled(
                controller.lines_remaining().unwrap_or(0).to_string(),
                Style::default().fg(Color::Cyan),
            ));
        }
        GameMode::Marathon | GameMode::Versus => {
            lines.push(label("SCORE"));
            lines.push(Line::styled(
                score.points.to_string(),
                Style::default().fg(Color::Yellow).bold(),
            ));
            lines.push(label("LEVEL"));
            lines.push(Line::styled(
                score.level.to_string(),
                Style::default().fg(Color::Cyan),
            ));
        }
    }

    lines.push(label("LINES"));
    lines.push(Line::styled(
        score.lines.to_string(),
        Style::default().fg(Color::Green),
    ));

    if let Some(versus) = &view.versus {
        lines.push(Line::styled(
            format!("Lobby {} seat {}", versus.game_id + 1, versus.seat + 1),
            Style::default().fg(Color::DarkGray),
        ));
        let incoming = controller.board.attacks_waiting();
        if incoming > 0 {
            lines.push(Line::styled(
                format!("+{} incoming", incoming),
                Style::default().fg(Color::Red).bold(),
            ));
        }
    }

    if let Some(clear) = view.last_clear {
        lines.push(Line::styled(
            clear.to_string(),
            Style::default().fg(Color::Magenta).bold(),
        ));
    }

    let paragraph = Paragraph::new(lines);
    frame.render_widget(paragraph, inner);
}

/// Render every opponent as a mini board, two rows of four
fn render_opponents(frame: &mut Frame, area: Rect, opponents: &[Opponent], block_char: &str) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(MINI_BOARD_HEIGHT),
            Constraint::Length(MINI_BOARD_HEIGHT),
        ])
        .split(area);

    for (index, opponent) in opponents.iter().take(8).enumerate() {
        let cells = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(12); 4])
            .split(rows[index / 4]);
        render_opponent_board(frame, cells[index % 4], opponent, block_char);
    }
}

/// Render a small opponent board (scaled down - every other row)
fn render_opponent_board(frame: &mut Frame, area: Rect, opponent: &Opponent, block_char: &str) {
    let topped_out = opponent.grid[..BUFFER_HEIGHT]
        .iter()
        .any(|row| row.iter().any(|&c| c != 0));
    let block = Block::default()
        .title(format!(" {} ", opponent.seat + 1))
        .title_alignment(Alignment::Center)
        .borders(Borders::ALL)
        .border_style(if topped_out {
            Style::default().fg(Color::Red)
        } else {
            Style::default().fg(Color::Gray)
        });

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let cell: String = block_char.chars().take(1).collect();
    let lines = mini_rows(&opponent.grid)
        .map(|row| {
            let spans: Vec<Span> = row
                .iter()
                .map(|&color| match color {
                    0 => Span::raw(" "),
                    color => Span::styled(cell.clone(), Style::default().fg(cell_color(color))),
                })
                .collect();
            Line::from(spans)
        })
        .collect::<Vec<_>>();

    frame.render_widget(Paragraph::new(lines), inner);
}

/// Visible rows, halved: each output row merges two board rows
fn mini_rows(grid: &Grid) -> impl Iterator<Item = [u8; BOARD_WIDTH]> + '_ {
    grid[BUFFER_HEIGHT..].chunks(2).map(|pair| {
        let mut merged = pair[0];
        if let Some(lower) = pair.get(1) {
            for (cell, &below) in merged.iter_mut().zip(lower) {
                if *cell == 0 {
                    *cell = below;
                }
            }
        }
        merged
    })
}

/// Render an overlay (for pause/game over)
fn render_overlay(frame: &mut Frame, area: Rect, title: &str, subtitle: &str) {
    let popup_width = 24u16;
    let popup_height = 5u16;
    let popup_area = center_rect(area, popup_width, popup_height);

    // Clear the background
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .style(Style::default().bg(Color::Black));

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let text = vec![
        Line::styled(title.to_string(), Style::default().fg(Color::Yellow).bold()),
        Line::raw(""),
        Line::styled(subtitle.to_string(), Style::default().fg(Color::Gray)),
    ];

    let paragraph = Paragraph::new(text).alignment(Alignment::Center);
    frame.render_widget(paragraph, inner);
}

/// Render a message box while connecting to a lobby
pub fn render_message(frame: &mut Frame, title: &str, message: &str) {
    let area = frame.area();
    let popup_area = center_rect(area, 60, 5);

    let block = Block::default()
        .title(format!(" {} ", title))
        .title_alignment(Alignment::Center)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let lines = vec![
        Line::raw(""),
        Line::styled(message.to_string(), Style::default().fg(Color::Yellow).bold()),
    ];
    frame.render_widget(Paragraph::new(lines).alignment(Alignment::Center), inner);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mini_rows_merge_pairs() {
        let mut grid = [[0; BOARD_WIDTH]; TOTAL_HEIGHT];
        grid[TOTAL_HEIGHT - 1][0] = 3;
        grid[TOTAL_HEIGHT - 2][1] = 5;
        let rows: Vec<_> = mini_rows(&grid).collect();
        assert_eq!(rows.len(), 10);
        let bottom = rows[9];
        assert_eq!(bottom[0], 3);
        assert_eq!(bottom[1], 5);
    }
}
