use std::io::{self, Stdout};
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseButton,
    MouseEvent, MouseEventKind,
};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Padding, Paragraph};
use ratatui::{Frame, Terminal};
use textwrap::{wrap, Options as WrapOptions};
use unicode_width::UnicodeWidthStr;

use crate::item::ReelItem;
use crate::screen::FeedScreen;

const COLOR_BG: Color = Color::Rgb(30, 30, 46);
const COLOR_PANEL_BG: Color = Color::Rgb(24, 24, 36);
const COLOR_BORDER_FOCUSED: Color = Color::Rgb(137, 180, 250);
const COLOR_TEXT_PRIMARY: Color = Color::Rgb(205, 214, 244);
const COLOR_TEXT_SECONDARY: Color = Color::Rgb(166, 173, 200);
const COLOR_ACCENT: Color = Color::Rgb(137, 180, 250);
const COLOR_LIKED: Color = Color::Rgb(243, 139, 168);
const COLOR_ERROR: Color = Color::Rgb(243, 139, 168);

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const ICON_HEART: &str = "♥";
const ICON_COMMENTS: &str = "💬";
const ICON_MUTED: &str = "🔇";
const ICON_UNMUTED: &str = "🔊";
const ICON_PLAY: &str = "▶";
const ICON_PAUSE: &str = "❚❚";
const SIDE_COLUMN_WIDTH: u16 = 10;
const IDLE_TICK: Duration = Duration::from_millis(120);
const ANIMATION_TICK: Duration = Duration::from_millis(33);
const DOUBLE_CLICK_WINDOW: Duration = Duration::from_millis(300);

const HEART_FRAMES: [&[&str]; 3] = [
    &["♥"],
    &[" ♥ ♥ ", "♥♥♥♥♥", " ♥♥♥ ", "  ♥  "],
    &[
        "  ♥♥♥   ♥♥♥  ",
        " ♥♥♥♥♥ ♥♥♥♥♥ ",
        "♥♥♥♥♥♥♥♥♥♥♥♥♥",
        " ♥♥♥♥♥♥♥♥♥♥♥ ",
        "   ♥♥♥♥♥♥♥   ",
        "     ♥♥♥     ",
        "      ♥      ",
    ],
];

struct Spinner {
    index: usize,
}

impl Spinner {
    fn new() -> Self {
        Self { index: 0 }
    }

    fn frame(&self) -> &'static str {
        SPINNER_FRAMES[self.index % SPINNER_FRAMES.len()]
    }

    fn advance(&mut self) {
        self.index = (self.index + 1) % SPINNER_FRAMES.len();
    }

    fn reset(&mut self) {
        self.index = 0;
    }
}

/// Clickable rows of the side column, as last drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ActionHits {
    like: Rect,
    mute: Rect,
}

pub struct Options {
    pub screen: FeedScreen,
    pub status_message: String,
}

pub struct Model {
    screen: FeedScreen,
    status_message: String,
    spinner: Spinner,
    needs_redraw: bool,
    action_hits: Option<ActionHits>,
    pending_click: Option<Instant>,
}

impl Model {
    pub fn new(opts: Options) -> Self {
        let mut model = Self {
            screen: opts.screen,
            status_message: opts.status_message,
            spinner: Spinner::new(),
            needs_redraw: true,
            action_hits: None,
            pending_click: None,
        };
        model.screen.mount();
        model
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        stdout.execute(EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);

        self.screen.shutdown();
        disable_raw_mode()?;
        terminal.backend_mut().execute(DisableMouseCapture)?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();

        loop {
            if self.screen.poll() {
                self.mark_dirty();
            }

            if self.needs_redraw {
                let now = Instant::now();
                terminal.draw(|frame| self.draw(frame, now))?;
                self.needs_redraw = false;
            }

            let tick_rate = if self.screen.is_animating() || self.pending_click.is_some() {
                ANIMATION_TICK
            } else {
                IDLE_TICK
            };
            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16));

            if event::poll(timeout)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        match self.handle_key(key.code, Instant::now()) {
                            Ok(true) => break,
                            Ok(false) => {}
                            Err(err) => {
                                tracing::error!(error = %err, "key handling failed");
                                self.status_message = format!("Error: {}", err);
                                self.mark_dirty();
                            }
                        }
                    }
                    Event::Mouse(mouse) => {
                        if let Err(err) = self.handle_mouse(mouse, Instant::now()) {
                            tracing::error!(error = %err, "mouse handling failed");
                            self.status_message = format!("Error: {}", err);
                            self.mark_dirty();
                        }
                    }
                    Event::Resize(..) => self.mark_dirty(),
                    _ => {}
                }
            }
            self.resolve_pending_click(Instant::now());

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
                if self.screen.tick(last_tick) {
                    self.mark_dirty();
                }
                if self.screen.is_loading() {
                    self.spinner.advance();
                    self.mark_dirty();
                } else {
                    self.spinner.reset();
                }
                if self.screen.active_item().is_some_and(ReelItem::is_buffering) {
                    self.mark_dirty();
                }
            }
        }

        Ok(())
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    /// Returns true when the app should quit.
    fn handle_key(&mut self, code: KeyCode, now: Instant) -> Result<bool> {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return Ok(true),
            KeyCode::Char('j') | KeyCode::Down | KeyCode::PageDown => {
                self.screen.next();
            }
            KeyCode::Char('k') | KeyCode::Up | KeyCode::PageUp => {
                self.screen.previous();
            }
            KeyCode::Home | KeyCode::Char('g') => {
                self.screen.jump_to(0);
            }
            KeyCode::End | KeyCode::Char('G') => {
                self.screen.jump_to_last();
            }
            KeyCode::Char(' ') | KeyCode::Enter => self.screen.tap(now),
            KeyCode::Char('l') | KeyCode::Char('d') => self.screen.like(now),
            KeyCode::Char('r') => self.screen.toggle_caption(),
            KeyCode::Char('m') => self.toggle_mute()?,
            _ => return Ok(false),
        }
        self.mark_dirty();
        Ok(false)
    }

    fn toggle_mute(&mut self) -> Result<()> {
        let muted = self.screen.toggle_mute()?;
        self.status_message = if muted {
            "Sound off.".to_string()
        } else {
            "Sound on.".to_string()
        };
        Ok(())
    }

    /// A click on the video waits out the double-click window: a second
    /// click inside it likes, otherwise the first one taps.
    fn handle_mouse(&mut self, event: MouseEvent, now: Instant) -> Result<()> {
        match event.kind {
            MouseEventKind::ScrollDown => {
                self.pending_click = None;
                self.screen.next();
            }
            MouseEventKind::ScrollUp => {
                self.pending_click = None;
                self.screen.previous();
            }
            MouseEventKind::Down(MouseButton::Left) => {
                let hits = self.action_hits;
                if hits.is_some_and(|hits| hit(hits.like, event.column, event.row)) {
                    self.screen.like(now);
                } else if hits.is_some_and(|hits| hit(hits.mute, event.column, event.row)) {
                    self.toggle_mute()?;
                } else if self
                    .pending_click
                    .is_some_and(|at| now.saturating_duration_since(at) < DOUBLE_CLICK_WINDOW)
                {
                    self.pending_click = None;
                    self.screen.like(now);
                } else {
                    self.pending_click = Some(now);
                    return Ok(());
                }
            }
            _ => return Ok(()),
        }
        self.mark_dirty();
        Ok(())
    }

    fn resolve_pending_click(&mut self, now: Instant) {
        let Some(at) = self.pending_click else {
            return;
        };
        if now.saturating_duration_since(at) >= DOUBLE_CLICK_WINDOW {
            self.pending_click = None;
            self.screen.tap(now);
            self.mark_dirty();
        }
    }

    fn draw(&mut self, frame: &mut Frame<'_>, now: Instant) {
        let area = frame.size();
        frame.render_widget(Block::default().style(Style::default().bg(COLOR_BG)), area);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(3), Constraint::Length(1)])
            .split(area);

        let state = self.screen.state();
        let title = if state.is_empty() {
            " reels ".to_string()
        } else {
            format!(" reels {}/{} ", state.active_index() + 1, state.len())
        };
        let block = Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(COLOR_BORDER_FOCUSED))
            .style(Style::default().bg(COLOR_PANEL_BG))
            .padding(Padding::horizontal(1));
        let inner = block.inner(chunks[0]);
        frame.render_widget(block, chunks[0]);

        let hits = match self.screen.active_item() {
            Some(item) => Some(self.draw_item(frame, inner, item, now)),
            None => {
                self.draw_placeholder(frame, inner);
                None
            }
        };
        self.action_hits = hits;

        let footer = Paragraph::new(self.footer_text())
            .style(Style::default().fg(COLOR_TEXT_SECONDARY).bg(COLOR_BG));
        frame.render_widget(footer, chunks[1]);
    }

    fn draw_placeholder(&self, frame: &mut Frame<'_>, area: Rect) {
        let (message, style) = match self.feed_notice() {
            Some((message, true)) => (message, Style::default().fg(COLOR_ERROR)),
            Some((message, false)) => (message, Style::default().fg(COLOR_TEXT_SECONDARY)),
            None => (
                format!("{} Loading reels…", self.spinner.frame()),
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ),
        };
        let paragraph = Paragraph::new(message)
            .style(style)
            .alignment(Alignment::Center);
        frame.render_widget(paragraph, centered_rect(80, 20, area));
    }

    fn draw_item(
        &self,
        frame: &mut Frame<'_>,
        area: Rect,
        item: &ReelItem,
        now: Instant,
    ) -> ActionHits {
        let caption = item.caption();
        let text_width = area.width.saturating_sub(SIDE_COLUMN_WIDTH + 1).max(1) as usize;
        let caption_lines = clamp_caption(caption.text, text_width, caption.max_lines);
        let bottom_height = caption_lines.len() as u16
            + 1
            + u16::from(caption.toggle_label.is_some());

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(3), Constraint::Length(bottom_height)])
            .split(area);
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(10), Constraint::Length(SIDE_COLUMN_WIDTH)])
            .split(rows[0]);

        self.draw_video(frame, columns[0], item);
        let hits = self.draw_actions(frame, columns[1], item);

        let post = item.post();
        let mut lines = vec![Line::from(vec![Span::styled(
            format!("@{}", post.author.name),
            Style::default()
                .fg(COLOR_TEXT_PRIMARY)
                .add_modifier(Modifier::BOLD),
        )])];
        lines.extend(caption_lines.into_iter().map(|line| {
            Line::from(Span::styled(line, Style::default().fg(COLOR_TEXT_PRIMARY)))
        }));
        if let Some(label) = caption.toggle_label {
            lines.push(Line::from(Span::styled(
                format!("{label} (r)"),
                Style::default().fg(COLOR_ACCENT),
            )));
        }
        frame.render_widget(Paragraph::new(Text::from(lines)), rows[1]);

        if item.heart().is_visible() {
            draw_heart(frame, columns[0], item.heart().level(now));
        }
        if item.glyph().is_visible() {
            let glyph = if item.is_paused() { ICON_PLAY } else { ICON_PAUSE };
            draw_glyph(frame, columns[0], glyph, item.glyph().level(now));
        }
        hits
    }

    fn draw_video(&self, frame: &mut Frame<'_>, area: Rect, item: &ReelItem) {
        let post = item.post();
        let state_line = if item.is_buffering() {
            Line::from(Span::styled(
                format!("{} buffering…", self.spinner.frame()),
                Style::default().fg(COLOR_ACCENT),
            ))
        } else if item.is_paused() {
            Line::from(Span::styled(
                format!("{ICON_PAUSE} paused"),
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ))
        } else {
            Line::from(Span::styled(
                format!("{ICON_PLAY} playing"),
                Style::default().fg(COLOR_ACCENT),
            ))
        };
        let lines = vec![
            state_line,
            Line::from(""),
            Line::from(Span::styled(
                post.video_url.clone(),
                Style::default().fg(COLOR_TEXT_SECONDARY),
            )),
        ];
        let paragraph = Paragraph::new(Text::from(lines)).alignment(Alignment::Center);
        frame.render_widget(paragraph, centered_rect(100, 40, area));
    }

    fn draw_actions(&self, frame: &mut Frame<'_>, area: Rect, item: &ReelItem) -> ActionHits {
        let post = item.post();
        let heart_style = if item.is_liked() {
            Style::default().fg(COLOR_LIKED).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(COLOR_TEXT_PRIMARY)
        };
        let mute_icon = match item.is_muted() {
            Ok(true) => ICON_MUTED,
            Ok(false) => ICON_UNMUTED,
            Err(_) => "?",
        };
        let lines = vec![
            Line::from(Span::styled(ICON_HEART, heart_style)),
            Line::from(Span::styled(
                compact_count(post.likes),
                Style::default().fg(COLOR_TEXT_SECONDARY),
            )),
            Line::from(""),
            Line::from(ICON_COMMENTS),
            Line::from(Span::styled(
                compact_count(post.comments),
                Style::default().fg(COLOR_TEXT_SECONDARY),
            )),
            Line::from(""),
            Line::from(mute_icon),
        ];
        let height = lines.len() as u16;
        let top = area.y + area.height.saturating_sub(height);
        let column = Rect::new(area.x, top, area.width, height.min(area.height));
        frame.render_widget(
            Paragraph::new(Text::from(lines)).alignment(Alignment::Center),
            column,
        );
        action_hits(column)
    }

    /// `(message, is_error)` for the end of the loaded list, if any.
    fn feed_notice(&self) -> Option<(String, bool)> {
        let state = self.screen.state();
        if state.is_fetching() || state.has_next() {
            return None;
        }
        if let Some(err) = state.last_error() {
            let message = if state.is_empty() {
                format!("Could not load reels: {err}")
            } else {
                format!("Could not load more reels: {err}")
            };
            return Some((message, true));
        }
        if state.is_empty() {
            Some(("No reels available.".to_string(), false))
        } else {
            Some(("You're all caught up.".to_string(), false))
        }
    }

    fn footer_text(&self) -> String {
        let state = self.screen.state();
        let at_end = !state.is_empty() && state.active_index() + 1 == state.len();
        let status = if state.is_fetching() && !state.is_empty() {
            format!("{} Loading more…", self.spinner.frame())
        } else if at_end || state.last_error().is_some() {
            self.feed_notice()
                .map(|(message, _)| message)
                .unwrap_or_else(|| self.status_message.clone())
        } else {
            self.status_message.clone()
        };
        let keys = "j/k: swipe  space: play/pause  l: like  m: mute  r: caption  q: quit";
        format!("{status}  ·  {keys}")
    }
}

/// Heart and count are rows 0-1 of the column, the mute glyph is row 6.
fn action_hits(column: Rect) -> ActionHits {
    let row = |offset: u16, height: u16| {
        let y = column.y.saturating_add(offset);
        let bottom = column.y.saturating_add(column.height);
        Rect::new(column.x, y, column.width, height.min(bottom.saturating_sub(y)))
    };
    ActionHits {
        like: row(0, 2),
        mute: row(6, 1),
    }
}

fn hit(rect: Rect, column: u16, row: u16) -> bool {
    column >= rect.x
        && column < rect.x.saturating_add(rect.width)
        && row >= rect.y
        && row < rect.y.saturating_add(rect.height)
}

/// Wraps a caption and cuts it to `max_lines`, ending a cut text with "…".
fn clamp_caption(text: &str, width: usize, max_lines: usize) -> Vec<String> {
    let mut lines: Vec<String> = wrap(text, WrapOptions::new(width.max(1)))
        .into_iter()
        .map(|line| line.into_owned())
        .collect();
    if lines.len() <= max_lines {
        return lines;
    }
    lines.truncate(max_lines);
    if let Some(last) = lines.last_mut() {
        while !last.is_empty() && last.width() + 1 > width {
            last.pop();
        }
        last.push('…');
    }
    lines
}

fn compact_count(value: i64) -> String {
    match value {
        v if v >= 1_000_000 => format!("{:.1}M", v as f64 / 1_000_000.0),
        v if v >= 1_000 => format!("{:.1}K", v as f64 / 1_000.0),
        v => v.to_string(),
    }
}

fn fade(level: f32) -> Color {
    let level = level.clamp(0.0, 1.0);
    let mix = |from: u8, to: u8| -> u8 {
        (f32::from(from) + (f32::from(to) - f32::from(from)) * level).round() as u8
    };
    Color::Rgb(mix(24, 255), mix(24, 255), mix(36, 255))
}

fn draw_heart(frame: &mut Frame<'_>, area: Rect, level: f32) {
    if level <= 0.0 {
        return;
    }
    let index = ((level * HEART_FRAMES.len() as f32).ceil() as usize)
        .clamp(1, HEART_FRAMES.len())
        - 1;
    let art = HEART_FRAMES[index];
    let width = art.iter().map(|row| row.width()).max().unwrap_or(1) as u16;
    let height = art.len() as u16;
    let rect = centered_fixed(width, height, area);
    let lines: Vec<Line> = art
        .iter()
        .map(|row| Line::from(Span::styled(*row, Style::default().fg(COLOR_LIKED))))
        .collect();
    frame.render_widget(Clear, rect);
    frame.render_widget(Paragraph::new(Text::from(lines)), rect);
}

fn draw_glyph(frame: &mut Frame<'_>, area: Rect, glyph: &str, level: f32) {
    let rect = centered_fixed(glyph.width() as u16 + 2, 1, area);
    let style = Style::default()
        .fg(fade(level))
        .add_modifier(Modifier::BOLD);
    frame.render_widget(
        Paragraph::new(Span::styled(glyph, style)).alignment(Alignment::Center),
        rect,
    );
}

fn centered_fixed(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
