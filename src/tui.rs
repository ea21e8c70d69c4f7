use anyhow::Result;
use chrono::Utc;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Tabs, Wrap},
};
use std::io::stdout;
use std::sync::mpsc::Receiver;
use std::time::Duration;

use crate::export::{export_file_name, to_csv};
use crate::models::{ApplicationRecord, ApplicationStatus, RecordPatch};
use crate::stats::quick_stats;
use crate::truncate;
use crate::store::{RecordStore, APPLICATIONS_KEY};
use crate::views::{apply_filters, relative_date, StatusFilter, TABS};

#[derive(Debug, Clone, PartialEq)]
enum Mode {
    Normal,
    Search,
    ConfirmDelete(String),
    ConfirmClear,
}

struct AppState {
    records: Vec<ApplicationRecord>,
    shown: Vec<ApplicationRecord>,
    tab: usize,
    query: String,
    mode: Mode,
    selected: usize,
    scroll_offset: u16,
    message: Option<String>,
}

impl AppState {
    fn new(records: Vec<ApplicationRecord>) -> Self {
        let mut state = Self {
            records,
            shown: Vec::new(),
            tab: 0,
            query: String::new(),
            mode: Mode::Normal,
            selected: 0,
            scroll_offset: 0,
            message: None,
        };
        state.refilter();
        state
    }

    fn set_records(&mut self, records: Vec<ApplicationRecord>) {
        self.records = records;
        self.refilter();
    }

    fn refilter(&mut self) {
        let filter = StatusFilter::parse(TABS[self.tab]);
        self.shown = apply_filters(&self.records, &filter, &self.query)
            .into_iter()
            .cloned()
            .collect();
        if self.selected >= self.shown.len() {
            self.selected = self.shown.len().saturating_sub(1);
        }
    }

    fn current(&self) -> Option<&ApplicationRecord> {
        self.shown.get(self.selected)
    }

    fn dismiss_message(&mut self) {
        self.message = None;
    }

    fn next(&mut self) {
        if !self.shown.is_empty() && self.selected < self.shown.len() - 1 {
            self.selected += 1;
            self.scroll_offset = 0;
        }
    }

    fn prev(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
            self.scroll_offset = 0;
        }
    }

    fn next_tab(&mut self) {
        self.tab = (self.tab + 1) % TABS.len();
        self.selected = 0;
        self.refilter();
    }

    fn prev_tab(&mut self) {
        self.tab = (self.tab + TABS.len() - 1) % TABS.len();
        self.selected = 0;
        self.refilter();
    }

    fn scroll_down(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_add(3);
    }

    fn scroll_up(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_sub(3);
    }
}

pub fn run_browse(store: &mut RecordStore) -> Result<()> {
    let changes = store.subscribe();
    let mut state = AppState::new(store.load()?);

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, &mut state, store, &changes);

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut AppState,
    store: &mut RecordStore,
    changes: &Receiver<Vec<ApplicationRecord>>,
) -> Result<()> {
    let mut list_state = ListState::default();
    let mut revision = store.database().revision(APPLICATIONS_KEY)?;

    loop {
        if let Some(latest) = changes.try_iter().last() {
            state.set_records(latest);
            revision = store.database().revision(APPLICATIONS_KEY)?;
        }
        list_state.select((!state.shown.is_empty()).then_some(state.selected));
        terminal.draw(|frame| draw(frame, state, &mut list_state))?;

        // Wake up now and then to pick up writes from other processes.
        if !event::poll(Duration::from_secs(2))? {
            let current = store.database().revision(APPLICATIONS_KEY)?;
            if current != revision {
                revision = current;
                state.set_records(store.load()?);
            }
            continue;
        }

        let Event::Key(key) = event::read()? else { continue };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        state.dismiss_message();

        match state.mode.clone() {
            Mode::Search => match key.code {
                KeyCode::Enter | KeyCode::Esc => state.mode = Mode::Normal,
                KeyCode::Backspace => {
                    state.query.pop();
                    state.refilter();
                }
                KeyCode::Char(c) => {
                    state.query.push(c);
                    state.selected = 0;
                    state.refilter();
                }
                _ => {}
            },
            Mode::ConfirmDelete(id) => {
                state.mode = Mode::Normal;
                if key.code == KeyCode::Char('y') {
                    state.message = Some(match store.delete(&id) {
                        Ok(true) => "Application deleted".to_string(),
                        Ok(false) => "Already gone".to_string(),
                        Err(e) => format!("Delete failed: {}", e),
                    });
                }
            }
            Mode::ConfirmClear => {
                state.mode = Mode::Normal;
                if key.code == KeyCode::Char('y') {
                    state.message = Some(match store.clear() {
                        Ok(n) => format!("Deleted {} applications", n),
                        Err(e) => format!("Clear failed: {}", e),
                    });
                }
            }
            Mode::Normal => match key.code {
                KeyCode::Char('q') | KeyCode::Esc => break,
                KeyCode::Down | KeyCode::Char('j') => state.next(),
                KeyCode::Up | KeyCode::Char('k') => state.prev(),
                KeyCode::Char('J') | KeyCode::PageDown => state.scroll_down(),
                KeyCode::Char('K') | KeyCode::PageUp => state.scroll_up(),
                KeyCode::Tab | KeyCode::Right | KeyCode::Char('l') => state.next_tab(),
                KeyCode::BackTab | KeyCode::Left | KeyCode::Char('h') => state.prev_tab(),
                KeyCode::Char('/') => state.mode = Mode::Search,
                KeyCode::Char('s') => {
                    if let Some(job) = state.current() {
                        let patch = RecordPatch {
                            status: Some(job.status.next()),
                            ..Default::default()
                        };
                        let id = job.id.clone();
                        if let Err(e) = store.update(&id, &patch, Utc::now()) {
                            state.message = Some(format!("Update failed: {}", e));
                        }
                    }
                }
                KeyCode::Char('d') => {
                    if let Some(job) = state.current() {
                        state.mode = Mode::ConfirmDelete(job.id.clone());
                    }
                }
                KeyCode::Char('D') => state.mode = Mode::ConfirmClear,
                KeyCode::Char('e') => {
                    let name = export_file_name(Utc::now().date_naive());
                    state.message = Some(match std::fs::write(&name, to_csv(&state.records)) {
                        Ok(()) => format!("Exported {} applications to {}", state.records.len(), name),
                        Err(e) => format!("Export failed: {}", e),
                    });
                }
                _ => {}
            },
        }
    }
    Ok(())
}

/// Bottom line: the active prompt, the last action's result, or key help.
fn footer_text(state: &AppState) -> String {
    match &state.mode {
        Mode::Search => format!(" Search: {}_   (Enter to finish)", state.query),
        Mode::ConfirmDelete(id) => format!(" Delete '{}'? y to confirm, any other key cancels", id),
        Mode::ConfirmClear => {
            " Delete ALL applications? This cannot be undone. y to confirm, any other key cancels".to_string()
        }
        Mode::Normal => match &state.message {
            Some(msg) => format!(" {}", msg),
            None => {
                " j/k:navigate  J/K:scroll  tab:status  /:search  s:next status  d:delete  D:delete all  e:export  q:quit"
                    .to_string()
            }
        },
    }
}

fn status_style(status: &ApplicationStatus) -> Style {
    match status {
        ApplicationStatus::NotApplied => Style::default(),
        ApplicationStatus::Applied | ApplicationStatus::Screening => Style::default().fg(Color::Cyan),
        ApplicationStatus::InterviewScheduled | ApplicationStatus::Interviewed => {
            Style::default().fg(Color::Yellow)
        }
        ApplicationStatus::OfferReceived | ApplicationStatus::Accepted => Style::default().fg(Color::Green),
        ApplicationStatus::Rejected => Style::default().fg(Color::Red),
        ApplicationStatus::Withdrew => Style::default().fg(Color::DarkGray),
        ApplicationStatus::Unknown(_) => Style::default().fg(Color::Magenta),
    }
}

fn draw(frame: &mut Frame, state: &AppState, list_state: &mut ListState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(1)])
        .split(frame.area());

    // Header: status tabs with the quick counters in the title
    let quick = quick_stats(&state.records);
    let tabs = Tabs::new(TABS.to_vec())
        .select(state.tab)
        .highlight_style(Style::default().add_modifier(Modifier::BOLD).fg(Color::Cyan))
        .block(Block::default().borders(Borders::ALL).title(format!(
            " Total {}  Applied {}  Interview {}  Offer {} ",
            quick.total, quick.applied, quick.interview, quick.offer
        )));
    frame.render_widget(tabs, rows[0]);

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(rows[1]);

    // Left panel: application list
    let now = Utc::now();
    let items: Vec<ListItem> = state
        .shown
        .iter()
        .map(|job| {
            let line = Line::from(vec![
                Span::styled(format!("{:<20} ", truncate(job.status.as_str(), 20)), status_style(&job.status)),
                Span::raw(format!("{} | {}", truncate(&job.job_title, 30), truncate(&job.company_name, 20))),
                Span::styled(
                    format!("  {}", relative_date(job.effective_date(), now)),
                    Style::default().fg(Color::DarkGray),
                ),
            ]);
            ListItem::new(line)
        })
        .collect();

    let list_title = if state.query.is_empty() {
        format!(" Applications ({}) ", state.shown.len())
    } else {
        format!(" Applications ({}) matching '{}' ", state.shown.len(), state.query)
    };
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(list_title))
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, chunks[0], list_state);

    // Right panel: detail
    let detail_widget = Paragraph::new(build_detail(state))
        .block(Block::default().borders(Borders::ALL).title(" Detail "))
        .wrap(Wrap { trim: false })
        .scroll((state.scroll_offset, 0));
    frame.render_widget(detail_widget, chunks[1]);

    let footer = footer_text(state);
    let footer_style = match state.mode {
        Mode::ConfirmDelete(_) | Mode::ConfirmClear => Style::default().fg(Color::Red),
        _ => Style::default().fg(Color::DarkGray),
    };
    frame.render_widget(Paragraph::new(footer).style(footer_style), rows[2]);
}

fn build_detail<'a>(state: &'a AppState) -> Text<'a> {
    let Some(job) = state.current() else {
        return if state.query.is_empty() {
            Text::raw("No applications yet. Capture one with: jobtrack capture <url> --save")
        } else {
            Text::raw("No matching applications. Try a different search term.")
        };
    };

    let mut lines: Vec<Line> = Vec::new();

    lines.push(Line::from(Span::styled(
        &job.job_title,
        Style::default().add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(format!("at {}", job.company_name)));
    lines.push(Line::from(job.location.as_str()));
    lines.push(Line::from(Span::styled(
        format!("Status: {}", job.status),
        status_style(&job.status),
    )));
    lines.push(Line::from(""));

    if !job.url.is_empty() {
        lines.push(Line::from(format!("URL: {}", job.url)));
    }
    lines.push(Line::from(format!("Found: {}", job.date_found.format("%Y-%m-%d %H:%M"))));
    if let Some(added) = job.date_added {
        lines.push(Line::from(format!("Added: {}", added.format("%Y-%m-%d %H:%M"))));
    }
    if let Some(applied) = job.date_applied {
        lines.push(Line::from(format!("Applied: {}", applied)));
    }
    if let Some(follow_up) = job.follow_up_date {
        lines.push(Line::from(format!("Follow up: {}", follow_up)));
    }

    if !job.notes.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "Notes",
            Style::default().add_modifier(Modifier::BOLD),
        )));
        for line in textwrap::fill(&job.notes, 70).lines() {
            lines.push(Line::from(format!("  {}", line)));
        }
    }

    if !job.description.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "Description",
            Style::default().add_modifier(Modifier::BOLD),
        )));
        for line in job.description.lines() {
            lines.push(Line::from(line.to_string()));
        }
    }

    Text::from(lines)
}
