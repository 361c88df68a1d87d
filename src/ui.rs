use std::io;

use chrono::{Local, NaiveDate};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Flex, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Tabs},
    Frame, Terminal,
};
use tokio::runtime::Runtime;

use crate::access::DELETED_MESSAGE;
use crate::client::{ApiClient, Reply};
use crate::kanban_board::{toggle_label, toggle_notice, KanbanBoard, Notice, NoticeKind, StatusFilter};
use crate::task::{Task, TaskStatus};
use crate::task_form::{FormField, Submission, TaskForm};

#[derive(Debug)]
enum Mode {
    Browse,
    Search,
    Form(TaskForm),
}

/// The interactive dashboard: board state plus the client used to sync it.
pub struct App<'a> {
    runtime: &'a Runtime,
    client: ApiClient,
    username: String,
    board: KanbanBoard,
    mode: Mode,
}

impl<'a> App<'a> {
    pub fn new(runtime: &'a Runtime, client: ApiClient, username: impl Into<String>) -> Self {
        Self {
            runtime,
            client,
            username: username.into(),
            board: KanbanBoard::new(),
            mode: Mode::Browse,
        }
    }

    pub fn refresh(&mut self) {
        match self.runtime.block_on(self.client.fetch_tasks()) {
            Ok(Reply::Data(tasks)) => self.board.replace_all(tasks),
            Ok(Reply::Message(message)) => self.board.notice = Some(Notice::error(message)),
            Err(err) => self.board.notice = Some(Notice::error(err.to_string())),
        }
    }

    fn toggle_selected(&mut self) {
        let Some(task) = self.board.selected() else {
            return;
        };
        let (id, next) = (task.id, task.status.next());
        match self.runtime.block_on(self.client.update_task_status(id, next)) {
            Ok(Reply::Data(_)) => {
                self.board.set_status(id, next);
                self.board.notice = Some(toggle_notice(next));
            }
            Ok(Reply::Message(message)) => self.board.notice = Some(Notice::error(message)),
            Err(err) => self.board.notice = Some(Notice::error(err.to_string())),
        }
    }

    fn delete_selected(&mut self) {
        let Some(id) = self.board.selected().map(|t| t.id) else {
            return;
        };
        match self.runtime.block_on(self.client.delete_task(id)) {
            Ok(message) if message == DELETED_MESSAGE => {
                self.board.remove_task(id);
                self.board.notice = Some(Notice::success(
                    "Task deleted",
                    "The task has been removed from your list.",
                ));
            }
            Ok(message) => self.board.notice = Some(Notice::error(message)),
            Err(err) => self.board.notice = Some(Notice::error(err.to_string())),
        }
    }

    fn submit_form(&mut self, mut form: TaskForm) {
        let Some(submission) = form.submit() else {
            self.mode = Mode::Form(form);
            return;
        };

        let outcome = match &submission {
            Submission::Create(draft) => self.runtime.block_on(self.client.create_task(draft)),
            Submission::Update(id, patch) => {
                self.runtime.block_on(self.client.update_task(*id, patch))
            }
        };

        match outcome {
            Ok(Reply::Data(task)) => {
                if matches!(submission, Submission::Create(_)) {
                    self.board.add_task(task);
                    self.board.notice = Some(Notice::success(
                        "Task created!",
                        "Your new task has been added successfully.",
                    ));
                } else {
                    self.board.replace_task(task);
                    self.board.notice = Some(Notice::success(
                        "Task updated!",
                        "Your task has been updated permanently.",
                    ));
                }
                self.mode = Mode::Browse;
            }
            Ok(Reply::Message(message)) => {
                self.board.notice = Some(Notice::error(message));
                self.mode = Mode::Form(form);
            }
            Err(err) => {
                self.board.notice = Some(Notice::error(err.to_string()));
                self.mode = Mode::Form(form);
            }
        }
    }

    /// Returns `false` when the user asked to quit.
    fn handle_key(&mut self, key: KeyEvent) -> bool {
        self.board.notice = None;
        match std::mem::replace(&mut self.mode, Mode::Browse) {
            Mode::Browse => return self.handle_browse_key(key),
            Mode::Search => match key.code {
                KeyCode::Enter => {}
                KeyCode::Esc => self.board.set_query(String::new()),
                KeyCode::Backspace => {
                    let mut query = self.board.query.clone();
                    query.pop();
                    self.board.set_query(query);
                    self.mode = Mode::Search;
                }
                KeyCode::Char(c) => {
                    let query = format!("{}{c}", self.board.query);
                    self.board.set_query(query);
                    self.mode = Mode::Search;
                }
                _ => self.mode = Mode::Search,
            },
            Mode::Form(mut form) => match key.code {
                KeyCode::Esc => {}
                KeyCode::Enter => self.submit_form(form),
                code => {
                    match code {
                        KeyCode::Tab | KeyCode::Down => form.focus_next(),
                        KeyCode::BackTab | KeyCode::Up => form.focus_previous(),
                        KeyCode::Left if form.focus == FormField::Status => form.cycle_status(false),
                        KeyCode::Right if form.focus == FormField::Status => form.cycle_status(true),
                        KeyCode::Backspace => form.pop_char(),
                        KeyCode::Char(c) => form.push_char(c),
                        _ => {}
                    }
                    self.mode = Mode::Form(form);
                }
            },
        }
        true
    }

    fn handle_browse_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return false,
            KeyCode::Char('a') => self.mode = Mode::Form(TaskForm::create()),
            KeyCode::Char('e') => {
                if let Some(task) = self.board.selected() {
                    self.mode = Mode::Form(TaskForm::edit(task));
                }
            }
            KeyCode::Char('d') | KeyCode::Delete => self.delete_selected(),
            KeyCode::Char('t') | KeyCode::Char(' ') | KeyCode::Enter => self.toggle_selected(),
            KeyCode::Char('f') | KeyCode::Tab => self.board.cycle_filter(),
            KeyCode::Char('/') => self.mode = Mode::Search,
            KeyCode::Char('r') => self.refresh(),
            KeyCode::Up | KeyCode::Char('k') => self.board.select_previous(),
            KeyCode::Down | KeyCode::Char('j') => self.board.select_next(),
            _ => {}
        }
        true
    }

    fn draw(&self, frame: &mut Frame) {
        let form = match &self.mode {
            Mode::Form(form) => Some(form),
            _ => None,
        };
        draw(
            frame,
            &self.board,
            &self.username,
            form,
            matches!(self.mode, Mode::Search),
            Local::now().date_naive(),
        );
    }
}

/// Puts the terminal in raw/alternate-screen mode, runs the dashboard and
/// restores the terminal whatever the outcome, including a failed setup.
pub fn run_board(runtime: &Runtime, client: ApiClient, username: &str) -> io::Result<()> {
    enable_raw_mode()?;
    with_restore(
        || {
            execute!(io::stdout(), EnterAlternateScreen, EnableMouseCapture)?;
            let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
            let mut app = App::new(runtime, client, username);
            app.refresh();
            let result = run_app(&mut terminal, &mut app);
            result.and(terminal.show_cursor())
        },
        restore_terminal,
    )
}

fn restore_terminal() -> io::Result<()> {
    disable_raw_mode()?;
    execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture)
}

/// Runs `body`, then `restore` even if `body` failed. The body's error wins.
fn with_restore<T>(
    body: impl FnOnce() -> io::Result<T>,
    restore: impl FnOnce() -> io::Result<()>,
) -> io::Result<T> {
    let result = body();
    let restored = restore();
    result.and_then(|value| restored.map(|()| value))
}

pub fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    loop {
        terminal.draw(|f| app.draw(f))?;

        if let Event::Key(key) = event::read()? {
            if key.kind == KeyEventKind::Press && !app.handle_key(key) {
                return Ok(());
            }
        }
    }
}

fn status_color(task: &Task, today: NaiveDate) -> Color {
    match task.status {
        TaskStatus::Done => Color::Green,
        TaskStatus::Working => Color::Yellow,
        TaskStatus::Pending if task.is_overdue(today) => Color::Red,
        TaskStatus::Pending => Color::Gray,
    }
}

fn status_text(task: &Task, today: NaiveDate) -> &'static str {
    if task.is_overdue(today) {
        "Overdue"
    } else {
        task.status.label()
    }
}

fn task_card(task: &Task, today: NaiveDate) -> ListItem<'_> {
    let color = status_color(task, today);
    let mut lines = vec![Line::from(vec![
        Span::styled(
            format!("[{}] ", status_text(task, today)),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ),
        Span::styled(&task.title, Style::default().fg(Color::White)),
    ])];
    if let Some(description) = task.description.as_deref().filter(|d| !d.is_empty()) {
        lines.push(Line::from(Span::raw(format!("    {description}"))));
    }
    let mut footer = vec![];
    if let Some(deadline) = task.deadline {
        let style = if task.is_overdue(today) {
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        footer.push(Span::styled(format!("    Due: {deadline}  "), style));
    } else {
        footer.push(Span::raw("    "));
    }
    footer.push(Span::styled(
        format!("(t: {})", toggle_label(task.status)),
        Style::default().fg(Color::DarkGray),
    ));
    lines.push(Line::from(footer));
    ListItem::new(Text::from(lines))
}

/// Renders the dashboard. Kept free of I/O so it can be drawn on a test
/// backend.
pub fn draw(
    frame: &mut Frame,
    board: &KanbanBoard,
    username: &str,
    form: Option<&TaskForm>,
    searching: bool,
    today: NaiveDate,
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(vec![
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let header = Paragraph::new(Line::from(vec![
        Span::styled("TaskMate", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw(format!("  Welcome back, {username}")),
    ]))
    .block(Block::default().borders(Borders::ALL));
    frame.render_widget(header, chunks[0]);

    let stats = board.stats();
    let stat_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(vec![Constraint::Percentage(25); 4])
        .split(chunks[1]);
    for (i, (label, count)) in [
        ("Total Tasks", stats.total),
        ("Pending", stats.pending),
        ("Working", stats.working),
        ("Done", stats.done),
    ]
    .into_iter()
    .enumerate()
    {
        let widget = Paragraph::new(Line::from(vec![
            Span::styled(format!("{count} "), Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(label),
        ]))
        .block(Block::default().borders(Borders::ALL));
        frame.render_widget(widget, stat_chunks[i]);
    }

    let control_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(vec![Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[2]);
    let search_style = if searching {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };
    let query = if board.query.is_empty() && !searching {
        Span::styled("Search tasks... (/)", Style::default().fg(Color::DarkGray))
    } else {
        Span::raw(board.query.as_str())
    };
    frame.render_widget(
        Paragraph::new(Line::from(query)).block(
            Block::default()
                .title("Search")
                .borders(Borders::ALL)
                .border_style(search_style),
        ),
        control_chunks[0],
    );
    let selected_filter = StatusFilter::ORDER
        .iter()
        .position(|f| *f == board.filter)
        .unwrap_or(0);
    let tabs = Tabs::new(StatusFilter::ORDER.iter().map(|f| f.label()))
        .select(selected_filter)
        .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .block(Block::default().title("Filter (f)").borders(Borders::ALL));
    frame.render_widget(tabs, control_chunks[1]);

    let visible = board.visible();
    let list_title = format!("Tasks ({})", visible.len());
    if visible.is_empty() {
        let empty = if board.tasks.is_empty() {
            "No tasks yet. Press `a` to create your first task."
        } else {
            "No tasks match your search or filter."
        };
        frame.render_widget(
            Paragraph::new(empty).block(Block::default().title(list_title).borders(Borders::ALL)),
            chunks[3],
        );
    } else {
        let items: Vec<ListItem> = visible.iter().map(|t| task_card(t, today)).collect();
        let list = List::new(items)
            .block(Block::default().title(list_title).borders(Borders::ALL))
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
            .highlight_symbol("> ");
        let mut state = ListState::default().with_selected(Some(board.selected_task));
        frame.render_stateful_widget(list, chunks[3], &mut state);
    }

    let footer = match &board.notice {
        Some(notice) => {
            let color = match notice.kind {
                NoticeKind::Success => Color::Green,
                NoticeKind::Error => Color::Red,
            };
            Line::from(vec![
                Span::styled(format!("{}: ", notice.title), Style::default().fg(color).add_modifier(Modifier::BOLD)),
                Span::raw(notice.detail.as_str()),
            ])
        }
        None => Line::from(Span::styled(
            "a add  e edit  t toggle  d delete  f filter  / search  r refresh  q quit",
            Style::default().fg(Color::DarkGray),
        )),
    };
    frame.render_widget(
        Paragraph::new(footer).block(Block::default().borders(Borders::ALL)),
        chunks[4],
    );

    if let Some(form) = form {
        draw_form(frame, form);
    }
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let [row] = Layout::vertical([Constraint::Length(height)])
        .flex(Flex::Center)
        .areas(area);
    let [cell] = Layout::horizontal([Constraint::Length(width)])
        .flex(Flex::Center)
        .areas(row);
    cell
}

fn draw_form(frame: &mut Frame, form: &TaskForm) {
    let area = centered(frame.area(), 60, 16);
    frame.render_widget(Clear, area);
    let outer = Block::default()
        .title(form.heading())
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let inner = outer.inner(area);
    frame.render_widget(outer, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(vec![
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(1),
        ])
        .split(inner);

    let status = format!("< {} >", form.status.label());
    let fields = [
        (FormField::Title, "Title *", form.title.as_str()),
        (FormField::Description, "Description", form.description.as_str()),
        (FormField::Status, "Status", status.as_str()),
        (FormField::Deadline, "Deadline (YYYY-MM-DD)", form.deadline.as_str()),
    ];
    for (i, (field, label, value)) in fields.into_iter().enumerate() {
        let border = if form.focus == field {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default()
        };
        frame.render_widget(
            Paragraph::new(value).block(
                Block::default()
                    .title(label)
                    .borders(Borders::ALL)
                    .border_style(border),
            ),
            rows[i],
        );
    }

    let hint = match &form.error {
        Some(error) => Line::from(Span::styled(error.as_str(), Style::default().fg(Color::Red))),
        None if !form.can_submit() => Line::from(Span::styled(
            "Enter a title to save  (Esc cancel)",
            Style::default().fg(Color::DarkGray),
        )),
        None => Line::from(Span::styled(
            "Enter save  Tab next field  Esc cancel",
            Style::default().fg(Color::DarkGray),
        )),
    };
    frame.render_widget(Paragraph::new(hint), rows[4]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{NewTask, UserId};
    use chrono::Utc;
    use ratatui::backend::TestBackend;
    use rstest::rstest;

    fn screen(board: &KanbanBoard, form: Option<&TaskForm>, today: NaiveDate) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 40)).unwrap();
        terminal
            .draw(|f| draw(f, board, "sam", form, false, today))
            .unwrap();
        terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[rstest]
    fn renders_cards_and_stats() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let mut late = Task::new(UserId::generate(), NewTask::titled("Pay rent"), Utc::now());
        late.deadline = NaiveDate::from_ymd_opt(2024, 5, 1);
        let mut board = KanbanBoard::new();
        board.replace_all(vec![late]);

        let text = screen(&board, None, today);

        assert!(text.contains("Welcome back, sam"));
        assert!(text.contains("Pay rent"));
        assert!(text.contains("[Overdue]"));
        assert!(text.contains("Start Working"));
        assert!(text.contains("1 Total Tasks"));
    }

    #[rstest]
    fn terminal_is_restored_when_setup_fails() {
        let restored = std::cell::Cell::new(false);

        let result: io::Result<()> = with_restore(
            || Err(io::Error::other("no tty")),
            || {
                restored.set(true);
                Ok(())
            },
        );

        assert!(restored.get());
        assert_eq!(result.unwrap_err().to_string(), "no tty");
    }

    #[rstest]
    fn restore_failure_is_reported() {
        let result = with_restore(|| Ok(7), || Err(io::Error::other("stuck in raw mode")));
        assert!(result.is_err());
    }

    #[rstest]
    fn renders_empty_state_and_form() {
        let board = KanbanBoard::new();
        let form = TaskForm::create();

        let text = screen(&board, Some(&form), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());

        assert!(text.contains("No tasks yet"));
        assert!(text.contains("Create New Task"));
        assert!(text.contains("Enter a title to save"));
    }
}
