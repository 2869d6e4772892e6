use crossterm::{
    event::{self, Event as TermEvent, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use heos_control::{
    events, AccountStatus, ClientConfig, DeviceDescriptor, Discovery, DiscoveryConfig, HeosClient,
    MusicSource,
};
use parking_lot::Mutex;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const EVENT_LOG_LINES: usize = 200;

#[derive(PartialEq)]
enum AppState {
    Discovery,
    Device,
}

struct App {
    state: AppState,
    devices: Arc<Mutex<Vec<DeviceDescriptor>>>,
    searching: Arc<Mutex<bool>>,
    selected_device_index: usize,
    client: Option<HeosClient>,
    sources: Vec<MusicSource>,
    account: Option<(AccountStatus, Option<String>)>,
    event_log: Arc<Mutex<VecDeque<String>>>,
    status_message: String,
}

impl App {
    fn new() -> Self {
        Self {
            state: AppState::Discovery,
            devices: Arc::new(Mutex::new(Vec::new())),
            searching: Arc::new(Mutex::new(false)),
            selected_device_index: 0,
            client: None,
            sources: Vec::new(),
            account: None,
            event_log: Arc::new(Mutex::new(VecDeque::new())),
            status_message: "Discovering devices...".to_string(),
        }
    }

    /// Run one discovery pass in the background
    fn start_discovery(&mut self) {
        if *self.searching.lock() {
            return;
        }
        *self.searching.lock() = true;
        self.status_message = "Discovering devices...".to_string();

        let devices = self.devices.clone();
        let searching = self.searching.clone();
        tokio::spawn(async move {
            let discovery =
                Discovery::new(DiscoveryConfig::default().with_timeout(Duration::from_secs(3)));
            match discovery.discover().await {
                Ok(found) => *devices.lock() = found,
                Err(e) => tracing::warn!("Discovery failed: {}", e),
            }
            *searching.lock() = false;
        });
    }

    fn device_count(&self) -> usize {
        self.devices.lock().len()
    }

    fn select_next(&mut self) {
        let count = self.device_count();
        if count > 0 {
            self.selected_device_index = (self.selected_device_index + 1) % count;
        }
    }

    fn select_previous(&mut self) {
        let count = self.device_count();
        if count > 0 {
            if self.selected_device_index == 0 {
                self.selected_device_index = count - 1;
            } else {
                self.selected_device_index -= 1;
            }
        }
    }

    async fn connect_to_selected_device(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let selected = self.devices.lock().get(self.selected_device_index).cloned();
        let Some(device) = selected else {
            self.status_message = "No device to connect to".to_string();
            return Ok(());
        };

        let client = match HeosClient::for_device(&device, ClientConfig::default()) {
            Ok(client) => client,
            Err(e) => {
                self.status_message = format!("Cannot use {}: {}", device.location, e);
                return Ok(());
            }
        };

        for name in events::ALL {
            let log = self.event_log.clone();
            client.subscribe(*name, move |event| {
                let log = log.clone();
                async move {
                    let mut log = log.lock();
                    log.push_front(format!("{} {}", event.command, event.message));
                    log.truncate(EVENT_LOG_LINES);
                }
            });
        }

        self.status_message = format!("Connecting to {}...", client.host());
        if let Err(e) = client.connect().await {
            self.status_message = format!("Failed to connect: {}", e);
            return Ok(());
        }

        self.sources = client.get_music_sources().await.unwrap_or_default();
        self.account = client.check_account().await.ok();
        self.client = Some(client);
        self.state = AppState::Device;
        self.status_message =
            "Connected! a to check account, h heart beat, Esc to go back, q to quit".to_string();
        Ok(())
    }

    async fn refresh_account(&mut self) {
        if let Some(client) = &self.client {
            match client.check_account().await {
                Ok(account) => {
                    self.account = Some(account);
                    self.status_message = "Account refreshed".to_string();
                }
                Err(e) => self.status_message = format!("Failed to check account: {}", e),
            }
        }
    }

    async fn heart_beat(&mut self) {
        if let Some(client) = &self.client {
            self.status_message = match client.heart_beat().await {
                Ok(()) => "Device is alive".to_string(),
                Err(e) => format!("Heart beat failed: {}", e),
            };
        }
    }

    async fn go_back(&mut self) {
        if let Some(client) = self.client.take() {
            client.close().await;
        }
        self.state = AppState::Discovery;
        self.sources.clear();
        self.account = None;
        self.event_log.lock().clear();
        self.status_message = format!(
            "Discovered {} device(s). Press Enter to connect.",
            self.device_count()
        );
    }
}

fn ui(f: &mut Frame, app: &App) {
    let outer_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([Constraint::Min(0), Constraint::Length(3)])
        .split(f.size());

    match app.state {
        AppState::Discovery => {
            render_discovery(f, app, outer_chunks[0]);
        }
        AppState::Device => {
            let inner_chunks = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
                .split(outer_chunks[0]);

            render_device(f, app, inner_chunks[0]);
            render_event_log(f, app, inner_chunks[1]);
        }
    }

    render_status(f, app, outer_chunks[1]);
}

fn render_discovery(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" Discovered Devices (j/k to select, Enter to connect, r to rescan, q to quit) ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let devices = app.devices.lock().clone();
    if devices.is_empty() {
        let text = Paragraph::new("Discovering devices...\n\nWaiting for HEOS devices on the network.")
            .block(block)
            .wrap(Wrap { trim: true });
        f.render_widget(text, area);
        return;
    }

    let items: Vec<ListItem> = devices
        .iter()
        .map(|device| {
            let content = vec![
                Line::from(vec![
                    Span::styled("Host: ", Style::default().fg(Color::Yellow)),
                    Span::raw(device.host().unwrap_or_default()),
                ]),
                Line::from(vec![
                    Span::styled("Server: ", Style::default().fg(Color::Yellow)),
                    Span::raw(device.server.clone().unwrap_or_default()),
                ]),
                Line::from(vec![
                    Span::styled("USN: ", Style::default().fg(Color::Yellow)),
                    Span::raw(device.usn.clone().unwrap_or_default()),
                ]),
                Line::from(""),
            ];
            ListItem::new(content)
        })
        .collect();

    let mut state = ListState::default();
    state.select(Some(app.selected_device_index));

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol(">> ");

    f.render_stateful_widget(list, area, &mut state);
}

fn render_device(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" Device (a account, h heart beat, Esc back, q quit) ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));

    let host = app.client.as_ref().map(|c| c.host().to_string()).unwrap_or_default();
    let account = match &app.account {
        Some((AccountStatus::SignedIn, user)) => {
            format!("signed in as {}", user.as_deref().unwrap_or("?"))
        }
        Some((AccountStatus::SignedOut, _)) => "signed out".to_string(),
        None => "unknown".to_string(),
    };

    let mut lines = vec![
        Line::from(vec![
            Span::styled("Host: ", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
            Span::raw(host),
        ]),
        Line::from(vec![
            Span::styled("Account: ", Style::default().fg(Color::Yellow)),
            Span::styled(account, Style::default().fg(Color::Cyan)),
        ]),
        Line::from(""),
    ];

    if !app.sources.is_empty() {
        lines.push(Line::from(Span::styled("Music sources:", Style::default().fg(Color::Yellow))));
        for source in &app.sources {
            lines.push(Line::from(vec![
                Span::raw(if source.available { "  ▶ " } else { "    " }),
                Span::styled(
                    format!("{} ({})", source.name, source.sid),
                    if source.available {
                        Style::default().fg(Color::Green)
                    } else {
                        Style::default().fg(Color::Gray)
                    },
                ),
            ]));
        }
    }

    let text = Paragraph::new(lines).block(block).wrap(Wrap { trim: true });
    f.render_widget(text, area);
}

fn render_event_log(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" Events (newest first) ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta));

    let lines: Vec<Line> = app
        .event_log
        .lock()
        .iter()
        .map(|entry| Line::from(entry.clone()))
        .collect();

    let text = Paragraph::new(lines).block(block).wrap(Wrap { trim: true });
    f.render_widget(text, area);
}

fn render_status(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" Status ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Gray));

    let text = Paragraph::new(app.status_message.clone())
        .block(block)
        .wrap(Wrap { trim: true });

    f.render_widget(text, area);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to a file; the terminal belongs to the UI
    if let Ok(path) = std::env::var("HEOS_LOG_FILE") {
        let file = std::fs::File::create(path)?;
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("heos_control=debug")),
            )
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .init();
    }

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new();
    app.start_discovery();

    let res = run_app(&mut terminal, &mut app).await;

    if let Some(client) = app.client.take() {
        client.close().await;
    }

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {}", err);
    }

    Ok(())
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        if app.state == AppState::Discovery && !*app.searching.lock() {
            let count = app.device_count();
            app.status_message = if count > 0 {
                format!("Found {} device(s). Press Enter to connect.", count)
            } else {
                "No devices found. Press r to search again.".to_string()
            };
        }

        terminal.draw(|f| ui(f, app))?;

        // Handle input events (non-blocking)
        if event::poll(Duration::from_millis(100))? {
            if let TermEvent::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match app.state {
                        AppState::Discovery => match key.code {
                            KeyCode::Char('q') => return Ok(()),
                            KeyCode::Char('j') | KeyCode::Down => app.select_next(),
                            KeyCode::Char('k') | KeyCode::Up => app.select_previous(),
                            KeyCode::Char('r') => app.start_discovery(),
                            KeyCode::Enter => {
                                app.connect_to_selected_device().await?;
                            }
                            _ => {}
                        },
                        AppState::Device => match key.code {
                            KeyCode::Char('q') => return Ok(()),
                            KeyCode::Esc => app.go_back().await,
                            KeyCode::Char('a') => app.refresh_account().await,
                            KeyCode::Char('h') => app.heart_beat().await,
                            _ => {}
                        },
                    }
                }
            }
        }
    }
}
