//! lipsync CLI: a terminal mouth that talks along with an audio clip

use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use crossbeam_channel::{unbounded, Receiver, Sender};

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use ratatui::widgets::*;

use lipsync::audio::{AudioEngine, OfflineEngine, OnEnded, RodioEngine};
use lipsync::error::LipSyncError;
use lipsync::net::detect_format_hint;
use lipsync::{LipSync, LipSyncPlayer};

#[derive(Parser)]
#[command(
    name = "lipsync",
    about = "Animate a terminal mouth from an audio clip",
    version
)]
struct Cli {
    /// Audio file path or http(s) URL
    source: String,

    /// Render without opening an audio device
    #[arg(long)]
    offline: bool,

    /// Print one volume reading per frame instead of drawing the TUI
    #[arg(long)]
    plain: bool,
}

/// Progress of the single playback started by the CLI
enum PlaybackStatus {
    Started,
    Ended,
    Failed(String),
}

const HISTORY_LEN: usize = 64;

struct App {
    source: String,
    engine_name: &'static str,
    volume: f32,
    peak_volume: f32,
    history: Vec<u64>,
    status: String,
    started_at: Option<Instant>,
    ended_at: Option<Instant>,
    running: bool,
}

impl App {
    fn new(source: &str, engine_name: &'static str) -> Self {
        Self {
            source: source.to_string(),
            engine_name,
            volume: 0.0,
            peak_volume: 0.0,
            history: vec![0; HISTORY_LEN],
            status: "Loading...".to_string(),
            started_at: None,
            ended_at: None,
            running: true,
        }
    }

    fn record(&mut self, volume: f32) {
        self.volume = volume;
        self.peak_volume = self.peak_volume.max(volume);
        self.history.remove(0);
        self.history.push((volume * 100.0).round() as u64);
    }

    fn apply(&mut self, status: PlaybackStatus) {
        match status {
            // A clip that fails to decode reports Ended before Started
            PlaybackStatus::Started => {
                if self.ended_at.is_none() {
                    self.status = "Playing".to_string();
                    self.started_at = Some(Instant::now());
                }
            }
            PlaybackStatus::Ended => {
                self.status = "Finished".to_string();
                self.ended_at = Some(Instant::now());
            }
            PlaybackStatus::Failed(msg) => {
                self.status = format!("Error: {}", msg);
                self.ended_at = Some(Instant::now());
            }
        }
    }

    /// Linger briefly after the clip so the mouth visibly closes
    fn should_exit(&self) -> bool {
        self.ended_at
            .is_some_and(|t| t.elapsed() >= Duration::from_millis(500))
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    if cli.offline {
        run(Arc::new(OfflineEngine::realtime()), "offline", &cli)
    } else {
        let engine = match RodioEngine::new() {
            Ok(e) => e,
            Err(e) => {
                eprintln!("Audio error: {}", e);
                std::process::exit(1);
            }
        };
        run(Arc::new(engine), "device", &cli)
    }
}

fn run<E: AudioEngine>(
    engine: Arc<E>,
    engine_name: &'static str,
    cli: &Cli,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut lip_sync = LipSync::new(engine)?;
    let status_rx = start_playback(lip_sync.player(), cli.source.clone());
    let mut app = App::new(&cli.source, engine_name);

    if cli.plain {
        return run_plain(&mut lip_sync, &status_rx, &mut app);
    }

    // ALSA/PulseAudio write diagnostics to stderr, which corrupts the TUI
    let stderr_guard = StderrSilencer::engage();

    terminal::enable_raw_mode()?;
    io::stdout().execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;

    let tick_rate = Duration::from_millis(33); // ~30fps
    let mut last_tick = Instant::now();

    while app.running {
        terminal.draw(|f| draw_ui(f, &app))?;

        let timeout = tick_rate.saturating_sub(last_tick.elapsed());
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press
                    && matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
                {
                    app.running = false;
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
            while let Ok(status) = status_rx.try_recv() {
                app.apply(status);
            }
            app.record(lip_sync.update().volume);
            if app.should_exit() {
                app.running = false;
            }
        }
    }

    // Drop the engine while still in the alternate screen
    drop(lip_sync);

    terminal::disable_raw_mode()?;
    io::stdout().execute(LeaveAlternateScreen)?;
    drop(stderr_guard);

    if app.status.starts_with("Error") {
        eprintln!("{}", app.status);
        std::process::exit(1);
    }
    Ok(())
}

fn run_plain<E: AudioEngine>(
    lip_sync: &mut LipSync<E>,
    status_rx: &Receiver<PlaybackStatus>,
    app: &mut App,
) -> Result<(), Box<dyn std::error::Error>> {
    let tick_rate = Duration::from_millis(33);
    let started = Instant::now();

    while app.running {
        thread::sleep(tick_rate);
        while let Ok(status) = status_rx.try_recv() {
            app.apply(status);
        }
        let volume = lip_sync.update().volume;
        app.record(volume);
        println!(
            "{:>8.3}s  {:.3}  {}",
            started.elapsed().as_secs_f32(),
            volume,
            "#".repeat((volume * 40.0).round() as usize)
        );
        if app.should_exit() {
            app.running = false;
        }
    }

    if app.status.starts_with("Error") {
        return Err(app.status.clone().into());
    }
    Ok(())
}

/// Fetch/decode on a worker thread so the render loop starts immediately
fn start_playback<E: AudioEngine>(
    player: LipSyncPlayer<E>,
    source: String,
) -> Receiver<PlaybackStatus> {
    let (status_tx, status_rx) = unbounded();
    thread::spawn(move || {
        let ended_tx: Sender<PlaybackStatus> = status_tx.clone();
        let on_ended: OnEnded = Box::new(move || {
            let _ = ended_tx.send(PlaybackStatus::Ended);
        });

        let result = if is_url(&source) {
            player.play_from_url(&source, Some(on_ended))
        } else {
            std::fs::read(&source)
                .map_err(LipSyncError::from)
                .map(|bytes| {
                    let hint = detect_format_hint(&source, None);
                    player.play_from_buffer_with_hint(bytes, hint.as_deref(), Some(on_ended))
                })
        };

        let status = match result {
            Ok(()) => PlaybackStatus::Started,
            Err(e) => {
                log::warn!("Playback of {} failed: {}", source, e);
                PlaybackStatus::Failed(e.to_string())
            }
        };
        let _ = status_tx.send(status);
    });
    status_rx
}

fn is_url(source: &str) -> bool {
    let lower = source.to_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Redirects stderr to /dev/null until dropped
struct StderrSilencer {
    #[cfg(unix)]
    saved: libc::c_int,
}

impl StderrSilencer {
    #[cfg(unix)]
    fn engage() -> Self {
        use std::os::unix::io::AsRawFd;

        let saved = unsafe { libc::dup(2) };
        if let Ok(devnull) = std::fs::File::open("/dev/null") {
            unsafe { libc::dup2(devnull.as_raw_fd(), 2) };
        }
        Self { saved }
    }

    #[cfg(not(unix))]
    fn engage() -> Self {
        Self {}
    }
}

impl Drop for StderrSilencer {
    #[cfg(unix)]
    fn drop(&mut self) {
        if self.saved >= 0 {
            unsafe {
                libc::dup2(self.saved, 2);
                libc::close(self.saved);
            }
        }
    }

    #[cfg(not(unix))]
    fn drop(&mut self) {}
}

fn draw_ui(f: &mut Frame, app: &App) {
    let area = f.area();

    let outer = Block::default()
        .title(format!(" lipsync v{} ", env!("CARGO_PKG_VERSION")))
        .title_alignment(Alignment::Center)
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded);
    let inner = outer.inner(area);
    f.render_widget(outer, area);

    let chunks = Layout::vertical([
        Constraint::Length(3), // clip info
        Constraint::Min(9),    // mouth
        Constraint::Length(3), // gauge
        Constraint::Length(5), // history
        Constraint::Length(1), // help bar
    ])
    .split(inner);

    draw_info(f, app, chunks[0]);
    draw_mouth(f, app, chunks[1]);
    draw_gauge(f, app, chunks[2]);
    draw_history(f, app, chunks[3]);
    draw_help(f, chunks[4]);
}

fn draw_info(f: &mut Frame, app: &App, area: Rect) {
    let status_color = match app.status.as_str() {
        "Playing" => Color::Green,
        "Finished" => Color::DarkGray,
        s if s.starts_with("Error") => Color::Red,
        _ => Color::Yellow,
    };
    let elapsed = match app.started_at {
        Some(started) => format!("{:.1}s", started.elapsed().as_secs_f32()),
        None => "---".to_string(),
    };
    let max_len = area.width.saturating_sub(12) as usize;
    let text = vec![
        Line::from(vec![
            Span::styled("  Clip: ", Style::default().fg(Color::DarkGray)),
            Span::styled(
                truncate_str(&app.source, max_len),
                Style::default().fg(Color::White).bold(),
            ),
        ]),
        Line::from(vec![
            Span::styled("  Status: ", Style::default().fg(Color::DarkGray)),
            Span::styled(&app.status, Style::default().fg(status_color)),
            Span::raw("  "),
            Span::styled("Engine: ", Style::default().fg(Color::DarkGray)),
            Span::styled(app.engine_name, Style::default().fg(Color::White)),
            Span::raw("  "),
            Span::styled("Elapsed: ", Style::default().fg(Color::DarkGray)),
            Span::styled(elapsed, Style::default().fg(Color::White)),
        ]),
    ];
    f.render_widget(Paragraph::new(text), area);
}

fn draw_mouth(f: &mut Frame, app: &App, area: Rect) {
    let lines = mouth_lines(app.volume, 21, area.height.saturating_sub(2) as usize);
    let text: Vec<Line> = lines
        .into_iter()
        .map(|l| Line::styled(l, Style::default().fg(Color::LightRed)))
        .collect();

    // Vertically centre the mouth
    let pad = area.height.saturating_sub(text.len() as u16) / 2;
    let rect = Rect {
        y: area.y + pad,
        height: area.height - pad,
        ..area
    };
    f.render_widget(Paragraph::new(text).alignment(Alignment::Center), rect);
}

/// ASCII mouth opened proportionally to `volume`, at most `max_rows` tall
fn mouth_lines(volume: f32, width: usize, max_rows: usize) -> Vec<String> {
    let inner_rows = max_rows.saturating_sub(2);
    let open = ((volume.clamp(0.0, 1.0) * inner_rows as f32).round() as usize).min(inner_rows);
    if open == 0 {
        return vec!["─".repeat(width + 2)];
    }

    let mut lines = Vec::with_capacity(open + 2);
    lines.push(format!("╭{}╮", "─".repeat(width)));
    for _ in 0..open {
        lines.push(format!("│{}│", " ".repeat(width)));
    }
    lines.push(format!("╰{}╯", "─".repeat(width)));
    lines
}

fn draw_gauge(f: &mut Frame, app: &App, area: Rect) {
    let gauge = Gauge::default()
        .block(
            Block::default()
                .title(format!(" Volume (peak {:.2}) ", app.peak_volume))
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(Color::DarkGray)),
        )
        .gauge_style(Style::default().fg(Color::Cyan))
        .ratio(app.volume.clamp(0.0, 1.0) as f64)
        .label(format!("{:.3}", app.volume));
    f.render_widget(gauge, area);
}

fn draw_history(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" History ")
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::DarkGray));

    let sparkline = Sparkline::default()
        .block(block)
        .data(&app.history)
        .max(100)
        .style(Style::default().fg(Color::Cyan));

    f.render_widget(sparkline, area);
}

fn draw_help(f: &mut Frame, area: Rect) {
    let help = Line::from(vec![
        Span::styled("  'q' ", Style::default().fg(Color::Yellow)),
        Span::raw("quit"),
    ]);
    f.render_widget(Paragraph::new(help), area);
}

fn truncate_str(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else if max > 3 {
        let head: String = s.chars().take(max - 3).collect();
        format!("{}...", head)
    } else {
        s.chars().take(max).collect()
    }
}
