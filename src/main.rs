//! QuadBlox - falling blocks with lobby versus play
//!
//! `play` runs a local game, `versus` joins a lobby on a QuadBlox server and
//! `serve` hosts one.

mod ui;

use clap::{Parser, Subcommand, ValueEnum};
use crossterm::{
    event::{
        self, Event, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
        PushKeyboardEnhancementFlags,
    },
    execute,
    terminal::{
        EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
        supports_keyboard_enhancement,
    },
};
use quadblox::controller::{Controller, ControllerConfig};
use quadblox::input::{InputCollector, Key, KeyBindings};
use quadblox::leaderboard::Leaderboard;
use quadblox::mode::{GameMode, format_frames};
use quadblox::server::LobbyServer;
use quadblox::session::{ServerState, SessionManager};
use quadblox::settings::Settings;
use quadblox::sync::{SyncConfig, SyncLink, SyncWorker, submit_run};
use quadblox::transport::{LobbyClient, TcpTransport};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::io::{self, Stdout, stdout};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::runtime::{Handle, Runtime};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use ui::{VersusView, View};

/// Target frame rate
const TARGET_FPS: u64 = 60;
const FRAME_DURATION: Duration = Duration::from_micros(1_000_000 / TARGET_FPS);

/// How long a line clear name stays on screen
const CLEAR_TEXT_FRAMES: u32 = 90;

type Tui = Terminal<CrosstermBackend<Stdout>>;

#[derive(Parser)]
#[command(name = "quadblox", version, about = "Falling blocks with lobby versus play")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Play a local game
    Play {
        #[arg(long, value_enum, default_value_t = ModeArg::Marathon)]
        mode: ModeArg,
        /// Seed for the piece sequence
        #[arg(long)]
        seed: Option<u64>,
        /// Submit completed time attack runs to this server
        #[arg(long)]
        server: Option<String>,
    },
    /// Join a lobby and play versus
    Versus {
        /// Server address (defaults to the settings file)
        #[arg(long)]
        server: Option<String>,
        /// Lobby id
        #[arg(long)]
        game: Option<u32>,
        /// Player name
        #[arg(long)]
        name: Option<String>,
    },
    /// Host a lobby server
    Serve {
        #[arg(long, default_value = "0.0.0.0:7878")]
        bind: String,
        /// Number of lobbies
        #[arg(long, default_value_t = 4)]
        lobbies: usize,
        /// JSON file the leaderboard is loaded from and saved to
        #[arg(long)]
        leaderboard: Option<PathBuf>,
        /// Seconds before a silent seat is recycled
        #[arg(long, default_value_t = 30)]
        seat_timeout: u64,
    },
    /// List the lobbies on a server
    Lobbies {
        #[arg(long)]
        server: Option<String>,
    },
    /// Show a server's time attack leaderboard
    Leaderboard {
        #[arg(long)]
        server: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Marathon,
    TimeAttack,
}

impl From<ModeArg> for GameMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Marathon => GameMode::Marathon,
            ModeArg::TimeAttack => GameMode::TimeAttack,
        }
    }
}

/// Lobby connection used while a game runs
struct Lobby {
    game_id: u32,
    seat: usize,
    link: SyncLink,
}

fn main() -> io::Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::load();

    match cli.command.unwrap_or(Command::Play {
        mode: ModeArg::Marathon,
        seed: None,
        server: None,
    }) {
        Command::Serve {
            bind,
            lobbies,
            leaderboard,
            seat_timeout,
        } => {
            init_stdout_logging();
            serve(&bind, lobbies, leaderboard, Duration::from_secs(seat_timeout))
        }
        Command::Lobbies { server } => {
            init_stdout_logging();
            let client = client_for(&settings, server);
            let lobbies = Runtime::new()?
                .block_on(client.list_lobbies())
                .map_err(io::Error::other)?;
            for lobby in lobbies {
                println!("{:>3}  {:<12} {}/9", lobby.id, lobby.name, lobby.occupied);
            }
            Ok(())
        }
        Command::Leaderboard { server } => {
            init_stdout_logging();
            let client = client_for(&settings, server);
            let entries = Runtime::new()?
                .block_on(client.leaderboard())
                .map_err(io::Error::other)?;
            for (rank, entry) in entries.iter().enumerate() {
                println!(
                    "{:>2}. {:<16} {:>9.3}s  {} pieces  {} points",
                    rank + 1,
                    entry.player,
                    entry.time,
                    entry.pieces,
                    entry.score
                );
            }
            Ok(())
        }
        Command::Play { mode, seed, server } => {
            let _guard = init_file_logging();
            let runtime = Runtime::new()?;
            let submit_to = server.map(|addr| client_for(&settings, Some(addr)));
            let config = controller_config(&settings, mode.into(), seed);
            let controller = Controller::new(config);
            let result = with_terminal(|terminal| {
                run_game(terminal, &settings, controller, None, submit_to, runtime.handle())
            });
            finish(&mut settings, result)
        }
        Command::Versus { server, game, name } => {
            let _guard = init_file_logging();
            // Command line overrides are not written back to the settings file
            let mut session = settings.clone();
            if let Some(name) = name {
                session.network.player_name = name;
            }
            if let Some(game) = game {
                session.network.game_id = game;
            }
            let runtime = Runtime::new()?;
            let client = client_for(&session, server);
            let result = with_terminal(|terminal| {
                run_versus(terminal, &session, client, runtime.handle())
            });
            finish(&mut settings, result)
        }
    }
}

/// Log to a per-session file so the terminal UI stays clean
fn init_file_logging() -> tracing_appender::non_blocking::WorkerGuard {
    let session_id: u32 = rand::random();
    let log_dir = std::env::temp_dir().join("quadblox");
    let _ = std::fs::create_dir_all(&log_dir);
    let log_file = format!("{:08x}.log", session_id);

    let file_appender = tracing_appender::rolling::never(&log_dir, &log_file);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter())
        .with_ansi(false)
        .init();

    tracing::info!(
        "QuadBlox starting up, session={:08x}, log={}",
        session_id,
        log_dir.join(&log_file).display()
    );
    guard
}

fn init_stdout_logging() {
    tracing_subscriber::fmt().with_env_filter(env_filter()).init();
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("quadblox=debug"))
}

fn client_for(settings: &Settings, server: Option<String>) -> LobbyClient<TcpTransport> {
    let addr = server.unwrap_or_else(|| settings.network.server_addr.clone());
    LobbyClient::new(TcpTransport::new(addr, settings.network.request_timeout()))
}

fn controller_config(settings: &Settings, mode: GameMode, seed: Option<u64>) -> ControllerConfig {
    ControllerConfig {
        mode,
        das: settings.gameplay.das_timing(),
        seed: seed.unwrap_or_else(rand::random),
        player: settings.network.player_name.clone(),
    }
}

/// Set up the terminal, run `f`, and restore the terminal whatever happens
fn with_terminal<T>(f: impl FnOnce(&mut Tui) -> io::Result<T>) -> io::Result<T> {
    enable_raw_mode()?;
    execute!(stdout(), EnterAlternateScreen)?;
    // Release events let held keys end exactly; without them keys time out
    let enhanced = supports_keyboard_enhancement().unwrap_or(false);
    if enhanced {
        execute!(
            stdout(),
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
        )?;
    }

    let result = Terminal::new(CrosstermBackend::new(stdout())).and_then(|mut terminal| {
        terminal.clear()?;
        f(&mut terminal)
    });

    if enhanced {
        execute!(stdout(), PopKeyboardEnhancementFlags)?;
    }
    disable_raw_mode()?;
    execute!(stdout(), LeaveAlternateScreen)?;
    result
}

fn finish(settings: &mut Settings, result: io::Result<Option<Controller>>) -> io::Result<()> {
    if let Err(e) = settings.save() {
        eprintln!("Warning: Could not save settings: {}", e);
    }

    if let Ok(Some(controller)) = &result {
        let score = &controller.board.score;
        println!("\nThanks for playing QuadBlox!");
        println!("Mode: {}", controller.mode().name());
        println!("Score: {} | Level: {} | Lines: {}", score.points, score.level, score.lines);
        if let Some(record) = controller.run_record() {
            println!("Time: {}", format_frames(record.frames));
        }
    }
    result.map(|_| ())
}

/// Seat in a lobby, then play with a sync worker running alongside
fn run_versus(
    terminal: &mut Tui,
    settings: &Settings,
    client: LobbyClient<TcpTransport>,
    rt: &Handle,
) -> io::Result<Option<Controller>> {
    let game_id = settings.network.game_id;
    terminal.draw(|frame| {
        ui::render_message(frame, "VERSUS", &format!("Joining lobby {}...", game_id + 1))
    })?;

    let ticket = match rt.block_on(client.seat(game_id)) {
        Ok(Some(ticket)) => ticket,
        Ok(None) => return show_and_wait(terminal, "Lobby is full"),
        Err(e) => {
            tracing::error!("Could not join lobby {}: {}", game_id, e);
            return show_and_wait(terminal, &format!("Could not join: {}", e));
        }
    };

    let link = SyncLink::new();
    let sync_config = SyncConfig {
        game_id,
        ticket,
        poll_interval: settings.network.poll_interval(),
    };
    let worker = SyncWorker::spawn(rt, client, sync_config, link.clone());

    let config = controller_config(settings, GameMode::Versus, None);
    let lobby = Lobby {
        game_id,
        seat: ticket.seat,
        link,
    };
    let result = run_game(terminal, settings, Controller::new(config), Some(lobby), None, rt);

    worker.shutdown_blocking(rt);
    result
}

fn show_and_wait(terminal: &mut Tui, message: &str) -> io::Result<Option<Controller>> {
    terminal.draw(|frame| ui::render_message(frame, "VERSUS", message))?;
    loop {
        if let Event::Key(_) = event::read()? {
            return Ok(None);
        }
    }
}

/// The fixed-rate game loop
fn run_game(
    terminal: &mut Tui,
    settings: &Settings,
    mut controller: Controller,
    lobby: Option<Lobby>,
    submit_to: Option<LobbyClient<TcpTransport>>,
    rt: &Handle,
) -> io::Result<Option<Controller>> {
    let release_events = supports_keyboard_enhancement().unwrap_or(false);
    let mut input = InputCollector::new(KeyBindings::from_settings(settings), release_events);
    let mut paused = false;
    let mut last_clear: Option<(&'static str, u32)> = None;
    let mut next_frame = Instant::now();

    loop {
        let opponents = lobby
            .as_ref()
            .map(|l| l.link.opponents())
            .unwrap_or_default();
        terminal.draw(|frame| {
            let view = View {
                controller: &controller,
                settings,
                paused,
                last_clear: last_clear.map(|(text, _)| text),
                versus: lobby.as_ref().map(|l| VersusView {
                    game_id: l.game_id,
                    seat: l.seat,
                    opponents: &opponents,
                }),
            };
            ui::render_game(frame, &view);
        })?;

        // Collect events until the next logic tick is due
        next_frame += FRAME_DURATION;
        loop {
            let wait = next_frame.saturating_duration_since(Instant::now());
            if !event::poll(wait)? {
                break;
            }
            if let Event::Key(key) = event::read()? {
                input.key_event(key);
            }
        }
        // Don't try to catch up after a stall
        let now = Instant::now();
        if now > next_frame + FRAME_DURATION {
            next_frame = now;
        }

        let frame_input = input.frame();
        if frame_input.pressed(Key::Quit) {
            break;
        }
        if frame_input.pressed(Key::Pause) && lobby.is_none() && !controller.is_game_over() {
            paused = !paused;
            input.clear();
            tracing::debug!("Paused: {}", paused);
        }

        if !paused {
            let report = controller.update(&frame_input);
            if let Some(placement) = &report.placement {
                if let Some(text) = clear_name(placement.cleared.len()) {
                    last_clear = Some((text, CLEAR_TEXT_FRAMES));
                }
            }
            if let Some(record) = report.run_complete {
                if let Some(client) = &submit_to {
                    submit_run(rt, client.clone(), record);
                }
            }
            last_clear = last_clear.and_then(|(text, frames)| {
                frames.checked_sub(1).filter(|&f| f > 0).map(|f| (text, f))
            });
        }

        if let Some(lobby) = &lobby {
            let received = lobby.link.publish(&mut controller.board);
            if received > 0 {
                tracing::debug!("Queued {} incoming lines", received);
            }
        }
    }

    if let Some(lobby) = &lobby {
        // Pushed by the worker as it shuts down
        lobby.link.publish(&mut controller.board);
    }

    Ok(Some(controller))
}

fn clear_name(lines: usize) -> Option<&'static str> {
    match lines {
        1 => Some("SINGLE"),
        2 => Some("DOUBLE"),
        3 => Some("TRIPLE"),
        4 => Some("QUAD!"),
        _ => None,
    }
}

/// Run a lobby server until Ctrl+C
fn serve(
    bind: &str,
    lobbies: usize,
    leaderboard: Option<PathBuf>,
    seat_timeout: Duration,
) -> io::Result<()> {
    let mut state = ServerState::new(SessionManager::new(lobbies, seat_timeout));
    if let Some(path) = leaderboard {
        state.leaderboard = Leaderboard::load(&path)?;
        tracing::info!(
            "Loaded {} leaderboard entries from {}",
            state.leaderboard.entries().len(),
            path.display()
        );
        state.leaderboard_path = Some(path);
    }

    let runtime = Runtime::new()?;
    runtime.block_on(async {
        let server = LobbyServer::bind(bind, state)
            .await
            .map_err(io::Error::other)?;
        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = stop_tx.send(true);
            }
        });
        server.run(stop_rx).await.map_err(io::Error::other)
    })
}
