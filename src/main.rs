//! midistep - step through a MIDI file one chord at a time on a MIDI keyboard.
//!
//! The song is shown as a piano roll above an on-screen keyboard. The player
//! only advances once every required note is held, which makes it a practice
//! tool for learning pieces at your own pace.
//!
//! # Usage
//!
//! ```bash
//! midistep song.mid            # Load and play a file
//! midistep                     # Pick a file first
//! midistep -t -2 song.mid      # Transpose down two semitones
//! ```
//!
//! Press `h` for help with keyboard shortcuts.

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use midistep::app::{App, CacheSlot};
use midistep::browser::FileBrowser;
use midistep::cache::SettingsCache;
use midistep::config::Config;
use midistep::controller::spawn_device_watch;
use midistep::interactor::ESC;
use midistep::midi::{parse_midi, ImportedSong};
use midistep::ui;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use std::fs::File;
use std::io::{self, Stdout};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// How long the input thread waits for a terminal event before rechecking shutdown.
const INPUT_POLL: Duration = Duration::from_millis(16);

/// Command-line options for the application.
#[derive(Debug, Default)]
struct CliOptions {
    /// MIDI file to open; the file browser is shown when absent.
    path: Option<PathBuf>,
    /// Semitones added to every note.
    transpose: i8,
    /// File to write log output to.
    log: Option<PathBuf>,
    /// Skip reading and writing remembered settings.
    no_cache: bool,
    /// Frames per second.
    fps: Option<u32>,
}

impl CliOptions {
    /// Parses command-line arguments.
    ///
    /// Supports:
    /// - `<path>`: MIDI file to open
    /// - `--transpose <n>` or `-t <n>`: Transpose by n semitones
    /// - `--log <path>`: Write logs to a file
    /// - `--no-cache`: Do not remember settings between sessions
    /// - `--fps <n>`: Redraw rate
    /// - `--help` or `-h`: Print help and exit
    fn parse() -> Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        let mut options = Self::default();
        let mut i = 1;

        while i < args.len() {
            match args[i].as_str() {
                "--transpose" | "-t" => {
                    i += 1;
                    let raw = flag_value(&args, i, "--transpose")?;
                    options.transpose = raw
                        .parse()
                        .with_context(|| format!("invalid transpose: {raw}"))?;
                }
                "--log" => {
                    i += 1;
                    options.log = Some(PathBuf::from(flag_value(&args, i, "--log")?));
                }
                "--no-cache" => options.no_cache = true,
                "--fps" => {
                    i += 1;
                    let raw = flag_value(&args, i, "--fps")?;
                    let fps = raw.parse::<u32>().with_context(|| format!("invalid fps: {raw}"))?;
                    options.fps = Some(fps);
                }
                "--help" | "-h" => {
                    print_usage(args.first().map_or("midistep", String::as_str));
                    std::process::exit(0);
                }
                other if other.starts_with('-') => {
                    eprintln!("Unknown option: {}", other);
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
                other => {
                    if options.path.is_some() {
                        anyhow::bail!("only one MIDI file can be opened, got another: {other}");
                    }
                    options.path = Some(PathBuf::from(other));
                }
            }
            i += 1;
        }

        Ok(options)
    }
}

/// The argument following a flag.
fn flag_value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str> {
    args.get(i)
        .map(String::as_str)
        .with_context(|| format!("{flag} requires an argument"))
}

fn print_usage(program: &str) {
    eprintln!("midistep - practise MIDI files on a MIDI keyboard");
    eprintln!();
    eprintln!("Usage: {} [OPTIONS] [FILE.mid]", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -t, --transpose N   Transpose the song by N semitones");
    eprintln!("      --log PATH      Write log output to PATH (filter with RUST_LOG)");
    eprintln!("      --no-cache      Do not restore or save per-song settings");
    eprintln!("      --fps N         Redraw rate (default 30)");
    eprintln!("  -h, --help          Print this help message");
    eprintln!();
    eprintln!("Without a file, a file browser is opened in the current directory.");
}

/// Sends log output to `path`, or nowhere.
///
/// The terminal belongs to the UI, so logs never go to stdout or stderr.
fn init_logging(path: Option<&Path>) -> Result<()> {
    let writer = match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(io::sink),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    // Parse CLI options first (before any terminal setup)
    let cli = CliOptions::parse()?;
    init_logging(cli.log.as_deref())?;

    let mut config = Config {
        transpose: cli.transpose,
        ..Config::default()
    };
    if let Some(fps) = cli.fps {
        config.fps = fps;
    }
    if cli.no_cache {
        config.cache_dir = None;
    }

    let (width, _) = crossterm::terminal::size().context("Failed to query terminal size")?;
    config.check_terminal_width(width)?;

    // A file given on the command line is parsed before the screen is taken over
    let preloaded = match &cli.path {
        Some(path) => Some(read_song(path)?),
        None => None,
    };

    let mut terminal = setup_terminal().context("Failed to setup terminal")?;

    let (imported, bytes) = match preloaded {
        Some(loaded) => loaded,
        None => {
            let picked = run_file_browser(&mut terminal);
            match picked {
                Ok(Some(path)) => match read_song(&path) {
                    Ok(loaded) => loaded,
                    Err(e) => {
                        restore_terminal(&mut terminal)?;
                        return Err(e);
                    }
                },
                Ok(None) => {
                    // User cancelled - exit cleanly
                    restore_terminal(&mut terminal)?;
                    return Ok(());
                }
                Err(e) => {
                    restore_terminal(&mut terminal)?;
                    return Err(e);
                }
            }
        }
    };

    let result = run_session(&mut terminal, &config, imported, &bytes);

    restore_terminal(&mut terminal).context("Failed to restore terminal")?;
    result
}

/// Reads and parses a MIDI file.
///
/// # Returns
///
/// The parsed song and the raw bytes, which key the settings cache
fn read_song(path: &Path) -> Result<(ImportedSong, Vec<u8>)> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let imported = parse_midi(song_name(path), &bytes)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    Ok((imported, bytes))
}

fn song_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Untitled")
        .to_string()
}

/// Plays one song until the user quits.
fn run_session(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    config: &Config,
    imported: ImportedSong,
    bytes: &[u8],
) -> Result<()> {
    let cache = config.cache_dir.as_ref().map(|dir| CacheSlot {
        cache: SettingsCache::new(dir),
        key: SettingsCache::key_for(&imported.name, bytes),
    });

    let (app, worker) = App::new(imported, config, cache);
    let app = Arc::new(app);
    let running = app.running_flag();

    let worker_handle = {
        let app = Arc::clone(&app);
        let running = Arc::clone(&running);
        thread::spawn(move || worker.run(app.player_mutex(), &running))
    };
    let watch_handle = spawn_device_watch(
        Arc::clone(app.coordinator()),
        config.device_poll_interval,
        config.attach_debounce,
        Arc::clone(&running),
    );
    let input_handle = {
        let app = Arc::clone(&app);
        thread::spawn(move || run_input(&app))
    };

    let result = run_render_loop(terminal, &app, config.frame_interval());

    // Whatever ended the loop, the other threads must stop too
    app.quit();
    for (name, handle) in [
        ("input", input_handle),
        ("check worker", worker_handle),
        ("device watch", watch_handle),
    ] {
        if handle.join().is_err() {
            tracing::error!(thread = name, "thread panicked");
        }
    }

    app.save_settings();
    result
}

/// Reads terminal key events and feeds them to the app.
fn run_input(app: &App) {
    while app.is_running() {
        match event::poll(INPUT_POLL) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                tracing::error!(error = %e, "failed to poll terminal events");
                app.quit();
                break;
            }
        }
        let key = match event::read() {
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => key,
            Ok(_) => continue,
            Err(e) => {
                tracing::error!(error = %e, "failed to read terminal event");
                app.quit();
                break;
            }
        };

        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => app.quit(),
            KeyCode::Esc => app.handle_char(ESC),
            KeyCode::Char(c) => app.handle_char(c),
            _ => {}
        }
    }
}

/// Draws frames at a fixed rate until the app stops running.
fn run_render_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &App,
    frame_interval: Duration,
) -> Result<()> {
    let mut next_frame = Instant::now();
    while app.is_running() {
        let now = Instant::now();
        app.tick(now);

        let view = app.view();
        terminal.draw(|frame| ui::render(frame, app.song(), &view))?;

        next_frame += frame_interval;
        let now = Instant::now();
        if next_frame > now {
            thread::sleep(next_frame - now);
        } else {
            // Fell behind; do not try to catch up
            next_frame = now;
        }
    }
    Ok(())
}

/// Lets the user pick a MIDI file.
///
/// # Returns
///
/// The chosen file, or `None` if the user cancelled
fn run_file_browser(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
) -> Result<Option<PathBuf>> {
    let start = std::env::current_dir().context("Failed to read current directory")?;
    let mut browser = FileBrowser::new(start);

    loop {
        terminal.draw(|frame| ui::render_file_browser(frame, &browser))?;

        if !event::poll(INPUT_POLL)? {
            continue;
        }
        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    return Ok(None)
                }
                KeyCode::Esc | KeyCode::Char('q') => return Ok(None),
                KeyCode::Up | KeyCode::Char('k') => browser.move_up(),
                KeyCode::Down | KeyCode::Char('j') => browser.move_down(),
                KeyCode::Enter => {
                    if let Some(path) = browser.select() {
                        return Ok(Some(path));
                    }
                }
                _ => {}
            }
        }
    }
}

/// Sets up the terminal for TUI rendering.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("Failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend).context("Failed to create terminal")?;
    Ok(terminal)
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode().context("Failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("Failed to leave alternate screen")?;
    terminal.show_cursor().context("Failed to show cursor")?;
    Ok(())
}
