mod backends;
mod config;
mod control;
mod correlator;
mod keybindings;
mod parser;
mod tunnel;
mod ui;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::interval;

use crate::config::Config;
use crate::correlator::Correlator;
use crate::tunnel::TunnelTable;
use crate::ui::AppState;

/// Tunnelmon - a monitor for SSH tunnels managed with autossh
///
/// Called without options, prints the current tunnels to standard output.
/// Note: users other than root will not see tunnel connections.
#[derive(Parser, Debug)]
#[command(name = "tunnelmon")]
#[command(version = "0.1.0")]
#[command(about = "Monitor SSH port-forwarding tunnels and their autossh supervisors", long_about = None)]
struct Args {
    /// Start the interactive dashboard instead of printing a listing
    #[arg(short = 'c', long)]
    dashboard: bool,

    /// Display only the SSH connections related to a tunnel
    #[arg(short = 'n', long)]
    connections: bool,

    /// Display only the list of tunnel processes
    #[arg(short = 'u', long)]
    tunnels: bool,

    /// Log level
    #[arg(short = 'l', long, value_enum, default_value = "error", value_name = "LEVEL")]
    log_level: LogLevel,

    /// Log to this file instead of standard error
    #[arg(short = 'g', long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Use this configuration file (default: ~/.config/tunnelmon/config.json)
    #[arg(short = 'f', long, value_name = "FILE")]
    config_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
enum LogLevel {
    Error,
    Warning,
    Debug,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warning => log::LevelFilter::Warn,
            LogLevel::Debug => log::LevelFilter::Debug,
        }
    }
}

fn init_logging(args: &Args) -> Result<()> {
    let mut builder = pretty_env_logger::formatted_builder();
    builder.filter_level(args.log_level.into());
    builder.parse_default_env();

    if let Some(path) = &args.log_file {
        let file = std::fs::File::create(path)?;
        builder.target(pretty_env_logger::env_logger::Target::Pipe(Box::new(file)));
    }

    builder.try_init()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;
    log::debug!("----- Started Tunnelmon -----");

    if args.dashboard && args.log_file.is_none() {
        log::warn!("logging to standard error interferes with the dashboard; consider --log-file");
    }

    let config = Config::load(args.config_file.as_deref()).unwrap_or_else(|err| {
        log::error!("{:#}", err);
        Config::default()
    });

    let source = backends::process::create_process_source();
    let mut correlator = Correlator::new(source, &config);

    if args.dashboard {
        return run_dashboard(correlator, &config).await;
    }

    // One-shot listing modes share a single scan.
    correlator.update()?;
    let table = correlator.table();

    if args.connections {
        for tunnel in table.iter() {
            for conn in &tunnel.connections {
                println!("{}\t{}", tunnel.ssh_pid, conn);
            }
        }
    } else if args.tunnels {
        println!("{}", TunnelTable::header());
        for tunnel in table.iter() {
            println!("{}", tunnel.render_row());
        }
    } else {
        println!("{}", table.render_listing());
    }

    Ok(())
}

async fn run_dashboard(mut correlator: Correlator, config: &Config) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = AppState::new(config.show_connections);

    let res = run_app(&mut terminal, &mut app, &mut correlator, config).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        log::error!("Error: {:?}", err);
    }

    Ok(())
}

async fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut AppState,
    correlator: &mut Correlator,
    config: &Config,
) -> Result<()> {
    let mut update_interval = interval(Duration::from_millis(config.update_delay_ms.max(1)));

    // Change detection for the debug log, threaded through the loop as
    // explicit state.
    let mut last_state: Option<String> = None;
    let mut unchanged_scans = 0u32;

    loop {
        terminal.draw(|f| ui::draw_ui(f, app, correlator.table()))?;

        // Handle input with timeout
        if event::poll(Duration::from_millis(config.poll_delay_ms))? {
            if let Event::Key(key) = event::read()? {
                // ALWAYS check Ctrl+C first - force quit regardless of modal state
                if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
                    return Ok(());
                }

                // If help is shown, any key closes it
                if app.show_help {
                    app.show_help = false;
                    continue;
                }

                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => {
                        return Ok(());
                    }
                    KeyCode::Char('h') | KeyCode::Char('?') => {
                        app.show_help = true;
                    }
                    KeyCode::Char('n') => {
                        app.show_connections = !app.show_connections;
                    }
                    KeyCode::Down | KeyCode::Char('j') => {
                        app.select_next(correlator.table().len());
                    }
                    KeyCode::Up | KeyCode::Char('k') => {
                        app.select_previous(correlator.table().len());
                    }
                    KeyCode::Char('r') => {
                        app.status_message = match app.selected_tunnel(correlator.table()) {
                            Some(tunnel) => match control::reload(tunnel) {
                                Ok(true) => format!(
                                    "Reload signal sent to supervisor (pid {})",
                                    tunnel.key()
                                ),
                                Ok(false) => "Raw tunnels cannot be reloaded".to_string(),
                                Err(err) => format!("Reload failed: {}", err),
                            },
                            None => "No tunnel selected".to_string(),
                        };
                    }
                    KeyCode::Char('t') => {
                        app.status_message = match app.selected_tunnel(correlator.table()) {
                            Some(tunnel) => match control::terminate(tunnel) {
                                Ok(()) => {
                                    format!("Terminated tunnel (ssh pid {})", tunnel.ssh_pid)
                                }
                                Err(err) => format!("Terminate failed: {}", err),
                            },
                            None => "No tunnel selected".to_string(),
                        };
                    }
                    _ => {}
                }
            }
        }

        // Rebuild the tunnel table periodically
        if tokio::time::timeout(Duration::from_millis(1), update_interval.tick())
            .await
            .is_ok()
        {
            match correlator.update() {
                Ok(()) => {
                    app.last_scan = Some(chrono::Local::now().format("%H:%M:%S").to_string());
                    app.clamp_selection(correlator.table().len());

                    let state = correlator.table().render_listing();
                    if last_state.as_deref() != Some(state.as_str()) {
                        if unchanged_scans > 0 {
                            log::debug!("table unchanged for {} scan(s)", unchanged_scans);
                            unchanged_scans = 0;
                        }
                        log::debug!("tunnel table:\n{}", state);
                        last_state = Some(state);
                    } else {
                        unchanged_scans += 1;
                    }

                    // Keep action feedback visible until the next keypress.
                    if !app.status_message.starts_with("Reload")
                        && !app.status_message.starts_with("Terminate")
                        && !app.status_message.starts_with("Raw")
                    {
                        app.status_message = if correlator.table().is_empty() {
                            "No tunnels found".to_string()
                        } else {
                            format!("Monitoring {} tunnel(s)", correlator.table().len())
                        };
                    }
                }
                Err(err) => {
                    log::warn!("scan failed: {}", err);
                    app.status_message =
                        format!("Scan failed: {} (showing last good snapshot)", err);
                }
            }
        }
    }
}
