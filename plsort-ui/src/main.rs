//! plsort-ui - command-line front end for the playlist sorter
//!
//! Drives a plan session against the sorting service: log in, review the
//! generated plan, adjust overrides and execute while following progress.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use plsort_common::config::{ClientConfig, CliOverrides};
use plsort_common::{EventType, ProgressEvent};
use plsort_ui::{
    render, FileStorage, OverrideStore, PlanClient, PlanSession, SessionError, SessionUpdate,
    StreamObserver,
};
use tokio::signal;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for plsort-ui
#[derive(Parser, Debug)]
#[command(name = "plsort-ui")]
#[command(about = "Review and apply playlist sort plans")]
#[command(version)]
struct Args {
    /// Base URL of the sorting service
    #[arg(long, global = true)]
    server_url: Option<String>,

    /// Directory holding the saved session and overrides
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the URL that starts the login flow
    Login,
    /// Finish logging in with the token from the login callback
    CompleteLogin { token: String },
    /// End the session
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Show library statistics
    Stats,
    /// Run a full library analysis
    Analyze,
    /// Show the current overrides
    Overrides,
    /// Turn dry run on or off
    DryRun {
        #[arg(value_enum)]
        mode: Switch,
    },
    /// Select grouping suggestions
    Group {
        #[command(subcommand)]
        action: GroupAction,
    },
    /// Select which new playlists get created
    Playlist {
        #[command(subcommand)]
        action: PlaylistAction,
    },
    /// Generate and show a plan with the current overrides
    Plan,
    /// Generate a plan, execute it and follow its progress
    Execute,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Switch {
    On,
    Off,
    Toggle,
}

#[derive(Subcommand, Debug)]
enum GroupAction {
    /// Enable or disable one grouping by parent genre
    Toggle { key: String },
    /// Enable exactly these groupings (all suggested ones when none given)
    All { keys: Vec<String> },
    /// Disable every grouping
    #[command(name = "none")]
    Clear,
}

#[derive(Subcommand, Debug)]
enum PlaylistAction {
    /// Enable or disable creation of one playlist
    Toggle { name: String },
    /// Create every new playlist
    EnableAll,
    /// Skip exactly these playlists (all planned ones when none given)
    DisableAll { names: Vec<String> },
}

/// Prints progress lines as they arrive
struct ConsoleObserver;

impl StreamObserver for ConsoleObserver {
    fn on_progress(&mut self, event: &ProgressEvent) {
        println!("{}", render::event(event));
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let cli = CliOverrides {
        server_url: args.server_url.clone(),
        state_dir: args.state_dir.clone(),
        log_level: args.log_level.clone(),
    };
    let (config, warnings) = match ClientConfig::resolve_collecting(&cli) {
        Ok(resolved) => resolved,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config.log_level);
    for warning in &warnings {
        warning.log();
    }
    debug!(
        server_url = %config.server_url,
        state_dir = %config.state_dir.display(),
        "Configuration resolved"
    );

    match run(args.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<SessionError>() {
                Some(e) => eprintln!("Error: {}", e.user_message()),
                None => eprintln!("Error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr; RUST_LOG wins over the configured level
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("plsort_ui={level},plsort_common={level}")));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(command: Command, config: &ClientConfig) -> Result<()> {
    let mut client = PlanClient::from_config(config).context("Failed to create service client")?;

    match command {
        Command::Login => {
            let url = client.login_url().await?;
            println!("Open this URL to log in:\n  {url}");
            println!("Then run `plsort-ui complete-login <token>` with the token from the callback.");
        }
        Command::CompleteLogin { token } => {
            client.complete_login(&token).await?;
            let user = client.current_user().await?;
            println!("Logged in as {}", render::user(&user));
        }
        Command::Logout => {
            client.logout().await?;
            println!("Logged out");
        }
        Command::Whoami => println!("{}", render::user(&client.current_user().await?)),
        Command::Stats => print!("{}", render::stats(&client.library_stats().await?)),
        other => run_session(other, client, config).await?,
    }
    Ok(())
}

async fn run_session(command: Command, client: PlanClient, config: &ClientConfig) -> Result<()> {
    let store = OverrideStore::load(FileStorage::new(&config.state_dir));
    let client = Arc::new(client);
    let mut session =
        PlanSession::new(client.clone(), client, store).with_observer(ConsoleObserver);

    match command {
        Command::Analyze => {
            let analysis = session.analyze_library().await?;
            print!("{}", render::analysis(&analysis));
        }
        Command::Overrides => print!("{}", render::overrides(session.overrides().snapshot())),
        Command::DryRun { mode } => {
            match mode {
                Switch::On => session.set_dry_run(true),
                Switch::Off => session.set_dry_run(false),
                Switch::Toggle => session.toggle_dry_run(),
            }
            println!("Dry run: {}", if session.overrides().is_dry_run() { "on" } else { "off" });
        }
        Command::Group { action } => {
            match action {
                GroupAction::Toggle { key } => {
                    let enabled = session.toggle_group(&key);
                    println!("Group {key}: {}", if enabled { "enabled" } else { "disabled" });
                }
                GroupAction::All { keys } if keys.is_empty() => {
                    session.generate_plan().await?;
                    session.enable_all_groups();
                }
                GroupAction::All { keys } => session.enable_groups(keys),
                GroupAction::Clear => session.disable_all_groups(),
            }
            print!("{}", render::overrides(session.overrides().snapshot()));
        }
        Command::Playlist { action } => {
            match action {
                PlaylistAction::Toggle { name } => {
                    let enabled = session.toggle_playlist(&name);
                    println!("Playlist {name}: {}", if enabled { "will be created" } else { "skipped" });
                }
                PlaylistAction::EnableAll => session.enable_all_playlists(),
                PlaylistAction::DisableAll { names } if names.is_empty() => {
                    session.generate_plan().await?;
                    session.disable_all_playlists();
                }
                PlaylistAction::DisableAll { names } => session.disable_playlists(names),
            }
            print!("{}", render::overrides(session.overrides().snapshot()));
        }
        Command::Plan => {
            session.generate_plan().await?;
            if let Some(plan) = session.plan() {
                print!("{}", render::plan(plan, session.view()));
            }
        }
        Command::Execute => execute(&mut session).await?,
        other => bail!("{other:?} does not run in a plan session"),
    }

    session.shutdown();
    Ok(())
}

async fn execute(session: &mut PlanSession<Arc<PlanClient>, Arc<PlanClient>>) -> Result<()> {
    if session.overrides().is_dry_run() {
        bail!("Dry run is on. Run `plsort-ui dry-run off` to allow execution.");
    }

    let plan = session.generate_plan().await?;
    if plan.is_empty() {
        println!("Nothing to change.");
        return Ok(());
    }
    println!(
        "Executing plan {}: {} to add, {} to remove, {} playlists to create",
        plan.id,
        plan.tracks_to_add.len(),
        plan.tracks_to_remove.len(),
        plan.playlists_to_create.len()
    );

    session.execute_plan().await?;

    loop {
        tokio::select! {
            update = session.pump() => match update {
                // Progress lines are printed by the observer
                SessionUpdate::Event(event) => {
                    if event.kind != EventType::Progress {
                        println!("{}", render::event(&event));
                    }
                }
                SessionUpdate::Completed { plan_refreshed, .. } => {
                    if let Some(event) = session.stream().latest_event() {
                        println!("{}", render::event(event));
                    }
                    if let (true, Some(summary)) = (plan_refreshed, &session.view().summary) {
                        println!(
                            "Remaining: {} to add, {} to remove, {} playlists to create",
                            summary.tracks_to_add, summary.tracks_to_remove, summary.playlists_to_create
                        );
                    }
                    return Ok(());
                }
                SessionUpdate::Failed { message, .. } => bail!("Execution failed: {message}"),
                SessionUpdate::Idle => return Ok(()),
            },
            _ = signal::ctrl_c() => {
                session.close_stream();
                info!("Interrupted; stopped following execution");
                println!("Stopped following; the service continues the execution.");
                return Ok(());
            }
        }
    }
}
