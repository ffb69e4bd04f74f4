use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lifeline::app::keyboard_input::KeyboardInputHandler;
use lifeline::{
    Command, EmergencyProfile, EventFilter, EventReceiver, LifelineConfig, PhotoData,
    ProfileEvent,
};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "lifeline")]
#[command(about = "Emergency contact profile with call log, photo and camera capture")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "lifeline.toml")]
    config: String,

    /// Enable debug level logging
    #[arg(short, long)]
    debug: bool,

    /// Enable info level logging
    #[arg(short, long)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    /// Log output format: json, pretty, or compact
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<String>,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Print default configuration in TOML format and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration file and exit
    #[arg(long)]
    validate_config: bool,

    #[command(subcommand)]
    command: Option<Action>,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Dial a number and record the attempt
    Call { number: String },
    /// Call a contact after confirmation
    Emergency {
        number: String,
        name: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Show the call log
    Log {
        /// Print the raw JSON document
        #[arg(long)]
        json: bool,
    },
    /// Manage the profile photo
    Photo {
        #[command(subcommand)]
        action: PhotoAction,
    },
    /// Refresh the "last updated" stamp
    Touch,
    /// Drive the profile from the keyboard
    Interactive,
}

#[derive(Subcommand, Debug)]
enum PhotoAction {
    /// Use an image file as the profile photo
    Upload { path: PathBuf },
    /// Take the profile photo with the camera
    Capture,
    /// Go back to the default photo
    Reset,
    /// Describe the current photo
    Show,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("Starting lifeline v{}", env!("CARGO_PKG_VERSION"));

    let config = LifelineConfig::load_from_file(&args.config).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }
    config.validate()?;

    let profile = EmergencyProfile::open(&config)
        .with_context(|| format!("Failed to open profile storage at {}", config.storage.path))?;

    match args.command.unwrap_or(Action::Interactive) {
        Action::Call { number } => run_commands(&profile, vec![Command::Call { number }]).await,
        Action::Emergency { number, name, yes } => {
            run_commands(
                &profile,
                vec![Command::EmergencyCall {
                    number,
                    contact_name: name,
                }],
            )
            .await?;

            let confirmed = match profile.pending_call() {
                Some(pending) if !yes => {
                    confirm(&format!(
                        "Call {} at {}? [y/N] ",
                        pending.contact_name, pending.display_number
                    ))
                    .await?
                }
                _ => true,
            };
            let next = if confirmed {
                Command::ConfirmCall
            } else {
                Command::CancelCall
            };
            run_commands(&profile, vec![next]).await
        }
        Action::Log { json } => print_call_log(&profile, json),
        Action::Photo { action } => match action {
            PhotoAction::Upload { path } => {
                run_commands(&profile, vec![Command::UploadPhoto { path }]).await
            }
            PhotoAction::Capture => {
                run_commands(&profile, vec![Command::OpenCamera, Command::CapturePhoto]).await
            }
            PhotoAction::Reset => run_commands(&profile, vec![Command::ResetPhoto]).await,
            PhotoAction::Show => {
                print_photo(&profile);
                Ok(())
            }
        },
        Action::Touch => run_commands(&profile, vec![Command::UpdateTimestamp]).await,
        Action::Interactive => run_interactive(&profile, &config).await,
    }
}

/// Dispatch commands in order, echoing the events and notifications they produce
async fn run_commands(profile: &EmergencyProfile, commands: Vec<Command>) -> Result<()> {
    let mut receiver = profile.events().subscribe_filtered(EventFilter::All, "cli");

    for command in commands {
        let result = profile.dispatch(command).await;
        print_events(&mut receiver, "\n");
        if let Err(e) = result {
            profile.dispatch(Command::Navigate).await?;
            print_events(&mut receiver, "\n");
            return Err(e.into());
        }
    }
    Ok(())
}

async fn run_interactive(profile: &EmergencyProfile, config: &LifelineConfig) -> Result<()> {
    println!("Last updated: {}", profile.last_updated());
    println!(
        "Ctrl+1 {} / Ctrl+2 {}, o open camera, c capture, r reset photo, t touch, y/n confirm, Esc close, q quit",
        config.speed_dial.primary_name, config.speed_dial.secondary_name
    );

    let mut events = profile
        .events()
        .subscribe_filtered(EventFilter::All, "interactive");
    let handler = KeyboardInputHandler::new(config.speed_dial.clone());
    let keys = handler.start().await?;

    let outcome = profile
        .run_key_actions(keys, |profile| {
            if let Some(pending) = profile.pending_call() {
                print!(
                    "Call {} at {}? (y/n)\r\n",
                    pending.contact_name, pending.display_number
                );
            }
            // Raw mode needs explicit carriage returns
            print_events(&mut events, "\r\n");
        })
        .await;

    handler.stop().await?;
    outcome?;
    Ok(())
}

fn print_events(receiver: &mut EventReceiver, line_end: &str) {
    match receiver.drain() {
        Ok(events) => {
            for event in events {
                // Notification lifecycle is noise on a terminal; show only arrivals
                if matches!(
                    event,
                    ProfileEvent::NotificationLeaving { .. } | ProfileEvent::NotificationRemoved { .. }
                ) {
                    continue;
                }
                print!("{}{}", event.description(), line_end);
            }
        }
        Err(e) => debug!("Event stream interrupted: {}", e),
    }
}

fn print_call_log(profile: &EmergencyProfile, json: bool) -> Result<()> {
    let log = profile.call_log();
    if json {
        println!("{}", log.export_json()?);
        return Ok(());
    }

    if log.is_empty() {
        println!("No calls recorded");
        return Ok(());
    }
    for entry in log.all() {
        let kind = serde_json::to_value(entry.kind)?;
        println!(
            "{}  {:<14}  {}{}",
            entry.timestamp.to_rfc3339(),
            kind.as_str().unwrap_or_default(),
            lifeline::format_phone_number(&entry.phone_number),
            entry
                .contact_name
                .map(|name| format!(" ({})", name))
                .unwrap_or_default()
        );
    }
    println!("{} of at most {} entries", log.len(), log.max_entries());
    Ok(())
}

fn print_photo(profile: &EmergencyProfile) {
    let photo = profile.photo();
    match photo.data {
        PhotoData::Url(url) => println!("{:?} photo: {}", photo.source, url),
        PhotoData::Inline(payload) => println!(
            "{:?} photo: {} ({} bytes)",
            photo.source,
            payload.mime,
            payload.bytes.len()
        ),
    }
    println!("Last updated: {}", profile.last_updated());
}

async fn confirm(prompt: &str) -> Result<bool> {
    use std::io::Write;

    print!("{}", prompt);
    std::io::stdout().flush()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let answer = lines.next_line().await?.unwrap_or_default();
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("lifeline={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(std::io::stderr)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .with_writer(std::io::stderr)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .boxed()
        }
    };

    let (file_layer, guard) = match &args.log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .context("--log-file must name a file")?;
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Lifeline configuration file");
    println!("# Every key is optional; environment variables such as");
    println!("# LIFELINE_CALL_LOG__MAX_ENTRIES override file values.");
    println!("# camera.backend is one of: none, synthetic, gstreamer");
    println!();
    println!("{}", LifelineConfig::default().to_toml()?);
    Ok(())
}
