use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use pria::catalog::scan_assets;
use pria::config::{AppConfig, ensure_sample_config};
use pria::engine::{ControlCommand, PetEngine, SurfaceCommand};
use pria::geometry::popup_geometry;
use pria::mode::Mode;
use pria::paths::default_config_path;
use pria::random::{RandomSource, StdRandom};
use pria::resources::{FsResourceLoader, ResourceLoader};
use pria::settings::SettingsPatch;
use pria::store::{DocumentStore, SettingsStore};
use serde_json::json;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "pria")]
#[command(about = "Desktop pet that watches, judges and interrupts")]
struct Cli {
    /// Config file (defaults to pria.toml in the data directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the pet and print what the surfaces would show.
    Run(RunArgs),
    /// Decide a single popup and print it as JSON.
    Popup(PopupArgs),
    /// Show or change the persisted settings.
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// Seed the media catalog from the assets directory.
    Scan(ScanArgs),
}

#[derive(Debug, Args, Clone)]
struct RunArgs {
    #[arg(long = "for", value_parser = parse_duration)]
    run_for: Option<Duration>,

    #[arg(long, action = ArgAction::SetTrue)]
    interactive: bool,

    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Debug, Args, Clone)]
struct PopupArgs {
    #[arg(long)]
    message: Option<String>,

    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Debug, Subcommand)]
enum SettingsCommand {
    /// Print settings, resolved mode and profile as JSON.
    Show,
    /// Merge the given fields into the stored settings.
    Set(SetArgs),
}

#[derive(Debug, Args, Clone)]
struct SetArgs {
    /// Shorthand for the two mode flags.
    #[arg(long)]
    mode: Option<Mode>,

    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=5))]
    popups: Option<u8>,

    #[arg(long)]
    intensive: Option<bool>,

    #[arg(long)]
    standard: Option<bool>,

    #[arg(long)]
    volume: Option<u32>,

    #[arg(long)]
    intensity: Option<u32>,

    #[arg(long)]
    name: Option<String>,
}

#[derive(Debug, Args, Clone)]
struct ScanArgs {
    /// Rebuild the catalog even when it already has entries.
    #[arg(long, action = ArgAction::SetTrue)]
    replace: bool,
}

fn parse_duration(value: &str) -> std::result::Result<Duration, String> {
    humantime::parse_duration(value).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(default_config_path);

    match cli.command {
        Commands::Run(args) => run_pet(&config_path, args).await,
        Commands::Popup(args) => print_popup(&config_path, args).await,
        Commands::Settings(SettingsCommand::Show) => show_settings(&config_path),
        Commands::Settings(SettingsCommand::Set(args)) => set_settings(&config_path, args),
        Commands::Scan(args) => scan(&config_path, args),
    }
}

struct Host {
    config: AppConfig,
    store: Arc<DocumentStore>,
    loader: Arc<FsResourceLoader>,
}

fn open_host(config_path: &Path) -> Result<Host> {
    ensure_sample_config(config_path)?;
    let config = AppConfig::load(config_path)?;

    let database = config.database_path();
    let store = DocumentStore::open(&database)
        .with_context(|| format!("failed to open database {}", database.display()))?;

    let assets = config.assets_path();
    if assets.is_dir() {
        store
            .seed_media(scan_assets(&assets, &config.resource_root_path()))
            .context("failed to seed media catalog")?;
    } else {
        warn!(assets = %assets.display(), "assets directory not found");
    }

    let loader = Arc::new(FsResourceLoader::new(config.resource_root_path()));
    Ok(Host {
        config,
        store: Arc::new(store),
        loader,
    })
}

fn build_rng(seed: Option<u64>) -> Box<dyn RandomSource> {
    match seed {
        Some(seed) => Box::new(StdRandom::seeded(seed)),
        None => Box::new(StdRandom::from_entropy()),
    }
}

async fn run_pet(config_path: &Path, args: RunArgs) -> Result<()> {
    let host = open_host(config_path)?;
    let engine_config = host.config.engine_config(args.run_for)?;
    let engine = PetEngine::new(host.store.clone(), host.store.clone(), host.loader.clone());

    let (surface_tx, mut surface_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(command) = surface_rx.recv().await {
            print_surface_command(&command);
        }
    });

    let (command_tx, command_rx) = mpsc::unbounded_channel();

    let ctrl_c_tx = command_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = ctrl_c_tx.send(ControlCommand::Stop);
        }
    });

    if args.interactive {
        let stdin_tx = command_tx.clone();
        std::thread::spawn(move || {
            eprintln!("interactive controls: popup [message] | poke | mode <name> | freq <0-5> | stop");
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                match parse_control(&line) {
                    Ok(Some(command)) => {
                        let stop = command == ControlCommand::Stop;
                        if stdin_tx.send(command).is_err() || stop {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(message) => eprintln!("{message}"),
                }
            }
        });
    }

    let summary = engine
        .run(
            engine_config,
            build_rng(args.seed),
            Some(command_rx),
            Some(surface_tx),
        )
        .await?;
    drop(command_tx);

    printer.await.context("surface printer task failed")?;
    info!(
        popups = summary.popups,
        speeches = summary.speeches,
        spawn_ticks = summary.spawn_ticks,
        settings_updates = summary.settings_updates,
        "session finished"
    );
    Ok(())
}

fn parse_control(line: &str) -> std::result::Result<Option<ControlCommand>, String> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "" => return Ok(None),
        "popup" => ControlCommand::SpawnPopup {
            message: (!rest.is_empty()).then(|| rest.to_string()),
        },
        "poke" => ControlCommand::Poke,
        "mode" => {
            let mode: Mode = rest.parse()?;
            let (intensive_mode, standard_mode) = mode.as_flags();
            ControlCommand::UpdateSettings(SettingsPatch {
                intensive_mode: Some(intensive_mode),
                standard_mode: Some(standard_mode),
                ..SettingsPatch::default()
            })
        }
        "freq" => {
            let popups = rest
                .parse::<u8>()
                .ok()
                .filter(|value| *value <= 5)
                .ok_or_else(|| format!("invalid frequency '{rest}' (expected 0-5)"))?;
            ControlCommand::UpdateSettings(SettingsPatch {
                popups: Some(popups),
                ..SettingsPatch::default()
            })
        }
        "stop" | "quit" | "exit" => ControlCommand::Stop,
        _ => {
            return Err(
                "unknown command. use: popup [message] | poke | mode <name> | freq <0-5> | stop"
                    .to_string(),
            );
        }
    };
    Ok(Some(command))
}

fn print_surface_command(command: &SurfaceCommand) {
    match command {
        SurfaceCommand::DisplayPopup { decision, geometry } => {
            let content = match (&decision.text, &decision.image) {
                (Some(text), Some(image)) => format!("\"{text}\" with {image}"),
                (Some(text), None) => format!("\"{text}\""),
                (None, Some(image)) => image.clone(),
                (None, None) => String::new(),
            };
            println!(
                "popup {}x{} at ({}, {}): {content}",
                geometry.width, geometry.height, geometry.x, geometry.y
            );
        }
        SurfaceCommand::DisplaySpeech { text } => println!("pet says: {text}"),
        SurfaceCommand::SetDimOverlay { active } => {
            println!("dim overlay {}", if *active { "on" } else { "off" })
        }
        SurfaceCommand::SetSpawnInterval { interval } => match interval {
            Some(interval) => println!(
                "popups every {}",
                humantime::format_duration(*interval)
            ),
            None => println!("popups disabled"),
        },
        SurfaceCommand::ModeChanged { mode } => {
            println!("mode is now {mode} ({})", mode.code())
        }
    }
}

async fn print_popup(config_path: &Path, args: PopupArgs) -> Result<()> {
    let host = open_host(config_path)?;
    let engine = PetEngine::new(host.store.clone(), host.store.clone(), host.loader.clone());
    let mut rng = build_rng(args.seed);

    let Some(decision) = engine
        .policy()
        .decide_popup(args.message.as_deref(), &mut *rng)
        .await
    else {
        anyhow::bail!("popup could not be decided; see log for details");
    };
    let image_size = decision
        .image
        .as_deref()
        .and_then(|path| host.loader.image_size(path));
    let geometry = popup_geometry(host.config.work_area, image_size, &mut *rng);

    let output = json!({ "decision": decision, "geometry": geometry });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn show_settings(config_path: &Path) -> Result<()> {
    let host = open_host(config_path)?;
    let settings = host.store.get_settings()?;
    let mode = Mode::resolve(settings.as_ref());
    let output = json!({
        "settings": settings,
        "mode": mode.to_string(),
        "user": host.store.user(),
        "media_items": host.store.media_count(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn set_settings(config_path: &Path, args: SetArgs) -> Result<()> {
    let mut patch = SettingsPatch {
        volume: args.volume,
        intensity: args.intensity,
        popups: args.popups,
        name: args.name,
        standard_mode: args.standard,
        intensive_mode: args.intensive,
    };
    if let Some(mode) = args.mode {
        let (intensive_mode, standard_mode) = mode.as_flags();
        patch.intensive_mode = Some(intensive_mode);
        patch.standard_mode = Some(standard_mode);
    }
    if patch.is_empty() {
        anyhow::bail!("nothing to update; pass at least one setting");
    }

    let host = open_host(config_path)?;
    let merged = host.store.update_settings(&patch)?;
    info!(mode = %Mode::resolve(Some(&merged)), "settings saved");
    println!("{}", serde_json::to_string_pretty(&merged)?);
    Ok(())
}

fn scan(config_path: &Path, args: ScanArgs) -> Result<()> {
    let host = open_host(config_path)?;
    if args.replace {
        let items = scan_assets(&host.config.assets_path(), &host.config.resource_root_path());
        let count = host.store.replace_media(items)?;
        println!("catalog rebuilt with {count} media items");
    } else {
        println!("catalog holds {} media items", host.store.media_count());
    }
    Ok(())
}
