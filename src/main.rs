use termpulse::classify::ClassifierChain;
use termpulse::cli::{Cli, Commands, ConfigAction};
use termpulse::config::{Config, ConfigValidator};
use termpulse::error::{Result, TermpulseError};
use termpulse::parser::LogLineParser;
use termpulse::pipeline::Pipeline;
use termpulse::reduce::FalsePositiveReducer;
use termpulse::sinks::{JsonlPersistenceSink, TracingErrorSink, TracingNotificationSink};
use termpulse::watch::{ChangeWatcher, NotifyWatcher, PollWatcher};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run { profile } => {
            cmd_run(cli.config, profile).await?;
        }
        Commands::Check { file } => {
            cmd_check(cli.config, &file)?;
        }
        Commands::Status => {
            cmd_status(cli.config)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose {
        "termpulse=debug"
    } else {
        "termpulse=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt().with_env_filter(filter).with_target(false).init();
}

async fn cmd_run(config_path: Option<PathBuf>, profile: Option<String>) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(profile) = &profile {
        config.apply_profile(profile)?;
        tracing::info!(profile, "Volume profile applied");
    }
    config.log.path = expand_path(&config.log.path)?;
    config.log.store_path = expand_path(&config.log.store_path)?;

    let watcher: Box<dyn ChangeWatcher> = match config.watch.backend.as_str() {
        "poll" => Box::new(PollWatcher::new(Duration::from_millis(
            config.watch.poll_interval_ms,
        ))),
        _ => Box::new(NotifyWatcher::new()),
    };
    let persistence = Arc::new(JsonlPersistenceSink::create(config.log.store_path.clone())?);

    let mut pipeline = Pipeline::new(
        config,
        watcher,
        persistence,
        Arc::new(TracingNotificationSink),
        Arc::new(TracingErrorSink),
    );
    pipeline.start()?;

    tokio::signal::ctrl_c().await.map_err(|e| TermpulseError::Io {
        source: e,
        context: "Failed to listen for shutdown signal".to_string(),
    })?;
    tracing::info!("Shutdown requested");
    pipeline.stop().await;

    let stats = pipeline.stats();
    println!(
        "Processed {} lines, sent {} notifications ({} throttled)",
        stats.lines_read, stats.notifications_sent, stats.notifications_throttled
    );
    Ok(())
}

/// Replay an existing log file through the detector, printing each event
/// that would have produced a notification.
fn cmd_check(config_path: Option<PathBuf>, file: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let classifier = ClassifierChain::new(&config.rules);
    let reducer = FalsePositiveReducer::new(config.reducer_config(), &config.suppressions);
    let window = config.detection.context_window;

    let content = std::fs::read_to_string(file).map_err(|e| TermpulseError::Io {
        source: e,
        context: format!("Failed to read log file: {:?}", file),
    })?;

    let entries: Vec<_> = content
        .lines()
        .filter_map(LogLineParser::parse)
        .collect();

    let mut detected = 0usize;
    for (i, entry) in entries.iter().enumerate() {
        let Some(candidate) = classifier.classify(entry) else {
            continue;
        };
        let mut context: Vec<String> = Vec::new();
        for e in &entries[i.saturating_sub(window)..i] {
            context.push(e.payload.clone());
        }
        for e in entries.iter().skip(i + 1).take(window) {
            context.push(e.payload.clone());
        }
        let outcome = reducer.evaluate(&candidate, &context);
        if outcome.matched {
            detected += 1;
            println!(
                "{}  {:<14}  {:.2}  {}",
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                format!("{:?}", candidate.category),
                outcome.confidence,
                entry.payload
            );
        }
    }

    println!(
        "{} events detected across {} parsed lines",
        detected,
        entries.len()
    );
    Ok(())
}

fn cmd_status(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let log_path = expand_path(&config.log.path)?;
    let store_path = expand_path(&config.log.store_path)?;

    println!("Activity log:  {}", log_path.display());
    match std::fs::metadata(&log_path) {
        Ok(meta) => println!("               present, {} bytes", meta.len()),
        Err(_) => println!("               not created yet"),
    }

    println!("Entry store:   {}", store_path.display());
    match std::fs::read_to_string(&store_path) {
        Ok(content) => println!("               {} entries", content.lines().count()),
        Err(_) => println!("               empty"),
    }

    println!("Watch backend: {}", config.watch.backend);
    println!("Debounce:      {} ms", config.watch.debounce_ms);
    println!("Threshold:     {}", config.detection.threshold);
    println!("Custom rules:  {}", config.rules.len());
    println!("Suppressions:  {}", config.suppressions.len());
    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(p) => p,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            ConfigValidator::validate(&config)?;
            println!("✓ Configuration is valid: {}", path.display());
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(p) => p,
                None => Config::default_path()?,
            };
            if path.exists() && !force {
                return Err(TermpulseError::Config(format!(
                    "Config already exists at {} (use --force to overwrite)",
                    path.display()
                )));
            }
            Config::default().save(&path)?;
            println!("✓ Default configuration written to {}", path.display());
        }
    }
    Ok(())
}

/// Load from the given path or the standard location; a missing file means
/// defaults, so first runs work without `config init`.
fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(p) => p,
        None => Config::default_path()?,
    };
    if path.exists() {
        Config::load(&path)
    } else {
        tracing::debug!(path = %path.display(), "No config file, using defaults");
        Ok(Config::default())
    }
}

/// Expand a leading `~` to the home directory.
fn expand_path(path: &Path) -> Result<PathBuf> {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| TermpulseError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(rest))
    } else {
        Ok(path.to_path_buf())
    }
}
