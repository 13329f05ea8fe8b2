//! polybeat - terminal polyrhythm trainer
//!
//! Run with: cargo run -- [--state <encoded>] [--engine precision|fallback]
//!                        [--state-file <path>]

mod app;
mod ui;

use std::fs::File;
use std::path::PathBuf;

use color_eyre::eyre::{eyre, Result as EyreResult, WrapErr};
use env_logger::Env;

use app::App;
use polybeat::{codec, EngineKind, TransportConfig};

#[derive(Debug, Default)]
struct Args {
    state: Option<String>,
    engine: Option<EngineKind>,
    state_file: Option<PathBuf>,
}

fn parse_args() -> EyreResult<Args> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);

    while let Some(arg) = iter.next() {
        let mut value = |name: &str| {
            iter.next()
                .ok_or_else(|| eyre!("missing value for {name}"))
        };
        match arg.as_str() {
            "--state" => args.state = Some(value("--state")?),
            "--engine" => args.engine = Some(value("--engine")?.parse()?),
            "--state-file" => args.state_file = Some(PathBuf::from(value("--state-file")?)),
            other => return Err(eyre!("unknown argument `{other}`")),
        }
    }
    Ok(args)
}

/// Log to a file: the terminal belongs to the UI.
fn init_logging() -> EyreResult<PathBuf> {
    let path = std::env::temp_dir().join("polybeat.log");
    let file = File::create(&path)
        .wrap_err_with(|| format!("failed to create log file {}", path.display()))?;
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    Ok(path)
}

fn main() -> EyreResult<()> {
    color_eyre::install()?;
    let args = parse_args()?;
    let log_path = init_logging()?;
    log::info!("logging to {}", log_path.display());

    // explicit --state wins over the state file
    let stored = match (&args.state, &args.state_file) {
        (Some(state), _) => Some(state.clone()),
        (None, Some(path)) if path.exists() => Some(
            std::fs::read_to_string(path)
                .wrap_err_with(|| format!("failed to read {}", path.display()))?,
        ),
        _ => None,
    };
    let stored = stored.unwrap_or_default();
    let session = codec::decode_or_default(&stored);

    let mut config = TransportConfig::new();
    if let Some(kind) = args.engine {
        config = config.engine(kind);
    }

    let mut app = App::new(session, config, stored.trim(), args.state_file)?;

    let mut terminal = ratatui::init();
    let result = app.run(&mut terminal);
    ratatui::restore();
    result
}
