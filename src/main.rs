use scenecast::cli::Args;
use scenecast::config::{self, ServerConfig};
use scenecast::server::{ApiServer, AppState};

use anyhow::Context;
use clap::Parser;
use log::{debug, info};
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    // Parse command-line arguments first (needed for log setup)
    let args = Args::parse();

    let root = config::resolve_root(args.root.clone());

    // Determine log level based on verbosity flags
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .clone()
            .unwrap_or_else(|| root.join("scenecast.log"));
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
        }
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .filter_module("tiny_http", log::LevelFilter::Warn)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Console logging (respects RUST_LOG if set)
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };

        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .filter_module("tiny_http", log::LevelFilter::Warn)
            .format_timestamp_millis()
            .init();
    }

    debug!("Command-line args: {:?}", args);

    let mut server_config = ServerConfig::load(&root, args.config.as_deref())?;
    args.apply(&mut server_config);
    server_config.validate()?;
    config::ensure_dirs(&server_config)?;

    info!("Scenecast render server starting...");
    info!("Root dir:   {}", root.display());
    info!("Scenes dir: {}", server_config.scenes_dir.display());
    info!("Output dir: {}", server_config.output_dir.display());
    info!("Cache dir:  {}", server_config.cache_dir.display());
    info!(
        "Renderer:   {} (timeout {}s, coalesce {})",
        server_config.renderer, server_config.render_timeout_secs, server_config.coalesce_inflight
    );

    let state = Arc::new(AppState::from_config(server_config));
    ApiServer::new(state).run()
}
