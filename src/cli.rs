use clap::Parser;
use std::path::PathBuf;

/// Render server for parameterized math animations
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Root directory holding scenes/, render_output/ and cache/
    #[arg(short = 'r', long = "root", value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// JSON config file (default: <root>/scenecast.json if present)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Address to bind
    #[arg(long = "host", value_name = "HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short = 'p', long = "port", value_name = "PORT")]
    pub port: Option<u16>,

    /// Renderer executable (default: manim)
    #[arg(long = "renderer", value_name = "PROGRAM")]
    pub renderer: Option<String>,

    /// Render timeout in seconds (default: 120)
    #[arg(short = 't', long = "timeout", value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Serve frontend files from this directory on `/`
    #[arg(long = "static-dir", value_name = "DIR")]
    pub static_dir: Option<PathBuf>,

    /// Share one render between concurrent identical requests
    #[arg(long = "coalesce")]
    pub coalesce: bool,

    /// Enable logging to file (default: <root>/scenecast.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,
}

impl Args {
    /// Apply command-line overrides on top of file/default settings.
    pub fn apply(&self, config: &mut crate::config::ServerConfig) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(renderer) = &self.renderer {
            config.renderer = renderer.clone();
        }
        if let Some(timeout) = self.timeout {
            config.render_timeout_secs = timeout;
        }
        if let Some(dir) = &self.static_dir {
            config.static_dir = Some(dir.clone());
        }
        if self.coalesce {
            config.coalesce_inflight = true;
        }
    }
}
