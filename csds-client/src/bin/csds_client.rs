//! Command line entry point of the CSDS client.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use csds_client::{
    AuthnMode, CsdsClient, FilterMode, Platform, Renderer, Result, SessionOptions,
    DEFAULT_SERVICE_URI,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Query a control plane for the xDS config status of its connected clients.
#[derive(Parser, Debug)]
#[command(name = "csds-client", version)]
struct Args {
    /// Control plane address.
    #[arg(long = "service_uri", default_value = DEFAULT_SERVICE_URI)]
    service_uri: String,

    /// Platform hosting the control plane.
    #[arg(long = "platform", default_value = "gcp")]
    platform: String,

    /// Authentication mode: jwt or auto.
    #[arg(long = "authn_mode", default_value = "auto")]
    authn_mode: String,

    /// Service account key file used in jwt mode.
    #[arg(long = "jwt_file")]
    jwt_file: Option<PathBuf>,

    /// YAML file holding the node matchers.
    #[arg(long = "request_file")]
    request_file: Option<PathBuf>,

    /// Inline YAML merged over the request file.
    #[arg(long = "request_yaml")]
    request_yaml: Option<String>,

    /// Poll interval, e.g. "5s". Zero queries once.
    #[arg(
        long = "monitor_interval",
        default_value = "0s",
        value_parser = humantime::parse_duration
    )]
    monitor_interval: Duration,

    /// How the filter pattern is applied: prefix, suffix or regex.
    #[arg(long = "filter_mode", default_value = "prefix")]
    filter_mode: String,

    /// Only report on clients whose node id matches.
    #[arg(long = "filter_pattern", default_value = "")]
    filter_pattern: String,

    /// File receiving the detailed config dump.
    #[arg(long = "output_file")]
    output_file: Option<PathBuf>,
}

impl Args {
    fn into_options(self) -> Result<SessionOptions> {
        let platform: Platform = self.platform.parse()?;
        let authn_mode = AuthnMode::parse(&self.authn_mode, platform)?;
        let filter_mode: FilterMode = self.filter_mode.parse()?;

        let mut options = SessionOptions::new(self.service_uri)
            .with_platform(platform)
            .with_authn_mode(authn_mode)
            .with_monitor_interval(self.monitor_interval)
            .with_filter(filter_mode, self.filter_pattern);
        options.jwt_file = self.jwt_file;
        options.request_file = self.request_file;
        options.request_yaml = self.request_yaml;
        options.output_file = self.output_file;
        Ok(options)
    }
}

fn trace_init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args) -> Result<()> {
    let client = CsdsClient::new(args.into_options()?)?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("interrupted");
                cancel.cancel();
            }
        }
    });

    client.run(Renderer::default(), &cancel).await
}

#[tokio::main]
async fn main() -> ExitCode {
    trace_init();
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
