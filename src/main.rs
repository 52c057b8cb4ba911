use clap::Parser;
use log::LevelFilter;
use std::path::PathBuf;
use std::process::exit;

use mtlsprobe::config::{Config, PrometheusConfig, Settings};
use mtlsprobe::{inspect_certificate, PollSettings, PollingClient, RunSummary, ThreadSleep};

mod metrics;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// HTTPS endpoint to poll
    #[arg(short, long)]
    url: Option<String>,

    /// Client certificate (PEM) presented to the server
    #[arg(long, value_name = "FILE")]
    client_cert: Option<PathBuf>,

    /// Private key (PEM) of the client certificate
    #[arg(long, value_name = "FILE")]
    client_key: Option<PathBuf>,

    /// CA bundle (PEM) used to verify the server
    #[arg(long, value_name = "FILE")]
    root_ca: Option<PathBuf>,

    /// Local copy of the server certificate, read for its expiration date
    #[arg(long, value_name = "FILE")]
    server_cert: Option<PathBuf>,

    /// Seconds to wait between two polls
    #[arg(short, long, value_name = "SECS")]
    interval: Option<u64>,

    /// Request timeout in seconds (no timeout by default)
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Stop after this many polls
    #[arg(short = 'n', long, value_name = "COUNT")]
    count: Option<u64>,

    /// Exit code to use when a poll fails
    #[arg(long)]
    exit_code: Option<i32>,

    /// Push poll results to a Prometheus Push Gateway
    #[arg(long)]
    prometheus: bool,

    /// Prometheus Push Gateway address
    #[arg(long, value_name = "ADDRESS")]
    prometheus_address: Option<String>,

    /// Configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print an example configuration file and exit
    #[arg(long)]
    generate_config: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn to_config(&self) -> Config {
        let prometheus = if self.prometheus || self.prometheus_address.is_some() {
            Some(PrometheusConfig {
                enabled: if self.prometheus { Some(true) } else { None },
                address: self.prometheus_address.clone(),
            })
        } else {
            None
        };

        Config {
            url: self.url.clone(),
            client_cert: self.client_cert.clone(),
            client_key: self.client_key.clone(),
            root_ca: self.root_ca.clone(),
            server_cert: self.server_cert.clone(),
            interval_secs: self.interval,
            request_timeout_secs: self.timeout,
            max_cycles: self.count,
            exit_code: self.exit_code,
            prometheus,
        }
    }
}

fn init_logger(verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    apply_verbosity(&mut builder, verbose);
    let _ = builder.try_init();
}

/// `--verbose` opens up debug output for the probe and info for the HTTP stack.
fn apply_verbosity(builder: &mut env_logger::Builder, verbose: bool) {
    if verbose {
        builder.filter_module("mtlsprobe", LevelFilter::Debug);
        builder.filter_module("hyper", LevelFilter::Info);
        builder.filter_module("reqwest", LevelFilter::Info);
    }
}

fn load_settings(args: &Args) -> Result<Settings, Box<dyn std::error::Error>> {
    let mut config = Config::default();
    if let Some(path) = &args.config {
        config = config.merge_with(Config::from_file(path)?);
    }
    Ok(config.merge_with(args.to_config()).resolve()?)
}

fn run(settings: Settings) -> Result<i32, Box<dyn std::error::Error>> {
    let expiry = inspect_certificate(&settings.server_cert)?;
    let mut client = PollingClient::new(
        &settings.identity,
        expiry,
        PollSettings::from(&settings),
    )?;

    let target = format!(
        "{}:{}",
        settings.url.host_str().unwrap_or_default(),
        settings.url.port_or_known_default().unwrap_or(443)
    );
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let summary = client.run(&mut out, &mut ThreadSleep, |expiry, result| {
        if let Some(address) = &settings.prometheus_address {
            metrics::prom::prometheus_metrics(&target, expiry, result, address);
        }
    })?;

    log::info!(
        "{} cycle(s), {} succeeded",
        summary.cycles,
        summary.succeeded
    );
    Ok(exit_code(&summary, settings.exit_code))
}

/// Process exit code once polling has stopped.
fn exit_code(summary: &RunSummary, failure_code: i32) -> i32 {
    match summary.failure {
        Some(_) => failure_code,
        None => 0,
    }
}

fn main() {
    let args = Args::parse();
    init_logger(args.verbose);

    if args.generate_config {
        println!("{}", Config::example_toml());
        exit(0);
    }

    let settings = match load_settings(&args) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            exit(1);
        }
    };

    match run(settings) {
        Ok(code) => exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            exit(1);
        }
    }
}
