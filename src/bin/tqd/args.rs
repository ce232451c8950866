use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use clap::Parser;
use ticket_queue::config::Config;
use ticket_queue::error::ConfigError;

#[derive(Parser, Debug)]
#[command(about, long_about = None, version)]
pub(crate) struct Args {
    /// Address to listen on.
    #[arg(short, long, default_value_t = IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)))]
    pub(crate) listen: IpAddr,
    /// (TCP) port to listen on.
    #[arg(short, long, default_value_t = 11400)]
    pub(crate) port: u16,
    /// Keeps jobs in this snapshot file so they survive restarts. Without
    /// it, jobs live only in memory.
    #[arg(short = 'b', long)]
    pub(crate) state_file: Option<PathBuf>,
    /// Reads settings from a YAML file. Flags below override it.
    #[arg(short, long)]
    pub(crate) config: Option<PathBuf>,
    /// Submissions admitted per window across all owners.
    #[arg(long)]
    pub(crate) global_rate_limit: Option<u32>,
    /// Submissions admitted per window for each owner.
    #[arg(long)]
    pub(crate) per_owner_rate_limit: Option<u32>,
    /// Length of the rate limiting window.
    #[arg(long)]
    pub(crate) window_duration_seconds: Option<u64>,
    /// Longest time an idle worker waits before checking for jobs again.
    #[arg(long)]
    pub(crate) worker_idle_poll_interval_ms: Option<u64>,
    /// Time the built-in executor spends on each job.
    #[arg(long)]
    pub(crate) simulated_work_ms: Option<u64>,
    /// Sets the maximum allowed payload size.
    #[arg(short = 'z', long)]
    pub(crate) max_payload_size: Option<u32>,
    /// Enables human-friendly logging.
    #[arg(short, long, default_value_t)]
    pub(crate) debug: bool,
}

impl Args {
    /// Builds the effective configuration: defaults, then the config file,
    /// then flags.
    pub(crate) fn config(&self) -> Result<Config, ConfigError> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(v) = self.global_rate_limit {
            config.global_rate_limit = v;
        }
        if let Some(v) = self.per_owner_rate_limit {
            config.per_owner_rate_limit = v;
        }
        if let Some(v) = self.window_duration_seconds {
            config.window_duration_seconds = v;
        }
        if let Some(v) = self.worker_idle_poll_interval_ms {
            config.worker_idle_poll_interval_ms = v;
        }
        if let Some(v) = self.simulated_work_ms {
            config.simulated_work_ms = v;
        }
        if let Some(v) = self.max_payload_size {
            config.max_payload_size = v;
        }

        config.validate()?;
        Ok(config)
    }
}
