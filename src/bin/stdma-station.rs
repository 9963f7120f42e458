use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use stdma::{payload_queue, Error, Result, Station, StationClass, StationConfig};

/// STDMA station: sends stdin in its own slot, listens to everyone else's
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Network interface to use (e.g. eth0)
    interface: String,

    /// Multicast group
    multicast_addr: Ipv4Addr,

    /// Multicast port
    port: u16,

    /// Station class (A or B)
    station_class: StationClass,

    /// Initial clock offset in milliseconds
    #[arg(default_value_t = 0, allow_hyphen_values = true)]
    clock_offset_ms: i64,

    /// JSON configuration file; positional arguments override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Slots per frame
    #[arg(long)]
    slot_count: Option<usize>,

    /// Slot duration in milliseconds
    #[arg(long)]
    slot_ms: Option<u64>,

    /// Slots to listen before the first transmission
    #[arg(long)]
    listen_slots: Option<u32>,

    /// Probability of treating a clean reception as a collision
    #[arg(long)]
    simulate_collisions: Option<f64>,

    /// Seed for slot selection
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn into_config(self) -> Result<StationConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                serde_json::from_str(&text)
                    .map_err(|e| Error::config(format!("{}: {}", path.display(), e)))?
            }
            None => StationConfig::default(),
        };

        config.interface = self.interface;
        config.multicast_addr = self.multicast_addr;
        config.port = self.port;
        config.station_class = self.station_class;
        config.clock_offset_ms = self.clock_offset_ms;

        if let Some(slot_count) = self.slot_count {
            config.frame.slot_count = slot_count;
        }
        if let Some(slot_ms) = self.slot_ms {
            config.frame.slot_duration = Duration::from_millis(slot_ms);
        }
        if let Some(listen_slots) = self.listen_slots {
            config.startup_listen_slots = listen_slots;
        }
        if let Some(rate) = self.simulate_collisions {
            config.simulated_collision_rate = rate;
        }
        if self.seed.is_some() {
            config.rng_seed = self.seed;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("station failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = args.into_config()?;
    if config.simulated_collision_rate > 0.0 {
        warn!("simulating collisions with probability {}", config.simulated_collision_rate);
    }

    let (producer, queue) = payload_queue(config.queue_capacity);
    let station = Station::bind(config)?;

    let stop = station.stop_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, shutting down");
            stop.cancel();
        }
    });

    tokio::spawn(async move {
        if let Err(e) = stdma::source::pump(tokio::io::stdin(), producer).await {
            warn!("payload source failed: {}", e);
        }
    });

    station.run(queue).await
}
