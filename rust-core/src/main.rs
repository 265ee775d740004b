//! rtl_web, an I/Q spectrum server for RTL2832 based DVB-T receivers

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use rtl_web::config::{self, ConfigError, ServerConfig};
use rtl_web::device::{DeviceSource, GainMode};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "rtl_web, an I/Q spectrum server for RTL2832 based DVB-T receivers")]
struct Cli {
    /// Listen address
    #[arg(short = 'a', long, default_value = "127.0.0.1")]
    address: String,

    /// Listen port
    #[arg(short = 'p', long, default_value_t = config::DEFAULT_PORT)]
    port: u16,

    /// Frequency to tune to [Hz]
    #[arg(short = 'f', long, default_value_t = config::DEFAULT_FREQUENCY_HZ as f64)]
    frequency: f64,

    /// Gain in dB (0 for auto)
    #[arg(short = 'g', long, default_value_t = 0.0)]
    gain: f64,

    /// Sample rate in Hz
    #[arg(short = 's', long, default_value_t = config::DEFAULT_SAMPLE_RATE_HZ as f64)]
    samplerate: f64,

    /// FFT size (even)
    #[arg(short = 'b', long, default_value_t = config::DEFAULT_FFT_SIZE)]
    fftsize: usize,

    /// Device index into the --source list
    #[arg(short = 'd', long, default_value_t = 0)]
    device: usize,

    /// Number of blocks averaged per published frame
    #[arg(short = 'n', long, default_value_t = config::DEFAULT_AVERAGES)]
    averages: usize,

    /// Sample source: tcp://host:port (rtl_tcp), - (stdin) or a raw I/Q file.
    /// May be repeated; --device selects one.
    #[arg(long = "source")]
    sources: Vec<DeviceSource>,

    /// Outbound messages buffered per client before frames are dropped
    #[arg(long, default_value_t = config::DEFAULT_QUEUE_DEPTH)]
    queue_depth: usize,

    /// Write win.sd/raw.cd/fft.cd/psd.cd here and exit after the first frame
    #[arg(long)]
    dump_dir: Option<PathBuf>,
}

impl TryFrom<Cli> for ServerConfig {
    type Error = ConfigError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        Ok(ServerConfig {
            listen_addr: cli.address,
            port: cli.port,
            frequency_hz: config::hz_from_f64("frequency", cli.frequency)?,
            gain: GainMode::from_db(cli.gain),
            sample_rate_hz: config::hz_from_f64("sample rate", cli.samplerate)?,
            fft_size: cli.fftsize,
            device_index: cli.device,
            sources: cli.sources,
            publish_every: cli.averages,
            queue_depth: cli.queue_depth,
            dump_dir: cli.dump_dir,
            ..Default::default()
        })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let result = match ServerConfig::try_from(cli) {
        Ok(config) => rtl_web::app::run(config).await,
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(()) => {
            info!("bye!");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
