use clap::{Parser, ValueEnum};
use serio::config::{ConfigLoader, LogFormat};
use serio::logging::init_tracing;
use serio::{ReadinessMode, SerialStream, TokioLoop};
use std::io;
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task::LocalSet;
use tracing::{info, warn};

const COPY_CHUNK: usize = 4096;

/// Readiness backend selectable from the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Readiness {
    Auto,
    Descriptor,
    Polling,
}

impl From<Readiness> for ReadinessMode {
    fn from(readiness: Readiness) -> Self {
        match readiness {
            Readiness::Auto => ReadinessMode::Auto,
            Readiness::Descriptor => ReadinessMode::Descriptor,
            Readiness::Polling => ReadinessMode::Polling,
        }
    }
}

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    name = "serio-cat",
    version,
    about = "Copy stdin to a serial port and the port's output to stdout.",
    long_about = "Opens a serial port (or a URL such as loop://) and relays bytes in both directions until stdin closes or Ctrl+C is pressed. Settings come from serio.toml and SERIO_* environment variables; flags override both."
)]
struct Args {
    /// Port path or URL, e.g. /dev/ttyUSB0, COM3 or loop://
    target: Option<String>,

    /// Baud rate.
    #[arg(short, long)]
    baud: Option<u32>,

    /// Configuration file to use instead of the standard locations.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Readiness backend.
    #[arg(long, value_enum)]
    readiness: Option<Readiness>,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON.
    #[arg(long)]
    json_logs: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let loader = match &args.config {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    let mut config = loader.into_config();
    if args.verbose {
        config.logging.level = "debug".to_string();
    }
    if args.json_logs {
        config.logging.format = LogFormat::Json;
    }
    init_tracing(&config.logging)?;

    let mut options = config.connection_options();
    if let Some(target) = args.target {
        if target.contains("://") {
            options.url = Some(target);
        } else {
            options.url = None;
            options.port = Some(target);
        }
    }
    if let Some(baud) = args.baud {
        options.serial.baud_rate = baud;
    }
    if let Some(readiness) = args.readiness {
        options.transport.readiness = readiness.into();
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let local = LocalSet::new();
    local.block_on(&runtime, relay(options))
}

async fn relay(options: serio::ConnectionOptions) -> Result<(), Box<dyn std::error::Error>> {
    let mut stream = SerialStream::open(TokioLoop::new(), &options).await?;
    let transport = stream.writer().transport().clone();
    info!(port = %transport.port_name(), "relaying stdin <-> serial");

    let (reader, writer) = stream.split();
    let to_port = async {
        let mut stdin = tokio::io::stdin();
        let mut buffer = vec![0u8; COPY_CHUNK];
        loop {
            let n = stdin.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            writer.write_all(&buffer[..n]).await?;
            writer.drain().await?;
        }
        writer.close();
        writer.wait_closed().await
    };
    let to_stdout = async {
        let mut stdout = tokio::io::stdout();
        loop {
            let data = match reader.read(COPY_CHUNK).await {
                Ok(data) => data,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
                Err(e) => return Err(e),
            };
            if data.is_empty() {
                break;
            }
            stdout.write_all(&data).await?;
            stdout.flush().await?;
        }
        Ok::<(), io::Error>(())
    };

    tokio::select! {
        result = async { tokio::try_join!(to_port, to_stdout) } => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, aborting connection");
            transport.abort();
        }
    }
    Ok(())
}
