use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing_subscriber::EnvFilter;
use uartlog::framing::{verify_checked, Direction, FrameEncoder, FrameFormat, PacketType};
use uartlog::transport::{DEFAULT_BAUD_RATE, DEFAULT_PORT};
use uartlog::{pklg, HciDump, LogSink, Parity, PortSettings, SerialPort, SinkConfig, TraceRecord};

/// Forward log records and HCI packets from stdin to a serial port
#[derive(Debug, Parser)]
#[command(name = "uartlog", version, about)]
struct Args {
    /// Serial port device
    #[arg(short = 'u', long = "port", default_value = DEFAULT_PORT)]
    port: String,

    /// Baud rate
    #[arg(
        short = 'b',
        long = "baud",
        default_value_t = DEFAULT_BAUD_RATE,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    baud: u32,

    /// PacketLogger (.pklg) file recording every record queued for the port
    #[arg(short = 'd', long = "dump", default_value = "hci_dump.pklg")]
    dump: PathBuf,

    /// Parity: 0 = none, 1 = even, 2 = odd
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=2))]
    parity: u8,

    /// Enable RTS/CTS flow control
    #[arg(long)]
    rts_cts: bool,

    /// Packet wire format (overrides the config file)
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Sink configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Direct,
    Checked,
}

impl From<FormatArg> for FrameFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Direct => FrameFormat::Direct,
            FormatArg::Checked => FrameFormat::Checked,
        }
    }
}

/// Encode a known packet and check it decodes back
fn self_check(encoder: &FrameEncoder) -> Result<()> {
    let payload = [0x0E, 0x04, 0x01, 0x03, 0x0C, 0x00];
    let frame = encoder.encode(PacketType::Event.to_byte(), Direction::Incoming, &payload)?;
    let decoded = verify_checked(&frame)?;
    if decoded.payload != payload || decoded.logical_type != PacketType::Event.to_byte() {
        bail!("checked frame self-check failed: {:02X?}", frame.as_ref());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &args.config {
        Some(path) => SinkConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SinkConfig::default(),
    };
    if let Some(format) = args.format {
        config.format = format.into();
    }
    config.validate()?;

    let encoder = FrameEncoder::new(config.format, config.frame_capacity);
    if config.format == FrameFormat::Checked {
        self_check(&encoder)?;
    }

    let settings = PortSettings::new(args.port.clone(), args.baud)
        .with_parity(Parity::try_from(args.parity)?)
        .with_flow_control(args.rts_cts);

    let mut sink: LogSink<SerialPort> = LogSink::new(config.clone())?;
    sink.open(settings)
        .with_context(|| format!("opening {}", args.port))?;
    let dump = HciDump::new(&config);

    let file = File::create(&args.dump)
        .await
        .with_context(|| format!("creating {}", args.dump.display()))?;
    let mut trace = BufWriter::new(file);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => {
                    let record = TraceRecord::parse(&line);
                    if record.submit(&dump, &mut sink) {
                        match record.to_packet_log(pklg::now()) {
                            Ok(bytes) => trace.write_all(&bytes).await?,
                            Err(err) => log::warn!("not recorded in trace file: {}", err),
                        }
                    }
                }
                None => stdin_open = false,
            },
            _ = sink.wait() => {
                sink.poll();
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("interrupted");
                break;
            }
        }

        if !stdin_open && (sink.is_idle() || !sink.driver().state().is_open()) {
            break;
        }
    }

    trace.flush().await?;
    sink.deinit();

    let stats = sink.statistics();
    log::info!(
        "sent {} of {} bytes, {} lost, {} write errors, {} packets filtered",
        stats.bytes_sent,
        stats.bytes_enqueued,
        stats.lost.get(),
        stats.write_errors,
        stats.packets_filtered
    );
    Ok(())
}
