use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use clap::Parser;
use clap_derive::Parser;
use mjpeg_udp::consumer::frame_sink::{DirectorySink, FrameSink, LoggingSink};
use mjpeg_udp::consumer::run_consumer;
use mjpeg_udp::stream::run_stream;
use mjpeg_udp::stream::stream_config::StreamConfig;
use mjpeg_udp::util::shutdown::Shutdown;
use tokio::signal;
use tracing::{error, info, Level};

/// Receives the motion-JPEG stream of an ESP32 camera over UDP
#[derive(Parser)]
struct Args {
    /// local address to receive the stream on
    #[arg(long, default_value = "192.168.4.2:31416")]
    listen: SocketAddr,

    /// the camera's streaming endpoint that keepalives are sent to
    #[arg(long, default_value = "192.168.4.1:9000")]
    stream: SocketAddr,

    #[arg(long, default_value_t = 1000)]
    idle_deadline_millis: u64,

    #[arg(long, default_value_t = 1024*1024)]
    max_frame_size: usize,

    /// send keepalives from the listen socket rather than a separate socket
    #[arg(long, default_value_t = false)]
    keepalive_from_listen_addr: bool,

    /// store received frames as individual files in this directory instead of logging them
    #[arg(long)]
    output_dir: Option<PathBuf>,

    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    #[arg(long, default_value_t = false)]
    very_verbose: bool,
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match (args.verbose, args.very_verbose) {
        (_, true) => Level::TRACE,
        (true, _) => Level::DEBUG,
        (false, false) => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .ok();

    let mut config = StreamConfig::new(args.listen, args.stream);
    config.idle_deadline = Duration::from_millis(args.idle_deadline_millis);
    config.max_frame_size = args.max_frame_size;
    config.keepalive_from_listen_addr = args.keepalive_from_listen_addr;

    match args.output_dir {
        Some(dir) => run(config, DirectorySink::new(dir).await?).await,
        None => run(config, LoggingSink::default()).await,
    }
}

async fn run(config: StreamConfig, sink: impl FrameSink + 'static) -> anyhow::Result<()> {
    let shutdown = Shutdown::new();
    let stream = run_stream(&config, &shutdown).await?;

    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl-C, shutting down"),
            Err(e) => error!(error = ?e, "error listening for Ctrl-C, shutting down"),
        }
        ctrl_c_shutdown.trigger();
    });

    info!("stream started on {:?}", stream.listen_addr);
    let num_frames = run_consumer(stream.frames, sink, shutdown.listener()).await;

    // the consumer may also have stopped because ingestion finished - either way, both stop
    shutdown.trigger();
    let stats = stream.ingestion.await?;
    info!(num_frames, ?stats, "stream closed");
    Ok(())
}
