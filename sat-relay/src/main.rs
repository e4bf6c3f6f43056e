//! Entry point for `sat-relay`.
//!
//! Parses CLI arguments and dispatches into either **send** or **receive**
//! mode over the UDP transport.  All protocol work is delegated to library
//! modules; `main.rs` owns only process setup (logging, argument parsing,
//! Ctrl-C).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use sat_relay::config::{ReceiverConfig, TransferConfig};
use sat_relay::encoding::Encoding;
use sat_relay::envelope::Presence;
use sat_relay::receiver::{run_receiver, ReassemblyEngine};
use sat_relay::sender::{publish_with_retry, Sender};
use sat_relay::sink::FileSink;
use sat_relay::socket::Socket;
use sat_relay::telemetry::TelemetryPublisher;
use sat_relay::timer::RetryPolicy;

/// Reliable chunked transfer of imagery and telemetry.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Publish presence, a telemetry series and optionally one image.
    Send {
        /// Receiver address (e.g. 127.0.0.1:9000).
        #[arg(short, long)]
        endpoint: SocketAddr,
        /// Local address to bind.
        #[arg(short, long, default_value = "0.0.0.0:0")]
        bind: SocketAddr,
        /// Image file to send.
        #[arg(short, long)]
        image: Option<PathBuf>,
        /// Name announced in presence markers.
        #[arg(long, default_value = "jetson-pub")]
        client_id: String,
        /// Telemetry samples to publish before the image.
        #[arg(long, default_value_t = 3)]
        telemetry_count: u32,
        /// Chunk payload size in bytes.
        #[arg(long, default_value_t = sat_relay::chunk::DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
        /// Attempts per message, including the first.
        #[arg(long, default_value_t = 5)]
        retries: u32,
        /// Object encoding: raw or zstd.
        #[arg(long, default_value = "zstd")]
        encoding: Encoding,
    },
    /// Reassemble objects and write them to a directory.
    Receive {
        /// Local address to bind.
        #[arg(short, long, default_value = "0.0.0.0:9000")]
        bind: SocketAddr,
        /// Directory for received objects.
        #[arg(short, long, default_value = "/tmp/recv_images")]
        out_dir: PathBuf,
        /// Abandon incomplete objects idle this long.
        #[arg(long, default_value_t = 300)]
        stale_after_secs: u64,
        /// Maximum objects reassembled at once.
        #[arg(long, default_value_t = 256)]
        max_pending: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Send {
            endpoint,
            bind,
            image,
            client_id,
            telemetry_count,
            chunk_size,
            retries,
            encoding,
        } => {
            anyhow::ensure!(chunk_size > 0, "--chunk-size must be at least 1");
            let config = TransferConfig {
                chunk_size,
                encoding,
                retry: RetryPolicy::default().with_attempts(retries),
                ..Default::default()
            };
            log::info!("Sending to {endpoint} as {client_id}");
            send(endpoint, bind, image, &client_id, telemetry_count, config).await
        }
        Mode::Receive {
            bind,
            out_dir,
            stale_after_secs,
            max_pending,
        } => {
            anyhow::ensure!(max_pending > 0, "--max-pending must be at least 1");
            let config = ReceiverConfig {
                stale_after: Duration::from_secs(stale_after_secs),
                max_pending,
                ..Default::default()
            };
            receive(bind, out_dir, config).await
        }
    }
}

async fn send(
    endpoint: SocketAddr,
    bind: SocketAddr,
    image: Option<PathBuf>,
    client_id: &str,
    telemetry_count: u32,
    config: TransferConfig,
) -> anyhow::Result<()> {
    let socket = Arc::new(Socket::connect(bind, endpoint).await?);
    let status = config.topics.status.clone();

    let online = Presence::online(client_id).encode();
    publish_with_retry(&socket, &status, &online, &config.retry).await?;

    let result = async {
        let telemetry = TelemetryPublisher::new(Arc::clone(&socket), config.clone());
        for _ in 0..telemetry_count {
            let sample = telemetry
                .next_sample()
                .with_field("temp", 23.4)
                .with_field("press", 1012.2)
                .with_field("batt", 3.91);
            telemetry.publish(&sample).await?;
            log::info!("Telemetry seq={} sent", sample.sequence);
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        if let Some(path) = image {
            let sender = Sender::new(Arc::clone(&socket), config.clone());
            let report = sender
                .send_file(&path)
                .await
                .with_context(|| format!("sending {}", path.display()))?;
            log::info!(
                "Image {} sent: {} chunk(s), sha256 {}",
                path.display(),
                report.chunk_count,
                report.digest
            );
        }
        anyhow::Ok(())
    }
    .await;

    // Announce departure even when the transfer failed.
    let offline = Presence::offline(client_id).encode();
    if let Err(e) = publish_with_retry(&socket, &status, &offline, &config.retry).await {
        log::warn!("offline marker not delivered: {e}");
    }
    result
}

async fn receive(bind: SocketAddr, out_dir: PathBuf, config: ReceiverConfig) -> anyhow::Result<()> {
    let mut sink = FileSink::create(&out_dir)?;
    let socket = Arc::new(Socket::bind(bind).await?);
    log::info!(
        "Listening on {}, writing to {}",
        socket.local_addr,
        out_dir.display()
    );

    let (inbox, reader) = Arc::clone(&socket).spawn_reader();
    let engine = ReassemblyEngine::new(config);

    tokio::select! {
        (engine, stats) = run_receiver(engine, inbox, &mut sink) => {
            log::info!("Receiver stopped with {} pending: {stats:?}", engine.pending());
        }
        res = tokio::signal::ctrl_c() => {
            res?;
            log::info!("Interrupted; shutting down");
        }
    }

    reader.abort();
    Ok(())
}
