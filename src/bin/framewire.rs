//! Framewire CLI binary.
//!
//! Demo server and framing utilities for the framewire session engine.
//!
//! # Commands
//!
//! - `serve` - Run a demo TCP server speaking the framed protocol
//! - `frame` - Frame message text into wire bytes on stdout

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use bytes::BytesMut;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use framewire::{
    Config, ConnectionId, DeflateCodec, HandlerRegistry, IoBackend, JsonCodec, MessageKind,
    ResourcePool, SessionManager, VERSION,
};

#[derive(Parser)]
#[command(name = "framewire")]
#[command(version = VERSION)]
#[command(about = "Framewire - framed-message session engine over TCP", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the demo TCP server
    Serve {
        /// TOML config file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Frame message text into wire bytes on stdout
    Frame {
        /// Message text (or - for stdin)
        input: Option<String>,

        /// Correlation uid header
        #[arg(short, long)]
        uid: Option<u64>,

        /// Deflate-compress the body
        #[arg(short, long)]
        deflate: bool,
    },
}

/// Demo request: `{"kind":"ping"}`, `{"kind":"echo","text":"..."}`,
/// `{"kind":"announce","text":"..."}` (fire-and-forget).
#[derive(Debug, Deserialize)]
struct DemoRequest {
    kind: String,
    #[serde(default)]
    text: String,
}

impl MessageKind for DemoRequest {
    fn kind(&self) -> &str {
        &self.kind
    }
}

#[derive(Debug, Serialize)]
struct DemoResponse {
    kind: String,
    text: String,
}

type DemoCodec = JsonCodec<DemoRequest, DemoResponse>;

/// Write path backed by per-connection tokio writer tasks and a server-wide
/// buffer pool. Buffers return to the pool once the socket write completes.
struct TokioIo {
    buffers: ResourcePool<BytesMut>,
    writers: Mutex<HashMap<ConnectionId, mpsc::UnboundedSender<BytesMut>>>,
}

impl TokioIo {
    fn new(config: &Config) -> Self {
        let capacity = config.pools.buffer_capacity;
        Self {
            buffers: ResourcePool::capped(
                config.pools.buffer_pool_initial,
                config.pools.buffer_pool_initial,
                config.pools.buffer_pool_max,
                move || BytesMut::with_capacity(capacity),
            ),
            writers: Mutex::new(HashMap::new()),
        }
    }

    fn register(self: &Arc<Self>, conn: ConnectionId, mut half: tokio::net::tcp::OwnedWriteHalf) {
        let (tx, mut rx) = mpsc::unbounded_channel::<BytesMut>();
        self.writers.lock().unwrap().insert(conn, tx);

        let io = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(mut buffer) = rx.recv().await {
                let result = half.write_all(&buffer).await;
                buffer.clear();
                io.buffers.release(buffer);
                if let Err(e) = result {
                    tracing::debug!(%conn, error = %e, "write failed, dropping writer");
                    break;
                }
            }
        });
    }

    fn unregister(&self, conn: ConnectionId) {
        self.writers.lock().unwrap().remove(&conn);
    }
}

impl IoBackend for TokioIo {
    fn acquire_buffer(&self) -> BytesMut {
        self.buffers.acquire()
    }

    fn enqueue_for_write(&self, conn: ConnectionId, buffer: BytesMut) {
        let sender = self.writers.lock().unwrap().get(&conn).cloned();
        match sender {
            Some(tx) if tx.send(buffer).is_ok() => {},
            _ => tracing::debug!(%conn, "dropping frame for closed connection"),
        }
    }
}

fn registry() -> HandlerRegistry<DemoCodec> {
    let mut registry = HandlerRegistry::new();
    registry.register("ping", |_req: DemoRequest, _peer: SocketAddr| {
        Some(DemoResponse {
            kind: "pong".into(),
            text: String::new(),
        })
    });
    registry.register("echo", |req: DemoRequest, _peer: SocketAddr| {
        Some(DemoResponse {
            kind: "echo".into(),
            text: req.text,
        })
    });
    registry.register("announce", |req: DemoRequest, peer: SocketAddr| {
        tracing::info!(%peer, text = %req.text, "announcement received");
        None
    });
    registry
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let io = Arc::new(TokioIo::new(&config));
    let manager = Arc::new(SessionManager::new(
        Arc::new(DemoCodec::new()),
        Arc::new(registry()),
        io.clone() as Arc<dyn IoBackend>,
        config.clone(),
    ));

    let addr = config.server.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "framewire listening");

    // Idle watchdog sweep.
    {
        let manager = Arc::clone(&manager);
        let io = Arc::clone(&io);
        let period = std::time::Duration::from_secs(config.server.sweep_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                for (conn, peer) in manager.sweep_idle() {
                    tracing::warn!(%conn, %peer, "idle session evicted");
                    io.unregister(conn);
                }
            }
        });
    }

    let next_conn = AtomicU64::new(1);
    loop {
        let (stream, peer) = listener.accept().await?;
        let conn = ConnectionId(next_conn.fetch_add(1, Ordering::Relaxed));
        let (mut read_half, write_half) = stream.into_split();

        io.register(conn, write_half);
        manager.accept_connection(conn, peer);

        let manager = Arc::clone(&manager);
        let io = Arc::clone(&io);
        tokio::spawn(async move {
            let mut chunk = vec![0u8; 8192];
            loop {
                let n = match read_half.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };

                // feed_bytes may block on pool backpressure; keep it off
                // the reactor.
                let mgr = Arc::clone(&manager);
                let delivered = chunk[..n].to_vec();
                let outcome = tokio::task::spawn_blocking(move || {
                    mgr.feed_bytes(conn, &delivered)?;
                    mgr.process_queued_messages(conn)
                })
                .await;

                match outcome {
                    Ok(Ok(())) => {},
                    Ok(Err(e)) => {
                        // Fatal errors already evicted the session.
                        tracing::warn!(%conn, %peer, error = %e, "closing connection");
                        break;
                    },
                    Err(e) => {
                        tracing::error!(%conn, error = %e, "worker panicked");
                        break;
                    },
                }
            }
            manager.disconnect(conn);
            io.unregister(conn);
        });
    }
}

fn frame(input: Option<String>, uid: Option<u64>, deflate: bool) -> anyhow::Result<()> {
    let text = match input.as_deref() {
        None | Some("-") => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        },
        Some(text) => text.to_string(),
    };

    let body = if deflate {
        let mut codec = DeflateCodec::new(text.len() + 64);
        let mut out = Vec::new();
        codec.compress(&text, &mut out)?;
        out
    } else {
        text.into_bytes()
    };

    let mut header = format!("content-length:{}", body.len());
    if let Some(uid) = uid {
        header.push_str(&format!("\r\nuid:{uid}"));
    }
    if deflate {
        header.push_str("\r\ncontent-encoding:deflate");
    }
    header.push_str("\r\n\r\n");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    out.write_all(header.as_bytes())?;
    out.write_all(&body)?;
    out.flush()?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { config, host, port } => {
            let mut config = match config {
                Some(path) => Config::from_file(path)?,
                None => Config::from_env(),
            };
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config).await
        },
        Commands::Frame { input, uid, deflate } => frame(input, uid, deflate),
    }
}
