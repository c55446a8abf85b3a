//! Listeners and per-connection plumbing.
//!
//! The gateway binds the configured listener set (plaintext and TLS) and
//! spawns one task per accepted connection. Each connection gets a read
//! loop feeding the session's receive path and a writer task draining its
//! outbound queue; dropping the queue's sender (on `Session::exit`) is what
//! closes the socket.

use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls;
use tracing::{debug, error, info};

use crate::config::ListenerConfig;
use crate::dns;
use crate::state::{ServerContext, Session};

/// The listener set.
pub struct Gateway {
    listeners: Vec<(TcpListener, Option<TlsAcceptor>)>,
    ctx: Arc<ServerContext>,
}

impl Gateway {
    /// Bind every configured listener.
    ///
    /// Individual bind failures are logged and skipped; having no listener
    /// at all is the only fatal outcome.
    pub async fn bind(ctx: &Arc<ServerContext>) -> anyhow::Result<Gateway> {
        let mut listeners = Vec::new();

        for listener_config in &ctx.config.listeners {
            let acceptor = match build_tls_acceptor(listener_config) {
                Ok(acceptor) => acceptor,
                Err(e) => {
                    error!(address = %listener_config.address, error = %e, "TLS setup failed");
                    continue;
                }
            };
            match TcpListener::bind(listener_config.address).await {
                Ok(listener) => {
                    info!(
                        address = %listener_config.address,
                        tls = listener_config.tls,
                        "listening"
                    );
                    listeners.push((listener, acceptor));
                }
                Err(e) => {
                    error!(address = %listener_config.address, error = %e, "bind failed");
                }
            }
        }

        if listeners.is_empty() {
            anyhow::bail!("no listener could be opened");
        }

        Ok(Gateway {
            listeners,
            ctx: Arc::clone(ctx),
        })
    }

    /// Accept connections until shutdown.
    pub async fn run(self) {
        let mut accept_tasks = Vec::new();
        for (listener, acceptor) in self.listeners {
            let ctx = Arc::clone(&self.ctx);
            accept_tasks.push(tokio::spawn(accept_loop(ctx, listener, acceptor)));
        }

        let mut shutdown_rx = self.ctx.shutdown_tx.subscribe();
        let _ = shutdown_rx.recv().await;

        for task in accept_tasks {
            task.abort();
        }
    }
}

async fn accept_loop(ctx: Arc<ServerContext>, listener: TcpListener, acceptor: Option<TlsAcceptor>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                // Accepts that race the shutdown flag are closed on the spot.
                if ctx.is_shutting_down() {
                    drop(stream);
                    continue;
                }

                let ctx = Arc::clone(&ctx);
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    handle_connection(ctx, stream, addr, acceptor).await;
                });
            }
            Err(e) => {
                error!(error = %e, "failed to accept connection");
            }
        }
    }
}

async fn handle_connection(
    ctx: Arc<ServerContext>,
    stream: TcpStream,
    addr: SocketAddr,
    acceptor: Option<TlsAcceptor>,
) {
    match acceptor {
        Some(acceptor) => match acceptor.accept(stream).await {
            Ok(tls_stream) => run_session(ctx, tls_stream, addr, true).await,
            Err(e) => {
                debug!(peer = %addr, error = %e, "TLS handshake failed");
            }
        },
        None => run_session(ctx, stream, addr, false).await,
    }
}

/// Drive one connection: a writer task plus the read loop.
async fn run_session<S>(ctx: Arc<ServerContext>, stream: S, addr: SocketAddr, tls: bool)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

    let session = Session::attach(&ctx, &addr.ip().to_string(), tls, out_tx);
    dns::spawn_rdns_check(&ctx, &session);

    let writer_task = tokio::spawn(async move {
        while let Some(line) = out_rx.recv().await {
            if writer.write_all(line.as_bytes()).await.is_err() {
                break;
            }
        }
        let _ = writer.shutdown().await;
    });

    let mut shutdown_rx = ctx.shutdown_tx.subscribe();
    let mut buf = vec![0u8; 4096];
    loop {
        tokio::select! {
            result = reader.read(&mut buf) => match result {
                Ok(0) => {
                    session.connection_lost(&ctx, None);
                    break;
                }
                Ok(n) => session.data_received(&ctx, &buf[..n]),
                Err(e) => {
                    session.connection_lost(&ctx, Some(e));
                    break;
                }
            },
            _ = shutdown_rx.recv() => {
                session.exit(&ctx);
                break;
            }
        }
        if !session.is_connected() {
            break;
        }
    }

    // Exit is idempotent; this covers sessions torn down by the read side.
    session.exit(&ctx);
    let _ = writer_task.await;
    debug!(peer = %addr, "connection task finished");
}

/// Build the TLS acceptor for a listener, when it wants one.
fn build_tls_acceptor(listener: &ListenerConfig) -> anyhow::Result<Option<TlsAcceptor>> {
    if !listener.tls {
        return Ok(None);
    }

    let cert_path = listener
        .cert_path
        .as_deref()
        .context("TLS listener missing cert_path")?;
    let key_path = listener
        .key_path
        .as_deref()
        .context("TLS listener missing key_path")?;

    let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(File::open(cert_path)?))
        .collect::<Result<_, _>>()
        .with_context(|| format!("reading certificates from {cert_path}"))?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(File::open(key_path)?))?
        .with_context(|| format!("no private key found in {key_path}"))?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    Ok(Some(TlsAcceptor::from(Arc::new(config))))
}
