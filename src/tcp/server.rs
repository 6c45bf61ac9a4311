use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::common::phys::PhysLayer;
use crate::decode::DecodeLevel;
use crate::error::RequestError;
use crate::server::dispatch::{ReplySink, Request};
use crate::tcp::frame::FramedReader;
use crate::tcp::tls::TlsServerConfig;

/// Read deadline on established connections. Expiry bounds how long a
/// quiet connection can delay shutdown; the reader rechecks the close
/// signal and resumes.
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// How long to pause after a transient accept error before retrying
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Clone)]
pub(crate) enum ConnectionMode {
    Plain,
    Tls(TlsServerConfig),
}

impl ConnectionMode {
    async fn establish(
        &self,
        socket: TcpStream,
        level: crate::decode::PhysDecodeLevel,
    ) -> Result<PhysLayer, String> {
        match self {
            ConnectionMode::Plain => Ok(PhysLayer::new_tcp(socket, level)),
            ConnectionMode::Tls(config) => config.handle_connection(socket, level).await,
        }
    }
}

/// Accept loop for one TCP listener. Spawns a reader task per accepted
/// connection and joins them all before dropping the listener.
pub(crate) struct ListenerTask {
    listener: TcpListener,
    mode: ConnectionMode,
    requests: tokio::sync::mpsc::Sender<Request>,
    shutdown: CancellationToken,
    decode: DecodeLevel,
}

impl ListenerTask {
    pub(crate) fn new(
        listener: TcpListener,
        mode: ConnectionMode,
        requests: tokio::sync::mpsc::Sender<Request>,
        shutdown: CancellationToken,
        decode: DecodeLevel,
    ) -> Self {
        Self {
            listener,
            mode,
            requests,
            shutdown,
            decode,
        }
    }

    pub(crate) async fn run(self) {
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("listener shutdown");
                    break;
                }
                result = self.listener.accept() => {
                    match result {
                        Ok((socket, addr)) => {
                            self.handle(socket, addr, &mut connections);
                        }
                        Err(err) if is_transient(&err) => {
                            tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                        }
                        Err(err) => {
                            if self.shutdown.is_cancelled() {
                                break;
                            }
                            tracing::error!("error accepting connection: {}", err);
                            break;
                        }
                    }
                }
            }
        }

        // connection readers observe the same close signal; wait for them
        // before the listener is dropped
        while connections.join_next().await.is_some() {}
    }

    fn handle(&self, socket: TcpStream, addr: SocketAddr, connections: &mut JoinSet<()>) {
        let decode = self.decode;
        let mode = self.mode.clone();
        let requests = self.requests.clone();
        let shutdown = self.shutdown.clone();
        let span = tracing::Span::current();

        tracing::info!("accepted connection from: {}", addr);

        connections.spawn(
            async move {
                match mode.establish(socket, decode.physical).await {
                    Err(err) => {
                        tracing::warn!("error from {}: {}", addr, err);
                    }
                    Ok(phys) => {
                        ConnectionTask::new(phys, requests, shutdown, decode).run().await;
                        tracing::info!("closed connection from: {}", addr);
                    }
                }
            }
            .instrument(tracing::info_span!(parent: &span, "Session", "remote" = ?addr)),
        );
    }
}

fn is_transient(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::WouldBlock
            | std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::Interrupted
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::ConnectionReset
    )
}

/// Reader task for one established connection. Reads one frame at a time
/// and writes the reply before reading the next, so requests on a single
/// connection are strictly serialized.
struct ConnectionTask {
    phys: PhysLayer,
    reader: FramedReader,
    requests: tokio::sync::mpsc::Sender<Request>,
    shutdown: CancellationToken,
}

impl ConnectionTask {
    fn new(
        phys: PhysLayer,
        requests: tokio::sync::mpsc::Sender<Request>,
        shutdown: CancellationToken,
        decode: DecodeLevel,
    ) -> Self {
        Self {
            phys,
            reader: FramedReader::new(decode.frame),
            requests,
            shutdown,
        }
    }

    async fn run(mut self) {
        loop {
            let frame = tokio::select! {
                _ = self.shutdown.cancelled() => return,
                result = tokio::time::timeout(READ_TIMEOUT, self.reader.next_frame(&mut self.phys)) => {
                    match result {
                        // deadline expired: recheck the close signal and resume
                        Err(_) => continue,
                        Ok(Err(RequestError::Io(std::io::ErrorKind::UnexpectedEof))) => {
                            tracing::debug!("connection closed by peer");
                            return;
                        }
                        // a stream that fails to frame cannot be resynchronized
                        Ok(Err(err)) => {
                            tracing::warn!("closing connection: {}", err);
                            return;
                        }
                        Ok(Ok(frame)) => frame,
                    }
                }
            };

            let (reply, response) = ReplySink::new();
            let request = Request::new(frame, reply);

            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                result = self.requests.send(request) => {
                    if result.is_err() {
                        return;
                    }
                }
            }

            match response.await {
                Ok(bytes) => {
                    if let Err(err) = self.phys.write(&bytes).await {
                        tracing::warn!("write error: {}", err);
                        return;
                    }
                }
                // the dispatcher dropped the request during shutdown
                Err(_) => return,
            }
        }
    }
}
