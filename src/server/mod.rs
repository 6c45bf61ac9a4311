//! Server API: transport registration, startup, and shutdown

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::bank::{InMemoryBank, RegisterBank};
use crate::common::frame::Frame;
use crate::common::phys::PhysLayer;
use crate::decode::DecodeLevel;
use crate::exception::ExceptionCode;
use crate::serial::server::PortTask;
use crate::serial::SerialSettings;
use crate::server::dispatch::{Dispatcher, FunctionTable, Request};
use crate::tcp::server::{ConnectionMode, ListenerTask};

pub(crate) mod dispatch;
pub(crate) mod functions;

// re-export to the public API
pub use crate::tcp::tls::{MinTlsVersion, TlsError, TlsServerConfig};

/// The request channel is the serialization point for the whole server; a
/// small bound provides backpressure when handlers are slow
pub(crate) const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// A function handler: computes the response data payload (or an
/// exception) from the register bank and the request frame
pub type FunctionHandler =
    Box<dyn FnMut(&mut dyn RegisterBank, &Frame) -> Result<Vec<u8>, ExceptionCode> + Send>;

/// Handle used to fire the close signal from another task
#[derive(Clone, Debug)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    /// Close the signal. Every reader task and the dispatcher observe it at
    /// their next suspension point and exit cooperatively.
    pub fn shutdown(&self) {
        self.token.cancel();
    }
}

/// A Modbus server (slave) for TCP, TLS, and serial RTU transports.
///
/// Startup is two-phase: the `listen_*` methods bind listeners and open
/// ports without starting any I/O, and [`Server::start`] spawns the reader
/// tasks and runs the dispatcher until the close signal fires.
///
/// ```no_run
/// use oxbus::server::Server;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut server = Server::new();
///     server.listen_tcp("0.0.0.0:502".parse()?).await?;
///
///     let signal = server.shutdown_signal();
///     tokio::spawn(async move {
///         tokio::signal::ctrl_c().await.ok();
///         signal.shutdown();
///     });
///
///     server.start().await;
///     Ok(())
/// }
/// ```
pub struct Server {
    functions: FunctionTable,
    bank: Box<dyn RegisterBank>,
    listeners: Vec<(TcpListener, ConnectionMode)>,
    ports: Vec<(String, tokio_serial::SerialStream)>,
    decode: DecodeLevel,
    shutdown: CancellationToken,
}

impl Server {
    /// Create a server with an [`InMemoryBank`] and the eight standard
    /// function handlers
    pub fn new() -> Self {
        Self {
            functions: FunctionTable::standard(),
            bank: Box::new(InMemoryBank::new()),
            listeners: Vec::new(),
            ports: Vec::new(),
            decode: DecodeLevel::nothing(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Replace the register bank with a custom implementation
    pub fn with_bank(mut self, bank: Box<dyn RegisterBank>) -> Self {
        self.bank = bank;
        self
    }

    /// Override or extend the handler for a function code
    pub fn with_function(mut self, code: u8, handler: FunctionHandler) -> Self {
        self.functions.set(code, handler);
        self
    }

    /// Change how much of the wire traffic is decoded into the log
    pub fn with_decode_level(mut self, decode: DecodeLevel) -> Self {
        self.decode = decode;
        self
    }

    /// Handle used to trigger shutdown once [`Server::start`] is running
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            token: self.shutdown.clone(),
        }
    }

    /// Bind a TCP listener. No connections are accepted until
    /// [`Server::start`] runs. Returns the bound address, which is useful
    /// when binding port 0.
    pub async fn listen_tcp(&mut self, addr: SocketAddr) -> std::io::Result<SocketAddr> {
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        self.listeners.push((listener, ConnectionMode::Plain));
        Ok(local)
    }

    /// Bind a TCP listener that wraps every connection in a TLS session
    /// using the same framing
    pub async fn listen_tls(
        &mut self,
        addr: SocketAddr,
        config: TlsServerConfig,
    ) -> std::io::Result<SocketAddr> {
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        self.listeners.push((listener, ConnectionMode::Tls(config)));
        Ok(local)
    }

    /// Open a serial port for Modbus RTU.
    ///
    /// `path` is generally `/dev/ttyUSB0` on Linux and `COM1` on Windows.
    pub fn listen_rtu(
        &mut self,
        path: &str,
        settings: SerialSettings,
    ) -> Result<(), tokio_serial::Error> {
        let serial = crate::serial::open(path, settings)?;
        self.ports.push((path.to_string(), serial));
        Ok(())
    }

    /// Spawn one reader task per listener and per serial port, then run the
    /// dispatcher in the calling context.
    ///
    /// Returns after the close signal fires: the readers are joined first,
    /// then the listeners and ports are closed.
    pub async fn start(self) {
        let (tx, mut rx) = tokio::sync::mpsc::channel::<Request>(REQUEST_CHANNEL_CAPACITY);
        let mut readers: JoinSet<()> = JoinSet::new();

        for (listener, mode) in self.listeners {
            let addr = listener.local_addr().ok();
            let task = ListenerTask::new(
                listener,
                mode,
                tx.clone(),
                self.shutdown.clone(),
                self.decode,
            );
            readers.spawn(
                task.run()
                    .instrument(tracing::info_span!("Modbus-Server-TCP", "listen" = ?addr)),
            );
        }

        for (path, serial) in self.ports {
            let task = PortTask::new(
                PhysLayer::new_serial(serial, self.decode.physical),
                self.decode.frame,
                tx.clone(),
                self.shutdown.clone(),
            );
            readers.spawn(
                task.run()
                    .instrument(tracing::info_span!("Modbus-Server-RTU", "port" = ?path)),
            );
        }

        // the readers hold the only remaining senders
        drop(tx);

        let mut dispatcher = Dispatcher::new(self.functions, self.bank);
        dispatcher.run(&mut rx, &self.shutdown).await;

        // dropping the receiver discards requests still in the channel, which
        // releases any reader awaiting a reply sink that will never be served
        drop(rx);

        while readers.join_next().await.is_some() {}
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}
