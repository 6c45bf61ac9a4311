use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;

use oxbus::server::Server;

#[derive(Debug, Parser)]
#[command(name = "oxbus", about = "Modbus TCP server (slave)", version)]
struct Cli {
    /// TCP address to listen on
    #[arg(long, default_value = ":8080")]
    addr: String,
}

/// Accepts a bare `:port` as shorthand for binding all interfaces
fn parse_bind_addr(addr: &str) -> anyhow::Result<SocketAddr> {
    let addr = if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    };
    addr.parse()
        .with_context(|| format!("invalid listen address: {addr}"))
}

async fn shutdown_requested() {
    #[cfg(unix)]
    {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let addr = parse_bind_addr(&cli.addr)?;

    let mut server = Server::new();
    let bound = server
        .listen_tcp(addr)
        .await
        .with_context(|| format!("unable to listen on {addr}"))?;
    tracing::info!("listening on {}", bound);

    let signal = server.shutdown_signal();
    tokio::spawn(async move {
        shutdown_requested().await;
        tracing::info!("shutdown signal received");
        signal.shutdown();
    });

    server.start().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_port_binds_all_interfaces() {
        assert_eq!(
            parse_bind_addr(":8080").unwrap(),
            "0.0.0.0:8080".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn full_addresses_parse_unchanged() {
        assert_eq!(
            parse_bind_addr("127.0.0.1:502").unwrap(),
            "127.0.0.1:502".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn garbage_addresses_are_rejected() {
        assert!(parse_bind_addr("not-an-address").is_err());
    }
}
