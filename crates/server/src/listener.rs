//! Accept loop (§4.6, §6): binds a TCP listener (a Unix domain socket
//! would plug in the same way, behind the same `handle_connection` call)
//! and spawns one task per accepted connection.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::Config;
use crate::connection::handle_connection;
use crate::dispatch::Dispatcher;

pub async fn run(listener: TcpListener, config: Arc<Config>, dispatcher: Arc<Dispatcher>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        info!(component = "listener", event = "connection.accepted", peer = %peer, "Accepted connection");
                        let config = config.clone();
                        let dispatcher = dispatcher.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, config, dispatcher).await;
                        });
                    }
                    Err(err) => {
                        warn!(component = "listener", event = "listener.accept_error", error = %err, "Accept failed");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!(component = "listener", event = "listener.shutdown", "Listener draining for shutdown");
                    break;
                }
            }
        }
    }
}

pub async fn bind(config: &Config) -> std::io::Result<TcpListener> {
    TcpListener::bind(("127.0.0.1", config.port)).await
}
