use super::config::DownstreamCfg;
use super::protocol::ClientCommand;
use super::subscription::SubscriptionManager;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// Accepts downstream WS connections and hands each one a reader/writer task pair. All outbound
/// order-book traffic is produced by `SubscriptionManager::run_push_loop`, not here - this is
/// purely connection lifecycle and command parsing, per the teacher's separation of listener
/// (`WSServer`) from the per-connection business logic (`RequestProcessor`).
pub struct DownstreamServer {
    cfg: DownstreamCfg,
    subs: SubscriptionManager,
}

impl DownstreamServer {
    pub fn new(cfg: DownstreamCfg, subs: SubscriptionManager) -> Self {
        Self { cfg, subs }
    }

    pub async fn run(&self, cancel: CancellationToken) -> std::io::Result<()> {
        let listener = TcpListener::bind(&self.cfg.listen_addr).await?;
        info!("Downstream WS endpoint listening on {}", self.cfg.listen_addr);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Downstream endpoint shutting down.");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(pair) => pair,
                        Err(err) => {
                            warn!("Failed to accept downstream connection: {err}");
                            continue;
                        }
                    };
                    debug!("Accepted downstream connection from {addr}");
                    let subs = self.subs.clone();
                    let capacity = self.cfg.subscriber_queue_capacity;
                    tokio::spawn(async move {
                        if let Err(err) = handle_connection(stream, subs, capacity).await {
                            warn!("Downstream connection from {addr} ended with error: {err}");
                        }
                    });
                }
            }
        }
    }
}

async fn handle_connection(
    stream: tokio::net::TcpStream,
    subs: SubscriptionManager,
    capacity: usize,
) -> tokio_tungstenite::tungstenite::Result<()> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut read) = ws_stream.split();
    let (subscriber, mut outbound) = subs.register(capacity);

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = read.next().await {
        let message = match message {
            Ok(message) => message,
            Err(err) => {
                debug!("Downstream read error: {err}");
                break;
            }
        };

        let Message::Text(text) = message else {
            continue;
        };

        match ClientCommand::parse(&text) {
            ClientCommand::Subscribe(symbol) => {
                subs.add_subscription(&symbol, subscriber.clone()).await;
            }
            ClientCommand::Unsubscribe(symbol) => {
                subs.remove_subscription(&symbol, &subscriber).await;
            }
            ClientCommand::Unknown(raw) => {
                debug!("Unknown downstream command, echoing back: {raw}");
                if !subscriber.echo(raw) {
                    warn!("Evicting subscriber #{} after outbound overflow.", subscriber.id());
                    subs.remove_user(&subscriber).await;
                }
            }
        }
    }

    subs.remove_user(&subscriber).await;
    writer.abort();
    Ok(())
}
