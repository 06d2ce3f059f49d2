use super::config::WsCfg;
use super::protocol::{RequestIdGenerator, SubscriptionRequest};
use crate::core::bnc::data::{EventUpdate, Symbol};
use crate::core::bnc::error::BncResult;
use crate::core::bnc::processor::ProcessorManager;
use crate::core::bnc::queues::InQueueSet;
use crate::core::bnc::rest::BncRestClient;
use crate::core::bnc::snapshot::SnapshotFetcher;
use crate::downstream::subscription::SubscriptionManager;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// Outcome of one connection attempt's lifetime, used to decide how the outer loop continues.
enum ConnectionOutcome {
    /// Read error, peer close, or read-deadline expiry. Caller resets processors and redials.
    Disconnected,
    /// External cancellation observed. Caller exits the reconnect loop entirely.
    Shutdown,
}

/// Drives the upstream transport end to end: dial, subscribe-then-snapshot each watched symbol,
/// demultiplex control vs depth frames, and reconnect with exponential backoff on any failure.
/// This is the one place a disconnect, a sequence gap, and a clean shutdown all funnel through.
pub struct UpstreamClient {
    cfg: WsCfg,
    rest: BncRestClient,
    processors: ProcessorManager,
    in_queues: Arc<InQueueSet>,
    subs: SubscriptionManager,
    watch_list: Vec<Symbol>,
    id_gen: Arc<RequestIdGenerator>,
    resync_rx: Mutex<mpsc::Receiver<Symbol>>,
    cancel: CancellationToken,
}

impl UpstreamClient {
    pub fn new(
        cfg: WsCfg,
        rest: BncRestClient,
        processors: ProcessorManager,
        in_queues: Arc<InQueueSet>,
        subs: SubscriptionManager,
        watch_list: Vec<Symbol>,
        resync_rx: mpsc::Receiver<Symbol>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            cfg,
            rest,
            processors,
            in_queues,
            subs,
            watch_list,
            id_gen: Arc::new(RequestIdGenerator::new()),
            resync_rx: Mutex::new(resync_rx),
            cancel,
        }
    }

    /// Stops every processor, drops every book, and re-arms every downstream subscriber's
    /// cursors to "not yet primed" - the reconnect path's full reset (§8 property 7 / scenario
    /// S5: existing subscribers must re-prime with a fresh snapshot, not keep feeding deltas
    /// against a book that no longer exists).
    async fn full_reset(&self) {
        self.processors.reset_processors().await;
        self.subs.invalidate_all().await;
    }

    /// Runs until the cancellation token fires. Never returns early on a transport failure -
    /// it redials instead, so callers just `tokio::spawn` this once at startup.
    pub async fn run(&self) {
        let mut backoff = Duration::from_millis(self.cfg.initial_backoff_ms);

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            match self.connect_once().await {
                Ok(ConnectionOutcome::Shutdown) => break,
                Ok(ConnectionOutcome::Disconnected) => {
                    warn!("Upstream connection lost, resetting processors before redial.");
                    self.full_reset().await;
                    backoff = Duration::from_millis(self.cfg.initial_backoff_ms);
                }
                Err(err) => {
                    error!("Failed to connect to upstream: {err}");
                    self.full_reset().await;
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = self.cancel.cancelled() => break,
                    }
                    backoff = (backoff * 2).min(Duration::from_millis(self.cfg.max_backoff_ms));
                }
            }
        }

        info!("Upstream client shut down.");
    }

    /// One full `Connecting` -> `Connected` -> terminal-outcome cycle.
    async fn connect_once(&self) -> BncResult<ConnectionOutcome> {
        info!("Connecting to upstream at {}", self.cfg.baseurl);
        let (ws_stream, _) = connect_async(&self.cfg.baseurl).await?;
        info!("Connected to upstream.");

        let (mut sink, mut stream) = ws_stream.split();
        let (control_tx, mut control_rx) = mpsc::channel::<Message>(64);

        for symbol in &self.watch_list {
            self.bootstrap_symbol(symbol.clone(), control_tx.clone());
        }

        let read_deadline = Duration::from_secs(self.cfg.read_deadline_secs);

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(ConnectionOutcome::Shutdown);
                }

                Some(symbol) = self.resync_rx.lock().await.recv() => {
                    self.processors.resync_symbol(&symbol).await;
                    self.subs.invalidate_symbol(&symbol).await;
                    self.bootstrap_symbol(symbol, control_tx.clone());
                }

                outbound = control_rx.recv() => {
                    match outbound {
                        Some(message) => {
                            if let Err(err) = sink.send(message).await {
                                error!("Failed to write control frame: {err}");
                                return Ok(ConnectionOutcome::Disconnected);
                            }
                        }
                        None => continue,
                    }
                }

                inbound = tokio::time::timeout(read_deadline, stream.next()) => {
                    match inbound {
                        Err(_elapsed) => {
                            warn!("Read deadline of {}s expired with no message.", read_deadline.as_secs());
                            return Ok(ConnectionOutcome::Disconnected);
                        }
                        Ok(None) => {
                            warn!("Upstream closed the connection.");
                            return Ok(ConnectionOutcome::Disconnected);
                        }
                        Ok(Some(Err(err))) => {
                            warn!("Error reading upstream message: {err}");
                            return Ok(ConnectionOutcome::Disconnected);
                        }
                        Ok(Some(Ok(message))) => {
                            self.handle_message(message).await;
                        }
                    }
                }
            }
        }
    }

    /// Subscribe for `symbol` via the control channel, then kick off the REST snapshot fetch
    /// that will later release its processor. Runs detached so the connection's main select
    /// loop is never blocked on a single symbol's bootstrap.
    fn bootstrap_symbol(&self, symbol: Symbol, control_tx: mpsc::Sender<Message>) {
        self.processors.start_processor(&symbol);

        let request = SubscriptionRequest::subscribe(&symbol, self.id_gen.next_id());
        let processors = self.processors.clone();
        let rest = self.rest.clone();

        tokio::spawn(async move {
            match serde_json::to_string(&request) {
                Ok(payload) => {
                    if control_tx.send(Message::Text(payload)).await.is_err() {
                        debug!("Control channel closed before subscribe for {symbol} could be sent.");
                        return;
                    }
                }
                Err(err) => {
                    error!("Failed to encode subscribe request for {symbol}: {err}");
                    return;
                }
            }

            match rest.fetch_snapshot(&symbol).await {
                Ok(snapshot) => {
                    processors
                        .update_bids_asks(&symbol, &snapshot.bids, &snapshot.asks)
                        .await;
                    processors
                        .set_order_book_ready(&symbol, snapshot.last_update_id)
                        .await;
                    info!("{symbol} bootstrapped at lastUpdateId={}", snapshot.last_update_id);
                }
                Err(err) => {
                    error!("Snapshot fetch for {symbol} failed, book will stay not-ready: {err}");
                }
            }
        });
    }

    /// A message is a control reply iff it carries a top-level `id` field; otherwise it is a
    /// depth event. Depth events are parsed and handed to the symbol's in-queue; control
    /// replies are logged (list-subscriptions responses have no further consumer in this crate).
    ///
    /// Enqueues inline rather than detaching onto a spawned task: §3 sizes the in-queue as a
    /// bounded backpressure mechanism whose overflow policy is "block the writer", and §5 lists
    /// "upstream socket read/write" and "queue send/receive" as suspension points on the *same*
    /// task - a full per-symbol queue must stall this read loop, not spawn an unbounded pile of
    /// tasks each waiting on their own turn to enqueue.
    async fn handle_message(&self, message: Message) {
        let text = match message {
            Message::Text(text) => text,
            Message::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(err) => {
                    warn!("Dropping non-UTF8 binary frame: {err}");
                    return;
                }
            },
            Message::Ping(_) | Message::Pong(_) | Message::Close(_) | Message::Frame(_) => return,
        };

        let looks_like_control = serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .and_then(|value| value.get("id").cloned())
            .is_some();

        if looks_like_control {
            debug!("Received control frame: {text}");
            return;
        }

        match serde_json::from_str::<EventUpdate>(&text) {
            Ok(event) => {
                self.in_queues.enqueue(event).await;
            }
            Err(err) => {
                warn!("Failed to parse depth event, dropping: {err}");
            }
        }
    }
}
