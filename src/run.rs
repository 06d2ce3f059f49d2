use crate::config::AppCfg;
use crate::core::bnc::book::BookStore;
use crate::core::bnc::data::normalize_symbol;
use crate::core::bnc::processor::ProcessorManager;
use crate::core::bnc::queues::{InQueueSet, OutQueue};
use crate::core::bnc::rest::BncRestClient;
use crate::core::bnc::ws::client::UpstreamClient;
use crate::core::logging::setup_logger;
use crate::downstream::server::DownstreamServer;
use crate::downstream::subscription::SubscriptionManager;
use anyhow::Result;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Bounded time given to every in-flight task to wind down once shutdown starts (§5).
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Assemble every component described in §2 and drive the process until a shutdown signal
/// arrives, then unwind gracefully within `SHUTDOWN_TIMEOUT`. This is the one place the whole
/// data flow - upstream transport -> queues -> processors -> book store -> subscription
/// manager -> downstream subscribers - gets wired together; every piece it instantiates is
/// otherwise free of knowledge of any other.
pub async fn run() -> Result<()> {
    let cfg = AppCfg::load()?;
    setup_logger(&cfg.logging)?;

    let bnc_cfg = cfg.core.bnc;
    let watch_list: Vec<_> = bnc_cfg
        .watch_list
        .iter()
        .map(|symbol| normalize_symbol(symbol))
        .collect();

    let book_store = BookStore::new();
    let in_queues = Arc::new(InQueueSet::new(bnc_cfg.in_queue_capacity));
    let out_queue = OutQueue::new(bnc_cfg.out_queue_capacity);
    let (resync_tx, resync_rx) = mpsc::channel(watch_list.len().max(1) * 4);

    let processors = ProcessorManager::new(book_store, in_queues.clone(), out_queue.clone(), resync_tx);
    let rest = BncRestClient::from_cfg(&bnc_cfg);
    let cancel = CancellationToken::new();
    let subs = SubscriptionManager::new(processors.clone());

    let upstream = UpstreamClient::new(
        bnc_cfg.ws,
        rest,
        processors,
        in_queues,
        subs.clone(),
        watch_list,
        resync_rx,
        cancel.clone(),
    );

    let downstream = DownstreamServer::new(cfg.downstream, subs.clone());

    let upstream_task = tokio::spawn(async move { upstream.run().await });

    let push_loop_task = tokio::spawn({
        let subs = subs.clone();
        async move { subs.run_push_loop(out_queue).await }
    });

    let downstream_cancel = cancel.clone();
    let downstream_task = tokio::spawn(async move { downstream.run(downstream_cancel).await });

    wait_for_shutdown_signal().await;
    info!("Shutdown signal received, cancelling outstanding work.");
    cancel.cancel();

    let graceful = async {
        let _ = upstream_task.await;
        let _ = downstream_task.await;
    };

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, graceful).await.is_err() {
        warn!(
            "Graceful shutdown did not complete within {}s, forcing exit.",
            SHUTDOWN_TIMEOUT.as_secs()
        );
    }

    push_loop_task.abort();
    info!("Shutdown complete.");
    Ok(())
}

/// Waits for either SIGINT (ctrl-c, all platforms) or SIGTERM (unix only) - the pair §5 derives
/// the process-wide cancellation token from.
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
