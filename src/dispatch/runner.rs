//! The per-assignment dispatch loop
//!
//! ```text
//! register ─→ dispatch(wait) ─→ dispatch(wait) ─→ … ─→ token cancelled ─→ unregister
//!                   │
//!                   └─ error ─→ sleep(retry_delay) or cancelled
//! ```

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, trace};

use crate::cluster::LoopLauncher;

use super::dispatcher::{Context, Dispatcher};
use super::observer::ObserverRegistry;

/// Starts [`run_session_loop`] for every config assigned to this node
pub struct SessionLauncher {
    ctx: Arc<Context>,
    observer: Arc<ObserverRegistry>,
}

impl SessionLauncher {
    pub fn new(ctx: Arc<Context>, observer: Arc<ObserverRegistry>) -> Self {
        Self { ctx, observer }
    }
}

impl LoopLauncher for SessionLauncher {
    fn launch(&self, config: String, token: CancellationToken) -> BoxFuture<'static, ()> {
        run_session_loop(self.ctx.clone(), self.observer.clone(), config, token).boxed()
    }
}

/// Dispatch `config` iteration after iteration until `token` is cancelled
///
/// A running iteration is never interrupted; the token is checked between
/// iterations and while waiting.
#[instrument(skip(ctx, observer, token))]
pub async fn run_session_loop(
    ctx: Arc<Context>,
    observer: Arc<ObserverRegistry>,
    config: String,
    token: CancellationToken,
) {
    let retry_delay = ctx.retry_delay;
    let dispatcher = Dispatcher::new(ctx, token.clone());
    observer.register(&config, dispatcher.stats().clone());
    info!(client = %dispatcher.id(), "dispatch loop started");

    while !token.is_cancelled() {
        match dispatcher.dispatch(&config, None, true).await {
            Ok(report) => trace!(session = %report.id, "iteration completed"),
            Err(e) => {
                error!("iteration failed: {e}");
                tokio::select! {
                    _ = tokio::time::sleep(retry_delay) => {}
                    _ = token.cancelled() => break,
                }
            }
        }
    }

    observer.unregister(&config, dispatcher.stats());
    info!(client = %dispatcher.id(), "dispatch loop stopped");
}
