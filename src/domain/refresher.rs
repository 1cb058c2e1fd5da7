//! Periodic background cache warming.
//!
//! Every interval, refreshes quotes for the union of held and watched
//! symbols so trades and valuations read warm cache entries. Runs on its
//! own thread and never blocks trade validation; trades always read
//! whatever is currently cached.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, warn};

use super::engine::SimContext;
use super::price_cache::PriceCache;

pub struct Refresher {
    stop_tx: mpsc::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Refresher {
    /// Spawn the refresh thread. Stops on [`Refresher::stop`] or drop.
    pub fn spawn(
        ctx: Arc<SimContext>,
        cache: Arc<PriceCache>,
        interval: Duration,
    ) -> std::io::Result<Refresher> {
        let (stop_tx, stop_rx) = mpsc::channel();

        let handle = std::thread::Builder::new()
            .name("price-refresh".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                }

                let symbols = ctx.active_symbols();
                if symbols.is_empty() {
                    continue;
                }

                let results = cache.quote_many(&symbols);
                let failures = results.iter().filter(|(_, r)| r.is_err()).count();
                debug!(
                    "refreshed {} symbols ({} failures)",
                    symbols.len(),
                    failures
                );
                for (symbol, result) in &results {
                    if let Err(err) = result {
                        warn!("refresh failed for {symbol}: {err}");
                    }
                }
            })?;

        Ok(Refresher {
            stop_tx,
            handle: Some(handle),
        })
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.stop_tx.send(());
            let _ = handle.join();
        }
    }
}

impl Drop for Refresher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
