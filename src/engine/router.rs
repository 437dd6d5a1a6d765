//! Event router: one single-writer task per symbol
//!
//! Events are fanned out by symbol to dedicated tasks so each symbol's
//! engine is mutated by exactly one task, in arrival order.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::pipeline::{EngineSettings, EngineSummary, SymbolEngine};
use crate::common::channels::create_event_channel_with_size;
use crate::common::errors::{CoreError, Result};
use crate::market::events::NormalizedEvent;
use crate::ml::MlLayer;

struct SymbolWorker {
    sender: mpsc::Sender<NormalizedEvent>,
    handle: JoinHandle<EngineSummary>,
}

fn spawn_worker(symbol: &str, settings: &EngineSettings, ml: &Arc<MlLayer>) -> SymbolWorker {
    let (sender, mut receiver) = create_event_channel_with_size(settings.channel_size);
    let mut engine = SymbolEngine::new(symbol, settings.clone(), Arc::clone(ml));

    let handle = tokio::spawn(async move {
        debug!(symbol = %engine.symbol(), "Symbol worker started");
        while let Some(event) = receiver.recv().await {
            engine.handle_event(&event);
        }
        let summary = engine.summary();
        debug!(symbol = %summary.symbol, events = summary.counters.events, "Symbol worker finished");
        summary
    });

    SymbolWorker { sender, handle }
}

/// Drain `receiver`, routing each event to its symbol's worker
///
/// Events without a symbol go to `default_symbol`. Returns one summary per
/// symbol, sorted by symbol, once the input channel closes.
pub async fn run_event_router(
    mut receiver: mpsc::Receiver<NormalizedEvent>,
    settings: EngineSettings,
    ml: Arc<MlLayer>,
    default_symbol: String,
) -> Result<Vec<EngineSummary>> {
    let mut workers: HashMap<String, SymbolWorker> = HashMap::new();
    let mut routed: u64 = 0;

    while let Some(event) = receiver.recv().await {
        let symbol = event
            .symbol
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| default_symbol.clone());

        let worker = workers.entry(symbol.clone()).or_insert_with(|| {
            info!(symbol = %symbol, "Spawning symbol worker");
            spawn_worker(&symbol, &settings, &ml)
        });

        if let Err(e) = worker.sender.send(event).await {
            error!(symbol = %symbol, "Symbol worker stopped early");
            return Err(e.into());
        }
        routed += 1;
    }

    info!(routed, symbols = workers.len(), "Input closed, draining workers");

    let mut summaries = Vec::with_capacity(workers.len());
    for (symbol, worker) in workers {
        drop(worker.sender);
        match worker.handle.await {
            Ok(summary) => summaries.push(summary),
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Symbol worker failed");
                return Err(CoreError::Internal(format!("worker for {symbol} failed: {e}")));
            }
        }
    }
    summaries.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::channels::create_event_channel;
    use crate::market::events::{Channel, ChannelKind, EventPayload, PriceTick};
    use crate::ml::registry::ModelRegistry;
    use crate::ml::RolloutPolicies;
    use pretty_assertions::assert_eq;

    fn tick(symbol: Option<&str>, price: f64, at_ms: i64) -> NormalizedEvent {
        NormalizedEvent {
            channel: Channel::new(ChannelKind::Price, symbol.map(str::to_string)),
            symbol: symbol.map(str::to_string),
            timestamp_ms: at_ms,
            sequence: None,
            source: None,
            received_at_ms: at_ms,
            payload: EventPayload::Price(PriceTick {
                price,
                change: None,
                change_pct: None,
                volume: None,
            }),
        }
    }

    fn ml() -> Arc<MlLayer> {
        Arc::new(MlLayer::new(
            Arc::new(ModelRegistry::with_builtin_defaults()),
            RolloutPolicies::default(),
        ))
    }

    #[tokio::test]
    async fn test_routes_by_symbol() {
        let (tx, rx) = create_event_channel();
        let router = tokio::spawn(run_event_router(rx, EngineSettings::default(), ml(), "SPX".to_string()));

        tx.send(tick(Some("SPY"), 500.0, 1_000)).await.unwrap();
        tx.send(tick(Some("SPX"), 5000.0, 1_000)).await.unwrap();
        tx.send(tick(None, 5001.0, 2_000)).await.unwrap();
        tx.send(tick(Some("SPY"), 501.0, 2_000)).await.unwrap();
        drop(tx);

        let summaries = router.await.unwrap().unwrap();
        let symbols: Vec<&str> = summaries.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["SPX", "SPY"]);
        assert_eq!(summaries[0].counters.events, 2);
        assert_eq!(summaries[0].last_price, Some(5001.0));
        assert_eq!(summaries[1].last_price, Some(501.0));
    }

    #[tokio::test]
    async fn test_empty_input_yields_no_summaries() {
        let (tx, rx) = create_event_channel();
        drop(tx);
        let summaries = run_event_router(rx, EngineSettings::default(), ml(), "SPX".to_string())
            .await
            .unwrap();
        assert!(summaries.is_empty());
    }
}
