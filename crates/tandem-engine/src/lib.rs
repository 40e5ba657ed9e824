//! tandem-engine: the scheduled-action engine.
//!
//! Wires the store, the generative backend, the tool protocol and the
//! delivery gateway into the two entry points the outside world calls:
//! the live chat turn (`Engine::handle_chat_turn`) and the dispatch loop
//! (`Engine::run`), which wakes persisted actions, regenerates their
//! payload with live conversational context and delivers the result.

pub mod chat;
pub mod context;
pub mod delivery;
pub mod dispatch;
pub mod turn;

#[cfg(test)]
mod testutil;

use std::sync::Arc;
use std::time::Duration;

use tandem_llm::{GenerativeBackend, Translator};
use tandem_store::Store;
use tandem_tools::Dispatcher;
use tandem_types::DeliveryGateway;

pub use chat::ChatOutcome;
pub use delivery::WebhookDelivery;
pub use dispatch::TickStats;

/// Tunables for one engine instance.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Dispatch poll interval. Timing is only as precise as this interval.
    pub poll_interval: Duration,
    /// How many recent conversation entries a fired action sees.
    pub history_window: usize,
    /// Cap on tool-call rounds within one generated turn.
    pub max_tool_rounds: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            history_window: 5,
            max_tool_rounds: 8,
        }
    }
}

/// The assembled engine. One instance per process; the dispatch loop is the
/// only time-based writer, while chat turns share the same store and tool
/// protocol concurrently.
pub struct Engine {
    store: Store,
    backend: Arc<dyn GenerativeBackend>,
    translator: Arc<Translator>,
    delivery: Arc<dyn DeliveryGateway>,
    dispatcher: Dispatcher,
    options: EngineOptions,
}

impl Engine {
    pub fn new(
        store: Store,
        backend: Arc<dyn GenerativeBackend>,
        delivery: Arc<dyn DeliveryGateway>,
        options: EngineOptions,
    ) -> Self {
        let translator = Arc::new(Translator::new(backend.clone(), store.clone()));
        let dispatcher = Dispatcher::new(store.clone(), delivery.clone(), translator.clone());
        Self {
            store,
            backend,
            translator,
            delivery,
            dispatcher,
            options,
        }
    }
}
