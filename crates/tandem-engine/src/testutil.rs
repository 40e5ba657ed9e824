//! Test doubles shared by the engine tests: a scripted generative backend
//! and a recording delivery gateway.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tandem_llm::{ChatRequest, ChatResponse, GenerativeBackend, LlmError, ToolInvocation};
use tandem_store::Store;
use tandem_types::{DeliveryGateway, User};

use crate::{Engine, EngineOptions};

/// Build a wire-shaped tool invocation for scripting.
pub fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> ToolInvocation {
    ToolInvocation {
        id: id.into(),
        name: name.into(),
        arguments: arguments.to_string(),
    }
}

enum Script {
    Text(String),
    Calls(Vec<ToolInvocation>),
    Error,
}

/// Backend double that replays a queued script and records every request.
/// An exhausted script answers with plain "OK" so incidental calls (e.g.
/// translations) don't panic a test.
#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedBackend {
    pub fn push_text(&self, text: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Script::Text(text.to_string()));
    }

    pub fn push_calls(&self, calls: Vec<ToolInvocation>) {
        self.script.lock().unwrap().push_back(Script::Calls(calls));
    }

    pub fn push_error(&self) {
        self.script.lock().unwrap().push_back(Script::Error);
    }

    pub async fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl GenerativeBackend for ScriptedBackend {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        self.requests.lock().unwrap().push(request);
        match self.script.lock().unwrap().pop_front() {
            Some(Script::Text(content)) => Ok(ChatResponse {
                content,
                tool_calls: Vec::new(),
            }),
            Some(Script::Calls(tool_calls)) => Ok(ChatResponse {
                content: String::new(),
                tool_calls,
            }),
            Some(Script::Error) => Err(LlmError::Timeout),
            None => Ok(ChatResponse {
                content: "OK".into(),
                tool_calls: Vec::new(),
            }),
        }
    }
}

/// Delivery double that records `(chat_id, text)` pairs and can be told to
/// refuse deliveries.
#[derive(Default)]
pub struct RecordingDelivery {
    sent: Mutex<Vec<(String, String)>>,
    failing: AtomicBool,
}

impl RecordingDelivery {
    pub async fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail_next(&self, fail: bool) {
        self.failing.store(fail, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl DeliveryGateway for RecordingDelivery {
    async fn deliver(&self, chat_id: &str, text: &str) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("delivery refused");
        }
        self.sent
            .lock()
            .unwrap()
            .push((chat_id.to_string(), text.to_string()));
        Ok(())
    }
}

/// A fully wired engine over an in-memory store with one registered user
/// ("Alice", chat id "tg:42").
pub struct Harness {
    pub store: Store,
    pub backend: Arc<ScriptedBackend>,
    pub delivery: Arc<RecordingDelivery>,
    pub engine: Engine,
    pub user: User,
}

impl Harness {
    pub async fn new() -> Self {
        let store = Store::open_in_memory().unwrap();
        let user_id = store.create_user("tg:42", "Alice").await.unwrap();
        let user = store.get_user(user_id).await.unwrap().unwrap();
        let backend = Arc::new(ScriptedBackend::default());
        let delivery = Arc::new(RecordingDelivery::default());
        let engine = Engine::new(
            store.clone(),
            backend.clone(),
            delivery.clone(),
            EngineOptions::default(),
        );
        Self {
            store,
            backend,
            delivery,
            engine,
            user,
        }
    }
}
