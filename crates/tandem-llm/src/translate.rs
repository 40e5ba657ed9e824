//! Best-effort translation of user-facing strings.
//!
//! Canonical strings are English; everything shown to a user goes through
//! `Translator::translate` first. Lookup order: in-process cache, then the
//! translations table, then a one-shot generation request whose result is
//! persisted. Translation never fails a caller — any error falls back to
//! the untranslated text.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use tandem_store::Store;

use crate::types::{ChatMessage, ChatRequest};
use crate::GenerativeBackend;

/// Translation layer with an explicit, process-owned cache. The map grows
/// without eviction; the working set is the bot's fixed system strings per
/// language, which stays small.
pub struct Translator {
    backend: Arc<dyn GenerativeBackend>,
    store: Store,
    cache: Mutex<HashMap<(String, String), String>>,
}

impl Translator {
    pub fn new(backend: Arc<dyn GenerativeBackend>, store: Store) -> Self {
        Self {
            backend,
            store,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn translate(&self, text: &str, target_language: &str) -> String {
        // Canonical strings are already English
        if target_language == "en" || text.trim().is_empty() {
            return text.to_string();
        }

        let key = (text.to_string(), target_language.to_string());
        if let Some(hit) = self.cache.lock().await.get(&key) {
            return hit.clone();
        }

        match self.store.get_translation(text, target_language).await {
            Ok(Some(stored)) => {
                self.cache.lock().await.insert(key, stored.clone());
                return stored;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Translation lookup failed"),
        }

        info!(target_language, "Translating text");
        let request = ChatRequest::new(vec![ChatMessage::user(format!(
            "Translate the following text to {target_language}: {text}"
        ))]);
        let translated = match self.backend.complete(request).await {
            Ok(response) => {
                let out = response.content.trim().to_string();
                if out.is_empty() {
                    return text.to_string();
                }
                out
            }
            Err(e) => {
                warn!(error = %e, "Translation request failed, keeping original text");
                return text.to_string();
            }
        };

        if let Err(e) = self
            .store
            .put_translation(text, target_language, &translated)
            .await
        {
            warn!(error = %e, "Failed to persist translation");
        }
        self.cache.lock().await.insert(key, translated.clone());
        translated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::types::ChatResponse;
    use crate::LlmError;

    struct FixedBackend {
        reply: Option<String>,
        calls: AtomicUsize,
    }

    impl FixedBackend {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Some(reply.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                reply: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl GenerativeBackend for FixedBackend {
        async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Some(reply) => Ok(ChatResponse {
                    content: reply.clone(),
                    tool_calls: Vec::new(),
                }),
                None => Err(LlmError::Timeout),
            }
        }
    }

    #[tokio::test]
    async fn test_english_passes_through_without_backend_call() {
        let backend = Arc::new(FixedBackend::replying("Hallo"));
        let translator = Translator::new(backend.clone(), Store::open_in_memory().unwrap());
        assert_eq!(translator.translate("Hello", "en").await, "Hello");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_translation_is_cached_and_persisted() {
        let store = Store::open_in_memory().unwrap();
        let backend = Arc::new(FixedBackend::replying("Hallo"));
        let translator = Translator::new(backend.clone(), store.clone());

        assert_eq!(translator.translate("Hello", "de").await, "Hallo");
        assert_eq!(translator.translate("Hello", "de").await, "Hallo");
        // Second call was served from the cache
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        // And the translation survives process restarts
        assert_eq!(
            store.get_translation("Hello", "de").await.unwrap().as_deref(),
            Some("Hallo")
        );
    }

    #[tokio::test]
    async fn test_stored_translation_skips_backend() {
        let store = Store::open_in_memory().unwrap();
        store.put_translation("Hello", "de", "Hallo").await.unwrap();
        let backend = Arc::new(FixedBackend::replying("unused"));
        let translator = Translator::new(backend.clone(), store);

        assert_eq!(translator.translate("Hello", "de").await, "Hallo");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_backend_failure_falls_back_to_original() {
        let backend = Arc::new(FixedBackend::failing());
        let translator = Translator::new(backend, Store::open_in_memory().unwrap());
        assert_eq!(translator.translate("Hello", "de").await, "Hello");
    }
}
