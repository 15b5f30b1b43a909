//! Process-scoped run context.
//!
//! Holds everything resolved once at startup (configuration, the index
//! client, the recognizer factory, the cancellation flag) and is passed
//! explicitly to whatever needs it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{Config, ConfigError};
use crate::index::{HttpIndexClient, IndexClient};
use crate::recognizer::{Recognizer, RecognizerFactory};

/// Cooperative cancellation flag.
///
/// Checked between documents; a document already in progress runs to
/// completion.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Set the flag when the process receives Ctrl-C.
    pub fn cancel_on_ctrl_c(&self) {
        let flag = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted; stopping after the current document");
                flag.cancel();
            }
        });
    }
}

/// Resolved configuration and collaborators for one run.
pub struct RunContext {
    config: Config,
    client: Arc<dyn IndexClient>,
    recognizers: RecognizerFactory,
    cancel: CancelFlag,
}

impl RunContext {
    pub fn new(config: Config, client: Arc<dyn IndexClient>) -> Self {
        let recognizers = RecognizerFactory::new(config.recognizer.clone());
        Self {
            config,
            client,
            recognizers,
            cancel: CancelFlag::new(),
        }
    }

    /// Validate the configuration, connect to the index and check it answers.
    pub async fn connect(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;

        let url = config.index.base_url();
        let client = HttpIndexClient::from_config(&config.index)?;
        client
            .ping()
            .await
            .map_err(|source| ConfigError::Unreachable {
                url: url.clone(),
                source,
            })?;
        info!("Connected to index server at {}", url);

        Ok(Self::new(config, Arc::new(client)))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn client(&self) -> Arc<dyn IndexClient> {
        Arc::clone(&self.client)
    }

    pub fn recognizers(&self) -> &RecognizerFactory {
        &self.recognizers
    }

    /// Build the recognizer for a language or model key.
    pub fn recognizer(&self, key: &str) -> Result<Arc<dyn Recognizer>, ConfigError> {
        self.recognizers.build(key)
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryIndexClient;

    #[test]
    fn test_cloned_flag_shares_state() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_context_resolves_recognizers() {
        let ctx = RunContext::new(Config::default(), Arc::new(MemoryIndexClient::new()));
        assert_eq!(ctx.recognizer("pattern").unwrap().model_id(), "pattern");
        assert!(matches!(
            ctx.recognizer("klingon"),
            Err(ConfigError::UnknownModel { .. })
        ));
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_config() {
        let mut config = Config::default();
        config.traversal.page_size = 0;
        assert!(matches!(
            RunContext::connect(config).await,
            Err(ConfigError::Invalid(_))
        ));
    }
}
