//! Translation abstraction
//!
//! The relay never fails a transcript because translation failed: the
//! [`TranslationService`] wrapper echoes the source text per target on any
//! error, so downstream stages always receive a full target map.

mod cache;
mod http;
mod noop;

pub use cache::TranslationCache;
pub use http::HttpTranslator;
pub use noop::NoopTranslator;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use relay_config::{TranslatorProvider, TranslatorSettings};

use crate::TranslateError;

/// A translation provider.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate one text into each target language.
    async fn translate(
        &self,
        text: &str,
        targets: &[String],
        source: Option<&str>,
    ) -> Result<HashMap<String, String>, TranslateError>;

    /// Translate a batch of texts into each target language. The outer
    /// vector is parallel to `texts`.
    async fn translate_batch(
        &self,
        texts: &[String],
        targets: &[String],
        source: Option<&str>,
    ) -> Result<Vec<HashMap<String, String>>, TranslateError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.translate(text, targets, source).await?);
        }
        Ok(out)
    }

    /// Best-effort language detection.
    async fn detect(&self, text: &str) -> Result<Option<String>, TranslateError>;
}

/// Build a translator from configuration.
pub fn create_translator(settings: &TranslatorSettings) -> Arc<dyn Translator> {
    match settings.provider {
        TranslatorProvider::Http => match &settings.endpoint {
            Some(endpoint) => Arc::new(HttpTranslator::new(
                endpoint.clone(),
                settings.api_key.clone(),
                settings.timeout_ms,
                settings.detect_timeout_ms,
            )),
            None => {
                tracing::warn!("translator.provider=http but no endpoint set, using pass-through");
                Arc::new(NoopTranslator::new())
            }
        },
        TranslatorProvider::Disabled => Arc::new(NoopTranslator::new()),
    }
}

/// Fallback-and-cache wrapper around a [`Translator`].
pub struct TranslationService {
    inner: Arc<dyn Translator>,
    cache: Option<TranslationCache>,
}

impl TranslationService {
    pub fn new(settings: &TranslatorSettings) -> Self {
        Self::with_translator(create_translator(settings), settings)
    }

    pub fn with_translator(inner: Arc<dyn Translator>, settings: &TranslatorSettings) -> Self {
        let cache = settings
            .cache_enabled
            .then(|| TranslationCache::new(std::time::Duration::from_secs(settings.cache_ttl_secs)));
        Self { inner, cache }
    }

    /// Translate into every target. Infallible: targets that cannot be
    /// translated receive the source text.
    pub async fn translate(
        &self,
        text: &str,
        targets: &[String],
        source: Option<&str>,
    ) -> HashMap<String, String> {
        if targets.is_empty() || text.trim().is_empty() {
            return HashMap::new();
        }

        // Serve what we can from the cache and only ask for the rest.
        let mut result = HashMap::new();
        let mut missing: Vec<String> = Vec::new();
        if let Some(cache) = &self.cache {
            for target in targets {
                match cache.get(text, source, target) {
                    Some(hit) => {
                        result.insert(target.clone(), hit);
                    }
                    None => missing.push(target.clone()),
                }
            }
        } else {
            missing = targets.to_vec();
        }

        if missing.is_empty() {
            return result;
        }

        match self.inner.translate(text, &missing, source).await {
            Ok(translated) => {
                for target in &missing {
                    let value = translated
                        .get(target)
                        .cloned()
                        .unwrap_or_else(|| text.to_string());
                    if let Some(cache) = &self.cache {
                        cache.put(text, source, target, &value);
                    }
                    result.insert(target.clone(), value);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "translation failed, echoing source text");
                for target in &missing {
                    result.insert(target.clone(), text.to_string());
                }
            }
        }

        result
    }

    pub async fn detect(&self, text: &str) -> Option<String> {
        match self.inner.detect(text).await {
            Ok(lang) => lang,
            Err(e) => {
                tracing::debug!(error = %e, "language detection failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_config::TranslatorSettings;

    struct FailingTranslator;

    #[async_trait]
    impl Translator for FailingTranslator {
        async fn translate(
            &self,
            _text: &str,
            _targets: &[String],
            _source: Option<&str>,
        ) -> Result<HashMap<String, String>, TranslateError> {
            Err(TranslateError::Timeout)
        }

        async fn detect(&self, _text: &str) -> Result<Option<String>, TranslateError> {
            Err(TranslateError::Timeout)
        }
    }

    #[tokio::test]
    async fn test_echo_fallback_on_error() {
        let service = TranslationService::with_translator(
            Arc::new(FailingTranslator),
            &TranslatorSettings::default(),
        );
        let targets = vec!["es".to_string(), "fr".to_string()];
        let result = service.translate("Hello everyone", &targets, Some("en")).await;
        assert_eq!(result.len(), 2);
        assert_eq!(result["es"], "Hello everyone");
        assert_eq!(result["fr"], "Hello everyone");
    }

    #[tokio::test]
    async fn test_empty_targets() {
        let service = TranslationService::new(&TranslatorSettings::default());
        let result = service.translate("Hello", &[], Some("en")).await;
        assert!(result.is_empty());
    }
}
