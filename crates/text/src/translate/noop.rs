//! Pass-through translator

use std::collections::HashMap;

use async_trait::async_trait;

use crate::TranslateError;

use super::Translator;

/// Echoes the source text for every target. Used when translation is
/// disabled and in tests.
#[derive(Debug, Default)]
pub struct NoopTranslator;

impl NoopTranslator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Translator for NoopTranslator {
    async fn translate(
        &self,
        text: &str,
        targets: &[String],
        _source: Option<&str>,
    ) -> Result<HashMap<String, String>, TranslateError> {
        Ok(targets
            .iter()
            .map(|t| (t.clone(), text.to_string()))
            .collect())
    }

    async fn detect(&self, _text: &str) -> Result<Option<String>, TranslateError> {
        Ok(None)
    }
}
