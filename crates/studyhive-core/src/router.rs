use std::collections::HashMap;
use std::pin::Pin;

use anyhow::{anyhow, Result};
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use studyhive_provider::{LlmMessage, LlmRequest, LlmResponse, ProviderRegistry, StreamChunk};
use tokio::time;

const MAX_RETRIES: usize = 2;
const BASE_BACKOFF_MS: u64 = 1000;

/// Primary model plus the ordered fallbacks tried after it fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPolicy {
    pub primary: String,
    #[serde(default)]
    pub fallbacks: Vec<String>,
}

impl ModelPolicy {
    pub fn single(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            fallbacks: vec![],
        }
    }
}

/// Routes a request across model candidates in priority order.
///
/// Model identifiers are either `provider/model` pairs or aliases resolved
/// through the alias table. Retryable provider errors (marked `[retryable]`)
/// are retried with exponential backoff before falling through to the next
/// candidate; only when every candidate fails does the caller see an error.
pub struct LlmRouter {
    registry: ProviderRegistry,
    aliases: HashMap<String, String>,
}

impl LlmRouter {
    pub fn new(registry: ProviderRegistry, aliases: HashMap<String, String>) -> Self {
        Self { registry, aliases }
    }

    /// Alias every model id to the one registered provider. Fits the common
    /// deployment where a single Groq key serves all models.
    pub fn single_provider(registry: ProviderRegistry, provider_id: &str, models: &[&str]) -> Self {
        let aliases = models
            .iter()
            .map(|m| ((*m).to_string(), format!("{provider_id}/{m}")))
            .collect();
        Self::new(registry, aliases)
    }

    pub async fn chat(
        &self,
        policy: &ModelPolicy,
        system: Option<String>,
        messages: Vec<LlmMessage>,
        max_tokens: u32,
        temperature: Option<f32>,
        json_object: bool,
    ) -> Result<LlmResponse> {
        let candidates = self.candidates(policy);
        let mut last_err: Option<anyhow::Error> = None;
        let mut tried: Vec<String> = Vec::new();

        for (idx, candidate) in candidates.iter().enumerate() {
            let Some((provider_id, model_id)) = self.resolve(candidate) else {
                continue;
            };
            let provider = match self.registry.get(&provider_id) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!("provider {provider_id} not available: {e}");
                    continue;
                }
            };

            tried.push(format!("{provider_id}/{model_id}"));

            let mut attempts = 0;
            loop {
                let req = LlmRequest {
                    model: model_id.clone(),
                    system: system.clone(),
                    messages: messages.clone(),
                    max_tokens,
                    temperature,
                    json_object,
                };

                match provider.chat(req).await {
                    Ok(resp) => {
                        if idx > 0 {
                            tracing::info!(
                                "fallback_triggered=true, from={}, to={}/{}",
                                policy.primary,
                                provider_id,
                                model_id
                            );
                        }
                        return Ok(resp);
                    }
                    Err(err) => {
                        let err_str = err.to_string();
                        if err_str.contains("[retryable]") && attempts < MAX_RETRIES {
                            attempts += 1;
                            let backoff = BASE_BACKOFF_MS * (1 << (attempts - 1));
                            tracing::warn!(
                                "model {model_id} retryable error (attempt {attempts}/{MAX_RETRIES}), backing off {backoff}ms: {err_str}"
                            );
                            time::sleep(time::Duration::from_millis(backoff)).await;
                            continue;
                        }
                        tracing::warn!("model {model_id} failed (attempts={attempts}): {err_str}");
                        last_err = Some(err);
                        break;
                    }
                }
            }
        }

        let tried = tried.join(" -> ");
        Err(last_err.unwrap_or_else(|| anyhow!("all model candidates failed (tried: {tried})")))
    }

    pub async fn stream(
        &self,
        policy: &ModelPolicy,
        system: Option<String>,
        messages: Vec<LlmMessage>,
        max_tokens: u32,
        temperature: Option<f32>,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>> {
        let candidates = self.candidates(policy);
        let mut last_err: Option<anyhow::Error> = None;

        for (idx, candidate) in candidates.iter().enumerate() {
            let Some((provider_id, model_id)) = self.resolve(candidate) else {
                continue;
            };
            let provider = match self.registry.get(&provider_id) {
                Ok(p) => p,
                Err(_) => continue,
            };

            let req = LlmRequest {
                model: model_id.clone(),
                system: system.clone(),
                messages: messages.clone(),
                max_tokens,
                temperature,
                json_object: false,
            };

            match provider.stream(req).await {
                Ok(stream) => {
                    if idx > 0 {
                        tracing::info!(
                            "fallback_triggered=true (stream), from={}, to={}/{}",
                            policy.primary,
                            provider_id,
                            model_id
                        );
                    }
                    return Ok(stream);
                }
                Err(err) => {
                    tracing::warn!("model {model_id} stream failed: {err}");
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("no model candidate available for streaming")))
    }

    fn candidates(&self, policy: &ModelPolicy) -> Vec<String> {
        let mut candidates = vec![policy.primary.clone()];
        candidates.extend(policy.fallbacks.iter().cloned());
        let mut seen = std::collections::HashSet::new();
        candidates.retain(|c| seen.insert(c.clone()));
        candidates
    }

    fn resolve(&self, raw: &str) -> Option<(String, String)> {
        let resolved = if raw.contains('/') {
            raw.to_string()
        } else {
            match self.aliases.get(raw) {
                Some(r) => r.clone(),
                None => {
                    tracing::warn!("unknown model alias: {raw}");
                    return None;
                }
            }
        };
        let (provider, model) = resolved.split_once('/')?;
        Some((provider.to_string(), model.to_string()))
    }
}
