//! Embedding provider capability.
//!
//! The pipeline never depends on a live embedding backend: callers hold an
//! `Option<&dyn EmbeddingProvider>` and treat `None` (or any
//! `ProviderError`) as "run mechanical similarity only".
//!
//! The shipped implementation talks to Ollama:
//! - prefer the batched `/api/embed` endpoint,
//! - fall back to per-item `/api/embeddings` for older servers.

use std::time::Duration;

use serde::Deserialize;

/// Default model when config says `"auto"`.
pub const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text";

const DEFAULT_OLLAMA_HOST: &str = "http://127.0.0.1:11434";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("embedding backend unreachable: {0}")]
    Unreachable(String),
    #[error("embedding backend http error {status}: {body}")]
    Http { status: u16, body: String },
    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
}

/// A batch embedding backend. Vectors are returned in input order and are
/// not assumed normalized; the cache normalizes before persisting.
pub trait EmbeddingProvider {
    fn embed(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    /// Identifies the backend+model for cache keying.
    fn model_version(&self) -> String;
}

/// Blocking Ollama client.
pub struct OllamaProvider {
    host: String,
    model: String,
    timeout: Duration,
}

impl OllamaProvider {
    /// `model = "auto"` selects [`DEFAULT_EMBED_MODEL`]; the host comes from
    /// `OLLAMA_HOST` when set.
    pub fn new(model: &str) -> Self {
        let host = std::env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_OLLAMA_HOST.to_string());
        let model = if model == "auto" || model.is_empty() {
            DEFAULT_EMBED_MODEL.to_string()
        } else {
            model.to_string()
        };
        Self {
            host: normalize_host(&host),
            model,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_host(mut self, host: &str) -> Self {
        self.host = normalize_host(host);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn client(&self) -> Result<reqwest::blocking::Client, ProviderError> {
        reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ProviderError::Unreachable(format!("failed to build http client: {e}")))
    }
}

fn normalize_host(host: &str) -> String {
    let trimmed = host.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

impl EmbeddingProvider for OllamaProvider {
    fn embed(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let client = self.client()?;

        // Newer servers: one batched call.
        let url_embed = format!("{}/api/embed", self.host);
        let body = serde_json::json!({
            "model": self.model,
            "input": batch,
            "truncate": true,
        });
        match client.post(&url_embed).json(&body).send() {
            Ok(resp) if resp.status().is_success() => {
                #[derive(Deserialize)]
                struct EmbedResp {
                    embeddings: Vec<Vec<f32>>,
                }
                let out: EmbedResp = resp.json().map_err(|e| {
                    ProviderError::InvalidResponse(format!("/api/embed returned invalid JSON: {e}"))
                })?;
                if out.embeddings.len() != batch.len() {
                    return Err(ProviderError::InvalidResponse(format!(
                        "/api/embed returned {} embeddings for {} inputs",
                        out.embeddings.len(),
                        batch.len()
                    )));
                }
                return Ok(out.embeddings);
            }
            Ok(_) => {
                // Older server without /api/embed; try the per-item endpoint.
            }
            Err(e) => {
                return Err(ProviderError::Unreachable(format!(
                    "failed to reach ollama at {url_embed} (is it running?) ({e})"
                )));
            }
        }

        let url = format!("{}/api/embeddings", self.host);
        #[derive(Deserialize)]
        struct EmbeddingsResp {
            embedding: Vec<f32>,
        }

        let mut out = Vec::with_capacity(batch.len());
        for text in batch {
            let body = serde_json::json!({ "model": self.model, "prompt": text });
            let resp = client.post(&url).json(&body).send().map_err(|e| {
                ProviderError::Unreachable(format!(
                    "failed to reach ollama at {url} (is it running?) ({e})"
                ))
            })?;
            if !resp.status().is_success() {
                let status = resp.status().as_u16();
                let body = resp.text().unwrap_or_default();
                return Err(ProviderError::Http { status, body });
            }
            let r: EmbeddingsResp = resp.json().map_err(|e| {
                ProviderError::InvalidResponse(format!(
                    "/api/embeddings returned invalid JSON: {e}"
                ))
            })?;
            out.push(r.embedding);
        }
        Ok(out)
    }

    fn model_version(&self) -> String {
        format!("ollama/{}", self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_normalization_adds_scheme_and_strips_slash() {
        assert_eq!(normalize_host("localhost:11434"), "http://localhost:11434");
        assert_eq!(
            normalize_host("http://127.0.0.1:11434/"),
            "http://127.0.0.1:11434"
        );
        assert_eq!(normalize_host("https://gpu-box:443"), "https://gpu-box:443");
    }

    #[test]
    fn auto_model_maps_to_default() {
        let p = OllamaProvider::new("auto");
        assert_eq!(p.model_version(), format!("ollama/{DEFAULT_EMBED_MODEL}"));
    }

    #[test]
    fn empty_batch_short_circuits_without_network() {
        let p = OllamaProvider::new("auto").with_host("127.0.0.1:1");
        assert!(p.embed(&[]).expect("empty batch").is_empty());
    }
}
