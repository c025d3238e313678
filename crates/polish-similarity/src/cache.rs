//! Persistent embedding cache.
//!
//! One CBOR file (`embeddings.db`) keyed by tag. Vectors are stored
//! unit-normalized as little-endian `f32` bytes so the on-disk layout is
//! fixed regardless of the serializer. A version or model mismatch on load
//! discards the file and recomputes, since cached vectors from another
//! model are not comparable.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use polish_core::fsio::write_atomic;
use polish_core::vecmath::normalize;

use crate::provider::EmbeddingProvider;

pub const EMBEDDING_CACHE_VERSION_V1: &str = "polish_embeddings_v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedVectorV1 {
    dimensions: usize,
    computed_at_unix_secs: u64,
    /// Little-endian f32 bytes, `dimensions * 4` long.
    vector_le: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheFileV1 {
    version: String,
    model_version: String,
    entries: BTreeMap<String, CachedVectorV1>,
}

/// File-backed embedding cache for one model version.
pub struct EmbeddingCache {
    path: PathBuf,
    model_version: String,
}

impl EmbeddingCache {
    pub fn new(path: &Path, model_version: &str) -> Self {
        Self {
            path: path.to_path_buf(),
            model_version: model_version.to_string(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All cached vectors for the current model version.
    pub fn load(&self) -> Result<HashMap<String, Vec<f32>>> {
        let Some(file) = self.read_file()? else {
            return Ok(HashMap::new());
        };
        let mut out = HashMap::with_capacity(file.entries.len());
        for (key, cached) in file.entries {
            out.insert(key, le_bytes_to_f32s(&cached.vector_le)?);
        }
        Ok(out)
    }

    /// Return embeddings for every tag, computing and caching the missing
    /// ones through `provider` in batches of `batch_size`.
    pub fn get_embeddings(
        &self,
        tags: &[String],
        provider: &dyn EmbeddingProvider,
        batch_size: usize,
    ) -> Result<HashMap<String, Vec<f32>>> {
        let batch_size = batch_size.max(1);
        let mut file = self.read_file()?.unwrap_or_else(|| CacheFileV1 {
            version: EMBEDDING_CACHE_VERSION_V1.to_string(),
            model_version: self.model_version.clone(),
            entries: BTreeMap::new(),
        });

        let missing: Vec<String> = tags
            .iter()
            .filter(|t| !file.entries.contains_key(*t))
            .cloned()
            .collect();

        if !missing.is_empty() {
            let computed_at = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs();
            for chunk in missing.chunks(batch_size) {
                let vectors = provider
                    .embed(chunk)
                    .map_err(|e| anyhow!("embedding batch of {} tags failed: {e}", chunk.len()))?;
                if vectors.len() != chunk.len() {
                    return Err(anyhow!(
                        "provider returned {} vectors for {} tags",
                        vectors.len(),
                        chunk.len()
                    ));
                }
                for (tag, vector) in chunk.iter().zip(vectors) {
                    if vector.is_empty() {
                        return Err(anyhow!("provider returned an empty vector for '{tag}'"));
                    }
                    let unit = normalize(&vector);
                    file.entries.insert(
                        tag.clone(),
                        CachedVectorV1 {
                            dimensions: unit.len(),
                            computed_at_unix_secs: computed_at,
                            vector_le: f32s_to_le_bytes(&unit),
                        },
                    );
                }
            }
            self.write_file(&file)?;
        }

        let mut out = HashMap::with_capacity(tags.len());
        for tag in tags {
            if let Some(cached) = file.entries.get(tag) {
                out.insert(tag.clone(), le_bytes_to_f32s(&cached.vector_le)?);
            }
        }
        Ok(out)
    }

    fn read_file(&self) -> Result<Option<CacheFileV1>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let file: CacheFileV1 = match ciborium::de::from_reader(bytes.as_slice()) {
            Ok(f) => f,
            // Unreadable cache is recomputable, not fatal.
            Err(_) => return Ok(None),
        };
        if file.version != EMBEDDING_CACHE_VERSION_V1 || file.model_version != self.model_version {
            return Ok(None);
        }
        Ok(Some(file))
    }

    fn write_file(&self, file: &CacheFileV1) -> Result<()> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(file, &mut bytes)
            .map_err(|e| anyhow!("failed to CBOR-encode embedding cache: {e}"))?;
        write_atomic(&self.path, &bytes)
    }
}

fn f32s_to_le_bytes(v: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(v.len() * 4);
    for x in v {
        out.extend_from_slice(&x.to_le_bytes());
    }
    out
}

fn le_bytes_to_f32s(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(anyhow!(
            "cached vector has {} bytes, not a multiple of 4",
            bytes.len()
        ));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}
