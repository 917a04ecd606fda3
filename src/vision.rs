//! Vision pipeline orchestrator.
//!
//! validate -> cache key -> cache lookup -> materialize -> provider -> cache insert.

use crate::cache::{CacheKey, ResultCache};
use crate::error::{Result, VisionError};
use crate::materialize::SourceMaterializer;
use crate::ocr::{OcrProviderClient, OcrResult, ProviderConfig};
use crate::paths::PathResolver;
use crate::request::{ResolvedSource, VisionArgs, VisionRequest};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct VisionOrchestrator {
    resolver: PathResolver,
    materializer: Arc<dyn SourceMaterializer>,
    client: OcrProviderClient,
    cache: Arc<dyn ResultCache>,
    provider: ProviderConfig,
}

impl VisionOrchestrator {
    pub fn new(
        resolver: PathResolver,
        materializer: Arc<dyn SourceMaterializer>,
        client: OcrProviderClient,
        cache: Arc<dyn ResultCache>,
        provider: ProviderConfig,
    ) -> Self {
        Self {
            resolver,
            materializer,
            client,
            cache,
            provider,
        }
    }

    pub async fn get_vision_result(&self, args: VisionArgs) -> Result<OcrResult> {
        self.get_vision_result_with_cancel(args, &CancellationToken::new())
            .await
    }

    /// Runs the pipeline; `cancel` aborts an in-flight provider call.
    pub async fn get_vision_result_with_cancel(
        &self,
        args: VisionArgs,
        cancel: &CancellationToken,
    ) -> Result<OcrResult> {
        let request = VisionRequest::validate(args, &self.resolver)?;
        let identity = source_identity(&request.source).await?;
        let key = CacheKey::derive(&identity, request.page, request.index, &self.provider);

        let use_cache = self.cache.should_use(&request);
        if use_cache {
            if let Some(hit) = self.cache.lookup(&key) {
                info!("Vision cache hit: {} page {}", request.source.describe(), request.page);
                return Ok(hit);
            }
            debug!("Vision cache miss: {}", key);
        }

        let image = self
            .materializer
            .materialize(&request.source, request.page, request.index)
            .await?;

        info!(
            "Analyzing {} page {}{} with {}",
            request.source.describe(),
            request.page,
            request
                .index
                .map(|i| format!(" image {}", i))
                .unwrap_or_default(),
            self.provider.kind.as_str()
        );

        let result = self
            .client
            .analyze_with_cancel(&image, &self.provider, cancel)
            .await?;

        // Written even when the caller bypassed the cache for this read.
        self.cache.insert(key, result.clone());
        Ok(result)
    }
}

/// Stable identity of a source's content.
///
/// Path sources combine the absolute path with size and mtime so edited files
/// get fresh keys; inline sources hash their bytes.
pub async fn source_identity(source: &ResolvedSource) -> Result<String> {
    match source {
        ResolvedSource::Path(path) => {
            let meta = tokio::fs::metadata(path).await.map_err(|e| {
                VisionError::source_resolution(format!("cannot read {}: {}", path.display(), e))
            })?;
            if !meta.is_file() {
                return Err(VisionError::source_resolution(format!(
                    "{} is not a file",
                    path.display()
                )));
            }
            let modified = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_nanos())
                .unwrap_or_default();
            Ok(format!("path:{}:{}:{}", path.display(), meta.len(), modified))
        }
        ResolvedSource::Inline(bytes) => {
            let digest = Sha256::digest(bytes);
            Ok(format!("inline:{:x}", digest))
        }
    }
}
