//! Service configuration loaded from the environment.
//!
//! Provider credentials are deliberately absent: they are looked up per call
//! through [`crate::ocr::CredentialSource`].

use crate::materialize::DEFAULT_RENDER_SCALE;
use crate::ocr::{ProviderConfig, ProviderKind};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::path::PathBuf;

const DEFAULT_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub addr: SocketAddr,
    pub project_root: PathBuf,
    pub provider: ProviderConfig,
    /// `None` keeps the cache unbounded.
    pub cache_capacity: Option<NonZeroUsize>,
    /// Pixels per PDF point for whole-page renders.
    pub render_scale: f32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let addr = get("PDF_VISION_ADDR")
            .unwrap_or_else(|| DEFAULT_ADDR.to_string())
            .parse()
            .context("PDF_VISION_ADDR must be a socket address")?;

        let project_root = match get("PROJECT_ROOT") {
            Some(root) => PathBuf::from(root),
            None => std::env::current_dir().context("Failed to read current directory")?,
        };

        let kind = match get("OCR_PROVIDER") {
            Some(name) => ProviderKind::parse(&name)
                .with_context(|| format!("Unknown OCR_PROVIDER: {}", name))?,
            None => ProviderKind::Mistral,
        };

        let timeout_ms = match get("OCR_TIMEOUT_MS") {
            Some(raw) => {
                let ms: u64 = raw
                    .parse()
                    .with_context(|| format!("OCR_TIMEOUT_MS must be an integer, got {}", raw))?;
                if ms == 0 {
                    anyhow::bail!("OCR_TIMEOUT_MS must be greater than 0");
                }
                Some(ms)
            }
            None => None,
        };

        let cache_capacity = match get("VISION_CACHE_CAPACITY") {
            Some(raw) => NonZeroUsize::new(
                raw.parse()
                    .with_context(|| format!("VISION_CACHE_CAPACITY must be an integer, got {}", raw))?,
            ),
            None => None,
        };

        let render_scale = match get("PDF_RENDER_SCALE") {
            Some(raw) => {
                let scale: f32 = raw
                    .parse()
                    .with_context(|| format!("PDF_RENDER_SCALE must be a number, got {}", raw))?;
                if !(scale.is_finite() && scale > 0.0) {
                    anyhow::bail!("PDF_RENDER_SCALE must be greater than 0");
                }
                scale
            }
            None => DEFAULT_RENDER_SCALE,
        };

        Ok(Self {
            addr,
            project_root,
            provider: ProviderConfig {
                kind,
                endpoint: get("OCR_ENDPOINT"),
                model: get("OCR_MODEL"),
                prompt: get("OCR_PROMPT"),
                timeout_ms,
            },
            cache_capacity,
            render_scale,
        })
    }
}
