//! Vision request arguments and their validation.

use crate::error::{Result, VisionError};
use crate::paths::PathResolver;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use std::path::PathBuf;

/// Source descriptor as supplied by the caller.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", deny_unknown_fields)]
pub enum PdfSource {
    Path { path: String },
    Inline { base64: String },
}

/// Raw argument object. Integers are signed so out-of-range values reach
/// validation instead of failing inside deserialization.
#[derive(Debug, Clone, Deserialize)]
pub struct VisionArgs {
    pub source: PdfSource,
    pub page: i64,
    #[serde(default)]
    pub index: Option<i64>,
    #[serde(default)]
    pub cache: Option<bool>,
}

impl VisionArgs {
    /// Parse an untyped argument object.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| VisionError::invalid(e.to_string()))
    }
}

/// Source after path resolution or base64 decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedSource {
    Path(PathBuf),
    Inline(Vec<u8>),
}

impl ResolvedSource {
    pub fn describe(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Inline(bytes) => format!("<inline {} bytes>", bytes.len()),
        }
    }
}

/// A validated request. `index: None` means the whole rendered page.
#[derive(Debug, Clone)]
pub struct VisionRequest {
    pub source: ResolvedSource,
    pub page: u32,
    pub index: Option<u32>,
    pub use_cache: bool,
}

impl VisionRequest {
    /// Validate argument shape. Performs no I/O.
    pub fn validate(args: VisionArgs, resolver: &PathResolver) -> Result<Self> {
        let page = bounded("page", args.page, 1)?;
        let index = args.index.map(|i| bounded("index", i, 0)).transpose()?;

        let source = match args.source {
            PdfSource::Path { path } => ResolvedSource::Path(resolver.resolve(&path)?),
            PdfSource::Inline { base64 } => {
                let bytes = BASE64
                    .decode(base64.trim())
                    .map_err(|e| VisionError::invalid(format!("inline source is not valid base64: {}", e)))?;
                if bytes.is_empty() {
                    return Err(VisionError::invalid("inline source is empty"));
                }
                ResolvedSource::Inline(bytes)
            }
        };

        Ok(Self {
            source,
            page,
            index,
            use_cache: args.cache.unwrap_or(true),
        })
    }
}

/// Narrow a caller integer to `min..=u32::MAX`, naming which bound was broken.
fn bounded(field: &str, value: i64, min: i64) -> Result<u32> {
    if value < min {
        return Err(VisionError::invalid(format!(
            "{} must be an integer >= {}, got {}",
            field, min, value
        )));
    }
    u32::try_from(value).map_err(|_| {
        VisionError::invalid(format!(
            "{} {} exceeds the maximum of {}",
            field,
            value,
            u32::MAX
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolver() -> PathResolver {
        PathResolver::new("/srv/project")
    }

    fn validate(value: serde_json::Value) -> Result<VisionRequest> {
        VisionRequest::validate(VisionArgs::from_value(value)?, &resolver())
    }

    #[test]
    fn test_path_source_defaults() {
        let req = validate(json!({
            "source": {"kind": "path", "path": "docs/scan.pdf"},
            "page": 2
        }))
        .unwrap();
        assert_eq!(req.source, ResolvedSource::Path(PathBuf::from("/srv/project/docs/scan.pdf")));
        assert_eq!(req.page, 2);
        assert_eq!(req.index, None);
        assert!(req.use_cache);
    }

    #[test]
    fn test_inline_source_decodes() {
        let req = validate(json!({
            "source": {"kind": "inline", "base64": BASE64.encode(b"%PDF-1.5")},
            "page": 1,
            "index": 0,
            "cache": false
        }))
        .unwrap();
        assert_eq!(req.source, ResolvedSource::Inline(b"%PDF-1.5".to_vec()));
        assert_eq!(req.index, Some(0));
        assert!(!req.use_cache);
    }

    #[test]
    fn test_page_and_index_bounds() {
        for page in [0, -3] {
            let err = validate(json!({
                "source": {"kind": "path", "path": "a.pdf"},
                "page": page
            }))
            .unwrap_err();
            assert!(matches!(err, VisionError::InvalidArgument(_)), "page {}", page);
        }

        let err = validate(json!({
            "source": {"kind": "path", "path": "a.pdf"},
            "page": 1,
            "index": -1
        }))
        .unwrap_err();
        assert!(err.to_string().contains("index must be an integer >= 0"));
    }

    #[test]
    fn test_oversized_page_and_index_name_the_upper_bound() {
        let too_big = u32::MAX as i64 + 1;

        let err = validate(json!({
            "source": {"kind": "path", "path": "a.pdf"},
            "page": too_big
        }))
        .unwrap_err();
        assert!(matches!(err, VisionError::InvalidArgument(_)));
        assert_eq!(
            err.to_string(),
            "Invalid arguments: page 4294967296 exceeds the maximum of 4294967295"
        );

        let err = validate(json!({
            "source": {"kind": "path", "path": "a.pdf"},
            "page": 1,
            "index": too_big
        }))
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid arguments: index 4294967296 exceeds the maximum of 4294967295"
        );

        let req = validate(json!({
            "source": {"kind": "path", "path": "a.pdf"},
            "page": u32::MAX,
            "index": u32::MAX
        }))
        .unwrap();
        assert_eq!((req.page, req.index), (u32::MAX, Some(u32::MAX)));
    }

    #[test]
    fn test_malformed_sources_rejected() {
        let cases = [
            json!({"source": {"kind": "path", "path": 42}, "page": 1}),
            json!({"source": {"kind": "url", "url": "http://x"}, "page": 1}),
            json!({"source": {"kind": "path", "path": "a.pdf", "base64": "AA=="}, "page": 1}),
            json!({"source": {"kind": "inline", "base64": "not base64!"}, "page": 1}),
            json!({"source": {"kind": "inline", "base64": ""}, "page": 1}),
            json!({"page": 1}),
        ];
        for case in cases {
            let err = validate(case.clone()).unwrap_err();
            assert!(matches!(err, VisionError::InvalidArgument(_)), "{}", case);
        }
    }
}
