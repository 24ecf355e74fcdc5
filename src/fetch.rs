//! Remote resource fetching with a direct-then-proxied fallback and a
//! process-wide, immutable-after-insert cache keyed by source URL.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;

use base64::Engine as _;

use crate::error::{MatchcardError, MatchcardResult};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// A fetched binary in self-contained form. Once a resource is inlined the
/// final composite has no runtime network dependency on it.
#[derive(Clone, Debug)]
pub struct FetchedResource {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl FetchedResource {
    pub fn to_data_uri(&self) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&self.bytes);
        format!("data:{};base64,{}", self.content_type, encoded)
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Best-effort content type from magic bytes, for servers that omit or lie
/// about `Content-Type`.
pub fn sniff_content_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Some("image/png");
    }
    if bytes.starts_with(&[0xff, 0xd8, 0xff]) {
        return Some("image/jpeg");
    }
    if bytes.starts_with(b"GIF8") {
        return Some("image/gif");
    }
    if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    if bytes.starts_with(b"wOF2") {
        return Some("font/woff2");
    }
    if bytes.starts_with(b"wOFF") {
        return Some("font/woff");
    }
    if bytes.starts_with(&[0x00, 0x01, 0x00, 0x00]) {
        return Some("font/ttf");
    }
    if bytes.starts_with(b"OTTO") {
        return Some("font/otf");
    }
    let head = &bytes[..bytes.len().min(1024)];
    if head.windows(4).any(|w| w == b"<svg") {
        return Some("image/svg+xml");
    }
    None
}

/// Decode a `data:` URI into its bytes and media type.
pub fn decode_data_uri(uri: &str) -> MatchcardResult<FetchedResource> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| MatchcardError::fetch("not a data URI"))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| MatchcardError::fetch("data URI missing comma"))?;

    let (content_type, is_base64) = match meta.strip_suffix(";base64") {
        Some(ct) => (ct, true),
        None => (meta, false),
    };
    let content_type = if content_type.is_empty() {
        "text/plain".to_string()
    } else {
        content_type.to_string()
    };

    let bytes = if is_base64 {
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| MatchcardError::fetch(format!("data URI base64: {e}")))?
    } else {
        payload.as_bytes().to_vec()
    };

    Ok(FetchedResource {
        bytes,
        content_type,
    })
}

#[derive(Clone, Debug)]
pub struct FetcherConfig {
    /// Same-origin proxy endpoint that accepts `?url=<target>`; used only
    /// after the direct fetch fails.
    pub proxy: Option<String>,
    /// One combined budget for the direct attempt plus the proxy retry.
    pub timeout: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Fetches remote binaries (fonts and images) for inlining.
pub struct ResourceFetcher {
    client: reqwest::Client,
    config: FetcherConfig,
    cache: RwLock<HashMap<String, Arc<FetchedResource>>>,
}

impl ResourceFetcher {
    pub fn new(config: FetcherConfig) -> MatchcardResult<ResourceFetcher> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("matchcard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MatchcardError::fetch(format!("http client: {e}")))?;
        Ok(ResourceFetcher {
            client,
            config,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// The process-wide fetcher. Its cache outlives individual exports so a
    /// font fetched once per session stays fetched.
    pub fn shared() -> Arc<ResourceFetcher> {
        static SHARED: OnceLock<Arc<ResourceFetcher>> = OnceLock::new();
        SHARED
            .get_or_init(|| {
                Arc::new(
                    ResourceFetcher::new(FetcherConfig::default()).unwrap_or_else(|e| {
                        panic!("default http client construction failed: {e}")
                    }),
                )
            })
            .clone()
    }

    pub fn cached(&self, url: &str) -> Option<Arc<FetchedResource>> {
        self.cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .cloned()
    }

    /// Fetch `url`: data URIs decode locally; everything else goes direct
    /// first, then through the proxy, under one combined timeout.
    pub async fn fetch(&self, url: &str) -> MatchcardResult<Arc<FetchedResource>> {
        if url.starts_with("data:") {
            return decode_data_uri(url).map(Arc::new);
        }
        if let Some(hit) = self.cached(url) {
            return Ok(hit);
        }

        let fetched = tokio::time::timeout(self.config.timeout, self.fetch_uncached(url))
            .await
            .map_err(|_| MatchcardError::fetch(format!("timed out fetching {url}")))??;

        let fetched = Arc::new(fetched);
        self.cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(url.to_string())
            .or_insert_with(|| fetched.clone());
        Ok(fetched)
    }

    async fn fetch_uncached(&self, url: &str) -> MatchcardResult<FetchedResource> {
        match self.fetch_direct(url).await {
            Ok(resource) => Ok(resource),
            Err(direct_err) => {
                let Some(proxy) = &self.config.proxy else {
                    return Err(direct_err);
                };
                tracing::debug!(%url, error = %direct_err, "direct fetch failed, retrying via proxy");
                self.fetch_via_proxy(proxy, url).await.map_err(|proxy_err| {
                    MatchcardError::fetch(format!(
                        "direct: {direct_err}; proxy: {proxy_err}"
                    ))
                })
            }
        }
    }

    async fn fetch_direct(&self, url: &str) -> MatchcardResult<FetchedResource> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MatchcardError::fetch(format!("GET {url}: {e}")))?;
        Self::read_response(url, response).await
    }

    async fn fetch_via_proxy(&self, proxy: &str, url: &str) -> MatchcardResult<FetchedResource> {
        let response = self
            .client
            .get(proxy)
            .query(&[("url", url)])
            .send()
            .await
            .map_err(|e| MatchcardError::fetch(format!("proxy GET {url}: {e}")))?;
        Self::read_response(url, response).await
    }

    async fn read_response(
        url: &str,
        response: reqwest::Response,
    ) -> MatchcardResult<FetchedResource> {
        let status = response.status();
        if !status.is_success() {
            return Err(MatchcardError::fetch(format!("GET {url}: HTTP {status}")));
        }
        let header_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| !v.is_empty() && v != "application/octet-stream");
        let bytes = response
            .bytes()
            .await
            .map_err(|e| MatchcardError::fetch(format!("read {url}: {e}")))?
            .to_vec();

        let content_type = header_type
            .or_else(|| sniff_content_type(&bytes).map(str::to_string))
            .unwrap_or_else(|| "application/octet-stream".to_string());

        Ok(FetchedResource {
            bytes,
            content_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_common_signatures() {
        assert_eq!(
            sniff_content_type(b"\x89PNG\r\n\x1a\nrest"),
            Some("image/png")
        );
        assert_eq!(sniff_content_type(&[0xff, 0xd8, 0xff, 0xe0]), Some("image/jpeg"));
        assert_eq!(sniff_content_type(b"RIFF\x00\x00\x00\x00WEBPVP8 "), Some("image/webp"));
        assert_eq!(sniff_content_type(b"wOF2...."), Some("font/woff2"));
        assert_eq!(sniff_content_type(&[0x00, 0x01, 0x00, 0x00, 0x00]), Some("font/ttf"));
        assert_eq!(
            sniff_content_type(br#"<?xml version="1.0"?><svg xmlns="x"/>"#),
            Some("image/svg+xml")
        );
        assert_eq!(sniff_content_type(b"plain text"), None);
    }

    #[test]
    fn data_uri_round_trip() {
        let resource = FetchedResource {
            bytes: vec![1, 2, 3, 255],
            content_type: "image/png".into(),
        };
        let uri = resource.to_data_uri();
        assert!(uri.starts_with("data:image/png;base64,"));
        let back = decode_data_uri(&uri).unwrap();
        assert_eq!(back.bytes, resource.bytes);
        assert_eq!(back.content_type, "image/png");
    }

    #[test]
    fn data_uri_plain_payload() {
        let back = decode_data_uri("data:,hello").unwrap();
        assert_eq!(back.bytes, b"hello");
        assert!(decode_data_uri("data:no-comma").is_err());
    }

    #[tokio::test]
    async fn fetch_decodes_data_uri_without_network() {
        let fetcher = ResourceFetcher::new(FetcherConfig::default()).unwrap();
        let got = fetcher.fetch("data:image/png;base64,AQID").await.unwrap();
        assert_eq!(got.bytes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn unreachable_host_reports_fetch_error() {
        let fetcher = ResourceFetcher::new(FetcherConfig {
            proxy: None,
            timeout: Duration::from_millis(500),
        })
        .unwrap();
        // Port 1 on loopback refuses immediately; no proxy configured.
        let err = fetcher.fetch("http://127.0.0.1:1/logo.png").await.unwrap_err();
        assert!(matches!(err, MatchcardError::Fetch(_)));
    }
}
