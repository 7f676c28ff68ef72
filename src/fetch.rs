//! Bounded origin fetcher.
//!
//! Downloads are streamed chunk by chunk into a scoped temporary file. The
//! transfer is aborted as soon as the observed byte count crosses the
//! configured ceiling, and the file is removed when the [`FetchedImage`] is
//! dropped, on every exit path.

use crate::config::FetchConfig;
use crate::error::Error;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{redirect, Client, Response, StatusCode, Url};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio::net::lookup_host;
use tracing::debug;

const TEMP_PREFIX: &str = "imo_";
const SQUID_ERROR_HEADER: &str = "x-squid-error";

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("could not resolve host: {0}")]
    Dns(String),

    #[error("origin returned {status}")]
    Http { status: StatusCode },

    #[error("will not follow more than {limit} redirects")]
    TooManyRedirects { status: StatusCode, limit: u32 },

    #[error("transfer failed: {0}")]
    Transport(String),

    #[error("operation timed out after {} milliseconds", .0.as_millis())]
    Timeout(Duration),

    #[error("received {received} bytes, limit is {limit} bytes")]
    TooBig { received: u64, limit: u64 },

    #[error("MIME type {0} is not allowed")]
    TypeRejected(String),

    #[error("temporary storage failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FetchError> for Error {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Dns(msg) => Error::Dns(msg),
            FetchError::Http { status } => Error::Origin {
                status: Some(status.as_u16()),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            },
            FetchError::TooManyRedirects { status, .. } => Error::Origin {
                status: Some(status.as_u16()),
                reason: err.to_string(),
            },
            FetchError::Transport(_) | FetchError::Timeout(_) => Error::Origin {
                status: None,
                reason: err.to_string(),
            },
            FetchError::TooBig { received, limit } => Error::ImageTooBig { received, limit },
            FetchError::TypeRejected(_) => Error::InvalidImage(format!("Image not valid: {}", err)),
            FetchError::Io(e) => Error::unknown(e.to_string(), "std::io::Error"),
        }
    }
}

/// A completed download, owned by one request.
#[derive(Debug)]
pub struct FetchedImage {
    file: NamedTempFile,
    pub size: u64,
    pub mime: Option<String>,
    /// URL the bytes were finally served from, after redirects.
    pub url: Url,
}

impl FetchedImage {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn read(&self) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.file.path())
    }
}

pub struct OriginFetcher {
    client: Client,
    config: FetchConfig,
}

impl OriginFetcher {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let client = Self::build_client(&config, None)?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetch `url` into a bounded temporary file.
    ///
    /// The whole exchange, redirects included, is bounded by `config.timeout`.
    pub async fn fetch(&self, url: &Url) -> Result<FetchedImage, FetchError> {
        tokio::time::timeout(self.config.timeout, self.fetch_following_redirects(url))
            .await
            .map_err(|_| FetchError::Timeout(self.config.timeout))?
    }

    async fn fetch_following_redirects(&self, url: &Url) -> Result<FetchedImage, FetchError> {
        let mut current = url.clone();
        let mut redirects = 0u32;

        loop {
            let client = self.client_for(&current).await?;
            let response = client
                .get(current.clone())
                .send()
                .await
                .map_err(|e| self.classify(e))?;

            if is_proxy_dns_failure(&response) {
                return Err(FetchError::Dns(format!(
                    "proxy could not resolve {}",
                    current.host_str().unwrap_or_default()
                )));
            }

            let status = response.status();
            if status.is_redirection() {
                if redirects >= self.config.max_redirects {
                    return Err(FetchError::TooManyRedirects {
                        status,
                        limit: self.config.max_redirects,
                    });
                }

                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .ok_or(FetchError::Http { status })?;
                let next = current
                    .join(location)
                    .map_err(|e| FetchError::Transport(format!("invalid redirect target: {}", e)))?;

                debug!(from = %current, to = %next, "Following origin redirect");
                current = next;
                redirects += 1;
                continue;
            }

            if !status.is_success() {
                return Err(FetchError::Http { status });
            }

            let mime = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(|value| {
                    value
                        .split(';')
                        .next()
                        .unwrap_or_default()
                        .trim()
                        .to_ascii_lowercase()
                })
                .filter(|value| !value.is_empty());

            if let Some(mime) = &mime {
                if !self.mime_allowed(mime) {
                    return Err(FetchError::TypeRejected(mime.clone()));
                }
            }

            return self.stream_to_file(response, mime, current).await;
        }
    }

    async fn stream_to_file(
        &self,
        mut response: Response,
        mime: Option<String>,
        url: Url,
    ) -> Result<FetchedImage, FetchError> {
        let temp = tempfile::Builder::new().prefix(TEMP_PREFIX).tempfile()?;
        let mut sink = tokio::fs::File::from_std(temp.as_file().try_clone()?);
        let limit = self.config.max_image_size;
        let mut received: u64 = 0;

        while let Some(chunk) = response.chunk().await.map_err(|e| self.classify(e))? {
            received = received.saturating_add(chunk.len() as u64);
            if limit > 0 && received > limit {
                // Dropping the response closes the connection mid-transfer and
                // dropping `temp` removes the partial file.
                return Err(FetchError::TooBig { received, limit });
            }
            sink.write_all(&chunk).await?;
        }
        sink.flush().await?;

        debug!(url = %url, bytes = received, "Origin download complete");

        Ok(FetchedImage {
            file: temp,
            size: received,
            mime,
            url,
        })
    }

    fn mime_allowed(&self, mime: &str) -> bool {
        self.config.allowed_mime_types.is_empty()
            || self
                .config
                .allowed_mime_types
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(mime))
    }

    /// Resolve the host up front so unresolvable and policy-blocked hosts are
    /// reported as DNS failures rather than generic transport errors.
    async fn client_for(&self, url: &Url) -> Result<Client, FetchError> {
        let host = url
            .host_str()
            .ok_or_else(|| FetchError::Dns("url has no host".to_string()))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| FetchError::Dns(format!("no port known for {}", url.scheme())))?;

        let bare_host = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = bare_host.parse::<IpAddr>() {
            self.check_policy(host, ip)?;
            return Ok(self.client.clone());
        }

        let addrs: Vec<SocketAddr> = lookup_host((host, port))
            .await
            .map_err(|e| FetchError::Dns(format!("{}: {}", host, e)))?
            .collect();

        let Some(first) = addrs.first().copied() else {
            return Err(FetchError::Dns(format!("{}: no addresses", host)));
        };

        if !self.config.block_private_networks {
            return Ok(self.client.clone());
        }

        for addr in &addrs {
            self.check_policy(host, addr.ip())?;
        }

        // Pin the vetted address so the connection cannot be re-resolved elsewhere.
        Self::build_client(&self.config, Some((host, first)))
    }

    fn check_policy(&self, host: &str, ip: IpAddr) -> Result<(), FetchError> {
        if self.config.block_private_networks && is_private_or_local(ip) {
            return Err(FetchError::Dns(format!(
                "{} resolves to {} which is blocked by policy",
                host, ip
            )));
        }
        Ok(())
    }

    fn classify(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            return FetchError::Timeout(self.config.timeout);
        }

        if err.is_connect() && is_dns_failure(&err) {
            return FetchError::Dns(err.to_string());
        }

        FetchError::Transport(error_chain(&err))
    }

    fn build_client(
        config: &FetchConfig,
        pinned: Option<(&str, SocketAddr)>,
    ) -> Result<Client, FetchError> {
        let mut builder = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .redirect(redirect::Policy::none());

        if let Some((host, addr)) = pinned {
            builder = builder.resolve(host, addr);
        }

        builder
            .build()
            .map_err(|e| FetchError::Transport(format!("failed to build HTTP client: {}", e)))
    }
}

fn is_proxy_dns_failure(response: &Response) -> bool {
    response
        .headers()
        .get(SQUID_ERROR_HEADER)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("ERR_DNS_FAIL"))
}

fn is_dns_failure(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        let text = e.to_string().to_ascii_lowercase();
        if text.contains("dns error") || text.contains("failed to lookup address") {
            return true;
        }
        current = e.source();
    }
    false
}

fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut current = err.source();
    while let Some(e) = current {
        message.push_str(": ");
        message.push_str(&e.to_string());
        current = e.source();
    }
    message
}

pub fn is_private_or_local(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.octets()[0] == 0
        }
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_private_or_local(IpAddr::V4(mapped));
            }
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path as UrlPath;
    use axum::http::header;
    use axum::response::{IntoResponse, Redirect};
    use axum::routing::get;
    use axum::Router;

    const BIG_BODY: usize = 8 * 1024 * 1024;

    async fn spawn_origin() -> SocketAddr {
        let app = Router::new()
            .route(
                "/image.png",
                get(|| async { ([(header::CONTENT_TYPE, "image/png")], vec![7u8; 2048]) }),
            )
            .route(
                "/big",
                get(|| async { ([(header::CONTENT_TYPE, "image/jpeg")], vec![0u8; BIG_BODY]) }),
            )
            .route(
                "/text",
                get(|| async { ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], "<html>") }),
            )
            .route("/missing", get(|| async { axum::http::StatusCode::NOT_FOUND }))
            .route("/loop", get(|| async { Redirect::temporary("/loop") }))
            .route(
                "/hop/:n",
                get(|UrlPath(n): UrlPath<u32>| async move {
                    if n == 0 {
                        Redirect::temporary("/image.png").into_response()
                    } else {
                        Redirect::temporary(&format!("/hop/{}", n - 1)).into_response()
                    }
                }),
            )
            .route(
                "/squid",
                get(|| async {
                    (
                        axum::http::StatusCode::SERVICE_UNAVAILABLE,
                        [("x-squid-error", "ERR_DNS_FAIL 0")],
                        "",
                    )
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn fetcher(config: FetchConfig) -> OriginFetcher {
        OriginFetcher::new(config).unwrap()
    }

    fn url(addr: SocketAddr, path: &str) -> Url {
        Url::parse(&format!("http://{}{}", addr, path)).unwrap()
    }

    #[tokio::test]
    async fn test_successful_fetch_writes_scoped_file() {
        let addr = spawn_origin().await;
        let image = fetcher(FetchConfig::default())
            .fetch(&url(addr, "/image.png"))
            .await
            .unwrap();

        assert_eq!(image.size, 2048);
        assert_eq!(image.mime.as_deref(), Some("image/png"));
        assert_eq!(image.read().unwrap().len(), 2048);

        let path = image.path().to_path_buf();
        assert!(path.exists());
        drop(image);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_size_ceiling_reports_observed_bytes() {
        let addr = spawn_origin().await;
        let config = FetchConfig {
            max_image_size: 1024,
            ..FetchConfig::default()
        };

        match fetcher(config).fetch(&url(addr, "/big")).await {
            Err(FetchError::TooBig { received, limit }) => {
                assert_eq!(limit, 1024);
                assert!(received > 1024);
                assert!(received < BIG_BODY as u64);
            }
            other => panic!("expected TooBig, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unlimited_size_when_ceiling_is_zero() {
        let addr = spawn_origin().await;
        let image = fetcher(FetchConfig::default())
            .fetch(&url(addr, "/big"))
            .await
            .unwrap();
        assert_eq!(image.size, BIG_BODY as u64);
    }

    #[tokio::test]
    async fn test_http_error_carries_status() {
        let addr = spawn_origin().await;
        let err = fetcher(FetchConfig::default())
            .fetch(&url(addr, "/missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Http { status } if status == StatusCode::NOT_FOUND));

        let mapped: Error = err.into();
        assert!(matches!(mapped, Error::Origin { status: Some(404), .. }));
    }

    #[tokio::test]
    async fn test_redirects_within_budget_are_followed() {
        let addr = spawn_origin().await;
        let config = FetchConfig {
            max_redirects: 3,
            ..FetchConfig::default()
        };
        let image = fetcher(config).fetch(&url(addr, "/hop/2")).await.unwrap();
        assert_eq!(image.url.path(), "/image.png");
    }

    #[tokio::test]
    async fn test_redirect_budget_exhaustion_is_distinct() {
        let addr = spawn_origin().await;
        let config = FetchConfig {
            max_redirects: 2,
            ..FetchConfig::default()
        };
        let err = fetcher(config).fetch(&url(addr, "/loop")).await.unwrap_err();
        assert!(matches!(err, FetchError::TooManyRedirects { limit: 2, .. }));
    }

    #[tokio::test]
    async fn test_mime_allow_list() {
        let addr = spawn_origin().await;
        let config = FetchConfig {
            allowed_mime_types: vec!["image/png".to_string(), "image/jpeg".to_string()],
            ..FetchConfig::default()
        };
        let fetcher = fetcher(config);

        assert!(fetcher.fetch(&url(addr, "/image.png")).await.is_ok());
        let err = fetcher.fetch(&url(addr, "/text")).await.unwrap_err();
        assert!(matches!(err, FetchError::TypeRejected(ref m) if m == "text/html"));
    }

    #[tokio::test]
    async fn test_unresolvable_host_is_dns_error() {
        let err = fetcher(FetchConfig::default())
            .fetch(&Url::parse("http://does-not-exist.invalid/a.jpg").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Dns(_)));
    }

    #[tokio::test]
    async fn test_private_network_policy_is_dns_error() {
        let addr = spawn_origin().await;
        let config = FetchConfig {
            block_private_networks: true,
            ..FetchConfig::default()
        };
        let err = fetcher(config).fetch(&url(addr, "/image.png")).await.unwrap_err();
        assert!(matches!(err, FetchError::Dns(_)));
    }

    #[tokio::test]
    async fn test_squid_dns_header_is_dns_error() {
        let addr = spawn_origin().await;
        let err = fetcher(FetchConfig::default())
            .fetch(&url(addr, "/squid"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Dns(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_origin_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = fetcher(FetchConfig::default())
            .fetch(&url(addr, "/a.jpg"))
            .await
            .unwrap_err();
        let mapped: Error = err.into();
        assert!(matches!(mapped, Error::Origin { status: None, .. }));
    }

    #[test]
    fn test_private_ranges() {
        assert!(is_private_or_local("127.0.0.1".parse().unwrap()));
        assert!(is_private_or_local("10.1.2.3".parse().unwrap()));
        assert!(is_private_or_local("192.168.0.1".parse().unwrap()));
        assert!(is_private_or_local("::1".parse().unwrap()));
        assert!(is_private_or_local("fd00::1".parse().unwrap()));
        assert!(is_private_or_local("::ffff:10.0.0.1".parse().unwrap()));
        assert!(!is_private_or_local("93.184.216.34".parse().unwrap()));
        assert!(!is_private_or_local("2606:2800:220:1::".parse().unwrap()));
    }
}
