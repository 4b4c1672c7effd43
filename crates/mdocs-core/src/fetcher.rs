use crate::config::HttpSettings;
use crate::{DocumentSource, Error, ErrorCode, Result, SourceKind};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::DateTime;
use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";

/// HTTP/filesystem client implementing one fetch strategy per [`SourceKind`].
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    client: Client,
    github_api_base: String,
}

impl SourceFetcher {
    /// Creates a fetcher with default HTTP settings
    pub fn new() -> Result<Self> {
        Self::from_settings(&HttpSettings::default())
    }

    /// Creates a fetcher from configured HTTP settings
    pub fn from_settings(settings: &HttpSettings) -> Result<Self> {
        let user_agent = settings
            .user_agent
            .clone()
            .unwrap_or_else(|| concat!("mdocs/", env!("CARGO_PKG_VERSION")).to_string());
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .user_agent(user_agent)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| Error::new(ErrorCode::MissingDependency, format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            github_api_base: settings.github_api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the markdown for `file` using the strategy selected by the source kind.
    pub async fn fetch(&self, source: &DocumentSource, file: &str) -> Result<String> {
        match source.kind {
            SourceKind::Local => self.fetch_local(source.base_path.as_deref(), file).await,
            SourceKind::Url => {
                let url = join_path(source.base_url.as_deref(), file);
                self.fetch_url(&url, &source.headers).await
            },
            SourceKind::Github => self.fetch_github(file, &source.headers).await,
            SourceKind::Content => Err(Error::internal(format!(
                "content source has no fetch strategy (file '{file}'); inline content must be resolved before dispatch"
            ))),
        }
    }

    /// Read `base_path/file`, either over HTTP when the base is a URL or from disk.
    pub async fn fetch_local(&self, base_path: Option<&str>, file: &str) -> Result<String> {
        let location = join_path(base_path, file);
        if is_http(&location) {
            let response = self.client.get(&location).send().await?;
            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                return Err(missing_document(&location).with_data("url", location));
            }
            if !status.is_success() {
                return Err(status_error(&location, status));
            }
            return Ok(response.text().await?);
        }

        match tokio::fs::read_to_string(&location).await {
            Ok(content) => {
                debug!("Read {} bytes from {location}", content.len());
                Ok(content)
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(missing_document(&location).with_data("path", location))
            },
            Err(e) => Err(Error::from(e).with_data("path", location)),
        }
    }

    /// GET `url` with the configured headers.
    pub async fn fetch_url(&self, url: &str, headers: &BTreeMap<String, String>) -> Result<String> {
        let response = self
            .client
            .get(url)
            .headers(header_map(headers)?)
            .send()
            .await?;
        let status = response.status();

        match status {
            StatusCode::NOT_FOUND => {
                return Err(missing_document(url).with_data("url", url));
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(Error::unauthorized(url, status.as_u16()));
            },
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok());
                return Err(Error::rate_limited(url, retry_after));
            },
            s if !s.is_success() => return Err(status_error(url, s)),
            _ => {},
        }

        let content = response.text().await?;
        info!("Fetched {} bytes from {}", content.len(), url);
        Ok(content)
    }

    /// Read a file through the GitHub contents API.
    ///
    /// `path` has the form `owner/repo/branch/path/to/file.md`.
    pub async fn fetch_github(&self, path: &str, headers: &BTreeMap<String, String>) -> Result<String> {
        let target = GithubPath::parse(path)?;
        let payload = self.github_contents(&target, headers).await?;

        if payload.is_array() {
            return Err(Error::new(
                ErrorCode::GithubApiError,
                format!("Path '{path}' is a directory, not a file"),
            ));
        }

        let encoded = payload.get("content").and_then(Value::as_str).ok_or_else(|| {
            Error::new(
                ErrorCode::GithubApiError,
                format!("GitHub response for '{path}' has no content field"),
            )
        })?;

        let content = decode_base64_content(encoded)?;
        info!("Fetched {} bytes from GitHub {}", content.len(), path);
        Ok(content)
    }

    /// Raw JSON payload of the contents API for `target`.
    pub async fn github_contents(
        &self,
        target: &GithubPath,
        headers: &BTreeMap<String, String>,
    ) -> Result<Value> {
        let url = target.api_url(&self.github_api_base)?;
        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, GITHUB_ACCEPT)
            .headers(header_map(headers)?)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            return Err(github_status_error(&target.to_string(), response));
        }

        let payload = response.json::<Value>().await.map_err(|e| {
            Error::new(ErrorCode::GithubApiError, format!("Invalid GitHub response: {e}"))
                .with_data("url", url.to_string())
        })?;
        Ok(payload)
    }
}

/// Parsed `owner/repo/branch/path...` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GithubPath {
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Branch, tag or commit used as `ref`.
    pub branch: String,
    /// Path inside the repository; empty for the repository root.
    pub path: String,
}

impl GithubPath {
    /// Parse a reference, requiring at least owner, repo and branch.
    pub fn parse(raw: &str) -> Result<Self> {
        let segments: Vec<&str> = raw.trim_matches('/').split('/').collect();
        if segments.len() < 3 || segments[..3].iter().any(|s| s.is_empty()) {
            return Err(Error::invalid_config(format!(
                "Invalid GitHub path '{raw}': expected owner/repo/branch/path"
            ))
            .with_retryable(false)
            .with_data("path", raw));
        }
        Ok(Self {
            owner: segments[0].to_string(),
            repo: segments[1].to_string(),
            branch: segments[2].to_string(),
            path: segments[3..].join("/"),
        })
    }

    /// Contents API URL relative to `api_base`.
    pub fn api_url(&self, api_base: &str) -> Result<Url> {
        let mut url = Url::parse(api_base)
            .map_err(|e| Error::invalid_config(format!("Invalid GitHub API base '{api_base}': {e}")))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| Error::invalid_config(format!("GitHub API base '{api_base}' cannot be a base")))?;
            segments
                .pop_if_empty()
                .extend(["repos", self.owner.as_str(), self.repo.as_str(), "contents"])
                .extend(self.path.split('/').filter(|s| !s.is_empty()));
        }
        url.query_pairs_mut().append_pair("ref", &self.branch);
        Ok(url)
    }
}

impl std::fmt::Display for GithubPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.owner, self.repo, self.branch)?;
        if !self.path.is_empty() {
            write!(f, "/{}", self.path)?;
        }
        Ok(())
    }
}

fn github_status_error(path: &str, response: Response) -> Error {
    let status = response.status();
    let message = match status {
        StatusCode::NOT_FOUND => format!("GitHub path not found: {path}"),
        StatusCode::FORBIDDEN => {
            let reset = response
                .headers()
                .get("x-ratelimit-reset")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<i64>().ok())
                .and_then(|secs| DateTime::from_timestamp(secs, 0));
            match reset {
                Some(at) => format!("GitHub API rate limit exceeded; resets at {}", at.to_rfc3339()),
                None => "GitHub API rate limit exceeded".to_string(),
            }
        },
        other => format!("GitHub API error {} for {path}", other.as_u16()),
    };
    Error::github_api(status.as_u16(), message).with_data("path", path)
}

/// The document id is left for the loader to attach.
fn missing_document(location: &str) -> Error {
    Error::new(ErrorCode::DocumentNotFound, format!("Document not found at '{location}'"))
}

fn status_error(url: &str, status: StatusCode) -> Error {
    Error::network(
        format!(
            "HTTP {} {} for {url}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        ),
        Some(status.as_u16()),
    )
    .with_data("url", url)
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::invalid_config(format!("Invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::invalid_config(format!("Invalid value for header '{name}': {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn decode_base64_content(encoded: &str) -> Result<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD.decode(compact).map_err(|e| {
        Error::new(ErrorCode::GithubApiError, format!("Invalid base64 content: {e}"))
    })?;
    String::from_utf8(bytes)
        .map_err(|e| Error::parse(format!("Document is not valid UTF-8: {e}"), None))
}

/// `base/file`, or `file` alone when there is no base.
pub fn join_path(base: Option<&str>, file: &str) -> String {
    match base.map(|b| b.trim_end_matches('/')).filter(|b| !b.is_empty()) {
        Some(base) => format!("{base}/{}", file.trim_start_matches('/')),
        None => file.to_string(),
    }
}

fn is_http(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::disallowed_macros,
    clippy::match_wildcard_for_single_variants
)]
mod tests {
    use super::*;
    use crate::Document;
    use tempfile::TempDir;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path, query_param},
    };

    fn fetcher_for(server: &MockServer) -> SourceFetcher {
        SourceFetcher::from_settings(&HttpSettings {
            timeout_secs: 5,
            github_api_base: server.uri(),
            user_agent: None,
        })
        .unwrap()
    }

    fn url_source(server: &MockServer) -> DocumentSource {
        DocumentSource::new(SourceKind::Url, vec![])
            .with_base_url(format!("{}/docs", server.uri()))
            .with_header("x-api-key", "secret")
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path(Some("docs"), "a.md"), "docs/a.md");
        assert_eq!(join_path(Some("docs/"), "/a.md"), "docs/a.md");
        assert_eq!(join_path(Some(""), "a.md"), "a.md");
        assert_eq!(join_path(None, "a.md"), "a.md");
    }

    #[test]
    fn test_github_path_parsing() {
        let parsed = GithubPath::parse("rust-lang/book/main/src/ch01.md").unwrap();
        assert_eq!(parsed.owner, "rust-lang");
        assert_eq!(parsed.branch, "main");
        assert_eq!(parsed.path, "src/ch01.md");
        assert_eq!(parsed.to_string(), "rust-lang/book/main/src/ch01.md");

        let url = parsed.api_url("https://api.github.com").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/rust-lang/book/contents/src/ch01.md?ref=main"
        );
    }

    #[test]
    fn test_github_path_requires_three_segments() {
        for raw in ["owner/repo", "owner", "", "owner//main"] {
            let err = GithubPath::parse(raw).unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidConfiguration, "{raw}");
            assert!(!err.is_retryable());
        }
    }

    #[tokio::test]
    async fn test_local_file_read_and_missing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("intro.md"), "# Intro").unwrap();
        let fetcher = SourceFetcher::new().unwrap();
        let base = dir.path().to_str().unwrap();

        let content = fetcher.fetch_local(Some(base), "intro.md").await.unwrap();
        assert_eq!(content, "# Intro");

        let err = fetcher.fetch_local(Some(base), "missing.md").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::DocumentNotFound);
        assert!(err.message().contains("missing.md"));
        assert_eq!(err.context().document_id, None);
    }

    #[tokio::test]
    async fn test_local_over_http_maps_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/site/a.md"))
            .respond_with(ResponseTemplate::new(200).set_body_string("# A"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/site/gone.md"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/site/broken.md"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server);
        let base = format!("{}/site", server.uri());

        assert_eq!(fetcher.fetch_local(Some(&base), "a.md").await.unwrap(), "# A");
        let missing = fetcher.fetch_local(Some(&base), "gone.md").await.unwrap_err();
        assert_eq!(missing.code(), ErrorCode::DocumentNotFound);
        let broken = fetcher.fetch_local(Some(&base), "broken.md").await.unwrap_err();
        assert_eq!(broken.code(), ErrorCode::NetworkError);
        assert!(broken.is_retryable());
    }

    #[tokio::test]
    async fn test_url_fetch_sends_configured_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/docs/guide.md"))
            .and(header("x-api-key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_string("# Guide"))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server);
        let content = fetcher.fetch(&url_source(&server), "guide.md").await.unwrap();
        assert_eq!(content, "# Guide");
    }

    #[tokio::test]
    async fn test_url_status_mapping() {
        let server = MockServer::start().await;
        for (file, status) in [("missing.md", 404), ("private.md", 401), ("forbidden.md", 403), ("busy.md", 429), ("teapot.md", 418)] {
            Mock::given(method("GET"))
                .and(path(format!("/docs/{file}")))
                .respond_with(ResponseTemplate::new(status).insert_header("retry-after", "7"))
                .mount(&server)
                .await;
        }

        let fetcher = fetcher_for(&server);
        let source = url_source(&server);
        let code_of = |file: &'static str| {
            let fetcher = fetcher.clone();
            let source = source.clone();
            async move { fetcher.fetch(&source, file).await.unwrap_err() }
        };

        assert_eq!(code_of("missing.md").await.code(), ErrorCode::DocumentNotFound);

        let private = code_of("private.md").await;
        assert_eq!(private.code(), ErrorCode::UnauthorizedAccess);
        assert!(!private.is_retryable());
        assert_eq!(code_of("forbidden.md").await.code(), ErrorCode::UnauthorizedAccess);

        let busy = code_of("busy.md").await;
        assert_eq!(busy.code(), ErrorCode::RateLimited);
        assert!(busy.is_retryable());
        assert_eq!(busy.context().additional.get("retry_after"), Some(&Value::from("7")));

        let teapot = code_of("teapot.md").await;
        assert_eq!(teapot.code(), ErrorCode::NetworkError);
    }

    #[tokio::test]
    async fn test_transport_failure_is_network_error() {
        let fetcher = SourceFetcher::new().unwrap();
        let headers = BTreeMap::new();
        // Port 9 (discard) on localhost is closed in test environments
        let err = fetcher.fetch_url("http://127.0.0.1:9/a.md", &headers).await.unwrap_err();
        assert!(matches!(err.code(), ErrorCode::NetworkError | ErrorCode::NetworkTimeout));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_github_decodes_base64_content() {
        let server = MockServer::start().await;
        let encoded = STANDARD.encode("# Hello from GitHub\n");
        // GitHub wraps base64 at 60 columns
        let wrapped = format!("{}\n{}", &encoded[..10], &encoded[10..]);
        Mock::given(method("GET"))
            .and(path("/repos/acme/docs/contents/guide/intro.md"))
            .and(query_param("ref", "main"))
            .and(header("accept", GITHUB_ACCEPT))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "type": "file",
                "encoding": "base64",
                "content": wrapped,
            })))
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server);
        let content = fetcher
            .fetch_github("acme/docs/main/guide/intro.md", &BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(content, "# Hello from GitHub\n");
    }

    #[tokio::test]
    async fn test_github_error_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/docs/contents/missing.md"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/docs/contents/limited.md"))
            .respond_with(ResponseTemplate::new(403).insert_header("x-ratelimit-reset", "1700000000"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/docs/contents/guide"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"name": "a.md", "type": "file"}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/docs/contents/empty.md"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"type": "file"})))
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server);
        let headers = BTreeMap::new();

        let missing = fetcher.fetch_github("acme/docs/main/missing.md", &headers).await.unwrap_err();
        assert_eq!(missing.code(), ErrorCode::GithubNotFound);

        let limited = fetcher.fetch_github("acme/docs/main/limited.md", &headers).await.unwrap_err();
        assert_eq!(limited.code(), ErrorCode::GithubRateLimit);
        assert!(limited.is_retryable());
        assert!(limited.message().contains("resets at 2023-11-14"));

        let dir = fetcher.fetch_github("acme/docs/main/guide", &headers).await.unwrap_err();
        assert_eq!(dir.code(), ErrorCode::GithubApiError);
        assert!(dir.message().contains("directory"));

        let empty = fetcher.fetch_github("acme/docs/main/empty.md", &headers).await.unwrap_err();
        assert_eq!(empty.code(), ErrorCode::GithubApiError);
    }

    #[tokio::test]
    async fn test_github_invalid_path_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server);
        let err = fetcher.fetch_github("acme/docs", &BTreeMap::new()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidConfiguration);
    }

    #[tokio::test]
    async fn test_content_kind_has_no_fetch_strategy() {
        let fetcher = SourceFetcher::new().unwrap();
        let source = DocumentSource::new(
            SourceKind::Content,
            vec![Document::new("a", "A").with_content("# A")],
        );
        let err = fetcher.fetch(&source, "a.md").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unknown);
        assert!(!err.is_retryable());
    }
}
