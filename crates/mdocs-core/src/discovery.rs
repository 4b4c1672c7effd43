//! Build a document list from a GitHub directory listing.

use crate::fetcher::{GithubPath, SourceFetcher};
use crate::{Document, DocumentSource, Error, ErrorCode, Result, SourceKind};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

/// Deadline applied to a whole discovery run.
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);

const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown"];

/// Discovery settings.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub timeout: Duration,
    /// Extra request headers, e.g. `Authorization`.
    pub headers: BTreeMap<String, String>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            timeout: DISCOVERY_TIMEOUT,
            headers: BTreeMap::new(),
        }
    }
}

/// List the markdown files in `path` (`owner/repo/branch[/dir]`) as a
/// GitHub document source.
///
/// Entries are sorted by file name and numbered in that order. Expiry of
/// `options.timeout` fails with `NETWORK_TIMEOUT`.
pub async fn discover_github(
    fetcher: &SourceFetcher,
    path: &str,
    options: &DiscoveryOptions,
) -> Result<DocumentSource> {
    let target = GithubPath::parse(path)?;
    let documents = tokio::time::timeout(options.timeout, list_markdown(fetcher, &target, &options.headers))
        .await
        .map_err(|_| Error::timeout("discover_github", options.timeout).with_data("path", path))??;

    info!("Discovered {} documents in {target}", documents.len());
    let mut source = DocumentSource::new(SourceKind::Github, documents);
    source.headers.clone_from(&options.headers);
    Ok(source)
}

async fn list_markdown(
    fetcher: &SourceFetcher,
    target: &GithubPath,
    headers: &BTreeMap<String, String>,
) -> Result<Vec<Document>> {
    let payload = fetcher.github_contents(target, headers).await?;
    let Some(entries) = payload.as_array() else {
        return Err(Error::new(
            ErrorCode::GithubApiError,
            format!("GitHub path '{target}' is a file, not a directory"),
        ));
    };

    let category = target
        .path
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or(target.repo.as_str())
        .to_string();

    let mut files: Vec<(&str, &str)> = entries
        .iter()
        .filter(|entry| entry.get("type").and_then(Value::as_str) == Some("file"))
        .filter_map(|entry| {
            let name = entry.get("name").and_then(Value::as_str)?;
            let path = entry.get("path").and_then(Value::as_str)?;
            Some((name, path))
        })
        .filter(|(name, _)| markdown_stem(name).is_some())
        .collect();
    files.sort_unstable_by_key(|(name, _)| *name);
    debug!("{} of {} entries in {target} are markdown", files.len(), entries.len());

    let mut documents = Vec::with_capacity(files.len());
    for (order, (name, path)) in (1_i64..).zip(files) {
        let Some(stem) = markdown_stem(name) else {
            continue;
        };
        documents.push(
            Document::new(stem, humanize(stem))
                .with_file(format!("{}/{}/{}/{path}", target.owner, target.repo, target.branch))
                .with_category(category.clone())
                .with_order(order),
        );
    }
    Ok(documents)
}

fn markdown_stem(name: &str) -> Option<&str> {
    let (stem, ext) = name.rsplit_once('.')?;
    (!stem.is_empty() && MARKDOWN_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
        .then_some(stem)
}

/// `getting-started_guide` → `Getting Started Guide`.
pub fn humanize(stem: &str) -> String {
    stem.split(['-', '_', ' '])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::HttpSettings;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher_for(server: &MockServer) -> SourceFetcher {
        SourceFetcher::from_settings(&HttpSettings {
            github_api_base: server.uri(),
            ..HttpSettings::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_discovers_markdown_files() {
        // Given: A directory with markdown, non-markdown and a subdirectory
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/contents/docs"))
            .and(query_param("ref", "main"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "setup_guide.md", "path": "docs/setup_guide.md", "type": "file"},
                {"name": "api-reference.markdown", "path": "docs/api-reference.markdown", "type": "file"},
                {"name": "logo.png", "path": "docs/logo.png", "type": "file"},
                {"name": "nested", "path": "docs/nested", "type": "dir"}
            ])))
            .mount(&server)
            .await;

        // When: Discovering
        let source = discover_github(&fetcher_for(&server), "acme/widgets/main/docs", &DiscoveryOptions::default())
            .await
            .unwrap();

        // Then: Only markdown files, sorted by name
        assert_eq!(source.kind, SourceKind::Github);
        let docs = &source.documents;
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "api-reference");
        assert_eq!(docs[0].title, "Api Reference");
        assert_eq!(docs[0].file.as_deref(), Some("acme/widgets/main/docs/api-reference.markdown"));
        assert_eq!(docs[0].category.as_deref(), Some("docs"));
        assert_eq!(docs[0].order, Some(1));
        assert_eq!(docs[1].id, "setup_guide");
        assert_eq!(docs[1].title, "Setup Guide");
    }

    #[tokio::test]
    async fn test_file_path_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"type": "file", "content": ""})))
            .mount(&server)
            .await;

        let err = discover_github(&fetcher_for(&server), "acme/widgets/main/README.md", &DiscoveryOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::GithubApiError);
    }

    #[tokio::test]
    async fn test_deadline_expiry_is_timeout_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([]))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;
        let options = DiscoveryOptions {
            timeout: Duration::from_millis(50),
            ..DiscoveryOptions::default()
        };

        let err = discover_github(&fetcher_for(&server), "acme/widgets/main", &options)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NetworkTimeout);
    }

    #[tokio::test]
    async fn test_missing_repository_maps_to_github_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = discover_github(&fetcher_for(&server), "acme/nothing/main", &DiscoveryOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::GithubNotFound);
    }

    #[test]
    fn test_humanize() {
        assert_eq!(humanize("getting-started_guide"), "Getting Started Guide");
        assert_eq!(humanize("README"), "README");
        assert_eq!(humanize("--x--"), "X");
    }
}
