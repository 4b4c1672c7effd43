//! Error types and handling for mdocs-core operations.
//!
//! Every failure in the loader, cache and search layers is represented by a
//! single [`Error`] value. Errors carry a machine-readable [`ErrorCode`], a
//! diagnostic message, a presentation-safe user message, a [`Severity`] used
//! for logging verbosity, a retryability flag, and an [`ErrorContext`] with
//! structured diagnostics.
//!
//! ## Error Categories
//!
//! - **Configuration**: invalid or incomplete site/source configuration
//! - **Document**: missing documents, parse failures
//! - **Network**: transport failures and timeouts (retryable by default)
//! - **Authorization**: rejected credentials (never retried)
//! - **Rate limiting**: generic and GitHub-specific (retryable)
//! - **GitHub**: contents API failures
//! - **Internal**: cancelled operations, invariant violations, unknown failures
//!
//! ## Recovery Hints
//!
//! ```rust
//! use mdocs_core::{Error, ErrorCode};
//!
//! let err = Error::network("connection reset", None);
//! assert!(err.is_retryable());
//! assert_eq!(err.code(), ErrorCode::NetworkError);
//!
//! let missing = Error::document_not_found("intro");
//! assert!(!missing.is_retryable());
//! assert_eq!(missing.category(), "document");
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Machine-readable error codes.
///
/// The set is closed: every error produced by this crate maps to exactly one
/// of these codes, and the code alone decides default severity, retryability
/// and user-facing wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Site or source configuration is invalid.
    InvalidConfiguration,
    /// The requested document does not exist.
    DocumentNotFound,
    /// A document could not be loaded for an unspecified reason.
    DocumentLoadFailed,
    /// Transport-level or unexpected HTTP failure.
    NetworkError,
    /// A request or operation exceeded its deadline.
    NetworkTimeout,
    /// Credentials were missing or rejected.
    UnauthorizedAccess,
    /// The remote server asked us to slow down.
    RateLimited,
    /// A local file does not exist.
    FileNotFound,
    /// A local file exists but could not be read.
    FileReadError,
    /// The process is not allowed to access a resource.
    PermissionDenied,
    /// The GitHub contents API returned an unusable response.
    GithubApiError,
    /// The GitHub API rate limit was exhausted.
    GithubRateLimit,
    /// The GitHub repository, branch or path does not exist.
    GithubNotFound,
    /// A search query could not be answered.
    SearchFailed,
    /// A search query took too long.
    SearchTimeout,
    /// Markdown content could not be decoded or parsed.
    MarkdownParseError,
    /// Code highlighting failed.
    SyntaxHighlightError,
    /// A theme could not be loaded.
    ThemeLoadError,
    /// A theme definition is invalid.
    InvalidTheme,
    /// Anything not otherwise recognized.
    Unknown,
    /// The operation was cancelled before completing.
    OperationCancelled,
    /// A required collaborator is unavailable.
    MissingDependency,
}

impl ErrorCode {
    /// Stable string form, matching the serialized representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidConfiguration => "INVALID_CONFIGURATION",
            Self::DocumentNotFound => "DOCUMENT_NOT_FOUND",
            Self::DocumentLoadFailed => "DOCUMENT_LOAD_FAILED",
            Self::NetworkError => "NETWORK_ERROR",
            Self::NetworkTimeout => "NETWORK_TIMEOUT",
            Self::UnauthorizedAccess => "UNAUTHORIZED_ACCESS",
            Self::RateLimited => "RATE_LIMITED",
            Self::FileNotFound => "FILE_NOT_FOUND",
            Self::FileReadError => "FILE_READ_ERROR",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::GithubApiError => "GITHUB_API_ERROR",
            Self::GithubRateLimit => "GITHUB_RATE_LIMIT",
            Self::GithubNotFound => "GITHUB_NOT_FOUND",
            Self::SearchFailed => "SEARCH_FAILED",
            Self::SearchTimeout => "SEARCH_TIMEOUT",
            Self::MarkdownParseError => "MARKDOWN_PARSE_ERROR",
            Self::SyntaxHighlightError => "SYNTAX_HIGHLIGHT_ERROR",
            Self::ThemeLoadError => "THEME_LOAD_ERROR",
            Self::InvalidTheme => "INVALID_THEME",
            Self::Unknown => "UNKNOWN_ERROR",
            Self::OperationCancelled => "OPERATION_CANCELLED",
            Self::MissingDependency => "MISSING_DEPENDENCY",
        }
    }

    /// Severity assigned when an error is built without an explicit one.
    #[must_use]
    pub const fn default_severity(self) -> Severity {
        match self {
            Self::InvalidConfiguration | Self::MissingDependency => Severity::Critical,
            Self::DocumentLoadFailed | Self::UnauthorizedAccess | Self::Unknown => Severity::High,
            Self::DocumentNotFound
            | Self::NetworkError
            | Self::NetworkTimeout
            | Self::RateLimited
            | Self::FileNotFound
            | Self::FileReadError
            | Self::PermissionDenied
            | Self::GithubApiError
            | Self::GithubRateLimit
            | Self::GithubNotFound
            | Self::MarkdownParseError => Severity::Medium,
            Self::SearchFailed
            | Self::SearchTimeout
            | Self::SyntaxHighlightError
            | Self::ThemeLoadError
            | Self::InvalidTheme
            | Self::OperationCancelled => Severity::Low,
        }
    }

    /// Whether errors with this code are transient unless stated otherwise.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            Self::NetworkError
                | Self::NetworkTimeout
                | Self::RateLimited
                | Self::GithubRateLimit
                | Self::SearchTimeout
        )
    }

    /// Presentation-safe wording for this code.
    #[must_use]
    pub const fn user_message(self) -> &'static str {
        match self {
            Self::InvalidConfiguration => {
                "The documentation viewer is not configured correctly."
            },
            Self::DocumentNotFound | Self::FileNotFound | Self::GithubNotFound => {
                "The requested document could not be found."
            },
            Self::DocumentLoadFailed | Self::FileReadError => "The document could not be loaded.",
            Self::NetworkError => "A network problem prevented loading this content.",
            Self::NetworkTimeout => "The request took too long. Please try again.",
            Self::UnauthorizedAccess | Self::PermissionDenied => {
                "You do not have permission to view this content."
            },
            Self::RateLimited | Self::GithubRateLimit => {
                "Too many requests were made. Please wait a moment and try again."
            },
            Self::GithubApiError => "GitHub returned an unexpected response.",
            Self::SearchFailed | Self::SearchTimeout => "Search is temporarily unavailable.",
            Self::MarkdownParseError => "The document could not be displayed.",
            Self::SyntaxHighlightError => "Code highlighting is unavailable for this block.",
            Self::ThemeLoadError | Self::InvalidTheme => "The selected theme could not be applied.",
            Self::Unknown => "An unexpected error occurred.",
            Self::OperationCancelled => "The operation was cancelled.",
            Self::MissingDependency => "A required component is missing.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How loudly an error should be reported. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Cosmetic or expected failures.
    Low,
    /// Failures that degrade a single view.
    Medium,
    /// Failures that break a feature.
    High,
    /// Failures that prevent the viewer from working at all.
    Critical,
}

/// Diagnostic context attached to every [`Error`].
///
/// Never consulted for control flow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorContext {
    /// When the error was constructed.
    pub timestamp: DateTime<Utc>,
    /// Name of the operation that failed, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    /// Document involved in the failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    /// Rendered form of a wrapped foreign error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original: Option<String>,
    /// Arbitrary structured data (URLs, status codes, reset times).
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub additional: Map<String, Value>,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            timestamp: Utc::now(),
            operation: None,
            document_id: None,
            original: None,
            additional: Map::new(),
        }
    }
}

/// The main error type for mdocs-core operations.
///
/// `Error` is `Clone` so that one failed in-flight load can be observed by
/// every caller waiting on it.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct Error {
    code: ErrorCode,
    message: String,
    severity: Severity,
    retryable: bool,
    user_message: String,
    context: ErrorContext,
}

impl Error {
    /// Build an error with the defaults associated with `code`.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            severity: code.default_severity(),
            retryable: code.is_transient(),
            user_message: code.user_message().to_string(),
            context: ErrorContext::default(),
        }
    }

    /// Machine-readable code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    /// Diagnostic message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Reporting severity.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        self.severity
    }

    /// Whether this particular error instance may be retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Presentation-safe message.
    #[must_use]
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// Diagnostic context.
    #[must_use]
    pub const fn context(&self) -> &ErrorContext {
        &self.context
    }

    /// Override the retryability flag.
    #[must_use]
    pub const fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Override the severity.
    #[must_use]
    pub const fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Override the user-facing message.
    #[must_use]
    pub fn with_user_message(mut self, message: impl Into<String>) -> Self {
        self.user_message = message.into();
        self
    }

    /// Record the operation that failed.
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.context.operation = Some(operation.into());
        self
    }

    /// Record the document involved.
    #[must_use]
    pub fn with_document(mut self, document_id: impl Into<String>) -> Self {
        self.context.document_id = Some(document_id.into());
        self
    }

    /// Record a wrapped foreign error.
    #[must_use]
    pub fn with_original(mut self, original: impl fmt::Display) -> Self {
        self.context.original = Some(original.to_string());
        self
    }

    /// Attach a structured diagnostic value.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.additional.insert(key.into(), value.into());
        self
    }

    /// Fill in operation and document only where they are not already set.
    #[must_use]
    pub fn or_context(mut self, operation: &str, document_id: Option<&str>) -> Self {
        if self.context.operation.is_none() {
            self.context.operation = Some(operation.to_string());
        }
        if self.context.document_id.is_none() {
            self.context.document_id = document_id.map(str::to_string);
        }
        self
    }

    /// Get the error category as a string identifier.
    ///
    /// Useful for grouping errors in logs without matching on every code.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self.code {
            ErrorCode::InvalidConfiguration | ErrorCode::MissingDependency => "configuration",
            ErrorCode::DocumentNotFound
            | ErrorCode::DocumentLoadFailed
            | ErrorCode::FileNotFound
            | ErrorCode::FileReadError => "document",
            ErrorCode::NetworkError | ErrorCode::NetworkTimeout => "network",
            ErrorCode::UnauthorizedAccess | ErrorCode::PermissionDenied => "authorization",
            ErrorCode::RateLimited => "rate_limit",
            ErrorCode::GithubApiError | ErrorCode::GithubRateLimit | ErrorCode::GithubNotFound => {
                "github"
            },
            ErrorCode::SearchFailed | ErrorCode::SearchTimeout => "search",
            ErrorCode::MarkdownParseError | ErrorCode::SyntaxHighlightError => "render",
            ErrorCode::ThemeLoadError | ErrorCode::InvalidTheme => "theme",
            ErrorCode::Unknown | ErrorCode::OperationCancelled => "internal",
        }
    }

    /// The mount point for the viewer does not exist.
    pub fn container_not_found(selector: &str) -> Self {
        Self::new(
            ErrorCode::InvalidConfiguration,
            format!("Container element not found: {selector}"),
        )
        .with_data("selector", selector)
    }

    /// No document with `document_id` exists in the source.
    pub fn document_not_found(document_id: &str) -> Self {
        Self::new(
            ErrorCode::DocumentNotFound,
            format!("Document not found: {document_id}"),
        )
        .with_document(document_id)
    }

    /// Transport or HTTP failure, with the status code when one was received.
    ///
    /// Client errors other than 408 are not retried; everything else is.
    pub fn network(message: impl Into<String>, status: Option<u16>) -> Self {
        let retryable = status.is_none_or(|s| s >= 500 || s == 408);
        let err = Self::new(ErrorCode::NetworkError, message).with_retryable(retryable);
        match status {
            Some(status) => err.with_data("status", status),
            None => err,
        }
    }

    /// Map a failed GitHub API response to the matching code.
    ///
    /// 404 becomes not-found, 403 becomes a (retryable) rate-limit, anything
    /// else is a generic API error.
    pub fn github_api(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        let err = match status {
            404 => Self::new(ErrorCode::GithubNotFound, message),
            403 => Self::new(ErrorCode::GithubRateLimit, message),
            _ => Self::new(ErrorCode::GithubApiError, message).with_retryable(false),
        };
        err.with_data("status", status)
    }

    /// Markdown could not be decoded or parsed.
    pub fn parse(message: impl Into<String>, document_id: Option<&str>) -> Self {
        let err = Self::new(ErrorCode::MarkdownParseError, message);
        match document_id {
            Some(id) => err.with_document(id),
            None => err,
        }
    }

    /// Configuration is unusable.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfiguration, message)
    }

    /// Credentials were rejected by the remote server.
    pub fn unauthorized(url: &str, status: u16) -> Self {
        Self::new(
            ErrorCode::UnauthorizedAccess,
            format!("Access denied ({status}) for {url}"),
        )
        .with_data("url", url)
        .with_data("status", status)
    }

    /// The remote server returned 429.
    pub fn rate_limited(url: &str, retry_after: Option<&str>) -> Self {
        let err = Self::new(ErrorCode::RateLimited, format!("Rate limited by {url}"))
            .with_data("url", url);
        match retry_after {
            Some(value) => err.with_data("retry_after", value),
            None => err,
        }
    }

    /// An operation exceeded its deadline.
    pub fn timeout(operation: &str, after: std::time::Duration) -> Self {
        Self::new(
            ErrorCode::NetworkTimeout,
            format!("{operation} timed out after {}ms", after.as_millis()),
        )
        .with_operation(operation)
    }

    /// An internal invariant was violated.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unknown, message)
            .with_retryable(false)
            .with_severity(Severity::Critical)
    }

    /// Wrap an arbitrary failure, preserving it if it already is an [`Error`].
    pub fn from_any(err: anyhow::Error) -> Self {
        match err.downcast::<Self>() {
            Ok(err) => err,
            Err(other) => Self::new(ErrorCode::Unknown, other.to_string())
                .with_retryable(false)
                .with_original(format!("{other:#}")),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let url = err.url().map(ToString::to_string);
        let mapped = if err.is_timeout() {
            Self::new(ErrorCode::NetworkTimeout, format!("Request timed out: {err}"))
        } else {
            Self::network(format!("Request failed: {err}"), err.status().map(|s| s.as_u16()))
        };
        let mapped = mapped.with_original(&err);
        match url {
            Some(url) => mapped.with_data("url", url),
            None => mapped,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let code = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorCode::FileNotFound,
            std::io::ErrorKind::PermissionDenied => ErrorCode::PermissionDenied,
            _ => ErrorCode::FileReadError,
        };
        Self::new(code, format!("IO error: {err}")).with_original(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorCode::MarkdownParseError, format!("Invalid JSON: {err}")).with_original(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::invalid_config(format!("Invalid configuration: {err}")).with_original(err)
    }
}

/// Access to the structured error model inside an arbitrary error value.
///
/// The retry policy only retries failures that expose an [`Error`] through
/// this trait; everything else is treated as permanent.
pub trait Classify {
    /// The wrapped [`Error`], if this value carries one.
    fn docs_error(&self) -> Option<&Error>;
}

impl Classify for Error {
    fn docs_error(&self) -> Option<&Error> {
        Some(self)
    }
}

impl Classify for anyhow::Error {
    fn docs_error(&self) -> Option<&Error> {
        self.downcast_ref::<Error>()
    }
}

impl Classify for std::io::Error {
    fn docs_error(&self) -> Option<&Error> {
        None
    }
}

/// Convenience type alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::disallowed_macros,
    clippy::unwrap_used,
    clippy::unnecessary_wraps
)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io;

    #[test]
    fn test_new_error_uses_code_defaults() {
        // Given: A code with known defaults
        let err = Error::new(ErrorCode::RateLimited, "slow down");

        // Then: Defaults follow the code
        assert_eq!(err.code(), ErrorCode::RateLimited);
        assert_eq!(err.severity(), Severity::Medium);
        assert!(err.is_retryable());
        assert_eq!(err.user_message(), ErrorCode::RateLimited.user_message());
        assert_eq!(err.to_string(), "slow down");
    }

    #[test]
    fn test_user_message_is_distinct_from_diagnostic_message() {
        let err = Error::document_not_found("guide/setup");
        assert!(err.message().contains("guide/setup"));
        assert!(!err.user_message().contains("guide/setup"));
        assert_eq!(err.context().document_id.as_deref(), Some("guide/setup"));
    }

    #[test]
    fn test_github_api_status_mapping() {
        let not_found = Error::github_api(404, "missing");
        assert_eq!(not_found.code(), ErrorCode::GithubNotFound);
        assert!(!not_found.is_retryable());

        let limited = Error::github_api(403, "limited");
        assert_eq!(limited.code(), ErrorCode::GithubRateLimit);
        assert!(limited.is_retryable());

        let other = Error::github_api(500, "boom");
        assert_eq!(other.code(), ErrorCode::GithubApiError);
        assert!(!other.is_retryable());
        assert_eq!(other.context().additional.get("status"), Some(&Value::from(500)));
    }

    #[test]
    fn test_network_error_status_retryability() {
        assert!(Error::network("reset", None).is_retryable());
        assert!(Error::network("bad gateway", Some(502)).is_retryable());
        assert!(Error::network("timeout", Some(408)).is_retryable());
        assert!(!Error::network("gone", Some(410)).is_retryable());
    }

    #[test]
    fn test_container_not_found_is_configuration() {
        let err = Error::container_not_found("#docs");
        assert_eq!(err.code(), ErrorCode::InvalidConfiguration);
        assert_eq!(err.severity(), Severity::Critical);
        assert_eq!(err.category(), "configuration");
        assert!(err.message().contains("#docs"));
    }

    #[test]
    fn test_parse_error_records_document() {
        let err = Error::parse("bad fence", Some("api"));
        assert_eq!(err.code(), ErrorCode::MarkdownParseError);
        assert_eq!(err.context().document_id.as_deref(), Some("api"));
        assert!(Error::parse("bad", None).context().document_id.is_none());
    }

    #[test]
    fn test_error_from_io_error() {
        let cases = vec![
            (io::ErrorKind::NotFound, ErrorCode::FileNotFound),
            (io::ErrorKind::PermissionDenied, ErrorCode::PermissionDenied),
            (io::ErrorKind::InvalidData, ErrorCode::FileReadError),
        ];

        for (kind, expected) in cases {
            let err: Error = io::Error::new(kind, "test").into();
            assert_eq!(err.code(), expected);
            assert!(err.context().original.is_some());
        }
    }

    #[test]
    fn test_error_categories() {
        let cases = vec![
            (ErrorCode::InvalidConfiguration, "configuration"),
            (ErrorCode::DocumentNotFound, "document"),
            (ErrorCode::NetworkTimeout, "network"),
            (ErrorCode::UnauthorizedAccess, "authorization"),
            (ErrorCode::RateLimited, "rate_limit"),
            (ErrorCode::GithubRateLimit, "github"),
            (ErrorCode::SearchFailed, "search"),
            (ErrorCode::MarkdownParseError, "render"),
            (ErrorCode::InvalidTheme, "theme"),
            (ErrorCode::Unknown, "internal"),
        ];

        for (code, category) in cases {
            assert_eq!(Error::new(code, "x").category(), category, "{code}");
        }
    }

    #[test]
    fn test_from_any_preserves_docs_errors() {
        let original = Error::unauthorized("https://example.com/a.md", 401);
        let wrapped = Error::from_any(anyhow::Error::new(original));
        assert_eq!(wrapped.code(), ErrorCode::UnauthorizedAccess);

        let foreign = Error::from_any(anyhow::anyhow!("disk on fire"));
        assert_eq!(foreign.code(), ErrorCode::Unknown);
        assert!(!foreign.is_retryable());
        assert_eq!(foreign.context().original.as_deref(), Some("disk on fire"));
    }

    #[test]
    fn test_or_context_keeps_existing_values() {
        let err = Error::document_not_found("a")
            .with_operation("fetch")
            .or_context("load_document", Some("b"));
        assert_eq!(err.context().operation.as_deref(), Some("fetch"));
        assert_eq!(err.context().document_id.as_deref(), Some("a"));
    }

    #[test]
    fn test_classify_for_foreign_errors() {
        let io_err = io::Error::other("x");
        assert!(io_err.docs_error().is_none());

        let any: anyhow::Error = Error::network("x", None).into();
        assert_eq!(any.docs_error().map(Error::code), Some(ErrorCode::NetworkError));
    }

    #[test]
    fn test_error_code_serialization() -> anyhow::Result<()> {
        let json = serde_json::to_string(&ErrorCode::GithubRateLimit)?;
        assert_eq!(json, "\"GITHUB_RATE_LIMIT\"");
        let back: ErrorCode = serde_json::from_str(&json)?;
        assert_eq!(back, ErrorCode::GithubRateLimit);
        Ok(())
    }

    proptest! {
        #[test]
        fn test_messages_survive_arbitrary_text(msg in r".{0,500}") {
            let err = Error::new(ErrorCode::Unknown, msg.clone());
            prop_assert_eq!(err.to_string(), msg);
        }
    }
}
