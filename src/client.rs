use crate::config::Config;
use crate::constants::constants;
use crate::error::SearchError;
use crate::protocol::{ErrorBody, SearchRequest};
use crate::stream::SearchStream;
use anyhow::{Context as AnyhowContext, Result};
use chrono::{Local, NaiveDate};
use log::debug;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Where and how a [`SearchStreamClient`] talks to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub base_url: String,
    pub search_path: String,
    pub export_path: String,
    pub token: Option<String>,
    pub timeout: Duration,
    pub channel_capacity: usize,
    /// Honor `HTTP_PROXY`/`HTTPS_PROXY` from the environment
    pub use_system_proxy: bool,
}

impl ClientSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config
                .server_url
                .clone()
                .unwrap_or_else(|| constants::DEFAULT_SERVER_URL.to_string()),
            search_path: config.endpoints.search.clone(),
            export_path: config.endpoints.export.clone(),
            token: config.token.clone(),
            timeout: Duration::from_millis(config.stream.timeout_ms),
            channel_capacity: config.stream.channel_capacity,
            use_system_proxy: config.use_system_proxy.unwrap_or(true),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_system_proxy(mut self, enabled: bool) -> Self {
        self.use_system_proxy = enabled;
        self
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: constants::DEFAULT_SERVER_URL.to_string(),
            search_path: constants::DEFAULT_SEARCH_PATH.to_string(),
            export_path: constants::DEFAULT_EXPORT_PATH.to_string(),
            token: None,
            timeout: Duration::from_millis(constants::SEARCH_TIMEOUT_MS),
            channel_capacity: constants::DEFAULT_CHANNEL_CAPACITY,
            use_system_proxy: true,
        }
    }
}

/// Result of a CSV export: the raw body and a filename to save it under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvExport {
    pub filename: String,
    pub content: Vec<u8>,
}

impl CsvExport {
    /// `find-results-YYYY-MM-DD.csv` for the given day.
    pub fn suggested_filename(date: NaiveDate) -> String {
        format!(
            "{}-{}.csv",
            constants::CSV_FILENAME_PREFIX,
            date.format("%Y-%m-%d")
        )
    }

    /// Save under `dir` using the suggested filename.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create export directory {}", dir.display()))?;
        let path = dir.join(&self.filename);
        fs::write(&path, &self.content)
            .with_context(|| format!("Failed to write export to {}", path.display()))?;
        Ok(path)
    }
}

/// Client for the streaming find/replace search.
///
/// Holds one pooled HTTP client; every [`execute_search`](Self::execute_search)
/// call still gets its own request, buffer and cancellation token.
pub struct SearchStreamClient {
    http: reqwest::Client,
    settings: ClientSettings,
}

impl SearchStreamClient {
    pub fn new(settings: ClientSettings) -> Result<Self> {
        let mut builder =
            reqwest::Client::builder().user_agent(concat!("findstream/", env!("CARGO_PKG_VERSION")));
        if !settings.use_system_proxy {
            builder = builder.no_proxy();
        }
        let http = builder
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http, settings })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Start a streaming search.
    ///
    /// Must be called from within a tokio runtime. The session is not tied to
    /// any other session of this client; starting a second search does not
    /// cancel the first.
    pub fn execute_search(&self, request: &SearchRequest) -> SearchStream {
        let url = self.endpoint(&self.settings.search_path);
        debug!(
            "Starting search for '{}' at {}",
            request.criteria().pattern,
            url
        );

        let builder = self.authorize(
            self.http
                .post(url)
                .header(ACCEPT, constants::EVENT_STREAM_MIME)
                .json(request),
        );
        SearchStream::spawn(
            builder,
            self.settings.timeout,
            self.settings.channel_capacity,
        )
    }

    /// Fetch complete results as CSV from the configured export endpoint.
    pub async fn export_csv(&self, request: &SearchRequest) -> Result<CsvExport, SearchError> {
        let url = self.endpoint(&self.settings.export_path);
        self.export_from_url(url, request).await
    }

    /// Fetch complete results as CSV from a fallback URL the server handed out.
    ///
    /// Relative URLs are resolved against the configured server.
    pub async fn export_csv_from(
        &self,
        url: &str,
        request: &SearchRequest,
    ) -> Result<CsvExport, SearchError> {
        let url = if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            self.endpoint(url)
        };
        self.export_from_url(url, request).await
    }

    async fn export_from_url(
        &self,
        url: String,
        request: &SearchRequest,
    ) -> Result<CsvExport, SearchError> {
        debug!("Exporting search results as CSV from {}", url);
        let started = Instant::now();

        let response = self
            .authorize(
                self.http
                    .post(&url)
                    .header(ACCEPT, constants::CSV_MIME)
                    .timeout(self.settings.timeout)
                    .json(request),
            )
            .send()
            .await
            .map_err(|e| transport_error(e, started))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            let message = serde_json::from_slice::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.text().map(str::to_string))
                .unwrap_or_else(|| {
                    format!(
                        "CSV export failed: {}",
                        status.canonical_reason().unwrap_or("unknown status")
                    )
                });
            return Err(SearchError::ServerError {
                status: status.as_u16(),
                message,
            });
        }

        let content = response
            .bytes()
            .await
            .map_err(|e| transport_error(e, started))?
            .to_vec();
        debug!("CSV export received {} bytes", content.len());

        Ok(CsvExport {
            filename: CsvExport::suggested_filename(Local::now().date_naive()),
            content,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.settings.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.settings.token {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => builder,
        }
    }
}

fn transport_error(err: reqwest::Error, started: Instant) -> SearchError {
    if err.is_timeout() {
        SearchError::Timeout {
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    } else {
        SearchError::from(err)
    }
}
