use crate::constants::constants;
use crate::error::RequestError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Scope of a search: one resource, a resource with its dependencies, or a directory tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SearchContext {
    #[serde(rename_all = "camelCase")]
    SingleResource { resource_id: String },
    #[serde(rename_all = "camelCase")]
    ResourceWithDependencies {
        resource_id: String,
        explicit_only: bool,
    },
    #[serde(rename = "directory", rename_all = "camelCase")]
    DirectoryScope { directory_id: String, recursive: bool },
}

/// XML node kinds an XML-aware search may be restricted to.
///
/// Declaration order is the order used when the set is serialized.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ContentType {
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
    Cdata,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Element => "element",
            ContentType::Attribute => "attribute",
            ContentType::Text => "text",
            ContentType::Comment => "comment",
            ContentType::ProcessingInstruction => "processing-instruction",
            ContentType::Cdata => "cdata",
        }
    }
}

impl std::str::FromStr for ContentType {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "element" => Ok(ContentType::Element),
            "attribute" => Ok(ContentType::Attribute),
            "text" => Ok(ContentType::Text),
            "comment" => Ok(ContentType::Comment),
            "processing-instruction" | "pi" => Ok(ContentType::ProcessingInstruction),
            "cdata" => Ok(ContentType::Cdata),
            other => Err(RequestError::UnknownContentType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct XmlOptions {
    #[serde(default)]
    pub content_types: BTreeSet<ContentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpath_restriction: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchCriteria {
    pub pattern: String,
    pub is_regex: bool,
    pub case_sensitive: bool,
    pub whole_words_only: bool,
    pub ignore_whitespace: bool,
    pub dot_matches_all: bool,
    pub canonical_equivalence: bool,
    pub xml_aware: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xml_options: Option<XmlOptions>,
}

impl SearchCriteria {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            ..Self::default()
        }
    }
}

/// Body of both the streaming search and the CSV export.
///
/// Built once per search and never mutated; use [`SearchRequest::new`] so the
/// pattern and result cap are checked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    context: SearchContext,
    criteria: SearchCriteria,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_results: Option<u32>,
}

impl SearchRequest {
    pub fn new(
        context: SearchContext,
        criteria: SearchCriteria,
        max_results: Option<u32>,
    ) -> Result<Self, RequestError> {
        if criteria.pattern.is_empty() {
            return Err(RequestError::EmptyPattern);
        }
        if let Some(max) = max_results {
            if max == 0 || max > constants::INTERACTIVE_MAX_RESULTS {
                return Err(RequestError::MaxResultsOutOfRange(max));
            }
        }
        Ok(Self {
            context,
            criteria,
            max_results,
        })
    }

    pub fn context(&self) -> &SearchContext {
        &self.context
    }

    pub fn criteria(&self) -> &SearchCriteria {
        &self.criteria
    }

    pub fn max_results(&self) -> Option<u32> {
        self.max_results
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskStarted {
    pub task_id: String,
    pub total_resources: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    pub id: String,
    pub path: String,
    pub file_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpath: Option<String>,
    pub context: String,
    pub match_start: u64,
    pub match_end: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileMatches {
    pub resource: ResourceRef,
    #[serde(default)]
    pub matches: Vec<Match>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub resources_processed: u64,
    pub total_resources: u64,
    pub matches_found: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Completed {
    pub total_matches: u64,
    pub total_resources: u64,
    pub resources_with_matches: u64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Failed {
    pub status_code: u16,
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches_found: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csv_fallback_url: Option<String>,
}

/// One decoded frame of the search stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    TaskStarted(TaskStarted),
    FileMatches(FileMatches),
    Progress(Progress),
    Completed(Completed),
    Failed(Failed),
}

impl StreamEvent {
    pub const TASK_STARTED: &'static str = "task-started";
    pub const FILE_MATCHES: &'static str = "file-matches";
    pub const PROGRESS: &'static str = "progress";
    pub const COMPLETED: &'static str = "find-completed";
    pub const FAILED: &'static str = "find-failed";

    /// Decode a frame payload given its `event:` name.
    ///
    /// Returns `Ok(None)` for names this client does not know.
    pub fn decode(name: &str, data: &str) -> Result<Option<Self>, serde_json::Error> {
        let event = match name {
            Self::TASK_STARTED => StreamEvent::TaskStarted(serde_json::from_str(data)?),
            Self::FILE_MATCHES => StreamEvent::FileMatches(serde_json::from_str(data)?),
            Self::PROGRESS => StreamEvent::Progress(serde_json::from_str(data)?),
            Self::COMPLETED => StreamEvent::Completed(serde_json::from_str(data)?),
            Self::FAILED => StreamEvent::Failed(serde_json::from_str(data)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    /// Wire name used in the `event:` line.
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::TaskStarted(_) => Self::TASK_STARTED,
            StreamEvent::FileMatches(_) => Self::FILE_MATCHES,
            StreamEvent::Progress(_) => Self::PROGRESS,
            StreamEvent::Completed(_) => Self::COMPLETED,
            StreamEvent::Failed(_) => Self::FAILED,
        }
    }

    /// JSON payload used in the `data:` line.
    pub fn payload(&self) -> Result<String, serde_json::Error> {
        match self {
            StreamEvent::TaskStarted(e) => serde_json::to_string(e),
            StreamEvent::FileMatches(e) => serde_json::to_string(e),
            StreamEvent::Progress(e) => serde_json::to_string(e),
            StreamEvent::Completed(e) => serde_json::to_string(e),
            StreamEvent::Failed(e) => serde_json::to_string(e),
        }
    }

    /// Render as one SSE frame, blank-line terminated.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        Ok(format!("event: {}\ndata: {}\n\n", self.name(), self.payload()?))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Completed(_) | StreamEvent::Failed(_))
    }
}

/// Error body returned by the server when it rejects a search before streaming.
///
/// Problem-details shaped; every field is optional because proxies and
/// older servers answer with arbitrary JSON or none at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorBody {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub problem_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matches_found: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_endpoint: Option<String>,
}

impl ErrorBody {
    pub fn is_result_set_too_large(&self) -> bool {
        self.problem_type
            .as_deref()
            .map(|t| t.ends_with(constants::RESULT_SET_TOO_LARGE))
            .unwrap_or(false)
    }

    /// Most specific human-readable text the body carries.
    pub fn text(&self) -> Option<&str> {
        self.message
            .as_deref()
            .or(self.detail.as_deref())
            .or(self.title.as_deref())
            .filter(|s| !s.trim().is_empty())
    }
}
