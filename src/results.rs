use crate::error::SearchError;
use crate::protocol::{Completed, FileMatches, Progress, StreamEvent};
use log::debug;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SearchStatus {
    #[default]
    Idle,
    Running,
    Completed(Completed),
    Failed(SearchError),
    Cancelled,
}

impl SearchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SearchStatus::Completed(_) | SearchStatus::Failed(_) | SearchStatus::Cancelled
        )
    }
}

/// Display state built up from a search stream.
///
/// Partial results stay available after a failure, so a caller can keep
/// showing what arrived before the error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResults {
    pub status: SearchStatus,
    pub task_id: Option<String>,
    pub total_resources: u64,
    pub progress: Option<Progress>,
    pub files: Vec<FileMatches>,
    events: usize,
}

impl SearchResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset for a new search.
    pub fn start(&mut self) {
        *self = Self {
            status: SearchStatus::Running,
            ..Self::default()
        };
    }

    pub fn apply(&mut self, event: &StreamEvent) {
        if self.status.is_terminal() {
            debug!("Ignoring '{}' after the search ended", event.name());
            return;
        }
        if self.status == SearchStatus::Idle {
            self.status = SearchStatus::Running;
        }

        match event {
            StreamEvent::TaskStarted(started) => {
                self.task_id = Some(started.task_id.clone());
                self.total_resources = started.total_resources;
            }
            StreamEvent::FileMatches(file) => self.files.push(file.clone()),
            StreamEvent::Progress(progress) => {
                self.total_resources = progress.total_resources;
                self.progress = Some(progress.clone());
            }
            StreamEvent::Completed(completed) => {
                self.total_resources = completed.total_resources;
                self.status = SearchStatus::Completed(completed.clone());
            }
            StreamEvent::Failed(failed) => {
                self.status = SearchStatus::Failed(SearchError::StreamError {
                    failed: failed.clone(),
                    events_before: self.events,
                });
                return;
            }
        }
        self.events += 1;
    }

    pub fn fail(&mut self, error: SearchError) {
        if !self.status.is_terminal() {
            self.status = SearchStatus::Failed(error);
        }
    }

    pub fn cancel(&mut self) {
        if !self.status.is_terminal() {
            self.status = SearchStatus::Cancelled;
        }
    }

    /// Matches received so far.
    pub fn match_count(&self) -> usize {
        self.files.iter().map(|f| f.matches.len()).sum()
    }

    pub fn resources_with_matches(&self) -> usize {
        self.files.iter().filter(|f| !f.matches.is_empty()).count()
    }

    /// Fraction of resources processed, when the server has reported any.
    pub fn fraction_done(&self) -> Option<f64> {
        let progress = self.progress.as_ref()?;
        if progress.total_resources == 0 {
            return None;
        }
        Some(progress.resources_processed as f64 / progress.total_resources as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Match, ResourceRef, TaskStarted};

    fn file(id: &str, matches: usize) -> StreamEvent {
        StreamEvent::FileMatches(FileMatches {
            resource: ResourceRef {
                id: id.to_string(),
                path: format!("/content/{}.xml", id),
                file_name: format!("{}.xml", id),
            },
            matches: (0..matches)
                .map(|i| Match {
                    xpath: None,
                    context: "foo".to_string(),
                    match_start: i as u64,
                    match_end: i as u64 + 3,
                })
                .collect(),
        })
    }

    #[test]
    fn test_accumulates_until_completed() {
        let mut results = SearchResults::new();
        results.start();
        results.apply(&StreamEvent::TaskStarted(TaskStarted {
            task_id: "t1".to_string(),
            total_resources: 4,
        }));
        results.apply(&file("a", 2));
        results.apply(&file("b", 1));
        results.apply(&StreamEvent::Progress(Progress {
            resources_processed: 2,
            total_resources: 4,
            matches_found: 3,
        }));

        assert_eq!(results.status, SearchStatus::Running);
        assert_eq!(results.task_id.as_deref(), Some("t1"));
        assert_eq!(results.match_count(), 3);
        assert_eq!(results.resources_with_matches(), 2);
        assert_eq!(results.fraction_done(), Some(0.5));

        let completed = Completed {
            total_matches: 3,
            total_resources: 4,
            resources_with_matches: 2,
            duration_ms: 12,
        };
        results.apply(&StreamEvent::Completed(completed.clone()));
        assert_eq!(results.status, SearchStatus::Completed(completed));

        results.apply(&file("late", 5));
        assert_eq!(results.files.len(), 2);
    }

    #[test]
    fn test_failure_keeps_partial_results() {
        let mut results = SearchResults::new();
        results.apply(&file("a", 1));
        results.fail(SearchError::Timeout { elapsed_ms: 300_000 });
        assert_eq!(results.match_count(), 1);
        assert!(matches!(
            results.status,
            SearchStatus::Failed(SearchError::Timeout { .. })
        ));

        results.cancel();
        assert!(matches!(results.status, SearchStatus::Failed(_)));
    }

    #[test]
    fn test_start_resets_state() {
        let mut results = SearchResults::new();
        results.apply(&file("a", 1));
        results.cancel();
        results.start();
        assert_eq!(results.status, SearchStatus::Running);
        assert!(results.files.is_empty());
        assert_eq!(results.fraction_done(), None);
    }
}
