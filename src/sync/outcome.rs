//! Per-item outcomes and per-cycle summaries.

/// Terminal result of processing one item (or of failing to list the album).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Succeeded { id: String },
    /// The push to the store failed; the staged copy was kept for inspection.
    UploadFailed { id: String, cause: String },
    ProcessingError { id: String, cause: String },
    /// The album could not be resolved or listed; nothing was transferred.
    SourceUnavailable { cause: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    SourceUnavailable,
    UploadFailed,
    ProcessingError,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SourceUnavailable => "source unavailable",
            Self::UploadFailed => "upload failed",
            Self::ProcessingError => "processing error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// `None` for [`FailureKind::SourceUnavailable`].
    pub id: Option<String>,
    pub kind: FailureKind,
    pub cause: String,
}

/// Aggregate of one Batch Scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub album: String,
    /// Items enumerated from the album.
    pub listed: usize,
    /// Items skipped because the ledger already contains them.
    pub already_synced: usize,
    /// Items selected for transfer this cycle.
    pub new_items: usize,
    pub succeeded: Vec<String>,
    pub failures: Vec<Failure>,
    /// Shutdown was requested before every new item was attempted.
    pub interrupted: bool,
}

impl CycleSummary {
    pub fn new(album: &str) -> Self {
        Self {
            album: album.to_string(),
            ..Self::default()
        }
    }

    pub fn record(&mut self, outcome: TransferOutcome) {
        let (id, kind, cause) = match outcome {
            TransferOutcome::Succeeded { id } => {
                self.succeeded.push(id);
                return;
            }
            TransferOutcome::UploadFailed { id, cause } => {
                (Some(id), FailureKind::UploadFailed, cause)
            }
            TransferOutcome::ProcessingError { id, cause } => {
                (Some(id), FailureKind::ProcessingError, cause)
            }
            TransferOutcome::SourceUnavailable { cause } => {
                (None, FailureKind::SourceUnavailable, cause)
            }
        };
        self.failures.push(Failure { id, kind, cause });
    }

    pub fn source_unavailable(&self) -> Option<&Failure> {
        self.failures
            .iter()
            .find(|f| f.kind == FailureKind::SourceUnavailable)
    }

    pub fn is_quiet(&self) -> bool {
        self.succeeded.is_empty() && self.failures.is_empty()
    }

    /// One-line status, used for systemd `STATUS=` and the end-of-cycle log.
    pub fn status_line(&self) -> String {
        if let Some(failure) = self.source_unavailable() {
            return format!("album '{}' unavailable: {}", self.album, failure.cause);
        }
        let mut line = format!(
            "'{}': {} synced, {} failed, {} already synced",
            self.album,
            self.succeeded.len(),
            self.failures.len(),
            self.already_synced
        );
        if self.interrupted {
            line.push_str(" (interrupted)");
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_sorts_outcomes() {
        let mut summary = CycleSummary::new("Nikon");
        summary.record(TransferOutcome::Succeeded { id: "a.jpg".into() });
        summary.record(TransferOutcome::UploadFailed {
            id: "b.jpg".into(),
            cause: "403".into(),
        });
        summary.record(TransferOutcome::ProcessingError {
            id: "c.jpg".into(),
            cause: "boom".into(),
        });

        assert_eq!(summary.succeeded, vec!["a.jpg"]);
        assert_eq!(summary.failures.len(), 2);
        assert_eq!(summary.failures[0].kind, FailureKind::UploadFailed);
        assert_eq!(summary.failures[0].id.as_deref(), Some("b.jpg"));
        assert_eq!(summary.failures[1].kind, FailureKind::ProcessingError);
        assert!(summary.source_unavailable().is_none());
        assert!(!summary.is_quiet());
    }

    #[test]
    fn test_source_unavailable_has_no_id() {
        let mut summary = CycleSummary::new("Nikon");
        summary.record(TransferOutcome::SourceUnavailable {
            cause: "not found".into(),
        });

        let failure = summary.source_unavailable().unwrap();
        assert_eq!(failure.id, None);
        assert_eq!(
            summary.status_line(),
            "album 'Nikon' unavailable: not found"
        );
    }

    #[test]
    fn test_status_line_counts() {
        let mut summary = CycleSummary::new("Nikon");
        summary.already_synced = 4;
        summary.record(TransferOutcome::Succeeded { id: "a.jpg".into() });
        summary.interrupted = true;
        assert_eq!(
            summary.status_line(),
            "'Nikon': 1 synced, 0 failed, 4 already synced (interrupted)"
        );
    }

    #[test]
    fn test_new_summary_is_quiet() {
        assert!(CycleSummary::new("Nikon").is_quiet());
    }
}
