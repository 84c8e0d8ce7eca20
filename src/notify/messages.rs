//! Operator-facing notification texts.

use std::time::Duration;

use crate::sync::{CycleSummary, FailureKind};

/// Longest message sent, in characters. Telegram rejects anything over 4096.
pub const MAX_MESSAGE_CHARS: usize = 4000;

pub fn started(album: &str, source: &str, store: &str, interval: Option<Duration>) -> String {
    let schedule = match interval {
        Some(interval) => format!("checking every {}s", interval.as_secs()),
        None => "single run".to_string(),
    };
    format!("Photo sync started: album '{album}' from {source} to {store} ({schedule})")
}

pub fn stopped() -> String {
    "Photo sync stopped".to_string()
}

pub fn fatal(error: &anyhow::Error) -> String {
    format!("CRITICAL: photo sync terminated: {error:#}")
}

/// Messages for one cycle, in sending order.
///
/// An unavailable album yields exactly one critical message. Otherwise there
/// is one message if anything succeeded, plus one per failed item. A quiet
/// cycle yields nothing.
pub fn cycle_messages(summary: &CycleSummary) -> Vec<String> {
    if let Some(failure) = summary.source_unavailable() {
        return vec![format!(
            "CRITICAL: album '{}' is unavailable: {}",
            summary.album, failure.cause
        )];
    }

    let mut messages = Vec::with_capacity(summary.failures.len() + 1);
    if !summary.succeeded.is_empty() {
        let head = format!(
            "Synced {} new photo(s) from '{}': ",
            summary.succeeded.len(),
            summary.album
        );
        let tail = if summary.interrupted {
            " (interrupted by shutdown)"
        } else {
            ""
        };
        let budget = MAX_MESSAGE_CHARS.saturating_sub(head.chars().count() + tail.chars().count());
        messages.push(format!("{head}{}{tail}", id_list(&summary.succeeded, budget)));
    }
    for failure in &summary.failures {
        let id = failure.id.as_deref().unwrap_or("<album>");
        let verb = match failure.kind {
            FailureKind::UploadFailed => "could not upload",
            _ => "could not process",
        };
        messages.push(truncate(format!(
            "Failed: {verb} '{id}' ({}): {}",
            failure.kind.as_str(),
            failure.cause
        )));
    }
    messages
}

/// Comma-separated ids, at most `budget` characters. Ids that do not fit are
/// summarized as "and N more".
fn id_list(ids: &[String], budget: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for (shown, id) in ids.iter().enumerate() {
        let remaining = ids.len() - shown - 1;
        let sep = if shown == 0 { "" } else { ", " };
        let entry = sep.chars().count() + id.chars().count();
        // Room for the "and N more" suffix, unless this is the last id.
        let reserve = if remaining == 0 {
            0
        } else {
            format!(", and {remaining} more").len()
        };
        if used + entry + reserve > budget {
            let rest = ids.len() - shown;
            if shown == 0 {
                return format!("{rest} photo(s), too many to list");
            }
            out.push_str(&format!(", and {rest} more"));
            return out;
        }
        out.push_str(sep);
        out.push_str(id);
        used += entry;
    }
    out
}

fn truncate(mut text: String) -> String {
    if let Some((cut, _)) = text.char_indices().nth(MAX_MESSAGE_CHARS - 1) {
        text.truncate(cut);
        text.push('…');
    }
    text
}
