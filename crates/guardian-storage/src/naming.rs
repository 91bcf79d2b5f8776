//! Evidence file naming.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{StorageError, StorageResult};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Unique evidence file name for `name_hint`.
///
/// Names combine the sanitized hint, a millisecond timestamp and a
/// process-wide sequence number, so two calls never collide within a process.
pub fn evidence_file_name(name_hint: &str) -> StorageResult<String> {
    let hint = sanitize(name_hint);
    if hint.is_empty() {
        return Err(StorageError::invalid_name(name_hint));
    }
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    Ok(format!("{}_{}_{}.jpg", hint, Utc::now().timestamp_millis(), seq))
}

/// Keep only characters safe in a file name.
fn sanitize(hint: &str) -> String {
    hint.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}
