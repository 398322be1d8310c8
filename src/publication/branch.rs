//! Enhancement branch naming.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

const PREFIX: &str = "forkbot/enhance-";

/// Process-wide sequence; two names built in the same millisecond still
/// differ.
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// `forkbot/enhance-<unix-millis>-<seq>` for the current instant.
pub fn next_branch_name() -> String {
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    branch_name(Utc::now().timestamp_millis(), seq)
}

pub fn branch_name(millis: i64, seq: u64) -> String {
    format!("{}{}-{}", PREFIX, millis, seq)
}
