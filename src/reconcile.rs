//! Recovery of list outcomes from the append-only payment reference log.
//!
//! The log is written by the report writer after every completed batch. Each
//! block looks like:
//!
//! ```text
//! ================================================================================
//! Timestamp: 2026-01-05 10:42:11
//! List #: 1
//! Reference Number: ABC123
//! Accounts: [020001, 020002_2]
//! ================================================================================
//! ```
//!
//! Blocks are keyed by the signature derived from their accounts line so a list
//! whose run state was lost can still be matched to its reference number.

use crate::model::{BatchList, RunState};
use crate::store::{sync_list, StateStore};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

static LOG_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)Timestamp:\s*(?P<timestamp>[^\r\n]+)\s*[\r\n]+List #:\s*(?P<list>\d+)\s*[\r\n]+Reference Number:\s*(?P<reference>[^\r\n]+)\s*[\r\n]+Accounts:\s*(?P<accounts>[^\r\n]+)",
    )
    .expect("valid regex")
});
static ACCOUNT_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:_\d+)?").expect("valid regex"));

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d-%m-%Y %H:%M:%S"];

/// One parsed block of the reference log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceLogEntry {
    pub timestamp: NaiveDateTime,
    pub list_ordinal: usize,
    pub reference_number: String,
    pub accounts: String,
}

impl ReferenceLogEntry {
    /// Comma-joined account tokens; same shape as [`BatchList::signature`].
    pub fn signature(&self) -> String {
        accounts_signature(&self.accounts)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceHit {
    pub reference_number: String,
    pub timestamp: NaiveDateTime,
}

/// Latest reference per signature.
#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    hits: HashMap<String, ReferenceHit>,
}

impl ReferenceIndex {
    pub fn get(&self, signature: &str) -> Option<&ReferenceHit> {
        self.hits.get(signature)
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// Parses every well-formed block. Unparsable timestamps become
/// [`NaiveDateTime::MIN`].
pub fn parse_entries(log_text: &str) -> Vec<ReferenceLogEntry> {
    LOG_BLOCK
        .captures_iter(log_text)
        .filter_map(|caps| {
            let list_ordinal = caps["list"].parse().ok()?;
            Some(ReferenceLogEntry {
                timestamp: parse_timestamp(caps["timestamp"].trim()).unwrap_or(NaiveDateTime::MIN),
                list_ordinal,
                reference_number: caps["reference"].trim().to_owned(),
                accounts: caps["accounts"].trim().to_owned(),
            })
        })
        .collect()
}

/// Builds the signature index. Later blocks win timestamp ties.
pub fn build_latest_index(log_text: &str) -> ReferenceIndex {
    let mut hits: HashMap<String, ReferenceHit> = HashMap::new();

    for entry in parse_entries(log_text) {
        let signature = entry.signature();
        if entry.reference_number.is_empty() || signature.is_empty() {
            continue;
        }

        let replace = hits
            .get(&signature)
            .map_or(true, |existing| entry.timestamp >= existing.timestamp);
        if replace {
            hits.insert(
                signature,
                ReferenceHit {
                    reference_number: entry.reference_number,
                    timestamp: entry.timestamp,
                },
            );
        }
    }

    ReferenceIndex { hits }
}

/// Reads and indexes the log at `path`; missing or unreadable logs are empty.
pub fn load_index(path: &Path) -> ReferenceIndex {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            let index = build_latest_index(&text);
            debug!(path = %path.display(), signatures = index.len(), "reference log indexed");
            index
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => ReferenceIndex::default(),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "reference log unreadable");
            ReferenceIndex::default()
        }
    }
}

/// Forces every non-Success list with a log hit to Success and persists it.
/// Returns the ordinals of the lists that changed.
pub fn reconcile(lists: &mut [BatchList], index: &ReferenceIndex, store: &dyn StateStore) -> Vec<usize> {
    if index.is_empty() {
        return Vec::new();
    }

    let mut reconciled = Vec::new();
    for list in lists.iter_mut() {
        if list.state() == RunState::Success || !list.has_processable_entries() {
            continue;
        }
        let Some(hit) = index.get(&list.signature()) else {
            continue;
        };

        list.mark_success(&hit.reference_number);
        if let Err(err) = sync_list(store, list) {
            warn!(list = list.ordinal(), error = %err, "failed to persist reconciled state");
        }
        info!(
            list = list.ordinal(),
            reference = %hit.reference_number,
            "list reconciled from reference log"
        );
        reconciled.push(list.ordinal());
    }
    reconciled
}

fn accounts_signature(accounts: &str) -> String {
    ACCOUNT_TOKEN
        .find_iter(accounts)
        .map(|token| token.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.naive_utc());
    }
    for format in TIMESTAMP_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AccountRecord, ListEntry};
    use crate::store::{MemoryStateStore, RecordStatus};
    use rust_decimal_macros::dec;
    use std::collections::HashSet;

    const RULER: &str = "================================================================================";

    fn block(timestamp: &str, list: usize, reference: &str, accounts: &str) -> String {
        format!(
            "{RULER}\nTimestamp: {timestamp}\nList #: {list}\nReference Number: {reference}\nAccounts: {accounts}\n{RULER}\n"
        )
    }

    fn list_with(tokens: &[(&str, u32)]) -> BatchList {
        let mut list = BatchList::new(1);
        for (account, installment) in tokens {
            let entry = ListEntry::new(
                *account,
                *installment,
                Some(AccountRecord::new(*account, dec!(100))),
            );
            list.add_entry(entry, &HashSet::new()).unwrap();
        }
        list
    }

    #[test]
    fn blocks_are_indexed_by_account_signature() {
        let log = block("2026-01-05 10:42:11", 1, "XYZ", "[020001, 020002_2]");
        let index = build_latest_index(&log);
        let hit = index.get("020001,020002_2").expect("indexed");
        assert_eq!(hit.reference_number, "XYZ");
    }

    #[test]
    fn latest_timestamp_wins_and_ties_prefer_later_blocks() {
        let log = [
            block("2026-01-05 10:00:00", 1, "NEWER", "[1, 2]"),
            block("2026-01-04 10:00:00", 1, "OLDER", "[1, 2]"),
            block("2026-01-06T08:00:00", 2, "TIE_A", "[3]"),
            block("2026-01-06 08:00:00", 3, "TIE_B", "[3]"),
        ]
        .concat();

        let index = build_latest_index(&log);
        assert_eq!(index.get("1,2").map(|h| h.reference_number.as_str()), Some("NEWER"));
        assert_eq!(index.get("3").map(|h| h.reference_number.as_str()), Some("TIE_B"));
    }

    #[test]
    fn unparsable_timestamps_sort_first() {
        let log = [
            block("2026-01-05", 1, "DATED", "[7]"),
            block("yesterday-ish", 1, "UNDATED", "[7]"),
        ]
        .concat();
        let index = build_latest_index(&log);
        assert_eq!(index.get("7").map(|h| h.reference_number.as_str()), Some("DATED"));
    }

    #[test]
    fn blocks_without_tokens_are_skipped() {
        let log = [
            block("2026-01-05 10:00:00", 1, "NOACCT", "[]"),
            "Timestamp: garbage without the rest\n".to_owned(),
        ]
        .concat();
        assert!(build_latest_index(&log).is_empty());
        assert_eq!(parse_entries(&log).len(), 1);
    }

    #[test]
    fn timestamp_formats() {
        for raw in [
            "2026-01-05T10:42:11+05:30",
            "2026-01-05 10:42:11",
            "2026-01-05T10:42:11",
            "05-01-2026 10:42:11",
            "2026-01-05",
        ] {
            assert!(parse_timestamp(raw).is_some(), "{raw} should parse");
        }
        assert!(parse_timestamp("Jan 5").is_none());
    }

    #[test]
    fn reconcile_promotes_pending_and_failed_but_never_success() {
        let store = MemoryStateStore::default();
        let log = [
            block("2026-01-05 10:00:00", 1, "XYZ", "[020001, 020002_2]"),
            block("2026-01-05 10:00:00", 2, "OTHER", "[030001]"),
        ]
        .concat();
        let index = build_latest_index(&log);

        let pending = list_with(&[("020001", 1), ("020002", 2)]);
        let mut done = list_with(&[("030001", 1)]);
        done.mark_success("KEEP");
        let mut lists = vec![pending, done];

        let reconciled = reconcile(&mut lists, &index, &store);
        assert_eq!(reconciled, vec![1]);
        assert_eq!(lists[0].reference_number(), Some("XYZ"));
        assert_eq!(lists[1].reference_number(), Some("KEEP"));

        let record = store.get("020001,020002_2").expect("persisted");
        assert_eq!(record.status, RecordStatus::Success);
        assert_eq!(record.reference_number, "XYZ");
    }

    #[test]
    fn missing_log_yields_empty_index() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(load_index(&dir.path().join("payment_references.txt")).is_empty());
    }
}
