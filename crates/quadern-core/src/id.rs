//! Note id generation.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::note::NoteId;

/// How new note ids are built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdStrategy {
    /// `{prefix}_{unix millis}`, with `_{seq}` appended when a millisecond repeats
    #[default]
    Timestamp,
    /// `{prefix}_{uuid v4 without dashes}`
    Uuid,
}

#[derive(Debug)]
struct LastIssued {
    millis: i64,
    seq: u32,
}

/// Issues ids that are unique for the lifetime of one generator, even when
/// the clock stands still or steps backwards.
#[derive(Debug)]
pub struct IdGenerator {
    prefix: String,
    strategy: IdStrategy,
    last: Mutex<LastIssued>,
}

impl IdGenerator {
    pub fn new(prefix: impl Into<String>, strategy: IdStrategy) -> Self {
        Self {
            prefix: prefix.into(),
            strategy,
            last: Mutex::new(LastIssued {
                millis: i64::MIN,
                seq: 0,
            }),
        }
    }

    /// Next id at `now`. Candidates for which `taken` returns true are skipped.
    pub fn next(&self, now: DateTime<Utc>, taken: impl Fn(&str) -> bool) -> NoteId {
        loop {
            let candidate = match self.strategy {
                IdStrategy::Timestamp => self.next_timestamp(now),
                IdStrategy::Uuid => format!("{}_{}", self.prefix, Uuid::new_v4().simple()),
            };
            if !taken(&candidate) {
                return candidate;
            }
        }
    }

    fn next_timestamp(&self, now: DateTime<Utc>) -> NoteId {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let millis = now.timestamp_millis();
        if millis > last.millis {
            last.millis = millis;
            last.seq = 0;
        } else {
            last.seq += 1;
        }

        if last.seq == 0 {
            format!("{}_{}", self.prefix, last.millis)
        } else {
            format!("{}_{}_{}", self.prefix, last.millis, last.seq)
        }
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new("n", IdStrategy::Timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::collections::HashSet;

    fn at(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    #[test]
    fn first_id_is_plain_timestamp() {
        let ids = IdGenerator::default();
        assert_eq!(ids.next(at(1_700_000_000_000), |_| false), "n_1700000000000");
    }

    #[test]
    fn same_millisecond_gets_sequence() {
        let ids = IdGenerator::default();
        let now = at(1_700_000_000_000);
        assert_eq!(ids.next(now, |_| false), "n_1700000000000");
        assert_eq!(ids.next(now, |_| false), "n_1700000000000_1");
        assert_eq!(ids.next(now, |_| false), "n_1700000000000_2");
        assert_eq!(ids.next(now + Duration::milliseconds(1), |_| false), "n_1700000000001");
    }

    #[test]
    fn clock_going_back_stays_unique() {
        let ids = IdGenerator::default();
        let first = ids.next(at(2_000), |_| false);
        let second = ids.next(at(1_000), |_| false);
        assert_eq!(first, "n_2000");
        assert_eq!(second, "n_2000_1");
    }

    #[test]
    fn taken_ids_are_skipped() {
        let ids = IdGenerator::default();
        let existing: HashSet<&str> = ["n_5", "n_5_1"].into_iter().collect();
        assert_eq!(ids.next(at(5), |c| existing.contains(c)), "n_5_2");
    }

    #[test]
    fn uuid_strategy_uses_prefix() {
        let ids = IdGenerator::new("note", IdStrategy::Uuid);
        let id = ids.next(at(0), |_| false);
        assert!(id.starts_with("note_"));
        assert_eq!(id.len(), "note_".len() + 32);
        assert_ne!(id, ids.next(at(0), |_| false));
    }
}
