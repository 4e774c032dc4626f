use serde::{Deserialize, Serialize};

use crate::note::NoteId;

/// Events emitted by the note store.
///
/// Load and save never fail for the caller; subscribers learn about the
/// swallowed failures through `LoadRecovered` and `SaveFailed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreEvent {
    Loaded {
        notes: usize,
    },
    /// The persisted payload was unreadable and a default state was used.
    LoadRecovered {
        reason: String,
    },
    NoteUpserted {
        id: NoteId,
        /// Previous section key when the note moved sections.
        relocated_from: Option<String>,
    },
    NoteDeleted {
        id: NoteId,
    },
    Saved {
        bytes: usize,
    },
    SaveFailed {
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serde_round_trip() {
        let events = vec![
            StoreEvent::Loaded { notes: 3 },
            StoreEvent::NoteUpserted {
                id: "n_1".into(),
                relocated_from: Some("/u1#s1".into()),
            },
            StoreEvent::NoteDeleted { id: "n_1".into() },
            StoreEvent::SaveFailed {
                reason: "quota".into(),
            },
        ];
        for e in &events {
            let json = serde_json::to_string(e).unwrap();
            let back: StoreEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(*e, back);
        }
    }
}
