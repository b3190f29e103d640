// src/watch/mask.rs

use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use notify::EventKind;
use notify::event::ModifyKind;

/// Set of filesystem event classes a notifier reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EventMask(u8);

impl EventMask {
    /// File created or its contents modified.
    pub const WRITE: EventMask = EventMask(0b001);
    pub const DELETE: EventMask = EventMask(0b010);
    pub const RENAME: EventMask = EventMask(0b100);
    pub const ALL: EventMask = EventMask(0b111);

    pub const fn empty() -> Self {
        EventMask(0)
    }

    pub const fn contains(self, other: EventMask) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Map a raw `notify` event kind onto a single mask bit.
    ///
    /// Metadata-only changes and access events are ignored, so a plain write
    /// is not reported twice (modify + close-write).
    pub fn classify(kind: &EventKind) -> Option<EventMask> {
        match kind {
            EventKind::Create(_) => Some(EventMask::WRITE),
            EventKind::Modify(ModifyKind::Name(_)) => Some(EventMask::RENAME),
            EventKind::Modify(ModifyKind::Metadata(_)) => None,
            EventKind::Modify(_) => Some(EventMask::WRITE),
            EventKind::Remove(_) => Some(EventMask::DELETE),
            _ => None,
        }
    }
}

impl BitOr for EventMask {
    type Output = EventMask;

    fn bitor(self, rhs: EventMask) -> EventMask {
        EventMask(self.0 | rhs.0)
    }
}

impl FromStr for EventMask {
    type Err = String;

    /// Parse a comma-separated list such as `"write,delete"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut mask = EventMask::empty();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            mask = mask
                | match part.to_lowercase().as_str() {
                    "write" => EventMask::WRITE,
                    "delete" => EventMask::DELETE,
                    "rename" => EventMask::RENAME,
                    "all" => EventMask::ALL,
                    other => {
                        return Err(format!(
                            "invalid event mask entry: {other} (expected write, delete, rename or all)"
                        ));
                    }
                };
        }

        if mask.is_empty() {
            return Err("event mask must name at least one event".to_string());
        }
        Ok(mask)
    }
}

impl fmt::Display for EventMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (EventMask::WRITE, "write"),
            (EventMask::DELETE, "delete"),
            (EventMask::RENAME, "rename"),
        ]
        .into_iter()
        .filter(|(bit, _)| self.contains(*bit))
        .map(|(_, name)| name)
        .collect();

        f.write_str(&names.join(","))
    }
}
