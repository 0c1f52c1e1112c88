//! Typed identifiers for session entities.
//!
//! Every entity the storage collaborator hands us carries a numeric row id.
//! Wrapping each in its own type stops a `GateId` from being passed where a
//! `TrackId` is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Returns the raw storage id.
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

entity_id!(
    /// Identifies a station.
    StationId,
    "station"
);
entity_id!(
    /// Identifies a gate within a station.
    GateId,
    "gate"
);
entity_id!(
    /// Identifies a station track.
    TrackId,
    "track"
);
entity_id!(
    /// Identifies a railway segment between two gates.
    SegmentId,
    "segment"
);
entity_id!(
    /// Identifies a railway line.
    LineId,
    "line"
);
entity_id!(
    /// Identifies a job. This is also the job number shown to users.
    JobId,
    "job"
);
entity_id!(
    /// Identifies a stop.
    StopId,
    "stop"
);
entity_id!(ShiftId, "shift");
entity_id!(RsModelId, "model");
entity_id!(RsOwnerId, "owner");
entity_id!(
    /// Identifies a single rollingstock piece.
    RsId,
    "rs"
);

/// Hands out fresh stop ids for stops the engine creates itself
/// (inserted stops, mirrored jobs).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StopIdGen {
    next: u64,
}

impl StopIdGen {
    /// Create a generator whose first id is `first`.
    pub fn starting_at(first: u64) -> Self {
        Self { next: first }
    }

    /// Returns the next unused id.
    pub fn next_id(&mut self) -> StopId {
        let id = StopId(self.next);
        self.next += 1;
        id
    }

    /// Make sure future ids are strictly greater than `seen`.
    pub fn observe(&mut self, seen: StopId) {
        if seen.0 >= self.next {
            self.next = seen.0 + 1;
        }
    }
}
