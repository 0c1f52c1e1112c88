//! Railway segments between station gates.
//!
//! A segment is stored once, from one gate to another. Travelling it the other
//! way is expressed with [`DirectedSegment`] carrying `reversed: true`; there
//! is never a second mirrored object for the same physical line.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{GateId, SegmentId, StructuralError};

/// Physical track of a segment: from-gate track to to-gate track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentConnection {
    pub from_track: u16,
    pub to_track: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    pub name: String,
    pub from: GateId,
    pub to: GateId,
    pub distance_m: u32,
    pub max_speed_kmh: u32,
    pub electrified: bool,
    /// Ordered physical tracks. Empty means a single unnamed track.
    pub connections: Vec<SegmentConnection>,
}

impl Segment {
    /// Checks the distance and speed invariants.
    pub fn check(&self) -> Result<(), StructuralError> {
        if self.distance_m == 0 {
            return Err(StructuralError::InvalidDistance);
        }
        if self.max_speed_kmh == 0 {
            return Err(StructuralError::InvalidSpeed);
        }
        Ok(())
    }

    /// At most one physical track, so opposing trains cannot meet on it.
    pub fn is_single_track(&self) -> bool {
        self.connections.len() <= 1
    }

    /// Gate a train leaves through when travelling in this direction.
    pub fn departure_gate(&self, reversed: bool) -> GateId {
        if reversed { self.to } else { self.from }
    }

    /// Gate a train arrives through when travelling in this direction.
    pub fn arrival_gate(&self, reversed: bool) -> GateId {
        if reversed { self.from } else { self.to }
    }

    /// Gate tracks on the departure side that lead onto this segment,
    /// sorted ascending. `None` means every gate track is accepted.
    pub fn departure_tracks(&self, reversed: bool) -> Option<Vec<u16>> {
        if self.connections.is_empty() {
            return None;
        }
        let mut tracks: Vec<u16> = self
            .connections
            .iter()
            .map(|c| if reversed { c.to_track } else { c.from_track })
            .collect();
        tracks.sort_unstable();
        tracks.dedup();
        Some(tracks)
    }

    /// Index of the physical track used when leaving on `departure_track`.
    pub fn physical_track(&self, reversed: bool, departure_track: u16) -> Option<usize> {
        if self.connections.is_empty() {
            return Some(0);
        }
        self.connections.iter().position(|c| {
            let start = if reversed { c.to_track } else { c.from_track };
            start == departure_track
        })
    }

    /// Gate track reached at the far end when leaving on `departure_track`.
    pub fn arrival_track(&self, reversed: bool, departure_track: u16) -> Option<u16> {
        if self.connections.is_empty() {
            return Some(departure_track);
        }
        let idx = self.physical_track(reversed, departure_track)?;
        let conn = self.connections[idx];
        Some(if reversed { conn.from_track } else { conn.to_track })
    }
}

/// A segment together with the direction it is travelled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DirectedSegment {
    pub segment: SegmentId,
    pub reversed: bool,
}

impl DirectedSegment {
    pub fn forward(segment: SegmentId) -> Self {
        Self {
            segment,
            reversed: false,
        }
    }

    pub fn backward(segment: SegmentId) -> Self {
        Self {
            segment,
            reversed: true,
        }
    }

    /// Same physical segment, opposite direction.
    pub fn mirrored(self) -> Self {
        Self {
            segment: self.segment,
            reversed: !self.reversed,
        }
    }
}

impl fmt::Display for DirectedSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.segment, if self.reversed { " (rev)" } else { "" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn double_track() -> Segment {
        Segment {
            id: SegmentId(1),
            name: "A-B".into(),
            from: GateId(1),
            to: GateId(2),
            distance_m: 12_500,
            max_speed_kmh: 120,
            electrified: true,
            connections: vec![
                SegmentConnection {
                    from_track: 1,
                    to_track: 2,
                },
                SegmentConnection {
                    from_track: 2,
                    to_track: 1,
                },
            ],
        }
    }

    #[test]
    fn check_rejects_zero_values() {
        let mut seg = double_track();
        assert!(seg.check().is_ok());
        seg.max_speed_kmh = 0;
        assert_eq!(seg.check().unwrap_err(), StructuralError::InvalidSpeed);
        seg.distance_m = 0;
        assert_eq!(seg.check().unwrap_err(), StructuralError::InvalidDistance);
    }

    #[test]
    fn gates_follow_direction() {
        let seg = double_track();
        assert_eq!(seg.departure_gate(false), GateId(1));
        assert_eq!(seg.arrival_gate(false), GateId(2));
        assert_eq!(seg.departure_gate(true), GateId(2));
        assert_eq!(seg.arrival_gate(true), GateId(1));
    }

    #[test]
    fn track_mapping_both_directions() {
        let seg = double_track();
        assert!(!seg.is_single_track());
        assert_eq!(seg.arrival_track(false, 1), Some(2));
        assert_eq!(seg.arrival_track(true, 2), Some(1));
        assert_eq!(seg.arrival_track(false, 3), None);
        assert_eq!(seg.physical_track(false, 2), Some(1));
        assert_eq!(seg.physical_track(true, 2), Some(0));
        assert_eq!(seg.departure_tracks(true), Some(vec![1, 2]));
    }

    #[test]
    fn unconnected_segment_is_single_track() {
        let mut seg = double_track();
        seg.connections.clear();
        assert!(seg.is_single_track());
        assert_eq!(seg.departure_tracks(false), None);
        assert_eq!(seg.physical_track(false, 7), Some(0));
        assert_eq!(seg.arrival_track(true, 7), Some(7));
    }

    #[test]
    fn mirrored_twice_is_identity() {
        let ds = DirectedSegment::forward(SegmentId(4));
        assert!(ds.mirrored().reversed);
        assert_eq!(ds.mirrored().mirrored(), ds);
        assert_eq!(ds.mirrored().to_string(), "segment#4 (rev)");
    }
}
