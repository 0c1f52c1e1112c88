//! Stations, their gates, tracks and the switch topology between them.

use serde::{Deserialize, Serialize};

use crate::domain::{GateId, StationId, StructuralError, TrackId, TrafficClass};

/// Role of a station on the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StationType {
    #[default]
    Normal,
    /// Trains may stop but cannot start or end here.
    SimpleStop,
    /// Not a real station, only a junction between two lines. Trains pass
    /// without dwelling and cannot start or end here.
    Junction,
}

/// End of a station a gate or track side faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    West,
    East,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::West => Side::East,
            Side::East => Side::West,
        }
    }
}

/// Whether trains may enter, leave, or both through a gate.
///
/// "Neither" is not representable; storage rows are decoded with
/// [`GateKind::from_bits`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GateKind {
    Entrance,
    Exit,
    Bidirectional,
}

impl GateKind {
    const ENTRANCE: u8 = 1 << 0;
    const EXIT: u8 = 1 << 1;

    /// Decode the entrance/exit flag pair as stored by the host.
    /// Traffic-hand bits are ignored.
    pub fn from_bits(bits: u8) -> Result<Self, StructuralError> {
        match (bits & Self::ENTRANCE != 0, bits & Self::EXIT != 0) {
            (true, true) => Ok(GateKind::Bidirectional),
            (true, false) => Ok(GateKind::Entrance),
            (false, true) => Ok(GateKind::Exit),
            (false, false) => Err(StructuralError::GateWithoutDirection),
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            GateKind::Entrance => Self::ENTRANCE,
            GateKind::Exit => Self::EXIT,
            GateKind::Bidirectional => Self::ENTRANCE | Self::EXIT,
        }
    }

    pub fn allows_entry(self) -> bool {
        matches!(self, GateKind::Entrance | GateKind::Bidirectional)
    }

    pub fn allows_exit(self) -> bool {
        matches!(self, GateKind::Exit | GateKind::Bidirectional)
    }
}

/// A numbered physical track leaving a gate, `1..=gate.track_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GateTrack {
    pub gate: GateId,
    pub track: u16,
}

impl GateTrack {
    pub fn new(gate: GateId, track: u16) -> Self {
        Self { gate, track }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    pub id: StationId,
    pub name: String,
    pub short_name: Option<String>,
    #[serde(default)]
    pub kind: StationType,
    /// Gates in display order.
    pub gates: Vec<GateId>,
    /// Tracks in display order.
    pub tracks: Vec<TrackId>,
}

impl Station {
    pub fn new(id: StationId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            short_name: None,
            kind: StationType::Normal,
            gates: Vec::new(),
            tracks: Vec::new(),
        }
    }

    pub fn with_short_name(mut self, short: impl Into<String>) -> Self {
        self.short_name = Some(short.into());
        self
    }

    /// A station can be used by jobs once it has a gate and a track.
    pub fn is_complete(&self) -> bool {
        !self.gates.is_empty() && !self.tracks.is_empty()
    }

    /// Short name if set, otherwise the full name.
    pub fn label(&self) -> &str {
        self.short_name.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gate {
    pub id: GateId,
    pub station: StationId,
    pub letter: char,
    pub kind: GateKind,
    pub side: Side,
    /// Number of gate tracks, numbered from 1.
    pub track_count: u16,
    /// Platform used by default for trains entering here.
    pub default_track: Option<TrackId>,
}

impl Gate {
    pub fn has_gate_track(&self, gate_track: u16) -> bool {
        (1..=self.track_count).contains(&gate_track)
    }
}

/// A station track. Lengths are in centimeters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub station: StationId,
    pub name: String,
    /// RGB color used by graph views.
    pub color: u32,
    pub electrified: bool,
    /// Reserved for trains not stopping here.
    pub through: bool,
    pub length_cm: u32,
    /// Longest passenger train allowed; zero means not a passenger track.
    pub passenger_length_cm: u32,
    /// Longest freight train allowed; zero means not a freight track.
    pub freight_length_cm: u32,
    pub max_axes: u16,
}

impl Track {
    /// A plain track where both traffic classes may use the full length.
    pub fn new(id: TrackId, station: StationId, name: impl Into<String>, length_cm: u32) -> Self {
        Self {
            id,
            station,
            name: name.into(),
            color: 0x00_00_00,
            electrified: false,
            through: false,
            length_cm,
            passenger_length_cm: length_cm,
            freight_length_cm: length_cm,
            max_axes: 0,
        }
    }

    pub fn electrified(mut self, electrified: bool) -> Self {
        self.electrified = electrified;
        self
    }

    pub fn max_length(&self, class: TrafficClass) -> u32 {
        match class {
            TrafficClass::Passenger => self.passenger_length_cm,
            TrafficClass::Freight => self.freight_length_cm,
        }
    }

    /// Checks that no class limit exceeds the physical length.
    pub fn check_lengths(&self) -> Result<(), StructuralError> {
        for class in [TrafficClass::Passenger, TrafficClass::Freight] {
            let requested = self.max_length(class);
            if requested > self.length_cm {
                return Err(StructuralError::TrackLengthExceeded {
                    class,
                    requested,
                    length: self.length_cm,
                });
            }
        }
        Ok(())
    }
}

/// Switch topology: a station track reaches a gate track from one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackConnection {
    pub track: TrackId,
    pub side: Side,
    pub gate: GateId,
    pub gate_track: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_kind_bits() {
        assert_eq!(GateKind::from_bits(0b01).unwrap(), GateKind::Entrance);
        assert_eq!(GateKind::from_bits(0b10).unwrap(), GateKind::Exit);
        assert_eq!(GateKind::from_bits(0b11).unwrap(), GateKind::Bidirectional);
        // Traffic hand bits alone are not a direction
        assert_eq!(
            GateKind::from_bits(0b1100).unwrap_err(),
            StructuralError::GateWithoutDirection
        );
        assert_eq!(GateKind::Bidirectional.bits(), 0b11);
        assert!(GateKind::Exit.allows_exit());
        assert!(!GateKind::Exit.allows_entry());
    }

    #[test]
    fn track_length_invariant() {
        let mut track = Track::new(TrackId(1), StationId(1), "1", 25_000);
        assert!(track.check_lengths().is_ok());

        track.freight_length_cm = 20_000;
        assert!(track.check_lengths().is_ok());

        track.passenger_length_cm = 30_000;
        assert_eq!(
            track.check_lengths().unwrap_err(),
            StructuralError::TrackLengthExceeded {
                class: TrafficClass::Passenger,
                requested: 30_000,
                length: 25_000,
            }
        );
    }

    #[test]
    fn station_completeness_and_label() {
        let mut st = Station::new(StationId(1), "Monte Amiata").with_short_name("MA");
        assert!(!st.is_complete());
        assert_eq!(st.label(), "MA");
        st.gates.push(GateId(1));
        st.tracks.push(TrackId(1));
        assert!(st.is_complete());
    }

    #[test]
    fn gate_track_range() {
        let gate = Gate {
            id: GateId(1),
            station: StationId(1),
            letter: 'A',
            kind: GateKind::Bidirectional,
            side: Side::West,
            track_count: 2,
            default_track: None,
        };
        assert!(!gate.has_gate_track(0));
        assert!(gate.has_gate_track(1));
        assert!(gate.has_gate_track(2));
        assert!(!gate.has_gate_track(3));
        assert_eq!(gate.side.opposite(), Side::East);
    }
}
