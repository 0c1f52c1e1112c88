//! Engine error taxonomy.
//!
//! Structural and feasibility errors are returned synchronously from the
//! mutating operation and block the edit. Warnings are returned alongside an
//! accepted edit; they flag inconsistencies the user may fix later.

use super::{GateId, JobId, LineId, SegmentId, StationId, StopId, TrackId, TrafficClass};

/// A gate track is not routed to any station track.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("gate {gate} track {gate_track} is not connected to any station track")]
pub struct NotConnected {
    pub gate: GateId,
    pub gate_track: u16,
}

/// Edits rejected outright because they reference missing entities or
/// violate a data model invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StructuralError {
    #[error("unknown station {0}")]
    UnknownStation(StationId),

    #[error("unknown gate {0}")]
    UnknownGate(GateId),

    #[error("unknown track {0}")]
    UnknownTrack(TrackId),

    #[error("unknown segment {0}")]
    UnknownSegment(SegmentId),

    #[error("unknown job {0}")]
    UnknownJob(JobId),

    #[error("unknown stop {0}")]
    UnknownStop(StopId),

    #[error("job {0} already exists")]
    DuplicateJob(JobId),

    #[error("station {0} already exists")]
    DuplicateStation(StationId),

    #[error("gate {0} already exists")]
    DuplicateGate(GateId),

    #[error("track {0} already exists")]
    DuplicateTrack(TrackId),

    #[error("segment {0} already exists")]
    DuplicateSegment(SegmentId),

    #[error("line {0} already exists")]
    DuplicateLine(LineId),

    #[error("station name {0:?} is already used")]
    DuplicateStationName(String),

    #[error("station {station} already has gate {letter}")]
    DuplicateGateLetter { station: StationId, letter: char },

    #[error("gate name must be a single letter A-Z, got {0:?}")]
    InvalidGateLetter(char),

    #[error("gate must be an entrance, an exit or both")]
    GateWithoutDirection,

    #[error("gate {gate} cannot be used as {side} gate")]
    GateNotUsable { gate: GateId, side: &'static str },

    #[error("gate must have at least one gate track")]
    GateWithoutTracks,

    #[error("gate {gate} belongs to a different station than {station}")]
    GateOnOtherStation { gate: GateId, station: StationId },

    #[error("track {track} belongs to a different station than {station}")]
    TrackOnOtherStation { track: TrackId, station: StationId },

    #[error("gate {gate} has only {count} tracks, got track {gate_track}")]
    GateTrackOutOfRange {
        gate: GateId,
        gate_track: u16,
        count: u16,
    },

    #[error("track {track} is already connected to gate {gate} on this side")]
    DuplicateConnection { track: TrackId, gate: GateId },

    #[error("{class:?} max length {requested} cm exceeds track length {length} cm")]
    TrackLengthExceeded {
        class: TrafficClass,
        requested: u32,
        length: u32,
    },

    #[error("station {0} needs at least one gate and one track")]
    IncompleteStation(StationId),

    #[error("removing this would leave station {0} without gates or tracks")]
    WouldEmptyStation(StationId),

    #[error("segment must connect gates of two different stations")]
    SegmentWithinStation,

    #[error("segment distance must be greater than zero")]
    InvalidDistance,

    #[error("segment max speed must be greater than zero")]
    InvalidSpeed,

    #[error("no segment connects gate {from} to gate {to}")]
    NoSegmentBetween { from: GateId, to: GateId },

    #[error(transparent)]
    NotConnected(#[from] NotConnected),

    #[error("job {job} must have at least 2 stops, has {count}")]
    TooFewStops { job: JobId, count: usize },

    #[error("stop {stop} departs before it arrives")]
    DepartureBeforeArrival { stop: StopId },

    #[error("stop {stop}: jobs cannot start or end at {station}")]
    TerminusNotAllowed { stop: StopId, station: StationId },

    #[error("stop {stop}: trains cannot dwell at junction {station}")]
    DwellAtJunction { stop: StopId, station: StationId },

    #[error("stop {stop} is missing its {side} gate")]
    MissingGate { stop: StopId, side: &'static str },

    #[error("stop {stop} must not have an {side} gate")]
    UnexpectedGate { stop: StopId, side: &'static str },

    #[error("stop {stop}: track {track} is not reachable from gate {gate}")]
    TrackNotReachable {
        stop: StopId,
        track: TrackId,
        gate: GateId,
    },

    #[error("stop {stop} has no segment to the next stop")]
    MissingSegment { stop: StopId },

    #[error("stop {stop}: segment {segment} does not join this stop to the next")]
    SegmentMismatch { stop: StopId, segment: SegmentId },

    #[error("line segments are not contiguous at position {position}")]
    LineNotContiguous { position: usize },

    #[error("{entity} is still used by job {job}")]
    StillReferenced { entity: String, job: JobId },

    #[error("gate {gate} is still used by segment {segment}")]
    GateUsedBySegment { gate: GateId, segment: SegmentId },

    #[error("segment {segment} is still part of line {line}")]
    SegmentUsedByLine { segment: SegmentId, line: LineId },

    #[error("unknown line {0}")]
    UnknownLine(LineId),
}

/// Edits that are well-formed but describe a train that cannot run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeasibilityError {
    #[error(
        "job {job} leaves stop {stop} on non-electrified segment {segment} with only electric traction"
    )]
    NoTraction {
        job: JobId,
        stop: StopId,
        segment: SegmentId,
    },
}

/// Any error that blocks an edit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error(transparent)]
    Feasibility(#[from] FeasibilityError),
}

impl From<NotConnected> for EngineError {
    fn from(err: NotConnected) -> Self {
        EngineError::Structural(err.into())
    }
}

/// Consistency warnings: the edit is accepted but flagged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Warning {
    #[error("gate {gate} track {requested} is not connected to the segment, using track {used}")]
    OutGateTrackSubstituted {
        gate: GateId,
        requested: u16,
        used: u16,
    },

    #[error("stop {stop}: travel time is {actual} min, expected {expected} min")]
    TravelTimeMismatch {
        stop: StopId,
        expected: i64,
        actual: i64,
    },
}
