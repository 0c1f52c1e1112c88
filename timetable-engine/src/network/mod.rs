//! Rail network model.
//!
//! Stations with their gates and tracks, the switch topology joining them,
//! segments between stations and display lines. [`NetworkGraph`] owns all of
//! it and is the read-only input to job, ledger and conflict computations.

mod graph;
mod line;
mod segment;
mod station;

pub use graph::{EntityRef, NetworkGraph};
pub use line::{Line, LineStation};
pub use segment::{DirectedSegment, Segment, SegmentConnection};
pub use station::{Gate, GateKind, GateTrack, Side, Station, StationType, Track, TrackConnection};
