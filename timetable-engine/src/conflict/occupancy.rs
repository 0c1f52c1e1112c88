//! Occupancy intervals: which track a job holds, in which direction, when.

use tracing::trace;

use crate::domain::{JobId, SegmentId, SessionTime, TrackId};
use crate::job::Job;
use crate::network::{GateTrack, NetworkGraph, Side};

/// A single physical track: a station track or one track of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TrackRef {
    Station(TrackId),
    /// Physical track index into the segment's connections.
    Segment { segment: SegmentId, track: usize },
}

/// Travel direction on a track. For station tracks `Forward` is eastbound,
/// for segments it is the stored from-to direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occupancy {
    pub job: JobId,
    pub track: TrackRef,
    pub direction: Direction,
    pub start: SessionTime,
    pub end: SessionTime,
}

impl Occupancy {
    /// Zero-length interval, e.g. a transit stop.
    pub fn is_point(&self) -> bool {
        self.start == self.end
    }

    /// Shared time window with `other`, if any.
    ///
    /// Intervals that merely touch do not overlap unless one of them is a
    /// point, which still holds the track at that instant.
    pub fn overlap(&self, other: &Occupancy) -> Option<(SessionTime, SessionTime)> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if start < end || (start == end && (self.is_point() || other.is_point())) {
            Some((start, end))
        } else {
            None
        }
    }
}

fn station_direction(graph: &NetworkGraph, in_gate: Option<GateTrack>, out_gate: Option<GateTrack>) -> Direction {
    let side_of = |g: GateTrack| graph.gate(g.gate).map(|g| g.side);
    match (in_gate.and_then(side_of), out_gate.and_then(side_of)) {
        (Some(Side::West), _) | (None, Some(Side::East)) => Direction::Forward,
        (Some(Side::East), _) | (None, Some(Side::West)) => Direction::Backward,
        (None, None) => Direction::Forward,
    }
}

/// Every interval during which `job` holds a track.
///
/// Each stop holds its arrival track from arrival to departure; leaving from
/// another track holds that one at the departure instant too. Each leg holds
/// the segment track chosen by the out gate track from departure to the next
/// arrival.
pub fn job_occupancies(graph: &NetworkGraph, job: &Job) -> Vec<Occupancy> {
    let mut out = Vec::with_capacity(job.stops.len() * 2);
    for (i, stop) in job.stops.iter().enumerate() {
        let direction = station_direction(graph, stop.in_gate, stop.out_gate);
        out.push(Occupancy {
            job: job.id,
            track: TrackRef::Station(stop.in_track),
            direction,
            start: stop.arrival,
            end: stop.departure,
        });
        if stop.out_track != stop.in_track {
            out.push(Occupancy {
                job: job.id,
                track: TrackRef::Station(stop.out_track),
                direction,
                start: stop.departure,
                end: stop.departure,
            });
        }

        let (Some(ds), Some(next)) = (stop.next_segment, job.stops.get(i + 1)) else {
            continue;
        };
        let Some(segment) = graph.segment(ds.segment) else {
            continue;
        };
        let physical = stop
            .out_gate
            .and_then(|g| segment.physical_track(ds.reversed, g.track))
            .unwrap_or_else(|| {
                trace!(job = %job.id, stop = %stop.id, segment = %ds.segment, "no physical track for out gate track, assuming first");
                0
            });
        out.push(Occupancy {
            job: job.id,
            track: TrackRef::Segment {
                segment: ds.segment,
                track: physical,
            },
            direction: if ds.reversed {
                Direction::Backward
            } else {
                Direction::Forward
            },
            start: stop.departure,
            end: next.arrival,
        });
    }
    out
}
