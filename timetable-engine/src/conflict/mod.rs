//! Track occupancy conflicts between jobs.
//!
//! Every job is turned into [occupancy intervals](Occupancy) on station
//! tracks and physical segment tracks. Intervals are grouped per track and
//! swept in start order; each overlapping pair of different jobs is a
//! [`Conflict`]: a crossing when they travel in opposite directions, a
//! passing when one catches up with the other.

mod occupancy;

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, trace};

use crate::background::{CancelToken, Cancelled};
use crate::domain::{JobId, SegmentId, SessionTime, StationId, TrackId};
use crate::job::Job;
use crate::network::NetworkGraph;

pub use occupancy::{Direction, Occupancy, TrackRef, job_occupancies};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConflictKind {
    /// Opposite directions on the same track.
    Crossing,
    /// Same direction on the same track.
    Passing,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::Crossing => write!(f, "crossing"),
            ConflictKind::Passing => write!(f, "passing"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConflictLocation {
    Station { station: StationId, track: TrackId },
    Segment(SegmentId),
}

impl fmt::Display for ConflictLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictLocation::Station { station, track } => write!(f, "{station} {track}"),
            ConflictLocation::Segment(segment) => write!(f, "{segment}"),
        }
    }
}

/// Two jobs holding the same track at the same time.
///
/// `job_a` is the job that got onto the track first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{kind} between {job_a} and {job_b} at {location}, {overlap_start}-{overlap_end}")]
pub struct Conflict {
    pub job_a: JobId,
    pub job_b: JobId,
    pub location: ConflictLocation,
    pub kind: ConflictKind,
    pub overlap_start: SessionTime,
    pub overlap_end: SessionTime,
}

pub struct ConflictDetector<'a> {
    graph: &'a NetworkGraph,
}

impl<'a> ConflictDetector<'a> {
    pub fn new(graph: &'a NetworkGraph) -> Self {
        Self { graph }
    }

    /// All conflicts among `jobs`, sorted by overlap start, then location
    /// name, then job ids. Each pair is reported once per track and window.
    pub fn detect<'j>(&self, jobs: impl IntoIterator<Item = &'j Job>) -> Vec<Conflict> {
        let by_track = self.occupancies_by_track(jobs);
        let conflicts = by_track.into_iter().flat_map(|(track, occ)| self.sweep(track, occ)).collect();
        self.finish(conflicts)
    }

    /// As [`Self::detect`], checking for cancellation before each track.
    pub fn detect_cancellable<'j>(
        &self,
        jobs: impl IntoIterator<Item = &'j Job>,
        cancel: &CancelToken,
    ) -> Result<Vec<Conflict>, Cancelled> {
        let by_track = self.occupancies_by_track(jobs);
        let mut conflicts = Vec::new();
        for (track, occ) in by_track {
            cancel.check()?;
            conflicts.extend(self.sweep(track, occ));
        }
        Ok(self.finish(conflicts))
    }

    fn occupancies_by_track<'j>(
        &self,
        jobs: impl IntoIterator<Item = &'j Job>,
    ) -> BTreeMap<TrackRef, Vec<Occupancy>> {
        let mut by_track: BTreeMap<TrackRef, Vec<Occupancy>> = BTreeMap::new();
        for job in jobs {
            for occ in job_occupancies(self.graph, job) {
                by_track.entry(occ.track).or_default().push(occ);
            }
        }
        by_track
    }

    fn location(&self, track: TrackRef) -> ConflictLocation {
        match track {
            TrackRef::Station(id) => ConflictLocation::Station {
                station: self
                    .graph
                    .track(id)
                    .map(|t| t.station)
                    .unwrap_or(StationId(0)),
                track: id,
            },
            TrackRef::Segment { segment, .. } => ConflictLocation::Segment(segment),
        }
    }

    fn sweep(&self, track: TrackRef, mut occ: Vec<Occupancy>) -> Vec<Conflict> {
        occ.sort_by_key(|o| (o.start, o.end, o.job));
        let location = self.location(track);
        let mut found = Vec::new();
        for (i, first) in occ.iter().enumerate() {
            for second in occ[i + 1..].iter().take_while(|o| o.start <= first.end) {
                if first.job == second.job {
                    continue;
                }
                let Some((overlap_start, overlap_end)) = first.overlap(second) else {
                    continue;
                };
                let kind = if first.direction == second.direction {
                    ConflictKind::Passing
                } else {
                    ConflictKind::Crossing
                };
                let (job_a, job_b) = if first.start == second.start {
                    (first.job.min(second.job), first.job.max(second.job))
                } else {
                    (first.job, second.job)
                };
                trace!(%job_a, %job_b, %location, %kind, "track conflict");
                found.push(Conflict {
                    job_a,
                    job_b,
                    location,
                    kind,
                    overlap_start,
                    overlap_end,
                });
            }
        }
        found
    }

    fn location_name(&self, location: ConflictLocation) -> &str {
        match location {
            ConflictLocation::Station { station, .. } => {
                self.graph.station(station).map(|s| s.name.as_str())
            }
            ConflictLocation::Segment(id) => self.graph.segment(id).map(|s| s.name.as_str()),
        }
        .unwrap_or("")
    }

    fn finish(&self, mut conflicts: Vec<Conflict>) -> Vec<Conflict> {
        conflicts.sort_by(|a, b| {
            (a.overlap_start, self.location_name(a.location), a.job_a, a.job_b)
                .cmp(&(b.overlap_start, self.location_name(b.location), b.job_a, b.job_b))
                .then_with(|| (a.location, a.overlap_end, a.kind).cmp(&(b.location, b.overlap_end, b.kind)))
        });
        conflicts.dedup();
        debug!(count = conflicts.len(), "conflict detection done");
        conflicts
    }
}
