//! Jobs and their stops.

use std::collections::BTreeSet;
use std::fmt;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::domain::{
    JobCategory, JobId, RsId, SessionTime, ShiftId, StationId, StopId, StopIdGen, TrackId,
};
use crate::network::{DirectedSegment, GateTrack};

/// Direction of a coupling operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RsOp {
    Couple,
    Uncouple,
}

/// A piece of rollingstock attached to or detached from the job at a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coupling {
    pub piece: RsId,
    pub op: RsOp,
}

impl Coupling {
    pub fn couple(piece: RsId) -> Self {
        Self {
            piece,
            op: RsOp::Couple,
        }
    }

    pub fn uncouple(piece: RsId) -> Self {
        Self {
            piece,
            op: RsOp::Uncouple,
        }
    }
}

/// Why a stop failed validation without blocking the edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvalidReason {
    /// Arrival does not match previous departure plus computed travel time.
    TravelTimeMismatch { expected_mins: i64, actual_mins: i64 },
    /// Marked as transit but dwells.
    TransitWithDwell,
    /// Out gate track does not lead onto the next segment.
    OutGateTrackNotConnected { gate_track: u16 },
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidReason::TravelTimeMismatch {
                expected_mins,
                actual_mins,
            } => write!(f, "travel time {actual_mins} min, expected {expected_mins} min"),
            InvalidReason::TransitWithDwell => f.write_str("transit stop with dwell time"),
            InvalidReason::OutGateTrackNotConnected { gate_track } => {
                write!(f, "out gate track {gate_track} does not reach the segment")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StopStatus {
    #[default]
    Pending,
    Valid,
    Invalid(InvalidReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stop {
    pub id: StopId,
    pub station: StationId,
    pub arrival: SessionTime,
    pub departure: SessionTime,
    /// Passes through without dwelling.
    pub transit: bool,
    pub in_gate: Option<GateTrack>,
    pub in_track: TrackId,
    pub out_gate: Option<GateTrack>,
    pub out_track: TrackId,
    pub next_segment: Option<DirectedSegment>,
    pub couplings: Vec<Coupling>,
    #[serde(default)]
    pub status: StopStatus,
}

impl Stop {
    pub fn dwell(&self) -> Duration {
        self.departure - self.arrival
    }

    fn shift(&mut self, delta: Duration) {
        self.arrival = self.arrival + delta;
        self.departure = self.departure + delta;
    }
}

/// A crew or vehicle shift grouping jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shift {
    pub id: ShiftId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub category: JobCategory,
    pub shift: Option<ShiftId>,
    pub stops: Vec<Stop>,
}

impl Job {
    /// Display name, e.g. "RV 2045".
    pub fn name(&self) -> String {
        format!("{} {}", self.category.abbreviation(), self.id.get())
    }

    /// Every stop passed validation.
    pub fn is_safe_to_save(&self) -> bool {
        self.stops.iter().all(|s| s.status == StopStatus::Valid)
    }

    pub fn stop_index(&self, id: StopId) -> Option<usize> {
        self.stops.iter().position(|s| s.id == id)
    }

    pub fn stop(&self, id: StopId) -> Option<&Stop> {
        self.stops.iter().find(|s| s.id == id)
    }

    pub fn first_stop(&self) -> Option<&Stop> {
        self.stops.first()
    }

    pub fn last_stop(&self) -> Option<&Stop> {
        self.stops.last()
    }

    /// First arrival to last departure.
    pub fn span(&self) -> Option<(SessionTime, SessionTime)> {
        Some((self.first_stop()?.arrival, self.last_stop()?.departure))
    }

    /// Pieces coupled to the job when it leaves stop `index`.
    pub fn consist_after(&self, index: usize) -> BTreeSet<RsId> {
        let mut consist = BTreeSet::new();
        for stop in self.stops.iter().take(index + 1) {
            for c in &stop.couplings {
                match c.op {
                    RsOp::Couple => consist.insert(c.piece),
                    RsOp::Uncouple => consist.remove(&c.piece),
                };
            }
        }
        consist
    }

    /// Shift every stop from `from` onwards by `delta`.
    pub fn shift_from(&mut self, from: usize, delta: Duration) {
        for stop in self.stops.iter_mut().skip(from) {
            stop.shift(delta);
        }
    }

    /// The same path travelled the other way.
    ///
    /// Stops come in reverse order with gates and tracks swapped, segments
    /// mirrored and times reflected about the job's span. Couplings are not
    /// carried over and every stop starts out `Pending`.
    pub fn reversed(&self, new_id: JobId, ids: &mut StopIdGen) -> Job {
        let Some((start, end)) = self.span() else {
            return Job {
                id: new_id,
                stops: Vec::new(),
                ..self.clone()
            };
        };
        let mirror = |t: SessionTime| start + (end - t);
        let n = self.stops.len();
        let stops = (0..n)
            .rev()
            .map(|i| {
                let old = &self.stops[i];
                Stop {
                    id: ids.next_id(),
                    station: old.station,
                    arrival: mirror(old.departure),
                    departure: mirror(old.arrival),
                    transit: old.transit,
                    in_gate: old.out_gate,
                    in_track: old.out_track,
                    out_gate: old.in_gate,
                    out_track: old.in_track,
                    next_segment: i
                        .checked_sub(1)
                        .and_then(|prev| self.stops[prev].next_segment)
                        .map(DirectedSegment::mirrored),
                    couplings: Vec::new(),
                    status: StopStatus::Pending,
                }
            })
            .collect();
        Job {
            id: new_id,
            category: self.category,
            shift: None,
            stops,
        }
    }
}

/// Pairs of jobs in `shift` whose spans overlap, each pair once.
pub fn shift_overlaps<'a>(
    jobs: impl IntoIterator<Item = &'a Job>,
    shift: ShiftId,
) -> Vec<(JobId, JobId)> {
    let mut spans: Vec<(SessionTime, SessionTime, JobId)> = jobs
        .into_iter()
        .filter(|j| j.shift == Some(shift))
        .filter_map(|j| j.span().map(|(s, e)| (s, e, j.id)))
        .collect();
    spans.sort();

    let mut out = Vec::new();
    for (i, (_, end_a, job_a)) in spans.iter().enumerate() {
        for (start_b, _, job_b) in &spans[i + 1..] {
            if start_b >= end_a {
                break;
            }
            out.push((*job_a, *job_b));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GateId, SegmentId};
    use crate::testutil::t;

    fn stop(id: u64, station: u64, arr: &str, dep: &str) -> Stop {
        Stop {
            id: StopId(id),
            station: StationId(station),
            arrival: t(arr),
            departure: t(dep),
            transit: false,
            in_gate: None,
            in_track: TrackId(station * 10),
            out_gate: None,
            out_track: TrackId(station * 10),
            next_segment: None,
            couplings: Vec::new(),
            status: StopStatus::Pending,
        }
    }

    fn three_stop_job() -> Job {
        let mut a = stop(1, 1, "10:00", "10:00");
        a.out_gate = Some(GateTrack::new(GateId(1), 1));
        a.out_track = TrackId(11);
        a.next_segment = Some(DirectedSegment::forward(SegmentId(1)));
        a.couplings.push(Coupling::couple(RsId(7)));

        let mut b = stop(2, 2, "10:06", "10:08");
        b.in_gate = Some(GateTrack::new(GateId(2), 1));
        b.out_gate = Some(GateTrack::new(GateId(3), 2));
        b.next_segment = Some(DirectedSegment::backward(SegmentId(2)));
        b.couplings.push(Coupling::couple(RsId(8)));

        let mut c = stop(3, 3, "10:20", "10:20");
        c.in_gate = Some(GateTrack::new(GateId(4), 2));
        c.couplings.push(Coupling::uncouple(RsId(7)));

        Job {
            id: JobId(2045),
            category: JobCategory::FastRegional,
            shift: Some(ShiftId(1)),
            stops: vec![a, b, c],
        }
    }

    #[test]
    fn name_uses_abbreviation() {
        assert_eq!(three_stop_job().name(), "RV 2045");
    }

    #[test]
    fn safe_to_save_requires_all_valid() {
        let mut job = three_stop_job();
        assert!(!job.is_safe_to_save());
        for s in &mut job.stops {
            s.status = StopStatus::Valid;
        }
        assert!(job.is_safe_to_save());
        job.stops[1].status = StopStatus::Invalid(InvalidReason::TransitWithDwell);
        assert!(!job.is_safe_to_save());
    }

    #[test]
    fn consist_follows_couplings() {
        let job = three_stop_job();
        assert_eq!(job.consist_after(0), BTreeSet::from([RsId(7)]));
        assert_eq!(job.consist_after(1), BTreeSet::from([RsId(7), RsId(8)]));
        assert_eq!(job.consist_after(2), BTreeSet::from([RsId(8)]));
    }

    #[test]
    fn reversed_mirrors_path_and_times() {
        let job = three_stop_job();
        let mut ids = StopIdGen::starting_at(100);
        let rev = job.reversed(JobId(2046), &mut ids);

        let stations: Vec<_> = rev.stops.iter().map(|s| s.station.get()).collect();
        assert_eq!(stations, vec![3, 2, 1]);
        let ids: Vec<_> = rev.stops.iter().map(|s| s.id.get()).collect();
        assert_eq!(ids, vec![100, 101, 102]);

        // Span 10:00-10:20: stop B 10:06-10:08 becomes 10:12-10:14
        assert_eq!(rev.stops[1].arrival, t("10:12"));
        assert_eq!(rev.stops[1].departure, t("10:14"));
        assert_eq!(rev.stops[0].departure, t("10:00"));
        assert_eq!(rev.stops[2].arrival, t("10:20"));

        assert_eq!(rev.stops[0].in_gate, None);
        assert_eq!(rev.stops[0].out_gate, Some(GateTrack::new(GateId(4), 2)));
        assert_eq!(rev.stops[1].in_gate, Some(GateTrack::new(GateId(3), 2)));
        assert_eq!(rev.stops[1].out_gate, Some(GateTrack::new(GateId(2), 1)));
        assert_eq!(rev.stops[2].in_track, TrackId(11));
        assert_eq!(rev.stops[2].out_gate, None);

        assert_eq!(
            rev.stops[0].next_segment,
            Some(DirectedSegment::forward(SegmentId(2)))
        );
        assert_eq!(
            rev.stops[1].next_segment,
            Some(DirectedSegment::backward(SegmentId(1)))
        );
        assert_eq!(rev.stops[2].next_segment, None);
        assert!(rev.stops.iter().all(|s| s.couplings.is_empty()));
        assert_eq!(rev.shift, None);
    }

    #[test]
    fn shift_overlaps_reports_each_pair_once() {
        let a = three_stop_job();
        let mut b = three_stop_job();
        b.id = JobId(2047);
        b.shift_from(0, Duration::minutes(15));
        let mut c = three_stop_job();
        c.id = JobId(2049);
        c.shift_from(0, Duration::minutes(20));
        let mut other = three_stop_job();
        other.id = JobId(9);
        other.shift = Some(ShiftId(2));

        let overlaps = shift_overlaps([&a, &b, &c, &other], ShiftId(1));
        // a 10:00-10:20, b 10:15-10:35, c 10:20-10:40: a and c only touch
        assert_eq!(
            overlaps,
            vec![(JobId(2045), JobId(2047)), (JobId(2047), JobId(2049))]
        );
    }

    #[test]
    fn invalid_reason_display() {
        let reason = InvalidReason::TravelTimeMismatch {
            expected_mins: 6,
            actual_mins: 4,
        };
        assert_eq!(reason.to_string(), "travel time 4 min, expected 6 min");
    }
}
