//! Rollingstock ledger: where every piece is, and with which job, over time.
//!
//! Nothing here is stored. The ledger is replayed from the couplings
//! attached to job stops whenever it is needed, one state machine per piece:
//!
//! ```text
//!            Couple (same station, or first use)
//!   Free ───────────────────────────────────────▶ Coupled(job)
//!    ▲                                                │
//!    └──────────── Uncouple (same job) ───────────────┘
//! ```
//!
//! Operations breaking these rules are reported as [`LedgerIssue`]s and
//! left out of the replay. Coupling an electric engine before a
//! non-electrified segment is reported but still applied.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::background::{CancelToken, Cancelled};
use crate::domain::{
    JobId, RollingStockRegistry, RsId, SegmentId, SessionTime, StationId, StopId,
};
use crate::job::{Job, RsOp};
use crate::network::{DirectedSegment, NetworkGraph};

/// One coupling or uncoupling, flattened out of a job's stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CouplingOperation {
    pub piece: RsId,
    pub job: JobId,
    pub stop: StopId,
    /// Position of the stop within its job.
    pub stop_index: usize,
    pub station: StationId,
    /// Arrival at the stop.
    pub time: SessionTime,
    pub op: RsOp,
    pub next_segment: Option<DirectedSegment>,
}

impl CouplingOperation {
    /// Replay order. Uncoupling sorts before coupling at the same instant so
    /// a piece can be handed from one job to another at a single stop time.
    fn sort_key(&self) -> (SessionTime, bool, JobId, usize) {
        (self.time, self.op == RsOp::Couple, self.job, self.stop_index)
    }
}

/// State of a piece at an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceState {
    /// Not attached to any job. `station` is `None` before the piece is
    /// first used.
    Free {
        station: Option<StationId>,
        since: Option<SessionTime>,
    },
    Coupled { job: JobId, since: SessionTime },
}

impl PieceState {
    const UNUSED: PieceState = PieceState::Free {
        station: None,
        since: None,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LedgerIssueKind {
    #[error("coupled while already coupled to {coupled_to}")]
    DoubleCoupling { coupled_to: JobId },

    #[error("coupled away from {free_at}, where it was left")]
    CoupledAtOtherStation { free_at: StationId },

    #[error("uncoupled while not coupled to any job")]
    UncoupleWhileFree,

    #[error("uncoupled while coupled to {coupled_to}")]
    UncoupleFromOtherJob { coupled_to: JobId },

    #[error("electric engine coupled before non-electrified {segment}")]
    ElectricOnNonElectrified { segment: SegmentId },
}

impl LedgerIssueKind {
    /// Whether the operation is left out of the replay.
    pub fn rejects_operation(self) -> bool {
        !matches!(self, LedgerIssueKind::ElectricOnNonElectrified { .. })
    }
}

/// An illegal or suspicious coupling operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{piece} at {stop} of {job} ({time}): {kind}")]
pub struct LedgerIssue {
    pub piece: RsId,
    pub job: JobId,
    pub stop: StopId,
    pub time: SessionTime,
    pub kind: LedgerIssueKind,
}

/// A row of a piece's plan: the operation and what the replay made of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanEntry {
    pub operation: CouplingOperation,
    pub issue: Option<LedgerIssueKind>,
}

impl PlanEntry {
    pub fn accepted(&self) -> bool {
        self.issue.is_none_or(|k| !k.rejects_operation())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct PieceHistory {
    plan: Vec<PlanEntry>,
    /// State changes in time order; the state holds from its instant on.
    transitions: Vec<(SessionTime, PieceState)>,
    first_use: Option<(JobId, StopId)>,
}

impl PieceHistory {
    fn state_at(&self, t: SessionTime) -> PieceState {
        let idx = self.transitions.partition_point(|(at, _)| *at <= t);
        idx.checked_sub(1)
            .map(|i| self.transitions[i].1)
            .unwrap_or(PieceState::UNUSED)
    }
}

/// Derived coupling state of every piece that appears in a job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollingStockLedger {
    pieces: BTreeMap<RsId, PieceHistory>,
    issues: Vec<LedgerIssue>,
}

impl RollingStockLedger {
    /// Flatten the couplings of every stop of every job.
    pub fn collect_operations<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Vec<CouplingOperation> {
        jobs.into_iter()
            .flat_map(|job| {
                job.stops.iter().enumerate().flat_map(move |(i, stop)| {
                    stop.couplings.iter().map(move |c| CouplingOperation {
                        piece: c.piece,
                        job: job.id,
                        stop: stop.id,
                        stop_index: i,
                        station: stop.station,
                        time: stop.arrival,
                        op: c.op,
                        next_segment: stop.next_segment,
                    })
                })
            })
            .collect()
    }

    pub fn build<'a>(
        graph: &NetworkGraph,
        registry: &RollingStockRegistry,
        jobs: impl IntoIterator<Item = &'a Job>,
    ) -> Self {
        let mut ledger = Self::default();
        for (piece, ops) in Self::group(Self::collect_operations(jobs)) {
            ledger.replay_piece(graph, registry, piece, ops);
        }
        ledger.finish()
    }

    /// As [`Self::build`], checking for cancellation before each piece.
    pub fn build_cancellable<'a>(
        graph: &NetworkGraph,
        registry: &RollingStockRegistry,
        jobs: impl IntoIterator<Item = &'a Job>,
        cancel: &CancelToken,
    ) -> Result<Self, Cancelled> {
        let mut ledger = Self::default();
        for (piece, ops) in Self::group(Self::collect_operations(jobs)) {
            cancel.check()?;
            ledger.replay_piece(graph, registry, piece, ops);
        }
        Ok(ledger.finish())
    }

    fn group(ops: Vec<CouplingOperation>) -> BTreeMap<RsId, Vec<CouplingOperation>> {
        let mut by_piece: BTreeMap<RsId, Vec<CouplingOperation>> = BTreeMap::new();
        for op in ops {
            by_piece.entry(op.piece).or_default().push(op);
        }
        for ops in by_piece.values_mut() {
            ops.sort_by_key(CouplingOperation::sort_key);
        }
        by_piece
    }

    fn finish(mut self) -> Self {
        self.issues
            .sort_by_key(|i| (i.time, i.piece, i.job, i.stop));
        debug!(
            pieces = self.pieces.len(),
            issues = self.issues.len(),
            "rollingstock ledger replayed"
        );
        self
    }

    fn replay_piece(
        &mut self,
        graph: &NetworkGraph,
        registry: &RollingStockRegistry,
        piece: RsId,
        ops: Vec<CouplingOperation>,
    ) {
        let electric_only = registry
            .model_of(piece)
            .is_some_and(|m| m.kind.is_electric_only());
        let mut history = PieceHistory::default();
        let mut state = PieceState::UNUSED;

        for op in ops {
            let rejected = match (op.op, state) {
                (RsOp::Couple, PieceState::Coupled { job, .. }) => {
                    Some(LedgerIssueKind::DoubleCoupling { coupled_to: job })
                }
                (
                    RsOp::Couple,
                    PieceState::Free {
                        station: Some(free_at),
                        ..
                    },
                ) if free_at != op.station => {
                    Some(LedgerIssueKind::CoupledAtOtherStation { free_at })
                }
                (RsOp::Couple, PieceState::Free { .. }) => None,
                (RsOp::Uncouple, PieceState::Free { .. }) => Some(LedgerIssueKind::UncoupleWhileFree),
                (RsOp::Uncouple, PieceState::Coupled { job, .. }) if job != op.job => {
                    Some(LedgerIssueKind::UncoupleFromOtherJob { coupled_to: job })
                }
                (RsOp::Uncouple, PieceState::Coupled { .. }) => None,
            };

            let issue = rejected.or_else(|| {
                let segment = op
                    .next_segment
                    .filter(|_| electric_only && op.op == RsOp::Couple)
                    .and_then(|ds| graph.segment(ds.segment))
                    .filter(|s| !s.electrified)?;
                Some(LedgerIssueKind::ElectricOnNonElectrified {
                    segment: segment.id,
                })
            });

            if rejected.is_none() {
                state = match op.op {
                    RsOp::Couple => {
                        history.first_use.get_or_insert((op.job, op.stop));
                        PieceState::Coupled {
                            job: op.job,
                            since: op.time,
                        }
                    }
                    RsOp::Uncouple => PieceState::Free {
                        station: Some(op.station),
                        since: Some(op.time),
                    },
                };
                history.transitions.push((op.time, state));
            }
            if let Some(kind) = issue {
                trace!(piece = %piece, job = %op.job, stop = %op.stop, %kind, "ledger issue");
                self.issues.push(LedgerIssue {
                    piece,
                    job: op.job,
                    stop: op.stop,
                    time: op.time,
                    kind,
                });
            }
            history.plan.push(PlanEntry {
                operation: op,
                issue,
            });
        }
        self.pieces.insert(piece, history);
    }

    /// State of `piece` at `t`. Pieces never coupled are free nowhere.
    pub fn state_at(&self, piece: RsId, t: SessionTime) -> PieceState {
        self.pieces
            .get(&piece)
            .map(|h| h.state_at(t))
            .unwrap_or(PieceState::UNUSED)
    }

    /// Job and stop of the first accepted coupling.
    pub fn first_use(&self, piece: RsId) -> Option<(JobId, StopId)> {
        self.pieces.get(&piece)?.first_use
    }

    /// Whether `piece` stands free at `station` for the whole of `[t0, t1]`.
    pub fn is_free_between(
        &self,
        piece: RsId,
        station: StationId,
        t0: SessionTime,
        t1: SessionTime,
    ) -> bool {
        let Some(history) = self.pieces.get(&piece) else {
            return false;
        };
        let free_here = matches!(
            history.state_at(t0),
            PieceState::Free { station: Some(s), .. } if s == station
        );
        free_here
            && !history
                .transitions
                .iter()
                .any(|(at, _)| *at > t0 && *at <= t1)
    }

    /// Pieces standing free at `station` at `t`.
    pub fn free_at(&self, station: StationId, t: SessionTime) -> Vec<RsId> {
        self.pieces
            .iter()
            .filter(|(_, h)| {
                matches!(
                    h.state_at(t),
                    PieceState::Free { station: Some(s), .. } if s == station
                )
            })
            .map(|(id, _)| *id)
            .collect()
    }

    /// Every operation on `piece` in replay order.
    pub fn plan(&self, piece: RsId) -> &[PlanEntry] {
        self.pieces
            .get(&piece)
            .map(|h| h.plan.as_slice())
            .unwrap_or_default()
    }

    /// Issues of every piece, by time.
    pub fn issues(&self) -> &[LedgerIssue] {
        &self.issues
    }

    pub fn pieces(&self) -> impl Iterator<Item = RsId> + '_ {
        self.pieces.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobCategory, TrackId};
    use crate::job::{Coupling, Stop, StopStatus};
    use crate::testutil::{self, Net, t};

    const X: StationId = StationId(1);
    const Y: StationId = StationId(2);

    fn stop(id: u64, station: StationId, at: &str, couplings: Vec<Coupling>) -> Stop {
        Stop {
            id: StopId(id),
            station,
            arrival: t(at),
            departure: t(at),
            transit: false,
            in_gate: None,
            in_track: TrackId(1),
            out_gate: None,
            out_track: TrackId(1),
            next_segment: None,
            couplings,
            status: StopStatus::Pending,
        }
    }

    fn job(id: u64, stops: Vec<Stop>) -> Job {
        Job {
            id: JobId(id),
            category: JobCategory::Freight,
            shift: None,
            stops,
        }
    }

    fn ledger(jobs: &[Job]) -> RollingStockLedger {
        let net = testutil::two_station_network();
        RollingStockLedger::build(&net.graph, &net.rollingstock, jobs)
    }

    const R: RsId = Net::COACH;

    #[test]
    fn double_coupling_is_excluded() {
        let a = job(
            1,
            vec![
                stop(10, X, "09:00", vec![Coupling::couple(R)]),
                stop(11, Y, "09:20", vec![]),
            ],
        );
        let b = job(
            2,
            vec![
                stop(20, Y, "09:30", vec![Coupling::couple(R)]),
                stop(21, X, "09:50", vec![Coupling::uncouple(R)]),
            ],
        );
        let l = ledger(&[a, b]);

        assert_eq!(l.issues().len(), 2);
        assert_eq!(
            l.issues()[0].kind,
            LedgerIssueKind::DoubleCoupling {
                coupled_to: JobId(1)
            }
        );
        // B never got R, so its uncouple is illegal too
        assert_eq!(
            l.issues()[1].kind,
            LedgerIssueKind::UncoupleFromOtherJob {
                coupled_to: JobId(1)
            }
        );
        assert_eq!(
            l.state_at(R, t("09:45")),
            PieceState::Coupled {
                job: JobId(1),
                since: t("09:00")
            }
        );
        assert_eq!(l.first_use(R), Some((JobId(1), StopId(10))));
        let accepted: Vec<bool> = l.plan(R).iter().map(PlanEntry::accepted).collect();
        assert_eq!(accepted, vec![true, false, false]);
    }

    #[test]
    fn handover_at_same_instant() {
        let a = job(
            1,
            vec![
                stop(10, X, "09:00", vec![Coupling::couple(R)]),
                stop(11, Y, "10:00", vec![Coupling::uncouple(R)]),
            ],
        );
        let b = job(
            2,
            vec![
                stop(20, Y, "10:00", vec![Coupling::couple(R)]),
                stop(21, X, "10:30", vec![Coupling::uncouple(R)]),
            ],
        );
        let l = ledger(&[b, a]);

        assert!(l.issues().is_empty(), "{:?}", l.issues());
        assert_eq!(
            l.state_at(R, t("10:00")),
            PieceState::Coupled {
                job: JobId(2),
                since: t("10:00")
            }
        );
        assert_eq!(
            l.state_at(R, t("11:00")),
            PieceState::Free {
                station: Some(X),
                since: Some(t("10:30"))
            }
        );
    }

    #[test]
    fn coupling_elsewhere_and_uncoupling_free() {
        let a = job(
            1,
            vec![
                stop(10, X, "09:00", vec![Coupling::couple(R)]),
                stop(11, Y, "09:20", vec![Coupling::uncouple(R)]),
            ],
        );
        let b = job(
            2,
            vec![
                stop(20, X, "10:00", vec![Coupling::couple(R)]),
                stop(21, Y, "10:30", vec![Coupling::uncouple(R)]),
            ],
        );
        let l = ledger(&[a, b]);

        let kinds: Vec<_> = l.issues().iter().map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            vec![
                LedgerIssueKind::CoupledAtOtherStation { free_at: Y },
                LedgerIssueKind::UncoupleWhileFree,
            ]
        );
        assert_eq!(l.free_at(Y, t("11:00")), vec![R]);
        assert!(l.free_at(X, t("11:00")).is_empty());
    }

    #[test]
    fn unused_piece_is_free_nowhere() {
        let l = ledger(&[]);
        assert_eq!(l.state_at(R, t("12:00")), PieceState::UNUSED);
        assert_eq!(l.first_use(R), None);
        assert!(!l.is_free_between(R, X, t("12:00"), t("13:00")));
        assert!(l.plan(R).is_empty());
    }

    #[test]
    fn free_between_needs_no_change_in_window() {
        let a = job(
            1,
            vec![
                stop(10, X, "09:00", vec![Coupling::couple(R)]),
                stop(11, Y, "09:20", vec![Coupling::uncouple(R)]),
            ],
        );
        let b = job(
            2,
            vec![
                stop(20, Y, "11:00", vec![Coupling::couple(R)]),
                stop(21, X, "11:30", vec![]),
            ],
        );
        let l = ledger(&[a, b]);

        assert!(l.is_free_between(R, Y, t("09:20"), t("10:59")));
        assert!(!l.is_free_between(R, Y, t("09:20"), t("11:00")));
        assert!(!l.is_free_between(R, X, t("09:30"), t("10:00")));
        assert!(!l.is_free_between(R, Y, t("09:10"), t("09:30")));
    }

    #[test]
    fn electric_engine_before_diesel_line_is_flagged_but_applied() {
        let net = testutil::three_station_network();
        let mut first = stop(10, Net::S, "09:00", vec![Coupling::couple(Net::E656)]);
        first.next_segment = Some(DirectedSegment::forward(Net::SEG_SM));
        let a = job(1, vec![first, stop(11, Net::M, "09:10", vec![])]);

        let l = RollingStockLedger::build(&net.graph, &net.rollingstock, [&a]);
        assert_eq!(
            l.issues()[0].kind,
            LedgerIssueKind::ElectricOnNonElectrified {
                segment: Net::SEG_SM
            }
        );
        assert!(l.plan(Net::E656)[0].accepted());
        assert!(matches!(
            l.state_at(Net::E656, t("09:05")),
            PieceState::Coupled { job: JobId(1), .. }
        ));
    }

    #[test]
    fn cancelled_build_stops() {
        let net = testutil::two_station_network();
        let a = job(1, vec![stop(10, X, "09:00", vec![Coupling::couple(R)])]);
        let cancel = CancelToken::new();
        cancel.cancel();
        assert_eq!(
            RollingStockLedger::build_cancellable(&net.graph, &net.rollingstock, [&a], &cancel),
            Err(Cancelled)
        );
    }

    #[test]
    fn issue_display() {
        let issue = LedgerIssue {
            piece: RsId(3),
            job: JobId(2),
            stop: StopId(20),
            time: t("09:30"),
            kind: LedgerIssueKind::DoubleCoupling {
                coupled_to: JobId(1),
            },
        };
        assert_eq!(
            issue.to_string(),
            "rs#3 at stop#20 of job#2 (09:30): coupled while already coupled to job#1"
        );
    }
}
