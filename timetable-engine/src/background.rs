//! Background consistency checks over a session snapshot.
//!
//! Checks run on the blocking pool against an `Arc<Session>` that nobody
//! mutates while they run. A [`CancelToken`] is polled between tracks and
//! between pieces; a cancelled run returns [`Cancelled`] and no partial
//! report.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinHandle;
use tracing::debug;

use crate::conflict::{Conflict, ConflictDetector};
use crate::domain::{JobId, ShiftId};
use crate::job::shift_overlaps;
use crate::ledger::{LedgerIssue, RollingStockLedger};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("background check cancelled")]
pub struct Cancelled;

/// Shared stop flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Everything the checks found. Nothing here blocks saving.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub conflicts: Vec<Conflict>,
    pub ledger_issues: Vec<LedgerIssue>,
    pub shift_overlaps: Vec<(ShiftId, JobId, JobId)>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty() && self.ledger_issues.is_empty() && self.shift_overlaps.is_empty()
    }
}

/// Run every check on the calling thread.
pub fn run_checks(session: &Session, cancel: &CancelToken) -> Result<CheckReport, Cancelled> {
    let conflicts =
        ConflictDetector::new(&session.network).detect_cancellable(session.jobs.values(), cancel)?;
    let ledger = RollingStockLedger::build_cancellable(
        &session.network,
        &session.rollingstock,
        session.jobs.values(),
        cancel,
    )?;

    let shifts: BTreeSet<ShiftId> = session.jobs.values().filter_map(|j| j.shift).collect();
    let mut overlaps = Vec::new();
    for shift in shifts {
        cancel.check()?;
        overlaps.extend(
            shift_overlaps(session.jobs.values(), shift)
                .into_iter()
                .map(|(a, b)| (shift, a, b)),
        );
    }

    let report = CheckReport {
        conflicts,
        ledger_issues: ledger.issues().to_vec(),
        shift_overlaps: overlaps,
    };
    debug!(
        conflicts = report.conflicts.len(),
        ledger_issues = report.ledger_issues.len(),
        shift_overlaps = report.shift_overlaps.len(),
        "background checks done"
    );
    Ok(report)
}

/// Run [`run_checks`] on tokio's blocking pool.
///
/// Must be called from within a tokio runtime.
pub fn spawn_checks(
    session: Arc<Session>,
    cancel: CancelToken,
) -> JoinHandle<Result<CheckReport, Cancelled>> {
    tokio::task::spawn_blocking(move || run_checks(&session, &cancel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::domain::{JobCategory, StopIdGen};
    use crate::job::{Job, StopSpec};
    use crate::testutil::{self, Net, t};

    fn session_with_crossing() -> Session {
        let net = testutil::two_station_network();
        let mut session = Session::new(EngineConfig::default(), net.graph, net.rollingstock);
        let mut ids = StopIdGen::default();
        let jobs: Vec<Job> = {
            let path = session.job_path();
            let east = [
                StopSpec::new(Net::S).leaving(Net::S_A, 1),
                StopSpec::new(Net::P).entering(Net::P_A),
            ];
            let west = [
                StopSpec::new(Net::P).leaving(Net::P_A, 1),
                StopSpec::new(Net::S).entering(Net::S_A),
            ];
            vec![
                path.new_job(JobId(1), JobCategory::Regional, t("10:00"), &east, &mut ids)
                    .unwrap()
                    .0,
                path.new_job(JobId(2), JobCategory::Regional, t("10:03"), &west, &mut ids)
                    .unwrap()
                    .0,
            ]
        };
        for job in jobs {
            session.add_job(job).unwrap();
        }
        session
    }

    #[test]
    fn token_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert_eq!(clone.check(), Ok(()));
        token.cancel();
        assert!(clone.is_cancelled());
        assert_eq!(clone.check(), Err(Cancelled));
    }

    #[test]
    fn empty_session_is_clean() {
        let net = testutil::two_station_network();
        let session = Session::new(EngineConfig::default(), net.graph, net.rollingstock);
        assert!(run_checks(&session, &CancelToken::new()).unwrap().is_clean());
    }

    #[tokio::test]
    async fn spawned_checks_report_crossing() {
        let session = Arc::new(session_with_crossing());
        let report = spawn_checks(session, CancelToken::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.conflicts.len(), 1);
        assert!(report.ledger_issues.is_empty());
    }

    #[tokio::test]
    async fn cancelled_checks_return_nothing() {
        let session = Arc::new(session_with_crossing());
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = spawn_checks(session, cancel).await.unwrap();
        assert_eq!(result, Err(Cancelled));
    }

    #[test]
    fn shift_overlaps_are_reported_per_shift() {
        let mut session = session_with_crossing();
        for job in session.jobs.values_mut() {
            job.shift = Some(ShiftId(7));
        }
        let report = run_checks(&session, &CancelToken::new()).unwrap();
        assert_eq!(report.shift_overlaps, vec![(ShiftId(7), JobId(1), JobId(2))]);
    }
}
