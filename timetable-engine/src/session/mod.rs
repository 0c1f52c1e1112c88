//! The whole editing session as one snapshot.
//!
//! [`Session`] owns the network, the rollingstock registry and every job.
//! Job edits go through [`Session::edit_job`], which runs the edit on a
//! copy, commits it only when it succeeds and returns the [`StopDelta`]s a
//! [`SessionStore`] needs to persist it. Network removals are refused while a
//! job still uses the entity.

mod store;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EngineConfig;
use crate::conflict::{Conflict, ConflictDetector};
use crate::domain::{
    EngineError, GateId, JobCategory, JobId, RollingStockRegistry, SegmentId, ShiftId,
    StationId, StopId, StopIdGen, StructuralError, TrackId,
};
use crate::job::{Job, JobPath, Shift, Stop};
use crate::ledger::RollingStockLedger;
use crate::network::{Gate, GateTrack, NetworkGraph, Segment, Station, Track, TrackConnection};

pub use store::{JsonFileStore, MemoryStore, SessionStore, StoreError};

/// A single persisted change to the job tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopDelta {
    /// Create a job or change its header.
    Job {
        job: JobId,
        category: JobCategory,
        shift: Option<ShiftId>,
    },
    JobRemoved(JobId),
    /// Insert or replace a stop, placing it at `position` within its job.
    Upsert {
        job: JobId,
        position: usize,
        stop: Stop,
    },
    Remove { job: JobId, stop: StopId },
}

/// Changes turning `before` into `after`. `None` means the job is new.
///
/// Removals come first, then upserts in ascending position for every stop
/// from the first one that differs. The unchanged prefix produces nothing.
pub fn diff_job(before: Option<&Job>, after: &Job) -> Vec<StopDelta> {
    let mut deltas = Vec::new();
    let header_changed =
        before.is_none_or(|b| b.category != after.category || b.shift != after.shift);
    if header_changed {
        deltas.push(StopDelta::Job {
            job: after.id,
            category: after.category,
            shift: after.shift,
        });
    }

    let old: &[Stop] = before.map(|b| b.stops.as_slice()).unwrap_or_default();
    for stop in old {
        if after.stop_index(stop.id).is_none() {
            deltas.push(StopDelta::Remove {
                job: after.id,
                stop: stop.id,
            });
        }
    }
    let unchanged = old
        .iter()
        .zip(&after.stops)
        .take_while(|(a, b)| a == b)
        .count();
    for (position, stop) in after.stops.iter().enumerate().skip(unchanged) {
        deltas.push(StopDelta::Upsert {
            job: after.id,
            position,
            stop: stop.clone(),
        });
    }
    deltas
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub config: EngineConfig,
    pub network: NetworkGraph,
    pub rollingstock: RollingStockRegistry,
    #[serde(default)]
    pub jobs: BTreeMap<JobId, Job>,
    #[serde(default)]
    pub shifts: BTreeMap<ShiftId, Shift>,
    #[serde(default)]
    stop_ids: StopIdGen,
}

impl Session {
    pub fn new(
        config: EngineConfig,
        network: NetworkGraph,
        rollingstock: RollingStockRegistry,
    ) -> Self {
        Self {
            config,
            network,
            rollingstock,
            jobs: BTreeMap::new(),
            shifts: BTreeMap::new(),
            stop_ids: StopIdGen::starting_at(1),
        }
    }

    pub fn job_path(&self) -> JobPath<'_> {
        JobPath::new(&self.network, &self.rollingstock, &self.config)
    }

    pub fn job(&self, id: JobId) -> Option<&Job> {
        self.jobs.get(&id)
    }

    /// Lowest job id above every existing one.
    pub fn next_job_id(&self) -> JobId {
        JobId(self.jobs.keys().next_back().map_or(1, |id| id.get() + 1))
    }

    /// Add an already built job. It is validated against the network, its
    /// stop statuses are refreshed and its stop ids are reserved.
    pub fn add_job(&mut self, mut job: Job) -> Result<Vec<StopDelta>, EngineError> {
        if self.jobs.contains_key(&job.id) {
            return Err(StructuralError::DuplicateJob(job.id).into());
        }
        self.job_path().validate(&mut job)?;
        for stop in &job.stops {
            self.stop_ids.observe(stop.id);
        }
        let deltas = diff_job(None, &job);
        debug!(job = %job.id, stops = job.stops.len(), "added job");
        self.jobs.insert(job.id, job);
        Ok(deltas)
    }

    pub fn remove_job(&mut self, id: JobId) -> Result<(Job, Vec<StopDelta>), StructuralError> {
        let job = self
            .jobs
            .remove(&id)
            .ok_or(StructuralError::UnknownJob(id))?;
        Ok((job, vec![StopDelta::JobRemoved(id)]))
    }

    /// Run `edit` on a copy of the job and commit it if it succeeds and the
    /// result still validates.
    ///
    /// The closure gets the path editor, the draft job and the session's
    /// stop id generator.
    pub fn edit_job<T>(
        &mut self,
        id: JobId,
        edit: impl FnOnce(&JobPath<'_>, &mut Job, &mut StopIdGen) -> Result<T, EngineError>,
    ) -> Result<(T, Vec<StopDelta>), EngineError> {
        let before = self.jobs.get(&id).ok_or(StructuralError::UnknownJob(id))?;
        let mut draft = before.clone();
        let mut ids = self.stop_ids.clone();
        let path = JobPath::new(&self.network, &self.rollingstock, &self.config);
        let out = edit(&path, &mut draft, &mut ids)?;
        if draft.id != id {
            return Err(StructuralError::UnknownJob(draft.id).into());
        }
        path.validate(&mut draft)?;
        let deltas = diff_job(Some(before), &draft);
        debug!(job = %id, deltas = deltas.len(), "committed job edit");
        self.stop_ids = ids;
        self.jobs.insert(id, draft);
        Ok((out, deltas))
    }

    /// Apply persisted deltas, e.g. replayed by a store.
    pub fn apply_deltas(&mut self, deltas: &[StopDelta]) -> Result<(), StructuralError> {
        for delta in deltas {
            match delta {
                StopDelta::Job {
                    job,
                    category,
                    shift,
                } => {
                    let entry = self.jobs.entry(*job).or_insert_with(|| Job {
                        id: *job,
                        category: *category,
                        shift: *shift,
                        stops: Vec::new(),
                    });
                    entry.category = *category;
                    entry.shift = *shift;
                }
                StopDelta::JobRemoved(job) => {
                    self.jobs.remove(job).ok_or(StructuralError::UnknownJob(*job))?;
                }
                StopDelta::Upsert {
                    job,
                    position,
                    stop,
                } => {
                    let target = self
                        .jobs
                        .get_mut(job)
                        .ok_or(StructuralError::UnknownJob(*job))?;
                    target.stops.retain(|s| s.id != stop.id);
                    let at = (*position).min(target.stops.len());
                    target.stops.insert(at, stop.clone());
                    self.stop_ids.observe(stop.id);
                }
                StopDelta::Remove { job, stop } => {
                    let target = self
                        .jobs
                        .get_mut(job)
                        .ok_or(StructuralError::UnknownJob(*job))?;
                    let idx = target
                        .stop_index(*stop)
                        .ok_or(StructuralError::UnknownStop(*stop))?;
                    target.stops.remove(idx);
                }
            }
        }
        Ok(())
    }

    pub fn ledger(&self) -> RollingStockLedger {
        RollingStockLedger::build(&self.network, &self.rollingstock, self.jobs.values())
    }

    pub fn conflicts(&self) -> Vec<Conflict> {
        ConflictDetector::new(&self.network).detect(self.jobs.values())
    }

    fn first_user(&self, uses: impl Fn(&Stop) -> bool) -> Option<JobId> {
        self.jobs
            .values()
            .find(|j| j.stops.iter().any(&uses))
            .map(|j| j.id)
    }

    fn ensure_unused(
        &self,
        entity: impl std::fmt::Display,
        uses: impl Fn(&Stop) -> bool,
    ) -> Result<(), StructuralError> {
        match self.first_user(uses) {
            Some(job) => Err(StructuralError::StillReferenced {
                entity: entity.to_string(),
                job,
            }),
            None => Ok(()),
        }
    }

    pub fn remove_segment(&mut self, id: SegmentId) -> Result<Segment, StructuralError> {
        self.ensure_unused(id, |s| s.next_segment.is_some_and(|ds| ds.segment == id))?;
        self.network.remove_segment(id)
    }

    pub fn remove_track(&mut self, id: TrackId) -> Result<Track, StructuralError> {
        self.ensure_unused(id, |s| s.in_track == id || s.out_track == id)?;
        self.network.remove_track(id)
    }

    pub fn remove_gate(&mut self, id: GateId) -> Result<Gate, StructuralError> {
        self.ensure_unused(id, |s| {
            s.in_gate.is_some_and(|g| g.gate == id) || s.out_gate.is_some_and(|g| g.gate == id)
        })?;
        self.network.remove_gate(id)
    }

    /// Remove a track connection no stop is routed through.
    pub fn remove_track_connection(&mut self, conn: TrackConnection) -> Result<(), StructuralError> {
        let routed = |gate: Option<GateTrack>, track: TrackId| {
            gate.is_some_and(|g| g.gate == conn.gate && g.track == conn.gate_track)
                && track == conn.track
        };
        self.ensure_unused(
            format_args!("{} to {} track {}", conn.track, conn.gate, conn.gate_track),
            |s| routed(s.in_gate, s.in_track) || routed(s.out_gate, s.out_track),
        )?;
        if self.network.disconnect_track(&conn) {
            Ok(())
        } else {
            Err(StructuralError::UnknownTrack(conn.track))
        }
    }

    pub fn remove_station(&mut self, id: StationId) -> Result<Station, StructuralError> {
        self.ensure_unused(id, |s| s.station == id)?;
        self.network.remove_station(id)
    }
}
