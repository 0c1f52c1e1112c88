//! Session persistence.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{Session, StopDelta};
use crate::domain::StructuralError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("session file is not valid: {0}")]
    Json(#[from] serde_json::Error),

    #[error("stored session does not accept the change: {0}")]
    Rejected(#[from] StructuralError),
}

/// Where the session lives between runs.
///
/// `apply` persists validated deltas; stores never validate edits
/// themselves.
pub trait SessionStore {
    fn load(&self) -> Result<Session, StoreError>;

    fn apply(&mut self, deltas: &[StopDelta]) -> Result<(), StoreError>;

    /// Replace the stored session wholesale.
    fn save(&mut self, session: &Session) -> Result<(), StoreError>;
}

/// Keeps the session in memory. Used by tests and hosts that persist
/// elsewhere.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    session: Session,
}

impl MemoryStore {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

impl SessionStore for MemoryStore {
    fn load(&self) -> Result<Session, StoreError> {
        Ok(self.session.clone())
    }

    fn apply(&mut self, deltas: &[StopDelta]) -> Result<(), StoreError> {
        let mut next = self.session.clone();
        next.apply_deltas(deltas)?;
        self.session = next;
        Ok(())
    }

    fn save(&mut self, session: &Session) -> Result<(), StoreError> {
        self.session = session.clone();
        Ok(())
    }
}

/// The whole session as one JSON document.
///
/// Writes go to a sibling temp file which is then renamed over the target,
/// so a crash never leaves a half-written session behind.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SessionStore for JsonFileStore {
    fn load(&self) -> Result<Session, StoreError> {
        let contents = std::fs::read_to_string(&self.path)?;
        let session: Session = serde_json::from_str(&contents)?;
        debug!(path = %self.path.display(), jobs = session.jobs.len(), "loaded session");
        Ok(session)
    }

    fn apply(&mut self, deltas: &[StopDelta]) -> Result<(), StoreError> {
        let mut session = self.load()?;
        session.apply_deltas(deltas)?;
        self.save(&session)
    }

    fn save(&mut self, session: &Session) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(session)?;
        let tmp = self.temp_path();
        std::fs::write(&tmp, json)?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to replace session file");
            // Best effort; the rename error is what matters
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        debug!(path = %self.path.display(), "saved session");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::domain::{JobCategory, JobId, StopIdGen};
    use crate::job::StopSpec;
    use crate::testutil::{self, Net, t};

    fn session_with_job() -> Session {
        let net = testutil::two_station_network();
        let mut session = Session::new(EngineConfig::default(), net.graph, net.rollingstock);
        let specs = [
            StopSpec::new(Net::S).leaving(Net::S_A, 1),
            StopSpec::new(Net::P).entering(Net::P_A),
        ];
        let (job, _) = session
            .job_path()
            .new_job(JobId(1), JobCategory::Regional, t("10:00"), &specs, &mut StopIdGen::starting_at(1))
            .unwrap();
        session.add_job(job).unwrap();
        session
    }

    fn retime(session: &mut Session) -> Vec<StopDelta> {
        let first = session.job(JobId(1)).unwrap().stops[0].id;
        session
            .edit_job(JobId(1), |path, job, _| path.set_departure(job, first, t("11:00"), true))
            .unwrap()
            .1
    }

    #[test]
    fn json_store_round_trips_and_applies_deltas() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonFileStore::new(dir.path().join("nested").join("session.json"));
        let mut session = session_with_job();
        store.save(&session).unwrap();

        let deltas = retime(&mut session);
        store.apply(&deltas).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.jobs, session.jobs);
        assert_eq!(loaded.job(JobId(1)).unwrap().stops[1].arrival, t("11:06"));
        assert!(loaded.network.station(Net::S).is_some());
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("absent.json"));
        assert!(matches!(store.load(), Err(StoreError::Io(_))));
    }

    #[test]
    fn corrupt_file_is_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            JsonFileStore::new(&path).load(),
            Err(StoreError::Json(_))
        ));
    }

    #[test]
    fn memory_store_rejects_unknown_job_atomically() {
        let mut session = session_with_job();
        let mut store = MemoryStore::new(session.clone());
        let mut deltas = retime(&mut session);
        deltas.push(StopDelta::Remove {
            job: JobId(9),
            stop: crate::domain::StopId(1),
        });

        let err = store.apply(&deltas).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Rejected(StructuralError::UnknownJob(JobId(9)))
        ));
        // Nothing from the batch was kept
        assert_eq!(
            store.load().unwrap().job(JobId(1)).unwrap().stops[0].departure,
            t("10:00")
        );
    }
}
