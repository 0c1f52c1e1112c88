//! Domain types shared by every engine component.
//!
//! Identifiers, session time, job categories, rollingstock registry types and
//! the error taxonomy. Types validate their own invariants on construction.

mod category;
mod error;
mod ids;
mod rollingstock;
mod time;

pub use category::{JobCategory, TrafficClass};
pub use error::{EngineError, FeasibilityError, NotConnected, StructuralError, Warning};
pub use ids::{
    GateId, JobId, LineId, RsId, RsModelId, RsOwnerId, SegmentId, ShiftId, StationId, StopId,
    StopIdGen, TrackId,
};
pub use rollingstock::{
    EngineKind, RegistryError, RollingStockPiece, RollingStockRegistry, RsModel, RsOwner, RsType,
};
pub use time::{SessionTime, TimeError};
