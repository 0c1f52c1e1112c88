//! Jobs: a train's stop sequence through the network.
//!
//! [`Job`] and [`Stop`] hold the data; [`JobPath`] edits them against a
//! [`NetworkGraph`](crate::network::NetworkGraph) and keeps times consistent
//! with segment distances and train speeds.

mod model;
mod path;

pub use model::{
    Coupling, InvalidReason, Job, RsOp, Shift, Stop, StopStatus, shift_overlaps,
};
pub use path::{JobPath, StopSpec, StopTimes};
