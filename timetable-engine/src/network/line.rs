//! Railway lines: named, ordered runs of segments used for display.

use serde::{Deserialize, Serialize};

use super::{DirectedSegment, NetworkGraph};
use crate::domain::{LineId, StationId, StructuralError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    pub id: LineId,
    pub name: String,
    /// Kilometer position of the first station, in meters.
    pub start_m: u32,
    pub segments: Vec<DirectedSegment>,
}

/// A station along a line with its kilometer position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineStation {
    pub station: StationId,
    pub position_m: u32,
}

impl Line {
    /// Stations in line order with cumulative positions.
    pub fn stations(&self, graph: &NetworkGraph) -> Result<Vec<LineStation>, StructuralError> {
        let mut out = Vec::with_capacity(self.segments.len() + 1);
        let mut position_m = self.start_m;
        for (idx, ds) in self.segments.iter().enumerate() {
            let (from, to) = graph.segment_stations(*ds)?;
            match out.last() {
                None => out.push(LineStation {
                    station: from,
                    position_m,
                }),
                Some(prev) if prev.station == from => {}
                Some(_) => return Err(StructuralError::LineNotContiguous { position: idx }),
            }
            let seg = graph
                .segment(ds.segment)
                .ok_or(StructuralError::UnknownSegment(ds.segment))?;
            position_m = position_m.saturating_add(seg.distance_m);
            out.push(LineStation {
                station: to,
                position_m,
            });
        }
        Ok(out)
    }

    pub fn length_m(&self, graph: &NetworkGraph) -> u32 {
        self.segments
            .iter()
            .filter_map(|ds| graph.segment(ds.segment))
            .fold(0u32, |acc, s| acc.saturating_add(s.distance_m))
    }
}
