//! The network graph: authoritative topology and feasibility queries.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    DirectedSegment, Gate, Line, Segment, SegmentConnection, Side, Station, StationType, Track,
    TrackConnection,
};
use crate::domain::{
    GateId, LineId, NotConnected, SegmentId, StationId, StructuralError, TrackId, Warning,
};

/// Reference to any network entity, for [`NetworkGraph::validate_reference`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityRef {
    Station(StationId),
    Gate(GateId),
    Track(TrackId),
    Segment(SegmentId),
    Line(LineId),
}

/// Stations, gates, tracks, segments and lines of a session.
///
/// Every mutating method checks the data model invariants before touching
/// state; a rejected edit leaves the graph unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkGraph {
    stations: BTreeMap<StationId, Station>,
    gates: BTreeMap<GateId, Gate>,
    tracks: BTreeMap<TrackId, Track>,
    connections: BTreeSet<TrackConnection>,
    segments: BTreeMap<SegmentId, Segment>,
    lines: BTreeMap<LineId, Line>,
}

impl NetworkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn station(&self, id: StationId) -> Option<&Station> {
        self.stations.get(&id)
    }

    pub fn gate(&self, id: GateId) -> Option<&Gate> {
        self.gates.get(&id)
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    pub fn segment(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.get(&id)
    }

    pub fn line(&self, id: LineId) -> Option<&Line> {
        self.lines.get(&id)
    }

    pub fn stations(&self) -> impl Iterator<Item = &Station> {
        self.stations.values()
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.values()
    }

    pub fn lines(&self) -> impl Iterator<Item = &Line> {
        self.lines.values()
    }

    pub fn connections(&self) -> impl Iterator<Item = &TrackConnection> {
        self.connections.iter()
    }

    /// Find a station by full or short name, ignoring case.
    pub fn find_station(&self, name: &str) -> Option<&Station> {
        self.stations.values().find(|s| {
            s.name.eq_ignore_ascii_case(name)
                || s.short_name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(name))
        })
    }

    /// Gate with this letter at a station.
    pub fn gate_by_letter(&self, station: StationId, letter: char) -> Option<&Gate> {
        let st = self.station(station)?;
        st.gates
            .iter()
            .filter_map(|g| self.gate(*g))
            .find(|g| g.letter == letter)
    }

    pub fn validate_reference(&self, entity: EntityRef) -> bool {
        match entity {
            EntityRef::Station(id) => self.stations.contains_key(&id),
            EntityRef::Gate(id) => self.gates.contains_key(&id),
            EntityRef::Track(id) => self.tracks.contains_key(&id),
            EntityRef::Segment(id) => self.segments.contains_key(&id),
            EntityRef::Line(id) => self.lines.contains_key(&id),
        }
    }

    /// Station a gate belongs to.
    pub fn gate_station(&self, gate: GateId) -> Result<StationId, StructuralError> {
        self.gate(gate)
            .map(|g| g.station)
            .ok_or(StructuralError::UnknownGate(gate))
    }

    /// Departure and arrival stations of a directed segment.
    pub fn segment_stations(
        &self,
        ds: DirectedSegment,
    ) -> Result<(StationId, StationId), StructuralError> {
        let seg = self
            .segment(ds.segment)
            .ok_or(StructuralError::UnknownSegment(ds.segment))?;
        Ok((
            self.gate_station(seg.departure_gate(ds.reversed))?,
            self.gate_station(seg.arrival_gate(ds.reversed))?,
        ))
    }

    /// Stations that are not yet usable by jobs.
    pub fn validate(&self) -> Vec<StructuralError> {
        self.stations
            .values()
            .filter(|s| !s.is_complete())
            .map(|s| StructuralError::IncompleteStation(s.id))
            .collect()
    }

    /// Station tracks reachable from a gate track, in station track order.
    pub fn tracks_for_gate(&self, gate: GateId, gate_track: u16) -> Vec<TrackId> {
        let connected: BTreeSet<TrackId> = self
            .connections
            .iter()
            .filter(|c| c.gate == gate && c.gate_track == gate_track)
            .map(|c| c.track)
            .collect();
        let Some(station) = self.gate(gate).and_then(|g| self.station(g.station)) else {
            return Vec::new();
        };
        station
            .tracks
            .iter()
            .copied()
            .filter(|t| connected.contains(t))
            .collect()
    }

    /// Which station track a train arriving on `gate_track` ends up on.
    ///
    /// The gate's default platform wins when it is reachable, otherwise the
    /// first reachable track in station order.
    pub fn resolve_track_for_gate(
        &self,
        gate: GateId,
        gate_track: u16,
    ) -> Result<TrackId, NotConnected> {
        let candidates = self.tracks_for_gate(gate, gate_track);
        let default = self.gate(gate).and_then(|g| g.default_track);
        default
            .filter(|d| candidates.contains(d))
            .or_else(|| candidates.first().copied())
            .ok_or(NotConnected { gate, gate_track })
    }

    /// Gate tracks of `gate` that reach `track`, ascending.
    pub fn gate_tracks_for_track(&self, gate: GateId, track: TrackId) -> Vec<u16> {
        self.connections
            .iter()
            .filter(|c| c.gate == gate && c.track == track)
            .map(|c| c.gate_track)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn is_track_reachable(&self, gate: GateId, gate_track: u16, track: TrackId) -> bool {
        self.connections
            .iter()
            .any(|c| c.gate == gate && c.gate_track == gate_track && c.track == track)
    }

    /// The segment joining two gates, with `reversed` set when it is stored
    /// from `gate_b` to `gate_a`.
    pub fn segment_between(&self, gate_a: GateId, gate_b: GateId) -> Option<DirectedSegment> {
        self.segments.values().find_map(|s| {
            if s.from == gate_a && s.to == gate_b {
                Some(DirectedSegment::forward(s.id))
            } else if s.from == gate_b && s.to == gate_a {
                Some(DirectedSegment::backward(s.id))
            } else {
                None
            }
        })
    }

    /// Pick the gate track a train leaves on to enter `ds`.
    ///
    /// A requested track not connected to the segment is replaced by the
    /// lowest connected one and reported as a warning rather than rejected.
    pub fn choose_out_gate_track(
        &self,
        ds: DirectedSegment,
        requested: u16,
    ) -> Result<(u16, Option<Warning>), StructuralError> {
        let seg = self
            .segment(ds.segment)
            .ok_or(StructuralError::UnknownSegment(ds.segment))?;
        let gate_id = seg.departure_gate(ds.reversed);
        let gate = self
            .gate(gate_id)
            .ok_or(StructuralError::UnknownGate(gate_id))?;
        if !gate.has_gate_track(requested) {
            return Err(StructuralError::GateTrackOutOfRange {
                gate: gate_id,
                gate_track: requested,
                count: gate.track_count,
            });
        }
        match seg.departure_tracks(ds.reversed) {
            None => Ok((requested, None)),
            Some(tracks) if tracks.contains(&requested) => Ok((requested, None)),
            Some(tracks) => {
                let used = tracks
                    .first()
                    .copied()
                    .ok_or(StructuralError::NotConnected(NotConnected {
                        gate: gate_id,
                        gate_track: requested,
                    }))?;
                warn!(
                    segment = %ds.segment,
                    gate = %gate_id,
                    requested,
                    used,
                    "out gate track not connected to segment, substituting"
                );
                Ok((
                    used,
                    Some(Warning::OutGateTrackSubstituted {
                        gate: gate_id,
                        requested,
                        used,
                    }),
                ))
            }
        }
    }

    /// Gate track at the arrival end when leaving on `gate_track`.
    pub fn map_gate_track(&self, ds: DirectedSegment, gate_track: u16) -> Option<u16> {
        self.segment(ds.segment)?
            .arrival_track(ds.reversed, gate_track)
    }

    fn check_station_names(
        &self,
        except: Option<StationId>,
        name: &str,
        short_name: Option<&str>,
    ) -> Result<(), StructuralError> {
        let mut wanted = vec![name];
        wanted.extend(short_name);
        for st in self.stations.values().filter(|s| Some(s.id) != except) {
            let taken = std::iter::once(st.name.as_str()).chain(st.short_name.as_deref());
            for existing in taken {
                if let Some(clash) = wanted.iter().find(|w| w.eq_ignore_ascii_case(existing)) {
                    return Err(StructuralError::DuplicateStationName((*clash).to_string()));
                }
            }
        }
        Ok(())
    }

    /// Add an empty station. Gates and tracks are added separately.
    pub fn add_station(
        &mut self,
        id: StationId,
        name: &str,
        short_name: Option<&str>,
    ) -> Result<(), StructuralError> {
        if self.stations.contains_key(&id) {
            return Err(StructuralError::DuplicateStation(id));
        }
        self.check_station_names(None, name, short_name)?;
        let mut station = Station::new(id, name);
        station.short_name = short_name.map(str::to_string);
        debug!(station = %id, name, "added station");
        self.stations.insert(id, station);
        Ok(())
    }

    pub fn rename_station(
        &mut self,
        id: StationId,
        name: &str,
        short_name: Option<&str>,
    ) -> Result<(), StructuralError> {
        if !self.stations.contains_key(&id) {
            return Err(StructuralError::UnknownStation(id));
        }
        self.check_station_names(Some(id), name, short_name)?;
        if let Some(st) = self.stations.get_mut(&id) {
            st.name = name.to_string();
            st.short_name = short_name.map(str::to_string);
        }
        Ok(())
    }

    pub fn set_station_kind(
        &mut self,
        id: StationId,
        kind: StationType,
    ) -> Result<(), StructuralError> {
        let station = self
            .stations
            .get_mut(&id)
            .ok_or(StructuralError::UnknownStation(id))?;
        station.kind = kind;
        Ok(())
    }

    pub fn add_gate(&mut self, gate: Gate) -> Result<(), StructuralError> {
        if self.gates.contains_key(&gate.id) {
            return Err(StructuralError::DuplicateGate(gate.id));
        }
        let station = self
            .station(gate.station)
            .ok_or(StructuralError::UnknownStation(gate.station))?;
        if !gate.letter.is_ascii_uppercase() {
            return Err(StructuralError::InvalidGateLetter(gate.letter));
        }
        if self.gate_by_letter(gate.station, gate.letter).is_some() {
            return Err(StructuralError::DuplicateGateLetter {
                station: station.id,
                letter: gate.letter,
            });
        }
        if gate.track_count == 0 {
            return Err(StructuralError::GateWithoutTracks);
        }
        if let Some(track) = gate.default_track {
            self.check_track_at(track, gate.station)?;
        }
        debug!(gate = %gate.id, station = %gate.station, letter = %gate.letter, "added gate");
        if let Some(st) = self.stations.get_mut(&gate.station) {
            st.gates.push(gate.id);
        }
        self.gates.insert(gate.id, gate);
        Ok(())
    }

    pub fn set_gate_default_track(
        &mut self,
        gate: GateId,
        track: Option<TrackId>,
    ) -> Result<(), StructuralError> {
        let station = self.gate_station(gate)?;
        if let Some(track) = track {
            self.check_track_at(track, station)?;
        }
        if let Some(g) = self.gates.get_mut(&gate) {
            g.default_track = track;
        }
        Ok(())
    }

    fn check_track_at(&self, track: TrackId, station: StationId) -> Result<(), StructuralError> {
        let t = self
            .track(track)
            .ok_or(StructuralError::UnknownTrack(track))?;
        if t.station != station {
            return Err(StructuralError::TrackOnOtherStation { track, station });
        }
        Ok(())
    }

    pub fn add_track(&mut self, track: Track) -> Result<(), StructuralError> {
        if self.tracks.contains_key(&track.id) {
            return Err(StructuralError::DuplicateTrack(track.id));
        }
        if !self.stations.contains_key(&track.station) {
            return Err(StructuralError::UnknownStation(track.station));
        }
        track.check_lengths()?;
        debug!(track = %track.id, station = %track.station, name = %track.name, "added track");
        if let Some(st) = self.stations.get_mut(&track.station) {
            st.tracks.push(track.id);
        }
        self.tracks.insert(track.id, track);
        Ok(())
    }

    /// Change the physical and per-class lengths of a track (centimeters).
    pub fn set_track_lengths(
        &mut self,
        id: TrackId,
        length_cm: u32,
        passenger_length_cm: u32,
        freight_length_cm: u32,
    ) -> Result<(), StructuralError> {
        let mut updated = self
            .track(id)
            .cloned()
            .ok_or(StructuralError::UnknownTrack(id))?;
        updated.length_cm = length_cm;
        updated.passenger_length_cm = passenger_length_cm;
        updated.freight_length_cm = freight_length_cm;
        updated.check_lengths()?;
        self.tracks.insert(id, updated);
        Ok(())
    }

    /// Route a station track to a gate track.
    pub fn connect_track(&mut self, conn: TrackConnection) -> Result<(), StructuralError> {
        let gate = self
            .gate(conn.gate)
            .ok_or(StructuralError::UnknownGate(conn.gate))?;
        self.check_track_at(conn.track, gate.station)?;
        if !gate.has_gate_track(conn.gate_track) {
            return Err(StructuralError::GateTrackOutOfRange {
                gate: conn.gate,
                gate_track: conn.gate_track,
                count: gate.track_count,
            });
        }
        let clash = self
            .connections
            .iter()
            .any(|c| c.track == conn.track && c.side == conn.side && c.gate == conn.gate);
        if clash {
            return Err(StructuralError::DuplicateConnection {
                track: conn.track,
                gate: conn.gate,
            });
        }
        self.connections.insert(conn);
        Ok(())
    }

    /// Connect a track to every gate on one side of its station.
    ///
    /// Gates with fewer tracks than `preferred_gate_track` use their highest
    /// track; already connected gates are skipped.
    pub fn connect_track_to_side(
        &mut self,
        track: TrackId,
        side: Side,
        preferred_gate_track: u16,
    ) -> Result<usize, StructuralError> {
        let station = self
            .track(track)
            .map(|t| t.station)
            .ok_or(StructuralError::UnknownTrack(track))?;
        let gates: Vec<(GateId, u16)> = self
            .station(station)
            .map(|s| s.gates.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|g| self.gate(*g))
            .filter(|g| g.side == side)
            .map(|g| (g.id, preferred_gate_track.clamp(1, g.track_count)))
            .collect();
        let mut added = 0;
        for (gate, gate_track) in gates {
            let conn = TrackConnection {
                track,
                side,
                gate,
                gate_track,
            };
            match self.connect_track(conn) {
                Ok(()) => added += 1,
                Err(StructuralError::DuplicateConnection { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(added)
    }

    pub(crate) fn disconnect_track(&mut self, conn: &TrackConnection) -> bool {
        self.connections.remove(conn)
    }

    pub fn add_segment(&mut self, segment: Segment) -> Result<(), StructuralError> {
        if self.segments.contains_key(&segment.id) {
            return Err(StructuralError::DuplicateSegment(segment.id));
        }
        segment.check()?;
        let from = self.gate_station(segment.from)?;
        let to = self.gate_station(segment.to)?;
        if from == to {
            return Err(StructuralError::SegmentWithinStation);
        }
        self.check_segment_connections(&segment, &segment.connections)?;
        debug!(segment = %segment.id, name = %segment.name, "added segment");
        self.segments.insert(segment.id, segment);
        Ok(())
    }

    fn check_segment_connections(
        &self,
        segment: &Segment,
        connections: &[SegmentConnection],
    ) -> Result<(), StructuralError> {
        let from = self
            .gate(segment.from)
            .ok_or(StructuralError::UnknownGate(segment.from))?;
        let to = self
            .gate(segment.to)
            .ok_or(StructuralError::UnknownGate(segment.to))?;
        for conn in connections {
            for (gate, gate_track) in [(from, conn.from_track), (to, conn.to_track)] {
                if !gate.has_gate_track(gate_track) {
                    return Err(StructuralError::GateTrackOutOfRange {
                        gate: gate.id,
                        gate_track,
                        count: gate.track_count,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn set_segment_connections(
        &mut self,
        id: SegmentId,
        connections: Vec<SegmentConnection>,
    ) -> Result<(), StructuralError> {
        let seg = self
            .segment(id)
            .ok_or(StructuralError::UnknownSegment(id))?;
        self.check_segment_connections(seg, &connections)?;
        if let Some(seg) = self.segments.get_mut(&id) {
            seg.connections = connections;
        }
        Ok(())
    }

    /// Add a line. Its segments must form a contiguous run.
    pub fn add_line(&mut self, line: Line) -> Result<(), StructuralError> {
        if self.lines.contains_key(&line.id) {
            return Err(StructuralError::DuplicateLine(line.id));
        }
        line.stations(self)?;
        debug!(line = %line.id, name = %line.name, segments = line.segments.len(), "added line");
        self.lines.insert(line.id, line);
        Ok(())
    }

    pub fn remove_line(&mut self, id: LineId) -> Result<Line, StructuralError> {
        self.lines.remove(&id).ok_or(StructuralError::UnknownLine(id))
    }

    /// Remove a segment not referenced by any line. Job references are
    /// checked by the session.
    pub(crate) fn remove_segment(&mut self, id: SegmentId) -> Result<Segment, StructuralError> {
        if let Some(line) = self
            .lines
            .values()
            .find(|l| l.segments.iter().any(|ds| ds.segment == id))
        {
            return Err(StructuralError::SegmentUsedByLine {
                segment: id,
                line: line.id,
            });
        }
        self.segments
            .remove(&id)
            .ok_or(StructuralError::UnknownSegment(id))
    }

    /// Remove a track and its connections. Refuses to remove the last track.
    pub(crate) fn remove_track(&mut self, id: TrackId) -> Result<Track, StructuralError> {
        let station = self
            .track(id)
            .map(|t| t.station)
            .ok_or(StructuralError::UnknownTrack(id))?;
        if self.station(station).is_some_and(|s| s.tracks.len() <= 1) {
            return Err(StructuralError::WouldEmptyStation(station));
        }
        self.connections.retain(|c| c.track != id);
        for gate in self.gates.values_mut().filter(|g| g.default_track == Some(id)) {
            gate.default_track = None;
        }
        if let Some(st) = self.stations.get_mut(&station) {
            st.tracks.retain(|t| *t != id);
        }
        self.tracks
            .remove(&id)
            .ok_or(StructuralError::UnknownTrack(id))
    }

    /// Remove a gate not used by any segment. Refuses to remove the last gate.
    pub(crate) fn remove_gate(&mut self, id: GateId) -> Result<Gate, StructuralError> {
        let station = self.gate_station(id)?;
        if let Some(seg) = self.segments.values().find(|s| s.from == id || s.to == id) {
            return Err(StructuralError::GateUsedBySegment {
                gate: id,
                segment: seg.id,
            });
        }
        if self.station(station).is_some_and(|s| s.gates.len() <= 1) {
            return Err(StructuralError::WouldEmptyStation(station));
        }
        self.connections.retain(|c| c.gate != id);
        if let Some(st) = self.stations.get_mut(&station) {
            st.gates.retain(|g| *g != id);
        }
        self.gates.remove(&id).ok_or(StructuralError::UnknownGate(id))
    }

    /// Remove a station with its gates, tracks and connections.
    /// Refused while any segment still reaches one of its gates.
    pub(crate) fn remove_station(&mut self, id: StationId) -> Result<Station, StructuralError> {
        let station = self
            .stations
            .get(&id)
            .cloned()
            .ok_or(StructuralError::UnknownStation(id))?;
        for gate in &station.gates {
            if let Some(seg) = self
                .segments
                .values()
                .find(|s| s.from == *gate || s.to == *gate)
            {
                return Err(StructuralError::GateUsedBySegment {
                    gate: *gate,
                    segment: seg.id,
                });
            }
        }
        self.connections
            .retain(|c| !station.gates.contains(&c.gate) && !station.tracks.contains(&c.track));
        for gate in &station.gates {
            self.gates.remove(gate);
        }
        for track in &station.tracks {
            self.tracks.remove(track);
        }
        self.stations.remove(&id);
        debug!(station = %id, "removed station");
        Ok(station)
    }
}
