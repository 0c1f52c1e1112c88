//! Job path editing: stop sequences, gate and track routing, travel times.

use std::collections::BTreeSet;

use chrono::Duration;
use tracing::{debug, trace};

use super::{Coupling, InvalidReason, Job, RsOp, Stop, StopStatus};
use crate::config::EngineConfig;
use crate::domain::{
    EngineError, FeasibilityError, GateId, JobCategory, JobId, NotConnected,
    RollingStockRegistry, RsId, SessionTime, StationId, StopId, StopIdGen, StructuralError,
    TrackId, Warning,
};
use crate::network::{
    DirectedSegment, Gate, GateTrack, NetworkGraph, Segment, Station, StationType,
};

/// One stop of a job to be created by [`JobPath::new_job`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopSpec {
    pub station: StationId,
    /// Gate the train enters through. `None` only for the first stop.
    pub in_gate: Option<GateId>,
    /// Gate and requested gate track the train leaves on. `None` only for
    /// the last stop.
    pub out_gate: Option<GateTrack>,
    /// Dwell in minutes; the category default when unset.
    pub dwell_mins: Option<i64>,
    pub couplings: Vec<Coupling>,
}

impl StopSpec {
    pub fn new(station: StationId) -> Self {
        Self {
            station,
            in_gate: None,
            out_gate: None,
            dwell_mins: None,
            couplings: Vec::new(),
        }
    }

    pub fn entering(mut self, gate: GateId) -> Self {
        self.in_gate = Some(gate);
        self
    }

    pub fn leaving(mut self, gate: GateId, gate_track: u16) -> Self {
        self.out_gate = Some(GateTrack::new(gate, gate_track));
        self
    }

    pub fn dwell(mut self, mins: i64) -> Self {
        self.dwell_mins = Some(mins);
        self
    }

    pub fn coupling(mut self, coupling: Coupling) -> Self {
        self.couplings.push(coupling);
        self
    }
}

/// Proposed times for one stop, from [`JobPath::recompute_times`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopTimes {
    pub stop: StopId,
    pub arrival: SessionTime,
    pub departure: SessionTime,
}

/// How a train gets from one gate across a segment to the next station.
struct LegRoute {
    out_gate_track: u16,
    in_gate_track: u16,
    in_track: TrackId,
    warning: Option<Warning>,
}

/// Edits and checks job paths against the network.
///
/// Every mutating operation works on a copy and only writes back to the
/// caller's job once all checks pass, so a rejected edit leaves it as it was.
pub struct JobPath<'a> {
    graph: &'a NetworkGraph,
    rollingstock: &'a RollingStockRegistry,
    config: &'a EngineConfig,
}

impl<'a> JobPath<'a> {
    pub fn new(
        graph: &'a NetworkGraph,
        rollingstock: &'a RollingStockRegistry,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            graph,
            rollingstock,
            config,
        }
    }

    /// Slowest max speed in the consist, or the configured default when
    /// nothing is coupled.
    pub fn train_speed(&self, consist: &BTreeSet<RsId>) -> u32 {
        consist
            .iter()
            .filter_map(|p| self.rollingstock.model_of(*p))
            .map(|m| m.max_speed_kmh)
            .min()
            .unwrap_or(self.config.default_train_speed_kmh)
    }

    /// Minutes to run `segment`, rounded up, never below the configured
    /// minimum.
    pub fn compute_travel_time(&self, segment: &Segment, train_speed_kmh: u32) -> Duration {
        let speed = u64::from(segment.max_speed_kmh.min(train_speed_kmh).max(1));
        let meters_per_hour = speed * 1000;
        let mins = (u64::from(segment.distance_m) * 60).div_ceil(meters_per_hour);
        let mins = i64::try_from(mins).unwrap_or(i64::MAX);
        trace!(segment = %segment.id, speed, mins, "travel time");
        Duration::minutes(mins.max(self.config.min_travel_mins))
    }

    /// A consist whose engines are all electric cannot run without catenary.
    pub fn check_traction(
        &self,
        job: JobId,
        stop: StopId,
        segment: &Segment,
        consist: &BTreeSet<RsId>,
    ) -> Result<(), FeasibilityError> {
        if segment.electrified {
            return Ok(());
        }
        let mut engines = consist
            .iter()
            .filter_map(|p| self.rollingstock.model_of(*p))
            .filter(|m| m.kind.is_engine())
            .peekable();
        if engines.peek().is_some() && engines.all(|m| m.kind.is_electric_only()) {
            return Err(FeasibilityError::NoTraction {
                job,
                stop,
                segment: segment.id,
            });
        }
        Ok(())
    }

    /// Travel time of the leg leaving stop `index`, with the consist the
    /// job has on that leg.
    fn leg_travel_time(&self, job: &Job, index: usize) -> Result<Duration, EngineError> {
        let stop = &job.stops[index];
        let ds = stop
            .next_segment
            .ok_or(StructuralError::MissingSegment { stop: stop.id })?;
        let segment = self.segment(ds)?;
        let consist = job.consist_after(index);
        self.check_traction(job.id, stop.id, segment, &consist)?;
        Ok(self.compute_travel_time(segment, self.train_speed(&consist)))
    }

    fn segment(&self, ds: DirectedSegment) -> Result<&'a Segment, StructuralError> {
        self.graph
            .segment(ds.segment)
            .ok_or(StructuralError::UnknownSegment(ds.segment))
    }

    fn usable_station(&self, id: StationId) -> Result<&'a Station, StructuralError> {
        let station = self
            .graph
            .station(id)
            .ok_or(StructuralError::UnknownStation(id))?;
        if !station.is_complete() {
            return Err(StructuralError::IncompleteStation(id));
        }
        Ok(station)
    }

    fn usable_gate(
        &self,
        id: GateId,
        station: StationId,
        side: &'static str,
    ) -> Result<&'a Gate, StructuralError> {
        let gate = self.graph.gate(id).ok_or(StructuralError::UnknownGate(id))?;
        if gate.station != station {
            return Err(StructuralError::GateOnOtherStation { gate: id, station });
        }
        let usable = match side {
            "in" => gate.kind.allows_entry(),
            _ => gate.kind.allows_exit(),
        };
        if !usable {
            return Err(StructuralError::GateNotUsable { gate: id, side });
        }
        Ok(gate)
    }

    fn segment_between(&self, from: GateId, to: GateId) -> Result<DirectedSegment, StructuralError> {
        self.graph
            .segment_between(from, to)
            .ok_or(StructuralError::NoSegmentBetween { from, to })
    }

    fn route_leg(
        &self,
        ds: DirectedSegment,
        requested: u16,
        in_gate: GateId,
    ) -> Result<LegRoute, EngineError> {
        let (out_gate_track, warning) = self.graph.choose_out_gate_track(ds, requested)?;
        let in_gate_track = self
            .graph
            .map_gate_track(ds, out_gate_track)
            .ok_or(NotConnected {
                gate: in_gate,
                gate_track: out_gate_track,
            })?;
        let in_track = self.graph.resolve_track_for_gate(in_gate, in_gate_track)?;
        Ok(LegRoute {
            out_gate_track,
            in_gate_track,
            in_track,
            warning,
        })
    }

    /// Track a train leaves from: where it already stands when that track
    /// reaches the gate, otherwise whatever the gate track leads to.
    fn out_track_for(&self, gate: GateTrack, standing: TrackId) -> Result<TrackId, NotConnected> {
        if self.graph.is_track_reachable(gate.gate, gate.track, standing) {
            Ok(standing)
        } else {
            self.graph.resolve_track_for_gate(gate.gate, gate.track)
        }
    }

    /// Explicit dwell, else zero at junctions and the category default
    /// elsewhere.
    fn dwell_for(
        &self,
        category: JobCategory,
        station: &Station,
        dwell_mins: Option<i64>,
    ) -> Duration {
        match dwell_mins {
            Some(mins) => Duration::minutes(mins),
            None if station.kind == StationType::Junction => Duration::zero(),
            None => self.config.default_stop(category),
        }
    }

    /// Build a job from its stops, departing the first one at `start`.
    ///
    /// Segments, tracks and gate tracks are resolved from the network and
    /// times follow from travel times and dwells.
    pub fn new_job(
        &self,
        id: JobId,
        category: JobCategory,
        start: SessionTime,
        specs: &[StopSpec],
        ids: &mut StopIdGen,
    ) -> Result<(Job, Vec<Warning>), EngineError> {
        let n = specs.len();
        if n < 2 {
            return Err(StructuralError::TooFewStops { job: id, count: n }.into());
        }
        let stop_ids: Vec<StopId> = specs.iter().map(|_| ids.next_id()).collect();

        let mut stations = Vec::with_capacity(n);
        for (i, (spec, stop)) in specs.iter().zip(&stop_ids).enumerate() {
            stations.push(self.usable_station(spec.station)?);
            let stop = *stop;
            match (i == 0, spec.in_gate) {
                (true, Some(_)) => return Err(StructuralError::UnexpectedGate { stop, side: "in" }.into()),
                (false, None) => return Err(StructuralError::MissingGate { stop, side: "in" }.into()),
                (false, Some(g)) => {
                    self.usable_gate(g, spec.station, "in")?;
                }
                (true, None) => {}
            }
            match (i + 1 == n, spec.out_gate) {
                (true, Some(_)) => return Err(StructuralError::UnexpectedGate { stop, side: "out" }.into()),
                (false, None) => return Err(StructuralError::MissingGate { stop, side: "out" }.into()),
                (false, Some(g)) => {
                    self.usable_gate(g.gate, spec.station, "out")?;
                }
                (true, None) => {}
            }
        }

        let mut job = Job {
            id,
            category,
            shift: None,
            stops: Vec::with_capacity(n),
        };
        let mut warnings = Vec::new();
        let mut consist = BTreeSet::new();
        let mut time = start;
        let mut arriving: Option<(GateTrack, TrackId)> = None;

        for (i, spec) in specs.iter().enumerate() {
            let stop_id = stop_ids[i];
            let first = i == 0;
            let last = i + 1 == n;
            let arrival = time;
            let dwell = if first || last {
                Duration::zero()
            } else {
                self.dwell_for(category, stations[i], spec.dwell_mins)
            };
            let departure = arrival + dwell;
            for c in &spec.couplings {
                match c.op {
                    RsOp::Couple => consist.insert(c.piece),
                    RsOp::Uncouple => consist.remove(&c.piece),
                };
            }
            let in_gate = arriving.map(|(g, _)| g);

            let (in_track, out_gate, out_track, next_segment) = match (spec.out_gate, specs.get(i + 1)) {
                (Some(requested), Some(next)) => {
                    let next_in = next
                        .in_gate
                        .ok_or(StructuralError::MissingGate {
                            stop: stop_ids[i + 1],
                            side: "in",
                        })?;
                    let ds = self.segment_between(requested.gate, next_in)?;
                    let leg = self.route_leg(ds, requested.track, next_in)?;
                    warnings.extend(leg.warning);
                    let out_gate = GateTrack::new(requested.gate, leg.out_gate_track);
                    let in_track = match arriving {
                        Some((_, track)) => track,
                        None => self
                            .graph
                            .resolve_track_for_gate(out_gate.gate, out_gate.track)?,
                    };
                    let out_track = self.out_track_for(out_gate, in_track)?;

                    let segment = self.segment(ds)?;
                    self.check_traction(id, stop_id, segment, &consist)?;
                    time = departure + self.compute_travel_time(segment, self.train_speed(&consist));
                    arriving = Some((
                        GateTrack::new(next_in, leg.in_gate_track),
                        leg.in_track,
                    ));
                    (in_track, Some(out_gate), out_track, Some(ds))
                }
                _ => {
                    let track = arriving
                        .map(|(_, t)| t)
                        .ok_or(StructuralError::MissingGate {
                            stop: stop_id,
                            side: "in",
                        })?;
                    (track, None, track, None)
                }
            };

            job.stops.push(Stop {
                id: stop_id,
                station: spec.station,
                arrival,
                departure,
                transit: !first && !last && dwell.is_zero() && self.config.auto_transit,
                in_gate,
                in_track,
                out_gate,
                out_track,
                next_segment,
                couplings: spec.couplings.clone(),
                status: StopStatus::Pending,
            });
        }

        warnings.extend(self.validate(&mut job)?);
        debug!(job = %id, stops = n, warnings = warnings.len(), "created job");
        Ok((job, warnings))
    }

    /// Insert a stop at `station` after stop `after`.
    ///
    /// The new stop is entered through `gate_in` and left on `gate_out`;
    /// both neighbours must be joined to it by segments. Following stops
    /// are shifted when [`EngineConfig::rebase_on_insert`] is set.
    pub fn insert_stop(
        &self,
        job: &mut Job,
        after: StopId,
        station: StationId,
        gate_in: GateId,
        gate_out: GateTrack,
        ids: &mut StopIdGen,
    ) -> Result<Vec<Warning>, EngineError> {
        let idx = job
            .stop_index(after)
            .ok_or(StructuralError::UnknownStop(after))?;
        let next_idx = idx + 1;
        let Some(next) = job.stops.get(next_idx) else {
            return Err(StructuralError::MissingGate {
                stop: after,
                side: "out",
            }
            .into());
        };
        let station_ref = self.usable_station(station)?;
        self.usable_gate(gate_in, station, "in")?;
        self.usable_gate(gate_out.gate, station, "out")?;

        let prev = &job.stops[idx];
        let prev_out = prev.out_gate.ok_or(StructuralError::MissingGate {
            stop: prev.id,
            side: "out",
        })?;
        let next_in = next.in_gate.ok_or(StructuralError::MissingGate {
            stop: next.id,
            side: "in",
        })?;
        let ds_in = self.segment_between(prev_out.gate, gate_in)?;
        let ds_out = self.segment_between(gate_out.gate, next_in.gate)?;

        let mut warnings = Vec::new();
        let leg_in = self.route_leg(ds_in, prev_out.track, gate_in)?;
        let leg_out = self.route_leg(ds_out, gate_out.track, next_in.gate)?;
        warnings.extend(leg_in.warning);
        warnings.extend(leg_out.warning);

        let out_gate = GateTrack::new(gate_out.gate, leg_out.out_gate_track);
        let out_track = self.out_track_for(out_gate, leg_in.in_track)?;
        let prev_out = GateTrack::new(prev_out.gate, leg_in.out_gate_track);
        let prev_out_track = self.out_track_for(prev_out, prev.out_track)?;

        let consist = job.consist_after(idx);
        let speed = self.train_speed(&consist);
        let stop_id = ids.next_id();
        let seg_in = self.segment(ds_in)?;
        let seg_out = self.segment(ds_out)?;
        self.check_traction(job.id, prev.id, seg_in, &consist)?;
        self.check_traction(job.id, stop_id, seg_out, &consist)?;

        let arrival = prev.departure + self.compute_travel_time(seg_in, speed);
        let dwell = self.dwell_for(job.category, station_ref, None);
        let departure = arrival + dwell;
        let next_arrival = departure + self.compute_travel_time(seg_out, speed);
        let delta = next_arrival - next.arrival;

        let mut draft = job.clone();
        {
            let prev = &mut draft.stops[idx];
            prev.out_gate = Some(prev_out);
            prev.out_track = prev_out_track;
            prev.next_segment = Some(ds_in);
        }
        {
            let next = &mut draft.stops[next_idx];
            next.in_gate = Some(GateTrack::new(next_in.gate, leg_out.in_gate_track));
            next.in_track = leg_out.in_track;
            if next.out_gate.is_none() {
                next.out_track = next.in_track;
            }
        }
        draft.stops.insert(
            next_idx,
            Stop {
                id: stop_id,
                station,
                arrival,
                departure,
                transit: dwell.is_zero() && self.config.auto_transit,
                in_gate: Some(GateTrack::new(gate_in, leg_in.in_gate_track)),
                in_track: leg_in.in_track,
                out_gate: Some(out_gate),
                out_track,
                next_segment: Some(ds_out),
                couplings: Vec::new(),
                status: StopStatus::Pending,
            },
        );
        if self.config.rebase_on_insert {
            draft.shift_from(next_idx + 1, delta);
        }

        warnings.extend(self.validate(&mut draft)?);
        debug!(
            job = %job.id,
            stop = %stop_id,
            station = %station,
            shift_mins = delta.num_minutes(),
            "inserted stop"
        );
        *job = draft;
        Ok(warnings)
    }

    /// Remove a stop, joining its neighbours directly.
    pub fn remove_stop(&self, job: &mut Job, stop: StopId) -> Result<Vec<Warning>, EngineError> {
        let idx = job
            .stop_index(stop)
            .ok_or(StructuralError::UnknownStop(stop))?;
        let n = job.stops.len();
        if n <= 2 {
            return Err(StructuralError::TooFewStops {
                job: job.id,
                count: n - 1,
            }
            .into());
        }

        let mut draft = job.clone();
        let mut warnings = Vec::new();
        let removed = draft.stops.remove(idx);
        if idx == 0 {
            let first = &mut draft.stops[0];
            first.in_gate = None;
            first.transit = false;
        } else if idx == n - 1 {
            if let Some(last) = draft.stops.last_mut() {
                last.out_gate = None;
                last.out_track = last.in_track;
                last.next_segment = None;
                last.departure = last.arrival;
                last.transit = false;
            }
        } else {
            let prev = &draft.stops[idx - 1];
            let next = &draft.stops[idx];
            let prev_out = prev.out_gate.ok_or(StructuralError::MissingGate {
                stop: prev.id,
                side: "out",
            })?;
            let next_in = next.in_gate.ok_or(StructuralError::MissingGate {
                stop: next.id,
                side: "in",
            })?;
            let ds = self.segment_between(prev_out.gate, next_in.gate)?;
            let leg = self.route_leg(ds, prev_out.track, next_in.gate)?;
            warnings.extend(leg.warning);
            let prev_out = GateTrack::new(prev_out.gate, leg.out_gate_track);
            let prev_out_track = self.out_track_for(prev_out, prev.out_track)?;

            let prev = &mut draft.stops[idx - 1];
            prev.out_gate = Some(prev_out);
            prev.out_track = prev_out_track;
            prev.next_segment = Some(ds);
            let prev_departure = prev.departure;

            let next = &mut draft.stops[idx];
            next.in_gate = Some(GateTrack::new(next_in.gate, leg.in_gate_track));
            next.in_track = leg.in_track;
            if next.out_gate.is_none() {
                next.out_track = next.in_track;
            }
            let next_arrival = next.arrival;

            if self.config.rebase_on_insert {
                let travel = self.leg_travel_time(&draft, idx - 1)?;
                draft.shift_from(idx, prev_departure + travel - next_arrival);
            }
        }

        warnings.extend(self.validate(&mut draft)?);
        debug!(
            job = %job.id,
            stop = %stop,
            dropped_couplings = removed.couplings.len(),
            "removed stop"
        );
        *job = draft;
        Ok(warnings)
    }

    /// Move a stop's departure.
    ///
    /// With `rebase_following` every later stop moves by the same amount.
    /// Otherwise the next stop is left alone and flagged if its travel time
    /// no longer matches. The first stop keeps its dwell.
    pub fn set_departure(
        &self,
        job: &mut Job,
        stop: StopId,
        time: SessionTime,
        rebase_following: bool,
    ) -> Result<Vec<Warning>, EngineError> {
        let idx = job
            .stop_index(stop)
            .ok_or(StructuralError::UnknownStop(stop))?;
        let mut draft = job.clone();
        let s = &mut draft.stops[idx];
        let delta = time - s.departure;
        if idx == 0 {
            s.arrival = s.arrival + delta;
        } else if time < s.arrival {
            return Err(StructuralError::DepartureBeforeArrival { stop }.into());
        }
        s.departure = time;
        if s.departure != s.arrival {
            s.transit = false;
        }
        if rebase_following {
            draft.shift_from(idx + 1, delta);
        }
        let warnings = self.validate(&mut draft)?;
        debug!(job = %job.id, stop = %stop, %time, rebase_following, "set departure");
        *job = draft;
        Ok(warnings)
    }

    /// Move a stop's arrival, keeping its dwell.
    pub fn set_arrival(
        &self,
        job: &mut Job,
        stop: StopId,
        time: SessionTime,
        rebase_following: bool,
    ) -> Result<Vec<Warning>, EngineError> {
        let idx = job
            .stop_index(stop)
            .ok_or(StructuralError::UnknownStop(stop))?;
        let mut draft = job.clone();
        let delta = time - draft.stops[idx].arrival;
        if rebase_following {
            draft.shift_from(idx, delta);
        } else {
            let s = &mut draft.stops[idx];
            s.arrival = time;
            s.departure = s.departure + delta;
        }
        let warnings = self.validate(&mut draft)?;
        debug!(job = %job.id, stop = %stop, %time, rebase_following, "set arrival");
        *job = draft;
        Ok(warnings)
    }

    /// Times every stop would get if travel times were recomputed from the
    /// first departure with the current consists. Dwells are kept.
    pub fn recompute_times(&self, job: &Job) -> Result<Vec<StopTimes>, EngineError> {
        let mut out = Vec::with_capacity(job.stops.len());
        let mut prev_departure: Option<SessionTime> = None;
        for (i, stop) in job.stops.iter().enumerate() {
            let arrival = match prev_departure {
                None => stop.arrival,
                Some(dep) => dep + self.leg_travel_time(job, i - 1)?,
            };
            let departure = arrival + stop.dwell().max(Duration::zero());
            out.push(StopTimes {
                stop: stop.id,
                arrival,
                departure,
            });
            prev_departure = Some(departure);
        }
        Ok(out)
    }

    /// Write times proposed by [`Self::recompute_times`] into the job.
    pub fn apply_times(&self, job: &mut Job, times: &[StopTimes]) -> Result<Vec<Warning>, EngineError> {
        let mut draft = job.clone();
        for t in times {
            let idx = draft
                .stop_index(t.stop)
                .ok_or(StructuralError::UnknownStop(t.stop))?;
            let s = &mut draft.stops[idx];
            s.arrival = t.arrival;
            s.departure = t.departure;
        }
        let warnings = self.validate(&mut draft)?;
        *job = draft;
        Ok(warnings)
    }

    /// A new job running the same path the other way, validated.
    pub fn reverse_path(
        &self,
        job: &Job,
        new_id: JobId,
        ids: &mut StopIdGen,
    ) -> Result<(Job, Vec<Warning>), EngineError> {
        let mut reversed = job.reversed(new_id, ids);
        let warnings = self.validate(&mut reversed)?;
        debug!(job = %job.id, reversed = %new_id, "reversed job path");
        Ok((reversed, warnings))
    }

    fn check_track(
        &self,
        stop: &Stop,
        gate: GateTrack,
        track: TrackId,
    ) -> Result<(), StructuralError> {
        let t = self
            .graph
            .track(track)
            .ok_or(StructuralError::UnknownTrack(track))?;
        if t.station != stop.station {
            return Err(StructuralError::TrackOnOtherStation {
                track,
                station: stop.station,
            });
        }
        if !self.graph.is_track_reachable(gate.gate, gate.track, track) {
            return Err(StructuralError::TrackNotReachable {
                stop: stop.id,
                track,
                gate: gate.gate,
            });
        }
        Ok(())
    }

    /// Hard structural checks on the stop sequence.
    fn check_structure(&self, job: &Job) -> Result<(), StructuralError> {
        let n = job.stops.len();
        if n < 2 {
            return Err(StructuralError::TooFewStops { job: job.id, count: n });
        }
        for (i, stop) in job.stops.iter().enumerate() {
            let station = self.usable_station(stop.station)?;
            if stop.departure < stop.arrival {
                return Err(StructuralError::DepartureBeforeArrival { stop: stop.id });
            }
            if (i == 0 || i + 1 == n) && station.kind != StationType::Normal {
                return Err(StructuralError::TerminusNotAllowed {
                    stop: stop.id,
                    station: stop.station,
                });
            }
            if station.kind == StationType::Junction && stop.departure > stop.arrival {
                return Err(StructuralError::DwellAtJunction {
                    stop: stop.id,
                    station: stop.station,
                });
            }
            match (i == 0, stop.in_gate) {
                (true, Some(_)) => return Err(StructuralError::UnexpectedGate { stop: stop.id, side: "in" }),
                (false, None) => return Err(StructuralError::MissingGate { stop: stop.id, side: "in" }),
                (false, Some(g)) => {
                    self.usable_gate(g.gate, stop.station, "in")?;
                    self.check_track(stop, g, stop.in_track)?;
                }
                (true, None) => {}
            }

            let Some(next) = job.stops.get(i + 1) else {
                if stop.out_gate.is_some() {
                    return Err(StructuralError::UnexpectedGate { stop: stop.id, side: "out" });
                }
                if let Some(ds) = stop.next_segment {
                    return Err(StructuralError::SegmentMismatch {
                        stop: stop.id,
                        segment: ds.segment,
                    });
                }
                continue;
            };
            let out = stop.out_gate.ok_or(StructuralError::MissingGate {
                stop: stop.id,
                side: "out",
            })?;
            self.usable_gate(out.gate, stop.station, "out")?;
            self.check_track(stop, out, stop.out_track)?;
            let ds = stop
                .next_segment
                .ok_or(StructuralError::MissingSegment { stop: stop.id })?;
            let segment = self.segment(ds)?;
            let joins = segment.departure_gate(ds.reversed) == out.gate
                && next.in_gate.map(|g| g.gate) == Some(segment.arrival_gate(ds.reversed));
            if !joins {
                return Err(StructuralError::SegmentMismatch {
                    stop: stop.id,
                    segment: ds.segment,
                });
            }
        }
        Ok(())
    }

    /// Check a job and set every stop's status.
    ///
    /// Structural and traction problems are errors. Travel time mismatches,
    /// disconnected out gate tracks and dwelling transits only mark the stop
    /// invalid; mismatches are also returned as warnings.
    pub fn validate(&self, job: &mut Job) -> Result<Vec<Warning>, EngineError> {
        self.check_structure(job)?;

        let mut statuses = Vec::with_capacity(job.stops.len());
        let mut warnings = Vec::new();
        for (i, stop) in job.stops.iter().enumerate() {
            let mut status = StopStatus::Valid;
            if i > 0 {
                let expected = self.leg_travel_time(job, i - 1)?;
                let actual = stop.arrival - job.stops[i - 1].departure;
                if expected != actual {
                    let (expected, actual) = (expected.num_minutes(), actual.num_minutes());
                    warnings.push(Warning::TravelTimeMismatch {
                        stop: stop.id,
                        expected,
                        actual,
                    });
                    status = StopStatus::Invalid(InvalidReason::TravelTimeMismatch {
                        expected_mins: expected,
                        actual_mins: actual,
                    });
                }
            }
            if let (Some(out), Some(ds)) = (stop.out_gate, stop.next_segment) {
                let connected = self
                    .segment(ds)?
                    .departure_tracks(ds.reversed)
                    .is_none_or(|tracks| tracks.contains(&out.track));
                if !connected && status == StopStatus::Valid {
                    status = StopStatus::Invalid(InvalidReason::OutGateTrackNotConnected {
                        gate_track: out.track,
                    });
                }
            }
            if stop.transit && stop.departure != stop.arrival && status == StopStatus::Valid {
                status = StopStatus::Invalid(InvalidReason::TransitWithDwell);
            }
            statuses.push(status);
        }

        for (stop, status) in job.stops.iter_mut().zip(statuses) {
            stop.status = status;
        }
        Ok(warnings)
    }
}
