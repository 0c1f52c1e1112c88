//! Shared fixtures for unit tests.
//!
//! ```text
//!   San Marco (S)  A ===== SEG 10 km 100 km/h electrified ===== A  Ponte (P)
//!        A \                                                    / A
//!          SEG_SM 4 km 80 km/h diesel    Monte (M)    SEG_MP 6 km 100 km/h
//!                             \------ A  [1] [2]  B ------/
//! ```

use crate::domain::{
    EngineKind, GateId, RollingStockPiece, RollingStockRegistry, RsId, RsModel, RsModelId,
    RsOwner, RsOwnerId, RsType, SegmentId, SessionTime, StationId, TrackId,
};
use crate::network::{
    Gate, GateKind, NetworkGraph, Segment, Side, Track, TrackConnection,
};

pub fn t(s: &str) -> SessionTime {
    SessionTime::parse_hhmm(s).unwrap()
}

pub struct Net {
    pub graph: NetworkGraph,
    pub rollingstock: RollingStockRegistry,
}

impl Net {
    pub const S: StationId = StationId(1);
    pub const P: StationId = StationId(2);
    pub const M: StationId = StationId(3);

    pub const S_A: GateId = GateId(11);
    pub const P_A: GateId = GateId(21);
    pub const M_A: GateId = GateId(31);
    pub const M_B: GateId = GateId(32);

    pub const S_T1: TrackId = TrackId(101);
    pub const S_T2: TrackId = TrackId(102);
    pub const P_T1: TrackId = TrackId(201);
    pub const M_T1: TrackId = TrackId(301);
    pub const M_T2: TrackId = TrackId(302);

    pub const SEG: SegmentId = SegmentId(1);
    pub const SEG_SM: SegmentId = SegmentId(2);
    pub const SEG_MP: SegmentId = SegmentId(3);

    /// Electric engine, 150 km/h.
    pub const E656: RsId = RsId(1);
    /// Diesel engine, 90 km/h.
    pub const D345: RsId = RsId(2);
    /// Coach, 160 km/h.
    pub const COACH: RsId = RsId(3);
}

fn gate(id: GateId, station: StationId, letter: char, side: Side, tracks: u16) -> Gate {
    Gate {
        id,
        station,
        letter,
        kind: GateKind::Bidirectional,
        side,
        track_count: tracks,
        default_track: None,
    }
}

fn connect(g: &mut NetworkGraph, track: TrackId, side: Side, gate: GateId, gate_track: u16) {
    g.connect_track(TrackConnection {
        track,
        side,
        gate,
        gate_track,
    })
    .unwrap();
}

fn rollingstock() -> RollingStockRegistry {
    let mut rs = RollingStockRegistry::new();
    rs.add_owner(RsOwner {
        id: RsOwnerId(1),
        name: "FS".into(),
    });
    for (id, name, kind, speed) in [
        (1, "E.656", RsType::Engine(EngineKind::Electric), 150),
        (2, "D.345", RsType::Engine(EngineKind::Diesel), 90),
        (3, "Bz", RsType::Coach, 160),
    ] {
        rs.add_model(RsModel {
            id: RsModelId(id),
            name: name.into(),
            suffix: None,
            kind,
            max_speed_kmh: speed,
        });
    }
    for (id, model, number) in [(1, 1, 23), (2, 2, 1045), (3, 3, 10)] {
        rs.add_piece(RollingStockPiece {
            id: RsId(id),
            model: RsModelId(model),
            number,
            owner: Some(RsOwnerId(1)),
        })
        .unwrap();
    }
    rs
}

/// San Marco and Ponte joined by one single-track electrified segment.
///
/// San Marco gate A has two gate tracks; only track 1 is routed, to both
/// platforms, with platform 2 as default.
pub fn two_station_network() -> Net {
    let mut g = NetworkGraph::new();
    g.add_station(Net::S, "San Marco", Some("SM")).unwrap();
    g.add_station(Net::P, "Ponte", Some("PO")).unwrap();

    g.add_track(Track::new(Net::S_T1, Net::S, "1", 30_000).electrified(true))
        .unwrap();
    g.add_track(Track::new(Net::S_T2, Net::S, "2", 30_000).electrified(true))
        .unwrap();
    g.add_track(Track::new(Net::P_T1, Net::P, "1", 30_000).electrified(true))
        .unwrap();

    g.add_gate(gate(Net::S_A, Net::S, 'A', Side::East, 2)).unwrap();
    g.add_gate(gate(Net::P_A, Net::P, 'A', Side::West, 1)).unwrap();
    g.set_gate_default_track(Net::S_A, Some(Net::S_T2)).unwrap();

    connect(&mut g, Net::S_T1, Side::East, Net::S_A, 1);
    connect(&mut g, Net::S_T2, Side::East, Net::S_A, 1);
    connect(&mut g, Net::P_T1, Side::West, Net::P_A, 1);

    g.add_segment(Segment {
        id: Net::SEG,
        name: "San Marco - Ponte".into(),
        from: Net::S_A,
        to: Net::P_A,
        distance_m: 10_000,
        max_speed_kmh: 100,
        electrified: true,
        connections: Vec::new(),
    })
    .unwrap();

    Net {
        graph: g,
        rollingstock: rollingstock(),
    }
}

/// [`two_station_network`] plus Monte, reachable from both ends.
///
/// San Marco - Monte is not electrified.
pub fn three_station_network() -> Net {
    let mut net = two_station_network();
    let g = &mut net.graph;
    g.add_station(Net::M, "Monte", Some("MO")).unwrap();
    g.add_track(Track::new(Net::M_T1, Net::M, "1", 30_000)).unwrap();
    g.add_track(Track::new(Net::M_T2, Net::M, "2", 30_000)).unwrap();
    g.add_gate(gate(Net::M_A, Net::M, 'A', Side::West, 1)).unwrap();
    g.add_gate(gate(Net::M_B, Net::M, 'B', Side::East, 1)).unwrap();
    for track in [Net::M_T1, Net::M_T2] {
        connect(g, track, Side::West, Net::M_A, 1);
        connect(g, track, Side::East, Net::M_B, 1);
    }
    g.add_segment(Segment {
        id: Net::SEG_SM,
        name: "San Marco - Monte".into(),
        from: Net::S_A,
        to: Net::M_A,
        distance_m: 4_000,
        max_speed_kmh: 80,
        electrified: false,
        connections: Vec::new(),
    })
    .unwrap();
    g.add_segment(Segment {
        id: Net::SEG_MP,
        name: "Monte - Ponte".into(),
        from: Net::M_B,
        to: Net::P_A,
        distance_m: 6_000,
        max_speed_kmh: 100,
        electrified: true,
        connections: Vec::new(),
    })
    .unwrap();
    net
}
