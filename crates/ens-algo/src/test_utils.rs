//! Shared fixtures for unit and integration tests.

use chrono::{DateTime, Duration, TimeZone, Utc};
use ens_core::{
    AssetHierarchy, AssetId, AssetNode, Category, IncidentId, MegawattHours, Megawatts, Origin,
    RawIncident,
};

/// `2024-01-01T00:00Z` plus `m` minutes.
pub fn minute(m: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(m)
}

pub fn second(s: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(s)
}

pub fn incident(
    id: u64,
    asset: u32,
    start_min: i64,
    end_min: i64,
    category: Category,
    origin: Origin,
    ens_mwh: f64,
) -> RawIncident {
    RawIncident::new(
        IncidentId::new(id),
        AssetId::new(asset),
        minute(start_min),
        minute(end_min),
        category,
        origin,
    )
    .with_energy(MegawattHours(ens_mwh))
    .with_ranks(1, 1)
}

/// Plant 1 (10 MW) with a single 10 MW unit 2.
pub fn single_unit_plant() -> AssetHierarchy {
    AssetHierarchy::new(vec![
        AssetNode::plant(AssetId::new(1), "PLANT").with_nominal_power(Megawatts(10.0)),
        AssetNode::unit(AssetId::new(2), "WTG01", AssetId::new(1), Megawatts(10.0)),
    ])
    .unwrap()
}

/// Plant 1 -> groupings 10, 20 -> units 11, 12 (2 MW each) and 21 (3 MW), 22 (1 MW).
pub fn two_grouping_plant() -> AssetHierarchy {
    let p = AssetId::new(1);
    let g1 = AssetId::new(10);
    let g2 = AssetId::new(20);
    AssetHierarchy::new(vec![
        AssetNode::plant(p, "PLANT").with_nominal_power(Megawatts(8.0)),
        AssetNode::grouping(g1, "CIRCUIT 1", p),
        AssetNode::grouping(g2, "CIRCUIT 2", p),
        AssetNode::unit(AssetId::new(11), "WTG11", g1, Megawatts(2.0)),
        AssetNode::unit(AssetId::new(12), "WTG12", g1, Megawatts(2.0)),
        AssetNode::unit(AssetId::new(21), "WTG21", g2, Megawatts(3.0)),
        AssetNode::unit(AssetId::new(22), "WTG22", g2, Megawatts(1.0)),
    ])
    .unwrap()
}

/// Plant 1 with three units directly underneath (no grouping level).
pub fn flat_plant() -> AssetHierarchy {
    let p = AssetId::new(1);
    AssetHierarchy::new(vec![
        AssetNode::plant(p, "PLANT").with_nominal_power(Megawatts(6.0)),
        AssetNode::unit(AssetId::new(2), "WTG01", p, Megawatts(2.0)),
        AssetNode::unit(AssetId::new(3), "WTG02", p, Megawatts(2.0)),
        AssetNode::unit(AssetId::new(4), "WTG03", p, Megawatts(2.0)),
    ])
    .unwrap()
}
