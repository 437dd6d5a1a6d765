//! Level clustering
//!
//! Levels are sorted by price and chained into a zone while each successive
//! gap stays within [`CLUSTER_RADIUS_POINTS`]. Because a new zone only starts
//! after a gap wider than the radius, zones come out ascending and disjoint.

use std::collections::BTreeSet;

use crate::common::types::{ClusterZone, Level, LevelCategory, ZoneSource, ZoneType};

/// Maximum gap between neighbouring levels inside one zone
pub const CLUSTER_RADIUS_POINTS: f64 = 3.0;

/// Distinct-source cutoffs
pub const FORTRESS_MIN_SOURCES: usize = 5;
pub const DEFENDED_MIN_SOURCES: usize = 3;
pub const MODERATE_MIN_SOURCES: usize = 2;

/// Zone class from the number of distinct contributing sources
pub fn classify_zone_type(distinct_sources: usize) -> ZoneType {
    if distinct_sources >= FORTRESS_MIN_SOURCES {
        ZoneType::Fortress
    } else if distinct_sources >= DEFENDED_MIN_SOURCES {
        ZoneType::Defended
    } else if distinct_sources >= MODERATE_MIN_SOURCES {
        ZoneType::Moderate
    } else {
        ZoneType::Minor
    }
}

fn category_weight(category: LevelCategory) -> f64 {
    match category {
        LevelCategory::Structural => 1.5,
        LevelCategory::Tactical => 1.2,
        LevelCategory::Intraday => 1.0,
        LevelCategory::Options => 1.3,
        LevelCategory::SpyDerived => 1.1,
        LevelCategory::Fibonacci => 1.2,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn build_cluster_zones(levels: &[Level]) -> Vec<ClusterZone> {
    build_cluster_zones_with_radius(levels, CLUSTER_RADIUS_POINTS)
}

/// Non-finite prices are skipped
pub fn build_cluster_zones_with_radius(levels: &[Level], radius: f64) -> Vec<ClusterZone> {
    let mut sorted: Vec<&Level> = levels.iter().filter(|l| l.price.is_finite()).collect();
    sorted.sort_by(|a, b| a.price.total_cmp(&b.price));

    let mut groups: Vec<Vec<&Level>> = Vec::new();
    for level in sorted {
        match groups.last_mut() {
            Some(group) if group.last().is_some_and(|prev| level.price - prev.price <= radius) => {
                group.push(level)
            }
            _ => groups.push(vec![level]),
        }
    }

    groups
        .iter()
        .enumerate()
        .map(|(idx, group)| zone_from_group(idx, group))
        .collect()
}

fn zone_from_group(idx: usize, group: &[&Level]) -> ClusterZone {
    let low = group.first().map_or(0.0, |l| l.price);
    let high = group.last().map_or(0.0, |l| l.price);
    let score: f64 = group.iter().map(|l| category_weight(l.category)).sum();

    let distinct: BTreeSet<&str> = group.iter().map(|l| l.source.as_str()).collect();

    let hold_rates: Vec<f64> = group.iter().filter_map(|l| l.stats.hold_rate).collect();
    let hold_rate = if hold_rates.is_empty() {
        None
    } else {
        Some(round2(hold_rates.iter().sum::<f64>() / hold_rates.len() as f64))
    };

    ClusterZone {
        id: format!("cluster-{}-{:.2}-{:.2}", idx + 1, low, high),
        price_low: low,
        price_high: high,
        cluster_score: round2(score),
        zone_type: classify_zone_type(distinct.len()),
        sources: group
            .iter()
            .map(|l| ZoneSource {
                source: l.source.clone(),
                category: l.category,
                price: round2(l.price),
                symbol: l.symbol.clone(),
            })
            .collect(),
        test_count: group.iter().map(|l| l.stats.tests_today).sum(),
        last_test_at: group.iter().filter_map(|l| l.stats.last_test_at).max(),
        held: hold_rate.map(|rate| rate >= 60.0),
        hold_rate,
    }
}

/// Zone containing `price`, else the zone whose nearest edge is closest
pub fn nearest_zone(zones: &[ClusterZone], price: f64) -> Option<&ClusterZone> {
    zones.iter().min_by(|a, b| {
        edge_distance(a, price).total_cmp(&edge_distance(b, price))
    })
}

fn edge_distance(zone: &ClusterZone, price: f64) -> f64 {
    if zone.contains(price) {
        0.0
    } else if price < zone.price_low {
        zone.price_low - price
    } else {
        price - zone.price_high
    }
}
