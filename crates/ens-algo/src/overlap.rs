use std::collections::{BTreeMap, BTreeSet};

use ens_core::{AssetId, IncidentId, RawIncident};

/// Distinct groups of incident ids that overlap on the same asset.
///
/// Each incident contributes the set of itself plus every incident it
/// overlaps (inclusive bounds); identical sets are reported once.
/// Discarded incidents are ignored.
pub fn find_overlaps(incidents: &[RawIncident]) -> Vec<Vec<IncidentId>> {
    let mut by_asset: BTreeMap<AssetId, Vec<&RawIncident>> = BTreeMap::new();
    for incident in incidents.iter().filter(|i| !i.is_discarded()) {
        by_asset.entry(incident.asset_id).or_default().push(incident);
    }

    let mut groups: BTreeSet<Vec<IncidentId>> = BTreeSet::new();
    for list in by_asset.values_mut() {
        list.sort_by_key(|i| (i.start, i.end, i.id));
        for (i, a) in list.iter().enumerate() {
            let mut group = vec![a.id];
            for b in &list[i + 1..] {
                if b.start > a.end {
                    break;
                }
                group.push(b.id);
            }
            for b in &list[..i] {
                if b.overlaps(a) {
                    group.push(b.id);
                }
            }
            if group.len() > 1 {
                group.sort();
                group.dedup();
                groups.insert(group);
            }
        }
    }
    groups.into_iter().collect()
}
