//! Greedy partition of grouping variables into shared scans.
//!
//! Variables are taken in declared order. Each unit starts with the first variable not
//! yet placed and then takes every later unplaced variable that is independent of all
//! members and whose dependencies were all placed in earlier units.

use super::types::{ScanUnit, VariableScan};

/// Neither variable reads an aggregate of the other.
pub(super) fn independent(a: &VariableScan, b: &VariableScan) -> bool {
    !a.depends_on.contains(&b.position) && !b.depends_on.contains(&a.position)
}

pub(super) fn partition(scans: Vec<VariableScan>, merge: bool) -> Vec<ScanUnit> {
    if !merge {
        return scans
            .into_iter()
            .map(|scan| ScanUnit {
                variables: vec![scan],
            })
            .collect();
    }

    let mut placed: Vec<usize> = Vec::new();
    let mut pending: Vec<Option<VariableScan>> = scans.into_iter().map(Some).collect();
    let mut units = Vec::new();

    while let Some(first) = pending.iter_mut().find_map(Option::take) {
        let mut members = vec![first];
        for slot in pending.iter_mut() {
            let joins = match slot {
                Some(candidate) => {
                    members.iter().all(|m| independent(m, candidate))
                        && candidate.depends_on.iter().all(|d| placed.contains(d))
                }
                None => false,
            };
            if joins {
                if let Some(candidate) = slot.take() {
                    members.push(candidate);
                }
            }
        }
        placed.extend(members.iter().map(|m| m.position));
        units.push(ScanUnit { variables: members });
    }

    units
}
