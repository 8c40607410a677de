//! Casualty allocation: spreading an aggregate loss count over unit rows.
//!
//! Policy: veterans are protected. Losses fill the lowest level first and
//! only spill into the next level once every row below is empty. Rows that
//! share a level split their level's share in proportion to their
//! quantities; the rounding remainder goes one unit at a time to the rows
//! with the largest dropped fraction, earlier rows first on ties.
//!
//! The allocation never takes more from a row than it holds, and the total
//! allocated always equals `min(requested, available)`.

use crate::army::UnitRow;

/// Distribute `requested` losses over `rows`.
///
/// Returns one loss row per affected (type, level), ordered by level then
/// type. Rows with zero quantity are ignored.
#[must_use]
pub fn allocate(rows: &[UnitRow], requested: u64) -> Vec<UnitRow> {
    let mut candidates: Vec<UnitRow> = rows.iter().copied().filter(|r| r.quantity > 0).collect();
    candidates.sort_by_key(|row| (row.level, row.unit));

    let mut remaining = requested;
    let mut losses = Vec::new();
    let mut start = 0;

    while start < candidates.len() && remaining > 0 {
        let level = candidates[start].level;
        let end = candidates[start..]
            .iter()
            .position(|row| row.level != level)
            .map_or(candidates.len(), |offset| start + offset);
        let group = &candidates[start..end];

        let group_total: u64 = group.iter().map(|row| row.quantity).sum();
        if remaining >= group_total {
            losses.extend_from_slice(group);
            remaining -= group_total;
        } else {
            losses.extend(split_proportionally(group, group_total, remaining));
            remaining = 0;
        }

        start = end;
    }

    losses.retain(|row| row.quantity > 0);
    losses
}

/// Take up to `requested` losses from a single row.
#[must_use]
pub fn allocate_single(row: &UnitRow, requested: u64) -> Option<UnitRow> {
    let taken = requested.min(row.quantity);
    (taken > 0).then_some(UnitRow::new(row.unit, row.level, taken))
}

/// Total units in a set of loss rows.
#[must_use]
pub fn total(losses: &[UnitRow]) -> u64 {
    losses.iter().map(|row| row.quantity).sum()
}

/// Split `take` (< `group_total`) across rows of one level.
fn split_proportionally(group: &[UnitRow], group_total: u64, take: u64) -> Vec<UnitRow> {
    let mut shares: Vec<(UnitRow, u128)> = group
        .iter()
        .map(|row| {
            let exact = u128::from(row.quantity) * u128::from(take);
            let whole = exact / u128::from(group_total);
            let dropped = exact % u128::from(group_total);
            (UnitRow::new(row.unit, row.level, whole as u64), dropped)
        })
        .collect();

    let assigned: u64 = shares.iter().map(|(row, _)| row.quantity).sum();
    let mut leftover = take - assigned;

    let mut order: Vec<usize> = (0..shares.len()).collect();
    order.sort_by(|&a, &b| shares[b].1.cmp(&shares[a].1).then(a.cmp(&b)));

    for index in order.into_iter().cycle() {
        if leftover == 0 {
            break;
        }
        let capacity = group[index].quantity;
        let share = &mut shares[index].0;
        if share.quantity < capacity {
            share.quantity += 1;
            leftover -= 1;
        }
    }

    shares.into_iter().map(|(row, _)| row).collect()
}
