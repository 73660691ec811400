#![deny(warnings)]

//! Contiguous-index ordering for sibling records.
//!
//! Line items are ordered within their group (`index_in_group`) and groups
//! within their category inside an area (`index_in_category`). Indices in a
//! scope are always exactly `0..n`. Every operation takes a snapshot of the
//! siblings and returns the fully renumbered set, so the same call predicts
//! the order on the client and produces the authoritative order on the
//! server.

pub mod optimistic;

pub use optimistic::Optimistic;

use budget_core::{Area, CategoryId, Group, GroupId, LineItem, LineItemId};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// A record carrying an integer position among its siblings.
pub trait Sibling: Clone {
    type Id: Clone + PartialEq + fmt::Display;

    fn sibling_id(&self) -> &Self::Id;
    fn position(&self) -> u32;
    fn set_position(&mut self, index: u32);
}

impl Sibling for LineItem {
    type Id = LineItemId;

    fn sibling_id(&self) -> &LineItemId {
        &self.id
    }

    fn position(&self) -> u32 {
        self.index_in_group
    }

    fn set_position(&mut self, index: u32) {
        self.index_in_group = index;
    }
}

impl Sibling for Group {
    type Id = GroupId;

    fn sibling_id(&self) -> &GroupId {
        &self.id
    }

    fn position(&self) -> u32 {
        self.index_in_category
    }

    fn set_position(&mut self, index: u32) {
        self.index_in_category = index;
    }
}

/// Errors produced by ordering operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    /// The id is absent from the snapshot; the caller's cache is out of sync.
    #[error("sibling not found: {0}")]
    SiblingNotFound(String),
    /// Target index outside `[0, len)`. Never clamped.
    #[error("index {index} out of range for {len} siblings")]
    IndexOutOfRange { index: u32, len: usize },
    #[error("sibling already present: {0}")]
    DuplicateSibling(String),
    #[error("duplicate index {0}")]
    DuplicateIndex(u32),
    #[error("index gap: expected {expected}, found {found}")]
    Gap { expected: u32, found: u32 },
    /// Record exists but belongs to another group or category.
    #[error("{0} does not belong to the requested scope")]
    ScopeMismatch(String),
    /// Scope holds more siblings than a `u32` index can address.
    #[error("{0} siblings exceed the index range")]
    TooManySiblings(usize),
}

/// One position change to persist.
///
/// `old_index` is `None` for a sibling that did not exist before.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexUpdate<Id> {
    pub id: Id,
    pub old_index: Option<u32>,
    pub new_index: u32,
}

fn index_for_len(len: usize) -> Result<u32, OrderError> {
    u32::try_from(len).map_err(|_| OrderError::TooManySiblings(len))
}

/// Index a newly created sibling receives: the number of existing siblings.
pub fn next_index<T: Sibling>(siblings: &[T]) -> Result<u32, OrderError> {
    index_for_len(siblings.len())
}

/// Check that positions are exactly `0..n` with no duplicates.
pub fn validate_contiguous<T: Sibling>(siblings: &[T]) -> Result<(), OrderError> {
    let mut positions: Vec<u32> = siblings.iter().map(|s| s.position()).collect();
    positions.sort_unstable();
    for (expected, &found) in (0u32..).zip(&positions) {
        if found < expected {
            return Err(OrderError::DuplicateIndex(found));
        }
        if found > expected {
            return Err(OrderError::Gap { expected, found });
        }
    }
    Ok(())
}

/// Stable sort by position. Ties mean the data is corrupt and are logged.
pub fn sort_by_index<T: Sibling>(items: &mut [T]) {
    items.sort_by_key(|s| s.position());
    for pair in items.windows(2) {
        if pair[0].position() == pair[1].position() {
            warn!(
                index = pair[0].position(),
                first = %pair[0].sibling_id(),
                second = %pair[1].sibling_id(),
                "siblings share an index"
            );
        }
    }
}

/// Groups of `category`, in their stored order.
pub fn filter_by_category<'a>(groups: &'a [Group], category: &CategoryId) -> Vec<&'a Group> {
    groups.iter().filter(|g| &g.category_id == category).collect()
}

fn find<'a, T: Sibling>(siblings: &'a [T], id: &T::Id) -> Result<&'a T, OrderError> {
    siblings
        .iter()
        .find(|s| s.sibling_id() == id)
        .ok_or_else(|| OrderError::SiblingNotFound(id.to_string()))
}

/// Move `moving` to `new_index`, shifting the siblings in between one slot
/// toward the vacated position.
///
/// Returns the whole set sorted by index. Moving to the current index
/// returns the set unchanged.
pub fn reorder<T: Sibling>(
    siblings: &[T],
    moving: &T::Id,
    new_index: u32,
) -> Result<Vec<T>, OrderError> {
    let old_index = find(siblings, moving)?.position();
    if new_index as usize >= siblings.len() {
        return Err(OrderError::IndexOutOfRange {
            index: new_index,
            len: siblings.len(),
        });
    }
    validate_contiguous(siblings)?;

    let mut next = siblings.to_vec();
    if old_index == new_index {
        return Ok(next);
    }
    let (low, high) = (old_index.min(new_index), old_index.max(new_index));
    let forward = old_index < new_index;
    for sibling in next.iter_mut() {
        let pos = sibling.position();
        if sibling.sibling_id() == moving {
            sibling.set_position(new_index);
        } else if (low..=high).contains(&pos) {
            sibling.set_position(if forward { pos - 1 } else { pos + 1 });
        }
    }
    sort_by_index(&mut next);
    debug!(sibling = %moving, from = old_index, to = new_index, "reordered");
    Ok(next)
}

/// Add `item` at the end of the scope, then move it to `at` when given.
pub fn insert<T: Sibling>(
    siblings: &[T],
    mut item: T,
    at: Option<u32>,
) -> Result<Vec<T>, OrderError> {
    validate_contiguous(siblings)?;
    let id = item.sibling_id().clone();
    if siblings.iter().any(|s| s.sibling_id() == &id) {
        return Err(OrderError::DuplicateSibling(id.to_string()));
    }
    let end = next_index(siblings)?;
    item.set_position(end);
    let mut next = siblings.to_vec();
    next.push(item);
    sort_by_index(&mut next);
    match at {
        Some(index) if index != end => reorder(&next, &id, index),
        _ => Ok(next),
    }
}

/// Remove `id` and close the gap it leaves.
///
/// Returns the remaining siblings and the removed record (with its old index).
pub fn remove<T: Sibling>(siblings: &[T], id: &T::Id) -> Result<(Vec<T>, T), OrderError> {
    let slot = siblings
        .iter()
        .position(|s| s.sibling_id() == id)
        .ok_or_else(|| OrderError::SiblingNotFound(id.to_string()))?;
    validate_contiguous(siblings)?;
    let mut next = siblings.to_vec();
    let removed = next.remove(slot);
    let gap = removed.position();
    for sibling in next.iter_mut() {
        let pos = sibling.position();
        if pos > gap {
            sibling.set_position(pos - 1);
        }
    }
    sort_by_index(&mut next);
    Ok((next, removed))
}

/// Position changes between two snapshots of the same scope.
///
/// This is exactly what the persistence layer writes after a move; siblings
/// whose index did not change are omitted.
pub fn index_updates<T: Sibling>(before: &[T], after: &[T]) -> Vec<IndexUpdate<T::Id>> {
    after
        .iter()
        .filter_map(|a| {
            let old_index = before
                .iter()
                .find(|b| b.sibling_id() == a.sibling_id())
                .map(|b| b.position());
            (old_index != Some(a.position())).then(|| IndexUpdate {
                id: a.sibling_id().clone(),
                old_index,
                new_index: a.position(),
            })
        })
        .collect()
}

/// Reorder a line item within its group.
pub fn reorder_line_items(
    group: &Group,
    line_item: &LineItemId,
    new_index: u32,
) -> Result<Group, OrderError> {
    let item = find(&group.line_items, line_item)?;
    if item.group_id != group.id {
        return Err(OrderError::ScopeMismatch(line_item.to_string()));
    }
    let mut next = group.clone();
    next.line_items = reorder(&group.line_items, line_item, new_index)?;
    Ok(next)
}

/// Move a line item into another group, appending it or placing it at `at`.
///
/// Within the same group this is a plain reorder, to the end when `at` is
/// `None`. Returns the updated `(from, to)` groups.
pub fn move_line_item(
    from: &Group,
    to: &Group,
    line_item: &LineItemId,
    at: Option<u32>,
) -> Result<(Group, Group), OrderError> {
    if from.id == to.id {
        let last = next_index(&from.line_items)?.saturating_sub(1);
        let group = reorder_line_items(from, line_item, at.unwrap_or(last))?;
        return Ok((group.clone(), group));
    }
    if find(&from.line_items, line_item)?.group_id != from.id {
        return Err(OrderError::ScopeMismatch(line_item.to_string()));
    }
    let (rest, mut item) = remove(&from.line_items, line_item)?;
    item.group_id = to.id.clone();
    let target = insert(&to.line_items, item, at)?;

    let mut source = from.clone();
    source.line_items = rest;
    let mut dest = to.clone();
    dest.line_items = target;
    debug!(line_item = %line_item, from = %from.id, to = %to.id, "moved line item");
    Ok((source, dest))
}

fn category_scope(area: &Area, category: &CategoryId) -> Vec<Group> {
    filter_by_category(&area.groups, category)
        .into_iter()
        .cloned()
        .collect()
}

// Swap the groups of `category` for `scope`, keeping them where the
// category's first group sat.
fn replace_scope(area: &Area, category: &CategoryId, scope: Vec<Group>) -> Area {
    let mut next = area.clone();
    let anchor = next
        .groups
        .iter()
        .position(|g| &g.category_id == category)
        .unwrap_or(next.groups.len());
    next.groups.retain(|g| &g.category_id != category);
    let anchor = anchor.min(next.groups.len());
    next.groups.splice(anchor..anchor, scope);
    next
}

/// Reorder a group among the groups of `category` in `area`.
///
/// Groups of other categories are untouched.
pub fn reorder_groups(
    area: &Area,
    category: &CategoryId,
    group: &GroupId,
    new_index: u32,
) -> Result<Area, OrderError> {
    let scope = category_scope(area, category);
    if find(&scope, group).is_err() {
        find(&area.groups, group)?;
        return Err(OrderError::ScopeMismatch(group.to_string()));
    }
    let reordered = reorder(&scope, group, new_index)?;
    Ok(replace_scope(area, category, reordered))
}

/// Move a group to another category of the same area.
///
/// The old category closes its gap; the group is appended to the new one and
/// then placed at `at` when given.
pub fn move_group(
    area: &Area,
    group: &GroupId,
    category: &CategoryId,
    at: Option<u32>,
) -> Result<Area, OrderError> {
    let from = find(&area.groups, group)?.category_id.clone();
    if &from == category {
        let last = next_index(&category_scope(area, category))?.saturating_sub(1);
        return reorder_groups(area, category, group, at.unwrap_or(last));
    }
    let (source, mut moved) = remove(&category_scope(area, &from), group)?;
    moved.category_id = category.clone();
    let target = insert(&category_scope(area, category), moved, at)?;

    let next = replace_scope(area, &from, source);
    debug!(group = %group, from = %from, to = %category, "moved group");
    Ok(replace_scope(&next, category, target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use budget_core::AreaId;
    use proptest::prelude::*;

    fn items(n: u32) -> Vec<LineItem> {
        (0..n)
            .map(|i| LineItem {
                id: LineItemId(format!("li-{i}")),
                group_id: GroupId::from("g-1"),
                name: format!("Item {i}"),
                quantity: None,
                margin_decimal: None,
                index_in_group: i,
                selected_option_id: None,
                options: vec![],
            })
            .collect()
    }

    fn order(items: &[LineItem]) -> Vec<(String, u32)> {
        items.iter().map(|i| (i.id.0.clone(), i.index_in_group)).collect()
    }

    fn group(id: &str, category: &str, index: u32) -> Group {
        Group {
            id: GroupId::from(id),
            area_id: AreaId::from("a-1"),
            category_id: CategoryId::from(category),
            name: id.to_string(),
            index_in_category: index,
            line_items: vec![],
        }
    }

    fn area() -> Area {
        Area {
            id: AreaId::from("a-1"),
            name: "Kitchen".to_string(),
            groups: vec![
                group("cab-0", "cab", 0),
                group("plb-0", "plb", 0),
                group("cab-1", "cab", 1),
                group("plb-1", "plb", 1),
                group("cab-2", "cab", 2),
            ],
        }
    }

    fn indices(area: &Area, category: &str) -> Vec<(String, u32)> {
        let mut scope = category_scope(area, &CategoryId::from(category));
        sort_by_index(&mut scope);
        scope.iter().map(|g| (g.id.0.clone(), g.index_in_category)).collect()
    }

    #[test]
    fn move_last_to_second_shifts_window() {
        let before = items(5);
        let after = reorder(&before, &LineItemId::from("li-4"), 1).unwrap();
        assert_eq!(
            order(&after),
            vec![
                ("li-0".to_string(), 0),
                ("li-4".to_string(), 1),
                ("li-1".to_string(), 2),
                ("li-2".to_string(), 3),
                ("li-3".to_string(), 4),
            ]
        );
    }

    #[test]
    fn forward_move_decrements_window() {
        let after = reorder(&items(4), &LineItemId::from("li-0"), 2).unwrap();
        assert_eq!(
            order(&after),
            vec![
                ("li-1".to_string(), 0),
                ("li-2".to_string(), 1),
                ("li-0".to_string(), 2),
                ("li-3".to_string(), 3),
            ]
        );
    }

    #[test]
    fn same_index_is_noop() {
        let before = items(3);
        assert_eq!(reorder(&before, &LineItemId::from("li-1"), 1).unwrap(), before);
    }

    #[test]
    fn unknown_sibling_fails() {
        assert_eq!(
            reorder(&items(3), &LineItemId::from("li-9"), 0),
            Err(OrderError::SiblingNotFound("li-9".to_string()))
        );
    }

    #[test]
    fn out_of_range_is_not_clamped() {
        assert_eq!(
            reorder(&items(3), &LineItemId::from("li-0"), 3),
            Err(OrderError::IndexOutOfRange { index: 3, len: 3 })
        );
    }

    #[test]
    fn non_contiguous_snapshot_is_rejected() {
        let mut broken = items(3);
        broken[2].index_in_group = 5;
        assert_eq!(
            reorder(&broken, &LineItemId::from("li-0"), 1),
            Err(OrderError::Gap {
                expected: 2,
                found: 5
            })
        );
        broken[2].index_in_group = 1;
        assert_eq!(
            validate_contiguous(&broken),
            Err(OrderError::DuplicateIndex(1))
        );
    }

    #[test]
    fn insert_appends_then_places() {
        let mut fresh = items(4).remove(3);
        fresh.id = LineItemId::from("new");
        let appended = insert(&items(3), fresh.clone(), None).unwrap();
        assert_eq!(appended.last().unwrap().id.0, "new");
        assert_eq!(appended.last().unwrap().index_in_group, 3);

        let placed = insert(&items(3), fresh, Some(0)).unwrap();
        assert_eq!(placed[0].id.0, "new");
        validate_contiguous(&placed).unwrap();
        assert_eq!(placed[1].id.0, "li-0");
    }

    #[test]
    fn insert_rejects_existing_id() {
        let dup = items(3).remove(1);
        assert_eq!(
            insert(&items(3), dup, None),
            Err(OrderError::DuplicateSibling("li-1".to_string()))
        );
    }

    #[test]
    fn remove_closes_gap() {
        let (rest, removed) = remove(&items(4), &LineItemId::from("li-1")).unwrap();
        assert_eq!(removed.index_in_group, 1);
        assert_eq!(
            order(&rest),
            vec![
                ("li-0".to_string(), 0),
                ("li-2".to_string(), 1),
                ("li-3".to_string(), 2),
            ]
        );
    }

    #[test]
    fn index_updates_lists_only_changes() {
        let before = items(5);
        let after = reorder(&before, &LineItemId::from("li-3"), 1).unwrap();
        let updates = index_updates(&before, &after);
        assert_eq!(updates.len(), 3);
        assert!(updates.contains(&IndexUpdate {
            id: LineItemId::from("li-3"),
            old_index: Some(3),
            new_index: 1,
        }));
        assert!(!updates.iter().any(|u| u.id.0 == "li-0" || u.id.0 == "li-4"));
    }

    #[test]
    fn sort_by_index_is_stable() {
        let mut scrambled = items(4);
        scrambled.reverse();
        sort_by_index(&mut scrambled);
        assert_eq!(scrambled[0].id.0, "li-0");
        let mut tied = items(2);
        tied[1].index_in_group = 0;
        sort_by_index(&mut tied);
        assert_eq!(tied[0].id.0, "li-0");
    }

    #[test]
    fn group_reorder_stays_in_category() {
        let a = area();
        let cab = CategoryId::from("cab");
        let next = reorder_groups(&a, &cab, &GroupId::from("cab-2"), 0).unwrap();
        assert_eq!(
            indices(&next, "cab"),
            vec![
                ("cab-2".to_string(), 0),
                ("cab-0".to_string(), 1),
                ("cab-1".to_string(), 2),
            ]
        );
        assert_eq!(indices(&next, "plb"), indices(&a, "plb"));
        assert_eq!(next.groups.len(), a.groups.len());
    }

    #[test]
    fn group_from_other_category_is_scope_mismatch() {
        let cab = CategoryId::from("cab");
        assert_eq!(
            reorder_groups(&area(), &cab, &GroupId::from("plb-1"), 0),
            Err(OrderError::ScopeMismatch("plb-1".to_string()))
        );
        assert_eq!(
            reorder_groups(&area(), &cab, &GroupId::from("nope"), 0),
            Err(OrderError::SiblingNotFound("nope".to_string()))
        );
    }

    #[test]
    fn move_group_between_categories() {
        let plb = CategoryId::from("plb");
        let next = move_group(&area(), &GroupId::from("cab-1"), &plb, Some(0)).unwrap();
        assert_eq!(
            indices(&next, "cab"),
            vec![("cab-0".to_string(), 0), ("cab-2".to_string(), 1)]
        );
        assert_eq!(
            indices(&next, "plb"),
            vec![
                ("cab-1".to_string(), 0),
                ("plb-0".to_string(), 1),
                ("plb-1".to_string(), 2),
            ]
        );
    }

    #[test]
    fn move_group_appends_by_default() {
        let cab = CategoryId::from("cab");
        let next = move_group(&area(), &GroupId::from("plb-0"), &cab, None).unwrap();
        assert_eq!(
            indices(&next, "cab").last().unwrap(),
            &("plb-0".to_string(), 3)
        );
        assert_eq!(indices(&next, "plb"), vec![("plb-1".to_string(), 0)]);
    }

    #[test]
    fn move_group_within_category_reorders() {
        let a = area();
        let cab = CategoryId::from("cab");
        let to_end = move_group(&a, &GroupId::from("cab-0"), &cab, None).unwrap();
        assert_eq!(
            indices(&to_end, "cab"),
            vec![
                ("cab-1".to_string(), 0),
                ("cab-2".to_string(), 1),
                ("cab-0".to_string(), 2),
            ]
        );
        assert_eq!(indices(&to_end, "plb"), indices(&a, "plb"));

        let placed = move_group(&a, &GroupId::from("cab-2"), &cab, Some(1)).unwrap();
        assert_eq!(
            indices(&placed, "cab"),
            vec![
                ("cab-0".to_string(), 0),
                ("cab-2".to_string(), 1),
                ("cab-1".to_string(), 2),
            ]
        );
    }

    #[test]
    fn move_line_item_between_groups() {
        let mut from = group("g-1", "cab", 0);
        from.line_items = items(3);
        let mut to = group("g-2", "cab", 1);
        to.line_items = items(2)
            .into_iter()
            .map(|mut li| {
                li.id = LineItemId(format!("other-{}", li.index_in_group));
                li.group_id = GroupId::from("g-2");
                li
            })
            .collect();

        let moving = LineItemId::from("li-0");
        let (src, dst) = move_line_item(&from, &to, &moving, Some(1)).unwrap();
        assert_eq!(
            order(&src.line_items),
            vec![("li-1".to_string(), 0), ("li-2".to_string(), 1)]
        );
        assert_eq!(
            order(&dst.line_items),
            vec![
                ("other-0".to_string(), 0),
                ("li-0".to_string(), 1),
                ("other-1".to_string(), 2),
            ]
        );
        assert_eq!(dst.line_items[1].group_id, GroupId::from("g-2"));
    }

    #[test]
    fn move_line_item_within_group_defaults_to_end() {
        let mut g = group("g-1", "cab", 0);
        g.line_items = items(3);
        let (src, dst) = move_line_item(&g, &g, &LineItemId::from("li-0"), None).unwrap();
        assert_eq!(src, dst);
        assert_eq!(
            order(&dst.line_items),
            vec![
                ("li-1".to_string(), 0),
                ("li-2".to_string(), 1),
                ("li-0".to_string(), 2),
            ]
        );

        let (_, placed) = move_line_item(&g, &g, &LineItemId::from("li-2"), Some(0)).unwrap();
        assert_eq!(placed.line_items[0].id.0, "li-2");
    }

    #[test]
    fn move_line_item_with_foreign_group_id_is_rejected() {
        let mut from = group("g-1", "cab", 0);
        from.line_items = items(2);
        from.line_items[0].group_id = GroupId::from("g-9");
        let to = group("g-2", "cab", 1);
        assert_eq!(
            move_line_item(&from, &to, &LineItemId::from("li-0"), None),
            Err(OrderError::ScopeMismatch("li-0".to_string()))
        );
        assert_eq!(
            move_line_item(&from, &to, &LineItemId::from("li-7"), None),
            Err(OrderError::SiblingNotFound("li-7".to_string()))
        );
    }

    #[test]
    fn next_index_is_sibling_count() {
        assert_eq!(next_index(&items(3)), Ok(3));
        assert_eq!(next_index::<LineItem>(&[]), Ok(0));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn index_beyond_u32_is_an_error() {
        let len = u32::MAX as usize + 1;
        assert_eq!(index_for_len(len), Err(OrderError::TooManySiblings(len)));
        assert_eq!(index_for_len(u32::MAX as usize), Ok(u32::MAX));
    }

    #[test]
    fn line_item_with_foreign_group_id_is_rejected() {
        let mut g = group("g-1", "cab", 0);
        g.line_items = items(2);
        g.line_items[1].group_id = GroupId::from("g-9");
        assert_eq!(
            reorder_line_items(&g, &LineItemId::from("li-1"), 0),
            Err(OrderError::ScopeMismatch("li-1".to_string()))
        );
    }

    #[test]
    fn filter_keeps_only_category() {
        let a = area();
        let cab = filter_by_category(&a.groups, &CategoryId::from("cab"));
        assert_eq!(cab.len(), 3);
        assert!(cab.iter().all(|g| g.category_id.0 == "cab"));
    }

    proptest! {
        #[test]
        fn reorder_is_reversible(n in 1u32..20, a in 0u32..20, b in 0u32..20) {
            let (a, b) = (a % n, b % n);
            let before = items(n);
            let id = LineItemId(format!("li-{a}"));
            let moved = reorder(&before, &id, b).unwrap();
            let back = reorder(&moved, &id, a).unwrap();
            prop_assert_eq!(back, before);
        }

        #[test]
        fn reorder_sequences_stay_contiguous(
            n in 1u32..15,
            moves in proptest::collection::vec((0u32..15, 0u32..15), 0..30),
        ) {
            let mut current = items(n);
            for (who, to) in moves {
                let id = LineItemId(format!("li-{}", who % n));
                current = reorder(&current, &id, to % n).unwrap();
                prop_assert!(validate_contiguous(&current).is_ok());
                let positions: Vec<u32> = current.iter().map(|i| i.index_in_group).collect();
                prop_assert_eq!(positions, (0..n).collect::<Vec<_>>());
            }
        }

        #[test]
        fn remove_then_insert_restores_contiguity(
            n in 1u32..15,
            who in 0u32..15,
            at in 0u32..15,
        ) {
            let id = LineItemId(format!("li-{}", who % n));
            let (rest, removed) = remove(&items(n), &id).unwrap();
            prop_assert!(validate_contiguous(&rest).is_ok());
            let back = insert(&rest, removed, Some(at % n)).unwrap();
            prop_assert!(validate_contiguous(&back).is_ok());
            prop_assert_eq!(back.len() as u32, n);
        }
    }
}
