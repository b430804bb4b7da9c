#![forbid(unsafe_code)]

//! Sorted-vector helpers over a caller-supplied total order.
//!
//! Interning in this crate is "binary search, insert on miss" over plain
//! vectors. The order is always supplied by the caller, so the same helpers
//! serve both per-source reference lists and per-section intersection lists.
//!
//! Probes follow the `binary_search_by` convention: the closure receives an
//! element of the slice and returns how that element compares to the needle.

use std::cmp::Ordering;

use smallvec::SmallVec;

/// Outcome of [`locate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// An equal element lives at this index.
    Found(usize),
    /// No equal element; inserting at this index keeps the order.
    Vacant(usize),
}

/// Binary-search a sorted slice.
pub fn locate<T>(items: &[T], probe: impl FnMut(&T) -> Ordering) -> Slot {
    match items.binary_search_by(probe) {
        Ok(index) => Slot::Found(index),
        Err(index) => Slot::Vacant(index),
    }
}

/// Find the element equal to the needle described by `probe`.
pub fn find_sorted<T>(items: &[T], probe: impl FnMut(&T) -> Ordering) -> Option<&T> {
    match locate(items, probe) {
        Slot::Found(index) => Some(&items[index]),
        Slot::Vacant(_) => None,
    }
}

/// Insert `item` unless an equal element exists. Returns `true` on insert.
pub fn insert_sorted<T>(
    items: &mut Vec<T>,
    item: T,
    compare: impl Fn(&T, &T) -> Ordering,
) -> bool {
    match locate(items, |probe| compare(probe, &item)) {
        Slot::Found(_) => false,
        Slot::Vacant(index) => {
            items.insert(index, item);
            true
        }
    }
}

/// Return the existing element matching `probe`, or insert the one built by
/// `make` at the sorted position. The flag is `true` when `make` ran.
pub fn get_or_insert_sorted<T: Copy>(
    items: &mut Vec<T>,
    probe: impl FnMut(&T) -> Ordering,
    make: impl FnOnce() -> T,
) -> (T, bool) {
    match locate(items, probe) {
        Slot::Found(index) => (items[index], false),
        Slot::Vacant(index) => {
            let item = make();
            items.insert(index, item);
            (item, true)
        }
    }
}

/// Merge two sorted, duplicate-free slices into one.
pub fn union_sorted<T: Copy>(
    a: &[T],
    b: &[T],
    compare: impl Fn(&T, &T) -> Ordering,
) -> SmallVec<[T; 4]> {
    let mut out = SmallVec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match compare(&a[i], &b[j]) {
            Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            Ordering::Greater => {
                out.push(b[j]);
                j += 1;
            }
            Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_keeps_order_and_rejects_duplicates() {
        let mut items = Vec::new();
        for value in [5, 1, 3, 1, 5, 4] {
            insert_sorted(&mut items, value, i32::cmp);
        }
        assert_eq!(items, vec![1, 3, 4, 5]);
    }

    #[test]
    fn find_uses_the_supplied_order() {
        let items = vec!["a", "bb", "ccc"];
        let by_len = |s: &&str| s.len();
        assert_eq!(
            find_sorted(&items, |probe| by_len(probe).cmp(&2)),
            Some(&"bb")
        );
        assert_eq!(find_sorted(&items, |probe| by_len(probe).cmp(&4)), None);
    }

    #[test]
    fn get_or_insert_reports_insertion() {
        let mut items = vec![2, 4];
        assert_eq!(get_or_insert_sorted(&mut items, |p| p.cmp(&3), || 3), (3, true));
        assert_eq!(get_or_insert_sorted(&mut items, |p| p.cmp(&4), || 99), (4, false));
        assert_eq!(items, vec![2, 3, 4]);
    }

    #[test]
    fn union_merges_without_duplicates() {
        let merged = union_sorted(&[1, 3, 5], &[2, 3, 6], i32::cmp);
        assert_eq!(merged.as_slice(), &[1, 2, 3, 5, 6]);
        assert!(union_sorted::<i32>(&[], &[], i32::cmp).is_empty());
    }
}
