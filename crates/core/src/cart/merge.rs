//! Guest/remote cart reconciliation.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use super::{Cart, CartLine};

/// Merge two carts by line key.
///
/// - A key present on one side only is kept as-is.
/// - A key present on both sides gets the summed quantity (clamped at
///   `Quantity::MAX`) and the price snapshot with the later `added_at`; equal
///   timestamps take the higher price.
/// - The result is ordered by line key.
///
/// Both rules are symmetric, so `merge(a, b) == merge(b, a)`.
#[must_use]
pub fn merge(a: &Cart, b: &Cart) -> Cart {
    let mut merged: BTreeMap<_, CartLine> = BTreeMap::new();
    for line in a.lines.iter().chain(&b.lines) {
        match merged.entry(line.line_key.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(line.clone());
            }
            Entry::Occupied(mut slot) => {
                let combined = combine(slot.get(), line);
                slot.insert(combined);
            }
        }
    }
    Cart {
        lines: merged.into_values().collect(),
    }
}

fn combine(a: &CartLine, b: &CartLine) -> CartLine {
    let newest = if (b.added_at, b.unit_price) > (a.added_at, a.unit_price) {
        b
    } else {
        a
    };
    CartLine {
        quantity: a.quantity.saturating_add(b.quantity),
        ..newest.clone()
    }
}
