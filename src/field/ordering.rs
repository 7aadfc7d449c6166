//! Field numbering by tab order
//!
//! Controls are sorted by `(tab index, or a sentinel when undeclared) + DOM index`.
//! The sentinel pushes undeclared controls after declared ones while keeping their
//! DOM order among themselves.

use crate::form::{Control, ControlId};

/// Order offset for controls without a declared tab index
pub const UNSET_TAB_INDEX: i64 = 100_500;

/// A control with its tab-order position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberedControl {
    pub id: ControlId,
    /// 1-based position in tab order
    pub field_number: usize,
    pub order: i64,
}

pub fn order_key(tab_index: i32, dom_index: usize) -> i64 {
    let base = if tab_index == 0 {
        UNSET_TAB_INDEX
    } else {
        tab_index as i64
    };
    base + dom_index as i64
}

/// Number every control by its position in tab order
pub fn number_controls(controls: &[Control]) -> Vec<NumberedControl> {
    let mut keyed: Vec<(ControlId, i64)> = controls
        .iter()
        .enumerate()
        .map(|(i, c)| (ControlId(i), order_key(c.tab_index, i)))
        .collect();

    // stable: equal keys keep DOM order
    keyed.sort_by_key(|&(_, order)| order);

    keyed
        .into_iter()
        .enumerate()
        .map(|(position, (id, order))| NumberedControl {
            id,
            field_number: position + 1,
            order,
        })
        .collect()
}
