//! # Multi-Selection
//!
//! Selection over an externally supplied, ordered id list. The model stores
//! membership plus one anchor index; the list itself is always passed in, so
//! the model never holds a stale copy of it.

use std::collections::HashSet;
use std::hash::Hash;

/// Modifier keys held during a click.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub shift: bool,
    /// Ctrl on most platforms, Cmd on macOS
    pub ctrl: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        shift: false,
        ctrl: false,
    };
    pub const SHIFT: Modifiers = Modifiers {
        shift: true,
        ctrl: false,
    };
    pub const CTRL: Modifiers = Modifiers {
        shift: false,
        ctrl: true,
    };
    pub const SHIFT_CTRL: Modifiers = Modifiers {
        shift: true,
        ctrl: true,
    };
}

#[derive(Debug, Clone)]
pub struct SelectionModel<Id> {
    selected: HashSet<Id>,
    anchor: Option<usize>,
}

impl<Id> Default for SelectionModel<Id> {
    fn default() -> Self {
        Self {
            selected: HashSet::new(),
            anchor: None,
        }
    }
}

impl<Id> SelectionModel<Id>
where
    Id: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a click on `id` at `index` of `list`.
    ///
    /// Shift takes precedence over ctrl: shift selects the range between the
    /// anchor and `index` (added to the selection when ctrl is also held),
    /// ctrl alone toggles `id`, and a plain click selects only `id` unless it
    /// already is the sole selection, in which case the selection clears.
    /// The anchor always moves to `index`.
    pub fn toggle(&mut self, id: &Id, index: usize, modifiers: Modifiers, list: &[Id]) {
        if modifiers.shift {
            let anchor = self.anchor.unwrap_or(index);
            let range = range_ids(list, anchor, index);
            if modifiers.ctrl {
                self.selected.extend(range);
            } else {
                self.selected = range.collect();
            }
        } else if modifiers.ctrl {
            if !self.selected.remove(id) {
                self.selected.insert(id.clone());
            }
        } else if self.selected.len() == 1 && self.selected.contains(id) {
            self.selected.clear();
        } else {
            self.selected.clear();
            self.selected.insert(id.clone());
        }

        self.anchor = Some(index);
    }

    /// Selects every id in `list`; the anchor moves to the last index.
    pub fn select_all(&mut self, list: &[Id]) {
        self.selected = list.iter().cloned().collect();
        self.anchor = list.len().checked_sub(1);
    }

    pub fn clear(&mut self) {
        self.selected.clear();
        self.anchor = None;
    }

    /// Drops selected ids that are no longer in `list`.
    ///
    /// Returns `true` when the selection changed. An anchor past the end of
    /// the new list is discarded.
    pub fn reconcile(&mut self, list: &[Id]) -> bool {
        let present: HashSet<&Id> = list.iter().collect();
        let before = self.selected.len();
        self.selected.retain(|id| present.contains(id));

        if self.anchor.is_some_and(|anchor| anchor >= list.len()) {
            self.anchor = None;
        }

        self.selected.len() != before
    }

    /// Selected ids in list order.
    pub fn selected_in_order(&self, list: &[Id]) -> Vec<Id> {
        list.iter()
            .filter(|id| self.selected.contains(id))
            .cloned()
            .collect()
    }

    pub fn is_selected(&self, id: &Id) -> bool {
        self.selected.contains(id)
    }

    pub fn selected(&self) -> &HashSet<Id> {
        &self.selected
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn anchor(&self) -> Option<usize> {
        self.anchor
    }
}

fn range_ids<Id: Clone>(list: &[Id], a: usize, b: usize) -> impl Iterator<Item = Id> + '_ {
    let start = a.min(b);
    let end = a.max(b).min(list.len().saturating_sub(1));
    list.iter()
        .enumerate()
        .filter(move |(i, _)| *i >= start && *i <= end)
        .map(|(_, id)| id.clone())
}
