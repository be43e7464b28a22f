use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn flipped(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }

    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec<F> {
    pub field: F,
    pub direction: SortDirection,
}

/// Column sort state with header-click semantics: the same field flips the
/// direction, a different field starts ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortState<F> {
    initial: Option<SortSpec<F>>,
    current: Option<SortSpec<F>>,
}

impl<F: Copy + PartialEq> SortState<F> {
    pub fn new(initial: Option<SortSpec<F>>) -> Self {
        SortState {
            initial,
            current: initial,
        }
    }

    pub fn current(&self) -> Option<SortSpec<F>> {
        self.current
    }

    pub fn set(&mut self, field: F, direction: SortDirection) {
        self.current = Some(SortSpec { field, direction });
    }

    pub fn toggle(&mut self, field: F) -> SortSpec<F> {
        let direction = match self.current {
            Some(spec) if spec.field == field => spec.direction.flipped(),
            _ => SortDirection::Asc,
        };
        let spec = SortSpec { field, direction };
        self.current = Some(spec);
        spec
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    /// Returns indices into `items` in view order. Ties keep stored order.
    ///
    /// `compare` receives the full spec and is responsible for the direction, so
    /// a field can pin some values to the end regardless of it.
    pub fn order<T>(
        &self,
        items: &[T],
        compare: impl Fn(&T, &T, SortSpec<F>) -> Ordering,
    ) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..items.len()).collect();
        if let Some(spec) = self.current {
            indices.sort_by(|&a, &b| compare(&items[a], &items[b], spec));
        }
        indices
    }
}

impl<F: Copy + PartialEq> Default for SortState<F> {
    fn default() -> Self {
        SortState::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Col {
        A,
        B,
    }

    #[test]
    fn same_field_flips_and_new_field_resets() {
        let mut state = SortState::default();
        assert_eq!(state.toggle(Col::A).direction, SortDirection::Asc);
        assert_eq!(state.toggle(Col::A).direction, SortDirection::Desc);
        assert_eq!(state.toggle(Col::B).direction, SortDirection::Asc);
        assert_eq!(state.toggle(Col::A).direction, SortDirection::Asc);
    }

    #[test]
    fn reset_restores_initial_spec() {
        let initial = SortSpec {
            field: Col::B,
            direction: SortDirection::Asc,
        };
        let mut state = SortState::new(Some(initial));
        state.toggle(Col::B);
        state.reset();
        assert_eq!(state.current(), Some(initial));
    }

    #[test]
    fn order_is_stable_on_ties() {
        let items = [(1, 'x'), (0, 'y'), (1, 'z')];
        let mut state = SortState::default();
        state.set(Col::A, SortDirection::Desc);
        let order = state.order(&items, |a, b, spec| spec.direction.apply(a.0.cmp(&b.0)));
        assert_eq!(order, vec![0, 2, 1]);
    }
}
