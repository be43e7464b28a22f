use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::KeyField;
use crate::ingest::parse_grade;
use crate::models::{StudentKey, StudentRecord};
use crate::schema::RosterField;
use crate::sort::{SortDirection, SortSpec, SortState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    #[default]
    Multi,
    Single,
}

/// Imported records plus the browsing state over them. Sorting and selection
/// never touch the records themselves.
#[derive(Debug, Clone)]
pub struct RosterStore {
    records: Vec<StudentRecord>,
    key_field: KeyField,
    mode: SelectionMode,
    selected: BTreeSet<StudentKey>,
    sort: SortState<RosterField>,
}

impl RosterStore {
    pub fn new(key_field: KeyField, mode: SelectionMode) -> Self {
        RosterStore {
            records: Vec::new(),
            key_field,
            mode,
            selected: BTreeSet::new(),
            sort: SortState::default(),
        }
    }

    pub fn records(&self) -> &[StudentRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn key_of(&self, record: &StudentRecord) -> StudentKey {
        self.key_field.key_of(record)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.iter().any(|record| self.key_field.key_of(record) == key)
    }

    pub fn find(&self, key: &str) -> Option<&StudentRecord> {
        self.records
            .iter()
            .find(|record| self.key_field.key_of(record) == key)
    }

    /// Swaps in a freshly imported roster and resets selection and sort.
    pub fn replace(&mut self, records: Vec<StudentRecord>) {
        let mut seen = HashSet::new();
        for record in &records {
            let key = self.key_field.key_of(record);
            if !seen.insert(key.clone()) {
                warn!(key = %key, "duplicate roster key; selection will cover every matching row");
            }
        }
        self.records = records;
        self.selected.clear();
        self.sort.reset();
    }

    pub fn sort_spec(&self) -> Option<SortSpec<RosterField>> {
        self.sort.current()
    }

    pub fn sort_by(&mut self, field: RosterField, direction: SortDirection) {
        self.sort.set(field, direction);
        debug!(?field, ?direction, "roster sort set");
    }

    /// Header-click sort: the same field flips direction, a new field starts ascending.
    pub fn toggle_sort(&mut self, field: RosterField) -> SortSpec<RosterField> {
        let spec = self.sort.toggle(field);
        debug!(field = ?spec.field, direction = ?spec.direction, "roster sort toggled");
        spec
    }

    pub fn view(&self) -> Vec<&StudentRecord> {
        self.sort
            .order(&self.records, compare_records)
            .into_iter()
            .map(|index| &self.records[index])
            .collect()
    }

    pub fn selection_mode(&self) -> SelectionMode {
        self.mode
    }

    pub fn set_selection_mode(&mut self, mode: SelectionMode) {
        if mode != self.mode {
            self.mode = mode;
            self.selected.clear();
        }
    }

    pub fn selected(&self) -> &BTreeSet<StudentKey> {
        &self.selected
    }

    pub fn is_selected(&self, key: &str) -> bool {
        self.selected.contains(key)
    }

    /// Returns whether `key` is selected afterwards. Keys not on the roster are ignored.
    pub fn toggle_selection(&mut self, key: &str) -> bool {
        if !self.contains(key) {
            debug!(key, "ignoring selection of unknown key");
            return false;
        }
        let now_selected = if self.selected.remove(key) {
            false
        } else {
            if self.mode == SelectionMode::Single {
                self.selected.clear();
            }
            self.selected.insert(key.to_string());
            true
        };
        debug!(key, now_selected, mode = ?self.mode, "selection toggled");
        now_selected
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }
}

impl Default for RosterStore {
    fn default() -> Self {
        RosterStore::new(KeyField::default(), SelectionMode::default())
    }
}

/// Unparseable timestamps order after every valid one in either direction.
pub fn compare_records(
    a: &StudentRecord,
    b: &StudentRecord,
    spec: SortSpec<RosterField>,
) -> Ordering {
    let ordering = match spec.field {
        RosterField::Name => a.name.cmp(&b.name),
        RosterField::Email => a.email.cmp(&b.email),
        RosterField::Feedback => a.feedback.cmp(&b.feedback),
        RosterField::Grade => parse_grade(&a.grade).cmp(&parse_grade(&b.grade)),
        RosterField::Timestamp => match (a.submitted_at, b.submitted_at) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => return Ordering::Less,
            (None, Some(_)) => return Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
    };
    spec.direction.apply(ordering)
}
