use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::CatalogError;
use crate::models::{FeedbackRow, FeedbackRule, RuleDraft, RuleId, StudentKey};
use crate::sort::{SortDirection, SortSpec, SortState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CatalogField {
    Text,
    Deduction,
    Applied,
}

const DEFAULT_RULES: [(&str, f64); 4] = [
    ("Add more comments", 3.0),
    ("Poor indentation", 2.0),
    ("Looks good!", 0.0),
    ("No submission", 20.0),
];

/// Serializable catalog state: rule definitions and who has which rule applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub next_id: u64,
    pub rules: Vec<FeedbackRule>,
    pub applied: BTreeMap<StudentKey, Vec<RuleId>>,
}

/// Shared rule definitions plus a per-student ledger of applied rules.
///
/// A student has an entry in the ledger once they have been graded, even if the
/// entry is empty (a perfect score). The `applied` flag in [`FeedbackRow`] always
/// reflects the active student only.
#[derive(Debug, Clone)]
pub struct FeedbackCatalog {
    rules: Vec<FeedbackRule>,
    next_id: u64,
    applied: BTreeMap<StudentKey, BTreeSet<RuleId>>,
    active: Option<StudentKey>,
    sort: SortState<CatalogField>,
    adding: Option<RuleDraft>,
    editing: Option<(RuleId, RuleDraft)>,
}

impl FeedbackCatalog {
    pub fn new() -> Self {
        FeedbackCatalog {
            rules: Vec::new(),
            next_id: 1,
            applied: BTreeMap::new(),
            active: None,
            sort: SortState::new(Some(SortSpec {
                field: CatalogField::Text,
                direction: SortDirection::Asc,
            })),
            adding: None,
            editing: None,
        }
    }

    pub fn with_default_rules() -> Self {
        let mut catalog = FeedbackCatalog::new();
        for (text, deduction) in DEFAULT_RULES {
            catalog.push_rule(text.to_string(), deduction);
        }
        catalog
    }

    pub fn rules(&self) -> &[FeedbackRule] {
        &self.rules
    }

    pub fn rule(&self, id: RuleId) -> Option<&FeedbackRule> {
        self.rules.iter().find(|rule| rule.id == id)
    }

    fn push_rule(&mut self, text: String, deduction: f64) -> RuleId {
        let id = RuleId(self.next_id);
        self.next_id += 1;
        self.rules.push(FeedbackRule {
            id,
            text,
            deduction,
        });
        id
    }

    pub fn add(&mut self, text: &str, deduction: f64) -> Result<RuleId, CatalogError> {
        if text.trim().is_empty() {
            return Err(CatalogError::EmptyText);
        }
        check_deduction(deduction)?;
        let id = self.push_rule(text.to_string(), deduction);
        info!(%id, deduction, "feedback rule added");
        Ok(id)
    }

    /// Updates text and deduction in place. Applied state is untouched.
    pub fn edit(&mut self, id: RuleId, text: &str, deduction: f64) -> Result<(), CatalogError> {
        let rule = self
            .rules
            .iter_mut()
            .find(|rule| rule.id == id)
            .ok_or(CatalogError::NotFound(id))?;
        if text.trim().is_empty() {
            return Err(CatalogError::EmptyText);
        }
        check_deduction(deduction)?;
        rule.text = text.to_string();
        rule.deduction = deduction;
        info!(%id, deduction, "feedback rule edited");
        Ok(())
    }

    /// Removing an absent id is a no-op. Returns whether a rule was removed.
    pub fn delete(&mut self, id: RuleId) -> bool {
        let before = self.rules.len();
        self.rules.retain(|rule| rule.id != id);
        if self.rules.len() == before {
            debug!(%id, "delete of absent feedback rule ignored");
            return false;
        }
        for applied in self.applied.values_mut() {
            applied.remove(&id);
        }
        if matches!(self.editing, Some((editing, _)) if editing == id) {
            self.editing = None;
        }
        info!(%id, "feedback rule deleted");
        true
    }

    pub fn active_student(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn set_active_student(&mut self, key: Option<StudentKey>) {
        debug!(student = ?key, "catalog active student changed");
        self.active = key;
    }

    /// Flips the rule for the active student and returns the new flag.
    pub fn toggle_applied(&mut self, id: RuleId) -> Result<bool, CatalogError> {
        if self.rule(id).is_none() {
            return Err(CatalogError::NotFound(id));
        }
        let key = self.active.clone().ok_or(CatalogError::NoActiveStudent)?;
        let applied = self.applied.entry(key.clone()).or_default();
        let now_applied = if applied.remove(&id) {
            false
        } else {
            applied.insert(id);
            true
        };
        debug!(%id, student = %key, now_applied, "feedback toggled");
        Ok(now_applied)
    }

    pub fn is_applied(&self, id: RuleId) -> bool {
        self.active
            .as_ref()
            .and_then(|key| self.applied.get(key))
            .is_some_and(|applied| applied.contains(&id))
    }

    pub fn applied_for(&self, key: &str) -> Option<&BTreeSet<RuleId>> {
        self.applied.get(key)
    }

    pub fn is_graded(&self, key: &str) -> bool {
        self.applied.contains_key(key)
    }

    pub fn deductions_for(&self, key: &str) -> Vec<f64> {
        self.applied_rules_for(key)
            .into_iter()
            .map(|rule| rule.deduction)
            .collect()
    }

    /// Applied rules for `key` in catalog order.
    pub fn applied_rules_for(&self, key: &str) -> Vec<&FeedbackRule> {
        match self.applied.get(key) {
            Some(applied) => self
                .rules
                .iter()
                .filter(|rule| applied.contains(&rule.id))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Perfect score: nothing applied, but the student counts as graded.
    pub fn clear_applied(&mut self) -> Result<(), CatalogError> {
        let key = self.active.clone().ok_or(CatalogError::NoActiveStudent)?;
        self.applied.insert(key, BTreeSet::new());
        Ok(())
    }

    /// Drops every trace of grading for the active student.
    pub fn forget_active(&mut self) -> Result<(), CatalogError> {
        let key = self.active.as_ref().ok_or(CatalogError::NoActiveStudent)?;
        self.applied.remove(key);
        Ok(())
    }

    pub fn sort_spec(&self) -> Option<SortSpec<CatalogField>> {
        self.sort.current()
    }

    pub fn sort_by(&mut self, field: CatalogField, direction: SortDirection) {
        self.sort.set(field, direction);
    }

    pub fn toggle_sort(&mut self, field: CatalogField) -> SortSpec<CatalogField> {
        self.sort.toggle(field)
    }

    /// Sorted rows for the active student, with any edit draft attached to its row.
    pub fn view(&self) -> Vec<FeedbackRow> {
        let rows: Vec<FeedbackRow> = self
            .rules
            .iter()
            .map(|rule| FeedbackRow {
                id: rule.id,
                text: rule.text.clone(),
                deduction: rule.deduction,
                applied: self.is_applied(rule.id),
                draft: match &self.editing {
                    Some((id, draft)) if *id == rule.id => Some(draft.clone()),
                    _ => None,
                },
            })
            .collect();
        let order = self.sort.order(&rows, compare_rows);
        order.into_iter().map(|index| rows[index].clone()).collect()
    }

    pub fn add_draft(&self) -> Option<&RuleDraft> {
        self.adding.as_ref()
    }

    pub fn start_add(&mut self) {
        self.adding = Some(RuleDraft::default());
    }

    pub fn update_add_draft(
        &mut self,
        text: &str,
        deduction: Option<f64>,
    ) -> Result<(), CatalogError> {
        let draft = self.adding.as_mut().ok_or(CatalogError::NoDraft)?;
        draft.text = text.to_string();
        draft.deduction = deduction;
        Ok(())
    }

    /// Commits the add draft. On failure the draft stays open.
    pub fn commit_add(&mut self) -> Result<RuleId, CatalogError> {
        let draft = self.adding.clone().ok_or(CatalogError::NoDraft)?;
        let id = self.add(&draft.text, draft.deduction.unwrap_or(0.0))?;
        self.adding = None;
        Ok(id)
    }

    pub fn cancel_add(&mut self) {
        self.adding = None;
    }

    pub fn edit_draft(&self) -> Option<(RuleId, &RuleDraft)> {
        self.editing.as_ref().map(|(id, draft)| (*id, draft))
    }

    pub fn start_edit(&mut self, id: RuleId) -> Result<(), CatalogError> {
        let rule = self.rule(id).ok_or(CatalogError::NotFound(id))?;
        let draft = RuleDraft {
            text: rule.text.clone(),
            deduction: Some(rule.deduction),
        };
        self.editing = Some((id, draft));
        Ok(())
    }

    pub fn update_edit_draft(
        &mut self,
        text: &str,
        deduction: Option<f64>,
    ) -> Result<(), CatalogError> {
        let (_, draft) = self.editing.as_mut().ok_or(CatalogError::NoDraft)?;
        draft.text = text.to_string();
        draft.deduction = deduction;
        Ok(())
    }

    pub fn commit_edit(&mut self) -> Result<RuleId, CatalogError> {
        let (id, draft) = self.editing.clone().ok_or(CatalogError::NoDraft)?;
        match self.edit(id, &draft.text, draft.deduction.unwrap_or(0.0)) {
            Ok(()) => {
                self.editing = None;
                Ok(id)
            }
            Err(CatalogError::NotFound(id)) => {
                self.editing = None;
                Err(CatalogError::NotFound(id))
            }
            Err(err) => Err(err),
        }
    }

    pub fn cancel_edit(&mut self) {
        self.editing = None;
    }

    pub fn snapshot(&self) -> CatalogSnapshot {
        CatalogSnapshot {
            next_id: self.next_id,
            rules: self.rules.clone(),
            applied: self
                .applied
                .iter()
                .map(|(key, ids)| (key.clone(), ids.iter().copied().collect()))
                .collect(),
        }
    }

    /// Replaces definitions and the ledger. Applied ids with no matching rule are dropped.
    pub fn restore(&mut self, snapshot: CatalogSnapshot) {
        let known: BTreeSet<RuleId> = snapshot.rules.iter().map(|rule| rule.id).collect();
        let highest = known.iter().next_back().map(|id| id.0).unwrap_or(0);
        self.next_id = snapshot.next_id.max(highest + 1);
        self.rules = snapshot.rules;
        self.applied = snapshot
            .applied
            .into_iter()
            .map(|(key, ids)| {
                let ids = ids.into_iter().filter(|id| known.contains(id)).collect();
                (key, ids)
            })
            .collect();
        self.adding = None;
        self.editing = None;
        info!(rules = self.rules.len(), graded = self.applied.len(), "catalog restored");
    }
}

impl Default for FeedbackCatalog {
    fn default() -> Self {
        FeedbackCatalog::new()
    }
}

fn check_deduction(deduction: f64) -> Result<(), CatalogError> {
    if deduction.is_finite() && deduction >= 0.0 {
        Ok(())
    } else {
        Err(CatalogError::InvalidDeduction(deduction))
    }
}

fn compare_rows(a: &FeedbackRow, b: &FeedbackRow, spec: SortSpec<CatalogField>) -> Ordering {
    let ordering = match spec.field {
        CatalogField::Text => a.text.cmp(&b.text),
        CatalogField::Deduction => a.deduction.total_cmp(&b.deduction),
        CatalogField::Applied => u8::from(a.applied).cmp(&u8::from(b.applied)),
    };
    spec.direction.apply(ordering)
}
