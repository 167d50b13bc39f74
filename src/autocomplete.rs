//! Incremental autocomplete over the run collection.
//!
//! One parameterized panel, instantiated once per filterable field (CPU
//! label, user). The vocabulary is rebuilt from the current snapshot on
//! every open/input so a refresh needs no notification channel, and the
//! candidate list is capped to bound render cost. Filtering the result
//! list is never gated on picking a suggestion; typing alone re-runs the
//! query engine.

use std::collections::HashSet;

use crate::model::Run;
use crate::query::matches_filter;

/// Upper bound on rendered candidates.
pub const SUGGEST_CAP: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestField {
    Cpu,
    User,
}

/// Distinct, non-empty values for a field: case preserved as first seen,
/// deduplicated case-insensitively, sorted case-insensitively.
pub fn vocabulary(rows: &[Run], field: SuggestField) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out: Vec<String> = Vec::new();
    let mut add = |value: &str| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return;
        }
        if seen.insert(trimmed.to_lowercase()) {
            out.push(trimmed.to_string());
        }
    };
    for run in rows {
        match field {
            SuggestField::Cpu => add(&run.cpu_label),
            SuggestField::User => {
                add(&run.user_display);
                add(&run.user);
            }
        }
    }
    out.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()));
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelState {
    Closed,
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Up,
    Down,
    Enter,
    Escape,
}

/// What the caller must do after feeding the panel an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Nothing beyond re-rendering the panel.
    None,
    /// Re-run the query engine against the current input text.
    Requery,
    /// Put this value into the input, then re-run the query engine.
    Commit(String),
}

/// Suggestion panel state machine.
#[derive(Debug)]
pub struct SuggestPanel {
    field: SuggestField,
    state: PanelState,
    candidates: Vec<String>,
    highlight: Option<usize>,
    /// Set on pointer-down inside the panel so the input's blur does not
    /// tear the panel down before the click lands.
    pointer_guard: bool,
}

impl SuggestPanel {
    pub fn new(field: SuggestField) -> Self {
        Self {
            field,
            state: PanelState::Closed,
            candidates: Vec::new(),
            highlight: None,
            pointer_guard: false,
        }
    }

    pub fn field(&self) -> SuggestField {
        self.field
    }

    pub fn state(&self) -> PanelState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == PanelState::Open
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn highlight(&self) -> Option<usize> {
        self.highlight
    }

    fn rebuild(&mut self, rows: &[Run], input: &str) {
        self.candidates = vocabulary(rows, self.field)
            .into_iter()
            .filter(|c| matches_filter(input, c))
            .take(SUGGEST_CAP)
            .collect();
        self.highlight = if self.candidates.is_empty() {
            None
        } else {
            Some(0)
        };
        self.state = PanelState::Open;
    }

    fn close(&mut self) {
        self.state = PanelState::Closed;
        self.candidates.clear();
        self.highlight = None;
        self.pointer_guard = false;
    }

    /// Input gained focus: open with the vocabulary filtered by whatever
    /// text is already in the field.
    pub fn on_focus(&mut self, rows: &[Run], input: &str) {
        self.rebuild(rows, input);
    }

    /// Input text changed: re-filter, reset the highlight, and have the
    /// caller re-run the query so results update live while typing.
    pub fn on_input(&mut self, rows: &[Run], input: &str) -> Effect {
        self.rebuild(rows, input);
        Effect::Requery
    }

    pub fn on_key(&mut self, key: Key) -> Effect {
        if !self.is_open() {
            return Effect::None;
        }
        match key {
            Key::Up => {
                if let Some(h) = self.highlight {
                    // clamped, no wraparound
                    self.highlight = Some(h.saturating_sub(1));
                }
                Effect::None
            }
            Key::Down => {
                if let Some(h) = self.highlight {
                    self.highlight = Some((h + 1).min(self.candidates.len() - 1));
                }
                Effect::None
            }
            Key::Enter => {
                let effect = match self.highlight {
                    Some(i) => Effect::Commit(self.candidates[i].clone()),
                    None => Effect::None,
                };
                self.close();
                effect
            }
            Key::Escape => {
                self.close();
                Effect::None
            }
        }
    }

    /// Pointer went down inside the panel; the blur that follows must not
    /// close it.
    pub fn on_pointer_down_panel(&mut self) {
        if self.is_open() {
            self.pointer_guard = true;
        }
    }

    /// The input lost focus.
    pub fn on_blur(&mut self) {
        if self.pointer_guard {
            self.pointer_guard = false;
        } else {
            self.close();
        }
    }

    /// Pointer selection of a panel entry.
    pub fn on_pointer_select(&mut self, index: usize) -> Effect {
        if !self.is_open() || index >= self.candidates.len() {
            self.close();
            return Effect::None;
        }
        let value = self.candidates[index].clone();
        self.close();
        Effect::Commit(value)
    }

    /// Pointer action outside both the input and the panel.
    pub fn on_pointer_outside(&mut self) {
        self.close();
    }
}
