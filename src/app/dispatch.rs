//! Routes surface interactions to the store, the filter and the edit machine,
//! and tells the surface what to do next through [`Effect`]s.

use std::fmt;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use indexmap::IndexMap;
use thiserror::Error;

use crate::app::edit::{EditMachine, EditSession, KeyOutcome, SaveOutcome};
use crate::app::events::{CardForm, KeyPress, SurfaceHandles, UiEvent, FORM_FIELDS};
use crate::search::{CategoryFilter, SearchCriteria};
use crate::storage::{Card, CardStore, Category, EditableField, StoreError, ValidationError};
use crate::view::{self, CardListView, Role, Target};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BindError {
    #[error("surface has no card list container")]
    MissingContainer,
    #[error("surface has no search input")]
    MissingSearchInput,
    #[error("creation form has no '{0}' field")]
    MissingFormField(String),
    #[error("category select offers {found:?}, expected {expected:?}")]
    CategoryOptions {
        expected: Vec<String>,
        found: Vec<String>,
    },
}

/// Blocking notifications for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alert {
    Invalid(ValidationError),
    StorageFull,
    EditSaveFailed,
    CreateFailed,
    DeleteFailed,
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alert::Invalid(err) => write!(f, "{err}"),
            Alert::StorageFull => f.write_str("Storage is full. Please delete some cards."),
            Alert::EditSaveFailed => f.write_str("Failed to save changes"),
            Alert::CreateFailed => f.write_str("Failed to save the new card"),
            Alert::DeleteFailed => f.write_str("Failed to delete card"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    #[default]
    None,
    FormTitle,
    EditInput { card_id: u64, field: EditableField },
    Region { card_id: u64, field: EditableField },
}

#[derive(Debug)]
pub enum Effect {
    Alert(Alert),
    /// Clear the creation form.
    ResetForm,
    /// Play the exit transition for a card and send on `done` once it ends.
    AnimateExit { card_id: u64, done: Sender<()> },
    /// The view was rebuilt.
    Rendered,
}

pub struct Dispatcher {
    store: CardStore,
    criteria: SearchCriteria,
    view: CardListView,
    edit: EditMachine,
    focus: Focus,
    pending_exits: IndexMap<u64, Receiver<()>>,
}

impl Dispatcher {
    /// Checks the surface once and renders the initial list.
    pub fn bind(store: CardStore, surface: &SurfaceHandles) -> Result<Self, BindError> {
        if !surface.list_container {
            return Err(BindError::MissingContainer);
        }
        if !surface.search_input {
            return Err(BindError::MissingSearchInput);
        }
        if let Some(missing) = FORM_FIELDS
            .iter()
            .find(|name| !surface.form_fields.iter().any(|field| field == *name))
        {
            return Err(BindError::MissingFormField(missing.to_string()));
        }
        let expected: Vec<String> = CategoryFilter::options()
            .iter()
            .map(ToString::to_string)
            .collect();
        if surface.category_options != expected {
            return Err(BindError::CategoryOptions {
                expected,
                found: surface.category_options.clone(),
            });
        }

        let mut dispatcher = Self {
            store,
            criteria: SearchCriteria::default(),
            view: CardListView::default(),
            edit: EditMachine::new(),
            focus: Focus::None,
            pending_exits: IndexMap::new(),
        };
        dispatcher.rerender();
        tracing::debug!(cards = dispatcher.store.len(), "dispatcher bound to surface");
        Ok(dispatcher)
    }

    pub fn store(&self) -> &CardStore {
        &self.store
    }

    pub fn view(&self) -> &CardListView {
        &self.view
    }

    pub fn criteria(&self) -> &SearchCriteria {
        &self.criteria
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }

    pub fn edit_session(&self) -> Option<&EditSession> {
        self.edit.session()
    }

    pub fn is_pending_exit(&self, card_id: u64) -> bool {
        self.pending_exits.contains_key(&card_id)
    }

    pub fn card(&self, card_id: u64) -> Option<&Card> {
        self.store.get(card_id)
    }

    pub fn handle(&mut self, event: UiEvent) -> Vec<Effect> {
        match event {
            UiEvent::Submit(form) => self.on_submit(&form),
            UiEvent::SearchInput(term) => {
                self.criteria.term = term;
                self.rerender_effects()
            }
            UiEvent::CategoryChange(raw) => {
                self.criteria.category = raw.parse().unwrap_or_else(|err| {
                    tracing::warn!(%err, "unknown category filter, showing all");
                    CategoryFilter::All
                });
                self.rerender_effects()
            }
            UiEvent::Click(target) => self.on_click(&target),
            UiEvent::DoubleClick(target) => self.on_double_click(&target),
            UiEvent::Key(press) => self.on_key(press),
        }
    }

    /// Finishes deletions whose exit transition has signalled completion.
    pub fn poll_transitions(&mut self) -> Vec<Effect> {
        let mut finished = Vec::new();
        let mut abandoned = Vec::new();
        for (card_id, signal) in &self.pending_exits {
            match signal.try_recv() {
                Ok(()) => finished.push(*card_id),
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => abandoned.push(*card_id),
            }
        }
        for card_id in abandoned {
            tracing::warn!(card_id, "exit transition dropped without finishing, card kept");
            self.pending_exits.shift_remove(&card_id);
        }
        let mut effects = Vec::new();
        for card_id in finished {
            self.pending_exits.shift_remove(&card_id);
            effects.extend(self.remove_card(card_id));
        }
        effects
    }

    fn on_submit(&mut self, form: &CardForm) -> Vec<Effect> {
        let raw_category = form.value("category").trim();
        let category = if raw_category.is_empty() {
            None
        } else {
            match raw_category.parse::<Category>() {
                Ok(category) => Some(category),
                Err(_) => {
                    let err = ValidationError::UnknownCategory(raw_category.to_string());
                    return vec![Effect::Alert(Alert::Invalid(err))];
                }
            }
        };
        match self
            .store
            .create(form.value("title"), form.value("description"), category)
        {
            Ok(card) => {
                tracing::debug!(card_id = card.id, "created card from form");
                let mut effects = self.rerender_effects();
                effects.push(Effect::ResetForm);
                self.focus = Focus::FormTitle;
                effects
            }
            Err(StoreError::Validation(err)) => {
                tracing::debug!(%err, "creation form rejected");
                vec![Effect::Alert(Alert::Invalid(err))]
            }
            Err(err) => vec![Effect::Alert(persistence_alert(&err, Alert::CreateFailed))],
        }
    }

    fn on_click(&mut self, target: &Target) -> Vec<Effect> {
        if target.within(Role::DeleteButton) {
            return match target.closest_card() {
                Some(card_id) => self.request_delete(card_id),
                None => Vec::new(),
            };
        }
        if target.within(Role::SaveButton) || target.within(Role::CancelButton) {
            let owned = match (target.closest_card(), target.closest_field()) {
                (Some(card_id), Some(field)) => self.edit.is_editing_field(card_id, field),
                _ => false,
            };
            if !owned {
                tracing::debug!(?target, "edit control outside the active session");
                return Vec::new();
            }
            return if target.within(Role::SaveButton) {
                self.save_edit()
            } else {
                self.cancel_edit()
            };
        }
        tracing::debug!(?target, "click on nothing actionable");
        Vec::new()
    }

    fn on_double_click(&mut self, target: &Target) -> Vec<Effect> {
        let (Some(field), Some(card_id)) = (target.closest_field(), target.closest_card()) else {
            tracing::debug!(?target, "double-click outside an editable region");
            return Vec::new();
        };
        if self.edit.enter(&self.store, &mut self.view, card_id, field) {
            self.focus = Focus::EditInput { card_id, field };
        }
        Vec::new()
    }

    fn on_key(&mut self, press: KeyPress) -> Vec<Effect> {
        match self.edit.handle_key(press) {
            KeyOutcome::Commit => self.save_edit(),
            KeyOutcome::Cancel => self.cancel_edit(),
            KeyOutcome::Edited | KeyOutcome::Ignored => Vec::new(),
        }
    }

    fn save_edit(&mut self) -> Vec<Effect> {
        let Some((card_id, field)) = self.edit.session().map(|s| (s.card_id, s.field)) else {
            return Vec::new();
        };
        match self.edit.attempt_save(&mut self.store, &mut self.view) {
            SaveOutcome::NotEditing => Vec::new(),
            SaveOutcome::Invalid(err) => {
                self.focus = Focus::EditInput { card_id, field };
                vec![Effect::Alert(Alert::Invalid(err))]
            }
            SaveOutcome::Saved(_) => {
                self.focus = Focus::Region { card_id, field };
                self.rerender_effects()
            }
            SaveOutcome::Failed(err) => {
                let mut effects = Vec::new();
                if matches!(err, StoreError::QuotaExceeded { .. }) {
                    effects.push(Effect::Alert(Alert::StorageFull));
                }
                effects.push(Effect::Alert(Alert::EditSaveFailed));
                self.focus = Focus::Region { card_id, field };
                effects.extend(self.rerender_effects());
                effects
            }
        }
    }

    fn cancel_edit(&mut self) -> Vec<Effect> {
        if let Some(session) = self.edit.cancel(&mut self.view) {
            self.focus = Focus::Region {
                card_id: session.card_id,
                field: session.field,
            };
        }
        Vec::new()
    }

    fn request_delete(&mut self, card_id: u64) -> Vec<Effect> {
        if !self.store.contains(card_id) {
            tracing::warn!(card_id, "delete requested for unknown card");
            return Vec::new();
        }
        if self.pending_exits.contains_key(&card_id) {
            tracing::debug!(card_id, "delete already in progress");
            return Vec::new();
        }
        match self.view.block_mut(card_id) {
            Some(block) => {
                block.exiting = true;
                let (done, signal) = crossbeam_channel::bounded(1);
                self.pending_exits.insert(card_id, signal);
                tracing::debug!(card_id, "deferring removal until exit transition ends");
                vec![Effect::AnimateExit { card_id, done }]
            }
            None => self.remove_card(card_id),
        }
    }

    fn remove_card(&mut self, card_id: u64) -> Vec<Effect> {
        match self.store.delete(card_id) {
            Ok(true) => self.rerender_effects(),
            Ok(false) => {
                tracing::warn!(card_id, "card vanished before removal");
                self.rerender_effects()
            }
            Err(err) => {
                let mut effects = vec![Effect::Alert(persistence_alert(&err, Alert::DeleteFailed))];
                effects.extend(self.rerender_effects());
                effects
            }
        }
    }

    fn rerender_effects(&mut self) -> Vec<Effect> {
        self.rerender();
        vec![Effect::Rendered]
    }

    // Full replacement of the displayed list from the current criteria.
    fn rerender(&mut self) {
        let visible = self.criteria.apply(self.store.cards());
        self.view = view::render(&visible);
        for card_id in self.pending_exits.keys() {
            if let Some(block) = self.view.block_mut(*card_id) {
                block.exiting = true;
            }
        }
        if !self.edit.reattach(&mut self.view) {
            if let Focus::EditInput { .. } = self.focus {
                self.focus = Focus::None;
            }
        }
        tracing::debug!(shown = self.view.len(), total = self.store.len(), "rendered cards");
    }
}

fn persistence_alert(err: &StoreError, fallback: Alert) -> Alert {
    tracing::error!(%err, "persistence failed");
    match err {
        StoreError::QuotaExceeded { .. } => Alert::StorageFull,
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::events::Key;
    use crate::storage::MemoryKeyValueStore;
    use crate::view::Part;
    use assert_matches::assert_matches;

    /// Handles for a surface that exposes every control the dispatcher needs.
    fn complete_surface() -> SurfaceHandles {
        SurfaceHandles {
            list_container: true,
            form_fields: FORM_FIELDS.iter().map(|name| name.to_string()).collect(),
            search_input: true,
            category_options: CategoryFilter::options()
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }

    fn dispatcher() -> (MemoryKeyValueStore, Dispatcher) {
        let kv = MemoryKeyValueStore::new();
        let store = CardStore::with_defaults(Box::new(kv.clone()), "cards");
        let dispatcher = Dispatcher::bind(store, &complete_surface()).expect("bind");
        (kv, dispatcher)
    }

    fn milk_form() -> CardForm {
        CardForm::new()
            .with("title", "Buy milk")
            .with("description", "2%")
            .with("category", "work")
    }

    fn click(d: &mut Dispatcher, card_id: u64, part: Part) -> Vec<Effect> {
        let target = d.view().target(card_id, part).expect("target on screen");
        d.handle(UiEvent::Click(target))
    }

    fn double_click(d: &mut Dispatcher, card_id: u64, field: EditableField) -> Vec<Effect> {
        let target = d.view().target(card_id, Part::Field(field)).expect("target on screen");
        d.handle(UiEvent::DoubleClick(target))
    }

    fn alerts(effects: &[Effect]) -> Vec<String> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Alert(alert) => Some(alert.to_string()),
                _ => None,
            })
            .collect()
    }

    fn finish_exit(d: &mut Dispatcher, effects: Vec<Effect>) -> Vec<Effect> {
        for effect in effects {
            if let Effect::AnimateExit { done, .. } = effect {
                done.send(()).expect("signal");
            }
        }
        d.poll_transitions()
    }

    #[test]
    fn bind_fails_fast_on_incomplete_surface() {
        let kv = MemoryKeyValueStore::new();
        let mut surface = complete_surface();
        surface.form_fields.retain(|name| name != "description");
        let err = Dispatcher::bind(CardStore::new(Box::new(kv.clone()), "cards"), &surface)
            .err()
            .expect("bind error");
        assert_eq!(err, BindError::MissingFormField("description".into()));

        let mut surface = complete_surface();
        surface.category_options.pop();
        assert_matches!(
            Dispatcher::bind(CardStore::new(Box::new(kv), "cards"), &surface).err(),
            Some(BindError::CategoryOptions { .. })
        );
    }

    #[test]
    fn submit_creates_first_card_and_refocuses_form() {
        let (_kv, mut d) = dispatcher();
        let effects = d.handle(UiEvent::Submit(milk_form()));
        assert_matches!(effects.as_slice(), [Effect::Rendered, Effect::ResetForm]);
        assert_eq!(d.view().card_ids(), vec![3, 1, 2]);
        assert_eq!(d.focus(), Focus::FormTitle);
    }

    #[test]
    fn submit_with_missing_field_alerts_and_changes_nothing() {
        let (kv, mut d) = dispatcher();
        let form = milk_form().with("description", "   ");
        let effects = d.handle(UiEvent::Submit(form));
        assert_eq!(alerts(&effects), vec!["Please fill in all fields"]);
        assert_eq!(d.view().card_ids(), vec![1, 2]);
        assert!(kv.raw("cards").is_none());

        let effects = d.handle(UiEvent::Submit(milk_form().with("category", "")));
        assert_eq!(alerts(&effects), vec!["Please fill in all fields"]);
    }

    #[test]
    fn submit_over_quota_reports_storage_full() {
        let kv = MemoryKeyValueStore::with_capacity(16);
        let store = CardStore::with_defaults(Box::new(kv), "cards");
        let mut d = Dispatcher::bind(store, &complete_surface()).expect("bind");
        let effects = d.handle(UiEvent::Submit(milk_form()));
        assert_eq!(alerts(&effects), vec!["Storage is full. Please delete some cards."]);
        assert_eq!(d.store().len(), 2);
    }

    #[test]
    fn search_and_category_filter_rerender() {
        let (_kv, mut d) = dispatcher();
        d.handle(UiEvent::Submit(milk_form()));

        d.handle(UiEvent::SearchInput("MILK".into()));
        assert_eq!(d.view().card_ids(), vec![3]);
        d.handle(UiEvent::CategoryChange("study".into()));
        assert!(d.view().is_empty());
        assert!(d.view().placeholder_target().is_some());

        d.handle(UiEvent::SearchInput(String::new()));
        d.handle(UiEvent::CategoryChange("nonsense".into()));
        assert_eq!(d.criteria().category, CategoryFilter::All);
        assert_eq!(d.view().card_ids(), vec![3, 1, 2]);
    }

    #[test]
    fn delete_waits_for_exit_transition() {
        let (kv, mut d) = dispatcher();
        d.handle(UiEvent::Submit(milk_form()));

        let effects = click(&mut d, 3, Part::Delete);
        assert_matches!(effects.as_slice(), [Effect::AnimateExit { card_id: 3, .. }]);
        assert!(d.view().block(3).expect("still shown").exiting);
        assert!(d.store().contains(3));

        // a re-render while the transition runs keeps the card marked
        d.handle(UiEvent::SearchInput(String::new()));
        assert!(d.view().block(3).expect("still shown").exiting);

        let effects = finish_exit(&mut d, effects);
        assert_matches!(effects.as_slice(), [Effect::Rendered]);
        assert_eq!(d.view().card_ids(), vec![1, 2]);
        let saved: Vec<Card> = serde_json::from_slice(&kv.raw("cards").expect("saved")).expect("json");
        assert_eq!(saved.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn unfinished_transition_keeps_card() {
        let (_kv, mut d) = dispatcher();
        let effects = click(&mut d, 1, Part::Delete);
        assert!(d.poll_transitions().is_empty());
        assert!(d.store().contains(1));
        drop(effects);
        assert!(d.poll_transitions().is_empty());
        assert!(d.store().contains(1));
        assert!(!d.is_pending_exit(1));
    }

    #[test]
    fn delete_of_hidden_card_is_immediate() {
        let (_kv, mut d) = dispatcher();
        let target = d.view().target(2, Part::Delete).expect("target");
        d.handle(UiEvent::SearchInput("dom".into()));
        assert!(!d.view().is_displayed(2));

        let effects = d.handle(UiEvent::Click(target));
        assert_matches!(effects.as_slice(), [Effect::Rendered]);
        assert!(!d.store().contains(2));
    }

    #[test]
    fn delete_of_unknown_card_is_ignored() {
        let (_kv, mut d) = dispatcher();
        let target = d.view().target(1, Part::Delete).expect("target");
        let effects = click(&mut d, 1, Part::Delete);
        finish_exit(&mut d, effects);
        assert!(d.handle(UiEvent::Click(target)).is_empty());
        assert_eq!(d.view().card_ids(), vec![2]);
    }

    #[test]
    fn double_click_edit_and_save_with_enter() {
        let (_kv, mut d) = dispatcher();
        double_click(&mut d, 1, EditableField::Title);
        assert_eq!(
            d.focus(),
            Focus::EditInput {
                card_id: 1,
                field: EditableField::Title
            }
        );
        for ch in "DOM basics".chars() {
            d.handle(UiEvent::Key(KeyPress::plain(Key::Char(ch))));
        }
        let effects = d.handle(UiEvent::Key(KeyPress::plain(Key::Enter)));
        assert_matches!(effects.as_slice(), [Effect::Rendered]);
        assert!(d.edit_session().is_none());
        assert_eq!(d.card(1).map(|c| c.title.as_str()), Some("DOM basics"));
        assert_eq!(
            d.view().block(1).and_then(|b| b.title.content.text()),
            Some("DOM basics")
        );
    }

    #[test]
    fn only_one_field_edits_at_a_time() {
        let (_kv, mut d) = dispatcher();
        double_click(&mut d, 1, EditableField::Title);
        let before = d.view().clone();
        double_click(&mut d, 2, EditableField::Description);
        assert_eq!(d.view(), &before);
        let session = d.edit_session().expect("session");
        assert_eq!((session.card_id, session.field), (1, EditableField::Title));
    }

    #[test]
    fn double_click_outside_editable_region_is_ignored() {
        let (_kv, mut d) = dispatcher();
        let badge = d.view().target(1, Part::Badge).expect("badge");
        d.handle(UiEvent::DoubleClick(badge));
        assert!(d.edit_session().is_none());
    }

    #[test]
    fn cancel_button_restores_view() {
        let (kv, mut d) = dispatcher();
        let before = d.view().clone();
        double_click(&mut d, 2, EditableField::Description);
        d.handle(UiEvent::Key(KeyPress::plain(Key::Char('x'))));

        let effects = click(&mut d, 2, Part::Cancel(EditableField::Description));
        assert!(effects.is_empty());
        assert_eq!(d.view(), &before);
        assert!(kv.raw("cards").is_none());
        assert_eq!(
            d.focus(),
            Focus::Region {
                card_id: 2,
                field: EditableField::Description
            }
        );
    }

    #[test]
    fn save_button_with_empty_value_keeps_editing() {
        let (_kv, mut d) = dispatcher();
        double_click(&mut d, 1, EditableField::Title);
        d.handle(UiEvent::Key(KeyPress::plain(Key::Backspace)));
        let effects = click(&mut d, 1, Part::Save(EditableField::Title));
        assert_eq!(alerts(&effects), vec!["Title cannot be empty"]);
        assert!(d.edit_session().is_some());
        assert!(d.view().block(1).expect("block").editing);
    }

    #[test]
    fn failed_edit_save_alerts_and_exits() {
        let kv = MemoryKeyValueStore::new();
        let store = CardStore::with_defaults(Box::new(kv.clone()), "cards");
        let mut d = Dispatcher::bind(store, &complete_surface()).expect("bind");
        double_click(&mut d, 1, EditableField::Title);
        d.handle(UiEvent::Key(KeyPress::plain(Key::Char('Z'))));
        kv.set_capacity(Some(10));

        let effects = d.handle(UiEvent::Key(KeyPress::plain(Key::Enter)));
        assert_eq!(
            alerts(&effects),
            vec!["Storage is full. Please delete some cards.", "Failed to save changes"]
        );
        assert_matches!(effects.last(), Some(Effect::Rendered));
        assert!(d.edit_session().is_none());
        assert_eq!(d.card(1).map(|c| c.title.as_str()), Some("Learn DOM Manipulation"));
    }

    #[test]
    fn editing_survives_rerender_while_visible() {
        let (_kv, mut d) = dispatcher();
        double_click(&mut d, 2, EditableField::Title);
        d.handle(UiEvent::SearchInput("project".into()));
        assert!(d.view().block(2).expect("block").title.is_input());
        assert!(d.edit_session().is_some());

        d.handle(UiEvent::SearchInput("dom".into()));
        assert!(d.edit_session().is_none());
        assert_eq!(d.focus(), Focus::None);
    }
}
