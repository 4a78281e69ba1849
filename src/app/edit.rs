//! In-place editing of a single card field.
//!
//! The machine is either viewing (no session) or editing exactly one field of
//! one card. The session keeps the region's displayed content from before the
//! edit so a cancel can put it back untouched.

use crate::app::events::{Key, KeyPress, Modifiers};
use crate::app::input::LineEditor;
use crate::storage::{Card, CardStore, EditableField, StoreError, ValidationError};
use crate::view::{CardListView, RegionContent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSession {
    pub card_id: u64,
    pub field: EditableField,
    pub original_value: String,
    pub original_content: RegionContent,
    pub input: LineEditor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    Commit,
    Cancel,
    Edited,
    Ignored,
}

#[derive(Debug)]
pub enum SaveOutcome {
    NotEditing,
    /// Input rejected; the session stays open.
    Invalid(ValidationError),
    /// Stored and back to viewing. The caller re-renders.
    Saved(Card),
    /// The store rolled the change back. The session is closed anyway and the
    /// caller re-renders.
    Failed(StoreError),
}

#[derive(Debug, Default)]
pub struct EditMachine {
    session: Option<EditSession>,
}

impl EditMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_editing(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&EditSession> {
        self.session.as_ref()
    }

    pub fn is_editing_field(&self, card_id: u64, field: EditableField) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.card_id == card_id && s.field == field)
    }

    /// Viewing -> Editing. Returns false and changes nothing when a session is
    /// already open or the card is not on screen.
    pub fn enter(
        &mut self,
        store: &CardStore,
        view: &mut CardListView,
        card_id: u64,
        field: EditableField,
    ) -> bool {
        if let Some(active) = &self.session {
            tracing::info!(
                card_id,
                active_card = active.card_id,
                active_field = %active.field,
                "already editing another field"
            );
            return false;
        }
        let Some(card) = store.get(card_id) else {
            tracing::error!(card_id, "card not found");
            return false;
        };
        let Some(block) = view.block_mut(card_id) else {
            tracing::warn!(card_id, "card is not displayed");
            return false;
        };
        let original_value = field.value_of(card).to_string();
        let region = block.region_mut(field);
        let original_content = std::mem::replace(
            &mut region.content,
            RegionContent::Input {
                multiline: field.is_multiline(),
            },
        );
        block.editing = true;
        tracing::debug!(card_id, %field, "entering edit mode");
        self.session = Some(EditSession {
            card_id,
            field,
            input: LineEditor::with_selection(original_value.clone(), field.is_multiline()),
            original_value,
            original_content,
        });
        true
    }

    /// Feeds a key to the edit input.
    pub fn handle_key(&mut self, press: KeyPress) -> KeyOutcome {
        let Some(session) = self.session.as_mut() else {
            return KeyOutcome::Ignored;
        };
        let multiline = session.field.is_multiline();
        let input = &mut session.input;
        let changed = match press.key {
            Key::Enter if !multiline => return KeyOutcome::Commit,
            Key::Enter if press.is_ctrl() => return KeyOutcome::Commit,
            Key::Enter => input.insert_newline(),
            Key::Escape => return KeyOutcome::Cancel,
            Key::Char(ch) if (press.modifiers - Modifiers::SHIFT).is_empty() => input.insert_char(ch),
            Key::Backspace => input.backspace(),
            Key::Delete => input.delete(),
            Key::Left => input.move_left(),
            Key::Right => input.move_right(),
            Key::Home => input.move_home(),
            Key::End => input.move_end(),
            Key::Char(_) | Key::Tab => false,
        };
        if changed {
            KeyOutcome::Edited
        } else {
            KeyOutcome::Ignored
        }
    }

    pub fn attempt_save(&mut self, store: &mut CardStore, view: &mut CardListView) -> SaveOutcome {
        let Some(session) = self.session.as_ref() else {
            return SaveOutcome::NotEditing;
        };
        let (card_id, field) = (session.card_id, session.field);
        let value = match field.validate(session.input.value()) {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!(card_id, %field, %err, "edit rejected");
                return SaveOutcome::Invalid(err);
            }
        };
        match store.update_field(card_id, field, &value) {
            Ok(card) => {
                if let Some(session) = self.finish(view) {
                    show_text(view, &session, field.value_of(&card));
                }
                SaveOutcome::Saved(card)
            }
            Err(StoreError::Validation(err)) => SaveOutcome::Invalid(err),
            Err(err) => {
                if let Some(session) = self.finish(view) {
                    show_text(view, &session, &session.original_value);
                }
                SaveOutcome::Failed(err)
            }
        }
    }

    /// Editing -> Viewing without touching the store. Returns the closed session.
    pub fn cancel(&mut self, view: &mut CardListView) -> Option<EditSession> {
        let session = self.finish(view)?;
        if let Some(block) = view.block_mut(session.card_id) {
            block.region_mut(session.field).content = session.original_content.clone();
        }
        tracing::debug!(card_id = session.card_id, field = %session.field, "edit cancelled");
        Some(session)
    }

    /// Puts the open session back into a freshly rendered view. A session whose
    /// card is no longer displayed is dropped.
    pub fn reattach(&mut self, view: &mut CardListView) -> bool {
        let Some(session) = self.session.as_ref() else {
            return false;
        };
        match view.block_mut(session.card_id) {
            Some(block) => {
                block.editing = true;
                block.region_mut(session.field).content = RegionContent::Input {
                    multiline: session.field.is_multiline(),
                };
                true
            }
            None => {
                tracing::debug!(card_id = session.card_id, "edited card left the view, closing session");
                self.session = None;
                false
            }
        }
    }

    // Exit cleanup shared by save and cancel.
    fn finish(&mut self, view: &mut CardListView) -> Option<EditSession> {
        let session = self.session.take()?;
        if let Some(block) = view.block_mut(session.card_id) {
            block.editing = false;
        }
        Some(session)
    }
}

fn show_text(view: &mut CardListView, session: &EditSession, value: &str) {
    if let Some(block) = view.block_mut(session.card_id) {
        block.region_mut(session.field).content = RegionContent::Text(value.to_string());
    }
}
