use std::collections::HashSet;

use anyhow::Result;
use thiserror::Error;
use time::OffsetDateTime;

use crate::config::{ConfigPaths, StorageOptions};

pub mod backend;
mod model;
mod schema;

pub use backend::{BackendError, KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore};
pub use model::{default_cards, Card, Category, EditableField, ValidationError, TITLE_MAX_CHARS};

pub const DEFAULT_STORAGE_KEY: &str = "cards";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("card {0} not found")]
    NotFound(u64),
    #[error("Storage is full. Please delete some cards.")]
    QuotaExceeded { needed: usize, capacity: usize },
    #[error("failed to persist cards: {0}")]
    Persistence(#[source] BackendError),
    #[error("failed to encode cards: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("no card ids left to assign")]
    IdsExhausted,
}

impl From<BackendError> for StoreError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::QuotaExceeded { needed, capacity } => {
                StoreError::QuotaExceeded { needed, capacity }
            }
            other => StoreError::Persistence(other),
        }
    }
}

/// Authoritative in-memory card collection (newest first) plus the id counter,
/// persisted as one JSON array under a single key.
pub struct CardStore {
    backend: Box<dyn KeyValueStore>,
    key: String,
    cards: Vec<Card>,
    next_id: u64,
}

impl CardStore {
    pub fn new(backend: Box<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
            cards: Vec::new(),
            next_id: 1,
        }
    }

    /// Starts from the starter cards; a later successful `load` replaces them.
    pub fn with_defaults(backend: Box<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        let mut store = Self::new(backend, key);
        store.cards = default_cards();
        store.next_id = next_id_after(&store.cards).unwrap_or(1);
        store
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn get(&self, id: u64) -> Option<&Card> {
        self.cards.iter().find(|card| card.id == id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn create(
        &mut self,
        title: &str,
        description: &str,
        category: Option<Category>,
    ) -> Result<Card, StoreError> {
        let title = title.trim();
        let description = description.trim();
        let Some(category) = category else {
            return Err(ValidationError::MissingFields.into());
        };
        if title.is_empty() || description.is_empty() {
            return Err(ValidationError::MissingFields.into());
        }
        let title = EditableField::Title.validate(title)?;
        let Some(following) = self.next_id.checked_add(1) else {
            tracing::error!(next_id = self.next_id, "card id counter exhausted");
            return Err(StoreError::IdsExhausted);
        };

        let card = Card::new(self.next_id, title, description, category);
        // the counter never moves backwards, even when the write below fails
        self.next_id = following;
        self.cards.insert(0, card.clone());
        if let Err(err) = self.save() {
            self.cards.remove(0);
            tracing::error!(card_id = card.id, %err, "failed to persist new card");
            return Err(err);
        }
        tracing::info!(card_id = card.id, category = %card.category, "card created");
        Ok(card)
    }

    pub fn delete(&mut self, id: u64) -> Result<bool, StoreError> {
        let Some(index) = self.cards.iter().position(|card| card.id == id) else {
            return Ok(false);
        };
        let removed = self.cards.remove(index);
        if let Err(err) = self.save() {
            self.cards.insert(index, removed);
            tracing::error!(card_id = id, %err, "failed to persist deletion");
            return Err(err);
        }
        tracing::info!(card_id = id, "card deleted");
        Ok(true)
    }

    pub fn update_field(
        &mut self,
        id: u64,
        field: EditableField,
        value: &str,
    ) -> Result<Card, StoreError> {
        let value = field.validate(value)?;
        let card = self
            .cards
            .iter_mut()
            .find(|card| card.id == id)
            .ok_or(StoreError::NotFound(id))?;
        let previous_value = field.replace(card, value);
        let previous_updated = card.updated_at.replace(OffsetDateTime::now_utc());

        if let Err(err) = self.save() {
            if let Some(card) = self.cards.iter_mut().find(|card| card.id == id) {
                field.replace(card, previous_value);
                card.updated_at = previous_updated;
            }
            tracing::error!(card_id = id, %field, %err, "failed to persist field update");
            return Err(err);
        }
        tracing::info!(card_id = id, %field, "card field updated");
        self.get(id).cloned().ok_or(StoreError::NotFound(id))
    }

    /// Replaces the collection with the persisted one. Returns false, keeping the
    /// current cards, when nothing is stored or the stored bytes are malformed.
    pub fn load(&mut self) -> bool {
        let raw = match self.backend.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!(key = %self.key, "no saved cards found");
                return false;
            }
            Err(err) => {
                tracing::warn!(key = %self.key, %err, "failed to read saved cards");
                return false;
            }
        };
        let cards = match decode_cards(&raw) {
            Ok(cards) => cards,
            Err(reason) => {
                tracing::warn!(key = %self.key, %reason, "ignoring malformed saved cards");
                return false;
            }
        };
        if let Some(next_id) = next_id_after(&cards) {
            self.next_id = next_id;
        }
        tracing::info!(count = cards.len(), "loaded saved cards");
        self.cards = cards;
        true
    }

    pub fn save(&self) -> Result<(), StoreError> {
        let json = serde_json::to_vec(&self.cards)?;
        self.backend.set(&self.key, &json)?;
        tracing::debug!(count = self.cards.len(), bytes = json.len(), "saved cards");
        Ok(())
    }
}

fn decode_cards(raw: &[u8]) -> Result<Vec<Card>, String> {
    let value: serde_json::Value = serde_json::from_slice(raw).map_err(|err| err.to_string())?;
    if !value.is_array() {
        return Err("stored value is not an array".into());
    }
    let cards: Vec<Card> = serde_json::from_value(value).map_err(|err| err.to_string())?;
    let mut seen = HashSet::with_capacity(cards.len());
    for card in &cards {
        if !seen.insert(card.id) {
            return Err(format!("duplicate card id {}", card.id));
        }
        if card.id == u64::MAX {
            return Err(format!("card id {} leaves no id for the next card", card.id));
        }
        for field in [EditableField::Title, EditableField::Description] {
            field
                .validate(field.value_of(card))
                .map_err(|err| format!("card {}: {err}", card.id))?;
        }
    }
    Ok(cards)
}

fn next_id_after(cards: &[Card]) -> Option<u64> {
    cards
        .iter()
        .map(|card| card.id)
        .max()
        .and_then(|max| max.checked_add(1))
}

/// Opens the on-disk store described by the config and loads whatever it holds.
pub fn init(paths: &ConfigPaths, options: &StorageOptions) -> Result<CardStore> {
    let mut options = options.clone();
    if options.database_path.as_os_str().is_empty() {
        options.database_path = paths.database_path.clone();
    }
    let backend = SqliteKeyValueStore::open(&options)?;
    let mut store = if options.seed_defaults {
        CardStore::with_defaults(Box::new(backend), options.storage_key.clone())
    } else {
        CardStore::new(Box::new(backend), options.storage_key.clone())
    };
    if !store.load() {
        tracing::info!("using default cards");
    }
    Ok(store)
}
