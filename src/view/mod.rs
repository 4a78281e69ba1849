//! Declarative description of the card list.
//!
//! [`render`] rebuilds the whole list from a slice of cards. Surfaces draw the
//! resulting [`CardListView`] and report interactions as [`Target`]s, which
//! carry the same card/field metadata the view exposes.

use crate::storage::{Card, Category, EditableField};

pub const EMPTY_MESSAGE: &str = "No cards yet. Create your first card!";
pub const DELETE_LABEL: &str = "×";
pub const SAVE_LABEL: &str = "Save";
pub const CANCEL_LABEL: &str = "Cancel";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardListView {
    Empty { message: String },
    Cards(Vec<CardBlock>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardBlock {
    pub card_id: u64,
    pub category: Category,
    pub badge: String,
    pub title: FieldRegion,
    pub description: FieldRegion,
    /// Set while one of this card's fields is being edited.
    pub editing: bool,
    /// Set while the delete transition is playing.
    pub exiting: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRegion {
    pub field: EditableField,
    pub content: RegionContent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionContent {
    /// Plain display of the stored value.
    Text(String),
    /// Live input followed by Save / Cancel controls. The input value lives in
    /// the edit session, not in the view.
    Input { multiline: bool },
}

impl RegionContent {
    pub fn text(&self) -> Option<&str> {
        match self {
            RegionContent::Text(text) => Some(text),
            RegionContent::Input { .. } => None,
        }
    }
}

pub fn render(cards: &[&Card]) -> CardListView {
    if cards.is_empty() {
        return CardListView::Empty {
            message: EMPTY_MESSAGE.to_string(),
        };
    }
    CardListView::Cards(cards.iter().map(|card| CardBlock::from_card(card)).collect())
}

impl CardBlock {
    fn from_card(card: &Card) -> Self {
        Self {
            card_id: card.id,
            category: card.category,
            badge: card.category.to_string(),
            title: FieldRegion::display(EditableField::Title, &card.title),
            description: FieldRegion::display(EditableField::Description, &card.description),
            editing: false,
            exiting: false,
        }
    }

    pub fn region(&self, field: EditableField) -> &FieldRegion {
        match field {
            EditableField::Title => &self.title,
            EditableField::Description => &self.description,
        }
    }

    pub fn region_mut(&mut self, field: EditableField) -> &mut FieldRegion {
        match field {
            EditableField::Title => &mut self.title,
            EditableField::Description => &mut self.description,
        }
    }
}

impl FieldRegion {
    fn display(field: EditableField, value: &str) -> Self {
        Self {
            field,
            content: RegionContent::Text(value.to_string()),
        }
    }

    pub fn is_input(&self) -> bool {
        matches!(self.content, RegionContent::Input { .. })
    }
}

impl Default for CardListView {
    fn default() -> Self {
        render(&[])
    }
}

impl CardListView {
    pub fn blocks(&self) -> &[CardBlock] {
        match self {
            CardListView::Empty { .. } => &[],
            CardListView::Cards(blocks) => blocks,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CardListView::Empty { .. })
    }

    pub fn len(&self) -> usize {
        self.blocks().len()
    }

    pub fn block(&self, card_id: u64) -> Option<&CardBlock> {
        self.blocks().iter().find(|block| block.card_id == card_id)
    }

    pub fn block_mut(&mut self, card_id: u64) -> Option<&mut CardBlock> {
        match self {
            CardListView::Empty { .. } => None,
            CardListView::Cards(blocks) => blocks.iter_mut().find(|block| block.card_id == card_id),
        }
    }

    pub fn is_displayed(&self, card_id: u64) -> bool {
        self.block(card_id).is_some()
    }

    pub fn position(&self, card_id: u64) -> Option<usize> {
        self.blocks().iter().position(|block| block.card_id == card_id)
    }

    pub fn card_ids(&self) -> Vec<u64> {
        self.blocks().iter().map(|block| block.card_id).collect()
    }

    /// Address of `part` inside the block for `card_id`, if it is on screen.
    pub fn target(&self, card_id: u64, part: Part) -> Option<Target> {
        let block = self.block(card_id)?;
        let card = Role::Card { id: card_id };
        let path = match part {
            Part::Block => vec![card],
            Part::Delete => vec![Role::DeleteButton, card],
            Part::Badge => vec![Role::Badge, card],
            Part::Field(field) => vec![Role::Field(field), card],
            Part::Input(field) | Part::Save(field) | Part::Cancel(field) => {
                if !block.region(field).is_input() {
                    return None;
                }
                match part {
                    Part::Input(_) => vec![Role::EditInput, Role::Field(field), card],
                    Part::Save(_) => {
                        vec![Role::SaveButton, Role::EditControls, Role::Field(field), card]
                    }
                    _ => vec![Role::CancelButton, Role::EditControls, Role::Field(field), card],
                }
            }
        };
        Some(Target::from_path(path))
    }

    pub fn placeholder_target(&self) -> Option<Target> {
        self.is_empty()
            .then(|| Target::from_path(vec![Role::Placeholder]))
    }
}

/// The addressable pieces of a card block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Part {
    Block,
    Delete,
    Badge,
    Field(EditableField),
    Input(EditableField),
    Save(EditableField),
    Cancel(EditableField),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Container,
    Placeholder,
    Card { id: u64 },
    DeleteButton,
    Badge,
    Field(EditableField),
    EditInput,
    EditControls,
    SaveButton,
    CancelButton,
}

/// An interaction target: the chain of elements from the one hit up to the list
/// container, innermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    path: Vec<Role>,
}

impl Target {
    pub fn container() -> Self {
        Self {
            path: vec![Role::Container],
        }
    }

    fn from_path(mut path: Vec<Role>) -> Self {
        path.push(Role::Container);
        Self { path }
    }

    pub fn path(&self) -> &[Role] {
        &self.path
    }

    pub fn within(&self, role: Role) -> bool {
        self.path.contains(&role)
    }

    pub fn closest_card(&self) -> Option<u64> {
        self.path.iter().find_map(|role| match role {
            Role::Card { id } => Some(*id),
            _ => None,
        })
    }

    pub fn closest_field(&self) -> Option<EditableField> {
        self.path.iter().find_map(|role| match role {
            Role::Field(field) => Some(*field),
            _ => None,
        })
    }
}
