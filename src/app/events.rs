use bitflags::bitflags;
use indexmap::IndexMap;

use crate::view::Target;

/// Form field names the creation form must expose.
pub const FORM_FIELDS: [&str; 3] = ["title", "description", "category"];

/// An interaction reported by the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    /// The creation form was submitted.
    Submit(CardForm),
    /// The search box changed to the given value.
    SearchInput(String),
    /// The category select changed to the given value.
    CategoryChange(String),
    Click(Target),
    DoubleClick(Target),
    /// A key pressed while the edit input has focus.
    Key(KeyPress),
}

/// Submitted creation form values, keyed by field name in form order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardForm {
    values: IndexMap<String, String>,
}

impl CardForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(name.to_string(), value.into());
    }

    /// Missing fields read as empty, like an untouched form control.
    pub fn value(&self, name: &str) -> &str {
        self.values.get(name).map(String::as_str).unwrap_or("")
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Modifiers: u8 {
        const CTRL = 0b0001;
        const ALT = 0b0010;
        const SHIFT = 0b0100;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Enter,
    Escape,
    Backspace,
    Delete,
    Left,
    Right,
    Home,
    End,
    Tab,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPress {
    pub key: Key,
    pub modifiers: Modifiers,
}

impl KeyPress {
    pub fn plain(key: Key) -> Self {
        Self {
            key,
            modifiers: Modifiers::empty(),
        }
    }

    pub fn ctrl(key: Key) -> Self {
        Self {
            key,
            modifiers: Modifiers::CTRL,
        }
    }

    pub fn is_ctrl(&self) -> bool {
        self.modifiers.contains(Modifiers::CTRL)
    }
}

/// The handles the surface declares when it binds to the dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurfaceHandles {
    pub list_container: bool,
    pub form_fields: Vec<String>,
    pub search_input: bool,
    pub category_options: Vec<String>,
}
