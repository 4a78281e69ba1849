use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use thiserror::Error;
use time::OffsetDateTime;

pub const TITLE_MAX_CHARS: usize = 100;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Category {
    Study,
    Work,
    Personal,
}

/// The fields a user may change in place. Each carries its own validation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum EditableField {
    Title,
    Description,
}

impl EditableField {
    pub fn label(self) -> &'static str {
        match self {
            EditableField::Title => "Title",
            EditableField::Description => "Description",
        }
    }

    pub fn is_multiline(self) -> bool {
        matches!(self, EditableField::Description)
    }

    /// Trims `raw` and checks it against the field's rule, returning the value to store.
    pub fn validate(self, raw: &str) -> Result<String, ValidationError> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(ValidationError::EmptyField(self));
        }
        if self == EditableField::Title {
            let actual = value.chars().count();
            if actual > TITLE_MAX_CHARS {
                return Err(ValidationError::TitleTooLong {
                    max: TITLE_MAX_CHARS,
                    actual,
                });
            }
        }
        Ok(value.to_string())
    }

    pub fn value_of(self, card: &Card) -> &str {
        match self {
            EditableField::Title => &card.title,
            EditableField::Description => &card.description,
        }
    }

    pub(crate) fn replace(self, card: &mut Card, value: String) -> String {
        let slot = match self {
            EditableField::Title => &mut card.title,
            EditableField::Description => &mut card.description,
        };
        std::mem::replace(slot, value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please fill in all fields")]
    MissingFields,
    #[error("{} cannot be empty", .0.label())]
    EmptyField(EditableField),
    #[error("Title must be {max} characters or less")]
    TitleTooLong { max: usize, actual: usize },
    #[error("Unknown category '{0}'")]
    UnknownCategory(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub category: Category,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub updated_at: Option<OffsetDateTime>,
}

impl Card {
    pub fn new(
        id: u64,
        title: impl Into<String>,
        description: impl Into<String>,
        category: Category,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            description: description.into(),
            category,
            created_at: OffsetDateTime::now_utc(),
            updated_at: None,
        }
    }
}

/// Starter cards used when nothing has been persisted yet.
pub fn default_cards() -> Vec<Card> {
    vec![
        Card::new(
            1,
            "Learn DOM Manipulation",
            "Master the fundamentals of DOM",
            Category::Study,
        ),
        Card::new(
            2,
            "Build a Project",
            "Apply knowledge in real project",
            Category::Work,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn title_limit_counts_characters_not_bytes() {
        let accented = "é".repeat(TITLE_MAX_CHARS);
        assert_eq!(
            EditableField::Title.validate(&accented).as_deref(),
            Ok(accented.as_str())
        );
        let over = "é".repeat(TITLE_MAX_CHARS + 1);
        assert_matches!(
            EditableField::Title.validate(&over),
            Err(ValidationError::TitleTooLong { actual: 101, .. })
        );
    }

    #[test]
    fn description_has_no_length_cap() {
        let long = "x".repeat(TITLE_MAX_CHARS * 3);
        assert!(EditableField::Description.validate(&long).is_ok());
    }

    #[test]
    fn whitespace_only_is_empty() {
        assert_eq!(
            EditableField::Description.validate("  \n\t "),
            Err(ValidationError::EmptyField(EditableField::Description))
        );
        assert_eq!(
            ValidationError::EmptyField(EditableField::Description).to_string(),
            "Description cannot be empty"
        );
    }

    #[test]
    fn record_uses_camel_case_and_omits_missing_updated_at() -> anyhow::Result<()> {
        let card = Card::new(7, "Buy milk", "2%", Category::Work);
        let json = serde_json::to_value(&card)?;
        assert_eq!(json["id"], 7);
        assert_eq!(json["category"], "work");
        assert!(json.get("createdAt").is_some());
        assert!(json.get("updatedAt").is_none());
        Ok(())
    }

    #[test]
    fn reads_browser_style_iso_timestamps() -> anyhow::Result<()> {
        let raw = r#"{"id":3,"title":"t","description":"d","category":"study",
            "createdAt":"2024-05-01T10:20:30.123Z","updatedAt":"2024-05-02T08:00:00.000Z"}"#;
        let card: Card = serde_json::from_str(raw)?;
        assert_eq!(card.category, Category::Study);
        assert!(card.updated_at.is_some());
        Ok(())
    }
}
