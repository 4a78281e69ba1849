use std::fmt;
use std::str::FromStr;

use strum::IntoEnumIterator;

use crate::storage::{Card, Category, ValidationError};

pub const ALL_CATEGORIES: &str = "all";

/// Value of the category select: every category, or exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl CategoryFilter {
    pub fn admits(self, category: Category) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(wanted) => wanted == category,
        }
    }

    /// Options in the order the select control shows them.
    pub fn options() -> Vec<CategoryFilter> {
        std::iter::once(CategoryFilter::All)
            .chain(Category::iter().map(CategoryFilter::Only))
            .collect()
    }

    pub fn next(self) -> CategoryFilter {
        let options = Self::options();
        let idx = options.iter().position(|opt| *opt == self).unwrap_or(0);
        options[(idx + 1) % options.len()]
    }
}

impl fmt::Display for CategoryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryFilter::All => f.write_str(ALL_CATEGORIES),
            CategoryFilter::Only(category) => write!(f, "{category}"),
        }
    }
}

impl FromStr for CategoryFilter {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case(ALL_CATEGORIES) {
            return Ok(CategoryFilter::All);
        }
        trimmed
            .parse::<Category>()
            .map(CategoryFilter::Only)
            .map_err(|_| ValidationError::UnknownCategory(trimmed.to_string()))
    }
}

/// Current search box and category select values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchCriteria {
    pub term: String,
    pub category: CategoryFilter,
}

impl SearchCriteria {
    pub fn new(term: impl Into<String>, category: CategoryFilter) -> Self {
        Self {
            term: term.into(),
            category,
        }
    }

    pub fn apply<'a>(&self, cards: &'a [Card]) -> Vec<&'a Card> {
        filter_cards(cards, &self.term, self.category)
    }
}

pub fn filter_cards<'a>(cards: &'a [Card], term: &str, category: CategoryFilter) -> Vec<&'a Card> {
    let needle = term.to_lowercase();
    cards
        .iter()
        .filter(|card| category.admits(card.category))
        .filter(|card| matches_term(card, &needle))
        .collect()
}

fn matches_term(card: &Card, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    card.title.to_lowercase().contains(needle) || card.description.to_lowercase().contains(needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::default_cards;

    fn sample() -> Vec<Card> {
        let mut cards = vec![Card::new(3, "Buy milk", "2%", Category::Work)];
        cards.extend(default_cards());
        cards
    }

    fn ids(cards: &[&Card]) -> Vec<u64> {
        cards.iter().map(|card| card.id).collect()
    }

    #[test]
    fn empty_term_and_all_is_identity() {
        let cards = sample();
        assert_eq!(ids(&filter_cards(&cards, "", CategoryFilter::All)), vec![3, 1, 2]);
    }

    #[test]
    fn term_matches_title_or_description_ignoring_case() {
        let cards = sample();
        assert_eq!(ids(&filter_cards(&cards, "MILK", CategoryFilter::All)), vec![3]);
        assert_eq!(ids(&filter_cards(&cards, "2%", CategoryFilter::All)), vec![3]);
        let broad = filter_cards(&cards, "b", CategoryFilter::All);
        assert_eq!(ids(&broad), vec![3, 2]);
    }

    #[test]
    fn category_and_term_are_combined() {
        let cards = sample();
        let study = CategoryFilter::Only(Category::Study);
        assert!(filter_cards(&cards, "milk", study).is_empty());
        assert_eq!(ids(&filter_cards(&cards, "", study)), vec![1]);
        let work = CategoryFilter::Only(Category::Work);
        assert_eq!(ids(&filter_cards(&cards, "milk", work)), vec![3]);
    }

    #[test]
    fn category_filter_parses_select_values() {
        assert_eq!("all".parse::<CategoryFilter>().ok(), Some(CategoryFilter::All));
        assert_eq!(
            "Work".parse::<CategoryFilter>().ok(),
            Some(CategoryFilter::Only(Category::Work))
        );
        assert!("errands".parse::<CategoryFilter>().is_err());
        assert_eq!(CategoryFilter::Only(Category::Personal).next(), CategoryFilter::All);
        assert_eq!(CategoryFilter::All.to_string(), "all");
    }
}
