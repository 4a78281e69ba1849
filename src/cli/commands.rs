use std::fmt::Write as _;
use std::io::{self, Read};

use anyhow::{bail, Context, Result};
use clap::Args;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::app::App;
use crate::search::{filter_cards, CategoryFilter};
use crate::storage::{Card, CardStore, Category, EditableField, ValidationError};
use crate::view::EMPTY_MESSAGE;

#[derive(Args, Debug, Clone, Default)]
pub struct TuiArgs {
    /// Keep cards in memory only; nothing is written to disk
    #[arg(long)]
    pub ephemeral: bool,
}

#[derive(Args, Debug, Clone)]
pub struct NewArgs {
    /// Title for the card (prompted if omitted)
    #[arg()]
    pub title: Option<String>,
    /// Provide the description inline. If omitted, reads from stdin.
    #[arg(long)]
    pub description: Option<String>,
    /// Category: study, work or personal
    #[arg(long)]
    pub category: String,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Case-insensitive substring matched against title and description
    #[arg(long, default_value = "")]
    pub search: String,
    /// Category to keep, or "all"
    #[arg(long, default_value = "all")]
    pub category: String,
}

#[derive(Args, Debug, Clone)]
pub struct DeleteArgs {
    /// Card identifier
    pub id: u64,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    /// Card identifier
    pub id: u64,
    /// Field to replace (title or description)
    #[arg(long)]
    pub field: EditableField,
    /// New value (whitespace trimmed)
    pub value: String,
}

pub fn run_tui(app: &mut App) -> Result<()> {
    app.run()
}

pub fn create_card(store: &mut CardStore, args: NewArgs) -> Result<String> {
    let title = match args.title {
        Some(t) => t,
        None => prompt("Title")?,
    };
    let description = match args.description {
        Some(description) => description,
        None => read_stdin()?.unwrap_or_default(),
    };
    let category = parse_category(&args.category)?;

    let card = store
        .create(&title, &description, Some(category))
        .context("creating card")?;
    Ok(format!(
        "Created card #{} [{}] {}\n",
        card.id, card.category, card.title
    ))
}

pub fn list_cards(store: &CardStore, args: &ListArgs) -> Result<String> {
    let category: CategoryFilter = args
        .category
        .parse()
        .with_context(|| format!("parsing category filter '{}'", args.category))?;
    if store.is_empty() {
        return Ok(format!("{EMPTY_MESSAGE}\n"));
    }
    let cards = filter_cards(store.cards(), &args.search, category);
    Ok(format_cards(&cards))
}

pub fn delete_card(store: &mut CardStore, args: &DeleteArgs) -> Result<String> {
    let id = args.id;
    let removed = store
        .delete(id)
        .with_context(|| format!("deleting card {id}"))?;
    if !removed {
        bail!("card #{id} not found");
    }
    Ok(format!("Deleted card #{id}\n"))
}

pub fn edit_card(store: &mut CardStore, args: &EditArgs) -> Result<String> {
    let card = store
        .update_field(args.id, args.field, &args.value)
        .with_context(|| format!("updating {} of card {}", args.field, args.id))?;
    Ok(format!(
        "Updated {} of card #{}: {}\n",
        args.field,
        card.id,
        args.field.value_of(&card)
    ))
}

fn parse_category(raw: &str) -> Result<Category> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingFields.into());
    }
    trimmed
        .parse::<Category>()
        .map_err(|_| ValidationError::UnknownCategory(trimmed.to_string()).into())
}

fn format_cards(cards: &[&Card]) -> String {
    if cards.is_empty() {
        return "No matches found.\n".to_string();
    }
    let mut out = String::new();
    for card in cards {
        let _ = writeln!(&mut out, "#{}  [{}]  {}", card.id, card.category, card.title);
        for line in card.description.lines() {
            let _ = writeln!(&mut out, "    {line}");
        }
        let _ = writeln!(&mut out, "    created {}", format_timestamp(card.created_at));
        if let Some(updated) = card.updated_at {
            let _ = writeln!(&mut out, "    updated {}", format_timestamp(updated));
        }
    }
    out
}

fn format_timestamp(at: OffsetDateTime) -> String {
    at.format(&Rfc3339)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

fn prompt(label: &str) -> Result<String> {
    use std::io::Write;
    let mut stdout = io::stdout();
    write!(stdout, "{}: ", label)?;
    stdout.flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim_end().to_owned())
}

fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(Some(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, ConfigPaths};
    use crate::storage::{self, MemoryKeyValueStore, StoreError};
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    type TestResult<T = ()> = Result<T>;

    fn memory_store() -> CardStore {
        CardStore::with_defaults(Box::new(MemoryKeyValueStore::new()), "cards")
    }

    fn new_args(title: &str, description: &str, category: &str) -> NewArgs {
        NewArgs {
            title: Some(title.into()),
            description: Some(description.into()),
            category: category.into(),
        }
    }

    #[test]
    fn cli_new_prepends_card_with_fresh_id() -> TestResult {
        let mut store = memory_store();
        let output = create_card(&mut store, new_args("Buy milk", "2%", "work"))?;
        assert_eq!(output, "Created card #3 [work] Buy milk\n");
        assert_eq!(store.cards()[0].title, "Buy milk");
        assert_eq!(store.len(), 3);
        Ok(())
    }

    #[test]
    fn cli_new_rejects_unknown_category() {
        let mut store = memory_store();
        let err = create_card(&mut store, new_args("Buy milk", "2%", "chores"))
            .expect_err("unknown category");
        assert_matches!(
            err.downcast_ref::<ValidationError>(),
            Some(ValidationError::UnknownCategory(name)) if name == "chores"
        );
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn cli_new_requires_description() {
        let mut store = memory_store();
        let err = create_card(&mut store, new_args("Buy milk", "   ", "work"))
            .expect_err("blank description");
        assert_matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::Validation(ValidationError::MissingFields))
        );
    }

    #[test]
    fn cli_list_filters_by_term_and_category() -> TestResult {
        let mut store = memory_store();
        create_card(&mut store, new_args("Buy milk", "2%", "work"))?;

        let args = ListArgs {
            search: "MILK".into(),
            category: "all".into(),
        };
        let output = list_cards(&store, &args)?;
        assert!(output.contains("#3  [work]  Buy milk"));
        assert!(!output.contains("Build a Project"));

        let args = ListArgs {
            search: "milk".into(),
            category: "study".into(),
        };
        assert_eq!(list_cards(&store, &args)?, "No matches found.\n");
        Ok(())
    }

    #[test]
    fn cli_list_reports_empty_board() -> TestResult {
        let store = CardStore::new(Box::new(MemoryKeyValueStore::new()), "cards");
        let args = ListArgs {
            search: String::new(),
            category: "all".into(),
        };
        let output = list_cards(&store, &args)?;
        assert_eq!(output, format!("{EMPTY_MESSAGE}\n"));
        Ok(())
    }

    #[test]
    fn cli_delete_and_edit_report_missing_cards() -> TestResult {
        let mut store = memory_store();
        assert_eq!(delete_card(&mut store, &DeleteArgs { id: 2 })?, "Deleted card #2\n");
        assert!(delete_card(&mut store, &DeleteArgs { id: 2 }).is_err());

        let args = EditArgs {
            id: 2,
            field: EditableField::Title,
            value: "Gone".into(),
        };
        let err = edit_card(&mut store, &args).expect_err("missing card");
        assert_matches!(err.downcast_ref::<StoreError>(), Some(StoreError::NotFound(2)));
        Ok(())
    }

    #[test]
    fn cli_edit_persists_to_sqlite() -> TestResult {
        let temp = TempDir::new().context("creating temp dir")?;
        let paths = ConfigPaths::rooted_at(temp.path());
        paths.ensure_directories()?;
        let options = AppConfig::default().storage;

        let mut store = storage::init(&paths, &options)?;
        let args = EditArgs {
            id: 1,
            field: EditableField::Description,
            value: "  Events and selectors  ".into(),
        };
        let output = edit_card(&mut store, &args)?;
        assert_eq!(output, "Updated description of card #1: Events and selectors\n");
        drop(store);

        let reopened = storage::init(&paths, &options)?;
        let card = reopened.get(1).context("card 1 present")?;
        assert_eq!(card.description, "Events and selectors");
        assert!(card.updated_at.is_some());
        Ok(())
    }
}
