use std::time::{Duration, Instant};

use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::Frame;
use regex::Regex;
use unicode_width::UnicodeWidthStr;

use crate::app::state::{FormField, HitMap, InputMode, NewCardOverlay};
use crate::app::{AppState, Dispatcher, EditSession, Focus};
use crate::config::Palette;
use crate::highlight::{build_highlight_regex, split_matches};
use crate::storage::EditableField;
use crate::view::{
    CardBlock, CardListView, Part, RegionContent, Target, CANCEL_LABEL, DELETE_LABEL, SAVE_LABEL,
};

#[derive(Debug, Clone, Copy)]
pub struct DrawContext {
    pub palette: Palette,
    pub now: Instant,
    pub exit_animation: Duration,
}

pub fn draw_app(frame: &mut Frame, state: &mut AppState, dispatcher: &Dispatcher, ctx: DrawContext) {
    state.hit_map.clear();
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(2),
        ])
        .split(frame.size());

    draw_header(frame, state, &ctx, vertical[0]);
    draw_cards(frame, state, dispatcher, &ctx, vertical[1]);

    let status = build_status_line(state, dispatcher);
    let status_paragraph = Paragraph::new(status).style(Style::default().fg(ctx.palette.muted));
    frame.render_widget(status_paragraph, vertical[2]);

    render_overlay(frame, state, &ctx);
}

fn draw_header(frame: &mut Frame, state: &AppState, ctx: &DrawContext, area: Rect) {
    let searching = state.mode() == InputMode::Search;
    let search = state.search_input();
    let term_span = if search.value().is_empty() && !searching {
        Span::styled("press / to search", Style::default().fg(ctx.palette.muted))
    } else {
        Span::raw(search.value().to_string())
    };
    let line = Line::from(vec![
        Span::styled("Search: ", Style::default().add_modifier(Modifier::BOLD)),
        term_span,
        Span::raw("   "),
        Span::styled("Category: ", Style::default().add_modifier(Modifier::BOLD)),
        Span::styled(
            state.category().to_string(),
            Style::default().fg(ctx.palette.accent),
        ),
    ]);
    let border_style = if searching {
        Style::default().fg(ctx.palette.accent)
    } else {
        Style::default()
    };
    let block = Block::default()
        .title(" cardtui ")
        .borders(Borders::ALL)
        .border_style(border_style);
    let inner = block.inner(area);
    frame.render_widget(Paragraph::new(line).block(block), area);

    if searching {
        let (_, before) = search.line_before_cursor();
        let x = inner.x + "Search: ".len() as u16 + before.width() as u16;
        if x < inner.right() {
            frame.set_cursor(x, inner.y);
        }
    }
}

struct CardLayout {
    title_rows: u16,
    description_rows: u16,
    controls: Option<EditableField>,
}

impl CardLayout {
    fn of(block: &CardBlock, session: Option<&EditSession>) -> Self {
        let rows = |field: EditableField| -> u16 {
            match &block.region(field).content {
                RegionContent::Text(text) => line_count(text),
                RegionContent::Input { .. } => session
                    .filter(|s| s.card_id == block.card_id && s.field == field)
                    .map(|s| line_count(s.input.value()))
                    .unwrap_or(1),
            }
        };
        let controls = [EditableField::Title, EditableField::Description]
            .into_iter()
            .find(|field| block.region(*field).is_input());
        Self {
            title_rows: rows(EditableField::Title),
            description_rows: rows(EditableField::Description),
            controls,
        }
    }

    fn field_rows(&self, field: EditableField) -> u16 {
        match field {
            EditableField::Title => self.title_rows,
            EditableField::Description => self.description_rows,
        }
    }

    fn height(&self) -> u16 {
        // borders + badge + optional control row
        self.title_rows
            .saturating_add(self.description_rows)
            .saturating_add(3 + u16::from(self.controls.is_some()))
    }
}

fn line_count(text: &str) -> u16 {
    text.split('\n').count().clamp(1, u16::MAX as usize) as u16
}

/// First block to draw so that `selected` fits in `available` rows.
fn scroll_start(heights: &[u16], selected: usize, available: u16) -> usize {
    if heights.is_empty() {
        return 0;
    }
    let selected = selected.min(heights.len() - 1);
    let mut start = 0;
    let span = |start: usize| -> u32 { heights[start..=selected].iter().map(|h| u32::from(*h)).sum() };
    while start < selected && span(start) > u32::from(available) {
        start += 1;
    }
    start
}

fn draw_cards(
    frame: &mut Frame,
    state: &mut AppState,
    dispatcher: &Dispatcher,
    ctx: &DrawContext,
    area: Rect,
) {
    let view = dispatcher.view();
    let outer = Block::default()
        .title(format!(" Cards {}/{} ", view.len(), dispatcher.store().len()))
        .borders(Borders::ALL);
    let inner = outer.inner(area);
    frame.render_widget(outer, area);
    state.hit_map.push(inner, Target::container());

    if let CardListView::Empty { message } = view {
        let row = Rect {
            y: inner.y + inner.height / 2,
            height: inner.height.min(1),
            ..inner
        };
        let placeholder = Paragraph::new(Line::from(Span::styled(
            message.clone(),
            Style::default()
                .fg(ctx.palette.muted)
                .add_modifier(Modifier::ITALIC),
        )))
        .alignment(Alignment::Center);
        frame.render_widget(placeholder, row);
        if let Some(target) = view.placeholder_target() {
            state.hit_map.push(row, target);
        }
        return;
    }

    let regex = build_highlight_regex(&dispatcher.criteria().term);
    let session = dispatcher.edit_session();
    let layouts: Vec<CardLayout> = view
        .blocks()
        .iter()
        .map(|block| CardLayout::of(block, session))
        .collect();
    let heights: Vec<u16> = layouts.iter().map(CardLayout::height).collect();
    let start = scroll_start(&heights, state.selected, inner.height);

    let mut y = inner.y;
    for (idx, (block, layout)) in view.blocks().iter().zip(&layouts).enumerate().skip(start) {
        let remaining = inner.bottom().saturating_sub(y);
        if remaining < 3 {
            break;
        }
        let rect = Rect::new(inner.x, y, inner.width, layout.height().min(remaining));
        let card = CardDraw {
            view,
            block,
            layout,
            selected: idx == state.selected,
            session,
            focus: dispatcher.focus(),
            regex: regex.as_ref(),
            exit_progress: state.exit_progress(block.card_id, ctx.now, ctx.exit_animation),
        };
        card.draw(frame, &mut state.hit_map, ctx, rect);
        y += rect.height;
    }
}

struct CardDraw<'a> {
    view: &'a CardListView,
    block: &'a CardBlock,
    layout: &'a CardLayout,
    selected: bool,
    session: Option<&'a EditSession>,
    focus: Focus,
    regex: Option<&'a Regex>,
    exit_progress: Option<f32>,
}

impl CardDraw<'_> {
    fn draw(&self, frame: &mut Frame, hits: &mut HitMap, ctx: &DrawContext, rect: Rect) {
        let palette = &ctx.palette;
        let card_id = self.block.card_id;
        let base = if self.block.exiting {
            Style::default()
                .fg(palette.muted)
                .add_modifier(Modifier::DIM | Modifier::CROSSED_OUT)
        } else {
            Style::default()
        };
        let border_style = if self.block.exiting {
            base
        } else if self.block.editing {
            Style::default().fg(palette.editing)
        } else if self.selected {
            Style::default()
                .fg(palette.accent)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        let mut title = format!(" #{card_id} ");
        if self.block.editing {
            title.push_str("editing ");
        }
        if self.block.exiting {
            let percent = (self.exit_progress.unwrap_or(0.0) * 100.0).round() as u8;
            title.push_str(&format!("deleting {percent}% "));
        }
        let frame_block = Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(border_style);
        let inner = frame_block.inner(rect);
        frame.render_widget(frame_block, rect);
        self.push_hit(hits, rect, Part::Block);

        let delete_width = DELETE_LABEL.width() as u16 + 2;
        if rect.width > delete_width + 2 {
            let delete = Rect::new(rect.right() - delete_width - 1, rect.y, delete_width, 1);
            frame.render_widget(
                Paragraph::new(Span::styled(
                    format!("[{DELETE_LABEL}]"),
                    Style::default().fg(palette.alert),
                )),
                delete,
            );
            self.push_hit(hits, delete, Part::Delete);
        }

        let mut y = inner.y;
        for field in [EditableField::Title, EditableField::Description] {
            let rows = self.layout.field_rows(field);
            let area = Rect::new(inner.x, y, inner.width, rows).intersection(inner);
            self.draw_region(frame, hits, ctx, field, area, base);
            y = y.saturating_add(rows);
            if self.layout.controls == Some(field) {
                let row = Rect::new(inner.x, y, inner.width, 1).intersection(inner);
                self.draw_controls(frame, hits, ctx, field, row);
                y = y.saturating_add(1);
            }
        }

        let badge_text = format!("[{}]", self.block.badge);
        let badge = Rect::new(inner.x, y, badge_text.width() as u16, 1).intersection(inner);
        frame.render_widget(
            Paragraph::new(Span::styled(
                badge_text,
                Style::default()
                    .fg(palette.category(self.block.category))
                    .add_modifier(Modifier::BOLD),
            )),
            badge,
        );
        self.push_hit(hits, badge, Part::Badge);
    }

    fn draw_region(
        &self,
        frame: &mut Frame,
        hits: &mut HitMap,
        ctx: &DrawContext,
        field: EditableField,
        area: Rect,
        base: Style,
    ) {
        let region = self.block.region(field);
        let field_style = match field {
            EditableField::Title => base.add_modifier(Modifier::BOLD),
            EditableField::Description => base,
        };
        self.push_hit(hits, area, Part::Field(field));
        match &region.content {
            RegionContent::Text(text) => {
                let highlight = Style::default()
                    .fg(ctx.palette.accent)
                    .add_modifier(Modifier::BOLD | Modifier::UNDERLINED);
                let lines: Vec<Line<'static>> = text
                    .split('\n')
                    .map(|line| Line::from(highlight_spans(line, self.regex, field_style, highlight)))
                    .collect();
                frame.render_widget(Paragraph::new(lines), area);
            }
            RegionContent::Input { .. } => {
                let Some(session) = self.session.filter(|s| s.card_id == self.block.card_id) else {
                    return;
                };
                let input_style = if session.input.is_selected() {
                    Style::default().add_modifier(Modifier::REVERSED)
                } else {
                    Style::default().fg(ctx.palette.editing)
                };
                let lines: Vec<Line<'static>> = session
                    .input
                    .value()
                    .split('\n')
                    .map(|line| Line::from(Span::styled(line.to_string(), input_style)))
                    .collect();
                frame.render_widget(Paragraph::new(lines), area);
                self.push_hit(hits, area, Part::Input(field));

                let focused = self.focus
                    == Focus::EditInput {
                        card_id: session.card_id,
                        field,
                    };
                if focused {
                    let (row, before) = session.input.line_before_cursor();
                    let x = area.x + (before.width() as u16).min(area.width.saturating_sub(1));
                    let y = area.y + row as u16;
                    if y < area.bottom() {
                        frame.set_cursor(x, y);
                    }
                }
            }
        }
    }

    fn draw_controls(
        &self,
        frame: &mut Frame,
        hits: &mut HitMap,
        ctx: &DrawContext,
        field: EditableField,
        row: Rect,
    ) {
        let save_text = format!("[ {SAVE_LABEL} ]");
        let cancel_text = format!("[ {CANCEL_LABEL} ]");
        let save = Rect::new(row.x, row.y, save_text.width() as u16, 1).intersection(row);
        let cancel = Rect::new(save.right() + 1, row.y, cancel_text.width() as u16, 1).intersection(row);
        frame.render_widget(
            Paragraph::new(Span::styled(
                save_text,
                Style::default()
                    .fg(ctx.palette.accent)
                    .add_modifier(Modifier::BOLD),
            )),
            save,
        );
        frame.render_widget(
            Paragraph::new(Span::styled(cancel_text, Style::default().fg(ctx.palette.muted))),
            cancel,
        );
        self.push_hit(hits, save, Part::Save(field));
        self.push_hit(hits, cancel, Part::Cancel(field));
    }

    fn push_hit(&self, hits: &mut HitMap, area: Rect, part: Part) {
        if let Some(target) = self.view.target(self.block.card_id, part) {
            hits.push(area, target);
        }
    }
}

fn highlight_spans(
    text: &str,
    regex: Option<&Regex>,
    base_style: Style,
    highlight_style: Style,
) -> Vec<Span<'static>> {
    split_matches(regex, text)
        .into_iter()
        .map(|(chunk, matched)| {
            let style = if matched {
                base_style.patch(highlight_style)
            } else {
                base_style
            };
            Span::styled(chunk.to_string(), style)
        })
        .collect()
}

fn build_status_line(state: &AppState, dispatcher: &Dispatcher) -> Text<'static> {
    let view = dispatcher.view();
    let position = if view.is_empty() {
        "0/0".to_string()
    } else {
        format!("{}/{}", state.selected + 1, view.len())
    };
    let mode = if dispatcher.edit_session().is_some() {
        "Editing"
    } else if state.form().is_some() {
        "New card"
    } else if state.mode() == InputMode::Search {
        "Search"
    } else {
        "Browse"
    };
    let mut first = vec![
        Span::raw(format!("Total: {} ", dispatcher.store().len())),
        Span::raw(" | Selected: "),
        Span::styled(position, Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(" | Mode: "),
        Span::styled(mode, Style::default().add_modifier(Modifier::BOLD)),
    ];
    if let Some(message) = state.status_message() {
        first.push(Span::raw(" | "));
        first.push(Span::raw(message.to_string()));
    }

    let hints = match dispatcher.edit_session() {
        Some(session) if session.field.is_multiline() => {
            "Ctrl+Enter/Ctrl+S save • Enter newline • Esc cancel"
        }
        Some(_) => "Enter/Ctrl+S save • Esc cancel",
        None if state.mode() == InputMode::Search => "Type to filter • Enter keep • Esc clear",
        None => "a new • / search • c category • e/E edit • d delete • j/k move • q quit",
    };
    Text::from(vec![Line::from(first), Line::from(hints)])
}

fn render_overlay(frame: &mut Frame, state: &AppState, ctx: &DrawContext) {
    if let Some(form) = state.form() {
        render_form(frame, form, ctx);
    }
    if let Some(message) = state.current_alert() {
        let area = centered_rect(50, 25, frame.size());
        frame.render_widget(Clear, area);
        let paragraph = Paragraph::new(vec![
            Line::from(Span::styled(
                message.to_string(),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(Span::styled(
                "Enter or Esc to dismiss",
                Style::default().fg(ctx.palette.muted),
            )),
        ])
        .block(
            Block::default()
                .title("Alert")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(ctx.palette.alert)),
        )
        .wrap(Wrap { trim: false });
        frame.render_widget(paragraph, area);
    }
}

fn render_form(frame: &mut Frame, form: &NewCardOverlay, ctx: &DrawContext) {
    let area = centered_rect(60, 40, frame.size());
    frame.render_widget(Clear, area);
    let label = |field: FormField, text: &'static str| -> Vec<Span<'static>> {
        let active = form.field == field;
        let style = if active {
            Style::default()
                .fg(ctx.palette.accent)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        vec![
            Span::styled(if active { "› " } else { "  " }, style),
            Span::styled(text, style),
        ]
    };
    let mut title_line = label(FormField::Title, "Title: ");
    title_line.push(Span::raw(form.title.value().to_string()));
    let mut description_line = label(FormField::Description, "Description: ");
    description_line.push(Span::raw(form.description.value().to_string()));
    let mut category_line = label(FormField::Category, "Category: ");
    category_line.push(Span::raw(match form.category {
        Some(category) => format!("< {category} >"),
        None => "< choose >".to_string(),
    }));

    let block = Block::default()
        .title("New Card")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(ctx.palette.accent));
    let inner = block.inner(area);
    let paragraph = Paragraph::new(vec![
        Line::from(Span::styled(
            "Create New Card",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(title_line),
        Line::from(description_line),
        Line::from(category_line),
        Line::from(""),
        Line::from(Span::styled(
            "Tab next field • ←/→ category • Enter create • Esc close",
            Style::default().fg(ctx.palette.muted),
        )),
    ])
    .block(block);
    frame.render_widget(paragraph, area);

    let cursor = match form.field {
        FormField::Title => Some((2u16, "› Title: ", &form.title)),
        FormField::Description => Some((3u16, "› Description: ", &form.description)),
        FormField::Category => None,
    };
    if let Some((row, prefix, input)) = cursor {
        let (_, before) = input.line_before_cursor();
        let x = inner.x + prefix.width() as u16 + before.width() as u16;
        let y = inner.y + row;
        if x < inner.right() && y < inner.bottom() {
            frame.set_cursor(x, y);
        }
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Percentage((100 - percent_y) / 2),
                Constraint::Percentage(percent_y),
                Constraint::Percentage((100 - percent_y) / 2),
            ]
            .as_ref(),
        )
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints(
            [
                Constraint::Percentage((100 - percent_x) / 2),
                Constraint::Percentage(percent_x),
                Constraint::Percentage((100 - percent_x) / 2),
            ]
            .as_ref(),
        )
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{CardForm, UiEvent};
    use crate::config::AppConfig;
    use crate::storage::{CardStore, MemoryKeyValueStore};
    use crate::view::Role;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    #[test]
    fn card_height_saturates_for_huge_fields() {
        let layout = CardLayout {
            title_rows: u16::MAX,
            description_rows: 4,
            controls: Some(EditableField::Title),
        };
        assert_eq!(layout.height(), u16::MAX);

        let plain = CardLayout {
            title_rows: 1,
            description_rows: 2,
            controls: None,
        };
        assert_eq!(plain.height(), 6);
    }

    fn dispatcher(seed: bool) -> Dispatcher {
        let kv = MemoryKeyValueStore::new();
        let store = if seed {
            CardStore::with_defaults(Box::new(kv), "cards")
        } else {
            CardStore::new(Box::new(kv), "cards")
        };
        Dispatcher::bind(store, &AppState::surface_handles()).expect("bind")
    }

    fn draw(state: &mut AppState, dispatcher: &Dispatcher) -> String {
        let backend = TestBackend::new(70, 24);
        let mut terminal = Terminal::new(backend).expect("terminal");
        let ctx = DrawContext {
            palette: AppConfig::default().palette(),
            now: Instant::now(),
            exit_animation: Duration::from_millis(300),
        };
        terminal
            .draw(|frame| draw_app(frame, state, dispatcher, ctx))
            .expect("draw");
        let buffer = terminal.backend().buffer();
        buffer
            .content()
            .chunks(buffer.area.width as usize)
            .map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn find_hit(state: &AppState, role: Role, card_id: u64) -> bool {
        (0..24).any(|y| {
            (0..70).any(|x| {
                state
                    .hit_map
                    .hit(x, y)
                    .is_some_and(|t| t.within(role) && t.closest_card() == Some(card_id))
            })
        })
    }

    #[test]
    fn draws_cards_and_records_targets() {
        let d = dispatcher(true);
        let mut state = AppState::new();
        let screen = draw(&mut state, &d);
        assert!(screen.contains("Learn DOM Manipulation"));
        assert!(screen.contains("[work]"));
        assert!(find_hit(&state, Role::DeleteButton, 1));
        assert!(find_hit(&state, Role::Field(EditableField::Description), 2));
        assert!(find_hit(&state, Role::Badge, 2));
    }

    #[test]
    fn empty_list_shows_placeholder() {
        let d = dispatcher(false);
        let mut state = AppState::new();
        let screen = draw(&mut state, &d);
        assert!(screen.contains("No cards yet. Create your first card!"));
    }

    #[test]
    fn editing_draws_controls() {
        let mut d = dispatcher(true);
        let target = d.view().target(1, Part::Field(EditableField::Title)).expect("target");
        d.handle(UiEvent::DoubleClick(target));
        let mut state = AppState::new();
        let screen = draw(&mut state, &d);
        assert!(screen.contains("[ Save ]"));
        assert!(screen.contains("editing"));
        assert!(find_hit(&state, Role::SaveButton, 1));
        assert!(!find_hit(&state, Role::SaveButton, 2));
    }

    #[test]
    fn alert_overlay_shows_message() {
        let mut d = dispatcher(true);
        let mut state = AppState::new();
        for effect in d.handle(UiEvent::Submit(CardForm::new())) {
            if let crate::app::Effect::Alert(alert) = effect {
                state.push_alert(alert.to_string());
            }
        }
        let screen = draw(&mut state, &d);
        assert!(screen.contains("Please fill in all fields"));
    }

    #[test]
    fn scroll_keeps_selection_visible() {
        let heights = [5, 5, 5, 5];
        assert_eq!(scroll_start(&heights, 0, 10), 0);
        assert_eq!(scroll_start(&heights, 1, 10), 0);
        assert_eq!(scroll_start(&heights, 3, 10), 2);
        assert_eq!(scroll_start(&heights, 3, 3), 3);
        assert_eq!(scroll_start(&[], 2, 10), 0);
    }
}
