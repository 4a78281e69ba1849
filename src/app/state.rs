use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use ratatui::layout::Rect;
use strum::IntoEnumIterator;

use crate::app::events::{CardForm, SurfaceHandles};
use crate::app::input::LineEditor;
use crate::search::CategoryFilter;
use crate::storage::Category;
use crate::view::Target;

/// Two clicks on the same target within this window form a double-click.
pub const DOUBLE_CLICK_WINDOW: Duration = Duration::from_millis(400);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Search,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Title,
    Description,
    Category,
}

impl FormField {
    pub const ALL: [FormField; 3] = [FormField::Title, FormField::Description, FormField::Category];

    /// Name the form reports the field under.
    pub fn name(self) -> &'static str {
        match self {
            FormField::Title => "title",
            FormField::Description => "description",
            FormField::Category => "category",
        }
    }

    fn step(self, delta: isize) -> FormField {
        let idx = Self::ALL.iter().position(|f| *f == self).unwrap_or(0) as isize;
        let len = Self::ALL.len() as isize;
        Self::ALL[(idx + delta).rem_euclid(len) as usize]
    }
}

#[derive(Debug, Clone)]
pub struct NewCardOverlay {
    pub title: LineEditor,
    pub description: LineEditor,
    pub category: Option<Category>,
    pub field: FormField,
}

impl Default for NewCardOverlay {
    fn default() -> Self {
        Self {
            title: LineEditor::new("", false),
            description: LineEditor::new("", false),
            category: None,
            field: FormField::Title,
        }
    }
}

impl NewCardOverlay {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn next_field(&mut self) {
        self.field = self.field.step(1);
    }

    pub fn previous_field(&mut self) {
        self.field = self.field.step(-1);
    }

    /// Steps through "unset" followed by every category.
    pub fn cycle_category(&mut self, delta: isize) {
        let options: Vec<Option<Category>> = std::iter::once(None)
            .chain(Category::iter().map(Some))
            .collect();
        let idx = options.iter().position(|c| *c == self.category).unwrap_or(0) as isize;
        let len = options.len() as isize;
        self.category = options[(idx + delta).rem_euclid(len) as usize];
    }

    pub fn active_input_mut(&mut self) -> Option<&mut LineEditor> {
        match self.field {
            FormField::Title => Some(&mut self.title),
            FormField::Description => Some(&mut self.description),
            FormField::Category => None,
        }
    }

    pub fn to_form(&self) -> CardForm {
        CardForm::new()
            .with(FormField::Title.name(), self.title.value())
            .with(FormField::Description.name(), self.description.value())
            .with(
                FormField::Category.name(),
                self.category.map(|c| c.to_string()).unwrap_or_default(),
            )
    }
}

pub struct ExitAnimation {
    pub card_id: u64,
    started: Instant,
    done: Sender<()>,
}

/// Screen areas of the last frame and what they address, in draw order.
#[derive(Debug, Default)]
pub struct HitMap {
    regions: Vec<(Rect, Target)>,
}

impl HitMap {
    pub fn clear(&mut self) {
        self.regions.clear();
    }

    pub fn push(&mut self, area: Rect, target: Target) {
        if area.width > 0 && area.height > 0 {
            self.regions.push((area, target));
        }
    }

    /// The innermost (last drawn) region under the point.
    pub fn hit(&self, column: u16, row: u16) -> Option<&Target> {
        self.regions
            .iter()
            .rev()
            .find(|(area, _)| {
                column >= area.x
                    && column < area.x + area.width
                    && row >= area.y
                    && row < area.y + area.height
            })
            .map(|(_, target)| target)
    }
}

#[derive(Debug, Default)]
struct ClickTracker {
    last: Option<(Target, Instant)>,
}

impl ClickTracker {
    fn register(&mut self, target: &Target, now: Instant) -> bool {
        let double = matches!(
            &self.last,
            Some((prev, at)) if prev == target && now.duration_since(*at) <= DOUBLE_CLICK_WINDOW
        );
        self.last = if double {
            None
        } else {
            Some((target.clone(), now))
        };
        double
    }
}

pub struct AppState {
    pub selected: usize,
    mode: InputMode,
    search: LineEditor,
    category: CategoryFilter,
    form: Option<NewCardOverlay>,
    alerts: VecDeque<String>,
    animations: Vec<ExitAnimation>,
    status_message: Option<String>,
    pub hit_map: HitMap,
    clicks: ClickTracker,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            selected: 0,
            mode: InputMode::Normal,
            search: LineEditor::new("", false),
            category: CategoryFilter::All,
            form: None,
            alerts: VecDeque::new(),
            animations: Vec::new(),
            status_message: None,
            hit_map: HitMap::default(),
            clicks: ClickTracker::default(),
        }
    }
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles this surface declares to the dispatcher.
    pub fn surface_handles() -> SurfaceHandles {
        SurfaceHandles {
            list_container: true,
            form_fields: FormField::ALL.iter().map(|f| f.name().to_string()).collect(),
            search_input: true,
            category_options: CategoryFilter::options()
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }

    pub fn move_selection(&mut self, delta: isize, len: usize) {
        if len == 0 {
            self.selected = 0;
            return;
        }
        let next = (self.selected as isize + delta).clamp(0, len as isize - 1);
        self.selected = next as usize;
    }

    pub fn normalize_selection(&mut self, len: usize) {
        if len == 0 {
            self.selected = 0;
        } else if self.selected >= len {
            self.selected = len - 1;
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn begin_search(&mut self) {
        self.mode = InputMode::Search;
        self.search.move_end();
    }

    pub fn finish_search(&mut self) {
        self.mode = InputMode::Normal;
    }

    /// Leaves search mode with an empty term. Returns true if the term changed.
    pub fn cancel_search(&mut self) -> bool {
        self.mode = InputMode::Normal;
        if self.search.value().is_empty() {
            return false;
        }
        self.search.clear();
        true
    }

    pub fn search_input(&self) -> &LineEditor {
        &self.search
    }

    pub fn search_input_mut(&mut self) -> &mut LineEditor {
        &mut self.search
    }

    pub fn category(&self) -> CategoryFilter {
        self.category
    }

    pub fn cycle_category(&mut self) -> CategoryFilter {
        self.category = self.category.next();
        self.category
    }

    pub fn open_form(&mut self) {
        if self.form.is_none() {
            self.form = Some(NewCardOverlay::default());
        }
    }

    pub fn close_form(&mut self) {
        self.form = None;
    }

    pub fn form(&self) -> Option<&NewCardOverlay> {
        self.form.as_ref()
    }

    pub fn form_mut(&mut self) -> Option<&mut NewCardOverlay> {
        self.form.as_mut()
    }

    pub fn push_alert(&mut self, message: impl Into<String>) {
        self.alerts.push_back(message.into());
    }

    pub fn current_alert(&self) -> Option<&str> {
        self.alerts.front().map(String::as_str)
    }

    pub fn dismiss_alert(&mut self) {
        self.alerts.pop_front();
    }

    pub fn start_exit(&mut self, card_id: u64, done: Sender<()>, now: Instant) {
        self.animations.push(ExitAnimation {
            card_id,
            started: now,
            done,
        });
    }

    /// Fraction of the exit transition already played for `card_id`.
    pub fn exit_progress(&self, card_id: u64, now: Instant, duration: Duration) -> Option<f32> {
        let animation = self.animations.iter().find(|a| a.card_id == card_id)?;
        if duration.is_zero() {
            return Some(1.0);
        }
        let elapsed = now.duration_since(animation.started).as_secs_f32();
        Some((elapsed / duration.as_secs_f32()).min(1.0))
    }

    /// Signals every transition that has run for `duration` and forgets it.
    pub fn finish_due_exits(&mut self, now: Instant, duration: Duration) -> Vec<u64> {
        let mut finished = Vec::new();
        self.animations.retain(|animation| {
            if now.duration_since(animation.started) < duration {
                return true;
            }
            if animation.done.send(()).is_err() {
                tracing::debug!(card_id = animation.card_id, "exit signal no longer awaited");
            }
            finished.push(animation.card_id);
            false
        });
        finished
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    pub fn set_status_message<S: Into<String>>(&mut self, message: Option<S>) {
        self.status_message = message.map(Into::into);
    }

    /// Records a click and reports whether it completes a double-click.
    pub fn register_click(&mut self, target: &Target, now: Instant) -> bool {
        self.clicks.register(target, now)
    }
}
