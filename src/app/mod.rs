use std::io::Stdout;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, KeyboardEnhancementFlags, MouseButton, MouseEvent, MouseEventKind,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, supports_keyboard_enhancement, EnterAlternateScreen,
    LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use crate::config::{AppConfig, Palette};
use crate::storage::{CardStore, EditableField};
use crate::ui;
use crate::view::{Part, Target};

pub mod dispatch;
pub mod edit;
pub mod events;
pub mod input;
pub mod state;

pub use dispatch::{Alert, BindError, Dispatcher, Effect, Focus};
pub use edit::{EditMachine, EditSession, KeyOutcome, SaveOutcome};
pub use events::{CardForm, Key, KeyPress, Modifiers, SurfaceHandles, UiEvent};
pub use input::LineEditor;
pub use state::{AppState, FormField, InputMode, NewCardOverlay};

enum Action {
    Quit,
    SelectNext,
    SelectPrevious,
    NewCard,
    StartSearch,
    ClearSearch,
    CycleCategory,
    EditField(EditableField),
    DeleteCard,
}

pub struct App {
    pub config: Arc<AppConfig>,
    dispatcher: Dispatcher,
    state: AppState,
    palette: Palette,
    should_quit: bool,
    tick_rate: Duration,
    exit_animation: Duration,
}

impl App {
    pub fn new(config: Arc<AppConfig>, store: CardStore) -> Result<Self> {
        let dispatcher = Dispatcher::bind(store, &AppState::surface_handles())
            .context("binding the card surface")?;
        let palette = config.palette();
        let tick_rate = config.ui.tick_rate();
        let exit_animation = config.ui.exit_animation();
        Ok(Self {
            config,
            dispatcher,
            state: AppState::new(),
            palette,
            should_quit: false,
            tick_rate,
            exit_animation,
        })
    }

    pub fn run(&mut self) -> Result<()> {
        let mut terminal = setup_terminal()?;
        let result = self.event_loop(&mut terminal.inner);
        restore_terminal(&mut terminal)?;
        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        loop {
            let now = Instant::now();
            terminal
                .draw(|frame| {
                    ui::draw_app(
                        frame,
                        &mut self.state,
                        &self.dispatcher,
                        ui::DrawContext {
                            palette: self.palette,
                            now,
                            exit_animation: self.exit_animation,
                        },
                    );
                })
                .context("rendering frame")?;

            if self.should_quit {
                break;
            }

            let timeout = self
                .tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(0));

            if event::poll(timeout).context("polling for terminal events")? {
                match event::read().context("reading terminal event")? {
                    Event::Key(key) => self.handle_key(key),
                    Event::Mouse(mouse) => self.handle_mouse(mouse),
                    _ => {}
                }
            }

            if last_tick.elapsed() >= self.tick_rate {
                self.on_tick();
                last_tick = Instant::now();
            }
        }
        Ok(())
    }

    fn on_tick(&mut self) {
        let finished = self
            .state
            .finish_due_exits(Instant::now(), self.exit_animation);
        if !finished.is_empty() {
            tracing::debug!(?finished, "exit transitions finished");
        }
        let effects = self.dispatcher.poll_transitions();
        self.apply_effects(effects);
    }

    fn dispatch(&mut self, event: UiEvent) {
        let effects = self.dispatcher.handle(event);
        self.apply_effects(effects);
    }

    fn apply_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Alert(alert) => {
                    tracing::debug!(%alert, "showing alert");
                    self.state.push_alert(alert.to_string());
                }
                Effect::ResetForm => {
                    if let Some(form) = self.state.form_mut() {
                        form.reset();
                    }
                    self.state.selected = 0;
                    self.state.set_status_message(Some("Card created"));
                }
                Effect::AnimateExit { card_id, done } => {
                    self.state.start_exit(card_id, done, Instant::now());
                }
                Effect::Rendered => {
                    let len = self.dispatcher.view().len();
                    self.state.normalize_selection(len);
                }
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        if self.state.current_alert().is_some() {
            if matches!(key.code, KeyCode::Enter | KeyCode::Esc) {
                self.state.dismiss_alert();
            }
            return;
        }
        if self.state.form().is_some() {
            self.handle_form_key(key);
            return;
        }
        if self.dispatcher.edit_session().is_some() {
            self.handle_edit_key(key);
            return;
        }
        if self.state.mode() == InputMode::Search {
            self.handle_search_key(key);
            return;
        }

        let action = match key.code {
            KeyCode::Char('q') => Some(Action::Quit),
            KeyCode::Char('j') | KeyCode::Down => Some(Action::SelectNext),
            KeyCode::Char('k') | KeyCode::Up => Some(Action::SelectPrevious),
            KeyCode::Char('a') | KeyCode::Char('n') => Some(Action::NewCard),
            KeyCode::Char('/') => Some(Action::StartSearch),
            KeyCode::Esc => Some(Action::ClearSearch),
            KeyCode::Char('c') => Some(Action::CycleCategory),
            KeyCode::Char('e') | KeyCode::Enter => Some(Action::EditField(EditableField::Title)),
            KeyCode::Char('E') => Some(Action::EditField(EditableField::Description)),
            KeyCode::Char('d') | KeyCode::Delete => Some(Action::DeleteCard),
            _ => None,
        };
        if let Some(action) = action {
            self.handle_action(action);
        }
    }

    fn handle_action(&mut self, action: Action) {
        match action {
            Action::Quit => self.should_quit = true,
            Action::SelectNext => {
                let len = self.dispatcher.view().len();
                self.state.move_selection(1, len);
            }
            Action::SelectPrevious => {
                let len = self.dispatcher.view().len();
                self.state.move_selection(-1, len);
            }
            Action::NewCard => {
                self.state.open_form();
                self.state.set_status_message(None::<String>);
            }
            Action::StartSearch => self.state.begin_search(),
            Action::ClearSearch => {
                if self.state.cancel_search() {
                    self.dispatch(UiEvent::SearchInput(String::new()));
                }
            }
            Action::CycleCategory => {
                let category = self.state.cycle_category();
                self.dispatch(UiEvent::CategoryChange(category.to_string()));
            }
            Action::EditField(field) => {
                if let Some(target) = self.selected_target(Part::Field(field)) {
                    self.dispatch(UiEvent::DoubleClick(target));
                }
            }
            Action::DeleteCard => {
                if let Some(target) = self.selected_target(Part::Delete) {
                    self.dispatch(UiEvent::Click(target));
                }
            }
        }
    }

    fn handle_search_key(&mut self, key: KeyEvent) {
        let input = self.state.search_input_mut();
        let changed = match key.code {
            KeyCode::Esc => {
                if self.state.cancel_search() {
                    self.dispatch(UiEvent::SearchInput(String::new()));
                }
                return;
            }
            KeyCode::Enter => {
                self.state.finish_search();
                return;
            }
            KeyCode::Backspace => input.backspace(),
            KeyCode::Delete => input.delete(),
            KeyCode::Left => input.move_left(),
            KeyCode::Right => input.move_right(),
            KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                input.insert_char(ch)
            }
            _ => false,
        };
        if changed {
            let term = self.state.search_input().value().to_string();
            self.dispatch(UiEvent::SearchInput(term));
        }
    }

    fn handle_form_key(&mut self, key: KeyEvent) {
        let Some(form) = self.state.form_mut() else {
            return;
        };
        match key.code {
            KeyCode::Esc => {
                self.state.close_form();
                self.state.set_status_message(Some("Canceled new card"));
            }
            KeyCode::Enter => {
                let submitted = form.to_form();
                self.dispatch(UiEvent::Submit(submitted));
            }
            KeyCode::Tab => form.next_field(),
            KeyCode::BackTab => form.previous_field(),
            KeyCode::Left if form.field == FormField::Category => form.cycle_category(-1),
            KeyCode::Right if form.field == FormField::Category => form.cycle_category(1),
            _ => {
                if let Some(input) = form.active_input_mut() {
                    if let Some(press) = key_press(key) {
                        edit_line(input, press);
                    }
                }
            }
        }
    }

    fn handle_edit_key(&mut self, key: KeyEvent) {
        if key.code == KeyCode::Char('s') && key.modifiers.contains(KeyModifiers::CONTROL) {
            if let Some(target) = self.session_target(Part::Save) {
                self.dispatch(UiEvent::Click(target));
            }
            return;
        }
        if let Some(press) = key_press(key) {
            self.dispatch(UiEvent::Key(press));
        }
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        let MouseEventKind::Down(MouseButton::Left) = mouse.kind else {
            return;
        };
        if self.state.current_alert().is_some() || self.state.form().is_some() {
            return;
        }
        let Some(target) = self.state.hit_map.hit(mouse.column, mouse.row).cloned() else {
            return;
        };
        if let Some(idx) = target
            .closest_card()
            .and_then(|card_id| self.dispatcher.view().position(card_id))
        {
            self.state.selected = idx;
        }
        let double = self.state.register_click(&target, Instant::now());
        self.dispatch(UiEvent::Click(target.clone()));
        if double {
            self.dispatch(UiEvent::DoubleClick(target));
        }
    }

    fn selected_target(&self, part: Part) -> Option<Target> {
        let view = self.dispatcher.view();
        let block = view.blocks().get(self.state.selected)?;
        view.target(block.card_id, part)
    }

    fn session_target(&self, part: fn(EditableField) -> Part) -> Option<Target> {
        let session = self.dispatcher.edit_session()?;
        self.dispatcher
            .view()
            .target(session.card_id, part(session.field))
    }
}

fn key_press(key: KeyEvent) -> Option<KeyPress> {
    let mut modifiers = Modifiers::empty();
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        modifiers |= Modifiers::CTRL;
    }
    if key.modifiers.contains(KeyModifiers::ALT) {
        modifiers |= Modifiers::ALT;
    }
    if key.modifiers.contains(KeyModifiers::SHIFT) {
        modifiers |= Modifiers::SHIFT;
    }
    let key = match key.code {
        // most terminals report Ctrl+Enter as Ctrl+J
        KeyCode::Char('j') if modifiers.contains(Modifiers::CTRL) => Key::Enter,
        KeyCode::Char(ch) => Key::Char(ch),
        KeyCode::Enter => Key::Enter,
        KeyCode::Esc => Key::Escape,
        KeyCode::Backspace => Key::Backspace,
        KeyCode::Delete => Key::Delete,
        KeyCode::Left => Key::Left,
        KeyCode::Right => Key::Right,
        KeyCode::Home => Key::Home,
        KeyCode::End => Key::End,
        KeyCode::Tab => Key::Tab,
        _ => return None,
    };
    Some(KeyPress { key, modifiers })
}

fn edit_line(input: &mut LineEditor, press: KeyPress) -> bool {
    match press.key {
        Key::Char(ch) if !press.is_ctrl() => input.insert_char(ch),
        Key::Backspace => input.backspace(),
        Key::Delete => input.delete(),
        Key::Left => input.move_left(),
        Key::Right => input.move_right(),
        Key::Home => input.move_home(),
        Key::End => input.move_end(),
        _ => false,
    }
}

struct TerminalGuard {
    inner: Terminal<CrosstermBackend<Stdout>>,
    enhanced_keys: bool,
}

fn setup_terminal() -> Result<TerminalGuard> {
    enable_raw_mode().context("enabling raw mode")?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)
        .context("switching to alternate screen")?;
    let enhanced_keys = matches!(supports_keyboard_enhancement(), Ok(true));
    if enhanced_keys {
        execute!(
            stdout,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES)
        )
        .context("enabling keyboard enhancements")?;
    }
    let backend = CrosstermBackend::new(stdout);
    let mut inner = Terminal::new(backend).context("creating terminal backend")?;
    inner.hide_cursor().context("hiding cursor")?;
    Ok(TerminalGuard {
        inner,
        enhanced_keys,
    })
}

fn restore_terminal(terminal: &mut TerminalGuard) -> Result<()> {
    terminal.inner.show_cursor().ok();
    if terminal.enhanced_keys {
        execute!(terminal.inner.backend_mut(), PopKeyboardEnhancementFlags).ok();
    }
    disable_raw_mode().context("disabling raw mode")?;
    execute!(
        terminal.inner.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )
    .context("restoring screen state")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ctrl_j_reads_as_ctrl_enter() {
        let press = key_press(KeyEvent::new(KeyCode::Char('j'), KeyModifiers::CONTROL)).expect("key");
        assert_eq!(press, KeyPress::ctrl(Key::Enter));
        let plain = key_press(KeyEvent::new(KeyCode::Char('j'), KeyModifiers::NONE)).expect("key");
        assert_eq!(plain, KeyPress::plain(Key::Char('j')));
        assert!(key_press(KeyEvent::new(KeyCode::F(1), KeyModifiers::NONE)).is_none());
    }

    #[test]
    fn form_line_editing_ignores_control_chords() {
        let mut input = LineEditor::new("ab", false);
        assert!(edit_line(&mut input, KeyPress::plain(Key::Char('c'))));
        assert!(!edit_line(&mut input, KeyPress::ctrl(Key::Char('x'))));
        assert!(edit_line(&mut input, KeyPress::plain(Key::Backspace)));
        assert_eq!(input.value(), "ab");
    }
}
