use unicode_segmentation::UnicodeSegmentation;

/// Text input used for inline edits and the creation form.
///
/// Offsets are byte positions that always sit on grapheme boundaries. A fresh
/// input with [`LineEditor::with_selection`] starts with its whole content
/// selected, so the first typed character replaces it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineEditor {
    buffer: String,
    cursor: usize,
    selected_all: bool,
    multiline: bool,
}

impl LineEditor {
    pub fn new(value: impl Into<String>, multiline: bool) -> Self {
        let buffer = value.into();
        let cursor = buffer.len();
        Self {
            buffer,
            cursor,
            selected_all: false,
            multiline,
        }
    }

    pub fn with_selection(value: impl Into<String>, multiline: bool) -> Self {
        let mut editor = Self::new(value, multiline);
        editor.selected_all = !editor.buffer.is_empty();
        editor
    }

    pub fn value(&self) -> &str {
        &self.buffer
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_selected(&self) -> bool {
        self.selected_all
    }

    pub fn is_multiline(&self) -> bool {
        self.multiline
    }

    pub fn set_value(&mut self, value: impl Into<String>) {
        self.buffer = value.into();
        self.cursor = self.buffer.len();
        self.selected_all = false;
    }

    pub fn clear(&mut self) {
        self.set_value(String::new());
    }

    pub fn insert_char(&mut self, ch: char) -> bool {
        self.take_selection();
        let mut scratch = [0u8; 4];
        let encoded = ch.encode_utf8(&mut scratch);
        self.buffer.insert_str(self.cursor, encoded);
        self.cursor += encoded.len();
        true
    }

    pub fn insert_newline(&mut self) -> bool {
        if !self.multiline {
            return false;
        }
        self.insert_char('\n')
    }

    pub fn backspace(&mut self) -> bool {
        if self.take_selection() {
            return true;
        }
        if self.cursor == 0 {
            return false;
        }
        let prev = prev_grapheme_boundary(&self.buffer, self.cursor);
        self.buffer.drain(prev..self.cursor);
        self.cursor = prev;
        true
    }

    pub fn delete(&mut self) -> bool {
        if self.take_selection() {
            return true;
        }
        if self.cursor >= self.buffer.len() {
            return false;
        }
        let next = next_grapheme_boundary(&self.buffer, self.cursor);
        self.buffer.drain(self.cursor..next);
        true
    }

    pub fn move_left(&mut self) -> bool {
        if self.selected_all {
            self.selected_all = false;
            self.cursor = 0;
            return true;
        }
        if self.cursor == 0 {
            return false;
        }
        self.cursor = prev_grapheme_boundary(&self.buffer, self.cursor);
        true
    }

    pub fn move_right(&mut self) -> bool {
        if self.selected_all {
            self.selected_all = false;
            self.cursor = self.buffer.len();
            return true;
        }
        if self.cursor >= self.buffer.len() {
            return false;
        }
        self.cursor = next_grapheme_boundary(&self.buffer, self.cursor);
        true
    }

    pub fn move_home(&mut self) -> bool {
        self.selected_all = false;
        let start = line_start(&self.buffer, self.cursor);
        if self.cursor == start {
            return false;
        }
        self.cursor = start;
        true
    }

    pub fn move_end(&mut self) -> bool {
        self.selected_all = false;
        let end = line_end(&self.buffer, self.cursor);
        if self.cursor == end {
            return false;
        }
        self.cursor = end;
        true
    }

    /// Text before the cursor on the cursor's line, for caret placement.
    pub fn line_before_cursor(&self) -> (usize, &str) {
        let start = line_start(&self.buffer, self.cursor);
        let line = self.buffer[..start].matches('\n').count();
        (line, &self.buffer[start..self.cursor])
    }

    // Drops the selected content, if any.
    fn take_selection(&mut self) -> bool {
        if !self.selected_all {
            return false;
        }
        self.selected_all = false;
        self.buffer.clear();
        self.cursor = 0;
        true
    }
}

fn prev_grapheme_boundary(text: &str, cursor: usize) -> usize {
    text[..cursor]
        .grapheme_indices(true)
        .last()
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}

fn next_grapheme_boundary(text: &str, cursor: usize) -> usize {
    text[cursor..]
        .graphemes(true)
        .next()
        .map(|grapheme| cursor + grapheme.len())
        .unwrap_or(text.len())
}

fn line_start(text: &str, cursor: usize) -> usize {
    text[..cursor].rfind('\n').map(|idx| idx + 1).unwrap_or(0)
}

fn line_end(text: &str, cursor: usize) -> usize {
    text[cursor..]
        .find('\n')
        .map(|idx| cursor + idx)
        .unwrap_or(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typing_replaces_selected_content() {
        let mut input = LineEditor::with_selection("Old title", false);
        assert!(input.is_selected());
        input.insert_char('N');
        input.insert_char('e');
        assert_eq!(input.value(), "Ne");
        assert!(!input.is_selected());
    }

    #[test]
    fn moving_collapses_selection_without_editing() {
        let mut input = LineEditor::with_selection("abc", false);
        assert!(input.move_left());
        assert_eq!(input.cursor(), 0);
        input.insert_char('>');
        assert_eq!(input.value(), ">abc");
    }

    #[test]
    fn backspace_removes_whole_graphemes() {
        let mut input = LineEditor::new("cafe\u{301}", false);
        assert!(input.backspace());
        assert_eq!(input.value(), "caf");
        input.move_home();
        assert!(!input.backspace());
        assert!(input.delete());
        assert_eq!(input.value(), "af");
    }

    #[test]
    fn newlines_only_in_multiline_inputs() {
        let mut single = LineEditor::new("a", false);
        assert!(!single.insert_newline());
        let mut multi = LineEditor::new("a", true);
        assert!(multi.insert_newline());
        multi.insert_char('b');
        assert_eq!(multi.value(), "a\nb");
        assert_eq!(multi.line_before_cursor(), (1, "b"));
    }
}
