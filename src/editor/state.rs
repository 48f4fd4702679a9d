//! Cursor, selection, search and scroll state for a single open buffer.
//!
//! Grounded on `fresh-editor`'s `model/cursor.rs` (`Cursor` with `position`,
//! `anchor`, `sticky_column`, `selection_mode`) — generalized here to the
//! byte-offset/visual-column model this buffer uses instead of `Position2D`.

use std::time::Instant;

/// Shape of the active selection, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    Linear,
    Block,
}

/// A single entry in the status message ring (spec.md §3 "UI State").
#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub text: String,
    pub at: Instant,
}

const STATUS_RING_CAPACITY: usize = 8;
const JUMP_STACK_CAPACITY: usize = 256;

/// Everything about the open document that isn't the bytes themselves: where
/// the cursor is, what's selected, what's being searched for, and where the
/// viewport is scrolled to.
#[derive(Debug, Clone)]
pub struct EditorState {
    /// Byte offset into the buffer; always sits on a UTF-8 codepoint start.
    pub cursor: usize,
    pub selection_anchor: Option<usize>,
    pub selection_mode: SelectionMode,
    pub search_match: Option<(usize, usize)>,
    /// Top line of the viewport.
    pub scroll_y: usize,
    pub dirty: bool,
    pub confirm_quit: bool,
    /// Sticky column for vertical motion, so moving through short lines and
    /// back to a long one restores the original horizontal position.
    pub preferred_visual_col: Option<usize>,
    pub language: Option<String>,
    status_messages: Vec<StatusMessage>,
    jump_stack: Vec<usize>,
}

impl EditorState {
    pub fn new(language: Option<String>) -> Self {
        Self {
            cursor: 0,
            selection_anchor: None,
            selection_mode: SelectionMode::Linear,
            search_match: None,
            scroll_y: 0,
            dirty: false,
            confirm_quit: false,
            preferred_visual_col: None,
            language,
            status_messages: Vec::new(),
            jump_stack: Vec::new(),
        }
    }

    pub fn has_selection(&self) -> bool {
        self.selection_anchor.is_some_and(|a| a != self.cursor)
    }

    /// The selection as an ordered `(start, end)` byte range, if active.
    pub fn selection_range(&self) -> Option<(usize, usize)> {
        self.selection_anchor.and_then(|anchor| {
            if anchor == self.cursor {
                None
            } else {
                Some((anchor.min(self.cursor), anchor.max(self.cursor)))
            }
        })
    }

    pub fn start_selection(&mut self, mode: SelectionMode) {
        if self.selection_anchor.is_none() {
            self.selection_anchor = Some(self.cursor);
        }
        self.selection_mode = mode;
    }

    pub fn clear_selection(&mut self) {
        self.selection_anchor = None;
    }

    /// Moving the cursor without an active shift/alt modifier drops any
    /// selection and clears the sticky column unless the caller is doing
    /// vertical motion (which manages `preferred_visual_col` itself).
    pub fn move_cursor_to(&mut self, offset: usize, keep_selection: bool) {
        self.cursor = offset;
        if !keep_selection {
            self.clear_selection();
        }
    }

    pub fn push_status(&mut self, text: impl Into<String>) {
        if self.status_messages.len() == STATUS_RING_CAPACITY {
            self.status_messages.remove(0);
        }
        self.status_messages.push(StatusMessage {
            text: text.into(),
            at: Instant::now(),
        });
    }

    pub fn latest_status(&self) -> Option<&StatusMessage> {
        self.status_messages.last()
    }

    pub fn status_messages(&self) -> &[StatusMessage] {
        &self.status_messages
    }

    /// Push the current cursor onto the jump stack before a jump-to-definition
    /// style motion, evicting the oldest entry once full (spec.md §4.4.6).
    pub fn push_jump(&mut self, offset: usize) {
        if self.jump_stack.len() == JUMP_STACK_CAPACITY {
            self.jump_stack.remove(0);
        }
        self.jump_stack.push(offset);
    }

    pub fn pop_jump(&mut self) -> Option<usize> {
        self.jump_stack.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_range_orders_anchor_and_cursor() {
        let mut s = EditorState::new(None);
        s.cursor = 5;
        s.start_selection(SelectionMode::Linear);
        s.cursor = 1;
        assert_eq!(s.selection_range(), Some((1, 5)));
    }

    #[test]
    fn status_ring_evicts_oldest() {
        let mut s = EditorState::new(None);
        for i in 0..10 {
            s.push_status(format!("msg{i}"));
        }
        assert_eq!(s.status_messages().len(), STATUS_RING_CAPACITY);
        assert_eq!(s.latest_status().unwrap().text, "msg9");
        assert_eq!(s.status_messages()[0].text, "msg2");
    }

    #[test]
    fn jump_stack_bounded() {
        let mut s = EditorState::new(None);
        for i in 0..300 {
            s.push_jump(i);
        }
        assert_eq!(s.jump_stack.len(), JUMP_STACK_CAPACITY);
        assert_eq!(s.pop_jump(), Some(299));
    }
}
