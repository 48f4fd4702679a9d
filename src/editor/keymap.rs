//! Pure `KeyEvent -> Command` mapping (spec.md §4.2). Unmapped events fall
//! through to text/char/tab handling in the app loop.

use crate::terminal::{KeyCode, KeyEvent, Modifiers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Save,
    Quit,
    Copy,
    Cut,
    Paste,
    GotoLine,
    RegexSearch,
    ToggleComment,
    ShowPalette,
    MoveLeft,
    MoveRight,
    MoveUp,
    MoveDown,
    MoveHome,
    MoveEnd,
    PageUp,
    PageDown,
    SelectLeft,
    SelectRight,
    SelectUp,
    SelectDown,
    SelectHome,
    SelectEnd,
    SelectPageUp,
    SelectPageDown,
    BlockSelectLeft,
    BlockSelectRight,
    BlockSelectUp,
    BlockSelectDown,
    WordLeft,
    WordRight,
    Backspace,
    DeleteChar,
    InsertNewline,
    Undo,
    Redo,
    LspCompletion,
    LspHover,
    LspDefinition,
    LspReferences,
    LspJumpBack,
}

/// Maps a decoded key event to a [`Command`]. Returns `None` for anything the
/// keymap doesn't own — plain character/tab input falls through to the app's
/// text-insertion handler instead.
pub fn map_editor(event: KeyEvent) -> Option<Command> {
    let KeyEvent { code, mods } = event;
    let Modifiers { shift, ctrl, alt } = mods;

    if ctrl && !alt {
        if let Some(cmd) = map_ctrl(code, shift) {
            return Some(cmd);
        }
    }

    if alt && !ctrl {
        if let Some(cmd) = map_block_select(code) {
            return Some(cmd);
        }
    }

    if shift && !ctrl && !alt {
        if let Some(cmd) = map_select(code) {
            return Some(cmd);
        }
    }

    if !shift && !ctrl && !alt {
        if let Some(cmd) = map_plain(code) {
            return Some(cmd);
        }
    }

    None
}

fn map_ctrl(code: KeyCode, shift: bool) -> Option<Command> {
    use KeyCode::*;
    match code {
        Char('s') => Some(Command::Save),
        Char('q') => Some(Command::Quit),
        Char('p') => Some(Command::ShowPalette),
        Char('f') => Some(Command::RegexSearch),
        Char('g') => Some(Command::GotoLine),
        Char('n') => Some(Command::LspCompletion),
        Char('t') => Some(Command::LspHover),
        Char('d') => Some(Command::LspDefinition),
        Char('r') => Some(Command::LspReferences),
        Char('b') => Some(Command::LspJumpBack),
        Char('z') => Some(Command::Undo),
        Char('y') => Some(Command::Redo),
        Char('/') => Some(Command::ToggleComment),
        Char('x') => Some(Command::Cut),
        Char('c') => Some(Command::Copy),
        Char('v') => Some(Command::Paste),
        Left => Some(Command::WordLeft),
        Right => Some(Command::WordRight),
        _ if shift => None,
        _ => None,
    }
}

fn map_select(code: KeyCode) -> Option<Command> {
    use KeyCode::*;
    match code {
        Left => Some(Command::SelectLeft),
        Right => Some(Command::SelectRight),
        Up => Some(Command::SelectUp),
        Down => Some(Command::SelectDown),
        Home => Some(Command::SelectHome),
        End => Some(Command::SelectEnd),
        PageUp => Some(Command::SelectPageUp),
        PageDown => Some(Command::SelectPageDown),
        _ => None,
    }
}

fn map_block_select(code: KeyCode) -> Option<Command> {
    use KeyCode::*;
    match code {
        Left => Some(Command::BlockSelectLeft),
        Right => Some(Command::BlockSelectRight),
        Up => Some(Command::BlockSelectUp),
        Down => Some(Command::BlockSelectDown),
        _ => None,
    }
}

fn map_plain(code: KeyCode) -> Option<Command> {
    use KeyCode::*;
    match code {
        Left => Some(Command::MoveLeft),
        Right => Some(Command::MoveRight),
        Up => Some(Command::MoveUp),
        Down => Some(Command::MoveDown),
        Home => Some(Command::MoveHome),
        End => Some(Command::MoveEnd),
        PageUp => Some(Command::PageUp),
        PageDown => Some(Command::PageDown),
        Backspace => Some(Command::Backspace),
        Delete => Some(Command::DeleteChar),
        Enter => Some(Command::InsertNewline),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode, mods: Modifiers) -> KeyEvent {
        KeyEvent::new(code, mods)
    }

    #[test]
    fn ctrl_s_saves() {
        let mods = Modifiers { ctrl: true, ..Default::default() };
        assert_eq!(map_editor(key(KeyCode::Char('s'), mods)), Some(Command::Save));
    }

    #[test]
    fn shift_left_selects() {
        let mods = Modifiers { shift: true, ..Default::default() };
        assert_eq!(map_editor(key(KeyCode::Left, mods)), Some(Command::SelectLeft));
    }

    #[test]
    fn alt_left_block_selects() {
        let mods = Modifiers { alt: true, ..Default::default() };
        assert_eq!(map_editor(key(KeyCode::Left, mods)), Some(Command::BlockSelectLeft));
    }

    #[test]
    fn plain_char_falls_through() {
        assert_eq!(map_editor(key(KeyCode::Char('a'), Modifiers::default())), None);
    }

    #[test]
    fn plain_left_moves() {
        assert_eq!(
            map_editor(key(KeyCode::Left, Modifiers::default())),
            Some(Command::MoveLeft)
        );
    }

    #[test]
    fn ctrl_right_moves_by_word() {
        let mods = Modifiers { ctrl: true, ..Default::default() };
        assert_eq!(map_editor(key(KeyCode::Right, mods)), Some(Command::WordRight));
    }
}
