//! Editor state (cursor, selection, search, scroll) and the keymap that
//! turns terminal key events into [`Command`]s.

mod keymap;
mod state;

pub use keymap::{map_editor, Command};
pub use state::{EditorState, SelectionMode};
