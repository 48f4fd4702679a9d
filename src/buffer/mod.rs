//! The text buffer: a piece-table over two immutable-append byte stores plus
//! the tab-aware visual-column helpers used to translate between byte offsets
//! and on-screen columns.
//!
//! # Design
//!
//! Edits never mutate `original` or `add` in place — they only ever append to
//! `add` and rewrite the (small) piece list that describes how spans of those
//! two stores concatenate into the current document. This makes undo cheap
//! (each undo record owns a copy of the bytes it affected) and keeps cursors
//! and diagnostics stable across edits that don't touch their region, unlike a
//! gap buffer, which shuffles bytes on every insertion away from the gap.
//!
//! Line boundaries (`line_starts`) are *not* part of the piece list — they're
//! a derived index, rebuilt by scanning the pieces in order after every edit.
//! This keeps the piece list itself free of line bookkeeping, at the cost of
//! an O(document length) rebuild per edit, which is acceptable for the
//! interactive, single-file, single-cursor-family workload this buffer is
//! built for (see `spec.md` §4.1 for the full operation contract).

mod layout;
mod piece_table;

pub use layout::{clip_display_width, utf8_lead_len};
pub use piece_table::PieceTable;
