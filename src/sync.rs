//! The sync engine (spec.md §4.5): translates ordered local byte-range
//! edits into LSP positions computed against the pre-edit buffer, queues
//! them, and flushes as either incremental or full `didChange` notifications
//! on a debounce.
//!
//! Grounded on the same "queue + debounce + flush" shape as
//! `lsp_diagnostics.rs`'s LSP/editor-state bridge in the teacher crate,
//! generalized from "apply diagnostics as overlays" to "translate edits to
//! wire positions".

use std::path::Path;
use std::time::{Duration, Instant};

use crate::buffer::PieceTable;
use crate::config::Config;
use crate::lsp::{LspClient, LspError};
use crate::lsp::types::LspPosition;

/// One queued incremental edit, expressed in LSP positions computed against
/// the buffer state at the moment it was queued (spec.md §4.5).
#[derive(Debug, Clone)]
pub struct PendingChange {
    pub start: LspPosition,
    pub end: LspPosition,
    pub text: Vec<u8>,
}

/// UTF-16 code units spanned by `line_starts[line]..aligned` — 1 per BMP
/// codepoint, 2 per supplementary-plane codepoint (spec.md §4.5, §9).
fn utf16_units_from(buffer: &PieceTable, line_start: usize, aligned: usize) -> u32 {
    let mut units = 0u32;
    let mut o = line_start;
    while o < aligned {
        let Some(lead) = buffer.byte_at(o) else { break };
        units += if crate::buffer::utf8_lead_len(lead) <= 3 { 1 } else { 2 };
        o = buffer.next_codepoint_end(o);
    }
    units
}

/// Convert a byte offset (pre-edit buffer state) to an LSP position
/// (spec.md §4.5 `lsp_position_from_offset`).
pub fn lsp_position_from_offset(buffer: &PieceTable, offset: usize) -> LspPosition {
    let aligned = buffer.align_to_codepoint_start(offset);
    let (line, _) = buffer.line_col_from_offset(aligned);
    let line_start = buffer.line_start(line);
    LspPosition {
        line: line as u32,
        character: utf16_units_from(buffer, line_start, aligned),
    }
}

/// Inverse of [`lsp_position_from_offset`]: convert an LSP position back to a
/// byte offset in the buffer's *current* state. Used to apply completion
/// text edits and jump-to-definition targets, which arrive in LSP
/// coordinates (spec.md §4.4.6).
pub fn byte_offset_from_lsp_position(buffer: &PieceTable, pos: LspPosition) -> usize {
    let line = pos.line as usize;
    if line >= buffer.line_count() {
        return buffer.len();
    }
    let start = buffer.line_start(line);
    let end = if line + 1 < buffer.line_count() {
        buffer.line_start(line + 1)
    } else {
        buffer.len()
    };
    let mut offset = start;
    let mut units = 0u32;
    while offset < end && units < pos.character {
        let Some(lead) = buffer.byte_at(offset) else { break };
        units += if crate::buffer::utf8_lead_len(lead) <= 3 { 1 } else { 2 };
        offset = buffer.next_codepoint_end(offset);
    }
    offset
}

/// The sync engine's own state (spec.md §3 "Sync Engine State").
#[derive(Debug, Default)]
pub struct SyncEngine {
    pending_lsp_sync: bool,
    next_lsp_flush: Option<Instant>,
    force_full_lsp_sync: bool,
    queue: Vec<PendingChange>,
}

impl SyncEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one primitive edit's LSP-position range, computed against
    /// `buffer` **before** the edit mutates it. Call this before applying
    /// the edit to the piece table (spec.md §4.5 contract).
    pub fn queue_incremental_change(&mut self, buffer: &PieceTable, start_byte: usize, end_byte: usize, text: &[u8]) {
        let start = lsp_position_from_offset(buffer, start_byte);
        let end = lsp_position_from_offset(buffer, end_byte);
        self.queue.push(PendingChange {
            start,
            end,
            text: text.to_vec(),
        });
    }

    /// Mark a flush as due and (re)schedule its debounce deadline. Call
    /// this after the edit has mutated the buffer.
    pub fn queue_did_change(&mut self, now: Instant, debounce: Duration) {
        self.pending_lsp_sync = true;
        self.next_lsp_flush = Some(now + debounce);
    }

    /// Force the next flush to serialize the whole buffer rather than
    /// replaying queued incremental ranges — required after undo/redo,
    /// block edits, comment toggles and clipboard-driven deletions, whose
    /// ranges can't be expressed as a simple post-facto diff (spec.md §4.5).
    pub fn force_full_sync(&mut self) {
        self.force_full_lsp_sync = true;
    }

    pub fn next_flush_deadline(&self) -> Option<Instant> {
        if self.pending_lsp_sync {
            self.next_lsp_flush
        } else {
            None
        }
    }

    /// Byte length of all text queued so far, for the invariant in spec.md
    /// §4.5 ("sum of queued text bytes minus sum of spans equals the net
    /// buffer length change").
    pub fn queued_insert_bytes(&self) -> usize {
        self.queue.iter().map(|c| c.text.len()).sum()
    }

    /// Flush the pending `didChange`, if one is due. Returns `false` with
    /// no effect if nothing is pending, or if `force` is false and the
    /// debounce deadline hasn't been reached yet (spec.md §4.5).
    pub fn flush_pending_did_change(
        &mut self,
        client: &mut LspClient,
        buffer: &PieceTable,
        now: Instant,
        force: bool,
        config: &Config,
        file_path: Option<&Path>,
    ) -> bool {
        if !self.pending_lsp_sync {
            return false;
        }
        if !force && self.next_lsp_flush.is_some_and(|deadline| now < deadline) {
            return false;
        }

        let incremental = !self.force_full_lsp_sync && !self.queue.is_empty() && client.supports_incremental_sync();
        if incremental {
            for change in &self.queue {
                client.did_change_incremental(change.start, change.end, &change.text);
            }
        } else {
            client.did_change(&buffer.to_owned_bytes());
        }

        self.queue.clear();
        self.force_full_lsp_sync = false;
        self.pending_lsp_sync = false;
        self.next_lsp_flush = None;

        if config.autosave {
            if let Some(path) = file_path {
                if std::fs::write(path, buffer.to_owned_bytes()).is_ok() {
                    client.did_save();
                }
            }
        }

        true
    }
}

/// Surface an [`LspError`] as a status line rather than propagating it
/// (spec.md §7: LSP capability/availability errors produce status messages,
/// not crashes).
pub fn describe_lsp_error(error: &LspError) -> String {
    error.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lsp_position_counts_utf16_units_s6_like() {
        let buffer = PieceTable::new("a\u{0444}b\n".as_bytes().to_vec());
        // 'a' is BMP (1 unit), 'ф' is BMP (1 unit, 2 UTF-8 bytes).
        let pos = lsp_position_from_offset(&buffer, 3); // offset of 'b'
        assert_eq!(pos.line, 0);
        assert_eq!(pos.character, 2);
    }

    #[test]
    fn lsp_position_supplementary_plane_counts_two_units() {
        // U+1F600 (😀) is 4 UTF-8 bytes, a surrogate pair in UTF-16.
        let buffer = PieceTable::new("\u{1F600}x".as_bytes().to_vec());
        let pos = lsp_position_from_offset(&buffer, 4); // offset of 'x'
        assert_eq!(pos.character, 2);
    }

    #[test]
    fn lsp_position_aligns_mid_codepoint_offsets() {
        let buffer = PieceTable::new("\u{0444}".as_bytes().to_vec());
        let pos = lsp_position_from_offset(&buffer, 1); // mid-codepoint byte
        assert_eq!(pos.character, 0);
    }

    #[test]
    fn flush_is_noop_before_deadline_unless_forced() {
        let mut engine = SyncEngine::new();
        let now = Instant::now();
        engine.queue_did_change(now, Duration::from_millis(100));
        assert!(engine.next_flush_deadline().is_some());
    }

    #[test]
    fn queued_bytes_track_pushed_text() {
        let buffer = PieceTable::new(b"abc".to_vec());
        let mut engine = SyncEngine::new();
        engine.queue_incremental_change(&buffer, 0, 1, b"xy");
        assert_eq!(engine.queued_insert_bytes(), 2);
    }

    #[test]
    fn byte_offset_from_lsp_position_roundtrips_ascii() {
        let buffer = PieceTable::new(b"ab\ncd\n".to_vec());
        let pos = lsp_position_from_offset(&buffer, 4); // 'd'
        assert_eq!(byte_offset_from_lsp_position(&buffer, pos), 4);
    }

    #[test]
    fn byte_offset_from_lsp_position_roundtrips_bmp() {
        let buffer = PieceTable::new("a\u{0444}b".as_bytes().to_vec());
        let pos = lsp_position_from_offset(&buffer, 3); // 'b'
        assert_eq!(byte_offset_from_lsp_position(&buffer, pos), 3);
    }
}
