//! The piece-table buffer itself (spec.md §3, §4.1).

use super::layout::utf8_lead_len;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Original,
    Add,
}

#[derive(Debug, Clone, Copy)]
struct Piece {
    source: Source,
    start: usize,
    len: usize,
}

#[derive(Debug, Clone)]
enum EditRecord {
    Insert { offset: usize, bytes: Vec<u8> },
    Delete { offset: usize, bytes: Vec<u8> },
}

/// An ordered byte sequence backed by two immutable-append stores, with
/// O(total pieces) edits, a derived line index, and an undo/redo stack of
/// owned byte records.
#[derive(Debug, Clone)]
pub struct PieceTable {
    original: Vec<u8>,
    add: Vec<u8>,
    pieces: Vec<Piece>,
    total_len: usize,
    /// Byte offset of the first byte of each line; `line_starts[0] == 0`.
    line_starts: Vec<usize>,
    undo: Vec<EditRecord>,
    redo: Vec<EditRecord>,
}

fn is_continuation(b: u8) -> bool {
    b & 0xC0 == 0x80
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

impl PieceTable {
    /// Load an initial document (e.g. the contents of a file opened at startup).
    pub fn new(initial: Vec<u8>) -> Self {
        let total_len = initial.len();
        let pieces = if total_len > 0 {
            vec![Piece {
                source: Source::Original,
                start: 0,
                len: total_len,
            }]
        } else {
            Vec::new()
        };
        let mut table = Self {
            original: initial,
            add: Vec::new(),
            pieces,
            total_len,
            line_starts: vec![0],
            undo: Vec::new(),
            redo: Vec::new(),
        };
        table.rebuild_line_starts();
        table
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.total_len
    }

    pub fn is_empty(&self) -> bool {
        self.total_len == 0
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    fn piece_bytes(&self, p: &Piece) -> &[u8] {
        match p.source {
            Source::Original => &self.original[p.start..p.start + p.len],
            Source::Add => &self.add[p.start..p.start + p.len],
        }
    }

    /// Copy out the byte range `[start, end)`, clamped to the buffer.
    pub fn slice(&self, start: usize, end: usize) -> Vec<u8> {
        let start = start.min(self.total_len);
        let end = end.min(self.total_len).max(start);
        let mut out = Vec::with_capacity(end - start);
        let mut acc = 0usize;
        for p in &self.pieces {
            let p_start = acc;
            let p_end = acc + p.len;
            acc = p_end;
            if p_end <= start || p_start >= end {
                continue;
            }
            let s = start.max(p_start) - p_start;
            let e = end.min(p_end) - p_start;
            out.extend_from_slice(&self.piece_bytes(p)[s..e]);
        }
        out
    }

    pub fn to_owned_bytes(&self) -> Vec<u8> {
        self.slice(0, self.total_len)
    }

    pub fn byte_at(&self, offset: usize) -> Option<u8> {
        if offset >= self.total_len {
            return None;
        }
        let mut acc = 0usize;
        for p in &self.pieces {
            let p_end = acc + p.len;
            if offset < p_end {
                return Some(self.piece_bytes(p)[offset - acc]);
            }
            acc = p_end;
        }
        None
    }

    fn coalesce(&mut self) {
        let old = std::mem::take(&mut self.pieces);
        let mut merged = Vec::with_capacity(old.len());
        for p in old {
            if p.len == 0 {
                continue;
            }
            if let Some(last) = merged.last_mut() as Option<&mut Piece> {
                if last.source == p.source && last.start + last.len == p.start {
                    last.len += p.len;
                    continue;
                }
            }
            merged.push(p);
        }
        self.pieces = merged;
    }

    fn rebuild_line_starts(&mut self) {
        let mut starts = vec![0usize];
        let mut offset = 0usize;
        for p in &self.pieces {
            for (i, &b) in self.piece_bytes(p).iter().enumerate() {
                if b == b'\n' {
                    starts.push(offset + i + 1);
                }
            }
            offset += p.len;
        }
        self.line_starts = starts;
    }

    /// Splice a freshly-appended piece into the piece list at `offset`,
    /// splitting the piece straddling `offset` if needed.
    fn insert_piece_at(&mut self, offset: usize, piece: Piece) {
        let mut acc = 0usize;
        for i in 0..self.pieces.len() {
            let p = self.pieces[i];
            let p_start = acc;
            let p_end = acc + p.len;
            if offset < p_end || (offset == p_end && i + 1 == self.pieces.len()) {
                if offset == p_start {
                    self.pieces.insert(i, piece);
                } else if offset == p_end {
                    self.pieces.insert(i + 1, piece);
                } else {
                    let local = offset - p_start;
                    let left = Piece {
                        source: p.source,
                        start: p.start,
                        len: local,
                    };
                    let right = Piece {
                        source: p.source,
                        start: p.start + local,
                        len: p.len - local,
                    };
                    self.pieces.splice(i..=i, [left, piece, right]);
                }
                return;
            }
            acc = p_end;
        }
        // offset == total_len (or the buffer was empty): append.
        self.pieces.push(piece);
    }

    fn raw_insert(&mut self, offset: usize, bytes: &[u8]) {
        let add_start = self.add.len();
        self.add.extend_from_slice(bytes);
        let piece = Piece {
            source: Source::Add,
            start: add_start,
            len: bytes.len(),
        };
        self.insert_piece_at(offset, piece);
        self.coalesce();
        self.total_len += bytes.len();
        self.rebuild_line_starts();
    }

    fn raw_delete(&mut self, offset: usize, count: usize) -> Vec<u8> {
        let end = offset + count;
        let deleted = self.slice(offset, end);
        let mut new_pieces = Vec::with_capacity(self.pieces.len());
        let mut acc = 0usize;
        for p in &self.pieces {
            let p_start = acc;
            let p_end = acc + p.len;
            acc = p_end;
            if p_end <= offset || p_start >= end {
                new_pieces.push(*p);
                continue;
            }
            if p_start < offset {
                new_pieces.push(Piece {
                    source: p.source,
                    start: p.start,
                    len: offset - p_start,
                });
            }
            if p_end > end {
                let skip = end - p_start;
                new_pieces.push(Piece {
                    source: p.source,
                    start: p.start + skip,
                    len: p_end - end,
                });
            }
        }
        self.pieces = new_pieces;
        self.coalesce();
        self.total_len -= count;
        self.rebuild_line_starts();
        deleted
    }

    /// Insert `bytes` at `offset`, clamped to `[0, total_len]`. A no-op for
    /// empty `bytes`. Pushes an undo record and clears redo.
    pub fn insert(&mut self, offset: usize, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let offset = offset.min(self.total_len);
        self.raw_insert(offset, bytes);
        self.undo.push(EditRecord::Insert {
            offset,
            bytes: bytes.to_vec(),
        });
        self.redo.clear();
    }

    /// Delete `count` bytes starting at `offset`, clamped to the buffer. A
    /// no-op for a zero or fully out-of-range count. Pushes an undo record
    /// and clears redo.
    pub fn delete(&mut self, offset: usize, count: usize) {
        if count == 0 {
            return;
        }
        let offset = offset.min(self.total_len);
        let count = count.min(self.total_len - offset);
        if count == 0 {
            return;
        }
        let deleted = self.raw_delete(offset, count);
        self.undo.push(EditRecord::Delete {
            offset,
            bytes: deleted,
        });
        self.redo.clear();
    }

    /// Undo the last edit. Returns `false` if there's nothing to undo. Does
    /// not clear redo — the inverse edit is pushed there instead.
    pub fn undo(&mut self) -> bool {
        let Some(record) = self.undo.pop() else {
            return false;
        };
        match &record {
            EditRecord::Insert { offset, bytes } => {
                self.raw_delete(*offset, bytes.len());
            }
            EditRecord::Delete { offset, bytes } => {
                self.raw_insert(*offset, bytes);
            }
        }
        self.redo.push(record);
        true
    }

    /// Redo the last undone edit. Returns `false` if there's nothing to redo.
    pub fn redo(&mut self) -> bool {
        let Some(record) = self.redo.pop() else {
            return false;
        };
        match &record {
            EditRecord::Insert { offset, bytes } => {
                self.raw_insert(*offset, bytes);
            }
            EditRecord::Delete { offset, bytes } => {
                self.raw_delete(*offset, bytes.len());
            }
        }
        self.undo.push(record);
        true
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    pub fn line_start(&self, line: usize) -> usize {
        self.line_starts[line.min(self.line_starts.len() - 1)]
    }

    fn line_width(&self, line: usize) -> usize {
        let start = self.line_starts[line];
        if line + 1 < self.line_starts.len() {
            (self.line_starts[line + 1] - 1).saturating_sub(start)
        } else {
            self.total_len - start
        }
    }

    /// Binary search `line_starts` for the line containing `offset`.
    pub fn line_col_from_offset(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.total_len);
        let idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        (idx, offset - self.line_starts[idx])
    }

    pub fn offset_from_line_col(&self, line: usize, col: usize) -> usize {
        let line = line.min(self.line_starts.len() - 1);
        let width = self.line_width(line);
        self.line_starts[line] + col.min(width)
    }

    /// Round `offset` down to the start of the codepoint it falls inside,
    /// walking continuation bytes backward. A no-op for an offset that's
    /// already a codepoint start. Used by the sync engine to align
    /// byte-range edits before converting to LSP positions (spec.md §4.5).
    pub fn align_to_codepoint_start(&self, offset: usize) -> usize {
        let offset = offset.min(self.total_len);
        let mut o = offset;
        while o > 0 {
            match self.byte_at(o) {
                Some(b) if is_continuation(b) => o -= 1,
                _ => break,
            }
        }
        o
    }

    /// Walk continuation bytes backward from `offset - 1` to find the start
    /// of the codepoint immediately preceding `offset`.
    pub fn prev_codepoint_start(&self, offset: usize) -> usize {
        if offset == 0 {
            return 0;
        }
        let mut o = offset - 1;
        while o > 0 {
            match self.byte_at(o) {
                Some(b) if is_continuation(b) => o -= 1,
                _ => break,
            }
        }
        o
    }

    /// Walk continuation bytes forward from `offset + 1` to find the end of
    /// the codepoint starting at `offset`.
    pub fn next_codepoint_end(&self, offset: usize) -> usize {
        let mut o = (offset + 1).min(self.total_len);
        while o < self.total_len {
            match self.byte_at(o) {
                Some(b) if is_continuation(b) => o += 1,
                _ => break,
            }
        }
        o
    }

    /// Tab-aware display column of `offset` within its line.
    pub fn visual_column_from_offset(&self, offset: usize, tab_width: usize) -> usize {
        let offset = offset.min(self.total_len);
        let (line, _) = self.line_col_from_offset(offset);
        let start = self.line_starts[line];
        let mut col = 0usize;
        let mut o = start;
        while o < offset {
            match self.byte_at(o) {
                Some(b'\t') => {
                    col += tab_width - (col % tab_width);
                    o += 1;
                }
                Some(_) => {
                    col += 1;
                    o = self.next_codepoint_end(o);
                }
                None => break,
            }
        }
        col
    }

    /// Inverse of [`Self::visual_column_from_offset`]: the byte offset on
    /// `line` whose visual column is `target_col`, stopping before any
    /// overshoot caused by a tab stop.
    pub fn offset_from_line_visual_col(&self, line: usize, target_col: usize, tab_width: usize) -> usize {
        let line = line.min(self.line_starts.len() - 1);
        let start = self.line_starts[line];
        let end = start + self.line_width(line);
        let mut col = 0usize;
        let mut o = start;
        while o < end && col < target_col {
            match self.byte_at(o) {
                Some(b'\t') => {
                    let next_col = col + tab_width - (col % tab_width);
                    if next_col > target_col {
                        break;
                    }
                    col = next_col;
                    o += 1;
                }
                Some(_) => {
                    col += 1;
                    o = self.next_codepoint_end(o);
                }
                None => break,
            }
        }
        o
    }

    /// Skip non-word bytes moving left, then word bytes, stopping at the
    /// first word-start or buffer start. Word = alphanumeric or `_`.
    pub fn move_word_left(&self, offset: usize) -> usize {
        let mut o = offset.min(self.total_len);
        while o > 0 {
            let p = self.prev_codepoint_start(o);
            if self.byte_at(p).is_some_and(is_word_byte) {
                break;
            }
            o = p;
        }
        while o > 0 {
            let p = self.prev_codepoint_start(o);
            if !self.byte_at(p).is_some_and(is_word_byte) {
                break;
            }
            o = p;
        }
        o
    }

    /// Skip non-word bytes moving right, then word bytes, stopping at the
    /// first non-word byte or buffer end.
    pub fn move_word_right(&self, offset: usize) -> usize {
        let mut o = offset.min(self.total_len);
        while o < self.total_len {
            if self.byte_at(o).is_some_and(is_word_byte) {
                break;
            }
            o = self.next_codepoint_end(o);
        }
        while o < self.total_len {
            if !self.byte_at(o).is_some_and(is_word_byte) {
                break;
            }
            o = self.next_codepoint_end(o);
        }
        o
    }
}

/// Byte length of the UTF-8 sequence starting at `lead`, re-exported here so
/// callers of the buffer don't need a separate import for the common case.
pub fn codepoint_len_at(lead: u8) -> usize {
    utf8_lead_len(lead)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_delete_roundtrip() {
        let mut t = PieceTable::new(b"hello".to_vec());
        t.insert(5, b",");
        assert_eq!(t.to_owned_bytes(), b"hello,");
        t.insert(6, b" world");
        assert_eq!(t.to_owned_bytes(), b"hello, world");
        assert!(t.undo());
        assert_eq!(t.to_owned_bytes(), b"hello,");
        assert!(t.undo());
        assert_eq!(t.to_owned_bytes(), b"hello");
        assert!(!t.undo());
    }

    #[test]
    fn redo_restores_exact_state() {
        let mut t = PieceTable::new(b"abc".to_vec());
        t.insert(3, b"def");
        t.delete(0, 1);
        let snapshot = t.to_owned_bytes();
        t.undo();
        t.undo();
        assert!(t.redo());
        assert!(t.redo());
        assert_eq!(t.to_owned_bytes(), snapshot);
        assert!(!t.redo());
    }

    #[test]
    fn redo_cleared_by_new_edit() {
        let mut t = PieceTable::new(b"abc".to_vec());
        t.insert(3, b"d");
        t.undo();
        assert!(t.can_redo());
        t.insert(0, b"x");
        assert!(!t.can_redo());
    }

    #[test]
    fn line_starts_basic() {
        let t = PieceTable::new(b"a\nb\n".to_vec());
        assert_eq!(t.line_count(), 3);
        assert_eq!(t.line_start(0), 0);
        assert_eq!(t.line_start(1), 2);
        assert_eq!(t.line_start(2), 4);
    }

    #[test]
    fn goto_line_then_edit_s2() {
        let mut t = PieceTable::new(b"a\nb\n".to_vec());
        let cursor = t.offset_from_line_col(1, 0);
        assert_eq!(cursor, 2);
        t.insert(cursor, b"X");
        assert_eq!(t.to_owned_bytes(), b"a\nXb\n");
        assert_eq!(t.line_count(), 3);
        assert_eq!(t.line_start(1), 2);
        assert_eq!(t.line_start(2), 5);
    }

    #[test]
    fn utf8_navigation_s4() {
        let t = PieceTable::new("a\u{0444}b".as_bytes().to_vec());
        assert_eq!(t.next_codepoint_end(1), 3);
        assert_eq!(t.prev_codepoint_start(3), 1);
        assert_eq!(t.visual_column_from_offset(3, 8), 2);
    }

    #[test]
    fn align_to_codepoint_start_rounds_down_mid_codepoint() {
        let t = PieceTable::new("a\u{0444}b".as_bytes().to_vec());
        assert_eq!(t.align_to_codepoint_start(0), 0);
        assert_eq!(t.align_to_codepoint_start(1), 1);
        assert_eq!(t.align_to_codepoint_start(2), 1); // mid-'ф', rounds back to 1
        assert_eq!(t.align_to_codepoint_start(3), 3);
    }

    #[test]
    fn codepoint_boundary_invariant() {
        let t = PieceTable::new("a\u{0444}b".as_bytes().to_vec());
        for p in [0usize, 1, 3] {
            let end = t.next_codepoint_end(p);
            assert_eq!(t.prev_codepoint_start(end), p);
        }
    }

    #[test]
    fn visual_column_roundtrip_with_tabs() {
        let t = PieceTable::new(b"a\tbc".to_vec());
        for off in 0..=4usize {
            let col = t.visual_column_from_offset(off, 4);
            let back = t.offset_from_line_visual_col(0, col, 4);
            assert_eq!(back, off, "offset {off} col {col}");
        }
    }

    #[test]
    fn insert_at_end_appends() {
        let mut t = PieceTable::new(b"abc".to_vec());
        t.insert(100, b"d");
        assert_eq!(t.to_owned_bytes(), b"abcd");
    }

    #[test]
    fn delete_past_end_clamps() {
        let mut t = PieceTable::new(b"abc".to_vec());
        t.delete(1, 100);
        assert_eq!(t.to_owned_bytes(), b"a");
    }

    #[test]
    fn empty_edits_are_noops() {
        let mut t = PieceTable::new(b"abc".to_vec());
        t.insert(1, b"");
        t.delete(1, 0);
        assert_eq!(t.to_owned_bytes(), b"abc");
        assert!(!t.can_undo());
    }

    #[test]
    fn word_motion() {
        let t = PieceTable::new(b"  foo_bar  baz".to_vec());
        let start_word = t.move_word_right(0);
        assert_eq!(start_word, 9); // end of "foo_bar" after skipping spaces then word
        let back = t.move_word_left(start_word);
        assert_eq!(back, 2);
    }

    proptest::proptest! {
        #[test]
        fn matches_reference_buffer(ops in proptest::collection::vec(
            (0usize..40, proptest::collection::vec(proptest::prelude::any::<u8>(), 0..6), proptest::prelude::any::<bool>()),
            0..30,
        )) {
            let mut t = PieceTable::empty();
            let mut reference: Vec<u8> = Vec::new();
            for (raw_offset, bytes, is_insert) in ops {
                let offset = raw_offset.min(reference.len());
                if is_insert {
                    t.insert(offset, &bytes);
                    reference.splice(offset..offset, bytes.iter().copied());
                } else {
                    let count = bytes.len().min(reference.len().saturating_sub(offset));
                    t.delete(offset, count);
                    reference.splice(offset..offset + count, std::iter::empty());
                }
            }
            proptest::prop_assert_eq!(t.to_owned_bytes(), reference);
        }
    }
}
