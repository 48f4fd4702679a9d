//! End-to-end scenario tests (spec.md §8), exercising the crate through its
//! public surface rather than module-internal state. S6 and S7 need access
//! to `LspClient`'s private handshake/diagnostics state and are covered by
//! the unit tests in `src/lsp/client.rs` instead.

use zicro::app::App;
use zicro::buffer::PieceTable;
use zicro::clipboard::Clipboard;
use zicro::config::Config;
use zicro::lsp::framing::decode_frames;
use zicro::terminal::{KeyCode, KeyEvent, Modifiers};

fn plain(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, Modifiers::default())
}

fn shift(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, Modifiers { shift: true, ..Default::default() })
}

fn ctrl(c: char) -> KeyEvent {
    KeyEvent::new(KeyCode::Char(c), Modifiers { ctrl: true, ..Default::default() })
}

/// S1: type "abc"; Left, Left; Shift+End selects `[1,3)`; Ctrl+X cuts to a
/// (mocked, internal-buffer) clipboard.
#[test]
fn s1_type_select_cut() {
    let mut app = App::new(None, Config::default()).unwrap();
    for c in "abc".chars() {
        app.handle_key(plain(KeyCode::Char(c)));
    }
    assert_eq!(app.buffer.to_owned_bytes(), b"abc");
    assert_eq!(app.editor.cursor, 3);

    app.handle_key(plain(KeyCode::Left));
    app.handle_key(plain(KeyCode::Left));
    assert_eq!(app.editor.cursor, 1);

    app.handle_key(shift(KeyCode::End));
    assert_eq!(app.editor.selection_range(), Some((1, 3)));

    app.handle_key(ctrl('x'));
    assert_eq!(app.buffer.to_owned_bytes(), b"a");
    assert_eq!(app.editor.cursor, 1);
    assert_eq!(app.clipboard.read(), b"bc");
}

/// S2: load "a\nb\n"; goto line 2 puts the cursor at offset 2; typing `X`
/// there yields "a\nXb\n", 3 lines, with line 1 at offset 2 and line 2 at 5.
#[test]
fn s2_goto_line_and_type() {
    let mut buffer = PieceTable::new(b"a\nb\n".to_vec());
    let cursor = buffer.line_start(1);
    assert_eq!(cursor, 2);

    buffer.insert(cursor, b"X");
    assert_eq!(buffer.to_owned_bytes(), b"a\nXb\n");
    assert_eq!(buffer.line_count(), 3);
    assert_eq!(buffer.line_start(1), 2);
    assert_eq!(buffer.line_start(2), 5);
}

/// S3: "hello" -> insert "," -> insert " world" -> undo -> undo.
#[test]
fn s3_undo_chain() {
    let mut buffer = PieceTable::new(b"hello".to_vec());
    buffer.insert(5, b",");
    assert_eq!(buffer.to_owned_bytes(), b"hello,");
    buffer.insert(6, b" world");
    assert_eq!(buffer.to_owned_bytes(), b"hello, world");

    assert!(buffer.undo());
    assert_eq!(buffer.to_owned_bytes(), b"hello,");
    assert!(buffer.undo());
    assert_eq!(buffer.to_owned_bytes(), b"hello");
    assert!(!buffer.can_undo());
}

/// S4: UTF-8 navigation and visual-column conversion over "a\xd1\x84b".
#[test]
fn s4_utf8_navigation() {
    let buffer = PieceTable::new(vec![b'a', 0xd1, 0x84, b'b']);
    assert_eq!(buffer.next_codepoint_end(1), 3);
    assert_eq!(buffer.prev_codepoint_start(3), 1);
    assert_eq!(buffer.visual_column_from_offset(3, 8), 2);
}

/// S5: a single `Content-Length`-framed payload fed in arbitrary chunk
/// splits decodes to exactly one payload.
#[test]
fn s5_framing_arbitrary_chunks() {
    let whole = b"Content-Length: 5\r\n\r\nhello".to_vec();
    for split in 1..whole.len() {
        let mut buf = Vec::new();
        let mut frames = Vec::new();
        buf.extend_from_slice(&whole[..split]);
        frames.extend(decode_frames(&mut buf));
        buf.extend_from_slice(&whole[split..]);
        frames.extend(decode_frames(&mut buf));
        assert_eq!(frames, vec![b"hello".to_vec()], "split at {split}");
    }
}
