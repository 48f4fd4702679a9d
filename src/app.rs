//! The event loop (component H): owns the buffer, editor state, UI state,
//! sync engine and LSP client as a single value, and drives them forward one
//! [`App::tick`] at a time (spec.md §4.6). Command dispatch (what a
//! [`Command`] actually *does* to the buffer/editor/LSP) also lives here,
//! since the keymap (D) is intentionally just the pure `KeyEvent -> Command`
//! mapping.

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::buffer::PieceTable;
use crate::clipboard::{Clipboard, SystemClipboard};
use crate::config::{Config, HoverShowMode};
use crate::editor::{map_editor, Command, EditorState, SelectionMode};
use crate::highlighter::Highlighter;
use crate::lsp::types::{Location, LspPosition};
use crate::lsp::{discovery, JumpTarget, LspClient};
use crate::sync::{byte_offset_from_lsp_position, describe_lsp_error, lsp_position_from_offset, SyncEngine};
use crate::terminal::{KeyCode, KeyEvent, TerminalDriver};
use crate::ui_state::{LspPanelMode, PromptMode, UiState, PALETTE_ENTRIES};

/// The spec's "open cap": files larger than this are refused entirely
/// (spec.md §4.4.9, §5).
pub const OPEN_CAP_BYTES: u64 = 512 * 1024 * 1024;

#[derive(Debug)]
pub enum OpenError {
    TooBig(u64),
    Io(std::io::Error),
}

impl fmt::Display for OpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenError::TooBig(len) => write!(f, "file is {len} bytes, exceeds the {OPEN_CAP_BYTES} byte open cap"),
            OpenError::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for OpenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OpenError::Io(e) => Some(e),
            OpenError::TooBig(_) => None,
        }
    }
}

/// Everything the editor owns for the lifetime of a single run (spec.md
/// §3 "Lifecycle"). Constructed once at startup, destroyed on exit.
pub struct App {
    pub buffer: PieceTable,
    pub editor: EditorState,
    pub ui: UiState,
    pub config: Config,
    pub clipboard: Box<dyn Clipboard>,
    pub lsp: Option<LspClient>,
    pub sync: SyncEngine,
    pub file_path: Option<PathBuf>,
    pub running: bool,
    pub needs_render: bool,
    pub viewport_size: (u16, u16),
    viewport_rows: usize,
    last_frame_at: Instant,
    last_hover_rev: u64,
    last_definition_rev: u64,
    last_references_rev: u64,
    last_completion_rev: u64,
    last_diagnostics_revision: u64,
}

impl App {
    /// Open (or create, if `file_path` doesn't exist yet) a single buffer
    /// and, if `config.lsp.enabled`, try to start a language server for it
    /// (spec.md §4.4.1). LSP startup failure is non-fatal: it's surfaced as
    /// a status message and the editor opens the buffer anyway.
    pub fn new(file_path: Option<PathBuf>, config: Config) -> Result<Self, OpenError> {
        let bytes = match &file_path {
            Some(path) if path.is_file() => {
                let meta = std::fs::metadata(path).map_err(OpenError::Io)?;
                if meta.len() > OPEN_CAP_BYTES {
                    return Err(OpenError::TooBig(meta.len()));
                }
                std::fs::read(path).map_err(OpenError::Io)?
            }
            _ => Vec::new(),
        };

        let language = file_path.as_deref().and_then(discovery::detect_language);
        let mut editor = EditorState::new(language);
        let buffer = PieceTable::new(bytes);

        let mut lsp = None;
        if config.lsp.enabled {
            if let Some(path) = &file_path {
                match LspClient::start_for_file(path, &config) {
                    Ok(client) => lsp = Some(client),
                    Err(e) => editor.push_status(format!("lsp unavailable: {e}")),
                }
            }
        }

        Ok(Self {
            buffer,
            editor,
            ui: UiState::new(config.ui.perf_overlay),
            clipboard: Box::new(SystemClipboard::new()),
            config,
            lsp,
            sync: SyncEngine::new(),
            file_path,
            running: true,
            needs_render: true,
            viewport_size: (80, 24),
            viewport_rows: 20,
            last_frame_at: Instant::now(),
            last_hover_rev: 0,
            last_definition_rev: 0,
            last_references_rev: 0,
            last_completion_rev: 0,
            last_diagnostics_revision: 0,
        })
    }

    // ---- the tick (spec.md §4.6) -----------------------------------

    /// Drain pending input, poll the LSP client, flush due `didChange`s and
    /// render a frame if anything observable changed (spec.md §4.6 steps
    /// 1-5).
    pub fn tick(&mut self, terminal: &mut dyn TerminalDriver, highlighter: &dyn Highlighter) -> std::io::Result<()> {
        let mut handled_any = false;
        for _ in 0..128 {
            match terminal.poll_key(Duration::ZERO)? {
                Some(key) => {
                    self.handle_key(key);
                    handled_any = true;
                }
                None => break,
            }
        }

        if self.lsp.is_some() {
            if let Some(lsp) = &mut self.lsp {
                lsp.poll();
            }
            self.handle_lsp_responses();
            self.check_auto_requests();
        }

        let (cols, rows) = terminal.size()?;
        self.viewport_size = (cols, rows);
        self.viewport_rows = (rows as usize).saturating_sub(4).max(1);

        if let Some(lsp) = &mut self.lsp {
            let now = Instant::now();
            self.sync
                .flush_pending_did_change(lsp, &self.buffer, now, false, &self.config, self.file_path.as_deref());
        }

        if self.needs_render {
            let bytes = crate::ui::render_frame(self, cols, rows, highlighter);
            terminal.write_frame(&bytes)?;
            self.needs_render = false;
            let now = Instant::now();
            let frame_ms = now.duration_since(self.last_frame_at).as_secs_f64() * 1000.0;
            self.ui.perf.push(frame_ms);
            self.last_frame_at = now;
        }

        if !handled_any {
            if let Some(key) = terminal.poll_key(self.sleep_duration())? {
                self.handle_key(key);
            }
        }

        Ok(())
    }

    fn sleep_duration(&self) -> Duration {
        const BASE: Duration = Duration::from_millis(1);
        let Some(deadline) = self.sync.next_flush_deadline() else {
            return BASE;
        };
        let now = Instant::now();
        if deadline <= now {
            Duration::ZERO
        } else {
            BASE.min(deadline - now)
        }
    }

    // ---- input dispatch (mode precedence: palette > prompt > panel > editor) --

    pub fn handle_key(&mut self, key: KeyEvent) {
        self.needs_render = true;
        if self.ui.palette.active {
            self.handle_palette_key(key);
            return;
        }
        if self.ui.prompt.active {
            self.handle_prompt_key(key);
            return;
        }
        if self.ui.lsp_panel.mode != LspPanelMode::None {
            if self.handle_panel_key(key) {
                return;
            }
            self.ui.lsp_panel.close();
        }
        self.handle_editor_key(key);
    }

    fn handle_editor_key(&mut self, key: KeyEvent) {
        if let Some(cmd) = map_editor(key) {
            self.apply_command(cmd);
            return;
        }
        match key.code {
            KeyCode::Char(c) => {
                let mut buf = [0u8; 4];
                let text = c.encode_utf8(&mut buf).as_bytes().to_vec();
                self.insert_text(&text);
            }
            KeyCode::Tab => self.insert_text(b"\t"),
            _ => {}
        }
    }

    fn handle_palette_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.ui.palette.close(),
            KeyCode::Up => {
                self.ui.palette.selected = self.ui.palette.selected.saturating_sub(1);
            }
            KeyCode::Down => {
                let n = self.ui.palette.filtered(PALETTE_ENTRIES).len();
                if n > 0 {
                    self.ui.palette.selected = (self.ui.palette.selected + 1).min(n - 1);
                }
            }
            KeyCode::Enter => {
                let chosen = self.ui.palette.filtered(PALETTE_ENTRIES).get(self.ui.palette.selected).map(|e| e.command);
                self.ui.palette.close();
                if let Some(cmd) = chosen {
                    self.apply_command(cmd);
                }
            }
            KeyCode::Backspace => {
                self.ui.palette.query.pop();
                self.ui.palette.selected = 0;
            }
            KeyCode::Char(c) => {
                self.ui.palette.query.push(c);
                self.ui.palette.selected = 0;
            }
            _ => {}
        }
    }

    fn handle_prompt_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.ui.prompt.close(),
            KeyCode::Enter => self.submit_prompt(),
            KeyCode::Backspace => {
                self.ui.prompt.query.pop();
            }
            KeyCode::Char(c) => self.ui.prompt.query.push(c),
            _ => {}
        }
    }

    fn submit_prompt(&mut self) {
        match self.ui.prompt.mode {
            Some(PromptMode::GotoLine) => self.goto_line_from_prompt(),
            Some(PromptMode::RegexSearch) => self.regex_search_from_prompt(),
            None => {}
        }
        self.ui.prompt.close();
    }

    fn goto_line_from_prompt(&mut self) {
        match self.ui.prompt.query.trim().parse::<usize>() {
            Ok(n) if n >= 1 => {
                let line = (n - 1).min(self.buffer.line_count().saturating_sub(1));
                let offset = self.buffer.offset_from_line_col(line, 0);
                self.editor.preferred_visual_col = None;
                self.editor.move_cursor_to(offset, false);
            }
            _ => self.editor.push_status("invalid line number"),
        }
    }

    fn regex_search_from_prompt(&mut self) {
        match regex::bytes::Regex::new(&self.ui.prompt.query) {
            Ok(re) => {
                let text = self.buffer.to_owned_bytes();
                let hit = re
                    .find_iter(&text)
                    .find(|m| m.start() >= self.editor.cursor)
                    .or_else(|| re.find(&text));
                match hit {
                    Some(m) => {
                        self.editor.search_match = Some((m.start(), m.end()));
                        self.editor.preferred_visual_col = None;
                        self.editor.move_cursor_to(m.start(), false);
                    }
                    None => {
                        self.editor.search_match = None;
                        self.editor.push_status("no match");
                    }
                }
            }
            Err(_) => self.editor.push_status("invalid pattern"),
        }
    }

    /// Returns `true` if the key was consumed by the panel. `false` means
    /// "typing a character" — the caller closes the panel and falls through
    /// to the editor (spec.md §4.6).
    fn handle_panel_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Esc => {
                self.ui.lsp_panel.close();
                true
            }
            KeyCode::Up => {
                self.ui.lsp_panel.selected = self.ui.lsp_panel.selected.saturating_sub(1);
                true
            }
            KeyCode::Down => {
                let n = self.panel_item_count();
                if n > 0 {
                    self.ui.lsp_panel.selected = (self.ui.lsp_panel.selected + 1).min(n - 1);
                }
                true
            }
            KeyCode::Enter => {
                match self.ui.lsp_panel.mode {
                    LspPanelMode::Completion => self.apply_completion_selection(),
                    LspPanelMode::References | LspPanelMode::Definition => self.jump_to_panel_selection(),
                    LspPanelMode::None => {}
                }
                true
            }
            KeyCode::Tab if self.ui.lsp_panel.mode == LspPanelMode::Completion => {
                self.apply_completion_selection();
                true
            }
            _ => false,
        }
    }

    fn panel_item_count(&self) -> usize {
        let Some(lsp) = &self.lsp else { return 0 };
        match self.ui.lsp_panel.mode {
            LspPanelMode::Completion => lsp.completion.items.len(),
            LspPanelMode::References => lsp.references.locations.len(),
            LspPanelMode::Definition => lsp.definition.locations.len(),
            LspPanelMode::None => 0,
        }
    }

    fn apply_completion_selection(&mut self) {
        let Some(lsp) = &self.lsp else {
            self.ui.lsp_panel.close();
            return;
        };
        let Some(item) = lsp.completion.items.get(self.ui.lsp_panel.selected).cloned() else {
            self.ui.lsp_panel.close();
            return;
        };
        if item.has_text_edit {
            if let (Some(start), Some(end)) = (item.edit_start, item.edit_end) {
                let s = byte_offset_from_lsp_position(&self.buffer, start);
                let e = byte_offset_from_lsp_position(&self.buffer, end);
                self.replace_range(s, e, item.insert_text.as_bytes(), false);
            } else {
                self.insert_text(item.insert_text.as_bytes());
            }
        } else {
            self.insert_text(item.insert_text.as_bytes());
        }
        self.ui.lsp_panel.close();
    }

    fn jump_to_panel_selection(&mut self) {
        let Some(lsp) = &self.lsp else {
            self.ui.lsp_panel.close();
            return;
        };
        let locations = match self.ui.lsp_panel.mode {
            LspPanelMode::References => &lsp.references.locations,
            LspPanelMode::Definition => &lsp.definition.locations,
            _ => {
                self.ui.lsp_panel.close();
                return;
            }
        };
        let Some(loc) = locations.get(self.ui.lsp_panel.selected).cloned() else {
            self.ui.lsp_panel.close();
            return;
        };
        self.jump_to_location(&loc);
        self.ui.lsp_panel.close();
    }

    fn jump_to_location(&mut self, loc: &Location) {
        let Some(lsp) = &self.lsp else { return };
        match lsp.resolve_jump(loc) {
            JumpTarget::SameFile { line, character } => {
                let offset = byte_offset_from_lsp_position(&self.buffer, LspPosition { line, character });
                self.editor.push_jump(self.editor.cursor);
                self.editor.preferred_visual_col = None;
                self.editor.move_cursor_to(offset, false);
            }
            JumpTarget::CrossFile => {
                self.editor.push_status("cross-file jump not supported");
            }
        }
    }

    // ---- command dispatch -------------------------------------------

    fn apply_command(&mut self, cmd: Command) {
        use Command::*;
        match cmd {
            Save => self.save_file(),
            Quit => self.request_quit(),
            Copy => self.copy_selection(),
            Cut => self.cut_selection(),
            Paste => self.paste_clipboard(),
            GotoLine => self.ui.prompt.open(PromptMode::GotoLine),
            RegexSearch => self.ui.prompt.open(PromptMode::RegexSearch),
            ToggleComment => self.toggle_comment(),
            ShowPalette => self.ui.palette.open(),
            MoveLeft => self.move_horizontal(-1, false),
            MoveRight => self.move_horizontal(1, false),
            MoveUp => self.move_vertical(-1, false),
            MoveDown => self.move_vertical(1, false),
            MoveHome => self.move_home(false),
            MoveEnd => self.move_end(false),
            PageUp => self.move_page(-1, false),
            PageDown => self.move_page(1, false),
            SelectLeft => self.move_horizontal(-1, true),
            SelectRight => self.move_horizontal(1, true),
            SelectUp => self.move_vertical(-1, true),
            SelectDown => self.move_vertical(1, true),
            SelectHome => self.move_home(true),
            SelectEnd => self.move_end(true),
            SelectPageUp => self.move_page(-1, true),
            SelectPageDown => self.move_page(1, true),
            BlockSelectLeft => self.block_select(-1, 0),
            BlockSelectRight => self.block_select(1, 0),
            BlockSelectUp => self.block_select(0, -1),
            BlockSelectDown => self.block_select(0, 1),
            WordLeft => self.move_word(-1, false),
            WordRight => self.move_word(1, false),
            Backspace => self.backspace(),
            DeleteChar => self.delete_char(),
            InsertNewline => self.insert_text(b"\n"),
            Undo => self.undo(),
            Redo => self.redo(),
            LspCompletion => self.request_completion(),
            LspHover => self.request_hover(),
            LspDefinition => self.request_definition(),
            LspReferences => self.request_references(),
            LspJumpBack => self.jump_back(),
        }
    }

    // ---- motion -------------------------------------------------------

    fn clear_transient_on_move(&mut self) {
        self.ui.hover_tooltip = None;
        if self.ui.lsp_panel.mode == LspPanelMode::Completion {
            self.ui.lsp_panel.close();
        }
    }

    fn move_horizontal(&mut self, delta: isize, select: bool) {
        self.clear_transient_on_move();
        if select {
            self.editor.start_selection(SelectionMode::Linear);
        }
        let new_offset = if delta < 0 {
            self.buffer.prev_codepoint_start(self.editor.cursor)
        } else {
            self.buffer.next_codepoint_end(self.editor.cursor)
        };
        self.editor.preferred_visual_col = None;
        self.editor.move_cursor_to(new_offset, select);
    }

    fn move_vertical(&mut self, delta: isize, select: bool) {
        self.clear_transient_on_move();
        if select {
            self.editor.start_selection(SelectionMode::Linear);
        }
        let vcol = self.current_visual_col();
        let new_offset = self.offset_for_vertical_move(delta, vcol);
        self.editor.move_cursor_to(new_offset, select);
        self.editor.preferred_visual_col = Some(vcol);
    }

    fn current_visual_col(&self) -> usize {
        let tab = self.config.tab_width as usize;
        self.editor
            .preferred_visual_col
            .unwrap_or_else(|| self.buffer.visual_column_from_offset(self.editor.cursor, tab))
    }

    fn offset_for_vertical_move(&self, delta: isize, vcol: usize) -> usize {
        let tab = self.config.tab_width as usize;
        let (line, _) = self.buffer.line_col_from_offset(self.editor.cursor);
        let last_line = self.buffer.line_count().saturating_sub(1);
        let target_line = if delta < 0 {
            line.saturating_sub((-delta) as usize)
        } else {
            (line + delta as usize).min(last_line)
        };
        self.buffer.offset_from_line_visual_col(target_line, vcol, tab)
    }

    fn move_home(&mut self, select: bool) {
        self.clear_transient_on_move();
        if select {
            self.editor.start_selection(SelectionMode::Linear);
        }
        let (line, _) = self.buffer.line_col_from_offset(self.editor.cursor);
        let offset = self.buffer.line_start(line);
        self.editor.preferred_visual_col = None;
        self.editor.move_cursor_to(offset, select);
    }

    fn move_end(&mut self, select: bool) {
        self.clear_transient_on_move();
        if select {
            self.editor.start_selection(SelectionMode::Linear);
        }
        let (line, _) = self.buffer.line_col_from_offset(self.editor.cursor);
        let end = if line + 1 < self.buffer.line_count() {
            self.buffer.line_start(line + 1) - 1
        } else {
            self.buffer.len()
        };
        self.editor.preferred_visual_col = None;
        self.editor.move_cursor_to(end, select);
    }

    fn move_page(&mut self, dir: isize, select: bool) {
        let rows = self.viewport_rows.max(1) as isize;
        self.move_vertical(dir * rows, select);
    }

    fn block_select(&mut self, dcol: isize, dline: isize) {
        self.clear_transient_on_move();
        self.editor.start_selection(SelectionMode::Block);
        self.editor.selection_mode = SelectionMode::Block;
        if dline != 0 {
            let vcol = self.buffer.visual_column_from_offset(self.editor.cursor, self.config.tab_width as usize);
            self.editor.cursor = self.offset_for_vertical_move(dline, vcol);
        }
        if dcol != 0 {
            self.editor.cursor = if dcol < 0 {
                self.buffer.prev_codepoint_start(self.editor.cursor)
            } else {
                self.buffer.next_codepoint_end(self.editor.cursor)
            };
        }
    }

    fn move_word(&mut self, delta: isize, select: bool) {
        self.clear_transient_on_move();
        if select {
            self.editor.start_selection(SelectionMode::Linear);
        }
        let new_offset = if delta < 0 {
            self.buffer.move_word_left(self.editor.cursor)
        } else {
            self.buffer.move_word_right(self.editor.cursor)
        };
        self.editor.preferred_visual_col = None;
        self.editor.move_cursor_to(new_offset, select);
    }

    // ---- editing --------------------------------------------------------

    fn insert_text(&mut self, text: &[u8]) {
        if let Some((s, e)) = self.editor.selection_range() {
            let force = self.editor.selection_mode == SelectionMode::Block;
            self.replace_range(s, e, text, force);
        } else {
            let offset = self.editor.cursor;
            self.insert_at(offset, text, false);
        }
    }

    fn insert_at(&mut self, offset: usize, text: &[u8], force_full: bool) {
        self.sync.queue_incremental_change(&self.buffer, offset, offset, text);
        self.buffer.insert(offset, text);
        self.editor.preferred_visual_col = None;
        self.editor.move_cursor_to(offset + text.len(), false);
        self.editor.dirty = true;
        self.editor.confirm_quit = false;
        self.after_edit(force_full);
    }

    fn replace_range(&mut self, start: usize, end: usize, text: &[u8], force_full: bool) {
        self.sync.queue_incremental_change(&self.buffer, start, end, text);
        self.buffer.delete(start, end - start);
        self.buffer.insert(start, text);
        self.editor.preferred_visual_col = None;
        self.editor.move_cursor_to(start + text.len(), false);
        self.editor.dirty = true;
        self.editor.confirm_quit = false;
        self.after_edit(force_full);
    }

    fn delete_range_no_insert(&mut self, start: usize, end: usize, force_full: bool) {
        if start == end {
            return;
        }
        self.sync.queue_incremental_change(&self.buffer, start, end, b"");
        self.buffer.delete(start, end - start);
        self.editor.preferred_visual_col = None;
        self.editor.move_cursor_to(start, false);
        self.editor.dirty = true;
        self.editor.confirm_quit = false;
        self.after_edit(force_full);
    }

    fn after_edit(&mut self, force_full: bool) {
        if force_full {
            self.sync.force_full_sync();
        }
        self.sync
            .queue_did_change(Instant::now(), Duration::from_millis(self.config.lsp.change_debounce_ms));
        self.schedule_auto_requests();
    }

    fn backspace(&mut self) {
        if let Some((s, e)) = self.editor.selection_range() {
            let force = self.editor.selection_mode == SelectionMode::Block;
            self.delete_range_no_insert(s, e, force);
        } else if self.editor.cursor > 0 {
            let start = self.buffer.prev_codepoint_start(self.editor.cursor);
            let end = self.editor.cursor;
            self.delete_range_no_insert(start, end, false);
        }
    }

    fn delete_char(&mut self) {
        if let Some((s, e)) = self.editor.selection_range() {
            let force = self.editor.selection_mode == SelectionMode::Block;
            self.delete_range_no_insert(s, e, force);
        } else if self.editor.cursor < self.buffer.len() {
            let end = self.buffer.next_codepoint_end(self.editor.cursor);
            self.delete_range_no_insert(self.editor.cursor, end, false);
        }
    }

    fn undo(&mut self) {
        if self.buffer.undo() {
            self.editor.cursor = self.buffer.align_to_codepoint_start(self.editor.cursor.min(self.buffer.len()));
            self.editor.clear_selection();
            self.editor.preferred_visual_col = None;
            self.editor.dirty = true;
            self.after_edit(true);
        }
    }

    fn redo(&mut self) {
        if self.buffer.redo() {
            self.editor.cursor = self.buffer.align_to_codepoint_start(self.editor.cursor.min(self.buffer.len()));
            self.editor.clear_selection();
            self.editor.preferred_visual_col = None;
            self.editor.dirty = true;
            self.after_edit(true);
        }
    }

    fn comment_prefix(&self) -> &'static str {
        match self.editor.language.as_deref() {
            Some("shell") => "# ",
            _ => "// ",
        }
    }

    /// Toggle a line-comment prefix over the current line or every line the
    /// selection touches. Always forces a full resync (spec.md §4.5): the
    /// edited lines are disjoint, so a post-facto incremental range can't
    /// describe them correctly.
    fn toggle_comment(&mut self) {
        let prefix = self.comment_prefix();
        let (start_line, end_line) = match self.editor.selection_range() {
            Some((s, e)) => {
                let last = e.saturating_sub(1).max(s);
                (self.buffer.line_col_from_offset(s).0, self.buffer.line_col_from_offset(last).0)
            }
            None => {
                let line = self.buffer.line_col_from_offset(self.editor.cursor).0;
                (line, line)
            }
        };

        let line_bytes = |buffer: &PieceTable, l: usize| -> Vec<u8> {
            let start = buffer.line_start(l);
            let end = if l + 1 < buffer.line_count() { buffer.line_start(l + 1) } else { buffer.len() };
            buffer.slice(start, end)
        };
        let all_commented = (start_line..=end_line).all(|l| {
            let bytes = line_bytes(&self.buffer, l);
            bytes.starts_with(prefix.as_bytes()) || bytes.iter().all(u8::is_ascii_whitespace)
        });

        for l in (start_line..=end_line).rev() {
            let line_start = self.buffer.line_start(l);
            if all_commented {
                let bytes = line_bytes(&self.buffer, l);
                if bytes.starts_with(prefix.as_bytes()) {
                    self.buffer.delete(line_start, prefix.len());
                }
            } else {
                self.buffer.insert(line_start, prefix.as_bytes());
            }
        }
        self.editor.dirty = true;
        self.editor.confirm_quit = false;
        self.after_edit(true);
    }

    // ---- clipboard ------------------------------------------------------

    fn copy_selection(&mut self) {
        if let Some((s, e)) = self.editor.selection_range() {
            let bytes = self.buffer.slice(s, e);
            self.clipboard.write(&bytes);
        }
    }

    fn cut_selection(&mut self) {
        if let Some((s, e)) = self.editor.selection_range() {
            let bytes = self.buffer.slice(s, e);
            self.clipboard.write(&bytes);
            // Clipboard-driven deletions force a full resync (spec.md §4.5).
            self.delete_range_no_insert(s, e, true);
        }
    }

    fn paste_clipboard(&mut self) {
        let data = self.clipboard.read();
        if data.is_empty() {
            return;
        }
        // Full sync is only forced by pasting *into a block selection*
        // (spec.md §4.5), not by a stale block selection mode with nothing
        // selected — that's a plain paste-at-cursor.
        if let Some((s, e)) = self.editor.selection_range() {
            let force = self.editor.selection_mode == SelectionMode::Block;
            self.replace_range(s, e, &data, force);
        } else {
            let offset = self.editor.cursor;
            self.insert_at(offset, &data, false);
        }
    }

    // ---- file lifecycle ---------------------------------------------

    fn save_file(&mut self) {
        let Some(path) = self.file_path.clone() else {
            self.editor.push_status("no file path to save to");
            return;
        };
        match std::fs::write(&path, self.buffer.to_owned_bytes()) {
            Ok(()) => {
                self.editor.dirty = false;
                self.editor.confirm_quit = false;
                if let Some(lsp) = &mut self.lsp {
                    lsp.did_save();
                }
                self.editor.push_status("saved");
            }
            Err(e) => self.editor.push_status(format!("save failed: {e}")),
        }
    }

    fn request_quit(&mut self) {
        if self.editor.dirty && !self.editor.confirm_quit {
            self.editor.confirm_quit = true;
            self.editor.push_status("unsaved changes — press again to quit");
            return;
        }
        self.running = false;
    }

    // ---- LSP feature requests ----------------------------------------

    fn request_completion(&mut self) {
        let pos = lsp_position_from_offset(&self.buffer, self.editor.cursor);
        let Some(lsp) = &mut self.lsp else {
            self.editor.push_status("lsp not available");
            return;
        };
        match lsp.request_completion(pos) {
            Ok(()) => self.ui.lsp_panel.open(LspPanelMode::Completion),
            Err(e) => self.editor.push_status(describe_lsp_error(&e)),
        }
    }

    fn request_hover(&mut self) {
        let pos = lsp_position_from_offset(&self.buffer, self.editor.cursor);
        let Some(lsp) = &mut self.lsp else {
            self.editor.push_status("lsp not available");
            return;
        };
        if let Err(e) = lsp.request_hover(pos) {
            self.editor.push_status(describe_lsp_error(&e));
        }
    }

    fn request_definition(&mut self) {
        let pos = lsp_position_from_offset(&self.buffer, self.editor.cursor);
        let Some(lsp) = &mut self.lsp else {
            self.editor.push_status("lsp not available");
            return;
        };
        if let Err(e) = lsp.request_definition(pos) {
            self.editor.push_status(describe_lsp_error(&e));
        }
    }

    fn request_references(&mut self) {
        let pos = lsp_position_from_offset(&self.buffer, self.editor.cursor);
        let Some(lsp) = &mut self.lsp else {
            self.editor.push_status("lsp not available");
            return;
        };
        match lsp.request_references(pos) {
            Ok(()) => self.ui.lsp_panel.open(LspPanelMode::References),
            Err(e) => self.editor.push_status(describe_lsp_error(&e)),
        }
    }

    fn jump_back(&mut self) {
        match self.editor.pop_jump() {
            Some(offset) => {
                let offset = offset.min(self.buffer.len());
                self.editor.preferred_visual_col = None;
                self.editor.move_cursor_to(offset, false);
            }
            None => self.editor.push_status("no previous jump"),
        }
    }

    /// React to LSP responses that landed since the last tick: surface
    /// hover text, auto-jump on a single definition result (opening the
    /// panel for more than one), and drop empty completion/reference
    /// panels (spec.md §4.4.6, §4.6).
    fn handle_lsp_responses(&mut self) {
        let Some(lsp) = &self.lsp else { return };
        let hover_rev = lsp.hover.rev;
        let hover_pending = lsp.hover.pending;
        let hover_text = lsp.hover.text.clone();
        let definition_rev = lsp.definition.rev;
        let definition_pending = lsp.definition.pending;
        let definition_locations = lsp.definition.locations.clone();
        let references_rev = lsp.references.rev;
        let references_pending = lsp.references.pending;
        let references_empty = lsp.references.locations.is_empty();
        let completion_rev = lsp.completion.rev;
        let completion_pending = lsp.completion.pending;
        let completion_empty = lsp.completion.items.is_empty();
        let diagnostics_revision = lsp.diagnostics.revision;

        if hover_rev != self.last_hover_rev && !hover_pending {
            self.last_hover_rev = hover_rev;
            match (self.config.lsp.hover.show_mode, hover_text) {
                (HoverShowMode::Tooltip, Some(text)) => self.ui.hover_tooltip = Some(text),
                (HoverShowMode::Status, Some(text)) => self.editor.push_status(text),
                _ => {}
            }
        }

        if definition_rev != self.last_definition_rev && !definition_pending {
            self.last_definition_rev = definition_rev;
            match definition_locations.as_slice() {
                [] => self.editor.push_status("no definition found"),
                [only] => {
                    let loc = only.clone();
                    self.jump_to_location(&loc);
                }
                _ => self.ui.lsp_panel.open(LspPanelMode::Definition),
            }
        }

        if references_rev != self.last_references_rev && !references_pending {
            self.last_references_rev = references_rev;
            if references_empty {
                self.editor.push_status("no references found");
                self.ui.lsp_panel.close();
            }
        }

        if completion_rev != self.last_completion_rev && !completion_pending {
            self.last_completion_rev = completion_rev;
            if completion_empty && self.ui.lsp_panel.mode == LspPanelMode::Completion {
                self.ui.lsp_panel.close();
            }
        }

        if diagnostics_revision != self.last_diagnostics_revision {
            self.last_diagnostics_revision = diagnostics_revision;
        }
    }

    fn schedule_auto_requests(&mut self) {
        if self.lsp.is_none() {
            return;
        }
        let now = Instant::now();
        if self.config.lsp.completion.auto && self.completion_trigger_active() {
            self.ui.auto_completion_deadline = Some(now + Duration::from_millis(self.config.lsp.completion.debounce_ms));
        }
        if self.config.lsp.hover.auto {
            self.ui.auto_hover_deadline = Some(now + Duration::from_millis(self.config.lsp.hover.debounce_ms));
        }
    }

    fn completion_trigger_active(&self) -> bool {
        if self.editor.cursor == 0 {
            return false;
        }
        let prev = self.buffer.prev_codepoint_start(self.editor.cursor);
        let Some(byte) = self.buffer.byte_at(prev) else { return false };
        if self.config.lsp.completion.trigger_on_dot && byte == b'.' {
            return true;
        }
        if self.config.lsp.completion.trigger_on_letters && is_identifier_byte(byte) {
            return self.identifier_prefix_len() >= self.config.lsp.completion.min_prefix_len;
        }
        false
    }

    fn identifier_prefix_len(&self) -> usize {
        let mut offset = self.editor.cursor;
        let mut len = 0usize;
        while offset > 0 {
            let prev = self.buffer.prev_codepoint_start(offset);
            match self.buffer.byte_at(prev) {
                Some(b) if is_identifier_byte(b) => {
                    len += 1;
                    offset = prev;
                }
                _ => break,
            }
        }
        len
    }

    fn check_auto_requests(&mut self) {
        let now = Instant::now();
        if self.ui.auto_completion_deadline.is_some_and(|d| now >= d) {
            self.ui.auto_completion_deadline = None;
            self.request_completion_auto();
        }
        if self.ui.auto_hover_deadline.is_some_and(|d| now >= d) {
            self.ui.auto_hover_deadline = None;
            self.request_hover_auto();
        }
    }

    fn request_completion_auto(&mut self) {
        let pos = lsp_position_from_offset(&self.buffer, self.editor.cursor);
        if let Some(lsp) = &mut self.lsp {
            if lsp.request_completion(pos).is_ok() {
                self.ui.lsp_panel.open(LspPanelMode::Completion);
            }
        }
    }

    fn request_hover_auto(&mut self) {
        let pos = lsp_position_from_offset(&self.buffer, self.editor.cursor);
        if let Some(lsp) = &mut self.lsp {
            let _ = lsp.request_hover(pos);
        }
    }
}

fn is_identifier_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::Modifiers;

    fn app() -> App {
        App::new(None, Config::default()).unwrap()
    }

    fn key(code: KeyCode, mods: Modifiers) -> KeyEvent {
        KeyEvent::new(code, mods)
    }

    fn plain(code: KeyCode) -> KeyEvent {
        key(code, Modifiers::default())
    }

    fn shift(code: KeyCode) -> KeyEvent {
        key(code, Modifiers { shift: true, ..Default::default() })
    }

    fn ctrl(c: char) -> KeyEvent {
        key(KeyCode::Char(c), Modifiers { ctrl: true, ..Default::default() })
    }

    /// S1: type "abc", move left twice, shift+end selects, Ctrl+X cuts.
    #[test]
    fn s1_type_select_cut() {
        let mut app = app();
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

    /// S2: goto line 2 in "a\nb\n", type 'X'.
    #[test]
    fn s2_goto_line_and_type() {
        let mut app = app();
        app.buffer = PieceTable::new(b"a\nb\n".to_vec());
        app.handle_key(ctrl('g'));
        app.ui.prompt.query = "2".into();
        app.handle_key(plain(KeyCode::Enter));
        assert_eq!(app.editor.cursor, 2);

        app.handle_key(plain(KeyCode::Char('X')));
        assert_eq!(app.buffer.to_owned_bytes(), b"a\nXb\n");
        assert_eq!(app.buffer.line_count(), 3);
        assert_eq!(app.buffer.line_start(1), 2);
        assert_eq!(app.buffer.line_start(2), 5);
    }

    /// S3: insert(5, ","); insert(6, " world"); undo twice restores "hello".
    #[test]
    fn s3_undo_chain() {
        let mut app = app();
        app.buffer = PieceTable::new(b"hello".to_vec());
        app.editor.cursor = 5;
        app.insert_text(b",");
        assert_eq!(app.buffer.to_owned_bytes(), b"hello,");
        app.insert_text(b" world");
        assert_eq!(app.buffer.to_owned_bytes(), b"hello, world");

        app.handle_key(ctrl('z'));
        assert_eq!(app.buffer.to_owned_bytes(), b"hello,");
        app.handle_key(ctrl('z'));
        assert_eq!(app.buffer.to_owned_bytes(), b"hello");
    }

    #[test]
    fn quit_requires_confirmation_when_dirty() {
        let mut app = app();
        app.handle_key(plain(KeyCode::Char('a')));
        assert!(app.editor.dirty);
        app.handle_key(ctrl('q'));
        assert!(app.running);
        assert!(app.editor.confirm_quit);
        app.handle_key(ctrl('q'));
        assert!(!app.running);
    }

    #[test]
    fn toggle_comment_forces_full_sync() {
        let mut app = app();
        app.buffer = PieceTable::new(b"let x = 1;".to_vec());
        app.handle_key(ctrl('/'));
        assert_eq!(app.buffer.to_owned_bytes(), b"// let x = 1;");
        app.handle_key(ctrl('/'));
        assert_eq!(app.buffer.to_owned_bytes(), b"let x = 1;");
    }

    #[test]
    fn word_motion_skips_to_next_word() {
        let mut app = app();
        app.buffer = PieceTable::new(b"foo bar baz".to_vec());
        app.editor.cursor = 0;
        app.handle_key(key(KeyCode::Right, Modifiers { ctrl: true, ..Default::default() }));
        assert_eq!(app.editor.cursor, 3);
    }
}
