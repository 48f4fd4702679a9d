//! The UI renderer (component I): composes a single frame of raw ANSI bytes
//! from an [`App`]'s current state (spec.md §4.7). There's no retained
//! widget tree — every tick renders the whole frame from scratch, the same
//! way the terminal driver boundary expects (`TerminalDriver::write_frame`
//! takes one opaque byte blob).

use crate::app::App;
use crate::highlighter::{Highlighter, TokenKind};
use crate::ui_state::{LspPanelMode, PromptMode, PALETTE_ENTRIES};

const GUTTER_WIDTH: usize = 5;

/// Render one full frame: diagnostics bar, text area, status bar, message
/// bar, and — if a modal is active — an overlay box. Adjusts
/// `app.editor.scroll_y` to keep the cursor in view as a side effect, same
/// as the scroll-follows-cursor behavior spec.md §4.7 describes.
pub fn render_frame(app: &mut App, width: u16, height: u16, highlighter: &dyn Highlighter) -> Vec<u8> {
    let width = (width as usize).max(10);
    let height = (height as usize).max(4);
    let content_rows = height - 3;

    adjust_scroll(app, content_rows);

    let mut out = Vec::with_capacity(width * height * 2);
    out.extend_from_slice(b"\x1b[?25l\x1b[H");

    emit_row(&mut out, &render_diagnostics_bar(app, width));
    for row in render_text_rows(app, width, content_rows, highlighter) {
        emit_row(&mut out, &row);
    }
    emit_row(&mut out, &render_status_bar(app, width));
    emit_row_no_newline(&mut out, &render_message_bar(app, width));

    if let Some(overlay) = render_overlay(app, width, height) {
        out.extend_from_slice(&overlay);
    }

    let (row, col) = cursor_screen_position(app, width, content_rows);
    out.extend_from_slice(format!("\x1b[{};{}H", row + 1, col + 1).as_bytes());
    out.extend_from_slice(b"\x1b[?25h");
    out
}

fn emit_row(out: &mut Vec<u8>, text: &str) {
    out.extend_from_slice(b"\x1b[2K");
    out.extend_from_slice(text.as_bytes());
    out.extend_from_slice(b"\r\n");
}

fn emit_row_no_newline(out: &mut Vec<u8>, text: &str) {
    out.extend_from_slice(b"\x1b[2K");
    out.extend_from_slice(text.as_bytes());
}

fn adjust_scroll(app: &mut App, content_rows: usize) {
    let (line, _) = app.buffer.line_col_from_offset(app.editor.cursor);
    if line < app.editor.scroll_y {
        app.editor.scroll_y = line;
    } else if line >= app.editor.scroll_y + content_rows {
        app.editor.scroll_y = line + 1 - content_rows;
    }
}

fn pad(mut s: String, width: usize) -> String {
    let len = s.chars().count();
    if len > width {
        s.chars().take(width).collect()
    } else {
        s.push_str(&" ".repeat(width - len));
        s
    }
}

fn render_diagnostics_bar(app: &App, width: usize) -> String {
    let Some(lsp) = &app.lsp else { return pad(String::new(), width) };
    if lsp.diagnostics.count == 0 {
        return pad(String::new(), width);
    }
    let plural = if lsp.diagnostics.count == 1 { "" } else { "s" };
    let mut line = format!("{} diagnostic{plural}", lsp.diagnostics.count);
    if let (Some(ln), Some(msg)) = (lsp.diagnostics.first_line, &lsp.diagnostics.first_message) {
        line.push_str(&format!(" \u{2014} line {ln}: {msg}"));
    }
    pad(line, width)
}

fn render_gutter(app: &App, line: Option<usize>) -> String {
    match line {
        Some(l) => {
            let lineno = l as u32 + 1;
            let has_diag = app.lsp.as_ref().is_some_and(|c| c.diagnostics.lines.contains(&lineno));
            if has_diag {
                format!("\x1b[31m!{lineno:>3}\x1b[0m ")
            } else {
                format!(" {lineno:>3} ")
            }
        }
        None => "     ".to_string(),
    }
}

fn style_for(selected: bool, search: bool, kind: Option<TokenKind>) -> Option<&'static str> {
    if selected {
        return Some("\x1b[7m");
    }
    if search {
        return Some("\x1b[43m\x1b[30m");
    }
    match kind {
        Some(TokenKind::Keyword) => Some("\x1b[36m"),
        Some(TokenKind::String) => Some("\x1b[32m"),
        Some(TokenKind::Comment) => Some("\x1b[90m"),
        Some(TokenKind::Number) => Some("\x1b[35m"),
        _ => None,
    }
}

/// Render one source line clipped to `max_cols` display columns, expanding
/// tabs and overlaying selection/search-match/highlighter spans.
fn render_line_content(app: &App, highlighter: &dyn Highlighter, line: usize, max_cols: usize) -> String {
    let tab = app.config.tab_width as usize;
    let start = app.buffer.line_start(line);
    let end = if line + 1 < app.buffer.line_count() {
        app.buffer.line_start(line + 1).saturating_sub(1)
    } else {
        app.buffer.len()
    };
    let bytes = app.buffer.slice(start, end.max(start));
    let spans = highlighter.highlight_line(app.editor.language.as_deref(), &bytes);
    let selection = app.editor.selection_range();
    let search = app.editor.search_match;

    let mut out = String::new();
    let mut col = 0usize;
    let mut i = 0usize;
    let mut active_style: Option<&'static str> = None;
    while i < bytes.len() && col < max_cols {
        let abs_offset = start + i;
        let in_selection = selection.is_some_and(|(s, e)| abs_offset >= s && abs_offset < e);
        let in_search = search.is_some_and(|(s, e)| abs_offset >= s && abs_offset < e);
        let kind = spans.iter().find(|sp| i >= sp.byte_start && i < sp.byte_end).map(|sp| sp.kind);
        let style = style_for(in_selection, in_search, kind);
        if style != active_style {
            if active_style.is_some() {
                out.push_str("\x1b[0m");
            }
            if let Some(code) = style {
                out.push_str(code);
            }
            active_style = style;
        }

        let b = bytes[i];
        if b == b'\t' {
            let next_col = (col + tab - (col % tab)).min(max_cols);
            out.push_str(&" ".repeat(next_col - col));
            col = next_col;
            i += 1;
        } else {
            let n = crate::buffer::utf8_lead_len(b).min(bytes.len() - i);
            match std::str::from_utf8(&bytes[i..i + n]) {
                Ok(s) => out.push_str(s),
                Err(_) => out.push('\u{fffd}'),
            }
            col += 1;
            i += n;
        }
    }
    if active_style.is_some() {
        out.push_str("\x1b[0m");
    }
    out
}

fn render_text_rows(app: &App, width: usize, content_rows: usize, highlighter: &dyn Highlighter) -> Vec<String> {
    let text_width = width.saturating_sub(GUTTER_WIDTH);
    (0..content_rows)
        .map(|i| {
            let line = app.editor.scroll_y + i;
            if line < app.buffer.line_count() {
                format!("{}{}", render_gutter(app, Some(line)), render_line_content(app, highlighter, line, text_width))
            } else {
                format!("{}~", render_gutter(app, None))
            }
        })
        .collect()
}

fn render_status_bar(app: &App, width: usize) -> String {
    let name = app
        .file_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "[No Name]".to_string());
    let dirty = if app.editor.dirty { "*" } else { "" };
    let (line, _) = app.buffer.line_col_from_offset(app.editor.cursor);
    let vcol = app.buffer.visual_column_from_offset(app.editor.cursor, app.config.tab_width as usize);
    let lsp_status = match &app.lsp {
        Some(c) if c.session_ready => "lsp:ready",
        Some(_) => "lsp:starting",
        None => "lsp:off",
    };
    let mut line_str = format!("{dirty}{name}  {}:{}  {lsp_status}", line + 1, vcol + 1);
    if app.ui.perf_overlay_enabled {
        if let Some(fps) = app.ui.perf.fps_ema() {
            line_str.push_str(&format!("  {fps:.0}fps"));
        }
    }
    if app.lsp.as_ref().is_some_and(|c| c.pending_requests() > 0) {
        line_str.push(' ');
        line_str.push(app.ui.spinner_glyph());
    }
    pad(line_str, width)
}

fn render_message_bar(app: &App, width: usize) -> String {
    let text = app.editor.latest_status().map(|m| m.text.clone()).unwrap_or_default();
    pad(text, width)
}

fn cursor_screen_position(app: &App, width: usize, content_rows: usize) -> (usize, usize) {
    let (line, _) = app.buffer.line_col_from_offset(app.editor.cursor);
    let row_in_viewport = line.saturating_sub(app.editor.scroll_y).min(content_rows.saturating_sub(1));
    let row = 1 + row_in_viewport;
    let vcol = app.buffer.visual_column_from_offset(app.editor.cursor, app.config.tab_width as usize);
    let col = (GUTTER_WIDTH + vcol).min(width.saturating_sub(1));
    (row, col)
}

fn render_panel_lines(app: &App) -> Vec<String> {
    let Some(lsp) = &app.lsp else { return Vec::new() };
    let selected = app.ui.lsp_panel.selected;
    match app.ui.lsp_panel.mode {
        LspPanelMode::Completion => lsp
            .completion
            .items
            .iter()
            .enumerate()
            .take(10)
            .map(|(i, item)| format!("{} {}", if i == selected { '>' } else { ' ' }, item.label))
            .collect(),
        LspPanelMode::References => lsp
            .references
            .locations
            .iter()
            .enumerate()
            .take(10)
            .map(|(i, loc)| format!("{} {}:{}", if i == selected { '>' } else { ' ' }, loc.uri, loc.line + 1))
            .collect(),
        LspPanelMode::Definition => lsp
            .definition
            .locations
            .iter()
            .enumerate()
            .take(10)
            .map(|(i, loc)| format!("{} {}:{}", if i == selected { '>' } else { ' ' }, loc.uri, loc.line + 1))
            .collect(),
        LspPanelMode::None => Vec::new(),
    }
}

/// Palette, prompt, LSP panel and hover tooltip all draw the same way: a
/// reverse-video box pinned to the bottom of the frame, in that priority
/// order (only one is ever active at a time per `ui_state`'s own rules,
/// except the tooltip, which can coexist and so is checked last).
fn render_overlay(app: &App, width: usize, height: usize) -> Option<Vec<u8>> {
    let lines: Vec<String> = if app.ui.palette.active {
        let mut v = vec![format!("Palette: {}", app.ui.palette.query)];
        for (i, entry) in app.ui.palette.filtered(PALETTE_ENTRIES).iter().enumerate().take(8) {
            let marker = if i == app.ui.palette.selected { '>' } else { ' ' };
            v.push(format!("{marker} {}", entry.label));
        }
        v
    } else if app.ui.prompt.active {
        let label = match app.ui.prompt.mode {
            Some(PromptMode::GotoLine) => "Goto line",
            Some(PromptMode::RegexSearch) => "Search (regex)",
            None => "",
        };
        vec![format!("{label}: {}", app.ui.prompt.query)]
    } else if app.ui.lsp_panel.mode != LspPanelMode::None {
        render_panel_lines(app)
    } else if let Some(tooltip) = &app.ui.hover_tooltip {
        tooltip
            .lines()
            .take(app.config.lsp.ui.tooltip_max_rows as usize)
            .map(str::to_string)
            .collect()
    } else {
        return None;
    };

    if lines.is_empty() {
        return None;
    }

    let box_width = width.min(app.config.lsp.ui.tooltip_max_width as usize).max(10);
    let box_height = lines.len().min(height.saturating_sub(2));
    let start_row = height.saturating_sub(box_height + 1);

    let mut out = Vec::new();
    for (i, line) in lines.iter().take(box_height).enumerate() {
        out.extend_from_slice(format!("\x1b[{};1H", start_row + i + 1).as_bytes());
        out.extend_from_slice(b"\x1b[2K\x1b[7m");
        out.extend_from_slice(pad(line.clone(), box_width).as_bytes());
        out.extend_from_slice(b"\x1b[0m");
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::PieceTable;
    use crate::config::Config;
    use crate::highlighter::NoHighlighter;

    fn frame_text(app: &mut App) -> String {
        let bytes = render_frame(app, 40, 10, &NoHighlighter);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    #[test]
    fn renders_filename_and_cursor_position() {
        let mut app = App::new(None, Config::default()).unwrap();
        app.buffer = PieceTable::new(b"hello\nworld\n".to_vec());
        let text = frame_text(&mut app);
        assert!(text.contains("[No Name]"));
        assert!(text.contains("1:1"));
        assert!(text.contains("lsp:off"));
    }

    #[test]
    fn scroll_follows_cursor_past_viewport() {
        let mut app = App::new(None, Config::default()).unwrap();
        let mut content = String::new();
        for i in 0..50 {
            content.push_str(&format!("line{i}\n"));
        }
        app.buffer = PieceTable::new(content.into_bytes());
        app.editor.cursor = app.buffer.offset_from_line_col(40, 0);
        let _ = frame_text(&mut app);
        assert!(app.editor.scroll_y > 0);
        assert!(app.editor.scroll_y <= 40);
    }

    #[test]
    fn message_bar_shows_latest_status() {
        let mut app = App::new(None, Config::default()).unwrap();
        app.editor.push_status("saved");
        let text = frame_text(&mut app);
        assert!(text.contains("saved"));
    }
}
