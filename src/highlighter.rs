//! Syntax highlighter collaborator boundary (spec.md §1: out of scope, pure
//! function interface only). The editor's rendering pipeline merges these
//! spans with selection/search/diagnostic overlays (§4.7); it never inspects
//! token kinds itself.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Plain,
    Keyword,
    String,
    Comment,
    Number,
    Identifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub byte_start: usize,
    pub byte_end: usize,
    pub kind: TokenKind,
}

/// `(language, line_bytes) -> spans`. The real tree-sitter-backed highlighter
/// lives outside this crate's scope; [`NoHighlighter`] is the trivial
/// identity implementation used until one is wired in.
pub trait Highlighter {
    fn highlight_line(&self, language: Option<&str>, line_bytes: &[u8]) -> Vec<Span>;
}

pub struct NoHighlighter;

impl Highlighter for NoHighlighter {
    fn highlight_line(&self, _language: Option<&str>, line_bytes: &[u8]) -> Vec<Span> {
        vec![Span {
            byte_start: 0,
            byte_end: line_bytes.len(),
            kind: TokenKind::Plain,
        }]
    }
}
