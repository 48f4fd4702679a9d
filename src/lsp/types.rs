//! Wire-adjacent value types shared by the sync engine and the LSP client:
//! positions, snapshots and the server-candidate model (spec.md §3, §4.4.1).

use serde::{Deserialize, Serialize};

/// A position expressed in UTF-16 code units, as LSP mandates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LspPosition {
    pub line: u32,
    pub character: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeMode {
    Full,
    Incremental,
}

#[derive(Debug, Clone, Default)]
pub struct DiagnosticsSnapshot {
    pub count: usize,
    pub first_line: Option<u32>,
    pub first_message: Option<String>,
    pub first_symbol: Option<String>,
    pub lines: Vec<u32>,
    pub revision: u64,
}

impl DiagnosticsSnapshot {
    /// Whether `other` differs from `self` in any field that should bump the
    /// revision (spec.md §4.4.5, testable property #8).
    pub fn differs_from(&self, other: &DiagnosticsSnapshot) -> bool {
        self.count != other.count
            || self.first_line != other.first_line
            || self.first_message != other.first_message
            || self.first_symbol != other.first_symbol
            || self.lines != other.lines
    }
}

#[derive(Debug, Clone)]
pub struct CompletionItem {
    pub label: String,
    pub insert_text: String,
    pub has_text_edit: bool,
    pub edit_start: Option<LspPosition>,
    pub edit_end: Option<LspPosition>,
}

#[derive(Debug, Clone, Default)]
pub struct CompletionSnapshot {
    pub pending: bool,
    pub rev: u64,
    pub items: Vec<CompletionItem>,
}

#[derive(Debug, Clone, Default)]
pub struct HoverSnapshot {
    pub pending: bool,
    pub rev: u64,
    pub text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Location {
    pub uri: String,
    pub line: u32,
    pub character: u32,
}

#[derive(Debug, Clone, Default)]
pub struct DefinitionSnapshot {
    pub pending: bool,
    pub rev: u64,
    pub locations: Vec<Location>,
}

#[derive(Debug, Clone, Default)]
pub struct ReferencesSnapshot {
    pub pending: bool,
    pub rev: u64,
    pub locations: Vec<Location>,
}

/// One built-in or config-supplied server candidate (spec.md §4.4.1).
#[derive(Debug, Clone)]
pub struct ServerCandidate {
    pub name: String,
    pub language: String,
    pub command: String,
    pub args: Vec<String>,
    pub root_markers: Vec<String>,
    pub priority: i32,
    /// `command` invoked as `node <command> --lsp -stdio`-style rather than
    /// directly; used only by the `tsgo_via_node` candidate.
    pub via_node: bool,
}

/// Built-in server presets (spec.md §4.4.1 step 2), sorted by the caller per
/// `priority` descending then `name` ascending.
pub fn builtin_candidates() -> Vec<ServerCandidate> {
    vec![
        ServerCandidate {
            name: "typescript-tsgo".into(),
            language: "typescript".into(),
            command: "tsgo".into(),
            args: vec!["--lsp".into(), "-stdio".into()],
            root_markers: vec!["package.json".into(), "tsconfig.json".into()],
            priority: 100,
            via_node: false,
        },
        ServerCandidate {
            name: "typescript-tsls".into(),
            language: "typescript".into(),
            command: "typescript-language-server".into(),
            args: vec!["--stdio".into()],
            root_markers: vec!["package.json".into(), "tsconfig.json".into()],
            priority: 50,
            via_node: false,
        },
        ServerCandidate {
            name: "zig-zls".into(),
            language: "zig".into(),
            command: "zls".into(),
            args: vec![],
            root_markers: vec!["build.zig".into(), ".git".into()],
            priority: 50,
            via_node: false,
        },
        ServerCandidate {
            name: "bash-language-server".into(),
            language: "shell".into(),
            command: "bash-language-server".into(),
            args: vec!["start".into()],
            root_markers: vec![".git".into()],
            priority: 50,
            via_node: false,
        },
    ]
}

/// `node ./node_modules/@typescript/native-preview/bin/tsgo.js --lsp -stdio`,
/// included only when that script exists under the candidate's root.
pub fn tsgo_via_node_candidate() -> ServerCandidate {
    ServerCandidate {
        name: "typescript-tsgo-node".into(),
        language: "typescript".into(),
        command: "node_modules/@typescript/native-preview/bin/tsgo.js".into(),
        args: vec!["--lsp".into(), "-stdio".into()],
        root_markers: vec!["package.json".into()],
        priority: 75,
        via_node: true,
    }
}

/// Order candidates by `priority` descending, then `name` ascending.
pub fn order_candidates(mut candidates: Vec<ServerCandidate>) -> Vec<ServerCandidate> {
    candidates.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name)));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_idempotence_s8() {
        let a = DiagnosticsSnapshot {
            count: 1,
            first_line: Some(3),
            first_message: Some("oops".into()),
            first_symbol: Some("x".into()),
            lines: vec![3],
            revision: 1,
        };
        let b = a.clone();
        assert!(!a.differs_from(&b));
        let mut c = b.clone();
        c.count = 2;
        assert!(a.differs_from(&c));
    }

    #[test]
    fn candidate_ordering_priority_then_name() {
        let candidates = vec![
            ServerCandidate {
                name: "b".into(),
                language: "x".into(),
                command: "b".into(),
                args: vec![],
                root_markers: vec![],
                priority: 10,
                via_node: false,
            },
            ServerCandidate {
                name: "a".into(),
                language: "x".into(),
                command: "a".into(),
                args: vec![],
                root_markers: vec![],
                priority: 10,
                via_node: false,
            },
            ServerCandidate {
                name: "z".into(),
                language: "x".into(),
                command: "z".into(),
                args: vec![],
                root_markers: vec![],
                priority: 20,
                via_node: false,
            },
        ];
        let ordered = order_candidates(candidates);
        let names: Vec<_> = ordered.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["z", "a", "b"]);
    }
}
