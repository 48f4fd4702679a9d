//! The UI-only state that sits above [`crate::editor::EditorState`]: palette,
//! prompt, the LSP result panel, the spinner, the perf overlay's sample ring
//! and the hover tooltip buffer (spec.md §3 "UI State"). None of this is
//! persisted and none of it is observed by the buffer or the LSP client —
//! it exists purely to drive [`crate::ui::render_frame`].

use std::collections::VecDeque;
use std::time::Instant;

const PERF_RING_CAPACITY: usize = 128;
const SPINNER_FRAME_MS: u128 = 120;
const SPINNER_FRAMES: &[char] = &['|', '/', '-', '\\'];

/// Mode a [`PromptState`] is collecting input for (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    GotoLine,
    RegexSearch,
}

#[derive(Debug, Clone, Default)]
pub struct PromptState {
    pub active: bool,
    pub mode: Option<PromptMode>,
    pub query: String,
}

impl PromptState {
    pub fn open(&mut self, mode: PromptMode) {
        self.active = true;
        self.mode = Some(mode);
        self.query.clear();
    }

    pub fn close(&mut self) {
        self.active = false;
        self.mode = None;
        self.query.clear();
    }
}

/// One entry in the command palette (spec.md §3 "palette").
#[derive(Debug, Clone, Copy)]
pub struct PaletteEntry {
    pub label: &'static str,
    pub command: crate::editor::Command,
}

#[derive(Debug, Clone, Default)]
pub struct PaletteState {
    pub active: bool,
    pub query: String,
    pub selected: usize,
}

impl PaletteState {
    pub fn open(&mut self) {
        self.active = true;
        self.query.clear();
        self.selected = 0;
    }

    pub fn close(&mut self) {
        self.active = false;
        self.query.clear();
        self.selected = 0;
    }

    /// Entries whose label contains `query` as a (case-insensitive)
    /// substring, in declaration order.
    pub fn filtered<'a>(&self, entries: &'a [PaletteEntry]) -> Vec<&'a PaletteEntry> {
        let needle = self.query.to_ascii_lowercase();
        entries.iter().filter(|e| e.label.to_ascii_lowercase().contains(&needle)).collect()
    }
}

/// Which result panel is showing, if any (spec.md §3 "LSP panel").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LspPanelMode {
    #[default]
    None,
    Completion,
    References,
    Definition,
}

/// The fixed command set shown in the palette (spec.md §4.4.8).
pub const PALETTE_ENTRIES: &[PaletteEntry] = &[
    PaletteEntry { label: "Save", command: crate::editor::Command::Save },
    PaletteEntry { label: "Quit", command: crate::editor::Command::Quit },
    PaletteEntry { label: "Undo", command: crate::editor::Command::Undo },
    PaletteEntry { label: "Redo", command: crate::editor::Command::Redo },
    PaletteEntry { label: "Toggle Comment", command: crate::editor::Command::ToggleComment },
    PaletteEntry { label: "Goto Line", command: crate::editor::Command::GotoLine },
    PaletteEntry { label: "Regex Search", command: crate::editor::Command::RegexSearch },
    PaletteEntry { label: "LSP: Completion", command: crate::editor::Command::LspCompletion },
    PaletteEntry { label: "LSP: Hover", command: crate::editor::Command::LspHover },
    PaletteEntry { label: "LSP: Definition", command: crate::editor::Command::LspDefinition },
    PaletteEntry { label: "LSP: References", command: crate::editor::Command::LspReferences },
    PaletteEntry { label: "LSP: Jump Back", command: crate::editor::Command::LspJumpBack },
];

#[derive(Debug, Clone, Default)]
pub struct LspPanelState {
    pub mode: LspPanelMode,
    pub selected: usize,
}

impl LspPanelState {
    pub fn open(&mut self, mode: LspPanelMode) {
        self.mode = mode;
        self.selected = 0;
    }

    pub fn close(&mut self) {
        self.mode = LspPanelMode::None;
        self.selected = 0;
    }
}

/// A 128-sample ring of frame-to-frame deltas in tenths of a millisecond
/// (spec.md §4.6 "perf overlay").
#[derive(Debug, Clone, Default)]
pub struct PerfSamples {
    samples: VecDeque<u16>,
    ema_fps: Option<f64>,
}

impl PerfSamples {
    pub fn push(&mut self, frame_ms: f64) {
        if self.samples.len() == PERF_RING_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back((frame_ms * 10.0).round().clamp(0.0, u16::MAX as f64) as u16);
        let fps = if frame_ms > 0.0 { 1000.0 / frame_ms } else { 0.0 };
        self.ema_fps = Some(match self.ema_fps {
            Some(prev) => 0.8 * prev + 0.2 * fps,
            None => fps,
        });
    }

    pub fn last_ms(&self) -> Option<f64> {
        self.samples.back().map(|t| *t as f64 / 10.0)
    }

    pub fn avg_ms(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: u64 = self.samples.iter().map(|t| *t as u64).sum();
        Some(sum as f64 / self.samples.len() as f64 / 10.0)
    }

    pub fn max_ms(&self) -> Option<f64> {
        self.samples.iter().max().map(|t| *t as f64 / 10.0)
    }

    /// 95th-percentile frame time, nearest-rank on the sorted ring.
    pub fn p95_ms(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<u16> = self.samples.iter().copied().collect();
        sorted.sort_unstable();
        let idx = ((sorted.len() as f64) * 0.95).ceil() as usize;
        let idx = idx.saturating_sub(1).min(sorted.len() - 1);
        Some(sorted[idx] as f64 / 10.0)
    }

    pub fn fps_avg(&self) -> Option<f64> {
        self.avg_ms().filter(|ms| *ms > 0.0).map(|ms| 1000.0 / ms)
    }

    pub fn fps_ema(&self) -> Option<f64> {
        self.ema_fps
    }
}

/// All UI-only state that isn't part of the editor's document/cursor model
/// (spec.md §3).
#[derive(Debug, Clone)]
pub struct UiState {
    pub palette: PaletteState,
    pub prompt: PromptState,
    pub lsp_panel: LspPanelState,
    pub hover_tooltip: Option<String>,
    pub perf: PerfSamples,
    pub perf_overlay_enabled: bool,
    spinner_started: Instant,
    pub auto_completion_deadline: Option<Instant>,
    pub auto_hover_deadline: Option<Instant>,
}

impl UiState {
    pub fn new(perf_overlay_enabled: bool) -> Self {
        Self {
            palette: PaletteState::default(),
            prompt: PromptState::default(),
            lsp_panel: LspPanelState::default(),
            hover_tooltip: None,
            perf: PerfSamples::default(),
            perf_overlay_enabled,
            spinner_started: Instant::now(),
            auto_completion_deadline: None,
            auto_hover_deadline: None,
        }
    }

    /// Current spinner glyph, advancing one frame per 120 ms (spec.md §4.6).
    pub fn spinner_glyph(&self) -> char {
        let elapsed = self.spinner_started.elapsed().as_millis();
        let frame = (elapsed / SPINNER_FRAME_MS) as usize % SPINNER_FRAMES.len();
        SPINNER_FRAMES[frame]
    }

    pub fn any_modal_active(&self) -> bool {
        self.palette.active || self.prompt.active || self.lsp_panel.mode != LspPanelMode::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_filters_case_insensitively() {
        let entries = [
            PaletteEntry { label: "Save", command: crate::editor::Command::Save },
            PaletteEntry { label: "Quit", command: crate::editor::Command::Quit },
        ];
        let mut palette = PaletteState::default();
        palette.query = "sa".into();
        let hits = palette.filtered(&entries);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].label, "Save");
    }

    #[test]
    fn perf_ring_evicts_oldest() {
        let mut perf = PerfSamples::default();
        for i in 0..200 {
            perf.push(i as f64);
        }
        assert_eq!(perf.last_ms(), Some(199.0));
        assert!(perf.avg_ms().is_some());
        assert!(perf.p95_ms().unwrap() <= 199.0);
    }

    #[test]
    fn fps_ema_tracks_recent_samples() {
        let mut perf = PerfSamples::default();
        perf.push(10.0);
        let first = perf.fps_ema().unwrap();
        perf.push(100.0);
        let second = perf.fps_ema().unwrap();
        assert!(second < first);
    }
}
