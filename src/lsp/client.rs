//! The LSP client state machine (spec.md §4.4): startup/candidate selection,
//! the `initialize` handshake and capability parsing, document
//! synchronization, pull diagnostics, and the completion/hover/definition/
//! references feature requests — all driven by a single non-blocking
//! [`LspClient::poll`] tick.
//!
//! IO is non-blocking from the app's point of view but the underlying
//! transport uses a dedicated reader thread feeding a channel, per spec.md
//! §9's allowance ("implementers may use threads with channels so long as
//! the ordering guarantees in §5 are preserved") — the alternative, raw
//! non-blocking pipe reads, has no portable safe std API.

use std::collections::HashMap;
use std::fmt;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::lsp::discovery::{self, candidates_for, file_uri, find_root_dir, resolve_binary, uri_matches};
use crate::lsp::framing::{decode_frames, encode_frame};
use crate::lsp::protocol::{encode, IncomingMessage, OutgoingNotification, OutgoingRequest, OutgoingResponse, RequestId, METHOD_NOT_FOUND};
use crate::lsp::types::{
    ChangeMode, CompletionItem, CompletionSnapshot, DefinitionSnapshot, DiagnosticsSnapshot, HoverSnapshot,
    Location, LspPosition, ReferencesSnapshot, ServerCandidate,
};

const REQUEST_TIMEOUT: Duration = Duration::from_millis(1500);
const MAX_OPEN_FOR_LSP_BYTES: u64 = 32 * 1024 * 1024;

#[derive(Debug)]
pub enum LspError {
    LspServerUnavailable,
    FileTooBig,
    CapabilityUnavailable(&'static str),
    RequestBusy(&'static str),
    Io(std::io::Error),
}

impl fmt::Display for LspError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LspError::LspServerUnavailable => write!(f, "no language server available"),
            LspError::FileTooBig => write!(f, "file too large for LSP (32 MiB cap)"),
            LspError::CapabilityUnavailable(feature) => write!(f, "server does not support {feature}"),
            LspError::RequestBusy(feature) => write!(f, "{feature} request already in flight"),
            LspError::Io(e) => write!(f, "lsp io error: {e}"),
        }
    }
}

impl std::error::Error for LspError {}

/// Where a successful jump lands (spec.md §4.4.6).
pub enum JumpTarget {
    SameFile { line: u32, character: u32 },
    CrossFile,
}

enum FrameEvent {
    Frame(Vec<u8>),
    Closed,
}

fn wire_trace_enabled() -> bool {
    std::env::var("ZICRO_LSP_TRACE").map(|v| v == "1").unwrap_or(false)
}

fn trace_wire(direction: &str, payload: &[u8]) {
    if !wire_trace_enabled() {
        return;
    }
    let text = String::from_utf8_lossy(payload);
    let truncated: String = text.chars().take(2000).collect();
    trace!(target: "zicro::lsp::wire", "{direction} {truncated}");
}

/// Pick the LSP `languageId` for a detected language tag.
fn language_id(language: &str) -> &'static str {
    match language {
        "typescript" => "typescript",
        "zig" => "zig",
        "shell" => "shellscript",
        _ => "plaintext",
    }
}

/// Extract the substring between the first pair of single quotes in
/// `message`, if any (spec.md §4.4.5, §9 open question).
fn extract_symbol(message: &str) -> Option<String> {
    let start = message.find('\'')? + 1;
    let rest = &message[start..];
    let end = rest.find('\'')?;
    Some(rest[..end].to_string())
}

fn truncate_message(message: &str) -> String {
    if message.len() <= 400 {
        message.to_string()
    } else {
        let mut cut = 400;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message[..cut].to_string()
    }
}

/// Build a diagnostics snapshot from a `Diagnostic[]` JSON array, keeping
/// the prior revision (the caller bumps it only if the content differs).
fn snapshot_from_diagnostics(items: &[Value], prior_revision: u64) -> DiagnosticsSnapshot {
    let mut lines: Vec<u32> = Vec::new();
    let mut first_line = None;
    let mut first_message = None;
    let mut first_symbol = None;
    for item in items {
        let line = item
            .pointer("/range/start/line")
            .and_then(Value::as_u64)
            .map(|l| l as u32 + 1);
        let message = item.get("message").and_then(Value::as_str);
        if let Some(line) = line {
            if !lines.contains(&line) {
                lines.push(line);
            }
        }
        if first_line.is_none() {
            first_line = line;
            first_message = message.map(truncate_message);
            first_symbol = message.and_then(extract_symbol);
        }
    }
    lines.sort_unstable();
    DiagnosticsSnapshot {
        count: items.len(),
        first_line,
        first_message,
        first_symbol,
        lines,
        revision: prior_revision,
    }
}

fn parse_location(value: &Value) -> Option<Location> {
    if let Some(uri) = value.get("uri").and_then(Value::as_str) {
        let pos = value.pointer("/range/start")?;
        return Some(Location {
            uri: uri.to_string(),
            line: pos.get("line")?.as_u64()? as u32,
            character: pos.get("character")?.as_u64()? as u32,
        });
    }
    // LocationLink shape.
    let uri = value.get("targetUri").and_then(Value::as_str)?;
    let pos = value
        .pointer("/targetSelectionRange/start")
        .or_else(|| value.pointer("/targetRange/start"))?;
    Some(Location {
        uri: uri.to_string(),
        line: pos.get("line")?.as_u64()? as u32,
        character: pos.get("character")?.as_u64()? as u32,
    })
}

fn parse_locations(result: &Value) -> Vec<Location> {
    match result {
        Value::Array(items) => items.iter().filter_map(parse_location).collect(),
        Value::Null => Vec::new(),
        single => parse_location(single).into_iter().collect(),
    }
}

fn first_nonempty_hover_string(contents: &Value) -> Option<String> {
    match contents {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(first_nonempty_hover_string),
        Value::Object(map) => map
            .get("value")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

fn parse_completion_items(result: &Value) -> Vec<CompletionItem> {
    let items = match result {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match map.get("items").and_then(Value::as_array) {
            Some(items) => items.as_slice(),
            None => return Vec::new(),
        },
        _ => return Vec::new(),
    };
    items
        .iter()
        .take(64)
        .filter_map(|item| {
            let label = item.get("label")?.as_str()?.to_string();
            let insert_text = item
                .get("insertText")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .unwrap_or(&label)
                .to_string();
            let (has_text_edit, edit_start, edit_end) = parse_text_edit(item);
            Some(CompletionItem {
                label,
                insert_text,
                has_text_edit,
                edit_start,
                edit_end,
            })
        })
        .collect()
}

fn parse_position(value: &Value) -> Option<LspPosition> {
    Some(LspPosition {
        line: value.get("line")?.as_u64()? as u32,
        character: value.get("character")?.as_u64()? as u32,
    })
}

fn parse_text_edit(item: &Value) -> (bool, Option<LspPosition>, Option<LspPosition>) {
    let Some(edit) = item.get("textEdit") else {
        return (false, None, None);
    };
    // InsertReplaceEdit prefers `replace` over `insert`.
    let range = edit
        .get("replace")
        .or_else(|| edit.get("insert"))
        .or_else(|| edit.get("range"));
    let Some(range) = range else {
        return (false, None, None);
    };
    let start = range.get("start").and_then(parse_position);
    let end = range.get("end").and_then(parse_position);
    (true, start, end)
}

/// The LSP client for a single open document (spec.md §3, §4.4).
pub struct LspClient {
    child: Child,
    stdin: ChildStdin,
    frame_rx: Receiver<FrameEvent>,

    pub enabled: bool,
    pub session_ready: bool,
    document_uri: String,
    root_uri: String,
    server_kind: String,

    next_id: u64,
    version: i64,
    change_mode: ChangeMode,

    supports_completion: bool,
    supports_hover: bool,
    supports_definition: bool,
    supports_references: bool,
    supports_pull_diagnostics: bool,

    initialize_req: Option<Instant>,
    diagnostics_req: Option<Instant>,
    completion_req: Option<Instant>,
    hover_req: Option<Instant>,
    definition_req: Option<Instant>,
    references_req: Option<Instant>,
    /// Maps an in-flight request id back to which slot it belongs to, so a
    /// response can be dispatched without comparing against every slot.
    in_flight: HashMap<RequestId, &'static str>,

    pending_open_text: Option<Vec<u8>>,

    did_save_pulse_interval: Duration,
    next_did_save_pulse: Option<Instant>,
    did_save_pulse_queued: bool,
    sent_first_configuration: bool,

    pub diagnostics: DiagnosticsSnapshot,
    pub completion: CompletionSnapshot,
    pub hover: HoverSnapshot,
    pub definition: DefinitionSnapshot,
    pub references: ReferencesSnapshot,
}

impl LspClient {
    /// Start (or fail to start) a language server for `path` (spec.md
    /// §4.4.1). Tries each candidate in priority order; returns
    /// [`LspError::LspServerUnavailable`] if none spawn, or
    /// [`LspError::FileTooBig`] if the file exceeds the 32 MiB LSP-sync cap.
    pub fn start_for_file(path: &Path, config: &Config) -> Result<Self, LspError> {
        let metadata = std::fs::metadata(path).map_err(LspError::Io)?;
        if metadata.len() > MAX_OPEN_FOR_LSP_BYTES {
            return Err(LspError::FileTooBig);
        }
        let text = std::fs::read(path).map_err(LspError::Io)?;

        let abs_path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let language = discovery::detect_language(&abs_path).ok_or(LspError::LspServerUnavailable)?;
        let candidates = candidates_for(&abs_path, config);
        if candidates.is_empty() {
            return Err(LspError::LspServerUnavailable);
        }

        let file_dir = abs_path.parent().unwrap_or(&abs_path);
        let mut spawned = None;
        for candidate in &candidates {
            let root = find_root_dir(file_dir, &candidate.root_markers);
            let spawn_result = spawn_candidate(candidate, &root);
            match spawn_result {
                Ok(child) => {
                    spawned = Some((child, root));
                    break;
                }
                Err(e) => {
                    debug!(candidate = %candidate.name, error = %e, "lsp candidate failed to spawn");
                }
            }
        }
        let Some((mut child, root)) = spawned else {
            return Err(LspError::LspServerUnavailable);
        };

        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        let frame_rx = spawn_reader(stdout);

        let document_uri = file_uri(&abs_path);
        let root_uri = file_uri(&root);

        let mut client = LspClient {
            child,
            stdin,
            frame_rx,
            enabled: true,
            session_ready: false,
            document_uri,
            root_uri,
            server_kind: language,
            next_id: 1,
            version: 0,
            change_mode: ChangeMode::Full,
            supports_completion: false,
            supports_hover: false,
            supports_definition: false,
            supports_references: false,
            supports_pull_diagnostics: true,
            initialize_req: None,
            diagnostics_req: None,
            completion_req: None,
            hover_req: None,
            definition_req: None,
            references_req: None,
            in_flight: HashMap::new(),
            pending_open_text: Some(text),
            did_save_pulse_interval: Duration::from_millis(config.lsp.did_save_debounce_ms),
            next_did_save_pulse: None,
            did_save_pulse_queued: false,
            sent_first_configuration: false,
            diagnostics: DiagnosticsSnapshot::default(),
            completion: CompletionSnapshot::default(),
            hover: HoverSnapshot::default(),
            definition: DefinitionSnapshot::default(),
            references: ReferencesSnapshot::default(),
        };
        client.send_initialize();
        Ok(client)
    }

    pub fn document_uri(&self) -> &str {
        &self.document_uri
    }

    pub fn supports_incremental_sync(&self) -> bool {
        matches!(self.change_mode, ChangeMode::Incremental)
    }

    pub fn pending_requests(&self) -> usize {
        [
            &self.initialize_req,
            &self.diagnostics_req,
            &self.completion_req,
            &self.hover_req,
            &self.definition_req,
            &self.references_req,
        ]
        .iter()
        .filter(|slot| slot.is_some())
        .count()
    }

    pub fn pending_since(&self) -> Option<Instant> {
        [
            self.initialize_req,
            self.diagnostics_req,
            self.completion_req,
            self.hover_req,
            self.definition_req,
            self.references_req,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    fn next_request_id(&mut self) -> RequestId {
        let id = self.next_id;
        self.next_id += 1;
        RequestId::from(id)
    }

    fn write_payload(&mut self, payload: Vec<u8>) -> bool {
        trace_wire(">>", &payload);
        let frame = encode_frame(&payload);
        match self.stdin.write_all(&frame).and_then(|_| self.stdin.flush()) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "lsp write failed");
                self.stop();
                false
            }
        }
    }

    fn send_request(&mut self, method: &str, params: Value) -> Option<RequestId> {
        let id = self.next_request_id();
        let req = OutgoingRequest::new(id.clone(), method, params);
        let payload = encode(&req);
        if self.write_payload(payload) {
            Some(id)
        } else {
            None
        }
    }

    fn send_notification(&mut self, method: &str, params: Value) {
        let note = OutgoingNotification::new(method, params);
        let payload = encode(&note);
        self.write_payload(payload);
    }

    fn send_response(&mut self, id: RequestId, result: Value) {
        let resp = OutgoingResponse::new(id, result);
        let payload = encode(&resp);
        self.write_payload(payload);
    }

    fn send_initialize(&mut self) {
        let params = json!({
            "processId": std::process::id(),
            "rootUri": self.root_uri,
            "capabilities": {
                "workspace": { "configuration": true, "workspaceFolders": true },
                "textDocument": {
                    "publishDiagnostics": {},
                    "synchronization": { "didSave": true },
                },
            },
        });
        if let Some(id) = self.send_request("initialize", params) {
            let tag: &'static str = "initialize";
            self.in_flight.insert(id, tag);
            self.initialize_req = Some(Instant::now());
        }
    }

    fn text_document_id(&self) -> Value {
        json!({ "uri": self.document_uri })
    }

    /// Replay `didOpen` (and the TypeScript `didChange` quirk) once the
    /// handshake completes (spec.md §4.4.2, §9 open question).
    fn replay_open(&mut self) {
        let Some(text) = self.pending_open_text.take() else {
            return;
        };
        self.version = 1;
        let text_str = String::from_utf8_lossy(&text).into_owned();
        let params = json!({
            "textDocument": {
                "uri": self.document_uri,
                "languageId": language_id(&self.server_kind),
                "version": self.version,
                "text": text_str,
            }
        });
        self.send_notification("textDocument/didOpen", params);
        if self.server_kind == "typescript" {
            self.version += 1;
            let params = json!({
                "textDocument": { "uri": self.document_uri, "version": self.version },
                "contentChanges": [{ "text": text_str }],
            });
            self.send_notification("textDocument/didChange", params);
        }
        self.maybe_request_diagnostics();
    }

    /// Send a full-document `didChange`, or stash the text if the handshake
    /// hasn't completed yet (spec.md §4.4.4).
    pub fn did_change(&mut self, full_text: &[u8]) {
        if !self.session_ready {
            self.pending_open_text = Some(full_text.to_vec());
            return;
        }
        self.version += 1;
        let params = json!({
            "textDocument": { "uri": self.document_uri, "version": self.version },
            "contentChanges": [{ "text": String::from_utf8_lossy(full_text) }],
        });
        self.send_notification("textDocument/didChange", params);
        self.schedule_pulse_if_typescript();
        self.maybe_request_diagnostics();
    }

    /// Send a single incremental `didChange` range. Returns `false` (no-op)
    /// if the server isn't ready or doesn't negotiate incremental sync
    /// (spec.md §4.4.4).
    pub fn did_change_incremental(&mut self, start: LspPosition, end: LspPosition, text: &[u8]) -> bool {
        if !self.session_ready || !self.supports_incremental_sync() {
            return false;
        }
        self.version += 1;
        let params = json!({
            "textDocument": { "uri": self.document_uri, "version": self.version },
            "contentChanges": [{
                "range": {
                    "start": { "line": start.line, "character": start.character },
                    "end": { "line": end.line, "character": end.character },
                },
                "text": String::from_utf8_lossy(text),
            }],
        });
        self.send_notification("textDocument/didChange", params);
        self.schedule_pulse_if_typescript();
        self.maybe_request_diagnostics();
        true
    }

    fn schedule_pulse_if_typescript(&mut self) {
        if self.server_kind == "typescript" {
            self.next_did_save_pulse = Some(Instant::now() + self.did_save_pulse_interval);
            self.did_save_pulse_queued = true;
        }
    }

    /// Send `didSave` and cancel any queued trailing pulse (spec.md §4.4.4).
    pub fn did_save(&mut self) {
        if !self.session_ready {
            return;
        }
        self.next_did_save_pulse = None;
        self.did_save_pulse_queued = false;
        let params = json!({ "textDocument": self.text_document_id() });
        self.send_notification("textDocument/didSave", params);
        self.maybe_request_diagnostics();
    }

    fn maybe_request_diagnostics(&mut self) {
        if !self.supports_pull_diagnostics || self.diagnostics_req.is_some() {
            return;
        }
        let params = json!({ "textDocument": self.text_document_id() });
        if let Some(id) = self.send_request("textDocument/diagnostic", params) {
            self.in_flight.insert(id, "diagnostics");
            self.diagnostics_req = Some(Instant::now());
        }
    }

    pub fn request_completion(&mut self, position: LspPosition) -> Result<(), LspError> {
        self.guard_feature_request(self.supports_completion, self.completion_req.is_some(), "completion")?;
        let params = json!({
            "textDocument": self.text_document_id(),
            "position": { "line": position.line, "character": position.character },
            "context": { "triggerKind": 1 },
        });
        if let Some(id) = self.send_request("textDocument/completion", params) {
            self.in_flight.insert(id, "completion");
            self.completion_req = Some(Instant::now());
            self.completion.pending = true;
        }
        Ok(())
    }

    pub fn request_hover(&mut self, position: LspPosition) -> Result<(), LspError> {
        self.guard_feature_request(self.supports_hover, self.hover_req.is_some(), "hover")?;
        let params = json!({
            "textDocument": self.text_document_id(),
            "position": { "line": position.line, "character": position.character },
        });
        if let Some(id) = self.send_request("textDocument/hover", params) {
            self.in_flight.insert(id, "hover");
            self.hover_req = Some(Instant::now());
            self.hover.pending = true;
        }
        Ok(())
    }

    pub fn request_definition(&mut self, position: LspPosition) -> Result<(), LspError> {
        self.guard_feature_request(self.supports_definition, self.definition_req.is_some(), "definition")?;
        let params = json!({
            "textDocument": self.text_document_id(),
            "position": { "line": position.line, "character": position.character },
        });
        if let Some(id) = self.send_request("textDocument/definition", params) {
            self.in_flight.insert(id, "definition");
            self.definition_req = Some(Instant::now());
            self.definition.pending = true;
        }
        Ok(())
    }

    pub fn request_references(&mut self, position: LspPosition) -> Result<(), LspError> {
        self.guard_feature_request(self.supports_references, self.references_req.is_some(), "references")?;
        let params = json!({
            "textDocument": self.text_document_id(),
            "position": { "line": position.line, "character": position.character },
            "context": { "includeDeclaration": true },
        });
        if let Some(id) = self.send_request("textDocument/references", params) {
            self.in_flight.insert(id, "references");
            self.references_req = Some(Instant::now());
            self.references.pending = true;
        }
        Ok(())
    }

    fn guard_feature_request(&self, supported: bool, busy: bool, feature: &'static str) -> Result<(), LspError> {
        if !self.session_ready || !supported {
            return Err(LspError::CapabilityUnavailable(feature));
        }
        if busy {
            return Err(LspError::RequestBusy(feature));
        }
        Ok(())
    }

    pub fn resolve_jump(&self, location: &Location) -> JumpTarget {
        if uri_matches(&location.uri, &self.document_uri) {
            JumpTarget::SameFile {
                line: location.line,
                character: location.character,
            }
        } else {
            JumpTarget::CrossFile
        }
    }

    /// Drive the client forward one tick: expire timeouts, dispatch the
    /// trailing `didSave` pulse, and drain up to
    /// [`crate::lsp::framing::MAX_FRAMES_PER_TICK`] frames (spec.md §4.4.7).
    pub fn poll(&mut self) {
        if !self.enabled {
            return;
        }
        let now = Instant::now();
        self.expire_timeouts(now);
        if self.did_save_pulse_queued && self.next_did_save_pulse.is_some_and(|t| now >= t) {
            self.did_save();
        }

        let mut closed = false;
        for _ in 0..crate::lsp::framing::MAX_FRAMES_PER_TICK {
            match self.frame_rx.try_recv() {
                Ok(FrameEvent::Frame(payload)) => self.handle_incoming(payload),
                Ok(FrameEvent::Closed) => {
                    closed = true;
                    break;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    closed = true;
                    break;
                }
            }
        }
        if closed {
            self.stop();
        }
    }

    fn expire_timeouts(&mut self, now: Instant) {
        if self.diagnostics_req.is_some_and(|since| now.duration_since(since) > REQUEST_TIMEOUT) {
            self.diagnostics_req = None;
            self.supports_pull_diagnostics = false;
        }
        macro_rules! expire {
            ($field:ident) => {
                if self.$field.is_some_and(|since| now.duration_since(since) > REQUEST_TIMEOUT) {
                    self.$field = None;
                }
            };
        }
        expire!(completion_req);
        expire!(hover_req);
        expire!(definition_req);
        expire!(references_req);
        if self.initialize_req.is_some_and(|since| now.duration_since(since) > REQUEST_TIMEOUT) {
            // The server never answered `initialize`; nothing further will work.
            self.stop();
        }
    }

    fn handle_incoming(&mut self, payload: Vec<u8>) {
        trace_wire("<<", &payload);
        let Ok(msg) = IncomingMessage::parse(&payload) else {
            return;
        };
        if msg.is_response() {
            self.handle_response(msg);
        } else if msg.is_server_request() {
            self.handle_server_request(msg);
        } else if msg.is_notification() {
            self.handle_notification(msg);
        }
    }

    fn handle_response(&mut self, msg: IncomingMessage) {
        let Some(id) = msg.id.clone() else { return };
        let Some(tag) = self.in_flight.remove(&id) else { return };
        if let Some(error) = &msg.error {
            if tag == "diagnostics" && error.code == METHOD_NOT_FOUND {
                self.supports_pull_diagnostics = false;
            }
            self.clear_slot(tag);
            return;
        }
        let result = msg.result.unwrap_or(Value::Null);
        match tag {
            "initialize" => self.handle_initialize_result(&result),
            "diagnostics" => self.handle_diagnostics_result(&result),
            "completion" => {
                self.completion.items = parse_completion_items(&result);
                self.completion.pending = false;
                self.completion.rev = self.completion.rev.wrapping_add(1);
            }
            "hover" => {
                self.hover.text = result.get("contents").and_then(first_nonempty_hover_string);
                self.hover.pending = false;
                self.hover.rev = self.hover.rev.wrapping_add(1);
            }
            "definition" => {
                self.definition.locations = parse_locations(&result);
                self.definition.pending = false;
                self.definition.rev = self.definition.rev.wrapping_add(1);
            }
            "references" => {
                self.references.locations = parse_locations(&result);
                self.references.pending = false;
                self.references.rev = self.references.rev.wrapping_add(1);
            }
            _ => {}
        }
        self.clear_slot(tag);
    }

    fn clear_slot(&mut self, tag: &str) {
        match tag {
            "initialize" => self.initialize_req = None,
            "diagnostics" => self.diagnostics_req = None,
            "completion" => self.completion_req = None,
            "hover" => self.hover_req = None,
            "definition" => self.definition_req = None,
            "references" => self.references_req = None,
            _ => {}
        }
    }

    fn handle_initialize_result(&mut self, result: &Value) {
        self.change_mode = match result.pointer("/capabilities/textDocumentSync") {
            Some(Value::Number(n)) if n.as_i64() == Some(2) => ChangeMode::Incremental,
            Some(Value::Object(obj)) if obj.get("change").and_then(Value::as_i64) == Some(2) => ChangeMode::Incremental,
            _ => ChangeMode::Full,
        };
        self.supports_completion = has_capability(result, "completionProvider");
        self.supports_hover = has_capability(result, "hoverProvider");
        self.supports_definition = has_capability(result, "definitionProvider");
        self.supports_references = has_capability(result, "referencesProvider");

        self.send_notification("initialized", json!({}));
        self.session_ready = true;
        self.replay_open();
    }

    fn handle_diagnostics_result(&mut self, result: &Value) {
        if result.get("kind").and_then(Value::as_str) == Some("unchanged") {
            return;
        }
        let items: Vec<Value> = match result {
            Value::Array(items) => items.clone(),
            Value::Object(map) => map.get("items").and_then(Value::as_array).cloned().unwrap_or_default(),
            _ => Vec::new(),
        };
        self.apply_diagnostics(&items);
    }

    fn apply_diagnostics(&mut self, items: &[Value]) {
        let candidate = snapshot_from_diagnostics(items, self.diagnostics.revision);
        if candidate.differs_from(&self.diagnostics) {
            let mut candidate = candidate;
            candidate.revision = self.diagnostics.revision + 1;
            self.diagnostics = candidate;
        }
    }

    fn handle_server_request(&mut self, msg: IncomingMessage) {
        let Some(id) = msg.id else { return };
        let method = msg.method.unwrap_or_default();
        match method.as_str() {
            "workspace/configuration" => {
                let len = msg
                    .params
                    .as_ref()
                    .and_then(|p| p.get("items"))
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len);
                self.send_response(id, Value::Array(vec![Value::Null; len]));
                if !self.sent_first_configuration && self.server_kind == "typescript" {
                    self.sent_first_configuration = true;
                    self.did_save();
                }
            }
            "workspace/workspaceFolders" => {
                self.send_response(id, Value::Array(Vec::new()));
            }
            _ => {
                self.send_response(id, Value::Null);
            }
        }
    }

    fn handle_notification(&mut self, msg: IncomingMessage) {
        if msg.method.as_deref() != Some("textDocument/publishDiagnostics") {
            return;
        }
        let Some(params) = msg.params else { return };
        let Some(uri) = params.get("uri").and_then(Value::as_str) else {
            return;
        };
        if !uri_matches(uri, &self.document_uri) {
            return;
        }
        let items = params.get("diagnostics").and_then(Value::as_array).cloned().unwrap_or_default();
        self.apply_diagnostics(&items);
    }

    /// Kill the child process and disable the client; the buffer and
    /// editor state are untouched (spec.md §3 lifecycle, §7).
    pub fn stop(&mut self) {
        if !self.enabled {
            return;
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
        self.enabled = false;
        self.session_ready = false;
        self.in_flight.clear();
        self.initialize_req = None;
        self.diagnostics_req = None;
        self.completion_req = None;
        self.hover_req = None;
        self.definition_req = None;
        self.references_req = None;
        self.did_save_pulse_queued = false;
        self.next_did_save_pulse = None;
        self.diagnostics = DiagnosticsSnapshot::default();
        self.completion = CompletionSnapshot::default();
        self.hover = HoverSnapshot::default();
        self.definition = DefinitionSnapshot::default();
        self.references = ReferencesSnapshot::default();
    }
}

impl Drop for LspClient {
    fn drop(&mut self) {
        self.stop();
    }
}

fn has_capability(initialize_result: &Value, key: &str) -> bool {
    match initialize_result.pointer(&format!("/capabilities/{key}")) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Object(_)) => true,
        _ => false,
    }
}

fn spawn_candidate(candidate: &ServerCandidate, root: &Path) -> std::io::Result<Child> {
    let (program, args): (String, Vec<String>) = if candidate.via_node {
        let script: PathBuf = root.join(&candidate.command);
        let mut args = vec![script.to_string_lossy().into_owned()];
        args.extend(candidate.args.iter().cloned());
        ("node".to_string(), args)
    } else {
        (resolve_binary(candidate, root), candidate.args.clone())
    };
    Command::new(program)
        .args(args)
        .current_dir(root)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
}

fn spawn_reader(mut stdout: impl Read + Send + 'static) -> Receiver<FrameEvent> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            match stdout.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    buf.extend_from_slice(&chunk[..n]);
                    for frame in decode_frames(&mut buf) {
                        if tx.send(FrameEvent::Frame(frame)).is_err() {
                            return;
                        }
                    }
                }
                Err(_) => break,
            }
        }
        let _ = tx.send(FrameEvent::Closed);
    });
    rx
}

#[cfg(all(test, unix))]
impl LspClient {
    /// Build a client around a `sleep` child process that never writes
    /// anything back on stdout: the tests that use this drive the
    /// message-handling methods directly instead of going through a real
    /// server's replies, so all that matters is a live `Child` to own.
    fn for_test(server_kind: &str) -> Self {
        let mut child = Command::new("sleep")
            .arg("100")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn sleep for test client");
        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        let frame_rx = spawn_reader(stdout);
        LspClient {
            child,
            stdin,
            frame_rx,
            enabled: true,
            session_ready: true,
            document_uri: "file:///test.ts".to_string(),
            root_uri: "file:///".to_string(),
            server_kind: server_kind.to_string(),
            next_id: 1,
            version: 0,
            change_mode: ChangeMode::Full,
            supports_completion: false,
            supports_hover: false,
            supports_definition: false,
            supports_references: false,
            supports_pull_diagnostics: true,
            initialize_req: None,
            diagnostics_req: None,
            completion_req: None,
            hover_req: None,
            definition_req: None,
            references_req: None,
            in_flight: HashMap::new(),
            pending_open_text: None,
            did_save_pulse_interval: Duration::from_millis(10),
            next_did_save_pulse: None,
            did_save_pulse_queued: false,
            sent_first_configuration: false,
            diagnostics: DiagnosticsSnapshot::default(),
            completion: CompletionSnapshot::default(),
            hover: HoverSnapshot::default(),
            definition: DefinitionSnapshot::default(),
            references: ReferencesSnapshot::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_quoted_symbol() {
        assert_eq!(extract_symbol("cannot find 'fooBar' in scope"), Some("fooBar".to_string()));
        assert_eq!(extract_symbol("no quotes here"), None);
    }

    #[test]
    fn truncates_long_messages() {
        let long = "x".repeat(500);
        assert_eq!(truncate_message(&long).len(), 400);
    }

    #[test]
    fn diagnostics_idempotence_by_content() {
        let items = vec![json!({"range":{"start":{"line":2,"character":0}},"message":"oops 'x'"})];
        let a = snapshot_from_diagnostics(&items, 0);
        let b = snapshot_from_diagnostics(&items, 0);
        assert!(!a.differs_from(&b));
    }

    #[test]
    fn hover_contents_shapes() {
        assert_eq!(first_nonempty_hover_string(&json!("plain")), Some("plain".to_string()));
        assert_eq!(
            first_nonempty_hover_string(&json!({"kind": "markdown", "value": "**bold**"})),
            Some("**bold**".to_string())
        );
        assert_eq!(
            first_nonempty_hover_string(&json!(["", {"value": "second"}])),
            Some("second".to_string())
        );
    }

    #[test]
    fn completion_items_parse_label_fallback_and_cap() {
        let many: Vec<Value> = (0..100).map(|i| json!({"label": format!("item{i}")})).collect();
        let parsed = parse_completion_items(&json!(many));
        assert_eq!(parsed.len(), 64);
        assert_eq!(parsed[0].label, "item0");
        assert_eq!(parsed[0].insert_text, "item0");
    }

    #[test]
    fn completion_prefers_replace_over_insert() {
        let item = json!({
            "label": "foo",
            "textEdit": {
                "insert": {"start": {"line": 0, "character": 0}, "end": {"line": 0, "character": 1}},
                "replace": {"start": {"line": 0, "character": 0}, "end": {"line": 0, "character": 3}},
            }
        });
        let parsed = parse_completion_items(&json!([item]));
        assert!(parsed[0].has_text_edit);
        assert_eq!(parsed[0].edit_end.unwrap().character, 3);
    }

    #[test]
    fn definition_parses_location_and_location_link() {
        let loc = json!({"uri": "file:///a.ts", "range": {"start": {"line": 1, "character": 2}}});
        let link = json!({
            "targetUri": "file:///b.ts",
            "targetSelectionRange": {"start": {"line": 5, "character": 6}},
        });
        let parsed = parse_locations(&json!([loc, link]));
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].uri, "file:///a.ts");
        assert_eq!(parsed[0].line, 1);
        assert_eq!(parsed[1].uri, "file:///b.ts");
        assert_eq!(parsed[1].line, 5);
    }

    #[test]
    fn has_capability_accepts_bool_or_object() {
        let result = json!({"capabilities": {"hoverProvider": true, "completionProvider": {}, "definitionProvider": false}});
        assert!(has_capability(&result, "hoverProvider"));
        assert!(has_capability(&result, "completionProvider"));
        assert!(!has_capability(&result, "definitionProvider"));
        assert!(!has_capability(&result, "referencesProvider"));
    }

    #[test]
    #[cfg(unix)]
    fn initialize_result_selects_incremental_change_mode_s6() {
        let mut client = LspClient::for_test("typescript");
        client.handle_initialize_result(&json!({"capabilities": {"textDocumentSync": {"change": 2}}}));
        assert_eq!(client.change_mode, ChangeMode::Incremental);

        let mut client = LspClient::for_test("typescript");
        client.handle_initialize_result(&json!({"capabilities": {"textDocumentSync": 1}}));
        assert_eq!(client.change_mode, ChangeMode::Full);
    }

    #[test]
    #[cfg(unix)]
    fn publish_diagnostics_for_other_uri_is_ignored_s7() {
        let mut client = LspClient::for_test("typescript");
        let msg = IncomingMessage::parse(
            &encode(&OutgoingNotification::new(
                "textDocument/publishDiagnostics",
                json!({"uri": "file:///other.ts", "diagnostics": [{"range": {"start": {"line": 0, "character": 0}}, "message": "boom"}]}),
            )),
        )
        .unwrap();
        client.handle_notification(msg);
        assert_eq!(client.diagnostics.revision, 0);
        assert_eq!(client.diagnostics.count, 0);
    }

    #[test]
    #[cfg(unix)]
    fn stale_diagnostics_request_expires_and_disables_pull() {
        let mut client = LspClient::for_test("typescript");
        client.diagnostics_req = Some(Instant::now() - REQUEST_TIMEOUT - Duration::from_millis(1));
        client.expire_timeouts(Instant::now());
        assert!(client.diagnostics_req.is_none());
        assert!(!client.supports_pull_diagnostics);
    }

    #[test]
    #[cfg(unix)]
    fn typescript_did_change_schedules_a_trailing_did_save_pulse() {
        let mut client = LspClient::for_test("typescript");
        client.schedule_pulse_if_typescript();
        assert!(client.did_save_pulse_queued);
        assert!(client.next_did_save_pulse.is_some());

        // Still pending immediately, fires once the debounce elapses.
        client.poll();
        assert!(client.did_save_pulse_queued);
        std::thread::sleep(client.did_save_pulse_interval + Duration::from_millis(5));
        client.poll();
        assert!(!client.did_save_pulse_queued);
    }
}
