//! Clipboard collaborator boundary (spec.md §1: out of scope, two opaque
//! operations only). Grounded on `fresh`'s `services/clipboard.rs`: an
//! internal string plus a lazily-initialized system clipboard, with a test
//! mode that never touches the real system clipboard.

use std::sync::Mutex;

use tracing::debug;

const CLIPBOARD_CAP_BYTES: usize = 8 * 1024 * 1024;

pub trait Clipboard {
    fn read(&mut self) -> Vec<u8>;
    fn write(&mut self, data: &[u8]);
}

static SYSTEM_CLIPBOARD: Mutex<Option<arboard::Clipboard>> = Mutex::new(None);

/// Real clipboard: reads/writes the system clipboard via `arboard`, falling
/// back to an internal buffer if the platform clipboard is unavailable (e.g.
/// headless CI) or `internal_only` is set for tests.
pub struct SystemClipboard {
    internal: Vec<u8>,
    internal_only: bool,
}

impl SystemClipboard {
    pub fn new() -> Self {
        Self {
            internal: Vec::new(),
            internal_only: false,
        }
    }

    pub fn internal_only() -> Self {
        Self {
            internal: Vec::new(),
            internal_only: true,
        }
    }

    fn with_system<T>(&self, f: impl FnOnce(&mut arboard::Clipboard) -> Option<T>) -> Option<T> {
        if self.internal_only {
            return None;
        }
        let mut guard = SYSTEM_CLIPBOARD.lock().ok()?;
        if guard.is_none() {
            match arboard::Clipboard::new() {
                Ok(c) => *guard = Some(c),
                Err(e) => {
                    debug!(error = %e, "system clipboard unavailable");
                    return None;
                }
            }
        }
        f(guard.as_mut()?)
    }
}

impl Default for SystemClipboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Clipboard for SystemClipboard {
    fn read(&mut self) -> Vec<u8> {
        if let Some(text) = self.with_system(|c| c.get_text().ok()) {
            return text.into_bytes();
        }
        self.internal.clone()
    }

    fn write(&mut self, data: &[u8]) {
        let data = if data.len() > CLIPBOARD_CAP_BYTES {
            &data[..CLIPBOARD_CAP_BYTES]
        } else {
            data
        };
        self.internal = data.to_vec();
        if let Ok(text) = String::from_utf8(data.to_vec()) {
            self.with_system(|c| c.set_text(text).ok());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_only_roundtrips() {
        let mut c = SystemClipboard::internal_only();
        c.write(b"bc");
        assert_eq!(c.read(), b"bc");
    }

    #[test]
    fn write_clamps_to_cap() {
        let mut c = SystemClipboard::internal_only();
        c.write(&vec![b'a'; CLIPBOARD_CAP_BYTES + 100]);
        assert_eq!(c.read().len(), CLIPBOARD_CAP_BYTES);
    }
}
