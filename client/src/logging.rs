//! `tracing` output routed to the browser console.
//!
//! Each formatted event is buffered and flushed to the console method that
//! matches its level, so warnings show up as warnings in devtools. The
//! filter comes from the `fieldmap_log` localStorage key (any `EnvFilter`
//! directive, e.g. `fieldmap_shared=debug`) and defaults to `info`.

use std::io;

use gloo_storage::{LocalStorage, Storage};
use tracing::{Level, Metadata};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

const FILTER_KEY: &str = "fieldmap_log";
const DEFAULT_FILTER: &str = "info";

pub fn init() {
    let directive = LocalStorage::raw()
        .get_item(FILTER_KEY)
        .ok()
        .flatten()
        .unwrap_or_else(|| DEFAULT_FILTER.to_string());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|err| {
        console_line(
            Level::WARN,
            &format!("ignoring log filter {directive:?}: {err}"),
        );
        EnvFilter::new(DEFAULT_FILTER)
    });

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(ConsoleMakeWriter)
        .with_ansi(false)
        .without_time()
        .try_init();
    if installed.is_err() {
        console_line(Level::WARN, "tracing subscriber already installed");
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleMakeWriter;

impl<'a> MakeWriter<'a> for ConsoleMakeWriter {
    type Writer = ConsoleWriter;

    fn make_writer(&'a self) -> Self::Writer {
        ConsoleWriter::new(Level::INFO)
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        ConsoleWriter::new(*meta.level())
    }
}

/// Collects one formatted event; emits it on drop.
pub struct ConsoleWriter {
    level: Level,
    buffer: Vec<u8>,
}

impl ConsoleWriter {
    fn new(level: Level) -> Self {
        Self {
            level,
            buffer: Vec::new(),
        }
    }
}

impl io::Write for ConsoleWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for ConsoleWriter {
    fn drop(&mut self) {
        if let Some(line) = finished_line(&self.buffer) {
            console_line(self.level, &line);
        }
    }
}

fn finished_line(buffer: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(buffer);
    let line = text.trim_end();
    (!line.is_empty()).then(|| line.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsoleMethod {
    Error,
    Warn,
    Info,
    Log,
    Debug,
}

fn console_method(level: Level) -> ConsoleMethod {
    match level {
        Level::ERROR => ConsoleMethod::Error,
        Level::WARN => ConsoleMethod::Warn,
        Level::INFO => ConsoleMethod::Info,
        Level::DEBUG => ConsoleMethod::Log,
        Level::TRACE => ConsoleMethod::Debug,
    }
}

#[cfg(target_arch = "wasm32")]
fn console_line(level: Level, line: &str) {
    use web_sys::console;
    let value = wasm_bindgen::JsValue::from_str(line);
    match console_method(level) {
        ConsoleMethod::Error => console::error_1(&value),
        ConsoleMethod::Warn => console::warn_1(&value),
        ConsoleMethod::Info => console::info_1(&value),
        ConsoleMethod::Log => console::log_1(&value),
        ConsoleMethod::Debug => console::debug_1(&value),
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn console_line(level: Level, line: &str) {
    eprintln!("[{:?}] {line}", console_method(level));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_map_to_matching_console_methods() {
        assert_eq!(console_method(Level::ERROR), ConsoleMethod::Error);
        assert_eq!(console_method(Level::WARN), ConsoleMethod::Warn);
        assert_eq!(console_method(Level::INFO), ConsoleMethod::Info);
        assert_eq!(console_method(Level::DEBUG), ConsoleMethod::Log);
        assert_eq!(console_method(Level::TRACE), ConsoleMethod::Debug);
    }

    #[test]
    fn trailing_newline_is_dropped_and_blank_output_skipped() {
        assert_eq!(
            finished_line(b" WARN fieldmap_shared::layer: skipped\n").as_deref(),
            Some(" WARN fieldmap_shared::layer: skipped")
        );
        assert_eq!(finished_line(b"\n"), None);
        assert_eq!(finished_line(b""), None);
    }

    #[test]
    fn writer_accepts_partial_writes() {
        use std::io::Write;
        let mut writer = ConsoleWriter::new(Level::DEBUG);
        writer.write_all(b"tile ").unwrap();
        writer.write_all(b"loaded").unwrap();
        assert_eq!(finished_line(&writer.buffer).as_deref(), Some("tile loaded"));
        writer.buffer.clear();
    }
}
