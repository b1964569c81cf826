//! Bulk progress bar that log output is routed through, so tracing lines
//! do not tear the bar.

use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::sync::Mutex;

use whorl_core::bulk::ProgressCallback;

/// The bar currently on screen, if any.
static ACTIVE_BAR: Mutex<Option<ProgressBar>> = Mutex::new(None);

fn active_bar() -> Option<ProgressBar> {
    ACTIVE_BAR.lock().ok().and_then(|guard| guard.clone())
}

pub(super) fn set_active_bar(bar: Option<ProgressBar>) {
    if let Ok(mut guard) = ACTIVE_BAR.lock() {
        *guard = bar;
    }
}

/// Progress for one bulk run. Registers itself as the active bar until
/// dropped.
pub struct BulkProgress {
    bar: ProgressBar,
}

impl BulkProgress {
    pub fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        set_active_bar(Some(bar.clone()));
        Self { bar }
    }

    /// Callback for [`whorl_core::BulkResolver::resolve_all`].
    pub fn callback(&self) -> ProgressCallback {
        let bar = self.bar.clone();
        Box::new(move |done, _total, target| {
            bar.set_position(done as u64);
            bar.set_message(target.to_string());
        })
    }
}

impl Drop for BulkProgress {
    fn drop(&mut self) {
        self.bar.finish_and_clear();
        set_active_bar(None);
    }
}

/// Line-buffered stderr writer that prints through the active bar.
pub struct ProgressWriter {
    buffer: Vec<u8>,
}

impl ProgressWriter {
    fn emit(line: &str) -> std::io::Result<()> {
        match active_bar() {
            Some(bar) => {
                bar.println(line);
                Ok(())
            }
            None => {
                let mut stderr = std::io::stderr();
                stderr.write_all(line.as_bytes())?;
                stderr.write_all(b"\n")
            }
        }
    }
}

impl Write for ProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);

        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let text = String::from_utf8_lossy(&line);
            Self::emit(text.trim_end_matches('\n'))?;
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.buffer.is_empty() {
            let text = String::from_utf8_lossy(&self.buffer).trim_end().to_string();
            self.buffer.clear();
            if !text.is_empty() {
                Self::emit(&text)?;
            }
        }
        Ok(())
    }
}

impl Drop for ProgressWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// `MakeWriter` handing out [`ProgressWriter`]s to tracing-subscriber.
#[derive(Default)]
pub struct ProgressWriterFactory;

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for ProgressWriterFactory {
    type Writer = ProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        ProgressWriter { buffer: Vec::new() }
    }
}
