//! Spinner for a single lookup. Its message follows the chain from hop to
//! hop, and log lines print above it.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;

use whorl_core::whois::{HopObserver, ServerHop};

use super::progress::set_active_bar;

pub struct Spinner {
    target: String,
    progress: ProgressBar,
}

impl Spinner {
    pub fn new(target: &str) -> Self {
        let progress = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner()
            .tick_strings(&["◐", "◓", "◑", "◒", "●"])
            .template("{spinner:.cyan} {msg} {elapsed:.dim}")
        {
            progress.set_style(style);
        }
        progress.set_message(format!("Resolving {}", target));
        progress.enable_steady_tick(Duration::from_millis(120));
        set_active_bar(Some(progress.clone()));

        Self {
            target: target.to_string(),
            progress,
        }
    }

    /// Observer for [`whorl_core::WhoisClient::with_hop_observer`] that
    /// names the server being queried.
    pub fn observer(&self) -> HopObserver {
        let progress = self.progress.clone();
        let target = self.target.clone();
        Arc::new(move |hop: &ServerHop| {
            progress.set_message(hop_message(&target, hop));
        })
    }

    pub fn finish(&self) {
        self.progress.finish_and_clear();
        set_active_bar(None);
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        self.finish();
    }
}

fn hop_message(target: &str, hop: &ServerHop) -> String {
    format!("Resolving {} via {}:{}", target, hop.server, hop.port)
}
