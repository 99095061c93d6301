use indicatif::ProgressStyle;
use neural_style::{ObserverError, Progress, ProgressEvent};
use std::io::Write;

/// Shows the step count and current loss in the terminal
pub struct ProgressBar {
    pb: indicatif::ProgressBar,
    total: u32,
}

impl ProgressBar {
    pub fn new() -> Self {
        let pb = indicatif::ProgressBar::new(100);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .progress_chars("##-"),
        );

        Self { pb, total: 100 }
    }
}

impl Drop for ProgressBar {
    fn drop(&mut self) {
        self.pb.finish();
    }
}

impl Progress for ProgressBar {
    fn update(&mut self, event: ProgressEvent) -> Result<(), ObserverError> {
        if event.total != self.total {
            self.total = event.total;
            self.pb.set_length(u64::from(self.total));
        }

        self.pb.set_position(u64::from(event.current));
        self.pb.set_message(&format!(
            "loss {:.4} (content {:.4}, style {:.4})",
            event.loss, event.content_loss, event.style_loss
        ));

        Ok(())
    }
}

/// Writes one JSON object per event to stderr, for callers that relay
/// progress to something else
pub struct JsonProgress {
    out: std::io::Stderr,
}

impl JsonProgress {
    pub fn new() -> Self {
        Self {
            out: std::io::stderr(),
        }
    }
}

impl Progress for JsonProgress {
    fn update(&mut self, event: ProgressEvent) -> Result<(), ObserverError> {
        let line =
            serde_json::to_string(&event).map_err(|e| ObserverError::Other(e.to_string()))?;

        let mut out = self.out.lock();
        writeln!(out, "{}", line).map_err(|e| ObserverError::Other(e.to_string()))
    }
}
