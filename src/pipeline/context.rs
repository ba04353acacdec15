use std::time::{Duration, Instant};

/// State owned by a single generation job
///
/// Each job gets its own context; the transcript it collects is what the
/// notifier sends once the job is finished.
#[derive(Debug)]
pub struct JobContext {
    url: String,
    started: Instant,
    lines: Vec<String>,
}

impl JobContext {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            started: Instant::now(),
            lines: Vec::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Appends a line to the transcript and emits it as a log event
    pub fn log(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("[{}] {}", self.url, message);
        self.lines.push(message);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// The transcript joined with newlines
    pub fn transcript(&self) -> String {
        self.lines.join("\n")
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_is_per_context() {
        let mut first = JobContext::new("https://example.com/");
        let mut second = JobContext::new("https://example.com/about/");

        first.log("Rendering output for https://example.com/");
        first.log("Saved critical css (0.01kb) to home");
        second.log("Rendering output for https://example.com/about/");

        assert_eq!(first.lines().len(), 2);
        assert_eq!(
            first.transcript(),
            "Rendering output for https://example.com/\nSaved critical css (0.01kb) to home"
        );
        assert_eq!(second.transcript(), "Rendering output for https://example.com/about/");
        assert_eq!(second.url(), "https://example.com/about/");
    }

    #[test]
    fn test_empty_transcript() {
        let ctx = JobContext::new("https://example.com/");
        assert_eq!(ctx.transcript(), "");
    }
}
