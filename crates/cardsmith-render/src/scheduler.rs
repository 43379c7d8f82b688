//! Debounced thumbnail regeneration.

use cardsmith_core::config::EditorConfig;
use cardsmith_core::session::{Debouncer, TaskId};
use std::time::{Duration, Instant};

/// Decides when a side preview should be re-rendered.
///
/// Requests are keyed by the layer store version. Bursts of edits collapse
/// into one render of the newest version once the window is quiet; an
/// interaction commit always produces exactly one render, even if that
/// version was already drawn.
#[derive(Debug, Clone)]
pub struct PreviewScheduler {
    debouncer: Debouncer<u64>,
    forced: Option<u64>,
    rendered: Option<u64>,
}

impl PreviewScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            debouncer: Debouncer::new(delay),
            forced: None,
            rendered: None,
        }
    }

    pub fn from_config(config: &EditorConfig) -> Self {
        Self::new(config.preview_debounce())
    }

    /// Ask for a render of `version`.
    ///
    /// Returns `None` when that version is already on screen and nothing
    /// newer is waiting.
    pub fn request(&mut self, version: u64, now: Instant) -> Option<TaskId> {
        if self.rendered == Some(version) && !self.debouncer.is_pending() {
            return None;
        }
        Some(
            self.debouncer
                .schedule_with(now, |previous| previous.map_or(version, |p| p.max(version))),
        )
    }

    /// Render `version` on the next [`due`](Self::due) call.
    pub fn force_after_commit(&mut self, version: u64) {
        self.debouncer.cancel();
        self.forced = Some(self.forced.map_or(version, |v| v.max(version)));
    }

    /// The version to render now, if any.
    pub fn due(&mut self, now: Instant) -> Option<u64> {
        if let Some(version) = self.forced.take() {
            return Some(version);
        }
        self.debouncer.take_due(now)
    }

    /// Record a finished render.
    pub fn mark_rendered(&mut self, version: u64) {
        self.rendered = Some(self.rendered.map_or(version, |v| v.max(version)));
        if self
            .debouncer
            .pending()
            .is_some_and(|task| task.payload <= version)
        {
            self.debouncer.cancel();
        }
    }

    pub fn last_rendered(&self) -> Option<u64> {
        self.rendered
    }

    pub fn is_pending(&self) -> bool {
        self.forced.is_some() || self.debouncer.is_pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler() -> PreviewScheduler {
        PreviewScheduler::new(Duration::from_millis(250))
    }

    #[test]
    fn test_burst_renders_newest_once() {
        let t0 = Instant::now();
        let mut s = scheduler();
        s.request(1, t0);
        s.request(2, t0 + Duration::from_millis(100));
        s.request(3, t0 + Duration::from_millis(200));

        assert_eq!(s.due(t0 + Duration::from_millis(400)), None);
        assert_eq!(s.due(t0 + Duration::from_millis(450)), Some(3));
        assert_eq!(s.due(t0 + Duration::from_millis(900)), None);
    }

    #[test]
    fn test_rendered_version_is_not_requeued() {
        let t0 = Instant::now();
        let mut s = scheduler();
        s.mark_rendered(5);
        assert!(s.request(5, t0).is_none());
        assert!(s.request(6, t0).is_some());
        assert!(s.is_pending());
        s.mark_rendered(6);
        assert!(!s.is_pending());
    }

    #[test]
    fn test_commit_always_fires_once() {
        let t0 = Instant::now();
        let mut s = scheduler();
        s.mark_rendered(4);
        s.request(4, t0);
        s.force_after_commit(4);
        assert_eq!(s.due(t0), Some(4));
        assert_eq!(s.due(t0 + Duration::from_secs(1)), None);
    }

    #[test]
    fn test_commit_supersedes_pending_window() {
        let t0 = Instant::now();
        let mut s = scheduler();
        s.request(7, t0);
        s.force_after_commit(8);
        assert_eq!(s.due(t0), Some(8));
        assert!(!s.is_pending());
    }

    #[test]
    fn test_from_config_uses_preview_debounce() {
        let config = EditorConfig {
            preview_debounce_ms: 10,
            ..EditorConfig::default()
        };
        let t0 = Instant::now();
        let mut s = PreviewScheduler::from_config(&config);
        s.request(1, t0);
        assert_eq!(s.due(t0 + Duration::from_millis(10)), Some(1));
    }
}
