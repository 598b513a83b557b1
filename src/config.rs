use std::time::Duration;

/// Controls when a loader closes its batch window and hands the keys to its `BatchFunction`.
///
/// A window opens with the first uncached key. It closes when no further op has arrived for
/// `wait`, when `max_wait` has passed since it opened, or when it holds `max_batch_size` distinct
/// keys, whichever comes first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    pub wait: Duration,
    pub max_wait: Duration,
    /// `None` means unbounded.
    pub max_batch_size: Option<usize>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            wait: Duration::from_millis(1),
            max_wait: Duration::from_millis(10),
            max_batch_size: None,
        }
    }
}

impl LoaderConfig {
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// `max_wait` is raised to at least `wait`.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// A size of zero is treated as one.
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = Some(max_batch_size.max(1));
        self
    }

    pub(crate) fn effective_max_wait(&self) -> Duration {
        self.max_wait.max(self.wait)
    }
}
