//! Stage timing for pipeline runs.

use std::time::Instant;

/// RAII timer that logs the elapsed time of a pipeline stage on drop.
///
/// ```ignore
/// let _t = Timed::info("extract key");
/// // ... compute keys ...
/// // logs "extract key: 1.234ms" when _t is dropped
/// ```
pub struct Timed {
    stage: &'static str,
    start: Instant,
    level: log::Level,
}

impl Timed {
    /// Times a stage and reports it at INFO level.
    pub fn info(stage: &'static str) -> Self {
        log::debug!("{stage}...");
        Self {
            stage,
            start: Instant::now(),
            level: log::Level::Info,
        }
    }

    /// Times a stage and reports it at DEBUG level.
    pub fn debug(stage: &'static str) -> Self {
        log::trace!("{stage}...");
        Self {
            stage,
            start: Instant::now(),
            level: log::Level::Debug,
        }
    }
}

impl Drop for Timed {
    fn drop(&mut self) {
        log::log!(self.level, "{} time: {:.3?}", self.stage, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels() {
        assert_eq!(Timed::info("stage").level, log::Level::Info);
        let t = Timed::debug("group keys");
        assert_eq!(t.level, log::Level::Debug);
        assert_eq!(t.stage, "group keys");
    }
}
