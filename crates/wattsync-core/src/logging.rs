//! Explicitly passed logging handle.
//!
//! Components receive a [`Logger`] at construction rather than reaching for a
//! process-wide instance. Records still go through the `log` facade, so the
//! sink installed at bootstrap (env_logger in the CLI) decides where they end
//! up; the handle only carries the target and the key/value context.

use std::fmt;
use std::sync::Arc;

use log::Level;

/// Default log target for the ingestion pipeline.
pub const DEFAULT_TARGET: &str = "wattsync";

/// Cheap-to-clone logging handle with a target and ordered context fields.
#[derive(Debug, Clone)]
pub struct Logger {
    target: Arc<str>,
    context: Arc<[(String, String)]>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET)
    }
}

impl Logger {
    /// Create a root handle logging under `target`.
    pub fn new(target: &str) -> Self {
        Self {
            target: Arc::from(target),
            context: Arc::from(Vec::new()),
        }
    }

    /// Derive a handle with one more context field appended.
    pub fn child(&self, key: &str, value: impl fmt::Display) -> Self {
        let mut context: Vec<(String, String)> = self.context.to_vec();
        context.push((key.to_string(), value.to_string()));
        Self {
            target: Arc::clone(&self.target),
            context: Arc::from(context),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn context(&self) -> &[(String, String)] {
        &self.context
    }

    /// Emit one record at `level` with the handle's context appended.
    pub fn log(&self, level: Level, message: impl fmt::Display) {
        let target: &str = &self.target;
        if !log::log_enabled!(target: target, level) {
            return;
        }
        log::log!(target: target, level, "{}", self.render(message));
    }

    pub fn debug(&self, message: impl fmt::Display) {
        self.log(Level::Debug, message);
    }

    pub fn info(&self, message: impl fmt::Display) {
        self.log(Level::Info, message);
    }

    pub fn warn(&self, message: impl fmt::Display) {
        self.log(Level::Warn, message);
    }

    pub fn error(&self, message: impl fmt::Display) {
        self.log(Level::Error, message);
    }

    fn render(&self, message: impl fmt::Display) -> String {
        let mut line = message.to_string();
        for (key, value) in self.context.iter() {
            line.push(' ');
            line.push_str(key);
            line.push('=');
            line.push_str(value);
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_target() {
        let logger = Logger::default();
        assert_eq!(logger.target(), DEFAULT_TARGET);
        assert!(logger.context().is_empty());
    }

    #[test]
    fn test_child_appends_context_in_order() {
        let root = Logger::new("ingest");
        let child = root.child("cycle", "abc").child("source", "energy");
        assert_eq!(child.target(), "ingest");
        assert_eq!(
            child.context(),
            &[
                ("cycle".to_string(), "abc".to_string()),
                ("source".to_string(), "energy".to_string()),
            ]
        );
        // The parent handle is untouched.
        assert!(root.context().is_empty());
    }

    #[test]
    fn test_render_appends_fields() {
        let logger = Logger::new("t").child("cycle", 7).child("kind", "seed");
        assert_eq!(logger.render("persisted"), "persisted cycle=7 kind=seed");
    }

    #[test]
    fn test_logging_without_sink_is_noop() {
        let logger = Logger::new("t");
        logger.debug("nothing installed");
        logger.error(format_args!("still fine {}", 1));
    }
}
