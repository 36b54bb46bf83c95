//! Logger setup and field-scoped log handles

use std::fmt::Display;

/// Install the process-wide logger
///
/// Verbosity follows `RUST_LOG` and defaults to `info`. Calling this twice is harmless.
pub fn init() {
    if std::env::var_os("RUST_LOG").is_none() {
        let _ = pretty_env_logger::formatted_builder()
            .filter_level(log::LevelFilter::Info)
            .try_init();
    } else {
        let _ = pretty_env_logger::try_init();
    }
}

/// Log handle that appends `key=value` context to every message
#[derive(Debug, Clone, Default)]
pub struct ScopedLogger {
    fields: Vec<(&'static str, String)>,
}

impl ScopedLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, key: &'static str, value: impl Display) -> Self {
        self.fields.push((key, value.to_string()));
        self
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn error(&self, message: impl Display) {
        self.log(log::Level::Error, message);
    }

    pub fn warn(&self, message: impl Display) {
        self.log(log::Level::Warn, message);
    }

    pub fn info(&self, message: impl Display) {
        self.log(log::Level::Info, message);
    }

    pub fn debug(&self, message: impl Display) {
        self.log(log::Level::Debug, message);
    }

    pub fn log(&self, level: log::Level, message: impl Display) {
        log::log!(level, "{}", self.render(message));
    }

    fn render(&self, message: impl Display) -> String {
        let mut line = message.to_string();
        for (key, value) in &self.fields {
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
    fn test_render_appends_fields_in_order() {
        let logger = ScopedLogger::new()
            .with_field("containerID", "abc123")
            .with_field("src", "/out");
        assert_eq!(
            logger.render("Error copying from container"),
            "Error copying from container containerID=abc123 src=/out"
        );
        assert_eq!(logger.field("src"), Some("/out"));
        assert_eq!(logger.field("dest"), None);
    }
}
