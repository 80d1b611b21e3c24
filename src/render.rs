//! Console rendering of classified lines

use crate::classify::{ClassifiedLine, Severity};
use crate::symbols::ResolvedLocation;
use chrono::Local;
use colored::{Color, Colorize};
use serde::{Deserialize, Serialize};

/// Colours used for severity tokens and resolved backtrace locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Palette {
    pub debug: String,
    pub info: String,
    pub warning: String,
    pub error: String,
    pub location: String,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            debug: "green".to_string(),
            info: "blue".to_string(),
            warning: "yellow".to_string(),
            error: "red".to_string(),
            location: "blue".to_string(),
        }
    }
}

impl Palette {
    fn name(&self, level: Severity) -> &str {
        match level {
            Severity::Debug => &self.debug,
            Severity::Info => &self.info,
            Severity::Warning => &self.warning,
            Severity::Error => &self.error,
        }
    }

    /// Colour for a severity token; unknown colour names fall back to white
    pub fn severity(&self, level: Severity) -> Color {
        parse_color(self.name(level))
    }

    pub fn location(&self) -> Color {
        parse_color(&self.location)
    }

    /// Names that `colored` does not recognise
    pub fn invalid_names(&self) -> Vec<&str> {
        [
            &self.debug,
            &self.info,
            &self.warning,
            &self.error,
            &self.location,
        ]
        .into_iter()
        .filter(|name| name.parse::<Color>().is_err())
        .map(String::as_str)
        .collect()
    }
}

fn parse_color(name: &str) -> Color {
    name.parse().unwrap_or(Color::White)
}

/// Formats lines for the console sink
#[derive(Debug, Clone, Default)]
pub struct Renderer {
    palette: Palette,
    timestamps: bool,
}

impl Renderer {
    pub fn new(palette: Palette) -> Self {
        Self {
            palette,
            timestamps: false,
        }
    }

    /// Prefix each line with local wall-clock time
    pub fn with_timestamps(mut self, timestamps: bool) -> Self {
        self.timestamps = timestamps;
        self
    }

    /// Render one line. `location` is only used for backtrace fragments.
    pub fn render(&self, line: &ClassifiedLine<'_>, location: Option<&ResolvedLocation>) -> String {
        let mut output = String::new();

        if self.timestamps {
            let timestamp = Local::now().format("%H:%M:%S%.3f");
            output.push_str(&format!("{} ", timestamp.to_string().dimmed()));
        }

        match line {
            ClassifiedLine::Plain(text) => output.push_str(text),
            ClassifiedLine::Severity {
                level,
                prefix,
                suffix,
            } => {
                output.push_str(prefix);
                output.push_str(
                    &level
                        .token()
                        .color(self.palette.severity(*level))
                        .to_string(),
                );
                output.push_str(suffix);
            }
            ClassifiedLine::Backtrace { text, .. } => {
                output.push_str(text);
                if let Some(location) = location {
                    output.push_str("\t\t");
                    output.push_str(
                        &location
                            .to_string()
                            .color(self.palette.location())
                            .to_string(),
                    );
                }
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;

    #[test]
    fn test_severity_token_highlighted() {
        colored::control::set_override(true);
        let renderer = Renderer::default();
        let rendered = renderer.render(&classify("[INFO] system ready"), None);
        assert_eq!(rendered, format!("[{}] system ready", "INFO".blue()));
        assert!(rendered.starts_with("[\u{1b}["));
        assert!(rendered.ends_with("\u{1b}[0m] system ready"));
    }

    #[test]
    fn test_palette_override() {
        colored::control::set_override(true);
        let palette = Palette {
            error: "magenta".to_string(),
            ..Palette::default()
        };
        let rendered = Renderer::new(palette).render(&classify("ERROR: boom"), None);
        assert_eq!(rendered, format!("{}: boom", "ERROR".magenta()));
    }

    #[test]
    fn test_backtrace_with_location() {
        colored::control::set_override(true);
        let location = ResolvedLocation::parse("foo at main.c:42");
        let rendered = Renderer::default().render(
            &classify("#0 0x0001a2b3 in foo()"),
            Some(&location),
        );
        assert!(rendered.starts_with("#0 0x0001a2b3 in foo()\t\t"));
        assert!(rendered.contains("foo at main.c:42"));
    }

    #[test]
    fn test_backtrace_without_location() {
        let rendered = Renderer::default().render(&classify("#0 0x0001a2b3 in foo()"), None);
        assert_eq!(rendered, "#0 0x0001a2b3 in foo()");
    }

    #[test]
    fn test_plain_verbatim() {
        let rendered = Renderer::default().render(&classify("booting..."), None);
        assert_eq!(rendered, "booting...");
    }

    #[test]
    fn test_timestamps_prefix() {
        let rendered = Renderer::default()
            .with_timestamps(true)
            .render(&classify("booting..."), None);
        assert!(rendered.ends_with(" booting..."));
        assert!(rendered.len() > "booting...".len() + 12);
    }

    #[test]
    fn test_invalid_palette_names() {
        let palette = Palette {
            info: "chartreuse".to_string(),
            ..Palette::default()
        };
        assert_eq!(palette.invalid_names(), vec!["chartreuse"]);
        assert_eq!(palette.severity(Severity::Info), Color::White);
        assert!(Palette::default().invalid_names().is_empty());
    }
}
