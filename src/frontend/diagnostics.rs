use colored::Colorize;
use strum::Display;

use super::lexer::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub location: Location,
    /// Numeric code, 0 when the diagnostic has none
    pub code: u32,
    pub message: String,
}

/// Append-only log of everything reported while parsing one source file
#[derive(Debug, Default)]
pub struct Diagnostics {
    source_name: String,
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            entries: Vec::new(),
        }
    }

    pub fn error(&mut self, location: Location, code: u32, message: impl Into<String>) {
        self.push(Severity::Error, location, code, message.into());
    }

    pub fn warning(&mut self, location: Location, code: u32, message: impl Into<String>) {
        self.push(Severity::Warning, location, code, message.into());
    }

    fn push(&mut self, severity: Severity, location: Location, code: u32, message: String) {
        self.entries.push(Diagnostic {
            severity,
            location,
            code,
            message,
        });
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    fn format_entry(&self, diagnostic: &Diagnostic, colored: bool) -> String {
        let severity = match (colored, diagnostic.severity) {
            (false, severity) => severity.to_string(),
            (true, Severity::Error) => "error".red().bold().to_string(),
            (true, Severity::Warning) => "warning".yellow().bold().to_string(),
        };

        let code = match diagnostic.code {
            0 => String::new(),
            code => format!(" X{code}"),
        };

        format!(
            "{}({}, {}): {severity}{code}: {}\n",
            self.source_name, diagnostic.location.line, diagnostic.location.column, diagnostic.message
        )
    }

    /// Renders every diagnostic with terminal colors
    pub fn to_colored_string(&self) -> String {
        self.entries
            .iter()
            .map(|d| self.format_entry(d, true))
            .collect()
    }
}

/// The plain text buffer form: one `source(line, col): severity [Xcode: ]message`
/// line per diagnostic
impl core::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for diagnostic in &self.entries {
            f.write_str(&self.format_entry(diagnostic, false))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_buffer_lines() {
        let mut diagnostics = Diagnostics::new("shader.fx");
        let location = Location { line: 3, column: 7 };

        diagnostics.warning(location, 0, "unknown attribute");
        assert!(!diagnostics.has_errors());

        diagnostics.error(location, 3004, "undeclared identifier 'x'");
        assert!(diagnostics.has_errors());

        assert_eq!(
            diagnostics.to_string(),
            "shader.fx(3, 7): warning: unknown attribute\n\
             shader.fx(3, 7): error X3004: undeclared identifier 'x'\n"
        );
    }

    #[test]
    fn colored_output_strips_to_plain_text() {
        let mut diagnostics = Diagnostics::new("a.fx");
        diagnostics.error(Location { line: 1, column: 1 }, 3000, "syntax error");

        let colored = diagnostics.to_colored_string();
        let stripped = strip_ansi_escapes::strip_str(&colored);

        assert_eq!(stripped, diagnostics.to_string());
    }
}
