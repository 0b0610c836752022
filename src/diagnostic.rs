use crate::source_manager::{SourceManager, SourceSpan};

/// Diagnostic severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Error,
    Warning,
    Note,
}

/// Individual diagnostic with rich context
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
    pub location: SourceSpan,
    pub code: Option<String>,     // Error code like "E001"
    pub hints: Vec<String>,       // Suggestions for fixing
    pub related: Vec<SourceSpan>, // Related locations
}

/// Diagnostic engine for collecting and reporting errors and warnings
pub struct DiagnosticEngine {
    pub diagnostics: Vec<Diagnostic>,
    pub warnings_as_errors: bool,
}

impl Default for DiagnosticEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticEngine {
    pub fn new() -> Self {
        DiagnosticEngine {
            diagnostics: Vec::new(),
            warnings_as_errors: false,
        }
    }

    pub fn report_diagnostic(&mut self, mut diagnostic: Diagnostic) {
        if self.warnings_as_errors && diagnostic.level == DiagnosticLevel::Warning {
            diagnostic.level = DiagnosticLevel::Error;
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn report_error(&mut self, message: String, location: SourceSpan) {
        self.report_diagnostic(Diagnostic {
            level: DiagnosticLevel::Error,
            message,
            location,
            code: None,
            hints: Vec::new(),
            related: Vec::new(),
        });
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.level == DiagnosticLevel::Error)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Format a diagnostic as `level: message at file:line:col`.
    pub fn format_diagnostic(&self, diag: &Diagnostic, source_manager: &SourceManager) -> String {
        let level_str = match diag.level {
            DiagnosticLevel::Error => "error",
            DiagnosticLevel::Warning => "warning",
            DiagnosticLevel::Note => "note",
        };

        let mut result = format!("{}: {}", level_str, diag.message);

        if let Some(file_info) = source_manager.get_file_info(diag.location.source_id()) {
            let (line, col) = source_manager.get_line_column(diag.location.start()).unwrap_or((1, 1));
            let filename = file_info.path.to_str().unwrap_or("<invalid>");
            result.push_str(&format!(" at {}:{}:{}", filename, line, col));
        }

        result
    }
}
