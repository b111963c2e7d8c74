//! Rendered source reports for parse-stage failures.
//!
//! The error taxonomy carries byte spans for failures raised while a source
//! file is in hand; this module turns those into ariadne reports on stderr.
//! The `error: <message>` summary line printed by the CLI is separate; a
//! report here is additional context, not a replacement.

use ariadne::{Color, Label, Report, ReportKind, Source};

use crate::error::{Error, Span};

/// A renderable diagnostic: message plus source location.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub message: String,
    pub span: Span,
    pub notes: Vec<String>,
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn error(message: String, span: Span) -> Self {
        Self {
            message,
            span,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn with_note(mut self, note: String) -> Self {
        self.notes.push(note);
        self
    }

    pub fn with_help(mut self, help: String) -> Self {
        self.help = Some(help);
        self
    }

    /// Render to stderr using ariadne.
    pub fn render(&self, filename: &str, source: &str) {
        let mut report = Report::build(ReportKind::Error, filename, self.span.start as usize)
            .with_message(&self.message)
            .with_label(
                Label::new((filename, self.span.start as usize..self.span.end as usize))
                    .with_message(&self.message)
                    .with_color(Color::Red),
            );

        for note in &self.notes {
            report = report.with_note(note);
        }

        if let Some(help) = &self.help {
            report = report.with_help(help);
        }

        let _ = report.finish().eprint((filename, Source::from(source)));
    }
}

/// Render a parse-stage error against its source, when it carries a span.
pub fn render_error(err: &Error, filename: &str, source: &str) {
    match err {
        Error::Parse { message, span, .. } => {
            Diagnostic::error(message.clone(), *span).render(filename, source);
        }
        Error::UnknownGate { gate, span, .. } => {
            Diagnostic::error(format!("unknown gate \"{gate}\""), *span)
                .with_help("every gate in the bench must appear in the dlib".to_string())
                .render(filename, source);
        }
        _ => {}
    }
}
