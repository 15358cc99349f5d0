//! Diagnostic collection.
//!
//! Every pass appends into one [`Diagnostics`] list; nothing is printed
//! here. The driver inspects the list between passes and stops before the
//! next pass once any error has been recorded.

use blend_types::Span;
use core::fmt;

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Severity {
    /// Informational only.
    Info,
    /// Compilation proceeds and artifacts are written.
    Warning,
    /// Compilation stops after the current pass; no artifact is written.
    Error,
}

/// Stable diagnostic codes.
///
/// The `Display` form of a code is its stable string identity; tooling may
/// match on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DiagnosticCode {
    /// A name could not be resolved in any enclosing scope.
    UnknownSymbol,
    /// Two declarations of the same name in the same scope.
    DuplicateDeclaration,
    /// An expression's type does not fit its context.
    TypeMismatch,
    /// A call supplies the wrong number of arguments.
    ArityMismatch,
    /// A storage class used where it is not legal, e.g. `@map` inside a
    /// function.
    InvalidStorageClass,
    /// A function calls itself.
    RecursionDetected,
    /// A call cycle through two or more functions.
    MutualRecursionDetected,
    /// A frame exceeds the maximum size or the frame region is exhausted.
    FrameOverflow,
    /// An `@zp` slot could not be placed in zero page.
    ZpRequiredFailed,
    /// Module imports form a cycle.
    ImportCycle,
    /// A `return` expression's type does not match the declared return type.
    ReturnTypeMismatch,
    /// A non-void function may fall off the end without returning.
    ReturnMissing,
    /// `break` outside any loop.
    BreakOutsideLoop,
    /// `continue` outside any loop.
    ContinueOutsideLoop,
    /// Assignment to a `const` or `@data` variable.
    ImmutableWrite,
    /// An `@map` literal address lies outside target memory.
    AddressOutOfRange,
    /// A parse error in the surface syntax.
    SyntaxError,

    /// A unit with no `module` declaration was given the default name.
    ImplicitModule,
    /// A statement can never execute.
    UnreachableCode,
    /// A declared symbol is never read.
    UnusedSymbol,
    /// The call graph is deeper than the configured threshold.
    DeepCallStack,
    /// A slot wanted zero page but settled for the frame region.
    ZpPreferredFallback,
    /// A frame is large enough to deserve attention.
    LargeFrame,
    /// A sizeable array was pinned to zero page by directive.
    LargeArrayInZp,
    /// A bare `main` was exported automatically.
    ImplicitMainExport,
}

impl DiagnosticCode {
    /// The severity this code always carries.
    pub const fn severity(self) -> Severity {
        use DiagnosticCode::*;
        match self {
            UnknownSymbol | DuplicateDeclaration | TypeMismatch | ArityMismatch
            | InvalidStorageClass | RecursionDetected | MutualRecursionDetected
            | FrameOverflow | ZpRequiredFailed | ImportCycle | ReturnTypeMismatch
            | ReturnMissing | BreakOutsideLoop | ContinueOutsideLoop | ImmutableWrite
            | AddressOutOfRange | SyntaxError => Severity::Error,
            ImplicitModule | UnreachableCode | UnusedSymbol | DeepCallStack
            | ZpPreferredFallback | LargeFrame | LargeArrayInZp | ImplicitMainExport => {
                Severity::Warning
            }
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// One reported problem.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Diagnostic {
    /// Severity, derived from the code.
    pub severity: Severity,
    /// Stable code.
    pub code: DiagnosticCode,
    /// Human-readable message.
    pub message: String,
    /// Primary location, when one exists.
    pub span: Option<Span>,
    /// Secondary locations ("see also").
    pub related: Vec<(Span, String)>,
    /// Suggested fix, when one is known.
    pub suggestion: Option<String>,
}

impl Diagnostic {
    /// Construct a diagnostic from its code and message.
    pub fn new(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: code.severity(),
            code,
            message: message.into(),
            span: None,
            related: Vec::new(),
            suggestion: None,
        }
    }

    /// Attach the primary span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Attach a secondary span.
    pub fn with_related(mut self, span: Span, note: impl Into<String>) -> Self {
        self.related.push((span, note.into()));
        self
    }

    /// Attach a suggestion.
    pub fn with_suggestion(mut self, text: impl Into<String>) -> Self {
        self.suggestion = Some(text.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sev = match self.severity {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        match self.span {
            Some(span) => write!(f, "{sev}[{}] {} at {span}", self.code, self.message),
            None => write!(f, "{sev}[{}] {}", self.code, self.message),
        }
    }
}

/// Append-only diagnostic list for one compilation.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
    errors: usize,
}

impl Diagnostics {
    /// An empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a diagnostic.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        if diagnostic.severity == Severity::Error {
            self.errors += 1;
        }
        self.items.push(diagnostic);
    }

    /// Shorthand: append `code` with `message` at `span`.
    pub fn emit(&mut self, code: DiagnosticCode, message: impl Into<String>, span: Span) {
        self.push(Diagnostic::new(code, message).with_span(span));
    }

    /// All diagnostics, in emission order.
    pub fn items(&self) -> &[Diagnostic] {
        &self.items
    }

    /// Number of error-severity diagnostics so far.
    pub const fn error_count(&self) -> usize {
        self.errors
    }

    /// Whether any error has been recorded.
    pub const fn has_errors(&self) -> bool {
        self.errors > 0
    }

    /// Whether a specific code has been recorded.
    pub fn contains(&self, code: DiagnosticCode) -> bool {
        self.items.iter().any(|d| d.code == code)
    }

    /// Diagnostics sorted by source position (unit, then offset), the order
    /// an external printer presents them in.
    pub fn in_source_order(&self) -> Vec<&Diagnostic> {
        let mut out: Vec<&Diagnostic> = self.items.iter().collect();
        out.sort_by_key(|d| d.span.map(|s| (s.unit, s.lo)).unwrap_or((u16::MAX, u32::MAX)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn every_code_has_a_fixed_severity() {
        for code in DiagnosticCode::iter() {
            // severity() is total; the match would not compile otherwise.
            let _ = code.severity();
        }
        assert_eq!(DiagnosticCode::FrameOverflow.severity(), Severity::Error);
        assert_eq!(
            DiagnosticCode::ZpPreferredFallback.severity(),
            Severity::Warning
        );
    }

    #[test]
    fn error_count_tracks_pushes() {
        let mut diags = Diagnostics::new();
        assert!(!diags.has_errors());
        diags.push(Diagnostic::new(DiagnosticCode::UnusedSymbol, "x is never read"));
        assert!(!diags.has_errors());
        diags.push(Diagnostic::new(DiagnosticCode::UnknownSymbol, "no such name"));
        assert!(diags.has_errors());
        assert_eq!(diags.error_count(), 1);
        assert!(diags.contains(DiagnosticCode::UnknownSymbol));
    }

    #[test]
    fn source_order_puts_spanless_last() {
        use blend_types::Span;
        let mut diags = Diagnostics::new();
        diags.push(Diagnostic::new(DiagnosticCode::ImplicitModule, "no module"));
        diags.push(
            Diagnostic::new(DiagnosticCode::UnknownSymbol, "later")
                .with_span(Span::new(0, 50, 51, 5, 1)),
        );
        diags.push(
            Diagnostic::new(DiagnosticCode::UnknownSymbol, "earlier")
                .with_span(Span::new(0, 10, 11, 2, 1)),
        );
        let order: Vec<_> = diags.in_source_order().iter().map(|d| d.message.clone()).collect();
        assert_eq!(order, vec!["earlier", "later", "no module"]);
    }
}
