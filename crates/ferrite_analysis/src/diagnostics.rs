//! Located diagnostics for a whole crate.

use std::fmt;

use ferrite_ast::Body;
use ferrite_hir::{DefDiagnostic, DefId, DefMap, HirDb};
use ferrite_syntax::Span;
use ferrite_types::{InferenceDiagnostic, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Warning,
    Error,
}

/// Stage that reported a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticSource {
    NameResolution,
    Macro,
    Inference,
}

/// The structured diagnostic as its stage reported it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    Def(DefDiagnostic),
    Inference(InferenceDiagnostic),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub source: DiagnosticSource,
    pub kind: DiagnosticKind,
    /// Declaration whose body or header the diagnostic is about
    pub owner: Option<DefId>,
    pub file: String,
    pub span: Span,
    /// `kind` rendered against the snapshot it came from
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{}:{}: {severity}: {}", self.file, self.span.start, self.message)
    }
}

pub(crate) fn from_def_diagnostic(db: &HirDb, map: &DefMap, diag: &DefDiagnostic) -> Diagnostic {
    match diag {
        DefDiagnostic::UnresolvedModule {
            module,
            name,
            candidates,
            span,
        } => Diagnostic {
            severity: Severity::Error,
            source: DiagnosticSource::NameResolution,
            kind: DiagnosticKind::Def(diag.clone()),
            owner: None,
            file: map.modules[*module].file.clone(),
            span: *span,
            message: format!("file not found for module `{name}` (tried {})", candidates.join(", ")),
        },
        DefDiagnostic::MalformedMacro { def, message } => {
            let def = map.def_id(*def);
            let data = db.def(def);
            Diagnostic {
                severity: Severity::Error,
                source: DiagnosticSource::Macro,
                kind: DiagnosticKind::Def(diag.clone()),
                owner: Some(def),
                file: map.modules[data.module].file.clone(),
                span: data.span,
                message: format!(
                    "malformed macro `{}`: {message}",
                    data.name.as_deref().unwrap_or("_")
                ),
            }
        }
    }
}

pub(crate) fn from_inference_diagnostic(
    db: &HirDb,
    owner: DefId,
    body: &Body,
    diag: &InferenceDiagnostic,
) -> Diagnostic {
    let data = db.def(owner);
    let span = node_of(diag)
        .map(|node| match node {
            NodeId::Expr(expr) => body.exprs[expr].span,
            NodeId::Pat(pat) => body.pats[pat].span,
        })
        .unwrap_or(data.span);
    let severity = match diag {
        InferenceDiagnostic::UnexpandedMacroCall { .. } => Severity::Warning,
        _ => Severity::Error,
    };
    Diagnostic {
        severity,
        source: DiagnosticSource::Inference,
        kind: DiagnosticKind::Inference(diag.clone()),
        owner: Some(owner),
        file: db.module(db.def_module(owner)).file.clone(),
        span,
        message: diag.message(db),
    }
}

fn node_of(diag: &InferenceDiagnostic) -> Option<NodeId> {
    match diag {
        InferenceDiagnostic::TypeMismatch { node, .. }
        | InferenceDiagnostic::UnresolvedPath { node, .. }
        | InferenceDiagnostic::NoSuchField { node, .. } => Some(*node),
        InferenceDiagnostic::UnresolvedMethod { expr, .. }
        | InferenceDiagnostic::UnresolvedField { expr, .. }
        | InferenceDiagnostic::ArgCountMismatch { expr, .. }
        | InferenceDiagnostic::NotCallable { expr, .. }
        | InferenceDiagnostic::BreakOutsideLoop { expr }
        | InferenceDiagnostic::UnresolvedLabel { expr, .. }
        | InferenceDiagnostic::UnexpandedMacroCall { expr, .. } => Some(NodeId::Expr(*expr)),
        InferenceDiagnostic::UnsatisfiedBound { expr, .. }
        | InferenceDiagnostic::ProjectionError { expr, .. }
        | InferenceDiagnostic::CyclicType { expr } => expr.map(NodeId::Expr),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrite_ast::ExprId;

    #[test]
    fn test_display_names_file_and_offset() {
        let diag = Diagnostic {
            severity: Severity::Warning,
            source: DiagnosticSource::Inference,
            kind: DiagnosticKind::Inference(InferenceDiagnostic::UnexpandedMacroCall {
                expr: ExprId::from_raw(0u32.into()),
                path: "m".to_string(),
            }),
            owner: None,
            file: "/app/src/lib.rs".to_string(),
            span: Span::new(14, 20),
            message: "macro call `m!` was not expanded".to_string(),
        };
        assert_eq!(diag.to_string(), "/app/src/lib.rs:14: warning: macro call `m!` was not expanded");
    }

    #[test]
    fn test_errors_order_after_warnings() {
        assert!(Severity::Error > Severity::Warning);
    }
}
