//! Matching invocation tokens against a macro case pattern.

use ferrite_parser::{FragmentKind, ParseError, parse_fragment};
use ferrite_syntax::{Cancellation, Cancelled, Span, Token, TokenStream};
use thiserror::Error;
use tracing::trace;

use crate::{MacroGroup, MacroSubstitution, PatternElem, PatternGroup, RepeatKind};

/// Why a case did not match. Never user-visible on its own: it only drives
/// case selection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    #[error("expected '{expected}' at {}..{}", span.start, span.end)]
    UnexpectedToken { expected: String, span: Span },
    #[error("unexpected end of macro input, expected '{expected}'")]
    UnexpectedEnd { expected: String },
    #[error("expected {kind} fragment: {source}")]
    Fragment {
        kind: &'static str,
        #[source]
        source: ParseError,
    },
    #[error("{kind} fragment matched no tokens at {}..{}", span.start, span.end)]
    EmptyFragment { kind: &'static str, span: Span },
    #[error("repetition matched an empty span at {}..{}", span.start, span.end)]
    EmptyRepetition { span: Span },
    #[error("'+' repetition matched nothing at {}..{}", span.start, span.end)]
    MissingRepetition { span: Span },
    #[error("unexpected trailing tokens at {}..{}", span.start, span.end)]
    TrailingTokens { span: Span },
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Cursor over the flat invocation tokens.
///
/// One cursor is shared by all case attempts of an expansion; each attempt
/// starts from a saved mark and resets to it when it fails.
pub struct InputCursor<'s> {
    stream: &'s TokenStream,
    pos: usize,
}

impl<'s> InputCursor<'s> {
    pub fn new(stream: &'s TokenStream) -> Self {
        Self { stream, pos: 0 }
    }

    pub fn mark(&self) -> usize {
        self.pos
    }

    pub fn reset(&mut self, mark: usize) {
        self.pos = mark;
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.stream.len()
    }

    fn peek(&self) -> Option<&'s Token> {
        self.stream.get(self.pos)
    }

    fn span(&self) -> Span {
        match self.stream.tokens().get(self.pos) {
            Some(t) => t.span,
            None => Span::new(self.stream.text().len(), self.stream.text().len()),
        }
    }
}

/// Match a whole case pattern; the input must be consumed completely
pub fn match_case(
    pattern: &[PatternElem],
    cursor: &mut InputCursor<'_>,
    cancel: &Cancellation,
) -> Result<MacroSubstitution, MatchError> {
    let start = cursor.mark();
    let result = match_elems(pattern, cursor, cancel).and_then(|subst| {
        if cursor.is_at_end() {
            Ok(subst)
        } else {
            Err(MatchError::TrailingTokens { span: cursor.span() })
        }
    });
    if result.is_err() {
        cursor.reset(start);
    }
    result
}

fn match_elems(
    elems: &[PatternElem],
    cursor: &mut InputCursor<'_>,
    cancel: &Cancellation,
) -> Result<MacroSubstitution, MatchError> {
    let mut subst = MacroSubstitution::default();
    for elem in elems {
        match elem {
            PatternElem::Token(expected) => match_token(expected, cursor)?,
            PatternElem::Binding { name, kind } => {
                let text = match_binding(*kind, cursor)?;
                subst.variables.insert(name.clone(), text);
            }
            PatternElem::Group(group) => {
                let matched = match_group(group, cursor, cancel)?;
                subst.groups.push(matched);
            }
        }
    }
    Ok(subst)
}

/// Literal tokens compare by kind, identifier-like tokens by text so that
/// keywords and identifiers are interchangeable
fn tokens_match(expected: &Token, actual: &Token) -> bool {
    match (expected.ident_text(), actual.ident_text()) {
        (Some(a), Some(b)) => a == b,
        _ => expected == actual,
    }
}

fn match_token(expected: &Token, cursor: &mut InputCursor<'_>) -> Result<(), MatchError> {
    match cursor.peek() {
        Some(actual) if tokens_match(expected, actual) => {
            cursor.pos += 1;
            Ok(())
        }
        Some(_) => Err(MatchError::UnexpectedToken {
            expected: expected.to_string(),
            span: cursor.span(),
        }),
        None => Err(MatchError::UnexpectedEnd {
            expected: expected.to_string(),
        }),
    }
}

fn match_binding(kind: FragmentKind, cursor: &mut InputCursor<'_>) -> Result<String, MatchError> {
    let start = cursor.pos;
    let end = parse_fragment(cursor.stream.tokens(), start, kind).map_err(|source| MatchError::Fragment {
        kind: kind.name(),
        source,
    })?;
    if end == start && !kind.allows_empty() {
        return Err(MatchError::EmptyFragment {
            kind: kind.name(),
            span: cursor.span(),
        });
    }
    cursor.pos = end;

    let text = cursor.stream.slice(start, end);
    // single tokens cannot be split by surrounding operators
    if kind == FragmentKind::Expr && end - start > 1 {
        Ok(format!("({})", text))
    } else {
        Ok(text.to_string())
    }
}

fn match_group(
    group: &PatternGroup,
    cursor: &mut InputCursor<'_>,
    cancel: &Cancellation,
) -> Result<MacroGroup, MatchError> {
    let mut matched = MacroGroup {
        substitutions: Vec::new(),
        separator: group.separator.as_ref().map(|t| t.to_string()),
        kind: group.kind,
        vars: group.bound_vars(),
    };
    let group_start = cursor.span();

    loop {
        cancel.check()?;
        if cursor.is_at_end() {
            break;
        }

        let iteration_start = cursor.mark();
        if !matched.substitutions.is_empty() {
            if let Some(sep) = &group.separator {
                match cursor.peek() {
                    Some(tok) if tokens_match(sep, tok) => cursor.pos += 1,
                    _ => break,
                }
            }
        }

        let elems_start = cursor.mark();
        match match_elems(&group.elems, cursor, cancel) {
            Ok(subst) => {
                if cursor.mark() == elems_start {
                    return Err(MatchError::EmptyRepetition { span: cursor.span() });
                }
                matched.substitutions.push(subst);
            }
            Err(MatchError::Cancelled(c)) => return Err(MatchError::Cancelled(c)),
            Err(err) => {
                trace!(error = %err, "repetition stopped");
                cursor.reset(iteration_start);
                break;
            }
        }

        if group.kind == RepeatKind::ZeroOrOne {
            break;
        }
    }

    if group.kind == RepeatKind::OneOrMore && matched.substitutions.is_empty() {
        return Err(MatchError::MissingRepetition { span: group_start });
    }
    Ok(matched)
}
