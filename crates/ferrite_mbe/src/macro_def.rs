//! `macro_rules!` definitions: parsing the definition body into cases.

use ferrite_ast::MacroRulesDef;
use ferrite_parser::FragmentKind;
use ferrite_syntax::{LexError, Span, Token, TokenStream};
use rustc_hash::FxHashSet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MacroDefError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("expected a delimited macro case at {}..{}", span.start, span.end)]
    ExpectedCase { span: Span },
    #[error("expected '=>' after macro pattern at {}..{}", span.start, span.end)]
    MissingArrow { span: Span },
    #[error("expected ':' and a fragment kind after '${name}'")]
    MissingFragment { name: String, span: Span },
    #[error("unknown fragment kind '{kind}' at {}..{}", span.start, span.end)]
    UnknownFragment { kind: String, span: Span },
    #[error("malformed repetition at {}..{}", span.start, span.end)]
    BadRepetition { span: Span },
    #[error("stray '$' at {}..{}", span.start, span.end)]
    StrayDollar { span: Span },
    #[error("macro has no cases")]
    NoCases,
}

/// Repetition operator of `$(...)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepeatKind {
    /// `*`
    ZeroOrMore,
    /// `+`
    OneOrMore,
    /// `?`
    ZeroOrOne,
}

/// Flattened pattern element. Delimited groups of the pattern appear as
/// their open and close tokens.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternElem {
    Token(Token),
    Binding { name: String, kind: FragmentKind },
    Group(PatternGroup),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternGroup {
    pub elems: Vec<PatternElem>,
    pub separator: Option<Token>,
    pub kind: RepeatKind,
}

impl PatternGroup {
    /// Binding names declared anywhere inside the group
    pub fn bound_vars(&self) -> FxHashSet<String> {
        let mut vars = FxHashSet::default();
        collect_pattern_vars(&self.elems, &mut vars);
        vars
    }
}

fn collect_pattern_vars(elems: &[PatternElem], vars: &mut FxHashSet<String>) {
    for elem in elems {
        match elem {
            PatternElem::Binding { name, .. } => {
                vars.insert(name.clone());
            }
            PatternElem::Group(group) => collect_pattern_vars(&group.elems, vars),
            PatternElem::Token(_) => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateElem {
    /// Source text of one template token
    Text(String),
    /// `$name`
    Var(String),
    /// `$crate`
    DollarCrate,
    Repeat(TemplateRepeat),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRepeat {
    pub elems: Vec<TemplateElem>,
    pub separator: Option<String>,
    pub kind: RepeatKind,
}

impl TemplateRepeat {
    /// Metavariables referenced anywhere inside the repetition
    pub fn referenced_vars(&self) -> FxHashSet<String> {
        let mut vars = FxHashSet::default();
        collect_template_vars(&self.elems, &mut vars);
        vars
    }
}

fn collect_template_vars(elems: &[TemplateElem], vars: &mut FxHashSet<String>) {
    for elem in elems {
        match elem {
            TemplateElem::Var(name) => {
                vars.insert(name.clone());
            }
            TemplateElem::Repeat(rep) => collect_template_vars(&rep.elems, vars),
            TemplateElem::Text(_) | TemplateElem::DollarCrate => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroCase {
    pub pattern: Vec<PatternElem>,
    pub template: Vec<TemplateElem>,
}

/// A parsed `macro_rules!` definition
#[derive(Debug, Clone, PartialEq)]
pub struct MacroDef {
    pub name: String,
    /// Normalized name of the defining crate
    pub krate: String,
    pub cases: Vec<MacroCase>,
}

impl MacroDef {
    pub fn from_ast(def: &MacroRulesDef, krate: &str) -> Result<Self, MacroDefError> {
        Self::parse(&def.name.name, krate, &def.body)
    }

    /// Parse the text between the outer delimiters of a definition:
    /// `(pattern) => { template }; ...`
    pub fn parse(name: &str, krate: &str, body: &str) -> Result<Self, MacroDefError> {
        let stream = TokenStream::lex(body)?;
        let mut cases = Vec::new();
        let mut pos = 0;

        while pos < stream.len() {
            let (pat_start, pat_end) = delimited_range(&stream, pos)?;
            let arrow = pat_end + 1;
            if stream.get(arrow) != Some(&Token::FatArrow) {
                return Err(MacroDefError::MissingArrow {
                    span: span_at(&stream, arrow),
                });
            }
            let (tpl_start, tpl_end) = delimited_range(&stream, arrow + 1)?;

            let pattern = parse_pattern(&stream, pat_start + 1, pat_end)?;
            let template = parse_template(&stream, tpl_start + 1, tpl_end)?;
            cases.push(MacroCase { pattern, template });

            pos = tpl_end + 1;
            if stream.get(pos) == Some(&Token::Semi) {
                pos += 1;
            }
        }

        if cases.is_empty() {
            return Err(MacroDefError::NoCases);
        }
        Ok(Self {
            name: name.to_string(),
            krate: normalize_crate_name(krate),
            cases,
        })
    }
}

/// Crate names use `_` where package names use `-`
pub fn normalize_crate_name(name: &str) -> String {
    name.replace('-', "_")
}

fn span_at(stream: &TokenStream, index: usize) -> Span {
    match stream.tokens().get(index) {
        Some(t) => t.span,
        None => Span::new(stream.text().len(), stream.text().len()),
    }
}

/// Indices of the open and close delimiter of the group at `open`
fn delimited_range(stream: &TokenStream, open: usize) -> Result<(usize, usize), MacroDefError> {
    let is_open = stream.get(open).and_then(|t| t.open_delimiter()).is_some();
    match stream.matching_close(open) {
        Some(close) if is_open => Ok((open, close)),
        _ => Err(MacroDefError::ExpectedCase {
            span: span_at(stream, open),
        }),
    }
}

/// Parse the operator (and optional separator) following the `)` of a
/// repetition at `close`. Returns the separator, the kind and the index
/// after the operator.
fn parse_repetition_suffix(
    stream: &TokenStream,
    close: usize,
) -> Result<(Option<Token>, RepeatKind, usize), MacroDefError> {
    let op = |tok: Option<&Token>| match tok {
        Some(Token::Star) => Some(RepeatKind::ZeroOrMore),
        Some(Token::Plus) => Some(RepeatKind::OneOrMore),
        Some(Token::Question) => Some(RepeatKind::ZeroOrOne),
        _ => None,
    };
    let first = stream.get(close + 1);
    let second = stream.get(close + 2);

    match (op(first), op(second)) {
        // `$(..)?*` style: `?` is the separator
        (Some(RepeatKind::ZeroOrOne), Some(kind)) if kind != RepeatKind::ZeroOrOne => {
            Ok((Some(Token::Question), kind, close + 3))
        }
        (Some(kind), _) => Ok((None, kind, close + 2)),
        (None, Some(kind)) => match first {
            Some(sep) if sep.open_delimiter().is_none() && sep.close_delimiter().is_none() => {
                Ok((Some(sep.clone()), kind, close + 3))
            }
            _ => Err(MacroDefError::BadRepetition {
                span: span_at(stream, close + 1),
            }),
        },
        (None, None) => Err(MacroDefError::BadRepetition {
            span: span_at(stream, close + 1),
        }),
    }
}

fn parse_pattern(stream: &TokenStream, start: usize, end: usize) -> Result<Vec<PatternElem>, MacroDefError> {
    let mut elems = Vec::new();
    let mut i = start;

    while i < end {
        let Some(tok) = stream.get(i) else { break };
        if *tok != Token::Dollar {
            elems.push(PatternElem::Token(tok.clone()));
            i += 1;
            continue;
        }

        match stream.get(i + 1) {
            Some(Token::LParen) => {
                let close = stream
                    .matching_close(i + 1)
                    .ok_or(MacroDefError::BadRepetition { span: span_at(stream, i) })?;
                let inner = parse_pattern(stream, i + 2, close)?;
                let (separator, kind, next) = parse_repetition_suffix(stream, close)?;
                elems.push(PatternElem::Group(PatternGroup {
                    elems: inner,
                    separator,
                    kind,
                }));
                i = next;
            }
            Some(t) if t.ident_text().is_some() => {
                let name = t.ident_text().unwrap_or_default().to_string();
                if stream.get(i + 2) != Some(&Token::Colon) {
                    return Err(MacroDefError::MissingFragment {
                        name,
                        span: span_at(stream, i + 1),
                    });
                }
                let kind_tok = stream.get(i + 3).and_then(|t| t.ident_text());
                let kind = match kind_tok {
                    Some(k) => FragmentKind::from_name(k).ok_or_else(|| MacroDefError::UnknownFragment {
                        kind: k.to_string(),
                        span: span_at(stream, i + 3),
                    })?,
                    None => {
                        return Err(MacroDefError::MissingFragment {
                            name,
                            span: span_at(stream, i + 3),
                        });
                    }
                };
                elems.push(PatternElem::Binding { name, kind });
                i += 4;
            }
            _ => {
                return Err(MacroDefError::StrayDollar {
                    span: span_at(stream, i),
                });
            }
        }
    }
    Ok(elems)
}

fn parse_template(stream: &TokenStream, start: usize, end: usize) -> Result<Vec<TemplateElem>, MacroDefError> {
    let mut elems = Vec::new();
    let mut i = start;

    while i < end {
        let Some(tok) = stream.get(i) else { break };
        if *tok != Token::Dollar {
            elems.push(TemplateElem::Text(stream.slice(i, i + 1).to_string()));
            i += 1;
            continue;
        }

        match stream.get(i + 1) {
            Some(Token::LParen) => {
                let close = stream
                    .matching_close(i + 1)
                    .ok_or(MacroDefError::BadRepetition { span: span_at(stream, i) })?;
                let inner = parse_template(stream, i + 2, close)?;
                let (separator, kind, next) = parse_repetition_suffix(stream, close)?;
                let separator = separator.map(|_| stream.slice(close + 1, close + 2).to_string());
                elems.push(TemplateElem::Repeat(TemplateRepeat {
                    elems: inner,
                    separator,
                    kind,
                }));
                i = next;
            }
            Some(Token::Crate) => {
                elems.push(TemplateElem::DollarCrate);
                i += 2;
            }
            Some(t) if t.ident_text().is_some() => {
                elems.push(TemplateElem::Var(t.ident_text().unwrap_or_default().to_string()));
                i += 2;
            }
            // a lone `$` is emitted as-is
            _ => {
                elems.push(TemplateElem::Text("$".to_string()));
                i += 1;
            }
        }
    }
    Ok(elems)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cases_in_order() {
        let def = MacroDef::parse("m", "my-crate", "() => { 0 }; ($x:expr) => { $x };").unwrap();
        assert_eq!(def.cases.len(), 2);
        assert_eq!(def.krate, "my_crate");
        assert!(def.cases[0].pattern.is_empty());
        assert_eq!(
            def.cases[1].pattern,
            vec![PatternElem::Binding {
                name: "x".to_string(),
                kind: FragmentKind::Expr
            }]
        );
        assert_eq!(def.cases[1].template, vec![TemplateElem::Var("x".to_string())]);
    }

    #[test]
    fn test_nested_groups_are_flattened() {
        let def = MacroDef::parse("m", "c", "([$a:ident]) => {}").unwrap();
        assert_eq!(
            def.cases[0].pattern,
            vec![
                PatternElem::Token(Token::LBracket),
                PatternElem::Binding {
                    name: "a".to_string(),
                    kind: FragmentKind::Ident
                },
                PatternElem::Token(Token::RBracket),
            ]
        );
    }

    #[test]
    fn test_repetition_with_separator() {
        let def = MacroDef::parse("lst", "c", "($($x:expr),*) => { [$($x),*] }").unwrap();
        let PatternElem::Group(group) = &def.cases[0].pattern[0] else {
            panic!("expected group");
        };
        assert_eq!(group.separator, Some(Token::Comma));
        assert_eq!(group.kind, RepeatKind::ZeroOrMore);
        assert!(group.bound_vars().contains("x"));

        let TemplateElem::Repeat(rep) = &def.cases[0].template[1] else {
            panic!("expected repetition");
        };
        assert_eq!(rep.separator.as_deref(), Some(","));
        assert!(rep.referenced_vars().contains("x"));
    }

    #[test]
    fn test_optional_group_and_dollar_crate() {
        let def = MacroDef::parse("m", "c", "($(mut)? $n:ident) => { $crate::f($n) }").unwrap();
        let PatternElem::Group(group) = &def.cases[0].pattern[0] else {
            panic!("expected group");
        };
        assert_eq!(group.kind, RepeatKind::ZeroOrOne);
        assert_eq!(group.separator, None);
        assert_eq!(def.cases[0].template[0], TemplateElem::DollarCrate);
    }

    #[test]
    fn test_malformed_definitions() {
        assert!(matches!(
            MacroDef::parse("m", "c", "($x) => {}"),
            Err(MacroDefError::MissingFragment { .. })
        ));
        assert!(matches!(
            MacroDef::parse("m", "c", "($x:bogus) => {}"),
            Err(MacroDefError::UnknownFragment { .. })
        ));
        assert!(matches!(
            MacroDef::parse("m", "c", "() {}"),
            Err(MacroDefError::MissingArrow { .. })
        ));
        assert!(matches!(MacroDef::parse("m", "c", ""), Err(MacroDefError::NoCases)));
    }
}
