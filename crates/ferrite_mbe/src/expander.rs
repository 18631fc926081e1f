//! Case selection and template substitution.

use std::sync::Arc;

use ferrite_ast::{MacroCall, Path};
use ferrite_syntax::{Cancellation, DOLLAR_CRATE_PREFIX, TokenStream};
use tracing::{debug, trace};

use crate::builtin::{self, BuiltinMacro};
use crate::matcher::{InputCursor, MatchError, match_case};
use crate::subst::SubstitutionChain;
use crate::{ExpandError, MacroCase, MacroDef, MacroSubstitution, RepeatKind, TemplateElem};

/// Default limit on nested expansions inside builtin arguments
pub const DEFAULT_EXPANSION_DEPTH: usize = 128;

/// Finds the definition a macro path refers to at the invocation site
pub trait MacroLookup {
    fn find_macro(&self, path: &Path) -> Option<Arc<MacroDef>>;
}

impl<F> MacroLookup for F
where
    F: Fn(&Path) -> Option<Arc<MacroDef>>,
{
    fn find_macro(&self, path: &Path) -> Option<Arc<MacroDef>> {
        self(path)
    }
}

/// Environment and file access for `env!`, `option_env!` and `include!`
pub trait ExpansionHost {
    fn env_var(&self, name: &str) -> Option<String>;
    /// Contents of a file, by path relative to the invoking file
    fn read_file(&self, path: &str) -> Option<String>;
}

/// Host with no environment variables and no files
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyHost;

impl ExpansionHost for EmptyHost {
    fn env_var(&self, _name: &str) -> Option<String> {
        None
    }

    fn read_file(&self, _path: &str) -> Option<String> {
        None
    }
}

/// Expands macro invocations to text for an external parser to reparse
pub struct Expander<'a> {
    /// Normalized name of the crate containing the invocations
    current_crate: String,
    lookup: &'a dyn MacroLookup,
    host: &'a dyn ExpansionHost,
    cancel: Cancellation,
    depth_limit: usize,
}

impl<'a> Expander<'a> {
    pub fn new(current_crate: &str, lookup: &'a dyn MacroLookup, host: &'a dyn ExpansionHost) -> Self {
        Self {
            current_crate: crate::normalize_crate_name(current_crate),
            lookup,
            host,
            cancel: Cancellation::new(),
            depth_limit: DEFAULT_EXPANSION_DEPTH,
        }
    }

    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_depth_limit(mut self, limit: usize) -> Self {
        self.depth_limit = limit;
        self
    }

    pub(crate) fn host(&self) -> &dyn ExpansionHost {
        self.host
    }

    /// Expand one invocation. Builtins are evaluated directly; every other
    /// path goes through the macro lookup and rule matching.
    pub fn expand_call(&self, call: &MacroCall) -> Result<String, ExpandError> {
        self.expand_path(&call.path, &call.input, 0)
    }

    /// Expand a builtin invocation, `None` when it cannot be expanded
    /// (unknown builtin, non-literal argument, missing variable or file)
    pub fn expand_builtin(&self, path: &Path, input: &str) -> Option<String> {
        let builtin = BuiltinMacro::from_path(path)?;
        builtin::expand(self, builtin, input, 0).ok()
    }

    pub(crate) fn expand_path(&self, path: &Path, input: &str, depth: usize) -> Result<String, ExpandError> {
        if depth > self.depth_limit {
            return Err(ExpandError::DepthExceeded {
                limit: self.depth_limit,
            });
        }
        if let Some(builtin) = BuiltinMacro::from_path(path) {
            return builtin::expand(self, builtin, input, depth);
        }
        let def = self
            .lookup
            .find_macro(path)
            .ok_or_else(|| ExpandError::UnresolvedMacro { path: path.to_string() })?;
        self.expand_rules(&def, input)
    }

    /// Expand `input` with the first case of `def` that matches it
    pub fn expand_rules(&self, def: &MacroDef, input: &str) -> Result<String, ExpandError> {
        let stream = TokenStream::lex(input)?;
        let mut cursor = InputCursor::new(&stream);

        for (index, case) in def.cases.iter().enumerate() {
            self.cancel.check()?;
            match match_case(&case.pattern, &mut cursor, &self.cancel) {
                Ok(subst) => {
                    debug!(macro_name = %def.name, case = index, "macro case matched");
                    return self.substitute_case(def, case, &subst);
                }
                Err(MatchError::Cancelled(c)) => return Err(c.into()),
                Err(err) => {
                    trace!(macro_name = %def.name, case = index, error = %err, "macro case rejected");
                }
            }
        }

        debug!(macro_name = %def.name, "no macro case matched");
        Err(ExpandError::NoMatchingRule { name: def.name.clone() })
    }

    fn substitute_case(&self, def: &MacroDef, case: &MacroCase, subst: &MacroSubstitution) -> Result<String, ExpandError> {
        let mut out = String::new();
        let chain = SubstitutionChain::root(subst);
        self.substitute(def, &case.template, &chain, &mut out)?;
        Ok(out)
    }

    fn substitute(
        &self,
        def: &MacroDef,
        elems: &[TemplateElem],
        chain: &SubstitutionChain<'_>,
        out: &mut String,
    ) -> Result<(), ExpandError> {
        for elem in elems {
            match elem {
                TemplateElem::Text(text) => join_fragment(out, text),
                TemplateElem::Var(name) => {
                    let text = chain
                        .lookup(name)
                        .ok_or_else(|| ExpandError::UnboundVariable { name: name.clone() })?;
                    join_fragment(out, text);
                }
                TemplateElem::DollarCrate => join_fragment(out, &self.dollar_crate(def)),
                TemplateElem::Repeat(rep) => {
                    let group = chain
                        .select_group(&rep.referenced_vars())
                        .ok_or(ExpandError::NoRepetitionGroup)?;
                    for (i, iteration) in group.substitutions.iter().enumerate() {
                        if i > 0 {
                            if let Some(sep) = &rep.separator {
                                join_fragment(out, sep);
                            }
                        }
                        let inner = chain.child(iteration);
                        self.substitute(def, &rep.elems, &inner, out)?;
                        if rep.kind == RepeatKind::ZeroOrOne {
                            break;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn dollar_crate(&self, def: &MacroDef) -> String {
        if def.krate == self.current_crate {
            format!("{}self", DOLLAR_CRATE_PREFIX)
        } else {
            format!("{}{}", DOLLAR_CRATE_PREFIX, def.krate)
        }
    }
}

/// Append `fragment`, separated by one space unless either side already
/// has whitespace at the seam
pub(crate) fn join_fragment(buf: &mut String, fragment: &str) {
    let (Some(last), Some(first)) = (buf.chars().last(), fragment.chars().next()) else {
        buf.push_str(fragment);
        return;
    };
    if !last.is_whitespace() && !first.is_whitespace() {
        buf.push(' ');
    }
    buf.push_str(fragment);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrite_syntax::Token;

    fn no_macros(_: &Path) -> Option<Arc<MacroDef>> {
        None
    }

    fn expand(def: &str, input: &str) -> Result<String, ExpandError> {
        let def = MacroDef::parse("m", "app", def).unwrap();
        let lookup = no_macros;
        let expander = Expander::new("app", &lookup, &EmptyHost);
        expander.expand_rules(&def, input)
    }

    fn squash(text: &str) -> String {
        text.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn test_double_parenthesizes_expression() {
        let out = expand("($x:expr) => { $x + $x }", "1+2").unwrap();
        assert_eq!(out, "(1+2) + (1+2)");
    }

    #[test]
    fn test_list_repetition() {
        let out = expand("($($x:expr),*) => { [$($x),*] }", "1,2,3").unwrap();
        assert_eq!(out, "[ 1 , 2 , 3 ]");
        assert_eq!(squash(&out), "[1,2,3]");
    }

    #[test]
    fn test_literal_only_round_trip() {
        let template = "let a = [1, 2]; a.len()";
        let out = expand(&format!("() => {{ {} }}", template), "").unwrap();
        assert_eq!(squash(&out), squash(template));
    }

    #[test]
    fn test_first_matching_case_wins() {
        let first = expand("($x:ident) => { one }; ($x:expr) => { two }", "a").unwrap();
        let changed = expand("($x:ident) => { one }; ($y:tt) => { other }", "a").unwrap();
        assert_eq!(first, "one");
        assert_eq!(changed, "one");

        let fallback = expand("($x:ident) => { one }; ($x:expr) => { two }", "a + 1").unwrap();
        assert_eq!(fallback, "two");
    }

    #[test]
    fn test_no_matching_rule() {
        assert!(matches!(
            expand("(a) => { x }", "b"),
            Err(ExpandError::NoMatchingRule { .. })
        ));
    }

    #[test]
    fn test_unbound_variable_fails() {
        assert!(matches!(
            expand("($x:ident) => { $y }", "a"),
            Err(ExpandError::UnboundVariable { .. })
        ));
    }

    #[test]
    fn test_nested_repetition_uses_outer_binding() {
        let out = expand(
            "($name:ident: $($f:ident),*) => { $( $name . $f )* }",
            "s: a, b",
        )
        .unwrap();
        assert_eq!(out, "s . a s . b");
    }

    #[test]
    fn test_sibling_groups_selected_by_variables() {
        let out = expand(
            "($($a:ident)* ; $($b:literal)*) => { $($b)* | $($a)* }",
            "x y ; 1 2",
        )
        .unwrap();
        assert_eq!(out, "1 2 | x y");
    }

    #[test]
    fn test_dollar_crate_identifier() {
        let def = MacroDef::parse("m", "dep", "($n:ident) => { $crate::f($n) }").unwrap();
        let lookup = no_macros;
        let expander = Expander::new("app", &lookup, &EmptyHost);
        let out = expander.expand_rules(&def, "x").unwrap();

        let stream = TokenStream::lex(&out).unwrap();
        assert_eq!(
            stream.get(0),
            Some(&Token::Ident("__ferrite_dollar_crate_dep".to_string()))
        );
        let path = Path::parse(stream.slice(0, 3));
        assert_eq!(path.kind, ferrite_ast::PathKind::DollarCrate("dep".to_string()));

        let same_crate = Expander::new("dep", &lookup, &EmptyHost);
        let out = same_crate.expand_rules(&def, "x").unwrap();
        assert!(out.starts_with("__ferrite_dollar_crate_self"));
    }

    #[test]
    fn test_cancelled_expansion() {
        let def = MacroDef::parse("m", "app", "() => {}").unwrap();
        let lookup = no_macros;
        let cancel = Cancellation::new();
        cancel.cancel();
        let expander = Expander::new("app", &lookup, &EmptyHost).with_cancellation(cancel);
        assert!(matches!(expander.expand_rules(&def, ""), Err(ExpandError::Cancelled(_))));
    }

    #[test]
    fn test_join_rule() {
        let mut buf = String::new();
        join_fragment(&mut buf, "a");
        join_fragment(&mut buf, "b");
        join_fragment(&mut buf, " c");
        join_fragment(&mut buf, "");
        assert_eq!(buf, "a b c");
    }
}
