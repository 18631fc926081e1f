//! Metavariable bindings produced by a successful match.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::RepeatKind;

/// Bindings of one pattern scope: the top-level pattern or one iteration of
/// a repetition group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MacroSubstitution {
    /// Binding name to captured text
    pub variables: FxHashMap<String, String>,
    /// Results of the repetition groups directly inside this scope, in
    /// pattern order
    pub groups: Vec<MacroGroup>,
}

/// All iterations of one repetition group
#[derive(Debug, Clone, PartialEq)]
pub struct MacroGroup {
    pub substitutions: Vec<MacroSubstitution>,
    pub separator: Option<String>,
    pub kind: RepeatKind,
    /// Binding names declared inside the group's pattern
    pub vars: FxHashSet<String>,
}

/// A substitution together with its enclosing scopes.
///
/// Lookups search the innermost scope first, so bindings of an inner
/// repetition shadow those of the scopes around it. Sibling groups never
/// see each other: a chain only links a scope to its ancestors.
#[derive(Debug, Clone, Copy)]
pub struct SubstitutionChain<'a> {
    subst: &'a MacroSubstitution,
    parent: Option<&'a SubstitutionChain<'a>>,
}

impl<'a> SubstitutionChain<'a> {
    pub fn root(subst: &'a MacroSubstitution) -> Self {
        Self { subst, parent: None }
    }

    /// Scope of one iteration of a group visible from `self`
    pub fn child(&'a self, subst: &'a MacroSubstitution) -> SubstitutionChain<'a> {
        SubstitutionChain {
            subst,
            parent: Some(self),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&'a str> {
        let mut scope = Some(self);
        while let Some(chain) = scope {
            if let Some(text) = chain.subst.variables.get(name) {
                return Some(text.as_str());
            }
            scope = chain.parent;
        }
        None
    }

    /// Group a template repetition referencing `referenced` iterates over.
    ///
    /// Scopes are searched innermost first. Within one scope a lone group is
    /// taken as is; among several, the first whose declared variables
    /// include one of the referenced names wins.
    pub fn select_group(&self, referenced: &FxHashSet<String>) -> Option<&'a MacroGroup> {
        let mut scope = Some(self);
        while let Some(chain) = scope {
            let groups = &chain.subst.groups;
            if groups.len() == 1 {
                return groups.first();
            }
            if let Some(group) = groups.iter().find(|g| g.vars.iter().any(|v| referenced.contains(v))) {
                return Some(group);
            }
            scope = chain.parent;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subst(vars: &[(&str, &str)]) -> MacroSubstitution {
        MacroSubstitution {
            variables: vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            groups: Vec::new(),
        }
    }

    fn group(vars: &[&str], substitutions: Vec<MacroSubstitution>) -> MacroGroup {
        MacroGroup {
            substitutions,
            separator: None,
            kind: RepeatKind::ZeroOrMore,
            vars: vars.iter().map(|v| v.to_string()).collect(),
        }
    }

    #[test]
    fn test_inner_bindings_shadow_outer() {
        let outer = subst(&[("x", "outer"), ("y", "why")]);
        let inner = subst(&[("x", "inner")]);
        let root = SubstitutionChain::root(&outer);
        let chain = root.child(&inner);

        assert_eq!(chain.lookup("x"), Some("inner"));
        assert_eq!(chain.lookup("y"), Some("why"));
        assert_eq!(chain.lookup("z"), None);
        assert_eq!(root.lookup("x"), Some("outer"));
    }

    #[test]
    fn test_group_selection() {
        let mut top = subst(&[]);
        top.groups.push(group(&["a"], vec![subst(&[("a", "1")])]));
        top.groups.push(group(&["b"], vec![subst(&[("b", "2")])]));
        let chain = SubstitutionChain::root(&top);

        let wants_b: FxHashSet<String> = ["b".to_string()].into_iter().collect();
        let picked = chain.select_group(&wants_b).unwrap();
        assert!(picked.vars.contains("b"));

        let wants_c: FxHashSet<String> = ["c".to_string()].into_iter().collect();
        assert!(chain.select_group(&wants_c).is_none());
    }

    #[test]
    fn test_single_group_is_taken() {
        let mut top = subst(&[]);
        top.groups.push(group(&["a"], Vec::new()));
        let chain = SubstitutionChain::root(&top);
        assert!(chain.select_group(&FxHashSet::default()).is_some());
    }
}
