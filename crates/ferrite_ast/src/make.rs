//! Constructors for synthesized items.
//!
//! Tree producers that desugar code, and tests, build items with these
//! instead of spelling out every field. Everything is public and spanless.

use crate::{
    AssocItem, Attrs, Body, BodyBuilder, ConstDef, EnumDef, ExternCrateDef, FieldDef, FnDef, GenericParam, Generics,
    Ident, ImplDef, ImportAlias, Item, MacroRulesDef, ModDef, ModKind, Path, SelfParam, Span, StructDef, StructKind,
    TraitDef, TypeAliasDef, TypeBound, TypeRef, UseDef, UseTree, UseTreeKind, VariantDef, Visibility,
};

pub fn func(name: &str, params: Vec<TypeRef>, ret: Option<TypeRef>, body: Option<Body>) -> FnDef {
    FnDef {
        attrs: Attrs::new(),
        vis: Visibility::Public,
        name: Ident::synthetic(name),
        generics: Generics::default(),
        self_param: None,
        params,
        ret,
        body,
        span: Span::default(),
    }
}

/// `fn name(&self) -> ret` with an optional body
pub fn method(name: &str, self_param: SelfParam, ret: Option<TypeRef>, body: Option<Body>) -> FnDef {
    FnDef {
        self_param: Some(self_param),
        ..func(name, Vec::new(), ret, body)
    }
}

/// Body `{ }` with a bound `self` parameter
pub fn self_body() -> Body {
    let mut b = BodyBuilder::new();
    let this = b.bind("self");
    b.param(this);
    let root = b.block(Vec::new(), None);
    b.finish(root)
}

pub fn field(name: &str, ty: TypeRef) -> FieldDef {
    FieldDef {
        vis: Visibility::Public,
        name: Ident::synthetic(name),
        ty,
    }
}

pub fn strukt(name: &str, kind: StructKind) -> StructDef {
    StructDef {
        attrs: Attrs::new(),
        vis: Visibility::Public,
        name: Ident::synthetic(name),
        generics: Generics::default(),
        kind,
        span: Span::default(),
    }
}

pub fn variant(name: &str, kind: StructKind) -> VariantDef {
    VariantDef {
        name: Ident::synthetic(name),
        kind,
    }
}

pub fn enum_(name: &str, variants: Vec<VariantDef>) -> EnumDef {
    EnumDef {
        attrs: Attrs::new(),
        vis: Visibility::Public,
        name: Ident::synthetic(name),
        generics: Generics::default(),
        variants,
        span: Span::default(),
    }
}

pub fn trait_(name: &str, items: Vec<AssocItem>) -> TraitDef {
    TraitDef {
        attrs: Attrs::new(),
        vis: Visibility::Public,
        name: Ident::synthetic(name),
        generics: Generics::default(),
        supertraits: Vec::new(),
        items,
        span: Span::default(),
    }
}

pub fn impl_(trait_ref: Option<&str>, self_ty: TypeRef, items: Vec<AssocItem>) -> ImplDef {
    ImplDef {
        attrs: Attrs::new(),
        generics: Generics::default(),
        trait_ref: trait_ref.map(Path::parse),
        self_ty,
        items,
        span: Span::default(),
    }
}

pub fn type_alias(name: &str, ty: Option<TypeRef>) -> TypeAliasDef {
    TypeAliasDef {
        attrs: Attrs::new(),
        vis: Visibility::Public,
        name: Ident::synthetic(name),
        generics: Generics::default(),
        bounds: Vec::new(),
        ty,
        span: Span::default(),
    }
}

pub fn konst(name: &str, ty: TypeRef, body: Option<Body>) -> ConstDef {
    ConstDef {
        attrs: Attrs::new(),
        vis: Visibility::Public,
        name: Some(Ident::synthetic(name)),
        ty,
        body,
        span: Span::default(),
    }
}

pub fn module(name: &str, items: Vec<Item>) -> ModDef {
    ModDef {
        attrs: Attrs::new(),
        vis: Visibility::Public,
        name: Ident::synthetic(name),
        kind: ModKind::Inline(items),
        span: Span::default(),
    }
}

/// `mod name;`
pub fn module_decl(name: &str) -> ModDef {
    ModDef {
        kind: ModKind::OutOfLine,
        ..module(name, Vec::new())
    }
}

/// `use path;`, or `use path as alias;` (`_` for an underscore import)
pub fn use_(path: &str, alias: Option<&str>) -> UseDef {
    let alias = alias.map(|a| match a {
        "_" => ImportAlias::Underscore,
        other => ImportAlias::Named(Ident::synthetic(other)),
    });
    use_tree(UseTree {
        path: Path::parse(path),
        kind: UseTreeKind::Single { alias },
    })
}

/// `use path::*;`
pub fn use_glob(path: &str) -> UseDef {
    use_tree(UseTree {
        path: Path::parse(path),
        kind: UseTreeKind::Glob,
    })
}

pub fn use_tree(tree: UseTree) -> UseDef {
    UseDef {
        attrs: Attrs::new(),
        vis: Visibility::Private,
        tree,
        span: Span::default(),
    }
}

pub fn extern_crate(name: &str, alias: Option<&str>) -> ExternCrateDef {
    ExternCrateDef {
        attrs: Attrs::new(),
        vis: Visibility::Private,
        name: Ident::synthetic(name),
        alias: alias.map(Ident::synthetic),
        span: Span::default(),
    }
}

pub fn macro_rules(name: &str, body: &str) -> MacroRulesDef {
    MacroRulesDef {
        attrs: Attrs::new(),
        name: Ident::synthetic(name),
        body: body.to_string(),
        span: Span::default(),
    }
}

/// `<name: bounds>` type parameter list
pub fn generics(params: &[(&str, &[&str])]) -> Generics {
    Generics {
        params: params
            .iter()
            .map(|(name, bounds)| GenericParam::Type {
                name: Ident::synthetic(*name),
                bounds: bounds.iter().map(|b| TypeBound::Trait(Path::parse(b))).collect(),
                default: None,
            })
            .collect(),
        where_preds: Vec::new(),
    }
}

macro_rules! impl_into_item {
    ($($def:ident => $variant:ident),* $(,)?) => {
        $(impl From<$def> for Item {
            fn from(def: $def) -> Item {
                Item::$variant(def)
            }
        })*
    };
}

impl_into_item!(
    FnDef => Function,
    StructDef => Struct,
    EnumDef => Enum,
    TraitDef => Trait,
    ImplDef => Impl,
    ModDef => Module,
    UseDef => Use,
    ExternCrateDef => ExternCrate,
    MacroRulesDef => MacroRules,
    ConstDef => Const,
    TypeAliasDef => TypeAlias,
);

impl From<FnDef> for AssocItem {
    fn from(def: FnDef) -> AssocItem {
        AssocItem::Function(def)
    }
}

impl From<TypeAliasDef> for AssocItem {
    fn from(def: TypeAliasDef) -> AssocItem {
        AssocItem::TypeAlias(def)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_use_alias_forms() {
        let under = use_("a::T", Some("_"));
        assert_eq!(
            under.tree.kind,
            UseTreeKind::Single {
                alias: Some(ImportAlias::Underscore)
            }
        );
        let item: Item = use_glob("a::b").into();
        assert!(matches!(item, Item::Use(UseDef { tree: UseTree { kind: UseTreeKind::Glob, .. }, .. })));
    }
}
