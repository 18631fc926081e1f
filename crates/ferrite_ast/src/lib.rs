//! Syntax tree data model consumed by the semantic core.
//!
//! Trees are produced by an external parser and are immutable once built.
//! Item-level nodes are plain owned structs; function, const and static
//! bodies keep their expressions and patterns in per-body arenas so that
//! inference results can be keyed by stable `ExprId`/`PatId` handles.

mod body;
pub mod make;
mod path;

pub use body::*;
pub use path::*;

pub use ferrite_syntax::{Delimiter, Span};

/// An identifier with its position
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }

    /// Identifier without a meaningful position (synthesized nodes)
    pub fn synthetic(name: impl Into<String>) -> Self {
        Self::new(name, Span::default())
    }
}

/// A complete source file
#[derive(Debug, Clone, Default)]
pub struct SourceFile {
    /// Inner attributes (`#![no_std]`, ...)
    pub attrs: Attrs,
    pub items: Vec<Item>,
}

/// Attribute input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrInput {
    /// `#[name]`
    None,
    /// `#[name = "value"]`
    Value(String),
    /// `#[name(tokens)]`, token text kept verbatim
    TokenTree(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub path: String,
    pub input: AttrInput,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attrs(pub Vec<Attr>);

impl Attrs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style: add a bare attribute
    pub fn with(mut self, path: &str) -> Self {
        self.0.push(Attr {
            path: path.to_string(),
            input: AttrInput::None,
        });
        self
    }

    /// Builder-style: add `#[path = "value"]`
    pub fn with_value(mut self, path: &str, value: &str) -> Self {
        self.0.push(Attr {
            path: path.to_string(),
            input: AttrInput::Value(value.to_string()),
        });
        self
    }

    /// Builder-style: add `#[path(tokens)]`
    pub fn with_tokens(mut self, path: &str, tokens: &str) -> Self {
        self.0.push(Attr {
            path: path.to_string(),
            input: AttrInput::TokenTree(tokens.to_string()),
        });
        self
    }

    pub fn has(&self, path: &str) -> bool {
        self.0.iter().any(|a| a.path == path)
    }

    /// Value of `#[path = "value"]`
    pub fn value(&self, path: &str) -> Option<&str> {
        self.0.iter().find_map(|a| match &a.input {
            AttrInput::Value(v) if a.path == path => Some(v.as_str()),
            _ => None,
        })
    }

    /// Token text of `#[path(tokens)]`
    pub fn token_tree(&self, path: &str) -> Option<&str> {
        self.0.iter().find_map(|a| match &a.input {
            AttrInput::TokenTree(t) if a.path == path => Some(t.as_str()),
            _ => None,
        })
    }

    /// `#[lang = "..."]` item name
    pub fn lang_item(&self) -> Option<&str> {
        self.value("lang")
    }
}

/// Declared visibility
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Private,
    Public,
    /// `pub(crate)`
    Crate,
    /// `pub(super)`
    Super,
    /// `pub(in path)`
    In(Path),
}

/// Top-level and module-level items
#[derive(Debug, Clone)]
pub enum Item {
    Function(FnDef),
    Struct(StructDef),
    Enum(EnumDef),
    Trait(TraitDef),
    Impl(ImplDef),
    Module(ModDef),
    Use(UseDef),
    ExternCrate(ExternCrateDef),
    MacroRules(MacroRulesDef),
    MacroCall(MacroCall),
    Const(ConstDef),
    Static(StaticDef),
    TypeAlias(TypeAliasDef),
}

impl Item {
    pub fn attrs(&self) -> &Attrs {
        match self {
            Item::Function(it) => &it.attrs,
            Item::Struct(it) => &it.attrs,
            Item::Enum(it) => &it.attrs,
            Item::Trait(it) => &it.attrs,
            Item::Impl(it) => &it.attrs,
            Item::Module(it) => &it.attrs,
            Item::Use(it) => &it.attrs,
            Item::ExternCrate(it) => &it.attrs,
            Item::MacroRules(it) => &it.attrs,
            Item::MacroCall(it) => &it.attrs,
            Item::Const(it) => &it.attrs,
            Item::Static(it) => &it.attrs,
            Item::TypeAlias(it) => &it.attrs,
        }
    }
}

/// Generic parameter list plus where-clauses
#[derive(Debug, Clone, Default)]
pub struct Generics {
    pub params: Vec<GenericParam>,
    pub where_preds: Vec<WherePredicate>,
}

impl Generics {
    pub fn type_params(&self) -> impl Iterator<Item = (&Ident, &[TypeBound])> {
        self.params.iter().filter_map(|p| match p {
            GenericParam::Type { name, bounds, .. } => Some((name, bounds.as_slice())),
            _ => None,
        })
    }

    pub fn lifetimes(&self) -> impl Iterator<Item = &Ident> {
        self.params.iter().filter_map(|p| match p {
            GenericParam::Lifetime { name } => Some(name),
            _ => None,
        })
    }
}

#[derive(Debug, Clone)]
pub enum GenericParam {
    Type {
        name: Ident,
        bounds: Vec<TypeBound>,
        default: Option<TypeRef>,
    },
    /// Name includes the leading quote: `'a`
    Lifetime { name: Ident },
    Const { name: Ident, ty: TypeRef },
}

#[derive(Debug, Clone)]
pub struct WherePredicate {
    pub ty: TypeRef,
    pub bounds: Vec<TypeBound>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeBound {
    /// Trait path, generic args and associated bindings included
    Trait(Path),
    Lifetime(String),
}

/// `self` parameter of a method
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelfParam {
    /// `self` / `mut self`
    Value { mutable: bool },
    /// `&self` / `&mut self`
    Ref { mutable: bool },
    /// `self: Type`
    Typed(TypeRef),
}

/// Function definition
#[derive(Debug, Clone)]
pub struct FnDef {
    pub attrs: Attrs,
    pub vis: Visibility,
    pub name: Ident,
    pub generics: Generics,
    pub self_param: Option<SelfParam>,
    /// Parameter types; patterns live in `body.params` (after the self
    /// parameter pattern, when there is one)
    pub params: Vec<TypeRef>,
    pub ret: Option<TypeRef>,
    /// None for trait method signatures and extern functions
    pub body: Option<Body>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructKind {
    Record(Vec<FieldDef>),
    Tuple(Vec<FieldDef>),
    Unit,
}

impl StructKind {
    pub fn fields(&self) -> &[FieldDef] {
        match self {
            StructKind::Record(fields) | StructKind::Tuple(fields) => fields,
            StructKind::Unit => &[],
        }
    }
}

/// Struct or variant field. Tuple fields are named `0`, `1`, ...
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub vis: Visibility,
    pub name: Ident,
    pub ty: TypeRef,
}

#[derive(Debug, Clone)]
pub struct StructDef {
    pub attrs: Attrs,
    pub vis: Visibility,
    pub name: Ident,
    pub generics: Generics,
    pub kind: StructKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct VariantDef {
    pub name: Ident,
    pub kind: StructKind,
}

#[derive(Debug, Clone)]
pub struct EnumDef {
    pub attrs: Attrs,
    pub vis: Visibility,
    pub name: Ident,
    pub generics: Generics,
    pub variants: Vec<VariantDef>,
    pub span: Span,
}

/// Items inside traits and impls
#[derive(Debug, Clone)]
pub enum AssocItem {
    Function(FnDef),
    TypeAlias(TypeAliasDef),
    Const(ConstDef),
}

#[derive(Debug, Clone)]
pub struct TraitDef {
    pub attrs: Attrs,
    pub vis: Visibility,
    pub name: Ident,
    pub generics: Generics,
    pub supertraits: Vec<TypeBound>,
    pub items: Vec<AssocItem>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ImplDef {
    pub attrs: Attrs,
    pub generics: Generics,
    /// None for inherent impls
    pub trait_ref: Option<Path>,
    pub self_ty: TypeRef,
    pub items: Vec<AssocItem>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ModKind {
    /// `mod foo { ... }`
    Inline(Vec<Item>),
    /// `mod foo;`, contents live in another file
    OutOfLine,
}

#[derive(Debug, Clone)]
pub struct ModDef {
    pub attrs: Attrs,
    pub vis: Visibility,
    pub name: Ident,
    pub kind: ModKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportAlias {
    Named(Ident),
    /// `use foo as _;`
    Underscore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UseTreeKind {
    /// `use a::b;` / `use a::b as c;`
    Single { alias: Option<ImportAlias> },
    /// `use a::*;`
    Glob,
    /// `use a::{b, c};`
    List(Vec<UseTree>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UseTree {
    /// Prefix path (empty for `use {a, b};`)
    pub path: Path,
    pub kind: UseTreeKind,
}

#[derive(Debug, Clone)]
pub struct UseDef {
    pub attrs: Attrs,
    pub vis: Visibility,
    pub tree: UseTree,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ExternCrateDef {
    pub attrs: Attrs,
    pub vis: Visibility,
    /// Crate name as written (`self` allowed)
    pub name: Ident,
    pub alias: Option<Ident>,
    pub span: Span,
}

/// `macro_rules! name { ... }`
#[derive(Debug, Clone)]
pub struct MacroRulesDef {
    pub attrs: Attrs,
    pub name: Ident,
    /// Text between the outer delimiters of the definition
    pub body: String,
    pub span: Span,
}

/// A macro invocation `path!(input)`
#[derive(Debug, Clone)]
pub struct MacroCall {
    pub attrs: Attrs,
    pub path: Path,
    pub delimiter: Delimiter,
    /// Text between the invocation delimiters
    pub input: String,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ConstDef {
    pub attrs: Attrs,
    pub vis: Visibility,
    /// None for `const _: T = ...;`
    pub name: Option<Ident>,
    pub ty: TypeRef,
    pub body: Option<Body>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct StaticDef {
    pub attrs: Attrs,
    pub vis: Visibility,
    pub name: Ident,
    pub mutable: bool,
    pub ty: TypeRef,
    pub body: Option<Body>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct TypeAliasDef {
    pub attrs: Attrs,
    pub vis: Visibility,
    pub name: Ident,
    pub generics: Generics,
    /// Bounds of an associated type declaration in a trait
    pub bounds: Vec<TypeBound>,
    /// None for associated type declarations without a default
    pub ty: Option<TypeRef>,
    pub span: Span,
}

/// Written types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Path(Path),
    Ref {
        lifetime: Option<String>,
        mutable: bool,
        inner: Box<TypeRef>,
    },
    Ptr {
        mutable: bool,
        inner: Box<TypeRef>,
    },
    /// `[T; N]`; None when the length is not a literal
    Array {
        elem: Box<TypeRef>,
        len: Option<u64>,
    },
    Slice(Box<TypeRef>),
    /// `()` is the empty tuple
    Tuple(Vec<TypeRef>),
    Fn {
        params: Vec<TypeRef>,
        ret: Box<TypeRef>,
    },
    Never,
    /// `_`
    Infer,
    DynTrait(Vec<TypeBound>),
    ImplTrait(Vec<TypeBound>),
}

impl TypeRef {
    /// `TypeRef::path("Vec")`, parsed with [`Path::parse`]
    pub fn path(text: &str) -> TypeRef {
        TypeRef::Path(Path::parse(text))
    }

    pub fn unit() -> TypeRef {
        TypeRef::Tuple(Vec::new())
    }

    pub fn reference(inner: TypeRef, mutable: bool) -> TypeRef {
        TypeRef::Ref {
            lifetime: None,
            mutable,
            inner: Box::new(inner),
        }
    }
}

impl std::fmt::Display for TypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeRef::Path(p) => write!(f, "{}", p),
            TypeRef::Ref { lifetime, mutable, inner } => {
                write!(f, "&")?;
                if let Some(lt) = lifetime {
                    write!(f, "{} ", lt)?;
                }
                if *mutable {
                    write!(f, "mut ")?;
                }
                write!(f, "{}", inner)
            }
            TypeRef::Ptr { mutable, inner } => {
                write!(f, "*{} {}", if *mutable { "mut" } else { "const" }, inner)
            }
            TypeRef::Array { elem, len: Some(len) } => write!(f, "[{}; {}]", elem, len),
            TypeRef::Array { elem, len: None } => write!(f, "[{}; _]", elem),
            TypeRef::Slice(elem) => write!(f, "[{}]", elem),
            TypeRef::Tuple(elems) => {
                let parts: Vec<_> = elems.iter().map(|t| t.to_string()).collect();
                if parts.len() == 1 {
                    write!(f, "({},)", parts[0])
                } else {
                    write!(f, "({})", parts.join(", "))
                }
            }
            TypeRef::Fn { params, ret } => {
                let parts: Vec<_> = params.iter().map(|t| t.to_string()).collect();
                write!(f, "fn({}) -> {}", parts.join(", "), ret)
            }
            TypeRef::Never => write!(f, "!"),
            TypeRef::Infer => write!(f, "_"),
            TypeRef::DynTrait(bounds) | TypeRef::ImplTrait(bounds) => {
                let kw = if matches!(self, TypeRef::DynTrait(_)) { "dyn" } else { "impl" };
                let parts: Vec<_> = bounds
                    .iter()
                    .map(|b| match b {
                        TypeBound::Trait(p) => p.to_string(),
                        TypeBound::Lifetime(l) => l.clone(),
                    })
                    .collect();
                write!(f, "{} {}", kw, parts.join(" + "))
            }
        }
    }
}
