//! Definition identities, namespaces and resolved visibility.

use std::sync::Arc;

use ferrite_ast::{ConstDef, EnumDef, FnDef, ImplDef, Span, StaticDef, StructDef, StructKind, TraitDef, TypeAliasDef};
use ferrite_mbe::MacroDef;
use la_arena::Idx;

use crate::def_map::ModuleData;
use crate::workspace::CrateId;

pub type LocalModuleId = Idx<ModuleData>;
pub type LocalDefId = Idx<DefData>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId {
    pub krate: CrateId,
    pub local_id: LocalModuleId,
}

/// Identity of a definition anywhere in the workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DefId {
    pub krate: CrateId,
    pub local_id: LocalDefId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefKind {
    Module,
    Function,
    Struct,
    Enum,
    Variant,
    Trait,
    Impl,
    TypeAlias,
    Const,
    Static,
    Macro,
}

/// The syntax a definition was collected from
#[derive(Debug, Clone)]
pub enum DefSource {
    Module(LocalModuleId),
    Function(Arc<FnDef>),
    Struct(Arc<StructDef>),
    Enum(Arc<EnumDef>),
    /// Enum and variant index
    Variant(Arc<EnumDef>, usize),
    Trait(Arc<TraitDef>),
    Impl(Arc<ImplDef>),
    TypeAlias(Arc<TypeAliasDef>),
    Const(Arc<ConstDef>),
    Static(Arc<StaticDef>),
    /// None when the `macro_rules!` body did not parse
    Macro(Option<Arc<MacroDef>>),
}

#[derive(Debug, Clone)]
pub struct DefData {
    /// None for impls and `const _`
    pub name: Option<String>,
    pub source: DefSource,
    pub module: LocalModuleId,
    /// Enclosing trait or impl for associated items, enum for variants
    pub container: Option<LocalDefId>,
    pub vis: Visibility,
    /// Position in the crate-wide source walk; orders textual macro scopes
    pub order: u32,
    pub span: Span,
}

impl DefData {
    pub fn kind(&self) -> DefKind {
        match &self.source {
            DefSource::Module(_) => DefKind::Module,
            DefSource::Function(_) => DefKind::Function,
            DefSource::Struct(_) => DefKind::Struct,
            DefSource::Enum(_) => DefKind::Enum,
            DefSource::Variant(..) => DefKind::Variant,
            DefSource::Trait(_) => DefKind::Trait,
            DefSource::Impl(_) => DefKind::Impl,
            DefSource::TypeAlias(_) => DefKind::TypeAlias,
            DefSource::Const(_) => DefKind::Const,
            DefSource::Static(_) => DefKind::Static,
            DefSource::Macro(_) => DefKind::Macro,
        }
    }

    /// Shape of a struct or variant
    pub fn struct_kind(&self) -> Option<&StructKind> {
        match &self.source {
            DefSource::Struct(s) => Some(&s.kind),
            DefSource::Variant(e, index) => e.variants.get(*index).map(|v| &v.kind),
            _ => None,
        }
    }

    /// Namespaces the definition's name occupies
    pub fn namespaces(&self) -> &'static [Namespace] {
        match self.kind() {
            DefKind::Module | DefKind::Enum | DefKind::Trait | DefKind::TypeAlias => &[Namespace::Types],
            DefKind::Function | DefKind::Const | DefKind::Static => &[Namespace::Values],
            DefKind::Macro => &[Namespace::Macros],
            DefKind::Impl => &[],
            DefKind::Struct | DefKind::Variant => match self.struct_kind() {
                Some(StructKind::Record(_)) => &[Namespace::Types],
                _ => &[Namespace::Types, Namespace::Values],
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Types,
    Values,
    Macros,
}

/// Who may name a definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    Public,
    /// Visible inside this module and its descendants
    Module(ModuleId),
}

/// A name's meaning in each namespace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerNs {
    pub types: Option<(DefId, Visibility)>,
    pub values: Option<(DefId, Visibility)>,
    pub macros: Option<(DefId, Visibility)>,
}

impl PerNs {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn types(def: DefId, vis: Visibility) -> Self {
        Self {
            types: Some((def, vis)),
            ..Self::default()
        }
    }

    pub fn from_def(def: DefId, vis: Visibility, namespaces: &[Namespace]) -> Self {
        let mut per_ns = Self::none();
        for ns in namespaces {
            per_ns.set(*ns, def, vis);
        }
        per_ns
    }

    pub fn is_none(&self) -> bool {
        self.types.is_none() && self.values.is_none() && self.macros.is_none()
    }

    pub fn is_full(&self) -> bool {
        self.types.is_some() && self.values.is_some() && self.macros.is_some()
    }

    pub fn get(&self, ns: Namespace) -> Option<DefId> {
        self.get_with_vis(ns).map(|(def, _)| def)
    }

    pub fn get_with_vis(&self, ns: Namespace) -> Option<(DefId, Visibility)> {
        match ns {
            Namespace::Types => self.types,
            Namespace::Values => self.values,
            Namespace::Macros => self.macros,
        }
    }

    pub fn set(&mut self, ns: Namespace, def: DefId, vis: Visibility) {
        let slot = match ns {
            Namespace::Types => &mut self.types,
            Namespace::Values => &mut self.values,
            Namespace::Macros => &mut self.macros,
        };
        *slot = Some((def, vis));
    }

    /// Fill the empty namespaces of `self` from `other`
    pub fn or(self, other: PerNs) -> PerNs {
        PerNs {
            types: self.types.or(other.types),
            values: self.values.or(other.values),
            macros: self.macros.or(other.macros),
        }
    }

    /// Replace every visibility, as a re-export does
    pub fn with_visibility(self, vis: Visibility) -> PerNs {
        PerNs {
            types: self.types.map(|(d, _)| (d, vis)),
            values: self.values.map(|(d, _)| (d, vis)),
            macros: self.macros.map(|(d, _)| (d, vis)),
        }
    }

    pub fn filter_visibility(self, mut visible: impl FnMut(Visibility) -> bool) -> PerNs {
        PerNs {
            types: self.types.filter(|(_, v)| visible(*v)),
            values: self.values.filter(|(_, v)| visible(*v)),
            macros: self.macros.filter(|(_, v)| visible(*v)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntTy {
    Isize,
    I8,
    I16,
    I32,
    I64,
    I128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UintTy {
    Usize,
    U8,
    U16,
    U32,
    U64,
    U128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatTy {
    F32,
    F64,
}

/// Primitive types, nameable everywhere unless shadowed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinType {
    Bool,
    Char,
    Str,
    Int(IntTy),
    Uint(UintTy),
    Float(FloatTy),
}

impl BuiltinType {
    pub const ALL: [(&'static str, BuiltinType); 17] = [
        ("bool", BuiltinType::Bool),
        ("char", BuiltinType::Char),
        ("str", BuiltinType::Str),
        ("isize", BuiltinType::Int(IntTy::Isize)),
        ("i8", BuiltinType::Int(IntTy::I8)),
        ("i16", BuiltinType::Int(IntTy::I16)),
        ("i32", BuiltinType::Int(IntTy::I32)),
        ("i64", BuiltinType::Int(IntTy::I64)),
        ("i128", BuiltinType::Int(IntTy::I128)),
        ("usize", BuiltinType::Uint(UintTy::Usize)),
        ("u8", BuiltinType::Uint(UintTy::U8)),
        ("u16", BuiltinType::Uint(UintTy::U16)),
        ("u32", BuiltinType::Uint(UintTy::U32)),
        ("u64", BuiltinType::Uint(UintTy::U64)),
        ("u128", BuiltinType::Uint(UintTy::U128)),
        ("f32", BuiltinType::Float(FloatTy::F32)),
        ("f64", BuiltinType::Float(FloatTy::F64)),
    ];

    pub fn from_name(name: &str) -> Option<BuiltinType> {
        Self::ALL.iter().find(|(n, _)| *n == name).map(|(_, ty)| *ty)
    }

    pub fn name(self) -> &'static str {
        Self::ALL
            .iter()
            .find(|(_, ty)| *ty == self)
            .map(|(n, _)| *n)
            .unwrap_or("?")
    }
}

impl IntTy {
    pub fn from_suffix(suffix: &str) -> Option<IntTy> {
        match BuiltinType::from_name(suffix)? {
            BuiltinType::Int(ty) => Some(ty),
            _ => None,
        }
    }
}

impl UintTy {
    pub fn from_suffix(suffix: &str) -> Option<UintTy> {
        match BuiltinType::from_name(suffix)? {
            BuiltinType::Uint(ty) => Some(ty),
            _ => None,
        }
    }
}

impl FloatTy {
    pub fn from_suffix(suffix: &str) -> Option<FloatTy> {
        match suffix {
            "f32" => Some(FloatTy::F32),
            "f64" => Some(FloatTy::F64),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use la_arena::{Arena, RawIdx};

    fn def(n: u32) -> DefId {
        let mut crates: Arena<crate::workspace::CrateData> = Arena::new();
        let krate = crates.alloc(crate::workspace::CrateData {
            name: "c".into(),
            edition: Default::default(),
            origin: crate::workspace::CrateOrigin::Workspace,
            root_file: "lib.rs".into(),
            deps: Vec::new(),
        });
        DefId {
            krate,
            local_id: LocalDefId::from_raw(RawIdx::from(n)),
        }
    }

    #[test]
    fn test_per_ns_or_keeps_existing() {
        let a = PerNs::types(def(1), Visibility::Public);
        let b = PerNs::from_def(def(2), Visibility::Public, &[Namespace::Types, Namespace::Values]);
        let merged = a.or(b);
        assert_eq!(merged.get(Namespace::Types), Some(def(1)));
        assert_eq!(merged.get(Namespace::Values), Some(def(2)));
        assert_eq!(merged.get(Namespace::Macros), None);
    }

    #[test]
    fn test_builtin_names() {
        assert_eq!(BuiltinType::from_name("u8"), Some(BuiltinType::Uint(UintTy::U8)));
        assert_eq!(BuiltinType::Float(FloatTy::F64).name(), "f64");
        assert_eq!(IntTy::from_suffix("u8"), None);
        assert_eq!(BuiltinType::from_name("String"), None);
    }
}
