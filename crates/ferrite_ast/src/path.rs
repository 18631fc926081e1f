//! Paths, generic arguments and the small textual path reader used to build
//! synthesized paths (for example after `$crate` expansion).

use ferrite_syntax::{DOLLAR_CRATE_PREFIX, SpannedToken, Token, TokenStream};

use crate::{TypeBound, TypeRef};

/// How a path is anchored
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathKind {
    /// `a::b`
    Plain,
    /// `crate::a`
    Crate,
    /// `self::a`
    SelfMod,
    /// `super::a` (count of `super` segments)
    Super(u32),
    /// `::a` (extern crate root in 2018)
    Abs,
    /// Expanded `$crate`; holds `self` or the defining crate's name
    DollarCrate(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenericArg {
    Type(TypeRef),
    Lifetime(String),
    Const(u64),
}

/// `Iterator<Item = u8>` binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssocTypeBinding {
    pub name: String,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GenericArgs {
    pub args: Vec<GenericArg>,
    pub bindings: Vec<AssocTypeBinding>,
}

impl GenericArgs {
    pub fn types(&self) -> impl Iterator<Item = &TypeRef> {
        self.args.iter().filter_map(|a| match a {
            GenericArg::Type(t) => Some(t),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    pub name: String,
    pub args: Option<GenericArgs>,
}

impl PathSegment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: None,
        }
    }
}

/// `<Type as Trait>::...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedSelf {
    pub self_ty: TypeRef,
    pub trait_ref: Option<Path>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    pub kind: PathKind,
    pub qualifier: Option<Box<QualifiedSelf>>,
    pub segments: Vec<PathSegment>,
}

impl Path {
    pub fn new(kind: PathKind, segments: Vec<PathSegment>) -> Self {
        let mut path = Self {
            kind,
            qualifier: None,
            segments,
        };
        path.normalize_dollar_crate();
        path
    }

    /// Single plain segment
    pub fn ident(name: &str) -> Self {
        Self::new(PathKind::Plain, vec![PathSegment::new(name)])
    }

    /// Read a path from text such as `crate::a::B<u8>` or
    /// `<T as Iterator>::Item`. Unreadable trailing input is ignored.
    pub fn parse(text: &str) -> Self {
        let Ok(stream) = TokenStream::lex(text) else {
            return Self::new(PathKind::Plain, Vec::new());
        };
        let mut reader = PathReader {
            tokens: stream.tokens(),
            pos: 0,
        };
        reader.path()
    }

    /// Name of a plain single-segment path without generic args
    pub fn as_ident(&self) -> Option<&str> {
        match (&self.kind, self.qualifier.as_ref(), self.segments.as_slice()) {
            (PathKind::Plain, None, [seg]) if seg.args.is_none() => Some(seg.name.as_str()),
            _ => None,
        }
    }

    pub fn last_segment(&self) -> Option<&PathSegment> {
        self.segments.last()
    }

    pub fn first_segment(&self) -> Option<&PathSegment> {
        self.segments.first()
    }

    /// Path without its last segment
    pub fn qualifier_path(&self) -> Option<Path> {
        if self.segments.len() <= 1 && self.qualifier.is_none() {
            return None;
        }
        let mut parent = self.clone();
        parent.segments.pop();
        Some(parent)
    }

    /// A leading `__ferrite_dollar_crate_*` identifier becomes `PathKind::DollarCrate`
    fn normalize_dollar_crate(&mut self) {
        if self.kind != PathKind::Plain || self.qualifier.is_some() {
            return;
        }
        let crate_name = match self.segments.first() {
            Some(seg) => match seg.name.strip_prefix(DOLLAR_CRATE_PREFIX) {
                Some(rest) => rest.to_string(),
                None => return,
            },
            None => return,
        };
        self.segments.remove(0);
        self.kind = PathKind::DollarCrate(crate_name);
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        match &self.kind {
            PathKind::Plain => {}
            PathKind::Crate => parts.push("crate".to_string()),
            PathKind::SelfMod => parts.push("self".to_string()),
            PathKind::Super(n) => parts.extend((0..*n).map(|_| "super".to_string())),
            PathKind::Abs => parts.push(String::new()),
            PathKind::DollarCrate(name) => parts.push(format!("{}{}", DOLLAR_CRATE_PREFIX, name)),
        }
        if let Some(q) = &self.qualifier {
            match &q.trait_ref {
                Some(tr) => parts.push(format!("<{} as {}>", q.self_ty, tr)),
                None => parts.push(format!("<{}>", q.self_ty)),
            }
        }
        for seg in &self.segments {
            match &seg.args {
                Some(args) => {
                    let mut rendered: Vec<String> = args
                        .args
                        .iter()
                        .map(|a| match a {
                            GenericArg::Type(t) => t.to_string(),
                            GenericArg::Lifetime(l) => l.clone(),
                            GenericArg::Const(c) => c.to_string(),
                        })
                        .collect();
                    rendered.extend(args.bindings.iter().map(|b| format!("{} = {}", b.name, b.ty)));
                    parts.push(format!("{}<{}>", seg.name, rendered.join(", ")));
                }
                None => parts.push(seg.name.clone()),
            }
        }
        write!(f, "{}", parts.join("::"))
    }
}

struct PathReader<'a> {
    tokens: &'a [SpannedToken],
    pos: usize,
}

impl PathReader<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn path(&mut self) -> Path {
        let mut kind = PathKind::Plain;
        let mut qualifier = None;

        if self.eat(&Token::Lt) {
            let self_ty = self.type_ref();
            let trait_ref = if self.eat(&Token::As) { Some(self.path()) } else { None };
            self.eat(&Token::Gt);
            self.eat(&Token::ColonColon);
            qualifier = Some(Box::new(QualifiedSelf { self_ty, trait_ref }));
        } else if self.eat(&Token::ColonColon) {
            kind = PathKind::Abs;
        } else if self.eat(&Token::Crate) {
            kind = PathKind::Crate;
            self.eat(&Token::ColonColon);
        } else if self.peek() == Some(&Token::SelfLower)
            && self.tokens.get(self.pos + 1).map(|t| &t.token) == Some(&Token::ColonColon)
        {
            kind = PathKind::SelfMod;
            self.pos += 2;
        } else if self.peek() == Some(&Token::Super) {
            let mut n = 0;
            while self.eat(&Token::Super) {
                n += 1;
                self.eat(&Token::ColonColon);
            }
            kind = PathKind::Super(n);
        }

        let mut segments = Vec::new();
        while let Some(name) = self.peek().and_then(|t| t.ident_text()).map(str::to_string) {
            self.pos += 1;
            let mut segment = PathSegment::new(name);
            // `Vec::<u8>` and `Vec<u8>` both carry args
            let turbofish = self.peek() == Some(&Token::ColonColon)
                && self.tokens.get(self.pos + 1).map(|t| &t.token) == Some(&Token::Lt);
            if turbofish {
                self.pos += 1;
            }
            if self.eat(&Token::Lt) {
                segment.args = Some(self.generic_args());
            }
            segments.push(segment);
            if !self.eat(&Token::ColonColon) {
                break;
            }
        }

        let mut path = Path::new(kind, segments);
        path.qualifier = qualifier;
        path
    }

    fn generic_args(&mut self) -> GenericArgs {
        let mut args = GenericArgs::default();
        while let Some(tok) = self.peek() {
            match tok {
                Token::Gt => {
                    self.pos += 1;
                    break;
                }
                Token::Comma => self.pos += 1,
                Token::Lifetime(l) => {
                    args.args.push(GenericArg::Lifetime(l.clone()));
                    self.pos += 1;
                }
                Token::IntLiteral(n) => {
                    args.args.push(GenericArg::Const(n.parse().unwrap_or(0)));
                    self.pos += 1;
                }
                Token::Ident(name)
                    if self.tokens.get(self.pos + 1).map(|t| &t.token) == Some(&Token::Eq) =>
                {
                    let name = name.clone();
                    self.pos += 2;
                    let ty = self.type_ref();
                    args.bindings.push(AssocTypeBinding { name, ty });
                }
                _ => {
                    let before = self.pos;
                    let ty = self.type_ref();
                    args.args.push(GenericArg::Type(ty));
                    if self.pos == before {
                        // not a type; bail out instead of looping
                        self.pos += 1;
                    }
                }
            }
        }
        args
    }

    fn type_ref(&mut self) -> TypeRef {
        match self.peek() {
            Some(Token::Amp) => {
                self.pos += 1;
                let lifetime = match self.peek() {
                    Some(Token::Lifetime(l)) => {
                        let l = l.clone();
                        self.pos += 1;
                        Some(l)
                    }
                    _ => None,
                };
                let mutable = self.eat(&Token::Mut);
                TypeRef::Ref {
                    lifetime,
                    mutable,
                    inner: Box::new(self.type_ref()),
                }
            }
            Some(Token::Star) => {
                self.pos += 1;
                let mutable = self.eat(&Token::Mut);
                if !mutable {
                    self.eat(&Token::Const);
                }
                TypeRef::Ptr {
                    mutable,
                    inner: Box::new(self.type_ref()),
                }
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let mut elems = Vec::new();
                while !self.eat(&Token::RParen) && self.peek().is_some() {
                    if self.eat(&Token::Comma) {
                        continue;
                    }
                    elems.push(self.type_ref());
                }
                TypeRef::Tuple(elems)
            }
            Some(Token::LBracket) => {
                self.pos += 1;
                let elem = Box::new(self.type_ref());
                if self.eat(&Token::Semi) {
                    let len = match self.peek() {
                        Some(Token::IntLiteral(n)) => n.parse().ok(),
                        _ => None,
                    };
                    self.pos += 1;
                    self.eat(&Token::RBracket);
                    TypeRef::Array { elem, len }
                } else {
                    self.eat(&Token::RBracket);
                    TypeRef::Slice(elem)
                }
            }
            Some(Token::Not) => {
                self.pos += 1;
                TypeRef::Never
            }
            Some(Token::Underscore) => {
                self.pos += 1;
                TypeRef::Infer
            }
            Some(Token::Dyn) | Some(Token::Impl) => {
                let is_dyn = self.peek() == Some(&Token::Dyn);
                self.pos += 1;
                let mut bounds = vec![TypeBound::Trait(self.path())];
                while self.eat(&Token::Plus) {
                    match self.peek() {
                        Some(Token::Lifetime(l)) => {
                            bounds.push(TypeBound::Lifetime(l.clone()));
                            self.pos += 1;
                        }
                        _ => bounds.push(TypeBound::Trait(self.path())),
                    }
                }
                if is_dyn {
                    TypeRef::DynTrait(bounds)
                } else {
                    TypeRef::ImplTrait(bounds)
                }
            }
            Some(Token::Fn) => {
                self.pos += 1;
                let mut params = Vec::new();
                if self.eat(&Token::LParen) {
                    while !self.eat(&Token::RParen) && self.peek().is_some() {
                        if self.eat(&Token::Comma) {
                            continue;
                        }
                        params.push(self.type_ref());
                    }
                }
                let ret = if self.eat(&Token::Arrow) { self.type_ref() } else { TypeRef::unit() };
                TypeRef::Fn {
                    params,
                    ret: Box::new(ret),
                }
            }
            _ => TypeRef::Path(self.path()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_path() {
        let path = Path::parse("a::b::c");
        assert_eq!(path.kind, PathKind::Plain);
        let names: Vec<_> = path.segments.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_parse_anchored_paths() {
        assert_eq!(Path::parse("crate::foo").kind, PathKind::Crate);
        assert_eq!(Path::parse("self::foo").kind, PathKind::SelfMod);
        assert_eq!(Path::parse("super::super::foo").kind, PathKind::Super(2));
        assert_eq!(Path::parse("::std::mem").kind, PathKind::Abs);
    }

    #[test]
    fn test_parse_generic_args() {
        let path = Path::parse("HashMap<String, Vec<u8>>");
        let args = path.segments[0].args.as_ref().unwrap();
        assert_eq!(args.args.len(), 2);
        assert_eq!(path.to_string(), "HashMap<String, Vec<u8>>");
    }

    #[test]
    fn test_parse_qualified_path() {
        let path = Path::parse("<T as Iterator>::Item");
        let q = path.qualifier.as_ref().unwrap();
        assert_eq!(q.self_ty, TypeRef::path("T"));
        assert_eq!(q.trait_ref.as_ref().unwrap().as_ident(), Some("Iterator"));
        assert_eq!(path.segments[0].name, "Item");
    }

    #[test]
    fn test_dollar_crate_prefix_is_recognized() {
        let path = Path::parse("__ferrite_dollar_crate_dep::util::helper");
        assert_eq!(path.kind, PathKind::DollarCrate("dep".to_string()));
        assert_eq!(path.segments.len(), 2);
    }

    #[test]
    fn test_assoc_binding() {
        let path = Path::parse("Iterator<Item = u32>");
        let args = path.segments[0].args.as_ref().unwrap();
        assert_eq!(args.bindings[0].name, "Item");
        assert_eq!(args.bindings[0].ty, TypeRef::path("u32"));
    }
}
