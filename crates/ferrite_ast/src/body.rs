//! Function, const and static bodies.
//!
//! Expressions and patterns are stored in arenas owned by the body; every
//! node is addressed by an index that stays valid as long as the body does.

use la_arena::{Arena, Idx};

use crate::{Ident, Item, MacroCall, Path, Span, TypeRef};

pub type ExprId = Idx<Expr>;
pub type PatId = Idx<Pat>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Int { value: u128, suffix: Option<String> },
    Float { text: String, suffix: Option<String> },
    Bool(bool),
    Char(char),
    Byte(u8),
    Str(String),
    ByteStr(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Arith(ArithOp),
    Cmp(CmpOp),
    Logic(LogicOp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
    Deref,
}

/// Loop or block label; the name keeps its quote (`'outer`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct MatchArm {
    pub pat: PatId,
    pub guard: Option<ExprId>,
    pub body: ExprId,
}

#[derive(Debug, Clone)]
pub struct FieldInit {
    pub name: Ident,
    pub expr: ExprId,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Let {
        pat: PatId,
        ty: Option<TypeRef>,
        init: Option<ExprId>,
        else_branch: Option<ExprId>,
    },
    Expr {
        expr: ExprId,
        has_semi: bool,
    },
    /// Item declared inside a block; visible in the whole block
    Item(Item),
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    /// Placeholder for syntax the parser could not make sense of
    Missing,
    Literal(Literal),
    Path(Path),
    Block {
        label: Option<Label>,
        stmts: Vec<Stmt>,
        tail: Option<ExprId>,
        is_unsafe: bool,
    },
    Call {
        callee: ExprId,
        args: Vec<ExprId>,
    },
    MethodCall {
        receiver: ExprId,
        method: Ident,
        generic_args: Vec<TypeRef>,
        args: Vec<ExprId>,
    },
    /// `base.name`; tuple fields use `0`, `1`, ...
    Field {
        base: ExprId,
        name: Ident,
    },
    Binary {
        lhs: ExprId,
        op: BinaryOp,
        rhs: ExprId,
    },
    Unary {
        op: UnaryOp,
        expr: ExprId,
    },
    Ref {
        mutable: bool,
        expr: ExprId,
    },
    /// `lhs = rhs` or `lhs op= rhs`
    Assign {
        lhs: ExprId,
        op: Option<ArithOp>,
        rhs: ExprId,
    },
    If {
        cond: ExprId,
        then_branch: ExprId,
        else_branch: Option<ExprId>,
    },
    /// `let pat = expr` inside an `if`/`while` condition
    Let {
        pat: PatId,
        expr: ExprId,
    },
    Match {
        scrutinee: ExprId,
        arms: Vec<MatchArm>,
    },
    Loop {
        label: Option<Label>,
        body: ExprId,
    },
    While {
        label: Option<Label>,
        cond: ExprId,
        body: ExprId,
    },
    For {
        label: Option<Label>,
        pat: PatId,
        iterable: ExprId,
        body: ExprId,
    },
    Break {
        label: Option<Label>,
        expr: Option<ExprId>,
    },
    Continue {
        label: Option<Label>,
    },
    Return(Option<ExprId>),
    Tuple(Vec<ExprId>),
    Array(Vec<ExprId>),
    /// `[init; len]`; None when the length is not a literal
    ArrayRepeat {
        init: ExprId,
        len: Option<u64>,
    },
    Index {
        base: ExprId,
        index: ExprId,
    },
    Cast {
        expr: ExprId,
        ty: TypeRef,
    },
    StructLit {
        path: Path,
        fields: Vec<FieldInit>,
        spread: Option<ExprId>,
    },
    Closure {
        params: Vec<(PatId, Option<TypeRef>)>,
        ret: Option<TypeRef>,
        body: ExprId,
    },
    /// Macro call in expression position. `expansion` is the expanded
    /// expression when the external parser reparsed the expansion text.
    MacroCall {
        call: MacroCall,
        expansion: Option<ExprId>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BindingMode {
    pub by_ref: bool,
    pub mutable: bool,
}

#[derive(Debug, Clone)]
pub struct Pat {
    pub kind: PatKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum PatKind {
    Missing,
    Wild,
    Bind {
        name: Ident,
        mode: BindingMode,
        sub: Option<PatId>,
    },
    Tuple(Vec<PatId>),
    Lit(Literal),
    /// Unit struct, unit variant or constant
    Path(Path),
    TupleStruct {
        path: Path,
        args: Vec<PatId>,
    },
    Record {
        path: Path,
        fields: Vec<(Ident, PatId)>,
    },
    Ref {
        mutable: bool,
        pat: PatId,
    },
    Or(Vec<PatId>),
}

/// Body of a function, const or static
#[derive(Debug, Clone)]
pub struct Body {
    pub exprs: Arena<Expr>,
    pub pats: Arena<Pat>,
    /// Parameter patterns, `self` first for methods
    pub params: Vec<PatId>,
    pub root: ExprId,
}

impl Body {
    /// Visit direct child expressions of `expr`
    pub fn walk_child_exprs(&self, expr: ExprId, mut f: impl FnMut(ExprId)) {
        match &self.exprs[expr].kind {
            ExprKind::Missing
            | ExprKind::Literal(_)
            | ExprKind::Path(_)
            | ExprKind::Continue { .. } => {}
            ExprKind::Block { stmts, tail, .. } => {
                for stmt in stmts {
                    match stmt {
                        Stmt::Let { init, else_branch, .. } => {
                            init.iter().chain(else_branch.iter()).for_each(|e| f(*e));
                        }
                        Stmt::Expr { expr, .. } => f(*expr),
                        Stmt::Item(_) => {}
                    }
                }
                if let Some(tail) = tail {
                    f(*tail);
                }
            }
            ExprKind::Call { callee, args } => {
                f(*callee);
                args.iter().for_each(|a| f(*a));
            }
            ExprKind::MethodCall { receiver, args, .. } => {
                f(*receiver);
                args.iter().for_each(|a| f(*a));
            }
            ExprKind::Field { base, .. } => f(*base),
            ExprKind::Binary { lhs, rhs, .. } | ExprKind::Assign { lhs, rhs, .. } => {
                f(*lhs);
                f(*rhs);
            }
            ExprKind::Unary { expr, .. }
            | ExprKind::Ref { expr, .. }
            | ExprKind::Cast { expr, .. }
            | ExprKind::Let { expr, .. } => f(*expr),
            ExprKind::If { cond, then_branch, else_branch } => {
                f(*cond);
                f(*then_branch);
                if let Some(e) = else_branch {
                    f(*e);
                }
            }
            ExprKind::Match { scrutinee, arms } => {
                f(*scrutinee);
                for arm in arms {
                    if let Some(guard) = arm.guard {
                        f(guard);
                    }
                    f(arm.body);
                }
            }
            ExprKind::Loop { body, .. } => f(*body),
            ExprKind::While { cond, body, .. } => {
                f(*cond);
                f(*body);
            }
            ExprKind::For { iterable, body, .. } => {
                f(*iterable);
                f(*body);
            }
            ExprKind::Break { expr, .. } | ExprKind::Return(expr) => {
                if let Some(e) = expr {
                    f(*e);
                }
            }
            ExprKind::Tuple(exprs) | ExprKind::Array(exprs) => exprs.iter().for_each(|e| f(*e)),
            ExprKind::ArrayRepeat { init, .. } => f(*init),
            ExprKind::Index { base, index } => {
                f(*base);
                f(*index);
            }
            ExprKind::StructLit { fields, spread, .. } => {
                fields.iter().for_each(|fi| f(fi.expr));
                if let Some(s) = spread {
                    f(*s);
                }
            }
            ExprKind::Closure { body, .. } => f(*body),
            ExprKind::MacroCall { expansion, .. } => {
                if let Some(e) = expansion {
                    f(*e);
                }
            }
        }
    }

    /// Visit direct child patterns of `pat`
    pub fn walk_child_pats(&self, pat: PatId, mut f: impl FnMut(PatId)) {
        match &self.pats[pat].kind {
            PatKind::Missing | PatKind::Wild | PatKind::Lit(_) | PatKind::Path(_) => {}
            PatKind::Bind { sub, .. } => {
                if let Some(sub) = sub {
                    f(*sub);
                }
            }
            PatKind::Tuple(pats) | PatKind::Or(pats) | PatKind::TupleStruct { args: pats, .. } => {
                pats.iter().for_each(|p| f(*p))
            }
            PatKind::Record { fields, .. } => fields.iter().for_each(|(_, p)| f(*p)),
            PatKind::Ref { pat, .. } => f(*pat),
        }
    }

    /// Every binding introduced by `pat`, in source order
    pub fn bindings(&self, pat: PatId) -> Vec<(PatId, &Ident)> {
        let mut out = Vec::new();
        self.collect_bindings(pat, &mut out);
        out
    }

    fn collect_bindings<'a>(&'a self, pat: PatId, out: &mut Vec<(PatId, &'a Ident)>) {
        if let PatKind::Bind { name, .. } = &self.pats[pat].kind {
            out.push((pat, name));
        }
        if let PatKind::Or(alternatives) = &self.pats[pat].kind {
            // every alternative binds the same names; the first one is canonical
            if let Some(first) = alternatives.first() {
                self.collect_bindings(*first, out);
            }
            return;
        }
        let mut children = Vec::new();
        self.walk_child_pats(pat, |p| children.push(p));
        for child in children {
            self.collect_bindings(child, out);
        }
    }
}

/// Incremental constructor for bodies, used by tree producers and tests
#[derive(Debug, Default)]
pub struct BodyBuilder {
    exprs: Arena<Expr>,
    pats: Arena<Pat>,
    params: Vec<PatId>,
}

impl BodyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expr(&mut self, kind: ExprKind) -> ExprId {
        self.exprs.alloc(Expr {
            kind,
            span: Span::default(),
        })
    }

    pub fn expr_at(&mut self, kind: ExprKind, span: Span) -> ExprId {
        self.exprs.alloc(Expr { kind, span })
    }

    pub fn pat(&mut self, kind: PatKind) -> PatId {
        self.pats.alloc(Pat {
            kind,
            span: Span::default(),
        })
    }

    pub fn param(&mut self, pat: PatId) {
        self.params.push(pat);
    }

    // === Shorthands ===

    pub fn int(&mut self, value: u128) -> ExprId {
        self.expr(ExprKind::Literal(Literal::Int { value, suffix: None }))
    }

    pub fn path(&mut self, text: &str) -> ExprId {
        self.expr(ExprKind::Path(Path::parse(text)))
    }

    pub fn bind(&mut self, name: &str) -> PatId {
        self.pat(PatKind::Bind {
            name: Ident::synthetic(name),
            mode: BindingMode::default(),
            sub: None,
        })
    }

    pub fn let_stmt(&mut self, name: &str, ty: Option<TypeRef>, init: Option<ExprId>) -> Stmt {
        let pat = self.bind(name);
        Stmt::Let {
            pat,
            ty,
            init,
            else_branch: None,
        }
    }

    pub fn block(&mut self, stmts: Vec<Stmt>, tail: Option<ExprId>) -> ExprId {
        self.expr(ExprKind::Block {
            label: None,
            stmts,
            tail,
            is_unsafe: false,
        })
    }

    pub fn finish(self, root: ExprId) -> Body {
        Body {
            exprs: self.exprs,
            pats: self.pats,
            params: self.params,
            root,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_block_children() {
        let mut b = BodyBuilder::new();
        let one = b.int(1);
        let let_x = b.let_stmt("x", None, Some(one));
        let x = b.path("x");
        let root = b.block(vec![let_x], Some(x));
        let body = b.finish(root);

        let mut seen = Vec::new();
        body.walk_child_exprs(body.root, |e| seen.push(e));
        assert_eq!(seen, vec![one, x]);
    }

    #[test]
    fn test_bindings_in_nested_patterns() {
        let mut b = BodyBuilder::new();
        let a = b.bind("a");
        let c = b.bind("c");
        let tuple = b.pat(PatKind::Tuple(vec![a, c]));
        let root = b.block(Vec::new(), None);
        let body = b.finish(root);

        let names: Vec<_> = body.bindings(tuple).iter().map(|(_, n)| n.name.clone()).collect();
        assert_eq!(names, vec!["a", "c"]);
    }
}
