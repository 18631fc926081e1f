//! Lexical scopes of a body.
//!
//! Every `let` opens a new scope for the statements after it, so an
//! initializer never sees the binding it introduces:
//! `let x = 1; let x = x + 1;` reads the first `x`.

use ferrite_ast::{Body, ExprId, ExprKind, Label, PatId, Stmt};
use la_arena::{Arena, Idx};
use rustc_hash::FxHashMap;

pub type ScopeId = Idx<ScopeData>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeEntry {
    pub name: String,
    pub pat: PatId,
}

#[derive(Debug, Default)]
pub struct ScopeData {
    pub parent: Option<ScopeId>,
    /// Bindings in source order
    pub entries: Vec<ScopeEntry>,
    /// Label and the expression it names
    pub label: Option<(String, ExprId)>,
    /// Block expression whose items live in this scope
    pub block: Option<ExprId>,
    /// Labels do not cross closure boundaries
    pub closure: bool,
}

#[derive(Debug)]
pub struct ExprScopes {
    scopes: Arena<ScopeData>,
    scope_by_expr: FxHashMap<ExprId, ScopeId>,
    /// Index of the statement holding an expression in its innermost block;
    /// a block tail counts as one past the last statement
    stmt_by_expr: FxHashMap<ExprId, u32>,
    /// Statement being walked while the scopes are built
    current_stmt: u32,
    root: ScopeId,
}

impl ExprScopes {
    pub fn new(body: &Body) -> ExprScopes {
        let mut arena = Arena::new();
        let root = arena.alloc(ScopeData::default());
        let mut scopes = ExprScopes {
            scopes: arena,
            scope_by_expr: FxHashMap::default(),
            stmt_by_expr: FxHashMap::default(),
            current_stmt: 0,
            root,
        };
        for param in &body.params {
            scopes.add_bindings(body, root, *param);
        }
        scopes.compute_expr(body, body.root, root);
        scopes
    }

    pub fn root(&self) -> ScopeId {
        self.root
    }

    pub fn scope(&self, id: ScopeId) -> &ScopeData {
        &self.scopes[id]
    }

    /// Scope an expression is evaluated in
    pub fn scope_for(&self, expr: ExprId) -> Option<ScopeId> {
        self.scope_by_expr.get(&expr).copied()
    }

    /// `scope` and its parents, innermost first
    pub fn scope_chain(&self, scope: Option<ScopeId>) -> impl Iterator<Item = ScopeId> + '_ {
        std::iter::successors(scope, move |s| self.scopes[*s].parent)
    }

    /// Binding `name` visible at `expr`
    pub fn resolve_local(&self, expr: ExprId, name: &str) -> Option<PatId> {
        self.scope_chain(self.scope_for(expr)).find_map(|s| {
            self.scopes[s]
                .entries
                .iter()
                .rev()
                .find(|e| e.name == name)
                .map(|e| e.pat)
        })
    }

    /// Blocks around `expr`, innermost first, each paired with the index of
    /// the statement that leads to `expr`
    pub fn enclosing_blocks(&self, expr: ExprId) -> Vec<(ExprId, u32)> {
        let mut blocks = Vec::new();
        let mut inner = expr;
        for s in self.scope_chain(self.scope_for(expr)) {
            if let Some(block) = self.scopes[s].block {
                blocks.push((block, self.stmt_by_expr.get(&inner).copied().unwrap_or(0)));
                inner = block;
            }
        }
        blocks
    }

    /// Loop or block carrying `label`, searched outward from `expr`
    pub fn resolve_label(&self, expr: ExprId, label: &str) -> Option<ExprId> {
        for s in self.scope_chain(self.scope_for(expr)) {
            let data = &self.scopes[s];
            if let Some((name, target)) = &data.label {
                if name == label {
                    return Some(*target);
                }
            }
            if data.closure {
                break;
            }
        }
        None
    }

    fn alloc(&mut self, parent: Option<ScopeId>) -> ScopeId {
        self.scopes.alloc(ScopeData {
            parent,
            ..ScopeData::default()
        })
    }

    fn labeled(&mut self, parent: ScopeId, label: &Option<Label>, target: ExprId) -> ScopeId {
        let scope = self.alloc(Some(parent));
        self.scopes[scope].label = label.as_ref().map(|l| (l.name.clone(), target));
        scope
    }

    fn add_bindings(&mut self, body: &Body, scope: ScopeId, pat: PatId) {
        for (pat, name) in body.bindings(pat) {
            self.scopes[scope].entries.push(ScopeEntry {
                name: name.name.clone(),
                pat,
            });
        }
    }

    fn compute_expr(&mut self, body: &Body, expr: ExprId, scope: ScopeId) {
        self.scope_by_expr.insert(expr, scope);
        self.stmt_by_expr.insert(expr, self.current_stmt);
        match &body.exprs[expr].kind {
            ExprKind::Block { label, stmts, tail, .. } => {
                let outer_stmt = self.current_stmt;
                let mut scope = self.labeled(scope, label, expr);
                self.scopes[scope].block = Some(expr);
                for (index, stmt) in stmts.iter().enumerate() {
                    self.current_stmt = index as u32;
                    match stmt {
                        Stmt::Let {
                            pat,
                            init,
                            else_branch,
                            ..
                        } => {
                            if let Some(init) = init {
                                self.compute_expr(body, *init, scope);
                            }
                            if let Some(else_branch) = else_branch {
                                self.compute_expr(body, *else_branch, scope);
                            }
                            scope = self.alloc(Some(scope));
                            self.add_bindings(body, scope, *pat);
                        }
                        Stmt::Expr { expr, .. } => self.compute_expr(body, *expr, scope),
                        Stmt::Item(_) => {}
                    }
                }
                if let Some(tail) = tail {
                    self.current_stmt = stmts.len() as u32;
                    self.compute_expr(body, *tail, scope);
                }
                self.current_stmt = outer_stmt;
            }
            ExprKind::Closure { params, body: inner, .. } => {
                let closure = self.alloc(Some(scope));
                self.scopes[closure].closure = true;
                for (pat, _) in params {
                    self.add_bindings(body, closure, *pat);
                }
                self.compute_expr(body, *inner, closure);
            }
            ExprKind::Match { scrutinee, arms } => {
                self.compute_expr(body, *scrutinee, scope);
                for arm in arms {
                    let arm_scope = self.alloc(Some(scope));
                    self.add_bindings(body, arm_scope, arm.pat);
                    if let Some(guard) = arm.guard {
                        // `if let` guards bind into the arm
                        let guard_scope = self.compute_cond(body, guard, arm_scope);
                        self.compute_expr(body, arm.body, guard_scope);
                    } else {
                        self.compute_expr(body, arm.body, arm_scope);
                    }
                }
            }
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let then_scope = self.compute_cond(body, *cond, scope);
                self.compute_expr(body, *then_branch, then_scope);
                if let Some(else_branch) = else_branch {
                    self.compute_expr(body, *else_branch, scope);
                }
            }
            ExprKind::While { label, cond, body: inner } => {
                let loop_scope = self.labeled(scope, label, expr);
                let body_scope = self.compute_cond(body, *cond, loop_scope);
                self.compute_expr(body, *inner, body_scope);
            }
            ExprKind::Loop { label, body: inner } => {
                let loop_scope = self.labeled(scope, label, expr);
                self.compute_expr(body, *inner, loop_scope);
            }
            ExprKind::For {
                label,
                pat,
                iterable,
                body: inner,
            } => {
                self.compute_expr(body, *iterable, scope);
                let loop_scope = self.labeled(scope, label, expr);
                self.add_bindings(body, loop_scope, *pat);
                self.compute_expr(body, *inner, loop_scope);
            }
            _ => {
                let mut children = Vec::new();
                body.walk_child_exprs(expr, |child| children.push(child));
                for child in children {
                    self.compute_expr(body, child, scope);
                }
            }
        }
    }

    /// Conditions of `if`/`while`. A `let` evaluates its scrutinee in the
    /// enclosing scope and binds into a fresh child scope, which later
    /// conditions of the chain and the branch taken run in. Returns that
    /// innermost scope.
    fn compute_cond(&mut self, body: &Body, cond: ExprId, scope: ScopeId) -> ScopeId {
        self.scope_by_expr.insert(cond, scope);
        self.stmt_by_expr.insert(cond, self.current_stmt);
        match &body.exprs[cond].kind {
            ExprKind::Let { pat, expr } => {
                self.compute_expr(body, *expr, scope);
                let bound = self.alloc(Some(scope));
                self.add_bindings(body, bound, *pat);
                bound
            }
            ExprKind::Binary {
                lhs,
                op: ferrite_ast::BinaryOp::Logic(ferrite_ast::LogicOp::And),
                rhs,
            } => {
                let after_lhs = self.compute_cond(body, *lhs, scope);
                self.compute_cond(body, *rhs, after_lhs)
            }
            _ => {
                self.compute_expr(body, cond, scope);
                scope
            }
        }
    }
}
