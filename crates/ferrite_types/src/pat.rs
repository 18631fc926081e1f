//! Pattern inference with match ergonomics.
//!
//! A non-reference pattern matched against a reference peels the reference
//! off and switches the default binding mode to by-reference; the peeled
//! reference types are recorded as pattern adjustments.

use ferrite_ast::{Literal, Path, PatId, PatKind};
use ferrite_hir::{DefId, DefKind, ResolveValueResult, ValueNs};
use ferrite_syntax::Cancelled;

use crate::infer::InferenceContext;
use crate::lower::{TyLowerer, adt_of, impl_self_ty, type_params, value_ty};
use crate::result::{FieldRef, InferenceDiagnostic, NodeId};
use crate::ty::{Subst, Ty};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DefaultBindingMode {
    Move,
    Ref { mutable: bool },
}

impl InferenceContext<'_> {
    /// Check `pat` against a value of type `expected`; returns the type of
    /// the pattern
    pub(crate) fn infer_pat(&mut self, pat: PatId, expected: &Ty) -> Result<Ty, Cancelled> {
        self.infer_pat_with_mode(pat, expected, DefaultBindingMode::Move)
    }

    fn infer_pat_with_mode(
        &mut self,
        pat: PatId,
        expected: &Ty,
        mode: DefaultBindingMode,
    ) -> Result<Ty, Cancelled> {
        self.ctx.cancel.check()?;
        let body = self.body;
        let kind = &body.pats[pat].kind;
        if let PatKind::Bind { name, mode: binding, sub: None } = kind {
            if !binding.by_ref && !binding.mutable {
                if let Some(ty) = self.infer_ident_as_path(pat, &name.name, expected, mode)? {
                    self.write_pat_ty(pat, ty.clone());
                    return Ok(ty);
                }
            }
        }
        let (expected, mode) = if peels_references(kind) {
            self.peel_references(pat, expected, mode)
        } else {
            (self.ctx.shallow(expected), mode)
        };

        let ty = match kind {
            PatKind::Missing | PatKind::Wild => expected.clone(),
            PatKind::Bind { mode: binding, sub, .. } => {
                if let Some(sub) = sub {
                    self.infer_pat_with_mode(*sub, &expected, mode)?;
                }
                match (binding.by_ref, mode) {
                    (true, _) => Ty::reference(expected.clone(), binding.mutable),
                    (false, DefaultBindingMode::Ref { mutable }) if !binding.mutable => {
                        Ty::reference(expected.clone(), mutable)
                    }
                    (false, _) => expected.clone(),
                }
            }
            PatKind::Tuple(elems) => {
                let elem_tys = match &expected {
                    Ty::Tuple(tys) if tys.len() == elems.len() => tys.clone(),
                    _ => {
                        let tys: Vec<Ty> = elems.iter().map(|_| self.ctx.table.new_var()).collect();
                        self.unify_or_report(NodeId::Pat(pat), &expected, &Ty::Tuple(tys.clone()));
                        tys
                    }
                };
                for (elem, ty) in elems.iter().zip(&elem_tys) {
                    self.infer_pat_with_mode(*elem, ty, mode)?;
                }
                Ty::Tuple(elem_tys)
            }
            PatKind::Lit(lit) => {
                let ty = self.literal_ty(lit);
                self.unify_or_report(NodeId::Pat(pat), &expected, &ty);
                ty
            }
            PatKind::Path(path) => match self.resolve_pat_path(pat, path)? {
                Some((_, ty)) => {
                    self.unify_or_report(NodeId::Pat(pat), &expected, &ty);
                    ty
                }
                None => {
                    self.unresolved_pat(pat, path);
                    expected.clone()
                }
            },
            PatKind::TupleStruct { path, args } => match self.resolve_pat_path(pat, path)? {
                Some((def, ty)) => {
                    self.unify_or_report(NodeId::Pat(pat), &expected, &ty);
                    let fields = self.variant_field_types(def, &ty);
                    for (index, arg) in args.iter().enumerate() {
                        let field = fields.get(index).map_or(Ty::Unknown, |(_, ty)| ty.clone());
                        let field = self.ctx.normalize(field);
                        self.infer_pat_with_mode(*arg, &field, mode)?;
                    }
                    ty
                }
                None => {
                    self.unresolved_pat(pat, path);
                    for arg in args {
                        self.infer_pat_with_mode(*arg, &Ty::Unknown, mode)?;
                    }
                    expected.clone()
                }
            },
            PatKind::Record { path, fields } => {
                let at = self.current_expr();
                match self.resolve_struct_path(at, path)? {
                    Some((def, ty)) => {
                        self.result.pat_paths.insert(pat, def);
                        self.unify_or_report(NodeId::Pat(pat), &expected, &ty);
                        let field_tys = self.variant_field_types(def, &ty);
                        for (index, (name, sub)) in fields.iter().enumerate() {
                            let field_ty = match field_tys.iter().position(|(n, _)| *n == name.name) {
                                Some(position) => {
                                    self.result.record_fields.insert(
                                        (NodeId::Pat(pat), index),
                                        FieldRef {
                                            owner: Some(def),
                                            index: position,
                                        },
                                    );
                                    self.ctx.normalize(field_tys[position].1.clone())
                                }
                                None => {
                                    self.push_diagnostic(InferenceDiagnostic::NoSuchField {
                                        node: NodeId::Pat(*sub),
                                        owner: def,
                                        name: name.name.clone(),
                                    });
                                    Ty::Unknown
                                }
                            };
                            self.infer_pat_with_mode(*sub, &field_ty, mode)?;
                        }
                        ty
                    }
                    None => {
                        self.unresolved_pat(pat, path);
                        for (_, sub) in fields {
                            self.infer_pat_with_mode(*sub, &Ty::Unknown, mode)?;
                        }
                        expected.clone()
                    }
                }
            }
            PatKind::Ref { mutable, pat: inner } => {
                let inner_ty = match &expected {
                    Ty::Ref { mutable: m, inner } if m == mutable => inner.as_ref().clone(),
                    _ => {
                        let var = self.ctx.table.new_var();
                        self.unify_or_report(NodeId::Pat(pat), &expected, &Ty::reference(var.clone(), *mutable));
                        var
                    }
                };
                let inner_ty = self.infer_pat_with_mode(*inner, &inner_ty, DefaultBindingMode::Move)?;
                Ty::reference(inner_ty, *mutable)
            }
            PatKind::Or(alternatives) => {
                for alternative in alternatives {
                    self.infer_pat_with_mode(*alternative, &expected, mode)?;
                }
                expected.clone()
            }
        };
        self.write_pat_ty(pat, ty.clone());
        Ok(ty)
    }

    /// Strip references off `expected` for a non-reference pattern
    fn peel_references(
        &mut self,
        pat: PatId,
        expected: &Ty,
        mut mode: DefaultBindingMode,
    ) -> (Ty, DefaultBindingMode) {
        let mut ty = self.ctx.shallow(expected);
        let mut peeled = Vec::new();
        while let Ty::Ref { mutable, inner } = &ty {
            mode = match mode {
                DefaultBindingMode::Ref { mutable: false } => DefaultBindingMode::Ref { mutable: false },
                _ => DefaultBindingMode::Ref { mutable: *mutable },
            };
            peeled.push(ty.clone());
            let inner = inner.as_ref().clone();
            ty = self.ctx.shallow(&inner);
        }
        if !peeled.is_empty() {
            self.result.pat_adjustments.insert(pat, peeled);
        }
        (ty, mode)
    }

    /// Constant, unit or tuple struct, or variant a pattern path names, with
    /// the type of the values it matches
    fn resolve_pat_path(&mut self, pat: PatId, path: &Path) -> Result<Option<(DefId, Ty)>, Cancelled> {
        let hir = self.ctx.hir();
        let resolver = self.resolver_at(self.current_expr());
        let Some(resolution) = resolver.resolve_path_in_value_ns(path)? else {
            return Ok(None);
        };
        let found = match resolution {
            ResolveValueResult::Value(ValueNs::Def(def)) => match hir.def(def).kind() {
                DefKind::Struct | DefKind::Variant => Some((def, self.instantiate_adt(adt_of(hir, def)))),
                DefKind::Const | DefKind::Static => {
                    let ty = value_ty(hir, def);
                    Some((def, self.ctx.normalize(ty)))
                }
                _ => None,
            },
            ResolveValueResult::Value(ValueNs::SelfCtor(imp)) => match impl_self_ty(hir, imp) {
                ty @ Ty::Adt { def, .. } => Some((def, ty)),
                _ => None,
            },
            ResolveValueResult::Value(ValueNs::Local(_)) => None,
            ResolveValueResult::Partial(ns, index) if index + 1 == path.segments.len() => {
                let lowerer = TyLowerer::new(hir, resolver);
                let self_ty = lowerer.lower_type_ns(ns, index.checked_sub(1).map(|i| &path.segments[i]));
                let self_ty = self.insert_vars(self_ty);
                match self.ctx.shallow(&self_ty) {
                    ty @ Ty::Adt { def, .. } if hir.def(def).kind() == DefKind::Enum => hir
                        .child_by_name(def, &path.segments[index].name)
                        .map(|variant| (variant, ty)),
                    _ => None,
                }
            }
            ResolveValueResult::Partial(..) => None,
        };
        if let Some((def, _)) = &found {
            self.result.pat_paths.insert(pat, *def);
        }
        Ok(found)
    }

    /// A bare identifier naming a unit struct, unit variant or constant is a
    /// path pattern, not a binding
    fn infer_ident_as_path(
        &mut self,
        pat: PatId,
        name: &str,
        expected: &Ty,
        mode: DefaultBindingMode,
    ) -> Result<Option<Ty>, Cancelled> {
        let hir = self.ctx.hir();
        let path = Path::ident(name);
        let resolved = self.resolver_at(self.current_expr()).resolve_path_in_value_ns(&path)?;
        let is_constant = match resolved {
            Some(ResolveValueResult::Value(ValueNs::Def(def))) => match hir.def(def).kind() {
                DefKind::Struct | DefKind::Variant => {
                    matches!(hir.def(def).struct_kind(), Some(ferrite_ast::StructKind::Unit))
                }
                DefKind::Const => true,
                _ => false,
            },
            _ => false,
        };
        if !is_constant {
            return Ok(None);
        }
        let (expected, _) = self.peel_references(pat, expected, mode);
        let Some((_, ty)) = self.resolve_pat_path(pat, &path)? else {
            return Ok(None);
        };
        self.unify_or_report(NodeId::Pat(pat), &expected, &ty);
        Ok(Some(ty))
    }

    fn instantiate_adt(&mut self, adt: DefId) -> Ty {
        let hir = self.ctx.hir();
        let subst = self.ctx.instantiate(adt, Subst::new(), &[]);
        Ty::Adt {
            def: adt,
            args: type_params(hir, adt)
                .into_iter()
                .map(|p| subst.get(p).cloned().unwrap_or(Ty::Unknown))
                .collect(),
        }
    }

    fn unresolved_pat(&mut self, pat: PatId, path: &Path) {
        self.push_diagnostic(InferenceDiagnostic::UnresolvedPath {
            node: NodeId::Pat(pat),
            path: path.to_string(),
        });
    }
}

/// Whether a pattern looks through references of the scrutinee
fn peels_references(kind: &PatKind) -> bool {
    match kind {
        PatKind::Tuple(_) | PatKind::Path(_) | PatKind::TupleStruct { .. } | PatKind::Record { .. } => true,
        PatKind::Lit(lit) => !matches!(lit, Literal::Str(_) | Literal::ByteStr(_)),
        _ => false,
    }
}
