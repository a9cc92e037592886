//! Call-site resolution: one invocation to the set of methods it may run.
//!
//! A pure function of the call site and the frozen indices. Receiver types
//! come from the constraint engine; the catalog supplies the members each
//! runtime type sees; overloads are filtered by arity and argument
//! compatibility and then by most-specific formal parameters.

use std::collections::{BTreeSet, HashMap};

use tracing::trace;

use crate::analysis::constraints::{TypeConstraintSet, Value};
use crate::indexer::hierarchy::HierarchyIndex;
use crate::indexer::program::Program;
use crate::models::{DeclarationKind, JType, MethodInfo, Origin, Primitive, Signature, TypeDesc, OBJECT};

/// How the receiver of a call site is known.
#[derive(Clone, Debug)]
pub enum SiteReceiver {
    /// Virtual dispatch over the runtime types in `set`.
    Instance {
        set: TypeConstraintSet,
        static_ty: Option<JType>,
    },
    /// `super.m()` or `Iface.super.m()`: exactly the member `ty` sees.
    Super { ty: JType },
    /// `Type.m()` or an unqualified call from a static context.
    Static { ty: String },
    /// `new T(...)`, `this(...)`, `super(...)`.
    Constructor { ty: String },
}

#[derive(Clone, Debug)]
pub struct CallSite {
    pub caller: Signature,
    pub line: usize,
    pub name: String,
    pub receiver: SiteReceiver,
    pub args: Vec<Value>,
}

/// A resolved callee with the type-variable bindings seen at the site.
#[derive(Clone, Debug)]
pub struct Resolution<'p> {
    pub method: &'p MethodInfo,
    pub bindings: HashMap<String, JType>,
}

/// Every method `site` may invoke, sorted by signature.
pub fn resolve<'p>(program: &'p Program, site: &CallSite) -> Vec<Resolution<'p>> {
    let hierarchy = &program.hierarchy;
    let catalog = &program.catalog;
    let mut found: Vec<Resolution<'p>> = Vec::new();

    match &site.receiver {
        SiteReceiver::Constructor { ty } => match hierarchy.get(ty) {
            // An anonymous class's synthesized constructor forwards its
            // arguments to the superclass constructor.
            Some(node) if node.kind == DeclarationKind::Anonymous => {
                found.extend(catalog.constructors(ty).iter().map(|method| Resolution {
                    method,
                    bindings: HashMap::new(),
                }));
                if let (Some(sup), true) = (&node.superclass, node.interfaces.is_empty()) {
                    let view = JType::with_args(
                        TypeDesc::reference(sup.as_str()),
                        node.super_args.get(sup).cloned().unwrap_or_default(),
                    );
                    let candidates: Vec<&MethodInfo> = catalog.constructors(sup).iter().collect();
                    found.extend(select(hierarchy, &candidates, &site.args, &view));
                }
            }
            _ => {
                let view = JType::reference(ty.as_str());
                let candidates: Vec<&MethodInfo> = catalog.constructors(ty).iter().collect();
                found.extend(select(hierarchy, &candidates, &site.args, &view));
            }
        },
        SiteReceiver::Super { ty } => {
            if let Some(name) = ty.reference_name() {
                let candidates: Vec<&MethodInfo> = catalog.methods_named(name, &site.name).collect();
                found.extend(select(hierarchy, &candidates, &site.args, ty));
            }
        }
        SiteReceiver::Static { ty } => {
            let view = JType::reference(ty.as_str());
            let candidates: Vec<&MethodInfo> = catalog.methods_named(ty, &site.name).collect();
            found.extend(select(hierarchy, &candidates, &site.args, &view));
        }
        SiteReceiver::Instance { set, static_ty } => {
            let Some(types) = receiver_types(hierarchy, set, static_ty.as_ref()) else {
                return Vec::new();
            };
            for runtime in &types {
                let mut candidates: Vec<&MethodInfo> = catalog.methods_named(runtime, &site.name).collect();
                if candidates.is_empty() && hierarchy.get(runtime).is_some_and(|n| n.is_interface()) {
                    candidates = catalog.methods_named(OBJECT, &site.name).collect();
                }
                let view = static_ty.clone().unwrap_or_else(|| JType::reference(runtime.as_str()));
                found.extend(select(hierarchy, &candidates, &site.args, &view));
            }
            if set.is_unresolved() || set.is_empty() {
                expand_overrides(program, &mut found);
            }
        }
    }

    let resolved = finish(found);
    trace!(
        caller = %site.caller,
        line = site.line,
        name = %site.name,
        callees = resolved.len(),
        "call site resolved"
    );
    resolved
}

/// Targets of a method reference: every method named `name` on the
/// receiver, whatever its arity.
pub fn resolve_reference<'p>(program: &'p Program, receiver: &SiteReceiver, name: &str) -> Vec<Resolution<'p>> {
    let hierarchy = &program.hierarchy;
    let catalog = &program.catalog;
    let unbound = |method: &'p MethodInfo| Resolution {
        method,
        bindings: HashMap::new(),
    };
    let mut found: Vec<Resolution<'p>> = Vec::new();
    match receiver {
        SiteReceiver::Constructor { ty } => found.extend(catalog.constructors(ty).iter().map(unbound)),
        SiteReceiver::Static { ty } => found.extend(catalog.methods_named(ty, name).map(unbound)),
        SiteReceiver::Super { ty } => {
            if let Some(ty) = ty.reference_name() {
                found.extend(catalog.methods_named(ty, name).map(unbound));
            }
        }
        SiteReceiver::Instance { set, static_ty } => {
            let Some(types) = receiver_types(hierarchy, set, static_ty.as_ref()) else {
                return Vec::new();
            };
            for runtime in &types {
                found.extend(catalog.methods_named(runtime, name).map(unbound));
            }
            if set.is_unresolved() || set.is_empty() {
                expand_overrides(program, &mut found);
            }
        }
    }
    finish(found)
}

/// Runtime types to dispatch over. `None` when the receiver is known to be
/// empty (`null`).
fn receiver_types(
    hierarchy: &HierarchyIndex,
    set: &TypeConstraintSet,
    static_ty: Option<&JType>,
) -> Option<BTreeSet<String>> {
    if !set.is_empty() {
        return Some(set.types().clone());
    }
    if !set.is_unresolved() {
        return None;
    }
    static_ty
        .and_then(JType::reference_name)
        .map(|name| hierarchy.cha(name))
}

/// Add every override of each dispatched callee along its declaring type's
/// subtypes.
fn expand_overrides<'p>(program: &'p Program, found: &mut Vec<Resolution<'p>>) {
    let mut extra: Vec<Resolution<'p>> = Vec::new();
    for resolution in found.iter().filter(|r| r.method.is_dispatched()) {
        for method in program.catalog.overriders(&program.hierarchy, resolution.method) {
            extra.push(Resolution {
                method,
                bindings: resolution.bindings.clone(),
            });
        }
    }
    found.extend(extra);
}

/// Drop abstract declarations shadowed by a concrete callee, then sort and
/// deduplicate.
fn finish(mut found: Vec<Resolution<'_>>) -> Vec<Resolution<'_>> {
    if found.iter().any(|r| !r.method.is_abstract) {
        found.retain(|r| !r.method.is_abstract);
    }
    found.sort_by(|a, b| a.method.signature.cmp(&b.method.signature));
    found.dedup_by(|a, b| a.method.signature == b.method.signature);
    found
}

/// Applicable candidates, reduced to the most specific ones.
fn select<'p>(
    hierarchy: &HierarchyIndex,
    candidates: &[&'p MethodInfo],
    args: &[Value],
    view: &JType,
) -> Vec<Resolution<'p>> {
    let applicable: Vec<Resolution<'p>> = candidates
        .iter()
        .filter(|m| arity_matches(m, args.len()))
        .filter_map(|m| {
            let bindings = hierarchy.type_args_for(view, m.declaring());
            applicable(hierarchy, m, args, &bindings).then(|| Resolution { method: *m, bindings })
        })
        .collect();

    let chosen: Vec<Resolution<'p>> = applicable
        .iter()
        .filter(|a| {
            !applicable.iter().any(|b| {
                b.method.signature != a.method.signature
                    && more_specific(hierarchy, b.method, a.method)
                    && !more_specific(hierarchy, a.method, b.method)
            })
        })
        .cloned()
        .collect();

    chosen
        .into_iter()
        .map(|mut r| {
            infer_method_type_args(r.method, args, &mut r.bindings);
            r
        })
        .collect()
}

fn arity_matches(method: &MethodInfo, count: usize) -> bool {
    let arity = method.arity();
    if method.is_varargs {
        count + 1 >= arity
    } else {
        count == arity
    }
}

fn applicable(
    hierarchy: &HierarchyIndex,
    method: &MethodInfo,
    args: &[Value],
    bindings: &HashMap<String, JType>,
) -> bool {
    let params = &method.generic_params;
    let last = params.len().saturating_sub(1);
    args.iter().enumerate().all(|(i, arg)| {
        if method.is_varargs && i >= last {
            let Some(array) = params.last() else {
                return false;
            };
            let array = array.substitute(bindings);
            let direct = args.len() == params.len() && value_assignable(hierarchy, arg, &array.desc);
            let spread = array
                .element()
                .is_some_and(|e| value_assignable(hierarchy, arg, &e.desc));
            direct || spread
        } else {
            params
                .get(i)
                .is_some_and(|p| value_assignable(hierarchy, arg, &p.substitute(bindings).desc))
        }
    })
}

/// Unknown arguments (lambdas, `null`, failed lookups) match anything.
fn value_assignable(hierarchy: &HierarchyIndex, arg: &Value, param: &TypeDesc) -> bool {
    match &arg.ty {
        Some(ty) => assignable(hierarchy, &ty.desc, param),
        None => true,
    }
}

/// Method invocation conversion: identity, widening, boxing, unboxing.
pub fn assignable(hierarchy: &HierarchyIndex, from: &TypeDesc, to: &TypeDesc) -> bool {
    match (from, to) {
        (TypeDesc::TypeVar(_), _) | (_, TypeDesc::TypeVar(_)) => true,
        (TypeDesc::Primitive(a), TypeDesc::Primitive(b)) => a.widens_to(*b),
        (TypeDesc::Primitive(a), TypeDesc::Reference(r)) => {
            a.boxed().is_some_and(|boxed| hierarchy.is_subtype(boxed, r))
        }
        (TypeDesc::Reference(r), TypeDesc::Primitive(b)) => {
            Primitive::unboxed(r).is_some_and(|a| a.widens_to(*b))
        }
        (TypeDesc::Reference(a), TypeDesc::Reference(b)) => {
            hierarchy.is_subtype(a, b) || is_opaque(hierarchy, a) || is_opaque(hierarchy, b)
        }
        (TypeDesc::Array(_), TypeDesc::Reference(r)) => {
            r == OBJECT || r == "java.lang.Cloneable" || r == "java.io.Serializable"
        }
        (TypeDesc::Array(x), TypeDesc::Array(y)) => match (&**x, &**y) {
            (TypeDesc::Primitive(p), TypeDesc::Primitive(q)) => p == q,
            (x, y) => assignable(hierarchy, x, y),
        },
        _ => false,
    }
}

/// Types with no known hierarchy cannot rule a candidate out.
fn is_opaque(hierarchy: &HierarchyIndex, name: &str) -> bool {
    !hierarchy.get(name).is_some_and(|n| n.origin != Origin::Dangling)
}

/// `a` is at least as specific as `b` at every parameter position.
fn more_specific(hierarchy: &HierarchyIndex, a: &MethodInfo, b: &MethodInfo) -> bool {
    let pa = a.signature.params();
    let pb = b.signature.params();
    pa.len() == pb.len() && pa.iter().zip(pb).all(|(x, y)| assignable(hierarchy, x, y))
}

/// Bind the method's own type parameters from argument static types.
fn infer_method_type_args(method: &MethodInfo, args: &[Value], bindings: &mut HashMap<String, JType>) {
    if method.type_params.is_empty() {
        return;
    }
    let vars: Vec<&str> = method.type_params.iter().map(|p| p.name.as_str()).collect();
    for (param, arg) in method.generic_params.iter().zip(args) {
        if let Some(actual) = &arg.ty {
            unify(param, actual, &vars, bindings);
        }
    }
}

fn unify(pattern: &JType, actual: &JType, vars: &[&str], bindings: &mut HashMap<String, JType>) {
    match &pattern.desc {
        TypeDesc::TypeVar(name) if vars.contains(&name.as_str()) => {
            let bound = match &actual.desc {
                TypeDesc::Primitive(p) => match p.boxed() {
                    Some(boxed) => JType::reference(boxed),
                    None => return,
                },
                _ => actual.clone(),
            };
            bindings.entry(name.clone()).or_insert(bound);
        }
        TypeDesc::Array(_) => {
            if let (Some(p), Some(a)) = (pattern.element(), actual.element()) {
                unify(&p, &a, vars, bindings);
            }
        }
        _ => {
            if pattern.args.len() == actual.args.len() {
                for (p, a) in pattern.args.iter().zip(&actual.args) {
                    unify(p, a, vars, bindings);
                }
            }
        }
    }
}
