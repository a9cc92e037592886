//! Type constraint inference.
//!
//! Every expression evaluates to a [`Value`]: its static type plus the set
//! of concrete types it may hold at runtime. Propagation is
//! flow-insensitive. Assignments union into their target, and each body is
//! re-walked until its locals stop growing.
//!
//! Cross-body facts (what a method returns, what a field was ever assigned)
//! come from memoized [`BodySummary`] values computed on demand. A body that
//! is still being summarized when it is needed again falls back to class
//! hierarchy analysis of the declared type, as does one nested deeper than
//! [`MAX_SUMMARY_DEPTH`].

use std::collections::{BTreeSet, HashMap, HashSet};
use std::rc::Rc;

use tracing::{debug, trace};

use crate::analysis::resolver::{self, CallSite, Resolution, SiteReceiver};
use crate::indexer::binding::lexical_chain;
use crate::indexer::hierarchy::HierarchyIndex;
use crate::indexer::program::{BodyKind, DeclRef, Program};
use crate::indexer::syntax::{
    CtorCall, CtorTarget, Expr, Literal, MethodDeclKind, Param, Receiver, Stmt, TypeDecl, TypeRef,
};
use crate::models::{
    DeclarationKind, FieldInfo, JType, MethodInfo, Primitive, Signature, TypeDesc, CLASS, STRING,
};

/// Upper bound on re-walks of one body while its locals keep growing.
const MAX_PASSES: usize = 8;

/// Upper bound on nested on-demand summaries. Deeper callees fall back to
/// the declared type so long call chains cannot exhaust a worker stack.
pub const MAX_SUMMARY_DEPTH: usize = 32;

/// Concrete runtime types a program point may hold.
///
/// An `unresolved` set over-approximates from a declared static type
/// instead of tracking allocations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TypeConstraintSet {
    types: BTreeSet<String>,
    unresolved: bool,
}

impl TypeConstraintSet {
    pub fn empty() -> Self {
        TypeConstraintSet::default()
    }

    /// Nothing is known; callers fall back to the static type.
    pub fn unknown() -> Self {
        TypeConstraintSet {
            types: BTreeSet::new(),
            unresolved: true,
        }
    }

    pub fn exact(name: impl Into<String>) -> Self {
        TypeConstraintSet {
            types: BTreeSet::from([name.into()]),
            unresolved: false,
        }
    }

    /// `name` and every transitive subtype.
    pub fn cha(hierarchy: &HierarchyIndex, name: &str) -> Self {
        TypeConstraintSet {
            types: hierarchy.cha(name),
            unresolved: true,
        }
    }

    pub fn from_types(types: BTreeSet<String>, unresolved: bool) -> Self {
        TypeConstraintSet { types, unresolved }
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn is_unresolved(&self) -> bool {
        self.unresolved
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn types(&self) -> &BTreeSet<String> {
        &self.types
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.types.iter().map(String::as_str)
    }

    /// Returns whether anything was added.
    pub fn union_with(&mut self, other: &TypeConstraintSet) -> bool {
        let before = (self.types.len(), self.unresolved);
        self.types.extend(other.types.iter().cloned());
        self.unresolved |= other.unresolved;
        before != (self.types.len(), self.unresolved)
    }
}

/// What an expression names.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ValueKind {
    #[default]
    Instance,
    /// A type used as a qualifier (`Math.max`, `Outer.Inner`).
    Type(String),
    /// A package prefix of a qualified name.
    Package(String),
}

#[derive(Clone, Debug, Default)]
pub struct Value {
    /// `None` when the static type is unknown (lambdas, `null`, failed
    /// lookups).
    pub ty: Option<JType>,
    pub set: TypeConstraintSet,
    pub kind: ValueKind,
}

impl Value {
    pub fn unknown() -> Self {
        Value {
            ty: None,
            set: TypeConstraintSet::unknown(),
            kind: ValueKind::Instance,
        }
    }

    pub fn null() -> Self {
        Value::default()
    }

    pub fn instance(ty: JType, set: TypeConstraintSet) -> Self {
        Value {
            ty: Some(ty),
            set,
            kind: ValueKind::Instance,
        }
    }

    pub fn primitive(primitive: Primitive) -> Self {
        Value::instance(JType::new(TypeDesc::Primitive(primitive)), TypeConstraintSet::empty())
    }

    fn type_name(name: String) -> Self {
        Value {
            ty: Some(JType::reference(name.clone())),
            set: TypeConstraintSet::empty(),
            kind: ValueKind::Type(name),
        }
    }

    fn package(name: String) -> Self {
        Value {
            ty: None,
            set: TypeConstraintSet::empty(),
            kind: ValueKind::Package(name),
        }
    }

    fn primitive_type(&self) -> Option<Primitive> {
        match &self.ty.as_ref()?.desc {
            TypeDesc::Primitive(p) => Some(*p),
            TypeDesc::Reference(name) => Primitive::unboxed(name),
            _ => None,
        }
    }

    fn is_string(&self) -> bool {
        self.ty.as_ref().and_then(JType::reference_name) == Some(STRING)
    }
}

/// Facts about one body, reused by every caller that needs them.
#[derive(Debug, Default)]
pub struct BodySummary {
    /// Union of the body's own `return` values; lambda returns excluded.
    pub returns: TypeConstraintSet,
    /// Keyed by (declaring type, field name).
    pub field_writes: HashMap<(String, String), TypeConstraintSet>,
    pub callees: BTreeSet<Signature>,
}

/// Per-worker inference state over a frozen [`Program`].
pub struct ConstraintEngine<'p> {
    program: &'p Program,
    summaries: HashMap<Signature, Rc<BodySummary>>,
    in_progress: HashSet<Signature>,
    fields: HashMap<(String, String), Option<TypeConstraintSet>>,
    fields_in_progress: HashSet<(String, String)>,
    depth: usize,
}

impl<'p> ConstraintEngine<'p> {
    pub fn new(program: &'p Program) -> Self {
        ConstraintEngine {
            program,
            summaries: HashMap::new(),
            in_progress: HashSet::new(),
            fields: HashMap::new(),
            fields_in_progress: HashSet::new(),
            depth: 0,
        }
    }

    pub fn program(&self) -> &'p Program {
        self.program
    }

    /// Every callee reached from the body implementing `signature`. The body
    /// is walked afresh so the result does not depend on summary order.
    pub fn callees_of(&mut self, signature: &Signature) -> BTreeSet<Signature> {
        self.walk_body(signature).map(|s| s.callees).unwrap_or_default()
    }

    /// Memoized summary of a source body. `None` for library methods,
    /// abstract declarations, bodies already being summarized, and requests
    /// nested past [`MAX_SUMMARY_DEPTH`].
    pub fn summary(&mut self, signature: &Signature) -> Option<Rc<BodySummary>> {
        if let Some(summary) = self.summaries.get(signature) {
            return Some(Rc::clone(summary));
        }
        if self.depth >= MAX_SUMMARY_DEPTH {
            trace!(body = %signature, "summary depth limit reached");
            return None;
        }
        if !self.in_progress.insert(signature.clone()) {
            return None;
        }
        self.depth += 1;
        let walked = self.walk_body(signature);
        self.depth -= 1;
        self.in_progress.remove(signature);
        let summary = Rc::new(walked?);
        self.summaries.insert(signature.clone(), Rc::clone(&summary));
        Some(summary)
    }

    /// Return constraint of `method` when its body pins it down to concrete
    /// allocations.
    pub fn return_set(&mut self, method: &MethodInfo) -> Option<TypeConstraintSet> {
        let summary = self.summary(&method.signature)?;
        (!summary.returns.is_unresolved() && !summary.returns.is_empty()).then(|| summary.returns.clone())
    }

    /// Union of every value written to `declaring.name` by bodies of the
    /// declaring type and its source subtypes. `None` when nothing writes
    /// it, or when it is being computed further up the stack.
    pub fn field_set(&mut self, declaring: &str, name: &str) -> Option<TypeConstraintSet> {
        let key = (declaring.to_string(), name.to_string());
        if let Some(cached) = self.fields.get(&key) {
            return cached.clone();
        }
        if !self.fields_in_progress.insert(key.clone()) {
            return None;
        }

        let program = self.program;
        let mut owners = vec![declaring.to_string()];
        owners.extend(program.hierarchy.descendants(declaring).iter().cloned());

        let mut acc = TypeConstraintSet::empty();
        let mut written = false;
        let mut partial = false;
        for owner in owners.iter().filter(|o| program.decl_ref(o).is_some()) {
            for signature in program.type_bodies(owner) {
                match self.summary(signature) {
                    Some(summary) => {
                        if let Some(set) = summary.field_writes.get(&key) {
                            acc.union_with(set);
                            written = true;
                        }
                    }
                    None => partial = true,
                }
            }
        }
        self.fields_in_progress.remove(&key);

        if partial {
            acc.unresolved = true;
            return Some(acc);
        }
        let result = written.then_some(acc);
        self.fields.insert(key, result.clone());
        result
    }

    fn walk_body(&mut self, signature: &Signature) -> Option<BodySummary> {
        let program = self.program;
        let (decl_ref, kind) = program.body_of(signature)?;
        let decl = program.decl(decl_ref);
        let mut vars = program.type_vars(&decl.name);

        let summary = match kind {
            BodyKind::Declared(index) => {
                let method = decl.methods.get(index)?;
                let body = method.body.as_deref()?;
                vars.extend(method.type_params.iter().map(|p| p.name.clone()));
                let mut walker = Walker::new(self, decl_ref, signature, vars, method.modifiers.is_static);
                for param in &method.params {
                    walker.declare_param(param);
                }
                match method.kind {
                    MethodDeclKind::Constructor => walker.constructor(decl, body),
                    MethodDeclKind::Method => walker.fixed_point(|w| w.stmts(body)),
                }
                walker.finish()
            }
            BodyKind::DefaultConstructor => {
                let mut walker = Walker::new(self, decl_ref, signature, vars, false);
                walker.constructor(decl, &[]);
                walker.finish()
            }
            BodyKind::StaticInit => {
                let mut walker = Walker::new(self, decl_ref, signature, vars, true);
                walker.fixed_point(|w| w.class_init(decl));
                walker.finish()
            }
        };
        trace!(
            body = %signature,
            callees = summary.callees.len(),
            fields_written = summary.field_writes.len(),
            "body analyzed"
        );
        Some(summary)
    }
}

#[derive(Debug)]
struct Local {
    ty: Option<JType>,
    set: TypeConstraintSet,
    assigned: bool,
}

/// Walks one body against the engine.
struct Walker<'e, 'p> {
    engine: &'e mut ConstraintEngine<'p>,
    program: &'p Program,
    unit: usize,
    current: String,
    caller: Signature,
    vars: Vec<String>,
    is_static: bool,
    locals: HashMap<String, Local>,
    lambda_depth: usize,
    changed: bool,
    summary: BodySummary,
}

impl<'e, 'p> Walker<'e, 'p> {
    fn new(
        engine: &'e mut ConstraintEngine<'p>,
        decl_ref: DeclRef,
        caller: &Signature,
        vars: Vec<String>,
        is_static: bool,
    ) -> Self {
        let program = engine.program;
        Walker {
            engine,
            program,
            unit: decl_ref.unit,
            current: program.decl(decl_ref).name.clone(),
            caller: caller.clone(),
            vars,
            is_static,
            locals: HashMap::new(),
            lambda_depth: 0,
            changed: false,
            summary: BodySummary::default(),
        }
    }

    fn finish(self) -> BodySummary {
        self.summary
    }

    fn fixed_point(&mut self, mut step: impl FnMut(&mut Self)) {
        for _ in 0..MAX_PASSES {
            self.changed = false;
            step(self);
            if !self.changed {
                return;
            }
        }
        // Still growing: widen every local to its declared type and settle
        // the callees, returns and field writes with one more pass.
        debug!(body = %self.caller, "pass limit reached, widening locals");
        for local in self.locals.values_mut() {
            local.assigned = true;
            local.set.unresolved = true;
        }
        self.changed = false;
        step(self);
    }

    // -- scopes --------------------------------------------------------------

    fn bind(&self, ty: &TypeRef) -> JType {
        self.program.bind(self.unit, ty, &self.current, &self.vars)
    }

    fn cha_of(&self, ty: &JType) -> TypeConstraintSet {
        match &ty.desc {
            TypeDesc::Reference(name) => TypeConstraintSet::cha(&self.program.hierarchy, name),
            TypeDesc::Primitive(_) => TypeConstraintSet::empty(),
            TypeDesc::Array(_) | TypeDesc::TypeVar(_) => TypeConstraintSet::unknown(),
        }
    }

    fn this_set(&self, owner: &str) -> TypeConstraintSet {
        match self.program.hierarchy.get(owner) {
            Some(node) if node.kind == DeclarationKind::Anonymous => TypeConstraintSet::exact(owner),
            _ => TypeConstraintSet::cha(&self.program.hierarchy, owner),
        }
    }

    fn this_value(&self, owner: &str) -> Value {
        Value::instance(JType::reference(owner), self.this_set(owner))
    }

    /// `ty` as a supertype of `sub`, with the type arguments `sub` passes.
    fn super_view(&self, sub: &str, sup: &str) -> JType {
        let args = self
            .program
            .hierarchy
            .get(sub)
            .and_then(|n| n.super_args.get(sup))
            .cloned()
            .unwrap_or_default();
        JType::with_args(TypeDesc::reference(sup), args)
    }

    fn declare_param(&mut self, param: &Param) {
        let (ty, set) = if param.ty.is_inferred() {
            (None, TypeConstraintSet::unknown())
        } else {
            let ty = self.bind(&param.ty);
            let set = self.cha_of(&ty);
            (Some(ty), set)
        };
        self.locals.entry(param.name.clone()).or_insert(Local {
            ty,
            set,
            assigned: true,
        });
    }

    fn declare_local(&mut self, name: &str, ty: Option<JType>) {
        if !self.locals.contains_key(name) {
            self.locals.insert(
                name.to_string(),
                Local {
                    ty,
                    set: TypeConstraintSet::empty(),
                    assigned: false,
                },
            );
        }
    }

    fn assign_local(&mut self, name: &str, set: &TypeConstraintSet) -> bool {
        let Some(local) = self.locals.get_mut(name) else {
            return false;
        };
        if !local.assigned {
            local.assigned = true;
            self.changed = true;
        }
        if local.set.union_with(set) {
            self.changed = true;
        }
        true
    }

    fn local_value(&self, name: &str) -> Option<Value> {
        let local = self.locals.get(name)?;
        let mut set = local.set.clone();
        if !local.assigned || set.is_unresolved() {
            if let Some(ty) = &local.ty {
                set.union_with(&self.cha_of(ty));
            }
        }
        Some(Value {
            ty: local.ty.clone(),
            set,
            kind: ValueKind::Instance,
        })
    }

    /// A field visible without a qualifier: declared or inherited by a
    /// lexically enclosing type, or statically imported.
    fn implicit_field(&self, name: &str) -> Option<&'p FieldInfo> {
        let program = self.program;
        for owner in lexical_chain(&self.current) {
            if let Some(field) = program.catalog.field(owner, name) {
                return Some(field);
            }
        }
        let scope = &program.units[self.unit].scope;
        scope
            .static_import_owners(&program.names, name)
            .iter()
            .find_map(|owner| program.catalog.field(owner, name))
    }

    fn member_field(&self, receiver: &Value, name: &str) -> Option<&'p FieldInfo> {
        let program = self.program;
        let catalog = &program.catalog;
        match &receiver.kind {
            ValueKind::Type(ty) => catalog.field(ty, name),
            ValueKind::Package(_) => None,
            ValueKind::Instance => match receiver.ty.as_ref().and_then(JType::reference_name) {
                Some(ty) => catalog.field(ty, name),
                None => receiver.set.iter().find_map(|t| catalog.field(t, name)),
            },
        }
    }

    fn field_value(&mut self, field: &FieldInfo, receiver: Option<&JType>) -> Value {
        let ty = match receiver {
            Some(r) => field
                .ty
                .substitute(&self.program.hierarchy.type_args_for(r, &field.declaring)),
            None => field.ty.clone(),
        };
        let set = match self.engine.field_set(&field.declaring, &field.name) {
            Some(set) if !set.is_unresolved() => set,
            Some(mut set) => {
                set.union_with(&self.cha_of(&ty));
                set
            }
            None => self.cha_of(&ty),
        };
        Value::instance(ty, set)
    }

    fn write_field(&mut self, field: &FieldInfo, value: &Value) {
        self.summary
            .field_writes
            .entry((field.declaring.clone(), field.name.clone()))
            .or_default()
            .union_with(&value.set);
    }

    // -- declarations --------------------------------------------------------

    /// Constructor order: explicit or implicit `super(...)` / `this(...)`,
    /// then field initializers and instance blocks (skipped after
    /// `this(...)`), then the rest of the body.
    fn constructor(&mut self, decl: &'p TypeDecl, body: &'p [Stmt]) {
        let (explicit, rest) = match body.split_first() {
            Some((Stmt::CtorCall(call), rest)) => (Some(call), rest),
            _ => (None, body),
        };
        let delegates = explicit.is_some_and(|c| c.target == CtorTarget::This);
        self.fixed_point(|w| {
            match explicit {
                Some(call) => w.ctor_call(call),
                None => w.implicit_super(decl),
            }
            if !delegates {
                w.instance_init(decl);
            }
            w.stmts(rest);
        });
    }

    fn instance_init(&mut self, decl: &'p TypeDecl) {
        for field in decl.fields.iter().filter(|f| !f.is_static) {
            if let Some(init) = &field.init {
                let value = self.expr(init);
                if let Some(info) = self.program.catalog.field(&decl.name, &field.name) {
                    self.write_field(info, &value);
                }
            }
        }
        for block in decl.initializers.iter().filter(|i| !i.is_static) {
            self.stmts(&block.body);
        }
    }

    fn class_init(&mut self, decl: &'p TypeDecl) {
        for field in decl.fields.iter().filter(|f| f.is_static) {
            if let Some(init) = &field.init {
                let value = self.expr(init);
                if let Some(info) = self.program.catalog.field(&decl.name, &field.name) {
                    self.write_field(info, &value);
                }
            }
        }
        for block in decl.initializers.iter().filter(|i| i.is_static) {
            self.stmts(&block.body);
        }
    }

    /// Implicit `super()` into a source superclass.
    fn implicit_super(&mut self, decl: &TypeDecl) {
        if matches!(decl.kind, DeclarationKind::Anonymous | DeclarationKind::Enum) {
            return;
        }
        let program = self.program;
        let Some(sup) = program.hierarchy.superclass_of(&decl.name) else {
            return;
        };
        if program.decl_ref(sup).is_none() {
            return;
        }
        self.resolve_and_record(SiteReceiver::Constructor { ty: sup.to_string() }, "<init>", Vec::new(), decl.line);
    }

    fn ctor_call(&mut self, call: &CtorCall) {
        let args: Vec<Value> = call.args.iter().map(|a| self.expr(a)).collect();
        let target = match call.target {
            CtorTarget::This => Some(self.current.clone()),
            CtorTarget::Super => self.program.hierarchy.superclass_of(&self.current).map(str::to_string),
        };
        if let Some(ty) = target {
            self.resolve_and_record(SiteReceiver::Constructor { ty }, "<init>", args, call.line);
        }
    }

    // -- statements ----------------------------------------------------------

    fn stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Local { name, ty, init } => {
                let declared = (!ty.is_inferred()).then(|| self.bind(ty));
                let value = init.as_ref().map(|e| self.expr(e));
                let ty = declared.or_else(|| value.as_ref().and_then(|v| v.ty.clone()));
                self.declare_local(name, ty);
                if let Some(value) = value {
                    self.assign_local(name, &value.set);
                }
            }
            Stmt::ForEach { name, ty, iterable } => {
                let source = self.expr(iterable);
                let element = if ty.is_inferred() {
                    source.ty.as_ref().and_then(|t| self.element_type(t))
                } else {
                    Some(self.bind(ty))
                };
                let set = element
                    .as_ref()
                    .map(|e| self.cha_of(e))
                    .unwrap_or_else(TypeConstraintSet::unknown);
                self.declare_local(name, element);
                self.assign_local(name, &set);
            }
            Stmt::Expr(expr) => {
                self.expr(expr);
            }
            Stmt::Return(value) => {
                let value = match value {
                    Some(e) => self.expr(e),
                    None => return,
                };
                if self.lambda_depth == 0 {
                    self.summary.returns.union_with(&value.set);
                }
            }
            Stmt::CtorCall(call) => self.ctor_call(call),
        }
    }

    /// Element type of an array or `Iterable`.
    fn element_type(&self, iterable: &JType) -> Option<JType> {
        iterable.element().or_else(|| {
            self.program
                .hierarchy
                .type_args_for(iterable, "java.lang.Iterable")
                .remove("T")
        })
    }

    // -- expressions ---------------------------------------------------------

    fn expr(&mut self, expr: &Expr) -> Value {
        match expr {
            Expr::New {
                ty,
                args,
                body_type,
                line,
            } => {
                let args: Vec<Value> = args.iter().map(|a| self.expr(a)).collect();
                let bound = self.bind(ty);
                let target = body_type
                    .clone()
                    .or_else(|| bound.reference_name().map(str::to_string));
                let Some(target) = target else {
                    return Value::unknown();
                };
                self.resolve_and_record(SiteReceiver::Constructor { ty: target.clone() }, "<init>", args, *line);
                Value::instance(bound, TypeConstraintSet::exact(target))
            }
            Expr::Call {
                receiver,
                name,
                args,
                line,
            } => {
                let args: Vec<Value> = args.iter().map(|a| self.expr(a)).collect();
                let receivers = self.call_receivers(receiver, name);
                let mut result: Option<Value> = None;
                for site_receiver in receivers {
                    let resolved = self.resolve_and_record(site_receiver, name, args.clone(), *line);
                    let value = self.return_value(&resolved);
                    match &mut result {
                        Some(acc) => {
                            acc.set.union_with(&value.set);
                            if acc.ty.is_none() {
                                acc.ty = value.ty;
                            }
                        }
                        None => result = Some(value),
                    }
                }
                result.unwrap_or_else(Value::unknown)
            }
            Expr::FieldAccess { receiver, name } => self.field_access(receiver, name),
            Expr::Name(name) => self.name(name),
            Expr::This(None) => {
                let current = self.current.clone();
                self.this_value(&current)
            }
            Expr::This(Some(qualifier)) => match self.bind(qualifier).reference_name() {
                Some(owner) => self.this_value(owner),
                None => Value::unknown(),
            },
            Expr::Super => {
                let current = self.current.clone();
                match self.program.hierarchy.superclass_of(&current) {
                    Some(sup) => {
                        let ty = self.super_view(&current, sup);
                        Value::instance(ty, self.this_set(&current))
                    }
                    None => Value::unknown(),
                }
            }
            Expr::Literal(literal) => literal_value(*literal),
            Expr::Binary { op, left, right } => {
                let left = self.expr(left);
                let right = self.expr(right);
                binary_value(op, &left, &right)
            }
            Expr::InstanceOf { value, ty, binding } => {
                let value = self.expr(value);
                if let Some(binding) = binding {
                    let target = self.bind(ty);
                    let set = self.narrow(&value.set, &target);
                    self.declare_local(binding, Some(target));
                    self.assign_local(binding, &set);
                }
                Value::primitive(Primitive::Boolean)
            }
            Expr::Assign { target, value } => {
                let value = self.expr(value);
                self.assign(target, &value);
                value
            }
            Expr::Cast { ty, value } => {
                let value = self.expr(value);
                let target = self.bind(ty);
                if target.desc.is_primitive() {
                    return Value::instance(target, TypeConstraintSet::empty());
                }
                let set = self.narrow(&value.set, &target);
                Value::instance(target, set)
            }
            Expr::Conditional {
                cond,
                then,
                otherwise,
            } => {
                self.expr(cond);
                let mut then = self.expr(then);
                let otherwise = self.expr(otherwise);
                then.set.union_with(&otherwise.set);
                if then.ty.is_none() {
                    then.ty = otherwise.ty;
                }
                then.kind = ValueKind::Instance;
                then
            }
            Expr::ArrayAccess { array, index } => {
                let array = self.expr(array);
                self.expr(index);
                match array.ty.as_ref().and_then(JType::element) {
                    Some(element) => {
                        let set = self.cha_of(&element);
                        Value::instance(element, set)
                    }
                    None => Value::unknown(),
                }
            }
            Expr::ArrayNew { ty, elements } => {
                for element in elements {
                    self.expr(element);
                }
                Value::instance(self.bind(ty), TypeConstraintSet::empty())
            }
            Expr::Lambda { params, body } => {
                for param in params {
                    self.declare_param(param);
                }
                self.lambda_depth += 1;
                self.stmts(body);
                self.lambda_depth -= 1;
                Value::unknown()
            }
            Expr::Switch {
                selector,
                body,
                values,
            } => {
                self.expr(selector);
                self.stmts(body);
                let mut result: Option<Value> = None;
                for value in values {
                    let value = self.expr(value);
                    match &mut result {
                        Some(acc) => {
                            acc.set.union_with(&value.set);
                        }
                        None => result = Some(value),
                    }
                }
                result.unwrap_or_else(Value::unknown)
            }
            Expr::MethodRef { receiver, name } => {
                self.method_ref(receiver, name);
                Value::unknown()
            }
            Expr::Other(parts) => {
                for part in parts {
                    self.expr(part);
                }
                Value::unknown()
            }
        }
    }

    fn name(&mut self, name: &str) -> Value {
        if let Some(value) = self.local_value(name) {
            return value;
        }
        if let Some(field) = self.implicit_field(name) {
            return self.field_value(field, None);
        }
        let program = self.program;
        match program.units[self.unit]
            .scope
            .resolve_known(&program.names, name, Some(&self.current))
        {
            Some(ty) => Value::type_name(ty),
            None => Value::package(name.to_string()),
        }
    }

    fn field_access(&mut self, receiver: &Expr, name: &str) -> Value {
        let program = self.program;
        if matches!(receiver, Expr::Super) {
            let current = self.current.clone();
            let Some(sup) = program.hierarchy.superclass_of(&current) else {
                return Value::unknown();
            };
            let view = self.super_view(&current, sup);
            return match program.catalog.field(sup, name) {
                Some(field) => self.field_value(field, Some(&view)),
                None => Value::unknown(),
            };
        }

        let receiver = self.expr(receiver);
        match &receiver.kind {
            ValueKind::Package(prefix) => {
                let dotted = format!("{prefix}.{name}");
                match program.names.resolve_dotted(&dotted) {
                    Some(ty) => Value::type_name(ty),
                    None => Value::package(dotted),
                }
            }
            ValueKind::Type(ty) => {
                if let Some(field) = program.catalog.field(ty, name) {
                    return self.field_value(field, None);
                }
                let member = format!("{ty}${name}");
                if program.names.contains(&member) {
                    Value::type_name(member)
                } else {
                    Value::unknown()
                }
            }
            ValueKind::Instance => {
                let is_array = matches!(receiver.ty.as_ref().map(|t| &t.desc), Some(TypeDesc::Array(_)));
                if is_array && name == "length" {
                    return Value::primitive(Primitive::Int);
                }
                match self.member_field(&receiver, name) {
                    Some(field) => self.field_value(field, receiver.ty.as_ref()),
                    None => Value::unknown(),
                }
            }
        }
    }

    fn assign(&mut self, target: &Expr, value: &Value) {
        match target {
            Expr::Name(name) => {
                if self.assign_local(name, &value.set) {
                    return;
                }
                if let Some(field) = self.implicit_field(name) {
                    self.write_field(field, value);
                }
            }
            Expr::FieldAccess { receiver, name } => {
                let field = if matches!(**receiver, Expr::Super) {
                    self.program
                        .hierarchy
                        .superclass_of(&self.current)
                        .and_then(|sup| self.program.catalog.field(sup, name))
                } else {
                    let receiver = self.expr(receiver);
                    self.member_field(&receiver, name)
                };
                if let Some(field) = field {
                    self.write_field(field, value);
                }
            }
            other => {
                self.expr(other);
            }
        }
    }

    /// Keep the members of `set` that are subtypes of `target`; fall back
    /// to CHA of `target` when none are.
    fn narrow(&self, set: &TypeConstraintSet, target: &JType) -> TypeConstraintSet {
        let Some(target_name) = target.reference_name() else {
            return TypeConstraintSet::unknown();
        };
        let hierarchy = &self.program.hierarchy;
        let kept: BTreeSet<String> = set
            .iter()
            .filter(|t| hierarchy.is_subtype(t, target_name))
            .map(str::to_string)
            .collect();
        if kept.is_empty() {
            TypeConstraintSet::cha(hierarchy, target_name)
        } else {
            TypeConstraintSet::from_types(kept, set.is_unresolved())
        }
    }

    // -- calls ---------------------------------------------------------------

    fn call_receivers(&mut self, receiver: &Receiver, name: &str) -> Vec<SiteReceiver> {
        let program = self.program;
        match receiver {
            Receiver::Implicit => {
                let current = self.current.clone();
                for (depth, owner) in lexical_chain(&current).into_iter().enumerate() {
                    if !program.catalog.has_method_named(owner, name) {
                        continue;
                    }
                    if depth == 0 && self.is_static {
                        return vec![SiteReceiver::Static { ty: owner.to_string() }];
                    }
                    return vec![SiteReceiver::Instance {
                        set: self.this_set(owner),
                        static_ty: Some(JType::reference(owner)),
                    }];
                }
                program.units[self.unit]
                    .scope
                    .static_import_owners(&program.names, name)
                    .into_iter()
                    .filter(|owner| program.catalog.has_method_named(owner, name))
                    .map(|ty| SiteReceiver::Static { ty })
                    .collect()
            }
            Receiver::Super => {
                let current = self.current.clone();
                match program.hierarchy.superclass_of(&current) {
                    Some(sup) => vec![SiteReceiver::Super {
                        ty: self.super_view(&current, sup),
                    }],
                    None => Vec::new(),
                }
            }
            Receiver::QualifiedSuper(qualifier) => {
                let current = self.current.clone();
                let bound = self.bind(qualifier);
                let Some(named) = bound.reference_name() else {
                    return Vec::new();
                };
                if program.hierarchy.get(named).is_some_and(|n| n.is_interface()) {
                    vec![SiteReceiver::Super {
                        ty: self.super_view(&current, named),
                    }]
                } else {
                    match program.hierarchy.superclass_of(named) {
                        Some(sup) => vec![SiteReceiver::Super {
                            ty: self.super_view(named, sup),
                        }],
                        None => Vec::new(),
                    }
                }
            }
            Receiver::Expr(expr) => {
                let value = self.expr(expr);
                match value.kind {
                    ValueKind::Type(ty) => vec![SiteReceiver::Static { ty }],
                    ValueKind::Package(_) => Vec::new(),
                    ValueKind::Instance if value.set.is_empty() && !value.set.is_unresolved() => Vec::new(),
                    ValueKind::Instance => vec![SiteReceiver::Instance {
                        set: value.set,
                        static_ty: value.ty,
                    }],
                }
            }
        }
    }

    fn resolve_and_record(
        &mut self,
        receiver: SiteReceiver,
        name: &str,
        args: Vec<Value>,
        line: usize,
    ) -> Vec<Resolution<'p>> {
        let site = CallSite {
            caller: self.caller.clone(),
            line,
            name: name.to_string(),
            receiver,
            args,
        };
        let resolved = resolver::resolve(self.program, &site);
        self.record(&resolved);
        resolved
    }

    fn record(&mut self, resolved: &[Resolution<'p>]) {
        for resolution in resolved {
            self.summary.callees.insert(resolution.method.signature.clone());
        }
    }

    /// Union of the callees' return constraints.
    fn return_value(&mut self, resolved: &[Resolution<'p>]) -> Value {
        let mut ty: Option<JType> = None;
        let mut set = TypeConstraintSet::empty();
        let mut any = false;
        for resolution in resolved {
            let ret = resolution.method.generic_return.substitute(&resolution.bindings);
            if ret.desc.is_void() {
                continue;
            }
            any = true;
            let narrowed = match self.engine.return_set(resolution.method) {
                Some(narrowed) => narrowed,
                None => self.cha_of(&ret),
            };
            set.union_with(&narrowed);
            if ty.is_none() {
                ty = Some(ret);
            }
        }
        if !any {
            return Value::unknown();
        }
        Value {
            ty,
            set,
            kind: ValueKind::Instance,
        }
    }

    /// `Type::method`, `expr::method`, and `Type::new`.
    fn method_ref(&mut self, receiver: &Expr, name: &str) {
        let value = self.expr(receiver);
        let site_receiver = match value.kind {
            ValueKind::Type(ty) if name == "new" => SiteReceiver::Constructor { ty },
            ValueKind::Type(ty) => SiteReceiver::Instance {
                set: TypeConstraintSet::cha(&self.program.hierarchy, &ty),
                static_ty: Some(JType::reference(ty)),
            },
            ValueKind::Package(_) => return,
            ValueKind::Instance => SiteReceiver::Instance {
                set: value.set,
                static_ty: value.ty,
            },
        };
        let resolved = resolver::resolve_reference(self.program, &site_receiver, name);
        self.record(&resolved);
    }
}

fn literal_value(literal: Literal) -> Value {
    match literal {
        Literal::String => Value::instance(JType::reference(STRING), TypeConstraintSet::exact(STRING)),
        Literal::Class => Value::instance(JType::reference(CLASS), TypeConstraintSet::exact(CLASS)),
        Literal::Null => Value::null(),
        Literal::Int => Value::primitive(Primitive::Int),
        Literal::Long => Value::primitive(Primitive::Long),
        Literal::Float => Value::primitive(Primitive::Float),
        Literal::Double => Value::primitive(Primitive::Double),
        Literal::Char => Value::primitive(Primitive::Char),
        Literal::Boolean => Value::primitive(Primitive::Boolean),
    }
}

fn binary_value(op: &str, left: &Value, right: &Value) -> Value {
    match op {
        "+" if left.is_string() || right.is_string() => {
            Value::instance(JType::reference(STRING), TypeConstraintSet::exact(STRING))
        }
        "==" | "!=" | "<" | ">" | "<=" | ">=" | "&&" | "||" => Value::primitive(Primitive::Boolean),
        "<<" | ">>" | ">>>" => match left.primitive_type() {
            Some(Primitive::Long) => Value::primitive(Primitive::Long),
            Some(_) => Value::primitive(Primitive::Int),
            None => Value::unknown(),
        },
        _ => match (left.primitive_type(), right.primitive_type()) {
            (Some(a), Some(b)) => Value::primitive(promote(a, b)),
            _ => Value::unknown(),
        },
    }
}

/// Binary numeric promotion.
fn promote(a: Primitive, b: Primitive) -> Primitive {
    use Primitive::*;
    if a == Boolean && b == Boolean {
        return Boolean;
    }
    [Double, Float, Long]
        .into_iter()
        .find(|wide| a == *wide || b == *wide)
        .unwrap_or(Int)
}
