//! The frozen whole-program view shared by every analysis worker.
//!
//! Built once, sequentially: bind every declaration into a [`TypeNode`],
//! index the hierarchy, build the catalog, and map each method signature to
//! the body that implements it.

use std::collections::HashMap;

use indexmap::IndexMap;
use tracing::{info, warn};

use crate::errors::CgResult;
use crate::indexer::binding::{lexical_chain, TypeNames, UnitScope};
use crate::indexer::catalog::SignatureCatalog;
use crate::indexer::hierarchy::{CyclePolicy, HierarchyIndex};
use crate::indexer::syntax::{CompilationUnit, MethodDeclKind, TypeDecl, TypeRef};
use crate::library::LibrarySpec;
use crate::models::{
    DeclarationKind, FieldInfo, JType, MethodInfo, MethodKind, Origin, Signature, TypeDesc,
    TypeNode, TypeParam, OBJECT, STRING,
};

/// A lowered unit with its import table.
#[derive(Debug)]
pub struct ParsedUnit {
    pub unit: CompilationUnit,
    pub scope: UnitScope,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeclRef {
    pub unit: usize,
    pub index: usize,
}

/// Which piece of a declaration implements a signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyKind {
    /// Index into `TypeDecl::methods`.
    Declared(usize),
    /// Synthesized no-arg constructor: implicit `super()`, then instance
    /// initialization.
    DefaultConstructor,
    /// Static field initializers and static blocks.
    StaticInit,
}

#[derive(Debug)]
pub struct Program {
    pub units: Vec<ParsedUnit>,
    pub names: TypeNames,
    pub hierarchy: HierarchyIndex,
    pub catalog: SignatureCatalog,
    decls: HashMap<String, DeclRef>,
    bodies: HashMap<Signature, (DeclRef, BodyKind)>,
    by_type: HashMap<String, Vec<Signature>>,
}

impl Program {
    pub fn build(units: Vec<CompilationUnit>, library: &LibrarySpec, policy: CyclePolicy) -> CgResult<Self> {
        let library_nodes = library.type_nodes()?;
        let mut names = TypeNames::new(library_nodes.iter().map(|n| n.name.clone()));
        let mut kinds: HashMap<String, DeclarationKind> =
            library_nodes.iter().map(|n| (n.name.clone(), n.kind)).collect();

        let mut decls: HashMap<String, DeclRef> = HashMap::new();
        for (unit_index, unit) in units.iter().enumerate() {
            for (index, decl) in unit.types.iter().enumerate() {
                if let Some(existing) = decls.get(&decl.name) {
                    warn!(
                        type_name = %decl.name,
                        file = %unit.path.display(),
                        first = %units[existing.unit].path.display(),
                        "duplicate type declaration ignored"
                    );
                    continue;
                }
                decls.insert(decl.name.clone(), DeclRef { unit: unit_index, index });
                names.insert(decl.name.clone());
                kinds.insert(decl.name.clone(), decl.kind);
            }
        }

        let units: Vec<ParsedUnit> = units
            .into_iter()
            .map(|unit| ParsedUnit {
                scope: UnitScope::new(&unit),
                unit,
            })
            .collect();

        let mut ordered: Vec<(&String, &DeclRef)> = decls.iter().collect();
        ordered.sort_by(|a, b| a.0.cmp(b.0));
        let mut nodes = library_nodes;
        for (_, decl_ref) in ordered {
            nodes.push(source_type_node(&units, &decls, &names, &kinds, *decl_ref));
        }

        let hierarchy = HierarchyIndex::build(nodes, policy)?;
        let catalog = SignatureCatalog::build(&hierarchy);

        let mut bodies = HashMap::new();
        let mut by_type: HashMap<String, Vec<Signature>> = HashMap::new();
        for (name, decl_ref) in &decls {
            let decl = &units[decl_ref.unit].unit.types[decl_ref.index];
            let Some(node) = hierarchy.get(name) else {
                continue;
            };
            for (index, method) in decl.methods.iter().enumerate() {
                if method.body.is_none() {
                    continue;
                }
                if let Some(info) = node.methods.get(index) {
                    bodies.insert(info.signature.clone(), (*decl_ref, BodyKind::Declared(index)));
                }
            }
            if let Some(ctor) = catalog.constructors(name).iter().find(|c| c.is_synthetic) {
                bodies.insert(ctor.signature.clone(), (*decl_ref, BodyKind::DefaultConstructor));
            }
            let has_static_init = decl.initializers.iter().any(|i| i.is_static)
                || decl.fields.iter().any(|f| f.is_static && f.init.is_some());
            if has_static_init {
                bodies.insert(Signature::static_init(name), (*decl_ref, BodyKind::StaticInit));
            }
        }
        for signature in bodies.keys() {
            by_type
                .entry(signature.declaring().to_string())
                .or_default()
                .push(signature.clone());
        }
        for signatures in by_type.values_mut() {
            signatures.sort();
        }

        info!(
            units = units.len(),
            source_types = decls.len(),
            indexed_types = hierarchy.len(),
            methods = catalog.method_count(),
            "program indexed"
        );

        Ok(Program {
            units,
            names,
            hierarchy,
            catalog,
            decls,
            bodies,
            by_type,
        })
    }

    pub fn decl(&self, decl_ref: DeclRef) -> &TypeDecl {
        &self.units[decl_ref.unit].unit.types[decl_ref.index]
    }

    pub fn decl_ref(&self, type_name: &str) -> Option<DeclRef> {
        self.decls.get(type_name).copied()
    }

    pub fn source_decl(&self, type_name: &str) -> Option<&TypeDecl> {
        self.decl_ref(type_name).map(|r| self.decl(r))
    }

    /// Whether `decl_ref` is the declaration that won for its name.
    pub fn owns(&self, decl_ref: DeclRef) -> bool {
        self.decls.get(&self.decl(decl_ref).name) == Some(&decl_ref)
    }

    pub fn body_of(&self, signature: &Signature) -> Option<(DeclRef, BodyKind)> {
        self.bodies.get(signature).copied()
    }

    /// Every body declared directly in `type_name`, sorted.
    pub fn type_bodies(&self, type_name: &str) -> &[Signature] {
        self.by_type.get(type_name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn source_type_count(&self) -> usize {
        self.decls.len()
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Signatures of every body declared in `unit`.
    pub fn unit_bodies(&self, unit: usize) -> Vec<(Signature, DeclRef, BodyKind)> {
        let mut found: Vec<(Signature, DeclRef, BodyKind)> = self
            .bodies
            .iter()
            .filter(|(_, (decl_ref, _))| decl_ref.unit == unit)
            .map(|(sig, (decl_ref, kind))| (sig.clone(), *decl_ref, *kind))
            .collect();
        found.sort_by(|a, b| a.0.cmp(&b.0));
        found
    }

    /// Catalog entry for `TypeDecl::methods[index]` of `type_name`.
    pub fn method_info(&self, type_name: &str, index: usize) -> Option<&MethodInfo> {
        self.hierarchy.get(type_name).and_then(|n| n.methods.get(index))
    }

    /// Type variables visible inside `type_name`: its own parameters and
    /// those of its lexically enclosing types.
    pub fn type_vars(&self, type_name: &str) -> Vec<String> {
        scope_type_vars(&self.units, &self.decls, type_name)
    }

    pub fn bind(&self, unit: usize, ty: &TypeRef, current: &str, vars: &[String]) -> JType {
        self.units[unit].scope.bind(&self.names, ty, Some(current), vars)
    }
}

fn scope_type_vars(units: &[ParsedUnit], decls: &HashMap<String, DeclRef>, type_name: &str) -> Vec<String> {
    let mut vars = Vec::new();
    for owner in lexical_chain(type_name) {
        if let Some(r) = decls.get(owner) {
            let decl = &units[r.unit].unit.types[r.index];
            vars.extend(decl.type_params.iter().map(|p| p.name.clone()));
        }
    }
    vars
}

fn source_type_node(
    units: &[ParsedUnit],
    decls: &HashMap<String, DeclRef>,
    names: &TypeNames,
    kinds: &HashMap<String, DeclarationKind>,
    decl_ref: DeclRef,
) -> TypeNode {
    let parsed = &units[decl_ref.unit];
    let decl = &parsed.unit.types[decl_ref.index];
    let vars = scope_type_vars(units, decls, &decl.name);
    let bind = |ty: &TypeRef, vars: &[String]| parsed.scope.bind(names, ty, Some(&decl.name), vars);

    let mut node = TypeNode::new(decl.name.clone(), decl.kind, Origin::Source);
    node.is_abstract = decl.modifiers.is_abstract;
    node.enclosing = decl.enclosing.clone();
    node.type_params = decl
        .type_params
        .iter()
        .map(|p| TypeParam {
            name: p.name.clone(),
            bound: p.bound.as_ref().map(|b| bind(b, &vars)),
        })
        .collect();

    let mut record_super = |node: &mut TypeNode, ty: JType, as_interface: bool| {
        let Some(name) = ty.reference_name().map(str::to_string) else {
            return;
        };
        if !ty.args.is_empty() {
            node.super_args.insert(name.clone(), ty.args.clone());
        }
        if as_interface {
            node.interfaces.push(name);
        } else {
            node.superclass = Some(name);
        }
    };

    let declared_super = decl.superclass.as_ref().map(|s| bind(s, &vars));
    match (decl.kind, declared_super) {
        (DeclarationKind::Interface, Some(sup)) => record_super(&mut node, sup, true),
        (DeclarationKind::Interface, None) => {}
        (DeclarationKind::Anonymous, Some(sup)) => {
            let is_interface = sup
                .reference_name()
                .and_then(|n| kinds.get(n))
                .is_some_and(|k| *k == DeclarationKind::Interface);
            if is_interface {
                node.superclass = Some(OBJECT.to_string());
                record_super(&mut node, sup, true);
            } else {
                record_super(&mut node, sup, false);
            }
        }
        (_, Some(sup)) => record_super(&mut node, sup, false),
        (_, None) if decl.name != OBJECT => node.superclass = Some(OBJECT.to_string()),
        _ => {}
    }
    for iface in &decl.interfaces {
        let ty = bind(iface, &vars);
        record_super(&mut node, ty, true);
    }

    let is_interface = decl.kind == DeclarationKind::Interface;
    for method in &decl.methods {
        let mut mvars = vars.clone();
        mvars.extend(method.type_params.iter().map(|p| p.name.clone()));
        let generic_params: Vec<JType> = method.params.iter().map(|p| bind(&p.ty, &mvars)).collect();
        let params: Vec<TypeDesc> = generic_params.iter().map(|p| p.desc.clone()).collect();
        let (signature, kind, generic_return) = match method.kind {
            MethodDeclKind::Constructor => (
                Signature::constructor(&decl.name, params),
                MethodKind::Constructor,
                JType::new(TypeDesc::void()),
            ),
            MethodDeclKind::Method => {
                let ret = method
                    .ret
                    .as_ref()
                    .map(|r| bind(r, &mvars))
                    .unwrap_or_else(|| JType::new(TypeDesc::void()));
                let kind = if method.modifiers.is_static {
                    MethodKind::Static
                } else if is_interface && method.modifiers.is_default {
                    MethodKind::Default
                } else {
                    MethodKind::Virtual
                };
                (
                    Signature::new(decl.name.as_str(), method.name.as_str(), params, ret.desc.clone()),
                    kind,
                    ret,
                )
            }
        };
        node.methods.push(MethodInfo {
            signature,
            kind,
            is_abstract: method.modifiers.is_abstract && method.body.is_none(),
            is_private: method.modifiers.is_private,
            is_varargs: method.is_varargs(),
            is_synthetic: false,
            type_params: method
                .type_params
                .iter()
                .map(|p| TypeParam {
                    name: p.name.clone(),
                    bound: p.bound.as_ref().map(|b| bind(b, &mvars)),
                })
                .collect(),
            generic_params,
            generic_return,
        });
    }
    if decl.kind == DeclarationKind::Enum {
        node.methods.extend(enum_methods(&decl.name));
    }

    let mut fields = IndexMap::new();
    for field in &decl.fields {
        fields.insert(
            field.name.clone(),
            FieldInfo {
                name: field.name.clone(),
                declaring: decl.name.clone(),
                ty: bind(&field.ty, &vars),
                is_static: field.is_static,
            },
        );
    }
    node.fields = fields;
    node
}

/// The implicit `values()` and `valueOf(String)` every enum declares.
fn enum_methods(enum_name: &str) -> Vec<MethodInfo> {
    let this = JType::reference(enum_name);
    let array = JType::new(TypeDesc::Array(Box::new(this.desc.clone())));
    let synthetic = |name: &str, params: Vec<JType>, ret: JType| MethodInfo {
        signature: Signature::new(
            enum_name,
            name,
            params.iter().map(|p| p.desc.clone()).collect(),
            ret.desc.clone(),
        ),
        kind: MethodKind::Static,
        is_abstract: false,
        is_private: false,
        is_varargs: false,
        is_synthetic: true,
        type_params: Vec::new(),
        generic_params: params,
        generic_return: ret,
    };
    vec![
        synthetic("values", Vec::new(), array),
        synthetic("valueOf", vec![JType::reference(STRING)], this),
    ]
}

/// Index in-memory sources against the embedded library.
#[cfg(test)]
pub(crate) fn program_from_sources(sources: &[&str]) -> Program {
    let units = sources
        .iter()
        .enumerate()
        .map(|(i, s)| crate::indexer::parser::parse_unit(std::path::Path::new(&format!("U{i}.java")), s).unwrap())
        .collect();
    Program::build(units, &LibrarySpec::builtin().unwrap(), CyclePolicy::Degrade).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(sources: &[&str]) -> Program {
        program_from_sources(sources)
    }

    #[test]
    fn test_source_nodes_bind_supertypes() {
        let p = program(&[
            "package p; import java.util.List; interface Shape { double area(); }",
            "package p; class Circle implements Shape, Comparable<Circle> { public double area() { return 1; } \
             public int compareTo(Circle o) { return 0; } }",
        ]);
        let circle = p.hierarchy.get("p.Circle").unwrap();
        assert_eq!(circle.superclass.as_deref(), Some(OBJECT));
        assert_eq!(circle.interfaces, vec!["p.Shape".to_string(), "java.lang.Comparable".to_string()]);
        assert_eq!(circle.super_args["java.lang.Comparable"][0], JType::reference("p.Circle"));
        assert!(p.hierarchy.is_subtype("p.Circle", "p.Shape"));
    }

    #[test]
    fn test_anonymous_interface_implementation() {
        let p = program(&["package p; class A { Runnable r = new Runnable() { public void run() {} }; }"]);
        let anon = p.hierarchy.get("p.A$1").unwrap();
        assert_eq!(anon.superclass.as_deref(), Some(OBJECT));
        assert_eq!(anon.interfaces, vec!["java.lang.Runnable".to_string()]);
        assert!(p.hierarchy.descendants("java.lang.Runnable").contains("p.A$1"));
    }

    #[test]
    fn test_bodies_cover_methods_default_ctors_and_static_init() {
        let p = program(&["package p; class A { static int n = 1; void f() {} abstract static class B { abstract void g(); } }"]);
        let f = Signature::decode("p.A:f()V").unwrap();
        assert!(matches!(p.body_of(&f), Some((_, BodyKind::Declared(_)))));
        let ctor = Signature::decode("p.A:A()V").unwrap();
        assert!(matches!(p.body_of(&ctor), Some((_, BodyKind::DefaultConstructor))));
        let clinit = Signature::decode("p.A:<clinit>()V").unwrap();
        assert!(matches!(p.body_of(&clinit), Some((_, BodyKind::StaticInit))));
        let g = Signature::decode("p.A$B:g()V").unwrap();
        assert!(p.body_of(&g).is_none());
        assert!(p.catalog.method(&g).unwrap().is_abstract);
    }

    #[test]
    fn test_enum_has_implicit_methods() {
        let p = program(&["package p; enum Color { RED, GREEN }"]);
        assert!(p.catalog.has_method_named("p.Color", "values"));
        assert!(p.catalog.has_method_named("p.Color", "name"));
        assert_eq!(p.hierarchy.superclass_of("p.Color"), Some("java.lang.Enum"));
        assert!(p.catalog.constructors("p.Color").is_empty());
    }

    #[test]
    fn test_duplicate_declarations_keep_first() {
        let p = program(&["package p; class Dup { void a() {} }", "package p; class Dup { void b() {} }"]);
        assert!(p.catalog.has_method_named("p.Dup", "a"));
        assert!(!p.catalog.has_method_named("p.Dup", "b"));
        assert!(!p.owns(DeclRef { unit: 1, index: 0 }));
    }

    #[test]
    fn test_generic_method_signatures_use_type_vars() {
        let p = program(&["package p; class Box<T> { T value; <R> R map(java.util.function.Function<T, R> f) { return null; } T get() { return value; } }"]);
        let get = Signature::decode("p.Box:get()TT;").unwrap();
        assert!(p.catalog.method(&get).is_some());
        let map = Signature::decode("p.Box:map(Qjava.util.function.Function;)TR;").unwrap();
        assert!(p.catalog.method(&map).is_some());
    }
}
