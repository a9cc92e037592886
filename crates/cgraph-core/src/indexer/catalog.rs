//! Signature catalog: per-type constructors, visible methods and fields.
//!
//! Visible methods are the declared ones plus inherited ones that are not
//! overridden. Class-chain methods mask interface methods, a sub-interface
//! masks its super-interface, and equal shapes from unrelated interfaces are
//! all kept and reported as ambiguous.

use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use indexmap::IndexMap;
use tracing::warn;

use crate::indexer::hierarchy::HierarchyIndex;
use crate::models::{
    DeclarationKind, FieldInfo, JType, MethodInfo, MethodKind, Origin, Signature, TypeDesc,
};

#[derive(Clone, Debug, Default)]
pub struct TypeMembers {
    pub constructors: Vec<MethodInfo>,
    pub methods: Vec<MethodInfo>,
    /// Method names with competing defaults from unrelated interfaces.
    pub ambiguous: BTreeSet<String>,
    pub fields: IndexMap<String, FieldInfo>,
}

/// The no-arg constructor a source class gets when it declares none.
pub fn synthesized_constructor(type_name: &str) -> MethodInfo {
    MethodInfo {
        signature: Signature::constructor(type_name, Vec::new()),
        kind: MethodKind::Constructor,
        is_abstract: false,
        is_private: false,
        is_varargs: false,
        is_synthetic: true,
        type_params: Vec::new(),
        generic_params: Vec::new(),
        generic_return: JType::new(TypeDesc::void()),
    }
}

#[derive(Debug, Default)]
pub struct SignatureCatalog {
    members: HashMap<String, TypeMembers>,
    by_signature: HashMap<Signature, MethodInfo>,
}

static EMPTY_MEMBERS: LazyLock<TypeMembers> = LazyLock::new(TypeMembers::default);

impl SignatureCatalog {
    pub fn build(hierarchy: &HierarchyIndex) -> Self {
        let mut catalog = SignatureCatalog::default();
        let mut names: Vec<&str> = hierarchy.nodes().map(|n| n.name.as_str()).collect();
        names.sort_unstable();
        for name in names {
            catalog.compute(hierarchy, name);
        }
        for members in catalog.members.values() {
            for method in members.constructors.iter().chain(&members.methods) {
                catalog
                    .by_signature
                    .entry(method.signature.clone())
                    .or_insert_with(|| method.clone());
            }
        }
        catalog
    }

    fn compute(&mut self, hierarchy: &HierarchyIndex, name: &str) {
        if self.members.contains_key(name) {
            return;
        }
        let Some(node) = hierarchy.get(name) else {
            return;
        };
        // Supertypes first; the hierarchy is acyclic once indexed.
        for sup in node.direct_supertypes() {
            self.compute(hierarchy, sup);
        }

        let mut constructors: Vec<MethodInfo> = node
            .methods
            .iter()
            .filter(|m| m.kind == MethodKind::Constructor)
            .cloned()
            .collect();
        if node.kind == DeclarationKind::Enum {
            constructors.clear();
        } else if constructors.is_empty()
            && node.origin == Origin::Source
            && matches!(node.kind, DeclarationKind::Class | DeclarationKind::Anonymous)
        {
            constructors.push(synthesized_constructor(name));
        }

        let mut visible: Vec<MethodInfo> = node
            .methods
            .iter()
            .filter(|m| m.kind != MethodKind::Constructor)
            .cloned()
            .collect();

        // Only class-declared methods of the superclass chain mask interface
        // methods; interface methods it inherited compete with ours below.
        let mut candidates: Vec<MethodInfo> = Vec::new();
        if let Some(sup) = node.superclass.as_deref() {
            if let Some(parent) = self.members.get(sup) {
                for inherited in &parent.methods {
                    if inherited.is_private || visible.iter().any(|m| m.same_shape(inherited)) {
                        continue;
                    }
                    let from_interface = hierarchy
                        .get(inherited.declaring())
                        .is_some_and(|owner| owner.is_interface());
                    if from_interface {
                        candidates.push(inherited.clone());
                    } else {
                        visible.push(inherited.clone());
                    }
                }
            }
        }
        candidates.retain(|c| !visible.iter().any(|m| m.same_shape(c)));

        for iface in &node.interfaces {
            let Some(parent) = self.members.get(iface) else {
                continue;
            };
            for inherited in &parent.methods {
                if inherited.is_private || inherited.kind == MethodKind::Static {
                    continue;
                }
                if visible.iter().any(|m| m.same_shape(inherited)) {
                    continue;
                }
                if !candidates.iter().any(|c| c.signature == inherited.signature) {
                    candidates.push(inherited.clone());
                }
            }
        }
        // A more specific interface masks the one it extends.
        let masked: Vec<bool> = candidates
            .iter()
            .map(|c| {
                candidates.iter().any(|other| {
                    other.signature != c.signature
                        && other.same_shape(c)
                        && other.declaring() != c.declaring()
                        && hierarchy.is_subtype(other.declaring(), c.declaring())
                })
            })
            .collect();
        let survivors: Vec<MethodInfo> = candidates
            .into_iter()
            .zip(masked)
            .filter_map(|(c, hidden)| (!hidden).then_some(c))
            .collect();

        let mut ambiguous = BTreeSet::new();
        for (i, a) in survivors.iter().enumerate() {
            for b in &survivors[i + 1..] {
                if a.same_shape(b) && (!a.is_abstract || !b.is_abstract) {
                    ambiguous.insert(a.name().to_string());
                }
            }
        }
        if !ambiguous.is_empty() && node.origin == Origin::Source {
            warn!(type_name = %name, methods = ?ambiguous, "conflicting interface defaults, keeping all");
        }
        visible.extend(survivors);

        let mut fields: IndexMap<String, FieldInfo> = node.fields.clone();
        for sup in node.direct_supertypes() {
            if let Some(parent) = self.members.get(sup) {
                for (field_name, field) in &parent.fields {
                    fields.entry(field_name.clone()).or_insert_with(|| field.clone());
                }
            }
        }

        self.members.insert(
            name.to_string(),
            TypeMembers {
                constructors,
                methods: visible,
                ambiguous,
                fields,
            },
        );
    }

    pub fn members(&self, type_name: &str) -> &TypeMembers {
        self.members.get(type_name).unwrap_or(&*EMPTY_MEMBERS)
    }

    pub fn constructors(&self, type_name: &str) -> &[MethodInfo] {
        &self.members(type_name).constructors
    }

    pub fn methods_named<'a>(&'a self, type_name: &str, name: &str) -> impl Iterator<Item = &'a MethodInfo> + 'a {
        let name = name.to_owned();
        self.members(type_name).methods.iter().filter(move |m| m.name() == name)
    }

    pub fn has_method_named(&self, type_name: &str, name: &str) -> bool {
        self.methods_named(type_name, name).next().is_some()
    }

    pub fn field(&self, type_name: &str, name: &str) -> Option<&FieldInfo> {
        self.members(type_name).fields.get(name)
    }

    pub fn is_ambiguous(&self, type_name: &str, name: &str) -> bool {
        self.members(type_name).ambiguous.contains(name)
    }

    /// Catalog entry for a declared or synthesized method.
    pub fn method(&self, signature: &Signature) -> Option<&MethodInfo> {
        self.by_signature.get(signature)
    }

    pub fn method_count(&self) -> usize {
        self.by_signature.len()
    }

    /// Every implementation `method` dispatches to across the declaring
    /// type's subtypes, `method` itself included when it is inherited.
    pub fn overriders<'a>(&'a self, hierarchy: &HierarchyIndex, method: &MethodInfo) -> Vec<&'a MethodInfo> {
        let mut found: Vec<&MethodInfo> = Vec::new();
        for sub in hierarchy.descendants(method.declaring()) {
            for candidate in &self.members(sub).methods {
                if candidate.is_dispatched()
                    && candidate.same_shape(method)
                    && !found.iter().any(|f| f.signature == candidate.signature)
                {
                    found.push(candidate);
                }
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::hierarchy::CyclePolicy;
    use crate::models::{TypeNode, OBJECT};

    fn method(owner: &str, name: &str, kind: MethodKind, is_abstract: bool) -> MethodInfo {
        MethodInfo {
            signature: Signature::new(owner, name, Vec::new(), TypeDesc::void()),
            kind,
            is_abstract,
            is_private: false,
            is_varargs: false,
            is_synthetic: false,
            type_params: Vec::new(),
            generic_params: Vec::new(),
            generic_return: JType::new(TypeDesc::void()),
        }
    }

    fn node(name: &str, kind: DeclarationKind, sup: Option<&str>, ifaces: &[&str], methods: Vec<MethodInfo>) -> TypeNode {
        let mut n = TypeNode::new(name, kind, Origin::Source);
        n.superclass = sup.map(str::to_string);
        n.interfaces = ifaces.iter().map(|s| s.to_string()).collect();
        n.methods = methods;
        n
    }

    fn build(nodes: Vec<TypeNode>) -> (HierarchyIndex, SignatureCatalog) {
        let mut all = vec![TypeNode::new(OBJECT, DeclarationKind::Class, Origin::Library)];
        all.extend(nodes);
        let hierarchy = HierarchyIndex::build(all, CyclePolicy::Degrade).unwrap();
        let catalog = SignatureCatalog::build(&hierarchy);
        (hierarchy, catalog)
    }

    fn owners<'a>(catalog: &'a SignatureCatalog, ty: &str, name: &'a str) -> Vec<&'a str> {
        let mut v: Vec<&str> = catalog.methods_named(ty, name).map(|m| m.declaring()).collect();
        v.sort_unstable();
        v
    }

    #[test]
    fn test_class_chain_masks_interface_default() {
        let (_, catalog) = build(vec![
            node("p.I", DeclarationKind::Interface, None, &[], vec![method("p.I", "f", MethodKind::Default, false)]),
            node("p.Base", DeclarationKind::Class, Some(OBJECT), &[], vec![method("p.Base", "f", MethodKind::Virtual, false)]),
            node("p.C", DeclarationKind::Class, Some("p.Base"), &["p.I"], vec![]),
        ]);
        assert_eq!(owners(&catalog, "p.C", "f"), vec!["p.Base"]);
    }

    #[test]
    fn test_sub_interface_masks_super_interface() {
        let (_, catalog) = build(vec![
            node("p.I", DeclarationKind::Interface, None, &[], vec![method("p.I", "f", MethodKind::Default, false)]),
            node("p.J", DeclarationKind::Interface, None, &["p.I"], vec![method("p.J", "f", MethodKind::Default, false)]),
            node("p.C", DeclarationKind::Class, Some(OBJECT), &["p.I", "p.J"], vec![]),
        ]);
        assert_eq!(owners(&catalog, "p.C", "f"), vec!["p.J"]);
        assert!(!catalog.is_ambiguous("p.C", "f"));
    }

    #[test]
    fn test_sub_interface_default_beats_default_inherited_through_superclass() {
        let (_, catalog) = build(vec![
            node("p.I", DeclarationKind::Interface, None, &[], vec![method("p.I", "f", MethodKind::Default, false)]),
            node("p.J", DeclarationKind::Interface, None, &["p.I"], vec![method("p.J", "f", MethodKind::Default, false)]),
            node("p.Base", DeclarationKind::Class, Some(OBJECT), &["p.I"], vec![]),
            node("p.C", DeclarationKind::Class, Some("p.Base"), &["p.J"], vec![]),
        ]);
        assert_eq!(owners(&catalog, "p.Base", "f"), vec!["p.I"]);
        assert_eq!(owners(&catalog, "p.C", "f"), vec!["p.J"]);
        assert!(!catalog.is_ambiguous("p.C", "f"));
    }

    #[test]
    fn test_unrelated_defaults_are_ambiguous() {
        let (_, catalog) = build(vec![
            node("p.I", DeclarationKind::Interface, None, &[], vec![method("p.I", "f", MethodKind::Default, false)]),
            node("p.K", DeclarationKind::Interface, None, &[], vec![method("p.K", "f", MethodKind::Default, false)]),
            node("p.C", DeclarationKind::Class, Some(OBJECT), &["p.I", "p.K"], vec![]),
        ]);
        assert_eq!(owners(&catalog, "p.C", "f"), vec!["p.I", "p.K"]);
        assert!(catalog.is_ambiguous("p.C", "f"));
    }

    #[test]
    fn test_private_and_static_interface_methods_not_inherited() {
        let mut private = method("p.Base", "hidden", MethodKind::Virtual, false);
        private.is_private = true;
        let (_, catalog) = build(vec![
            node("p.I", DeclarationKind::Interface, None, &[], vec![method("p.I", "util", MethodKind::Static, false)]),
            node("p.Base", DeclarationKind::Class, Some(OBJECT), &[], vec![private]),
            node("p.C", DeclarationKind::Class, Some("p.Base"), &["p.I"], vec![]),
        ]);
        assert!(!catalog.has_method_named("p.C", "hidden"));
        assert!(!catalog.has_method_named("p.C", "util"));
        assert!(catalog.has_method_named("p.I", "util"));
    }

    #[test]
    fn test_default_constructor_synthesized_but_not_for_enums() {
        let mut color = node("p.Color", DeclarationKind::Enum, Some(OBJECT), &[], vec![]);
        color.methods.push(MethodInfo {
            kind: MethodKind::Constructor,
            ..method("p.Color", "Color", MethodKind::Constructor, false)
        });
        let (_, catalog) = build(vec![node("p.C", DeclarationKind::Class, Some(OBJECT), &[], vec![]), color]);
        let ctors = catalog.constructors("p.C");
        assert_eq!(ctors.len(), 1);
        assert_eq!(ctors[0].signature.encode(), "p.C:C()V");
        assert!(catalog.constructors("p.Color").is_empty());
    }

    #[test]
    fn test_overriders_cover_subtypes() {
        let (hierarchy, catalog) = build(vec![
            node("p.A", DeclarationKind::Class, Some(OBJECT), &[], vec![method("p.A", "f", MethodKind::Virtual, false)]),
            node("p.B", DeclarationKind::Class, Some("p.A"), &[], vec![method("p.B", "f", MethodKind::Virtual, false)]),
            node("p.C", DeclarationKind::Class, Some("p.A"), &[], vec![]),
        ]);
        let base = catalog.method(&Signature::decode("p.A:f()V").unwrap()).unwrap();
        let mut found: Vec<String> = catalog.overriders(&hierarchy, base).iter().map(|m| m.signature.encode()).collect();
        found.sort();
        assert_eq!(found, vec!["p.A:f()V", "p.B:f()V"]);
    }

    #[test]
    fn test_fields_hidden_by_name() {
        let mut base = node("p.Base", DeclarationKind::Class, Some(OBJECT), &[], vec![]);
        base.fields.insert(
            "x".into(),
            FieldInfo { name: "x".into(), declaring: "p.Base".into(), ty: JType::reference(OBJECT), is_static: false },
        );
        base.fields.insert(
            "y".into(),
            FieldInfo { name: "y".into(), declaring: "p.Base".into(), ty: JType::reference(OBJECT), is_static: false },
        );
        let mut sub = node("p.Sub", DeclarationKind::Class, Some("p.Base"), &[], vec![]);
        sub.fields.insert(
            "x".into(),
            FieldInfo { name: "x".into(), declaring: "p.Sub".into(), ty: JType::reference(OBJECT), is_static: false },
        );
        let (_, catalog) = build(vec![base, sub]);
        assert_eq!(catalog.field("p.Sub", "x").unwrap().declaring, "p.Sub");
        assert_eq!(catalog.field("p.Sub", "y").unwrap().declaring, "p.Base");
    }
}
