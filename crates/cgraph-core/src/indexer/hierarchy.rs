//! Closed class-hierarchy index.
//!
//! Built once from source and library type nodes, then shared read-only by
//! every resolver thread. Direct edges come first; a work-list fixed point
//! then computes transitive descendants and, inverted, ancestors.

use std::collections::{BTreeSet, HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{CallGraphError, CgResult};
use crate::models::{JType, TypeDesc, TypeNode, OBJECT};

/// What to do when the declared supertypes form a cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePolicy {
    /// Types on the cycle lose their supertype edges; a warning is logged.
    #[default]
    Degrade,
    /// Abort indexing with [`CallGraphError::HierarchyCycle`].
    Fail,
}

static EMPTY_NAMES: Vec<String> = Vec::new();
static EMPTY_SET: BTreeSet<String> = BTreeSet::new();

#[derive(Debug, Default)]
pub struct HierarchyIndex {
    nodes: HashMap<String, TypeNode>,
    subtypes: HashMap<String, Vec<String>>,
    descendants: HashMap<String, BTreeSet<String>>,
    ancestors: HashMap<String, BTreeSet<String>>,
}

impl HierarchyIndex {
    /// Later nodes with the same name replace earlier ones, so source types
    /// listed after library types shadow them.
    pub fn build(nodes: Vec<TypeNode>, policy: CyclePolicy) -> CgResult<Self> {
        let mut by_name: HashMap<String, TypeNode> = HashMap::with_capacity(nodes.len());
        for node in nodes {
            by_name.insert(node.name.clone(), node);
        }

        // Phase 1: direct edges.
        let mut dangling = Vec::new();
        for node in by_name.values_mut() {
            let own = node.name.clone();
            if node.superclass.as_deref() == Some(own.as_str()) {
                warn!(type_name = %own, "rejecting self-edge in superclass");
                node.superclass = None;
            }
            if node.interfaces.iter().any(|i| *i == own) {
                warn!(type_name = %own, "rejecting self-edge in interfaces");
                node.interfaces.retain(|i| *i != own);
            }
            dangling.extend(node.direct_supertypes().map(str::to_string));
        }
        for name in dangling {
            if !by_name.contains_key(&name) {
                debug!(type_name = %name, "supertype not declared, indexing as dangling");
                by_name.insert(name.clone(), TypeNode::dangling(name));
            }
        }

        let cyclic = find_cycles(&by_name);
        if !cyclic.is_empty() {
            match policy {
                CyclePolicy::Fail => return Err(CallGraphError::HierarchyCycle(cyclic)),
                CyclePolicy::Degrade => {
                    warn!(types = ?cyclic, "hierarchy cycle detected, dropping supertype edges");
                    for name in &cyclic {
                        if let Some(node) = by_name.get_mut(name) {
                            node.superclass = None;
                            node.interfaces.clear();
                            node.super_args.clear();
                        }
                    }
                }
            }
        }

        let mut subtypes: HashMap<String, Vec<String>> = HashMap::new();
        for node in by_name.values() {
            for sup in node.direct_supertypes() {
                subtypes.entry(sup.to_string()).or_default().push(node.name.clone());
            }
        }
        for children in subtypes.values_mut() {
            children.sort();
            children.dedup();
        }

        // Phase 2: work-list closure over descendants.
        let mut descendants: HashMap<String, BTreeSet<String>> = subtypes
            .iter()
            .filter(|(name, _)| name.as_str() != OBJECT)
            .map(|(name, children)| (name.clone(), children.iter().cloned().collect()))
            .collect();
        let mut work: VecDeque<String> = by_name.keys().cloned().collect();
        while let Some(name) = work.pop_front() {
            let Some(node) = by_name.get(&name) else {
                continue;
            };
            let mut carried = descendants.get(&name).cloned().unwrap_or_default();
            carried.insert(name.clone());
            for sup in node.direct_supertypes() {
                if sup == OBJECT {
                    continue;
                }
                let entry = descendants.entry(sup.to_string()).or_default();
                let before = entry.len();
                entry.extend(carried.iter().cloned());
                if entry.len() != before {
                    work.push_back(sup.to_string());
                }
            }
        }

        let mut ancestors: HashMap<String, BTreeSet<String>> = HashMap::new();
        for (ancestor, below) in &descendants {
            for name in below {
                ancestors.entry(name.clone()).or_default().insert(ancestor.clone());
            }
        }

        Ok(HierarchyIndex {
            nodes: by_name,
            subtypes,
            descendants,
            ancestors,
        })
    }

    pub fn get(&self, name: &str) -> Option<&TypeNode> {
        self.nodes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TypeNode> {
        self.nodes.values()
    }

    pub fn direct_subtypes(&self, name: &str) -> &[String] {
        self.subtypes.get(name).unwrap_or(&EMPTY_NAMES)
    }

    /// Transitive subtypes, excluding `name`. Always empty for `Object`.
    pub fn descendants(&self, name: &str) -> &BTreeSet<String> {
        self.descendants.get(name).unwrap_or(&EMPTY_SET)
    }

    /// Transitive supertypes, excluding `name` and `Object`.
    pub fn ancestors(&self, name: &str) -> &BTreeSet<String> {
        self.ancestors.get(name).unwrap_or(&EMPTY_SET)
    }

    pub fn is_subtype(&self, sub: &str, sup: &str) -> bool {
        sub == sup || sup == OBJECT || self.ancestors(sub).contains(sup)
    }

    pub fn superclass_of(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|n| n.superclass.as_deref())
    }

    /// CHA expansion: the type itself plus every transitive subtype.
    pub fn cha(&self, name: &str) -> BTreeSet<String> {
        let mut set = self.descendants(name).clone();
        set.insert(name.to_string());
        set
    }

    /// Bindings of `ancestor`'s type parameters as seen from `receiver`.
    ///
    /// `ArrayList<String>` viewed as `Collection` binds `E -> String`. Raw or
    /// unrelated receivers give an empty map.
    pub fn type_args_for(&self, receiver: &JType, ancestor: &str) -> HashMap<String, JType> {
        let mut bindings = self.walk_type_args(receiver, ancestor);
        bindings.retain(|_, ty| !matches!(ty.desc, TypeDesc::TypeVar(_)));
        bindings
    }

    fn walk_type_args(&self, receiver: &JType, ancestor: &str) -> HashMap<String, JType> {
        let Some(start) = receiver.reference_name() else {
            return HashMap::new();
        };
        let Some(node) = self.get(start) else {
            return HashMap::new();
        };
        let initial = bind_params(node, &receiver.args);
        if start == ancestor {
            return initial;
        }

        let mut queue = VecDeque::from([(start.to_string(), initial)]);
        let mut seen = BTreeSet::from([start.to_string()]);
        while let Some((current, bindings)) = queue.pop_front() {
            let Some(node) = self.get(&current) else {
                continue;
            };
            for sup in node.direct_supertypes() {
                if !seen.insert(sup.to_string()) {
                    continue;
                }
                let Some(sup_node) = self.get(sup) else {
                    continue;
                };
                let args: Vec<JType> = node
                    .super_args
                    .get(sup)
                    .map(|args| args.iter().map(|a| a.substitute(&bindings)).collect())
                    .unwrap_or_default();
                let next = bind_params(sup_node, &args);
                if sup == ancestor {
                    return next;
                }
                queue.push_back((sup.to_string(), next));
            }
        }
        HashMap::new()
    }
}

fn bind_params(node: &TypeNode, args: &[JType]) -> HashMap<String, JType> {
    if args.len() != node.type_params.len() {
        return HashMap::new();
    }
    node.type_params
        .iter()
        .zip(args)
        .map(|(param, arg)| (param.name.clone(), arg.clone()))
        .collect()
}

/// Types that sit on a supertype cycle, sorted.
fn find_cycles(nodes: &HashMap<String, TypeNode>) -> Vec<String> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut cyclic: BTreeSet<String> = BTreeSet::new();
    let mut names: Vec<&str> = nodes.keys().map(String::as_str).collect();
    names.sort_unstable();

    for root in names {
        if marks.contains_key(root) {
            continue;
        }
        // Iterative DFS keeping the current path for cycle extraction.
        let mut path: Vec<&str> = vec![root];
        let mut iters: Vec<Vec<&str>> = vec![supers(nodes, root)];
        marks.insert(root, Mark::Visiting);
        while let Some(pending) = iters.last_mut() {
            match pending.pop() {
                Some(next) => match marks.get(next) {
                    Some(Mark::Visiting) => {
                        if let Some(pos) = path.iter().position(|p| *p == next) {
                            cyclic.extend(path[pos..].iter().map(|p| p.to_string()));
                        }
                    }
                    Some(Mark::Done) => {}
                    None => {
                        marks.insert(next, Mark::Visiting);
                        path.push(next);
                        iters.push(supers(nodes, next));
                    }
                },
                None => {
                    iters.pop();
                    if let Some(done) = path.pop() {
                        marks.insert(done, Mark::Done);
                    }
                }
            }
        }
    }
    cyclic.into_iter().collect()
}

fn supers<'a>(nodes: &'a HashMap<String, TypeNode>, name: &str) -> Vec<&'a str> {
    nodes
        .get(name)
        .map(|n| n.direct_supertypes().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeclarationKind, Origin, TypeParam};

    fn class(name: &str, sup: Option<&str>, interfaces: &[&str]) -> TypeNode {
        let mut node = TypeNode::new(name, DeclarationKind::Class, Origin::Source);
        node.superclass = sup.map(str::to_string);
        node.interfaces = interfaces.iter().map(|s| s.to_string()).collect();
        node
    }

    fn iface(name: &str, supers: &[&str]) -> TypeNode {
        let mut node = TypeNode::new(name, DeclarationKind::Interface, Origin::Source);
        node.interfaces = supers.iter().map(|s| s.to_string()).collect();
        node
    }

    #[test]
    fn test_descendant_closure() {
        let index = HierarchyIndex::build(
            vec![
                class(OBJECT, None, &[]),
                iface("p.I", &[]),
                iface("p.J", &["p.I"]),
                class("p.A", Some(OBJECT), &["p.J"]),
                class("p.B", Some("p.A"), &[]),
                class("p.C", Some("p.B"), &[]),
            ],
            CyclePolicy::Degrade,
        )
        .unwrap();
        let below_i: Vec<&str> = index.descendants("p.I").iter().map(String::as_str).collect();
        assert_eq!(below_i, vec!["p.A", "p.B", "p.C", "p.J"]);
        assert!(index.descendants(OBJECT).is_empty());
        assert!(index.is_subtype("p.C", "p.I"));
        assert!(index.is_subtype("p.C", OBJECT));
        assert!(!index.is_subtype("p.A", "p.B"));
        assert_eq!(index.direct_subtypes("p.A"), ["p.B".to_string()]);
        assert!(index.ancestors("p.C").contains("p.A"));
    }

    #[test]
    fn test_missing_supertype_becomes_dangling() {
        let index =
            HierarchyIndex::build(vec![class("p.A", Some("ext.Base"), &[])], CyclePolicy::Degrade).unwrap();
        let base = index.get("ext.Base").unwrap();
        assert_eq!(base.origin, Origin::Dangling);
        assert!(base.superclass.is_none());
        assert!(index.is_subtype("p.A", "ext.Base"));
    }

    #[test]
    fn test_self_edge_rejected() {
        let index = HierarchyIndex::build(vec![class("p.A", Some("p.A"), &[])], CyclePolicy::Fail).unwrap();
        assert!(index.get("p.A").unwrap().superclass.is_none());
    }

    #[test]
    fn test_cycle_policy_fail() {
        let result = HierarchyIndex::build(
            vec![class("p.A", Some("p.B"), &[]), class("p.B", Some("p.A"), &[]), class("p.C", Some("p.A"), &[])],
            CyclePolicy::Fail,
        );
        match result {
            Err(CallGraphError::HierarchyCycle(types)) => assert_eq!(types, vec!["p.A", "p.B"]),
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn test_cycle_policy_degrade() {
        let index = HierarchyIndex::build(
            vec![class("p.A", Some("p.B"), &[]), class("p.B", Some("p.A"), &[]), class("p.C", Some("p.A"), &[])],
            CyclePolicy::Degrade,
        )
        .unwrap();
        assert!(index.get("p.A").unwrap().superclass.is_none());
        assert!(index.get("p.B").unwrap().superclass.is_none());
        assert_eq!(index.superclass_of("p.C"), Some("p.A"));
        assert!(index.descendants("p.A").contains("p.C"));
    }

    #[test]
    fn test_type_args_follow_supertype_chain() {
        let mut coll = iface("u.Coll", &[]);
        coll.type_params = vec![TypeParam { name: "E".into(), bound: None }];
        let mut list = iface("u.List", &["u.Coll"]);
        list.type_params = vec![TypeParam { name: "T".into(), bound: None }];
        list.super_args.insert("u.Coll".into(), vec![JType::new(TypeDesc::TypeVar("T".into()))]);
        let index = HierarchyIndex::build(vec![coll, list], CyclePolicy::Degrade).unwrap();

        let receiver = JType::with_args(TypeDesc::reference("u.List"), vec![JType::reference("p.Item")]);
        let bindings = index.type_args_for(&receiver, "u.Coll");
        assert_eq!(bindings["E"], JType::reference("p.Item"));
        assert!(index.type_args_for(&JType::reference("u.List"), "u.Coll").is_empty());
    }
}
