//! Type-name binding: turns names as written into qualified binary names.
//!
//! Lookup order for a simple name: type variables in scope, the current type
//! and its lexically enclosing types (and their member types), single-type
//! imports, the current package, on-demand imports, `java.lang`, then a
//! unique simple name across the program. Anything left is dangling and
//! kept as written.

use std::collections::{HashMap, HashSet};

use crate::indexer::syntax::{CompilationUnit, TypeRef};
use crate::models::{simple_name, JType, Primitive, TypeDesc};

/// Every type name known to the run, source and library.
#[derive(Debug, Default)]
pub struct TypeNames {
    known: HashSet<String>,
    by_simple: HashMap<String, Vec<String>>,
}

impl TypeNames {
    pub fn new<I: IntoIterator<Item = String>>(names: I) -> Self {
        let mut index = TypeNames::default();
        for name in names {
            index.insert(name);
        }
        index
    }

    pub fn insert(&mut self, name: String) {
        if self.known.insert(name.clone()) {
            self.by_simple
                .entry(simple_name(&name).to_string())
                .or_default()
                .push(name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.known.contains(name)
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    fn unique_simple(&self, simple: &str) -> Option<&str> {
        match self.by_simple.get(simple).map(Vec::as_slice) {
            Some([only]) => Some(only),
            _ => None,
        }
    }

    /// `a.b.Outer.Inner` -> `a.b.Outer$Inner` when that type exists.
    pub fn resolve_dotted(&self, dotted: &str) -> Option<String> {
        if self.contains(dotted) {
            return Some(dotted.to_string());
        }
        let segments: Vec<&str> = dotted.split('.').collect();
        for split in (1..segments.len()).rev() {
            let candidate = format!("{}${}", segments[..split].join("."), segments[split..].join("$"));
            if self.contains(&candidate) {
                return Some(candidate);
            }
        }
        None
    }
}

/// Enclosing-type chain derived from a binary name: `p.A$B$1` yields
/// `p.A$B$1`, `p.A$B`, `p.A`.
pub fn lexical_chain(type_name: &str) -> Vec<&str> {
    let mut chain = vec![type_name];
    let mut current = type_name;
    while let Some(pos) = current.rfind('$') {
        current = &current[..pos];
        chain.push(current);
    }
    chain
}

/// Per-unit import table.
#[derive(Debug, Default, Clone)]
pub struct UnitScope {
    package: Option<String>,
    single: HashMap<String, String>,
    on_demand: Vec<String>,
    static_single: Vec<(String, String)>,
    static_on_demand: Vec<String>,
}

impl UnitScope {
    pub fn new(unit: &CompilationUnit) -> Self {
        let mut scope = UnitScope {
            package: unit.package.clone(),
            ..UnitScope::default()
        };
        for import in &unit.imports {
            match (import.is_static, import.is_wildcard) {
                (false, false) => {
                    let simple = import.path.rsplit('.').next().unwrap_or(&import.path);
                    scope.single.insert(simple.to_string(), import.path.clone());
                }
                (false, true) => scope.on_demand.push(import.path.clone()),
                (true, false) => {
                    if let Some((owner, member)) = import.path.rsplit_once('.') {
                        scope.static_single.push((member.to_string(), owner.to_string()));
                    }
                }
                (true, true) => scope.static_on_demand.push(import.path.clone()),
            }
        }
        scope
    }

    pub fn package(&self) -> Option<&str> {
        self.package.as_deref()
    }

    /// Resolve a type name as written. `None` means the name is not a known
    /// type (it may be a variable or a package prefix).
    pub fn resolve_known(&self, names: &TypeNames, written: &str, current: Option<&str>) -> Option<String> {
        if written.contains('.') {
            let (head, rest) = written.split_once('.')?;
            if let Some(outer) = self.resolve_known(names, head, current) {
                if let Some(found) = names.resolve_dotted(&format!("{outer}.{rest}")) {
                    return Some(found);
                }
            }
            return names.resolve_dotted(written);
        }

        if let Some(current) = current {
            for owner in lexical_chain(current) {
                if simple_name(owner) == written {
                    return Some(owner.to_string());
                }
                let member = format!("{owner}${written}");
                if names.contains(&member) {
                    return Some(member);
                }
            }
        }
        if let Some(path) = self.single.get(written) {
            if let Some(found) = names.resolve_dotted(path) {
                return Some(found);
            }
        }
        let same_package = match &self.package {
            Some(package) => format!("{package}.{written}"),
            None => written.to_string(),
        };
        if names.contains(&same_package) {
            return Some(same_package);
        }
        for prefix in &self.on_demand {
            if let Some(found) = names.resolve_dotted(&format!("{prefix}.{written}")) {
                return Some(found);
            }
        }
        let lang = format!("java.lang.{written}");
        if names.contains(&lang) {
            return Some(lang);
        }
        names.unique_simple(written).map(str::to_string)
    }

    /// Resolve a type name, falling back to a dangling name.
    pub fn resolve_type_name(&self, names: &TypeNames, written: &str, current: Option<&str>) -> String {
        if let Some(found) = self.resolve_known(names, written, current) {
            return found;
        }
        match self.single.get(written) {
            Some(path) => path.clone(),
            None => written.to_string(),
        }
    }

    /// Bind a written type to a static type. Callers handle `var` first.
    pub fn bind(&self, names: &TypeNames, ty: &TypeRef, current: Option<&str>, vars: &[String]) -> JType {
        let base = if let Some(p) = Primitive::from_keyword(&ty.name) {
            JType::new(TypeDesc::Primitive(p))
        } else if vars.iter().any(|v| *v == ty.name) {
            JType::new(TypeDesc::TypeVar(ty.name.clone()))
        } else {
            let args = ty
                .args
                .iter()
                .map(|a| self.bind(names, a, current, vars))
                .collect();
            JType::with_args(
                TypeDesc::Reference(self.resolve_type_name(names, &ty.name, current)),
                args,
            )
        };
        (0..ty.dims).fold(base, |element, _| {
            JType::with_args(TypeDesc::Array(Box::new(element.desc)), element.args)
        })
    }

    /// Types a statically imported member named `member` may come from.
    pub fn static_import_owners(&self, names: &TypeNames, member: &str) -> Vec<String> {
        let mut owners = Vec::new();
        for (name, owner) in &self.static_single {
            if name == member {
                if let Some(found) = names.resolve_dotted(owner) {
                    owners.push(found);
                }
            }
        }
        for owner in &self.static_on_demand {
            if let Some(found) = names.resolve_dotted(owner) {
                if !owners.contains(&found) {
                    owners.push(found);
                }
            }
        }
        owners
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::syntax::Import;
    use std::path::PathBuf;

    fn unit(package: Option<&str>, imports: &[(&str, bool, bool)]) -> CompilationUnit {
        CompilationUnit {
            path: PathBuf::from("X.java"),
            package: package.map(str::to_string),
            imports: imports
                .iter()
                .map(|(path, is_static, is_wildcard)| Import {
                    path: path.to_string(),
                    is_static: *is_static,
                    is_wildcard: *is_wildcard,
                })
                .collect(),
            types: Vec::new(),
            has_errors: false,
        }
    }

    fn names() -> TypeNames {
        TypeNames::new(
            [
                "java.lang.String",
                "java.util.List",
                "java.util.Map",
                "java.util.Map$Entry",
                "a.A",
                "a.A$Inner",
                "b.Helper",
                "c.Unique",
            ]
            .into_iter()
            .map(str::to_string),
        )
    }

    #[test]
    fn test_resolution_order() {
        let names = names();
        let scope = UnitScope::new(&unit(Some("a"), &[("java.util.List", false, false), ("b", false, true)]));
        assert_eq!(scope.resolve_type_name(&names, "Inner", Some("a.A")), "a.A$Inner");
        assert_eq!(scope.resolve_type_name(&names, "A", Some("a.A$Inner")), "a.A");
        assert_eq!(scope.resolve_type_name(&names, "List", None), "java.util.List");
        assert_eq!(scope.resolve_type_name(&names, "Helper", None), "b.Helper");
        assert_eq!(scope.resolve_type_name(&names, "String", None), "java.lang.String");
        assert_eq!(scope.resolve_type_name(&names, "Unique", None), "c.Unique");
        assert_eq!(scope.resolve_type_name(&names, "Missing", None), "Missing");
    }

    #[test]
    fn test_dotted_names_resolve_nested_types() {
        let names = names();
        let scope = UnitScope::new(&unit(None, &[("java.util.Map", false, false)]));
        assert_eq!(scope.resolve_type_name(&names, "Map.Entry", None), "java.util.Map$Entry");
        assert_eq!(scope.resolve_type_name(&names, "java.util.Map.Entry", None), "java.util.Map$Entry");
    }

    #[test]
    fn test_bind_type_vars_and_arrays() {
        let names = names();
        let scope = UnitScope::new(&unit(Some("a"), &[]));
        let ty = TypeRef {
            name: "java.util.List".into(),
            args: vec![TypeRef::named("T")],
            dims: 1,
        };
        let bound = scope.bind(&names, &ty, None, &["T".to_string()]);
        assert_eq!(bound.desc.encode(), "[Qjava.util.List;");
        assert_eq!(bound.args[0].desc, TypeDesc::TypeVar("T".into()));
    }

    #[test]
    fn test_static_import_owners() {
        let names = names();
        let scope = UnitScope::new(&unit(None, &[("b.Helper.run", true, false), ("a.A", true, true)]));
        assert_eq!(scope.static_import_owners(&names, "run"), vec!["b.Helper", "a.A"]);
        assert_eq!(scope.static_import_owners(&names, "other"), vec!["a.A"]);
    }

    #[test]
    fn test_lexical_chain() {
        assert_eq!(lexical_chain("p.A$B$1"), vec!["p.A$B$1", "p.A$B", "p.A"]);
    }
}
