//! Root classification: methods the surrounding runtime calls.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::indexer::program::Program;
use crate::library::LibrarySpec;
use crate::models::{MethodInfo, MethodKind, Origin, Primitive, Signature, TypeDesc, STRING};

#[derive(Debug, Clone)]
pub struct RootClassifier {
    callbacks: BTreeMap<String, BTreeSet<String>>,
    include_main: bool,
}

impl RootClassifier {
    pub fn new(callbacks: BTreeMap<String, BTreeSet<String>>, include_main: bool) -> Self {
        RootClassifier {
            callbacks,
            include_main,
        }
    }

    pub fn from_library(library: &LibrarySpec, include_main: bool) -> Self {
        RootClassifier::new(library.callbacks.clone(), include_main)
    }

    /// Source methods with a body that only the runtime invokes: listed
    /// callbacks on subtypes of their listing type, static initializers,
    /// and (optionally) `main` entry points.
    pub fn classify(&self, program: &Program) -> BTreeSet<Signature> {
        let hierarchy = &program.hierarchy;
        let mut roots = BTreeSet::new();
        for node in hierarchy.nodes().filter(|n| n.origin == Origin::Source) {
            let listed: Vec<(&String, &BTreeSet<String>)> = self
                .callbacks
                .iter()
                .filter(|(owner, _)| hierarchy.is_subtype(&node.name, owner))
                .collect();
            for method in &node.methods {
                if program.body_of(&method.signature).is_none() {
                    continue;
                }
                let is_callback = method.kind != MethodKind::Static
                    && method.kind != MethodKind::Constructor
                    && listed
                        .iter()
                        .any(|(owner, names)| names.contains(method.name()) && overrides_listed(program, owner, method));
                if is_callback || (self.include_main && is_main(method)) {
                    roots.insert(method.signature.clone());
                }
            }
            let clinit = Signature::static_init(&node.name);
            if program.body_of(&clinit).is_some() {
                roots.insert(clinit);
            }
        }
        debug!(roots = roots.len(), "roots classified");
        roots
    }
}

/// `method` has the shape of the listed type's own declaration. A listed
/// type the library does not describe is matched by name alone.
fn overrides_listed(program: &Program, owner: &str, method: &MethodInfo) -> bool {
    let mut declared = program.catalog.methods_named(owner, method.name()).peekable();
    declared.peek().is_none() || declared.any(|listed| listed.same_shape(method))
}

/// `public static void main(String[])`.
fn is_main(method: &MethodInfo) -> bool {
    let string_array = TypeDesc::Array(Box::new(TypeDesc::reference(STRING)));
    method.kind == MethodKind::Static
        && method.name() == "main"
        && method.signature.params() == [string_array]
        && *method.signature.ret() == TypeDesc::Primitive(Primitive::Void)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::program::program_from_sources;

    fn roots(sources: &[&str], include_main: bool) -> Vec<String> {
        let program = program_from_sources(sources);
        let classifier = RootClassifier::from_library(&LibrarySpec::builtin().unwrap(), include_main);
        classifier.classify(&program).iter().map(Signature::encode).collect()
    }

    #[test]
    fn test_callbacks_on_subtypes_are_roots() {
        let found = roots(
            &["package web; \
               import javax.servlet.http.*; \
               class Page extends HttpServlet { \
                 protected void doGet(HttpServletRequest q, HttpServletResponse r) { render(); } \
                 void render() {} }"],
            false,
        );
        assert_eq!(
            found,
            vec!["web.Page:doGet(Qjavax.servlet.http.HttpServletRequest;Qjavax.servlet.http.HttpServletResponse;)V"]
        );
    }

    #[test]
    fn test_anonymous_runnable_is_a_root() {
        let found = roots(
            &["package p; class A { void go() { new Thread(new Runnable() { public void run() {} }).start(); } }"],
            false,
        );
        assert_eq!(found, vec!["p.A$1:run()V"]);
    }

    #[test]
    fn test_callback_overloads_are_not_roots() {
        let found = roots(
            &["package p; class Job implements Runnable { public void run() {} void run(int times) {} }"],
            false,
        );
        assert_eq!(found, vec!["p.Job:run()V"]);
    }

    #[test]
    fn test_main_and_static_initializers() {
        let source = "package p; class App { static int n = 1; public static void main(String[] args) {} static void main(int x) {} }";
        assert_eq!(roots(&[source], true), vec!["p.App:<clinit>()V", "p.App:main([Qjava.lang.String;)V"]);
        assert_eq!(roots(&[source], false), vec!["p.App:<clinit>()V"]);
    }
}
