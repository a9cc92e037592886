//! Two-phase orchestration with Rayon-based parallelism.
//!
//! Phase A parses every unit (in parallel) and then builds the frozen
//! [`Program`] sequentially. Phase B hands one unit per task to a worker
//! pool; each task resolves the bodies declared in its unit and the local
//! edge set is unioned into the global graph under a lock.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::time::Instant;

use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analysis::constraints::ConstraintEngine;
use crate::analysis::roots::RootClassifier;
use crate::config::AnalysisConfig;
use crate::errors::CgResult;
use crate::graph::{persist, CallGraph};
use crate::indexer::filesystem::{SourceFile, SourceModel};
use crate::indexer::hierarchy::CyclePolicy;
use crate::indexer::parser::parse_unit;
use crate::indexer::program::Program;
use crate::indexer::syntax::CompilationUnit;
use crate::library::LibrarySpec;
use crate::models::{CallGraphEdge, Signature};

/// Body summaries recurse through callees; give workers room for deep chains.
const WORKER_STACK_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisOptions {
    /// 0 selects Rayon's default thread count.
    pub workers: usize,
    pub cycle_policy: CyclePolicy,
    pub main_methods_as_roots: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        AnalysisOptions {
            workers: 0,
            cycle_policy: CyclePolicy::Degrade,
            main_methods_as_roots: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexStats {
    pub files_seen: usize,
    pub units: usize,
    pub units_failed: usize,
    pub types: usize,
    pub bodies: usize,
    pub roots: usize,
    pub edges: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug)]
pub struct AnalysisOutcome {
    pub graph: CallGraph,
    pub stats: IndexStats,
}

#[derive(Debug)]
pub struct RunReport {
    pub artifact: PathBuf,
    pub stats: IndexStats,
}

fn build_pool(workers: usize) -> Option<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .stack_size(WORKER_STACK_SIZE)
        .thread_name(|i| format!("cgraph-worker-{i}"))
        .build()
        .map_err(|e| warn!(error = %e, "worker pool unavailable, running sequentially"))
        .ok()
}

fn parse_worker(file: &SourceFile) -> Option<CompilationUnit> {
    match parse_unit(&file.path, &file.content) {
        Ok(unit) => Some(unit),
        Err(e) => {
            warn!(file = %file.path.display(), error = %e, "unit could not be parsed");
            None
        }
    }
}

/// Edges whose callers are the bodies declared in `unit`.
fn analyze_unit(program: &Program, unit: usize) -> Vec<CallGraphEdge> {
    let parsed = &program.units[unit];
    if parsed.unit.has_errors {
        warn!(file = %parsed.unit.path.display(), "syntax errors, unit contributes no edges");
        return Vec::new();
    }
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let mut engine = ConstraintEngine::new(program);
        let mut edges = Vec::new();
        for (caller, _, _) in program.unit_bodies(unit) {
            for callee in engine.callees_of(&caller) {
                edges.push(CallGraphEdge::new(caller.clone(), callee));
            }
        }
        edges
    }));
    match outcome {
        Ok(edges) => {
            debug!(file = %parsed.unit.path.display(), edges = edges.len(), "unit resolved");
            edges
        }
        Err(_) => {
            warn!(file = %parsed.unit.path.display(), "resolution panicked, unit contributes no edges");
            Vec::new()
        }
    }
}

/// Build the whole-program call graph for `model`.
///
/// Fails only in Phase A (library spec, hierarchy cycle under
/// [`CyclePolicy::Fail`]); per-unit problems are logged and skipped.
pub fn build_call_graph(
    model: &SourceModel,
    library: &LibrarySpec,
    options: &AnalysisOptions,
) -> CgResult<AnalysisOutcome> {
    let started = Instant::now();
    let pool = build_pool(options.workers);

    let parsed: Vec<Option<CompilationUnit>> = match &pool {
        Some(pool) => pool.install(|| model.files().par_iter().map(parse_worker).collect()),
        None => model.files().iter().map(parse_worker).collect(),
    };
    let mut units_failed = parsed.iter().filter(|u| u.is_none()).count();
    let units: Vec<CompilationUnit> = parsed.into_iter().flatten().collect();
    units_failed += units.iter().filter(|u| u.has_errors).count();

    let program = Program::build(units, library, options.cycle_policy)?;
    info!(
        units = program.units.len(),
        bodies = program.body_count(),
        "phase A complete"
    );

    let graph = Mutex::new(CallGraph::new());
    let merge = |unit: usize| {
        let edges = analyze_unit(&program, unit);
        if !edges.is_empty() {
            graph.lock().extend(edges);
        }
    };
    match &pool {
        Some(pool) => pool.install(|| (0..program.units.len()).into_par_iter().for_each(merge)),
        None => (0..program.units.len()).for_each(merge),
    }
    let mut graph = graph.into_inner();

    let roots = RootClassifier::from_library(library, options.main_methods_as_roots).classify(&program);
    for root in &roots {
        graph.add_edge(Signature::framework_root(), root.clone());
    }

    let stats = IndexStats {
        files_seen: model.files_seen(),
        units: program.units.len(),
        units_failed,
        types: program.source_type_count(),
        bodies: program.body_count(),
        roots: roots.len(),
        edges: graph.edge_count(),
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        edges = stats.edges,
        roots = stats.roots,
        units_failed = stats.units_failed,
        elapsed_ms = stats.elapsed_ms,
        "call graph built"
    );
    Ok(AnalysisOutcome { graph, stats })
}

/// Scan, analyze, and persist according to `config`.
pub fn run(config: &AnalysisConfig) -> CgResult<RunReport> {
    config.validate()?;
    let model = SourceModel::scan(&config.source_root, &config.include, &config.exclude)?;
    info!(
        root = %config.source_root.display(),
        files = model.len(),
        files_seen = model.files_seen(),
        "sources enumerated"
    );
    let library = config.load_library()?;
    let outcome = build_call_graph(&model, &library, &config.options())?;
    let artifact = persist::write_graph(
        &config.output_dir,
        &config.source_root,
        &outcome.graph,
        outcome.stats.clone(),
    )?;
    Ok(RunReport {
        artifact,
        stats: outcome.stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use crate::errors::CallGraphError;

    fn sig(text: &str) -> Signature {
        Signature::decode(text).unwrap()
    }

    fn analyze_with(sources: &[&str], options: AnalysisOptions) -> AnalysisOutcome {
        let model = SourceModel::from_sources(
            Path::new("mem"),
            sources
                .iter()
                .enumerate()
                .map(|(i, s)| (format!("Unit{i}.java"), s.to_string())),
        );
        build_call_graph(&model, &LibrarySpec::builtin().unwrap(), &options).unwrap()
    }

    fn analyze(sources: &[&str]) -> CallGraph {
        analyze_with(sources, AnalysisOptions::default()).graph
    }

    fn callees(graph: &CallGraph, caller: &str) -> Vec<String> {
        graph.callees_of(&sig(caller)).iter().map(Signature::encode).collect()
    }

    #[test]
    fn test_loop_reassignment_through_overridden_method() {
        let graph = analyze(&["package s1; \
            class A { A foo(A other) { return new B(); } } \
            class B extends A { A foo(A other) { return new D(); } } \
            class D extends A { A foo(A other) { return new A(); } } \
            class C { void foo(A a) {} } \
            class Main { void loop() { \
                A x = new B(); C y = new C(); \
                for (int i = 0; i < 3; i++) { x = x.foo(new B()); y.foo(x); } } }"]);
        let found = callees(&graph, "s1.Main:loop()V");
        assert!(found.contains(&"s1.B:foo(Qs1.A;)Qs1.A;".to_string()));
        assert!(found.contains(&"s1.D:foo(Qs1.A;)Qs1.A;".to_string()));
        assert!(found.contains(&"s1.C:foo(Qs1.A;)V".to_string()));
        assert!(graph
            .callers_of(&sig("s1.D:foo(Qs1.A;)Qs1.A;"))
            .contains(&sig("s1.Main:loop()V")));
        let on_c: Vec<&String> = found.iter().filter(|s| s.starts_with("s1.C:")).collect();
        assert_eq!(on_c, vec!["s1.C:C()V", "s1.C:foo(Qs1.A;)V"]);
    }

    #[test]
    fn test_field_initializer_and_block_both_reach() {
        let graph = analyze(&["package s2; \
            class Inner { void foo() {} } \
            class D extends Inner { void foo() {} } \
            class F extends Inner { void foo() {} } \
            class G extends Inner { void foo() {} } \
            class Box { Inner mm; } \
            class C extends Box { C() { mm = new D(); } } \
            class E extends Box { E() { mm = new F(); } } \
            class Main { Box b = new C(); { b = new E(); } void run() { b.mm.foo(); } }"]);
        let found = callees(&graph, "s2.Main:run()V");
        assert!(found.contains(&"s2.D:foo()V".to_string()));
        assert!(found.contains(&"s2.F:foo()V".to_string()));
        assert!(!found.contains(&"s2.G:foo()V".to_string()));

        let init = callees(&graph, "s2.Main:Main()V");
        assert!(init.contains(&"s2.C:C()V".to_string()));
        assert!(init.contains(&"s2.E:E()V".to_string()));
        assert!(callees(&graph, "s2.C:C()V").contains(&"s2.D:D()V".to_string()));
    }

    #[test]
    fn test_polymorphic_self_call() {
        let graph = analyze(&["package s3; \
            class X { void foo() {} void bar() { foo(); } } \
            class Y extends X { void foo() {} } \
            class Z extends X { void foo() {} }"]);
        assert_eq!(
            callees(&graph, "s3.X:bar()V"),
            vec!["s3.X:foo()V", "s3.Y:foo()V", "s3.Z:foo()V"]
        );
    }

    #[test]
    fn test_default_method_through_accessor_chain() {
        let graph = analyze(&[
            "package s4; \
             public interface IBaritone { void go(); }",
            "package s4; \
             public interface IProvider { \
                IBaritone getPrimary(); \
                default IBaritone getBaritoneForPlayer(String player) { return getPrimary(); } }",
            "package s4; \
             class Baritone implements IBaritone { public void go() {} } \
             class Provider implements IProvider { public IBaritone getPrimary() { return new Baritone(); } } \
             class Api { static IProvider provider() { return new Provider(); } } \
             class Main { void run() { Api.provider().getBaritoneForPlayer(\"me\").go(); } }",
        ]);
        let found = callees(&graph, "s4.Main:run()V");
        assert!(found.contains(&"s4.Api:provider()Qs4.IProvider;".to_string()));
        assert!(found.contains(&"s4.IProvider:getBaritoneForPlayer(Qjava.lang.String;)Qs4.IBaritone;".to_string()));
        assert!(found.contains(&"s4.Baritone:go()V".to_string()));
        assert!(callees(&graph, "s4.IProvider:getBaritoneForPlayer(Qjava.lang.String;)Qs4.IBaritone;")
            .contains(&"s4.Provider:getPrimary()Qs4.IBaritone;".to_string()));
    }

    #[test]
    fn test_enum_constant_bodies_do_not_break_resolution() {
        let graph = analyze(&["package s5; \
            enum Op { \
              PLUS { int apply(int a, int b) { return a + b; } }, \
              MINUS { int apply(int a, int b) { return a - b; } }; \
              int apply(int a, int b) { return 0; } } \
            class Calc { int run(Op op) { return op.apply(1, 2); } }"]);
        assert_eq!(callees(&graph, "s5.Calc:run(Qs5.Op;)I"), vec!["s5.Op:apply(II)I"]);
    }

    #[test]
    fn test_roots_hang_off_the_framework_marker() {
        let graph = analyze(&["package r; \
            class Job implements Runnable { public void run() { step(); } void step() {} } \
            class App { public static void main(String[] args) {} }"]);
        let roots = callees(&graph, "<framework>:root()V");
        assert_eq!(roots, vec!["r.App:main([Qjava.lang.String;)V", "r.Job:run()V"]);

        let no_main = analyze_with(
            &["package r; class App { public static void main(String[] args) {} }"],
            AnalysisOptions {
                main_methods_as_roots: false,
                ..AnalysisOptions::default()
            },
        );
        assert!(no_main.graph.callees_of(&Signature::framework_root()).is_empty());
    }

    #[test]
    fn test_unit_with_syntax_errors_contributes_nothing() {
        let outcome = analyze_with(
            &[
                "package p; class Broken { void f() { g( } void g() {} }",
                "package p; class Fine { void a() { b(); } void b() {} }",
            ],
            AnalysisOptions::default(),
        );
        assert_eq!(outcome.stats.units_failed, 1);
        assert!(outcome.graph.edges().all(|(caller, _)| caller.declaring() != "p.Broken"));
        assert!(outcome.graph.contains_edge(&sig("p.Fine:a()V"), &sig("p.Fine:b()V")));
    }

    #[test]
    fn test_result_is_independent_of_worker_count() {
        let sources = [
            "package w; class A { void m() {} void call(A a) { a.m(); } }",
            "package w; class B extends A { void m() { super.m(); } }",
            "package w; class C { void go() { new B().call(new A()); } }",
        ];
        let single = analyze_with(&sources, AnalysisOptions { workers: 1, ..AnalysisOptions::default() });
        let many = analyze_with(&sources, AnalysisOptions { workers: 4, ..AnalysisOptions::default() });
        assert_eq!(single.graph, many.graph);
        assert!(single.graph.contains_edge(&sig("w.B:m()V"), &sig("w.A:m()V")));
    }

    #[test]
    fn test_deep_call_chain_completes_on_workers() {
        let depth = 2000;
        let mut source = String::from("package d; class A { void m() {} } class Chain { ");
        for i in 0..depth {
            source.push_str(&format!("A f{i}() {{ return f{}(); }} ", i + 1));
        }
        source.push_str(&format!("A f{depth}() {{ return new A(); }} }} "));
        source.push_str("class Main { void run(Chain c) { c.f0().m(); } }");

        let options = AnalysisOptions {
            workers: 2,
            ..AnalysisOptions::default()
        };
        let outcome = analyze_with(&[source.as_str()], options);
        assert_eq!(outcome.stats.units_failed, 0);
        assert!(outcome.graph.contains_edge(&sig("d.Main:run(Qd.Chain;)V"), &sig("d.A:m()V")));
        assert!(outcome.graph.contains_edge(&sig("d.Chain:f0()Qd.A;"), &sig("d.Chain:f1()Qd.A;")));
    }

    #[test]
    fn test_cycle_policy_fail_aborts() {
        let model = SourceModel::from_sources(
            Path::new("mem"),
            [("Cycle.java", "package c; class A extends B {} class B extends A {}")],
        );
        let options = AnalysisOptions {
            cycle_policy: CyclePolicy::Fail,
            ..AnalysisOptions::default()
        };
        let err = build_call_graph(&model, &LibrarySpec::builtin().unwrap(), &options).unwrap_err();
        assert!(matches!(err, CallGraphError::HierarchyCycle(_)));
    }

    #[test]
    fn test_run_persists_artifact() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        std::fs::write(
            src.path().join("Main.java"),
            "package m; class Main { public static void main(String[] a) { new Main().go(); } void go() {} }",
        )
        .unwrap();
        let config = AnalysisConfig {
            source_root: src.path().to_path_buf(),
            output_dir: out.path().to_path_buf(),
            ..AnalysisConfig::default()
        };
        let report = run(&config).unwrap();
        let document = persist::read_graph(&report.artifact).unwrap();
        let graph = document.to_graph();
        assert!(graph.contains_edge(
            &sig("m.Main:main([Qjava.lang.String;)V"),
            &sig("m.Main:go()V")
        ));
        assert_eq!(document.stats, report.stats);
    }
}
