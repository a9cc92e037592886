//! Criterion benchmarks for cgraph-core.
//!
//! ## Benchmark groups
//!
//! 1. **signature**: Encode/decode of the wire format.
//! 2. **front_end**: tree-sitter parse plus lowering of one unit.
//! 3. **pipeline**: End-to-end graph construction on synthetic projects.
//! 4. **queries**: Bounded walks and root reachability on a built graph.
//!
//! ## Running
//!
//! ```sh
//! cargo bench --manifest-path crates/cgraph-core/Cargo.toml
//! # Run only the pipeline group:
//! cargo bench --manifest-path crates/cgraph-core/Cargo.toml -- pipeline
//! ```

use std::path::Path;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use cgraph_core::graph::query::{reachable_from_root, walk, Direction};
use cgraph_core::indexer::parser::parse_unit;
use cgraph_core::{build_call_graph, AnalysisOptions, LibrarySpec, Signature, SourceModel};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// One unit per family: an abstract base with `width` overriding subclasses,
/// a holder whose field is written from several constructors, and a driver
/// calling through both. Each family's driver also calls into the previous
/// family so the graph is connected.
fn synthetic_project(families: usize, width: usize) -> SourceModel {
    let mut sources = Vec::with_capacity(families);
    for f in 0..families {
        let mut src = format!(
            "package gen.f{f};\n\
             import java.util.*;\n\
             abstract class Shape{f} {{\n\
               abstract int area(int scale);\n\
               int twice(int scale) {{ return area(scale) * 2; }}\n\
             }}\n"
        );
        for w in 0..width {
            src.push_str(&format!(
                "class Shape{f}_{w} extends Shape{f} {{\n\
                   int area(int scale) {{ return scale + {w}; }}\n\
                 }}\n"
            ));
        }
        src.push_str(&format!(
            "class Holder{f} {{\n\
               Shape{f} shape = new Shape{f}_0();\n\
               List<Shape{f}> all = new ArrayList<>();\n\
               {{ shape = new Shape{f}_{last}(); }}\n\
               Holder{f}(boolean flip) {{ if (flip) {{ shape = new Shape{f}_0(); }} all.add(shape); }}\n\
             }}\n\
             public class Driver{f} implements Runnable {{\n\
               public void run() {{\n\
                 Holder{f} h = new Holder{f}(true);\n\
                 for (int i = 0; i < 10; i++) {{ h.shape.twice(i); }}\n\
                 for (Shape{f} s : h.all) {{ s.area(1); }}\n",
            last = width.saturating_sub(1)
        ));
        if f > 0 {
            src.push_str(&format!(
                "    new gen.f{prev}.Driver{prev}().run();\n",
                prev = f - 1
            ));
        }
        src.push_str("  }\n}\n");
        sources.push((format!("gen/f{f}/Driver{f}.java"), src));
    }
    SourceModel::from_sources(Path::new("gen"), sources)
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_signature(c: &mut Criterion) {
    let mut group = c.benchmark_group("signature");
    let text = "com.example.service.OrderService$Handler:submit(Qcom.example.Order;[IJTT;)Qjava.util.List;";
    let sig = Signature::decode(text).unwrap();

    group.bench_function("decode", |b| b.iter(|| Signature::decode(black_box(text)).unwrap()));
    group.bench_function("encode", |b| b.iter(|| black_box(&sig).encode()));
    group.finish();
}

fn bench_front_end(c: &mut Criterion) {
    let mut group = c.benchmark_group("front_end");
    let model = synthetic_project(1, 50);
    let file = &model.files()[0];

    group.bench_function("parse_unit_50_classes", |b| {
        b.iter(|| parse_unit(black_box(&file.path), black_box(&file.content)).unwrap())
    });
    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.sample_size(10);
    let library = LibrarySpec::builtin().unwrap();

    for &families in &[10usize, 50, 200] {
        let model = synthetic_project(families, 8);
        for &workers in &[1usize, 0] {
            let options = AnalysisOptions {
                workers,
                ..AnalysisOptions::default()
            };
            let label = if workers == 0 { "parallel" } else { "single" };
            group.bench_with_input(
                BenchmarkId::new(label, families),
                &families,
                |b, _| b.iter(|| build_call_graph(&model, &library, &options).unwrap()),
            );
        }
    }
    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("queries");
    let model = synthetic_project(100, 8);
    let library = LibrarySpec::builtin().unwrap();
    let graph = build_call_graph(&model, &library, &AnalysisOptions::default())
        .unwrap()
        .graph;
    let start = Signature::decode("gen.f99.Driver99:run()V").unwrap();
    let leaf = Signature::decode("gen.f0.Shape0_0:area(I)I").unwrap();

    group.bench_function("callees_depth_6", |b| {
        b.iter(|| walk(black_box(&graph), &start, Direction::Callees, 6))
    });
    group.bench_function("callers_depth_6", |b| {
        b.iter(|| walk(black_box(&graph), &leaf, Direction::Callers, 6))
    });
    group.bench_function("reachable_from_root", |b| {
        b.iter(|| reachable_from_root(black_box(&graph)))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_signature,
    bench_front_end,
    bench_pipeline,
    bench_queries
);
criterion_main!(benches);
