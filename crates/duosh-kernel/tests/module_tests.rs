//! Module loading: caching, aliasing, isolation, and cycles.

use std::sync::Arc;

use duosh_kernel::ast::Chunk;
use duosh_kernel::glob::FsGlobber;
use duosh_kernel::modules::{MemoryModuleSource, ModuleCache};
use duosh_kernel::{CompileError, CompileErrorKind, ExecResult, Kernel, KernelConfig, Value};
use duosh_testutil::*;

/// `echo loading; x = 1`
fn counted_module() -> Chunk {
    script([
        call("echo").arg(word("loading")),
        assign(["x"], [word("1")]),
    ])
}

fn memory_kernel(modules: &[(&str, Chunk)]) -> Kernel {
    let source = MemoryModuleSource::new();
    for (rel, c) in modules {
        source.insert(*rel, c.clone());
    }
    Kernel::with_module_source(KernelConfig::transient(), Arc::new(source))
}

async fn run(kernel: &Kernel, c: Chunk) -> ExecResult {
    kernel.execute(&c).await.expect("chunk should compile")
}

fn use_as(spec: &str, alias: &str) -> FormBuilder {
    call("use").args([word(spec), word(alias)])
}

#[tokio::test]
async fn module_body_runs_once_for_two_aliases() {
    let kernel = memory_kernel(&[("lib.duo", counted_module())]);
    let c = script([
        use_as("lib", "a"),
        use_as("lib", "b"),
        call("put").args([var("a:x"), var("b:x")]),
    ]);
    let result = run(&kernel, c).await;
    assert!(result.ok(), "{:?}", result.exception);
    assert_eq!(result.out, "loading\n");
    assert_eq!(result.values, vec![Value::from("1"), Value::from("1")]);
    assert_eq!(kernel.module_cache().keys(), vec!["lib.duo".to_string()]);
}

#[tokio::test]
async fn cache_survives_across_chunks() {
    let kernel = memory_kernel(&[("lib.duo", counted_module())]);
    run(&kernel, script([call("use").arg(word("lib"))])).await;
    let again = run(&kernel, script([use_as("lib", "again"), call("put").arg(var("again:x"))])).await;
    assert_eq!(again.out, "");
    assert_eq!(again.values, vec![Value::from("1")]);
}

#[tokio::test]
async fn shared_cache_spans_kernels() {
    let source = Arc::new(MemoryModuleSource::new().with_module("lib.duo", counted_module()));
    let cache = Arc::new(ModuleCache::new());
    let make = || {
        Kernel::with_parts(
            KernelConfig::transient(),
            source.clone(),
            Arc::new(FsGlobber),
            cache.clone(),
        )
    };
    let first = run(&make(), script([call("use").arg(word("lib"))])).await;
    let second = run(&make(), script([call("use").arg(word("lib"))])).await;
    assert_eq!(first.out, "loading\n");
    assert_eq!(second.out, "");
}

#[tokio::test]
async fn clearing_the_cache_reevaluates() {
    let kernel = memory_kernel(&[("lib.duo", counted_module())]);
    run(&kernel, script([call("use").arg(word("lib"))])).await;
    kernel.module_cache().clear();
    let again = run(&kernel, script([use_as("lib", "l2")])).await;
    assert_eq!(again.out, "loading\n");
}

#[tokio::test]
async fn filesystem_specs_share_one_resolved_path() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("pkg")).unwrap();
    std::fs::write(dir.path().join("pkg/lib.duo"), to_json(&counted_module())).unwrap();

    let kernel = Kernel::new(KernelConfig::transient().with_module_root(dir.path())).unwrap();
    let c = script([
        use_as("pkg:lib", "p"),
        use_as("pkg/lib", "q"),
        call("put").args([var("p:x"), var("q:x")]),
    ]);
    let result = run(&kernel, c).await;
    assert!(result.ok(), "{:?}", result.exception);
    assert_eq!(result.out, "loading\n");
    assert_eq!(kernel.module_cache().keys().len(), 1);
}

#[tokio::test]
async fn default_alias_is_last_segment() {
    let kernel = memory_kernel(&[("a/b.duo", counted_module())]);
    let result = run(&kernel, script([call("use").arg(word("a:b")), call("put").arg(var("b:x"))])).await;
    assert_eq!(result.values, vec![Value::from("1")]);
}

#[tokio::test]
async fn members_are_read_only_to_importers() {
    let kernel = memory_kernel(&[("lib.duo", counted_module())]);
    let c = script([call("use").arg(word("lib")), assign(["lib:x"], [word("2")])]);
    let err = kernel.execute(&c).await.expect_err("should not compile");
    assert_eq!(
        err.downcast_ref::<CompileError>().map(|e| e.kind),
        Some(CompileErrorKind::ReadOnlyVariable)
    );
}

#[tokio::test]
async fn module_cannot_see_importer_scope() {
    let kernel = memory_kernel(&[("peek.duo", script([call("put").arg(var("secret"))]))]);
    let c = script([assign(["secret"], [word("s")]), call("use").arg(word("peek"))]);
    let e = run(&kernel, c).await.exception.expect("module should not compile");
    assert_eq!(e.field("kind"), Some(Value::from("compilation")));
}

#[tokio::test]
async fn use_binding_is_lexical() {
    let kernel = memory_kernel(&[("lib.duo", counted_module())]);
    // f = { use lib }; $f; put $lib:x
    let c = script([
        assign(["f"], [block(chunk([call("use").arg(word("lib"))]))]),
        call_expr(var("f")),
        call("put").arg(var("lib:x")),
    ]);
    let err = kernel.execute(&c).await.expect_err("should not compile");
    assert_eq!(
        err.downcast_ref::<CompileError>().map(|e| e.kind),
        Some(CompileErrorKind::UnresolvedNamespace)
    );
}

#[tokio::test]
async fn circular_import_is_an_error() {
    let kernel = memory_kernel(&[
        ("a.duo", script([call("use").arg(word("b"))])),
        ("b.duo", script([call("use").arg(word("a"))])),
    ]);
    let e = run(&kernel, script([call("use").arg(word("a"))]))
        .await
        .exception
        .expect("cycle");
    assert!(e.to_string().contains("circular import"), "{e}");
}

#[tokio::test]
async fn flow_signal_escaping_module_is_an_error() {
    let kernel = memory_kernel(&[("brk.duo", script([call("break")]))]);
    let e = run(&kernel, script([call("use").arg(word("brk"))]))
        .await
        .exception
        .expect("module error");
    assert_eq!(e.field("kind"), Some(Value::from("module")));
}

#[tokio::test]
async fn missing_module() {
    let kernel = memory_kernel(&[]);
    let e = run(&kernel, script([call("use").arg(word("nowhere"))]))
        .await
        .exception
        .expect("not found");
    assert_eq!(e.field("kind"), Some(Value::from("module")));
}

#[tokio::test]
async fn module_functions_are_callable() {
    let lib = script([def_fn(
        "greet",
        ["who"],
        chunk([call("put").arg(compound([word("hi-"), var("who")]))]),
    )]);
    let kernel = memory_kernel(&[("lib.duo", lib)]);
    let c = script([call("use").arg(word("lib")), call("lib:greet").arg(word("bob"))]);
    let result = run(&kernel, c).await;
    assert!(result.ok(), "{:?}", result.exception);
    assert_eq!(result.values, vec![Value::from("hi-bob")]);
}
