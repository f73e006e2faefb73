//! Integration tests for modforge-core.
//!
//! These tests cover:
//! - Load order determinism, acyclicity and cycle reporting
//! - Full mod lifecycle: register → validate → load → activate → unload
//! - Failure propagation, initialization rollback and timeouts
//! - Patch ordering and rollback through the mod context
//! - Service visibility and capability enforcement
//! - Validation reports over on-disk mod trees

use anyhow::anyhow;
use modforge_core::{
    CallFrame, CodeModule, Event, FailureReason, HookResult, HostMethodTable, InterceptionKind,
    LifecycleConfig, LifecycleError, LifecycleState, MethodSignature, ModContext,
    ModLifecycleManager, PatchManager, ResolutionError, Resolver, ServiceTag, StaticModuleLoader,
    ValidationEngine, ValidationErrorKind,
};
use modforge_manifest::{CapabilitySet, DependencySpec, ModManifest, ModManifestBuilder};
use serde_json::{json, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// ==============================================================================
// Test Fixture Helpers
// ==============================================================================

const SCORE: &str = "game::score";
const GREETING: ServiceTag<String> = ServiceTag::new("greeting");

type InitFn = Arc<dyn Fn(&mut ModContext<'_>) -> anyhow::Result<()> + Send + Sync>;
type EventLog = Arc<Mutex<Vec<String>>>;

/// A code module that records its lifecycle calls and runs a test-supplied init.
struct TestModule {
    id: String,
    init: InitFn,
    log: EventLog,
}

impl CodeModule for TestModule {
    fn initialize(&mut self, ctx: &mut ModContext<'_>) -> anyhow::Result<()> {
        self.log.lock().unwrap().push(format!("init:{}", self.id));
        (self.init)(ctx)
    }

    fn shutdown(&mut self) -> anyhow::Result<()> {
        self.log.lock().unwrap().push(format!("shutdown:{}", self.id));
        Ok(())
    }
}

/// A host with one patchable method and a static loader.
struct TestHost {
    table: Arc<HostMethodTable>,
    loader: Arc<StaticModuleLoader>,
    log: EventLog,
}

impl TestHost {
    fn new() -> Self {
        let table = Arc::new(HostMethodTable::new());
        table.register(SCORE, |args: &[Value]| {
            json!(args.first().and_then(Value::as_i64).unwrap_or(0) + 1)
        });
        Self {
            table,
            loader: Arc::new(StaticModuleLoader::new()),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Register code for `id` that does nothing on init.
    fn module(&self, id: &str) {
        self.module_with(id, |_: &mut ModContext<'_>| Ok(()));
    }

    /// Register code for `id` with a custom init.
    fn module_with<F>(&self, id: &str, init: F)
    where
        F: Fn(&mut ModContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let init: InitFn = Arc::new(init);
        let log = self.log.clone();
        let mod_id = id.to_string();
        self.loader.register(id, move |_| {
            Ok(Box::new(TestModule {
                id: mod_id.clone(),
                init: init.clone(),
                log: log.clone(),
            }) as Box<dyn CodeModule>)
        });
    }

    fn manager(&self) -> ModLifecycleManager {
        self.manager_with(LifecycleConfig::default())
    }

    fn manager_with(&self, config: LifecycleConfig) -> ModLifecycleManager {
        let patches = Arc::new(PatchManager::new(self.table.clone()));
        ModLifecycleManager::new(self.loader.clone(), patches).with_config(config)
    }

    fn score(&self, input: i64) -> Value {
        self.table
            .invoke(&MethodSignature::from(SCORE), vec![json!(input)])
            .unwrap()
    }

    fn take_log(&self) -> Vec<String> {
        std::mem::take(&mut *self.log.lock().unwrap())
    }
}

/// Manifest builder with every capability granted.
fn manifest(id: &str) -> ModManifestBuilder {
    ModManifest::builder(id, "1.0.0").capabilities(CapabilitySet::from_strings([
        "events",
        "provide_services",
        "lookup_services",
        "patching",
    ]))
}

fn register_all(manager: &ModLifecycleManager, manifests: Vec<ModManifest>) {
    for m in manifests {
        manager.register_manifest(m).unwrap();
    }
}

/// Create a test mod directory with a mod.toml file.
fn create_test_mod(dir: &Path, dir_name: &str, body: &str) -> PathBuf {
    let mod_dir = dir.join(dir_name);
    std::fs::create_dir_all(&mod_dir).unwrap();
    let mut file = std::fs::File::create(mod_dir.join("mod.toml")).unwrap();
    file.write_all(body.as_bytes()).unwrap();
    mod_dir
}

fn simple_manifest(id: &str, deps: &[&str]) -> String {
    let mut body = format!("[mod]\nid = \"{}\"\nversion = \"1.0.0\"\n", id);
    for dep in deps {
        body.push_str(&format!("\n[[dependencies]]\nid = \"{}\"\n", dep));
    }
    body
}

// ==============================================================================
// Resolution Properties
// ==============================================================================

#[test]
fn test_order_is_deterministic_across_input_orders() {
    let mods = vec![
        ModManifest::builder("ui", "1.0.0").depends_on("core").build(),
        ModManifest::builder("core", "1.0.0").build(),
        ModManifest::builder("audio", "1.0.0").depends_on("core").build(),
        ModManifest::builder("maps", "1.0.0").load_after("ui").build(),
        ModManifest::builder("assets", "1.0.0").build(),
    ];

    let expected = Resolver::resolve(&mods).unwrap();
    let mut rotated = mods.clone();
    for _ in 0..mods.len() {
        rotated.rotate_left(1);
        assert_eq!(Resolver::resolve(&rotated).unwrap(), expected);
        let reversed: Vec<_> = rotated.iter().rev().collect();
        assert_eq!(Resolver::resolve(reversed).unwrap(), expected);
    }
}

#[test]
fn test_accepted_order_respects_every_edge() {
    let mods = vec![
        ModManifest::builder("a", "1.0.0").build(),
        ModManifest::builder("b", "1.0.0").depends_on("a").build(),
        ModManifest::builder("c", "1.0.0").depends_on("b").load_before("d").build(),
        ModManifest::builder("d", "1.0.0").build(),
        ModManifest::builder("e", "1.0.0").load_after("d").depends_on("a").build(),
    ];

    let diagnosis = Resolver::diagnose(&mods);
    let order = diagnosis.order.clone().unwrap();
    let position = |id: &str| order.iter().position(|o| o == id).unwrap();

    for before in diagnosis.graph.nodes() {
        for after in diagnosis.graph.nodes() {
            if diagnosis.graph.has_edge(before, after) {
                assert!(position(before) < position(after), "{} before {}", before, after);
            }
        }
    }
}

#[test]
fn test_cycle_path_is_a_real_cycle() {
    let mods = vec![
        ModManifest::builder("a", "1.0.0").depends_on("c").build(),
        ModManifest::builder("b", "1.0.0").depends_on("a").build(),
        ModManifest::builder("c", "1.0.0").depends_on("b").build(),
        ModManifest::builder("tail", "1.0.0").depends_on("c").build(),
    ];

    let Err(ResolutionError::CircularDependency { cycle }) = Resolver::resolve(&mods) else {
        panic!("expected a cycle");
    };

    assert!(cycle.len() >= 2);
    assert_eq!(cycle.first(), cycle.last());
    for step in cycle.windows(2) {
        let dependent = mods.iter().find(|m| m.id() == step[0]).unwrap();
        assert!(
            dependent.dependencies().iter().any(|d| d.mod_id == step[1]),
            "{} does not depend on {}",
            step[0],
            step[1]
        );
    }
    assert!(!cycle.contains(&"tail".to_string()));
}

#[test]
fn test_optional_missing_dependency_is_tolerated() {
    let a = ModManifest::builder("A", "1.0.0")
        .dependency(DependencySpec::optional("B"))
        .build();
    assert_eq!(Resolver::resolve([&a]).unwrap(), vec!["A"]);
}

#[test]
fn test_incompatibility_scenario() {
    let a = ModManifest::builder("A", "1.0.0").build();
    let b = ModManifest::builder("B", "1.0.0").depends_on("A").build();
    let c = ModManifest::builder("C", "1.0.0")
        .depends_on("B")
        .incompatible_with("A", "rewrites A's tables")
        .build();

    assert_eq!(
        Resolver::resolve([&a, &b, &c]).unwrap_err(),
        ResolutionError::Incompatible {
            mod_id: "C".into(),
            other_id: "A".into(),
            reason: "rewrites A's tables".into(),
        }
    );
}

// ==============================================================================
// Lifecycle Tests
// ==============================================================================

#[test]
fn test_load_all_excludes_incompatible_declarer() {
    let host = TestHost::new();
    for id in ["A", "B", "C"] {
        host.module(id);
    }
    let manager = host.manager();
    register_all(
        &manager,
        vec![
            manifest("A").build(),
            manifest("B").depends_on("A").build(),
            manifest("C").depends_on("B").incompatible_with("A", "clash").build(),
        ],
    );

    let summary = manager.load_all().unwrap();
    assert_eq!(summary.order, vec!["A", "B"]);
    assert_eq!(summary.active, vec!["A", "B"]);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, "C");
    assert!(matches!(
        summary.failed[0].1,
        FailureReason::Resolution(ResolutionError::Incompatible { .. })
    ));
}

#[test]
fn test_failure_propagates_to_dependents_only() {
    let host = TestHost::new();
    host.module_with("base", |_: &mut ModContext<'_>| Err(anyhow!("bad config")));
    host.module("addon");
    host.module("standalone");

    let manager = host.manager();
    register_all(
        &manager,
        vec![
            manifest("base").build(),
            manifest("addon").depends_on("base").build(),
            manifest("standalone").build(),
        ],
    );

    let summary = manager.load_all().unwrap();
    assert_eq!(summary.active, vec!["standalone"]);
    assert_eq!(
        manager.state("addon"),
        Some(LifecycleState::Failed(FailureReason::DependencyFailed {
            dependency_id: "base".into()
        }))
    );
    assert!(matches!(
        manager.state("base"),
        Some(LifecycleState::Failed(FailureReason::InitializationFailure(ref msg))) if msg.contains("bad config")
    ));
}

#[test]
fn test_structural_failure_fails_dependents_at_validation() {
    let host = TestHost::new();
    let manager = host.manager();
    register_all(
        &manager,
        vec![
            ModManifest::builder("lib", "one").build(),
            manifest("app").depends_on("lib").build(),
        ],
    );

    let order = manager.validate_all().unwrap();
    assert!(order.is_empty());
    assert!(matches!(
        manager.state("lib"),
        Some(LifecycleState::Failed(FailureReason::Malformed(_)))
    ));
    assert_eq!(
        manager.state("app"),
        Some(LifecycleState::Failed(FailureReason::DependencyFailed {
            dependency_id: "lib".into()
        }))
    );
}

#[test]
fn test_init_failure_rolls_back_registrations() {
    let host = TestHost::new();
    host.module_with("greedy", |ctx: &mut ModContext<'_>| {
        ctx.apply_patch(
            SCORE,
            InterceptionKind::Replace,
            0,
            Arc::new(|frame: &mut CallFrame| {
                frame.result = Some(json!(999));
                HookResult::Continue
            }),
        )?;
        ctx.register_service(GREETING, Arc::new("hello".to_string()))?;
        ctx.subscribe("tick", Arc::new(|_: &Event| {}))?;
        Err(anyhow!("changed my mind"))
    });

    let manager = host.manager();
    register_all(&manager, vec![manifest("greedy").build()]);
    let baseline = host.score(1);

    let summary = manager.load_all().unwrap();
    assert!(summary.active.is_empty());
    assert_eq!(host.score(1), baseline);
    assert!(manager.patches_of("greedy").is_empty());
    assert!(manager.services().is_empty());
    assert_eq!(manager.events().subscriber_count("tick"), 0);
}

#[test]
fn test_init_timeout_is_failure() {
    let host = TestHost::new();
    host.module_with("slow", |ctx: &mut ModContext<'_>| {
        ctx.apply_patch(
            SCORE,
            InterceptionKind::After,
            0,
            Arc::new(|frame: &mut CallFrame| {
                frame.result = Some(json!(0));
                HookResult::Continue
            }),
        )?;
        std::thread::sleep(Duration::from_millis(50));
        Ok(())
    });

    let manager = host.manager_with(LifecycleConfig {
        init_timeout: Some(Duration::from_millis(5)),
    });
    register_all(&manager, vec![manifest("slow").build()]);
    manager.validate_all().unwrap();

    let err = manager.start("slow").unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::Failed {
            reason: FailureReason::InitializationFailure(_),
            ..
        }
    ));
    assert_eq!(host.score(1), json!(2));
    assert_eq!(manager.patch_manager().patch_count(), 0);
}

#[test]
fn test_missing_capability_fails_initialization() {
    let host = TestHost::new();
    host.module_with("sneaky", |ctx: &mut ModContext<'_>| {
        ctx.apply_patch(
            SCORE,
            InterceptionKind::Before,
            0,
            Arc::new(|_: &mut CallFrame| HookResult::Skip),
        )?;
        Ok(())
    });

    let manager = host.manager();
    register_all(
        &manager,
        vec![ModManifest::builder("sneaky", "1.0.0")
            .capabilities(CapabilitySet::from_strings(["events"]))
            .build()],
    );
    manager.load_all().unwrap();

    match manager.state("sneaky") {
        Some(LifecycleState::Failed(FailureReason::InitializationFailure(msg))) => {
            assert!(msg.contains("lacks capability 'patching'"), "{}", msg)
        }
        other => panic!("unexpected state {:?}", other),
    }
}

#[test]
fn test_unload_cascades_and_is_idempotent() {
    let host = TestHost::new();
    host.module_with("core", |ctx: &mut ModContext<'_>| {
        ctx.apply_patch(
            SCORE,
            InterceptionKind::After,
            0,
            Arc::new(|frame: &mut CallFrame| {
                let value = frame.result.as_ref().and_then(Value::as_i64).unwrap_or(0);
                frame.result = Some(json!(value * 10));
                HookResult::Continue
            }),
        )?;
        Ok(())
    });
    host.module_with("ui", |ctx: &mut ModContext<'_>| {
        ctx.subscribe("tick", Arc::new(|_: &Event| {}))?;
        Ok(())
    });
    host.module("other");

    let manager = host.manager();
    register_all(
        &manager,
        vec![
            manifest("core").build(),
            manifest("ui").depends_on("core").build(),
            manifest("other").build(),
        ],
    );
    manager.load_all().unwrap();
    assert_eq!(host.score(1), json!(20));
    assert_eq!(manager.patches_of("core").len(), 1);
    host.take_log();

    manager.unload("core").unwrap();
    assert_eq!(host.take_log(), vec!["shutdown:ui", "shutdown:core"]);
    assert_eq!(manager.state("ui"), Some(LifecycleState::Unloaded));
    assert_eq!(manager.state("core"), Some(LifecycleState::Unloaded));
    assert!(manager.is_active("other"));

    // rollback restores the unpatched behavior and drops subscriptions
    assert_eq!(host.score(1), json!(2));
    assert_eq!(manager.events().subscriber_count("tick"), 0);

    manager.unload("core").unwrap();
    manager.unload("ui").unwrap();
    assert!(host.take_log().is_empty());
    assert_eq!(manager.state("core"), Some(LifecycleState::Unloaded));
}

#[test]
fn test_unload_failed_mod_is_noop() {
    let host = TestHost::new();
    host.module_with("broken", |_: &mut ModContext<'_>| Err(anyhow!("nope")));
    let manager = host.manager();
    register_all(&manager, vec![manifest("broken").build()]);
    manager.load_all().unwrap();

    let before = manager.state("broken");
    manager.unload("broken").unwrap();
    assert_eq!(manager.state("broken"), before);
}

#[test]
fn test_reload_restarts_dependents() {
    let host = TestHost::new();
    host.module("core");
    host.module("ui");
    let manager = host.manager();
    register_all(
        &manager,
        vec![manifest("core").build(), manifest("ui").depends_on("core").build()],
    );
    manager.load_all().unwrap();
    host.take_log();

    manager.reload("core").unwrap();
    assert_eq!(
        host.take_log(),
        vec!["shutdown:ui", "shutdown:core", "init:core", "init:ui"]
    );
    assert!(manager.is_active("core"));
    assert!(manager.is_active("ui"));
}

#[test]
fn test_shutdown_all_in_reverse_order() {
    let host = TestHost::new();
    for id in ["a", "b", "c"] {
        host.module(id);
    }
    let manager = host.manager();
    register_all(
        &manager,
        vec![
            manifest("c").depends_on("b").build(),
            manifest("b").depends_on("a").build(),
            manifest("a").build(),
        ],
    );
    manager.load_all().unwrap();
    host.take_log();

    manager.shutdown_all();
    assert_eq!(
        host.take_log(),
        vec!["shutdown:c", "shutdown:b", "shutdown:a"]
    );
    assert!(manager
        .list_mods()
        .iter()
        .all(|m| m.state == LifecycleState::Unloaded));
}

#[test]
fn test_concurrent_start_respects_dependencies() {
    let host = TestHost::new();
    for id in ["a", "b", "c", "d"] {
        host.module(id);
    }
    let manager = host.manager();
    register_all(
        &manager,
        vec![
            manifest("a").build(),
            manifest("b").build(),
            manifest("c").build(),
            manifest("d").depends_on("a").build(),
        ],
    );
    manager.validate_all().unwrap();

    std::thread::scope(|scope| {
        for id in ["d", "c", "b", "a"] {
            let manager = &manager;
            scope.spawn(move || loop {
                match manager.start(id) {
                    Ok(()) => break,
                    Err(LifecycleError::DependencyNotReady { .. }) => std::thread::yield_now(),
                    Err(e) => panic!("{}", e),
                }
            });
        }
    });

    let log = host.take_log();
    let position = |entry: &str| log.iter().position(|l| l == entry).unwrap();
    assert!(position("init:a") < position("init:d"));
    assert!(["a", "b", "c", "d"].iter().all(|id| manager.is_active(id)));
}

// ==============================================================================
// Patch and Service Tests
// ==============================================================================

#[test]
fn test_patch_hooks_fire_by_priority_and_roll_back_per_mod() {
    let host = TestHost::new();
    let fired: EventLog = Arc::new(Mutex::new(Vec::new()));
    for (id, priority) in [("m1", 5), ("m2", 10), ("m3", 5)] {
        let fired = fired.clone();
        host.module_with(id, move |ctx: &mut ModContext<'_>| {
            let fired = fired.clone();
            let owner = ctx.mod_id().to_string();
            ctx.apply_patch(
                SCORE,
                InterceptionKind::Before,
                priority,
                Arc::new(move |_: &mut CallFrame| {
                    fired.lock().unwrap().push(owner.clone());
                    HookResult::Continue
                }),
            )?;
            Ok(())
        });
    }
    let manager = host.manager();
    register_all(
        &manager,
        vec![manifest("m1").build(), manifest("m2").build(), manifest("m3").build()],
    );
    manager.load_all().unwrap();

    let target = MethodSignature::from(SCORE);
    let priorities: Vec<i32> = manager
        .patch_manager()
        .chain(&target)
        .patches()
        .iter()
        .map(|p| p.priority)
        .collect();
    assert_eq!(priorities, vec![10, 5, 5]);

    assert_eq!(host.score(1), json!(2));
    assert_eq!(*fired.lock().unwrap(), vec!["m2", "m1", "m3"]);

    manager.unload("m1").unwrap();
    fired.lock().unwrap().clear();

    assert_eq!(
        manager.patch_manager().detect_conflicts(&target),
        vec![
            ("m2".to_string(), InterceptionKind::Before),
            ("m3".to_string(), InterceptionKind::Before)
        ]
    );
    assert!(manager.patches_of("m1").is_empty());
    assert_eq!(host.score(1), json!(2));
    assert_eq!(*fired.lock().unwrap(), vec!["m2", "m3"]);
}

#[test]
fn test_second_replace_from_other_mod_fails_initialization() {
    let host = TestHost::new();
    for id in ["first", "second"] {
        host.module_with(id, |ctx: &mut ModContext<'_>| {
            let owner = ctx.mod_id().to_string();
            ctx.apply_patch(
                SCORE,
                InterceptionKind::Replace,
                0,
                Arc::new(move |frame: &mut CallFrame| {
                    frame.result = Some(json!(owner.clone()));
                    HookResult::Continue
                }),
            )?;
            Ok(())
        });
    }
    let manager = host.manager();
    register_all(&manager, vec![manifest("first").build(), manifest("second").build()]);

    let summary = manager.load_all().unwrap();
    assert_eq!(summary.active, vec!["first"]);
    assert_eq!(host.score(0), json!("first"));
}

#[test]
fn test_services_visible_only_from_earlier_active_mods() {
    let host = TestHost::new();
    host.module_with("a-reader", |ctx: &mut ModContext<'_>| {
        let greeting = ctx.lookup_service(GREETING)?;
        anyhow::ensure!(greeting.as_str() == "hello");
        Ok(())
    });
    host.module_with("z-provider", |ctx: &mut ModContext<'_>| {
        ctx.register_service(GREETING, Arc::new("hello".to_string()))?;
        Ok(())
    });
    host.module_with("zz-consumer", |ctx: &mut ModContext<'_>| {
        let greeting = ctx.lookup_service(GREETING)?;
        anyhow::ensure!(greeting.as_str() == "hello");
        Ok(())
    });

    let manager = host.manager();
    register_all(
        &manager,
        vec![
            manifest("a-reader").build(),
            manifest("z-provider").build(),
            manifest("zz-consumer").depends_on("z-provider").build(),
        ],
    );
    manager.validate_all().unwrap();

    // start the provider out of order so its service exists but is later in load order
    manager.start("z-provider").unwrap();
    let err = manager.start("a-reader").unwrap_err();
    assert!(err.to_string().contains("not visible"), "{}", err);

    manager.start("zz-consumer").unwrap();
    assert!(manager.is_active("zz-consumer"));
}

// ==============================================================================
// Validation Engine Tests
// ==============================================================================

#[test]
fn test_validate_directory_tree() {
    let temp_dir = TempDir::new().unwrap();
    create_test_mod(temp_dir.path(), "core", &simple_manifest("core", &[]));
    create_test_mod(temp_dir.path(), "ui", &simple_manifest("ui", &["core"]));

    let report = ValidationEngine::for_directories().validate(temp_dir.path());
    assert!(report.is_valid, "{:?}", report.errors);
    assert_eq!(report.load_order, Some(vec!["core".to_string(), "ui".to_string()]));
    assert_eq!(report.mod_count, 2);
}

#[test]
fn test_validate_reports_every_problem() {
    let temp_dir = TempDir::new().unwrap();
    create_test_mod(temp_dir.path(), "one", &simple_manifest("twin", &[]));
    create_test_mod(temp_dir.path(), "two", &simple_manifest("twin", &[]));
    create_test_mod(temp_dir.path(), "needy", &simple_manifest("needy", &["ghost"]));
    create_test_mod(temp_dir.path(), "garbage", "[mod\nid = ");
    create_test_mod(
        temp_dir.path(),
        "picky",
        "[mod]\nid = \"picky\"\nversion = \"1.0.0\"\n\n[[dependencies]]\nid = \"twin\"\nversion = \">=2.0.0\"\n",
    );

    let report = ValidationEngine::for_directories().validate(temp_dir.path());
    assert!(!report.is_valid);
    assert_eq!(report.mod_count, 5);

    let dup = report
        .errors_of(ValidationErrorKind::DuplicateModId)
        .next()
        .unwrap();
    assert_eq!(dup.sources.len(), 2);
    assert!(dup.sources.iter().any(|s| s.starts_with(temp_dir.path().join("one"))));
    assert!(dup.sources.iter().any(|s| s.starts_with(temp_dir.path().join("two"))));

    assert_eq!(report.errors_of(ValidationErrorKind::MalformedManifest).count(), 1);
    assert_eq!(report.errors_of(ValidationErrorKind::MissingDependency).count(), 1);
    assert_eq!(report.errors_of(ValidationErrorKind::VersionMismatch).count(), 1);
}

#[test]
fn test_validate_missing_root() {
    let temp_dir = TempDir::new().unwrap();
    let report = ValidationEngine::for_directories().validate(&temp_dir.path().join("absent"));

    assert!(!report.is_valid);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, ValidationErrorKind::DiscoveryFailed);
}
