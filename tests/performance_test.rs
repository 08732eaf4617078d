//! Performance and concurrency tests
//!
//! Generation, validation and compilation are pure and cheap, so they are
//! checked against generous wall-clock bounds and run from many threads at
//! once. Injection is checked for serialization under concurrent attaches.

mod common;

use futures_util::future::join_all;
use ghost_oxide::fingerprint::{TargetBrowser, TargetOs};
use ghost_oxide::stealth::{
    CdpSessionInjector, ConsistencyValidator, FingerprintGenerator, GenerationConstraints,
    InjectionCompiler, ProxyFacts, ScriptScope, SessionInjector,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Timing summary of a batch
#[derive(Debug, Clone, serde::Serialize)]
pub struct BatchTiming {
    pub iterations: usize,
    pub total_ms: f64,
    pub mean_us: f64,
}

impl BatchTiming {
    fn measure<F: FnMut()>(iterations: usize, mut op: F) -> Self {
        let start = Instant::now();
        for _ in 0..iterations {
            op();
        }
        let elapsed = start.elapsed();
        Self {
            iterations,
            total_ms: elapsed.as_secs_f64() * 1000.0,
            mean_us: elapsed.as_secs_f64() * 1_000_000.0 / iterations as f64,
        }
    }
}

#[test]
fn test_generate_validate_compile_throughput() {
    let generator = common::generator();
    let validator = ConsistencyValidator::new(common::corpus());
    let compiler = InjectionCompiler::new();
    let constraints = GenerationConstraints::new(TargetOs::Windows, TargetBrowser::Chrome)
        .with_proxy_facts(ProxyFacts::for_country("US"));
    let mut rng = StdRng::seed_from_u64(1);

    let timing = BatchTiming::measure(200, || {
        let fp = generator.generate(&constraints, &mut rng).unwrap();
        assert!(validator.validate(&fp, constraints.proxy_facts.as_ref()).is_ok());
        let _ = compiler.compile(&fp).render(ScriptScope::Document);
    });

    println!("{}", serde_json::to_string(&timing).unwrap());
    // Debug builds are slow; this only catches pathological regressions
    assert!(timing.mean_us < 50_000.0, "mean {}us per fingerprint", timing.mean_us);
}

#[test]
fn test_concurrent_generation_across_threads() {
    let generator = Arc::new(common::generator());
    let validator = Arc::new(ConsistencyValidator::new(common::corpus()));

    let handles: Vec<_> = (0..8u64)
        .map(|thread| {
            let generator = Arc::clone(&generator);
            let validator = Arc::clone(&validator);
            std::thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(thread);
                let os = TargetOs::ALL[thread as usize % TargetOs::ALL.len()];
                let browser = TargetBrowser::ALL[thread as usize % TargetBrowser::ALL.len()];
                let constraints = GenerationConstraints::new(os, browser);
                for _ in 0..50 {
                    let fp = generator.generate(&constraints, &mut rng).unwrap();
                    assert!(validator.validate(&fp, None).is_ok());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_attaches_on_one_session() {
    let injector = Arc::new(CdpSessionInjector::new());
    let (session, mock) = common::mock_session("contended");
    mock.set_latency(Some(Duration::from_millis(2)));

    let scripts: Vec<_> = (0..6)
        .map(|seed| {
            Arc::new(InjectionCompiler::new().compile(&common::generate_seeded(
                TargetOs::Windows,
                TargetBrowser::Chrome,
                None,
                seed,
            )))
        })
        .collect();

    let attaches = scripts.iter().map(|script| {
        let injector = Arc::clone(&injector);
        let session = Arc::clone(&session);
        let script = Arc::clone(script);
        tokio::spawn(async move { injector.attach(&session, &script).await })
    });
    let receipts: Vec<_> = join_all(attaches)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    // Exactly one registration survives and it is the last writer's
    assert_eq!(receipts.iter().filter(|r| !r.replaced).count(), 1);
    let last = receipts.iter().max_by_key(|r| r.revision).unwrap();
    let active = injector.active_script(session.id()).await.unwrap();
    assert_eq!(active.revision, last.revision);
    assert_eq!(active.digest, last.digest);
    assert_eq!(mock.scripts(None).len(), 1);
}

#[tokio::test]
async fn test_attach_respects_timeout_bound() {
    let injector = CdpSessionInjector::new().with_timeout(Duration::from_millis(100));
    let (session, mock) = common::mock_session("slow");
    mock.set_latency(Some(Duration::from_secs(2)));

    let script = InjectionCompiler::new().compile(&common::generate_seeded(
        TargetOs::Linux,
        TargetBrowser::Chrome,
        None,
        9,
    ));
    let start = Instant::now();
    let err = injector.attach(&session, &script).await.unwrap_err();
    assert!(err.is_injection_failure());
    assert!(start.elapsed() < Duration::from_secs(1));
}
