//! 功能验收测试
//!
//! Acceptance tests for the observable properties of the engine: generated
//! fingerprints validate, compilation is deterministic, injection is
//! idempotent and rejection paths name the right invariant.

mod common;

use ghost_oxide::fingerprint::{TargetBrowser, TargetOs};
use ghost_oxide::stealth::{
    FingerprintGenerator, GenerationConstraints, InjectionCompiler, Invariant, ProxyFacts,
    ScriptScope, SessionInjector, CdpSessionInjector, ConsistencyValidator,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio_test::{assert_err, assert_ok};

// ============= Generation =============

#[test]
fn test_generated_fingerprints_have_no_hard_violations() {
    let generator = common::generator();
    let validator = ConsistencyValidator::new(common::corpus());
    let countries = [None, Some("US"), Some("DE"), Some("JP"), Some("BR"), Some("AU")];
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for os in TargetOs::ALL {
        for browser in TargetBrowser::ALL {
            for country in countries {
                let mut constraints = GenerationConstraints::new(os, browser);
                if let Some(country) = country {
                    constraints = constraints.with_proxy_facts(ProxyFacts::for_country(country));
                }
                let fp = generator.generate(&constraints, &mut rng).unwrap();
                let facts = constraints.proxy_facts.as_ref();
                let result = validator.validate(&fp, facts);
                assert!(
                    result.is_ok(),
                    "{}/{}/{:?}: {:?}",
                    os,
                    browser,
                    country,
                    result.hard_violations().collect::<Vec<_>>()
                );
            }
        }
    }
}

#[test]
fn test_german_proxy_yields_german_zone() {
    let generator = common::generator();
    let constraints = GenerationConstraints::new(TargetOs::Windows, TargetBrowser::Chrome)
        .with_proxy_facts(ProxyFacts::for_country("DE"));
    let mut rng = StdRng::seed_from_u64(49);

    let samples = 200;
    let berlin = (0..samples)
        .filter(|_| {
            generator.generate(&constraints, &mut rng).unwrap().timezone.timezone == "Europe/Berlin"
        })
        .count();
    assert!(
        berlin * 100 >= samples * 95,
        "only {}/{} samples in Europe/Berlin",
        berlin,
        samples
    );
}

// ============= Compilation =============

#[test]
fn test_compile_is_byte_identical() {
    for seed in 0..10 {
        let fp = common::generate_seeded(TargetOs::Macos, TargetBrowser::Chrome, Some("GB"), seed);
        let a = InjectionCompiler::new().compile(&fp);
        let b = InjectionCompiler::new().compile(&fp.clone());
        assert_eq!(a, b);
        assert_eq!(a.render(ScriptScope::Document), b.render(ScriptScope::Document));
        assert_eq!(a.render(ScriptScope::Worker), b.render(ScriptScope::Worker));
        assert_eq!(a.digest(), b.digest());
    }
}

// ============= Injection =============

#[tokio::test]
async fn test_attach_detach_attach_reports_same_values() {
    let fp = common::generate_seeded(TargetOs::Windows, TargetBrowser::Edge, None, 8);
    let script = InjectionCompiler::new().compile(&fp);
    let injector = CdpSessionInjector::new();
    let (session, mock) = common::mock_session("idempotent");

    assert_ok!(injector.attach(&session, &script).await);
    let first_ua = mock.emulation("Emulation.setUserAgentOverride").unwrap();
    let first_tz = mock.emulation("Emulation.setTimezoneOverride").unwrap();
    let first_digest = injector.active_script(session.id()).await.unwrap().digest;

    assert_ok!(injector.detach(&session).await);
    assert!(injector.active_script(session.id()).await.is_none());

    assert_ok!(injector.attach(&session, &script).await);
    assert_eq!(mock.emulation("Emulation.setUserAgentOverride").unwrap(), first_ua);
    assert_eq!(mock.emulation("Emulation.setTimezoneOverride").unwrap(), first_tz);
    assert_eq!(injector.active_script(session.id()).await.unwrap().digest, first_digest);
    assert_eq!(mock.scripts(None).len(), 1);
}

#[tokio::test]
async fn test_closed_session_cannot_be_spoofed() {
    let script = InjectionCompiler::new().compile(&common::generate_seeded(
        TargetOs::Linux,
        TargetBrowser::Chrome,
        None,
        2,
    ));
    let injector = CdpSessionInjector::new();
    let (session, mock) = common::mock_session("closed");
    assert_ok!(session.close().await);

    let err = assert_err!(injector.attach(&session, &script).await);
    assert!(err.is_injection_failure());
    assert!(mock.scripts(None).is_empty());
}

// ============= Rejection =============

#[test]
fn test_mac_platform_with_nvidia_renderer_fails() {
    let validator = ConsistencyValidator::new(common::corpus());
    let mut fp = common::generate_seeded(TargetOs::Windows, TargetBrowser::Chrome, None, 4);
    fp.navigator.platform = "MacIntel".to_string();
    fp.webgl.unmasked_renderer =
        "ANGLE (NVIDIA, NVIDIA GeForce RTX 3060 Direct3D11 vs_5_0 ps_5_0, D3D11)".to_string();

    let result = validator.validate(&fp, None);
    assert!(!result.is_ok());
    assert!(result
        .hard_violations()
        .any(|v| v.invariant == Invariant::GpuPlatform));
}

#[test]
fn test_webdriver_true_is_exactly_one_hard_violation() {
    let validator = ConsistencyValidator::new(common::corpus());
    let mut fp = common::generate_seeded(TargetOs::Windows, TargetBrowser::Chrome, None, 6);
    assert!(validator.validate(&fp, None).is_ok());

    fp.navigator.webdriver = true;
    let result = validator.validate(&fp, None);
    let hard: Vec<_> = result.hard_violations().collect();
    assert_eq!(hard.len(), 1);
    assert_eq!(hard[0].invariant, Invariant::Webdriver);
    assert_eq!(hard[0].field, "navigator.webdriver");
}
