//! # Ghost-Oxide 命令行入口
//!
//! 为配置文件生成指纹、校验导入的指纹、查看编译后的注入脚本，并把指纹注入到
//! 一个真实的浏览器会话中。
//!
//! ## 子命令
//! - `generate`: 按操作系统、浏览器与代理国家生成指纹（可选输出完整配置文件）
//! - `validate`: 校验指纹或配置文件，列出硬性与软性违规
//! - `compile`: 输出编译后的文档或 worker 脚本
//! - `launch`: 连接 DevTools 端点，打开页面并注入，按 Ctrl+C 后移除注入并关闭
//!
//! ## 环境变量
//! - `RUST_LOG`: 日志过滤（默认使用配置中的 `log_level`）
//! - `GHOST_CDP_ENDPOINT`: DevTools 端点（默认: ws://localhost:9222）
//! - `GHOST_CORPUS_PATH`: 替换内置语料库的文件

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ghost_oxide::{
    cdp::CdpBrowserImpl,
    config::Config,
    fingerprint::{Fingerprint, Profile, TargetBrowser, TargetOs, WebRtcPolicy},
    session::SessionManagerImpl,
    stealth::{
        FingerprintGenerator, FingerprintGeneratorImpl, FingerprintOverrides, GenerationConstraints,
        PlausibilityCorpus, ProxyFacts, ScriptScope, StealthEngine, StealthEngineImpl,
    },
};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Fingerprint consistency and injection engine", long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// TOML configuration file
    #[clap(short, long, global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a fingerprint
    Generate {
        #[clap(long, value_enum, default_value = "windows")]
        os: OsArg,

        #[clap(long, value_enum, default_value = "chrome")]
        browser: BrowserArg,

        /// Proxy country (ISO 3166 alpha-2) to match timezone and locale to
        #[clap(long)]
        country: Option<String>,

        /// IANA zone overriding the proxy-derived one
        #[clap(long)]
        timezone: Option<String>,

        #[clap(long)]
        locale: Option<String>,

        #[clap(long, value_enum)]
        webrtc: Option<WebRtcArg>,

        /// Seed for a reproducible fingerprint
        #[clap(long)]
        seed: Option<u64>,

        /// Wrap the fingerprint in a new profile record
        #[clap(long)]
        profile: bool,

        /// Write to a file instead of stdout
        #[clap(short, long)]
        out: Option<PathBuf>,
    },
    /// Validate a fingerprint or profile file
    Validate {
        file: PathBuf,

        /// Proxy country to check the timezone against
        #[clap(long)]
        country: Option<String>,
    },
    /// Print the compiled init script
    Compile {
        file: PathBuf,

        #[clap(long, value_enum, default_value = "document")]
        scope: ScopeArg,
    },
    /// Open a page, inject the fingerprint and keep it until Ctrl+C
    Launch {
        file: PathBuf,

        #[clap(short, long, default_value = "about:blank")]
        url: String,

        /// DevTools endpoint overriding the configured one
        #[clap(long)]
        endpoint: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OsArg {
    Windows,
    Macos,
    Linux,
}

impl From<OsArg> for TargetOs {
    fn from(arg: OsArg) -> Self {
        match arg {
            OsArg::Windows => TargetOs::Windows,
            OsArg::Macos => TargetOs::Macos,
            OsArg::Linux => TargetOs::Linux,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BrowserArg {
    Chrome,
    Edge,
    Firefox,
}

impl From<BrowserArg> for TargetBrowser {
    fn from(arg: BrowserArg) -> Self {
        match arg {
            BrowserArg::Chrome => TargetBrowser::Chrome,
            BrowserArg::Edge => TargetBrowser::Edge,
            BrowserArg::Firefox => TargetBrowser::Firefox,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum WebRtcArg {
    Disable,
    ProxyOnly,
    Default,
}

impl From<WebRtcArg> for WebRtcPolicy {
    fn from(arg: WebRtcArg) -> Self {
        match arg {
            WebRtcArg::Disable => WebRtcPolicy::Disable,
            WebRtcArg::ProxyOnly => WebRtcPolicy::ProxyOnly,
            WebRtcArg::Default => WebRtcPolicy::Default,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ScopeArg {
    Document,
    Worker,
}

/// Read a profile, or a bare fingerprint wrapped in a throwaway profile
fn read_profile(path: &Path) -> Result<Profile> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    if let Ok(profile) = Profile::from_json(&json) {
        return Ok(profile);
    }
    let fingerprint = Fingerprint::from_json(&json)
        .with_context(|| format!("{} is neither a profile nor a fingerprint", path.display()))?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "imported".to_string());
    Ok(Profile::new(name, String::new(), fingerprint))
}

fn write_output(json: &str, out: Option<&Path>) -> Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
            info!("Wrote {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn generate(
    config: &Config,
    corpus: Arc<PlausibilityCorpus>,
    os: OsArg,
    browser: BrowserArg,
    country: Option<String>,
    overrides: FingerprintOverrides,
    seed: Option<u64>,
    as_profile: bool,
    out: Option<&Path>,
) -> Result<()> {
    let generator = FingerprintGeneratorImpl::from_config(corpus, config);
    let mut constraints = GenerationConstraints::new(os.into(), browser.into()).with_overrides(overrides);
    if let Some(country) = country {
        constraints = constraints.with_proxy_facts(ProxyFacts::for_country(&country));
    }

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let fingerprint = generator.generate(&constraints, &mut rng)?;

    let json = if as_profile {
        let name = Profile::random_name(&mut rng);
        let data_dir = format!("profiles/{}", name);
        Profile::new(name, data_dir, fingerprint).to_json_pretty()?
    } else {
        fingerprint.to_json_pretty()?
    };
    write_output(&json, out)
}

fn validate(engine: &StealthEngineImpl, file: &Path, country: Option<String>) -> Result<()> {
    let profile = read_profile(file)?;
    let facts = country.as_deref().map(ProxyFacts::for_country);
    let result = engine.validate(profile.fingerprint(), facts.as_ref());

    for violation in &result.violations {
        println!("{}", violation);
    }
    if !result.is_ok() {
        bail!(
            "{} hard violation(s) in {}",
            result.hard_violations().count(),
            file.display()
        );
    }
    println!("ok ({} warning(s))", result.soft_violations().count());
    Ok(())
}

async fn launch(engine: &StealthEngineImpl, config: &Config, file: &Path, url: &str, endpoint: Option<String>) -> Result<()> {
    let profile = read_profile(file)?;
    let endpoint = endpoint.unwrap_or_else(|| config.cdp_endpoint.clone());
    let manager = SessionManagerImpl::new(Arc::new(CdpBrowserImpl::new(endpoint)));

    let session = manager.open_session(&profile.id, "about:blank").await?;
    let report = engine.launch(&profile, &session).await?;
    for warning in &report.warnings {
        warn!("{}", warning);
    }
    info!(
        "Profile {} injected (script {}, revision {})",
        profile.id, report.receipt.digest, report.receipt.revision
    );

    let navigation = session.client().navigate(url).await?;
    info!("Navigated to {}, press Ctrl+C to stop", navigation.url);
    tokio::signal::ctrl_c().await?;

    info!("Detaching profile {}", profile.id);
    engine.close(&session).await?;
    manager.close_all().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_ref().map(|p| p.to_string_lossy().into_owned());
    let config = Config::load(config_path.as_deref())?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("Ghost-Oxide v{}", ghost_oxide::VERSION);

    let corpus = Arc::new(PlausibilityCorpus::load(config.corpus_path.as_deref())?);
    let engine = StealthEngineImpl::new(corpus.clone(), &config);

    match cli.command {
        Commands::Generate {
            os,
            browser,
            country,
            timezone,
            locale,
            webrtc,
            seed,
            profile,
            out,
        } => {
            let overrides = FingerprintOverrides {
                timezone,
                locale,
                web_rtc_policy: webrtc.map(Into::into),
                ..Default::default()
            };
            generate(&config, corpus, os, browser, country, overrides, seed, profile, out.as_deref())
        }
        Commands::Validate { file, country } => validate(&engine, &file, country),
        Commands::Compile { file, scope } => {
            let profile = read_profile(&file)?;
            let script = engine.compile(profile.fingerprint());
            let scope = match scope {
                ScopeArg::Document => ScriptScope::Document,
                ScopeArg::Worker => ScriptScope::Worker,
            };
            println!("{}", script.render_standalone(scope));
            Ok(())
        }
        Commands::Launch { file, url, endpoint } => launch(&engine, &config, &file, &url, endpoint).await,
    }
}
