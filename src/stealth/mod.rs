//! # 隐身引擎
//!
//! 为每个浏览器配置文件生成内部一致、符合真实设备统计分布、并与代理出口地区
//! 相匹配的合成指纹，再把它编译为初始化脚本，注入到会话的每一个新文档与 worker 中。
//!
//! ## 主要功能
//! - **合理性语料库**: 设备档位、GPU 组合、屏幕、字体与浏览器版本的市场份额数据
//! - **指纹生成**: 按份额加权抽样，失败时在有限次数内重新抽样
//! - **一致性校验**: 逐条检查跨字段不变量，区分硬性与软性违规
//! - **注入编译**: 把指纹编译为按阶段排序的覆盖指令与确定性噪声
//! - **会话注入**: 通过新文档钩子安装脚本，替换而非叠加，覆盖 iframe 与 worker
//!
//! ## 模块结构
//! - `traits`: 生成器、注入器与引擎的 trait 定义
//! - `corpus`: 合理性语料库
//! - `geo`: 时区、国家与语言区域数据
//! - `proxy`: 代理检测结果与代理事实
//! - `user_agent`: User-Agent 构造与解析
//! - `validator`: 一致性校验器
//! - `generator`: 指纹生成器
//! - `compiler`: 注入编译器
//! - `injector`: 基于 CDP 的会话注入器
//! - `engine`: 引擎门面实现
//!
//! ## 使用示例
//! ```rust,no_run
//! use ghost_oxide::config::Config;
//! use ghost_oxide::fingerprint::{TargetBrowser, TargetOs};
//! use ghost_oxide::stealth::{GenerationConstraints, PlausibilityCorpus, StealthEngine, StealthEngineImpl};
//! use std::sync::Arc;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = StealthEngineImpl::new(Arc::new(PlausibilityCorpus::builtin()), &Config::default());
//! let constraints = GenerationConstraints::new(TargetOs::Windows, TargetBrowser::Chrome);
//! let fingerprint = engine.generate(constraints, None)?;
//! let script = engine.compile(&fingerprint);
//! println!("{} directives, digest {}", script.directives().len(), script.digest());
//! # Ok(())
//! # }
//! ```

pub mod traits;
pub mod corpus;
pub mod geo;
pub mod proxy;
pub mod user_agent;
pub mod validator;
pub mod generator;
pub mod compiler;
pub mod injector;
pub mod engine;


pub use traits::{
    ActiveScript, AttachReceipt, FingerprintGenerator, LaunchReport, SessionInjector, StealthEngine,
};

pub use compiler::{
    InitScript, InjectionCompiler, OverrideDirective, OverrideTarget, Phase, ProtocolOverrides,
    ScriptScope,
};
pub use corpus::PlausibilityCorpus;
pub use engine::StealthEngineImpl;
pub use generator::{FingerprintGeneratorImpl, FingerprintOverrides, GenerationConstraints, ScreenSize};
pub use injector::CdpSessionInjector;
pub use proxy::{ConnectionHint, ProxyCheckResult, ProxyFacts, ProxyHealthSource, ProxyResultCache, ProxyStatus};
pub use validator::{ConsistencyValidator, Invariant, Severity, ValidationResult, Violation};
