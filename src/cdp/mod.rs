//! # Chrome DevTools Protocol (CDP) 层
//!
//! 提供与 Chrome/Chromium 浏览器的 WebSocket 通信接口，会话注入器通过它安装
//! 新文档脚本、设置协议级覆盖并接管子目标（iframe、worker）。
//!
//! ## 主要功能
//! - **WebSocket 连接管理**: 读写分离的 CDP 连接，按命令类型设置超时
//! - **协议通信**: 发送 CDP 命令，支持扁平化子会话（`sessionId`）
//! - **事件订阅**: 监听 `Target.attachedToTarget` 等浏览器事件
//! - **目标发现**: 通过 `/json/version`、`/json`、`/json/new` 发现和创建页面
//!
//! ## 模块结构
//! - `traits`: CDP 操作的核心 trait 定义
//! - `types`: CDP 协议相关的数据类型
//! - `connection`: WebSocket 连接实现
//! - `client`: CDP 客户端实现
//! - `browser`: 浏览器级别的操作
//! - `mock`: 记录调用的 Mock 实现，用于测试
//!
//! ## 使用示例
//! ```rust,no_run
//! use ghost_oxide::cdp::{CdpBrowser, CdpBrowserImpl};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let browser = CdpBrowserImpl::new("http://localhost:9222");
//! let ws_url = browser.create_target("about:blank").await?;
//! let client = browser.create_client(&ws_url).await?;
//! let result = client.navigate("https://example.com").await?;
//! println!("Navigated to: {}", result.url);
//! # Ok(())
//! # }
//! ```

pub mod traits;
pub mod types;
pub mod connection;
pub mod client;
pub mod browser;
pub mod mock;

#[cfg(test)]
mod tests;

pub use traits::{
    BrowserVersion, CdpBrowser, CdpClient, CdpConnection, CdpError, CdpEvent, CdpResponse,
    EvaluationResult, NavigationResult, TargetInfo,
};
pub use types::{AttachedTargetInfo, AttachedToTarget, ChildTargetKind};

pub use browser::CdpBrowserImpl;
pub use client::CdpClientImpl;
pub use connection::CdpWebSocketConnection;

pub use mock::{MockCdpBrowser, MockCdpClient, MockCdpConnection, RecordedCall};
