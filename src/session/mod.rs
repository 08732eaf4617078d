//! # 会话管理层
//!
//! 一个会话对应一个已启动配置文件的可控浏览上下文。会话注入器以会话为单位
//! 安装和移除初始化脚本，因此不同配置文件之间互不干扰。
//!
//! ## 主要功能
//! - **会话句柄**: 持有 CDP 客户端与关闭状态，注入前检查会话是否可用
//! - **会话管理**: 在 DevTools 端点上打开页面目标并跟踪会话
//! - **并发安全**: 所有操作都是线程安全的，支持并发访问
//!
//! ## 模块结构
//! - `handle`: 会话句柄
//! - `manager`: 会话管理器实现
//!
//! ## 使用示例
//! ```rust,no_run
//! use ghost_oxide::session::SessionManagerImpl;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = SessionManagerImpl::mock();
//! let session = manager.open_session("profile-1", "about:blank").await?;
//! println!("Session {} open: {}", session.id(), session.is_open());
//! # Ok(())
//! # }
//! ```

pub mod handle;
pub mod manager;

pub use handle::SessionHandle;
pub use manager::SessionManagerImpl;
