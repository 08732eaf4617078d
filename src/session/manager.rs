//! Session manager implementation
//!
//! Opens page targets on a DevTools endpoint and tracks the resulting
//! sessions with thread-safe operations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use super::handle::SessionHandle;
use crate::cdp::traits::CdpBrowser;
use crate::Error;

/// Session manager implementation
pub struct SessionManagerImpl {
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
    browser: Arc<dyn CdpBrowser>,
}

impl SessionManagerImpl {
    pub fn new(browser: Arc<dyn CdpBrowser>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            browser,
        }
    }

    /// Session manager backed by a mock browser
    pub fn mock() -> Self {
        Self::new(Arc::new(crate::cdp::mock::MockCdpBrowser::new()))
    }

    pub fn browser(&self) -> &Arc<dyn CdpBrowser> {
        &self.browser
    }

    /// Open a new page target for a profile
    pub async fn open_session(&self, profile_id: &str, url: &str) -> Result<Arc<SessionHandle>, Error> {
        let ws_url = self.browser.create_target(url).await?;
        let client = self.browser.create_client(&ws_url).await?;
        let session = Arc::new(SessionHandle::for_profile(profile_id, client));

        self.sessions
            .write()
            .map_err(|e| Error::internal(format!("Lock error: {}", e)))?
            .insert(session.id().to_string(), Arc::clone(&session));

        info!("Opened session {} for profile {}", session.id(), profile_id);
        Ok(session)
    }

    pub fn get_session(&self, session_id: &str) -> Result<Arc<SessionHandle>, Error> {
        self.sessions
            .read()
            .map_err(|e| Error::internal(format!("Lock error: {}", e)))?
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::session_not_found(session_id))
    }

    /// Sessions currently tracked
    pub fn list_sessions(&self) -> Result<Vec<Arc<SessionHandle>>, Error> {
        Ok(self
            .sessions
            .read()
            .map_err(|e| Error::internal(format!("Lock error: {}", e)))?
            .values()
            .cloned()
            .collect())
    }

    /// Close a session and stop tracking it
    pub async fn close_session(&self, session_id: &str) -> Result<(), Error> {
        let session = self
            .sessions
            .write()
            .map_err(|e| Error::internal(format!("Lock error: {}", e)))?
            .remove(session_id)
            .ok_or_else(|| Error::session_not_found(session_id))?;
        session.close().await
    }

    /// Close every session, then the browser connections
    pub async fn close_all(&self) -> Result<(), Error> {
        let sessions: Vec<_> = self
            .sessions
            .write()
            .map_err(|e| Error::internal(format!("Lock error: {}", e)))?
            .drain()
            .map(|(_, session)| session)
            .collect();

        for session in sessions {
            if let Err(e) = session.close().await {
                warn!("Failed to close session {}: {}", session.id(), e);
            }
        }
        self.browser.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_get_close() {
        let manager = SessionManagerImpl::mock();
        let session = manager.open_session("profile-1", "about:blank").await.unwrap();
        assert!(session.is_open());

        let found = manager.get_session(session.id()).unwrap();
        assert_eq!(found.profile_id(), Some("profile-1"));
        assert_eq!(manager.list_sessions().unwrap().len(), 1);

        manager.close_session(session.id()).await.unwrap();
        assert!(!session.is_open());
        assert!(matches!(
            manager.get_session(session.id()),
            Err(Error::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_close_all() {
        let manager = SessionManagerImpl::mock();
        let a = manager.open_session("a", "about:blank").await.unwrap();
        let b = manager.open_session("b", "about:blank").await.unwrap();

        manager.close_all().await.unwrap();
        assert!(!a.is_open() && !b.is_open());
        assert!(manager.list_sessions().unwrap().is_empty());
        assert!(manager.open_session("c", "about:blank").await.is_err());
    }
}
