//! Session handle
//!
//! One live, controllable browsing context belonging to a launched profile.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::cdp::CdpClient;
use crate::Error;

/// Handle to a page target and its control channel
pub struct SessionHandle {
    id: String,
    profile_id: Option<String>,
    client: Arc<dyn CdpClient>,
    closed: AtomicBool,
}

impl SessionHandle {
    pub fn new(client: Arc<dyn CdpClient>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            profile_id: None,
            client,
            closed: AtomicBool::new(false),
        }
    }

    /// Handle owned by a profile
    pub fn for_profile<S: Into<String>>(profile_id: S, client: Arc<dyn CdpClient>) -> Self {
        Self {
            profile_id: Some(profile_id.into()),
            ..Self::new(client)
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn profile_id(&self) -> Option<&str> {
        self.profile_id.as_deref()
    }

    pub fn client(&self) -> &Arc<dyn CdpClient> {
        &self.client
    }

    /// Whether commands can still be sent through this session
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.client.connection().is_active()
    }

    /// Fail with `SessionClosed` unless the session is open
    pub fn ensure_open(&self) -> Result<(), Error> {
        if self.is_open() {
            Ok(())
        } else {
            Err(crate::error::InjectionError::SessionClosed {
                session_id: self.id.clone(),
            }
            .into())
        }
    }

    /// Close the control channel. Closing twice is a no-op.
    pub async fn close(&self) -> Result<(), Error> {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("Session {} already closed", self.id);
            return Ok(());
        }
        info!("Closing session {}", self.id);
        self.client.connection().close().await
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("profile_id", &self.profile_id)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdp::MockCdpClient;
    use crate::error::InjectionError;

    #[tokio::test]
    async fn test_close_marks_session() {
        let session = SessionHandle::for_profile("p-1", Arc::new(MockCdpClient::new()));
        assert!(session.is_open());
        assert_eq!(session.profile_id(), Some("p-1"));

        session.close().await.unwrap();
        assert!(!session.is_open());
        assert!(!session.client().connection().is_active());
        session.close().await.unwrap();

        match session.ensure_open() {
            Err(Error::Injection(InjectionError::SessionClosed { session_id })) => {
                assert_eq!(session_id, session.id());
            }
            other => panic!("expected SessionClosed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dropped_connection_closes_session() {
        let client = Arc::new(MockCdpClient::new());
        let session = SessionHandle::new(client.clone());
        client.connection().close().await.unwrap();
        assert!(!session.is_open());
    }
}
