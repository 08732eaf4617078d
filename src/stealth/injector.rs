//! Session injector implementation
//!
//! Installs a compiled [`InitScript`] through
//! `Page.addScriptToEvaluateOnNewDocument`, so it runs in every new document
//! before page script. Auto-attached iframes get the same registration and
//! workers get the worker rendering while they are still paused.
//!
//! Each session has one slot guarded by an async mutex. Attach registers the
//! new script before removing the old one, and every script carries a revision
//! so a global that already ran a newer script ignores an older one.
//!
//! Child targets are tracked per slot for as long as they live. Detach takes
//! the script and overrides back off every tracked frame, and children that
//! show up afterwards are resumed untouched. Attach and detach run in their own
//! task, so a caller that stops waiting never interrupts a registration halfway.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::Receiver;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::compiler::{InitScript, ProtocolOverrides, ScriptScope};
use super::traits::{ActiveScript, AttachReceipt, SessionInjector};
use crate::cdp::{AttachedToTarget, CdpClient, CdpEvent, ChildTargetKind};
use crate::config::Config;
use crate::error::InjectionError;
use crate::session::SessionHandle;
use crate::Error;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
struct InstalledScript {
    identifier: String,
    revision: u64,
    digest: String,
}

/// An auto-attached target seen by the watcher
#[derive(Debug, Clone)]
struct ChildTarget {
    kind: ChildTargetKind,
    /// Registration on the child's own session, frames only
    identifier: Option<String>,
}

#[derive(Default)]
struct ChildRegistry {
    /// Keyed by the child's flattened session id
    targets: HashMap<String, ChildTarget>,
    /// What new children receive. `None` once detached: they are only resumed.
    payload: Option<Arc<ChildPayload>>,
}

type SharedChildren = Arc<tokio::sync::Mutex<ChildRegistry>>;

#[derive(Default)]
struct SessionSlot {
    active: Option<InstalledScript>,
    /// Registrations whose removal failed; retried on the next attach or detach
    stale: Vec<String>,
    children: SharedChildren,
    watcher: Option<JoinHandle<()>>,
}

impl SessionSlot {
    fn watching(&self) -> bool {
        self.watcher.as_ref().is_some_and(|w| !w.is_finished())
    }

    fn stop_watcher(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

/// What child targets receive
struct ChildPayload {
    document_source: String,
    worker_source: String,
    protocol: ProtocolOverrides,
}

type Slot = Arc<tokio::sync::Mutex<SessionSlot>>;

/// Shared with the tasks attach and detach run in
struct InjectorState {
    slots: Mutex<HashMap<String, Slot>>,
    next_revision: AtomicU64,
    guard_key: String,
}

/// CDP-backed session injector
pub struct CdpSessionInjector {
    state: Arc<InjectorState>,
    timeout: Duration,
}

impl CdpSessionInjector {
    pub fn new() -> Self {
        Self {
            state: Arc::new(InjectorState {
                slots: Mutex::new(HashMap::new()),
                next_revision: AtomicU64::new(1),
                guard_key: uuid::Uuid::new_v4().simple().to_string(),
            }),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new().with_timeout(config.attach_timeout())
    }

    /// Bound on how long a caller waits for an attach or detach, including the
    /// wait for the session lock. The work itself still runs to completion.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn timed_out(&self, session: &SessionHandle, operation: &'static str) -> Error {
        InjectionError::Timeout {
            session_id: session.id().to_string(),
            operation,
            after_ms: self.timeout.as_millis() as u64,
        }
        .into()
    }
}

impl InjectorState {
    fn slot(&self, session_id: &str) -> Result<Slot, Error> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|e| Error::internal(format!("Lock error: {}", e)))?;
        // A finished watcher means the connection's event stream is gone
        slots.retain(|_, slot| {
            slot.try_lock()
                .map_or(true, |slot| slot.watcher.is_none() || slot.watching())
        });
        Ok(Arc::clone(slots.entry(session_id.to_string()).or_default()))
    }

    fn existing_slot(&self, session_id: &str) -> Option<Slot> {
        self.slots.lock().ok()?.get(session_id).cloned()
    }

    fn forget(&self, session_id: &str) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.remove(session_id);
        }
    }

    async fn attach_locked(
        &self,
        client: Arc<dyn CdpClient>,
        session_id: &str,
        script: &InitScript,
        slot: &mut SessionSlot,
    ) -> Result<AttachReceipt, Error> {
        let revision = self.next_revision.fetch_add(1, Ordering::SeqCst);
        let digest = script.digest();
        let payload = Arc::new(ChildPayload {
            document_source: script.render_guarded(ScriptScope::Document, &self.guard_key, revision),
            worker_source: script.render_guarded(ScriptScope::Worker, &self.guard_key, revision),
            protocol: script.protocol().clone(),
        });

        // Subscribe before auto-attach is enabled so no child is missed
        if !slot.watching() {
            let attached = client.subscribe_events("Target.attachedToTarget").await?;
            let detached = client.subscribe_events("Target.detachedFromTarget").await?;
            slot.stop_watcher();
            slot.watcher = Some(tokio::spawn(watch_children(
                Arc::clone(&client),
                attached,
                detached,
                Arc::clone(&slot.children),
            )));
        }

        let added = client
            .call_method(
                "Page.addScriptToEvaluateOnNewDocument",
                json!({ "source": payload.document_source }),
            )
            .await?;
        let identifier = script_identifier(&added)?;

        let previous = slot.active.replace(InstalledScript {
            identifier: identifier.clone(),
            revision,
            digest: digest.clone(),
        });
        let replaced = previous.is_some();
        if let Some(previous) = previous {
            slot.stale.push(previous.identifier);
        }
        remove_stale(client.as_ref(), slot).await;

        apply_protocol(client.as_ref(), None, &payload.protocol).await?;

        {
            let mut children = slot.children.lock().await;
            children.payload = Some(Arc::clone(&payload));
            refresh_frames(client.as_ref(), &mut children, &payload).await;
        }

        client
            .call_method("Target.setAutoAttach", auto_attach(true))
            .await?;

        info!(
            "Attached script r{} ({}) to session {}{}",
            revision,
            digest,
            session_id,
            if replaced { ", replacing previous" } else { "" }
        );

        Ok(AttachReceipt {
            session_id: session_id.to_string(),
            identifier,
            revision,
            digest,
            replaced,
        })
    }

    async fn detach_locked(
        &self,
        client: Arc<dyn CdpClient>,
        session_id: &str,
        slot: &mut SessionSlot,
    ) -> Result<(), Error> {
        let client = client.as_ref();

        {
            let mut children = slot.children.lock().await;
            client
                .call_method("Target.setAutoAttach", auto_attach(false))
                .await?;
            children.payload = None;
            release_frames(client, &mut children).await;
        }

        if let Some(active) = slot.active.take() {
            slot.stale.push(active.identifier);
        }
        remove_stale(client, slot).await;
        clear_protocol(client, None).await?;

        if let Some(identifier) = slot.stale.first() {
            return Err(Error::cdp(format!(
                "could not remove script {} from session {}",
                identifier, session_id
            )));
        }

        info!("Detached session {}", session_id);
        Ok(())
    }
}

impl Default for CdpSessionInjector {
    fn default() -> Self {
        Self::new()
    }
}

fn attach_failure(session: &SessionHandle, cause: Error) -> Error {
    if !session.is_open() {
        return InjectionError::SessionClosed {
            session_id: session.id().to_string(),
        }
        .into();
    }
    InjectionError::AttachFailed {
        session_id: session.id().to_string(),
        reason: cause.to_string(),
    }
    .into()
}

fn auto_attach(enabled: bool) -> Value {
    json!({ "autoAttach": enabled, "waitForDebuggerOnStart": enabled, "flatten": true })
}

fn script_identifier(added: &Value) -> Result<String, Error> {
    added
        .get("identifier")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::cdp("no script identifier returned"))
}

async fn remove_script(client: &dyn CdpClient, session_id: Option<&str>, identifier: &str) -> Result<(), Error> {
    call(
        client,
        session_id,
        "Page.removeScriptToEvaluateOnNewDocument",
        json!({ "identifier": identifier }),
    )
    .await?;
    Ok(())
}

async fn remove_stale(client: &dyn CdpClient, slot: &mut SessionSlot) {
    let mut kept = Vec::new();
    for identifier in slot.stale.drain(..) {
        if let Err(e) = remove_script(client, None, &identifier).await {
            warn!("Failed to remove script {}: {}", identifier, e);
            kept.push(identifier);
        }
    }
    slot.stale = kept;
}

async fn call(
    client: &dyn CdpClient,
    session_id: Option<&str>,
    method: &str,
    params: Value,
) -> Result<Value, Error> {
    match session_id {
        Some(id) => client.call_session_method(id, method, params).await,
        None => client.call_method(method, params).await,
    }
}

async fn apply_protocol(
    client: &dyn CdpClient,
    session_id: Option<&str>,
    protocol: &ProtocolOverrides,
) -> Result<(), Error> {
    let mut user_agent = json!({
        "userAgent": protocol.user_agent,
        "acceptLanguage": protocol.accept_language,
        "platform": protocol.platform,
    });
    if let Some(metadata) = &protocol.user_agent_metadata {
        user_agent["userAgentMetadata"] = metadata.clone();
    }
    call(client, session_id, "Emulation.setUserAgentOverride", user_agent).await?;
    call(
        client,
        session_id,
        "Emulation.setTimezoneOverride",
        json!({ "timezoneId": protocol.timezone_id }),
    )
    .await?;
    call(
        client,
        session_id,
        "Emulation.setLocaleOverride",
        json!({ "locale": protocol.locale }),
    )
    .await?;
    Ok(())
}

/// Empty values reset each override to the browser's own
async fn clear_protocol(client: &dyn CdpClient, session_id: Option<&str>) -> Result<(), Error> {
    call(client, session_id, "Emulation.setUserAgentOverride", json!({ "userAgent": "" })).await?;
    call(client, session_id, "Emulation.setTimezoneOverride", json!({ "timezoneId": "" })).await?;
    call(client, session_id, "Emulation.setLocaleOverride", json!({})).await?;
    Ok(())
}

/// Register `payload` on a frame, replacing whatever it had before
async fn install_frame(
    client: &dyn CdpClient,
    session_id: &str,
    child: &mut ChildTarget,
    payload: &ChildPayload,
) -> Result<(), Error> {
    let added = client
        .call_session_method(
            session_id,
            "Page.addScriptToEvaluateOnNewDocument",
            json!({ "source": payload.document_source }),
        )
        .await?;
    if let Some(previous) = child.identifier.replace(script_identifier(&added)?) {
        if let Err(e) = remove_script(client, Some(session_id), &previous).await {
            warn!("Failed to remove script {} from child {}: {}", previous, session_id, e);
        }
    }
    apply_protocol(client, Some(session_id), &payload.protocol).await?;
    client
        .call_session_method(session_id, "Target.setAutoAttach", auto_attach(true))
        .await?;
    Ok(())
}

async fn release_frame(client: &dyn CdpClient, session_id: &str, child: &mut ChildTarget) -> Result<(), Error> {
    client
        .call_session_method(session_id, "Target.setAutoAttach", auto_attach(false))
        .await?;
    if let Some(identifier) = &child.identifier {
        remove_script(client, Some(session_id), identifier).await?;
        child.identifier = None;
    }
    clear_protocol(client, Some(session_id)).await
}

async fn refresh_frames(client: &dyn CdpClient, children: &mut ChildRegistry, payload: &ChildPayload) {
    for (session_id, child) in children.targets.iter_mut() {
        if child.kind != ChildTargetKind::Frame {
            continue;
        }
        if let Err(e) = install_frame(client, session_id, child, payload).await {
            warn!("Failed to refresh child frame {}: {}", session_id, e);
        }
    }
}

async fn release_frames(client: &dyn CdpClient, children: &mut ChildRegistry) {
    for (session_id, child) in children.targets.iter_mut() {
        if child.kind != ChildTargetKind::Frame {
            continue;
        }
        match release_frame(client, session_id, child).await {
            Ok(()) => debug!("Released child frame {}", session_id),
            Err(e) => warn!("Failed to release child frame {}: {}", session_id, e),
        }
    }
}

async fn watch_children(
    client: Arc<dyn CdpClient>,
    mut attached: Receiver<CdpEvent>,
    mut detached: Receiver<CdpEvent>,
    children: SharedChildren,
) {
    loop {
        tokio::select! {
            Some(event) = attached.recv() => {
                let target: AttachedToTarget = match serde_json::from_value(event.params) {
                    Ok(target) => target,
                    Err(e) => {
                        warn!("Malformed Target.attachedToTarget event: {}", e);
                        continue;
                    }
                };
                let mut children = children.lock().await;
                child_attached(client.as_ref(), &mut children, &target).await;
            }
            Some(event) = detached.recv() => {
                if let Some(session_id) = event.params.get("sessionId").and_then(Value::as_str) {
                    if children.lock().await.targets.remove(session_id).is_some() {
                        debug!("Child {} went away", session_id);
                    }
                }
            }
            else => break,
        }
    }
}

async fn child_attached(client: &dyn CdpClient, children: &mut ChildRegistry, target: &AttachedToTarget) {
    let session_id = target.session_id.as_str();
    // A re-announced child keeps its registration so the new one replaces it
    let mut child = children.targets.remove(session_id).unwrap_or(ChildTarget {
        kind: target.target_info.kind(),
        identifier: None,
    });
    let prepared = match children.payload.clone() {
        Some(payload) => prepare_child(client, session_id, &mut child, &payload).await,
        None => Ok(()),
    };
    children.targets.insert(session_id.to_string(), child);

    match prepared {
        Ok(()) => {
            if target.waiting_for_debugger {
                if let Err(e) = client
                    .call_session_method(session_id, "Runtime.runIfWaitingForDebugger", json!({}))
                    .await
                {
                    warn!("Failed to resume child target {}: {}", session_id, e);
                    return;
                }
            }
            debug!("Prepared {} child {}", target.target_info.target_type, session_id);
        }
        // Left paused: resuming would run it with the real fingerprint
        Err(e) => error!("Failed to prepare child target {}: {}", session_id, e),
    }
}

async fn prepare_child(
    client: &dyn CdpClient,
    session_id: &str,
    child: &mut ChildTarget,
    payload: &ChildPayload,
) -> Result<(), Error> {
    match child.kind {
        ChildTargetKind::Frame => install_frame(client, session_id, child, payload).await?,
        ChildTargetKind::Worker => {
            client
                .call_session_method(
                    session_id,
                    "Runtime.evaluate",
                    json!({ "expression": payload.worker_source, "silent": true }),
                )
                .await?;
        }
        ChildTargetKind::Other => {}
    }
    Ok(())
}

#[async_trait]
impl SessionInjector for CdpSessionInjector {
    async fn attach(&self, session: &SessionHandle, script: &InitScript) -> Result<AttachReceipt, Error> {
        session.ensure_open()?;
        let slot = self.state.slot(session.id())?;

        let state = Arc::clone(&self.state);
        let client = Arc::clone(session.client());
        let session_id = session.id().to_string();
        let script = script.clone();
        // Dropping the handle on timeout leaves the task running
        let task = tokio::spawn(async move {
            let mut slot = slot.lock().await;
            state.attach_locked(client, &session_id, &script, &mut slot).await
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result.map_err(|e| attach_failure(session, e)),
            Ok(Err(e)) => Err(Error::internal(format!("Attach task failed: {}", e))),
            Err(_) => {
                warn!("Attach on session {} timed out", session.id());
                Err(self.timed_out(session, "attach"))
            }
        }
    }

    async fn detach(&self, session: &SessionHandle) -> Result<(), Error> {
        let Some(slot) = self.state.existing_slot(session.id()) else {
            return session.ensure_open();
        };

        if !session.is_open() {
            slot.lock().await.stop_watcher();
            self.state.forget(session.id());
            return session.ensure_open();
        }

        let state = Arc::clone(&self.state);
        let client = Arc::clone(session.client());
        let session_id = session.id().to_string();
        let task = tokio::spawn(async move {
            let mut slot = slot.lock().await;
            state.detach_locked(client, &session_id, &mut slot).await
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(Error::internal(format!("Detach task failed: {}", e))),
            Err(_) => {
                warn!("Detach on session {} timed out", session.id());
                Err(self.timed_out(session, "detach"))
            }
        }
    }

    async fn active_script(&self, session_id: &str) -> Option<ActiveScript> {
        let slot = self.state.existing_slot(session_id)?;
        let slot = slot.lock().await;
        slot.active.as_ref().map(|active| ActiveScript {
            identifier: active.identifier.clone(),
            revision: active.revision,
            digest: active.digest.clone(),
        })
    }
}
