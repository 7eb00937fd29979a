//! Session — owns the server-under-test process and its protocol state.
//!
//! A session holds the child process, a writer task that serializes all
//! outgoing frames (so two bodies never interleave), and a reader task that
//! dispatches incoming frames for the lifetime of the session: responses
//! resolve pending requests by id, diagnostic publishes update the store,
//! server-initiated requests get a "method not found" reply so conforming
//! servers don't stall.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, OnceLock};

use serde::Deserialize;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};

use crate::codec::{FrameReader, FrameWriter};
use crate::diagnostics::DiagnosticsStore;
use crate::error::{Fault, HarnessError};
use crate::protocol::{self, Incoming, Notification, PublishDiagnosticsParams, Request};

const REQUEST_TIMEOUT_SECS: u64 = 30;

const SHUTDOWN_GRACE_SECS: u64 = 2;

const WRITER_CHANNEL_CAPACITY: usize = 64;

enum WriterCommand {
    Send(serde_json::Value),
    Shutdown,
}

type PendingMap = Arc<tokio::sync::Mutex<HashMap<u64, oneshot::Sender<serde_json::Value>>>>;

/// How to launch the server under test.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerCommand {
    /// Executable name or path (resolved through PATH).
    command: String,
    #[serde(default)]
    args: Vec<String>,
}

impl ServerCommand {
    #[must_use]
    pub fn new(command: &str, args: Vec<String>) -> Self {
        Self {
            command: command.to_string(),
            args,
        }
    }

    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// One running server-under-test plus its transport and protocol state.
#[derive(Debug)]
pub struct Session {
    child: Child,
    writer_tx: mpsc::Sender<WriterCommand>,
    next_id: u64,
    pending: PendingMap,
    diagnostics: Arc<DiagnosticsStore>,
    /// Write-once: the first framing/transport fault sticks; the executor
    /// checks it before each case.
    fault: Arc<OnceLock<Fault>>,
    #[allow(dead_code)]
    reader_handle: tokio::task::JoinHandle<()>,
    #[allow(dead_code)]
    writer_handle: tokio::task::JoinHandle<()>,
}

impl Session {
    /// Spawn the server and run the `initialize` handshake.
    ///
    /// A missing or unlaunchable binary is a hard error — no cases can run.
    /// A handshake failure is not: the session comes back already faulted,
    /// so the executor fails every case with `SessionUnavailable` instead of
    /// hanging on further I/O.
    pub async fn start(config: &ServerCommand) -> Result<Self, HarnessError> {
        let resolved = which::which(config.command()).map_err(|e| HarnessError::Spawn {
            command: config.command().to_string(),
            message: e.to_string(),
        })?;

        let mut cmd = Command::new(&resolved);
        cmd.args(config.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| HarnessError::Spawn {
            command: config.command().to_string(),
            message: e.to_string(),
        })?;

        let stdout = child.stdout.take().ok_or_else(|| HarnessError::Spawn {
            command: config.command().to_string(),
            message: "no stdout pipe from child".to_string(),
        })?;
        let stdin = child.stdin.take().ok_or_else(|| HarnessError::Spawn {
            command: config.command().to_string(),
            message: "no stdin pipe from child".to_string(),
        })?;

        let pending: PendingMap = Arc::new(tokio::sync::Mutex::new(HashMap::new()));
        let diagnostics = Arc::new(DiagnosticsStore::new());
        let fault: Arc<OnceLock<Fault>> = Arc::new(OnceLock::new());

        let (writer_tx, mut writer_rx) = mpsc::channel::<WriterCommand>(WRITER_CHANNEL_CAPACITY);
        let writer_handle = tokio::spawn(async move {
            let mut writer = FrameWriter::new(stdin);
            while let Some(cmd) = writer_rx.recv().await {
                match cmd {
                    WriterCommand::Send(frame) => {
                        if let Err(e) = writer.write_frame(&frame).await {
                            tracing::warn!("write error: {e}");
                            break;
                        }
                    }
                    WriterCommand::Shutdown => break,
                }
            }
        });

        let reader_pending = pending.clone();
        let reader_store = diagnostics.clone();
        let reader_fault = fault.clone();
        let reader_writer_tx = writer_tx.clone();
        let reader_handle = tokio::spawn(async move {
            let mut reader = FrameReader::new(stdout);
            let fault = loop {
                match reader.read_frame().await {
                    Ok(Some(frame)) => {
                        Self::dispatch_frame(
                            &frame,
                            &reader_pending,
                            &reader_store,
                            &reader_writer_tx,
                        )
                        .await;
                    }
                    Ok(None) => {
                        tracing::info!("server closed its output stream");
                        break Fault::transport("server closed its output stream");
                    }
                    Err(e) => {
                        tracing::warn!("reader error: {e}");
                        break Fault::framing(e.to_string());
                    }
                }
            };
            // Record the fault and drop every waiting sender under one lock,
            // so a concurrent send_request either lands before the sweep
            // (its sender is dropped here) or sees the fault and bails.
            let mut pending = reader_pending.lock().await;
            let _ = reader_fault.set(fault);
            pending.clear();
        });

        let mut session = Self {
            child,
            writer_tx,
            next_id: 1,
            pending,
            diagnostics,
            fault,
            reader_handle,
            writer_handle,
        };

        if let Err(e) = session.initialize().await {
            tracing::warn!("initialize handshake failed: {e}");
            session.record_fault(Fault::transport(e.to_string()));
        }

        Ok(session)
    }

    async fn dispatch_frame(
        frame: &serde_json::Value,
        pending: &tokio::sync::Mutex<HashMap<u64, oneshot::Sender<serde_json::Value>>>,
        store: &DiagnosticsStore,
        writer_tx: &mpsc::Sender<WriterCommand>,
    ) {
        let Some(incoming) = protocol::parse_incoming(frame) else {
            tracing::trace!("ignoring malformed JSON-RPC frame");
            return;
        };

        match incoming {
            Incoming::Response { id, body } => {
                let sender = pending.lock().await.remove(&id);
                if let Some(tx) = sender {
                    let _ = tx.send(body);
                } else {
                    tracing::trace!("response for unknown request id {id}");
                }
            }
            Incoming::ServerRequest { id, method } => {
                // Servers may send client/registerCapability,
                // workspace/configuration, etc. and block until answered.
                tracing::debug!("server sent request {method} — replying method not found");
                let response = serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {
                        "code": -32601,
                        "message": format!("Method not found: {method}")
                    }
                });
                let _ = writer_tx.send(WriterCommand::Send(response)).await;
            }
            Incoming::Notification { method, params } => {
                Self::handle_notification(&method, params, store);
            }
        }
    }

    fn handle_notification(
        method: &str,
        params: Option<serde_json::Value>,
        store: &DiagnosticsStore,
    ) {
        match method {
            "textDocument/publishDiagnostics" => {
                let Some(params) = params else { return };
                match serde_json::from_value::<PublishDiagnosticsParams>(params) {
                    Ok(publish) => {
                        let items = publish
                            .diagnostics
                            .iter()
                            .map(crate::protocol::WireDiagnostic::to_diagnostic)
                            .collect();
                        store.update(&publish.uri, items);
                    }
                    Err(e) => {
                        tracing::debug!("failed to parse publishDiagnostics: {e}");
                    }
                }
            }
            _ => {
                tracing::trace!("ignoring notification: {method}");
            }
        }
    }

    async fn initialize(&mut self) -> Result<(), HarnessError> {
        let response = self
            .send_request("initialize", Some(protocol::initialize_params()))
            .await?;

        if let Some(error) = response.get("error") {
            return Err(HarnessError::Handshake(
                error["message"].as_str().unwrap_or("unknown error").to_string(),
            ));
        }

        self.send_notification("initialized", Some(serde_json::json!({})))
            .await
    }

    async fn send_request(
        &mut self,
        method: &'static str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, HarnessError> {
        let id = self.next_id;
        self.next_id += 1;

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if let Some(fault) = self.fault.get() {
                // The reader has already swept the map; a new entry would
                // never resolve.
                return Err(HarnessError::Transport(fault.to_string()));
            }
            pending.insert(id, tx);
        }

        let request = Request::new(id, method, params);
        let frame = serde_json::to_value(&request).map_err(crate::codec::FramingError::from)?;
        if self
            .writer_tx
            .send(WriterCommand::Send(frame))
            .await
            .is_err()
        {
            // Failed to enqueue: don't leak the pending entry.
            self.pending.lock().await.remove(&id);
            return Err(HarnessError::Transport("writer channel closed".to_string()));
        }

        match tokio::time::timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS), rx).await
        {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => {
                // Reader task exited / server died; entry was cleared there.
                self.pending.lock().await.remove(&id);
                Err(HarnessError::Transport(
                    "response channel dropped".to_string(),
                ))
            }
            Err(_) => {
                // Timeout: remove the entry so repeated failures don't grow
                // the map.
                self.pending.lock().await.remove(&id);
                Err(HarnessError::Transport(format!(
                    "request `{method}` timed out"
                )))
            }
        }
    }

    async fn send_notification(
        &self,
        method: &'static str,
        params: Option<serde_json::Value>,
    ) -> Result<(), HarnessError> {
        let notification = Notification::new(method, params);
        let frame =
            serde_json::to_value(&notification).map_err(crate::codec::FramingError::from)?;
        self.writer_tx
            .send(WriterCommand::Send(frame))
            .await
            .map_err(|_| HarnessError::Transport("writer channel closed".to_string()))
    }

    /// Open a document with the full source text (version 1 — every case
    /// gets a fresh URI, so nothing is ever re-opened).
    pub async fn open_document(
        &mut self,
        uri: &str,
        language_id: &str,
        text: &str,
    ) -> Result<(), HarnessError> {
        let params = protocol::did_open_params(uri, language_id, 1, text);
        self.send_notification("textDocument/didOpen", Some(params))
            .await
    }

    /// The diagnostics store fed by this session's reader task.
    #[must_use]
    pub fn diagnostics(&self) -> &Arc<DiagnosticsStore> {
        &self.diagnostics
    }

    /// The recorded fault, if the session is broken.
    #[must_use]
    pub fn fault(&self) -> Option<&Fault> {
        self.fault.get()
    }

    pub(crate) fn record_fault(&mut self, fault: Fault) {
        let _ = self.fault.set(fault);
    }

    /// Gracefully shut down the server. Consumes self.
    ///
    /// Safe after faults: the graceful `shutdown`/`exit` exchange is skipped
    /// for a broken session, and the bounded wait falls through to a kill.
    /// `kill_on_drop` backstops any path that never reaches this.
    pub async fn shutdown(mut self) {
        if self.fault.get().is_none() {
            let grace = std::time::Duration::from_secs(SHUTDOWN_GRACE_SECS);
            if let Ok(Ok(response)) =
                tokio::time::timeout(grace, self.send_request("shutdown", None)).await
                && response.get("error").is_none()
            {
                let _ = self.send_notification("exit", None).await;
            }
        }

        let _ = self.writer_tx.send(WriterCommand::Shutdown).await;

        let wait_result = tokio::time::timeout(
            std::time::Duration::from_secs(SHUTDOWN_GRACE_SECS),
            self.child.wait(),
        )
        .await;

        if wait_result.is_err() {
            tracing::debug!("server didn't exit in time, killing");
            let _ = self.child.kill().await;
        }
    }
}
