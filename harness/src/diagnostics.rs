//! Diagnostics store — per-document state with bounded-wait queries.
//!
//! Written only by the session's reader task, awaited by the test executor.
//! Each publish replaces the prior set for its URI ("latest diagnostics
//! win"); an empty set is retained rather than removed, because "the server
//! said zero" and "the server said nothing" are different observations.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;

use lspect_types::Diagnostic;

#[derive(Debug, Default)]
struct Entry {
    generation: u64,
    items: Vec<Diagnostic>,
}

/// The result of one bounded wait: the current set for the URI and whether
/// an update arrived after the subscription was taken.
#[derive(Debug)]
pub struct WaitOutcome {
    diagnostics: Vec<Diagnostic>,
    updated: bool,
}

impl WaitOutcome {
    pub(crate) fn new(diagnostics: Vec<Diagnostic>, updated: bool) -> Self {
        Self {
            diagnostics,
            updated,
        }
    }

    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    #[must_use]
    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    /// False when the wait hit its deadline without seeing a fresh publish.
    #[must_use]
    pub fn updated(&self) -> bool {
        self.updated
    }
}

/// Captures the generation for one URI at subscription time, so an update
/// racing with the subscriber is never lost.
pub struct Subscription<'a> {
    store: &'a DiagnosticsStore,
    uri: String,
    seen: u64,
}

impl Subscription<'_> {
    /// Wait until a publish for the URI lands after this subscription was
    /// taken, or until `timeout` elapses.
    ///
    /// On timeout the current set (possibly empty) is returned with
    /// `updated == false` — absence of diagnostics is a valid outcome, not
    /// an error. A zero timeout returns immediately.
    pub async fn wait(self, timeout: Duration) -> WaitOutcome {
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            // Register for the next notification before re-checking the
            // generation, so an update landing between the check and the
            // await still wakes us.
            let notified = self.store.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.store.generation(&self.uri) != self.seen {
                return WaitOutcome::new(self.store.current(&self.uri), true);
            }

            tokio::select! {
                () = &mut deadline => {
                    return WaitOutcome::new(self.store.current(&self.uri), false);
                }
                () = &mut notified => {}
            }
        }
    }
}

/// Per-URI diagnostic sets with replace-on-publish semantics.
#[derive(Debug)]
pub struct DiagnosticsStore {
    entries: Mutex<HashMap<String, Entry>>,
    changed: Notify,
}

impl DiagnosticsStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            changed: Notify::new(),
        }
    }

    /// Atomically replace the set for `uri` and wake every waiter.
    pub fn update(&self, uri: &str, items: Vec<Diagnostic>) {
        {
            let mut entries = self
                .entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let entry = entries.entry(uri.to_string()).or_default();
            entry.generation += 1;
            entry.items = items;
        }
        self.changed.notify_waiters();
    }

    /// The current set for `uri`; empty if nothing was ever published.
    #[must_use]
    pub fn current(&self, uri: &str) -> Vec<Diagnostic> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uri)
            .map(|entry| entry.items.clone())
            .unwrap_or_default()
    }

    /// Capture the generation for `uri` so a later [`Subscription::wait`]
    /// only accepts publishes that happen from now on.
    #[must_use]
    pub fn subscribe(&self, uri: &str) -> Subscription<'_> {
        Subscription {
            store: self,
            uri: uri.to_string(),
            seen: self.generation(uri),
        }
    }

    /// Block until a publish for `uri` lands, bounded by `timeout`.
    pub async fn wait_for_update(&self, uri: &str, timeout: Duration) -> WaitOutcome {
        self.subscribe(uri).wait(timeout).await
    }

    fn generation(&self, uri: &str) -> u64 {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uri)
            .map_or(0, |entry| entry.generation)
    }
}

impl Default for DiagnosticsStore {
    fn default() -> Self {
        Self::new()
    }
}
