//! Auto-save loop: one thread per armed session.
//!
//! Every `interval` the loop saves the session if it is dirty and auto-save
//! is enabled on it. Failures are logged and the loop keeps going. Dropping
//! (or [`AutoSave::stop`]ping) the handle wakes the thread and joins it.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use log::{debug, trace, warn};

use super::{ProjectStore, SaveOutcome};
use crate::entities::{SharedSession, read_session};

pub struct AutoSave {
    stop: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl AutoSave {
    pub fn start(store: Arc<ProjectStore>, session: SharedSession, interval: Duration) -> Self {
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("vvstudio-autosave".to_string())
            .spawn(move || {
                debug!("Auto-save armed (every {:?})", interval);
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => tick(&store, &session),
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("Auto-save disarmed");
            });

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Could not start auto-save thread: {}", e);
                None
            }
        };

        Self {
            stop: Some(stop_tx),
            handle,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the loop and wait for a tick in progress to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AutoSave {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn tick(store: &ProjectStore, session: &SharedSession) {
    let due = {
        let s = read_session(session);
        s.is_dirty() && s.auto_save_enabled()
    };
    if !due {
        trace!("Auto-save tick: nothing to do");
        return;
    }

    match store.save_project(session) {
        Ok(SaveOutcome::Committed { version }) => debug!("Auto-saved (version {})", version),
        Ok(SaveOutcome::Cancelled) => debug!("Auto-save superseded by another save"),
        Err(e) => warn!("Auto-save failed: {}", e),
    }
}
