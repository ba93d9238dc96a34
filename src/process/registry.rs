//! Routes process and shell events to their handles.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::{ProcessId, ShellId};
use crate::protocol::{Notification, ParsedEvent};
use crate::transport::EventHandler;

use super::shell::ShellShared;

/// Sending half of a live process.
pub(crate) struct ProcessEntry {
    pub output_tx: mpsc::UnboundedSender<String>,
    pub exit_tx: oneshot::Sender<Result<i32>>,
}

/// Live processes and shells for one connection.
#[derive(Default)]
pub(crate) struct ProcessRegistry {
    processes: Mutex<FxHashMap<ProcessId, ProcessEntry>>,
    shells: Mutex<FxHashMap<ShellId, Arc<ShellShared>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_process(&self, id: ProcessId, entry: ProcessEntry) {
        self.processes.lock().insert(id, entry);
    }

    pub fn remove_process(&self, id: ProcessId) -> bool {
        self.processes.lock().remove(&id).is_some()
    }

    pub fn insert_shell(&self, id: ShellId, shell: Arc<ShellShared>) {
        self.shells.lock().insert(id, shell);
    }

    pub fn remove_shell(&self, id: ShellId) -> Option<Arc<ShellShared>> {
        self.shells.lock().remove(&id)
    }

    /// Number of running processes and open shells.
    pub fn len(&self) -> (usize, usize) {
        (self.processes.lock().len(), self.shells.lock().len())
    }

    fn shell(&self, id: &ShellId) -> Option<Arc<ShellShared>> {
        self.shells.lock().get(id).cloned()
    }

    fn process_output(&self, id: ProcessId, data: &str) {
        match self.processes.lock().get(&id) {
            // The reader may be gone; output is then discarded.
            Some(entry) => {
                let _ = entry.output_tx.send(data.to_string());
            }
            None => trace!(process_id = %id, "Output for unknown process"),
        }
    }

    fn process_exit(&self, id: ProcessId, exit_code: i32) {
        let Some(entry) = self.processes.lock().remove(&id) else {
            trace!(process_id = %id, "Exit for unknown process");
            return;
        };
        debug!(process_id = %id, exit_code, "Process exited");
        // Dropping output_tx ends the output stream after buffered chunks.
        let _ = entry.exit_tx.send(Ok(exit_code));
    }
}

impl EventHandler for ProcessRegistry {
    fn handle(&self, event: &ParsedEvent) -> Vec<Notification> {
        match event {
            ParsedEvent::ProcessOutput { process_id, data } => {
                self.process_output(*process_id, data);
            }
            ParsedEvent::ProcessExit {
                process_id,
                exit_code,
            } => self.process_exit(*process_id, *exit_code),
            ParsedEvent::ShellReady { shell_id } => match self.shell(shell_id) {
                Some(shell) => return shell.mark_ready(),
                None => trace!(%shell_id, "Ready for unknown shell"),
            },
            ParsedEvent::ShellOutput { shell_id, data } => match self.shell(shell_id) {
                Some(shell) => shell.output(data),
                None => trace!(%shell_id, "Output for unknown shell"),
            },
            ParsedEvent::ShellExit {
                shell_id,
                exit_code,
            } => match self.remove_shell(*shell_id) {
                Some(shell) => shell.mark_closed(*exit_code),
                None => trace!(%shell_id, "Exit for unknown shell"),
            },
            other => trace!(?other, "Non-process event routed to process registry"),
        }
        Vec::new()
    }

    fn disconnected(&self) {
        let processes: Vec<_> = self.processes.lock().drain().collect();
        let shells: Vec<_> = self.shells.lock().drain().collect();
        if !processes.is_empty() || !shells.is_empty() {
            debug!(
                processes = processes.len(),
                shells = shells.len(),
                "Closing processes and shells on disconnect"
            );
        }

        for (_, entry) in processes {
            let _ = entry.exit_tx.send(Err(Error::ConnectionClosed));
        }
        for (_, shell) in shells {
            shell.mark_closed(None);
        }
    }
}
