use std::collections::HashMap;
use std::io::Read;

use anyhow::Result;
use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::event::ServerEvent;
use crate::launch::{TabSpec, WindowSpec};
use crate::window::{TabId, Toolkit, WindowId};

struct PtyTab {
    // The child itself lives in the reader task, which reaps it on EOF;
    // this handle is what `destroy_window` kills through.
    killer: Box<dyn portable_pty::ChildKiller + Send + Sync>,
    // Dropping the master hangs up the slave side, so it lives here.
    _master: Box<dyn portable_pty::MasterPty + Send>,
}

/// Toolkit implementation that owns the process side of every tab: each tab
/// is a command (or the default shell) on its own PTY. The rendering widget
/// is the GUI layer's concern; output is drained here so a chatty child
/// never blocks on a full PTY buffer.
pub struct PtyToolkit {
    shell: String,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
    next_id: u64,
    tabs: HashMap<TabId, PtyTab>,
    windows: HashMap<WindowId, Vec<TabId>>,
}

impl PtyToolkit {
    pub fn new(shell: String, event_tx: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            shell,
            event_tx,
            next_id: 0,
            tabs: HashMap::new(),
            windows: HashMap::new(),
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl Toolkit for PtyToolkit {
    fn create_window(&mut self, spec: &WindowSpec) -> Result<WindowId> {
        let id = self.next_id();
        debug!(
            window = id,
            geometry = %spec.geometry.map(|g| g.to_string()).unwrap_or_default(),
            role = spec.role.as_deref().unwrap_or(""),
            "window created"
        );
        self.windows.insert(id, Vec::new());
        Ok(id)
    }

    fn add_tab(&mut self, window: WindowId, tab: &TabSpec) -> Result<TabId> {
        let id = self.next_id();
        // Initial size only; the widget layer resizes once it exists.
        let size = PtySize {
            rows: 24,
            cols: 80,
            pixel_width: 0,
            pixel_height: 0,
        };

        let pty_system = native_pty_system();
        let pair = pty_system.openpty(size)?;

        let mut cmd = if tab.command.is_empty() {
            CommandBuilder::new(&self.shell)
        } else {
            let mut c = CommandBuilder::new(&tab.command[0]);
            c.args(&tab.command[1..]);
            c
        };
        if let Some(dir) = &tab.working_directory {
            cmd.cwd(dir);
        }
        cmd.env("TERM", "xterm-256color");

        let mut child = pair.slave.spawn_command(cmd)?;
        drop(pair.slave);

        let killer = child.clone_killer();
        let mut reader = pair.master.try_clone_reader()?;
        let tx = self.event_tx.clone();
        tokio::task::spawn_blocking(move || {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        // Consumed by the terminal widget in the full
                        // application; drained here.
                    }
                }
            }
            // EOF means the child hung up; reap it before reporting the
            // exit, or it lingers as a zombie.
            let _ = child.wait();
            let _ = tx.send(ServerEvent::TabExited { window, tab: id });
        });

        debug!(window, tab = id, title = tab.title.as_deref().unwrap_or(""), "tab opened");
        self.tabs.insert(
            id,
            PtyTab {
                killer,
                _master: pair.master,
            },
        );
        self.windows.entry(window).or_default().push(id);
        Ok(id)
    }

    fn remove_tab(&mut self, window: WindowId, tab: TabId) -> Result<()> {
        // The child is already gone (or about to be); dropping the master
        // hangs up anything still attached.
        self.tabs.remove(&tab);
        if let Some(tab_ids) = self.windows.get_mut(&window) {
            tab_ids.retain(|t| *t != tab);
        }
        debug!(window, tab, "tab removed");
        Ok(())
    }

    fn destroy_window(&mut self, window: WindowId) -> Result<()> {
        if let Some(tab_ids) = self.windows.remove(&window) {
            for tab_id in tab_ids {
                if let Some(mut tab) = self.tabs.remove(&tab_id) {
                    let _ = tab.killer.kill();
                }
            }
        }
        debug!(window, "window destroyed");
        Ok(())
    }
}
