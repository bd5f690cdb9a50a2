use anyhow::Result;
use tracing::debug;

use crate::config::Config;
use crate::launch::{TabSpec, WindowSpec};

pub type WindowId = u64;
pub type TabId = u64;

/// The window-creation collaborator. The GUI layer implements this; the
/// request handler and the local dispatch path drive it identically.
pub trait Toolkit: Send {
    fn create_window(&mut self, spec: &WindowSpec) -> Result<WindowId>;
    fn add_tab(&mut self, window: WindowId, tab: &TabSpec) -> Result<TabId>;
    fn remove_tab(&mut self, window: WindowId, tab: TabId) -> Result<()>;
    fn destroy_window(&mut self, window: WindowId) -> Result<()>;
}

struct TabState {
    id: TabId,
    hold: bool,
    exited: bool,
}

struct RealizedWindow {
    id: WindowId,
    tabs: Vec<TabState>,
    reuse_eligible: bool,
}

/// Owns every realized window, in creation order, and applies the merge and
/// closure rules that sit above the toolkit.
pub struct WindowManager {
    toolkit: Box<dyn Toolkit>,
    config: Config,
    windows: Vec<RealizedWindow>,
}

impl WindowManager {
    pub fn new(toolkit: Box<dyn Toolkit>, config: Config) -> Self {
        Self {
            toolkit,
            config,
            windows: Vec::new(),
        }
    }

    /// Realize one `WindowSpec`. A reuse-requesting window merges its tabs
    /// into the most recently created window that was itself created
    /// reuse-eligible and is not yet destroyed; drop-down windows never
    /// merge. Otherwise a new window is created with the spec's tabs.
    pub fn realize(&mut self, spec: &WindowSpec) -> Result<()> {
        if spec.reuse_last_window && !spec.is_drop_down {
            if let Some(pos) = self.windows.iter().rposition(|w| w.reuse_eligible) {
                let target = self.windows[pos].id;
                debug!(window = target, tabs = spec.tabs.len(), "merging into last window");
                for tab in &spec.tabs {
                    let id = self.toolkit.add_tab(target, tab)?;
                    self.windows[pos].tabs.push(TabState {
                        id,
                        hold: tab.hold && !tab.uses_default_shell(),
                        exited: false,
                    });
                }
                return Ok(());
            }
        }

        debug!(
            menubar = spec.menubar.resolve(self.config.show_menubar),
            toolbar = spec.toolbar.resolve(self.config.show_toolbar),
            borders = spec.borders.resolve(self.config.show_borders),
            drop_down = spec.is_drop_down,
            "creating window"
        );
        let id = self.toolkit.create_window(spec)?;
        let mut tabs = Vec::with_capacity(spec.tabs.len());
        for tab in &spec.tabs {
            let tab_id = self.toolkit.add_tab(id, tab)?;
            tabs.push(TabState {
                id: tab_id,
                hold: tab.hold && !tab.uses_default_shell(),
                exited: false,
            });
        }
        self.windows.push(RealizedWindow {
            id,
            tabs,
            reuse_eligible: spec.reuse_last_window,
        });
        Ok(())
    }

    /// Record a tab exit. Held tabs stay open; an unheld tab is removed from
    /// its window (and the toolkit told so), and a window with no tabs left
    /// is destroyed. Returns true when the last window has closed.
    pub fn tab_exited(&mut self, window: WindowId, tab: TabId) -> Result<bool> {
        if let Some(pos) = self.windows.iter().position(|w| w.id == window) {
            let mut removed = false;
            if let Some(t) = self.windows[pos].tabs.iter_mut().find(|t| t.id == tab) {
                t.exited = true;
                if !t.hold {
                    removed = true;
                }
            }
            if removed {
                self.windows[pos].tabs.retain(|t| t.id != tab);
                self.toolkit.remove_tab(window, tab)?;
            }
            if self.windows[pos].tabs.is_empty() {
                debug!(window, "last tab gone, closing window");
                self.toolkit.destroy_window(window)?;
                self.windows.remove(pos);
            }
        }
        Ok(self.windows.is_empty())
    }

    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}
