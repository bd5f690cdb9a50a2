use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Tri-state visibility
// ---------------------------------------------------------------------------

/// Visibility of a window chrome element. `Default` defers to the persisted
/// preference in `Config`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    #[default]
    Default,
    Show,
    Hide,
}

impl Visibility {
    /// Resolve against the configured default.
    pub fn resolve(self, default_on: bool) -> bool {
        match self {
            Visibility::Default => default_on,
            Visibility::Show => true,
            Visibility::Hide => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// A validated `COLSxROWS[+X+Y]` geometry request. Stored structured so the
/// parser can reject junk, re-printed as the original string for the window
/// collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub cols: u32,
    pub rows: u32,
    pub offset: Option<(i32, i32)>,
}

impl FromStr for Geometry {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let off_idx = s.find(['+', '-']);
        let size = &s[..off_idx.unwrap_or(s.len())];
        let (cols, rows) = size
            .split_once('x')
            .ok_or_else(|| format!("expected COLSxROWS[+X+Y], got '{}'", s))?;
        let cols: u32 = cols
            .parse()
            .map_err(|_| format!("invalid column count '{}'", cols))?;
        let rows: u32 = rows
            .parse()
            .map_err(|_| format!("invalid row count '{}'", rows))?;

        let offset = match off_idx {
            None => None,
            Some(i) => {
                let rest = &s[i..];
                // second sign separates X from Y: "+30-40" → "+30", "-40"
                let split = rest[1..]
                    .find(['+', '-'])
                    .map(|j| j + 1)
                    .ok_or_else(|| format!("expected both X and Y offsets in '{}'", s))?;
                let x: i32 = rest[..split]
                    .parse()
                    .map_err(|_| format!("invalid X offset in '{}'", s))?;
                let y: i32 = rest[split..]
                    .parse()
                    .map_err(|_| format!("invalid Y offset in '{}'", s))?;
                Some((x, y))
            }
        };

        Ok(Geometry { cols, rows, offset })
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)?;
        if let Some((x, y)) = self.offset {
            write!(f, "{:+}{:+}", x, y)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tab / window specifications
// ---------------------------------------------------------------------------

/// One tab to open: the argv to run (empty = default shell) plus overrides.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TabSpec {
    pub command: Vec<String>,
    pub working_directory: Option<PathBuf>,
    pub title: Option<String>,
    /// Keep the tab open after the command exits. Ignored at realization
    /// when `command` is empty, but preserved for round-trip fidelity.
    pub hold: bool,
}

impl TabSpec {
    pub fn uses_default_shell(&self) -> bool {
        self.command.is_empty()
    }
}

/// One window to open, with its ordered tabs and window-level attributes.
/// `display`, `role`, `startup_id`, `sm_client_id` and `icon` are opaque
/// pass-through values for the window collaborator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub tabs: Vec<TabSpec>,
    pub is_drop_down: bool,
    pub display: Option<String>,
    pub geometry: Option<Geometry>,
    pub role: Option<String>,
    pub startup_id: Option<String>,
    pub sm_client_id: Option<String>,
    pub icon: Option<String>,
    pub fullscreen: bool,
    pub maximize: bool,
    pub reuse_last_window: bool,
    pub menubar: Visibility,
    pub borders: Visibility,
    pub toolbar: Visibility,
}

impl Default for WindowSpec {
    fn default() -> Self {
        Self {
            // A window always has at least one tab.
            tabs: vec![TabSpec::default()],
            is_drop_down: false,
            display: None,
            geometry: None,
            role: None,
            startup_id: None,
            sm_client_id: None,
            icon: None,
            fullscreen: false,
            maximize: false,
            reuse_last_window: false,
            menubar: Visibility::Default,
            borders: Visibility::Default,
            toolbar: Visibility::Default,
        }
    }
}

/// The full parse result for one invocation. Built once by the option
/// parser, then either realized locally or serialized to a running server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LaunchRequest {
    pub windows: Vec<WindowSpec>,
    pub show_help: bool,
    pub show_version: bool,
    pub show_colors: bool,
    pub disable_server: bool,
}

impl Default for LaunchRequest {
    fn default() -> Self {
        Self {
            windows: vec![WindowSpec::default()],
            show_help: false,
            show_version: false,
            show_colors: false,
            disable_server: false,
        }
    }
}

impl LaunchRequest {
    /// True when the invocation is handled by printing something and
    /// exiting, without touching the instance locator.
    pub fn is_terminal(&self) -> bool {
        self.show_help || self.show_version || self.show_colors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_parses_size_only() {
        let g: Geometry = "80x24".parse().unwrap();
        assert_eq!(g.cols, 80);
        assert_eq!(g.rows, 24);
        assert_eq!(g.offset, None);
    }

    #[test]
    fn geometry_parses_offsets() {
        let g: Geometry = "132x43+10-20".parse().unwrap();
        assert_eq!(g.offset, Some((10, -20)));
        assert_eq!(g.to_string(), "132x43+10-20");
    }

    #[test]
    fn geometry_display_roundtrip() {
        for s in ["80x24", "100x30+0+0", "90x25-5+7"] {
            let g: Geometry = s.parse().unwrap();
            assert_eq!(g.to_string(), s);
        }
    }

    #[test]
    fn geometry_rejects_junk() {
        assert!("abc".parse::<Geometry>().is_err());
        assert!("80".parse::<Geometry>().is_err());
        assert!("80xzz".parse::<Geometry>().is_err());
        assert!("80x24+5".parse::<Geometry>().is_err());
    }

    #[test]
    fn visibility_resolution() {
        assert!(Visibility::Default.resolve(true));
        assert!(!Visibility::Default.resolve(false));
        assert!(Visibility::Show.resolve(false));
        assert!(!Visibility::Hide.resolve(true));
    }

    #[test]
    fn default_window_has_one_default_tab() {
        let w = WindowSpec::default();
        assert_eq!(w.tabs, vec![TabSpec::default()]);
        assert!(w.tabs[0].uses_default_shell());
    }

    #[test]
    fn window_spec_serde_roundtrip() {
        let mut w = WindowSpec::default();
        w.geometry = Some("80x24+1+2".parse().unwrap());
        w.menubar = Visibility::Hide;
        w.tabs[0].command = vec!["htop".into()];
        w.tabs[0].hold = true;
        let json = serde_json::to_string(&w).unwrap();
        let back: WindowSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, w);
    }
}
