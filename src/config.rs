use serde::Deserialize;

/// Persisted preferences consulted where a `WindowSpec` says `Default`.
#[derive(Clone, Debug)]
pub struct Config {
    /// Shell for tabs with no explicit command. Falls back to `$SHELL`,
    /// then `/bin/sh`.
    pub shell: Option<String>,
    pub show_menubar: bool,
    pub show_toolbar: bool,
    pub show_borders: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shell: None,
            show_menubar: true,
            show_toolbar: false,
            show_borders: true,
        }
    }
}

#[derive(Deserialize)]
struct RawConfig {
    shell: Option<String>,
    show_menubar: Option<bool>,
    show_toolbar: Option<bool>,
    show_borders: Option<bool>,
}

impl Config {
    pub fn load() -> Self {
        let path = dirs::config_dir()
            .map(|d| d.join("tern").join("config.toml"))
            .unwrap_or_default();

        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return Self::default(),
        };

        let raw: RawConfig = match toml::from_str(&content) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("tern: invalid config at {}: {}", path.display(), e);
                return Self::default();
            }
        };

        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Self {
        let mut config = Self::default();
        if raw.shell.is_some() {
            config.shell = raw.shell;
        }
        if let Some(v) = raw.show_menubar {
            config.show_menubar = v;
        }
        if let Some(v) = raw.show_toolbar {
            config.show_toolbar = v;
        }
        if let Some(v) = raw.show_borders {
            config.show_borders = v;
        }
        config
    }

    pub fn shell(&self) -> String {
        self.shell
            .clone()
            .or_else(|| std::env::var("SHELL").ok())
            .unwrap_or_else(|| "/bin/sh".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_other_defaults() {
        let raw: RawConfig = toml::from_str("show_menubar = false").unwrap();
        let config = Config::from_raw(raw);
        assert!(!config.show_menubar);
        assert!(config.show_borders);
        assert!(!config.show_toolbar);
        assert_eq!(config.shell, None);
    }

    #[test]
    fn full_config_parses() {
        let raw: RawConfig = toml::from_str(
            "shell = \"/bin/zsh\"\nshow_menubar = false\nshow_toolbar = true\nshow_borders = false\n",
        )
        .unwrap();
        let config = Config::from_raw(raw);
        assert_eq!(config.shell.as_deref(), Some("/bin/zsh"));
        assert!(config.show_toolbar);
        assert!(!config.show_borders);
    }
}
