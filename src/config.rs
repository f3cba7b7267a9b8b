//! The Fusion logging configuration value type.
//!
//! Four values control the assembly loader's bind logging. All of them
//! default to off/absent, so a delta parsed from zero arguments equals the
//! default configuration.

/// The Fusion bind-logging settings stored under
/// `HKLM\SOFTWARE\Microsoft\Fusion`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogConfiguration {
    /// Log every assembly bind (`ForceLog`).
    pub force_log: bool,
    /// Log failed binds only (`LogFailures`).
    pub log_failures: bool,
    /// Log satellite/resource assembly binds (`LogResourceBinds`).
    pub log_resource_binds: bool,
    /// Directory receiving the bind logs (`LogPath` in the registry).
    pub log_directory: Option<String>,
}

/// A single edit to the configuration.
///
/// Both the command-line parser and the interactive surface reduce their
/// inputs to these messages; `LogConfiguration::apply` is the only mutation
/// path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigEdit {
    ForceLog(bool),
    LogFailures(bool),
    LogResourceBinds(bool),
    LogDirectory(String),
}

impl LogConfiguration {
    /// Apply one edit. An empty directory string clears the directory;
    /// empty and absent are not distinguishable anywhere downstream.
    pub fn apply(&mut self, edit: ConfigEdit) {
        match edit {
            ConfigEdit::ForceLog(on) => self.force_log = on,
            ConfigEdit::LogFailures(on) => self.log_failures = on,
            ConfigEdit::LogResourceBinds(on) => self.log_resource_binds = on,
            ConfigEdit::LogDirectory(dir) => {
                self.log_directory = if dir.is_empty() { None } else { Some(dir) };
            }
        }
    }

    /// The directory as a string slice, empty when unset.
    pub fn log_directory_str(&self) -> &str {
        self.log_directory.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_all_off() {
        let cfg = LogConfiguration::default();
        assert!(!cfg.force_log);
        assert!(!cfg.log_failures);
        assert!(!cfg.log_resource_binds);
        assert_eq!(cfg.log_directory, None);
    }

    #[test]
    fn apply_sets_each_field() {
        let mut cfg = LogConfiguration::default();
        cfg.apply(ConfigEdit::ForceLog(true));
        cfg.apply(ConfigEdit::LogFailures(true));
        cfg.apply(ConfigEdit::LogResourceBinds(true));
        cfg.apply(ConfigEdit::LogDirectory(r"c:\fusion\logs".into()));
        assert!(cfg.force_log);
        assert!(cfg.log_failures);
        assert!(cfg.log_resource_binds);
        assert_eq!(cfg.log_directory.as_deref(), Some(r"c:\fusion\logs"));
    }

    #[test]
    fn empty_directory_clears() {
        let mut cfg = LogConfiguration::default();
        cfg.apply(ConfigEdit::LogDirectory(r"c:\logs".into()));
        cfg.apply(ConfigEdit::LogDirectory(String::new()));
        assert_eq!(cfg.log_directory, None);
        assert_eq!(cfg.log_directory_str(), "");
    }
}
