// src/plugin/system.rs
//! The host's own syslog-style logs.
use std::path::{Path, PathBuf};

use super::{formats, Plugin, PluginKind};
use crate::parser::ParsedEntry;

/// syslog, auth and kernel logs.
pub struct System;

impl Plugin for System {
    fn id(&self) -> &'static str {
        "system"
    }

    fn name(&self) -> &'static str {
        "System"
    }

    fn kind(&self) -> PluginKind {
        PluginKind::HostSystem
    }

    fn default_base_path(&self) -> PathBuf {
        PathBuf::from("/var/log")
    }

    fn default_file_patterns(&self) -> Vec<String> {
        ["syslog*", "messages*", "auth.log*", "kern.log*", "daemon.log*"]
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    fn log_type(&self, path: &Path) -> String {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if name.starts_with("auth") {
            "auth"
        } else if name.starts_with("kern") {
            "kernel"
        } else {
            "syslog"
        }
        .to_string()
    }

    fn parse_log_line(&self, line: &str, _log_type: &str) -> Option<ParsedEntry> {
        formats::syslog(line)
    }

    fn columns(&self, _log_type: &str) -> Vec<&'static str> {
        vec!["timestamp", "host", "process", "level", "message"]
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use crate::plugin::Plugin;

    use super::System;

    #[test]
    fn classifies_files() {
        assert_eq!(System.log_type(Path::new("/var/log/auth.log.1")), "auth");
        assert_eq!(System.log_type(Path::new("/var/log/kern.log")), "kernel");
        assert_eq!(System.log_type(Path::new("/var/log/syslog.2.gz")), "syslog");
    }
}
