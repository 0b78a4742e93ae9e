// src/plugin/web.rs
//! Apache and nginx.
use std::path::{Path, PathBuf};

use super::{formats, Plugin, PluginKind};
use crate::parser::ParsedEntry;

const ACCESS_COLUMNS: &[&str] = &[
    "timestamp",
    "ip",
    "method",
    "url",
    "status",
    "size",
    "referer",
    "userAgent",
];

const ERROR_COLUMNS: &[&str] = &["timestamp", "level", "ip", "message"];

/// A web server whose access logs use the combined/common format.
///
/// Apache and nginx only differ in their defaults and in the layout of their error logs.
pub struct WebServer {
    id: &'static str,
    name: &'static str,
    base_path: &'static str,
    parse_error: fn(&str) -> Option<ParsedEntry>,
}

impl WebServer {
    /// The Apache HTTP server.
    #[must_use]
    pub fn apache() -> Self {
        Self {
            id: "apache",
            name: "Apache",
            base_path: "/var/log/apache2",
            parse_error: formats::apache_error,
        }
    }

    /// nginx.
    #[must_use]
    pub fn nginx() -> Self {
        Self {
            id: "nginx",
            name: "Nginx",
            base_path: "/var/log/nginx",
            parse_error: formats::nginx_error,
        }
    }
}

impl Plugin for WebServer {
    fn id(&self) -> &'static str {
        self.id
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> PluginKind {
        PluginKind::WebServer
    }

    fn default_base_path(&self) -> PathBuf {
        PathBuf::from(self.base_path)
    }

    fn default_file_patterns(&self) -> Vec<String> {
        vec!["*access*.log*".to_string(), "*error*.log*".to_string()]
    }

    fn log_type(&self, path: &Path) -> String {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if name.contains("error") {
            "error".to_string()
        } else {
            "access".to_string()
        }
    }

    fn parse_log_line(&self, line: &str, log_type: &str) -> Option<ParsedEntry> {
        match log_type {
            "error" => (self.parse_error)(line),
            _ => formats::access(line),
        }
    }

    fn columns(&self, log_type: &str) -> Vec<&'static str> {
        match log_type {
            "error" => ERROR_COLUMNS.to_vec(),
            _ => ACCESS_COLUMNS.to_vec(),
        }
    }
}
