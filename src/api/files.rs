// src/api/files.rs
//! Plugins, file discovery and log reads.

use std::path::PathBuf;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use tide::{Request, StatusCode};

use super::{error_body, failure, respond, State};
use crate::parser::{ParseRequest, ParsedLine};
use crate::plugin::{effective_base_path, effective_patterns, PluginKind};
use crate::reader::{self, nonblocking, FileInfo, ReadOptions};
use crate::store::{LogFileRecord, PluginSettings};
use crate::{Error, FileFailure, RawLine, Result};

/// Lines returned by a read when the client doesn't say.
const DEFAULT_PAGE_LINES: usize = 1000;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PluginView {
    id: &'static str,
    name: &'static str,
    kind: PluginKind,
    default_base_path: PathBuf,
    default_file_patterns: Vec<String>,
    base_path: PathBuf,
    file_patterns: Vec<String>,
    settings: PluginSettings,
}

pub(super) async fn list_plugins(req: Request<State>) -> tide::Result {
    let state = req.state();
    let plugins: Vec<_> = state
        .plugins()
        .iter()
        .map(|plugin| {
            let settings = state.settings().settings_for(plugin.id());
            PluginView {
                id: plugin.id(),
                name: plugin.name(),
                kind: plugin.kind(),
                default_base_path: plugin.default_base_path(),
                default_file_patterns: plugin.default_file_patterns(),
                base_path: effective_base_path(&**plugin, &settings, None),
                file_patterns: effective_patterns(&**plugin, &settings),
                settings,
            }
        })
        .collect();
    respond(Ok(plugins))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsPatch {
    enabled: Option<bool>,
    base_path: Option<PathBuf>,
    file_patterns: Option<Vec<String>>,
    read_compressed: Option<bool>,
}

pub(super) async fn update_settings(mut req: Request<State>) -> tide::Result {
    let patch: SettingsPatch = req.body_json().await?;
    let plugin_id = req.param("id")?.to_string();
    let state = req.state().clone();

    let result = blocking::unblock(move || -> Result<_> {
        let plugin = state.plugins().get(&plugin_id)?;
        let settings = state.settings().update(&plugin_id, |settings| {
            if let Some(enabled) = patch.enabled {
                settings.enabled = enabled;
            }
            if patch.base_path.is_some() {
                settings.base_path = patch.base_path;
            }
            if patch.file_patterns.is_some() {
                settings.file_patterns = patch.file_patterns;
            }
            if let Some(read_compressed) = patch.read_compressed {
                settings.read_compressed = read_compressed;
            }
            plugin.validate_config(settings)
        })?;
        state.summarizer.invalidate();
        Ok(settings)
    })
    .await;
    respond(result)
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FilesQuery {
    plugin_id: Option<String>,
    base_path: Option<PathBuf>,
}

pub(super) async fn list_files(req: Request<State>) -> tide::Result {
    let query: FilesQuery = req.query()?;
    respond(Ok(req.state().catalog.list(query.plugin_id.as_deref())))
}

/// Files found by scanning, grouped by plugin.
#[derive(Default)]
struct Discovered {
    plugins: Vec<(String, Vec<LogFileRecord>)>,
    failures: Vec<FileFailure>,
}

/// Scan one plugin (which must then be enabled) or every enabled plugin.
fn discover(
    state: &State,
    plugin_id: Option<&str>,
    base_path: Option<PathBuf>,
) -> Result<Discovered> {
    let plugins = match plugin_id {
        Some(id) => {
            let plugin = state.plugins().get(id)?;
            if !state.settings().settings_for(id).enabled {
                return Err(Error::PluginDisabled(id.to_string()));
            }
            vec![plugin]
        }
        None => state
            .plugins()
            .iter()
            .filter(|plugin| state.settings().settings_for(plugin.id()).enabled)
            .cloned()
            .collect(),
    };

    let mut discovered = Discovered::default();
    for plugin in plugins {
        let settings = state.settings().settings_for(plugin.id());
        let base_path = effective_base_path(&*plugin, &settings, base_path.as_deref());
        let patterns = effective_patterns(&*plugin, &settings);
        match plugin.scan_log_files(&base_path, &patterns) {
            Ok(files) => {
                let records = files
                    .iter()
                    .map(|file| {
                        let readable = reader::inspect(&file.path).readable;
                        LogFileRecord::new(plugin.id(), file, readable)
                    })
                    .collect();
                discovered.plugins.push((plugin.id().to_string(), records));
            }
            Err(error) => {
                debug!("Unable to scan {} for {}: {}", base_path.display(), plugin.id(), error);
                discovered
                    .failures
                    .push(FileFailure::new(Some(plugin.id()), &base_path, error));
            }
        }
    }
    Ok(discovered)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Listing {
    files: Vec<LogFileRecord>,
    failures: Vec<FileFailure>,
}

pub(super) async fn list_files_direct(req: Request<State>) -> tide::Result {
    let query: FilesQuery = req.query()?;
    let state = req.state().clone();
    let result = blocking::unblock(move || -> Result<_> {
        let discovered = discover(&state, query.plugin_id.as_deref(), query.base_path)?;
        Ok(Listing {
            files: discovered
                .plugins
                .into_iter()
                .flat_map(|(_, records)| records)
                .collect(),
            failures: discovered.failures,
        })
    })
    .await;
    respond(result)
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ScanBody {
    plugin_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Scanned {
    files: usize,
    failures: Vec<FileFailure>,
}

pub(super) async fn scan(mut req: Request<State>) -> tide::Result {
    let body = req.body_string().await?;
    let request: ScanBody = if body.trim().is_empty() {
        ScanBody::default()
    } else {
        serde_json::from_str(&body)
            .map_err(|error| tide::Error::new(StatusCode::BadRequest, error))?
    };

    let state = req.state().clone();
    let result = blocking::unblock(move || -> Result<_> {
        let discovered = discover(&state, request.plugin_id.as_deref(), None)?;
        let mut files = 0;
        for (plugin_id, records) in discovered.plugins {
            files += records.len();
            state.catalog.replace_plugin(&plugin_id, records);
        }
        info!("Scan found {} files", files);
        Ok(Scanned {
            files,
            failures: discovered.failures,
        })
    })
    .await;
    respond(result)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Page {
    max_lines: usize,
    from_line: usize,
    tail: bool,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            max_lines: DEFAULT_PAGE_LINES,
            from_line: 0,
            tail: false,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileLogs {
    file: LogFileRecord,
    columns: Vec<&'static str>,
    logs: Vec<ParsedLine>,
}

pub(super) async fn file_logs(req: Request<State>) -> tide::Result {
    let page: Page = req.query()?;
    let id = req.param("id")?;
    let state = req.state();

    let file = match state.catalog.find(id) {
        Some(file) => file,
        None => return error_body(StatusCode::NotFound, format!("unknown file id: {}", id)),
    };
    let (plugin, settings) = match state.authorize(&file.plugin_id, &file.path) {
        Ok(authorized) => authorized,
        Err(error) => return failure(&error),
    };

    let result = state
        .parser
        .parse_file_async(ParseRequest {
            plugin_id: file.plugin_id.clone(),
            file_path: file.path.clone(),
            log_type: file.log_type.clone(),
            max_lines: page.max_lines,
            from_line: page.from_line,
            read_compressed: settings.read_compressed,
            tail: page.tail,
        })
        .await;
    respond(result.map(|logs| FileLogs {
        columns: plugin.columns(&file.log_type),
        file,
        logs,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadBody {
    plugin_id: String,
    file_path: PathBuf,
    log_type: Option<String>,
    #[serde(flatten)]
    page: Page,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DirectLogs {
    file: FileInfo,
    log_type: String,
    logs: Vec<ParsedLine>,
}

pub(super) async fn read_direct(mut req: Request<State>) -> tide::Result {
    let body: ReadBody = req.body_json().await?;
    let state = req.state();

    let (plugin, settings) = match state.authorize(&body.plugin_id, &body.file_path) {
        Ok(authorized) => authorized,
        Err(error) => return failure(&error),
    };
    let log_type = body
        .log_type
        .unwrap_or_else(|| plugin.log_type(&body.file_path));

    let result = state
        .parser
        .parse_file_async(ParseRequest {
            plugin_id: body.plugin_id,
            file_path: body.file_path.clone(),
            log_type: log_type.clone(),
            max_lines: body.page.max_lines,
            from_line: body.page.from_line,
            read_compressed: settings.read_compressed,
            tail: body.page.tail,
        })
        .await;
    let file = nonblocking::inspect(body.file_path).await;
    respond(result.map(|logs| DirectLogs {
        file,
        log_type,
        logs,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RawLogs {
    file: FileInfo,
    lines: Vec<RawLine>,
}

pub(super) async fn read_raw(mut req: Request<State>) -> tide::Result {
    let body: ReadBody = req.body_json().await?;
    let state = req.state();

    let settings = match state.authorize(&body.plugin_id, &body.file_path) {
        Ok((_, settings)) => settings,
        Err(error) => return failure(&error),
    };
    let options = ReadOptions {
        max_lines: body.page.max_lines,
        from_line: body.page.from_line,
        read_compressed: settings.read_compressed,
    };

    let result = if body.page.tail {
        nonblocking::read_last_lines(body.file_path.clone(), body.page.max_lines, options).await
    } else {
        nonblocking::read_lines(body.file_path.clone(), options).await
    };
    let file = nonblocking::inspect(body.file_path).await;
    respond(result.map(|lines| RawLogs { file, lines }))
}
