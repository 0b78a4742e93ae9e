// src/api/stats.rs
//! Analytics and the error summary.
//!
//! Both scans run under the request timeout. A timed-out request answers `504` and cancels its
//! scan, which stops at its next check without caching anything.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_std::future;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tide::{Request, StatusCode};

use super::{json, respond, timed_out, State};
use crate::analytics::aggregate::Bucket;
use crate::analytics::{FileScope, Query};
use crate::plugin::PluginKind;
use crate::summary::{Depth, SummaryConfig};
use crate::{Cancel, Error};

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AnalyticsParams {
    /// Comma separated; every web-server plugin when absent.
    plugin_id: Option<String>,
    base_path: Option<PathBuf>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    bucket: Bucket,
    top_limit: usize,
    file_scope: FileScope,
    include_compressed: bool,
}

impl AnalyticsParams {
    fn into_query(self, state: &State) -> Result<Query, Error> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(Error::InvalidRequest("`from` is after `to`".to_string()));
            }
        }

        let plugin_ids = match self.plugin_id {
            Some(ids) => ids
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect(),
            None => state
                .plugins()
                .iter()
                .filter(|plugin| plugin.kind() == PluginKind::WebServer)
                .map(|plugin| plugin.id().to_string())
                .collect(),
        };

        Ok(Query {
            plugin_ids,
            base_path: self.base_path,
            from: self.from,
            to: self.to,
            bucket: self.bucket,
            top_limit: self.top_limit,
            file_scope: self.file_scope,
            include_compressed: self.include_compressed,
        })
    }
}

pub(super) async fn analytics(req: Request<State>) -> tide::Result {
    let params: AnalyticsParams = req.query()?;
    let state = req.state();
    let query = match params.into_query(state) {
        Ok(query) => query,
        Err(error) => return respond::<()>(Err(error)),
    };

    let cancel = Cancel::new();
    let report = state.analytics.report(query, cancel.clone());
    match future::timeout(state.options.request_timeout, report).await {
        Ok(result) => respond(result),
        Err(_) => {
            cancel.cancel();
            timed_out()
        }
    }
}

pub(super) async fn error_summary(req: Request<State>) -> tide::Result {
    let state = req.state();
    let summarizer = Arc::clone(&state.summarizer);

    let cancel = Cancel::new();
    let summarized = summarizer.summarize_async(cancel.clone());
    match future::timeout(state.options.request_timeout, summarized).await {
        Ok(result) => respond(result),
        Err(_) => {
            cancel.cancel();
            timed_out()
        }
    }
}

pub(super) async fn progress(req: Request<State>) -> tide::Result {
    json(StatusCode::Ok, &req.state().summarizer.progress())
}

pub(super) async fn invalidate(req: Request<State>) -> tide::Result {
    req.state().summarizer.invalidate();
    json(StatusCode::Ok, &serde_json::json!({ "invalidated": true }))
}

pub(super) async fn get_summary_config(req: Request<State>) -> tide::Result {
    json(StatusCode::Ok, &req.state().summarizer.config())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigPatch {
    max_file_size_bytes: Option<u64>,
    max_files_per_plugin: Option<usize>,
    depth: Option<Depth>,
    /// Seconds.
    ttl: Option<u64>,
}

impl ConfigPatch {
    fn apply(self, mut config: SummaryConfig) -> Result<SummaryConfig, Error> {
        if self.max_files_per_plugin == Some(0) {
            return Err(Error::InvalidRequest(
                "maxFilesPerPlugin must be at least 1".to_string(),
            ));
        }
        if let Some(max_file_size_bytes) = self.max_file_size_bytes {
            config.max_file_size_bytes = max_file_size_bytes;
        }
        if let Some(max_files_per_plugin) = self.max_files_per_plugin {
            config.max_files_per_plugin = max_files_per_plugin;
        }
        if let Some(depth) = self.depth {
            config.depth = depth;
        }
        if let Some(ttl) = self.ttl {
            config.ttl = Duration::from_secs(ttl);
        }
        Ok(config)
    }
}

pub(super) async fn put_summary_config(mut req: Request<State>) -> tide::Result {
    let patch: ConfigPatch = req.body_json().await?;
    let summarizer = &req.state().summarizer;

    let result = patch.apply(summarizer.config()).map(|config| {
        summarizer.set_config(config);
        config
    });
    respond(result)
}
