// src/api/mod.rs

//! Types and functions for initialising the `loglens` HTTP API.
//!
//! Every JSON route lives under `/api`; the WebSocket stream is at `/ws/logs`. Core errors are
//! answered with the status code of [`Error::status`] and a `{"error": message}` body.

mod files;
mod regex_config;
mod stats;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::warn;
use serde::Serialize;
use tide::{Body, Response, StatusCode};
use tide_websockets::WebSocket;

use crate::analytics::{Analytics, Limits};
use crate::parser::LineParser;
use crate::plugin::{effective_base_path, ensure_under, Plugin, PluginRegistry};
use crate::reader::FollowOptions;
use crate::realtime::socket::{self, DEFAULT_HEARTBEAT};
use crate::realtime::Delivery;
use crate::store::{FileCatalog, PluginSettings, SettingsStore};
use crate::summary::{ErrorSummarizer, SummaryConfig};
use crate::{Error, Result};

/// Default limit on analytics and error-summary requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Tunables of the service.
#[derive(Clone, Copy, Debug)]
pub struct Options {
    /// How long analytics and error-summary requests may run.
    pub request_timeout: Duration,
    /// Delay between WebSocket pings.
    pub heartbeat: Duration,
    /// Timing of followed files.
    pub follow: FollowOptions,
    /// Analytics ceilings.
    pub analytics: Limits,
    /// Initial error-summary configuration.
    pub summary: SummaryConfig,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            heartbeat: DEFAULT_HEARTBEAT,
            follow: FollowOptions::default(),
            analytics: Limits::default(),
            summary: SummaryConfig::default(),
        }
    }
}

/// Everything the handlers share.
#[derive(Clone)]
pub struct State {
    parser: LineParser,
    catalog: Arc<FileCatalog>,
    analytics: Analytics,
    summarizer: Arc<ErrorSummarizer>,
    delivery: Delivery,
    options: Options,
}

impl State {
    /// Wire up the components over a plugin registry and settings store.
    pub fn new(
        plugins: Arc<PluginRegistry>,
        settings: Arc<SettingsStore>,
        options: Options,
    ) -> Self {
        let parser = LineParser::new(Arc::clone(&plugins), Arc::clone(&settings));
        let catalog = Arc::new(FileCatalog::new());
        Self {
            analytics: Analytics::new(parser.clone(), options.analytics),
            summarizer: Arc::new(ErrorSummarizer::new(plugins, settings, options.summary)),
            delivery: Delivery::new(parser.clone(), Arc::clone(&catalog), options.follow),
            parser,
            catalog,
            options,
        }
    }

    fn plugins(&self) -> &PluginRegistry {
        self.parser.plugins()
    }

    fn settings(&self) -> &Arc<SettingsStore> {
        self.parser.settings()
    }

    /// The plugin and its settings, if it is enabled and `path` lies under its base path.
    fn authorize(&self, plugin_id: &str, path: &Path) -> Result<(Arc<dyn Plugin>, PluginSettings)> {
        let plugin = self.plugins().get(plugin_id)?;
        let settings = self.settings().settings_for(plugin_id);
        if !settings.enabled {
            return Err(Error::PluginDisabled(plugin_id.to_string()));
        }
        ensure_under(&effective_base_path(&*plugin, &settings, None), path)?;
        Ok((plugin, settings))
    }
}

/// An instance of the `loglens` HTTP API.
///
/// This is aliased to save typing out the entire `State` type.
pub type Server = tide::Server<State>;

/// Initialise an instance of the `loglens` HTTP API.
pub fn server(state: State) -> Server {
    let mut app = tide::Server::with_state(state);

    app.at("/api/plugins").get(files::list_plugins);
    app.at("/api/plugins/:id/settings").put(files::update_settings);
    app.at("/api/files").get(files::list_files);
    app.at("/api/files-direct").get(files::list_files_direct);
    app.at("/api/scan").post(files::scan);
    app.at("/api/files/:id/logs").get(files::file_logs);
    app.at("/api/read-direct").post(files::read_direct);
    app.at("/api/read-raw").post(files::read_raw);

    app.at("/api/regex-config")
        .put(regex_config::put_config)
        .get(regex_config::get_config)
        .delete(regex_config::delete_config);
    app.at("/api/generate-regex").post(regex_config::generate);

    app.at("/api/analytics").get(stats::analytics);
    app.at("/api/error-summary").get(stats::error_summary);
    app.at("/api/error-summary/progress").get(stats::progress);
    app.at("/api/error-summary/invalidate").post(stats::invalidate);
    app.at("/api/error-summary/config")
        .get(stats::get_summary_config)
        .put(stats::put_summary_config);

    app.at("/ws/logs")
        .get(WebSocket::new(|req: tide::Request<State>, stream| async move {
            let state = req.state();
            socket::serve(state.delivery.clone(), state.options.heartbeat, stream).await
        }));

    app
}

fn json(status: StatusCode, body: &impl Serialize) -> tide::Result {
    Ok(Response::builder(status).body(Body::from_json(body)?).build())
}

fn error_body(status: StatusCode, message: impl ToString) -> tide::Result {
    json(status, &serde_json::json!({ "error": message.to_string() }))
}

fn failure(error: &Error) -> tide::Result {
    let status = StatusCode::try_from(error.status()).unwrap_or(StatusCode::InternalServerError);
    if status.is_server_error() {
        warn!("Request failed: {}", error);
    }
    error_body(status, error)
}

/// Answer `200` with the value, or the error's status.
fn respond<T: Serialize>(result: Result<T>) -> tide::Result {
    match result {
        Ok(value) => json(StatusCode::Ok, &value),
        Err(error) => failure(&error),
    }
}

fn timed_out() -> tide::Result {
    error_body(StatusCode::GatewayTimeout, "request timed out")
}
