// src/api/regex_config.rs
//! Custom regex configuration and regex synthesis.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tide::{Request, StatusCode};

use super::{error_body, respond, State};
use crate::parser::custom::{config_key, CustomRegexConfig};
use crate::synth::synthesize;
use crate::Result;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Target {
    plugin_id: String,
    file_path: PathBuf,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PutBody {
    plugin_id: String,
    file_path: PathBuf,
    regex: String,
    log_type: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Stored {
    plugin_id: String,
    key: String,
    config: CustomRegexConfig,
}

pub(super) async fn put_config(mut req: Request<State>) -> tide::Result {
    let body: PutBody = req.body_json().await?;
    let state = req.state().clone();

    let result = blocking::unblock(move || -> Result<_> {
        let plugin = state.plugins().get(&body.plugin_id)?;
        let log_type = body
            .log_type
            .unwrap_or_else(|| plugin.log_type(&body.file_path));
        let config = CustomRegexConfig::new(&body.regex, &log_type)?;
        state
            .settings()
            .set_custom_regex(&body.plugin_id, &body.file_path, config.clone())?;
        Ok(Stored {
            key: config_key(&body.file_path),
            plugin_id: body.plugin_id,
            config,
        })
    })
    .await;
    respond(result)
}

pub(super) async fn get_config(req: Request<State>) -> tide::Result {
    let target: Target = req.query()?;
    let state = req.state();

    if let Err(error) = state.plugins().get(&target.plugin_id) {
        return respond::<()>(Err(error));
    }
    match state
        .settings()
        .custom_regex_for(&target.plugin_id, &target.file_path)
    {
        Some(config) => respond(Ok(Stored {
            key: config_key(&target.file_path),
            plugin_id: target.plugin_id,
            config,
        })),
        None => error_body(StatusCode::NotFound, "no custom regex for this file"),
    }
}

pub(super) async fn delete_config(req: Request<State>) -> tide::Result {
    let target: Target = req.query()?;
    let state = req.state().clone();

    let result = blocking::unblock(move || -> Result<_> {
        state.plugins().get(&target.plugin_id)?;
        let removed = state
            .settings()
            .remove_custom_regex(&target.plugin_id, &target.file_path)?;
        Ok(serde_json::json!({ "removed": removed }))
    })
    .await;
    respond(result)
}

#[derive(Deserialize)]
struct GenerateBody {
    sample: String,
}

pub(super) async fn generate(mut req: Request<State>) -> tide::Result {
    let body: GenerateBody = req.body_json().await?;
    respond(synthesize(&body.sample))
}
