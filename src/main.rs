// main.rs
use std::error::Error;
use std::sync::Arc;

use log::info;
use structopt::StructOpt;

use loglens::api::{self, State};
use loglens::config::Config;
use loglens::plugin::PluginRegistry;
use loglens::store::SettingsStore;

#[async_std::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let config = Config::from_args();
    let settings = SettingsStore::open(&config.data_directory)?;
    let state = State::new(
        Arc::new(PluginRegistry::with_defaults()),
        Arc::new(settings),
        config.options(),
    );

    info!("Listening on {}", config.bind);
    api::server(state).listen(config.bind.clone()).await?;

    Ok(())
}
