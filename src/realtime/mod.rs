// src/realtime/mod.rs
//! Pushing followed log lines to clients.
//!
//! A [`Connection`] is the transport-independent side of one client: it owns the client's
//! subscription [`Registry`](registry::Registry) and a bounded [`Outbound`] message queue. The
//! WebSocket endpoint in [`socket`] drives it. Dropping the `Connection` cancels every
//! subscription.

pub mod protocol;
pub mod registry;
pub mod socket;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use async_std::channel::{self, Receiver, Sender, TrySendError};
use log::{debug, info, warn};

use self::protocol::{ClientMessage, ServerMessage};
use self::registry::{passes, Filter, Registry, Subscription};
use crate::parser::{LineParser, ParseRequest};
use crate::plugin::{effective_base_path, ensure_under};
use crate::reader::{nonblocking, FollowOptions};
use crate::store::FileCatalog;
use crate::{Error, Result};

/// The most lines replayed when subscribing.
pub const DEFAULT_REPLAY_LIMIT: usize = 1000;

/// Messages queued per connection before the client is considered too slow and cut off.
///
/// Must exceed [`DEFAULT_REPLAY_LIMIT`], since a replay is queued in one go.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 4096;

/// The sending side of a connection's bounded message queue.
///
/// When the queue is full the message is dropped and the overflow receiver handed out by
/// [`Outbound::bounded`] is signalled once; its owner is expected to close the connection.
#[derive(Clone, Debug)]
pub struct Outbound {
    messages: Sender<ServerMessage>,
    overflow: Sender<()>,
}

impl Outbound {
    /// A queue holding at most `capacity` messages, with its message and overflow receivers.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, Receiver<ServerMessage>, Receiver<()>) {
        let (messages, received) = channel::bounded(capacity.max(1));
        let (overflow, overflowed) = channel::bounded(1);
        (Self { messages, overflow }, received, overflowed)
    }

    fn send(&self, message: ServerMessage) {
        match self.messages.try_send(message) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(_)) => {
                if self.overflow.try_send(()).is_ok() {
                    warn!(
                        "Client fell {} messages behind, dropping it",
                        self.messages.len()
                    );
                }
            }
        }
    }

    /// Whether the queue has overflowed.
    #[must_use]
    pub fn overflowed(&self) -> bool {
        self.overflow.is_full()
    }
}

/// What connections need to serve subscriptions.
#[derive(Clone)]
pub struct Delivery {
    parser: LineParser,
    catalog: Arc<FileCatalog>,
    follow: FollowOptions,
    replay_limit: usize,
}

impl Delivery {
    /// Serve subscriptions with the given parser and catalog.
    ///
    /// `follow` supplies the timing options of followers; their `from_line` and `read_compressed`
    /// are set per subscription.
    pub fn new(parser: LineParser, catalog: Arc<FileCatalog>, follow: FollowOptions) -> Self {
        Self {
            parser,
            catalog,
            follow,
            replay_limit: DEFAULT_REPLAY_LIMIT,
        }
    }

    /// Change how many existing lines are replayed when subscribing.
    #[must_use]
    pub fn with_replay_limit(mut self, replay_limit: usize) -> Self {
        self.replay_limit = replay_limit;
        self
    }
}

/// The file a subscription refers to.
struct Target {
    path: PathBuf,
    plugin_id: String,
    log_type: String,
    read_compressed: bool,
}

/// One client.
pub struct Connection {
    delivery: Delivery,
    registry: Registry,
    outbound: Outbound,
}

impl Connection {
    /// Open a connection, greeting the client through `outbound`.
    pub fn new(delivery: Delivery, outbound: Outbound) -> Self {
        let connection = Self {
            delivery,
            registry: Registry::new(),
            outbound,
        };
        connection.send(ServerMessage::Connected {
            message: "connected to log stream".to_string(),
        });
        connection
    }

    /// The number of live subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.registry.len()
    }

    fn send(&self, message: ServerMessage) {
        self.outbound.send(message);
    }

    /// Handle a raw text frame.
    pub async fn handle_text(&mut self, text: &str) {
        match serde_json::from_str(text) {
            Ok(message) => self.handle(message).await,
            Err(error) => self.send(ServerMessage::error(
                None,
                format!("invalid message: {}", error),
            )),
        }
    }

    /// Handle a decoded message.
    pub async fn handle(&mut self, message: ClientMessage) {
        match message {
            ClientMessage::Subscribe {
                file_id,
                plugin_id,
                file_path,
                log_type,
                follow,
                from_line,
            } => {
                let target = self.resolve(&file_id, plugin_id, file_path, log_type);
                let result = match target {
                    Ok(target) => self.subscribe(&file_id, target, follow, from_line).await,
                    Err(error) => Err(error),
                };
                if let Err(error) = result {
                    debug!("Subscription {} failed: {}", file_id, error);
                    self.send(ServerMessage::error(Some(&file_id), error));
                }
            }
            ClientMessage::Unsubscribe { file_id } => {
                self.registry.remove(&file_id);
                self.send(ServerMessage::Unsubscribed { file_id });
            }
            ClientMessage::Filter {
                file_id,
                level,
                search,
            } => match self.registry.get(&file_id) {
                Some(subscription) => {
                    *subscription
                        .filter
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner) = Filter::new(level, search);
                    self.send(ServerMessage::FilterApplied { file_id });
                }
                None => self.send(ServerMessage::error(
                    Some(&file_id),
                    "no such subscription",
                )),
            },
        }
    }

    fn resolve(
        &self,
        file_id: &str,
        plugin_id: Option<String>,
        file_path: Option<PathBuf>,
        log_type: Option<String>,
    ) -> Result<Target> {
        let parser = &self.delivery.parser;
        let (path, plugin_id, catalog_type) = match file_path {
            Some(path) => {
                let plugin_id = plugin_id.ok_or_else(|| {
                    Error::InvalidRequest("pluginId is required with filePath".to_string())
                })?;
                (path, plugin_id, None)
            }
            None => {
                let record = self
                    .delivery
                    .catalog
                    .find(file_id)
                    .ok_or_else(|| Error::InvalidRequest(format!("unknown file id {}", file_id)))?;
                (record.path, record.plugin_id, Some(record.log_type))
            }
        };

        let plugin = parser.plugins().get(&plugin_id)?;
        let settings = parser.settings().settings_for(&plugin_id);
        if !settings.enabled {
            return Err(Error::PluginDisabled(plugin_id));
        }
        ensure_under(&effective_base_path(&*plugin, &settings, None), &path)?;

        let log_type = log_type
            .or(catalog_type)
            .unwrap_or_else(|| plugin.log_type(&path));
        Ok(Target {
            path,
            plugin_id,
            log_type,
            read_compressed: settings.read_compressed,
        })
    }

    async fn subscribe(
        &mut self,
        file_id: &str,
        target: Target,
        follow: bool,
        from_line: usize,
    ) -> Result<()> {
        let info = nonblocking::inspect(target.path.clone()).await;
        if !info.exists {
            return Err(Error::NotFound(target.path));
        }
        if !info.readable {
            return Err(Error::PermissionDenied(target.path));
        }
        let follow = follow && !info.compressed;

        // Replace any previous subscription before replaying, so its lines can't interleave.
        self.registry.remove(file_id);
        self.send(ServerMessage::Subscribed {
            file_id: file_id.to_string(),
            size: info.size,
            compressed: info.compressed,
            rotated: info.rotated,
            follow,
        });

        let filter = Arc::new(Mutex::new(Filter::default()));
        let replayed = self
            .delivery
            .parser
            .parse_file_async(ParseRequest {
                plugin_id: target.plugin_id.clone(),
                file_path: target.path.clone(),
                log_type: target.log_type.clone(),
                max_lines: self.delivery.replay_limit,
                from_line,
                read_compressed: target.read_compressed,
                tail: false,
            })
            .await?;
        let last_line = replayed
            .last()
            .map_or(from_line, |line| line.raw.line_number);
        for line in replayed {
            self.send(ServerMessage::log_line(file_id, line));
        }

        let handle = if follow {
            let outbound = self.outbound.clone();
            let callback_filter = Arc::clone(&filter);
            let id = file_id.to_string();
            let options = FollowOptions {
                from_line: last_line,
                read_compressed: target.read_compressed,
                ..self.delivery.follow
            };
            Some(self.delivery.parser.stream_parse(
                &target.plugin_id,
                &target.path,
                &target.log_type,
                options,
                move |line| {
                    if passes(&callback_filter, &line) {
                        outbound.send(ServerMessage::log_line(&id, line));
                    }
                },
            )?)
        } else {
            None
        };

        info!(
            "Subscribed {} to {} (follow: {})",
            file_id,
            target.path.display(),
            follow
        );
        self.registry.insert(
            file_id.to_string(),
            Subscription {
                file_path: target.path,
                plugin_id: target.plugin_id,
                log_type: target.log_type,
                filter,
                handle,
            },
        );
        Ok(())
    }
}
