//! Subcommands and their execution.
//!
//! Commands return the lines to print so they can be exercised against any
//! [`BrokerStore`] in tests.

use std::sync::Arc;

use bytes::Bytes;
use clap::Subcommand;
use mockable::Clock;
use mqstash_core::{Message, MessageProperties, QoS, UserProperty};
use mqstash_service::{MessageService, PushPropertyCache, ServiceOptions};
use mqstash_storage::{BrokerStore, ConnectionRecord, ConnectionRecordStore};
use uuid::Uuid;

type CommandResult = Result<Vec<String>, Box<dyn std::error::Error>>;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage connection records
    #[command(subcommand)]
    Connection(ConnectionCommand),

    /// Store, inspect and discard messages
    #[command(subcommand)]
    Message(MessageCommand),

    /// Set or show a connection's push properties
    #[command(subcommand)]
    Props(PropsCommand),
}

#[derive(Subcommand, Debug)]
pub enum ConnectionCommand {
    /// Register a connection
    Add {
        id: String,

        /// Client identifier of the connection
        #[arg(long)]
        client_id: Option<String>,
    },

    /// List stored connection ids
    List,

    /// Remove a connection and every message stored for it
    Remove { id: String },
}

#[derive(Subcommand, Debug)]
pub enum MessageCommand {
    /// Store a message for a connection, merging into an existing message with the same id
    Push {
        /// Connection the message is queued for
        #[arg(short = 'C', long)]
        connection: String,

        /// Message id (a random UUID if omitted)
        #[arg(long)]
        id: Option<String>,

        /// Topic name
        #[arg(short = 't', long)]
        topic: Option<String>,

        /// Message payload
        #[arg(short = 'm', long)]
        payload: Option<String>,

        /// QoS level (0, 1, or 2)
        #[arg(short = 'q', long)]
        qos: Option<u8>,

        /// Retain flag
        #[arg(short = 'r', long)]
        retain: Option<bool>,

        /// Whether the message was published by this side
        #[arg(long)]
        out: Option<bool>,

        #[command(flatten)]
        properties: PropertyArgs,
    },

    /// Show a stored message
    Get { id: String },

    /// List messages stored for a connection
    List { connection: String },

    /// Delete a stored message
    Delete { id: String },

    /// Delete every message stored for a connection
    Clean { connection: String },
}

#[derive(Subcommand, Debug)]
pub enum PropsCommand {
    /// Replace a connection's push properties; without property flags the
    /// stored ones are left as they are
    Set {
        connection: String,

        #[command(flatten)]
        properties: PropertyArgs,
    },

    /// Show a connection's push properties
    Get { connection: String },
}

/// MQTT 5 publish properties given on the command line.
#[derive(clap::Args, Debug, Default)]
pub struct PropertyArgs {
    /// Payload format indicator (0 = bytes, 1 = UTF-8)
    #[arg(long)]
    pub payload_format_indicator: Option<u8>,

    /// Message expiry interval in seconds
    #[arg(long)]
    pub message_expiry_interval: Option<u32>,

    /// Topic alias
    #[arg(long)]
    pub topic_alias: Option<u16>,

    /// Response topic
    #[arg(long)]
    pub response_topic: Option<String>,

    /// Correlation data
    #[arg(long)]
    pub correlation_data: Option<String>,

    /// Subscription identifier
    #[arg(long)]
    pub subscription_identifier: Option<u32>,

    /// Content type
    #[arg(long)]
    pub content_type: Option<String>,

    /// User property as KEY=VALUE, may be repeated
    #[arg(long = "user-property", value_parser = parse_user_property)]
    pub user_properties: Vec<UserProperty>,
}

impl PropertyArgs {
    /// `None` when no property was given.
    fn into_properties(self) -> Option<MessageProperties> {
        let properties = MessageProperties {
            payload_format_indicator: self.payload_format_indicator,
            message_expiry_interval: self.message_expiry_interval,
            topic_alias: self.topic_alias,
            response_topic: self.response_topic,
            correlation_data: self.correlation_data.map(Bytes::from),
            subscription_identifier: self.subscription_identifier,
            content_type: self.content_type,
            user_properties: (!self.user_properties.is_empty()).then_some(self.user_properties),
        };

        (!properties.is_empty()).then_some(properties)
    }
}

fn parse_user_property(arg: &str) -> Result<UserProperty, String> {
    match arg.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok(UserProperty::new(key, value)),
        _ => Err(format!("expected KEY=VALUE, got `{}`", arg)),
    }
}

fn parse_qos(qos: u8) -> Result<QoS, String> {
    match QoS::from(qos) {
        QoS::Invalid => Err(format!("Invalid QoS level: {}. Must be 0, 1, or 2.", qos)),
        valid => Ok(valid),
    }
}

pub async fn run<S, C>(
    command: Command,
    storage: Arc<S>,
    clock: Arc<C>,
    options: ServiceOptions,
) -> CommandResult
where
    S: BrokerStore + 'static,
    C: Clock + Send + Sync,
{
    let messages = MessageService::with_options(Arc::clone(&storage), options);

    match command {
        Command::Connection(cmd) => run_connection(cmd, storage, &messages, clock.as_ref()).await,
        Command::Message(cmd) => run_message(cmd, &messages, clock.as_ref()).await,
        Command::Props(cmd) => run_props(cmd, PushPropertyCache::new(storage, clock)).await,
    }
}

async fn run_connection<S, C>(
    command: ConnectionCommand,
    storage: Arc<S>,
    messages: &MessageService<S>,
    clock: &C,
) -> CommandResult
where
    S: BrokerStore + 'static,
    C: Clock + Send + Sync,
{
    match command {
        ConnectionCommand::Add { id, client_id } => {
            if storage.find_connection(&id).await?.is_some() {
                return Err(format!("connection `{}` already exists", id).into());
            }
            let mut record = ConnectionRecord::new(id.clone(), clock.utc());
            record.client_id = client_id;
            storage.save_connection(&record).await?;
            Ok(vec![format!("added connection {}", id)])
        }
        ConnectionCommand::List => Ok(storage.list_connections().await?),
        ConnectionCommand::Remove { id } => {
            let removed = messages.clean_in_connection(&id).await?;
            storage.delete_connection(&id).await?;
            Ok(vec![format!(
                "removed connection {} ({} messages)",
                id,
                removed.len()
            )])
        }
    }
}

async fn run_message<S, C>(
    command: MessageCommand,
    messages: &MessageService<S>,
    clock: &C,
) -> CommandResult
where
    S: BrokerStore + 'static,
    C: Clock + Send + Sync,
{
    match command {
        MessageCommand::Push {
            connection,
            id,
            topic,
            payload,
            qos,
            retain,
            out,
            properties,
        } => {
            let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
            // Stored messages keep their original timestamp
            let create_at = match messages.get(&id).await? {
                Some(_) => None,
                None => Some(clock.utc()),
            };
            let message = Message {
                id,
                topic,
                payload: payload.map(Bytes::from),
                qos: qos.map(parse_qos).transpose()?,
                retain,
                out,
                create_at,
                properties: properties.into_properties(),
            };
            let persisted = messages.push_to_connection(message, &connection).await?;
            Ok(describe_message(&persisted))
        }
        MessageCommand::Get { id } => match messages.get(&id).await? {
            Some(message) => Ok(describe_message(&message)),
            None => Err(format!("no message `{}`", id).into()),
        },
        MessageCommand::List { connection } => Ok(messages
            .list_in_connection(&connection)
            .await?
            .iter()
            .flat_map(describe_message)
            .collect()),
        MessageCommand::Delete { id } => match messages.delete(&id).await? {
            Some(removed) => Ok(vec![format!("deleted {}", removed.id)]),
            None => Ok(vec![format!("no message `{}`", id)]),
        },
        MessageCommand::Clean { connection } => {
            let removed = messages.clean_in_connection(&connection).await?;
            Ok(removed.into_iter().map(|id| format!("deleted {}", id)).collect())
        }
    }
}

async fn run_props<S, C>(command: PropsCommand, cache: PushPropertyCache<S, C>) -> CommandResult
where
    S: BrokerStore + 'static,
    C: Clock + Send + Sync,
{
    match command {
        PropsCommand::Set {
            connection,
            properties,
        } => {
            let properties = properties.into_properties();
            cache.add_push_prop(properties.as_ref(), &connection).await?;
            match cache.get_push_prop(&connection).await? {
                Some(stored) => Ok(describe_properties(&stored)),
                None => Err(format!("no connection `{}`", connection).into()),
            }
        }
        PropsCommand::Get { connection } => match cache.get_push_prop(&connection).await? {
            Some(stored) => Ok(describe_properties(&stored)),
            None => Err(format!("no connection `{}`", connection).into()),
        },
    }
}

fn describe_message(message: &Message) -> Vec<String> {
    let mut lines = vec![format!(
        "{} topic={} qos={} retain={} out={} payload={}",
        message.id,
        message.topic.as_deref().unwrap_or("-"),
        message
            .qos
            .map(|q| u8::from(q).to_string())
            .unwrap_or_else(|| "-".to_string()),
        optional(message.retain),
        optional(message.out),
        message
            .payload
            .as_ref()
            .map(|p| format!("{:?}", String::from_utf8_lossy(p)))
            .unwrap_or_else(|| "-".to_string()),
    )];
    if let Some(properties) = &message.properties {
        lines.extend(describe_properties(properties).into_iter().map(|l| format!("  {}", l)));
    }
    lines
}

fn describe_properties(properties: &MessageProperties) -> Vec<String> {
    let mut lines = Vec::new();
    let mut field = |name: &str, value: Option<String>| {
        if let Some(value) = value {
            lines.push(format!("{}: {}", name, value));
        }
    };

    field(
        "payload_format_indicator",
        properties.payload_format_indicator.map(|v| v.to_string()),
    );
    field(
        "message_expiry_interval",
        properties.message_expiry_interval.map(|v| v.to_string()),
    );
    field("topic_alias", properties.topic_alias.map(|v| v.to_string()));
    field("response_topic", properties.response_topic.clone());
    field(
        "correlation_data",
        properties
            .correlation_data
            .as_ref()
            .map(|v| format!("{:?}", String::from_utf8_lossy(v))),
    );
    field(
        "subscription_identifier",
        properties.subscription_identifier.map(|v| v.to_string()),
    );
    field("content_type", properties.content_type.clone());
    for p in properties.user_properties.iter().flatten() {
        field("user_property", Some(format!("{}={}", p.key, p.value)));
    }

    if lines.is_empty() {
        lines.push("(no properties)".to_string());
    }
    lines
}

fn optional(value: Option<bool>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use mockable::DefaultClock;
    use mqstash_storage::{memory::MemoryStore, MessageField, MessageRecordStore};

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(subcommand)]
        command: Command,
    }

    async fn exec(store: &Arc<MemoryStore>, args: &[&str]) -> CommandResult {
        let cli = TestCli::try_parse_from(std::iter::once("mqstash").chain(args.iter().copied()))?;
        run(
            cli.command,
            Arc::clone(store),
            Arc::new(DefaultClock),
            ServiceOptions::default(),
        )
        .await
    }

    #[test]
    fn test_parse_user_property() {
        let prop = parse_user_property("unit=celsius=1").unwrap();
        assert_eq!(prop, UserProperty::new("unit", "celsius=1"));
        assert!(parse_user_property("novalue").is_err());
        assert!(parse_user_property("=value").is_err());
    }

    #[test]
    fn test_parse_qos() {
        assert_eq!(parse_qos(2).unwrap(), QoS::ExactlyOnce);
        assert!(parse_qos(3).is_err());
    }

    #[test]
    fn test_no_property_args_means_no_properties() {
        assert!(PropertyArgs::default().into_properties().is_none());
    }

    #[tokio::test]
    async fn test_push_list_and_clean() {
        let store = Arc::new(MemoryStore::new());
        exec(&store, &["connection", "add", "c1"]).await.unwrap();

        let out = exec(
            &store,
            &[
                "message", "push", "-C", "c1", "--id", "m1", "-t", "a/b", "-m", "hi", "-q", "1",
                "--user-property", "k=1", "--user-property", "k=2",
            ],
        )
        .await
        .unwrap();
        assert_eq!(out[0], "m1 topic=a/b qos=1 retain=- out=- payload=\"hi\"");
        assert_eq!(out[1], "  user_property: k=1");
        assert_eq!(out[2], "  user_property: k=2");

        // Pushing again without a topic keeps the stored one
        let out = exec(&store, &["message", "push", "-C", "c1", "--id", "m1", "-r", "true"])
            .await
            .unwrap();
        assert_eq!(out[0], "m1 topic=a/b qos=1 retain=true out=- payload=\"hi\"");

        let listed = exec(&store, &["message", "list", "c1"]).await.unwrap();
        assert_eq!(listed.len(), 3);

        let cleaned = exec(&store, &["message", "clean", "c1"]).await.unwrap();
        assert_eq!(cleaned, vec!["deleted m1".to_string()]);
        assert_eq!(store.message_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_push_without_id_generates_one() {
        let store = Arc::new(MemoryStore::new());
        exec(&store, &["message", "push", "-C", "c1", "-t", "x"])
            .await
            .unwrap();

        let stored = store
            .query_messages(MessageField::ConnectionId, "c1")
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert!(Uuid::parse_str(&stored[0].id).is_ok());
        assert!(stored[0].create_at.is_some());
    }

    #[tokio::test]
    async fn test_props_set_and_get() {
        let store = Arc::new(MemoryStore::new());
        exec(&store, &["connection", "add", "c1", "--client-id", "sensor"])
            .await
            .unwrap();

        exec(&store, &["props", "set", "c1", "--topic-alias", "5"])
            .await
            .unwrap();
        let out = exec(&store, &["props", "set", "c1", "--content-type", "x"])
            .await
            .unwrap();
        assert_eq!(out, vec!["content_type: x".to_string()]);

        let out = exec(&store, &["props", "get", "c1"]).await.unwrap();
        assert_eq!(out, vec!["content_type: x".to_string()]);

        assert!(exec(&store, &["props", "get", "missing"]).await.is_err());
    }

    #[tokio::test]
    async fn test_props_set_without_flags_keeps_stored_props() {
        let store = Arc::new(MemoryStore::new());
        exec(&store, &["connection", "add", "c1"]).await.unwrap();
        exec(&store, &["props", "set", "c1", "--topic-alias", "5"])
            .await
            .unwrap();

        let out = exec(&store, &["props", "set", "c1"]).await.unwrap();
        assert_eq!(out, vec!["topic_alias: 5".to_string()]);

        let out = exec(&store, &["props", "get", "c1"]).await.unwrap();
        assert_eq!(out, vec!["topic_alias: 5".to_string()]);
    }

    #[tokio::test]
    async fn test_push_with_new_id_stamps_create_at_once() {
        let store = Arc::new(MemoryStore::new());
        exec(&store, &["message", "push", "-C", "c1", "--id", "m1", "-t", "a"])
            .await
            .unwrap();

        let created = store.find_message("m1").await.unwrap().unwrap().create_at;
        assert!(created.is_some());

        exec(&store, &["message", "push", "-C", "c1", "--id", "m1", "-t", "b"])
            .await
            .unwrap();

        let stored = store.find_message("m1").await.unwrap().unwrap();
        assert_eq!(stored.topic.as_deref(), Some("b"));
        assert_eq!(stored.create_at, created);
    }

    #[tokio::test]
    async fn test_remove_connection_discards_its_messages() {
        let store = Arc::new(MemoryStore::new());
        exec(&store, &["connection", "add", "c1"]).await.unwrap();
        exec(&store, &["connection", "add", "c2"]).await.unwrap();
        assert!(exec(&store, &["connection", "add", "c1"]).await.is_err());

        for (id, conn) in [("m1", "c1"), ("m2", "c1"), ("m3", "c2")] {
            exec(&store, &["message", "push", "-C", conn, "--id", id])
                .await
                .unwrap();
        }

        let out = exec(&store, &["connection", "remove", "c1"]).await.unwrap();
        assert_eq!(out, vec!["removed connection c1 (2 messages)".to_string()]);
        assert_eq!(
            exec(&store, &["connection", "list"]).await.unwrap(),
            vec!["c2".to_string()]
        );
        assert_eq!(store.message_count().unwrap(), 1);
    }
}
