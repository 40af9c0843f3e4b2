use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use kujo_core::directory::{DirectoryError, GuildDirectory};
use kujo_core::domain::guild::{
    ChannelInfo, MemberInfo, MessageInfo, NewTextChannel, OverwriteTarget, Permission,
    PermissionOverwrite, RoleInfo,
};
use kujo_core::domain::ids::{ChannelId, GuildId, MessageId, RoleId, UserId};
use kujo_core::tickets::ReactionEvent;
use secrecy::{ExposeSecret, SecretString};
use serenity::all as discord;
use serenity::all::{
    ChannelType, Client, Command, CommandInteraction, Context, CreateChannel, CreateCommand,
    CreateInteractionResponse, CreateInteractionResponseMessage, GatewayIntents, Http,
    Interaction, Permissions, PermissionOverwriteType, Reaction, ReactionType, Ready,
    ShardManager,
};
use tokio::sync::{mpsc, Mutex, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::events::{
    CommandReply, DiscordEnvelope, DiscordEvent, SlashCommandPayload, COMPLAINT_COMMAND,
    COMPLAINT_DESCRIPTION,
};
use crate::gateway::{GatewayTransport, TransportError};

pub fn gateway_intents() -> GatewayIntents {
    GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::GUILD_MESSAGE_REACTIONS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::MESSAGE_CONTENT
}

pub fn complaint_command() -> CreateCommand {
    CreateCommand::new(COMPLAINT_COMMAND).description(COMPLAINT_DESCRIPTION)
}

/// REST-backed guild directory. Every call goes to the API; no cache is kept
/// apart from the bot's own user id.
pub struct SerenityDirectory {
    http: Arc<Http>,
    bot_user_id: OnceCell<UserId>,
}

impl SerenityDirectory {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http, bot_user_id: OnceCell::new() }
    }
}

#[async_trait]
impl GuildDirectory for SerenityDirectory {
    async fn bot_user_id(&self) -> Result<UserId, DirectoryError> {
        self.bot_user_id
            .get_or_try_init(|| async {
                let current = self
                    .http
                    .get_current_user()
                    .await
                    .map_err(|error| directory_error("current user", error))?;
                Ok::<_, DirectoryError>(UserId(current.id.get()))
            })
            .await
            .copied()
    }

    async fn guild_name(&self, guild_id: GuildId) -> Result<String, DirectoryError> {
        let guild = discord::GuildId::new(guild_id.0)
            .to_partial_guild(&*self.http)
            .await
            .map_err(|error| directory_error(&format!("guild {guild_id}"), error))?;
        Ok(guild.name)
    }

    async fn channel(&self, channel_id: ChannelId) -> Result<ChannelInfo, DirectoryError> {
        let channel = discord::ChannelId::new(channel_id.0)
            .to_channel(&*self.http)
            .await
            .map_err(|error| directory_error(&format!("channel {channel_id}"), error))?;
        match channel {
            discord::Channel::Guild(channel) => Ok(channel_info(&channel)),
            _ => Err(DirectoryError::NotFound(format!(
                "channel {channel_id} is not a guild channel"
            ))),
        }
    }

    async fn text_channels(&self, guild_id: GuildId) -> Result<Vec<ChannelInfo>, DirectoryError> {
        let channels = discord::GuildId::new(guild_id.0)
            .channels(&*self.http)
            .await
            .map_err(|error| directory_error(&format!("channels of guild {guild_id}"), error))?;
        Ok(channels
            .values()
            .filter(|channel| channel.kind == ChannelType::Text)
            .map(channel_info)
            .collect())
    }

    async fn roles(&self, guild_id: GuildId) -> Result<Vec<RoleInfo>, DirectoryError> {
        let roles = discord::GuildId::new(guild_id.0)
            .roles(&*self.http)
            .await
            .map_err(|error| directory_error(&format!("roles of guild {guild_id}"), error))?;
        Ok(roles
            .values()
            .map(|role| RoleInfo { id: RoleId(role.id.get()), name: role.name.clone() })
            .collect())
    }

    async fn member(
        &self,
        guild_id: GuildId,
        user_id: UserId,
    ) -> Result<MemberInfo, DirectoryError> {
        let member = discord::GuildId::new(guild_id.0)
            .member(&*self.http, discord::UserId::new(user_id.0))
            .await
            .map_err(|error| directory_error(&format!("member {user_id}"), error))?;
        Ok(MemberInfo {
            user_id,
            name: member.user.name.clone(),
            is_bot: member.user.bot,
            role_ids: member.roles.iter().map(|role_id| RoleId(role_id.get())).collect(),
        })
    }

    async fn fetch_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<MessageInfo, DirectoryError> {
        let message = discord::ChannelId::new(channel_id.0)
            .message(&*self.http, discord::MessageId::new(message_id.0))
            .await
            .map_err(|error| directory_error(&format!("message {message_id}"), error))?;
        Ok(message_info(&message))
    }

    async fn create_text_channel(
        &self,
        guild_id: GuildId,
        channel: NewTextChannel,
    ) -> Result<ChannelInfo, DirectoryError> {
        let mut builder = CreateChannel::new(channel.name.as_str())
            .kind(ChannelType::Text)
            .topic(channel.topic.as_str())
            .permissions(channel.overwrites.iter().map(serenity_overwrite));
        if let Some(category_id) = channel.category_id {
            builder = builder.category(discord::ChannelId::new(category_id.0));
        }

        let created = discord::GuildId::new(guild_id.0)
            .create_channel(&*self.http, builder)
            .await
            .map_err(|error| {
                directory_error(&format!("create channel `{}`", channel.name), error)
            })?;
        Ok(channel_info(&created))
    }

    async fn send_message(
        &self,
        channel_id: ChannelId,
        content: &str,
    ) -> Result<MessageInfo, DirectoryError> {
        let message = discord::ChannelId::new(channel_id.0)
            .say(&*self.http, content)
            .await
            .map_err(|error| directory_error(&format!("send to channel {channel_id}"), error))?;
        Ok(message_info(&message))
    }

    async fn delete_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<(), DirectoryError> {
        discord::ChannelId::new(channel_id.0)
            .delete_message(&*self.http, discord::MessageId::new(message_id.0))
            .await
            .map_err(|error| directory_error(&format!("delete message {message_id}"), error))
    }

    async fn add_reaction(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        emoji: &str,
    ) -> Result<(), DirectoryError> {
        self.http
            .create_reaction(
                discord::ChannelId::new(channel_id.0),
                discord::MessageId::new(message_id.0),
                &ReactionType::Unicode(emoji.to_owned()),
            )
            .await
            .map_err(|error| directory_error(&format!("react on message {message_id}"), error))
    }

    async fn remove_reaction(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        emoji: &str,
        user_id: UserId,
    ) -> Result<(), DirectoryError> {
        discord::ChannelId::new(channel_id.0)
            .delete_reaction(
                &*self.http,
                discord::MessageId::new(message_id.0),
                Some(discord::UserId::new(user_id.0)),
                ReactionType::Unicode(emoji.to_owned()),
            )
            .await
            .map_err(|error| {
                directory_error(&format!("remove reaction on message {message_id}"), error)
            })
    }

    async fn delete_channel(&self, channel_id: ChannelId) -> Result<(), DirectoryError> {
        discord::ChannelId::new(channel_id.0)
            .delete(&*self.http)
            .await
            .map(|_| ())
            .map_err(|error| directory_error(&format!("delete channel {channel_id}"), error))
    }

    async fn send_direct_message(
        &self,
        user_id: UserId,
        content: &str,
    ) -> Result<(), DirectoryError> {
        let dm = discord::UserId::new(user_id.0)
            .create_dm_channel(&*self.http)
            .await
            .map_err(|error| directory_error(&format!("open dm with {user_id}"), error))?;
        dm.id
            .say(&*self.http, content)
            .await
            .map(|_| ())
            .map_err(|error| directory_error(&format!("dm {user_id}"), error))
    }
}

fn channel_info(channel: &discord::GuildChannel) -> ChannelInfo {
    ChannelInfo {
        id: ChannelId(channel.id.get()),
        guild_id: GuildId(channel.guild_id.get()),
        name: channel.name.clone(),
        topic: channel.topic.clone(),
        category_id: channel.parent_id.map(|parent| ChannelId(parent.get())),
    }
}

fn message_info(message: &discord::Message) -> MessageInfo {
    MessageInfo {
        id: MessageId(message.id.get()),
        channel_id: ChannelId(message.channel_id.get()),
        author_id: UserId(message.author.id.get()),
        content: message.content.clone(),
    }
}

fn permission_bits(permissions: &[Permission]) -> Permissions {
    permissions.iter().fold(Permissions::empty(), |bits, permission| {
        bits | match permission {
            Permission::ViewChannel => Permissions::VIEW_CHANNEL,
            Permission::SendMessages => Permissions::SEND_MESSAGES,
            Permission::EmbedLinks => Permissions::EMBED_LINKS,
            Permission::ManageChannels => Permissions::MANAGE_CHANNELS,
        }
    })
}

fn serenity_overwrite(overwrite: &PermissionOverwrite) -> discord::PermissionOverwrite {
    let kind = match overwrite.target {
        OverwriteTarget::Role(role_id) => {
            PermissionOverwriteType::Role(discord::RoleId::new(role_id.0))
        }
        OverwriteTarget::Member(user_id) => {
            PermissionOverwriteType::Member(discord::UserId::new(user_id.0))
        }
    };
    discord::PermissionOverwrite {
        allow: permission_bits(&overwrite.allow),
        deny: permission_bits(&overwrite.deny),
        kind,
    }
}

/// 404 and 403 keep their meaning; everything else is a transport failure.
fn directory_error(action: &str, error: serenity::Error) -> DirectoryError {
    if let serenity::Error::Http(http_error) = &error {
        match http_error.status_code().map(|status| status.as_u16()) {
            Some(404) => return DirectoryError::NotFound(format!("{action}: {error}")),
            Some(403) => return DirectoryError::Forbidden(format!("{action}: {error}")),
            _ => {}
        }
    }
    DirectoryError::Transport(format!("{action}: {error}"))
}

fn emoji_name(emoji: &ReactionType) -> String {
    match emoji {
        ReactionType::Unicode(value) => value.clone(),
        ReactionType::Custom { name, .. } => name.clone().unwrap_or_default(),
        _ => String::new(),
    }
}

type PendingInteractions = Arc<Mutex<HashMap<String, CommandInteraction>>>;

enum Inbound {
    Event(DiscordEnvelope),
    /// The client stopped; `Some` carries the reason it failed.
    Closed(Option<String>),
}

/// Serenity event handler that only translates and forwards.
struct SerenityBridge {
    sender: mpsc::UnboundedSender<Inbound>,
    pending: PendingInteractions,
    sequence: AtomicU64,
}

impl SerenityBridge {
    fn forward(&self, envelope: DiscordEnvelope) {
        if self.sender.send(Inbound::Event(envelope)).is_err() {
            debug!("gateway runner is gone; dropping discord event");
        }
    }
}

#[async_trait]
impl discord::EventHandler for SerenityBridge {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!(
            event_name = "gateway.ready",
            bot_user = %ready.user.name,
            guild_count = ready.guilds.len(),
            "discord gateway session ready"
        );

        match Command::set_global_commands(&*ctx.http, vec![complaint_command()]).await {
            Ok(commands) => info!(
                event_name = "gateway.commands_synced",
                command_count = commands.len(),
                "slash commands registered"
            ),
            Err(error) => warn!(
                event_name = "gateway.commands_synced",
                error = %error,
                "slash command registration failed"
            ),
        }
    }

    async fn reaction_add(&self, _ctx: Context, reaction: Reaction) {
        let (Some(guild_id), Some(user_id)) = (reaction.guild_id, reaction.user_id) else {
            return;
        };

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.forward(DiscordEnvelope {
            envelope_id: format!("reaction-{}-{sequence}", reaction.message_id),
            event: DiscordEvent::ReactionAdded(ReactionEvent {
                user_id: UserId(user_id.get()),
                guild_id: GuildId(guild_id.get()),
                channel_id: ChannelId(reaction.channel_id.get()),
                message_id: MessageId(reaction.message_id.get()),
                emoji: emoji_name(&reaction.emoji),
            }),
        });
    }

    async fn interaction_create(&self, _ctx: Context, interaction: Interaction) {
        let Interaction::Command(command) = interaction else {
            return;
        };

        let envelope_id = format!("interaction-{}", command.id);
        let payload = SlashCommandPayload {
            name: command.data.name.clone(),
            guild_id: command.guild_id.map(|id| GuildId(id.get())),
            channel_id: ChannelId(command.channel_id.get()),
            user_id: UserId(command.user.id.get()),
        };
        self.pending.lock().await.insert(envelope_id.clone(), command);
        self.forward(DiscordEnvelope { envelope_id, event: DiscordEvent::SlashCommand(payload) });
    }
}

struct GatewaySession {
    shard_manager: Arc<ShardManager>,
    task: JoinHandle<()>,
}

/// Live gateway connection. Serenity owns the websocket and its own resume
/// logic; this type only surfaces its events and replies to interactions.
pub struct SerenityTransport {
    token: SecretString,
    http: Arc<Http>,
    pending: PendingInteractions,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<Inbound>>>,
    session: Mutex<Option<GatewaySession>>,
}

impl SerenityTransport {
    pub fn new(token: SecretString, http: Arc<Http>) -> Self {
        Self {
            token,
            http,
            pending: Arc::default(),
            inbound: Mutex::new(None),
            session: Mutex::new(None),
        }
    }

    async fn shutdown_session(&self) {
        if let Some(session) = self.session.lock().await.take() {
            session.shard_manager.shutdown_all().await;
            session.task.abort();
        }
    }
}

#[async_trait]
impl GatewayTransport for SerenityTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.shutdown_session().await;

        let (sender, receiver) = mpsc::unbounded_channel();
        let bridge = SerenityBridge {
            sender: sender.clone(),
            pending: Arc::clone(&self.pending),
            sequence: AtomicU64::new(0),
        };
        let mut client = Client::builder(self.token.expose_secret(), gateway_intents())
            .event_handler(bridge)
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;

        let shard_manager = Arc::clone(&client.shard_manager);
        let task = tokio::spawn(async move {
            let failure = client.start().await.err().map(|error| error.to_string());
            let _ = sender.send(Inbound::Closed(failure));
        });

        *self.inbound.lock().await = Some(receiver);
        *self.session.lock().await = Some(GatewaySession { shard_manager, task });
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<DiscordEnvelope>, TransportError> {
        let mut inbound = self.inbound.lock().await;
        let Some(receiver) = inbound.as_mut() else {
            return Err(TransportError::Receive("gateway is not connected".to_owned()));
        };

        match receiver.recv().await {
            Some(Inbound::Event(envelope)) => Ok(Some(envelope)),
            Some(Inbound::Closed(Some(failure))) => Err(TransportError::Receive(failure)),
            Some(Inbound::Closed(None)) | None => Ok(None),
        }
    }

    async fn respond(&self, envelope_id: &str, reply: &CommandReply) -> Result<(), TransportError> {
        let Some(interaction) = self.pending.lock().await.remove(envelope_id) else {
            return Err(TransportError::Respond(format!(
                "no pending interaction for `{envelope_id}`"
            )));
        };

        let message = CreateInteractionResponseMessage::new()
            .content(reply.content.as_str())
            .ephemeral(reply.ephemeral);
        interaction
            .create_response(&*self.http, CreateInteractionResponse::Message(message))
            .await
            .map_err(|error| TransportError::Respond(error.to_string()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.shutdown_session().await;
        self.inbound.lock().await.take();
        self.pending.lock().await.clear();
        Ok(())
    }
}
