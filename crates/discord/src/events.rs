use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use kujo_core::domain::ids::{ChannelId, GuildId, UserId};
use kujo_core::tickets::messages;
use kujo_core::tickets::{
    PromptRequest, ReactionEvent, ReactionOutcome, TicketLifecycleController,
};
use thiserror::Error;

pub const COMPLAINT_COMMAND: &str = "complaint";
pub const COMPLAINT_DESCRIPTION: &str = "苦情受付用のリアクションメッセージを送信します。";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscordEnvelope {
    pub envelope_id: String,
    pub event: DiscordEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiscordEvent {
    ReactionAdded(ReactionEvent),
    SlashCommand(SlashCommandPayload),
    Unsupported { event_type: String },
}

impl DiscordEvent {
    pub fn event_type(&self) -> DiscordEventType {
        match self {
            Self::ReactionAdded(_) => DiscordEventType::ReactionAdded,
            Self::SlashCommand(_) => DiscordEventType::SlashCommand,
            Self::Unsupported { .. } => DiscordEventType::Unsupported,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DiscordEventType {
    ReactionAdded,
    SlashCommand,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlashCommandPayload {
    pub name: String,
    /// `None` when invoked from a DM.
    pub guild_id: Option<GuildId>,
    pub channel_id: ChannelId,
    pub user_id: UserId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

/// Interaction reply; only slash commands produce one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandReply {
    pub content: String,
    pub ephemeral: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(CommandReply),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error("unknown slash command `/{0}`")]
    UnknownCommand(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> DiscordEventType;
    async fn handle(
        &self,
        envelope: &DiscordEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<DiscordEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &DiscordEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

pub fn ticket_dispatcher(controller: Arc<TicketLifecycleController>) -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(ReactionAddedHandler::new(Arc::clone(&controller)));
    dispatcher.register(ComplaintCommandHandler::new(controller));
    dispatcher
}

pub struct ReactionAddedHandler {
    controller: Arc<TicketLifecycleController>,
}

impl ReactionAddedHandler {
    pub fn new(controller: Arc<TicketLifecycleController>) -> Self {
        Self { controller }
    }
}

#[async_trait]
impl EventHandler for ReactionAddedHandler {
    fn event_type(&self) -> DiscordEventType {
        DiscordEventType::ReactionAdded
    }

    async fn handle(
        &self,
        envelope: &DiscordEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let DiscordEvent::ReactionAdded(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        Ok(match self.controller.handle_reaction(event, &ctx.correlation_id).await {
            ReactionOutcome::Ignored(_) => HandlerResult::Ignored,
            _ => HandlerResult::Processed,
        })
    }
}

pub struct ComplaintCommandHandler {
    controller: Arc<TicketLifecycleController>,
}

impl ComplaintCommandHandler {
    pub fn new(controller: Arc<TicketLifecycleController>) -> Self {
        Self { controller }
    }
}

#[async_trait]
impl EventHandler for ComplaintCommandHandler {
    fn event_type(&self) -> DiscordEventType {
        DiscordEventType::SlashCommand
    }

    async fn handle(
        &self,
        envelope: &DiscordEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let DiscordEvent::SlashCommand(payload) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        if payload.name != COMPLAINT_COMMAND {
            return Err(EventHandlerError::UnknownCommand(payload.name.clone()));
        }

        let Some(guild_id) = payload.guild_id else {
            return Ok(HandlerResult::Responded(ephemeral(messages::command_guild_only())));
        };

        let request =
            PromptRequest { guild_id, channel_id: payload.channel_id, user_id: payload.user_id };
        let outcome = self.controller.post_ticket_prompt(&request, &ctx.correlation_id).await;
        Ok(HandlerResult::Responded(ephemeral(outcome.reply_text())))
    }
}

fn ephemeral(content: String) -> CommandReply {
    CommandReply { content, ephemeral: true }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kujo_core::config::TicketConfig;
    use kujo_core::directory::{GuildDirectory, InMemoryGuildDirectory};
    use kujo_core::domain::guild::{ChannelInfo, MemberInfo};
    use kujo_core::domain::ids::{ChannelId, GuildId, MessageId, RoleId, UserId};
    use kujo_core::tickets::{messages, ReactionEvent, TicketLifecycleController};

    use super::{
        ticket_dispatcher, DiscordEnvelope, DiscordEvent, DispatchError, EventContext,
        EventDispatcher, EventHandlerError, HandlerResult, SlashCommandPayload,
    };

    const GUILD: GuildId = GuildId(10);
    const LOBBY: ChannelId = ChannelId(20);

    async fn controller() -> (Arc<InMemoryGuildDirectory>, Arc<TicketLifecycleController>) {
        let directory = Arc::new(InMemoryGuildDirectory::new(UserId(1)));
        directory.add_guild(GUILD, "Kujo").await;
        directory.add_role(GUILD, RoleId(5), "Admin").await;
        directory
            .add_member(
                GUILD,
                MemberInfo {
                    user_id: UserId(2),
                    name: "carol".to_owned(),
                    is_bot: false,
                    role_ids: vec![RoleId(5)],
                },
            )
            .await;
        directory
            .add_channel(ChannelInfo {
                id: LOBBY,
                guild_id: GUILD,
                name: "support".to_owned(),
                topic: None,
                category_id: None,
            })
            .await;
        let controller = Arc::new(TicketLifecycleController::new(
            Arc::clone(&directory) as Arc<dyn GuildDirectory>,
            TicketConfig::default(),
        ));
        (directory, controller)
    }

    fn command(name: &str, guild_id: Option<GuildId>) -> DiscordEnvelope {
        DiscordEnvelope {
            envelope_id: "interaction-1".to_owned(),
            event: DiscordEvent::SlashCommand(SlashCommandPayload {
                name: name.to_owned(),
                guild_id,
                channel_id: LOBBY,
                user_id: UserId(2),
            }),
        }
    }

    #[tokio::test]
    async fn complaint_command_replies_ephemerally_and_posts_prompt() {
        let (directory, controller) = controller().await;
        let dispatcher = ticket_dispatcher(controller);

        let result = dispatcher
            .dispatch(&command("complaint", Some(GUILD)), &EventContext::default())
            .await
            .expect("dispatch");

        let HandlerResult::Responded(reply) = result else {
            panic!("expected a reply, got {result:?}");
        };
        assert!(reply.ephemeral);
        assert_eq!(reply.content, messages::prompt_posted());
        assert_eq!(directory.messages_in(LOBBY).await.len(), 1);
    }

    #[tokio::test]
    async fn complaint_command_outside_guild_is_refused() {
        let (directory, controller) = controller().await;
        let dispatcher = ticket_dispatcher(controller);

        let result = dispatcher
            .dispatch(&command("complaint", None), &EventContext::default())
            .await
            .expect("dispatch");

        assert_eq!(
            result,
            HandlerResult::Responded(super::CommandReply {
                content: messages::command_guild_only(),
                ephemeral: true,
            })
        );
        assert!(directory.messages_in(LOBBY).await.is_empty());
    }

    #[tokio::test]
    async fn unknown_command_is_a_handler_error() {
        let (_, controller) = controller().await;
        let dispatcher = ticket_dispatcher(controller);

        let result =
            dispatcher.dispatch(&command("quote", Some(GUILD)), &EventContext::default()).await;

        assert_eq!(
            result,
            Err(DispatchError::Handler(EventHandlerError::UnknownCommand("quote".to_owned())))
        );
    }

    #[tokio::test]
    async fn irrelevant_reactions_resolve_to_ignored() {
        let (_, controller) = controller().await;
        let dispatcher = ticket_dispatcher(controller);
        let envelope = DiscordEnvelope {
            envelope_id: "reaction-1".to_owned(),
            event: DiscordEvent::ReactionAdded(ReactionEvent {
                user_id: UserId(2),
                guild_id: GUILD,
                channel_id: LOBBY,
                message_id: MessageId(99),
                emoji: "👍".to_owned(),
            }),
        };

        let result =
            dispatcher.dispatch(&envelope, &EventContext::default()).await.expect("dispatch");

        assert_eq!(result, HandlerResult::Ignored);
    }

    #[tokio::test]
    async fn dispatcher_returns_ignored_when_no_handler_registered() {
        let dispatcher = EventDispatcher::new();
        let envelope = DiscordEnvelope {
            envelope_id: "env-2".to_owned(),
            event: DiscordEvent::Unsupported { event_type: "typing_start".to_owned() },
        };

        let result =
            dispatcher.dispatch(&envelope, &EventContext::default()).await.expect("dispatch");

        assert_eq!(result, HandlerResult::Ignored);
    }

    #[tokio::test]
    async fn ticket_dispatcher_registers_both_handlers() {
        let (_, controller) = controller().await;
        assert_eq!(ticket_dispatcher(controller).handler_count(), 2);
    }
}
