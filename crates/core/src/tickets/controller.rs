use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::TicketConfig;
use crate::directory::{find_role_by_name, GuildDirectory};
use crate::domain::guild::{ChannelInfo, MemberInfo, MessageInfo, NewTextChannel, RoleInfo};
use crate::domain::ids::{ChannelId, GuildId, MessageId, UserId};
use crate::errors::{ErrorClass, TicketError};
use crate::tickets::lifecycle::{self, TicketEvent, TicketState, TicketTransition};
use crate::tickets::locks::{ClaimSet, KeyedLocks};
use crate::tickets::messages;
use crate::tickets::naming::{sanitize_name, TicketNaming};
use crate::tickets::permissions::ticket_overwrites;
use crate::tickets::topic::{format_topic, parse_creator_id};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReactionEvent {
    pub user_id: UserId,
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub emoji: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    BotReaction,
    UnrelatedEmoji,
    ContextGone,
    NotAPrompt,
    NotATicketChannel,
    AlreadyClosing,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReactionOutcome {
    Ignored(IgnoreReason),
    TicketOpened { channel_id: ChannelId, channel_name: String },
    DuplicateTicket { existing: ChannelId },
    OpenAborted { class: ErrorClass },
    StrayReactionRemoved,
    CloseDenied,
    TicketClosed { channel_id: ChannelId },
    CloseFailed { class: ErrorClass },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PromptRequest {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub user_id: UserId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PromptOutcome {
    Posted { message_id: MessageId },
    MissingRole { role_name: String },
    Failed { class: ErrorClass },
}

impl PromptOutcome {
    pub fn reply_text(&self) -> String {
        match self {
            Self::Posted { .. } => messages::prompt_posted(),
            Self::MissingRole { role_name } => messages::command_requires_role(role_name),
            Self::Failed { .. } => messages::command_failed(),
        }
    }
}

enum Intent {
    Open,
    Close,
}

/// Maps reaction events onto ticket channel creation and deletion. All state
/// is re-read from the directory on every event; the only in-process state is
/// the per-user creation lock and the set of channels waiting out their close
/// delay.
pub struct TicketLifecycleController {
    directory: Arc<dyn GuildDirectory>,
    settings: TicketConfig,
    naming: TicketNaming,
    creation_locks: KeyedLocks<(GuildId, String)>,
    closing_channels: ClaimSet<ChannelId>,
}

impl TicketLifecycleController {
    pub fn new(directory: Arc<dyn GuildDirectory>, mut settings: TicketConfig) -> Self {
        settings.normalize();
        let naming = TicketNaming::new(settings.channel_prefix.clone());
        Self {
            directory,
            settings,
            naming,
            creation_locks: KeyedLocks::default(),
            closing_channels: ClaimSet::default(),
        }
    }

    pub fn settings(&self) -> &TicketConfig {
        &self.settings
    }

    pub async fn handle_reaction(
        &self,
        event: &ReactionEvent,
        correlation_id: &str,
    ) -> ReactionOutcome {
        match self.route_reaction(event, correlation_id).await {
            Ok(outcome) => outcome,
            Err(error) if error.is_not_found() => {
                debug!(
                    event_name = "ticket.reaction.context_gone",
                    correlation_id,
                    guild_id = %event.guild_id,
                    channel_id = %event.channel_id,
                    message_id = %event.message_id,
                    error = %error,
                    "reaction target vanished; ignoring"
                );
                ReactionOutcome::Ignored(IgnoreReason::ContextGone)
            }
            Err(error) => {
                warn!(
                    event_name = "ticket.reaction.failed",
                    correlation_id,
                    guild_id = %event.guild_id,
                    channel_id = %event.channel_id,
                    user_id = %event.user_id,
                    error_class = error.class().label(),
                    error = %error,
                    "reaction handling failed"
                );
                match self.intent(&event.emoji) {
                    Some(Intent::Close) => ReactionOutcome::CloseFailed { class: error.class() },
                    _ => ReactionOutcome::OpenAborted { class: error.class() },
                }
            }
        }
    }

    async fn route_reaction(
        &self,
        event: &ReactionEvent,
        correlation_id: &str,
    ) -> Result<ReactionOutcome, TicketError> {
        let bot_user_id = self.directory.bot_user_id().await?;
        if event.user_id == bot_user_id {
            return Ok(ReactionOutcome::Ignored(IgnoreReason::BotReaction));
        }

        let Some(intent) = self.intent(&event.emoji) else {
            return Ok(ReactionOutcome::Ignored(IgnoreReason::UnrelatedEmoji));
        };

        let channel = self.directory.channel(event.channel_id).await?;
        let member = self.directory.member(event.guild_id, event.user_id).await?;
        if member.is_bot {
            return Ok(ReactionOutcome::Ignored(IgnoreReason::BotReaction));
        }

        match intent {
            Intent::Open => {
                let message =
                    self.directory.fetch_message(event.channel_id, event.message_id).await?;
                self.open_ticket(event, &channel, &member, &message, bot_user_id, correlation_id)
                    .await
            }
            Intent::Close => {
                if !self.naming.is_ticket_channel(&channel.name) {
                    return Ok(ReactionOutcome::Ignored(IgnoreReason::NotATicketChannel));
                }
                let message =
                    self.directory.fetch_message(event.channel_id, event.message_id).await?;
                self.close_ticket(event, &channel, &member, &message, bot_user_id, correlation_id)
                    .await
            }
        }
    }

    fn intent(&self, emoji: &str) -> Option<Intent> {
        let emoji = emoji.trim();
        if emoji == self.settings.open_emoji {
            Some(Intent::Open)
        } else if emoji == self.settings.close_emoji {
            Some(Intent::Close)
        } else {
            None
        }
    }

    async fn open_ticket(
        &self,
        event: &ReactionEvent,
        origin: &ChannelInfo,
        member: &MemberInfo,
        message: &MessageInfo,
        bot_user_id: UserId,
        correlation_id: &str,
    ) -> Result<ReactionOutcome, TicketError> {
        if message.author_id != bot_user_id
            || !message.content.contains(messages::OPEN_PROMPT_MARKER)
        {
            return Ok(ReactionOutcome::Ignored(IgnoreReason::NotAPrompt));
        }

        let sanitized = sanitize_name(&member.name);
        let channel_name = self.naming.channel_name(&sanitized, member.user_id);

        // Held across the scan and the create so two quick reactions from one
        // user cannot both pass the duplicate check.
        let _creation_guard =
            self.creation_locks.lock((event.guild_id, sanitized.clone())).await;

        let channels = self.directory.text_channels(event.guild_id).await?;
        let existing = channels
            .iter()
            .find(|channel| self.naming.is_owned_by(&channel.name, &sanitized, member.user_id));
        if let Some(existing) = existing {
            info!(
                event_name = "ticket.open.duplicate",
                correlation_id,
                guild_id = %event.guild_id,
                user_id = %event.user_id,
                existing_channel_id = %existing.id,
                "user already owns a ticket channel"
            );
            self.warn_duplicate(event, correlation_id).await;
            self.remove_reaction_quietly(event).await;
            return Ok(ReactionOutcome::DuplicateTicket { existing: existing.id });
        }

        let roles = self.directory.roles(event.guild_id).await?;
        let Some(admin_role) = find_role_by_name(&roles, &self.settings.admin_role_name) else {
            let missing = TicketError::RoleMissing(self.settings.admin_role_name.clone());
            error!(
                event_name = "ticket.open.admin_role_missing",
                correlation_id,
                guild_id = %event.guild_id,
                error_class = missing.class().label(),
                error = %missing,
                "admin role not found; ticket not created"
            );
            return Ok(ReactionOutcome::OpenAborted { class: missing.class() });
        };

        let transition = lifecycle::apply(TicketState::None, TicketEvent::OpenApproved)?;

        match self.create_ticket_channel(event, origin, admin_role, &channel_name).await {
            Ok(created) => {
                log_transition(&transition, correlation_id, created.id);
                info!(
                    event_name = "ticket.open.created",
                    correlation_id,
                    guild_id = %event.guild_id,
                    channel_id = %created.id,
                    user_id = %event.user_id,
                    channel_name = %created.name,
                    "ticket channel created"
                );

                match self.remove_reaction(event).await {
                    Ok(()) => debug!(
                        event_name = "ticket.open.reaction_removed",
                        correlation_id,
                        user_id = %event.user_id,
                        "removed open reaction from prompt"
                    ),
                    Err(error) => warn!(
                        event_name = "ticket.open.reaction_removed",
                        correlation_id,
                        user_id = %event.user_id,
                        error_class = error.class().label(),
                        error = %error,
                        "could not remove open reaction from prompt"
                    ),
                }

                Ok(ReactionOutcome::TicketOpened { channel_id: created.id, channel_name })
            }
            Err(error) => {
                error!(
                    event_name = "ticket.open.failed",
                    correlation_id,
                    guild_id = %event.guild_id,
                    user_id = %event.user_id,
                    error_class = error.class().label(),
                    error = %error,
                    "ticket channel creation failed"
                );
                let notice = if error.class() == ErrorClass::Forbidden {
                    messages::channel_creation_forbidden()
                } else {
                    messages::channel_creation_failed()
                };
                self.post_transient_notice(event.channel_id, &notice, correlation_id).await;
                Ok(ReactionOutcome::OpenAborted { class: error.class() })
            }
        }
    }

    /// A channel created before a failing close-prompt send is left in place.
    async fn create_ticket_channel(
        &self,
        event: &ReactionEvent,
        origin: &ChannelInfo,
        admin_role: &RoleInfo,
        channel_name: &str,
    ) -> Result<ChannelInfo, TicketError> {
        let created = self
            .directory
            .create_text_channel(
                event.guild_id,
                NewTextChannel {
                    name: channel_name.to_owned(),
                    category_id: origin.category_id,
                    topic: format_topic(event.user_id, Utc::now()),
                    overwrites: ticket_overwrites(event.guild_id, event.user_id, admin_role.id),
                },
            )
            .await?;

        let prompt =
            messages::close_prompt(event.user_id, admin_role.id, &self.settings.close_emoji);
        let close_prompt = self.directory.send_message(created.id, &prompt).await?;
        self.directory
            .add_reaction(created.id, close_prompt.id, &self.settings.close_emoji)
            .await?;

        Ok(created)
    }

    async fn close_ticket(
        &self,
        event: &ReactionEvent,
        channel: &ChannelInfo,
        member: &MemberInfo,
        message: &MessageInfo,
        bot_user_id: UserId,
        correlation_id: &str,
    ) -> Result<ReactionOutcome, TicketError> {
        let is_close_prompt = message.author_id == bot_user_id
            && message.content.contains(messages::CLOSE_PROMPT_MARKER)
            && message.content.contains(&self.settings.close_emoji);
        if !is_close_prompt {
            self.remove_reaction_quietly(event).await;
            return Ok(ReactionOutcome::StrayReactionRemoved);
        }

        let roles = self.directory.roles(event.guild_id).await?;
        let is_admin = find_role_by_name(&roles, &self.settings.admin_role_name)
            .map(|role| member.has_role(role.id))
            .unwrap_or(false);
        let is_creator = self.recorded_creator(channel, correlation_id) == Some(member.user_id);

        if !(is_admin || is_creator) {
            info!(
                event_name = "ticket.close.denied",
                correlation_id,
                channel_id = %channel.id,
                user_id = %event.user_id,
                "close reaction from user who is neither creator nor admin"
            );
            let notice = messages::close_denied(event.user_id, &self.settings.admin_role_name);
            self.post_transient_notice(channel.id, &notice, correlation_id).await;
            self.remove_reaction_quietly(event).await;
            return Ok(ReactionOutcome::CloseDenied);
        }

        let claim = self.closing_channels.try_claim(channel.id);
        let current = if claim.is_some() { TicketState::Open } else { TicketState::Closing };
        let closing = match lifecycle::apply(current, TicketEvent::CloseAuthorized) {
            Ok(transition) => transition,
            Err(rejected) => {
                debug!(
                    event_name = "ticket.close.already_closing",
                    correlation_id,
                    channel_id = %channel.id,
                    user_id = %event.user_id,
                    error = %rejected,
                    "ticket is already closing; ignoring repeated close reaction"
                );
                self.remove_reaction_quietly(event).await;
                return Ok(ReactionOutcome::Ignored(IgnoreReason::AlreadyClosing));
            }
        };
        log_transition(&closing, correlation_id, channel.id);

        let finished = self.finish_close(event, channel, closing, correlation_id).await;
        drop(claim);

        match finished {
            Ok(()) => Ok(ReactionOutcome::TicketClosed { channel_id: channel.id }),
            Err(error) if error.is_not_found() => {
                debug!(
                    event_name = "ticket.close.already_gone",
                    correlation_id,
                    channel_id = %channel.id,
                    error = %error,
                    "ticket channel vanished before deletion"
                );
                Ok(ReactionOutcome::Ignored(IgnoreReason::ContextGone))
            }
            Err(error) => {
                error!(
                    event_name = "ticket.close.failed",
                    correlation_id,
                    channel_id = %channel.id,
                    error_class = error.class().label(),
                    error = %error,
                    "ticket channel deletion failed"
                );
                if error.class() == ErrorClass::Forbidden {
                    self.post_transient_notice(
                        channel.id,
                        &messages::channel_deletion_failed(),
                        correlation_id,
                    )
                    .await;
                }
                Ok(ReactionOutcome::CloseFailed { class: error.class() })
            }
        }
    }

    async fn finish_close(
        &self,
        event: &ReactionEvent,
        channel: &ChannelInfo,
        closing: TicketTransition,
        correlation_id: &str,
    ) -> Result<(), TicketError> {
        self.directory
            .send_message(channel.id, &messages::closing_notice(self.settings.close_delay_secs))
            .await?;

        match self.remove_reaction(event).await {
            Ok(()) => debug!(
                event_name = "ticket.close.reaction_removed",
                correlation_id,
                user_id = %event.user_id,
                "removed close reaction"
            ),
            Err(error) => warn!(
                event_name = "ticket.close.reaction_removed",
                correlation_id,
                user_id = %event.user_id,
                error_class = error.class().label(),
                error = %error,
                "could not remove close reaction"
            ),
        }

        // Committed from here on: the grace period cannot be cancelled.
        tokio::time::sleep(self.settings.close_delay()).await;
        let deleted = lifecycle::apply(closing.to, TicketEvent::GraceElapsed)?;

        self.directory.delete_channel(channel.id).await?;
        log_transition(&deleted, correlation_id, channel.id);
        info!(
            event_name = "ticket.close.deleted",
            correlation_id,
            channel_id = %channel.id,
            channel_name = %channel.name,
            "ticket channel deleted"
        );
        Ok(())
    }

    fn recorded_creator(&self, channel: &ChannelInfo, correlation_id: &str) -> Option<UserId> {
        let topic = channel.topic.as_deref()?;
        match parse_creator_id(topic) {
            Ok(creator) => creator,
            Err(error) => {
                warn!(
                    event_name = "ticket.topic.parse_failed",
                    correlation_id,
                    channel_id = %channel.id,
                    channel_name = %channel.name,
                    error_class = error.class().label(),
                    error = %error,
                    "could not parse creator id from channel topic"
                );
                None
            }
        }
    }

    async fn warn_duplicate(&self, event: &ReactionEvent, correlation_id: &str) {
        let guild_name = match self.directory.guild_name(event.guild_id).await {
            Ok(name) => name,
            Err(_) => event.guild_id.to_string(),
        };

        if let Err(error) = self
            .directory
            .send_direct_message(event.user_id, &messages::duplicate_ticket(&guild_name))
            .await
        {
            warn!(
                event_name = "ticket.open.duplicate_dm_failed",
                correlation_id,
                user_id = %event.user_id,
                error = %error,
                "could not direct-message user about existing ticket"
            );
        }
    }

    async fn remove_reaction(&self, event: &ReactionEvent) -> Result<(), TicketError> {
        self.directory
            .remove_reaction(event.channel_id, event.message_id, &event.emoji, event.user_id)
            .await
            .map_err(TicketError::from)
    }

    async fn remove_reaction_quietly(&self, event: &ReactionEvent) {
        let _ = self.remove_reaction(event).await;
    }

    /// Sends `content` and deletes it again after the notice TTL, without
    /// holding up the caller.
    async fn post_transient_notice(
        &self,
        channel_id: ChannelId,
        content: &str,
        correlation_id: &str,
    ) {
        let notice = match self.directory.send_message(channel_id, content).await {
            Ok(notice) => notice,
            Err(error) => {
                warn!(
                    event_name = "ticket.notice.send_failed",
                    correlation_id,
                    channel_id = %channel_id,
                    error = %error,
                    "could not post transient notice"
                );
                return;
            }
        };

        let directory = Arc::clone(&self.directory);
        let ttl = self.settings.notice_ttl();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Err(error) = directory.delete_message(channel_id, notice.id).await {
                debug!(
                    event_name = "ticket.notice.expire_failed",
                    channel_id = %channel_id,
                    message_id = %notice.id,
                    error = %error,
                    "transient notice was not deleted"
                );
            }
        });
    }

    /// `/complaint`: posts the open prompt into the invoking channel. Only
    /// holders of the admin role may use it.
    pub async fn post_ticket_prompt(
        &self,
        request: &PromptRequest,
        correlation_id: &str,
    ) -> PromptOutcome {
        match self.try_post_prompt(request).await {
            Ok(outcome) => {
                info!(
                    event_name = "ticket.prompt.handled",
                    correlation_id,
                    guild_id = %request.guild_id,
                    channel_id = %request.channel_id,
                    user_id = %request.user_id,
                    outcome = ?outcome,
                    "ticket prompt command handled"
                );
                outcome
            }
            Err(error) => {
                warn!(
                    event_name = "ticket.prompt.failed",
                    correlation_id,
                    guild_id = %request.guild_id,
                    channel_id = %request.channel_id,
                    error_class = error.class().label(),
                    error = %error,
                    "ticket prompt command failed"
                );
                PromptOutcome::Failed { class: error.class() }
            }
        }
    }

    async fn try_post_prompt(&self, request: &PromptRequest) -> Result<PromptOutcome, TicketError> {
        let roles = self.directory.roles(request.guild_id).await?;
        let member = self.directory.member(request.guild_id, request.user_id).await?;
        let is_admin = find_role_by_name(&roles, &self.settings.admin_role_name)
            .map(|role| member.has_role(role.id))
            .unwrap_or(false);
        if !is_admin {
            return Ok(PromptOutcome::MissingRole {
                role_name: self.settings.admin_role_name.clone(),
            });
        }

        let prompt = self
            .directory
            .send_message(request.channel_id, &messages::open_prompt(&self.settings.open_emoji))
            .await?;
        self.directory
            .add_reaction(request.channel_id, prompt.id, &self.settings.open_emoji)
            .await?;

        Ok(PromptOutcome::Posted { message_id: prompt.id })
    }
}

fn log_transition(transition: &TicketTransition, correlation_id: &str, channel_id: ChannelId) {
    debug!(
        event_name = "ticket.transition",
        correlation_id,
        channel_id = %channel_id,
        from = ?transition.from,
        to = ?transition.to,
        event = ?transition.event,
        "ticket state transition applied"
    );
}
