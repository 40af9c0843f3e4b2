use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::guild::{ChannelInfo, MemberInfo, MessageInfo, NewTextChannel, RoleInfo};
use crate::domain::ids::{ChannelId, GuildId, MessageId, RoleId, UserId};

use super::{DirectoryError, GuildDirectory};

/// Outbound operations that can be made to fail on demand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DirectoryOperation {
    CreateChannel,
    SendMessage,
    DeleteMessage,
    AddReaction,
    RemoveReaction,
    DeleteChannel,
    DirectMessage,
    FetchMessage,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReactionRecord {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub emoji: String,
    pub user_id: UserId,
}

#[derive(Default)]
struct GuildState {
    name: String,
    roles: Vec<RoleInfo>,
    members: HashMap<UserId, MemberInfo>,
}

#[derive(Default)]
struct DirectoryState {
    next_id: u64,
    guilds: HashMap<GuildId, GuildState>,
    channels: BTreeMap<ChannelId, ChannelInfo>,
    messages: BTreeMap<MessageId, MessageInfo>,
    reactions: Vec<ReactionRecord>,
    removed_reactions: Vec<ReactionRecord>,
    created_channels: Vec<NewTextChannel>,
    deleted_channels: Vec<ChannelId>,
    deleted_messages: Vec<MessageId>,
    direct_messages: Vec<(UserId, String)>,
    failures: HashMap<DirectoryOperation, DirectoryError>,
}

impl DirectoryState {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn check(&self, operation: DirectoryOperation) -> Result<(), DirectoryError> {
        match self.failures.get(&operation) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn guild(&self, guild_id: GuildId) -> Result<&GuildState, DirectoryError> {
        self.guilds
            .get(&guild_id)
            .ok_or_else(|| DirectoryError::NotFound(format!("guild {guild_id}")))
    }
}

/// Recording fake of the chat platform. Ids are allocated from a counter
/// starting well above anything tests seed by hand.
pub struct InMemoryGuildDirectory {
    bot_user_id: UserId,
    state: Mutex<DirectoryState>,
}

impl InMemoryGuildDirectory {
    pub fn new(bot_user_id: UserId) -> Self {
        Self {
            bot_user_id,
            state: Mutex::new(DirectoryState { next_id: 900_000, ..DirectoryState::default() }),
        }
    }

    pub async fn add_guild(&self, guild_id: GuildId, name: &str) {
        let mut state = self.state.lock().await;
        state.guilds.entry(guild_id).or_default().name = name.to_owned();
    }

    pub async fn add_role(&self, guild_id: GuildId, role_id: RoleId, name: &str) {
        let mut state = self.state.lock().await;
        state
            .guilds
            .entry(guild_id)
            .or_default()
            .roles
            .push(RoleInfo { id: role_id, name: name.to_owned() });
    }

    pub async fn add_member(&self, guild_id: GuildId, member: MemberInfo) {
        let mut state = self.state.lock().await;
        state.guilds.entry(guild_id).or_default().members.insert(member.user_id, member);
    }

    pub async fn add_channel(&self, channel: ChannelInfo) {
        let mut state = self.state.lock().await;
        state.channels.insert(channel.id, channel);
    }

    pub async fn add_message(&self, message: MessageInfo) {
        let mut state = self.state.lock().await;
        state.messages.insert(message.id, message);
    }

    pub async fn add_user_reaction(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        emoji: &str,
        user_id: UserId,
    ) {
        let mut state = self.state.lock().await;
        state.reactions.push(ReactionRecord {
            channel_id,
            message_id,
            emoji: emoji.to_owned(),
            user_id,
        });
    }

    pub async fn fail_operation(&self, operation: DirectoryOperation, error: DirectoryError) {
        self.state.lock().await.failures.insert(operation, error);
    }

    pub async fn clear_failure(&self, operation: DirectoryOperation) {
        self.state.lock().await.failures.remove(&operation);
    }

    pub async fn channels(&self) -> Vec<ChannelInfo> {
        self.state.lock().await.channels.values().cloned().collect()
    }

    pub async fn channel_named(&self, name: &str) -> Option<ChannelInfo> {
        self.state.lock().await.channels.values().find(|channel| channel.name == name).cloned()
    }

    pub async fn messages_in(&self, channel_id: ChannelId) -> Vec<MessageInfo> {
        self.state
            .lock()
            .await
            .messages
            .values()
            .filter(|message| message.channel_id == channel_id)
            .cloned()
            .collect()
    }

    pub async fn reactions_on(&self, message_id: MessageId) -> Vec<ReactionRecord> {
        self.state
            .lock()
            .await
            .reactions
            .iter()
            .filter(|reaction| reaction.message_id == message_id)
            .cloned()
            .collect()
    }

    pub async fn removed_reactions(&self) -> Vec<ReactionRecord> {
        self.state.lock().await.removed_reactions.clone()
    }

    pub async fn created_channels(&self) -> Vec<NewTextChannel> {
        self.state.lock().await.created_channels.clone()
    }

    pub async fn deleted_channels(&self) -> Vec<ChannelId> {
        self.state.lock().await.deleted_channels.clone()
    }

    pub async fn deleted_messages(&self) -> Vec<MessageId> {
        self.state.lock().await.deleted_messages.clone()
    }

    pub async fn direct_messages(&self) -> Vec<(UserId, String)> {
        self.state.lock().await.direct_messages.clone()
    }
}

#[async_trait]
impl GuildDirectory for InMemoryGuildDirectory {
    async fn bot_user_id(&self) -> Result<UserId, DirectoryError> {
        Ok(self.bot_user_id)
    }

    async fn guild_name(&self, guild_id: GuildId) -> Result<String, DirectoryError> {
        let state = self.state.lock().await;
        Ok(state.guild(guild_id)?.name.clone())
    }

    async fn channel(&self, channel_id: ChannelId) -> Result<ChannelInfo, DirectoryError> {
        let state = self.state.lock().await;
        state
            .channels
            .get(&channel_id)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(format!("channel {channel_id}")))
    }

    async fn text_channels(&self, guild_id: GuildId) -> Result<Vec<ChannelInfo>, DirectoryError> {
        let state = self.state.lock().await;
        Ok(state
            .channels
            .values()
            .filter(|channel| channel.guild_id == guild_id)
            .cloned()
            .collect())
    }

    async fn roles(&self, guild_id: GuildId) -> Result<Vec<RoleInfo>, DirectoryError> {
        let state = self.state.lock().await;
        Ok(state.guild(guild_id)?.roles.clone())
    }

    async fn member(
        &self,
        guild_id: GuildId,
        user_id: UserId,
    ) -> Result<MemberInfo, DirectoryError> {
        let state = self.state.lock().await;
        state
            .guild(guild_id)?
            .members
            .get(&user_id)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(format!("member {user_id}")))
    }

    async fn fetch_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<MessageInfo, DirectoryError> {
        let state = self.state.lock().await;
        state.check(DirectoryOperation::FetchMessage)?;
        state
            .messages
            .get(&message_id)
            .filter(|message| {
                message.channel_id == channel_id && state.channels.contains_key(&channel_id)
            })
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(format!("message {message_id}")))
    }

    async fn create_text_channel(
        &self,
        guild_id: GuildId,
        channel: NewTextChannel,
    ) -> Result<ChannelInfo, DirectoryError> {
        let mut state = self.state.lock().await;
        state.check(DirectoryOperation::CreateChannel)?;
        let id = ChannelId(state.allocate_id());
        let created = ChannelInfo {
            id,
            guild_id,
            name: channel.name.clone(),
            topic: Some(channel.topic.clone()),
            category_id: channel.category_id,
        };
        state.channels.insert(id, created.clone());
        state.created_channels.push(channel);
        Ok(created)
    }

    async fn send_message(
        &self,
        channel_id: ChannelId,
        content: &str,
    ) -> Result<MessageInfo, DirectoryError> {
        let mut state = self.state.lock().await;
        state.check(DirectoryOperation::SendMessage)?;
        if !state.channels.contains_key(&channel_id) {
            return Err(DirectoryError::NotFound(format!("channel {channel_id}")));
        }
        let message = MessageInfo {
            id: MessageId(state.allocate_id()),
            channel_id,
            author_id: self.bot_user_id,
            content: content.to_owned(),
        };
        state.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn delete_message(
        &self,
        _channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<(), DirectoryError> {
        let mut state = self.state.lock().await;
        state.check(DirectoryOperation::DeleteMessage)?;
        if state.messages.remove(&message_id).is_none() {
            return Err(DirectoryError::NotFound(format!("message {message_id}")));
        }
        state.deleted_messages.push(message_id);
        Ok(())
    }

    async fn add_reaction(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        emoji: &str,
    ) -> Result<(), DirectoryError> {
        let mut state = self.state.lock().await;
        state.check(DirectoryOperation::AddReaction)?;
        let user_id = self.bot_user_id;
        state.reactions.push(ReactionRecord {
            channel_id,
            message_id,
            emoji: emoji.to_owned(),
            user_id,
        });
        Ok(())
    }

    async fn remove_reaction(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        emoji: &str,
        user_id: UserId,
    ) -> Result<(), DirectoryError> {
        let mut state = self.state.lock().await;
        state.check(DirectoryOperation::RemoveReaction)?;
        let record = ReactionRecord { channel_id, message_id, emoji: emoji.to_owned(), user_id };
        state.reactions.retain(|reaction| *reaction != record);
        state.removed_reactions.push(record);
        Ok(())
    }

    async fn delete_channel(&self, channel_id: ChannelId) -> Result<(), DirectoryError> {
        let mut state = self.state.lock().await;
        state.check(DirectoryOperation::DeleteChannel)?;
        if state.channels.remove(&channel_id).is_none() {
            return Err(DirectoryError::NotFound(format!("channel {channel_id}")));
        }
        state.deleted_channels.push(channel_id);
        Ok(())
    }

    async fn send_direct_message(
        &self,
        user_id: UserId,
        content: &str,
    ) -> Result<(), DirectoryError> {
        let mut state = self.state.lock().await;
        // The attempt is recorded even when the recipient has DMs closed.
        state.direct_messages.push((user_id, content.to_owned()));
        state.check(DirectoryOperation::DirectMessage)
    }
}
