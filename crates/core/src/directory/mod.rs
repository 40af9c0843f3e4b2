//! Guild Directory - the controller's only view of the chat platform.
//!
//! The platform is the source of truth: channel names, topics and message
//! authorship are read fresh on every event. Implementations:
//! - `memory::InMemoryGuildDirectory` - recording fake for tests
//! - `kujo_discord::serenity_client::SerenityDirectory` - live Discord REST

use async_trait::async_trait;

use crate::domain::guild::{ChannelInfo, MemberInfo, MessageInfo, NewTextChannel, RoleInfo};
use crate::domain::ids::{ChannelId, GuildId, MessageId, UserId};
pub use crate::errors::DirectoryError;

pub mod memory;

pub use memory::InMemoryGuildDirectory;

#[async_trait]
pub trait GuildDirectory: Send + Sync {
    async fn bot_user_id(&self) -> Result<UserId, DirectoryError>;
    async fn guild_name(&self, guild_id: GuildId) -> Result<String, DirectoryError>;
    async fn channel(&self, channel_id: ChannelId) -> Result<ChannelInfo, DirectoryError>;
    async fn text_channels(&self, guild_id: GuildId) -> Result<Vec<ChannelInfo>, DirectoryError>;
    async fn roles(&self, guild_id: GuildId) -> Result<Vec<RoleInfo>, DirectoryError>;
    async fn member(&self, guild_id: GuildId, user_id: UserId)
        -> Result<MemberInfo, DirectoryError>;
    async fn fetch_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<MessageInfo, DirectoryError>;
    async fn create_text_channel(
        &self,
        guild_id: GuildId,
        channel: NewTextChannel,
    ) -> Result<ChannelInfo, DirectoryError>;
    async fn send_message(
        &self,
        channel_id: ChannelId,
        content: &str,
    ) -> Result<MessageInfo, DirectoryError>;
    async fn delete_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<(), DirectoryError>;
    async fn add_reaction(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        emoji: &str,
    ) -> Result<(), DirectoryError>;
    async fn remove_reaction(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        emoji: &str,
        user_id: UserId,
    ) -> Result<(), DirectoryError>;
    async fn delete_channel(&self, channel_id: ChannelId) -> Result<(), DirectoryError>;
    async fn send_direct_message(&self, user_id: UserId, content: &str)
        -> Result<(), DirectoryError>;
}

/// Finds a role by exact name, the way the platform's role list is searched.
pub fn find_role_by_name<'a>(roles: &'a [RoleInfo], name: &str) -> Option<&'a RoleInfo> {
    roles.iter().find(|role| role.name == name)
}

#[cfg(test)]
mod tests {
    use super::find_role_by_name;
    use crate::domain::guild::RoleInfo;
    use crate::domain::ids::RoleId;

    #[test]
    fn role_lookup_is_exact_and_case_sensitive() {
        let roles = vec![
            RoleInfo { id: RoleId(1), name: "admin".to_owned() },
            RoleInfo { id: RoleId(2), name: "Admin".to_owned() },
        ];

        assert_eq!(find_role_by_name(&roles, "Admin").map(|role| role.id), Some(RoleId(2)));
        assert!(find_role_by_name(&roles, "Moderator").is_none());
    }
}
