pub mod config;
pub mod directory;
pub mod domain;
pub mod errors;
pub mod tickets;

pub use config::{AppConfig, ConfigError, LoadOptions, TicketConfig};
pub use directory::{GuildDirectory, InMemoryGuildDirectory};
pub use domain::ids::{ChannelId, GuildId, MessageId, RoleId, UserId};
pub use errors::{DirectoryError, ErrorClass, TicketError};
pub use tickets::{
    PromptOutcome, PromptRequest, ReactionEvent, ReactionOutcome, TicketLifecycleController,
};
