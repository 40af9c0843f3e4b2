//! Ticket lifecycle: naming, topic metadata, permissions and the reaction
//! controller that ties them to the guild directory.

pub mod controller;
pub mod lifecycle;
pub mod locks;
pub mod messages;
pub mod naming;
pub mod permissions;
pub mod topic;

pub use controller::{
    IgnoreReason, PromptOutcome, PromptRequest, ReactionEvent, ReactionOutcome,
    TicketLifecycleController,
};
pub use lifecycle::{LifecycleError, TicketEvent, TicketState, TicketTransition};
pub use naming::{sanitize_name, TicketNaming};
