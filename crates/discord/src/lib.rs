//! Discord integration for the ticket bot.
//!
//! - **Gateway** (`gateway`) - event pump with reconnection and one task per event
//! - **Events** (`events`) - typed envelopes, dispatcher and the ticket handlers
//! - **Serenity adapter** (`serenity_client`) - live gateway transport and the
//!   REST-backed `GuildDirectory`
//!
//! ```text
//! Discord gateway -> SerenityTransport -> GatewayRunner -> EventDispatcher
//!                                                              |
//!                         SerenityDirectory <- TicketLifecycleController
//! ```

pub mod events;
pub mod gateway;
pub mod serenity_client;
