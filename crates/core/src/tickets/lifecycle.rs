use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketState {
    None,
    Open,
    Closing,
    Deleted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketEvent {
    /// A validated open reaction from a user without an open ticket.
    OpenApproved,
    /// A close reaction from the creator or an admin on the close prompt.
    CloseAuthorized,
    GraceElapsed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketTransition {
    pub from: TicketState,
    pub to: TicketState,
    pub event: TicketEvent,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("invalid ticket transition from {state:?} using event {event:?}")]
    InvalidTransition { state: TicketState, event: TicketEvent },
}

/// `None -> Open -> Closing -> Deleted`; there is no cancellation and no way
/// back from `Deleted`.
pub fn apply(current: TicketState, event: TicketEvent) -> Result<TicketTransition, LifecycleError> {
    use TicketEvent::{CloseAuthorized, GraceElapsed, OpenApproved};
    use TicketState::{Closing, Deleted, Open};

    let to = match (current, event) {
        (TicketState::None, OpenApproved) => Open,
        (Open, CloseAuthorized) => Closing,
        (Closing, GraceElapsed) => Deleted,
        (state, event) => return Err(LifecycleError::InvalidTransition { state, event }),
    };

    Ok(TicketTransition { from: current, to, event })
}
