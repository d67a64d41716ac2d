mod gate;
mod policy;

pub use gate::{RefreshGate, RefreshLease, RefreshOutcome, RefreshPhase, Ticket, Waiter};
pub use policy::{RefreshTrigger, TOKEN_NOT_VALID_CODE};

pub(crate) use policy::{classify_failure, FailureClass};
