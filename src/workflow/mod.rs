//! RMA lifecycle: the status pipeline and the permission-gated authorizer.
//!
//! Everything here is pure. Decisions come back as [`StatusMutation`]
//! descriptors that the store applies with a conditional update.

mod authorizer;
mod status;

pub use authorizer::{
    authorize_advance, authorize_reject, authorize_transition, with_tracking, Attachments, StatusMutation,
    TransitionError,
};
pub use status::{
    attachment_slot, can_reject, is_terminal, next_status, requirement_for, AttachmentSlot, InvalidTransition,
    Requirement, Status, UnknownStatus,
};
