//! Hub wire protocol: outgoing subscription requests, the multi-hub
//! announcement fan-out, and inbound verification payloads.

mod announce;
mod request;
mod validation;

pub use announce::{announce, AnnounceError, AnnounceReport, HubOutcome};
pub use request::{SubscriptionMode, SubscriptionRequest, FORM_CONTENT_TYPE};
pub use validation::{DenialMode, SubscriptionDenial, SubscriptionValidation, SubscriptionVerification};
