//! Inbound verification and denial payloads sent by hubs to the callback.
//!
//! The two shapes carry no explicit discriminator; a payload is a
//! verification if it parses as one (`hub.challenge` present, mode
//! subscribe/unsubscribe), otherwise a denial if it parses as one
//! (`hub.mode=denied`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::request::SubscriptionMode;
use crate::error::SubscriberError;

/// `hub.mode` of a denial; the only accepted value is `denied`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DenialMode {
    Denied,
}

/// Hub challenge confirming a requested (un)subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionVerification {
    #[serde(rename = "hub.mode")]
    pub mode: SubscriptionMode,
    #[serde(rename = "hub.topic")]
    pub topic: String,
    /// Must be echoed back verbatim in the callback response body
    #[serde(rename = "hub.challenge")]
    pub challenge: String,
    /// Lease granted by the hub, if any
    #[serde(
        rename = "hub.lease_seconds",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub lease_seconds: Option<u32>,
}

/// Hub rejection of a subscription request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionDenial {
    #[serde(rename = "hub.mode")]
    pub mode: DenialMode,
    #[serde(rename = "hub.topic")]
    pub topic: String,
    #[serde(rename = "hub.reason", default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Either shape of an inbound verification callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionValidation {
    Verifying(SubscriptionVerification),
    Denied(SubscriptionDenial),
}

impl SubscriptionValidation {
    /// Decodes a JSON object body.
    ///
    /// # Errors
    ///
    /// [`SubscriberError::UnidentifiedValidation`] when the body is neither shape.
    pub fn from_json(body: &[u8]) -> Result<Self, SubscriberError> {
        if let Ok(verification) = serde_json::from_slice::<SubscriptionVerification>(body) {
            return Ok(Self::Verifying(verification));
        }
        if let Ok(denial) = serde_json::from_slice::<SubscriptionDenial>(body) {
            return Ok(Self::Denied(denial));
        }
        Err(SubscriberError::UnidentifiedValidation)
    }

    /// Decodes a form-urlencoded body or a request query string (hubs
    /// usually send verification as GET query parameters).
    ///
    /// # Errors
    ///
    /// [`SubscriberError::UnidentifiedValidation`] when the input is neither shape.
    pub fn from_form(input: &str) -> Result<Self, SubscriberError> {
        let fields: HashMap<String, String> = url::form_urlencoded::parse(input.as_bytes())
            .into_owned()
            .collect();

        if let Some(verification) = verification_from_fields(&fields) {
            return Ok(Self::Verifying(verification));
        }
        if let Some(denial) = denial_from_fields(&fields) {
            return Ok(Self::Denied(denial));
        }
        Err(SubscriberError::UnidentifiedValidation)
    }

    pub fn topic(&self) -> &str {
        match self {
            Self::Verifying(v) => &v.topic,
            Self::Denied(d) => &d.topic,
        }
    }
}

fn verification_from_fields(fields: &HashMap<String, String>) -> Option<SubscriptionVerification> {
    let lease_seconds = match fields.get("hub.lease_seconds") {
        Some(value) => Some(value.trim().parse().ok()?),
        None => None,
    };
    Some(SubscriptionVerification {
        mode: SubscriptionMode::parse(fields.get("hub.mode")?)?,
        topic: fields.get("hub.topic")?.clone(),
        challenge: fields.get("hub.challenge")?.clone(),
        lease_seconds,
    })
}

fn denial_from_fields(fields: &HashMap<String, String>) -> Option<SubscriptionDenial> {
    if fields.get("hub.mode")? != "denied" {
        return None;
    }
    Some(SubscriptionDenial {
        mode: DenialMode::Denied,
        topic: fields.get("hub.topic")?.clone(),
        reason: fields.get("hub.reason").cloned(),
    })
}
