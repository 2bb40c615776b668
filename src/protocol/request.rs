use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// `Content-Type` of every hub request body.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Bytes escaped in form values: everything outside the URL query-safe set,
/// plus `?&=[];+`, which the form encoding itself reserves.
const FORM_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'$')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b',')
    .remove(b'-')
    .remove(b'.')
    .remove(b'/')
    .remove(b':')
    .remove(b'@')
    .remove(b'_')
    .remove(b'~');

/// `hub.mode` of an outgoing request (and of an inbound verification).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionMode {
    Subscribe,
    Unsubscribe,
}

impl SubscriptionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionMode::Subscribe => "subscribe",
            SubscriptionMode::Unsubscribe => "unsubscribe",
        }
    }

    /// Parses a wire value; anything but `subscribe`/`unsubscribe` is `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "subscribe" => Some(SubscriptionMode::Subscribe),
            "unsubscribe" => Some(SubscriptionMode::Unsubscribe),
            _ => None,
        }
    }
}

impl fmt::Display for SubscriptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A subscribe or unsubscribe request, built once per transition and sent
/// unchanged to every hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    #[serde(rename = "hub.callback")]
    pub callback: String,
    #[serde(rename = "hub.topic")]
    pub topic: String,
    #[serde(rename = "hub.mode")]
    pub mode: SubscriptionMode,
    #[serde(
        rename = "hub.lease_seconds",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub lease_seconds: Option<u32>,
}

impl SubscriptionRequest {
    pub fn new(
        callback: &Url,
        topic: &Url,
        mode: SubscriptionMode,
        lease_seconds: Option<u32>,
    ) -> Self {
        Self {
            callback: callback.to_string(),
            topic: topic.to_string(),
            mode,
            lease_seconds,
        }
    }

    /// Encodes the request as a form body.
    ///
    /// Fields always appear in the order callback, topic, mode, lease seconds;
    /// the lease is omitted when unset.
    pub fn url_encoded(&self) -> String {
        let mut fields = vec![
            encode_field("hub.callback", &self.callback),
            encode_field("hub.topic", &self.topic),
            encode_field("hub.mode", self.mode.as_str()),
        ];
        if let Some(lease_seconds) = self.lease_seconds {
            fields.push(encode_field("hub.lease_seconds", &lease_seconds.to_string()));
        }
        fields.join("&")
    }
}

fn encode_field(name: &str, value: &str) -> String {
    format!("{name}={}", utf8_percent_encode(value, FORM_VALUE))
}
