//! Response negotiation.
//!
//! Picks the status and body for a matched fixture, honouring an optional
//! `Prefer: status=<code>; type=<token>` hint, and applies the simulated
//! latency before the response goes out.

use crate::config::{is_valid_status, Fixture, PreferenceFallback, ResponseTime};
use serde_json::Value;
use tracing::debug;

/// Request header carrying the preference hint.
pub const PREFER_HEADER: &str = "prefer";

/// Client request to force a specific response scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferenceHint {
    pub status: u16,
    pub kind: Option<String>,
}

impl PreferenceHint {
    /// Parse `status=<int>; type=<token>`. Returns `None` for anything that
    /// does not carry a valid status; such hints are ignored.
    pub fn parse(value: &str) -> Option<Self> {
        let mut status = None;
        let mut kind = None;

        for pair in value.split([';', ',']) {
            let Some((key, val)) = pair.split_once('=') else {
                continue;
            };
            let val = val.trim().trim_matches('"');
            match key.trim().to_ascii_lowercase().as_str() {
                "status" => status = val.parse::<u16>().ok().filter(|s| is_valid_status(*s)),
                "type" if !val.is_empty() => kind = Some(val.to_string()),
                _ => {}
            }
        }

        status.map(|status| Self { status, kind })
    }
}

/// Status and payload chosen for a request.
#[derive(Debug, Clone, PartialEq)]
pub struct NegotiatedResponse {
    pub status: u16,
    /// `None` means an empty body
    pub body: Option<Value>,
}

/// Selects fixture responses and injects latency.
#[derive(Debug, Clone, Copy)]
pub struct Negotiator {
    response_time: ResponseTime,
    fallback: PreferenceFallback,
}

impl Negotiator {
    pub fn new(response_time: ResponseTime, fallback: PreferenceFallback) -> Self {
        Self {
            response_time,
            fallback,
        }
    }

    /// Sleep for a sampled latency, then select the response.
    ///
    /// Only the calling task is suspended.
    pub async fn negotiate(
        &self,
        fixture: &Fixture,
        hint: Option<&PreferenceHint>,
    ) -> NegotiatedResponse {
        let delay = self.response_time.sample();
        if !delay.is_zero() {
            debug!(fixture = %fixture.name, delay_ms = delay.as_millis() as u64, "Applying delay");
            tokio::time::sleep(delay).await;
        }
        self.select(fixture, hint)
    }

    /// Pick the status and body without any delay.
    pub fn select(&self, fixture: &Fixture, hint: Option<&PreferenceHint>) -> NegotiatedResponse {
        let response = &fixture.response;

        let Some(hint) = hint else {
            return NegotiatedResponse {
                status: response.status,
                body: response.body.clone(),
            };
        };

        match response.example_for(hint.status) {
            Some(body) => NegotiatedResponse {
                status: hint.status,
                body: body.cloned(),
            },
            None => {
                let status = match self.fallback {
                    PreferenceFallback::EchoStatus => hint.status,
                    PreferenceFallback::ServiceUnavailable => 503,
                };
                debug!(
                    fixture = %fixture.name,
                    requested = hint.status,
                    kind = ?hint.kind,
                    status,
                    "No example for preferred status"
                );
                NegotiatedResponse { status, body: None }
            }
        }
    }
}
