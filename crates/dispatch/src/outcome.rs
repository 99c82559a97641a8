//! Backend call outcomes and their classification

use serde::{Deserialize, Serialize};

use crate::{BackendReply, DispatchError};

/// Prefix marking an outcome replayed from the response cache
pub const CACHED_PREFIX: &str = "[CACHED] ";

/// Message of the synthetic rate-limit outcome
pub const RATE_LIMITED_MESSAGE: &str = "[RATE LIMITED] Too many requests, try again shortly";

/// Result of checking a plate against the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub success: bool,
    pub message: String,
    /// Backend decision, present only on structured success replies
    pub approved: Option<bool>,
    pub is_connection_error: bool,
    pub is_rate_limited: bool,
    pub is_cached: bool,
    /// Plate echoed by the backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_plate_number: Option<String>,
    /// Panel echoed by the backend
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub panel_type: Option<String>,
}

/// Display category for UI colouring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Approved,
    Success,
    Cached,
    RateLimited,
    Rejected,
    ConnectionError,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Approved => "approved",
            OutcomeKind::Success => "success",
            OutcomeKind::Cached => "cached",
            OutcomeKind::RateLimited => "rate_limited",
            OutcomeKind::Rejected => "rejected",
            OutcomeKind::ConnectionError => "connection_error",
        }
    }
}

/// Structured body of a 200 reply
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckVehicleBody {
    message: Option<String>,
    approved: Option<bool>,
    license_plate_number: Option<String>,
    #[serde(rename = "type")]
    panel_type: Option<String>,
}

impl Outcome {
    fn base(success: bool, message: impl Into<String>) -> Self {
        Self {
            success,
            message: message.into(),
            approved: None,
            is_connection_error: false,
            is_rate_limited: false,
            is_cached: false,
            license_plate_number: None,
            panel_type: None,
        }
    }

    /// Success without a structured body
    pub fn success(message: impl Into<String>) -> Self {
        Self::base(true, message)
    }

    /// Backend answered with a non-200 status
    pub fn rejected(status: u16, body: &str) -> Self {
        Self::base(false, format!("API Error: {} - {}", status, body))
    }

    /// The backend could not be reached or did not answer in time
    pub fn connection_error(err: &DispatchError) -> Self {
        Self {
            is_connection_error: true,
            ..Self::base(false, format!("Network Error: {}", err))
        }
    }

    /// Synthetic outcome for a dispatch refused by the rate limiter
    pub fn rate_limited() -> Self {
        Self {
            is_rate_limited: true,
            ..Self::base(false, RATE_LIMITED_MESSAGE)
        }
    }

    /// Classify a raw backend reply
    pub fn from_reply(reply: &BackendReply) -> Self {
        if reply.status != 200 {
            return Self::rejected(reply.status, &reply.body);
        }

        match serde_json::from_str::<CheckVehicleBody>(&reply.body) {
            Ok(CheckVehicleBody {
                message: Some(message),
                approved,
                license_plate_number,
                panel_type,
            }) => Self {
                approved: Some(approved.unwrap_or(false)),
                license_plate_number,
                panel_type,
                ..Self::success(message)
            },
            _ => Self::success("Success"),
        }
    }

    /// Copy of this outcome as served from the cache
    pub fn as_cached(&self) -> Self {
        let message = if self.message.starts_with(CACHED_PREFIX) {
            self.message.clone()
        } else {
            format!("{}{}", CACHED_PREFIX, self.message)
        };
        Self {
            message,
            is_cached: true,
            ..self.clone()
        }
    }

    pub fn kind(&self) -> OutcomeKind {
        if self.is_rate_limited {
            OutcomeKind::RateLimited
        } else if self.is_connection_error {
            OutcomeKind::ConnectionError
        } else if !self.success {
            OutcomeKind::Rejected
        } else if self.is_cached {
            OutcomeKind::Cached
        } else if self.approved == Some(true) {
            OutcomeKind::Approved
        } else {
            OutcomeKind::Success
        }
    }
}
