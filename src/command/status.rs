use serde::Serialize;
use strum_macros::{Display, EnumString};

/// Vendor status codes collapse onto these four levels.
#[derive(
    Debug, Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Display, EnumString, Serialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    #[default]
    Success,
    Info,
    Warning,
    Error,
}

/// Faults raised by the session itself rather than reported by the instrument.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FaultKind {
    /// No response arrived within the window, even after a recovery probe.
    Timeout,
    /// The transport refused to send a command.
    Send,
}

/// Outcome status carried by every instrument event.
///
/// A status is an error when its error list is non-empty; severity alone
/// does not make it one.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
pub struct InstrumentStatus {
    severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<u16>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    messages: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fault: Option<FaultKind>,
}

impl InstrumentStatus {
    #[must_use]
    pub fn success() -> Self {
        Self::default()
    }

    /// Builds a status from a vendor code already mapped to a severity.
    /// Error-level text goes to the error list, anything else to messages.
    #[must_use]
    pub fn from_code(severity: Severity, code: u16, text: impl Into<String>) -> Self {
        let text = text.into();
        let mut status = Self {
            severity,
            code: Some(code),
            ..Self::default()
        };
        if !text.is_empty() {
            match severity {
                Severity::Error => status.errors.push(text),
                Severity::Success | Severity::Info | Severity::Warning => {
                    status.messages.push(text);
                }
            }
        }
        status
    }

    /// Builds an error status for a session-side fault.
    #[must_use]
    pub fn fault(kind: FaultKind, error: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            errors: vec![error.into()],
            fault: Some(kind),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    #[must_use]
    pub fn code(&self) -> Option<u16> {
        self.code
    }

    #[must_use]
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    #[must_use]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    #[must_use]
    pub fn fault_kind(&self) -> Option<FaultKind> {
        self.fault
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        !self.errors.is_empty()
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.severity == Severity::Success && !self.is_error()
    }
}
