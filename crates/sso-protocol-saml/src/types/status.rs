//! SAML Status types.
//!
//! Status information returned in SAML protocol responses.

use serde::{Deserialize, Serialize};

use super::{status_codes, sub_status_codes};
use crate::error::{SamlError, SamlResult};
use crate::xml::Element;

/// SAML protocol status.
///
/// Contains the status code and optional message for a SAML response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// The status code.
    pub status_code: StatusCode,

    /// Optional status message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

impl Status {
    /// Creates a success status.
    #[must_use]
    pub fn success() -> Self {
        Self {
            status_code: StatusCode::new(status_codes::SUCCESS),
            status_message: None,
        }
    }

    /// Creates a responder error status carrying `AuthnFailed`.
    #[must_use]
    pub fn authn_failed(message: impl Into<String>) -> Self {
        Self {
            status_code: StatusCode::new(status_codes::RESPONDER)
                .with_sub_code(sub_status_codes::AUTHN_FAILED),
            status_message: Some(message.into()),
        }
    }

    /// Creates a requester error status.
    #[must_use]
    pub fn requester_error(message: impl Into<String>) -> Self {
        Self {
            status_code: StatusCode::new(status_codes::REQUESTER),
            status_message: Some(message.into()),
        }
    }

    /// Returns true if this status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status_code.value == status_codes::SUCCESS
    }

    /// Converts a non-success status into [`SamlError::IdpDenied`].
    ///
    /// # Errors
    ///
    /// Returns `IdpDenied` unless the top-level code is `Success`.
    pub fn ensure_success(&self) -> SamlResult<()> {
        if self.is_success() {
            return Ok(());
        }
        let message = match (&self.status_code.status_code, &self.status_message) {
            (_, Some(message)) => Some(message.clone()),
            (Some(sub), None) => Some(sub.value.clone()),
            (None, None) => None,
        };
        Err(SamlError::IdpDenied {
            status_code: self.status_code.value.clone(),
            message,
        })
    }

    /// Reads a `samlp:Status` element.
    ///
    /// # Errors
    ///
    /// Returns `MissingElement` if there is no `StatusCode` with a `Value`.
    pub fn from_element(element: &Element) -> SamlResult<Self> {
        let code = element
            .child("StatusCode")
            .ok_or_else(|| SamlError::MissingElement("StatusCode".to_string()))?;
        Ok(Self {
            status_code: StatusCode::from_element(code)?,
            status_message: element.child_text("StatusMessage").filter(|m| !m.is_empty()),
        })
    }

    /// Builds the `samlp:Status` element.
    #[must_use]
    pub fn to_element(&self) -> Element {
        let mut status = Element::new("samlp:Status").with_child(self.status_code.to_element());
        if let Some(message) = &self.status_message {
            status = status.with_child(Element::new("samlp:StatusMessage").with_text(message.clone()));
        }
        status
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::success()
    }
}

/// SAML status code.
///
/// Status codes can be nested, with a top-level code and optional sub-code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCode {
    /// The status code URI value.
    pub value: String,

    /// Optional nested status code providing more detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<Box<StatusCode>>,
}

impl StatusCode {
    /// Creates a new status code with the given value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            status_code: None,
        }
    }

    /// Sets a nested status code.
    #[must_use]
    pub fn with_sub_code(mut self, value: impl Into<String>) -> Self {
        self.status_code = Some(Box::new(Self::new(value)));
        self
    }

    fn from_element(element: &Element) -> SamlResult<Self> {
        let value = element
            .attr("Value")
            .ok_or_else(|| SamlError::MissingElement("StatusCode/@Value".to_string()))?;
        let nested = element
            .child("StatusCode")
            .map(Self::from_element)
            .transpose()?
            .map(Box::new);
        Ok(Self {
            value: value.to_string(),
            status_code: nested,
        })
    }

    fn to_element(&self) -> Element {
        let mut element = Element::new("samlp:StatusCode").with_attr("Value", self.value.clone());
        if let Some(nested) = &self.status_code {
            element = element.with_child(nested.to_element());
        }
        element
    }
}
