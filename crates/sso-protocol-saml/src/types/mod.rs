//! SAML 2.0 types and data structures.
//!
//! This module contains the SAML types exchanged during single sign-on:
//! requests, responses, assertions, and related structures.

mod assertion;
mod authn_request;
mod constants;
mod name_id;
mod response;
mod status;

pub use assertion::*;
pub use authn_request::*;
pub use constants::*;
pub use name_id::*;
pub use response::*;
pub use status::*;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{SamlError, SamlResult};
use crate::xml::Element;

/// Formats an instant as `xs:dateTime` in UTC with millisecond precision.
#[must_use]
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_instant(value: &str, field: &str) -> SamlResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|instant| instant.with_timezone(&Utc))
        .map_err(|_| SamlError::XmlParse(format!("invalid {field} timestamp")))
}

pub(crate) fn required_attr<'a>(element: &'a Element, name: &str) -> SamlResult<&'a str> {
    element
        .attr(name)
        .ok_or_else(|| SamlError::MissingElement(format!("{}/@{name}", element.local_name())))
}
