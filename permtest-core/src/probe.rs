//! # Probe failures
//!
//! Every test body returns a [`ProbeResult`]. A gateway that wraps a privileged platform call
//! translates whatever the platform raised into one of the [`ProbeError`] variants, and the
//! executor matches on the variant to decide the verdict category:
//!
//! | variant                      | category                    | api_successful |
//! |------------------------------|-----------------------------|----------------|
//! | `Bypass`                     | bypass                      | false          |
//! | `ServiceUnavailable`         | bypass                      | false          |
//! | `NullArgumentReachedService` | success (no override)       | false          |
//! | `NullDereference`            | failure                     | false          |
//! | `SecurityDenied`             | failure                     | false          |
//! | `MissingMethod`              | failure                     | false          |
//! | `UnexpectedFailure`          | failure (inner cause)       | false          |
//! | `Other`                      | failure                     | false          |

use std::error::Error as StdError;

/// Result type of a permission test body.
pub type ProbeResult = std::result::Result<(), ProbeError>;

/// Prefix the platform puts on a null dereference caused by a missing system service.
pub const SYSTEM_SERVICE_MARKER: &str = "[npe_system_service]";

const INVOKE_MARKERS: [&str; 2] = [
    "Attempt to invoke interface",
    "Attempt to invoke virtual method",
];

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// The system service backing the API is absent on this device.
    #[error("{0}")]
    ServiceUnavailable(String),
    /// A null argument was dereferenced after the IPC call already reached the service.
    #[error("{0}")]
    NullArgumentReachedService(String),
    /// Any other null dereference.
    #[error("{0}")]
    NullDereference(String),
    /// The platform denied the call.
    #[error("{0}")]
    SecurityDenied(String),
    /// The API under test does not exist on this build.
    #[error("{0}")]
    MissingMethod(String),
    /// The test can not meaningfully run here.
    #[error("{0}")]
    Bypass(String),
    /// A failure of the test plumbing rather than of the API under test.
    #[error("unexpected failure: {0}")]
    UnexpectedFailure(#[source] Box<dyn StdError + Send + Sync + 'static>),
    #[error("{0}")]
    Other(String),
}

/// Verdict category of a probe failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Bypass,
    /// The call is considered executed; success keeps its initial value.
    Executed,
    Failure,
}

impl ProbeError {
    pub fn bypass(reason: impl Into<String>) -> ProbeError {
        ProbeError::Bypass(reason.into())
    }

    pub fn security(message: impl Into<String>) -> ProbeError {
        ProbeError::SecurityDenied(message.into())
    }

    pub fn unexpected(cause: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> ProbeError {
        ProbeError::UnexpectedFailure(cause.into())
    }

    /// Maps a platform null-dereference message onto the matching variant.
    ///
    /// Gateways that only see the raw message use this so that the marker strings are
    /// interpreted in exactly one place.
    pub fn from_null_pointer(message: impl Into<String>) -> ProbeError {
        let message = message.into();
        if message.starts_with(SYSTEM_SERVICE_MARKER) {
            ProbeError::ServiceUnavailable(message)
        } else if INVOKE_MARKERS
            .iter()
            .any(|marker| message.starts_with(marker))
        {
            ProbeError::NullArgumentReachedService(message)
        } else {
            ProbeError::NullDereference(message)
        }
    }

    pub fn disposition(&self) -> Disposition {
        match self {
            ProbeError::Bypass(_) | ProbeError::ServiceUnavailable(_) => Disposition::Bypass,
            ProbeError::NullArgumentReachedService(_) => Disposition::Executed,
            ProbeError::NullDereference(_)
            | ProbeError::SecurityDenied(_)
            | ProbeError::MissingMethod(_)
            | ProbeError::UnexpectedFailure(_)
            | ProbeError::Other(_) => Disposition::Failure,
        }
    }

    /// Human readable message carried into the verdict.
    pub fn message(&self) -> String {
        match self {
            ProbeError::ServiceUnavailable(_) => {
                "The system does not have the hardware feature required to run this test.".into()
            }
            ProbeError::NullArgumentReachedService(_) => {
                "A null dereference occurred, but the binder transaction was executed.".into()
            }
            ProbeError::UnexpectedFailure(cause) => cause.to_string(),
            ProbeError::NullDereference(message)
            | ProbeError::SecurityDenied(message)
            | ProbeError::MissingMethod(message)
            | ProbeError::Bypass(message)
            | ProbeError::Other(message) => message.clone(),
        }
    }
}

// A `ProbeError` propagated with `?` through an eyre or anyhow body keeps its class.
impl From<anyhow::Error> for ProbeError {
    fn from(e: anyhow::Error) -> ProbeError {
        e.downcast::<ProbeError>()
            .unwrap_or_else(|e| ProbeError::Other(format!("{e:#}")))
    }
}

impl From<eyre::Report> for ProbeError {
    fn from(e: eyre::Report) -> ProbeError {
        e.downcast::<ProbeError>()
            .unwrap_or_else(|e| ProbeError::Other(format!("{e:#}")))
    }
}
