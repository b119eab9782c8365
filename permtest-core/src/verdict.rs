use std::sync::Arc;

use crate::{descriptor::TestDescriptor, probe::ProbeError};

/// Message of a verdict whose API call succeeded with the permission granted.
pub const GRANTED_MESSAGE: &str = "Target permission is granted and api successfully executed";

/// Outcome of running one descriptor once.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub source: TestDescriptor,
    pub success: bool,
    pub bypassed: bool,
    pub api_successful: bool,
    /// Live grant state of the permission, queried after the test body ran.
    pub granted: bool,
    pub platform_signature_match: bool,
    pub gms_signature_match: bool,
    pub development_protection: bool,
    pub is_inverse: bool,
    pub message: String,
    pub cause: Option<Arc<ProbeError>>,
}

impl Verdict {
    pub fn new(source: TestDescriptor, success: bool) -> Verdict {
        let development_protection = source.development_protection;
        Verdict {
            source,
            success,
            bypassed: false,
            api_successful: false,
            granted: false,
            platform_signature_match: false,
            gms_signature_match: false,
            development_protection,
            is_inverse: false,
            message: String::new(),
            cause: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Verdict {
        self.message = message.into();
        self
    }

    pub fn bypass(source: TestDescriptor, message: impl Into<String>) -> Verdict {
        Verdict {
            bypassed: true,
            ..Verdict::new(source, true).with_message(message)
        }
    }

    pub fn permission(&self) -> &str {
        &self.source.permission
    }

    /// A failed verdict counts as an error unless it was bypassed.
    pub fn is_error(&self) -> bool {
        !self.success && !self.bypassed
    }

    /// Restores the "bypass implies success" invariant after a result hook touched the
    /// verdict.
    pub(crate) fn normalize(mut self) -> Verdict {
        if self.bypassed {
            self.success = true;
        }
        self
    }

    /// One-line summary in the `PASSED{...}` format certification logs use.
    pub fn summary(&self) -> String {
        if self.bypassed {
            return format!("{}: BYPASSED {{message='{}'}}", self.permission(), self.message);
        }
        let status = if self.success { "PASSED" } else { "FAILED" };
        format!(
            "{}: {status}{{permission_granted:{},api_successful:{},platform_signature_match:{},gms_signature_match:{},message='{}'}}",
            self.permission(),
            self.granted,
            self.api_successful,
            self.platform_signature_match,
            self.gms_signature_match,
            self.message,
        )
    }
}
