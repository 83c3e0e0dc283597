use crate::DKIMError;

/// Outcome of verifying a single signature.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Verdict {
    /// The signature verified; message processing continues.
    Continue,
    /// The signature is definitively broken (body hash or RSA mismatch).
    Reject,
    /// A transient condition (DNS) prevented verification; retry later.
    Tempfail,
    /// The signature can never verify (syntax, missing key, revoked key).
    Permfail,
    /// A header covered by the signature could not be retrieved.
    RecordError,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continue => "pass",
            Self::Reject => "reject",
            Self::Tempfail => "tempfail",
            Self::Permfail => "permfail",
            Self::RecordError => "record error",
        }
    }
}

#[derive(Debug, Clone)]
/// Result of the DKIM verification
pub struct DKIMResult {
    verdict: Verdict,
    error: Option<DKIMError>,
    domain_used: String,
}

impl DKIMResult {
    /// Constructs a passing result
    pub fn pass(domain_used: impl Into<String>) -> Self {
        DKIMResult {
            verdict: Verdict::Continue,
            error: None,
            domain_used: domain_used.into(),
        }
    }

    /// Constructs a failed result; the verdict is derived from the error
    pub fn fail(reason: DKIMError, domain_used: impl Into<String>) -> Self {
        DKIMResult {
            verdict: reason.verdict(),
            error: Some(reason),
            domain_used: domain_used.into(),
        }
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    pub fn error(&self) -> Option<&DKIMError> {
        self.error.as_ref()
    }

    /// Returns the signing domain of the verified signature
    pub fn domain_used(&self) -> String {
        self.domain_used.to_lowercase()
    }

    /// Returns the verification result as a one-word summary.
    pub fn summary(&self) -> &'static str {
        self.verdict.as_str()
    }

    /// Similar to `summary` but with detail on failure. Typically used for
    /// the `Authentication-Results` header.
    pub fn with_detail(&self) -> String {
        if let Some(err) = self.error() {
            format!("{} ({})", self.summary(), err)
        } else {
            self.summary().to_owned()
        }
    }
}
