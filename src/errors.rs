use crate::result::Verdict;

quick_error! {
    #[derive(Debug, PartialEq, Clone)]
    /// DKIM errors
    pub enum DKIMError {
        UnsupportedHashAlgorithm(value: String) {
            display("unsupported hash algorithm: {}", value)
        }
        UnsupportedCanonicalizationType(value: String) {
            display("unsupported canonicalization: {}", value)
        }
        SignatureSyntaxError(err: String) {
            display("signature syntax error: {}", err)
        }
        SignatureMissingRequiredTag(name: &'static str) {
            display("signature missing required tag ({})", name)
        }
        UnknownTag(name: String) {
            display("unknown tag ({})", name)
        }
        IncompatibleVersion {
            display("incompatible version")
        }
        FromFieldNotSigned {
            display("From field not signed")
        }
        InvalidBodyLimit(err: String) {
            display("invalid body limit: {}", err)
        }
        TimestampInFuture {
            display("signature timestamp in the future")
        }
        SignatureExpired {
            display("signature expired")
        }
        KeyUnavailable(err: String) {
            display("key unavailable: {}", err)
        }
        UnknownInternalError(err: String) {
            display("internal error: {}", err)
        }
        NoKeyForSignature {
            display("no key for signature")
        }
        KeySyntaxError(err: String) {
            display("key syntax error: {}", err)
        }
        KeyRevoked {
            display("key revoked")
        }
        BadSignature(err: String) {
            display("bad signature: {}", err)
        }
        SignatureDidNotVerify {
            display("signature did not verify")
        }
        BodyHashDidNotVerify {
            display("body hash did not verify")
        }
        SignedHeaderMissing(name: &'static str) {
            display("signed header missing from message ({})", name)
        }
        MessageParseError(err: String) {
            display("failed to parse message: {}", err)
        }
    }
}

impl DKIMError {
    /// Map an error to the verdict surfaced to the caller.
    ///
    /// Hash or signature mismatches reject the message outright; transient
    /// DNS conditions tempfail so the caller can retry later; everything
    /// else is a permanent failure of this signature.
    pub fn verdict(&self) -> Verdict {
        use DKIMError::*;
        match self {
            BadSignature(_) | SignatureDidNotVerify | BodyHashDidNotVerify => Verdict::Reject,
            SignedHeaderMissing(_) => Verdict::RecordError,
            KeyUnavailable(_) | UnknownInternalError(_) => Verdict::Tempfail,
            UnsupportedHashAlgorithm(_)
            | UnsupportedCanonicalizationType(_)
            | SignatureSyntaxError(_)
            | SignatureMissingRequiredTag(_)
            | UnknownTag(_)
            | IncompatibleVersion
            | FromFieldNotSigned
            | InvalidBodyLimit(_)
            | TimestampInFuture
            | SignatureExpired
            | NoKeyForSignature
            | KeySyntaxError(_)
            | KeyRevoked
            | MessageParseError(_) => Verdict::Permfail,
        }
    }
}
