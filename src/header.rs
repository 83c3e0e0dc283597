use crate::canonicalization;
use crate::hash::HashAlgo;
use crate::{parser, DKIMError};
use base64::engine::general_purpose;
use base64::Engine;

pub(crate) const DKIM_SIGNATURE_HEADER_NAME: &str = "DKIM-Signature";
const EXPIRATION_DRIFT_SECS: i64 = 15 * 60;

/// Parsed and validated `DKIM-Signature` header.
///
/// One instance exists per signature under verification; it owns the decoded
/// signature material and the raw header text needed for
/// self-canonicalization.
#[derive(Debug, Clone)]
pub struct DKIMHeader {
    pub algorithm: HashAlgo,
    pub header_canonicalization: canonicalization::Type,
    pub body_canonicalization: canonicalization::Type,
    pub domain: String,
    pub selector: String,
    /// Signed header names, in `h=` order
    pub signed_headers: Vec<String>,
    /// Decoded `b=`
    pub signature_bytes: Vec<u8>,
    /// Decoded `bh=`
    pub body_hash_bytes: Vec<u8>,
    /// `l=`: number of body bytes covered by the signature
    pub body_limit: Option<u64>,
    /// `t=`: signing time, epoch seconds
    pub timestamp: Option<u64>,
    /// `x=`: expiration time, epoch seconds
    pub expiration: Option<u64>,
    raw_bytes: String,
}

impl DKIMHeader {
    /// Parse a `DKIM-Signature` header value.
    /// <https://datatracker.ietf.org/doc/html/rfc6376#section-6.1.1>
    ///
    /// Duplicated tags are not expected; when they occur, the last
    /// occurrence wins.
    pub fn parse(value: &str) -> Result<Self, DKIMError> {
        Self::parse_with_time(value, chrono::Utc::now().timestamp())
    }

    pub(crate) fn parse_with_time(value: &str, now: i64) -> Result<Self, DKIMError> {
        let (_, tags) = parser::tag_list(value)
            .map_err(|err| DKIMError::SignatureSyntaxError(err.to_string()))?;

        let mut version = None;
        let mut algorithm = None;
        let mut canon = None;
        let mut domain = None;
        let mut selector = None;
        let mut signed_headers = None;
        let mut signature_bytes = None;
        let mut body_hash_bytes = None;
        let mut body_limit = None;
        let mut timestamp = None;
        let mut expiration = None;

        for tag in &tags {
            match tag.name.as_str() {
                "v" => {
                    if tag.value != "1" {
                        return Err(DKIMError::IncompatibleVersion);
                    }
                    version = Some(1u8);
                }
                "a" => {
                    algorithm = Some(match tag.value.as_str() {
                        "rsa-sha1" => HashAlgo::RsaSha1,
                        "rsa-sha256" => HashAlgo::RsaSha256,
                        v => return Err(DKIMError::UnsupportedHashAlgorithm(v.to_owned())),
                    });
                }
                "b" => {
                    signature_bytes = Some(decode_base64_tag("b", &tag.value)?);
                }
                "bh" => {
                    body_hash_bytes = Some(decode_base64_tag("bh", &tag.value)?);
                }
                "c" => {
                    canon = Some(parse_canonicalization(&tag.value)?);
                }
                "d" => {
                    domain = Some(tag.value.clone());
                }
                "s" => {
                    selector = Some(tag.value.clone());
                }
                "h" => {
                    signed_headers = Some(
                        tag.value
                            .split(':')
                            .map(|h| h.trim().to_owned())
                            .filter(|h| !h.is_empty())
                            .collect::<Vec<String>>(),
                    );
                }
                "l" => {
                    body_limit = Some(
                        tag.value
                            .parse::<u64>()
                            .map_err(|err| DKIMError::InvalidBodyLimit(err.to_string()))?,
                    );
                }
                "t" => {
                    timestamp = Some(parse_epoch_tag("t", &tag.value)?);
                }
                "x" => {
                    expiration = Some(parse_epoch_tag("x", &tag.value)?);
                }
                // Accepted and ignored: AUID, query method, copied headers
                "i" | "q" | "z" => {}
                name => return Err(DKIMError::UnknownTag(name.to_owned())),
            }
        }

        let signature_bytes =
            signature_bytes.ok_or(DKIMError::SignatureMissingRequiredTag("b"))?;
        let body_hash_bytes =
            body_hash_bytes.ok_or(DKIMError::SignatureMissingRequiredTag("bh"))?;
        let domain = domain
            .filter(|d| !d.is_empty())
            .ok_or(DKIMError::SignatureMissingRequiredTag("d"))?;
        let selector = selector
            .filter(|s| !s.is_empty())
            .ok_or(DKIMError::SignatureMissingRequiredTag("s"))?;
        version.ok_or(DKIMError::SignatureMissingRequiredTag("v"))?;

        let signed_headers =
            signed_headers.ok_or(DKIMError::SignatureMissingRequiredTag("h"))?;
        if !signed_headers
            .iter()
            .any(|h| h.eq_ignore_ascii_case("from"))
        {
            return Err(DKIMError::FromFieldNotSigned);
        }

        let algorithm = algorithm.ok_or(DKIMError::SignatureMissingRequiredTag("a"))?;
        if body_hash_bytes.len() != algorithm.digest_len() {
            return Err(DKIMError::BadSignature(format!(
                "body hash is {} bytes, {} requires {}",
                body_hash_bytes.len(),
                algorithm.algo_name(),
                algorithm.digest_len()
            )));
        }

        // A signing time in the future is never acceptable; expiration gets
        // a drift allowance for skewed clocks.
        if let Some(t) = timestamp {
            let t = i64::try_from(t).unwrap_or(i64::MAX);
            if t > now {
                return Err(DKIMError::TimestampInFuture);
            }
        }
        if let Some(x) = expiration {
            let x = i64::try_from(x).unwrap_or(i64::MAX);
            if now > x.saturating_add(EXPIRATION_DRIFT_SECS) {
                return Err(DKIMError::SignatureExpired);
            }
        }

        let (header_canonicalization, body_canonicalization) =
            canon.unwrap_or((canonicalization::Type::Simple, canonicalization::Type::Simple));

        Ok(DKIMHeader {
            algorithm,
            header_canonicalization,
            body_canonicalization,
            domain,
            selector,
            signed_headers,
            signature_bytes,
            body_hash_bytes,
            body_limit,
            timestamp,
            expiration,
            raw_bytes: value.to_owned(),
        })
    }

    /// The raw header value as it appeared on the wire
    pub fn raw(&self) -> &str {
        &self.raw_bytes
    }

    /// DNS name queried for the public key record
    pub fn dns_query_name(&self) -> String {
        format!("{}.{}.{}", self.selector, crate::DNS_NAMESPACE, self.domain)
    }
}

fn decode_base64_tag(name: &str, value: &str) -> Result<Vec<u8>, DKIMError> {
    general_purpose::STANDARD.decode(value).map_err(|err| {
        DKIMError::SignatureSyntaxError(format!("failed to decode \"{}\" tag: {}", name, err))
    })
}

fn parse_epoch_tag(name: &str, value: &str) -> Result<u64, DKIMError> {
    value.parse::<u64>().map_err(|err| {
        DKIMError::SignatureSyntaxError(format!("invalid \"{}\" tag value: {}", name, err))
    })
}

/// Parses the canonicalization value (passed in c=) and returns the
/// canonicalization for (Header, Body). The single-algorithm form only sets
/// the header algorithm; the body side keeps its `simple` default.
fn parse_canonicalization(
    value: &str,
) -> Result<(canonicalization::Type, canonicalization::Type), DKIMError> {
    use canonicalization::Type::{Relaxed, Simple};
    match value {
        "simple/simple" => Ok((Simple, Simple)),
        "relaxed/simple" => Ok((Relaxed, Simple)),
        "simple/relaxed" => Ok((Simple, Relaxed)),
        "relaxed/relaxed" => Ok((Relaxed, Relaxed)),
        "relaxed" => Ok((Relaxed, Simple)),
        "simple" => Ok((Simple, Simple)),
        v => Err(DKIMError::UnsupportedCanonicalizationType(v.to_owned())),
    }
}
