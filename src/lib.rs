// Implementation of DKIM verification: https://datatracker.ietf.org/doc/html/rfc6376
// plus the policy engine deciding whether outgoing mail gets signed.

use hickory_resolver::TokioAsyncResolver;

#[macro_use]
extern crate quick_error;

pub mod canonicalization;
pub mod dns;
mod errors;
mod hash;
mod header;
mod parsed_email;
mod parser;
pub mod policy;
mod public_key;
mod result;

pub use errors::DKIMError;
pub use hash::HashAlgo;
pub use header::DKIMHeader;
use header::DKIM_SIGNATURE_HEADER_NAME;
pub use parsed_email::ParsedEmail;
pub use parser::{tag_list as parse_tag_list, Tag};
pub use result::{DKIMResult, Verdict};

pub(crate) const DNS_NAMESPACE: &str = "_domainkey";

/// Cap on signatures examined per message, to bound the work a malicious
/// message filled with signatures can cause
const MAX_SIGNATURES: usize = 10;

/// Verify one parsed signature against the message.
/// <https://datatracker.ietf.org/doc/html/rfc6376#section-6.1>
async fn verify_email_header<'a>(
    resolver: &dyn dns::Lookup,
    dkim_header: &DKIMHeader,
    email: &'a ParsedEmail<'a>,
) -> Result<(), DKIMError> {
    let public_key =
        public_key::retrieve_public_key(resolver, &dkim_header.dns_query_name()).await?;

    // The signature requires From to be covered; a message without a From
    // header cannot reproduce the signed header set.
    if !email
        .get_headers()
        .iter()
        .any(|h| h.get_key_ref().eq_ignore_ascii_case("from"))
    {
        return Err(DKIMError::SignedHeaderMissing("from"));
    }

    let computed_body_hash = hash::compute_body_hash(
        dkim_header.body_canonicalization,
        dkim_header.body_limit,
        dkim_header.algorithm,
        email,
    );
    let computed_headers_hash = hash::compute_headers_hash(
        dkim_header.header_canonicalization,
        &dkim_header.signed_headers,
        dkim_header.algorithm,
        dkim_header,
        email,
    );
    tracing::debug!("body_hash {:?}", computed_body_hash);

    if computed_body_hash != dkim_header.body_hash_bytes {
        return Err(DKIMError::BodyHashDidNotVerify);
    }

    if dkim_header.signature_bytes.len() != public_key.signature_len() {
        return Err(DKIMError::BadSignature(format!(
            "signature is {} bytes, key requires {}",
            dkim_header.signature_bytes.len(),
            public_key.signature_len()
        )));
    }
    if !public_key.verify(
        dkim_header.algorithm,
        &computed_headers_hash,
        &dkim_header.signature_bytes,
    ) {
        return Err(DKIMError::SignatureDidNotVerify);
    }

    Ok(())
}

/// Run the DKIM verification on the email providing an existing resolver.
///
/// Every `DKIM-Signature` header yields one result, in header order.
pub async fn verify_email_with_resolver<'a>(
    email: &'a ParsedEmail<'a>,
    resolver: &dyn dns::Lookup,
) -> Vec<DKIMResult> {
    let mut results = vec![];

    for h in email.get_headers().iter() {
        if !h
            .get_key_ref()
            .eq_ignore_ascii_case(DKIM_SIGNATURE_HEADER_NAME)
        {
            continue;
        }
        if results.len() >= MAX_SIGNATURES {
            break;
        }

        let value = String::from_utf8_lossy(h.get_value_raw());
        let dkim_header = match DKIMHeader::parse(&value) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::debug!("unusable signature: {}", err);
                results.push(DKIMResult::fail(err, String::new()));
                continue;
            }
        };

        let domain = dkim_header.domain.clone();
        match verify_email_header(resolver, &dkim_header, email).await {
            Ok(()) => results.push(DKIMResult::pass(domain)),
            Err(err) => {
                tracing::debug!("failed to verify signature for {}: {}", domain, err);
                results.push(DKIMResult::fail(err, domain));
            }
        }
    }

    results
}

/// Run the DKIM verification on the email using the system DNS
/// configuration
pub async fn verify_email<'a>(email: &'a ParsedEmail<'a>) -> Result<Vec<DKIMResult>, DKIMError> {
    let resolver = TokioAsyncResolver::tokio_from_system_conf().map_err(|err| {
        DKIMError::UnknownInternalError(format!("failed to create DNS resolver: {}", err))
    })?;

    Ok(verify_email_with_resolver(email, &resolver).await)
}
