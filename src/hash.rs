use crate::canonicalization::{self, strip_signature_b_value};
use crate::header::DKIM_SIGNATURE_HEADER_NAME;
use crate::{DKIMHeader, ParsedEmail};
use sha1::{Digest as _, Sha1};
use sha2::Sha256;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgo {
    RsaSha1,
    RsaSha256,
}

impl HashAlgo {
    pub fn algo_name(&self) -> &'static str {
        match self {
            Self::RsaSha1 => "rsa-sha1",
            Self::RsaSha256 => "rsa-sha256",
        }
    }

    /// Length in bytes of the digest this algorithm produces
    pub fn digest_len(&self) -> usize {
        match self {
            Self::RsaSha1 => 20,
            Self::RsaSha256 => 32,
        }
    }
}

pub(crate) enum HashImpl {
    Sha1(Sha1),
    Sha256(Sha256),
    #[cfg(test)]
    Copy(Vec<u8>),
}

impl HashImpl {
    pub fn from_algo(algo: HashAlgo) -> Self {
        match algo {
            HashAlgo::RsaSha1 => Self::Sha1(Sha1::new()),
            HashAlgo::RsaSha256 => Self::Sha256(Sha256::new()),
        }
    }

    #[cfg(test)]
    pub fn copy_data() -> Self {
        Self::Copy(vec![])
    }

    pub fn hash(&mut self, bytes: &[u8]) {
        match self {
            Self::Sha1(hasher) => hasher.update(bytes),
            Self::Sha256(hasher) => hasher.update(bytes),
            #[cfg(test)]
            Self::Copy(data) => data.extend_from_slice(bytes),
        }
    }

    pub fn finalize_bytes(self) -> Vec<u8> {
        match self {
            Self::Sha1(hasher) => hasher.finalize().to_vec(),
            Self::Sha256(hasher) => hasher.finalize().to_vec(),
            #[cfg(test)]
            Self::Copy(data) => data,
        }
    }
}

/// Computes the hash of the message body.
/// <https://datatracker.ietf.org/doc/html/rfc6376#section-3.7>
///
/// When a body limit (`l=`) is present, only that many bytes of the raw
/// body are covered by the signature.
pub(crate) fn compute_body_hash<'a>(
    canonicalization_type: canonicalization::Type,
    limit: Option<u64>,
    hash_algo: HashAlgo,
    email: &'a ParsedEmail<'a>,
) -> Vec<u8> {
    let mut body = email.get_body_bytes();
    if let Some(limit) = limit {
        let end = usize::try_from(limit).unwrap_or(usize::MAX).min(body.len());
        body = &body[..end];
    }

    let mut hasher = HashImpl::from_algo(hash_algo);
    canonicalization_type.canon_body(body, &mut hasher);
    hasher.finalize_bytes()
}

/// Select the header occurrences covered by the signature.
///
/// A name listed several times consumes occurrences bottom-up
/// (<https://datatracker.ietf.org/doc/html/rfc6376#section-5.4.2>); names
/// with no occurrence left contribute nothing.
fn select_headers<'a>(
    signed_headers: &[String],
    email: &'a ParsedEmail<'a>,
) -> Vec<(String, &'a [u8])> {
    let email_headers = email.get_headers();

    // Positions of each signed name, oldest first. Every further listing
    // of the same name takes the next occurrence from the back.
    let mut remaining: HashMap<String, Vec<usize>> = HashMap::new();
    for name in signed_headers {
        let key = name.to_ascii_lowercase();
        remaining.entry(key).or_insert_with(|| {
            email_headers
                .iter()
                .enumerate()
                .filter(|(_, header)| header.get_key_ref().eq_ignore_ascii_case(name))
                .map(|(position, _)| position)
                .collect()
        });
    }

    let mut selected = Vec::with_capacity(signed_headers.len());
    for name in signed_headers {
        let occurrences = match remaining.get_mut(&name.to_ascii_lowercase()) {
            Some(occurrences) => occurrences,
            None => continue,
        };
        if let Some(position) = occurrences.pop() {
            let header = &email_headers[position];
            selected.push((header.get_key(), header.get_value_raw()));
        }
    }

    selected
}

/// Computes the hash over the signed headers, ending with the
/// `DKIM-Signature` header itself with its `b=` value elided.
pub(crate) fn compute_headers_hash<'a>(
    canonicalization_type: canonicalization::Type,
    signed_headers: &[String],
    hash_algo: HashAlgo,
    dkim_header: &DKIMHeader,
    email: &'a ParsedEmail<'a>,
) -> Vec<u8> {
    let mut input = Vec::new();

    for (key, value) in select_headers(signed_headers, email) {
        canonicalization_type.canon_header_into(&key, value, &mut input);
    }

    // The signature header covers itself, minus the value of b=
    {
        let raw = dkim_header.raw().trim_end_matches("\r\n");
        let value = strip_signature_b_value(raw);
        let mut canonicalized_value = vec![];
        canonicalization_type.canon_header_into(
            DKIM_SIGNATURE_HEADER_NAME,
            value.as_bytes(),
            &mut canonicalized_value,
        );

        // remove the trailing "\r\n" the header canonicalizer appends;
        // the final header before the hash is unterminated
        canonicalized_value.truncate(canonicalized_value.len() - 2);

        input.extend_from_slice(&canonicalized_value);
    }
    tracing::debug!("headers to hash: {:?}", String::from_utf8_lossy(&input));

    let mut hasher = HashImpl::from_algo(hash_algo);
    hasher.hash(&input);
    hasher.finalize_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose;
    use base64::Engine;

    fn dkim_header() -> DKIMHeader {
        DKIMHeader::parse("v=1; a=rsa-sha256; q=dns/txt; c=relaxed/relaxed; s=smtp; d=test.com; t=1641506955; h=content-type:to: subject:date:from:mime-version:sender; bh=PU2XIErWsXvhvt1W96ntPWZ2VImjVZ3vBY2T/A+wA3A=; b=PIO0A014nyntOGKdTdtvCJor9ZxvP1M3hoLeEh8HqZ+RvAyEKdAc7VOg+/g/OTaZgsmw6U sZCoN0YNVp+2o9nkaeUslsVz3M4I55HcZnarxl+fhplIMcJ/3s0nIhXL51MfGPRqPbB7/M Gjg9/07/2vFoid6Kitg6Z+CfoD2wlSRa8xDfmeyA2cHpeVuGQhGxu7BXuU8kGbeM4+weit Ql3t9zalhikEPI5Pr7dzYFrgWNOEO6w6rQfG7niKON1BimjdbJlGanC7cO4UL361hhXT4X iXLnC9TG39xKFPT/+4nkHy8pp6YvWkD3wKlBjwkYNm0JvKGwTskCMDeTwxXhAg==").unwrap()
    }

    fn test_email_bytes() -> Vec<u8> {
        r#"To: test@sauleau.com
Subject: subject
From: Sven Sauleau <sven@cloudflare.com>

Hello Alice
        "#
        .replace('\n', "\r\n")
        .into_bytes()
    }

    fn body_hash_b64(
        canonicalization_type: canonicalization::Type,
        limit: Option<u64>,
        hash_algo: HashAlgo,
        email: &ParsedEmail,
    ) -> String {
        general_purpose::STANDARD.encode(compute_body_hash(
            canonicalization_type,
            limit,
            hash_algo,
            email,
        ))
    }

    #[test]
    fn test_compute_body_hash_simple() {
        let terminated = ParsedEmail::parse_bytes(b"Subject: x\r\n\r\nHello\r\n").unwrap();
        let trailing_lines =
            ParsedEmail::parse_bytes(b"Subject: x\r\n\r\nHello\r\n\r\n\r\n").unwrap();
        let unterminated = ParsedEmail::parse_bytes(b"Subject: x\r\n\r\nHello").unwrap();
        let other = ParsedEmail::parse_bytes(b"Subject: x\r\n\r\nWorld\r\n").unwrap();

        let canonicalization_type = canonicalization::Type::Simple;
        for algo in [HashAlgo::RsaSha1, HashAlgo::RsaSha256] {
            let reference = compute_body_hash(canonicalization_type, None, algo, &terminated);
            // trailing empty lines are ignored
            assert_eq!(
                compute_body_hash(canonicalization_type, None, algo, &trailing_lines),
                reference
            );
            // a missing final CRLF is supplied
            assert_eq!(
                compute_body_hash(canonicalization_type, None, algo, &unterminated),
                reference
            );
            assert_ne!(
                compute_body_hash(canonicalization_type, None, algo, &other),
                reference
            );
        }
    }

    #[test]
    fn test_compute_body_hash_relaxed() {
        let raw = test_email_bytes();
        let email = ParsedEmail::parse_bytes(&raw).unwrap();

        let canonicalization_type = canonicalization::Type::Relaxed;
        assert_eq!(
            body_hash_b64(canonicalization_type, None, HashAlgo::RsaSha1, &email),
            "wpj48VhihzV7I31ZZZUp1UpTyyM="
        );
        assert_eq!(
            body_hash_b64(canonicalization_type, None, HashAlgo::RsaSha256, &email),
            "1bokzbYiRgXTKMQhrNhLJo1kjDDA1GILbpyTwyNa1uk=",
        )
    }

    #[test]
    fn test_compute_body_hash_limit() {
        // The limit applies to the raw body bytes, before canonicalization
        let raw = test_email_bytes();
        let email = ParsedEmail::parse_bytes(&raw).unwrap();

        let truncated = b"To: test@sauleau.com\r\n\r\nHello";
        let email_truncated = ParsedEmail::parse_bytes(truncated).unwrap();

        for algo in [HashAlgo::RsaSha1, HashAlgo::RsaSha256] {
            assert_eq!(
                compute_body_hash(canonicalization::Type::Relaxed, Some(5), algo, &email),
                compute_body_hash(canonicalization::Type::Relaxed, None, algo, &email_truncated),
            );
        }

        // A limit beyond the end of the body covers the whole body
        assert_eq!(
            compute_body_hash(
                canonicalization::Type::Simple,
                Some(1 << 32),
                HashAlgo::RsaSha256,
                &email
            ),
            compute_body_hash(canonicalization::Type::Simple, None, HashAlgo::RsaSha256, &email),
        );
    }

    #[test]
    fn test_compute_body_hash_empty_simple() {
        let email = ParsedEmail::parse_bytes(b"Subject: nothing\r\n\r\n").unwrap();

        assert_eq!(
            body_hash_b64(canonicalization::Type::Simple, None, HashAlgo::RsaSha1, &email),
            "uoq1oCgLlTqpdDX/iUbLy7J1Wic="
        );
        assert_eq!(
            body_hash_b64(
                canonicalization::Type::Simple,
                None,
                HashAlgo::RsaSha256,
                &email
            ),
            "frcCV1k9oG9oKj3dpUqdJg1PxRT2RSN/XKdLCPjaYaY="
        )
    }

    #[test]
    fn test_compute_body_hash_empty_relaxed() {
        // An empty body hashes as a lone CRLF under relaxed as well
        let email = ParsedEmail::parse_bytes(b"Subject: nothing\r\n\r\n").unwrap();

        assert_eq!(
            body_hash_b64(
                canonicalization::Type::Relaxed,
                None,
                HashAlgo::RsaSha1,
                &email
            ),
            "uoq1oCgLlTqpdDX/iUbLy7J1Wic="
        );
        assert_eq!(
            body_hash_b64(
                canonicalization::Type::Relaxed,
                None,
                HashAlgo::RsaSha256,
                &email
            ),
            "frcCV1k9oG9oKj3dpUqdJg1PxRT2RSN/XKdLCPjaYaY="
        )
    }

    fn signed(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_compute_headers_hash_simple() {
        let raw = test_email_bytes();
        let email = ParsedEmail::parse_bytes(&raw).unwrap();

        let canonicalization_type = canonicalization::Type::Simple;
        let headers = signed(&["To", "Subject"]);
        assert_eq!(
            compute_headers_hash(
                canonicalization_type,
                &headers,
                HashAlgo::RsaSha1,
                &dkim_header(),
                &email
            ),
            &[
                214, 155, 167, 0, 209, 70, 127, 126, 160, 53, 79, 106, 141, 240, 35, 121, 255, 190,
                166, 229
            ],
        );
        assert_eq!(
            compute_headers_hash(
                canonicalization_type,
                &headers,
                HashAlgo::RsaSha256,
                &dkim_header(),
                &email
            ),
            &[
                76, 143, 13, 248, 17, 209, 243, 111, 40, 96, 160, 242, 116, 86, 37, 249, 134, 253,
                196, 89, 6, 24, 157, 130, 142, 198, 27, 166, 127, 179, 72, 247
            ]
        )
    }

    #[test]
    fn test_compute_headers_hash_relaxed() {
        let raw = test_email_bytes();
        let email = ParsedEmail::parse_bytes(&raw).unwrap();

        let canonicalization_type = canonicalization::Type::Relaxed;
        let headers = signed(&["To", "Subject"]);
        assert_eq!(
            compute_headers_hash(
                canonicalization_type,
                &headers,
                HashAlgo::RsaSha1,
                &dkim_header(),
                &email
            ),
            &[
                14, 171, 230, 1, 77, 117, 47, 207, 243, 167, 179, 5, 150, 82, 154, 25, 125, 124,
                44, 164
            ]
        );
        assert_eq!(
            compute_headers_hash(
                canonicalization_type,
                &headers,
                HashAlgo::RsaSha256,
                &dkim_header(),
                &email
            ),
            &[
                45, 186, 211, 81, 49, 111, 18, 147, 180, 245, 207, 39, 9, 9, 118, 137, 248, 204,
                70, 214, 16, 98, 216, 111, 230, 130, 196, 3, 60, 201, 166, 224
            ]
        )
    }

    #[test]
    fn test_headers_hash_ignores_b_value() {
        // Mutating only the b= value must not change the headers hash
        let raw = test_email_bytes();
        let email = ParsedEmail::parse_bytes(&raw).unwrap();

        let base = dkim_header();
        let mutated = DKIMHeader::parse(&base.raw().replace(
            "PIO0A014nyntOGKdTdtvCJor9ZxvP1M3hoLeEh8HqZ+RvAyEKdAc7VOg+/g/OTaZgsmw6U",
            "XXX0A014nyntOGKdTdtvCJor9ZxvP1M3hoLeEh8HqZ+RvAyEKdAc7VOg+/g/OTaZgsmw6U",
        ))
        .unwrap();

        let headers = signed(&["To", "Subject"]);
        assert_eq!(
            compute_headers_hash(
                canonicalization::Type::Relaxed,
                &headers,
                HashAlgo::RsaSha256,
                &base,
                &email
            ),
            compute_headers_hash(
                canonicalization::Type::Relaxed,
                &headers,
                HashAlgo::RsaSha256,
                &mutated,
                &email
            ),
        );
    }

    #[test]
    fn test_select_headers() {
        let signed_headers = signed(&["from", "subject", "to", "from"]);
        let raw1 = b"from: biz\r\nfoo: bar\r\nfrom: baz\r\nsubject: boring\r\n\r\ntest";
        let email1 = ParsedEmail::parse_bytes(raw1).unwrap();

        let result1 = select_headers(&signed_headers, &email1);
        assert_eq!(
            result1,
            vec![
                ("from".to_owned(), &b"baz"[..]),
                ("subject".to_owned(), &b"boring"[..]),
                ("from".to_owned(), &b"biz"[..]),
            ]
        );

        let raw2 = b"From: biz\r\nFoo: bar\r\nSubject: Boring\r\n\r\ntest";
        let email2 = ParsedEmail::parse_bytes(raw2).unwrap();

        let result2 = select_headers(&signed_headers, &email2);
        assert_eq!(
            result2,
            vec![
                ("From".to_owned(), &b"biz"[..]),
                ("Subject".to_owned(), &b"Boring"[..]),
            ]
        );
    }

    #[test]
    fn test_select_headers_mixed_case_listing() {
        // differently-cased listings of one name share the occurrence pool
        let signed_headers = signed(&["From", "from"]);
        let email = ParsedEmail::parse_bytes(b"From: one\r\nFrom: two\r\n\r\ntest").unwrap();

        let result = select_headers(&signed_headers, &email);
        assert_eq!(
            result,
            vec![
                ("From".to_owned(), &b"two"[..]),
                ("From".to_owned(), &b"one"[..]),
            ]
        );
    }
}
