use crate::hash::HashAlgo;
use crate::{dns, parser, DKIMError};
use base64::alphabet;
use base64::engine::general_purpose::GeneralPurpose;
use base64::engine::{DecodePaddingMode, GeneralPurposeConfig};
use base64::Engine;
use rsa::traits::PublicKeyParts;
use rsa::{pkcs1, pkcs8, Pkcs1v15Sign, RsaPublicKey};
use sha1::Sha1;
use sha2::Sha256;

// Key records in the wild carry the p= value with or without padding
const KEY_DECODER: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// An RSA public key retrieved from a DKIM key record.
#[derive(Debug)]
pub(crate) struct DkimPublicKey {
    key: RsaPublicKey,
}

impl DkimPublicKey {
    /// Parse one TXT record into a public key.
    /// <https://datatracker.ietf.org/doc/html/rfc6376#section-3.6.1>
    ///
    /// Only the `p=` tag matters for verification; records carry arbitrary
    /// other tags (`v=`, `k=`, `t=`, ...) which are ignored. An empty `p=`
    /// means the key has been revoked.
    pub(crate) fn from_record(txt: &str) -> Result<Self, DKIMError> {
        let (_, tags) = parser::tag_list(txt)
            .map_err(|err| DKIMError::KeySyntaxError(err.to_string()))?;

        let tag = tags
            .iter()
            .find(|t| t.name == "p")
            .ok_or_else(|| DKIMError::KeySyntaxError("no p= tag in key record".to_owned()))?;
        if tag.value.is_empty() {
            return Err(DKIMError::KeyRevoked);
        }

        let bytes = KEY_DECODER.decode(&tag.value).map_err(|err| {
            DKIMError::KeySyntaxError(format!("failed to decode public key: {}", err))
        })?;

        let key = pkcs8::DecodePublicKey::from_public_key_der(&bytes)
            .or_else(|_| pkcs1::DecodeRsaPublicKey::from_pkcs1_der(&bytes))
            .map_err(|err| {
                DKIMError::KeySyntaxError(format!("failed to parse public key: {}", err))
            })?;

        Ok(Self { key })
    }

    /// Expected signature length in bytes (the RSA modulus size)
    pub fn signature_len(&self) -> usize {
        self.key.size()
    }

    /// Verify `signature` over the raw headers digest.
    /// <https://datatracker.ietf.org/doc/html/rfc6376#section-6.1.3> Step 4
    pub fn verify(&self, algo: HashAlgo, headers_hash: &[u8], signature: &[u8]) -> bool {
        let scheme = match algo {
            HashAlgo::RsaSha1 => Pkcs1v15Sign::new::<Sha1>(),
            HashAlgo::RsaSha256 => Pkcs1v15Sign::new::<Sha256>(),
        };
        self.key.verify(scheme, headers_hash, signature).is_ok()
    }
}

/// Fetch the key record for a signature and produce the public key.
/// <https://datatracker.ietf.org/doc/html/rfc6376#section-6.1.2>
///
/// TXT records are tried in reply order; the first record that yields a key
/// wins, dropping errors from earlier records. If no record parses, the
/// last error is surfaced.
pub(crate) async fn retrieve_public_key(
    resolver: &dyn dns::Lookup,
    dns_name: &str,
) -> Result<DkimPublicKey, DKIMError> {
    let records = resolver.lookup_txt(dns_name).await?;

    let mut last_error = DKIMError::NoKeyForSignature;
    for txt in &records {
        tracing::debug!("DKIM TXT {}: {:?}", dns_name, txt);
        match DkimPublicKey::from_record(txt) {
            Ok(key) => return Ok(key),
            Err(err) => {
                tracing::warn!("unusable key record at {}: {}", dns_name, err);
                last_error = err;
            }
        }
    }
    Err(last_error)
}
