use crate::DKIMError;
use futures::future::BoxFuture;
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::TokioAsyncResolver;

/// A trait for entities that perform DNS resolution.
///
/// Each returned TXT record has its character-strings concatenated, as
/// required before tag-list parsing. Cancellation is expressed by dropping
/// the returned future: a dropped lookup can never complete, so nothing can
/// observe a verification context that no longer exists.
pub trait Lookup: Sync + Send {
    fn lookup_txt<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Vec<String>, DKIMError>>;
}

/// Split resolver failures into "the record does not exist" (a permanent
/// condition covering NXDOMAIN and NODATA) and everything that is worth
/// retrying the message for.
fn classify_resolve_error(err: ResolveError) -> DKIMError {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { .. } => DKIMError::NoKeyForSignature,
        ResolveErrorKind::Timeout => {
            DKIMError::KeyUnavailable(format!("DNS query timed out: {}", err))
        }
        _ => DKIMError::KeyUnavailable(format!("failed to query DNS: {}", err)),
    }
}

impl Lookup for TokioAsyncResolver {
    fn lookup_txt<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Vec<String>, DKIMError>> {
        Box::pin(async move {
            let reply = self
                .txt_lookup(name)
                .await
                .map_err(classify_resolve_error)?;

            let mut records = Vec::new();
            for txt in reply.iter() {
                // A record split into several character-strings is one
                // logical string (RFC 6376 section 3.6.2.2)
                let mut record = String::new();
                for chunk in txt.txt_data() {
                    record.push_str(&String::from_utf8_lossy(chunk));
                }
                records.push(record);
            }
            Ok(records)
        })
    }
}
