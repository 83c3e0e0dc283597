use crate::DKIMError;

/// A message under verification: the parsed header table plus the raw bytes
/// the body range is computed from.
pub struct ParsedEmail<'a> {
    mail: mailparse::ParsedMail<'a>,
    raw: &'a [u8],
    body_offset: usize,
}

impl<'a> ParsedEmail<'a> {
    pub fn parse_bytes(raw: &'a [u8]) -> Result<Self, DKIMError> {
        let mail = mailparse::parse_mail(raw)
            .map_err(|err| DKIMError::MessageParseError(err.to_string()))?;
        let body_offset = find_body_offset(raw).unwrap_or(raw.len());
        Ok(Self {
            mail,
            raw,
            body_offset,
        })
    }

    /// All headers of the message, in order, with folding preserved
    pub fn get_headers(&self) -> &[mailparse::MailHeader<'a>] {
        &self.mail.headers
    }

    /// The raw body: everything after the header-terminating blank line
    pub fn get_body_bytes(&self) -> &'a [u8] {
        &self.raw[self.body_offset..]
    }
}

/// Locate the first byte of the body.
///
/// The canonical terminator is an empty line (`CRLF CRLF`), but messages
/// with broken line endings exist; bare `LF LF`, bare `CR CR` and mixed
/// forms are accepted. A lone `LF CR` only terminates when the `CR` is not
/// the start of a proper `CRLF`.
pub(crate) fn find_body_offset(raw: &[u8]) -> Option<usize> {
    for i in 0..raw.len() {
        match raw[i] {
            b'\r' => {
                if raw[i..].starts_with(b"\r\n\r\n") {
                    return Some(i + 4);
                }
                if raw[i..].starts_with(b"\r\n\n") {
                    return Some(i + 3);
                }
                if raw[i..].starts_with(b"\r\r") {
                    return Some(i + 2);
                }
            }
            b'\n' => {
                if raw[i..].starts_with(b"\n\r\n") {
                    return Some(i + 3);
                }
                if raw[i..].starts_with(b"\n\n") {
                    return Some(i + 2);
                }
                if raw[i..].starts_with(b"\n\r") && raw.get(i + 2) != Some(&b'\n') {
                    return Some(i + 2);
                }
            }
            _ => {}
        }
    }
    None
}
