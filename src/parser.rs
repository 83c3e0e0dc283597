use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::alpha1;
use nom::combinator::opt;
use nom::multi::fold_many0;
use nom::sequence::{delimited, pair, preceded, terminated};
use nom::IResult;

/// A single `tag=value` pair from a DKIM tag list.
#[derive(Clone, Debug, PartialEq)]
pub struct Tag {
    /// Name of the tag (v, a, b, bh, ...)
    pub name: String,
    /// Value of the tag with folding whitespace removed
    pub value: String,
    /// Value of the tag as it appeared in the source text
    pub raw_value: String,
}

/// Parses a tag list as specified in
/// <https://datatracker.ietf.org/doc/html/rfc6376#section-3.2>.
/// tag-list  =  tag-spec *( ";" tag-spec ) [ ";" ]
///
/// The same grammar covers both the `DKIM-Signature` header value and the
/// DNS key record.
pub fn tag_list(input: &str) -> IResult<&str, Vec<Tag>> {
    let (input, start) = tag_spec(input)?;

    terminated(
        fold_many0(
            preceded(tag(";"), tag_spec),
            move || vec![start.clone()],
            |mut acc: Vec<Tag>, item| {
                acc.push(item);
                acc
            },
        ),
        opt(tag(";")),
    )(input)
}

/// tag-spec  =  [FWS] tag-name [FWS] "=" [FWS] tag-value [FWS]
fn tag_spec(input: &str) -> IResult<&str, Tag> {
    let (input, name) = delimited(opt(fws), tag_name, opt(fws))(input)?;
    let (input, _) = tag("=")(input)?;
    let (input, (value, raw_value)) = delimited(opt(fws), tag_value, opt(fws))(input)?;

    Ok((
        input,
        Tag {
            name: name.to_owned(),
            value,
            raw_value,
        },
    ))
}

/// tag-name  =  ALPHA *ALNUMPUNC
fn tag_name(input: &str) -> IResult<&str, &str> {
    alpha1(input)
}

fn is_valchar(c: char) -> bool {
    // VALCHAR = %x21-3A / %x3C-7E  (printable, except ";")
    ('!'..=':').contains(&c) || ('<'..='~').contains(&c)
}

/// tag-value =  [ tval *( 1*(WSP / FWS) tval ) ]
/// tval      =  1*VALCHAR
///
/// Returns the value both with folding whitespace stripped (the semantic
/// value) and as written in the source (needed to locate the tag's bytes
/// during canonicalization).
fn tag_value(input: &str) -> IResult<&str, (String, String)> {
    match opt(take_while1(is_valchar))(input)? {
        (input, Some(start)) => fold_many0(
            pair(fws, take_while1(is_valchar)),
            || (start.to_owned(), start.to_owned()),
            |(mut value, mut raw), (ws, chunk): (&str, &str)| {
                value += chunk;
                raw += ws;
                raw += chunk;
                (value, raw)
            },
        )(input),
        (input, None) => Ok((input, (String::new(), String::new()))),
    }
}

/// FWS is folding whitespace: multiple lines joined by CRLF followed by at
/// least one whitespace character.
fn fws(input: &str) -> IResult<&str, &str> {
    take_while1(|c| c == ' ' || c == '\t' || c == '\r' || c == '\n')(input)
}
