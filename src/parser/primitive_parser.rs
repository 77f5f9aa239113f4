use encoding_rs::WINDOWS_1252;
use nom::bytes::complete::{tag, take_till1, take_until};
use nom::character::complete::{anychar, char, i32 as parse_i32_digits, space0, u8 as parse_u8_digits};
use nom::combinator::{map, opt, rest};
use nom::multi::many0;
use nom::number::complete::double;
use nom::sequence::{delimited, preceded, separated_pair};
use nom::{IResult, Parser};

use crate::parser::osu_types::Position;

/// Materialize properly encoded text, UTF-8 first then Windows-1252.
pub fn decode_text(i: &[u8]) -> String {
    let i = i.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(i);
    match std::str::from_utf8(i) {
        Ok(s) => s.to_string(),
        Err(e) => {
            log::debug!("Not UTF-8 ({e}), decoding as Windows-1252");
            let (cow, _encoding_used, had_errors) = WINDOWS_1252.decode(i);
            if had_errors {
                log::debug!("Windows-1252 decoding replaced invalid bytes");
            }
            cow.into_owned()
        }
    }
}

/// Parse float with optional leading blanks
pub fn parse_decimal(i: &str) -> IResult<&str, f64> {
    preceded(space0, double).parse(i)
}

/// Parse signed 32 with optional leading blanks
pub fn parse_int(i: &str) -> IResult<&str, i32> {
    preceded(space0, parse_i32_digits).parse(i)
}

/// Parse the `,` field separator
pub fn comma(i: &str) -> IResult<&str, char> {
    preceded(space0, char(',')).parse(i)
}

/// Parse `osu file format vN`
pub fn parse_format_header(i: &str) -> IResult<&str, u8> {
    preceded(
        (space0, tag("osu file format v")),
        parse_u8_digits,
    )
    .parse(i)
}

/// Parse `[Section]`, yields the section name
pub fn parse_section_header(i: &str) -> IResult<&str, &str> {
    map(
        delimited(char('['), take_until("]"), char(']')),
        str::trim,
    )
    .parse(i.trim())
}

/// Parse `Key: Value` or `Key:Value`, both sides trimmed
pub fn parse_key_value(i: &str) -> IResult<&str, (&str, &str)> {
    map(
        separated_pair(take_till1(|c: char| c == ':'), char(':'), rest),
        |(k, v): (&str, &str)| (k.trim(), v.trim()),
    )
    .parse(i)
}

/// Parse `x:y`
pub fn parse_position(i: &str) -> IResult<&str, Position> {
    map(
        separated_pair(parse_decimal, char(':'), parse_decimal),
        |(x, y)| Position::new(x, y),
    )
    .parse(i)
}

/// Parse a slider curve `B|1:2|3:4`, yields the curve letter and points
pub fn parse_curve(i: &str) -> IResult<&str, (char, Vec<Position>)> {
    (
        preceded(space0, anychar),
        many0(preceded(char('|'), parse_position)),
    )
        .parse(i)
}

/// Parse an optional trailing `,int` column
pub fn parse_optional_int(i: &str) -> IResult<&str, Option<i32>> {
    opt(preceded(comma, parse_int)).parse(i)
}

/// Next raw `,`-separated column, empty when the row is exhausted
pub fn next_column(i: &str) -> (&str, &str) {
    let i = i.strip_prefix(',').unwrap_or(i);
    match i.find(',') {
        Some(end) => (&i[end..], i[..end].trim()),
        None => ("", i.trim()),
    }
}

/// Strip quotes around event filenames
pub fn unquote(i: &str) -> &str {
    let i = i.trim();
    i.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(i)
}
