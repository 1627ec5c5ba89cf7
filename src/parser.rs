//! Deserialize data from the wire protocol.
//!
//! Response bodies are parsed with `nom` combinators over [`NomBytes`] so
//! that truncated input is rejected instead of read past. Array and string
//! length prefixes are validated before any allocation.

use bytes::Bytes;
use nom::{
    number::complete::{be_i16, be_i32},
    bytes::complete::take,
    multi::many_m_n,
    IResult,
};
use nombytes::NomBytes;
use num_traits::FromPrimitive;

use crate::constants::MAX_PROTOCOL_ARRAY_SIZE;
use crate::error::{Error, KafkaCode, Result};

/// Run a nom parser over a response payload, converting any parse failure
/// into [`Error::Parsing`] carrying the offending bytes.
pub fn run_parser<O, F>(payload: Bytes, f: F) -> Result<O>
where
    F: FnOnce(NomBytes) -> IResult<NomBytes, O>,
{
    let data = payload.clone();
    match f(NomBytes::new(payload)) {
        Ok((_, value)) => Ok(value),
        Err(_) => Err(Error::Parsing(data)),
    }
}

fn utf8(s: &NomBytes, raw: Bytes) -> std::result::Result<String, nom::Err<nom::error::Error<NomBytes>>> {
    std::str::from_utf8(&raw)
        .map(|v| v.to_string())
        .map_err(|_| {
            nom::Err::Failure(nom::error::Error::new(
                s.clone(),
                nom::error::ErrorKind::Verify,
            ))
        })
}

/// STRING: i16 length then UTF-8 bytes. Negative lengths are rejected.
pub fn parse_string(s: NomBytes) -> IResult<NomBytes, String> {
    let (s, length) = be_i16(s)?;
    if length < 0 {
        return Err(nom::Err::Failure(nom::error::Error::new(
            s,
            nom::error::ErrorKind::Verify,
        )));
    }
    let (s, raw) = take(length as usize)(s)?;
    let text = utf8(&s, raw.into_bytes())?;
    Ok((s, text))
}

/// NULLABLE_STRING: i16 length, -1 denotes null.
pub fn parse_nullable_string(s: NomBytes) -> IResult<NomBytes, Option<String>> {
    let (s, length) = be_i16(s)?;
    if length == -1 {
        return Ok((s, None));
    }
    if length < 0 {
        return Err(nom::Err::Failure(nom::error::Error::new(
            s,
            nom::error::ErrorKind::Verify,
        )));
    }
    let (s, raw) = take(length as usize)(s)?;
    let text = utf8(&s, raw.into_bytes())?;
    Ok((s, Some(text)))
}

/// BYTES: i32 length then raw bytes. Negative lengths are rejected.
pub fn parse_bytes(s: NomBytes) -> IResult<NomBytes, Bytes> {
    let (s, length) = be_i32(s)?;
    if length < 0 {
        return Err(nom::Err::Failure(nom::error::Error::new(
            s,
            nom::error::ErrorKind::Verify,
        )));
    }
    let (s, raw) = take(length as usize)(s)?;
    Ok((s, raw.into_bytes()))
}

/// NULLABLE_BYTES: i32 length, -1 denotes null.
pub fn parse_nullable_bytes(s: NomBytes) -> IResult<NomBytes, Option<Bytes>> {
    let (s, length) = be_i32(s)?;
    if length == -1 {
        return Ok((s, None));
    }
    if length < 0 {
        return Err(nom::Err::Failure(nom::error::Error::new(
            s,
            nom::error::ErrorKind::Verify,
        )));
    }
    let (s, raw) = take(length as usize)(s)?;
    Ok((s, Some(raw.into_bytes())))
}

/// ARRAY(T): i32 count then elements. A -1 count (null array) yields an
/// empty vector; counts above [`MAX_PROTOCOL_ARRAY_SIZE`] are rejected.
pub fn parse_array<O, E, F>(f: F) -> impl FnMut(NomBytes) -> IResult<NomBytes, Vec<O>, E>
where
    F: nom::Parser<NomBytes, O, E> + Copy,
    E: nom::error::ParseError<NomBytes>,
{
    move |input: NomBytes| {
        let (i, length) = be_i32(input)?;

        if length == -1 {
            return Ok((i, vec![]));
        }

        if !(0..=MAX_PROTOCOL_ARRAY_SIZE).contains(&length) {
            return Err(nom::Err::Failure(E::from_error_kind(
                i,
                nom::error::ErrorKind::TooLarge,
            )));
        }

        many_m_n(length as usize, length as usize, f)(i)
    }
}

/// Protocol error code: i16 mapped through [`KafkaCode`]; unrecognized
/// values collapse to [`KafkaCode::Unknown`].
pub fn parse_kafka_code(s: NomBytes) -> IResult<NomBytes, KafkaCode> {
    let (s, raw) = be_i16(s)?;
    Ok((s, KafkaCode::from_i16(raw).unwrap_or(KafkaCode::Unknown)))
}
