//! Percent-encoding shared by the parser and serializer.
//!
//! Encoding matches `encodeURIComponent`; decoding is its exact inverse and
//! rejects malformed escapes instead of passing them through.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

use crate::error::{Error, Result};

/// Characters left alone by `encodeURIComponent`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Query values additionally keep `$` (for `$external`) and `/` (for file paths).
const QUERY_VALUE: &AsciiSet = &COMPONENT.remove(b'$').remove(b'/');

pub(crate) fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}

pub(crate) fn encode_query_value(value: &str) -> String {
    utf8_percent_encode(value, QUERY_VALUE).to_string()
}

/// Decode one URI component.
///
/// `what` names the component in the error; the raw value is never echoed
/// since it may be a password.
pub(crate) fn decode(what: &str, raw: &str) -> Result<String> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes
                .get(i + 1..i + 3)
                .is_some_and(|pair| pair.iter().all(u8::is_ascii_hexdigit));
            if !valid {
                return Err(Error::parse(format!(
                    "{} contains an invalid percent-escape",
                    what
                )));
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    percent_decode_str(raw)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| Error::parse(format!("{} is not valid UTF-8 once decoded", what)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_matches_encode_uri_component() {
        assert_eq!(encode_component("@rlo"), "%40rlo");
        assert_eq!(encode_component("w@of"), "w%40of");
        assert_eq!(encode_component("My App"), "My%20App");
        assert_eq!(encode_component("a:b/c%d"), "a%3Ab%2Fc%25d");
        assert_eq!(encode_component("it's(ok)!~*"), "it's(ok)!~*");
    }

    #[test]
    fn test_query_value_keeps_dollar_and_slash() {
        assert_eq!(encode_query_value("$external"), "$external");
        assert_eq!(encode_query_value("/etc/ssl/ca.pem"), "/etc/ssl/ca.pem");
        assert_eq!(encode_query_value("a&b=c"), "a%26b%3Dc");
    }

    #[test]
    fn test_decode_inverse() {
        assert_eq!(decode("username", "%40rlo").unwrap(), "@rlo");
        assert_eq!(decode("password", "w%40of").unwrap(), "w@of");
    }

    #[test]
    fn test_decode_rejects_bad_escape_without_echo() {
        let err = decode("password", "secret%zz").unwrap_err();
        assert!(err.is_parse());
        assert!(!err.to_string().contains("secret"));
        assert!(decode("password", "trailing%4").is_err());
    }
}
