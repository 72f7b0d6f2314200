// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 weft contributors

//! Minimal URI encoding for addressable engine objects.
//!
//! Reply states are externally addressable as
//! `sender:replystate?id=<n>&retpath=<uri>` so a relaying collaborator can
//! resolve one without holding a live reference. Values are percent-encoded;
//! keys are plain identifiers.

use crate::error::{Error, Result};

const PREFIX: &str = "sender:";

fn escape_into(out: &mut String, value: &str) {
    for b in value.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b':' | b'/' => {
                out.push(b as char)
            }
            _ => {
                out.push('%');
                out.push_str(&format!("{:02X}", b));
            }
        }
    }
}

fn unescape(value: &str) -> Result<String> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| Error::InvalidUri(value.to_string()))?;
            out.push(hex);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| Error::InvalidUri(value.to_string()))
}

/// Encode `sender:<scheme>?k=v&...` with percent-encoded values.
pub fn encode(scheme: &str, pairs: &[(&str, &str)]) -> String {
    let mut uri = String::with_capacity(PREFIX.len() + scheme.len() + 16 * pairs.len());
    uri.push_str(PREFIX);
    uri.push_str(scheme);
    for (i, (key, value)) in pairs.iter().enumerate() {
        uri.push(if i == 0 { '?' } else { '&' });
        uri.push_str(key);
        uri.push('=');
        escape_into(&mut uri, value);
    }
    uri
}

/// Decode a `sender:` URI into its scheme and key/value pairs.
pub fn decode(uri: &str) -> Result<(String, Vec<(String, String)>)> {
    let rest = uri
        .strip_prefix(PREFIX)
        .ok_or_else(|| Error::InvalidUri(uri.to_string()))?;
    let (scheme, query) = match rest.split_once('?') {
        Some((s, q)) => (s, q),
        None => (rest, ""),
    };
    if scheme.is_empty() {
        return Err(Error::InvalidUri(uri.to_string()));
    }
    let mut pairs = Vec::new();
    if !query.is_empty() {
        for part in query.split('&') {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| Error::InvalidUri(uri.to_string()))?;
            pairs.push((key.to_string(), unescape(value)?));
        }
    }
    Ok((scheme.to_string(), pairs))
}

/// Look up one key in decoded pairs.
pub fn get<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let uri = encode("replystate", &[("id", "42"), ("retpath", "sender:udp?host=a")]);
        assert!(uri.starts_with("sender:replystate?id=42&retpath="));

        let (scheme, pairs) = decode(&uri).unwrap();
        assert_eq!(scheme, "replystate");
        assert_eq!(get(&pairs, "id"), Some("42"));
        assert_eq!(get(&pairs, "retpath"), Some("sender:udp?host=a"));
    }

    #[test]
    fn values_are_escaped() {
        let uri = encode("replystate", &[("retpath", "a&b=c d")]);
        assert!(!uri.contains("a&b=c d"));
        let (_, pairs) = decode(&uri).unwrap();
        assert_eq!(get(&pairs, "retpath"), Some("a&b=c d"));
    }

    #[test]
    fn missing_prefix_rejected() {
        assert!(decode("replystate?id=1").is_err());
    }

    #[test]
    fn bare_scheme_decodes() {
        let (scheme, pairs) = decode("sender:udp").unwrap();
        assert_eq!(scheme, "udp");
        assert!(pairs.is_empty());
    }

    #[test]
    fn truncated_escape_rejected() {
        assert!(decode("sender:replystate?id=%4").is_err());
    }
}
