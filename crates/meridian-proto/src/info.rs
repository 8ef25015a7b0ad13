//! Text-based info protocol (§4.4, §6).
//!
//! Request: `key1\nkey2\n...`. Reply: `key\tvalue\n` lines. Any parse
//! failure here is fatal to the current tend iteration for the node that
//! produced it — callers are expected to propagate the `Err` up to the
//! per-node refresh step in `meridian-cluster`, not retry within this
//! crate.

use meridian_core::Error;
use std::collections::HashMap;

/// Build a request buffer asking for `keys`, in order.
pub fn build_request(keys: &[&str]) -> Vec<u8> {
    let mut out = String::new();
    for key in keys {
        out.push_str(key);
        out.push('\n');
    }
    out.into_bytes()
}

/// Parse a `key\tvalue\n`-per-line reply into a map.
pub fn parse_reply(buf: &[u8]) -> Result<HashMap<String, String>, Error> {
    let text = std::str::from_utf8(buf)
        .map_err(|e| Error::Protocol(format!("info reply is not valid UTF-8: {e}")))?;
    let mut map = HashMap::new();
    for line in text.split('\n') {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let mut parts = line.splitn(2, '\t');
        let key = parts.next().ok_or_else(|| Error::Protocol("missing info key".into()))?;
        let value = parts.next().unwrap_or("");
        map.insert(key.to_string(), value.to_string());
    }
    Ok(map)
}

/// One peer entry from the `peers-*` payload: `[nodeName, tlsName, [host, ...]]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerEntry {
    pub node_name: String,
    pub tls_name: Option<String>,
    pub hosts: Vec<(String, Option<u16>)>,
}

/// Parsed `peers-*` payload: `[gen,defaultPort,[ [nodeName,tlsName,[host,...]], ... ]]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeersPayload {
    pub generation: u64,
    pub default_port: u16,
    pub peers: Vec<PeerEntry>,
}

/// A tiny recursive-descent parser over the bracketed, comma-separated
/// peers grammar. No parser-combinator crate is pulled in for a grammar
/// this small (see `DESIGN.md`).
pub fn parse_peers(payload: &str) -> Result<PeersPayload, Error> {
    let mut chars = payload.trim().chars().peekable();
    expect(&mut chars, '[')?;
    let generation = take_until(&mut chars, ',')?
        .parse::<u64>()
        .map_err(|e| Error::Protocol(format!("invalid peers generation: {e}")))?;
    let default_port = take_until(&mut chars, ',')?
        .parse::<u16>()
        .map_err(|e| Error::Protocol(format!("invalid peers default port: {e}")))?;
    expect(&mut chars, '[')?;

    let mut peers = Vec::new();
    skip_ws(&mut chars);
    if chars.peek() != Some(&']') {
        loop {
            skip_ws(&mut chars);
            peers.push(parse_peer_entry(&mut chars)?);
            skip_ws(&mut chars);
            match chars.peek() {
                Some(',') => {
                    chars.next();
                }
                Some(']') => break,
                other => return Err(Error::Protocol(format!("unexpected char in peers list: {other:?}"))),
            }
        }
    }
    expect(&mut chars, ']')?;
    expect(&mut chars, ']')?;

    Ok(PeersPayload {
        generation,
        default_port,
        peers,
    })
}

fn parse_peer_entry(chars: &mut std::iter::Peekable<std::str::Chars>) -> Result<PeerEntry, Error> {
    expect(chars, '[')?;
    let node_name = take_until(chars, ',')?;
    let tls_raw = take_until(chars, ',')?;
    let tls_name = if tls_raw.is_empty() { None } else { Some(tls_raw) };
    expect(chars, '[')?;

    let mut hosts = Vec::new();
    skip_ws(chars);
    if chars.peek() != Some(&']') {
        loop {
            skip_ws(chars);
            hosts.push(parse_host_token(chars)?);
            skip_ws(chars);
            match chars.peek() {
                Some(',') => {
                    chars.next();
                }
                Some(']') => break,
                other => return Err(Error::Protocol(format!("unexpected char in host list: {other:?}"))),
            }
        }
    }
    expect(chars, ']')?;
    expect(chars, ']')?;

    Ok(PeerEntry {
        node_name,
        tls_name,
        hosts,
    })
}

/// Parse one `name[:port]` or `[ipv6]:port` host token.
fn parse_host_token(chars: &mut std::iter::Peekable<std::str::Chars>) -> Result<(String, Option<u16>), Error> {
    let mut token = String::new();
    if chars.peek() == Some(&'[') {
        // IPv6 literal, bracketed; consume through the closing bracket.
        token.push(chars.next().unwrap());
        for c in chars.by_ref() {
            token.push(c);
            if c == ']' {
                break;
            }
        }
        // Optional `:port` suffix.
        if chars.peek() == Some(&':') {
            chars.next();
            let port = take_while_digit(chars)?;
            return Ok((token, Some(port)));
        }
        return Ok((token, None));
    }
    while let Some(&c) = chars.peek() {
        if c == ',' || c == ']' {
            break;
        }
        token.push(c);
        chars.next();
    }
    if let Some((addr, port)) = token.rsplit_once(':') {
        if let Ok(port) = port.parse::<u16>() {
            return Ok((addr.to_string(), Some(port)));
        }
    }
    Ok((token, None))
}

fn take_while_digit(chars: &mut std::iter::Peekable<std::str::Chars>) -> Result<u16, Error> {
    let mut digits = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            digits.push(c);
            chars.next();
        } else {
            break;
        }
    }
    digits
        .parse::<u16>()
        .map_err(|e| Error::Protocol(format!("invalid port: {e}")))
}

fn take_until(chars: &mut std::iter::Peekable<std::str::Chars>, stop: char) -> Result<String, Error> {
    let mut out = String::new();
    loop {
        match chars.next() {
            Some(c) if c == stop => return Ok(out),
            Some(c) => out.push(c),
            None => return Err(Error::Protocol(format!("expected '{stop}' before end of input"))),
        }
    }
}

fn expect(chars: &mut std::iter::Peekable<std::str::Chars>, want: char) -> Result<(), Error> {
    skip_ws(chars);
    match chars.next() {
        Some(c) if c == want => Ok(()),
        other => Err(Error::Protocol(format!("expected '{want}', got {other:?}"))),
    }
}

fn skip_ws(chars: &mut std::iter::Peekable<std::str::Chars>) {
    while matches!(chars.peek(), Some(' ') | Some('\t')) {
        chars.next();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_request_joins_with_newlines() {
        let req = build_request(&["node", "partition-generation"]);
        assert_eq!(req, b"node\npartition-generation\n".to_vec());
    }

    #[test]
    fn parse_reply_splits_tab_separated_lines() {
        let buf = b"node\tBB9020011AC4202\npartition-generation\t7\n";
        let map = parse_reply(buf).unwrap();
        assert_eq!(map.get("node").unwrap(), "BB9020011AC4202");
        assert_eq!(map.get("partition-generation").unwrap(), "7");
    }

    #[test]
    fn parse_reply_handles_missing_trailing_newline() {
        let buf = b"node\tabc";
        let map = parse_reply(buf).unwrap();
        assert_eq!(map.get("node").unwrap(), "abc");
    }

    #[test]
    fn parse_reply_rejects_non_utf8() {
        let buf = [0xff, 0xfe, 0x00];
        assert!(parse_reply(&buf).is_err());
    }

    #[test]
    fn parses_peers_with_one_host_and_no_tls_name() {
        let payload = "[7,3000,[[BB9020011AC4202,,[10.0.0.1:3000]]]]";
        let parsed = parse_peers(payload).unwrap();
        assert_eq!(parsed.generation, 7);
        assert_eq!(parsed.default_port, 3000);
        assert_eq!(parsed.peers.len(), 1);
        assert_eq!(parsed.peers[0].node_name, "BB9020011AC4202");
        assert_eq!(parsed.peers[0].tls_name, None);
        assert_eq!(parsed.peers[0].hosts, vec![("10.0.0.1".to_string(), Some(3000))]);
    }

    #[test]
    fn parses_peers_with_tls_name_and_multiple_hosts() {
        let payload = "[3,4333,[[N2,node2.meridian.local,[10.0.0.2,10.0.0.2:4333]]]]";
        let parsed = parse_peers(payload).unwrap();
        assert_eq!(parsed.peers[0].tls_name.as_deref(), Some("node2.meridian.local"));
        assert_eq!(parsed.peers[0].hosts.len(), 2);
        assert_eq!(parsed.peers[0].hosts[0], ("10.0.0.2".to_string(), None));
    }

    #[test]
    fn parses_peers_with_ipv6_host() {
        let payload = "[1,3000,[[N1,,[[fe80::1]:3000]]]]";
        let parsed = parse_peers(payload).unwrap();
        assert_eq!(parsed.peers[0].hosts[0], ("[fe80::1]".to_string(), Some(3000)));
    }

    #[test]
    fn parses_empty_peer_list() {
        let payload = "[1,3000,[]]";
        let parsed = parse_peers(payload).unwrap();
        assert!(parsed.peers.is_empty());
    }

    #[test]
    fn parses_multiple_peers() {
        let payload = "[2,3000,[[N1,,[10.0.0.1:3000]],[N2,,[10.0.0.2:3000]]]]";
        let parsed = parse_peers(payload).unwrap();
        assert_eq!(parsed.peers.len(), 2);
        assert_eq!(parsed.peers[1].node_name, "N2");
    }

    #[test]
    fn malformed_payload_is_rejected() {
        assert!(parse_peers("not a peers payload").is_err());
    }
}
