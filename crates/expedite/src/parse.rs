//! Raw HTTP/1.1 response parsing
//!
//! The capture buffer records the response exactly as it would appear on the
//! wire: status line, header block, then a body that is either
//! length-delimited or chunk-framed. This module turns those raw bytes back
//! into a [`CachedResponse`], reassembling chunked bodies into one
//! contiguous payload.
//!
//! Parsing is synchronous and pure: the same bytes always produce the same
//! structured result.

use crate::entry::CachedResponse;
use crate::error::ParseError;
use bytes::Bytes;

/// Parse a captured raw response into its structured form.
pub fn parse_response(raw: &[u8]) -> Result<CachedResponse, ParseError> {
    let status_line_end = find(raw, b"\r\n").ok_or(ParseError::MissingStatusLine)?;
    if status_line_end == 0 {
        return Err(ParseError::MissingStatusLine);
    }
    let status = parse_status_line(&raw[..status_line_end])?;

    let head_end = find(raw, b"\r\n\r\n").ok_or(ParseError::UnterminatedHeaders)?;
    // An empty header block makes the blank line overlap the status line
    // terminator.
    let header_block = if head_end > status_line_end + 2 {
        &raw[status_line_end + 2..head_end]
    } else {
        &raw[..0]
    };
    let headers = parse_headers(header_block)?;

    let remainder = &raw[head_end + 4..];
    let entry = CachedResponse {
        status,
        headers,
        body: Bytes::new(),
    };

    let body = if is_chunked(&entry) {
        parse_chunked_body(remainder)?
    } else if let Some(declared) = entry.header("content-length") {
        let declared: usize = declared
            .trim()
            .parse()
            .map_err(|_| ParseError::InvalidContentLength(declared.to_string()))?;
        if remainder.len() < declared {
            return Err(ParseError::TruncatedBody {
                declared,
                captured: remainder.len(),
            });
        }
        Bytes::copy_from_slice(&remainder[..declared])
    } else {
        // No framing declared: the body runs to the end of the capture.
        Bytes::copy_from_slice(remainder)
    };

    Ok(CachedResponse { body, ..entry })
}

fn parse_status_line(line: &[u8]) -> Result<u16, ParseError> {
    let text = std::str::from_utf8(line)
        .map_err(|_| ParseError::MalformedStatusLine(String::from_utf8_lossy(line).into_owned()))?;
    let malformed = || ParseError::MalformedStatusLine(text.to_string());

    let mut parts = text.splitn(3, ' ');
    let version = parts.next().ok_or_else(malformed)?;
    if !version.starts_with("HTTP/") {
        return Err(malformed());
    }
    let status: u16 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(malformed)?;
    if !(100..600).contains(&status) {
        return Err(malformed());
    }
    Ok(status)
}

fn parse_headers(block: &[u8]) -> Result<Vec<(String, String)>, ParseError> {
    let mut headers = Vec::new();
    if block.is_empty() {
        return Ok(headers);
    }
    for line in block.split(|&b| b == b'\n') {
        let line = strip_cr(line);
        if line.is_empty() {
            continue;
        }
        let text = std::str::from_utf8(line)
            .map_err(|_| ParseError::MalformedHeader(String::from_utf8_lossy(line).into_owned()))?;
        let (name, value) = text
            .split_once(':')
            .ok_or_else(|| ParseError::MalformedHeader(text.to_string()))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ParseError::MalformedHeader(text.to_string()));
        }
        headers.push((name.to_string(), value.trim().to_string()));
    }
    Ok(headers)
}

fn parse_chunked_body(mut rest: &[u8]) -> Result<Bytes, ParseError> {
    let mut body = Vec::new();
    loop {
        let line_end = find(rest, b"\r\n").ok_or(ParseError::TruncatedChunk)?;
        let line = std::str::from_utf8(&rest[..line_end]).map_err(|_| {
            ParseError::MalformedChunkSize(String::from_utf8_lossy(&rest[..line_end]).into_owned())
        })?;
        // Chunk extensions after ';' are tolerated and ignored.
        let size_text = line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_text, 16)
            .map_err(|_| ParseError::MalformedChunkSize(line.to_string()))?;
        rest = &rest[line_end + 2..];

        if size == 0 {
            // Terminal chunk; any trailers that follow are dropped.
            return Ok(body.into());
        }
        if rest.len() < size {
            return Err(ParseError::TruncatedChunk);
        }
        body.extend_from_slice(&rest[..size]);
        rest = &rest[size..];
        if rest.starts_with(b"\r\n") {
            rest = &rest[2..];
        } else if !rest.is_empty() {
            return Err(ParseError::TruncatedChunk);
        }
    }
}

fn is_chunked(entry: &CachedResponse) -> bool {
    entry
        .header("transfer-encoding")
        .map(|v| v.to_ascii_lowercase().contains("chunked"))
        .unwrap_or(false)
}

fn strip_cr(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(b'\r') => &line[..line.len() - 1],
        _ => line,
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
