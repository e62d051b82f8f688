//! Render a request as an equivalent `curl` command line.

use crate::field::RequestInfo;

/// Build `curl -X 'METHOD' [-d 'BODY'] [-H 'Name: value']... 'URL'`.
///
/// Headers are emitted in name order. The URL is made absolute from the
/// request URI, falling back to the `Host` header and `http`.
pub(crate) fn command(info: &RequestInfo, body: Option<&[u8]>) -> String {
    let mut parts = vec!["curl".to_string(), "-X".to_string(), quote(info.method.as_str())];

    if let Some(body) = body.filter(|b| !b.is_empty()) {
        parts.push("-d".to_string());
        parts.push(quote(&String::from_utf8_lossy(body)));
    }

    let mut headers = info
        .headers
        .iter()
        .map(|(name, value)| {
            format!("{}: {}", name, String::from_utf8_lossy(value.as_bytes()))
        })
        .collect::<Vec<_>>();
    headers.sort();
    for header in headers {
        parts.push("-H".to_string());
        parts.push(quote(&header));
    }

    parts.push(quote(&absolute_url(info)));
    parts.join(" ")
}

fn absolute_url(info: &RequestInfo) -> String {
    let scheme = info.uri.scheme_str().unwrap_or("http");
    let authority = info
        .uri
        .authority()
        .map(|a| a.to_string())
        .or_else(|| {
            info.headers
                .get(http::header::HOST)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "localhost".to_string());
    let target = info
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    format!("{}://{}{}", scheme, authority, target)
}

/// Single-quote for a POSIX shell
fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
