//! Helpers for sanitizing data before it reaches logs and span attributes.
//!
//! Unsubscribe links usually embed a per-recipient token, so only the scheme,
//! host and path of a URL are ever logged.

use url::Url;

/// Strips userinfo, query and fragment from a URL.
///
/// - `https://x.com/u?id=1&token=abc` → `https://x.com/u?…`
/// - `https://user:pw@x.com/u` → `https://****@x.com/u`
/// - `mailto:off@x.com?subject=stop` → `mailto:off@x.com`
/// - anything unparsable → `<invalid url>`
pub fn redact_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return "<invalid url>".to_string();
    };

    let had_query = url.query().is_some_and(|q| !q.is_empty());
    let had_userinfo = !url.username().is_empty() || url.password().is_some();

    url.set_query(None);
    url.set_fragment(None);

    if url.scheme() == "mailto" {
        return url.to_string();
    }

    let mut out = url.to_string();
    if had_userinfo {
        // set_username cannot fail on http(s) URLs with a host
        let _ = url.set_password(None);
        let _ = url.set_username("");
        out = url.to_string();
        if let Some(scheme_end) = out.find("://") {
            out.insert_str(scheme_end + 3, "****@");
        }
    }
    if had_query {
        out.push_str("?…");
    }
    out
}

/// Returns the host of a URL, for grouping log lines by site.
pub fn url_host(raw: &str) -> String {
    Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_else(|| "<unknown>".to_string())
}
