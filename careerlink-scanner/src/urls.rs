use url::Url;

/// Normalize a raw input cell into an absolute URL string.
///
/// The value is trimmed and `https://` is prepended when no http(s) scheme is
/// present. Returns `None` for blank cells and anything that does not parse
/// into a URL with a host. The returned string keeps the caller's spelling
/// (no trailing slash is added), so it can be echoed back in output tables.
pub fn normalize_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let lower = trimmed.to_ascii_lowercase();
    let candidate = if lower.starts_with("http://") || lower.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let parsed = Url::parse(&candidate).ok()?;
    match parsed.host_str() {
        Some(host) if !host.is_empty() => Some(candidate),
        _ => None,
    }
}

/// Host of `url`, lower-cased, with a single leading `www.` or `m.` removed.
///
/// `www.acme.com`, `m.acme.com` and `acme.com` all map to `acme.com`.
pub fn domain_key(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    Some(strip_host_prefix(&host).to_string())
}

/// Same as [`domain_key`] for a string URL. Unparseable input yields `None`.
pub fn domain_key_str(url: &str) -> Option<String> {
    Url::parse(url).ok().as_ref().and_then(domain_key)
}

fn strip_host_prefix(host: &str) -> &str {
    host.strip_prefix("www.")
        .or_else(|| host.strip_prefix("m."))
        .unwrap_or(host)
}

/// Scheme + host (+ explicit port) of `url`, without a trailing slash.
///
/// The host is kept as given apart from case: `www.acme.com` may be the only
/// name that serves, so it is not folded into [`domain_key`] here.
pub fn base_origin(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    let origin = match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    };
    Some(origin)
}

/// True when `domain` equals `key` or is a parent domain of it.
pub fn matches_domain(key: &str, domain: &str) -> bool {
    let domain = strip_host_prefix(domain.trim().trim_end_matches('.'));
    if domain.is_empty() {
        return false;
    }
    let domain = domain.to_ascii_lowercase();
    key == domain || key.ends_with(&format!(".{}", domain))
}
