/// Query parameters that only track where a click came from.
const TRACKING_PARAMS: &[&str] = &["ref", "fbclid", "gclid", "mc_cid", "mc_eid"];

/// Normalize a URL for duplicate detection.
///
/// Drops the scheme, a `www.` prefix, a trailing `/`, the fragment and
/// tracking query params; the remaining params are sorted. Host case is
/// folded by the parser, path case is kept.
///
/// Returns `host/path[?sorted_params]`, or `None` if `raw` is not an
/// absolute URL.
pub fn normalize_url(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw.trim()).ok()?;

    let host = parsed.host_str()?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    let path = parsed.path().trim_end_matches('/');

    let mut params: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !key.starts_with("utm_") && !TRACKING_PARAMS.contains(&key.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    params.sort();

    let mut normalized = format!("{host}{path}");
    for (i, (k, v)) in params.iter().enumerate() {
        normalized.push(if i == 0 { '?' } else { '&' });
        normalized.push_str(k);
        if !v.is_empty() {
            normalized.push('=');
            normalized.push_str(v);
        }
    }

    Some(normalized)
}

/// Key under which a URL is indexed in the ledger.
///
/// Falls back to the trimmed raw string for anything [`normalize_url`]
/// can't parse, so such URLs still dedup by exact match.
pub fn url_key(raw: &str) -> String {
    normalize_url(raw).unwrap_or_else(|| raw.trim().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scheme_www_and_trailing_slash() {
        assert_eq!(
            normalize_url("https://www.techcrunch.com/2025/01/02/story/"),
            Some("techcrunch.com/2025/01/02/story".into())
        );
        assert_eq!(
            normalize_url("http://techcrunch.com/2025/01/02/story"),
            Some("techcrunch.com/2025/01/02/story".into())
        );
    }

    #[test]
    fn folds_host_case_but_keeps_path_case() {
        assert_eq!(
            normalize_url("https://TechCrunch.COM/Story"),
            Some("techcrunch.com/Story".into())
        );
    }

    #[test]
    fn drops_fragment_and_tracking_params() {
        assert_eq!(
            normalize_url("https://example.com/a?utm_source=x&id=42#comments"),
            Some("example.com/a?id=42".into())
        );
        assert_eq!(
            normalize_url("https://example.com/a?fbclid=1&gclid=2&ref=feed"),
            Some("example.com/a".into())
        );
    }

    #[test]
    fn sorts_params() {
        assert_eq!(
            normalize_url("https://example.com/a?z=1&a=2&flag"),
            Some("example.com/a?a=2&flag&z=1".into())
        );
    }

    #[test]
    fn unparseable_url_keys_by_raw_text() {
        assert_eq!(normalize_url("not a url"), None);
        assert_eq!(url_key(" not a url "), "not a url");
    }
}
