pub(super) fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
}

pub(super) fn host_header_value(parsed: &url::Url) -> Option<String> {
    let host = parsed.host_str()?;
    match parsed.port() {
        Some(port) => Some(format!("{host}:{port}")),
        None => Some(host.to_string()),
    }
}

pub(super) fn parse_http_url(raw: &str) -> super::Result<url::Url> {
    let parsed = url::Url::parse(raw).map_err(|_| super::Error::InvalidUrl(raw.to_string()))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(super::Error::UnsupportedScheme(raw.to_string()));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn host_header_keeps_explicit_port() {
        let u = url::Url::parse("http://localhost:8000/user-register").unwrap();
        assert_eq!(host_header_value(&u).as_deref(), Some("localhost:8000"));

        // `Url::port` is None for the scheme default.
        let u = url::Url::parse("http://example.com:80/").unwrap();
        assert_eq!(host_header_value(&u).as_deref(), Some("example.com"));
    }

    #[test]
    fn parse_http_url_rejects_other_schemes() {
        assert!(matches!(
            parse_http_url("ftp://example.com/"),
            Err(super::super::Error::UnsupportedScheme(_))
        ));
        assert!(matches!(
            parse_http_url("not a url"),
            Err(super::super::Error::InvalidUrl(_))
        ));
        assert!(parse_http_url("https://example.com/x").is_ok());
    }
}
