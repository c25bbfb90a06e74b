use url::Url;

/// Joins `path` onto the path of `base`, keeping scheme, host and query.
///
/// Leading and trailing slashes on either side are collapsed so that
/// `join_url("http://h/callback/", "/t1")` yields `http://h/callback/t1`.
pub fn join_url(base: &str, path: &str) -> Result<String, url::ParseError> {
    let mut url = Url::parse(base)?;
    let joined = {
        let head = url.path().trim_end_matches('/');
        let tail = path.trim_start_matches('/');
        if tail.is_empty() {
            head.to_string()
        } else {
            format!("{}/{}", head, tail)
        }
    };
    url.set_path(&joined);
    Ok(url.to_string())
}

/// Returns the host component of an absolute URL.
pub fn extract_host(raw: &str) -> Result<String, url::ParseError> {
    let url = Url::parse(raw)?;
    url.host_str()
        .map(str::to_string)
        .ok_or(url::ParseError::EmptyHost)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url_with_path_prefix() {
        let joined = join_url("http://localhost:8080/callback", "t1").unwrap();
        assert_eq!(joined, "http://localhost:8080/callback/t1");
    }

    #[test]
    fn test_join_url_collapses_slashes() {
        let joined = join_url("https://gateway.example.com/", "/deposit").unwrap();
        assert_eq!(joined, "https://gateway.example.com/deposit");

        let joined = join_url("https://callback.example.com/hooks/", "/12345").unwrap();
        assert_eq!(joined, "https://callback.example.com/hooks/12345");
    }

    #[test]
    fn test_join_url_rejects_relative_base() {
        assert!(join_url("not a url", "x").is_err());
    }

    #[test]
    fn test_extract_host() {
        let host = extract_host("https://client.example.com:8443/notify?x=1").unwrap();
        assert_eq!(host, "client.example.com");
    }

    #[test]
    fn test_extract_host_invalid() {
        assert!(extract_host("/relative/path").is_err());
    }
}
