use crate::error::{FuzzError, RequestErrorKind};
use reqwest::Version;
use tracing::{error, instrument};

/// internal helper to validate http version
#[instrument(skip_all, level = "trace")]
pub(super) fn parse_version(version: &str) -> Result<Version, FuzzError> {
    match version.strip_prefix("HTTP/") {
        Some("0.9") => Ok(Version::HTTP_09),
        Some("1.0") => Ok(Version::HTTP_10),
        Some("1.1") => Ok(Version::HTTP_11),
        Some("2" | "2.0") => Ok(Version::HTTP_2),
        Some("3" | "3.0") => Ok(Version::HTTP_3),
        _ => {
            error!(%version, "failed to parse http version; must be a valid http version when using a reqwest client");

            Err(FuzzError::InvalidVersionError {
                version: version.to_string(),
            })
        }
    }
}

/// internal helper to convert [`reqwest::Error`] to [`FuzzError`]
#[allow(clippy::needless_pass_by_value)]
#[instrument(skip_all, level = "trace")]
pub(super) fn reqwest_to_fuzz_error(source: reqwest::Error) -> FuzzError {
    let status = source.status().map(|status_code| status_code.as_u16());

    let kind = if source.is_body() {
        RequestErrorKind::Body(status)
    } else if source.is_connect() {
        // connect is more specific than request and both can be true at
        // the same time; keep it ahead of is_request
        RequestErrorKind::Connect(status)
    } else if source.is_decode() {
        RequestErrorKind::Decode(status)
    } else if source.is_redirect() {
        RequestErrorKind::Redirect(status)
    } else if source.is_timeout() {
        // same ordering constraint as connect
        RequestErrorKind::Timeout(status)
    } else if source.is_request() {
        RequestErrorKind::Request(status)
    } else {
        RequestErrorKind::Unknown
    };

    error!(?kind, "error occurred while sending request: {}", source);

    FuzzError::RequestError {
        kind,
        message: source.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// parsed versions return correct values
    #[test]
    fn parsed_versions_are_correct() {
        let versions = ["HTTP/0.9", "HTTP/1.0", "HTTP/1.1", "HTTP/2", "HTTP/2.0", "HTTP/3.0"];

        for version in versions {
            assert!(parse_version(version).is_ok());
        }

        assert_eq!(parse_version("HTTP/1.1").ok(), Some(Version::HTTP_11));
        assert!(parse_version("not valid").is_err());
        assert!(parse_version("HTTP/1.2").is_err());
    }
}
