//! Mount URIs of the form `webdav://<identifier>[/path]`
//!
//! The authority component names a configured server and doubles as the
//! client registry key; the path component is handed to the WebDAV client
//! verbatim.

use std::fmt;
use std::str::FromStr;

use crate::error::FsError;
use crate::SCHEME;

/// Parsed mount URI: an authority (server identifier) plus a resource path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MountUri {
    authority: String,
    path: String,
}

impl MountUri {
    /// Build a URI from an authority and a path (normalized to lead with `/`).
    pub fn new(authority: impl Into<String>, path: impl Into<String>) -> Self {
        let path = path.into();
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        Self {
            authority: authority.into(),
            path,
        }
    }

    /// The server identifier.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// The resource path, always leading with `/`.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl FromStr for MountUri {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let prefix = format!("{SCHEME}://");
        let rest = s
            .strip_prefix(&prefix)
            .ok_or_else(|| FsError::InvalidUri(format!("expected {prefix} prefix: {s}")))?;

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };

        if authority.is_empty() {
            return Err(FsError::InvalidUri(format!("missing authority: {s}")));
        }

        Ok(Self::new(authority, path))
    }
}

impl fmt::Display for MountUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path == "/" {
            write!(f, "{SCHEME}://{}", self.authority)
        } else {
            write!(f, "{SCHEME}://{}{}", self.authority, self.path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_uri() {
        let uri: MountUri = "webdav://srv1/docs/readme.txt".parse().unwrap();
        assert_eq!(uri.authority(), "srv1");
        assert_eq!(uri.path(), "/docs/readme.txt");
    }

    #[test]
    fn test_parse_authority_only() {
        let uri: MountUri = "webdav://srv1".parse().unwrap();
        assert_eq!(uri.authority(), "srv1");
        assert_eq!(uri.path(), "/");
    }

    #[test]
    fn test_rejects_other_schemes() {
        assert!("https://srv1/x".parse::<MountUri>().is_err());
        assert!("webdav:///x".parse::<MountUri>().is_err());
    }

    #[test]
    fn test_display_round_trip() {
        let uri = MountUri::new("srv1", "/a/b");
        assert_eq!(uri.to_string(), "webdav://srv1/a/b");
        assert_eq!(MountUri::new("srv1", "/").to_string(), "webdav://srv1");
    }

    #[test]
    fn test_new_normalizes_leading_slash() {
        let uri = MountUri::new("srv1", "x/y");
        assert_eq!(uri.authority(), "srv1");
        assert_eq!(uri.path(), "/x/y");
    }
}
