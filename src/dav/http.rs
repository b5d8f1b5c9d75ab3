//! HTTP WebDAV client implementation
//!
//! One client per configured server, bound to a base URL and credential
//! set at construction. Basic credentials ride on every request; digest
//! mode answers the server's 401 challenge and retries once.

use bytes::Bytes;
use once_cell::sync::Lazy;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::{Method, StatusCode};
use tracing::{debug, trace};

use async_trait::async_trait;

use super::xml::parse_multistatus;
use super::{Auth, DavError, DavResponse, DavStat, FileContent, RemoteClient};

static PROPFIND: Lazy<Method> = Lazy::new(|| Method::from_bytes(b"PROPFIND").unwrap());
static MKCOL: Lazy<Method> = Lazy::new(|| Method::from_bytes(b"MKCOL").unwrap());
static MOVE: Lazy<Method> = Lazy::new(|| Method::from_bytes(b"MOVE").unwrap());
static COPY: Lazy<Method> = Lazy::new(|| Method::from_bytes(b"COPY").unwrap());

/// Characters percent-encoded in request paths. `/` stays literal.
const PATH_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'%');

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?><propfind xmlns="DAV:"><prop><displayname/><getlastmodified/><getcontentlength/><resourcetype/></prop></propfind>"#;

/// WebDAV client over reqwest.
pub struct DavClient {
    http: reqwest::Client,
    base_url: String,
    auth: Auth,
}

impl DavClient {
    /// Construct a client for `base_url` (`scheme://host`).
    pub fn new(base_url: &str, auth: Auth) -> Result<Self, DavError> {
        let http = reqwest::Client::builder().build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    fn url_for(&self, path: &str) -> String {
        format!(
            "{}{}",
            self.base_url,
            utf8_percent_encode(path, PATH_ENCODE_SET)
        )
    }

    fn request(
        &self,
        method: Method,
        url: &str,
        headers: &[(&'static str, String)],
        body: Option<Bytes>,
        authorization: Option<String>,
    ) -> reqwest::RequestBuilder {
        let mut req = self.http.request(method, url);

        if let Auth::Basic { username, password } = &self.auth {
            req = req.basic_auth(username, Some(password));
        }
        if let Some(value) = authorization {
            req = req.header(AUTHORIZATION, value);
        }
        for (name, value) in headers {
            req = req.header(*name, value);
        }
        if let Some(body) = body {
            req = req.body(body);
        }

        req
    }

    /// Send a request, answering a digest challenge once if configured.
    async fn send(
        &self,
        method: Method,
        path: &str,
        headers: Vec<(&'static str, String)>,
        body: Option<Bytes>,
    ) -> Result<reqwest::Response, DavError> {
        let url = self.url_for(path);

        let resp = self
            .request(method.clone(), &url, &headers, body.clone(), None)
            .send()
            .await?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            if let Auth::Digest { username, password } = &self.auth {
                let challenge = resp
                    .headers()
                    .get(WWW_AUTHENTICATE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);

                if let Some(challenge) = challenge {
                    trace!("answering digest challenge for {}", path);
                    // The digest uri field must match the request-target,
                    // which is the percent-encoded form embedded in `url`.
                    let encoded_path = &url[self.base_url.len()..];
                    let answer = digest_response(
                        &challenge,
                        username,
                        password,
                        encoded_path,
                        method.as_str(),
                    )?;
                    let retried = self
                        .request(method, &url, &headers, body, Some(answer))
                        .send()
                        .await?;
                    return Ok(retried);
                }
            }
        }

        Ok(resp)
    }

    async fn propfind(&self, path: &str, depth: &str) -> Result<Vec<DavStat>, DavError> {
        let resp = self
            .send(
                PROPFIND.clone(),
                path,
                vec![
                    ("Depth", depth.to_string()),
                    ("Content-Type", "application/xml".to_string()),
                ],
                Some(Bytes::from_static(PROPFIND_BODY.as_bytes())),
            )
            .await?;
        let resp = check(resp)?;

        let body = resp.text().await?;
        parse_multistatus(&body)
    }
}

#[async_trait]
impl RemoteClient for DavClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn stat(&self, path: &str) -> Result<DavResponse<DavStat>, DavError> {
        trace!("stat: {}", path);

        let entries = self.propfind(path, "0").await?;
        let stat = entries
            .into_iter()
            .next()
            .ok_or_else(|| DavError::InvalidResponse(format!("empty multistatus for {path}")))?;

        Ok(DavResponse::Raw(stat))
    }

    async fn get_directory_contents(
        &self,
        path: &str,
    ) -> Result<DavResponse<Vec<DavStat>>, DavError> {
        trace!("get_directory_contents: {}", path);

        let requested = normalize(path);
        let mut entries = self.propfind(path, "1").await?;
        // Depth 1 includes the collection itself; only children are wanted
        entries.retain(|e| normalize(&e.filename) != requested);

        Ok(DavResponse::Raw(entries))
    }

    async fn create_directory(&self, path: &str) -> Result<(), DavError> {
        debug!("create_directory: {}", path);

        let resp = self.send(MKCOL.clone(), path, Vec::new(), None).await?;
        check(resp)?;
        Ok(())
    }

    async fn get_file_contents(&self, path: &str) -> Result<DavResponse<FileContent>, DavError> {
        trace!("get_file_contents: {}", path);

        let resp = self.send(Method::GET, path, Vec::new(), None).await?;
        let resp = check(resp)?;
        let bytes = resp.bytes().await?;

        Ok(DavResponse::Raw(FileContent::Binary(bytes)))
    }

    async fn put_file_contents(
        &self,
        path: &str,
        data: &[u8],
        overwrite: bool,
    ) -> Result<(), DavError> {
        debug!("put_file_contents: {} ({} bytes)", path, data.len());

        let mut headers = Vec::new();
        if !overwrite {
            headers.push(("If-None-Match", "*".to_string()));
        }

        let resp = self
            .send(
                Method::PUT,
                path,
                headers,
                Some(Bytes::copy_from_slice(data)),
            )
            .await?;
        check(resp)?;
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> Result<(), DavError> {
        debug!("delete_file: {}", path);

        let resp = self.send(Method::DELETE, path, Vec::new(), None).await?;
        check(resp)?;
        Ok(())
    }

    async fn move_file(&self, from: &str, to: &str) -> Result<(), DavError> {
        debug!("move_file: {} -> {}", from, to);

        let headers = vec![
            ("Destination", self.url_for(to)),
            ("Overwrite", "T".to_string()),
        ];
        let resp = self.send(MOVE.clone(), from, headers, None).await?;
        check(resp)?;
        Ok(())
    }

    async fn copy_file(&self, from: &str, to: &str) -> Result<(), DavError> {
        debug!("copy_file: {} -> {}", from, to);

        let headers = vec![
            ("Destination", self.url_for(to)),
            ("Overwrite", "T".to_string()),
        ];
        let resp = self.send(COPY.clone(), from, headers, None).await?;
        check(resp)?;
        Ok(())
    }
}

/// Collection paths compare equal with or without a trailing slash.
fn normalize(path: &str) -> &str {
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    }
}

fn check(resp: reqwest::Response) -> Result<reqwest::Response, DavError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(DavError::Status {
            status: status.as_u16(),
            message: status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
        })
    }
}

fn digest_response(
    challenge: &str,
    username: &str,
    password: &str,
    uri: &str,
    method: &str,
) -> Result<String, DavError> {
    let mut prompt = digest_auth::parse(challenge)
        .map_err(|e| DavError::Message(format!("invalid digest challenge: {e}")))?;

    let context = digest_auth::AuthContext::new_with_method(
        username,
        password,
        uri,
        Option::<&[u8]>::None,
        digest_auth::HttpMethod::from(method),
    );

    let header = prompt
        .respond(&context)
        .map_err(|e| DavError::Message(format!("digest response failed: {e}")))?;

    Ok(header.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> DavClient {
        DavClient::new(base, Auth::None).unwrap()
    }

    #[test]
    fn test_url_building_encodes_path() {
        let c = client("https://example.com/");
        assert_eq!(c.base_url(), "https://example.com");
        assert_eq!(
            c.url_for("/docs/read me #1.txt"),
            "https://example.com/docs/read%20me%20%231.txt"
        );
        assert_eq!(c.url_for("/plain.txt"), "https://example.com/plain.txt");
    }

    #[test]
    fn test_normalize_trailing_slash() {
        assert_eq!(normalize("/docs/"), "/docs");
        assert_eq!(normalize("/docs"), "/docs");
        assert_eq!(normalize("/"), "/");
    }

    #[test]
    fn test_digest_challenge_response() {
        let challenge = r#"Digest realm="dav", nonce="abc123", qop="auth", algorithm=MD5"#;
        let header = digest_response(challenge, "alice", "secret", "/x", "PROPFIND").unwrap();
        assert!(header.starts_with("Digest"));
        assert!(header.contains(r#"username="alice""#));
        assert!(header.contains(r#"uri="/x""#));
    }

    #[test]
    fn test_digest_uri_matches_encoded_request_target() {
        let c = client("https://example.com");
        let url = c.url_for("/docs/read me.txt");
        let encoded_path = &url[c.base_url().len()..];
        assert_eq!(encoded_path, "/docs/read%20me.txt");

        let challenge = r#"Digest realm="dav", nonce="abc123", qop="auth", algorithm=MD5"#;
        let header = digest_response(challenge, "alice", "secret", encoded_path, "GET").unwrap();
        assert!(header.contains(r#"uri="/docs/read%20me.txt""#));
    }
}
