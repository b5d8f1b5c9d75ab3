//! PROPFIND multistatus parsing
//!
//! Only the properties the provider needs are extracted: href,
//! displayname, getlastmodified, getcontentlength and resourcetype.
//! Namespace prefixes vary wildly between servers, so matching is done
//! on local names. Properties arrive grouped in `<propstat>` blocks, one
//! per status; only blocks with a 2xx status (or none) contribute.

use percent_encoding::percent_decode_str;
use quick_xml::events::Event;
use quick_xml::Reader;

use super::{DavError, DavStat};

#[derive(Clone, Copy, PartialEq)]
enum Field {
    None,
    Href,
    DisplayName,
    LastMod,
    ContentLength,
    Status,
}

/// Properties collected within one `<propstat>` block.
#[derive(Default)]
struct PropBlock {
    displayname: String,
    lastmod: String,
    content_length: String,
    is_collection: bool,
    status: String,
}

impl PropBlock {
    /// A block counts unless its status line carries a non-2xx code.
    /// Servers report properties they could not find under 404 blocks;
    /// those must not merge into the result.
    fn is_ok(&self) -> bool {
        match self.status.split_whitespace().nth(1) {
            Some(code) => code.starts_with('2'),
            None => true,
        }
    }
}

#[derive(Default)]
struct PartialStat {
    href: String,
    displayname: String,
    lastmod: String,
    content_length: String,
    is_collection: bool,
}

impl PartialStat {
    fn merge(&mut self, block: PropBlock) {
        self.displayname.push_str(&block.displayname);
        self.lastmod.push_str(&block.lastmod);
        self.content_length.push_str(&block.content_length);
        self.is_collection |= block.is_collection;
    }

    fn into_stat(self) -> DavStat {
        let filename = href_to_path(&self.href);

        let basename = if self.displayname.is_empty() {
            filename
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .unwrap_or("")
                .to_string()
        } else {
            self.displayname
        };

        DavStat {
            filename,
            basename,
            lastmod: self.lastmod,
            size: self.content_length.parse().unwrap_or(0),
            resource_type: if self.is_collection {
                "directory".to_string()
            } else {
                "file".to_string()
            },
        }
    }
}

/// Reduce an href to a decoded server-absolute path.
///
/// Servers may answer with either a path (`/docs/a%20b.txt`) or a full
/// URL; trailing slashes on collections are dropped (root stays `/`).
fn href_to_path(href: &str) -> String {
    let path = match href.find("://") {
        Some(idx) => {
            let after_scheme = &href[idx + 3..];
            match after_scheme.find('/') {
                Some(slash) => &after_scheme[slash..],
                None => "/",
            }
        }
        None => href,
    };

    let decoded = percent_decode_str(path).decode_utf8_lossy().into_owned();
    if decoded.len() > 1 && decoded.ends_with('/') {
        decoded[..decoded.len() - 1].to_string()
    } else {
        decoded
    }
}

/// Parse a 207 multistatus body into one `DavStat` per `<response>`.
pub(crate) fn parse_multistatus(body: &str) -> Result<Vec<DavStat>, DavError> {
    // Whitespace between elements arrives as text events with no field
    // active and falls through; no trimming configuration needed.
    let mut reader = Reader::from_str(body);

    let mut entries = Vec::new();
    let mut current: Option<PartialStat> = None;
    let mut block: Option<PropBlock> = None;
    let mut field = Field::None;
    let mut in_resourcetype = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"response" => current = Some(PartialStat::default()),
                b"propstat" => block = Some(PropBlock::default()),
                b"href" => field = Field::Href,
                b"displayname" => field = Field::DisplayName,
                b"getlastmodified" => field = Field::LastMod,
                b"getcontentlength" => field = Field::ContentLength,
                b"status" => field = Field::Status,
                b"resourcetype" => in_resourcetype = true,
                b"collection" if in_resourcetype => {
                    mark_collection(&mut block, &mut current);
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if in_resourcetype && e.local_name().as_ref() == b"collection" {
                    mark_collection(&mut block, &mut current);
                }
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| DavError::InvalidResponse(e.to_string()))?;
                match field {
                    Field::Href => {
                        if let Some(cur) = current.as_mut() {
                            cur.href.push_str(&text);
                        }
                    }
                    Field::DisplayName => {
                        if let Some(b) = block.as_mut() {
                            b.displayname.push_str(&text);
                        }
                    }
                    Field::LastMod => {
                        if let Some(b) = block.as_mut() {
                            b.lastmod.push_str(&text);
                        }
                    }
                    Field::ContentLength => {
                        if let Some(b) = block.as_mut() {
                            b.content_length.push_str(&text);
                        }
                    }
                    Field::Status => {
                        if let Some(b) = block.as_mut() {
                            b.status.push_str(&text);
                        }
                    }
                    Field::None => {}
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"response" => {
                    if let Some(cur) = current.take() {
                        entries.push(cur.into_stat());
                    }
                }
                b"propstat" => {
                    if let (Some(b), Some(cur)) = (block.take(), current.as_mut()) {
                        if b.is_ok() {
                            cur.merge(b);
                        }
                    }
                }
                b"resourcetype" => in_resourcetype = false,
                b"href" | b"displayname" | b"getlastmodified" | b"getcontentlength"
                | b"status" => field = Field::None,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(DavError::InvalidResponse(e.to_string())),
            Ok(_) => {}
        }
    }

    Ok(entries)
}

fn mark_collection(block: &mut Option<PropBlock>, current: &mut Option<PartialStat>) {
    if let Some(b) = block.as_mut() {
        b.is_collection = true;
    } else if let Some(cur) = current.as_mut() {
        // Lenient with servers that skip the propstat wrapper
        cur.is_collection = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>/docs/</d:href>
    <d:propstat>
      <d:prop>
        <d:displayname>docs</d:displayname>
        <d:getlastmodified>Mon, 01 Jan 2024 00:00:00 GMT</d:getlastmodified>
        <d:resourcetype><d:collection/></d:resourcetype>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/docs/read%20me.txt</d:href>
    <d:propstat>
      <d:prop>
        <d:displayname>read me.txt</d:displayname>
        <d:getlastmodified>Mon, 01 Jan 2024 00:00:00 GMT</d:getlastmodified>
        <d:getcontentlength>42</d:getcontentlength>
        <d:resourcetype/>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

    #[test]
    fn test_parses_files_and_collections() {
        let entries = parse_multistatus(LISTING).unwrap();
        assert_eq!(entries.len(), 2);

        assert_eq!(entries[0].filename, "/docs");
        assert_eq!(entries[0].resource_type, "directory");
        assert_eq!(entries[0].size, 0);

        assert_eq!(entries[1].filename, "/docs/read me.txt");
        assert_eq!(entries[1].basename, "read me.txt");
        assert_eq!(entries[1].resource_type, "file");
        assert_eq!(entries[1].size, 42);
        assert_eq!(entries[1].lastmod, "Mon, 01 Jan 2024 00:00:00 GMT");
    }

    #[test]
    fn test_basename_falls_back_to_href_segment() {
        let body = r#"<?xml version="1.0"?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/a/b/c.txt</D:href>
    <D:propstat><D:prop><D:resourcetype/></D:prop></D:propstat>
  </D:response>
</D:multistatus>"#;

        let entries = parse_multistatus(body).unwrap();
        assert_eq!(entries[0].basename, "c.txt");
    }

    #[test]
    fn test_failed_propstat_blocks_are_skipped() {
        let body = r#"<?xml version="1.0"?>
<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>/report.txt</d:href>
    <d:propstat>
      <d:prop>
        <d:getlastmodified>Mon, 01 Jan 2024 00:00:00 GMT</d:getlastmodified>
        <d:getcontentlength>7</d:getcontentlength>
        <d:resourcetype/>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
    <d:propstat>
      <d:prop>
        <d:displayname>stale name</d:displayname>
        <d:getcontentlength>999</d:getcontentlength>
      </d:prop>
      <d:status>HTTP/1.1 404 Not Found</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

        let entries = parse_multistatus(body).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].size, 7);
        assert_eq!(entries[0].basename, "report.txt");
        assert_eq!(entries[0].lastmod, "Mon, 01 Jan 2024 00:00:00 GMT");
    }

    #[test]
    fn test_absolute_url_hrefs_are_reduced_to_paths() {
        assert_eq!(
            href_to_path("https://dav.example.com/remote/x%2By.txt"),
            "/remote/x+y.txt"
        );
        assert_eq!(href_to_path("/plain/path/"), "/plain/path");
        assert_eq!(href_to_path("/"), "/");
    }

    #[test]
    fn test_malformed_xml_is_an_invalid_response() {
        let err = parse_multistatus("<multistatus><response></oops></multistatus>").unwrap_err();
        assert!(matches!(err, DavError::InvalidResponse(_)));
    }
}
