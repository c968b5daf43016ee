//! Static file responses rooted at a document directory.
//!
//! Behaves like a plain development file server: `GET`/`HEAD` only, index
//! files before directory listings, `If-Modified-Since` and single byte
//! ranges. Cache headers are not added here, see `Reply::disable_caching`.

use std::{
    fs::{self, File},
    io::{Read, Seek, SeekFrom},
    path::{Component, Path, PathBuf},
    time::SystemTime,
};

use chrono::{DateTime, Utc};
use tiny_http::{Header, Method};

use html_escape::{encode_double_quoted_attribute, encode_text};

use crate::http::{Body, Reply};

const INDEX_FILES: [&str; 2] = ["index.html", "index.htm"];

pub struct StaticFiles {
    root: PathBuf,
}

#[derive(Debug, PartialEq)]
enum ByteRange {
    Satisfiable { start: u64, end: u64 },
    Unsatisfiable,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn reply(&self, method: &Method, url: &str, headers: &[Header]) -> Reply {
        match method {
            Method::Get | Method::Head => self.get(url, headers),
            other => Reply::error(501, &format!("Unsupported method ('{}')", other)),
        }
    }

    fn get(&self, url: &str, headers: &[Header]) -> Reply {
        let url = url.split('#').next().unwrap_or_default();
        let (url_path, query) = match url.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (url, None),
        };
        let path = self.translate_path(url_path);

        if path.is_dir() {
            if !url_path.ends_with('/') {
                // A leading `//` would make the Location a network-path reference.
                let target = format!("/{}/", url_path.trim_start_matches('/'));
                let location = match query {
                    Some(query) => format!("{}?{}", target, query),
                    None => target,
                };
                return Reply::new(301).with_header("Location", location);
            }
            for index in INDEX_FILES.iter() {
                let index = path.join(index);
                if index.is_file() {
                    return send_file(&index, headers);
                }
            }
            return list_directory(&path, url_path);
        }

        if url_path.ends_with('/') {
            return Reply::error(404, "File not found");
        }
        send_file(&path, headers)
    }

    /// Maps a URL path onto the document root. Segments that could climb out
    /// of the root are skipped.
    fn translate_path(&self, url_path: &str) -> PathBuf {
        let decoded = urlencoding::decode_binary(url_path.as_bytes());
        let decoded = String::from_utf8_lossy(&decoded);

        let mut path = self.root.clone();
        for segment in decoded.split('/') {
            let mut components = Path::new(segment).components();
            match (components.next(), components.next()) {
                (Some(Component::Normal(_)), None) => path.push(segment),
                _ => continue,
            }
        }
        path
    }
}

fn send_file(path: &Path, headers: &[Header]) -> Reply {
    let (mut file, metadata) = match File::open(path).and_then(|f| {
        let metadata = f.metadata()?;
        Ok((f, metadata))
    }) {
        Ok(opened) => opened,
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "cannot open file");
            return Reply::error(404, "File not found");
        }
    };

    let modified = metadata.modified().ok();
    if let Some(modified) = modified {
        if header_value(headers, "If-None-Match").is_none() {
            if let Some(since) = header_value(headers, "If-Modified-Since") {
                if not_modified_since(modified, since) {
                    return Reply::new(304);
                }
            }
        }
    }

    let len = metadata.len();
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let mut reply = match header_value(headers, "Range").and_then(|r| parse_range(r, len)) {
        Some(ByteRange::Satisfiable { start, end }) => {
            if let Err(err) = file.seek(SeekFrom::Start(start)) {
                tracing::warn!(path = %path.display(), error = %err, "seek failed");
                return Reply::error(404, "File not found");
            }
            let count = end - start + 1;
            Reply::new(206)
                .with_header("Content-Range", format!("bytes {}-{}/{}", start, end, len))
                .with_body(Body::Stream {
                    reader: Box::new(file.take(count)),
                    len: count as usize,
                })
        }
        Some(ByteRange::Unsatisfiable) => {
            return Reply::error(416, "Requested Range Not Satisfiable")
                .with_header("Content-Range", format!("bytes */{}", len));
        }
        None => Reply::new(200).with_body(Body::Stream {
            reader: Box::new(file),
            len: len as usize,
        }),
    };

    reply = reply
        .with_header("Content-Type", mime.to_string())
        .with_header("Accept-Ranges", "bytes");
    if let Some(modified) = modified {
        reply = reply.with_header("Last-Modified", http_date(modified));
    }
    reply
}

fn list_directory(dir: &Path, url_path: &str) -> Reply {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Reply::error(404, "No permission to list directory"),
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort_by_key(|name| name.to_lowercase());

    let displaypath = encode_text(&String::from_utf8_lossy(&urlencoding::decode_binary(
        url_path.as_bytes(),
    )))
    .into_owned();
    let title = format!("Directory listing for {}", displaypath);

    let mut html = format!(
        "<!DOCTYPE HTML>\n\
         <html lang=\"en\">\n\
         <head>\n\
         <meta charset=\"utf-8\">\n\
         <title>{title}</title>\n\
         </head>\n\
         <body>\n\
         <h1>{title}</h1>\n\
         <hr>\n\
         <ul>\n",
        title = title
    );
    for name in names {
        let full = dir.join(&name);
        let is_dir = full.is_dir();
        let is_symlink = fs::symlink_metadata(&full)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);

        let mut display = name.clone();
        let mut link = urlencoding::encode(&name).into_owned();
        if is_dir {
            display.push('/');
            link.push('/');
        }
        if is_symlink {
            display = format!("{}@", name);
        }
        html.push_str(&format!(
            "<li><a href=\"{}\">{}</a></li>\n",
            encode_double_quoted_attribute(&link),
            encode_text(&display)
        ));
    }
    html.push_str("</ul>\n<hr>\n</body>\n</html>\n");

    Reply::new(200)
        .with_header("Content-Type", "text/html; charset=utf-8")
        .with_body(Body::Bytes(html.into_bytes()))
}

fn header_value<'a>(headers: &'a [Header], name: &'static str) -> Option<&'a str> {
    headers
        .iter()
        .find(|header| header.field.equiv(name))
        .map(|header| header.value.as_str())
}

fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Compares at whole-second precision, the resolution of HTTP dates.
fn not_modified_since(modified: SystemTime, since: &str) -> bool {
    match DateTime::parse_from_rfc2822(since.trim()) {
        Ok(since) => DateTime::<Utc>::from(modified).timestamp() <= since.timestamp(),
        Err(_) => false,
    }
}

/// Parses a single `bytes=` range. `None` means the header is ignored.
fn parse_range(value: &str, len: u64) -> Option<ByteRange> {
    let ranges = value.trim().strip_prefix("bytes=")?;
    if ranges.contains(',') {
        return None;
    }
    let (start, end) = ranges.split_once('-')?;
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        let suffix: u64 = end.parse().ok()?;
        if suffix == 0 || len == 0 {
            return Some(ByteRange::Unsatisfiable);
        }
        return Some(ByteRange::Satisfiable {
            start: len.saturating_sub(suffix),
            end: len - 1,
        });
    }

    let start: u64 = start.parse().ok()?;
    let end = if end.is_empty() {
        None
    } else {
        Some(end.parse::<u64>().ok()?)
    };
    if matches!(end, Some(end) if end < start) {
        return None;
    }
    if start >= len {
        return Some(ByteRange::Unsatisfiable);
    }
    Some(ByteRange::Satisfiable {
        start,
        end: end.map_or(len - 1, |end| end.min(len - 1)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn header(name: &str, value: &str) -> Header {
        Header::from_bytes(name.as_bytes(), value.as_bytes()).unwrap()
    }

    fn site() -> (tempfile::TempDir, StaticFiles) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hello.txt"), "hello world").unwrap();
        fs::write(dir.path().join("style.css"), "body {}").unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs").join("Zeta.md"), "z").unwrap();
        fs::write(dir.path().join("docs").join("alpha & <b>.txt"), "a").unwrap();
        fs::create_dir(dir.path().join("docs").join("nested")).unwrap();
        fs::create_dir(dir.path().join("site")).unwrap();
        fs::write(dir.path().join("site").join("index.html"), "<h1>home</h1>").unwrap();
        let files = StaticFiles::new(dir.path());
        (dir, files)
    }

    fn get(files: &StaticFiles, url: &str) -> Reply {
        files.reply(&Method::Get, url, &[])
    }

    fn body(reply: Reply) -> String {
        String::from_utf8(reply.read_body().unwrap()).unwrap()
    }

    #[test]
    fn serves_existing_file() {
        let (_dir, files) = site();
        let reply = get(&files, "/hello.txt");
        assert_eq!(reply.status_code, 200);
        assert_eq!(reply.header("Content-Type"), Some("text/plain"));
        assert_eq!(reply.header("Accept-Ranges"), Some("bytes"));
        assert!(reply.header("Last-Modified").unwrap().ends_with(" GMT"));
        assert_eq!(body(reply), "hello world");
    }

    #[test]
    fn guesses_mime_type() {
        let (dir, files) = site();
        fs::write(dir.path().join("blob.unknownext"), [0u8, 1, 2]).unwrap();

        assert_eq!(
            get(&files, "/style.css").header("Content-Type"),
            Some("text/css")
        );
        assert_eq!(
            get(&files, "/blob.unknownext").header("Content-Type"),
            Some("application/octet-stream")
        );
    }

    #[test]
    fn ignores_query_and_fragment() {
        let (_dir, files) = site();
        let reply = get(&files, "/hello.txt?debug=vscode#top");
        assert_eq!(reply.status_code, 200);
        assert_eq!(body(reply), "hello world");
    }

    #[test]
    fn missing_file_is_not_found() {
        let (_dir, files) = site();
        assert_eq!(get(&files, "/nope.txt").status_code, 404);
        assert_eq!(get(&files, "/hello.txt/").status_code, 404);
    }

    #[test]
    fn dot_dot_cannot_escape_root() {
        let outer = tempfile::tempdir().unwrap();
        fs::write(outer.path().join("secret.txt"), "secret").unwrap();
        let root = outer.path().join("public");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("secret.txt"), "public copy").unwrap();
        let files = StaticFiles::new(&root);

        for url in &["/../secret.txt", "/%2e%2e/secret.txt", "/./../secret.txt"] {
            let reply = get(&files, url);
            assert_eq!(reply.status_code, 200, "{}", url);
            assert_eq!(body(reply), "public copy", "{}", url);
        }
        // `..` is dropped rather than applied, so this names public/a/secret.txt.
        assert_eq!(get(&files, "/a/../../secret.txt").status_code, 404);
    }

    #[test]
    fn percent_encoded_names_resolve() {
        let (dir, files) = site();
        fs::write(dir.path().join("with space.txt"), "spaced").unwrap();
        let reply = get(&files, "/with%20space.txt");
        assert_eq!(reply.status_code, 200);
        assert_eq!(body(reply), "spaced");
    }

    #[test]
    fn directory_without_slash_redirects() {
        let (_dir, files) = site();
        let reply = get(&files, "/docs?x=1");
        assert_eq!(reply.status_code, 301);
        assert_eq!(reply.header("Location"), Some("/docs/?x=1"));
    }

    #[test]
    fn redirect_collapses_leading_slashes() {
        let (dir, files) = site();
        fs::create_dir(dir.path().join("evil.com")).unwrap();

        for url in &["//evil.com", "///evil.com", "/%2F/evil.com"] {
            let reply = get(&files, url);
            assert_eq!(reply.status_code, 301, "{}", url);
            let location = reply.header("Location").unwrap();
            assert!(!location.starts_with("//"), "{} -> {}", url, location);
        }
        assert_eq!(get(&files, "//evil.com?q=1").header("Location"), Some("/evil.com/?q=1"));
    }

    #[test]
    fn directory_serves_index() {
        let (_dir, files) = site();
        let reply = get(&files, "/site/");
        assert_eq!(reply.status_code, 200);
        assert_eq!(reply.header("Content-Type"), Some("text/html"));
        assert_eq!(body(reply), "<h1>home</h1>");
    }

    #[test]
    fn directory_listing_is_sorted_and_escaped() {
        let (_dir, files) = site();
        let reply = get(&files, "/docs/");
        assert_eq!(reply.status_code, 200);
        assert_eq!(reply.header("Content-Type"), Some("text/html; charset=utf-8"));

        let html = body(reply);
        assert!(html.contains("<title>Directory listing for /docs/</title>"));
        let alpha = html
            .find("<a href=\"alpha%20%26%20%3Cb%3E.txt\">alpha &amp; &lt;b&gt;.txt</a>")
            .unwrap();
        let nested = html.find("<a href=\"nested/\">nested/</a>").unwrap();
        let zeta = html.find("<a href=\"Zeta.md\">Zeta.md</a>").unwrap();
        assert!(alpha < nested && nested < zeta);
    }

    #[cfg(unix)]
    #[test]
    fn directory_listing_marks_symlinks() {
        let (dir, files) = site();
        std::os::unix::fs::symlink(
            dir.path().join("hello.txt"),
            dir.path().join("docs").join("link.txt"),
        )
        .unwrap();

        let html = body(get(&files, "/docs/"));
        assert!(html.contains("<a href=\"link.txt\">link.txt@</a>"));
    }

    #[test]
    fn head_matches_get_headers() {
        let (_dir, files) = site();
        let reply = files.reply(&Method::Head, "/hello.txt", &[]);
        assert_eq!(reply.status_code, 200);
        assert_eq!(reply.header("Content-Type"), Some("text/plain"));
    }

    #[test]
    fn other_methods_are_not_implemented() {
        let (_dir, files) = site();
        let reply = files.reply(&Method::Post, "/hello.txt", &[]);
        assert_eq!(reply.status_code, 501);
        assert!(body(reply).contains("Unsupported method"));
    }

    #[test]
    fn if_modified_since_yields_not_modified() {
        let (_dir, files) = site();
        let last_modified = get(&files, "/hello.txt")
            .header("Last-Modified")
            .unwrap()
            .to_string();

        let fresh = files.reply(
            &Method::Get,
            "/hello.txt",
            &[header("If-Modified-Since", &last_modified)],
        );
        assert_eq!(fresh.status_code, 304);
        assert!(fresh.read_body().unwrap().is_empty());

        let stale = files.reply(
            &Method::Get,
            "/hello.txt",
            &[header("If-Modified-Since", "Thu, 01 Jan 1970 00:00:00 GMT")],
        );
        assert_eq!(stale.status_code, 200);
    }

    #[test]
    fn if_none_match_disables_date_check() {
        let (_dir, files) = site();
        let reply = files.reply(
            &Method::Get,
            "/hello.txt",
            &[
                header("If-Modified-Since", "Fri, 01 Jan 2100 00:00:00 GMT"),
                header("If-None-Match", "\"abc\""),
            ],
        );
        assert_eq!(reply.status_code, 200);
    }

    #[test]
    fn range_request_returns_partial_content() {
        let (_dir, files) = site();
        let reply = files.reply(&Method::Get, "/hello.txt", &[header("Range", "bytes=6-")]);
        assert_eq!(reply.status_code, 206);
        assert_eq!(reply.header("Content-Range"), Some("bytes 6-10/11"));
        assert_eq!(body(reply), "world");
    }

    #[test]
    fn unsatisfiable_range() {
        let (_dir, files) = site();
        let reply = files.reply(&Method::Get, "/hello.txt", &[header("Range", "bytes=50-60")]);
        assert_eq!(reply.status_code, 416);
        assert_eq!(reply.header("Content-Range"), Some("bytes */11"));
    }

    #[test]
    fn parse_range_forms() {
        assert_eq!(
            parse_range("bytes=0-4", 11),
            Some(ByteRange::Satisfiable { start: 0, end: 4 })
        );
        assert_eq!(
            parse_range("bytes=-3", 11),
            Some(ByteRange::Satisfiable { start: 8, end: 10 })
        );
        assert_eq!(
            parse_range("bytes=5-100", 11),
            Some(ByteRange::Satisfiable { start: 5, end: 10 })
        );
        assert_eq!(parse_range("bytes=11-", 11), Some(ByteRange::Unsatisfiable));
        assert_eq!(parse_range("bytes=-0", 11), Some(ByteRange::Unsatisfiable));
        assert_eq!(parse_range("bytes=4-2", 11), None);
        assert_eq!(parse_range("bytes=0-1,3-4", 11), None);
        assert_eq!(parse_range("items=0-1", 11), None);
        assert_eq!(parse_range("bytes=x-1", 11), None);
    }

    #[test]
    fn http_date_format() {
        let time = SystemTime::UNIX_EPOCH + Duration::from_secs(784_111_777);
        assert_eq!(http_date(time), "Sun, 06 Nov 1994 08:49:37 GMT");
        assert!(not_modified_since(time, "Sun, 06 Nov 1994 08:49:37 GMT"));
        assert!(!not_modified_since(time, "Sun, 06 Nov 1994 08:49:36 GMT"));
        assert!(!not_modified_since(time, "yesterday"));
    }
}
