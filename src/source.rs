//! Where tile bodies come from.

use crate::error::Error;
use crate::types::TileKey;
use std::path::PathBuf;

/// Base address of the published price-paid tiles.
pub const DEFAULT_BASE_URL: &str = "https://ashtonsix-price-paid.s3-eu-west-1.amazonaws.com/tiles/";

/// Anything that can produce the raw body of a tile file.
pub trait TileSource: Send + Sync {
    /// Fetches the newline-delimited body of `key`.
    fn fetch(&self, key: TileKey) -> Result<String, Error>;
}

/// Static tile store reached over HTTP GET at `{base}{key}.jsonl`.
pub struct HttpSource {
    base: String,
    client: reqwest::blocking::Client,
}

impl HttpSource {
    /// Creates a source rooted at `base`. A trailing `/` is added when missing.
    pub fn new(base: impl Into<String>) -> Self {
        Self::with_client(base, reqwest::blocking::Client::new())
    }

    /// Like [`new`](HttpSource::new), with a preconfigured client (timeouts, proxies).
    pub fn with_client(base: impl Into<String>, client: reqwest::blocking::Client) -> Self {
        let mut base = base.into();
        if !base.ends_with('/') {
            base.push('/');
        }
        Self { base, client }
    }

    /// Full address of a tile file.
    pub fn url(&self, key: TileKey) -> String {
        format!("{}{}", self.base, key.file_name())
    }
}

impl Default for HttpSource {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl TileSource for HttpSource {
    fn fetch(&self, key: TileKey) -> Result<String, Error> {
        let response = self.client.get(self.url(key)).send()?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound);
        }
        if !status.is_success() {
            return Err(Error::Status(status.as_u16()));
        }
        Ok(response.text()?)
    }
}

/// Tile files laid out in a local directory, as written by the
/// [`Tiler`](crate::tiler::Tiler).
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    /// Creates a source reading from `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of a tile file.
    pub fn path(&self, key: TileKey) -> PathBuf {
        self.root.join(key.file_name())
    }
}

impl TileSource for DirectorySource {
    fn fetch(&self, key: TileKey) -> Result<String, Error> {
        match std::fs::read_to_string(self.path(key)) {
            Ok(body) => Ok(body),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TileCache;
    use crate::tile::ParseMode;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::Arc;

    const TILE_BODY: &str = "{\"id\":\"1\",\"nodes\":[{\"lat\":51.45,\"lon\":-0.97}]}\n";

    /// Serves `/tiles/0000100001.jsonl` with a body, `/tiles/0000200002.jsonl`
    /// with a 500 and everything else with a 404. Returns the base URL.
    fn serve_tiles() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut request = String::new();
                reader.read_line(&mut request).unwrap();
                let mut header = String::new();
                while reader.read_line(&mut header).unwrap_or(0) > 2 {
                    header.clear();
                }
                let path = request.split_whitespace().nth(1).unwrap_or("");
                let (status, body) = match path {
                    "/tiles/0000100001.jsonl" => ("200 OK", TILE_BODY),
                    "/tiles/0000200002.jsonl" => ("500 Internal Server Error", "boom"),
                    _ => ("404 Not Found", ""),
                };
                let _ = write!(
                    stream,
                    "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
            }
        });
        format!("http://{addr}/tiles")
    }

    fn local_source() -> HttpSource {
        let client = reqwest::blocking::Client::builder()
            .no_proxy()
            .build()
            .unwrap();
        HttpSource::with_client(serve_tiles(), client)
    }

    #[test]
    fn http_status_mapping() {
        let source = local_source();
        assert_eq!(source.fetch(TileKey::new(1, 1)).unwrap(), TILE_BODY);
        assert!(matches!(
            source.fetch(TileKey::new(2, 2)),
            Err(Error::Status(500))
        ));
        assert!(matches!(
            source.fetch(TileKey::new(3, 3)),
            Err(Error::NotFound)
        ));
    }

    #[test]
    fn http_errors_resolve_to_empty_tiles() {
        let cache = TileCache::new(Arc::new(local_source()), ParseMode::Strict);
        assert_eq!(cache.get(TileKey::new(1, 1)).len(), 1);
        assert!(cache.get(TileKey::new(2, 2)).is_empty());
        assert!(cache.get(TileKey::new(3, 3)).is_empty());
        assert_eq!(cache.fetches(), 3);
    }

    #[test]
    fn http_url_uses_padded_key() {
        let source = HttpSource::new("https://tiles.example.com/pp");
        assert_eq!(
            source.url(TileKey::new(14145, 903)),
            "https://tiles.example.com/pp/1414500903.jsonl"
        );
        assert_eq!(
            HttpSource::default().url(TileKey::new(1, 2)),
            format!("{DEFAULT_BASE_URL}0000100002.jsonl")
        );
    }

    #[test]
    fn directory_source_reads_and_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        let key = TileKey::new(14145, 17903);
        std::fs::write(dir.path().join("1414517903.jsonl"), "{}\n").unwrap();

        let source = DirectorySource::new(dir.path());
        assert_eq!(source.fetch(key).unwrap(), "{}\n");
        assert!(matches!(
            source.fetch(TileKey::new(0, 0)),
            Err(Error::NotFound)
        ));
    }
}
