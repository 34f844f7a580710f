use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use storage::INDEX_FILE;
use storage::index::CacheIndex;

use crate::error::{RemoteError, TransportError};

/// Source of the published dictionary catalog.
#[async_trait]
pub trait RemoteCatalog: Send + Sync {
    /// Fetch and parse the manifest of published dictionaries.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` on transport failure or a malformed manifest.
    async fn fetch_manifest(&self) -> Result<CacheIndex, RemoteError>;

    /// Fetch one raw dictionary body.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` on transport failure.
    async fn fetch_body(&self, filename: &str) -> Result<Vec<u8>, RemoteError>;
}

/// Static file host: manifest at `<base>meta.txt`, bodies at `<base><filename>`.
#[derive(Clone, Debug)]
pub struct HttpRemoteCatalog {
    client: Client,
    base: Url,
}

impl HttpRemoteCatalog {
    /// `base` must end with `/`; see [`crate::config::parse_base_url`].
    #[must_use]
    pub fn new(base: Url) -> Self {
        Self::with_client(Client::new(), base)
    }

    #[must_use]
    pub fn with_client(client: Client, base: Url) -> Self {
        Self { client, base }
    }

    #[must_use]
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// `name` becomes one percent-encoded path segment below the base.
    fn resolve(&self, name: &str) -> Result<Url, TransportError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| TransportError::InvalidPath(name.to_owned()))?
            .pop_if_empty()
            .push(name);
        Ok(url)
    }

    async fn get(&self, name: &str) -> Result<Vec<u8>, TransportError> {
        let url = self.resolve(name)?;
        debug!(%url, "fetching");
        let response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(TransportError::HttpStatus {
                url: url.to_string(),
                status: response.status(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl RemoteCatalog for HttpRemoteCatalog {
    async fn fetch_manifest(&self) -> Result<CacheIndex, RemoteError> {
        let bytes = self.get(INDEX_FILE).await?;
        let text = String::from_utf8(bytes).map_err(|_| RemoteError::ManifestEncoding)?;
        Ok(CacheIndex::parse(&text)?)
    }

    async fn fetch_body(&self, filename: &str) -> Result<Vec<u8>, RemoteError> {
        Ok(self.get(filename).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_base_url;

    #[test]
    fn resolves_names_below_base() {
        let remote = HttpRemoteCatalog::new(parse_base_url("https://example.com/dicts").unwrap());
        assert_eq!(
            remote.resolve("meta.txt").unwrap().as_str(),
            "https://example.com/dicts/meta.txt"
        );
        assert_eq!(
            remote.resolve("de:en.dic").unwrap().as_str(),
            "https://example.com/dicts/de:en.dic"
        );
    }

    #[test]
    fn reserved_characters_stay_in_the_filename() {
        let remote = HttpRemoteCatalog::new(parse_base_url("https://example.com/dicts/").unwrap());
        assert_eq!(
            remote.resolve("a#b.dic").unwrap().as_str(),
            "https://example.com/dicts/a%23b.dic"
        );
        assert_eq!(
            remote.resolve("why?.dic").unwrap().as_str(),
            "https://example.com/dicts/why%3F.dic"
        );
        assert_eq!(
            remote.resolve("50%.dic").unwrap().as_str(),
            "https://example.com/dicts/50%25.dic"
        );
    }
}
