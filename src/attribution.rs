//! Attribution strings pushed to the renderer's attribution control.

/// Attribution of a map source, typically used for citing the data provider.
///
/// Stores a text description along with an optional URL where more information
/// or the source can be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    text: String,
    url: Option<String>,
}

impl Attribution {
    /// Creates a new attribution with the given text.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            url: None,
        }
    }

    /// Sets the URL associated with the attribution.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Text of the attribution.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// URL associated with the attribution, if any.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }
}
