use std::fmt;
use std::sync::Arc;

/// A named service advertisement with a reply-producing function.
///
/// Identity is the identifier; the reply function is invoked once per
/// accepted discovery request and may be stateful.
///
/// # Example
///
/// ```
/// use lanlink_discovery::Discoverable;
///
/// let service = Discoverable::new("database", || "127.0.0.1:5432".to_string());
/// assert_eq!(service.identifier(), "database");
/// assert_eq!(service.reply(), "127.0.0.1:5432");
/// ```
#[derive(Clone)]
pub struct Discoverable {
    identifier: String,
    reply_fn: Arc<dyn Fn() -> String + Send + Sync>,
}

impl Discoverable {
    pub fn new(
        identifier: impl Into<String>,
        reply_fn: impl Fn() -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            reply_fn: Arc::new(reply_fn),
        }
    }

    /// The service name matched against discovery requests.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Produces the reply payload for one request.
    pub fn reply(&self) -> String {
        (*self.reply_fn)()
    }
}

impl fmt::Debug for Discoverable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Discoverable")
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}
