//! Composite window key handling.

/// A key that uniquely identifies a sliding window.
///
/// One window exists per client per resource, so the key is the pair of
/// both identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowKey {
    /// The client being limited (e.g. a normalized source address)
    pub client: String,
    /// The resource the client is calling
    pub resource: String,
}

impl WindowKey {
    /// Create a new window key from a client and a resource.
    pub fn new(client: &str, resource: &str) -> Self {
        Self {
            client: client.to_string(),
            resource: resource.to_string(),
        }
    }

    /// Convert the window key to a string representation.
    ///
    /// This is useful for logging and debugging.
    pub fn to_string_key(&self) -> String {
        format!("{}|{}", self.client, self.resource)
    }
}

impl std::fmt::Display for WindowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_key_creation() {
        let key = WindowKey::new("10.0.0.1", "/limited");

        assert_eq!(key.client, "10.0.0.1");
        assert_eq!(key.resource, "/limited");
    }

    #[test]
    fn test_window_key_to_string() {
        let key = WindowKey::new("client_a", "/");
        assert_eq!(key.to_string_key(), "client_a|/");
        assert_eq!(key.to_string(), "client_a|/");
    }

    #[test]
    fn test_window_key_equality() {
        let key1 = WindowKey::new("client", "resource");
        let key2 = WindowKey::new("client", "resource");
        let swapped = WindowKey::new("resource", "client");

        assert_eq!(key1, key2);
        assert_ne!(key1, swapped);
    }
}
