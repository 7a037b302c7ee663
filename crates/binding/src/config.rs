use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    /// Size of the first upload page for ordinary data. Later pages grow geometrically.
    pub ordinary_page_size: u64,
    pub max_ordinary_page_size: u64,
    /// Write explicit null descriptors into empty slots instead of leaving them untouched.
    pub null_descriptors: bool,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            ordinary_page_size: 64 * 1024,
            max_ordinary_page_size: 16 * 1024 * 1024,
            null_descriptors: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config() {
        let config: BindingConfig = serde_json::from_str(r#"{ "null_descriptors": true }"#).unwrap();
        assert!(config.null_descriptors);
        assert_eq!(config.ordinary_page_size, 64 * 1024);
        assert_eq!(config.max_ordinary_page_size, 16 * 1024 * 1024);
    }
}
