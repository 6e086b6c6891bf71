//! services/api/src/adapters/storage.rs
//!
//! The `FileStore` port for a public object bucket: layout files are served
//! straight from the bucket's public base URL.

use unit_booking_core::ports::FileStore;

#[derive(Debug, Clone)]
pub struct PublicBucket {
    base_url: String,
}

impl PublicBucket {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl FileStore for PublicBucket {
    fn public_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
