//! Content digests for change detection.

use sha2::{Digest, Sha256};

/// Incremental SHA-256 digest over typed values.
///
/// Every value is length- or type-prefixed so that adjacent fields
/// cannot run into each other.
pub(crate) struct ContentHasher(Sha256);

impl ContentHasher {
    pub(crate) fn new(domain: &str) -> Self {
        let mut hasher = Self(Sha256::new());
        hasher.str(domain);
        hasher
    }

    pub(crate) fn str(&mut self, value: &str) -> &mut Self {
        self.0.update(b"s");
        self.0.update((value.len() as u64).to_le_bytes());
        self.0.update(value.as_bytes());
        self
    }

    pub(crate) fn opt_str(&mut self, value: Option<&str>) -> &mut Self {
        match value {
            Some(value) => self.str(value),
            None => {
                self.0.update(b"n");
                self
            }
        }
    }

    pub(crate) fn f64(&mut self, value: f64) -> &mut Self {
        self.0.update(b"f");
        self.0.update(value.to_bits().to_le_bytes());
        self
    }

    pub(crate) fn opt_f64(&mut self, value: Option<f64>) -> &mut Self {
        match value {
            Some(value) => self.f64(value),
            None => {
                self.0.update(b"n");
                self
            }
        }
    }

    pub(crate) fn bool(&mut self, value: bool) -> &mut Self {
        self.0.update(if value { b"T" } else { b"F" });
        self
    }

    pub(crate) fn usize(&mut self, value: usize) -> &mut Self {
        self.0.update(b"u");
        self.0.update((value as u64).to_le_bytes());
        self
    }

    /// Returns the lowercase hex digest.
    pub(crate) fn finish(self) -> String {
        format!("{:x}", self.0.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_deterministic() {
        let digest = |a: &str, b: f64| {
            let mut hasher = ContentHasher::new("test");
            hasher.str(a).f64(b).bool(true);
            hasher.finish()
        };
        assert_eq!(digest("deform", 0.5), digest("deform", 0.5));
        assert_ne!(digest("deform", 0.5), digest("deform", 0.6));
        assert_eq!(digest("deform", 0.5).len(), 64);
    }

    #[test]
    fn test_fields_do_not_run_together() {
        let mut a = ContentHasher::new("test");
        a.str("ab").str("c");
        let mut b = ContentHasher::new("test");
        b.str("a").str("bc");
        assert_ne!(a.finish(), b.finish());
    }
}
