//! Secret masking for logs and `config show` output.

use std::fmt;

const VISIBLE_PREFIX_LEN: usize = 4;

/// Displays a secret as its first few characters followed by `***`
///
/// # Example
/// ```
/// use logscale_query::logging::MaskedSecret;
///
/// assert_eq!(MaskedSecret::new("abcd1234efgh").to_string(), "abcd***");
/// assert_eq!(MaskedSecret::new("abc").to_string(), "***");
/// ```
#[derive(Clone, Debug)]
pub struct MaskedSecret<'a> {
    inner: &'a str,
}

impl<'a> MaskedSecret<'a> {
    pub fn new(secret: &'a str) -> Self {
        Self { inner: secret }
    }
}

impl fmt::Display for MaskedSecret<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short secrets would be mostly revealed by the prefix
        if self.inner.chars().count() <= VISIBLE_PREFIX_LEN * 2 {
            return write!(f, "***");
        }
        let prefix: String = self.inner.chars().take(VISIBLE_PREFIX_LEN).collect();
        write!(f, "{}***", prefix)
    }
}

pub fn mask_secret(secret: &str) -> String {
    if secret.is_empty() {
        return String::new();
    }
    MaskedSecret::new(secret).to_string()
}
