//! Raw query parameters of an image request.
//!
//! The map is immutable once built; each consumer parses only the keys it
//! recognises and treats anything it cannot parse as absent.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct Params {
    values: HashMap<String, String>,
}

impl Params {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|v| v.as_str())
    }

    /// True when the key is present, even as a bare flag (`&il`).
    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key)?.trim().parse().ok()
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.get(key)?.trim().parse().ok()
    }

    pub fn get_f32(&self, key: &str) -> Option<f32> {
        self.get(key)?
            .trim()
            .parse::<f32>()
            .ok()
            .filter(|v| v.is_finite())
    }

    /// Positive pixel dimension (`w`, `h`), zero and garbage are ignored.
    pub fn dimension(&self, key: &str) -> Option<u32> {
        self.get_u32(key).filter(|v| *v > 0)
    }

    /// Device pixel ratio, 1..=8, defaults to 1.
    pub fn dpr(&self) -> f32 {
        self.get_f32("dpr")
            .filter(|v| (1.0..=8.0).contains(v))
            .unwrap_or(1.0)
    }

    /// Frame/page index, negative or invalid values select the first page.
    pub fn page(&self) -> u32 {
        self.get_u32("page").unwrap_or(0)
    }

    /// Download name for `Content-Disposition`, alphanumeric only.
    pub fn filename(&self) -> &str {
        match self.get("filename") {
            Some(name) if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric()) => {
                name
            }
            _ => "image",
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<const N: usize> From<[(&str, &str); N]> for Params {
    fn from(pairs: [(&str, &str); N]) -> Self {
        Self::new(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}
