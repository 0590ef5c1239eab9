//! At-rest value transformation hook.

use crate::Result;

/// Pure byte transform applied before every backend write and after every
/// backend read. The connection layer supplies the real implementation
/// (at-rest encryption or compression); this core treats the stored form as
/// opaque.
pub trait ValueTransformer: Send + Sync + 'static {
    /// Plain payload -> stored form, invoked just before a write commits.
    fn encode(
        &self,
        plain: &[u8],
    ) -> Result<Vec<u8>>;

    /// Stored form -> plain payload, invoked right after a read.
    fn decode(
        &self,
        stored: &[u8],
    ) -> Result<Vec<u8>>;
}

/// Pass-through transformer used when no at-rest transformation is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransformer;

impl ValueTransformer for IdentityTransformer {
    fn encode(
        &self,
        plain: &[u8],
    ) -> Result<Vec<u8>> {
        Ok(plain.to_vec())
    }

    fn decode(
        &self,
        stored: &[u8],
    ) -> Result<Vec<u8>> {
        Ok(stored.to_vec())
    }
}
