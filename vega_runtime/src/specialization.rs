//! Byte serialization of specialization records
//!
//! The cache keys on the structured record; the byte form exists for
//! embedding into compiled-kernel identities and, eventually,
//! cross-process caches.

use vega_common::{CompileError, Result};
use vega_ir::KernelSpecialization;

/// Serialize a specialization to its canonical byte form.
pub fn to_bytes(specialization: &KernelSpecialization) -> Vec<u8> {
    bincode::serialize(specialization).expect("specialization records always serialize")
}

/// Reconstruct a specialization from bytes produced by [`to_bytes`].
pub fn from_bytes(bytes: &[u8]) -> Result<KernelSpecialization> {
    bincode::deserialize(bytes)
        .map_err(|err| CompileError::CompilationFailed(format!("bad specialization bytes: {}", err)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let specialization = KernelSpecialization::default()
            .with_group_size(128)
            .with_fast_math();
        let bytes = to_bytes(&specialization);
        assert_eq!(from_bytes(&bytes).unwrap(), specialization);
    }

    #[test]
    fn test_distinct_records_have_distinct_bytes() {
        let a = to_bytes(&KernelSpecialization::default());
        let b = to_bytes(&KernelSpecialization::default().with_group_size(64));
        assert_ne!(a, b);
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        assert!(from_bytes(&[0xFF]).is_err());
    }
}
