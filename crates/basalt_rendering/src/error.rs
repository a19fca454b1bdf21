//! # Culling Error Types
//!
//! All errors that can escape the culling core.

use thiserror::Error;

use crate::layout::RenderPassKind;

/// Errors that can occur in the culling core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CullingError {
    /// The adapter cannot run compute shaders, so the cull program can
    /// never execute. Surfaced at context creation, never per-frame:
    /// proceeding would multi-draw stale garbage commands.
    #[error("compute shaders unsupported on this adapter; GPU culling cannot run")]
    ComputeUnsupported,

    /// A bounded GPU fence wait expired. Fatal for the current frame;
    /// retrying indefinitely risks an unrecoverable stall.
    #[error("GPU fence not signalled within {waited_ms} ms")]
    FenceTimeout {
        /// How long the host waited before giving up.
        waited_ms: u64,
    },

    /// The region arena would exceed its representable capacity. Growth
    /// makes this practically unreachable; hitting it means the index
    /// pool leaked slots.
    #[error("region capacity exhausted: requested {requested}, limit {limit}")]
    RegionCapacityExhausted {
        /// Capacity the caller asked for.
        requested: u32,
        /// Maximum representable capacity.
        limit: u32,
    },

    /// A pass was drawn without being dispatched this frame. The
    /// command buffer for that pass holds stale data, so the draw is
    /// refused rather than issued.
    #[error("pass {pass:?} drawn before its cull dispatch this frame")]
    PassNotDispatched {
        /// The offending pass.
        pass: RenderPassKind,
    },

    /// Configuration failed to parse or validate.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CullingError::FenceTimeout { waited_ms: 1000 };
        assert_eq!(err.to_string(), "GPU fence not signalled within 1000 ms");

        let err = CullingError::PassNotDispatched {
            pass: RenderPassKind::Solid,
        };
        assert!(err.to_string().contains("Solid"));
    }
}
