use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DpskError {
    #[error("Missing required {0}")]
    InvalidArgument(&'static str),

    #[error("PSK identity too long ({0} bytes, max 65535)")]
    IdentityTooLong(usize),

    #[error("Normalization not required for UTF-8 identity")]
    NormalizationNotAllowed,

    #[error("Fragment {0} differs from message under reassembly")]
    InconsistentFragment(&'static str),

    #[error("Fragment end {0} exceeds message length {1}")]
    FragmentExceedsMessage(u64, u32),
}
