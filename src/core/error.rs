//! Error types for the MLE service.

use thiserror::Error;

/// Errors in the security envelope.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Security level outside 0..=7.
    #[error("invalid security level: {0}")]
    InvalidSecurityLevel(u8),

    /// Key identifier mode outside 0..=3.
    #[error("invalid key id mode: {0}")]
    InvalidKeyIdMode(u8),

    /// Auxiliary security header truncated.
    #[error("auxiliary security header too short")]
    HeaderTooShort,

    /// No key material for the requested key identifier.
    #[error("key unavailable")]
    KeyUnavailable,

    /// CCM* encryption failed.
    #[error("CCM* encryption failed")]
    EncryptionFailed,

    /// MIC verification failed (invalid tag or corrupted).
    #[error("authentication failed (invalid MIC or corrupted)")]
    AuthenticationFailed,

    /// Frame counter not newer than the last one seen from this neighbor.
    #[error("replay detected")]
    ReplayDetected,

    /// Key sequence older than the last one seen from this neighbor.
    #[error("key sequence downgrade")]
    KeySequenceDowngrade,
}

impl CryptoError {
    /// Check if this error should result in silent drop (no response sent).
    pub fn is_silent_drop(&self) -> bool {
        matches!(
            self,
            CryptoError::HeaderTooShort
                | CryptoError::InvalidSecurityLevel(_)
                | CryptoError::InvalidKeyIdMode(_)
                | CryptoError::KeyUnavailable
                | CryptoError::AuthenticationFailed
                | CryptoError::ReplayDetected
                | CryptoError::KeySequenceDowngrade
        )
    }
}

/// Reasons an inbound datagram was dropped.
///
/// None of these produce a response to the peer.
#[derive(Debug, Error)]
pub enum ReceiveError {
    /// Source or destination outside link-local scope.
    #[error("not link-local")]
    NotLinkLocal,

    /// Datagram carries no bytes at all.
    #[error("empty datagram")]
    Empty,

    /// Leading byte is neither the secured nor the unsecured marker.
    #[error("unknown leading marker 0x{0:02x}")]
    UnknownMarker(u8),

    /// Datagram arrived for an interface that is not registered.
    #[error("unknown interface {0}")]
    UnknownInterface(i8),

    /// Unsecured datagram on an interface that requires security.
    #[error("security required")]
    SecurityRequired,

    /// Message type byte missing or TLV chain malformed.
    #[error("malformed message")]
    Malformed,

    /// Security envelope rejected the datagram.
    #[error("security failure: {0}")]
    Security(#[from] CryptoError),
}

/// Top-level MLE service errors.
#[derive(Debug, Error)]
pub enum MleError {
    /// Buffer or control block allocation failed.
    #[error("out of memory")]
    OutOfMemory,

    /// No service instance for this interface.
    #[error("interface {0} not registered")]
    InterfaceNotFound(i8),

    /// No live buffer with this message id.
    #[error("message {0} not found")]
    MessageNotFound(u16),

    /// Handle refers to a buffer that has already been freed.
    #[error("invalid handle for message {0}")]
    InvalidHandle(u16),

    /// Input rejected before any state was touched.
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    /// Security envelope error.
    #[error("security error: {0}")]
    Security(#[from] CryptoError),

    /// I/O error from the transport.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl MleError {
    /// Check if this is an unknown interface or message.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            MleError::InterfaceNotFound(_) | MleError::MessageNotFound(_)
        )
    }

    /// Check if this is a resource exhaustion failure.
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, MleError::OutOfMemory)
    }
}

/// Result type for MLE service operations.
pub type MleResult<T> = Result<T, MleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_drop_errors() {
        assert!(CryptoError::AuthenticationFailed.is_silent_drop());
        assert!(CryptoError::ReplayDetected.is_silent_drop());
        assert!(CryptoError::KeySequenceDowngrade.is_silent_drop());
        assert!(!CryptoError::EncryptionFailed.is_silent_drop());
    }

    #[test]
    fn test_error_classes() {
        assert!(MleError::InterfaceNotFound(1).is_not_found());
        assert!(MleError::MessageNotFound(7).is_not_found());
        assert!(!MleError::OutOfMemory.is_not_found());
        assert!(MleError::OutOfMemory.is_resource_exhaustion());
        assert!(!MleError::InvalidHandle(7).is_resource_exhaustion());
    }

    #[test]
    fn test_crypto_error_converts() {
        let err: MleError = CryptoError::KeyUnavailable.into();
        assert!(matches!(err, MleError::Security(CryptoError::KeyUnavailable)));
    }
}
