//! Protocol constants for the MLE service.
//!
//! Timer values are expressed in service ticks. One tick is one period of the
//! shared retransmission timer ([`TICK_PERIOD`]).

use std::time::Duration;

// =============================================================================
// SOCKET
// =============================================================================

/// Well-known UDP port for MLE (source and destination).
pub const MLE_PORT: u16 = 19788;

/// Hop limit for every MLE datagram (link-local only).
pub const MLE_HOP_LIMIT: u8 = 255;

// =============================================================================
// TIMER
// =============================================================================

/// Period of the shared service timer.
pub const TICK_PERIOD: Duration = Duration::from_millis(100);

/// Default unicast retransmission timeout (1 s).
pub const DEFAULT_URT: u16 = 10;

/// Default maximum retransmission timeout (5 s).
pub const DEFAULT_MRT: u16 = 50;

/// Default maximum retry count.
pub const DEFAULT_MRC: u8 = 3;

/// Lower jitter factor, 0.9 in Q15 fixed point.
pub const JITTER_FACTOR_LOW: u16 = 0x7333;

/// Upper jitter factor, 1.1 in Q15 fixed point.
pub const JITTER_FACTOR_HIGH: u16 = 0x8CCD;

// =============================================================================
// TOKEN BUCKET
// =============================================================================

/// Minimum timeout of a buffer parked waiting for tokens.
pub const TOKEN_DELAY_TICKS: u16 = 10;

/// Maximum number of buffers parked waiting for tokens.
pub const TOKEN_DELAY_MAX_BUFFERS: usize = 10;

/// Priority messages only take a token while the bucket stays at or above this.
pub const TOKEN_PRIORITY_FLOOR: i16 = 0;

// =============================================================================
// MESSAGE BUFFERS
// =============================================================================

/// Buffer storage grows in steps of this many bytes.
pub const BUFFER_GROWTH_STEP: usize = 64;

/// Default cap on live message buffers.
pub const DEFAULT_MAX_BUFFERS: usize = 32;

/// Minimum challenge length.
pub const MIN_CHALLENGE_LEN: u8 = 4;

/// Maximum challenge length.
pub const MAX_CHALLENGE_LEN: u8 = 32;

/// Offset of the challenge value: type byte + TLV type + TLV length.
pub const CHALLENGE_VALUE_OFFSET: usize = 3;

// =============================================================================
// WIRE FORMAT
// =============================================================================

/// Leading byte of a secured MLE datagram.
pub const MARKER_SECURED: u8 = 0x00;

/// Leading byte of an unsecured MLE datagram.
pub const MARKER_UNSECURED: u8 = 0xFF;

/// Highest IEEE 802.15.4 security level (ENC-MIC-128).
pub const MAX_SECURITY_LEVEL: u8 = 7;

/// CCM* nonce size (MAC64 + frame counter + level).
pub const NONCE_SIZE: usize = 13;

/// AES-128 key size.
pub const KEY_SIZE: usize = 16;

/// Security control byte + frame counter.
pub const AUX_HEADER_MIN_SIZE: usize = 5;

/// Auxiliary header with an 8-byte key source.
pub const AUX_HEADER_MAX_SIZE: usize = 14;

/// Largest MIC any security level produces.
pub const MAX_MIC_SIZE: usize = 16;

// =============================================================================
// TLV TYPES
// =============================================================================

/// Source Address TLV.
pub const TLV_SOURCE_ADDRESS: u8 = 0;

/// Mode TLV.
pub const TLV_MODE: u8 = 1;

/// Timeout TLV.
pub const TLV_TIMEOUT: u8 = 2;

/// Challenge TLV.
pub const TLV_CHALLENGE: u8 = 3;

/// Response TLV.
pub const TLV_RESPONSE: u8 = 4;

/// Link-layer Frame Counter TLV.
pub const TLV_LL_FRAME_COUNTER: u8 = 5;

/// MLE Frame Counter TLV.
pub const TLV_MLE_FRAME_COUNTER: u8 = 8;
