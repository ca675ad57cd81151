//! MLE service - Security layer
//!
//! Everything needed to protect one MLE message:
//!
//! - **Auxiliary security header**: [`SecurityHeader`] and [`KeyIdMode`]
//! - **Nonce**: [`construct_nonce`], `mac64 | frame_counter | level`
//! - **CCM\* envelope**: [`seal`] / [`open`] over AES-128, MIC of 0/4/8/16 bytes
//! - **Anti-replay**: [`check_frame_counter`] against a [`NeighborTable`]
//! - **Key material**: [`MleKey`] handed out by a [`KeyStore`]
//!
//! # Wire layout
//!
//! ```text
//! +--------+------------------+---------------------+-----------+
//! | marker | aux header       | payload (encrypted) | MIC       |
//! | 1 byte | 5/6/10/14 bytes  | variable            | 0/4/8/16  |
//! +--------+------------------+---------------------+-----------+
//! ```
//!
//! The marker is `0x00` for secured messages and `0xFF` for unsecured ones,
//! in which case the payload follows immediately.

mod aead;
mod header;
mod keys;
mod nonce;
mod replay;
mod store;

pub use aead::{construct_aad, open, seal};
pub use header::{KeyIdMode, SecurityHeader, mic_len};
pub use keys::MleKey;
pub use nonce::{construct_nonce, parse_nonce};
pub use replay::{
    NeighborMap, NeighborSecurity, NeighborTable, NoNeighbors, ReplayVerdict, check_frame_counter,
};
pub use store::{KeyStore, StaticKeyStore};
