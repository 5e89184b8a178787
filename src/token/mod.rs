//! Credential domain: claims inspection, encryption at rest, the durable
//! store, and the refresh handshake.

pub mod claims;
pub mod crypto;
pub mod refresh;
pub mod store;

pub use claims::{EXPIRY_LEAD_SECS, TokenClaims, decode_unverified, is_expired};
pub use crypto::TokenCrypto;
pub use refresh::{ChallengeSigner, SecretSigner, TokenRefresh, TokenRefresher};
pub use store::{TokenSlot, TokenStore};
