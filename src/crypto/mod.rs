//! Card cryptography: PAN generation, CVV derivation and PAN sealing.
//!
//! Each piece is a capability handed to the card engine, so tests can swap
//! the random source or the vault for deterministic fakes.

pub mod cvv;
pub mod random;
pub mod vault;

pub use cvv::CvvDeriver;
pub use random::{OsRandom, RandomSource, generate_pan};
pub use vault::{PanVault, SealedBoxVault};
