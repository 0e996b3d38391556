//! Ports (hexagonal architecture seams).

pub mod outbound;

pub use outbound::{BanUpdate, Cipher, IdleScope, StateStore, SystemTimeSource, TimeSource};
