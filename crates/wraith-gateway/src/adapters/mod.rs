//! Adapters implementing the outbound ports.

pub mod cipher;
pub mod clock;
pub mod memory_store;

pub use cipher::EnvelopeCipher;
pub use clock::ManualClock;
pub use memory_store::InMemoryStateStore;
