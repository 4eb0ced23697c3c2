//! Session credentials: hashing/verification and the request-level gate.

pub mod credential;
pub mod gate;

pub use gate::SessionCredential;
