//! Identity: credential normalization and verification, plus the in-chat
//! identity handshake state machine.

pub mod credentials;
pub mod handshake;
pub mod normalize;
