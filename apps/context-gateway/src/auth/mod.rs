pub mod access;
pub mod claims;
pub mod denial_log;
pub mod gate;
pub mod jwks;
pub mod verifier;
