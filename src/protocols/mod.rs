//! Application protocols served over the framewire runtime.
//!
//! - `guessing`: the number guessing game
//! - `echo`: frames every message straight back, for testing clients
//! - `smtp`: a minimal mail service speaking SMTP replies

pub mod echo;
pub mod guessing;
pub mod smtp;
