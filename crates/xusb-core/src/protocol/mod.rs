//! Protocol vocabulary: status codes, control codes, and transfer blocks.

pub mod control_code;
pub mod status;
pub mod transfer;
