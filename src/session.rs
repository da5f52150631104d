//! Session-domain token material and the derived status record.

pub mod secret;
pub mod status;

pub use secret::*;
pub use status::*;
