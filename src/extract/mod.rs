//! Payload decoders shared by the collectors.

pub mod fields;
pub mod path;
pub mod table;
