//! Proto3-canonical JSON: scanner, decoder, encoder, well-known type
//! mappings.

pub mod decode;
pub mod encode;
pub mod scan;

mod base64;
mod well_known;
