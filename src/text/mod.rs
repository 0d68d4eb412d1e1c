//! Proto text format: scanner, decoder, encoder.

pub mod decode;
pub mod encode;
pub mod scan;
