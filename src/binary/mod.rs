//! Binary protobuf wire format: scanner, decoder, encoder, size pass.

pub mod decode;
pub mod encode;
pub mod scan;
