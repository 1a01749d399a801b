mod arbitrary;
mod cbor_vectors;
mod chunk_helpers;
mod parse_bad;
pub(crate) mod utils;
