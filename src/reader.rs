mod bit_reader;
mod byte_reader;

pub(crate) use bit_reader::CodeReader;
pub(crate) use byte_reader::{GifRead, MAX_SUB_BLOCK_LEN};
