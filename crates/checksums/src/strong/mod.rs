//! Strong digests: MD4 for block confirmation, MD5 for whole files.

mod md4;
mod md5;

pub use md4::Md4;
pub use md5::Md5;
