pub mod text;

pub use text::{cap_bytes, truncate_chars, truncate_with_ellipsis};
