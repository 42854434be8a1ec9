pub mod completions;
pub mod fuse;
