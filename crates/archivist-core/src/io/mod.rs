//! IO modules - side effects (network, compressed files)

pub mod compress;
pub mod fetch;
