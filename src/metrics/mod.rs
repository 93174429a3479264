pub mod build_info;
pub mod nodepool;
pub(crate) mod util;
