pub mod account;
pub mod common;
pub mod migrate;
pub mod quota;
