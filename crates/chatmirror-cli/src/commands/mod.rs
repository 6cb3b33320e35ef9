pub mod digest;
pub mod export;
pub mod status;
