pub mod resolve;
pub mod version;
