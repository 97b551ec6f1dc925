pub mod analyzer;
pub mod attach;
pub mod authentication;
pub mod classifier;
pub mod context;
pub mod identity;
pub mod security_mode;
