pub mod client;
pub mod vision;

pub use client::GoogleLlm;
pub use vision::GoogleVisionLlm;
