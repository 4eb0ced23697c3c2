pub mod chat;
pub mod response;

pub use chat::*;
