pub mod chunk;
pub mod message;
