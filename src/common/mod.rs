pub mod protocol;
pub mod token;
