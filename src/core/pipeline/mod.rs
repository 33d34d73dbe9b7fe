pub mod images;
pub mod sentences;
