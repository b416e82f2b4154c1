pub mod unique;
pub mod upload;
