pub mod gesture;
pub mod history;
