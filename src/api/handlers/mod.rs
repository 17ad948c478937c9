pub mod ask;
pub mod backend;

pub use backend::AppState;
