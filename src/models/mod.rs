pub mod answer;
pub mod backend;
pub mod chart;
pub mod result_set;

pub use answer::*;
pub use backend::*;
pub use chart::*;
pub use result_set::*;
