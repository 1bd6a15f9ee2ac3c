pub mod types;
pub mod traits;

pub use types::*;
pub use traits::*;
