pub mod profiles;
pub mod system;

pub use profiles::*;
pub use system::*;
