pub mod password;
pub mod user;

pub use password::*;
pub use user::*;
