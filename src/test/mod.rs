mod db;
pub mod utils;

pub use utils::test_db;
