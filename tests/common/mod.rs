#![allow(dead_code, unused_imports)]

pub use tradewatch_test_utils::builders;
pub use tradewatch_test_utils::fakes;
pub use tradewatch_test_utils::{eventually, init_tracing, settle, with_timeout};
