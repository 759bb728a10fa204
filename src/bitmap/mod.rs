//! 位图操作

mod ops;

pub use ops::{clear_bit, count_set, find_first_zero, set_bit, test_bit};
