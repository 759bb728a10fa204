//! 块层
//!
//! - `device`: [`BlockDevice`] trait，块号到扇区的换算，缓存写回
//! - `io`: 整块读写和两段式读取（`submit_read` 之后 `wait_read`）
//! - `handle`: [`Block`]，对单个块的独占访问

mod device;
mod handle;
mod io;

pub use device::{BlockDev, BlockDevice};
pub use handle::Block;
