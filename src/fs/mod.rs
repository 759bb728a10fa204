//! 卷高级 API
//!
//! [`Volume`] 是对外入口：持有卷级读写屏障和卷状态，提供带命名空间前缀的 xattr 接口。

mod types;
mod volume;

pub use types::{VolumeConfig, VolumeStats};
pub use volume::{Volume, VolumeState};
