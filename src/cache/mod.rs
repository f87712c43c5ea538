//! 非对齐页缓存模块
//!
//! NAND 页在一次擦除周期内通常只能编程一次，而介质层的调用者按任意字节范围读写。
//! 本模块用一个写缓冲和一个读缓冲把零散的小写入合并成一次页编程，
//! 同时保证部分页写入不会覆盖同页中未被写到的字节。
//!
//! # 主要组件
//!
//! - [`PageCache`] - 写缓冲 + 读缓冲，以及刷新逻辑
//! - [`PageBuffer`] - 单页缓冲，记录缓存的是哪一页
//! - [`PageFlags`] - 缓冲状态标志
//! - [`PageCacheStats`] - 命中、预读、刷新统计
//!
//! # 使用示例
//!
//! ```rust,ignore
//! use mapped_nand::cache::PageCache;
//!
//! let mut cache = PageCache::new(mapped.model().page_data_size() as usize);
//!
//! // 部分页写入：留在写缓冲
//! cache.write_page_region(&mut mapped, 0, 0, 16, &data)?;
//!
//! // 读取同一页：从写缓冲返回，不读设备
//! cache.read_page_region(&mut mapped, 0, 0, 16, &mut out)?;
//!
//! // 显式刷新
//! cache.flush_write_page(&mut mapped)?;
//! ```

mod buffer;
mod page_cache;

pub use buffer::{PageBuffer, PageFlags, PageSlot};
pub use page_cache::{PageCache, PageCacheStats};
