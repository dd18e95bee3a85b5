//! 虚拟内存布局常量
//!
//! 面向 32 位、4 KiB 页、两级页表的经典布局：
//! 虚拟地址按 10 / 10 / 12 位拆分为页目录索引、页表索引和页内偏移。

/// 页大小（字节）
pub const PAGE_SIZE: usize = 4096;

/// 页帧掩码：保留地址的页对齐部分
pub const PAGE_FRAME: usize = !(PAGE_SIZE - 1);

/// 页目录的槽数（虚拟地址高 10 位）
pub const PD_ENTRIES: usize = 1024;

/// 每个页表节点的表项数（虚拟地址中间 10 位）
pub const PT_ENTRIES: usize = 1024;

/// 页目录索引的移位量
pub const PD_SHIFT: usize = 22;

/// 页表索引的移位量
pub const PT_SHIFT: usize = 12;

/// 单级索引的掩码（10 位）
pub const LEVEL_INDEX_MASK: usize = 0x3ff;

/// 用户地址空间的上界（也是初始用户栈顶）
pub const USER_SPACE_TOP: usize = 0x8000_0000;

/// 用户栈的固定页数
pub const USER_STACK_PAGES: usize = 16;

/// 地址转换缓存（TLB）的槽数
pub const TLB_SIZE: usize = 64;
