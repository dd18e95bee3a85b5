//! # vm - LernOS 虚拟内存子系统
//!
//! 按需调页的用户内存管理：物理帧分配器（coremap）、软件遍历的
//! 两级页表、区域化的用户地址空间，以及把三者接起来的缺页处理
//! 路径和 64 槽翻译缓存。
//!
//! ## 模块组织
//!
//! - [`config`]: 页大小、地址划分、栈几何等布局常量
//! - [`address`]: 物理 / 虚拟地址的 newtype 与索引拆分
//! - [`machine`]: 平台依赖的陷入口（RAM 探测、内核直映窗口）
//! - [`coremap`]: 物理帧分配器，first-fit 连续分配
//! - [`page_table`]: 惰性建立的两级映射结构
//! - [`addrspace`]: 区域表 + 页目录组成的用户地址空间
//! - [`tlb`]: 软件管理的翻译缓存
//! - [`fault`]: 缺页处理与错误类型
//!
//! ## 设计要点
//!
//! 子系统不持有任何环境全局量：[`fault::Vm`] 在启动时构造，
//! 依赖通过引用注入，宿主机上可以并行跑多个独立实例做测试。

#![no_std]

extern crate alloc;

pub mod address;
pub mod addrspace;
pub mod config;
pub mod coremap;
pub mod fault;
pub mod machine;
pub mod page_table;
pub mod tlb;

pub use address::{Paddr, Ppn, Vaddr};
pub use addrspace::{AddressSpace, Region, RegionFlags};
pub use coremap::{AllocError, FrameAllocator, FrameStats};
pub use fault::{FaultKind, Vm, VmError, VmResult};
pub use machine::MachineOps;
