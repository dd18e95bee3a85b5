//! 平台抽象
//!
//! [`MachineOps`] 把 VM 子系统与具体平台解耦：安装内存的大小、
//! 内核映像之后第一个空闲物理地址、自举期的"偷页"分配，
//! 以及物理地址与内核直映窗口虚拟地址的互转。
//!
//! 内核在 arch 层提供真实实现；宿主机测试注入模拟实现。
//! 按依赖注入方式使用：VM 对象持有 `&'static dyn MachineOps`，
//! 不存在进程级的全局注册点。

use crate::address::Paddr;

/// 平台相关的内存操作
pub trait MachineOps: Send + Sync {
    /// 安装的物理内存总大小（字节）
    fn ram_size(&self) -> usize;

    /// 第一个空闲物理地址（内核映像与已偷取页之后）
    ///
    /// 查询之后 [`MachineOps::steal_pages`] 即告失效，
    /// 帧分配器会把这里开始的内存用作自己的簿记数组。
    fn first_free(&self) -> Paddr;

    /// 自举期的 bump 分配：偷取 `npages` 个连续页
    ///
    /// 只在帧分配器初始化之前可用；偷取的页没有簿记，永不回收。
    /// 物理内存不足属于启动致命错误，由平台实现 panic。
    fn steal_pages(&self, npages: usize) -> Paddr;

    /// 物理地址转内核直映窗口虚拟地址
    fn paddr_to_kvaddr(&self, paddr: Paddr) -> usize;

    /// 内核直映窗口虚拟地址转物理地址
    fn kvaddr_to_paddr(&self, kvaddr: usize) -> Paddr;
}
