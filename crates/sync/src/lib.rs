//! 同步原语
//!
//! 向其它内核模块提供基本的锁和中断保护原语。
//!
//! # 架构依赖
//!
//! 此 crate 通过 [`ArchOps`] trait 抽象架构相关的中断控制。
//! 内核启动时通过 [`register_arch_ops`] 注册实现；
//! 在注册之前（启动早期、宿主机单元测试），中断保护退化为 no-op，
//! 锁本身的互斥语义不受影响。

#![no_std]

mod intr_guard;
mod spin_lock;

pub use intr_guard::IntrGuard;
pub use spin_lock::{RawSpinLock, SpinLock, SpinLockGuard};

use core::sync::atomic::{AtomicUsize, Ordering};

/// 架构相关操作的 trait
///
/// 由内核的 arch 层实现并注册，提供本地 CPU 的中断控制。
pub trait ArchOps: Send + Sync {
    /// 读取并禁用本地中断，返回之前的中断状态
    ///
    /// # Safety
    /// 只能在内核态调用；返回值只能交给 [`ArchOps::restore_interrupts`]。
    unsafe fn read_and_disable_interrupts(&self) -> usize;

    /// 恢复中断状态
    ///
    /// # Safety
    /// `flags` 必须是同一 CPU 上 `read_and_disable_interrupts` 的返回值。
    unsafe fn restore_interrupts(&self, flags: usize);
}

// fat pointer 的两个部分分开存储，data == 0 表示尚未注册
static ARCH_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static ARCH_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册架构操作实现
///
/// # Safety
/// 必须在单线程环境下调用，且只能调用一次。
pub unsafe fn register_arch_ops(ops: &'static dyn ArchOps) {
    let ptr = ops as *const dyn ArchOps;
    // SAFETY: dyn trait 指针的布局是 (data, vtable)
    let (data, vtable) = unsafe { core::mem::transmute::<*const dyn ArchOps, (usize, usize)>(ptr) };
    ARCH_OPS_VTABLE.store(vtable, Ordering::Release);
    ARCH_OPS_DATA.store(data, Ordering::Release);
}

/// 获取已注册的架构操作实例；尚未注册时返回 None
#[inline]
pub(crate) fn arch_ops() -> Option<&'static dyn ArchOps> {
    let data = ARCH_OPS_DATA.load(Ordering::Acquire);
    if data == 0 {
        return None;
    }
    let vtable = ARCH_OPS_VTABLE.load(Ordering::Acquire);
    // SAFETY: data 和 vtable 由 register_arch_ops 写入，指向 'static 实例
    Some(unsafe { &*core::mem::transmute::<(usize, usize), *const dyn ArchOps>((data, vtable)) })
}
