//! 自旋锁
//!
//! 基于 `lock_api` 的自旋锁实现：[`RawSpinLock`] 实现 `lock_api::RawMutex`，
//! [`SpinLock`] / [`SpinLockGuard`] 是相应的类型别名。
//!
//! 获取锁的同时禁用本地中断（通过已注册的 [`crate::ArchOps`]），
//! 释放锁时恢复之前的中断状态；这在单核上同时提供了
//! "任务 vs 中断"与"任务 vs 任务"的互斥。
//!
//! # 注意
//! 自旋锁不可重入：持有锁时再次 lock() 会死锁。
//! 持有锁期间中断被禁用，临界区应尽量短。

use core::hint;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use lock_api::{GuardSend, RawMutex};

use crate::arch_ops;

/// 表示"未保存中断状态"的哨兵值（架构操作未注册时使用）
const FLAGS_NONE: usize = usize::MAX;

/// 禁用中断的原始自旋锁
///
/// 被持有期间，`saved_flags` 记录加锁前的本地中断状态，由持锁者独占。
pub struct RawSpinLock {
    locked: AtomicBool,
    saved_flags: AtomicUsize,
}

impl RawSpinLock {
    /// 读取并禁用本地中断；未注册架构操作时返回哨兵值
    fn disable_interrupts() -> usize {
        match arch_ops() {
            // SAFETY: 在内核态调用，返回值仅交还给同一实现恢复
            Some(ops) => unsafe { ops.read_and_disable_interrupts() },
            None => FLAGS_NONE,
        }
    }

    /// 恢复 `disable_interrupts` 保存的中断状态
    fn restore_interrupts(flags: usize) {
        if flags != FLAGS_NONE {
            if let Some(ops) = arch_ops() {
                // SAFETY: flags 是本 CPU 之前保存的中断状态
                unsafe { ops.restore_interrupts(flags) };
            }
        }
    }
}

unsafe impl RawMutex for RawSpinLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: RawSpinLock = RawSpinLock {
        locked: AtomicBool::new(false),
        saved_flags: AtomicUsize::new(FLAGS_NONE),
    };

    type GuardMarker = GuardSend;

    fn lock(&self) {
        let flags = Self::disable_interrupts();

        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            hint::spin_loop();
        }

        // 此时锁已被持有，saved_flags 由本持锁者独占
        self.saved_flags.store(flags, Ordering::Relaxed);
    }

    fn try_lock(&self) -> bool {
        let flags = Self::disable_interrupts();

        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            self.saved_flags.store(flags, Ordering::Relaxed);
            true
        } else {
            // 获取失败，立即恢复中断状态
            Self::restore_interrupts(flags);
            false
        }
    }

    unsafe fn unlock(&self) {
        let flags = self.saved_flags.load(Ordering::Relaxed);
        self.locked.store(false, Ordering::Release);
        Self::restore_interrupts(flags);
    }
}

/// 提供互斥访问的自旋锁
///
/// # 示例
/// ```ignore
/// let lock = SpinLock::new(0);
/// {
///     let mut guard = lock.lock(); // 获取锁，禁用中断
///     *guard += 1;
/// } // 离开作用域，释放锁并恢复中断状态
/// ```
pub type SpinLock<T> = lock_api::Mutex<RawSpinLock, T>;

/// [`SpinLock`] 的 RAII 保护器
pub type SpinLockGuard<'a, T> = lock_api::MutexGuard<'a, RawSpinLock, T>;
