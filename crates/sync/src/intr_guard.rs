//! 中断保护器
//!
//! 基于 RAII 实现中断保护：创建时禁用本地中断，销毁时恢复之前的状态。
//!
//! 注意：禁用中断只能阻止**本地 CPU** 上"任务 vs 中断"的并发，
//! 不能阻止其他 CPU 的并行访问；跨 CPU 共享的数据仍需配合自旋锁。

use crate::arch_ops;

/// 中断保护器
///
/// 在创建时禁用本地中断并保存之前的状态，在 Drop 时恢复。
/// 若架构操作尚未注册（启动早期、宿主机测试），则保护器是 no-op。
///
/// # 示例
/// ```ignore
/// {
///     let _guard = IntrGuard::new(); // 禁用中断
///     // 临界区
/// } // 离开作用域，恢复中断状态
/// ```
pub struct IntrGuard {
    flags: Option<usize>,
}

impl IntrGuard {
    /// 禁用本地中断并返回保护器
    pub fn new() -> Self {
        // SAFETY: 在内核态创建保护器，flags 仅交还给同一实现恢复
        let flags = arch_ops().map(|ops| unsafe { ops.read_and_disable_interrupts() });
        IntrGuard { flags }
    }
}

impl Default for IntrGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IntrGuard {
    fn drop(&mut self) {
        if let (Some(ops), Some(flags)) = (arch_ops(), self.flags) {
            // SAFETY: flags 是创建时保存的本 CPU 中断状态
            unsafe { ops.restore_interrupts(flags) };
        }
    }
}
