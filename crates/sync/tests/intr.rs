//! 中断控制注册后的锁行为
//!
//! 注册是进程级一次性操作，全部断言放在同一个测试函数里，
//! 避免与并行运行的其他测试相互干扰。

use sync::{register_arch_ops, ArchOps, IntrGuard, SpinLock};
use test_support::mock::MOCK_INTR_OPS;

struct MockArch;

impl ArchOps for MockArch {
    unsafe fn read_and_disable_interrupts(&self) -> usize {
        MOCK_INTR_OPS.read_and_disable_interrupts()
    }

    unsafe fn restore_interrupts(&self, flags: usize) {
        MOCK_INTR_OPS.restore_interrupts(flags)
    }
}

#[test]
fn test_locks_disable_and_restore_interrupts() {
    // SAFETY: MockArch 无状态且 'static
    unsafe {
        register_arch_ops(&MockArch);
    }
    assert!(MOCK_INTR_OPS.interrupts_enabled());

    // IntrGuard 的禁用 / 恢复配对
    {
        let _guard = IntrGuard::new();
        assert!(!MOCK_INTR_OPS.interrupts_enabled());
        // 嵌套守卫退出时不提前恢复
        {
            let _inner = IntrGuard::new();
            assert!(!MOCK_INTR_OPS.interrupts_enabled());
        }
        assert!(!MOCK_INTR_OPS.interrupts_enabled());
    }
    assert!(MOCK_INTR_OPS.interrupts_enabled());

    // 自旋锁临界区内中断保持关闭
    let lock = SpinLock::new(0u32);
    {
        let mut value = lock.lock();
        *value += 1;
        assert!(!MOCK_INTR_OPS.interrupts_enabled());
    }
    assert!(MOCK_INTR_OPS.interrupts_enabled());
    assert_eq!(*lock.lock(), 1);
}
