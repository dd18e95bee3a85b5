//! 中断控制的 Mock 实现

use core::sync::atomic::{AtomicBool, Ordering};

/// Mock 的本地中断控制
///
/// 用一个原子布尔量模拟"中断使能位"，供宿主机测试验证
/// 禁用/恢复配对是否正确。
pub struct MockIntrOps {
    enabled: AtomicBool,
}

impl MockIntrOps {
    /// 创建一个新的 Mock（初始状态：中断开启）
    pub const fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
        }
    }

    /// 读取并禁用"中断"，返回之前的状态
    pub fn read_and_disable_interrupts(&self) -> usize {
        self.enabled.swap(false, Ordering::SeqCst) as usize
    }

    /// 恢复"中断"状态
    pub fn restore_interrupts(&self, flags: usize) {
        self.enabled.store(flags != 0, Ordering::SeqCst);
    }

    /// 当前"中断"是否开启（仅测试断言用）
    pub fn interrupts_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

impl Default for MockIntrOps {
    fn default() -> Self {
        Self::new()
    }
}

/// 全局 Mock 实例
pub static MOCK_INTR_OPS: MockIntrOps = MockIntrOps::new();
