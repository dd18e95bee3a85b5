//! 集成测试共用的平台桩与构造辅助

// 每个测试二进制只用到这里的一部分
#![allow(dead_code)]

use test_support::mock::MockMachine;
use vm::{FrameAllocator, MachineOps, Paddr, Vm};

/// 把 [`MockMachine`] 适配成 [`MachineOps`]
///
/// test-support 不依赖内核 crate，mock 只提供固有方法，
/// 由使用方完成 trait 适配。
pub struct TestMachine(&'static MockMachine);

impl MachineOps for TestMachine {
    fn ram_size(&self) -> usize {
        self.0.ram_size()
    }

    fn first_free(&self) -> Paddr {
        Paddr(self.0.first_free())
    }

    fn steal_pages(&self, npages: usize) -> Paddr {
        Paddr(self.0.steal_pages(npages))
    }

    fn paddr_to_kvaddr(&self, paddr: Paddr) -> usize {
        self.0.paddr_to_kvaddr(paddr.as_usize())
    }

    fn kvaddr_to_paddr(&self, kvaddr: usize) -> Paddr {
        Paddr(self.0.kvaddr_to_paddr(kvaddr))
    }
}

/// 默认测试机：4 MiB RAM，64 KiB 内核映像
pub const TEST_RAM: usize = 4 * 1024 * 1024;
pub const TEST_KERNEL: usize = 64 * 1024;

pub fn leak_machine(ram_size: usize, kernel_reserved: usize) -> &'static dyn MachineOps {
    Box::leak(Box::new(TestMachine(MockMachine::leak(
        ram_size,
        kernel_reserved,
    ))))
}

/// 一台已初始化 coremap 的默认测试机上的 VM 上下文
pub fn boot_vm() -> Vm {
    Vm::bootstrap(leak_machine(TEST_RAM, TEST_KERNEL))
}

/// 小内存机器上的 VM 上下文（便于测试耗尽路径）
pub fn boot_small_vm(ram_pages: usize) -> Vm {
    Vm::bootstrap(leak_machine(ram_pages * 4096, 4096))
}

pub fn allocator_on_default_machine() -> FrameAllocator {
    FrameAllocator::new(leak_machine(TEST_RAM, TEST_KERNEL))
}
