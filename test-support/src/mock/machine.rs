//! 物理内存平台的 Mock 实现
//!
//! 在宿主机堆上租用一块对齐的内存充当"物理内存"，
//! 物理地址 0 对应这块内存的起始；内核直映窗口是恒等偏移：
//! `kvaddr = arena_base + paddr`。
//!
//! 每个测试各自创建一个 [`MockMachine`]（独立 arena），
//! 测试之间互不干扰，可以并行运行。

use core::alloc::Layout;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Mock 页大小（与内核约定一致，但此 crate 不依赖内核 crate）
const PAGE_SIZE: usize = 4096;

/// 模拟的物理内存平台
///
/// - `ram_size` 字节的"物理内存"，页对齐
/// - 底部 `kernel_reserved` 字节视为内核映像占用，
///   steal 分配从这里之后开始
/// - `first_free()` 被查询后冻结 steal（与启动流程一致：
///   自举分配只发生在帧分配器初始化之前）
pub struct MockMachine {
    arena_base: usize,
    ram_size: usize,
    first_free: AtomicUsize,
    steal_frozen: AtomicBool,
}

impl MockMachine {
    /// 创建一个新的模拟平台并泄漏为 `'static`
    ///
    /// # Panics
    /// arena 分配失败时 panic（仅测试环境）。
    pub fn leak(ram_size: usize, kernel_reserved: usize) -> &'static Self {
        assert!(ram_size % PAGE_SIZE == 0, "ram_size must be page aligned");
        assert!(kernel_reserved % PAGE_SIZE == 0);
        assert!(kernel_reserved < ram_size);

        let layout = Layout::from_size_align(ram_size, PAGE_SIZE).unwrap();
        // SAFETY: layout 非零大小；arena 被有意泄漏，生命周期为 'static
        let arena = unsafe { alloc::alloc::alloc_zeroed(layout) };
        assert!(!arena.is_null(), "mock arena allocation failed");

        alloc::boxed::Box::leak(alloc::boxed::Box::new(MockMachine {
            arena_base: arena as usize,
            ram_size,
            first_free: AtomicUsize::new(kernel_reserved),
            steal_frozen: AtomicBool::new(false),
        }))
    }

    /// "安装的物理内存"总大小（字节）
    pub fn ram_size(&self) -> usize {
        self.ram_size
    }

    /// 第一个空闲物理地址；此后 steal 被冻结
    pub fn first_free(&self) -> usize {
        self.steal_frozen.store(true, Ordering::SeqCst);
        self.first_free.load(Ordering::SeqCst)
    }

    /// 自举期的 bump 分配：偷取 `npages` 页，返回起始物理地址
    ///
    /// # Panics
    /// 在 `first_free()` 被查询之后调用，或物理内存不足时 panic。
    pub fn steal_pages(&self, npages: usize) -> usize {
        assert!(
            !self.steal_frozen.load(Ordering::SeqCst),
            "steal_pages after first_free was taken"
        );
        let bytes = npages * PAGE_SIZE;
        let paddr = self.first_free.fetch_add(bytes, Ordering::SeqCst);
        assert!(paddr + bytes <= self.ram_size, "mock RAM exhausted by steal");
        paddr
    }

    /// 物理地址转内核窗口虚拟地址
    pub fn paddr_to_kvaddr(&self, paddr: usize) -> usize {
        debug_assert!(paddr < self.ram_size);
        self.arena_base + paddr
    }

    /// 内核窗口虚拟地址转物理地址
    pub fn kvaddr_to_paddr(&self, kvaddr: usize) -> usize {
        debug_assert!(kvaddr >= self.arena_base && kvaddr < self.arena_base + self.ram_size);
        kvaddr - self.arena_base
    }
}
