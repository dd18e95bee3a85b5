//! 物理帧分配器（coremap）
//!
//! 本模块提供物理页帧的分配和跟踪功能。
//!
//! ## 簿记策略（coremap）
//!
//! 分配器为每个物理帧维护一个字节大小的表项（[`CoremapFlags`]）：
//!
//! - **FREE**：该帧空闲
//! - **BLOCK_END**：该帧是一次多帧分配的最后一帧
//!
//! 簿记数组是**自托管**的：初始化时直接放置在平台报告的第一个
//! 空闲物理地址处，随后把数组自身（以及更早的内核映像）所占的
//! 帧标记为已用。
//!
//! 分配流程：
//!
//! 1. 连续帧分配：线性 first-fit 扫描 n 个连续空闲帧，
//!    无碎片规避、无整理、无 best-fit
//! 2. 整块标记：run 内所有帧清除 FREE，只有最后一帧置 BLOCK_END
//! 3. 返回前将整块后备内存清零
//!
//! 释放时从起始帧向前走，直到（并包括）携带 BLOCK_END 的帧为止，
//! 因此调用方必须传入真正的块起始地址（debug 构建下会校验）。
//!
//! ## 自举回退
//!
//! 在 [`FrameAllocator::init`] 之前的分配退回到平台的"偷页"
//! 设施：无簿记的 bump 分配，这些页永不回收。
//!
//! ## 并发
//!
//! 一把粗粒度自旋锁串行化全部 allocate / free / 扫描操作。

use core::fmt;

use bitflags::bitflags;
use sync::SpinLock;

use crate::address::Paddr;
use crate::config::PAGE_SIZE;
use crate::machine::MachineOps;

bitflags! {
    /// 每个物理帧在 coremap 中的状态位
    #[derive(Copy, Clone, PartialEq, Eq, Debug)]
    pub struct CoremapFlags: u8 {
        /// 帧空闲
        const FREE = 1 << 0;
        /// 帧是一次分配的最后一帧
        const BLOCK_END = 1 << 1;
    }
}

/// 帧分配失败的原因
///
/// 两种情况对故障路径都表现为内存耗尽，但对诊断很有价值：
/// `Fragmented` 说明空闲帧足够、只是没有足够长的连续 run。
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum AllocError {
    /// 空闲帧总数不足
    Exhausted,
    /// 空闲帧足够，但没有满足长度的连续 run
    Fragmented,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::Exhausted => write!(f, "out of physical frames"),
            AllocError::Fragmented => write!(f, "no contiguous run of free frames"),
        }
    }
}

/// 帧分配器的统计信息
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct FrameStats {
    /// 总帧数
    pub total: usize,
    /// 已分配（含内核映像与 coremap 自身占用）的帧数
    pub used: usize,
    /// 空闲帧数
    pub free: usize,
}

// ============================================================================
// CoreMap - 锁内状态
// ============================================================================

/// coremap 的锁内状态
///
/// `entries_kva == 0` 表示尚未初始化（此时走自举偷页路径）。
struct CoreMap {
    /// 簿记数组在内核窗口中的起始地址
    entries_kva: usize,
    /// 总帧数
    nframes: usize,
    /// 空闲帧数（快速统计与耗尽/碎片区分）
    free_frames: usize,
}

impl CoreMap {
    const fn new() -> Self {
        CoreMap {
            entries_kva: 0,
            nframes: 0,
            free_frames: 0,
        }
    }

    fn initialized(&self) -> bool {
        self.entries_kva != 0
    }

    /// 以切片形式访问自托管的簿记数组
    fn entries(&mut self) -> &mut [CoremapFlags] {
        debug_assert!(self.initialized());
        // SAFETY: entries_kva 指向 init 时保留的 nframes 字节，
        // 且只在持有分配器锁时访问
        unsafe {
            core::slice::from_raw_parts_mut(self.entries_kva as *mut CoremapFlags, self.nframes)
        }
    }

    /// 线性 first-fit 扫描 n 个连续空闲帧，返回起始帧号
    fn find_contiguous(&mut self, npages: usize) -> Option<usize> {
        let mut run = 0;
        let mut start = 0;
        for (idx, entry) in self.entries().iter().enumerate() {
            if entry.contains(CoremapFlags::FREE) {
                if run == 0 {
                    start = idx;
                }
                run += 1;
                if run == npages {
                    return Some(start);
                }
            } else {
                run = 0;
            }
        }
        None
    }
}

// ============================================================================
// FrameAllocator - 公共接口
// ============================================================================

/// 物理帧分配器
///
/// 在启动时构造一个实例，作为内核内存管理上下文的一部分共享
/// （依赖注入，而非环境全局量）；生命周期覆盖内核整个运行期。
pub struct FrameAllocator {
    machine: &'static dyn MachineOps,
    inner: SpinLock<CoreMap>,
}

impl FrameAllocator {
    /// 创建一个未初始化的帧分配器
    ///
    /// 在调用 [`FrameAllocator::init`] 之前，分配走平台的偷页回退。
    pub fn new(machine: &'static dyn MachineOps) -> Self {
        FrameAllocator {
            machine,
            inner: SpinLock::new(CoreMap::new()),
        }
    }

    /// 所属平台
    pub fn machine(&self) -> &'static dyn MachineOps {
        self.machine
    }

    /// 初始化 coremap
    ///
    /// 由 RAM 大小算出帧数，把簿记数组放在第一个空闲物理地址处，
    /// 先把所有帧标记为空闲，再把内核映像与簿记数组自身占用的
    /// 帧标记为已用。
    pub fn init(&self) {
        let ram_size = self.machine.ram_size();
        let nframes = ram_size / PAGE_SIZE;
        let first_free = self.machine.first_free();

        let mut cm = self.inner.lock();
        debug_assert!(!cm.initialized(), "coremap initialized twice");

        cm.entries_kva = self.machine.paddr_to_kvaddr(first_free);
        cm.nframes = nframes;

        for entry in cm.entries().iter_mut() {
            *entry = CoremapFlags::FREE | CoremapFlags::BLOCK_END;
        }

        // 内核映像、已偷取页和 coremap 自身所覆盖的帧不可分配
        let meta_end = first_free.as_usize() + nframes * core::mem::size_of::<CoremapFlags>();
        let reserved = meta_end.div_ceil(PAGE_SIZE);
        for entry in cm.entries()[..reserved].iter_mut() {
            entry.remove(CoremapFlags::FREE);
        }
        cm.free_frames = nframes - reserved;

        log::info!(
            "coremap: {} frames, {} reserved for kernel image and coremap",
            nframes,
            reserved
        );
    }

    /// 分配 `npages` 个连续物理帧，返回起始物理地址
    ///
    /// 后备内存已清零。初始化之前退回平台偷页（无簿记，永不回收）。
    pub fn alloc_pages(&self, npages: usize) -> Result<Paddr, AllocError> {
        debug_assert!(npages >= 1);

        let mut cm = self.inner.lock();
        if !cm.initialized() {
            drop(cm);
            let paddr = self.machine.steal_pages(npages);
            self.zero_fill(paddr, npages);
            return Ok(paddr);
        }

        if npages > cm.free_frames {
            log::warn!(
                "coremap: request for {} pages exceeds {} free frames",
                npages,
                cm.free_frames
            );
            return Err(AllocError::Exhausted);
        }

        let Some(start) = cm.find_contiguous(npages) else {
            log::warn!(
                "coremap: {} free frames but no contiguous run of {}",
                cm.free_frames,
                npages
            );
            return Err(AllocError::Fragmented);
        };

        let entries = cm.entries();
        for entry in entries[start..start + npages].iter_mut() {
            *entry = CoremapFlags::empty();
        }
        entries[start + npages - 1].insert(CoremapFlags::BLOCK_END);
        cm.free_frames -= npages;
        drop(cm);

        // 帧已标记为已用，清零可以放在锁外
        let paddr = Paddr(start * PAGE_SIZE);
        self.zero_fill(paddr, npages);
        Ok(paddr)
    }

    /// 释放一次 [`FrameAllocator::alloc_pages`] 返回的整块帧
    ///
    /// 从起始帧向前标记为空闲，直到（并包括）携带 BLOCK_END 的帧。
    /// `paddr` 必须是某次分配返回的块起始地址。
    pub fn free_pages(&self, paddr: Paddr) {
        debug_assert!(paddr.is_page_aligned());
        let index = paddr.as_usize() / PAGE_SIZE;

        let mut cm = self.inner.lock();
        debug_assert!(cm.initialized(), "free_pages before coremap init");
        debug_assert!(index < cm.nframes, "free_pages: frame out of range");

        let entries = cm.entries();
        debug_assert!(
            !entries[index].contains(CoremapFlags::FREE),
            "free_pages: frame is not allocated"
        );
        // 块起始帧的前一帧要么空闲，要么是上一个块的末尾
        debug_assert!(
            index == 0
                || entries[index - 1].contains(CoremapFlags::FREE)
                || entries[index - 1].contains(CoremapFlags::BLOCK_END),
            "free_pages: address is not the start of an allocation"
        );

        let mut freed = 0;
        let mut i = index;
        loop {
            let is_end = entries[i].contains(CoremapFlags::BLOCK_END);
            entries[i] = CoremapFlags::FREE | CoremapFlags::BLOCK_END;
            freed += 1;
            if is_end {
                break;
            }
            i += 1;
        }
        cm.free_frames += freed;
    }

    /// 分配 `npages` 个连续内核页，返回内核窗口虚拟地址
    pub fn alloc_kpages(&self, npages: usize) -> Result<usize, AllocError> {
        let paddr = self.alloc_pages(npages)?;
        Ok(self.machine.paddr_to_kvaddr(paddr))
    }

    /// 释放 [`FrameAllocator::alloc_kpages`] 返回的内核页
    pub fn free_kpages(&self, kvaddr: usize) {
        self.free_pages(self.machine.kvaddr_to_paddr(kvaddr));
    }

    /// 当前统计：总帧数 / 已用 / 空闲（初始化之前全为 0）
    pub fn stats(&self) -> FrameStats {
        let cm = self.inner.lock();
        FrameStats {
            total: cm.nframes,
            used: cm.nframes - cm.free_frames,
            free: cm.free_frames,
        }
    }

    /// 将一段帧的后备内存清零
    fn zero_fill(&self, paddr: Paddr, npages: usize) {
        let kva = self.machine.paddr_to_kvaddr(paddr);
        // SAFETY: [paddr, paddr + npages * PAGE_SIZE) 刚被本分配器
        // 标记为已用（或刚被偷取），没有其他引用
        unsafe {
            core::ptr::write_bytes(kva as *mut u8, 0, npages * PAGE_SIZE);
        }
    }
}
