//! 缺页处理
//!
//! 本模块是整个子系统的汇合点：[`Vm`] 聚合帧分配器与翻译缓存，
//! [`Vm::handle_fault`] 把一次硬件缺页走完整条路径：
//!
//! 1. 故障地址对齐到页边界
//! 2. 校验故障类型（只读写入视为内核缺陷，直接 panic）
//! 3. 在当前地址空间的区域表中确认地址合法
//! 4. 查两级页表，缺表 / 缺帧则按需分配
//! 5. 把映射写入翻译缓存的一个无效槽
//!
//! 任何一步失败都返回错误让上层把故障转成用户可见的信号，
//! 唯独只读故障例外：本设计里缓存映射总是可写的，硬件根本
//! 不会产生这种故障，出现即说明状态被破坏。

use core::fmt;

use alloc::sync::Arc;

use sync::SpinLock;

use crate::address::{Paddr, Vaddr};
use crate::addrspace::AddressSpace;
use crate::coremap::{AllocError, FrameAllocator, FrameStats};
use crate::tlb::TranslationCache;

/// 硬件上报的缺页类型
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum FaultKind {
    /// 读缺页
    Read,
    /// 写缺页
    Write,
    /// 对只读映射的写入
    ReadOnly,
}

impl FaultKind {
    /// 从陷入路径的原始故障码解码
    pub fn from_code(code: usize) -> Result<Self, VmError> {
        match code {
            0 => Ok(FaultKind::Read),
            1 => Ok(FaultKind::Write),
            2 => Ok(FaultKind::ReadOnly),
            _ => Err(VmError::InvalidFaultKind),
        }
    }
}

/// 缺页处理的失败原因
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum VmError {
    /// 无法识别的故障类型码
    InvalidFaultKind,
    /// 当前没有激活的地址空间
    NoActiveContext,
    /// 故障地址不在任何已声明区域内
    BadAddress,
    /// 物理帧耗尽（含碎片化导致的连续分配失败）
    OutOfMemory,
    /// 翻译缓存无可用槽位
    ResourceExhausted,
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::InvalidFaultKind => write!(f, "unrecognized fault type"),
            VmError::NoActiveContext => write!(f, "no active address space"),
            VmError::BadAddress => write!(f, "address outside any defined region"),
            VmError::OutOfMemory => write!(f, "out of physical memory"),
            VmError::ResourceExhausted => write!(f, "translation cache full"),
        }
    }
}

impl From<AllocError> for VmError {
    fn from(_: AllocError) -> Self {
        VmError::OutOfMemory
    }
}

/// 本子系统的通用返回类型
pub type VmResult<T> = Result<T, VmError>;

/// 虚拟内存上下文
///
/// 启动时构造一个实例并注入给需要它的各方，不使用环境全局量。
pub struct Vm {
    frame_allocator: Arc<FrameAllocator>,
    tlb: SpinLock<TranslationCache>,
}

impl Vm {
    /// 由已构造的帧分配器组建上下文
    pub fn new(frame_allocator: Arc<FrameAllocator>) -> Self {
        Vm {
            frame_allocator,
            tlb: SpinLock::new(TranslationCache::new()),
        }
    }

    /// 启动路径：创建帧分配器并初始化 coremap
    pub fn bootstrap(machine: &'static dyn crate::machine::MachineOps) -> Self {
        let allocator = Arc::new(FrameAllocator::new(machine));
        allocator.init();
        Vm::new(allocator)
    }

    /// 帧分配器的共享引用
    pub fn frame_allocator(&self) -> &Arc<FrameAllocator> {
        &self.frame_allocator
    }

    /// 创建一个挂在本上下文分配器上的空地址空间
    pub fn create_address_space(&self) -> AddressSpace {
        AddressSpace::new(Arc::clone(&self.frame_allocator))
    }

    /// 处理一次缺页
    ///
    /// `space` 是当前激活的地址空间；`None` 表示陷入发生在没有
    /// 用户上下文的地方（如中断早期），返回 [`VmError::NoActiveContext`]。
    pub fn handle_fault(
        &self,
        space: Option<&mut AddressSpace>,
        kind: FaultKind,
        vaddr: Vaddr,
    ) -> VmResult<()> {
        let vpage = vaddr.page_base();

        match kind {
            FaultKind::Read | FaultKind::Write => {}
            // 缓存里的映射总是可写的，该故障意味着状态被破坏
            FaultKind::ReadOnly => {
                panic!("write to read-only translation at {:#x}", vaddr.as_usize());
            }
        }

        let Some(space) = space else {
            log::warn!("vm: fault at {:#x} with no active address space", vaddr.as_usize());
            return Err(VmError::NoActiveContext);
        };

        if space.find_region(vpage).is_none() {
            log::debug!("vm: fault at {:#x} outside any region", vaddr.as_usize());
            return Err(VmError::BadAddress);
        }

        let entry = space.ensure_mapped(vpage)?;

        let mut tlb = self.tlb.lock();
        match tlb.install(vpage, entry.paddr()) {
            Ok(slot) => {
                log::trace!(
                    "vm: {:#x} -> {:#x} in slot {}",
                    vpage.as_usize(),
                    entry.paddr().as_usize(),
                    slot
                );
                Ok(())
            }
            Err(_) => {
                log::warn!("vm: translation cache full at {:#x}", vaddr.as_usize());
                Err(VmError::ResourceExhausted)
            }
        }
    }

    /// 陷入层入口：解码原始故障码后处理缺页
    ///
    /// 故障码无法识别时不触碰任何状态。
    pub fn handle_fault_code(
        &self,
        space: Option<&mut AddressSpace>,
        code: usize,
        vaddr: Vaddr,
    ) -> VmResult<()> {
        self.handle_fault(space, FaultKind::from_code(code)?, vaddr)
    }

    /// 切换到 `space`：作废整个翻译缓存
    ///
    /// 翻译缓存不带地址空间标签，残留的旧映射会串到新空间。
    pub fn activate(&self, _space: &AddressSpace) {
        self.tlb.lock().invalidate_all();
    }

    /// 取消激活当前地址空间
    ///
    /// 留给带缓存标签的实现使用，目前无事可做。
    pub fn deactivate(&self) {}

    /// 查询翻译缓存中的映射（诊断用）
    pub fn tlb_lookup(&self, vaddr: Vaddr) -> Option<Paddr> {
        self.tlb.lock().lookup(vaddr.page_base())
    }

    /// 翻译缓存中当前有效的槽位数（诊断用）
    pub fn tlb_valid_count(&self) -> usize {
        self.tlb.lock().valid_count()
    }

    /// 帧使用统计
    pub fn frame_stats(&self) -> FrameStats {
        self.frame_allocator.stats()
    }

    /// 跨核缓存击落单条映射（本设计单核，不应到达）
    pub fn tlb_shootdown(&self, vaddr: Vaddr) {
        panic!("tlb shootdown not supported ({:#x})", vaddr.as_usize());
    }

    /// 跨核缓存整体击落（本设计单核，不应到达）
    pub fn tlb_shootdown_all(&self) {
        panic!("tlb shootdown not supported");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_code_decoding() {
        assert_eq!(FaultKind::from_code(0), Ok(FaultKind::Read));
        assert_eq!(FaultKind::from_code(1), Ok(FaultKind::Write));
        assert_eq!(FaultKind::from_code(2), Ok(FaultKind::ReadOnly));
        assert_eq!(FaultKind::from_code(3), Err(VmError::InvalidFaultKind));
        assert_eq!(FaultKind::from_code(usize::MAX), Err(VmError::InvalidFaultKind));
    }

    #[test]
    fn alloc_error_maps_to_out_of_memory() {
        assert_eq!(VmError::from(AllocError::Exhausted), VmError::OutOfMemory);
        assert_eq!(VmError::from(AllocError::Fragmented), VmError::OutOfMemory);
    }
}
