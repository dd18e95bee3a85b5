//! 软件遍历的两级页表
//!
//! 用户地址空间使用 1024 x 1024 的两级映射结构：
//!
//! - 第一级：页目录，1024 项，每项惰性指向一张二级表
//! - 第二级：页表，恰好占用一个物理帧（1024 个 32 位表项）
//!
//! 32 位虚拟地址的划分为 10 / 10 / 12：高 10 位索引页目录，
//! 次 10 位索引二级表，低 12 位是页内偏移（见 [`crate::address`]）。
//!
//! 表项布局沿用硬件回填格式：高 20 位是帧号，VALID / DIRTY
//! 在低位。硬件从不遍历这个结构，它只被故障处理路径读写。

use alloc::boxed::Box;

use bitflags::bitflags;

use crate::address::{Paddr, Vaddr};
use crate::config::{PAGE_FRAME, PD_ENTRIES, PT_ENTRIES};
use crate::coremap::{AllocError, FrameAllocator};

bitflags! {
    /// 表项低位的控制标志
    #[derive(Copy, Clone, PartialEq, Eq, Debug)]
    pub struct EntryFlags: u32 {
        /// 映射有效
        const VALID = 1 << 9;
        /// 可写
        const DIRTY = 1 << 10;
    }
}

/// 二级页表中的一个 32 位表项
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[repr(transparent)]
pub struct PageTableEntry(pub u32);

impl PageTableEntry {
    /// 空表项（无映射）
    pub const EMPTY: PageTableEntry = PageTableEntry(0);

    /// 由帧地址和可写性构造一个有效表项
    pub fn mapping(paddr: Paddr, writeable: bool) -> Self {
        debug_assert!(paddr.is_page_aligned());
        let mut flags = EntryFlags::VALID;
        if writeable {
            flags |= EntryFlags::DIRTY;
        }
        PageTableEntry(paddr.as_usize() as u32 | flags.bits())
    }

    /// 是否存在映射
    pub fn is_valid(&self) -> bool {
        EntryFlags::from_bits_truncate(self.0).contains(EntryFlags::VALID)
    }

    /// 是否可写
    pub fn is_writeable(&self) -> bool {
        EntryFlags::from_bits_truncate(self.0).contains(EntryFlags::DIRTY)
    }

    /// 表项指向的物理帧地址
    pub fn paddr(&self) -> Paddr {
        Paddr(self.0 as usize & PAGE_FRAME)
    }

    /// 原始表项值
    pub fn bits(&self) -> u32 {
        self.0
    }
}

// ============================================================================
// PageTableNode - 一帧大小的二级表
// ============================================================================

/// 一张二级页表，恰好占用一个物理帧
///
/// 帧本身由所属地址空间的帧分配器持有，本结构只记录帧地址和
/// 其在内核窗口中的访问地址。表项读写使用 volatile 访问。
pub struct PageTableNode {
    base: Paddr,
    kva: usize,
}

impl PageTableNode {
    /// 从帧分配器取一帧作为新的二级表
    ///
    /// 帧由分配器清零，因此所有表项初始为空。
    pub fn alloc(allocator: &FrameAllocator) -> Result<Self, AllocError> {
        let base = allocator.alloc_pages(1)?;
        let kva = allocator.machine().paddr_to_kvaddr(base);
        Ok(PageTableNode { base, kva })
    }

    /// 表所在帧的物理地址
    pub fn base(&self) -> Paddr {
        self.base
    }

    /// 读第 `index` 个表项
    pub fn entry(&self, index: usize) -> PageTableEntry {
        debug_assert!(index < PT_ENTRIES);
        // SAFETY: kva 指向本表独占的一个完整帧
        unsafe { PageTableEntry((self.kva as *const u32).add(index).read_volatile()) }
    }

    /// 写第 `index` 个表项
    pub fn set_entry(&self, index: usize, entry: PageTableEntry) {
        debug_assert!(index < PT_ENTRIES);
        // SAFETY: 同上，写操作由地址空间的独占可变借用串行化
        unsafe {
            (self.kva as *mut u32).add(index).write_volatile(entry.0);
        }
    }

    /// 遍历所有有效表项，返回（索引，表项）
    pub fn valid_entries(&self) -> impl Iterator<Item = (usize, PageTableEntry)> + '_ {
        (0..PT_ENTRIES).filter_map(|i| {
            let entry = self.entry(i);
            entry.is_valid().then_some((i, entry))
        })
    }
}

// ============================================================================
// PageDirectory - 第一级
// ============================================================================

/// 页目录（第一级），1024 项，二级表惰性创建
pub struct PageDirectory {
    tables: Box<[Option<PageTableNode>]>,
}

impl PageDirectory {
    /// 创建一个空目录（无任何二级表）
    pub fn new() -> Self {
        let mut tables = alloc::vec::Vec::with_capacity(PD_ENTRIES);
        tables.resize_with(PD_ENTRIES, || None);
        PageDirectory {
            tables: tables.into_boxed_slice(),
        }
    }

    /// 取 `vaddr` 对应的二级表（如有）
    pub fn table(&self, vaddr: Vaddr) -> Option<&PageTableNode> {
        self.tables[vaddr.pd_index()].as_ref()
    }

    /// 取 `vaddr` 对应的二级表，不存在则从分配器新建一张
    pub fn table_or_create(
        &mut self,
        vaddr: Vaddr,
        allocator: &FrameAllocator,
    ) -> Result<&PageTableNode, AllocError> {
        let slot = &mut self.tables[vaddr.pd_index()];
        if slot.is_none() {
            *slot = Some(PageTableNode::alloc(allocator)?);
        }
        // 刚刚保证了 Some
        Ok(slot.as_ref().unwrap())
    }

    /// 遍历所有已创建的二级表，返回（目录索引，表）
    pub fn tables(&self) -> impl Iterator<Item = (usize, &PageTableNode)> {
        self.tables
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.as_ref().map(|t| (i, t)))
    }

    /// 已创建的二级表数量
    pub fn table_count(&self) -> usize {
        self.tables.iter().filter(|t| t.is_some()).count()
    }
}

impl Default for PageDirectory {
    fn default() -> Self {
        Self::new()
    }
}
