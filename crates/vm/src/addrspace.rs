//! 用户地址空间与区域跟踪
//!
//! 一个地址空间由两部分组成：
//!
//! - 区域表：已声明的合法虚拟地址段（代码、数据、栈），
//!   只是元数据，声明时不分配任何帧
//! - 页目录：惰性建立的两级映射，帧在第一次缺页时才分配
//!
//! 区域记录声明时的权限与加载期的临时可写状态。加载可执行文件
//! 时先 [`AddressSpace::prepare_load`] 把所有区域临时置为可写，
//! 写完再 [`AddressSpace::complete_load`] 恢复声明权限。
//!
//! 复制地址空间时逐页分配新帧并拷贝内容，两个地址空间不共享
//! 任何帧，此后互不影响。

use alloc::sync::Arc;
use alloc::vec::Vec;

use bitflags::bitflags;

use crate::address::{Paddr, Vaddr};
use crate::config::{PAGE_SIZE, PD_SHIFT, PT_SHIFT, USER_SPACE_TOP, USER_STACK_PAGES};
use crate::coremap::{AllocError, FrameAllocator};
use crate::page_table::{PageDirectory, PageTableEntry};

bitflags! {
    /// 区域的访问权限
    #[derive(Copy, Clone, PartialEq, Eq, Debug)]
    pub struct RegionFlags: u8 {
        /// 可读
        const READ = 1 << 0;
        /// 可写
        const WRITE = 1 << 1;
        /// 可执行
        const EXEC = 1 << 2;
    }
}

/// 一段已声明的虚拟地址区域
///
/// `[vbase, vbase + npages * PAGE_SIZE)`，上界为开区间。
#[derive(Copy, Clone, Debug)]
pub struct Region {
    /// 起始虚拟地址（页对齐）
    pub vbase: Vaddr,
    /// 页数
    pub npages: usize,
    /// 当前生效的权限
    pub flags: RegionFlags,
    /// 声明时的可写性，加载结束后由此恢复
    original_writeable: bool,
}

impl Region {
    /// 区域的开区间上界
    pub fn vtop(&self) -> Vaddr {
        Vaddr(self.vbase.as_usize() + self.npages * PAGE_SIZE)
    }

    /// 地址是否落在区域内（上界不含）
    pub fn contains(&self, vaddr: Vaddr) -> bool {
        vaddr >= self.vbase && vaddr < self.vtop()
    }
}

/// 用户地址空间
///
/// 持有帧分配器的共享引用，映射帧与页表帧都从它取用并在
/// `Drop` 时归还。
pub struct AddressSpace {
    allocator: Arc<FrameAllocator>,
    directory: PageDirectory,
    regions: Vec<Region>,
}

impl AddressSpace {
    /// 创建一个空地址空间（无区域、无映射）
    pub fn new(allocator: Arc<FrameAllocator>) -> Self {
        AddressSpace {
            allocator,
            directory: PageDirectory::new(),
            regions: Vec::new(),
        }
    }

    /// 声明一段合法虚拟地址区域
    ///
    /// 起始地址向下对齐到页边界，长度相应补齐后向上取整页。
    /// 只记录元数据，不分配帧。允许与已有区域重叠，查找时
    /// 后声明的区域优先。
    pub fn define_region(&mut self, vaddr: Vaddr, size: usize, flags: RegionFlags) {
        let offset = vaddr.page_offset();
        let vbase = vaddr.page_base();
        let npages = (size + offset).div_ceil(PAGE_SIZE);

        log::debug!(
            "addrspace: region {:#x}..{:#x} flags {:?}",
            vbase.as_usize(),
            vbase.as_usize() + npages * PAGE_SIZE,
            flags
        );
        self.regions.push(Region {
            vbase,
            npages,
            flags,
            original_writeable: flags.contains(RegionFlags::WRITE),
        });
    }

    /// 声明用户栈区域，返回初始栈指针
    ///
    /// 栈顶贴着用户地址空间上界，大小固定。
    pub fn define_stack(&mut self) -> Vaddr {
        let size = USER_STACK_PAGES * PAGE_SIZE;
        self.define_region(
            Vaddr(USER_SPACE_TOP - size),
            size,
            RegionFlags::READ | RegionFlags::WRITE | RegionFlags::EXEC,
        );
        Vaddr(USER_SPACE_TOP)
    }

    /// 加载前把所有区域临时置为可写
    pub fn prepare_load(&mut self) {
        for region in &mut self.regions {
            region.flags.insert(RegionFlags::WRITE);
        }
    }

    /// 加载结束后恢复每个区域声明时的可写性
    pub fn complete_load(&mut self) {
        for region in &mut self.regions {
            if !region.original_writeable {
                region.flags.remove(RegionFlags::WRITE);
            }
        }
    }

    /// 查找覆盖 `vaddr` 的区域，后声明者优先
    pub fn find_region(&self, vaddr: Vaddr) -> Option<&Region> {
        self.regions.iter().rev().find(|r| r.contains(vaddr))
    }

    /// 区域数量
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// 查询虚拟页当前的映射（只读，不建立任何状态）
    pub fn lookup_page(&self, vaddr: Vaddr) -> Option<PageTableEntry> {
        let table = self.directory.table(vaddr)?;
        let entry = table.entry(vaddr.pt_index());
        entry.is_valid().then_some(entry)
    }

    /// 确保虚拟页有帧支撑，返回表项
    ///
    /// 已有映射则直接返回；否则按需创建二级表、分配并清零一帧，
    /// 写入表项。可写性取自覆盖该地址的区域当前权限。
    pub(crate) fn ensure_mapped(&mut self, vaddr: Vaddr) -> Result<PageTableEntry, AllocError> {
        let writeable = self
            .find_region(vaddr)
            .map(|r| r.flags.contains(RegionFlags::WRITE));
        // 调用方已做区域检查
        debug_assert!(writeable.is_some());
        let writeable = writeable.unwrap_or(false);

        let allocator = Arc::clone(&self.allocator);
        let table = self.directory.table_or_create(vaddr, &allocator)?;
        let index = vaddr.pt_index();

        let existing = table.entry(index);
        if existing.is_valid() {
            return Ok(existing);
        }

        let frame = allocator.alloc_pages(1)?;
        let entry = PageTableEntry::mapping(frame, writeable);
        table.set_entry(index, entry);
        Ok(entry)
    }

    /// 复制地址空间
    ///
    /// 区域表原样复制；每个有映射的页分配新帧并逐字节拷贝，
    /// 两个地址空间不共享任何帧。
    pub fn copy(&self) -> Result<AddressSpace, AllocError> {
        let mut new = AddressSpace::new(Arc::clone(&self.allocator));
        new.regions = self.regions.clone();

        let machine = self.allocator.machine();
        for (pd_index, table) in self.directory.tables() {
            for (pt_index, entry) in table.valid_entries() {
                let vaddr = Vaddr((pd_index << PD_SHIFT) | (pt_index << PT_SHIFT));

                let new_table = new.directory.table_or_create(vaddr, &self.allocator)?;
                let frame = self.allocator.alloc_pages(1)?;
                // SAFETY: 源帧由本地址空间映射，目标帧刚分配且独占
                unsafe {
                    core::ptr::copy_nonoverlapping(
                        machine.paddr_to_kvaddr(entry.paddr()) as *const u8,
                        machine.paddr_to_kvaddr(frame) as *mut u8,
                        PAGE_SIZE,
                    );
                }
                new_table.set_entry(pt_index, PageTableEntry::mapping(frame, entry.is_writeable()));
            }
        }
        Ok(new)
    }

    /// 已映射的用户页数（不含页表帧）
    pub fn mapped_pages(&self) -> usize {
        self.directory
            .tables()
            .map(|(_, t)| t.valid_entries().count())
            .sum()
    }

    fn release_frames(&mut self) {
        let mut nodes: Vec<Paddr> = Vec::with_capacity(self.directory.table_count());
        for (_, table) in self.directory.tables() {
            for (_, entry) in table.valid_entries() {
                self.allocator.free_pages(entry.paddr());
            }
            nodes.push(table.base());
        }
        for base in nodes {
            self.allocator.free_pages(base);
        }
    }
}

impl Drop for AddressSpace {
    /// 归还所有映射帧和页表帧
    fn drop(&mut self) {
        self.release_frames();
    }
}
