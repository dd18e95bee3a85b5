//! 地址抽象模块
//!
//! 提供物理地址、虚拟地址和物理页帧号的 newtype 封装，
//! 以及页对齐和两级页表索引拆分操作。
//!
//! 物理地址从 0 起编号（0 对应安装内存的起始），
//! 通过 [`crate::machine::MachineOps`] 的直映窗口访问其内容。

use crate::config::{LEVEL_INDEX_MASK, PAGE_FRAME, PAGE_SIZE, PD_SHIFT, PT_SHIFT};

/// 物理地址
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Paddr(pub usize);

impl Paddr {
    /// 以 usize 取出地址值
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0
    }

    /// 是否页对齐
    #[inline]
    pub fn is_page_aligned(self) -> bool {
        self.0 & !PAGE_FRAME == 0
    }

    /// 向下对齐到页边界
    #[inline]
    pub fn page_base(self) -> Paddr {
        Paddr(self.0 & PAGE_FRAME)
    }

    /// 所在物理页帧号
    #[inline]
    pub fn ppn(self) -> Ppn {
        Ppn(self.0 / PAGE_SIZE)
    }
}

/// 物理页帧号（Physical Page Number）
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Ppn(pub usize);

impl Ppn {
    /// 以 usize 取出帧号
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0
    }

    /// 该帧的起始物理地址
    #[inline]
    pub fn start_addr(self) -> Paddr {
        Paddr(self.0 * PAGE_SIZE)
    }
}

/// 虚拟地址
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Vaddr(pub usize);

impl Vaddr {
    /// 以 usize 取出地址值
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0
    }

    /// 是否页对齐
    #[inline]
    pub fn is_page_aligned(self) -> bool {
        self.0 & !PAGE_FRAME == 0
    }

    /// 向下对齐到页边界
    #[inline]
    pub fn page_base(self) -> Vaddr {
        Vaddr(self.0 & PAGE_FRAME)
    }

    /// 页内偏移
    #[inline]
    pub fn page_offset(self) -> usize {
        self.0 & !PAGE_FRAME
    }

    /// 页目录索引（地址最高 10 位）
    #[inline]
    pub fn pd_index(self) -> usize {
        (self.0 >> PD_SHIFT) & LEVEL_INDEX_MASK
    }

    /// 页表索引（地址中间 10 位）
    #[inline]
    pub fn pt_index(self) -> usize {
        (self.0 >> PT_SHIFT) & LEVEL_INDEX_MASK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vaddr_index_split() {
        // 0x4001_2345: 目录索引 = 0x100, 表索引 = 0x012, 偏移 = 0x345
        let va = Vaddr(0x4001_2345);
        assert_eq!(va.pd_index(), 0x100);
        assert_eq!(va.pt_index(), 0x012);
        assert_eq!(va.page_offset(), 0x345);
        assert_eq!(va.page_base(), Vaddr(0x4001_2000));
    }

    #[test]
    fn paddr_page_alignment() {
        assert!(Paddr(0x3000).is_page_aligned());
        assert!(!Paddr(0x3001).is_page_aligned());
        assert_eq!(Paddr(0x3fff).page_base(), Paddr(0x3000));
        assert_eq!(Paddr(0x3000).ppn(), Ppn(3));
        assert_eq!(Ppn(3).start_addr(), Paddr(0x3000));
    }
}
