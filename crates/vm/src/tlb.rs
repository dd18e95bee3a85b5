//! 软件管理的地址翻译缓存（TLB）
//!
//! 64 个槽位，每槽一对 32 位寄存器映像：hi 存虚拟页地址，
//! lo 存帧地址与 VALID / DIRTY 位。故障处理路径线性扫描找一个
//! 无效槽写入新映射；切换地址空间时整体作废。
//!
//! 缓存写满且无无效槽时回填失败，由调用方上报资源耗尽，
//! 不做替换。

use crate::address::{Paddr, Vaddr};
use crate::config::{PAGE_FRAME, TLB_SIZE};
use crate::page_table::EntryFlags;

/// 一个 TLB 槽位：虚拟页地址 + 帧地址与控制位
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
struct TlbSlot {
    hi: u32,
    lo: u32,
}

impl TlbSlot {
    /// 作废值：高位地址落在不可映射区间，VALID 清零
    const INVALID: TlbSlot = TlbSlot {
        hi: 0x8000_0000,
        lo: 0,
    };

    fn is_valid(&self) -> bool {
        EntryFlags::from_bits_truncate(self.lo).contains(EntryFlags::VALID)
    }
}

/// 翻译缓存写满
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct TlbFull;

/// 64 槽翻译缓存
pub struct TranslationCache {
    slots: [TlbSlot; TLB_SIZE],
}

impl TranslationCache {
    /// 创建一个全部作废的缓存
    pub const fn new() -> Self {
        TranslationCache {
            slots: [TlbSlot::INVALID; TLB_SIZE],
        }
    }

    /// 把 `vpage -> frame` 写入第一个无效槽，返回槽号
    ///
    /// 无条件置 VALID 和 DIRTY：写保护由更上层的区域检查承担，
    /// 缓存里的映射总是可写的。
    pub fn install(&mut self, vpage: Vaddr, frame: Paddr) -> Result<usize, TlbFull> {
        debug_assert!(vpage.is_page_aligned());
        debug_assert!(frame.is_page_aligned());

        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_valid() {
                continue;
            }
            *slot = TlbSlot {
                hi: vpage.as_usize() as u32,
                lo: frame.as_usize() as u32
                    | (EntryFlags::VALID | EntryFlags::DIRTY).bits(),
            };
            return Ok(i);
        }
        Err(TlbFull)
    }

    /// 查找虚拟页对应的帧地址
    pub fn lookup(&self, vpage: Vaddr) -> Option<Paddr> {
        self.slots
            .iter()
            .find(|s| s.is_valid() && s.hi as usize == vpage.page_base().as_usize())
            .map(|s| Paddr(s.lo as usize & PAGE_FRAME))
    }

    /// 作废全部槽位
    pub fn invalidate_all(&mut self) {
        self.slots = [TlbSlot::INVALID; TLB_SIZE];
    }

    /// 当前有效槽位数
    pub fn valid_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_valid()).count()
    }
}

impl Default for TranslationCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PAGE_SIZE;

    #[test]
    fn install_fills_slots_in_order() {
        let mut tlb = TranslationCache::new();
        assert_eq!(tlb.valid_count(), 0);

        let s0 = tlb.install(Vaddr(0x1000), Paddr(PAGE_SIZE * 5)).unwrap();
        let s1 = tlb.install(Vaddr(0x2000), Paddr(PAGE_SIZE * 6)).unwrap();
        assert_eq!((s0, s1), (0, 1));
        assert_eq!(tlb.lookup(Vaddr(0x1000)), Some(Paddr(PAGE_SIZE * 5)));
        assert_eq!(tlb.lookup(Vaddr(0x3000)), None);
    }

    #[test]
    fn full_cache_rejects_install() {
        let mut tlb = TranslationCache::new();
        for i in 0..TLB_SIZE {
            tlb.install(Vaddr((i + 1) * PAGE_SIZE), Paddr(PAGE_SIZE)).unwrap();
        }
        assert_eq!(tlb.valid_count(), TLB_SIZE);
        assert_eq!(
            tlb.install(Vaddr(0x100_0000), Paddr(PAGE_SIZE)),
            Err(TlbFull)
        );
    }

    #[test]
    fn invalidate_all_reclaims_slots() {
        let mut tlb = TranslationCache::new();
        tlb.install(Vaddr(0x1000), Paddr(PAGE_SIZE)).unwrap();
        tlb.invalidate_all();
        assert_eq!(tlb.valid_count(), 0);
        assert_eq!(tlb.lookup(Vaddr(0x1000)), None);
        assert_eq!(tlb.install(Vaddr(0x1000), Paddr(PAGE_SIZE)), Ok(0));
    }
}
