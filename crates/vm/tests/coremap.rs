//! 帧分配器的连续分配 / 释放 / 耗尽行为

mod common;

use common::{allocator_on_default_machine, boot_small_vm, TEST_KERNEL, TEST_RAM};
use vm::config::PAGE_SIZE;
use vm::AllocError;

#[test]
fn test_contiguous_alloc_is_page_aligned_and_disjoint() {
    let allocator = allocator_on_default_machine();
    allocator.init();

    let a = allocator.alloc_pages(4).unwrap();
    let b = allocator.alloc_pages(4).unwrap();
    assert!(a.is_page_aligned());
    assert!(b.is_page_aligned());

    // 两个块不重叠
    let (a, b) = (a.as_usize(), b.as_usize());
    assert!(a + 4 * PAGE_SIZE <= b || b + 4 * PAGE_SIZE <= a);
}

#[test]
fn test_free_returns_whole_block() {
    let allocator = allocator_on_default_machine();
    allocator.init();
    let baseline = allocator.stats().free;

    let block = allocator.alloc_pages(8).unwrap();
    assert_eq!(allocator.stats().free, baseline - 8);

    allocator.free_pages(block);
    assert_eq!(allocator.stats().free, baseline);

    // 释放后同一块可被重新分出
    assert_eq!(allocator.alloc_pages(8).unwrap(), block);
}

#[test]
fn test_freed_neighbours_merge_into_one_run() {
    let allocator = allocator_on_default_machine();
    allocator.init();

    let a = allocator.alloc_pages(2).unwrap();
    let b = allocator.alloc_pages(2).unwrap();
    let guard = allocator.alloc_pages(1).unwrap();

    // 相邻的两个块释放后构成一个 4 帧的 run
    allocator.free_pages(a);
    allocator.free_pages(b);
    let merged = allocator.alloc_pages(4).unwrap();
    assert_eq!(merged, a);
    allocator.free_pages(guard);
}

#[test]
fn test_allocated_pages_are_zeroed() {
    let allocator = allocator_on_default_machine();
    allocator.init();
    let machine = allocator.machine();

    let block = allocator.alloc_pages(1).unwrap();
    let kva = machine.paddr_to_kvaddr(block) as *mut u8;
    unsafe {
        kva.write(0x5a);
    }
    allocator.free_pages(block);

    // 重新分出的同一帧必须已清零
    let again = allocator.alloc_pages(1).unwrap();
    assert_eq!(again, block);
    let byte = unsafe { (machine.paddr_to_kvaddr(again) as *const u8).read() };
    assert_eq!(byte, 0);
}

#[test]
fn test_exhaustion_is_distinguished_from_fragmentation() {
    // 16 页机器：1 页内核 + 1 页 coremap，余 14 页可分配
    let vm = boot_small_vm(16);
    let allocator = vm.frame_allocator();
    let free = allocator.stats().free;
    assert_eq!(free, 14);

    // 请求超过空闲总量:耗尽
    assert_eq!(allocator.alloc_pages(free + 1), Err(AllocError::Exhausted));

    // 占满后打一个洞:空闲帧够 2 帧请求的只数但不连续
    let blocks: Vec<_> = (0..free).map(|_| allocator.alloc_pages(1).unwrap()).collect();
    allocator.free_pages(blocks[3]);
    allocator.free_pages(blocks[7]);
    assert_eq!(allocator.stats().free, 2);
    assert_eq!(allocator.alloc_pages(2), Err(AllocError::Fragmented));
    assert_eq!(allocator.alloc_pages(1), Ok(blocks[3]));
}

#[test]
fn test_kpages_round_trip_through_kernel_window() {
    let allocator = allocator_on_default_machine();
    allocator.init();
    let baseline = allocator.stats().free;

    let kva = allocator.alloc_kpages(3).unwrap();
    // 内核页可以直接读写
    unsafe {
        (kva as *mut u8).write(0x17);
        assert_eq!((kva as *const u8).read(), 0x17);
    }
    allocator.free_kpages(kva);
    assert_eq!(allocator.stats().free, baseline);
}

#[test]
fn test_stats_account_for_kernel_and_coremap() {
    let allocator = allocator_on_default_machine();
    allocator.init();

    let stats = allocator.stats();
    assert_eq!(stats.total, TEST_RAM / PAGE_SIZE);
    assert_eq!(stats.used + stats.free, stats.total);
    // 内核映像 + coremap 自身至少占一帧
    assert!(stats.used > TEST_KERNEL / PAGE_SIZE);
}
