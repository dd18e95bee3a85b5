//! 测试支持 crate
//!
//! 提供宿主机 `cargo test` 所需的 Mock 实现和测试工具。

#![no_std]

extern crate alloc;

pub mod mock;

/// 测试运行器
pub fn test_runner(tests: &[&dyn Fn()]) {
    for test in tests {
        test();
    }
}
