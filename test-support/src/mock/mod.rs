//! Mock 实现
//!
//! 注意：这里不直接依赖内核 crate（避免循环依赖）。
//! 消费方 crate 在测试代码中为这些类型（或其包装）实现自己的 trait
//! （例如 `sync::ArchOps`、`vm::MachineOps`）。

mod arch;
mod machine;

pub use arch::{MOCK_INTR_OPS, MockIntrOps};
pub use machine::MockMachine;
