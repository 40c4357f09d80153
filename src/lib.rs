/*!
  A small 32 bit word machine: a two-pass assembler that turns line-oriented assembly into a word
  image, and a virtual machine that fetches, decodes and executes such images with a register file,
  flags, a downward growing stack, vectored interrupts and BIOS/KERNEL/USER privilege modes.

  ```text
  source ── assembler ──▶ words ── Machine::load_program ──▶ Machine::step / run
  ```

  Front ends talk to the machine through `Machine::snapshot`, `Machine::read_memory` and a
  `FramebufferObserver`; file handling lives in `image`.
*/

pub mod address;
pub mod assembler;
pub mod bitfield;
pub mod bytecode;
pub mod config;
pub mod cpu;
pub mod error;
pub mod image;
pub mod machine;
pub mod memory;
pub mod symboltable;

pub use address::{Address, Region};
pub use assembler::{assemble, assemble_program, disassemble, listing, Assembly};
pub use bytecode::{Instruction, Operation, Word};
pub use config::{FramebufferConfig, MachineConfig};
pub use cpu::{CpuState, CpuStateView, Flags, Mode};
pub use error::{AssembleError, AssembleErrorKind, RuntimeFault};
pub use machine::{ExecutionState, Machine, RunOutcome};
pub use memory::FramebufferObserver;
