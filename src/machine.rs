/*!
  The execution engine. A `Machine` owns the CPU state and the memory space and advances them one
  instruction per `step()`. Faults stop the machine; the faulting instruction's address stays in
  `pc` and the fault is kept for inspection.

  Interrupts are vectored through the table in ROM. Entering a handler pushes the interrupted mode
  and then the return address, and switches to BIOS mode, which runs from ROM and masks hardware
  interrupts. `IRET` undoes both.
*/

use std::ops::Range;

use log::{debug, warn};
#[cfg(feature = "trace_computation")]
use log::{log_enabled, trace, Level};

use crate::address::{Address, Region};
use crate::bytecode::{try_decode_instruction, DecodeError, Instruction, Operation, Register, Source, Word, REGISTER_COUNT};
use crate::config::{ConfigError, MachineConfig};
use crate::cpu::{CpuState, CpuStateView, Flags, Mode};
use crate::error::RuntimeFault;
use crate::memory::{FramebufferObserver, MemoryError, MemorySpace};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ExecutionState {
  Running,
  Halted
}

/// How a bounded run ended.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RunOutcome {
  Halted,
  BudgetExhausted
}

pub struct Machine {
  config     : MachineConfig,
  cpu        : CpuState,
  memory     : MemorySpace,
  has_bios   : bool,
  last_fault : Option<RuntimeFault>,
  observer   : Option<Box<dyn FramebufferObserver>>
}

impl Machine {

  /// A machine with empty memory, booted in KERNEL mode.
  pub fn new(config: MachineConfig) -> Result<Machine, ConfigError> {
    config.validate()?;
    let cpu = CpuState::boot(&config, false);
    debug!(
      "machine created: {} words RAM, {} words ROM, timer period {}",
      config.ram_words, config.rom_words, config.timer_period
    );
    Ok(Machine {
      memory     : MemorySpace::new(&config),
      config,
      cpu,
      has_bios   : false,
      last_fault : None,
      observer   : None
    })
  }

  /// Loads a program image at the start of RAM.
  pub fn load_program(&mut self, words: &[Word]) -> Result<(), MemoryError> {
    self.memory.load(Region::Ram, words)?;
    debug!("loaded {} program words into RAM", words.len());
    Ok(())
  }

  /// Loads a BIOS image at the start of ROM and reboots into BIOS mode.
  pub fn load_bios(&mut self, words: &[Word]) -> Result<(), MemoryError> {
    self.memory.load(Region::Rom, words)?;
    self.has_bios = true;
    debug!("loaded {} BIOS words into ROM", words.len());
    self.reset();
    Ok(())
  }

  /// Installs `handler` (a ROM address) as interrupt vector `number`.
  pub fn set_vector(&mut self, number: u16, handler: Word) -> Result<(), MemoryError> {
    self.memory.set_vector(self.config.vector_base, number, handler)
  }

  /// Returns the CPU to its power-on state. Memory is kept.
  pub fn reset(&mut self) {
    self.cpu        = CpuState::boot(&self.config, self.has_bios);
    self.last_fault = None;
    debug!("boot: {} mode, pc 0x{:04X}, sp 0x{:04X}", self.cpu.mode, self.cpu.pc, self.cpu.sp);
  }

  pub fn set_framebuffer_observer<O>(&mut self, observer: O)
    where O: FramebufferObserver + 'static
  {
    self.observer = Some(Box::new(observer));
  }

  pub fn config(&self) -> &MachineConfig {
    &self.config
  }

  pub fn cpu(&self) -> &CpuState {
    &self.cpu
  }

  pub fn is_running(&self) -> bool {
    self.cpu.running
  }

  pub fn last_fault(&self) -> Option<RuntimeFault> {
    self.last_fault
  }

  pub fn snapshot(&self) -> CpuStateView {
    CpuStateView {
      cpu        : self.cpu.clone(),
      last_fault : self.last_fault
    }
  }

  pub fn read_memory(&self, region: Region, range: Range<usize>) -> Result<&[Word], MemoryError> {
    self.memory.read_range(region, range)
  }

  // region Running

  /**
    Executes one instruction, or dispatches one pending hardware interrupt. Stepping a halted
    machine does nothing and does not count a cycle.
  */
  pub fn step(&mut self) -> Result<ExecutionState, RuntimeFault> {
    if !self.cpu.running {
      return Ok(ExecutionState::Halted);
    }

    let result = self.cycle();

    #[cfg(feature = "trace_computation")]
    {
      if log_enabled!(Level::Trace) {
        trace!("after cycle {}:\n{}", self.cpu.cycle, self.snapshot());
      }
    }

    match result {
      Ok(()) => Ok(self.state()),

      Err(fault) => {
        warn!("{}", fault);
        self.cpu.running = false;
        self.last_fault  = Some(fault);
        Err(fault)
      }
    }
  }

  /// Steps until the machine halts. Returns the number of cycles this call executed.
  pub fn run(&mut self) -> Result<u64, RuntimeFault> {
    let start = self.cpu.cycle;
    while self.cpu.running {
      self.step()?;
    }
    Ok(self.cpu.cycle - start)
  }

  /// Steps until the machine halts or `max_cycles` steps have been taken.
  pub fn run_for(&mut self, max_cycles: u64) -> Result<RunOutcome, RuntimeFault> {
    for _ in 0..max_cycles {
      if self.step()? == ExecutionState::Halted {
        return Ok(RunOutcome::Halted);
      }
    }
    match self.cpu.running {
      true  => Ok(RunOutcome::BudgetExhausted),
      false => Ok(RunOutcome::Halted)
    }
  }

  fn state(&self) -> ExecutionState {
    match self.cpu.running {
      true  => ExecutionState::Running,
      false => ExecutionState::Halted
    }
  }

  fn cycle(&mut self) -> Result<(), RuntimeFault> {
    self.cpu.cycle += 1;

    let period = self.config.timer_period;
    if period > 0 && self.cpu.cycle % period == 0 {
      self.cpu.set_flag(Flags::INTERRUPT_PENDING, true);
      self.cpu.interrupt = 0;
    }

    if self.cpu.flag(Flags::INTERRUPT_PENDING)
        && self.cpu.flag(Flags::INTERRUPT_ENABLE)
        && self.cpu.mode != Mode::Bios
    {
      self.cpu.set_flag(Flags::INTERRUPT_PENDING, false);
      return self.dispatch_hardware_interrupt();
    }

    let pc   = self.cpu.pc;
    let word = self.fetch()?;
    let result =
      match try_decode_instruction(word) {
        Ok(instruction)                         => self.execute(instruction, pc),
        Err(DecodeError::IllegalOpcode(opcode)) => Err(RuntimeFault::IllegalOpcode{ opcode, pc })
      };

    if result.is_err() {
      // Leave pc on the instruction that faulted.
      self.cpu.pc = pc;
    }
    result
  }

  // endregion

  // region Memory access

  fn code_region(&self) -> Region {
    match self.cpu.mode {
      Mode::Bios                => Region::Rom,
      Mode::Kernel | Mode::User => Region::Ram
    }
  }

  fn fetch(&mut self) -> Result<Word, RuntimeFault> {
    let pc      = self.cpu.pc;
    let address = Address{ region: self.code_region(), index: pc };
    let word    = self.memory.read(address).map_err(|_| Self::out_of_bounds(pc, address))?;
    self.cpu.pc = pc.wrapping_add(1);
    Ok(word)
  }

  fn out_of_bounds(pc: Word, address: Address) -> RuntimeFault {
    RuntimeFault::MemoryOutOfBounds{ pc, region: address.region, address: address.index as i64 }
  }

  fn read_ram(&self, index: Word, pc: Word) -> Result<Word, RuntimeFault> {
    let address = Address::ram(index);
    self.memory.read(address).map_err(|_| Self::out_of_bounds(pc, address))
  }

  fn write_ram(&mut self, index: Word, value: Word, pc: Word) -> Result<(), RuntimeFault> {
    let address = Address::ram(index);
    self.memory.write(address, value).map_err(|_| Self::out_of_bounds(pc, address))
  }

  /// Checks that `target` lies in the region executed in `mode`.
  fn check_target(&self, target: i64, mode: Mode, pc: Word) -> Result<Word, RuntimeFault> {
    let region = match mode {
      Mode::Bios => Region::Rom,
      _          => Region::Ram
    };
    match (0..self.memory.len(region) as i64).contains(&target) {
      true  => Ok(target as Word),
      false => Err(RuntimeFault::MemoryOutOfBounds{ pc, region, address: target })
    }
  }

  /// `Rb + imm`, or `imm` alone when there is no base register. Wraps.
  fn effective_address(&self, base: Option<Register>, offset: Word) -> Word {
    base.map_or(0, |base| self.cpu.reg(base)).wrapping_add(offset)
  }

  fn notify_framebuffer(&mut self, index: Word) -> Result<(), MemoryError> {
    let framebuffer = self.config.framebuffer;
    if let (Some(row), Some(observer)) = (framebuffer.row_of(index), self.observer.as_mut()) {
      let pixels = self.memory.framebuffer_row(&framebuffer, row)?;
      observer.on_framebuffer_write(row, pixels);
    }
    Ok(())
  }

  // endregion

  // region Stack

  /// Fails unless `count` words can be pushed.
  fn reserve_push(&self, count: u32, pc: Word) -> Result<(), RuntimeFault> {
    let sp = self.cpu.sp;
    match (sp as u64) < self.config.stack_limit as u64 + count as u64 {
      true  => Err(RuntimeFault::StackOverflow{ pc, sp }),
      false => Ok(())
    }
  }

  /// Fails unless `count` words can be popped.
  fn reserve_pop(&self, count: u32, pc: Word) -> Result<(), RuntimeFault> {
    let sp = self.cpu.sp;
    match sp as u64 + count as u64 > self.config.ram_words as u64 {
      true  => Err(RuntimeFault::StackUnderflow{ pc, sp }),
      false => Ok(())
    }
  }

  fn push(&mut self, value: Word, pc: Word) -> Result<(), RuntimeFault> {
    self.reserve_push(1, pc)?;
    let sp = self.cpu.sp - 1;
    self.write_ram(sp, value, pc)?;
    self.cpu.sp = sp;
    Ok(())
  }

  fn pop(&mut self, pc: Word) -> Result<Word, RuntimeFault> {
    self.reserve_pop(1, pc)?;
    let value = self.read_ram(self.cpu.sp, pc)?;
    self.cpu.sp += 1;
    Ok(value)
  }

  /// The word `depth` entries below the top of the stack, without popping.
  fn peek(&self, depth: u32, pc: Word) -> Result<Word, RuntimeFault> {
    self.reserve_pop(depth + 1, pc)?;
    self.read_ram(self.cpu.sp + depth, pc)
  }

  // endregion

  // region Interrupts

  /// The handler of vector `number`, if it is in range and installed.
  fn handler(&self, number: u16, pc: Word) -> Result<Option<Word>, RuntimeFault> {
    if number >= self.config.vector_count {
      return Ok(None);
    }
    self.memory
        .vector(self.config.vector_base, number)
        .map_err(|error| match error {
          MemoryError::OutOfBounds{ address } => Self::out_of_bounds(pc, address),
          _ => RuntimeFault::InvalidInterruptNumber{ pc, number }
        })
  }

  /// Pushes the interrupt frame and transfers control to `handler` in BIOS mode.
  fn enter_interrupt(&mut self, handler: Word, return_pc: Word, pc: Word) -> Result<(), RuntimeFault> {
    self.reserve_push(2, pc)?;
    let target = self.check_target(handler as i64, Mode::Bios, pc)?;
    self.push(u8::from(self.cpu.mode) as Word, pc)?;
    self.push(return_pc, pc)?;
    debug!("mode {} -> {}: handler at 0x{:04X}", self.cpu.mode, Mode::Bios, target);
    self.cpu.mode = Mode::Bios;
    self.cpu.pc   = target;
    Ok(())
  }

  fn dispatch_hardware_interrupt(&mut self) -> Result<(), RuntimeFault> {
    let number = self.cpu.interrupt;
    let pc     = self.cpu.pc;
    match self.handler(number, pc)? {

      Some(handler) => {
        debug!("cycle {}: dispatching interrupt {} from pc 0x{:04X}", self.cpu.cycle, number, pc);
        self.enter_interrupt(handler, pc, pc)
      }

      None => {
        debug!("cycle {}: dropping interrupt {}, no vector installed", self.cpu.cycle, number);
        Ok(())
      }

    }
  }

  fn software_interrupt(&mut self, number: u16, pc: Word) -> Result<(), RuntimeFault> {
    if self.cpu.mode == Mode::Bios {
      debug!("INT {} in BIOS mode: handing off to {} at 0x0000", number, Mode::Kernel);
      self.cpu.mode = Mode::Kernel;
      self.cpu.pc   = 0;
      return Ok(());
    }

    let handler =
      self.handler(number, pc)?
          .ok_or(RuntimeFault::InvalidInterruptNumber{ pc, number })?;
    self.enter_interrupt(handler, self.cpu.pc, pc)
  }

  fn return_from_interrupt(&mut self, pc: Word) -> Result<(), RuntimeFault> {
    let return_pc  = self.peek(0, pc)?;
    let mode_value = self.peek(1, pc)?;
    let mode =
      u8::try_from(mode_value)
        .ok()
        .and_then(|value| Mode::try_from(value).ok())
        .ok_or(RuntimeFault::InvalidMode{ pc, value: mode_value })?;
    let target = self.check_target(return_pc as i64, mode, pc)?;

    self.cpu.sp += 2;
    if mode != self.cpu.mode {
      debug!("mode {} -> {}: returning to 0x{:04X}", self.cpu.mode, mode, target);
    }
    self.cpu.mode = mode;
    self.cpu.pc   = target;
    Ok(())
  }

  // endregion

  // region Execution

  fn execute(&mut self, instruction: Instruction, pc: Word) -> Result<(), RuntimeFault> {
    match instruction {
      Instruction::Register{ operation, rd, rs, .. } => self.execute_register(operation, rd, rs, pc),

      Instruction::Immediate{ operation, rd, base, immediate } => {
        self.execute_immediate(operation, rd, base, immediate, pc)
      }

      Instruction::RegisterImmediate{ operation, rd, rs, source } => {
        self.execute_register_immediate(operation, rd, rs, source, pc)
      }

      Instruction::Branch{ operation, offset } => self.execute_branch(operation, offset, pc),
    }
  }

  fn illegal(operation: Operation, pc: Word) -> RuntimeFault {
    RuntimeFault::IllegalOpcode{ opcode: operation.code(), pc }
  }

  fn execute_register(&mut self, operation: Operation, rd: Register, rs: Register, pc: Word)
    -> Result<(), RuntimeFault>
  {
    match operation {

      Operation::Nop => {}

      Operation::Not => {
        let result = !self.cpu.reg(rs);
        self.cpu.set_reg(rd, result);
        self.cpu.set_result_flags(result);
      }

      Operation::Hlt => {
        debug!("halted at pc 0x{:04X} after {} cycles", pc, self.cpu.cycle);
        self.cpu.running = false;
      }

      Operation::Ret => {
        let return_pc = self.peek(0, pc)?;
        let target    = self.check_target(return_pc as i64, self.cpu.mode, pc)?;
        self.pop(pc)?;
        self.cpu.pc = target;
      }

      Operation::Iret => self.return_from_interrupt(pc)?,

      Operation::Ei => self.cpu.set_flag(Flags::INTERRUPT_ENABLE, true),

      Operation::Di => self.cpu.set_flag(Flags::INTERRUPT_ENABLE, false),

      _ => return Err(Self::illegal(operation, pc)),

    }
    Ok(())
  }

  fn execute_immediate(
    &mut self,
    operation : Operation,
    rd        : Register,
    base      : Option<Register>,
    immediate : i16,
    pc        : Word
  ) -> Result<(), RuntimeFault>
  {
    let value = immediate as i32 as Word;

    match operation {

      Operation::Ldi => self.cpu.set_reg(rd, value),

      Operation::Ldr => {
        let word = self.read_ram(self.effective_address(base, value), pc)?;
        self.cpu.set_reg(rd, word);
      }

      Operation::Str => {
        let index = self.effective_address(base, value);
        self.write_ram(index, self.cpu.reg(rd), pc)?;
        self.notify_framebuffer(index).map_err(|_| Self::out_of_bounds(pc, Address::ram(index)))?;
      }

      Operation::Push => {
        let mask = immediate as u16;
        self.reserve_push(mask.count_ones(), pc)?;
        for register in (0..REGISTER_COUNT as Register).filter(|r| mask & (1 << r) != 0) {
          self.push(self.cpu.reg(register), pc)?;
        }
      }

      Operation::Pop => {
        let mask = immediate as u16;
        self.reserve_pop(mask.count_ones(), pc)?;
        for register in (0..REGISTER_COUNT as Register).rev().filter(|r| mask & (1 << r) != 0) {
          let word = self.pop(pc)?;
          self.cpu.set_reg(register, word);
        }
      }

      Operation::Int => self.software_interrupt(immediate as u16, pc)?,

      _ => return Err(Self::illegal(operation, pc)),

    }
    Ok(())
  }

  fn execute_register_immediate(
    &mut self,
    operation : Operation,
    rd        : Register,
    rs        : Register,
    source    : Source,
    pc        : Word
  ) -> Result<(), RuntimeFault>
  {
    let lhs = self.cpu.reg(rs);
    let rhs =
      match source {
        Source::Register(rt)        => self.cpu.reg(rt),
        Source::Immediate(immediate) => immediate as i32 as Word
      };

    let result =
      match operation {

        Operation::Mov => rhs,

        Operation::Add => {
          let (result, carry) = lhs.overflowing_add(rhs);
          let overflow        = (lhs as i32).overflowing_add(rhs as i32).1;
          self.cpu.set_arithmetic_flags(result, carry, overflow);
          result
        }

        Operation::Sub => {
          let (result, borrow) = lhs.overflowing_sub(rhs);
          let overflow         = (lhs as i32).overflowing_sub(rhs as i32).1;
          self.cpu.set_arithmetic_flags(result, borrow, overflow);
          result
        }

        Operation::Cmp => {
          let lhs              = self.cpu.reg(rd);
          let (result, borrow) = lhs.overflowing_sub(rhs);
          let overflow         = (lhs as i32).overflowing_sub(rhs as i32).1;
          self.cpu.set_arithmetic_flags(result, borrow, overflow);
          return Ok(());
        }

        Operation::Test => {
          self.cpu.set_logic_flags(self.cpu.reg(rd) & rhs);
          return Ok(());
        }

        | Operation::And
        | Operation::Or
        | Operation::Xor => {
          let result =
            match operation {
              Operation::And => lhs & rhs,
              Operation::Or  => lhs | rhs,
              _              => lhs ^ rhs
            };
          self.cpu.set_logic_flags(result);
          result
        }

        Operation::Lsl => self.with_result_flags(lhs << (rhs & 31)),

        Operation::Lsr => self.with_result_flags(lhs >> (rhs & 31)),

        Operation::Asr => self.with_result_flags(((lhs as i32) >> (rhs & 31)) as Word),

        Operation::Mul => self.with_result_flags(lhs.wrapping_mul(rhs)),

        | Operation::Div
        | Operation::Mod => {
          if rhs == 0 {
            return Err(RuntimeFault::DivisionByZero{ pc });
          }
          let result =
            match operation {
              Operation::Div => lhs / rhs,
              _              => lhs % rhs
            };
          self.with_result_flags(result)
        }

        _ => return Err(Self::illegal(operation, pc)),

      };

    self.cpu.set_reg(rd, result);
    Ok(())
  }

  fn with_result_flags(&mut self, result: Word) -> Word {
    self.cpu.set_result_flags(result);
    result
  }

  fn execute_branch(&mut self, operation: Operation, offset: i32, pc: Word) -> Result<(), RuntimeFault> {
    let flags = self.cpu.flags;
    let zero     = flags.contains(Flags::ZERO);
    let carry    = flags.contains(Flags::CARRY);
    let negative = flags.contains(Flags::NEGATIVE);
    let overflow = flags.contains(Flags::OVERFLOW);

    let taken =
      match operation {
        Operation::Jmp | Operation::Call => true,
        Operation::Je                    => zero,
        Operation::Jne                   => !zero,
        Operation::Jc                    => carry,
        Operation::Jnc                   => !carry,
        Operation::Jg                    => !zero && negative == overflow,
        Operation::Jl                    => negative != overflow,
        _                                => return Err(Self::illegal(operation, pc)),
      };

    if !taken {
      return Ok(());
    }

    let return_pc = self.cpu.pc;
    let target    = self.check_target(return_pc as i64 + offset as i64, self.cpu.mode, pc)?;
    if operation == Operation::Call {
      self.push(return_pc, pc)?;
    }
    self.cpu.pc = target;
    Ok(())
  }

  // endregion
}


#[cfg(test)]
mod tests {
  use std::cell::RefCell;
  use std::rc::Rc;

  use super::*;
  use crate::assembler::assemble;

  fn booted(source: &str) -> Machine {
    let mut machine = Machine::new(MachineConfig::default()).unwrap();
    machine.load_program(&assemble(source).unwrap()).unwrap();
    machine
  }

  #[test]
  fn adds_and_halts() {
    let mut machine = booted("LDI R1, #8\nLDI R2, #4\nADD R1, R2\nHLT");
    assert_eq!(machine.run(), Ok(4));
    let cpu = machine.cpu();
    assert_eq!(cpu.reg(1), 12);
    assert_eq!(cpu.reg(2), 4);
    assert!((3..REGISTER_COUNT as Register).all(|r| cpu.reg(r) == 0));
    assert_eq!(cpu.sp, 0x1_0000);
    assert_eq!(cpu.pc, 4);
    assert!(!cpu.running);
  }

  #[test]
  fn stepping_a_halted_machine_is_a_no_op() {
    let mut machine = booted("HLT");
    assert_eq!(machine.step(), Ok(ExecutionState::Halted));
    let before = machine.snapshot();
    assert_eq!(machine.step(), Ok(ExecutionState::Halted));
    assert_eq!(machine.snapshot(), before);
    assert_eq!(machine.cpu().cycle, 1);
  }

  #[test]
  fn division_by_zero_faults_in_place() {
    let mut machine = booted("LDI R1, #7\nDIV R1, R2\nHLT");
    assert_eq!(machine.run(), Err(RuntimeFault::DivisionByZero{ pc: 1 }));
    assert!(!machine.is_running());
    assert_eq!(machine.cpu().pc, 1);
    assert_eq!(machine.cpu().reg(1), 7);
    assert_eq!(machine.last_fault(), Some(RuntimeFault::DivisionByZero{ pc: 1 }));
    // A faulted machine stays stopped.
    assert_eq!(machine.step(), Ok(ExecutionState::Halted));
  }

  #[test]
  fn arithmetic_flags() {
    let mut machine = booted("LDI R1, #-1\nADD R1, #1\nHLT");
    machine.run().unwrap();
    let flags = machine.cpu().flags;
    assert!(flags.contains(Flags::ZERO | Flags::CARRY));
    assert!(!flags.contains(Flags::OVERFLOW));

    let mut machine = booted("LDI R1, #1\nCMP R1, #2\nJC $borrow\nHLT\nborrow: LDI R3, #1\nHLT");
    machine.run().unwrap();
    assert_eq!(machine.cpu().reg(3), 1);
    assert!(machine.cpu().flags.contains(Flags::NEGATIVE));
  }

  #[test]
  fn signed_comparisons() {
    let source = "\
      LDI R1, #-5
      CMP R1, #3
      JL  $less
      HLT
      less: LDI R2, #1
      CMP R2, #-9
      JG  $greater
      HLT
      greater: LDI R3, #1
      HLT";
    let mut machine = booted(source);
    machine.run().unwrap();
    assert_eq!(machine.cpu().reg(2), 1);
    assert_eq!(machine.cpu().reg(3), 1);
  }

  #[test]
  fn shifts_and_logic() {
    let source = "\
      LDI R1, #-16
      ASR R2, R1, #2
      LSR R3, R1, #28
      LSL R4, R3, #33
      LDI R5, #0xFF
      AND R5, #0x0F
      NOT R6, R5
      MOD R7, R5, #4
      HLT";
    let mut machine = booted(source);
    machine.run().unwrap();
    let cpu = machine.cpu();
    assert_eq!(cpu.reg(2), -4i32 as Word);
    assert_eq!(cpu.reg(3), 0xF);
    assert_eq!(cpu.reg(4), 0x1E);
    assert_eq!(cpu.reg(5), 0x0F);
    assert_eq!(cpu.reg(6), !0x0F);
    assert_eq!(cpu.reg(7), 3);
  }

  #[test]
  fn memory_access_and_bounds() {
    let mut machine = booted("LDI R1, #42\nSTR R1, #0x100\nLDI R2, #0x80\nLDR R3, R2, #0x80\nHLT");
    machine.run().unwrap();
    assert_eq!(machine.cpu().reg(3), 42);
    assert_eq!(machine.read_memory(Region::Ram, 0x100..0x101), Ok(&[42][..]));

    let mut machine = booted("LDI R2, #-1\nLDR R1, R2, #0\nHLT");
    assert_eq!(
      machine.run(),
      Err(RuntimeFault::MemoryOutOfBounds{ pc: 1, region: Region::Ram, address: 0xFFFF_FFFF })
    );
  }

  #[test]
  fn call_and_return() {
    let source = "\
      CALL $double
      HLT
      double: LDI R1, #21
      ADD R1, R1
      RET";
    let mut machine = booted(source);
    machine.run().unwrap();
    assert_eq!(machine.cpu().reg(1), 42);
    assert_eq!(machine.cpu().pc, 2);
    assert_eq!(machine.cpu().sp, 0x1_0000);
  }

  #[test]
  fn push_and_pop_restore_registers() {
    let source = "\
      LDI R1, #1
      LDI R2, #2
      PUSH R1, R2
      LDI R1, #0
      LDI R2, #0
      POP R1, R2
      HLT";
    let mut machine = booted(source);
    machine.run().unwrap();
    assert_eq!(machine.cpu().reg(1), 1);
    assert_eq!(machine.cpu().reg(2), 2);
    assert_eq!(machine.cpu().sp, 0x1_0000);
    // R1 went first, so R2 is on top.
    assert_eq!(machine.read_memory(Region::Ram, 0xFFFE..0x1_0000), Ok(&[2, 1][..]));
  }

  #[test]
  fn stack_overflow_does_not_wrap() {
    let config = MachineConfig{ stack_limit: 0xFFFF, ..MachineConfig::default() };
    let mut machine = Machine::new(config).unwrap();
    machine.load_program(&assemble("PUSH R1\nPUSH R1, R2\nHLT").unwrap()).unwrap();
    assert_eq!(machine.step(), Ok(ExecutionState::Running));
    assert_eq!(machine.cpu().sp, 0xFFFF);
    assert_eq!(machine.step(), Err(RuntimeFault::StackOverflow{ pc: 1, sp: 0xFFFF }));
    assert_eq!(machine.cpu().sp, 0xFFFF);
  }

  #[test]
  fn pop_on_empty_stack_underflows() {
    let mut machine = booted("POP R1\nHLT");
    assert_eq!(machine.run(), Err(RuntimeFault::StackUnderflow{ pc: 0, sp: 0x1_0000 }));
    let mut machine = booted("RET");
    assert_eq!(machine.run(), Err(RuntimeFault::StackUnderflow{ pc: 0, sp: 0x1_0000 }));
  }

  #[test]
  fn illegal_opcodes_fault() {
    let mut machine = Machine::new(MachineConfig::default()).unwrap();
    machine.load_program(&[0, 0x19 << 26]).unwrap();
    assert_eq!(machine.run(), Err(RuntimeFault::IllegalOpcode{ opcode: 0x19, pc: 1 }));
  }

  #[test]
  fn branches_must_stay_in_memory() {
    let mut machine = booted("JMP #-2");
    assert_eq!(
      machine.run(),
      Err(RuntimeFault::MemoryOutOfBounds{ pc: 0, region: Region::Ram, address: -1 })
    );
  }

  #[test]
  fn software_interrupt_without_a_vector() {
    let mut machine = booted("INT #3");
    assert_eq!(machine.run(), Err(RuntimeFault::InvalidInterruptNumber{ pc: 0, number: 3 }));
    let mut machine = booted("INT #16");
    assert_eq!(machine.run(), Err(RuntimeFault::InvalidInterruptNumber{ pc: 0, number: 16 }));
  }

  #[test]
  fn software_interrupt_round_trip() {
    let mut machine = booted("INT #2\nLDI R1, #1\nHLT");
    let mut bios = vec![0; 0x41];
    bios[0]    = assemble("INT #0").unwrap()[0];
    bios[0x40] = assemble("IRET").unwrap()[0];
    machine.load_bios(&bios).unwrap();
    machine.set_vector(2, 0x40).unwrap();
    assert_eq!(machine.cpu().mode, Mode::Bios);

    // The BIOS hands off to the kernel without touching the stack.
    assert_eq!(machine.step(), Ok(ExecutionState::Running));
    assert_eq!(machine.cpu().mode, Mode::Kernel);
    assert_eq!(machine.cpu().pc, 0);
    assert_eq!(machine.cpu().sp, 0x1_0000);

    machine.step().unwrap();
    assert_eq!(machine.cpu().mode, Mode::Bios);
    assert_eq!(machine.cpu().pc, 0x40);
    // Return address on top, interrupted mode below it.
    assert_eq!(machine.read_memory(Region::Ram, 0xFFFE..0x1_0000), Ok(&[1, 1][..]));

    machine.run().unwrap();
    assert_eq!(machine.cpu().mode, Mode::Kernel);
    assert_eq!(machine.cpu().reg(1), 1);
    assert_eq!(machine.cpu().sp, 0x1_0000);
  }

  #[test]
  fn iret_enters_user_mode_and_validates_the_frame() {
    let source = "\
      LDI R1, #2
      LDI R2, $user
      PUSH R1, R2
      IRET
      user: HLT";
    let mut machine = booted(source);
    machine.run().unwrap();
    assert_eq!(machine.cpu().mode, Mode::User);
    assert_eq!(machine.cpu().pc, 5);

    let mut machine = booted("LDI R1, #7\nLDI R2, #0\nPUSH R1, R2\nIRET");
    assert_eq!(machine.run(), Err(RuntimeFault::InvalidMode{ pc: 3, value: 7 }));
    assert_eq!(machine.cpu().sp, 0xFFFE);
    assert_eq!(machine.cpu().mode, Mode::Kernel);
  }

  #[test]
  fn timer_ticks_without_a_vector_are_dropped() {
    let config = MachineConfig{ timer_period: 3, ..MachineConfig::default() };
    let mut machine = Machine::new(config).unwrap();
    machine.load_program(&assemble("loop: JMP $loop").unwrap()).unwrap();
    // No vector installed: the tick is dropped and the loop keeps running.
    assert_eq!(machine.run_for(10), Ok(RunOutcome::BudgetExhausted));
    assert_eq!(machine.cpu().mode, Mode::Kernel);
    assert_eq!(machine.cpu().sp, 0x1_0000);
    assert!(!machine.cpu().flag(Flags::INTERRUPT_PENDING));
  }

  #[test]
  fn disabled_interrupts_stay_pending() {
    let config = MachineConfig{ timer_period: 2, ..MachineConfig::default() };
    let mut machine = Machine::new(config).unwrap();
    machine.load_program(&assemble("DI\nNOP\nNOP\nHLT").unwrap()).unwrap();
    machine.set_vector(0, 0x40).unwrap();
    assert_eq!(machine.run(), Ok(4));
    assert!(machine.cpu().flag(Flags::INTERRUPT_PENDING));
    assert_eq!(machine.cpu().mode, Mode::Kernel);
  }

  #[test]
  fn framebuffer_writes_reach_the_observer() {
    let writes = Rc::new(RefCell::new(Vec::new()));
    let sink   = writes.clone();

    let mut machine = booted("LDI R1, #7\nLDI R2, #0x7FFF\nSTR R1, R2, #66\nSTR R1, #0x10\nHLT");
    machine.set_framebuffer_observer(move |row: usize, pixels: &[Word]| {
      sink.borrow_mut().push((row, pixels.len(), pixels[1]));
    });
    machine.run().unwrap();
    // 0x7FFF + 66 = 0x8041: row 1, column 1.
    assert_eq!(*writes.borrow(), vec![(1, 64, 7)]);
  }
}
