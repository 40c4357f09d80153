use proptest::prelude::*;

use isa32::assembler::assemble;
use isa32::bytecode::{encode_instruction, try_decode_instruction, Instruction, Operation, Source};
use isa32::{Machine, MachineConfig, Region};

fn operation_of(family: &'static [Operation]) -> impl Strategy<Value = Operation> {
  prop::sample::select(family)
}

const R_OPERATIONS  : &[Operation] = &[Operation::Nop, Operation::Not, Operation::Hlt, Operation::Ret, Operation::Iret];
const I_OPERATIONS  : &[Operation] = &[Operation::Ldr, Operation::Str, Operation::Ldi, Operation::Push, Operation::Int];
const RI_OPERATIONS : &[Operation] = &[Operation::Mov, Operation::Add, Operation::Asr, Operation::Div, Operation::Test];
const M_OPERATIONS  : &[Operation] = &[Operation::Jmp, Operation::Jg, Operation::Call];

fn instruction() -> impl Strategy<Value = Instruction> {
  let register = 0u8..16;
  prop_oneof![
    (operation_of(R_OPERATIONS), register.clone(), register.clone(), register.clone())
      .prop_map(|(operation, rd, rs, rt)| Instruction::Register{ operation, rd, rs, rt }),
    (operation_of(I_OPERATIONS), register.clone(), prop::option::of(register.clone()), any::<i16>())
      .prop_map(|(operation, rd, base, immediate)| Instruction::Immediate{ operation, rd, base, immediate }),
    (operation_of(RI_OPERATIONS), register.clone(), register.clone(), register.clone(), any::<i16>(), any::<bool>())
      .prop_map(|(operation, rd, rs, rt, immediate, use_immediate)| {
        let source = if use_immediate { Source::Immediate(immediate) } else { Source::Register(rt) };
        Instruction::RegisterImmediate{ operation, rd, rs, source }
      }),
    (operation_of(M_OPERATIONS), -0x80_0000i32..0x80_0000)
      .prop_map(|(operation, offset)| Instruction::Branch{ operation, offset }),
  ]
}

proptest! {
  #[test]
  fn decode_inverts_encode(instruction in instruction()) {
    let word = encode_instruction(&instruction);
    prop_assert_eq!(try_decode_instruction(word), Ok(instruction), "word {:#010X}", word);
  }

  #[test]
  fn add_wraps_modulo_word(a in any::<i16>(), b in any::<i16>()) {
    let source = format!("MOV R1, #{a}\nMOV R2, #{b}\nADD R1, R2\nHLT");
    let mut machine = Machine::new(MachineConfig::default()).unwrap();
    machine.load_program(&assemble(&source).unwrap()).unwrap();
    machine.run().unwrap();
    prop_assert_eq!(machine.cpu().reg(1), (a as i32 as u32).wrapping_add(b as i32 as u32));
  }

  #[test]
  fn push_then_pop_restores_registers(values in prop::array::uniform16(any::<i16>()), mask in 1u16..=u16::MAX) {
    let mut source = String::new();
    for (register, value) in values.iter().enumerate() {
      source.push_str(&format!("LDI R{register}, #{value}\n"));
    }
    source.push_str(&format!("PUSH #{mask}\n"));
    for register in 0..16 {
      source.push_str(&format!("LDI R{register}, #0\n"));
    }
    source.push_str(&format!("POP #{mask}\nHLT\n"));

    let mut machine = Machine::new(MachineConfig::default()).unwrap();
    machine.load_program(&assemble(&source).unwrap()).unwrap();
    machine.run().unwrap();

    let cpu = machine.cpu();
    prop_assert_eq!(cpu.sp, 0x1_0000);
    for register in 0..16u8 {
      let expected = if mask & (1 << register) != 0 { values[register as usize] as i32 as u32 } else { 0 };
      prop_assert_eq!(cpu.reg(register), expected, "R{}", register);
    }
    let pushed = mask.count_ones() as usize;
    prop_assert_eq!(machine.read_memory(Region::Ram, 0x1_0000 - pushed..0x1_0000).unwrap().len(), pushed);
  }
}
