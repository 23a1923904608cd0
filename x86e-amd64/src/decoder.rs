use std::collections::HashMap;

use crate::assembler::{Program, SourceInstruction};
use crate::error::{EmulatorError, Result};
use crate::instructions::{AluOp, Condition, Instruction, Label};
use crate::operand::{Destination, Operand};

/// Decodes every parsed instruction up front, so operand counts, addressing
/// modes, immediates and branch targets are validated before execution.
pub fn decode_program(program: &Program) -> Result<Vec<Instruction>> {
    program
        .instructions
        .iter()
        .map(|ins| {
            decode_one(ins, &program.labels).map_err(|err| {
                tracing::error!("line {}: '{}': {}", ins.line, ins, err);
                err
            })
        })
        .collect()
}

pub fn decode_one(ins: &SourceInstruction, labels: &HashMap<String, usize>) -> Result<Instruction> {
    let ops = &ins.operands;
    let decoded = match ins.mnemonic.as_str() {
        "push" => {
            expect_operands(ins, 1)?;
            Instruction::Push {
                source: Operand::parse(&ops[0])?,
            }
        }
        "pop" => {
            expect_operands(ins, 1)?;
            Instruction::Pop {
                destination: Destination::parse(&ops[0])?,
            }
        }
        "mov" => {
            expect_operands(ins, 2)?;
            Instruction::Mov {
                destination: Destination::parse(&ops[0])?,
                source: Operand::parse(&ops[1])?,
            }
        }
        "add" | "sub" | "and" | "or" | "shl" | "shr" => {
            expect_operands(ins, 2)?;
            let op = match ins.mnemonic.as_str() {
                "add" => AluOp::Add,
                "sub" => AluOp::Sub,
                "and" => AluOp::And,
                "or" => AluOp::Or,
                "shl" => AluOp::Shl,
                _ => AluOp::Shr,
            };
            Instruction::Alu {
                op,
                destination: Destination::parse(&ops[0])?,
                source: Operand::parse(&ops[1])?,
            }
        }
        "cmp" => {
            expect_operands(ins, 2)?;
            Instruction::Cmp {
                lhs: Operand::parse(&ops[0])?,
                rhs: Operand::parse(&ops[1])?,
            }
        }
        "call" => {
            expect_operands(ins, 1)?;
            Instruction::Call {
                target: resolve_label(&ops[0], labels)?,
            }
        }
        "ret" => {
            expect_operands(ins, 0)?;
            Instruction::Ret
        }
        "jmp" => {
            expect_operands(ins, 1)?;
            Instruction::Jmp {
                target: resolve_label(&ops[0], labels)?,
            }
        }
        "jz" | "je" | "jnz" | "jne" | "jge" => {
            expect_operands(ins, 1)?;
            let condition = match ins.mnemonic.as_str() {
                "jz" | "je" => Condition::Zero,
                "jnz" | "jne" => Condition::NotZero,
                _ => Condition::GreaterOrEqual,
            };
            Instruction::Jcc {
                condition,
                target: resolve_label(&ops[0], labels)?,
            }
        }
        "nop" => {
            expect_operands(ins, 0)?;
            Instruction::Nop
        }
        "syscall" => {
            expect_operands(ins, 0)?;
            Instruction::Syscall
        }
        other => return Err(EmulatorError::UnsupportedInstruction(String::from(other))),
    };
    Ok(decoded)
}

fn expect_operands(ins: &SourceInstruction, expected: usize) -> Result<()> {
    if ins.operands.len() != expected {
        return Err(EmulatorError::InvalidOperandCount {
            mnemonic: ins.mnemonic.to_uppercase(),
            expected,
            found: ins.operands.len(),
        });
    }
    Ok(())
}

fn resolve_label(name: &str, labels: &HashMap<String, usize>) -> Result<Label> {
    let index = labels
        .get(name)
        .copied()
        .ok_or_else(|| EmulatorError::InvalidLabel(String::from(name)))?;
    Ok(Label {
        name: String::from(name),
        index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::RegisterRef;

    fn decode(source: &str) -> Result<Vec<Instruction>> {
        decode_program(&Program::parse(source))
    }

    #[test]
    fn decodes_typed_operands() {
        let decoded = decode("start:\nmov eax, 5\nadd rax, qword ptr [rbp - 8]\njne start\n").unwrap();
        assert_eq!(
            decoded[0],
            Instruction::Mov {
                destination: Destination::Register(RegisterRef::lookup("eax").unwrap()),
                source: Operand::Immediate(5),
            }
        );
        assert!(matches!(
            decoded[1],
            Instruction::Alu {
                op: AluOp::Add,
                source: Operand::Memory(_),
                ..
            }
        ));
        assert_eq!(
            decoded[2],
            Instruction::Jcc {
                condition: Condition::NotZero,
                target: Label {
                    name: String::from("start"),
                    index: 0
                },
            }
        );
        assert_eq!(decoded[1].to_string(), "add rax, qword ptr [rbp - 8]");
    }

    #[test]
    fn jump_aliases_share_conditions() {
        let decoded = decode("l:\njz l\nje l\njnz l\njne l\njge l\n").unwrap();
        let conditions: Vec<_> = decoded
            .iter()
            .map(|ins| match ins {
                Instruction::Jcc { condition, .. } => *condition,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(
            conditions,
            vec![
                Condition::Zero,
                Condition::Zero,
                Condition::NotZero,
                Condition::NotZero,
                Condition::GreaterOrEqual
            ]
        );
    }

    #[test]
    fn unknown_mnemonic_is_unsupported() {
        let err = decode("xor rax, rax").unwrap_err();
        assert!(matches!(err, EmulatorError::UnsupportedInstruction(m) if m == "xor"));
    }

    #[test]
    fn operand_counts_are_checked() {
        for (source, expected, found) in [
            ("push rax, rbx", 1, 2),
            ("mov rax", 2, 1),
            ("ret 8", 0, 1),
            ("syscall rax", 0, 1),
            ("cmp rax", 2, 1),
        ] {
            match decode(source).unwrap_err() {
                EmulatorError::InvalidOperandCount {
                    expected: e,
                    found: f,
                    ..
                } => assert_eq!((e, f), (expected, found), "{}", source),
                other => panic!("{}: unexpected {:?}", source, other),
            }
        }
    }

    #[test]
    fn undefined_labels_are_rejected() {
        for source in ["call nowhere", "jmp nowhere", "je nowhere"] {
            let err = decode(source).unwrap_err();
            assert!(matches!(err, EmulatorError::InvalidLabel(ref l) if l == "nowhere"));
        }
    }

    #[test]
    fn immediate_destinations_are_rejected() {
        let err = decode("mov 5, rax").unwrap_err();
        assert!(matches!(err, EmulatorError::InvalidDestination(_)));
        let err = decode("pop 1").unwrap_err();
        assert!(matches!(err, EmulatorError::InvalidDestination(_)));
    }
}
