//! PIC14 Disassembler
//!
//! Provides instruction disassembly for tracing and debugging. File
//! operands are named from a chip's bank 0 register map when one is given,
//! otherwise printed as hex.

use crate::chip::ChipDescriptor;
use crate::cpu::{decode, BitOp, Dest, Instruction, LitOp};

/// Result of disassembling an instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisasmResult {
    /// Raw word as hex (e.g., "1683")
    pub word: String,
    /// Mnemonic with operands (e.g., "BSF STATUS,5")
    pub mnemonic: String,
}

/// Disassemble one program word
///
/// # Arguments
/// * `word` - 14-bit program word
/// * `chip` - Part whose register names label file operands
pub fn disassemble(word: u16, chip: Option<&ChipDescriptor>) -> DisasmResult {
    let file = |f: u8| file_name(f, chip);
    let mnemonic = match decode(word) {
        Instruction::Nop => "NOP".to_string(),
        Instruction::Return => "RETURN".to_string(),
        Instruction::Retfie => "RETFIE".to_string(),
        Instruction::Sleep => "SLEEP".to_string(),
        Instruction::Clrwdt => "CLRWDT".to_string(),
        Instruction::Option => "OPTION".to_string(),
        Instruction::Tris(f) => format!("TRIS {}", file(f)),
        Instruction::Movwf(f) => format!("MOVWF {}", file(f)),
        Instruction::Clrw => "CLRW".to_string(),
        Instruction::Clrf(f) => format!("CLRF {}", file(f)),
        Instruction::File(op, f, d) => {
            let d = match d {
                Dest::W => 'W',
                Dest::F => 'F',
            };
            format!("{} {},{}", op.mnemonic(), file(f), d)
        }
        Instruction::Bit(op, f, b) => {
            let name = match op {
                BitOp::Bcf => "BCF",
                BitOp::Bsf => "BSF",
                BitOp::Btfsc => "BTFSC",
                BitOp::Btfss => "BTFSS",
            };
            format!("{} {},{}", name, file(f), b)
        }
        Instruction::Call(k) => format!("CALL 0x{:03X}", k),
        Instruction::Goto(k) => format!("GOTO 0x{:03X}", k),
        Instruction::Literal(op, k) => {
            let name = match op {
                LitOp::Movlw => "MOVLW",
                LitOp::Retlw => "RETLW",
                LitOp::Iorlw => "IORLW",
                LitOp::Andlw => "ANDLW",
                LitOp::Xorlw => "XORLW",
                LitOp::Sublw => "SUBLW",
                LitOp::Addlw => "ADDLW",
            };
            format!("{} 0x{:02X}", name, k)
        }
        Instruction::Invalid(w) => format!("DW 0x{:04X}", w),
    };

    DisasmResult {
        word: format!("{:04X}", word & 0x3FFF),
        mnemonic,
    }
}

/// Disassemble `count` words of a program starting at `start`
pub fn disassemble_range(
    words: &[u16],
    start: u16,
    count: usize,
    chip: Option<&ChipDescriptor>,
) -> Vec<(u16, DisasmResult)> {
    (0..count)
        .filter_map(|i| {
            let addr = start as usize + i;
            words.get(addr).map(|&w| (addr as u16, disassemble(w, chip)))
        })
        .collect()
}

fn file_name(f: u8, chip: Option<&ChipDescriptor>) -> String {
    chip.and_then(|c| {
        c.registers
            .iter()
            .find(|r| r.addrs.contains(&(f as u16)))
            .map(|r| r.name.to_string())
    })
    .unwrap_or_else(|| format!("0x{:02X}", f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chip::P16F628A;

    #[test]
    fn test_plain_operands() {
        assert_eq!(disassemble(0x305A, None).mnemonic, "MOVLW 0x5A");
        assert_eq!(disassemble(0x07A0, None).mnemonic, "ADDWF 0x20,F");
        assert_eq!(disassemble(0x2804, None).mnemonic, "GOTO 0x004");
        assert_eq!(disassemble(0x0000, None).mnemonic, "NOP");
        assert_eq!(disassemble(0x0001, None).mnemonic, "DW 0x0001");
    }

    #[test]
    fn test_named_operands() {
        let chip = Some(&P16F628A);
        assert_eq!(disassemble(0x1683, chip).mnemonic, "BSF STATUS,5");
        assert_eq!(disassemble(0x0086, chip).mnemonic, "MOVWF PORTB");
        assert_eq!(disassemble(0x0820, chip).mnemonic, "MOVF 0x20,W");
        assert_eq!(disassemble(0x1683, chip).word, "1683");
    }

    #[test]
    fn test_range_stops_at_end() {
        let listing = disassemble_range(&[0x3001, 0x0008], 1, 4, None);
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].0, 1);
        assert_eq!(listing[0].1.mnemonic, "RETURN");
    }
}
