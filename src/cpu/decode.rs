//! PIC14 instruction decoding
//!
//! Every 14-bit word decodes to an [`Instruction`]; words that match no
//! opcode decode to [`Instruction::Invalid`] and execute as NOP.
//!
//! Encoding groups (bits 13:12):
//! - `00`: byte-oriented file operations, plus the control opcodes
//! - `01`: bit-oriented file operations
//! - `10`: CALL / GOTO with an 11-bit target
//! - `11`: literal operations

/// Destination of a byte-oriented file operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dest {
    W,
    F,
}

/// Byte-oriented file operations taking `(f, d)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOp {
    Subwf,
    Decf,
    Iorwf,
    Andwf,
    Xorwf,
    Addwf,
    Movf,
    Comf,
    Incf,
    Decfsz,
    Rrf,
    Rlf,
    Swapf,
    Incfsz,
}

impl FileOp {
    const TABLE: [Option<FileOp>; 16] = [
        None,
        None,
        Some(FileOp::Subwf),
        Some(FileOp::Decf),
        Some(FileOp::Iorwf),
        Some(FileOp::Andwf),
        Some(FileOp::Xorwf),
        Some(FileOp::Addwf),
        Some(FileOp::Movf),
        Some(FileOp::Comf),
        Some(FileOp::Incf),
        Some(FileOp::Decfsz),
        Some(FileOp::Rrf),
        Some(FileOp::Rlf),
        Some(FileOp::Swapf),
        Some(FileOp::Incfsz),
    ];

    /// Opcode nibble (bits 11:8)
    pub fn opcode(self) -> u16 {
        match self {
            FileOp::Subwf => 0x2,
            FileOp::Decf => 0x3,
            FileOp::Iorwf => 0x4,
            FileOp::Andwf => 0x5,
            FileOp::Xorwf => 0x6,
            FileOp::Addwf => 0x7,
            FileOp::Movf => 0x8,
            FileOp::Comf => 0x9,
            FileOp::Incf => 0xA,
            FileOp::Decfsz => 0xB,
            FileOp::Rrf => 0xC,
            FileOp::Rlf => 0xD,
            FileOp::Swapf => 0xE,
            FileOp::Incfsz => 0xF,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            FileOp::Subwf => "SUBWF",
            FileOp::Decf => "DECF",
            FileOp::Iorwf => "IORWF",
            FileOp::Andwf => "ANDWF",
            FileOp::Xorwf => "XORWF",
            FileOp::Addwf => "ADDWF",
            FileOp::Movf => "MOVF",
            FileOp::Comf => "COMF",
            FileOp::Incf => "INCF",
            FileOp::Decfsz => "DECFSZ",
            FileOp::Rrf => "RRF",
            FileOp::Rlf => "RLF",
            FileOp::Swapf => "SWAPF",
            FileOp::Incfsz => "INCFSZ",
        }
    }
}

/// Bit-oriented operations taking `(f, b)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOp {
    Bcf,
    Bsf,
    Btfsc,
    Btfss,
}

/// Literal operations taking `k`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LitOp {
    Movlw,
    Retlw,
    Iorlw,
    Andlw,
    Xorlw,
    Sublw,
    Addlw,
}

/// One decoded instruction word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Nop,
    Return,
    Retfie,
    Sleep,
    Clrwdt,
    /// Load OPTION from W (legacy)
    Option,
    /// Load TRISx from W (legacy), `f` is 5..=7
    Tris(u8),
    Movwf(u8),
    Clrw,
    Clrf(u8),
    File(FileOp, u8, Dest),
    Bit(BitOp, u8, u8),
    Call(u16),
    Goto(u16),
    Literal(LitOp, u8),
    Invalid(u16),
}

/// Decode one 14-bit program word
pub fn decode(word: u16) -> Instruction {
    let word = word & 0x3FFF;
    let f = (word & 0x7F) as u8;
    let k = (word & 0xFF) as u8;

    match word >> 12 {
        0b00 => {
            let op = (word >> 8) & 0x0F;
            let d = if word & 0x80 != 0 { Dest::F } else { Dest::W };
            match op {
                0 if word & 0x80 != 0 => Instruction::Movwf(f),
                0 => match word {
                    0x0000 | 0x0020 | 0x0040 | 0x0060 => Instruction::Nop,
                    0x0008 => Instruction::Return,
                    0x0009 => Instruction::Retfie,
                    0x0062 => Instruction::Option,
                    0x0063 => Instruction::Sleep,
                    0x0064 => Instruction::Clrwdt,
                    0x0065..=0x0067 => Instruction::Tris(f),
                    _ => Instruction::Invalid(word),
                },
                1 if word & 0x80 != 0 => Instruction::Clrf(f),
                1 => Instruction::Clrw,
                _ => match FileOp::TABLE[op as usize] {
                    Some(op) => Instruction::File(op, f, d),
                    None => Instruction::Invalid(word),
                },
            }
        }
        0b01 => {
            let b = ((word >> 7) & 0x07) as u8;
            let op = match (word >> 10) & 0x03 {
                0 => BitOp::Bcf,
                1 => BitOp::Bsf,
                2 => BitOp::Btfsc,
                _ => BitOp::Btfss,
            };
            Instruction::Bit(op, f, b)
        }
        0b10 => {
            let target = word & 0x07FF;
            if word & 0x0800 == 0 {
                Instruction::Call(target)
            } else {
                Instruction::Goto(target)
            }
        }
        _ => {
            let op = match (word >> 8) & 0x0F {
                0x0..=0x3 => LitOp::Movlw,
                0x4..=0x7 => LitOp::Retlw,
                0x8 => LitOp::Iorlw,
                0x9 => LitOp::Andlw,
                0xA => LitOp::Xorlw,
                0xB => return Instruction::Invalid(word),
                0xC | 0xD => LitOp::Sublw,
                _ => LitOp::Addlw,
            };
            Instruction::Literal(op, k)
        }
    }
}

/// Encode an instruction back to its program word. Out-of-range operands
/// are masked to their field widths.
pub fn encode(inst: Instruction) -> u16 {
    let file = |f: u8| (f & 0x7F) as u16;
    match inst {
        Instruction::Nop => 0x0000,
        Instruction::Return => 0x0008,
        Instruction::Retfie => 0x0009,
        Instruction::Option => 0x0062,
        Instruction::Sleep => 0x0063,
        Instruction::Clrwdt => 0x0064,
        Instruction::Tris(f) => 0x0060 | (f & 0x07) as u16,
        Instruction::Movwf(f) => 0x0080 | file(f),
        Instruction::Clrw => 0x0103,
        Instruction::Clrf(f) => 0x0180 | file(f),
        Instruction::File(op, f, d) => {
            let d = if d == Dest::F { 0x80 } else { 0 };
            (op.opcode() << 8) | d | file(f)
        }
        Instruction::Bit(op, f, b) => {
            let op = match op {
                BitOp::Bcf => 0x1000,
                BitOp::Bsf => 0x1400,
                BitOp::Btfsc => 0x1800,
                BitOp::Btfss => 0x1C00,
            };
            op | (((b & 0x07) as u16) << 7) | file(f)
        }
        Instruction::Call(k) => 0x2000 | (k & 0x07FF),
        Instruction::Goto(k) => 0x2800 | (k & 0x07FF),
        Instruction::Literal(op, k) => {
            let op = match op {
                LitOp::Movlw => 0x3000,
                LitOp::Retlw => 0x3400,
                LitOp::Iorlw => 0x3800,
                LitOp::Andlw => 0x3900,
                LitOp::Xorlw => 0x3A00,
                LitOp::Sublw => 0x3C00,
                LitOp::Addlw => 0x3E00,
            };
            op | k as u16
        }
        Instruction::Invalid(word) => word & 0x3FFF,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_opcodes() {
        assert_eq!(decode(0x0000), Instruction::Nop);
        assert_eq!(decode(0x0008), Instruction::Return);
        assert_eq!(decode(0x0009), Instruction::Retfie);
        assert_eq!(decode(0x0063), Instruction::Sleep);
        assert_eq!(decode(0x0064), Instruction::Clrwdt);
        assert_eq!(decode(0x0062), Instruction::Option);
        assert_eq!(decode(0x0066), Instruction::Tris(6));
        assert_eq!(decode(0x0001), Instruction::Invalid(0x0001));
    }

    #[test]
    fn test_byte_oriented() {
        assert_eq!(decode(0x00A0), Instruction::Movwf(0x20));
        assert_eq!(decode(0x0103), Instruction::Clrw);
        assert_eq!(decode(0x0185), Instruction::Clrf(0x05));
        assert_eq!(decode(0x07A0), Instruction::File(FileOp::Addwf, 0x20, Dest::F));
        assert_eq!(decode(0x0820), Instruction::File(FileOp::Movf, 0x20, Dest::W));
        assert_eq!(decode(0x0FFF), Instruction::File(FileOp::Incfsz, 0x7F, Dest::F));
    }

    #[test]
    fn test_bit_oriented() {
        assert_eq!(decode(0x1683), Instruction::Bit(BitOp::Bsf, 0x03, 5));
        assert_eq!(decode(0x1283), Instruction::Bit(BitOp::Bcf, 0x03, 5));
        assert_eq!(decode(0x1C0B), Instruction::Bit(BitOp::Btfss, 0x0B, 0));
        assert_eq!(decode(0x1B8C), Instruction::Bit(BitOp::Btfsc, 0x0C, 7));
    }

    #[test]
    fn test_branches_and_literals() {
        assert_eq!(decode(0x2005), Instruction::Call(5));
        assert_eq!(decode(0x2FFF), Instruction::Goto(0x7FF));
        assert_eq!(decode(0x3055), Instruction::Literal(LitOp::Movlw, 0x55));
        assert_eq!(decode(0x3401), Instruction::Literal(LitOp::Retlw, 0x01));
        assert_eq!(decode(0x3C10), Instruction::Literal(LitOp::Sublw, 0x10));
        assert_eq!(decode(0x3E10), Instruction::Literal(LitOp::Addlw, 0x10));
        assert_eq!(decode(0x3B00), Instruction::Invalid(0x3B00));
    }

    #[test]
    fn test_encode_matches_assembler_output() {
        assert_eq!(encode(Instruction::Bit(BitOp::Bsf, 0x03, 5)), 0x1683);
        assert_eq!(encode(Instruction::Movwf(0x1D)), 0x009D);
        assert_eq!(encode(Instruction::File(FileOp::Movf, 0x20, Dest::W)), 0x0820);
        assert_eq!(encode(Instruction::Goto(0x0B)), 0x280B);
        assert_eq!(encode(Instruction::Literal(LitOp::Xorlw, 0xFF)), 0x3AFF);
        assert_eq!(encode(Instruction::Tris(6)), 0x0066);
    }

    #[test]
    fn test_decode_inverts_encode() {
        let program = [
            Instruction::Clrw,
            Instruction::Clrf(0x7F),
            Instruction::File(FileOp::Swapf, 0x21, Dest::F),
            Instruction::File(FileOp::Subwf, 0x00, Dest::W),
            Instruction::Bit(BitOp::Btfss, 0x0C, 7),
            Instruction::Call(0x7FF),
            Instruction::Literal(LitOp::Retlw, 0x80),
            Instruction::Retfie,
        ];
        for inst in program {
            assert_eq!(decode(encode(inst)), inst);
        }
    }
}
