use std::fmt;

/// A single 16-bit instruction word, viewed through its operand fields.
///
/// Nothing is validated up front; every accessor masks out the bits it needs, so any `u16`
/// is a valid `Instruction`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Instruction(pub u16);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    Br = 0x0,
    Add = 0x1,
    Ld = 0x2,
    St = 0x3,
    Jsr = 0x4,
    And = 0x5,
    Ldr = 0x6,
    Str = 0x7,
    Rti = 0x8,
    Not = 0x9,
    Ldi = 0xA,
    Sti = 0xB,
    Jmp = 0xC,
    Res = 0xD,
    Lea = 0xE,
    Trap = 0xF,
}

impl Opcode {
    const ALL: [Opcode; 16] = [
        Self::Br,
        Self::Add,
        Self::Ld,
        Self::St,
        Self::Jsr,
        Self::And,
        Self::Ldr,
        Self::Str,
        Self::Rti,
        Self::Not,
        Self::Ldi,
        Self::Sti,
        Self::Jmp,
        Self::Res,
        Self::Lea,
        Self::Trap,
    ];

    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Br => "BR",
            Self::Add => "ADD",
            Self::Ld => "LD",
            Self::St => "ST",
            Self::Jsr => "JSR",
            Self::And => "AND",
            Self::Ldr => "LDR",
            Self::Str => "STR",
            Self::Rti => "RTI",
            Self::Not => "NOT",
            Self::Ldi => "LDI",
            Self::Sti => "STI",
            Self::Jmp => "JMP",
            Self::Res => "RES",
            Self::Lea => "LEA",
            Self::Trap => "TRAP",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.mnemonic())
    }
}

impl From<u16> for Instruction {
    fn from(word: u16) -> Self {
        Self(word)
    }
}

impl Instruction {
    /// Bits 15-12.
    #[inline]
    pub fn opcode(self) -> Opcode {
        Opcode::ALL[(self.0 >> 12) as usize]
    }

    /// Destination register, also the source register of stores. Bits 11-9.
    #[inline]
    pub fn dr(self) -> u16 {
        (self.0 >> 9) & 0b111
    }

    /// First source register, also the base register of `JMP`, `JSRR`, `LDR` and `STR`.
    /// Bits 8-6.
    #[inline]
    pub fn sr1(self) -> u16 {
        (self.0 >> 6) & 0b111
    }

    #[inline]
    pub fn base(self) -> u16 {
        self.sr1()
    }

    /// Bits 2-0.
    #[inline]
    pub fn sr2(self) -> u16 {
        self.0 & 0b111
    }

    /// Immediate-mode flag of `ADD`/`AND`. Bit 5.
    #[inline]
    pub fn is_imm(self) -> bool {
        self.0 & 0b10_0000 != 0
    }

    #[inline]
    pub fn imm5(self) -> u16 {
        sign_extend(self.0, 5)
    }

    /// `n`, `z`, `p` mask of `BR`. Bits 11-9.
    #[inline]
    pub fn cond(self) -> u16 {
        (self.0 >> 9) & 0b111
    }

    #[inline]
    pub fn offset6(self) -> u16 {
        sign_extend(self.0, 6)
    }

    #[inline]
    pub fn offset9(self) -> u16 {
        sign_extend(self.0, 9)
    }

    #[inline]
    pub fn offset11(self) -> u16 {
        sign_extend(self.0, 11)
    }

    /// `JSR` (set) or `JSRR` (unset). Bit 11.
    #[inline]
    pub fn is_long(self) -> bool {
        self.0 & 0x0800 != 0
    }

    #[inline]
    pub fn trap_vector(self) -> u8 {
        (self.0 & 0xFF) as u8
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x} {:<4}", self.0, self.opcode())
    }
}

/// Sign-extend the low `bits` bits of `val` to 16 bits.
///
/// Any bits above the field are ignored.
#[inline]
pub fn sign_extend(val: u16, bits: u32) -> u16 {
    debug_assert!(bits > 0 && bits < 16);
    // Sign bit
    let sign = val & (1u16 << (bits - 1));
    // Bits lower than sign bit
    let magnitude = val & ((1u16 << bits) - 1);
    // Positive input: all bits unset; 0x0000
    // Negative input: sign bit and above will be set, lower bits will be reset
    //      Eg. bits=14 -> 0xE000
    let sign_extension = (!sign).wrapping_add(1); // sign * -1
    magnitude | sign_extension
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn sign_extend_table() {
        #[rustfmt::skip]
        let cases: &[(_, &[_])] = &[
            // (input, [bits...])
            //           15      14      13      12      11      10      9       8       7       6       5       4       3       2       1
            (0x0000, &[0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000]),
            (0x0001, &[0x0001, 0x0001, 0x0001, 0x0001, 0x0001, 0x0001, 0x0001, 0x0001, 0x0001, 0x0001, 0x0001, 0x0001, 0x0001, 0x0001, 0xffff]),
            (0x00ff, &[0x00ff, 0x00ff, 0x00ff, 0x00ff, 0x00ff, 0x00ff, 0x00ff, 0xffff, 0xffff]),
            (0x0100, &[0x0100, 0x0100, 0x0100, 0x0100, 0x0100, 0x0100, 0xff00, 0x0000, 0x0000]),
            (0x0400, &[0x0400, 0x0400, 0x0400, 0x0400, 0xfc00, 0x0000, 0x0000, 0x0000, 0x0000]),
            (0x07ff, &[0x07ff, 0x07ff, 0x07ff, 0x07ff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff]),
            (0x7fff, &[0xffff, 0xffff, 0xffff, 0xffff, 0xffff]),
            (0xffff, &[0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff]),
        ];

        for (input, expecteds) in cases {
            for (i, expected) in expecteds.iter().enumerate() {
                let bits = 15 - i as u32;
                let actual = sign_extend(*input, bits);
                assert_eq!(
                    actual, *expected,
                    "sign_extend(0x{input:04x}, {bits}) == 0x{actual:04x}"
                );
            }
        }
    }

    #[test]
    fn five_bit_all_ones_is_minus_one() {
        assert_eq!(sign_extend(0x1F, 5), 0xFFFF);
        assert_eq!(sign_extend(0x10, 5), (-16i16) as u16);
        assert_eq!(sign_extend(0x0F, 5), 0x000F);
    }

    proptest! {
        #[test]
        fn negative_fields_lose_two_to_the_n(bits in prop::sample::select(vec![5u32, 6, 9, 11]), raw in any::<u16>()) {
            let field = raw & ((1u16 << bits) - 1);
            let expected = if field & (1 << (bits - 1)) != 0 {
                (field as i32 - (1i32 << bits)) as i16 as u16
            } else {
                field
            };
            prop_assert_eq!(sign_extend(field, bits), expected);
            // Bits above the field never leak into the result
            prop_assert_eq!(sign_extend(raw, bits), expected);
        }
    }

    #[test]
    fn fields() {
        // ADD R3, R5, #-2
        let add = Instruction(0b0001_011_101_1_11110);
        assert_eq!(add.opcode(), Opcode::Add);
        assert_eq!(add.dr(), 3);
        assert_eq!(add.sr1(), 5);
        assert!(add.is_imm());
        assert_eq!(add.imm5(), (-2i16) as u16);

        // AND R1, R2, R7
        let and = Instruction(0b0101_001_010_0_00_111);
        assert_eq!(and.opcode(), Opcode::And);
        assert!(!and.is_imm());
        assert_eq!(and.sr2(), 7);

        // BRnp #-1
        let br = Instruction(0b0000_101_111111111);
        assert_eq!(br.cond(), 0b101);
        assert_eq!(br.offset9(), 0xFFFF);

        // JSR #1023 / JSRR R4
        assert!(Instruction(0x4BFF).is_long());
        assert_eq!(Instruction(0x4BFF).offset11(), 0x03FF);
        let jsrr = Instruction(0b0100_0_00_100_000000);
        assert!(!jsrr.is_long());
        assert_eq!(jsrr.base(), 4);

        // LDR R0, R6, #-32
        assert_eq!(Instruction(0b0110_000_110_100000).offset6(), (-32i16) as u16);

        assert_eq!(Instruction(0xF025).trap_vector(), 0x25);
        assert_eq!(Instruction(0xF025).opcode(), Opcode::Trap);
        assert_eq!(Instruction(0xD000).opcode(), Opcode::Res);
    }
}
