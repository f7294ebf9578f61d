//! MAC-1 instruction word representation
//!
//! A word is 4 opcode bits (high nibble) over a 12-bit operand field.
//! Opcode 0xF reinterprets the operand field as a 4-bit discriminator
//! (top nibble) selecting a stack operation, plus an 8-bit immediate
//! used only by INSP/DESP.

/// Opcode value shared by all Type-F stack operations
pub const OPCODE_STACK: u16 = 0xF;

/// Macro operations carrying an address or constant in the operand field
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    Lodd,
    Stod,
    Addd,
    Subd,
    Jpos,
    Jzer,
    Jump,
    Loco,
    Lodl,
    Stol,
    Addl,
    Subl,
    Jneg,
    Jnze,
    Call,
}

impl Opcode {
    /// The high-nibble encoding of this opcode
    pub fn code(self) -> u16 {
        match self {
            Opcode::Lodd => 0x0,
            Opcode::Stod => 0x1,
            Opcode::Addd => 0x2,
            Opcode::Subd => 0x3,
            Opcode::Jpos => 0x4,
            Opcode::Jzer => 0x5,
            Opcode::Jump => 0x6,
            Opcode::Loco => 0x7,
            Opcode::Lodl => 0x8,
            Opcode::Stol => 0x9,
            Opcode::Addl => 0xA,
            Opcode::Subl => 0xB,
            Opcode::Jneg => 0xC,
            Opcode::Jnze => 0xD,
            Opcode::Call => 0xE,
        }
    }
}

/// Type-F stack operations, selected by the discriminator nibble
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StackOp {
    Pshi,
    Popi,
    Push,
    Pop,
    Retn,
    Swap,
    Insp,
    Desp,
}

impl StackOp {
    /// The 4-bit discriminator placed in the top of the operand field
    pub fn discriminator(self) -> u16 {
        match self {
            StackOp::Pshi => 0x0,
            StackOp::Popi => 0x2,
            StackOp::Push => 0x4,
            StackOp::Pop => 0x6,
            StackOp::Retn => 0x8,
            StackOp::Swap => 0xA,
            StackOp::Insp => 0xC,
            StackOp::Desp => 0xE,
        }
    }

    /// Maps a discriminator nibble back to its operation.
    /// Unassigned values are left to the control unit's fallback.
    pub fn from_discriminator(value: u16) -> Option<Self> {
        match value {
            0x0 => Some(StackOp::Pshi),
            0x2 => Some(StackOp::Popi),
            0x4 => Some(StackOp::Push),
            0x6 => Some(StackOp::Pop),
            0x8 => Some(StackOp::Retn),
            0xA => Some(StackOp::Swap),
            0xC => Some(StackOp::Insp),
            0xE => Some(StackOp::Desp),
            _ => None,
        }
    }

    /// INSP and DESP carry a user-supplied amount in the immediate bits
    pub fn takes_amount(self) -> bool {
        matches!(self, StackOp::Insp | StackOp::Desp)
    }
}

/// A recognized mnemonic: either an addressed macro-op or a stack op
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mnemonic {
    Addressed(Opcode),
    Stack(StackOp),
}

/// Case-insensitive mnemonic lookup
pub fn lookup_mnemonic(token: &str) -> Option<Mnemonic> {
    use Mnemonic::*;
    match token.to_uppercase().as_str() {
        "LODD" => Some(Addressed(Opcode::Lodd)),
        "STOD" => Some(Addressed(Opcode::Stod)),
        "ADDD" => Some(Addressed(Opcode::Addd)),
        "SUBD" => Some(Addressed(Opcode::Subd)),
        "JPOS" => Some(Addressed(Opcode::Jpos)),
        "JZER" => Some(Addressed(Opcode::Jzer)),
        "JUMP" => Some(Addressed(Opcode::Jump)),
        "LOCO" => Some(Addressed(Opcode::Loco)),
        "LODL" => Some(Addressed(Opcode::Lodl)),
        "STOL" => Some(Addressed(Opcode::Stol)),
        "ADDL" => Some(Addressed(Opcode::Addl)),
        "SUBL" => Some(Addressed(Opcode::Subl)),
        "JNEG" => Some(Addressed(Opcode::Jneg)),
        "JNZE" => Some(Addressed(Opcode::Jnze)),
        "CALL" => Some(Addressed(Opcode::Call)),
        "PSHI" => Some(Stack(StackOp::Pshi)),
        "POPI" => Some(Stack(StackOp::Popi)),
        "PUSH" => Some(Stack(StackOp::Push)),
        "POP" => Some(Stack(StackOp::Pop)),
        "RETN" => Some(Stack(StackOp::Retn)),
        "SWAP" => Some(Stack(StackOp::Swap)),
        "INSP" => Some(Stack(StackOp::Insp)),
        "DESP" => Some(Stack(StackOp::Desp)),
        _ => None,
    }
}

/// Builds a 16-bit word from an opcode nibble and a 12-bit operand
pub fn encode(opcode: u16, operand: u16) -> u16 {
    (opcode << 12) | (operand & 0xFFF)
}

/// Extracts the opcode nibble from a word
pub fn opcode_field(word: u16) -> u16 {
    (word >> 12) & 0xF
}

/// Extracts the 12-bit operand field from a word
pub fn operand_field(word: u16) -> u16 {
    word & 0xFFF
}

/// Extracts the Type-F discriminator nibble from a word
pub fn stack_discriminator(word: u16) -> u16 {
    (word >> 8) & 0xF
}

/// Extracts the Type-F 8-bit immediate from a word
pub fn stack_immediate(word: u16) -> u16 {
    word & 0xFF
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_extraction() {
        let word = encode(Opcode::Jump.code(), 0x123);
        assert_eq!(word, 0x6123);
        assert_eq!(opcode_field(word), 0x6);
        assert_eq!(operand_field(word), 0x123);
    }

    #[test]
    fn test_encode_masks_operand() {
        assert_eq!(encode(0x2, 0xFFFF), 0x2FFF);
    }

    #[test]
    fn test_stack_fields() {
        let word =
            encode(OPCODE_STACK, (StackOp::Insp.discriminator() << 8) | 5);
        assert_eq!(word, 0xFC05);
        assert_eq!(stack_discriminator(word), 0xC);
        assert_eq!(stack_immediate(word), 5);
    }

    #[test]
    fn test_discriminator_roundtrip() {
        for op in [
            StackOp::Pshi,
            StackOp::Popi,
            StackOp::Push,
            StackOp::Pop,
            StackOp::Retn,
            StackOp::Swap,
            StackOp::Insp,
            StackOp::Desp,
        ] {
            assert_eq!(StackOp::from_discriminator(op.discriminator()), Some(op));
        }
        assert_eq!(StackOp::from_discriminator(0x1), None);
        assert_eq!(StackOp::from_discriminator(0xF), None);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(
            lookup_mnemonic("lodd"),
            Some(Mnemonic::Addressed(Opcode::Lodd))
        );
        assert_eq!(lookup_mnemonic("Push"), Some(Mnemonic::Stack(StackOp::Push)));
        assert_eq!(lookup_mnemonic("NOPE"), None);
    }
}
