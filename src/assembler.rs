//! Two-pass assembler
//!
//! Pass one strips comments and blank lines, records label definitions
//! with the word address of the next instruction, and keeps the
//! instruction statements. Pass two encodes each statement, resolving
//! operands against the symbol table.

use std::collections::HashMap;

use crate::error::AssemblyError;
use crate::instruction::{self, Mnemonic, OPCODE_STACK};

const COMMENT_CHAR: char = ';';

/// An instruction-bearing source line surviving pass one
#[derive(Clone, Copy, Debug)]
struct Statement<'a> {
    /// 1-based source line number, for diagnostics
    line: usize,
    /// Mnemonic and operand text, label and comment removed
    text: &'a str,
}

/// Assembles a full source listing into memory words, starting at
/// address 0
pub fn assemble(source: &str) -> Result<Vec<u16>, AssemblyError> {
    let (statements, symbols) = first_pass(source)?;
    second_pass(&statements, &symbols)
}

/// Collects labels and instruction statements. A label may share a
/// line with an instruction or stand alone; either way it names the
/// address of the next instruction word.
fn first_pass(
    source: &str,
) -> Result<(Vec<Statement<'_>>, HashMap<String, u16>), AssemblyError> {
    let mut statements = Vec::new();
    let mut symbols: HashMap<String, u16> = HashMap::new();

    for (index, raw) in source.lines().enumerate() {
        let line = index + 1;
        let mut text = match raw.find(COMMENT_CHAR) {
            Some(pos) => &raw[..pos],
            None => raw,
        }
        .trim();

        if let Some(pos) = text.find(':') {
            let label = text[..pos].trim().to_uppercase();
            if label.is_empty() || label.split_whitespace().count() != 1 {
                return Err(AssemblyError::InvalidOperand(
                    line,
                    text.to_string(),
                ));
            }
            let address = statements.len() as u16;
            if symbols.insert(label.clone(), address).is_some() {
                return Err(AssemblyError::DuplicateLabel(line, label));
            }
            text = text[pos + 1..].trim();
        }

        if text.is_empty() {
            continue;
        }
        statements.push(Statement { line, text });
    }

    Ok((statements, symbols))
}

fn second_pass(
    statements: &[Statement<'_>],
    symbols: &HashMap<String, u16>,
) -> Result<Vec<u16>, AssemblyError> {
    let mut words = Vec::with_capacity(statements.len());
    for statement in statements {
        words.push(encode_statement(statement, symbols)?);
    }
    Ok(words)
}

fn encode_statement(
    statement: &Statement<'_>,
    symbols: &HashMap<String, u16>,
) -> Result<u16, AssemblyError> {
    let mut parts = statement.text.split_whitespace();
    let token = parts.next().unwrap_or_default();
    let operand = parts.next();

    if parts.next().is_some() {
        return Err(AssemblyError::InvalidOperand(
            statement.line,
            statement.text.to_string(),
        ));
    }

    let mnemonic = instruction::lookup_mnemonic(token).ok_or_else(|| {
        AssemblyError::UnknownMnemonic(statement.line, token.to_string())
    })?;

    match mnemonic {
        Mnemonic::Addressed(opcode) => {
            let text = operand.ok_or_else(|| {
                AssemblyError::MissingOperand(
                    statement.line,
                    token.to_string(),
                )
            })?;
            let value = resolve_operand(statement.line, text, symbols)?;
            Ok(instruction::encode(opcode.code(), value))
        }
        Mnemonic::Stack(op) => {
            let amount = if op.takes_amount() {
                match operand {
                    Some(text) => {
                        resolve_operand(statement.line, text, symbols)?
                    }
                    None => 0,
                }
            } else {
                if operand.is_some() {
                    return Err(AssemblyError::InvalidOperand(
                        statement.line,
                        statement.text.to_string(),
                    ));
                }
                0
            };
            Ok((OPCODE_STACK << 12)
                | (op.discriminator() << 8)
                | (amount & 0xFF))
        }
    }
}

/// Operand resolution order: label, hexadecimal with an 0x prefix,
/// decimal. Values are masked to the 12-bit operand field.
fn resolve_operand(
    line: usize,
    text: &str,
    symbols: &HashMap<String, u16>,
) -> Result<u16, AssemblyError> {
    if let Some(address) = symbols.get(&text.to_uppercase()) {
        return Ok(*address);
    }

    let upper = text.to_uppercase();
    if let Some(hex) = upper.strip_prefix("0X") {
        return u16::from_str_radix(hex, 16)
            .map(|value| value & 0xFFF)
            .map_err(|_| {
                AssemblyError::InvalidOperand(line, text.to_string())
            });
    }

    text.parse::<i32>()
        .map(|value| (value as u16) & 0xFFF)
        .map_err(|_| AssemblyError::InvalidOperand(line, text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_instruction() {
        assert_eq!(assemble("LOCO 5").unwrap(), vec![0x7005]);
    }

    #[test]
    fn test_label_resolves_to_own_address() {
        assert_eq!(assemble("LOOP: JUMP LOOP").unwrap(), vec![0x6000]);
    }

    #[test]
    fn test_label_on_own_line() {
        let source = "LOCO 1\nTOP:\nADDD 10\nJUMP TOP";
        assert_eq!(
            assemble(source).unwrap(),
            vec![0x7001, 0x200A, 0x6001]
        );
    }

    #[test]
    fn test_comments_and_blank_lines_skipped() {
        let source = "; whole-line comment\n\nLOCO 3 ; trailing\n";
        assert_eq!(assemble(source).unwrap(), vec![0x7003]);
    }

    #[test]
    fn test_mnemonics_case_insensitive() {
        assert_eq!(
            assemble("loco 9").unwrap(),
            assemble("LOCO 9").unwrap()
        );
    }

    #[test]
    fn test_hex_operand() {
        assert_eq!(assemble("LODD 0x1F").unwrap(), vec![0x001F]);
    }

    #[test]
    fn test_operand_masked_to_twelve_bits() {
        assert_eq!(assemble("JUMP 0xFFFF").unwrap(), vec![0x6FFF]);
    }

    #[test]
    fn test_stack_encodings() {
        assert_eq!(assemble("PUSH").unwrap(), vec![0xF400]);
        assert_eq!(assemble("POP").unwrap(), vec![0xF600]);
        assert_eq!(assemble("RETN").unwrap(), vec![0xF800]);
        assert_eq!(assemble("SWAP").unwrap(), vec![0xFA00]);
        assert_eq!(assemble("INSP 5").unwrap(), vec![0xFC05]);
        assert_eq!(assemble("DESP 2").unwrap(), vec![0xFE02]);
        assert_eq!(assemble("PSHI").unwrap(), vec![0xF000]);
        assert_eq!(assemble("POPI").unwrap(), vec![0xF200]);
    }

    #[test]
    fn test_insp_amount_defaults_to_zero() {
        assert_eq!(assemble("INSP").unwrap(), vec![0xFC00]);
    }

    #[test]
    fn test_unknown_mnemonic() {
        assert_eq!(
            assemble("FROB 1"),
            Err(AssemblyError::UnknownMnemonic(1, "FROB".to_string()))
        );
    }

    #[test]
    fn test_missing_operand() {
        assert_eq!(
            assemble("LODD"),
            Err(AssemblyError::MissingOperand(1, "LODD".to_string()))
        );
    }

    #[test]
    fn test_invalid_operand() {
        assert_eq!(
            assemble("LODD nowhere"),
            Err(AssemblyError::InvalidOperand(1, "nowhere".to_string()))
        );
    }

    #[test]
    fn test_stack_op_rejects_operand() {
        assert!(matches!(
            assemble("PUSH 3"),
            Err(AssemblyError::InvalidOperand(1, _))
        ));
    }

    #[test]
    fn test_duplicate_label() {
        let source = "A: LOCO 1\nA: LOCO 2";
        assert_eq!(
            assemble(source),
            Err(AssemblyError::DuplicateLabel(2, "A".to_string()))
        );
    }

    #[test]
    fn test_forward_reference() {
        let source = "JUMP END\nLOCO 1\nEND: LOCO 2";
        assert_eq!(
            assemble(source).unwrap(),
            vec![0x6002, 0x7001, 0x7002]
        );
    }
}
