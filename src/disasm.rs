// Disassembler for the LR35902. A pure function of the bus and an address:
// no cursor, no state, callers pass the next address themselves using the
// returned instruction length.
//
// Decoding works on the same bit-pattern groups the interpreter uses, so a
// handful of masked arms cover the whole 256 + 256 entry opcode space.
use super::memory::Memory;

const R8: [&str; 8] = ["B", "C", "D", "E", "H", "L", "(HL)", "A"];
const R16_GRP1: [&str; 4] = ["BC", "DE", "HL", "SP"];
const R16_GRP2: [&str; 4] = ["BC", "DE", "HL+", "HL-"];
const R16_GRP3: [&str; 4] = ["BC", "DE", "HL", "AF"];
const CONDITION: [&str; 4] = ["NZ", "Z", "NC", "C"];
const OP_GRP1: [&str; 8] = ["RLCA", "RRCA", "RLA", "RRA", "DAA", "CPL", "SCF", "CCF"];
const OP_GRP2: [&str; 8] = ["ADD", "ADC", "SUB", "SBC", "AND", "XOR", "OR", "CP"];
const OP_GRP3: [&str; 8] = ["RLC", "RRC", "RL", "RR", "SLA", "SRA", "SWAP", "SRL"];

// Mnemonic and byte length of the instruction at address a.
pub fn disassemble(mem: &dyn Memory, a: u16) -> (String, u16) {
    let opcode = mem.get(a);
    let n = mem.get(a.wrapping_add(1));
    let nn = u16::from(n) | (u16::from(mem.get(a.wrapping_add(2))) << 8);

    match opcode {
        0x00 => ("NOP".to_string(), 1),
        0x10 => ("STOP".to_string(), 2),
        0x76 => ("HALT".to_string(), 1),
        0xf3 => ("DI".to_string(), 1),
        0xfb => ("EI".to_string(), 1),
        0x08 => (format!("LD (0x{:04x}), SP", nn), 3),
        0x18 => (format!("JR PC+({})", n as i8), 2),
        0xc3 => (format!("JP 0x{:04x}", nn), 3),
        0xc9 => ("RET".to_string(), 1),
        0xd9 => ("RETI".to_string(), 1),
        0xcd => (format!("CALL 0x{:04x}", nn), 3),
        0xe0 => (format!("LD (0x{:04x}), A", 0xff00 | u16::from(n)), 2),
        0xf0 => (format!("LD A, (0x{:04x})", 0xff00 | u16::from(n)), 2),
        0xe2 => ("LD (0xff00+C), A".to_string(), 1),
        0xf2 => ("LD A, (0xff00+C)".to_string(), 1),
        0xe8 => (format!("ADD SP, {}", n as i8), 2),
        0xf8 => (format!("LD HL, SP+({})", n as i8), 2),
        0xf9 => ("LD SP, HL".to_string(), 1),
        0xe9 => ("JP HL".to_string(), 1),
        0xea => (format!("LD (0x{:04x}), A", nn), 3),
        0xfa => (format!("LD A, (0x{:04x})", nn), 3),
        0xcb => {
            let r = R8[(n & 0x07) as usize];
            let s = match n {
                0x00..=0x3f => format!("{} {}", OP_GRP3[(n >> 3) as usize], r),
                0x40..=0x7f => format!("BIT {}, {}", n >> 3 & 0x07, r),
                0x80..=0xbf => format!("RES {}, {}", n >> 3 & 0x07, r),
                _ => format!("SET {}, {}", n >> 3 & 0x07, r),
            };
            (s, 2)
        }
        x if x & 0xe7 == 0x20 => {
            (format!("JR {}, PC+({})", CONDITION[(x >> 3 & 0x03) as usize], n as i8), 2)
        }
        x if x & 0xcf == 0x01 => {
            (format!("LD {}, 0x{:04x}", R16_GRP1[(x >> 4 & 0x03) as usize], nn), 3)
        }
        x if x & 0xcf == 0x09 => (format!("ADD HL, {}", R16_GRP1[(x >> 4 & 0x03) as usize]), 1),
        x if x & 0xcf == 0x02 => (format!("LD ({}), A", R16_GRP2[(x >> 4 & 0x03) as usize]), 1),
        x if x & 0xcf == 0x0a => (format!("LD A, ({})", R16_GRP2[(x >> 4 & 0x03) as usize]), 1),
        x if x & 0xcf == 0x03 => (format!("INC {}", R16_GRP1[(x >> 4 & 0x03) as usize]), 1),
        x if x & 0xcf == 0x0b => (format!("DEC {}", R16_GRP1[(x >> 4 & 0x03) as usize]), 1),
        x if x & 0xc7 == 0x04 => (format!("INC {}", R8[(x >> 3 & 0x07) as usize]), 1),
        x if x & 0xc7 == 0x05 => (format!("DEC {}", R8[(x >> 3 & 0x07) as usize]), 1),
        x if x & 0xc7 == 0x06 => (format!("LD {}, 0x{:02x}", R8[(x >> 3 & 0x07) as usize], n), 2),
        x if x & 0xc7 == 0x07 => (OP_GRP1[(x >> 3 & 0x07) as usize].to_string(), 1),
        x if x & 0xc0 == 0x40 => {
            (format!("LD {}, {}", R8[(x >> 3 & 0x07) as usize], R8[(x & 0x07) as usize]), 1)
        }
        x if x & 0xc0 == 0x80 => {
            (format!("{} A, {}", OP_GRP2[(x >> 3 & 0x07) as usize], R8[(x & 0x07) as usize]), 1)
        }
        x if x & 0xe7 == 0xc0 => (format!("RET {}", CONDITION[(x >> 3 & 0x03) as usize]), 1),
        x if x & 0xcf == 0xc1 => (format!("POP {}", R16_GRP3[(x >> 4 & 0x03) as usize]), 1),
        x if x & 0xcf == 0xc5 => (format!("PUSH {}", R16_GRP3[(x >> 4 & 0x03) as usize]), 1),
        x if x & 0xe7 == 0xc2 => {
            (format!("JP {}, 0x{:04x}", CONDITION[(x >> 3 & 0x03) as usize], nn), 3)
        }
        x if x & 0xe7 == 0xc4 => {
            (format!("CALL {}, 0x{:04x}", CONDITION[(x >> 3 & 0x03) as usize], nn), 3)
        }
        x if x & 0xc7 == 0xc6 => {
            (format!("{} A, 0x{:02x}", OP_GRP2[(x >> 3 & 0x07) as usize], n), 2)
        }
        x if x & 0xc7 == 0xc7 => (format!("RST 0x{:02x}", x & 0x38), 1),
        // Holes in the opcode map show up as raw data bytes.
        x => (format!("DB 0x{:02x}", x), 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Rom(Vec<u8>);

    impl Memory for Rom {
        fn get(&self, a: u16) -> u8 {
            self.0.get(a as usize).copied().unwrap_or(0x00)
        }

        fn set(&mut self, _: u16, _: u8) {}
    }

    fn dis(bytes: &[u8]) -> (String, u16) {
        disassemble(&Rom(bytes.to_vec()), 0)
    }

    #[test]
    fn test_plain_and_immediate_forms() {
        assert_eq!(dis(&[0x00]), ("NOP".to_string(), 1));
        assert_eq!(dis(&[0x01, 0x34, 0x12]), ("LD BC, 0x1234".to_string(), 3));
        assert_eq!(dis(&[0x3e, 0x7f]), ("LD A, 0x7f".to_string(), 2));
        assert_eq!(dis(&[0x36, 0x00]), ("LD (HL), 0x00".to_string(), 2));
        assert_eq!(dis(&[0x22]), ("LD (HL+), A".to_string(), 1));
        assert_eq!(dis(&[0x86]), ("ADD A, (HL)".to_string(), 1));
        assert_eq!(dis(&[0xfe, 0x90]), ("CP A, 0x90".to_string(), 2));
    }

    #[test]
    fn test_control_flow_forms() {
        assert_eq!(dis(&[0x20, 0xfe]), ("JR NZ, PC+(-2)".to_string(), 2));
        assert_eq!(dis(&[0xca, 0x00, 0x80]), ("JP Z, 0x8000".to_string(), 3));
        assert_eq!(dis(&[0xcd, 0xcd, 0xab]), ("CALL 0xabcd".to_string(), 3));
        assert_eq!(dis(&[0xd8]), ("RET C".to_string(), 1));
        assert_eq!(dis(&[0xef]), ("RST 0x28".to_string(), 1));
    }

    #[test]
    fn test_cb_prefix_forms() {
        assert_eq!(dis(&[0xcb, 0x7c]), ("BIT 7, H".to_string(), 2));
        assert_eq!(dis(&[0xcb, 0x37]), ("SWAP A".to_string(), 2));
        assert_eq!(dis(&[0xcb, 0x9e]), ("RES 3, (HL)".to_string(), 2));
        assert_eq!(dis(&[0xcb, 0xc1]), ("SET 0, C".to_string(), 2));
    }

    #[test]
    fn test_ff00_page_and_sp_forms() {
        assert_eq!(dis(&[0xe0, 0x44]), ("LD (0xff44), A".to_string(), 2));
        assert_eq!(dis(&[0xe8, 0xff]), ("ADD SP, -1".to_string(), 2));
        assert_eq!(dis(&[0xf8, 0x02]), ("LD HL, SP+(2)".to_string(), 2));
        assert_eq!(dis(&[0x08, 0x00, 0xc0]), ("LD (0xc000), SP".to_string(), 3));
    }

    #[test]
    fn test_unknown_opcode_as_data() {
        assert_eq!(dis(&[0xd3]), ("DB 0xd3".to_string(), 1));
    }
}
