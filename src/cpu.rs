// Interpreter for the sharp LR35902, the 8 bit core at the heart of the
// DMG. Instructions are decoded by the canonical bit-pattern groups: the
// three low bits (or bits 5-3) of an opcode index the register group
// B,C,D,E,H,L,(HL),A and bits 5-4 index one of the 16 bit pairs; (HL) is not
// a register but a bus access through the pointer in HL.
use super::memory::Memory;
use super::register::Flag::{C, H, N, Z};
use super::register::Register;

// Cost of every instruction in T-states (the 4.194304 MHz clock). Three
// tables: unprefixed opcodes when a conditional branch is not taken,
// unprefixed when it is taken, and the CB-prefixed set (prefix included).
//
//  0   1   2   3   4   5   6   7   8   9   a   b   c   d   e   f
const OP_CYCLES: [u32; 256] = [
    4, 12,  8,  8,  4,  4,  8,  4, 20,  8,  8,  8,  4,  4,  8,  4, // 0
    4, 12,  8,  8,  4,  4,  8,  4, 12,  8,  8,  8,  4,  4,  8,  4, // 1
    8, 12,  8,  8,  4,  4,  8,  4,  8,  8,  8,  8,  4,  4,  8,  4, // 2
    8, 12,  8,  8, 12, 12, 12,  4,  8,  8,  8,  8,  4,  4,  8,  4, // 3
    4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // 4
    4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // 5
    4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // 6
    8,  8,  8,  8,  8,  8,  4,  8,  4,  4,  4,  4,  4,  4,  8,  4, // 7
    4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // 8
    4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // 9
    4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // a
    4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // b
    8, 12, 12, 16, 12, 16,  8, 16,  8, 16, 12,  4, 12, 24,  8, 16, // c
    8, 12, 12,  0, 12, 16,  8, 16,  8, 16, 12,  0, 12,  0,  8, 16, // d
   12, 12,  8,  0,  0, 16,  8, 16, 16,  4, 16,  0,  0,  0,  8, 16, // e
   12, 12,  8,  4,  0, 16,  8, 16, 12,  8, 16,  4,  0,  0,  8, 16, // f
];

//  0   1   2   3   4   5   6   7   8   9   a   b   c   d   e   f
const OP_CYCLES_BRANCH: [u32; 256] = [
    4, 12,  8,  8,  4,  4,  8,  4, 20,  8,  8,  8,  4,  4,  8,  4, // 0
    4, 12,  8,  8,  4,  4,  8,  4, 12,  8,  8,  8,  4,  4,  8,  4, // 1
   12, 12,  8,  8,  4,  4,  8,  4, 12,  8,  8,  8,  4,  4,  8,  4, // 2
   12, 12,  8,  8, 12, 12, 12,  4, 12,  8,  8,  8,  4,  4,  8,  4, // 3
    4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // 4
    4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // 5
    4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // 6
    8,  8,  8,  8,  8,  8,  4,  8,  4,  4,  4,  4,  4,  4,  8,  4, // 7
    4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // 8
    4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // 9
    4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // a
    4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // b
   20, 12, 16, 16, 24, 16,  8, 16, 20, 16, 16,  4, 24, 24,  8, 16, // c
   20, 12, 16,  0, 24, 16,  8, 16, 20, 16, 16,  0, 24,  0,  8, 16, // d
   12, 12,  8,  0,  0, 16,  8, 16, 16,  4, 16,  0,  0,  0,  8, 16, // e
   12, 12,  8,  4,  0, 16,  8, 16, 12,  8, 16,  4,  0,  0,  8, 16, // f
];

//  0   1   2   3   4   5   6   7   8   9   a   b   c   d   e   f
const CB_CYCLES: [u32; 256] = [
    8,  8,  8,  8,  8,  8, 16,  8,  8,  8,  8,  8,  8,  8, 16,  8, // 0
    8,  8,  8,  8,  8,  8, 16,  8,  8,  8,  8,  8,  8,  8, 16,  8, // 1
    8,  8,  8,  8,  8,  8, 16,  8,  8,  8,  8,  8,  8,  8, 16,  8, // 2
    8,  8,  8,  8,  8,  8, 16,  8,  8,  8,  8,  8,  8,  8, 16,  8, // 3
    8,  8,  8,  8,  8,  8, 12,  8,  8,  8,  8,  8,  8,  8, 12,  8, // 4
    8,  8,  8,  8,  8,  8, 12,  8,  8,  8,  8,  8,  8,  8, 12,  8, // 5
    8,  8,  8,  8,  8,  8, 12,  8,  8,  8,  8,  8,  8,  8, 12,  8, // 6
    8,  8,  8,  8,  8,  8, 12,  8,  8,  8,  8,  8,  8,  8, 12,  8, // 7
    8,  8,  8,  8,  8,  8, 16,  8,  8,  8,  8,  8,  8,  8, 16,  8, // 8
    8,  8,  8,  8,  8,  8, 16,  8,  8,  8,  8,  8,  8,  8, 16,  8, // 9
    8,  8,  8,  8,  8,  8, 16,  8,  8,  8,  8,  8,  8,  8, 16,  8, // a
    8,  8,  8,  8,  8,  8, 16,  8,  8,  8,  8,  8,  8,  8, 16,  8, // b
    8,  8,  8,  8,  8,  8, 16,  8,  8,  8,  8,  8,  8,  8, 16,  8, // c
    8,  8,  8,  8,  8,  8, 16,  8,  8,  8,  8,  8,  8,  8, 16,  8, // d
    8,  8,  8,  8,  8,  8, 16,  8,  8,  8,  8,  8,  8,  8, 16,  8, // e
    8,  8,  8,  8,  8,  8, 16,  8,  8,  8,  8,  8,  8,  8, 16,  8, // f
];

pub struct Cpu {
    pub reg: Register,
    // Master interrupt enable latch. DI clears it, EI and RETI set it; the
    // service sequence clears it before jumping to a vector.
    pub ime: bool,
    // Set by HALT. While waiting the CPU burns cycles without fetching;
    // any pending request in IE & IF clears it, IME or not.
    pub halted: bool,
}

impl Cpu {
    pub fn power_up() -> Self {
        Self { reg: Register::power_up(), ime: false, halted: false }
    }

    pub fn power_up_at_reset() -> Self {
        Self { reg: Register::at_reset(), ime: false, halted: false }
    }

    fn imm(&mut self, mem: &mut dyn Memory) -> u8 {
        let v = mem.get(self.reg.pc);
        self.reg.pc = self.reg.pc.wrapping_add(1);
        v
    }

    fn imm_word(&mut self, mem: &mut dyn Memory) -> u16 {
        let v = mem.get_word(self.reg.pc);
        self.reg.pc = self.reg.pc.wrapping_add(2);
        v
    }

    fn stack_add(&mut self, mem: &mut dyn Memory, v: u16) {
        self.reg.sp = self.reg.sp.wrapping_sub(2);
        mem.set_word(self.reg.sp, v);
    }

    fn stack_pop(&mut self, mem: &mut dyn Memory) -> u16 {
        let r = mem.get_word(self.reg.sp);
        self.reg.sp = self.reg.sp.wrapping_add(2);
        r
    }

    // Register group R8 = {B,C,D,E,H,L,(HL),A}, indexed by the three bit
    // field of the opcode. Index 6 is the load/store through HL.
    fn get_r8(&self, mem: &dyn Memory, r: u8) -> u8 {
        match r {
            0 => self.reg.b,
            1 => self.reg.c,
            2 => self.reg.d,
            3 => self.reg.e,
            4 => self.reg.h,
            5 => self.reg.l,
            6 => mem.get(self.reg.get_hl()),
            7 => self.reg.a,
            _ => unreachable!(),
        }
    }

    fn set_r8(&mut self, mem: &mut dyn Memory, r: u8, v: u8) {
        match r {
            0 => self.reg.b = v,
            1 => self.reg.c = v,
            2 => self.reg.d = v,
            3 => self.reg.e = v,
            4 => self.reg.h = v,
            5 => self.reg.l = v,
            6 => mem.set(self.reg.get_hl(), v),
            7 => self.reg.a = v,
            _ => unreachable!(),
        }
    }

    // Register group {BC,DE,HL,SP}, indexed by opcode bits 5-4.
    fn get_r16(&self, r: u8) -> u16 {
        match r {
            0 => self.reg.get_bc(),
            1 => self.reg.get_de(),
            2 => self.reg.get_hl(),
            3 => self.reg.sp,
            _ => unreachable!(),
        }
    }

    fn set_r16(&mut self, r: u8, v: u16) {
        match r {
            0 => self.reg.set_bc(v),
            1 => self.reg.set_de(v),
            2 => self.reg.set_hl(v),
            3 => self.reg.sp = v,
            _ => unreachable!(),
        }
    }

    // Condition set {NZ,Z,NC,C}, indexed by opcode bits 4-3.
    fn condition(&self, cc: u8) -> bool {
        match cc {
            0 => !self.reg.get_flag(Z),
            1 => self.reg.get_flag(Z),
            2 => !self.reg.get_flag(C),
            3 => self.reg.get_flag(C),
            _ => unreachable!(),
        }
    }

    // Add n to A.
    //
    // Flags affected:
    // Z - Set if result is zero.
    // N - Reset.
    // H - Set if carry from bit 3.
    // C - Set if carry from bit 7.
    fn alu_add(&mut self, n: u8) {
        let a = self.reg.a;
        let r = a.wrapping_add(n);
        self.reg.set_flag(C, u16::from(a) + u16::from(n) > 0xff);
        self.reg.set_flag(H, (a & 0x0f) + (n & 0x0f) > 0x0f);
        self.reg.set_flag(N, false);
        self.reg.set_flag(Z, r == 0x00);
        self.reg.a = r;
    }

    // Add n + Carry flag to A. Same flags as alu_add, with the carry-in
    // folded into both carry computations.
    fn alu_adc(&mut self, n: u8) {
        let a = self.reg.a;
        let c = u8::from(self.reg.get_flag(C));
        let r = a.wrapping_add(n).wrapping_add(c);
        self.reg.set_flag(C, u16::from(a) + u16::from(n) + u16::from(c) > 0xff);
        self.reg.set_flag(H, (a & 0x0f) + (n & 0x0f) + c > 0x0f);
        self.reg.set_flag(N, false);
        self.reg.set_flag(Z, r == 0x00);
        self.reg.a = r;
    }

    // Subtract n from A.
    //
    // Flags affected:
    // Z - Set if result is zero.
    // N - Set.
    // H - Set if borrow from bit 4.
    // C - Set if borrow (A < n).
    fn alu_sub(&mut self, n: u8) {
        let a = self.reg.a;
        let r = a.wrapping_sub(n);
        self.reg.set_flag(C, u16::from(a) < u16::from(n));
        self.reg.set_flag(H, (a & 0x0f) < (n & 0x0f));
        self.reg.set_flag(N, true);
        self.reg.set_flag(Z, r == 0x00);
        self.reg.a = r;
    }

    // Subtract n + Carry flag from A.
    fn alu_sbc(&mut self, n: u8) {
        let a = self.reg.a;
        let c = u8::from(self.reg.get_flag(C));
        let r = a.wrapping_sub(n).wrapping_sub(c);
        self.reg.set_flag(C, u16::from(a) < u16::from(n) + u16::from(c));
        self.reg.set_flag(H, (a & 0x0f) < (n & 0x0f) + c);
        self.reg.set_flag(N, true);
        self.reg.set_flag(Z, r == 0x00);
        self.reg.a = r;
    }

    // AND/OR/XOR n with A. The bitwise group only ever touches C and H to
    // clear them (AND sets H).
    fn alu_and(&mut self, n: u8) {
        let r = self.reg.a & n;
        self.reg.set_flag(C, false);
        self.reg.set_flag(H, true);
        self.reg.set_flag(N, false);
        self.reg.set_flag(Z, r == 0x00);
        self.reg.a = r;
    }

    fn alu_or(&mut self, n: u8) {
        let r = self.reg.a | n;
        self.reg.set_flag(C, false);
        self.reg.set_flag(H, false);
        self.reg.set_flag(N, false);
        self.reg.set_flag(Z, r == 0x00);
        self.reg.a = r;
    }

    fn alu_xor(&mut self, n: u8) {
        let r = self.reg.a ^ n;
        self.reg.set_flag(C, false);
        self.reg.set_flag(H, false);
        self.reg.set_flag(N, false);
        self.reg.set_flag(Z, r == 0x00);
        self.reg.a = r;
    }

    // Compare A with n: a subtraction whose result is thrown away.
    fn alu_cp(&mut self, n: u8) {
        let r = self.reg.a;
        self.alu_sub(n);
        self.reg.a = r;
    }

    // Increment/decrement leave C alone; H tracks the nibble carry/borrow.
    fn alu_inc(&mut self, a: u8) -> u8 {
        let r = a.wrapping_add(1);
        self.reg.set_flag(H, (a & 0x0f) + 0x01 > 0x0f);
        self.reg.set_flag(N, false);
        self.reg.set_flag(Z, r == 0x00);
        r
    }

    fn alu_dec(&mut self, a: u8) -> u8 {
        let r = a.wrapping_sub(1);
        self.reg.set_flag(H, a & 0x0f == 0x00);
        self.reg.set_flag(N, true);
        self.reg.set_flag(Z, r == 0x00);
        r
    }

    // Add n to HL.
    //
    // Flags affected:
    // Z - Not affected.
    // N - Reset.
    // H - Set if carry from bit 11.
    // C - Set if carry from bit 15.
    fn alu_add_hl(&mut self, n: u16) {
        let a = self.reg.get_hl();
        let r = a.wrapping_add(n);
        self.reg.set_flag(C, a > 0xffff - n);
        self.reg.set_flag(H, (a & 0x07ff) + (n & 0x07ff) > 0x07ff);
        self.reg.set_flag(N, false);
        self.reg.set_hl(r);
    }

    // SP plus a signed immediate, shared by ADD SP,i8 and LD HL,SP+i8.
    // Z and N are cleared; H and C come from the low byte addition (carry
    // out of bit 3 and bit 7), not from the 16 bit sum.
    fn alu_add_sp(&mut self, mem: &mut dyn Memory) -> u16 {
        let a = self.reg.sp;
        let b = i16::from(self.imm(mem) as i8) as u16;
        self.reg.set_flag(C, (a & 0x00ff) + (b & 0x00ff) > 0x00ff);
        self.reg.set_flag(H, (a & 0x000f) + (b & 0x000f) > 0x000f);
        self.reg.set_flag(N, false);
        self.reg.set_flag(Z, false);
        a.wrapping_add(b)
    }

    // Swap the nibbles of n. Z from result, everything else cleared.
    fn alu_swap(&mut self, a: u8) -> u8 {
        self.reg.set_flag(C, false);
        self.reg.set_flag(H, false);
        self.reg.set_flag(N, false);
        self.reg.set_flag(Z, a == 0x00);
        (a >> 4) | (a << 4)
    }

    // Decimal adjust A after a BCD add or subtract. After an addition
    // (N=0) 0x06/0x60 offsets are applied where a nibble overflowed or
    // exceeded 9; after a subtraction only the recorded H and C flags
    // select the offsets.
    fn alu_daa(&mut self) {
        let mut a = self.reg.a;
        let mut adjust = if self.reg.get_flag(C) { 0x60 } else { 0x00 };
        if self.reg.get_flag(H) {
            adjust |= 0x06;
        }
        if !self.reg.get_flag(N) {
            if a & 0x0f > 0x09 {
                adjust |= 0x06;
            }
            if a > 0x99 {
                adjust |= 0x60;
            }
            a = a.wrapping_add(adjust);
        } else {
            a = a.wrapping_sub(adjust);
        }
        self.reg.set_flag(C, adjust >= 0x60);
        self.reg.set_flag(H, false);
        self.reg.set_flag(Z, a == 0x00);
        self.reg.a = a;
    }

    // CPL: A := !A, N=1, H=1, Z and C untouched.
    fn alu_cpl(&mut self) {
        self.reg.a = !self.reg.a;
        self.reg.set_flag(H, true);
        self.reg.set_flag(N, true);
    }

    // CCF: complement carry. SCF: set carry. Both clear N and H.
    fn alu_ccf(&mut self) {
        let v = !self.reg.get_flag(C);
        self.reg.set_flag(C, v);
        self.reg.set_flag(H, false);
        self.reg.set_flag(N, false);
    }

    fn alu_scf(&mut self) {
        self.reg.set_flag(C, true);
        self.reg.set_flag(H, false);
        self.reg.set_flag(N, false);
    }

    // The rotate/shift group. Z comes from the result here; the four A-only
    // forms (RLCA/RLA/RRCA/RRA) clear Z instead at their call sites.
    fn alu_rlc(&mut self, a: u8) -> u8 {
        let c = a & 0x80 != 0x00;
        let r = (a << 1) | u8::from(c);
        self.reg.set_flag(C, c);
        self.reg.set_flag(H, false);
        self.reg.set_flag(N, false);
        self.reg.set_flag(Z, r == 0x00);
        r
    }

    fn alu_rl(&mut self, a: u8) -> u8 {
        let c = a & 0x80 != 0x00;
        let r = (a << 1) | u8::from(self.reg.get_flag(C));
        self.reg.set_flag(C, c);
        self.reg.set_flag(H, false);
        self.reg.set_flag(N, false);
        self.reg.set_flag(Z, r == 0x00);
        r
    }

    fn alu_rrc(&mut self, a: u8) -> u8 {
        let c = a & 0x01 != 0x00;
        let r = (a >> 1) | (u8::from(c) << 7);
        self.reg.set_flag(C, c);
        self.reg.set_flag(H, false);
        self.reg.set_flag(N, false);
        self.reg.set_flag(Z, r == 0x00);
        r
    }

    fn alu_rr(&mut self, a: u8) -> u8 {
        let c = a & 0x01 != 0x00;
        let r = (a >> 1) | (u8::from(self.reg.get_flag(C)) << 7);
        self.reg.set_flag(C, c);
        self.reg.set_flag(H, false);
        self.reg.set_flag(N, false);
        self.reg.set_flag(Z, r == 0x00);
        r
    }

    fn alu_sla(&mut self, a: u8) -> u8 {
        let c = a & 0x80 != 0x00;
        let r = a << 1;
        self.reg.set_flag(C, c);
        self.reg.set_flag(H, false);
        self.reg.set_flag(N, false);
        self.reg.set_flag(Z, r == 0x00);
        r
    }

    // SRA keeps the sign bit, SRL shifts in zero.
    fn alu_sra(&mut self, a: u8) -> u8 {
        let c = a & 0x01 != 0x00;
        let r = (a >> 1) | (a & 0x80);
        self.reg.set_flag(C, c);
        self.reg.set_flag(H, false);
        self.reg.set_flag(N, false);
        self.reg.set_flag(Z, r == 0x00);
        r
    }

    fn alu_srl(&mut self, a: u8) -> u8 {
        let c = a & 0x01 != 0x00;
        let r = a >> 1;
        self.reg.set_flag(C, c);
        self.reg.set_flag(H, false);
        self.reg.set_flag(N, false);
        self.reg.set_flag(Z, r == 0x00);
        r
    }

    // Test bit b of n.
    //
    // Flags affected:
    // Z - Set if bit b of n is 0.
    // N - Reset.
    // H - Set.
    // C - Not affected.
    fn alu_bit(&mut self, a: u8, b: u8) {
        self.reg.set_flag(H, true);
        self.reg.set_flag(N, false);
        self.reg.set_flag(Z, a & (1 << b) == 0x00);
    }

    // Relative jump: the signed displacement is fetched first, then added
    // to the already advanced PC.
    fn alu_jr(&mut self, mem: &mut dyn Memory) {
        let n = self.imm(mem) as i8;
        self.reg.pc = self.reg.pc.wrapping_add(n as u16);
    }
}

impl Cpu {
    // Execute the next opcode and return its cost in T-states. A waiting
    // (halted) CPU consumes a single cycle without touching PC.
    pub fn next(&mut self, mem: &mut dyn Memory) -> u32 {
        if self.halted {
            return 1;
        }
        self.ex(mem)
    }

    // Post-instruction interrupt check. Any request that is both flagged
    // and enabled wakes a halted CPU; with IME set the highest-priority one
    // is serviced: IME off, IF bit cleared, PC pushed, jump to the vector.
    pub fn handle_interrupts(&mut self, mem: &mut dyn Memory) {
        let intf = mem.get(0xff0f);
        let pending = mem.get(0xffff) & intf & 0x1f;
        if pending == 0x00 {
            return;
        }
        self.halted = false;
        if !self.ime {
            return;
        }
        self.ime = false;
        let n = pending.trailing_zeros() as u16;
        mem.set(0xff0f, intf & !(1 << n));
        self.stack_add(mem, self.reg.pc);
        self.reg.pc = 0x0040 + (n << 3);
    }

    #[allow(clippy::cognitive_complexity)]
    fn ex(&mut self, mem: &mut dyn Memory) -> u32 {
        let opcode = self.imm(mem);
        let mut cb_opcode: u8 = 0;
        let mut branched = false;
        match opcode {
            // NOP
            0x00 => {}
            // STOP. Low power mode is not modeled; the padding byte is
            // still consumed.
            0x10 => {
                self.imm(mem);
            }
            // HALT
            0x76 => self.halted = true,
            // DI / EI
            0xf3 => self.ime = false,
            0xfb => self.ime = true,
            // LD rr, nn
            0x01 | 0x11 | 0x21 | 0x31 => {
                let v = self.imm_word(mem);
                self.set_r16(opcode >> 4 & 0x03, v);
            }
            // LD (BC|DE|HL+|HL-), A
            0x02 => mem.set(self.reg.get_bc(), self.reg.a),
            0x12 => mem.set(self.reg.get_de(), self.reg.a),
            0x22 => {
                let a = self.reg.get_hl();
                mem.set(a, self.reg.a);
                self.reg.set_hl(a.wrapping_add(1));
            }
            0x32 => {
                let a = self.reg.get_hl();
                mem.set(a, self.reg.a);
                self.reg.set_hl(a.wrapping_sub(1));
            }
            // LD A, (BC|DE|HL+|HL-)
            0x0a => self.reg.a = mem.get(self.reg.get_bc()),
            0x1a => self.reg.a = mem.get(self.reg.get_de()),
            0x2a => {
                let a = self.reg.get_hl();
                self.reg.a = mem.get(a);
                self.reg.set_hl(a.wrapping_add(1));
            }
            0x3a => {
                let a = self.reg.get_hl();
                self.reg.a = mem.get(a);
                self.reg.set_hl(a.wrapping_sub(1));
            }
            // INC rr / DEC rr, no flags
            0x03 | 0x13 | 0x23 | 0x33 => {
                let r = opcode >> 4 & 0x03;
                self.set_r16(r, self.get_r16(r).wrapping_add(1));
            }
            0x0b | 0x1b | 0x2b | 0x3b => {
                let r = opcode >> 4 & 0x03;
                self.set_r16(r, self.get_r16(r).wrapping_sub(1));
            }
            // INC r8 / DEC r8
            0x04 | 0x0c | 0x14 | 0x1c | 0x24 | 0x2c | 0x34 | 0x3c => {
                let r = opcode >> 3 & 0x07;
                let v = self.get_r8(mem, r);
                let v = self.alu_inc(v);
                self.set_r8(mem, r, v);
            }
            0x05 | 0x0d | 0x15 | 0x1d | 0x25 | 0x2d | 0x35 | 0x3d => {
                let r = opcode >> 3 & 0x07;
                let v = self.get_r8(mem, r);
                let v = self.alu_dec(v);
                self.set_r8(mem, r, v);
            }
            // LD r8, n
            0x06 | 0x0e | 0x16 | 0x1e | 0x26 | 0x2e | 0x36 | 0x3e => {
                let v = self.imm(mem);
                self.set_r8(mem, opcode >> 3 & 0x07, v);
            }
            // The A-only rotates clear Z unconditionally.
            0x07 => {
                self.reg.a = self.alu_rlc(self.reg.a);
                self.reg.set_flag(Z, false);
            }
            0x0f => {
                self.reg.a = self.alu_rrc(self.reg.a);
                self.reg.set_flag(Z, false);
            }
            0x17 => {
                self.reg.a = self.alu_rl(self.reg.a);
                self.reg.set_flag(Z, false);
            }
            0x1f => {
                self.reg.a = self.alu_rr(self.reg.a);
                self.reg.set_flag(Z, false);
            }
            // LD (nn), SP
            0x08 => {
                let a = self.imm_word(mem);
                mem.set_word(a, self.reg.sp);
            }
            // ADD HL, rr
            0x09 | 0x19 | 0x29 | 0x39 => self.alu_add_hl(self.get_r16(opcode >> 4 & 0x03)),
            // JR n / JR cc, n
            0x18 => self.alu_jr(mem),
            0x20 | 0x28 | 0x30 | 0x38 => {
                if self.condition(opcode >> 3 & 0x03) {
                    branched = true;
                    self.alu_jr(mem);
                } else {
                    self.reg.pc = self.reg.pc.wrapping_add(1);
                }
            }
            0x27 => self.alu_daa(),
            0x2f => self.alu_cpl(),
            0x37 => self.alu_scf(),
            0x3f => self.alu_ccf(),
            // LD r8, r8
            0x40..=0x75 | 0x77..=0x7f => {
                let v = self.get_r8(mem, opcode & 0x07);
                self.set_r8(mem, opcode >> 3 & 0x07, v);
            }
            // The arithmetic/logic block, ADD through CP, on R8
            0x80..=0xbf => {
                let v = self.get_r8(mem, opcode & 0x07);
                match opcode >> 3 & 0x07 {
                    0 => self.alu_add(v),
                    1 => self.alu_adc(v),
                    2 => self.alu_sub(v),
                    3 => self.alu_sbc(v),
                    4 => self.alu_and(v),
                    5 => self.alu_xor(v),
                    6 => self.alu_or(v),
                    _ => self.alu_cp(v),
                }
            }
            // Same block with an immediate operand
            0xc6 | 0xce | 0xd6 | 0xde | 0xe6 | 0xee | 0xf6 | 0xfe => {
                let v = self.imm(mem);
                match opcode >> 3 & 0x07 {
                    0 => self.alu_add(v),
                    1 => self.alu_adc(v),
                    2 => self.alu_sub(v),
                    3 => self.alu_sbc(v),
                    4 => self.alu_and(v),
                    5 => self.alu_xor(v),
                    6 => self.alu_or(v),
                    _ => self.alu_cp(v),
                }
            }
            // RET / RETI / RET cc
            0xc9 => self.reg.pc = self.stack_pop(mem),
            0xd9 => {
                self.reg.pc = self.stack_pop(mem);
                self.ime = true;
            }
            0xc0 | 0xc8 | 0xd0 | 0xd8 => {
                if self.condition(opcode >> 3 & 0x03) {
                    branched = true;
                    self.reg.pc = self.stack_pop(mem);
                }
            }
            // POP rr / PUSH rr over {BC,DE,HL,AF}
            0xc1 | 0xd1 | 0xe1 => {
                let v = self.stack_pop(mem);
                match opcode >> 4 & 0x03 {
                    0 => self.reg.set_bc(v),
                    1 => self.reg.set_de(v),
                    _ => self.reg.set_hl(v),
                }
            }
            0xf1 => {
                let v = self.stack_pop(mem);
                self.reg.set_af(v);
            }
            0xc5 => self.stack_add(mem, self.reg.get_bc()),
            0xd5 => self.stack_add(mem, self.reg.get_de()),
            0xe5 => self.stack_add(mem, self.reg.get_hl()),
            0xf5 => self.stack_add(mem, self.reg.get_af()),
            // JP nn / JP cc, nn / JP HL
            0xc3 => self.reg.pc = self.imm_word(mem),
            0xc2 | 0xca | 0xd2 | 0xda => {
                let pc = self.imm_word(mem);
                if self.condition(opcode >> 3 & 0x03) {
                    branched = true;
                    self.reg.pc = pc;
                }
            }
            0xe9 => self.reg.pc = self.reg.get_hl(),
            // CALL nn / CALL cc, nn
            0xcd => {
                let pc = self.imm_word(mem);
                self.stack_add(mem, self.reg.pc);
                self.reg.pc = pc;
            }
            0xc4 | 0xcc | 0xd4 | 0xdc => {
                let pc = self.imm_word(mem);
                if self.condition(opcode >> 3 & 0x03) {
                    branched = true;
                    self.stack_add(mem, self.reg.pc);
                    self.reg.pc = pc;
                }
            }
            // RST: call one of the eight fixed vectors encoded in the opcode
            0xc7 | 0xcf | 0xd7 | 0xdf | 0xe7 | 0xef | 0xf7 | 0xff => {
                self.stack_add(mem, self.reg.pc);
                self.reg.pc = u16::from(opcode & 0x38);
            }
            // LDH: the 0xff00 page
            0xe0 => {
                let a = 0xff00 | u16::from(self.imm(mem));
                mem.set(a, self.reg.a);
            }
            0xf0 => {
                let a = 0xff00 | u16::from(self.imm(mem));
                self.reg.a = mem.get(a);
            }
            0xe2 => mem.set(0xff00 | u16::from(self.reg.c), self.reg.a),
            0xf2 => self.reg.a = mem.get(0xff00 | u16::from(self.reg.c)),
            // LD (nn), A / LD A, (nn)
            0xea => {
                let a = self.imm_word(mem);
                mem.set(a, self.reg.a);
            }
            0xfa => {
                let a = self.imm_word(mem);
                self.reg.a = mem.get(a);
            }
            // SP arithmetic
            0xe8 => self.reg.sp = self.alu_add_sp(mem),
            0xf8 => {
                let v = self.alu_add_sp(mem);
                self.reg.set_hl(v);
            }
            0xf9 => self.reg.sp = self.reg.get_hl(),
            // CB prefix: rotates/shifts/swap and the bit operations on R8
            0xcb => {
                cb_opcode = self.imm(mem);
                let r = cb_opcode & 0x07;
                match cb_opcode {
                    0x00..=0x07 => {
                        let v = self.get_r8(mem, r);
                        let v = self.alu_rlc(v);
                        self.set_r8(mem, r, v);
                    }
                    0x08..=0x0f => {
                        let v = self.get_r8(mem, r);
                        let v = self.alu_rrc(v);
                        self.set_r8(mem, r, v);
                    }
                    0x10..=0x17 => {
                        let v = self.get_r8(mem, r);
                        let v = self.alu_rl(v);
                        self.set_r8(mem, r, v);
                    }
                    0x18..=0x1f => {
                        let v = self.get_r8(mem, r);
                        let v = self.alu_rr(v);
                        self.set_r8(mem, r, v);
                    }
                    0x20..=0x27 => {
                        let v = self.get_r8(mem, r);
                        let v = self.alu_sla(v);
                        self.set_r8(mem, r, v);
                    }
                    0x28..=0x2f => {
                        let v = self.get_r8(mem, r);
                        let v = self.alu_sra(v);
                        self.set_r8(mem, r, v);
                    }
                    0x30..=0x37 => {
                        let v = self.get_r8(mem, r);
                        let v = self.alu_swap(v);
                        self.set_r8(mem, r, v);
                    }
                    0x38..=0x3f => {
                        let v = self.get_r8(mem, r);
                        let v = self.alu_srl(v);
                        self.set_r8(mem, r, v);
                    }
                    // BIT b, r
                    0x40..=0x7f => {
                        let v = self.get_r8(mem, r);
                        self.alu_bit(v, cb_opcode >> 3 & 0x07);
                    }
                    // RES b, r
                    0x80..=0xbf => {
                        let v = self.get_r8(mem, r) & !(1 << (cb_opcode >> 3 & 0x07));
                        self.set_r8(mem, r, v);
                    }
                    // SET b, r
                    0xc0..=0xff => {
                        let v = self.get_r8(mem, r) | (1 << (cb_opcode >> 3 & 0x07));
                        self.set_r8(mem, r, v);
                    }
                }
            }
            // Holes in the opcode map. A well behaved program never reaches
            // them; a NOP-like advance keeps the machine running.
            0xd3 | 0xdb | 0xdd | 0xe3 | 0xe4 | 0xeb | 0xec | 0xed | 0xf4 | 0xfc | 0xfd => {
                rog::debugln!("Unknown opcode 0x{:02x} at 0x{:04x}", opcode, self.reg.pc.wrapping_sub(1));
                return 4;
            }
        }

        if opcode == 0xcb {
            CB_CYCLES[cb_opcode as usize]
        } else if branched {
            OP_CYCLES_BRANCH[opcode as usize]
        } else {
            OP_CYCLES[opcode as usize]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ram {
        data: Vec<u8>,
    }

    impl Ram {
        fn new() -> Self {
            Self { data: vec![0x00; 0x10000] }
        }
    }

    impl Memory for Ram {
        fn get(&self, a: u16) -> u8 {
            self.data[a as usize]
        }

        fn set(&mut self, a: u16, v: u8) {
            self.data[a as usize] = v;
        }
    }

    // CPU at 0x0100 with the given bytes as the program.
    fn cpu_with(program: &[u8]) -> (Cpu, Ram) {
        let mut ram = Ram::new();
        ram.data[0x0100..0x0100 + program.len()].copy_from_slice(program);
        let mut cpu = Cpu::power_up();
        cpu.reg.set_f(0x00);
        (cpu, ram)
    }

    #[test]
    fn test_add_flag_law() {
        let (mut cpu, mut ram) = cpu_with(&[0x80]);
        cpu.reg.a = 0x0f;
        cpu.reg.b = 0x01;
        assert_eq!(cpu.next(&mut ram), 4);
        assert_eq!(cpu.reg.a, 0x10);
        assert!(!cpu.reg.get_flag(Z));
        assert!(!cpu.reg.get_flag(N));
        assert!(cpu.reg.get_flag(H));
        assert!(!cpu.reg.get_flag(C));
    }

    #[test]
    fn test_sub_flag_law() {
        let (mut cpu, mut ram) = cpu_with(&[0x90]);
        cpu.reg.a = 0x10;
        cpu.reg.b = 0x01;
        cpu.next(&mut ram);
        assert_eq!(cpu.reg.a, 0x0f);
        assert!(!cpu.reg.get_flag(Z));
        assert!(cpu.reg.get_flag(N));
        assert!(cpu.reg.get_flag(H));
        assert!(!cpu.reg.get_flag(C));
    }

    #[test]
    fn test_cp_leaves_a() {
        let (mut cpu, mut ram) = cpu_with(&[0xfe, 0x01]);
        cpu.reg.a = 0x00;
        assert_eq!(cpu.next(&mut ram), 8);
        assert_eq!(cpu.reg.a, 0x00);
        assert!(!cpu.reg.get_flag(Z));
        assert!(cpu.reg.get_flag(N));
        assert!(cpu.reg.get_flag(H));
        assert!(cpu.reg.get_flag(C));
    }

    #[test]
    fn test_add_sub_inverse() {
        let (mut cpu, mut ram) = cpu_with(&[0x80, 0x90]);
        cpu.reg.a = 0x3c;
        cpu.reg.b = 0x5f;
        cpu.next(&mut ram);
        cpu.next(&mut ram);
        assert_eq!(cpu.reg.a, 0x3c);
    }

    #[test]
    fn test_daa_after_add() {
        let (mut cpu, mut ram) = cpu_with(&[0xc6, 0x38, 0x27]);
        cpu.reg.a = 0x45;
        cpu.next(&mut ram);
        assert_eq!(cpu.reg.a, 0x7d);
        cpu.next(&mut ram);
        assert_eq!(cpu.reg.a, 0x83);
        assert!(!cpu.reg.get_flag(C));
    }

    #[test]
    fn test_push_pop_round_trip() {
        let (mut cpu, mut ram) = cpu_with(&[0xc5, 0xd1]);
        cpu.reg.sp = 0xdffe;
        cpu.reg.set_bc(0xbeef);
        assert_eq!(cpu.next(&mut ram), 16);
        assert_eq!(cpu.reg.sp, 0xdffc);
        assert_eq!(cpu.next(&mut ram), 12);
        assert_eq!(cpu.reg.get_de(), 0xbeef);
        assert_eq!(cpu.reg.sp, 0xdffe);
    }

    #[test]
    fn test_add_sp_flags() {
        let (mut cpu, mut ram) = cpu_with(&[0xe8, 0x01]);
        cpu.reg.sp = 0x00ff;
        assert_eq!(cpu.next(&mut ram), 16);
        assert_eq!(cpu.reg.sp, 0x0100);
        assert!(!cpu.reg.get_flag(Z));
        assert!(!cpu.reg.get_flag(N));
        assert!(cpu.reg.get_flag(H));
        assert!(cpu.reg.get_flag(C));
    }

    #[test]
    fn test_ld_hl_sp_negative_offset() {
        let (mut cpu, mut ram) = cpu_with(&[0xf8, 0xfe]);
        cpu.reg.sp = 0x0005;
        assert_eq!(cpu.next(&mut ram), 12);
        assert_eq!(cpu.reg.get_hl(), 0x0003);
        assert_eq!(cpu.reg.sp, 0x0005);
        assert!(cpu.reg.get_flag(H));
        assert!(cpu.reg.get_flag(C));
    }

    #[test]
    fn test_bit_leaves_carry() {
        let (mut cpu, mut ram) = cpu_with(&[0xcb, 0x7c]);
        cpu.reg.h = 0x00;
        cpu.reg.set_flag(C, true);
        assert_eq!(cpu.next(&mut ram), 8);
        assert!(cpu.reg.get_flag(Z));
        assert!(!cpu.reg.get_flag(N));
        assert!(cpu.reg.get_flag(H));
        assert!(cpu.reg.get_flag(C));
    }

    #[test]
    fn test_rlca_clears_z() {
        let (mut cpu, mut ram) = cpu_with(&[0x07]);
        cpu.reg.a = 0x80;
        cpu.next(&mut ram);
        assert_eq!(cpu.reg.a, 0x01);
        assert!(cpu.reg.get_flag(C));
        assert!(!cpu.reg.get_flag(Z));
    }

    #[test]
    fn test_cb_rlc_sets_z_on_zero() {
        let (mut cpu, mut ram) = cpu_with(&[0xcb, 0x00]);
        cpu.reg.b = 0x00;
        cpu.next(&mut ram);
        assert!(cpu.reg.get_flag(Z));
    }

    #[test]
    fn test_jr_backwards() {
        let (mut cpu, mut ram) = cpu_with(&[0x18, 0xfe]);
        assert_eq!(cpu.next(&mut ram), 12);
        assert_eq!(cpu.reg.pc, 0x0100);
    }

    #[test]
    fn test_conditional_jr_cycles() {
        let (mut cpu, mut ram) = cpu_with(&[0x20, 0x10]);
        cpu.reg.set_flag(Z, true);
        assert_eq!(cpu.next(&mut ram), 8);
        assert_eq!(cpu.reg.pc, 0x0102);

        let (mut cpu, mut ram) = cpu_with(&[0x20, 0x10]);
        assert_eq!(cpu.next(&mut ram), 12);
        assert_eq!(cpu.reg.pc, 0x0112);
    }

    #[test]
    fn test_conditional_ret_and_call_cycles() {
        let (mut cpu, mut ram) = cpu_with(&[0xc0]);
        cpu.reg.set_flag(Z, true);
        assert_eq!(cpu.next(&mut ram), 8);

        let (mut cpu, mut ram) = cpu_with(&[0xc4, 0x00, 0xc0]);
        assert_eq!(cpu.next(&mut ram), 24);
        assert_eq!(cpu.reg.pc, 0xc000);
    }

    #[test]
    fn test_call_ret() {
        let (mut cpu, mut ram) = cpu_with(&[0xcd, 0x00, 0xc0]);
        ram.set(0xc000, 0xc9);
        cpu.reg.sp = 0xdffe;
        assert_eq!(cpu.next(&mut ram), 24);
        assert_eq!(cpu.reg.pc, 0xc000);
        assert_eq!(cpu.next(&mut ram), 16);
        assert_eq!(cpu.reg.pc, 0x0103);
        assert_eq!(cpu.reg.sp, 0xdffe);
    }

    #[test]
    fn test_rst_vector() {
        let (mut cpu, mut ram) = cpu_with(&[0xef]);
        cpu.reg.sp = 0xdffe;
        assert_eq!(cpu.next(&mut ram), 16);
        assert_eq!(cpu.reg.pc, 0x0028);
        assert_eq!(ram.get_word(0xdffc), 0x0101);
    }

    #[test]
    fn test_hl_post_increment() {
        let (mut cpu, mut ram) = cpu_with(&[0x22, 0x3a]);
        cpu.reg.a = 0x42;
        cpu.reg.set_hl(0xc000);
        cpu.next(&mut ram);
        assert_eq!(ram.get(0xc000), 0x42);
        assert_eq!(cpu.reg.get_hl(), 0xc001);
        cpu.next(&mut ram);
        assert_eq!(cpu.reg.get_hl(), 0xc000);
    }

    #[test]
    fn test_inc_dec_hl_indirect() {
        let (mut cpu, mut ram) = cpu_with(&[0x34, 0x35, 0x35]);
        cpu.reg.set_hl(0xc123);
        ram.set(0xc123, 0x0f);
        assert_eq!(cpu.next(&mut ram), 12);
        assert_eq!(ram.get(0xc123), 0x10);
        cpu.next(&mut ram);
        assert_eq!(ram.get(0xc123), 0x0f);
        assert!(cpu.reg.get_flag(H));
        cpu.next(&mut ram);
        assert_eq!(ram.get(0xc123), 0x0e);
    }

    #[test]
    fn test_dec_half_borrow() {
        let (mut cpu, mut ram) = cpu_with(&[0x05]);
        cpu.reg.b = 0x10;
        cpu.next(&mut ram);
        assert_eq!(cpu.reg.b, 0x0f);
        assert!(cpu.reg.get_flag(H));
        assert!(cpu.reg.get_flag(N));
    }

    #[test]
    fn test_halt_and_wake() {
        let (mut cpu, mut ram) = cpu_with(&[0x76, 0x00]);
        cpu.next(&mut ram);
        assert!(cpu.halted);
        assert_eq!(cpu.next(&mut ram), 1);
        assert_eq!(cpu.reg.pc, 0x0101);
        // A pending request wakes the CPU even with IME off.
        ram.set(0xffff, 0x04);
        ram.set(0xff0f, 0x04);
        cpu.handle_interrupts(&mut ram);
        assert!(!cpu.halted);
        assert!(!cpu.ime);
        assert_eq!(cpu.reg.pc, 0x0101);
        assert_eq!(ram.get(0xff0f), 0x04);
    }

    #[test]
    fn test_interrupt_service_sequence() {
        let (mut cpu, mut ram) = cpu_with(&[0xfb, 0x00]);
        cpu.reg.sp = 0xdffe;
        cpu.next(&mut ram);
        assert!(cpu.ime);
        ram.set(0xffff, 0x1f);
        ram.set(0xff0f, 0x05);
        cpu.handle_interrupts(&mut ram);
        // VBlank outranks Timer.
        assert_eq!(cpu.reg.pc, 0x0040);
        assert!(!cpu.ime);
        assert_eq!(ram.get(0xff0f), 0x04);
        assert_eq!(ram.get_word(0xdffc), 0x0101);
    }

    #[test]
    fn test_reti_restores_ime() {
        let (mut cpu, mut ram) = cpu_with(&[0xd9]);
        cpu.reg.sp = 0xdffc;
        ram.set_word(0xdffc, 0x1234);
        cpu.next(&mut ram);
        assert_eq!(cpu.reg.pc, 0x1234);
        assert!(cpu.ime);
    }

    #[test]
    fn test_unknown_opcode_is_nop_like() {
        let (mut cpu, mut ram) = cpu_with(&[0xd3, 0x00]);
        assert_eq!(cpu.next(&mut ram), 4);
        assert_eq!(cpu.reg.pc, 0x0101);
    }

    #[test]
    fn test_stop_consumes_padding() {
        let (mut cpu, mut ram) = cpu_with(&[0x10, 0x00]);
        assert_eq!(cpu.next(&mut ram), 4);
        assert_eq!(cpu.reg.pc, 0x0102);
    }

    #[test]
    fn test_pop_af_masks_low_nibble() {
        let (mut cpu, mut ram) = cpu_with(&[0xf1]);
        cpu.reg.sp = 0xdffc;
        ram.set_word(0xdffc, 0x12ff);
        cpu.next(&mut ram);
        assert_eq!(cpu.reg.get_af(), 0x12f0);
    }

    #[test]
    fn test_cb_set_res_on_memory() {
        let (mut cpu, mut ram) = cpu_with(&[0xcb, 0xc6, 0xcb, 0x86]);
        cpu.reg.set_hl(0xc050);
        assert_eq!(cpu.next(&mut ram), 16);
        assert_eq!(ram.get(0xc050), 0x01);
        cpu.next(&mut ram);
        assert_eq!(ram.get(0xc050), 0x00);
    }

    #[test]
    fn test_cb_bit_on_memory_cycles() {
        let (mut cpu, mut ram) = cpu_with(&[0xcb, 0x46]);
        cpu.reg.set_hl(0xc050);
        ram.set(0xc050, 0x01);
        assert_eq!(cpu.next(&mut ram), 12);
        assert!(!cpu.reg.get_flag(Z));
    }

    #[test]
    fn test_ldh_page() {
        let (mut cpu, mut ram) = cpu_with(&[0xe0, 0x80, 0xf0, 0x80]);
        cpu.reg.a = 0x5a;
        assert_eq!(cpu.next(&mut ram), 12);
        assert_eq!(ram.get(0xff80), 0x5a);
        cpu.reg.a = 0x00;
        cpu.next(&mut ram);
        assert_eq!(cpu.reg.a, 0x5a);
    }

    #[test]
    fn test_add_hl_preserves_z() {
        let (mut cpu, mut ram) = cpu_with(&[0x09]);
        cpu.reg.set_flag(Z, true);
        cpu.reg.set_hl(0x0fff);
        cpu.reg.set_bc(0x0001);
        cpu.next(&mut ram);
        assert_eq!(cpu.reg.get_hl(), 0x1000);
        assert!(cpu.reg.get_flag(Z));
        assert!(cpu.reg.get_flag(H));
        assert!(!cpu.reg.get_flag(C));
    }
}
