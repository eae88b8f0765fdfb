// Every bus client - CPU, MMU, cartridge, PPU - speaks this trait. The DMG
// address space is a flat 16 bit range:
//
// 0000-3FFF   16KB ROM Bank 00     (in cartridge, fixed)
// 4000-7FFF   16KB ROM Bank 01..NN (in cartridge, switchable via MBC)
// 8000-9FFF   8KB Video RAM (VRAM)
// A000-BFFF   8KB External RAM     (in cartridge, if any, enable gated)
// C000-DFFF   8KB Work RAM (WRAM)
// E000-FDFF   Echo of C000-DDFF
// FE00-FE9F   Sprite Attribute Table (OAM)
// FEA0-FEFF   Not Usable
// FF00-FF7F   I/O Ports
// FF80-FFFE   High RAM (HRAM)
// FFFF        Interrupt Enable Register
pub trait Memory {
    fn get(&self, a: u16) -> u8;

    fn set(&mut self, a: u16, v: u8);

    // 16 bit quantities on the bus are little-endian: low byte first.
    fn get_word(&self, a: u16) -> u16 {
        u16::from(self.get(a)) | (u16::from(self.get(a.wrapping_add(1))) << 8)
    }

    fn set_word(&mut self, a: u16, v: u16) {
        self.set(a, (v & 0xff) as u8);
        self.set(a.wrapping_add(1), (v >> 8) as u8)
    }
}
