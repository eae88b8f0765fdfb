// The orchestrator. Drives the fetch-decode-execute loop and feeds every
// instruction's cycle cost forward to the peripherals, then lets the CPU
// look at the interrupt controller. Repeating that until the per-frame
// cycle budget is spent produces one 60 Hz video frame.
use super::cartridge::CartridgeError;
use super::cpu::Cpu;
use super::joypad::JoypadKey;
use super::mmunit::Mmunit;

pub const CLOCK_FREQUENCY: u32 = 4_194_304;
pub const FRAME_CYCLES: u32 = CLOCK_FREQUENCY / 60;

pub struct Motherboard {
    pub mmu: Mmunit,
    pub cpu: Cpu,
}

impl Motherboard {
    // Power up from a raw cartridge image, skipping the boot ROM: the CPU
    // and I/O registers start with the values the boot ROM would leave
    // behind and execution begins at 0x0100.
    pub fn power_up(rom: Vec<u8>) -> Result<Self, CartridgeError> {
        Ok(Self { mmu: Mmunit::power_up(rom)?, cpu: Cpu::power_up() })
    }

    // Power up with a 256 byte boot ROM overlaid at 0x0000; execution
    // begins at the reset vector with cleared registers.
    pub fn power_up_with_boot_rom(rom: Vec<u8>, boot_rom: [u8; 0x100]) -> Result<Self, CartridgeError> {
        Ok(Self {
            mmu: Mmunit::power_up_with_boot_rom(rom, boot_rom)?,
            cpu: Cpu::power_up_at_reset(),
        })
    }

    // Execute a single instruction, advance the timer and the PPU by its
    // cost and service any pending interrupt. Returns the T-states the
    // instruction consumed. Hosts single-step with this.
    pub fn step(&mut self) -> u32 {
        let cycles = self.cpu.next(&mut self.mmu);
        self.mmu.next(cycles);
        self.cpu.handle_interrupts(&mut self.mmu);
        cycles
    }

    // Run one frame's worth of machine time.
    pub fn next_frame(&mut self) {
        let mut spent = 0;
        while spent < FRAME_CYCLES {
            spent += self.step();
        }
    }

    // True once per completed frame; reading resets the flag. Hosts poll
    // this to know when to present the framebuffer.
    pub fn check_and_reset_frame(&mut self) -> bool {
        let r = self.mmu.ppu.frame_ready;
        self.mmu.ppu.frame_ready = false;
        r
    }

    // Row-major RGB8 pixels of the last completed frame.
    pub fn framebuffer(&self) -> &[u8] {
        self.mmu.ppu.framebuffer.as_bytes()
    }

    pub fn set_serial_sink(&mut self, sink: Box<dyn FnMut(u8)>) {
        self.mmu.serial.connect(sink);
    }

    pub fn keydown(&mut self, key: JoypadKey) {
        self.mmu.joypad.keydown(key);
    }

    pub fn keyup(&mut self, key: JoypadKey) {
        self.mmu.joypad.keyup(key);
    }

    pub fn title(&self) -> &str {
        self.mmu.cartridge.title()
    }
}
