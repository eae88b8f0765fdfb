// The memory management unit is the sole arbiter of the 16 bit address
// space: every access from the CPU, the OAM DMA engine or a debugger goes
// through its decode. It owns the cartridge and all peripherals, plus the
// plain WRAM/HRAM stores and the boot ROM overlay.
use super::cartridge::{Cartridge, CartridgeError};
use super::intf::Intf;
use super::joypad::Joypad;
use super::memory::Memory;
use super::ppu::Ppu;
use super::serial::Serial;
use super::timer::Timer;
use std::cell::RefCell;
use std::rc::Rc;

pub struct Mmunit {
    pub cartridge: Cartridge,
    pub ppu: Ppu,
    pub joypad: Joypad,
    pub serial: Serial,
    pub timer: Timer,
    pub intf: Rc<RefCell<Intf>>,
    // 256 byte boot ROM overlaid on cartridge bank 0 at 0000-00FF until the
    // program writes to 0xff50. Unmapping is permanent.
    boot_rom: Option<[u8; 0x100]>,
    hram: [u8; 0x7f],
    wram: [u8; 0x2000],
    // Other I/O ports with no peripheral behind them; reads return what was
    // written, which is all the test programs expect of them.
    io: [u8; 0x80],
}

impl Mmunit {
    pub fn power_up(rom: Vec<u8>) -> Result<Self, CartridgeError> {
        Self::build(rom, None)
    }

    pub fn power_up_with_boot_rom(rom: Vec<u8>, boot_rom: [u8; 0x100]) -> Result<Self, CartridgeError> {
        Self::build(rom, Some(boot_rom))
    }

    fn build(rom: Vec<u8>, boot_rom: Option<[u8; 0x100]>) -> Result<Self, CartridgeError> {
        let intf = Rc::new(RefCell::new(Intf::power_up()));
        Ok(Self {
            cartridge: Cartridge::power_up(rom)?,
            ppu: Ppu::power_up(intf.clone()),
            joypad: Joypad::power_up(intf.clone()),
            serial: Serial::power_up(),
            timer: Timer::power_up(intf.clone()),
            intf,
            boot_rom,
            hram: [0x00; 0x7f],
            wram: [0x00; 0x2000],
            io: [0x00; 0x80],
        })
    }

    // Propagate the cycles one instruction consumed to the peripherals that
    // count time. Any interrupts they raise land in the shared controller
    // and are observed by the CPU on its next post-instruction check.
    pub fn next(&mut self, cycles: u32) {
        self.timer.next(cycles);
        self.ppu.next(cycles);
    }

    // FF46 - DMA - OAM DMA transfer. Copies 160 bytes from value << 8 into
    // OAM. Modeled as instantaneous.
    fn oam_dma_transfer(&mut self, v: u8) {
        let base = u16::from(v) << 8;
        for i in 0..0xa0 {
            let b = self.get(base + i);
            self.set(0xfe00 + i, b);
        }
    }
}

impl Memory for Mmunit {
    fn get(&self, a: u16) -> u8 {
        match a {
            0x0000..=0x00ff => {
                if let Some(boot_rom) = &self.boot_rom {
                    boot_rom[a as usize]
                } else {
                    self.cartridge.get(a)
                }
            }
            0x0100..=0x7fff => self.cartridge.get(a),
            0x8000..=0x9fff => self.ppu.get(a),
            0xa000..=0xbfff => self.cartridge.get(a),
            0xc000..=0xdfff => self.wram[a as usize - 0xc000],
            // Echo RAM mirrors C000-DDFF.
            0xe000..=0xfdff => self.wram[a as usize - 0xe000],
            0xfe00..=0xfe9f => self.ppu.get(a),
            0xfea0..=0xfeff => 0x00,
            0xff00 => self.joypad.get(a),
            0xff01..=0xff02 => self.serial.get(a),
            0xff04..=0xff07 => self.timer.get(a),
            0xff0f => self.intf.borrow().flags,
            0xff40..=0xff45 | 0xff47..=0xff4b => self.ppu.get(a),
            0xff00..=0xff7f => self.io[a as usize - 0xff00],
            0xff80..=0xfffe => self.hram[a as usize - 0xff80],
            0xffff => self.intf.borrow().enable,
        }
    }

    fn set(&mut self, a: u16, v: u8) {
        match a {
            0x0000..=0x7fff => self.cartridge.set(a, v),
            0x8000..=0x9fff => self.ppu.set(a, v),
            0xa000..=0xbfff => self.cartridge.set(a, v),
            0xc000..=0xdfff => self.wram[a as usize - 0xc000] = v,
            0xe000..=0xfdff => self.wram[a as usize - 0xe000] = v,
            0xfe00..=0xfe9f => self.ppu.set(a, v),
            0xfea0..=0xfeff => {}
            0xff00 => self.joypad.set(a, v),
            0xff01..=0xff02 => self.serial.set(a, v),
            0xff04..=0xff07 => self.timer.set(a, v),
            0xff0f => self.intf.borrow_mut().flags = v,
            0xff46 => {
                self.oam_dma_transfer(v);
                self.io[0x46] = v;
            }
            0xff50 => {
                // Boot ROM handoff; one way, the overlay never comes back.
                self.boot_rom = None;
            }
            0xff40..=0xff45 | 0xff47..=0xff4b => self.ppu.set(a, v),
            0xff00..=0xff7f => self.io[a as usize - 0xff00] = v,
            0xff80..=0xfffe => self.hram[a as usize - 0xff80] = v,
            0xffff => self.intf.borrow_mut().enable = v,
        }
    }
}
