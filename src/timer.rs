// The timer that interrupts at regular intervals, for routines that need
// periodic updates. TIMA ticks at one of four selectable frequencies; when
// it overflows it reloads from TMA and requests the Timer interrupt.
//
// FF04 - DIV  - Divider Register (R/W)
//   Increments at 16384Hz, i.e. once every 256 T-states. Writing any value
//   resets it to 0x00.
// FF05 - TIMA - Timer counter (R/W)
// FF06 - TMA  - Timer Modulo (R/W)
// FF07 - TAC  - Timer Control (R/W)
//   Bit 2    - Timer Enable
//   Bits 1-0 - Input Clock Select
//              00: 4194304 / 1024 =   4096 Hz
//              01: 4194304 /   16 = 262144 Hz
//              10: 4194304 /   64 =  65536 Hz
//              11: 4194304 /  256 =  16384 Hz
use super::clock::Clock;
use super::intf::{Flag, Intf};
use std::cell::RefCell;
use std::rc::Rc;

pub struct Timer {
    intf: Rc<RefCell<Intf>>,
    div: u8,
    tima: u8,
    tma: u8,
    tac: u8,
    div_clock: Clock,
    // Countdown in T-states until the next TIMA tick. Only runs while TAC
    // bit 2 is set.
    counter: i64,
    period: u32,
}

impl Timer {
    pub fn power_up(intf: Rc<RefCell<Intf>>) -> Self {
        Self {
            intf,
            div: 0x00,
            tima: 0x00,
            tma: 0x00,
            tac: 0x00,
            div_clock: Clock::power_up(256),
            counter: 1024,
            period: 1024,
        }
    }

    pub fn get(&self, a: u16) -> u8 {
        match a {
            0xff04 => self.div,
            0xff05 => self.tima,
            0xff06 => self.tma,
            0xff07 => self.tac,
            _ => 0xff,
        }
    }

    pub fn set(&mut self, a: u16, v: u8) {
        match a {
            0xff04 => self.div = 0x00,
            0xff05 => self.tima = v,
            0xff06 => self.tma = v,
            0xff07 => {
                self.tac = v;
                let period = match v & 0x03 {
                    0x00 => 1024,
                    0x01 => 16,
                    0x02 => 64,
                    _ => 256,
                };
                if period != self.period {
                    self.period = period;
                    self.counter = i64::from(period);
                }
            }
            _ => {}
        }
    }

    pub fn next(&mut self, cycles: u32) {
        self.div = self.div.wrapping_add(self.div_clock.next(cycles) as u8);

        if self.tac & 0x04 != 0x00 {
            self.counter -= i64::from(cycles);
            while self.counter <= 0 {
                self.counter += i64::from(self.period);
                if self.tima == 0xff {
                    self.tima = self.tma;
                    self.intf.borrow_mut().hi(Flag::Timer);
                } else {
                    self.tima += 1;
                }
            }
        }
    }
}
