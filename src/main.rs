// Headless runner. Loads a cartridge image, runs the machine and copies
// every serial byte to stdout, which is how the usual test programs report
// their pass/fail log. Presentation of the framebuffer is left to an
// external host; this binary only drives the core.
use dotmatrix::motherboard::Motherboard;
use std::io::Write;

fn main() {
    rog::reg("dotmatrix");
    rog::reg("dotmatrix::cartridge");
    rog::reg("dotmatrix::cpu");

    let mut rom_path = String::new();
    let mut boot_rom_path = String::new();
    let mut frames: u64 = 3600;
    {
        let mut ap = argparse::ArgumentParser::new();
        ap.set_description("Headless DMG emulator core");
        ap.refer(&mut boot_rom_path).add_option(
            &["-b", "--boot-rom"],
            argparse::Store,
            "Overlay a 256 byte boot rom and start at the reset vector",
        );
        ap.refer(&mut frames).add_option(
            &["-f", "--frames"],
            argparse::Store,
            "Number of frames to run before exiting, 0 to run forever",
        );
        ap.refer(&mut rom_path).add_argument("rom", argparse::Store, "Rom name");
        ap.parse_args_or_exit();
    }

    let rom = match std::fs::read(&rom_path) {
        Ok(rom) => rom,
        Err(e) => {
            rog::println!("Failed to read {}: {}", rom_path, e);
            std::process::exit(1);
        }
    };

    let mbrd = if boot_rom_path.is_empty() {
        Motherboard::power_up(rom)
    } else {
        let bytes = match std::fs::read(&boot_rom_path) {
            Ok(bytes) => bytes,
            Err(e) => {
                rog::println!("Failed to read {}: {}", boot_rom_path, e);
                std::process::exit(1);
            }
        };
        if bytes.len() != 0x100 {
            rog::println!("Boot rom must be exactly 256 bytes, got {}", bytes.len());
            std::process::exit(1);
        }
        let mut boot_rom = [0x00; 0x100];
        boot_rom.copy_from_slice(&bytes);
        Motherboard::power_up_with_boot_rom(rom, boot_rom)
    };
    let mut mbrd = match mbrd {
        Ok(mbrd) => mbrd,
        Err(e) => {
            rog::println!("Invalid cartridge: {}", e);
            std::process::exit(1);
        }
    };
    rog::debugln!("Running {}", mbrd.title());

    mbrd.set_serial_sink(Box::new(|b| {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        let _ = handle.write_all(&[b]);
        let _ = handle.flush();
    }));

    let mut n = 0;
    loop {
        mbrd.next_frame();
        n += 1;
        if frames != 0 && n >= frames {
            break;
        }
    }
}
