// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! AVR device database.
//!
//! Memory sizes and instruction-set restrictions per part. Flash size is in
//! words, RAM and EEPROM sizes in bytes.

use std::io::{self, Write};

/// Instruction-set restriction bits.
pub mod flags {
    pub const NO_MUL: u16 = 0x0001;
    pub const NO_JMP: u16 = 0x0002;
    pub const NO_XREG: u16 = 0x0004;
    pub const NO_YREG: u16 = 0x0008;
    /// No ADIW, SBIW, IJMP, ICALL, LDD, STD, LDS, STS, PUSH, POP.
    pub const TINY1X: u16 = 0x0010;
    pub const NO_LPM: u16 = 0x0020;
    /// No `LPM Rd,Z` / `LPM Rd,Z+`.
    pub const NO_LPM_X: u16 = 0x0040;
    pub const NO_ELPM: u16 = 0x0080;
    pub const NO_ELPM_X: u16 = 0x0100;
    pub const NO_SPM: u16 = 0x0200;
    pub const NO_ESPM: u16 = 0x0400;
    pub const NO_MOVW: u16 = 0x0800;
    pub const NO_BREAK: u16 = 0x1000;
    pub const NO_EICALL: u16 = 0x2000;
    pub const NO_EIJMP: u16 = 0x4000;
    /// Reduced core: 16 registers, one-word LDS/STS, no ADIW/SBIW.
    pub const AVR8L: u16 = 0x8000;
}

use flags::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceFlags(u16);

impl DeviceFlags {
    pub const fn new(bits: u16) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn contains(self, flag: u16) -> bool {
        self.0 & flag == flag
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceRecord {
    /// `None` for the built-in default device.
    pub name: Option<&'static str>,
    pub flash_size: i64,
    pub ram_start: i64,
    pub ram_size: i64,
    pub eeprom_size: i64,
    pub flags: DeviceFlags,
}

impl DeviceRecord {
    pub fn display_name(&self) -> &'static str {
        self.name.unwrap_or(DEFAULT_NAME)
    }
}

const DEFAULT_NAME: &str = "DEFAULT";

const fn dev(
    name: &'static str,
    flash_size: i64,
    ram_start: i64,
    ram_size: i64,
    eeprom_size: i64,
    flags: u16,
) -> DeviceRecord {
    DeviceRecord {
        name: Some(name),
        flash_size,
        ram_start,
        ram_size,
        eeprom_size,
        flags: DeviceFlags::new(flags),
    }
}

/// Maximal device used when no `.DEVICE` has been seen.
pub static DEFAULT_DEVICE: DeviceRecord = DeviceRecord {
    name: None,
    flash_size: 4_194_304,
    ram_start: 0x60,
    ram_size: 8_388_608,
    eeprom_size: 65536,
    flags: DeviceFlags::new(0),
};

pub static DEVICES: &[DeviceRecord] = &[
    dev("ATtiny4", 256, 0x040, 32, 0, NO_MUL | NO_JMP | NO_LPM | NO_ELPM | NO_SPM | NO_ESPM | NO_MOVW | NO_BREAK | NO_EICALL | NO_EIJMP | AVR8L),
    dev("ATtiny5", 256, 0x040, 32, 0, NO_MUL | NO_JMP | NO_LPM | NO_ELPM | NO_SPM | NO_ESPM | NO_MOVW | NO_BREAK | NO_EICALL | NO_EIJMP | AVR8L),
    dev("ATtiny9", 512, 0x040, 32, 0, NO_MUL | NO_JMP | NO_LPM | NO_ELPM | NO_SPM | NO_ESPM | NO_MOVW | NO_BREAK | NO_EICALL | NO_EIJMP | AVR8L),
    dev("ATtiny10", 512, 0x040, 32, 0, NO_MUL | NO_JMP | NO_LPM | NO_ELPM | NO_SPM | NO_ESPM | NO_MOVW | NO_BREAK | NO_EICALL | NO_EIJMP | AVR8L),
    dev("ATtiny11", 512, 0x000, 0, 0, NO_MUL | NO_JMP | TINY1X | NO_XREG | NO_YREG | NO_LPM_X | NO_ELPM | NO_SPM | NO_ESPM | NO_MOVW | NO_BREAK | NO_EICALL | NO_EIJMP),
    dev("ATtiny12", 512, 0x000, 0, 64, NO_MUL | NO_JMP | TINY1X | NO_XREG | NO_YREG | NO_LPM_X | NO_ELPM | NO_SPM | NO_ESPM | NO_MOVW | NO_BREAK | NO_EICALL | NO_EIJMP),
    dev("ATtiny13", 512, 0x060, 64, 64, NO_MUL | NO_JMP | NO_ELPM | NO_ESPM | NO_EICALL | NO_EIJMP),
    dev("ATtiny13A", 512, 0x060, 64, 64, NO_MUL | NO_JMP | NO_ELPM | NO_ESPM | NO_EICALL | NO_EIJMP),
    dev("ATtiny15", 512, 0x000, 0, 64, NO_MUL | NO_JMP | NO_XREG | NO_YREG | NO_LPM_X | NO_ELPM | NO_SPM | NO_ESPM | NO_MOVW | NO_BREAK | NO_EICALL | NO_EIJMP | TINY1X),
    dev("ATtiny20", 1024, 0x040, 128, 0, NO_MUL | NO_JMP | NO_EIJMP | NO_EICALL | NO_MOVW | NO_LPM | NO_ELPM | NO_SPM | NO_ESPM | NO_BREAK | AVR8L),
    dev("ATtiny22", 1024, 0x060, 128, 128, NO_MUL | NO_JMP | NO_LPM_X | NO_ELPM | NO_SPM | NO_ESPM | NO_MOVW | NO_BREAK | NO_EICALL | NO_EIJMP),
    dev("ATtiny24", 1024, 0x060, 128, 128, NO_MUL | NO_JMP | NO_ELPM | NO_ESPM | NO_EICALL | NO_EIJMP),
    dev("ATtiny24A", 1024, 0x060, 128, 128, NO_MUL | NO_JMP | NO_ELPM | NO_ESPM | NO_EICALL | NO_EIJMP),
    dev("ATtiny25", 1024, 0x060, 128, 128, NO_MUL | NO_JMP | NO_ELPM | NO_ESPM | NO_EICALL | NO_EIJMP),
    dev("ATtiny26", 1024, 0x060, 128, 128, NO_MUL | NO_JMP | NO_ELPM | NO_SPM | NO_ESPM | NO_MOVW | NO_BREAK | NO_EICALL | NO_EIJMP),
    dev("ATtiny28", 1024, 0x000, 0, 0, NO_MUL | NO_JMP | TINY1X | NO_XREG | NO_YREG | NO_LPM_X | NO_ELPM | NO_SPM | NO_ESPM | NO_MOVW | NO_BREAK | NO_EICALL | NO_EIJMP),
    dev("ATtiny44", 2048, 0x060, 256, 256, NO_MUL | NO_JMP | NO_ELPM | NO_ESPM | NO_EICALL | NO_EIJMP),
    dev("ATtiny44A", 2048, 0x060, 256, 256, NO_MUL | NO_JMP | NO_ELPM | NO_ESPM | NO_EICALL | NO_EIJMP),
    dev("ATtiny45", 2048, 0x060, 256, 256, NO_MUL | NO_JMP | NO_ELPM | NO_ESPM | NO_EICALL | NO_EIJMP),
    dev("ATtiny48", 2048, 0x100, 256, 64, NO_MUL | NO_JMP | NO_ELPM | NO_ESPM | NO_EICALL | NO_EIJMP),
    dev("ATtiny84", 4096, 0x060, 512, 512, NO_MUL | NO_JMP | NO_ELPM | NO_ESPM | NO_EICALL | NO_EIJMP),
    dev("ATtiny85", 4096, 0x060, 512, 512, NO_MUL | NO_JMP | NO_ELPM | NO_ESPM | NO_EICALL | NO_EIJMP),
    dev("ATtiny88", 4096, 0x100, 512, 64, NO_MUL | NO_JMP | NO_ELPM | NO_ESPM | NO_EICALL | NO_EIJMP),
    dev("ATtiny261A", 1024, 0x060, 128, 128, NO_MUL | NO_JMP | NO_ELPM | NO_ESPM | NO_EICALL | NO_EIJMP),
    dev("ATtiny461A", 2048, 0x060, 256, 256, NO_MUL | NO_JMP | NO_ELPM | NO_ESPM | NO_EICALL | NO_EIJMP),
    dev("ATtiny861A", 4096, 0x060, 512, 512, NO_MUL | NO_JMP | NO_ELPM | NO_ESPM | NO_EICALL | NO_EIJMP),
    dev("ATtiny2313", 1024, 0x060, 128, 128, NO_MUL | NO_JMP | NO_ELPM | NO_ESPM | NO_EICALL | NO_EIJMP),
    dev("ATtiny2313A", 1024, 0x060, 128, 128, NO_MUL | NO_JMP | NO_ELPM | NO_ESPM | NO_EICALL | NO_EIJMP),
    dev("ATtiny4313", 2048, 0x060, 256, 256, NO_MUL | NO_JMP | NO_ELPM | NO_ESPM | NO_EICALL | NO_EIJMP),
    dev("AT90S1200", 512, 0x000, 0, 64, NO_MUL | NO_JMP | TINY1X | NO_XREG | NO_YREG | NO_LPM | NO_ELPM | NO_SPM | NO_ESPM | NO_MOVW | NO_BREAK | NO_EICALL | NO_EIJMP),
    dev("AT90S2313", 1024, 0x060, 128, 128, NO_MUL | NO_JMP | NO_LPM_X | NO_ELPM | NO_SPM | NO_ESPM | NO_MOVW | NO_BREAK | NO_EICALL | NO_EIJMP),
    dev("AT90S2323", 1024, 0x060, 128, 128, NO_MUL | NO_JMP | NO_LPM_X | NO_ELPM | NO_SPM | NO_ESPM | NO_MOVW | NO_BREAK | NO_EICALL | NO_EIJMP),
    dev("AT90S2333", 1024, 0x060, 128, 128, NO_MUL | NO_JMP | NO_LPM_X | NO_ELPM | NO_SPM | NO_ESPM | NO_MOVW | NO_BREAK | NO_EICALL | NO_EIJMP),
    dev("AT90S2343", 1024, 0x060, 128, 128, NO_MUL | NO_JMP | NO_LPM_X | NO_ELPM | NO_SPM | NO_ESPM | NO_MOVW | NO_BREAK | NO_EICALL | NO_EIJMP),
    dev("AT90S4414", 2048, 0x060, 256, 256, NO_MUL | NO_JMP | NO_LPM_X | NO_ELPM | NO_SPM | NO_ESPM | NO_MOVW | NO_BREAK | NO_EICALL | NO_EIJMP),
    dev("AT90S4433", 2048, 0x060, 128, 256, NO_MUL | NO_JMP | NO_LPM_X | NO_ELPM | NO_SPM | NO_ESPM | NO_MOVW | NO_BREAK | NO_EICALL | NO_EIJMP),
    dev("AT90S4434", 2048, 0x060, 256, 256, NO_MUL | NO_JMP | NO_LPM_X | NO_ELPM | NO_SPM | NO_ESPM | NO_MOVW | NO_BREAK | NO_EICALL | NO_EIJMP),
    dev("AT90S8515", 4096, 0x060, 512, 512, NO_MUL | NO_JMP | NO_LPM_X | NO_ELPM | NO_SPM | NO_ESPM | NO_MOVW | NO_BREAK | NO_EICALL | NO_EIJMP),
    dev("AT90C8534", 4096, 0x060, 256, 512, NO_MUL | NO_JMP | NO_LPM_X | NO_ELPM | NO_SPM | NO_ESPM | NO_MOVW | NO_BREAK | NO_EICALL | NO_EIJMP),
    dev("AT90S8535", 4096, 0x060, 512, 512, NO_MUL | NO_JMP | NO_LPM_X | NO_ELPM | NO_SPM | NO_ESPM | NO_MOVW | NO_BREAK | NO_EICALL | NO_EIJMP),
    dev("ATmega8", 4096, 0x060, 1024, 512, NO_JMP | NO_EICALL | NO_EIJMP | NO_ELPM | NO_ESPM),
    dev("ATmega8A", 4096, 0x060, 1024, 512, NO_JMP | NO_EICALL | NO_EIJMP | NO_ELPM | NO_ESPM),
    dev("ATmega161", 8192, 0x060, 1024, 512, NO_EICALL | NO_EIJMP | NO_ELPM | NO_ESPM),
    dev("ATmega162", 8192, 0x100, 1024, 512, NO_EICALL | NO_EIJMP | NO_ELPM | NO_ESPM),
    dev("ATmega163", 8192, 0x060, 1024, 512, NO_EICALL | NO_EIJMP | NO_ELPM | NO_ESPM),
    dev("ATmega16", 8192, 0x060, 1024, 512, NO_EICALL | NO_EIJMP | NO_ELPM | NO_ESPM),
    dev("ATmega323", 16384, 0x060, 2048, 1024, NO_EICALL | NO_EIJMP | NO_ELPM | NO_ESPM),
    dev("ATmega32", 16384, 0x060, 2048, 1024, NO_EICALL | NO_EIJMP | NO_ELPM | NO_ESPM),
    dev("ATmega603", 32768, 0x060, 4096, 2048, NO_EICALL | NO_EIJMP | NO_MUL | NO_MOVW | NO_LPM_X | NO_ELPM | NO_SPM | NO_ESPM | NO_BREAK),
    dev("ATmega103", 65536, 0x060, 4096, 4096, NO_EICALL | NO_EIJMP | NO_MUL | NO_MOVW | NO_LPM_X | NO_ELPM_X | NO_SPM | NO_ESPM | NO_BREAK),
    dev("ATmega104", 65536, 0x060, 4096, 4096, NO_EICALL | NO_EIJMP | NO_ESPM),
    dev("ATmega128", 65536, 0x100, 4096, 4096, NO_EICALL | NO_EIJMP | NO_ESPM),
    dev("ATmega128A", 65536, 0x100, 4096, 4096, NO_EICALL | NO_EIJMP | NO_ESPM),
    dev("ATmega48", 2048, 0x100, 512, 256, NO_EICALL | NO_EIJMP | NO_ELPM | NO_ESPM),
    dev("ATmega48A", 2048, 0x100, 512, 256, NO_EICALL | NO_EIJMP | NO_ELPM | NO_ESPM),
    dev("ATmega48P", 2048, 0x100, 512, 256, NO_EICALL | NO_EIJMP | NO_ELPM | NO_ESPM),
    dev("ATmega48PA", 2048, 0x100, 512, 256, NO_EICALL | NO_EIJMP | NO_ELPM | NO_ESPM),
    dev("ATmega88", 4096, 0x100, 1024, 512, NO_EICALL | NO_EIJMP | NO_ELPM | NO_ESPM),
    dev("ATmega88A", 4096, 0x100, 1024, 512, NO_EICALL | NO_EIJMP | NO_ELPM | NO_ESPM),
    dev("ATmega88P", 4096, 0x100, 1024, 512, NO_EICALL | NO_EIJMP | NO_ELPM | NO_ESPM),
    dev("ATmega88PA", 4096, 0x100, 1024, 512, NO_EICALL | NO_EIJMP | NO_ELPM | NO_ESPM),
    dev("ATmega168", 8192, 0x100, 1024, 512, NO_EICALL | NO_EIJMP | NO_ELPM | NO_ESPM),
    dev("ATmega168A", 8192, 0x100, 1024, 512, NO_EICALL | NO_EIJMP | NO_ELPM | NO_ESPM),
    dev("ATmega168P", 8192, 0x100, 1024, 512, NO_EICALL | NO_EIJMP | NO_ELPM | NO_ESPM),
    dev("ATmega168PA", 8192, 0x100, 1024, 512, NO_EICALL | NO_EIJMP | NO_ELPM | NO_ESPM),
    dev("ATmega328", 16384, 0x100, 2048, 1024, NO_EICALL | NO_EIJMP | NO_ELPM | NO_ESPM),
    dev("ATmega328P", 16384, 0x100, 2048, 1024, NO_EICALL | NO_EIJMP | NO_ELPM | NO_ESPM),
    dev("ATmega328PB", 16384, 0x100, 2048, 1024, NO_EICALL | NO_EIJMP | NO_ELPM | NO_ESPM),
    dev("ATmega32U4", 16384, 0x100, 2560, 1024, NO_EICALL | NO_EIJMP | NO_ELPM | NO_ESPM),
    dev("ATmega8515", 8192, 0x060, 512, 512, NO_EICALL | NO_EIJMP | NO_ELPM | NO_ESPM),
    dev("ATmega1280", 65536, 0x200, 8192, 4096, NO_EICALL | NO_EIJMP | NO_ESPM),
    dev("ATmega164P", 8192, 0x100, 1024, 512, NO_EICALL | NO_EIJMP | NO_ELPM | NO_ESPM),
    dev("ATmega164PA", 8192, 0x100, 1024, 512, NO_EICALL | NO_EIJMP | NO_ELPM | NO_ESPM),
    dev("ATmega324A", 16384, 0x100, 2048, 1024, NO_EICALL | NO_EIJMP | NO_ELPM | NO_ESPM),
    dev("ATmega324P", 16384, 0x100, 2048, 1024, NO_EICALL | NO_EIJMP | NO_ELPM | NO_ESPM),
    dev("ATmega324PA", 16384, 0x100, 2048, 1024, NO_EICALL | NO_EIJMP | NO_ELPM | NO_ESPM),
    dev("ATmega644", 32768, 0x100, 4096, 2048, NO_EICALL | NO_EIJMP | NO_ELPM | NO_ESPM),
    dev("ATmega644P", 32768, 0x100, 4096, 2096, NO_EICALL | NO_EIJMP | NO_ELPM | NO_ESPM),
    dev("ATmega644PA", 32768, 0x100, 4096, 2096, NO_EICALL | NO_EIJMP | NO_ELPM | NO_ESPM),
    dev("ATmega1284P", 65536, 0x100, 16384, 4096, NO_EICALL | NO_EIJMP | NO_ESPM),
    dev("ATmega1284PA", 65536, 0x100, 16384, 4096, NO_EICALL | NO_EIJMP | NO_ESPM),
    dev("ATmega2560", 131072, 0x200, 8192, 4096, NO_ESPM),
    dev("ATmega2561", 131072, 0x200, 8192, 4096, NO_ESPM),
    dev("ATmega4809", 24000, 0x2800, 6000, 256, NO_ELPM | NO_ESPM | NO_EICALL | NO_EIJMP),
    dev("AT94K", 8192, 0x060, 16384, 0, NO_ELPM | NO_SPM | NO_ESPM | NO_BREAK | NO_EICALL | NO_EIJMP),
];

/// Find a device by name, ignoring case. `None` selects [`DEFAULT_DEVICE`].
pub fn lookup(name: Option<&str>) -> Option<&'static DeviceRecord> {
    match name {
        None => Some(&DEFAULT_DEVICE),
        Some(name) => DEVICES
            .iter()
            .find(|device| device.display_name().eq_ignore_ascii_case(name)),
    }
}

/// Number used for the `__DEVICE__` variable and the `__<NAME>__` constant.
/// The default device is 0.
pub fn device_number(device: &DeviceRecord) -> i64 {
    DEVICES
        .iter()
        .position(|candidate| candidate.name == device.name && device.name.is_some())
        .map_or(0, |ix| ix as i64 + 1)
}

/// Predefined `__<NAME>__` constants, default device first.
pub fn predefined_constants() -> impl Iterator<Item = (String, i64)> {
    std::iter::once((format!("__{DEFAULT_NAME}__"), 0)).chain(
        DEVICES
            .iter()
            .enumerate()
            .map(|(ix, device)| (format!("__{}__", device.display_name()), ix as i64 + 1)),
    )
}

/// Predefined device variables for `device`.
pub fn device_variables(device: &DeviceRecord) -> [(&'static str, i64); 4] {
    [
        ("__DEVICE__", device_number(device)),
        ("__FLASH_SIZE__", device.flash_size),
        ("__EEPROM_SIZE__", device.eeprom_size),
        ("__RAM_SIZE__", device.ram_size),
    ]
}

pub fn write_device_list<W: Write>(mut out: W) -> io::Result<()> {
    writeln!(
        out,
        "Device name   | Flash size | RAM start | RAM size | EEPROM size"
    )?;
    writeln!(
        out,
        "              |  (words)   | (bytes)   | (bytes)  |   (bytes)"
    )?;
    writeln!(
        out,
        "--------------+------------+-----------+----------+------------"
    )?;
    for device in std::iter::once(&DEFAULT_DEVICE).chain(DEVICES.iter()) {
        let name = match device.name {
            Some(name) => name,
            None => "(default)",
        };
        writeln!(
            out,
            " {:<12} |    {:>7} |    0x{:04x} |  {:>7} |       {:>5}",
            name, device.flash_size, device.ram_start, device.ram_size, device.eeprom_size
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let device = lookup(Some("atmega328p")).expect("known device");
        assert_eq!(device.name, Some("ATmega328P"));
        assert_eq!(device.flash_size, 16384);
        assert_eq!(device.ram_start, 0x100);
        assert!(lookup(Some("ATmega9999")).is_none());
    }

    #[test]
    fn default_device_is_maximal() {
        let device = lookup(None).expect("default device");
        assert_eq!(device.name, None);
        assert_eq!(device_number(device), 0);
        assert!(device.flash_size > DEVICES.iter().map(|d| d.flash_size).max().unwrap_or(0));
    }

    #[test]
    fn predefined_constants_number_devices_in_table_order() {
        let constants: Vec<(String, i64)> = predefined_constants().collect();
        assert_eq!(constants[0], ("__DEFAULT__".to_string(), 0));
        assert_eq!(constants[1], ("__ATtiny4__".to_string(), 1));
        assert_eq!(constants.len(), DEVICES.len() + 1);
        let mega8 = lookup(Some("ATmega8")).unwrap();
        let number = device_number(mega8);
        assert_eq!(constants[number as usize].0, "__ATmega8__");
    }

    #[test]
    fn flags_reflect_core_restrictions() {
        let tiny10 = lookup(Some("ATtiny10")).unwrap();
        assert!(tiny10.flags.contains(flags::AVR8L));
        assert!(tiny10.flags.contains(flags::NO_MUL));
        let mega8 = lookup(Some("ATmega8")).unwrap();
        assert!(mega8.flags.contains(flags::NO_JMP));
        assert!(!mega8.flags.contains(flags::NO_MUL));
    }
}
