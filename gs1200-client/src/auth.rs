//! Password preparation for the login form.
//!
//! Firmware V2.00 patch 1 and later decode the submitted password in the
//! browser-side script before comparing it, so the client has to scramble it
//! the same way the switch's own login page does. Older firmware takes the
//! password verbatim.

use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;

/// Characters used for the random padding between password characters.
const PADDING_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

static FIRMWARE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^V(\d+)\.(\d+)\([A-Z]+\.(\d+)\)[A-Z]\d$").expect("firmware pattern is valid")
});

/// Parsed form of a firmware string such as `V2.00(ABME.1)C0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl FirmwareVersion {
    /// Parse a firmware string, returning `None` when it does not match the
    /// `V<major>.<minor>(<letters>.<patch>)<letter><digit>` layout.
    pub fn parse(version: &str) -> Option<Self> {
        let caps = FIRMWARE_PATTERN.captures(version.trim())?;
        Some(Self {
            major: caps[1].parse().ok()?,
            minor: caps[2].parse().ok()?,
            patch: caps[3].parse().ok()?,
        })
    }

    /// Whether this firmware expects an obfuscated password.
    pub fn requires_obfuscation(&self) -> bool {
        self.major >= 2 && self.patch >= 1
    }
}

/// Decide whether the password must be obfuscated for the given firmware string.
///
/// Unrecognised version strings are treated as current firmware.
pub fn requires_obfuscation(firmware: &str) -> bool {
    FirmwareVersion::parse(firmware)
        .map(|v| v.requires_obfuscation())
        .unwrap_or(true)
}

/// Obfuscate a password the way the switch's login page does.
pub fn obfuscate(password: &str) -> String {
    obfuscate_with(password, &mut rand::rng())
}

/// Obfuscate a password using the supplied random source.
///
/// For a password of `n` characters the result holds `2n + 1` characters:
/// one random padding character before every password character plus one
/// trailing pad. Each password character is shifted down by `n` code points.
///
/// `n` counts Unicode scalar values, not UTF-8 bytes, so a non-ASCII
/// character is shifted as one unit.
pub fn obfuscate_with<R: Rng + ?Sized>(password: &str, rng: &mut R) -> String {
    let chars: Vec<char> = password.chars().collect();
    let shift = chars.len() as i64;
    let mut result = String::with_capacity(chars.len() * 2 + 1);

    for i in 0..=chars.len() {
        let pad = PADDING_ALPHABET[rng.random_range(0..PADDING_ALPHABET.len())];
        result.push(char::from(pad));
        if let Some(&c) = chars.get(i) {
            result.push(shift_char(c, shift));
        }
    }

    result
}

// Out-of-range code points become U+FFFD, as the device's own encoder does.
fn shift_char(c: char, shift: i64) -> char {
    u32::try_from(i64::from(u32::from(c)) - shift)
        .ok()
        .and_then(char::from_u32)
        .unwrap_or(char::REPLACEMENT_CHARACTER)
}
