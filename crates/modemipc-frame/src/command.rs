//! Command identifiers.
//!
//! A command id is a 16-bit value: the high byte names the command group,
//! the low byte the command within that group. Only the groups are named
//! here; individual commands belong to the feature drivers.

/// Power management.
pub const GROUP_PWR: u8 = 0x01;
/// Voice calls.
pub const GROUP_CALL: u8 = 0x02;
/// Short messages.
pub const GROUP_SMS: u8 = 0x04;
/// SIM security (PIN, lock state, file access).
pub const GROUP_SEC: u8 = 0x05;
/// Phonebook.
pub const GROUP_PB: u8 = 0x06;
/// Display indicators (signal, battery).
pub const GROUP_DISP: u8 = 0x07;
/// Network registration and operator selection.
pub const GROUP_NET: u8 = 0x08;
/// Audio routing.
pub const GROUP_SND: u8 = 0x09;
/// Device information and miscellaneous queries.
pub const GROUP_MISC: u8 = 0x0A;
/// Service mode.
pub const GROUP_SVC: u8 = 0x0B;
/// Supplementary services.
pub const GROUP_SS: u8 = 0x0C;
/// Packet data contexts.
pub const GROUP_GPRS: u8 = 0x0D;
/// SIM application toolkit.
pub const GROUP_SAT: u8 = 0x0E;
/// Modem configuration.
pub const GROUP_CFG: u8 = 0x0F;
/// IMEI management.
pub const GROUP_IMEI: u8 = 0x10;
/// Positioning.
pub const GROUP_GPS: u8 = 0x11;
/// SIM access profile.
pub const GROUP_SAP: u8 = 0x12;
/// Generic responses.
pub const GROUP_GEN: u8 = 0x80;

/// Build a command id from its group and index.
pub const fn command_id(group: u8, index: u8) -> u16 {
    ((group as u16) << 8) | index as u16
}

/// The group byte of a command id.
pub const fn command_group(command: u16) -> u8 {
    (command >> 8) as u8
}

/// The index byte of a command id.
pub const fn command_index(command: u16) -> u8 {
    (command & 0xFF) as u8
}

/// Returns a human-readable name for a command group.
pub fn group_name(group: u8) -> &'static str {
    match group {
        GROUP_PWR => "PWR",
        GROUP_CALL => "CALL",
        GROUP_SMS => "SMS",
        GROUP_SEC => "SEC",
        GROUP_PB => "PB",
        GROUP_DISP => "DISP",
        GROUP_NET => "NET",
        GROUP_SND => "SND",
        GROUP_MISC => "MISC",
        GROUP_SVC => "SVC",
        GROUP_SS => "SS",
        GROUP_GPRS => "GPRS",
        GROUP_SAT => "SAT",
        GROUP_CFG => "CFG",
        GROUP_IMEI => "IMEI",
        GROUP_GPS => "GPS",
        GROUP_SAP => "SAP",
        GROUP_GEN => "GEN",
        _ => "UNKNOWN",
    }
}

/// Inverse of [`group_name`], case-insensitive.
pub fn group_from_name(name: &str) -> Option<u8> {
    (0..=u8::MAX).find(|&group| {
        let known = group_name(group);
        known != "UNKNOWN" && known.eq_ignore_ascii_case(name)
    })
}

/// Render a command id for logs, e.g. `NET:0x01`.
pub fn describe(command: u16) -> String {
    format!(
        "{}:{:#04x}",
        group_name(command_group(command)),
        command_index(command)
    )
}
