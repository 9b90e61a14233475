//! Well-known message ids.
//!
//! Requests and their confirmations share an id. Indications have bit 7 set.

/// Set on every chip-to-host indication.
pub const ID_IS_INDICATION: u8 = 0x80;

/// Data frame transmit request / confirmation.
pub const TX_ID: u8 = 0x04;
/// Read a MIB element.
pub const READ_MIB_ID: u8 = 0x05;
/// Write a MIB element.
pub const WRITE_MIB_ID: u8 = 0x06;
/// Start a scan.
pub const START_SCAN_ID: u8 = 0x07;
/// Reset the interface.
pub const RESET_ID: u8 = 0x0A;
/// Join a BSS.
pub const JOIN_ID: u8 = 0x0B;
/// Confirmation acknowledging several transmit requests at once.
pub const MULTI_TRANSMIT_CNF_ID: u8 = 0x1E;

/// Received data frame.
pub const RX_IND_ID: u8 = 0x84;
/// Generic event.
pub const EVENT_IND_ID: u8 = 0x85;
/// Scan completed.
pub const SCAN_CMPL_IND_ID: u8 = 0x86;
/// Firmware exception report.
pub const EXCEPTION_IND_ID: u8 = 0xE0;
/// Firmware startup.
pub const STARTUP_IND_ID: u8 = 0xE1;
/// Chip woke up.
pub const WAKEUP_IND_ID: u8 = 0xE2;
/// Generic firmware indication.
pub const GENERIC_IND_ID: u8 = 0xE3;
/// Firmware error report.
pub const ERROR_IND_ID: u8 = 0xE4;

/// Returns true if the id is an indication.
pub fn is_indication(id: u8) -> bool {
    id & ID_IS_INDICATION != 0
}

/// Returns true if messages with this id carry no sequence obligation.
pub fn is_sequence_exempt(id: u8) -> bool {
    matches!(id, EXCEPTION_IND_ID | ERROR_IND_ID)
}

/// Returns a human-readable name for a message id.
pub fn message_name(id: u8) -> &'static str {
    match id {
        TX_ID => "TX",
        READ_MIB_ID => "READ_MIB",
        WRITE_MIB_ID => "WRITE_MIB",
        START_SCAN_ID => "START_SCAN",
        RESET_ID => "RESET",
        JOIN_ID => "JOIN",
        MULTI_TRANSMIT_CNF_ID => "MULTI_TRANSMIT",
        RX_IND_ID => "RX",
        EVENT_IND_ID => "EVENT",
        SCAN_CMPL_IND_ID => "SCAN_CMPL",
        EXCEPTION_IND_ID => "EXCEPTION",
        STARTUP_IND_ID => "STARTUP",
        WAKEUP_IND_ID => "WAKEUP",
        GENERIC_IND_ID => "GENERIC",
        ERROR_IND_ID => "ERROR",
        id if is_indication(id) => "UNKNOWN_IND",
        _ => "UNKNOWN",
    }
}
