use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use modemipc_frame::{command_id, group_from_name, MessageType};

use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod emulate;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one request and print the correlated response.
    Send(SendArgs),
    /// Subscribe to notifications and indications and print them.
    Listen(ListenArgs),
    /// Run a loopback modem on a Unix socket.
    Emulate(EmulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Emulate(args) => emulate::run(args),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum RequestType {
    Get,
    Set,
    Exec,
}

impl RequestType {
    pub fn message_type(self) -> MessageType {
        match self {
            Self::Get => MessageType::Get,
            Self::Set => MessageType::Set,
            Self::Exec => MessageType::Exec,
        }
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Modem device node or socket path.
    pub path: PathBuf,
    /// Command id: 0x0A01, 2561 or MISC:0x01.
    #[arg(long, short = 'c', value_parser = parse_command)]
    pub command: u16,
    /// Request type.
    #[arg(long = "type", short = 't', value_enum, default_value = "get")]
    pub kind: RequestType,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["hex", "file"])]
    pub data: Option<String>,
    /// Hex-encoded payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["data", "hex"])]
    pub file: Option<PathBuf>,
    /// Do not wait for a response.
    #[arg(long)]
    pub no_wait: bool,
    /// Maximum time to wait for the response (e.g. 5s, 500ms).
    #[arg(long, env = "MODEMIPC_TIMEOUT", default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Modem device node or socket path.
    pub path: PathBuf,
    /// Notification command ids (comma-separated).
    #[arg(long, value_delimiter = ',', value_parser = parse_command)]
    pub notify: Vec<u16>,
    /// Indication command ids (comma-separated).
    #[arg(long, value_delimiter = ',', value_parser = parse_command)]
    pub indicate: Vec<u16>,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct EmulateArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Answer with sequence id 0, forcing command-id correlation.
    #[arg(long)]
    pub no_echo: bool,
    /// Emit a notification at this interval (e.g. 500ms).
    #[arg(long)]
    pub notify_every: Option<String>,
    /// Command id carried by periodic notifications.
    #[arg(long, value_parser = parse_command, default_value = "PWR:0x02")]
    pub notify_command: u16,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// A flag that ctrl-c clears.
pub fn running_flag() -> CliResult<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = running.clone();
    ctrlc::set_handler(move || {
        handler_flag.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))?;
    Ok(running)
}

/// Accepts `0x0A01`, `2561` or `MISC:0x01`.
pub fn parse_command(input: &str) -> Result<u16, String> {
    let input = input.trim();
    if let Some((group, index)) = input.split_once(':') {
        let group = group_from_name(group).ok_or_else(|| format!("unknown command group: {group}"))?;
        let index = parse_number(index)
            .and_then(|v| u8::try_from(v).ok())
            .ok_or_else(|| format!("invalid command index: {index}"))?;
        return Ok(command_id(group, index));
    }
    parse_number(input)
        .and_then(|v| u16::try_from(v).ok())
        .ok_or_else(|| format!("invalid command id: {input}"))
}

fn parse_number(input: &str) -> Option<u32> {
    match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => input.parse().ok(),
    }
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

pub fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: String = input.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if !digits.is_ascii() || digits.len() % 2 != 0 {
        return Err(CliError::new(USAGE, "--hex needs an even number of hex digits"));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| CliError::new(USAGE, format!("invalid hex byte: {}", &digits[i..i + 2])))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_ids_in_every_notation() {
        assert_eq!(parse_command("0x0A01"), Ok(0x0A01));
        assert_eq!(parse_command("2561"), Ok(0x0A01));
        assert_eq!(parse_command("misc:0x01"), Ok(0x0A01));
        assert_eq!(parse_command("NET:5"), Ok(0x0805));
        assert!(parse_command("0x10000").is_err());
        assert!(parse_command("RADIO:0x01").is_err());
        assert!(parse_command("NET:0x100").is_err());
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
    }

    #[test]
    fn hex_payloads() {
        assert_eq!(parse_hex("01ff").unwrap(), vec![0x01, 0xFF]);
        assert_eq!(parse_hex("de ad").unwrap(), vec![0xDE, 0xAD]);
        assert!(parse_hex("abc").is_err());
        assert!(parse_hex("zz").is_err());
    }
}
