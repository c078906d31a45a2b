//! ELM327 diagnostics adapter over a serial device node.
//!
//! The link is opened raw at 8N1 without flow control, at the configured baud
//! rate (38400 for most USB and Bluetooth clones). The adapter speaks a line
//! protocol: a command terminated by `\r`, answered by one or more lines and the
//! `>` prompt, which has no line terminator.
//!
//! ```text
//! open:  ATZ → ATE0 → ATSP0 → 0100   (reset, echo off, auto protocol, vehicle check)
//! read:  010C 010D 0105 0111 010F ATRV
//! ```

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::debug;

use super::{scan_serial_ports, Hardware, Target};
use crate::devices::{pid, Telemetry};
use crate::error::HardwareError;

/// Mode-01 PIDs polled on every read: (hex pid, name, unit).
const PIDS: &[(&str, &str, &str)] = &[
    ("0C", pid::RPM, "rpm"),
    ("0D", pid::SPEED, "km/h"),
    ("05", pid::COOLANT_TEMP, "degC"),
    ("11", pid::THROTTLE_POS, "%"),
    ("0F", pid::INTAKE_TEMP, "degC"),
];

/// Open adapter link.
#[derive(Debug)]
pub struct Elm327Link<P = SerialStream> {
    path: PathBuf,
    port: P,
}

/// Diagnostics adapter backend.
#[derive(Debug, Clone)]
pub struct Elm327 {
    timeout: Duration,
    baud_rate: u32,
}

impl Elm327 {
    /// Default line speed of ELM327 clones.
    pub const DEFAULT_BAUD_RATE: u32 = 38_400;

    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            baud_rate: Self::DEFAULT_BAUD_RATE,
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Bound on a single command round-trip.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn resolve(target: &Target) -> Result<PathBuf, HardwareError> {
        match target {
            Target::Serial(Some(path)) => Ok(path.clone()),
            Target::Serial(None) => {
                scan_serial_ports()
                    .into_iter()
                    .next()
                    .ok_or_else(|| HardwareError::NotFound {
                        target: target.to_string(),
                    })
            }
            Target::Video(_) => Err(HardwareError::Rejected {
                target: target.to_string(),
                reason: "not a serial target".into(),
            }),
        }
    }

    /// Runs the init sequence on an already opened port.
    async fn handshake<P>(&self, link: &mut Elm327Link<P>) -> Result<(), HardwareError>
    where
        P: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let target = link.path.display().to_string();
        for cmd in ["ATZ", "ATE0", "ATSP0"] {
            self.command(link, cmd).await?;
        }
        let reply = self.command(link, "0100").await?;
        if reply.contains("UNABLE TO CONNECT") || reply.contains("NO DATA") || reply.contains("ERROR") {
            return Err(HardwareError::Rejected {
                target,
                reason: reply.trim().to_string(),
            });
        }
        Ok(())
    }

    async fn command<P>(&self, link: &mut Elm327Link<P>, cmd: &str) -> Result<String, HardwareError>
    where
        P: AsyncRead + AsyncWrite + Unpin + Send,
    {
        match tokio::time::timeout(self.timeout, transact(&mut link.port, cmd)).await {
            Ok(reply) => Ok(reply?),
            Err(_) => Err(HardwareError::Timeout {
                target: link.path.display().to_string(),
                timeout: self.timeout,
            }),
        }
    }

    /// Queries every PID plus battery voltage. `None` if nothing answered.
    async fn poll<P>(&self, link: &mut Elm327Link<P>) -> Option<Telemetry>
    where
        P: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut out = Telemetry::new(SystemTime::now(), false);
        for &(hex, name, unit) in PIDS {
            match self.command(link, &format!("01{hex}")).await {
                Ok(reply) => {
                    if let Some(v) = decode_pid(hex, &reply) {
                        out = out.with(name, v, unit);
                    }
                }
                Err(e) => {
                    debug!(path = %link.path.display(), error = %e, "adapter stopped answering");
                    return None;
                }
            }
        }
        if let Ok(reply) = self.command(link, "ATRV").await {
            if let Some(v) = decode_voltage(&reply) {
                out = out.with(pid::ELM_VOLTAGE, v, "V");
            }
        }
        (!out.is_empty()).then_some(out)
    }
}

impl Default for Elm327 {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Hardware for Elm327 {
    type Handle = Elm327Link;
    type Sample = Telemetry;

    async fn open(&self, target: &Target) -> Result<Elm327Link, HardwareError> {
        let path = Self::resolve(target)?;
        let port = tokio_serial::new(path.to_string_lossy(), self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()
            .map_err(std::io::Error::from)?;
        debug!(path = %path.display(), baud = self.baud_rate, "serial port open");
        let mut link = Elm327Link { path, port };
        self.handshake(&mut link).await?;
        debug!(path = %link.path.display(), "adapter link up");
        Ok(link)
    }

    async fn read(&self, handle: &mut Elm327Link) -> Option<Telemetry> {
        self.poll(handle).await
    }

    async fn close(&self, handle: Elm327Link) {
        debug!(path = %handle.path.display(), "adapter link released");
        drop(handle);
    }

    /// Port scan only; never opens the adapter.
    async fn probe(&self, target: &Target) -> bool {
        match target {
            Target::Serial(Some(path)) => tokio::fs::try_exists(path).await.unwrap_or(false),
            Target::Serial(None) => !scan_serial_ports().is_empty(),
            Target::Video(_) => false,
        }
    }
}

/// Sends one command and collects the reply up to the `>` prompt.
async fn transact<P>(port: &mut P, cmd: &str) -> std::io::Result<String>
where
    P: AsyncRead + AsyncWrite + Unpin,
{
    port.write_all(format!("{cmd}\r").as_bytes()).await?;
    port.flush().await?;

    let mut reply = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = port.read(&mut byte).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        if byte[0] == b'>' {
            break;
        }
        reply.push(byte[0]);
    }
    Ok(String::from_utf8_lossy(&reply).replace('\r', "\n"))
}

/// Decodes a mode-01 answer such as `41 0C 1A F8`.
pub(crate) fn decode_pid(hex: &str, reply: &str) -> Option<f64> {
    let header = format!("41{hex}");
    let line = reply
        .lines()
        .map(|l| l.split_whitespace().collect::<String>().to_ascii_uppercase())
        .find(|l| l.starts_with(&header))?;
    let data = &line[header.len()..];
    let byte = |i: usize| {
        data.get(i * 2..i * 2 + 2)
            .and_then(|b| u8::from_str_radix(b, 16).ok())
            .map(f64::from)
    };
    let a = byte(0)?;
    let v = match hex {
        "0C" => (256.0 * a + byte(1)?) / 4.0,
        "0D" => a,
        "05" | "0F" => a - 40.0,
        "11" => (a * 100.0 / 255.0 * 10.0).round() / 10.0,
        _ => return None,
    };
    Some(v)
}

/// Decodes an `ATRV` answer such as `12.6V`.
pub(crate) fn decode_voltage(reply: &str) -> Option<f64> {
    reply
        .lines()
        .map(str::trim)
        .find_map(|l| l.strip_suffix('V').or_else(|| l.strip_suffix('v')))
        .and_then(|v| v.trim().parse().ok())
}
