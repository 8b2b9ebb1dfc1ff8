//! GDB Remote Serial Protocol server: a real but intentionally partial
//! transport over `TcpListener`, built on `emucore`'s debugger surface.
//! Grounded in `examples/original_source/src/gdb_stub/gdb_stub.c` for the
//! packet set; the target description is the Cortex-M3 (ARMv7-M) register
//! file GDB's `org.gnu.gdb.arm.m-profile` feature expects.
//!
//! Not implemented, matching spec.md's MPU non-goal: `vCont`, `qRcmd`
//! monitor commands, multi-process extensions, non-stop mode.

mod packet;

use std::net::{TcpListener, TcpStream};

use emucore::status::Status;
use emucore::BreakSignal;
use emucore::Simulator;

use crate::error::EmuError;
use packet::{decode_hex, encode_hex, read_packet, send_packet};

const TARGET_XML: &str = r#"<?xml version="1.0"?>
<!DOCTYPE target SYSTEM "gdb-target.dtd">
<target>
  <architecture>arm</architecture>
  <feature name="org.gnu.gdb.arm.m-profile">
    <reg name="r0" bitsize="32"/>
    <reg name="r1" bitsize="32"/>
    <reg name="r2" bitsize="32"/>
    <reg name="r3" bitsize="32"/>
    <reg name="r4" bitsize="32"/>
    <reg name="r5" bitsize="32"/>
    <reg name="r6" bitsize="32"/>
    <reg name="r7" bitsize="32"/>
    <reg name="r8" bitsize="32"/>
    <reg name="r9" bitsize="32"/>
    <reg name="r10" bitsize="32"/>
    <reg name="r11" bitsize="32"/>
    <reg name="r12" bitsize="32"/>
    <reg name="sp" bitsize="32" type="data_ptr"/>
    <reg name="lr" bitsize="32"/>
    <reg name="pc" bitsize="32" type="code_ptr"/>
    <reg name="xpsr" bitsize="32" regnum="25"/>
  </feature>
</target>
"#;

/// Polls the TCP stream (already set non-blocking) for an incoming `Ctrl-C`
/// (0x03) or a closed connection between steps of a `c`/`s` run.
struct TcpBreakSignal<'a>(&'a mut TcpStream);

impl BreakSignal for TcpBreakSignal<'_> {
    fn requested(&mut self) -> bool {
        let mut byte = [0u8; 1];
        match std::io::Read::read(self.0, &mut byte) {
            Ok(0) => true,
            Ok(_) => byte[0] == 0x03,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => false,
            Err(_) => true,
        }
    }
}

fn stop_reply(status: Status) -> String {
    match status {
        Status::Ok | Status::BreakpointHit | Status::Halted => "S05".to_string(),
        Status::InvalidInstruction => "S04".to_string(),
        Status::Error | Status::InvalidAddress => "S06".to_string(),
    }
}

fn handle_read_registers(sim: &Simulator) -> String {
    let regs = sim.read_registers();
    regs.iter().map(|r| encode_hex(&r.to_le_bytes())).collect()
}

fn handle_write_registers(sim: &mut Simulator, payload: &str) -> Result<(), EmuError> {
    let bytes = decode_hex(payload)?;
    if bytes.len() != 17 * 4 {
        return Err(EmuError::Protocol(format!("expected {} register bytes, got {}", 17 * 4, bytes.len())));
    }
    let mut regs = [0u32; 17];
    for (i, reg) in regs.iter_mut().enumerate() {
        *reg = u32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap());
    }
    sim.write_registers(&regs);
    Ok(())
}

fn handle_read_memory(sim: &mut Simulator, args: &str) -> Result<String, EmuError> {
    let (addr, len) = args
        .split_once(',')
        .ok_or_else(|| EmuError::Protocol(format!("malformed 'm' packet: {args}")))?;
    let addr = u32::from_str_radix(addr, 16).map_err(|_| EmuError::Protocol(args.to_string()))?;
    let len = usize::from_str_radix(len, 16).map_err(|_| EmuError::Protocol(args.to_string()))?;
    let mut buf = vec![0u8; len];
    sim.read_memory(addr, &mut buf);
    Ok(encode_hex(&buf))
}

fn handle_write_memory(sim: &mut Simulator, args: &str) -> Result<(), EmuError> {
    let (head, data) = args
        .split_once(':')
        .ok_or_else(|| EmuError::Protocol(format!("malformed 'M' packet: {args}")))?;
    let (addr, _len) = head
        .split_once(',')
        .ok_or_else(|| EmuError::Protocol(format!("malformed 'M' packet: {args}")))?;
    let addr = u32::from_str_radix(addr, 16).map_err(|_| EmuError::Protocol(args.to_string()))?;
    let bytes = decode_hex(data)?;
    match sim.write_memory(addr, &bytes) {
        Status::Ok => Ok(()),
        other => Err(EmuError::Protocol(format!("write to {addr:#010x} failed: {other:?}"))),
    }
}

fn handle_breakpoint(sim: &mut Simulator, args: &str, set: bool) -> Result<(), EmuError> {
    let mut parts = args.splitn(3, ',');
    let kind = parts.next().unwrap_or("");
    let addr = parts.next().ok_or_else(|| EmuError::Protocol(args.to_string()))?;
    if kind != "0" {
        return Err(EmuError::Protocol(format!("unsupported breakpoint kind {kind}")));
    }
    let addr = u32::from_str_radix(addr, 16).map_err(|_| EmuError::Protocol(args.to_string()))?;
    if set {
        sim.add_breakpoint(addr);
    } else {
        sim.remove_breakpoint(addr);
    }
    Ok(())
}

fn handle_xfer_features(args: &str) -> Result<String, EmuError> {
    let rest = args
        .strip_prefix("features:read:target.xml:")
        .ok_or_else(|| EmuError::Protocol(format!("unsupported qXfer object: {args}")))?;
    let (offset, length) = rest
        .split_once(',')
        .ok_or_else(|| EmuError::Protocol(format!("malformed qXfer packet: {args}")))?;
    let offset: usize =
        usize::from_str_radix(offset, 16).map_err(|_| EmuError::Protocol(rest.to_string()))?;
    let length: usize =
        usize::from_str_radix(length, 16).map_err(|_| EmuError::Protocol(rest.to_string()))?;
    let bytes = TARGET_XML.as_bytes();
    if offset >= bytes.len() {
        return Ok("l".to_string());
    }
    let end = (offset + length).min(bytes.len());
    let chunk = std::str::from_utf8(&bytes[offset..end]).unwrap_or("");
    let marker = if end == bytes.len() { 'l' } else { 'm' };
    Ok(format!("{marker}{chunk}"))
}

fn dispatch(sim: &mut Simulator, stream: &mut TcpStream, packet: &str) -> Result<Option<String>, EmuError> {
    if packet == "?" {
        return Ok(Some(stop_reply(Status::Ok)));
    }
    if packet == "g" {
        return Ok(Some(handle_read_registers(sim)));
    }
    if let Some(payload) = packet.strip_prefix('G') {
        handle_write_registers(sim, payload)?;
        return Ok(Some("OK".to_string()));
    }
    if let Some(args) = packet.strip_prefix('m') {
        return Ok(Some(handle_read_memory(sim, args)?));
    }
    if let Some(args) = packet.strip_prefix('M') {
        handle_write_memory(sim, args)?;
        return Ok(Some("OK".to_string()));
    }
    if packet == "c" {
        let status = sim.continue_until(&mut TcpBreakSignal(stream));
        return Ok(Some(stop_reply(status)));
    }
    if packet == "s" {
        let status = sim.step_instruction();
        return Ok(Some(stop_reply(status)));
    }
    if let Some(args) = packet.strip_prefix("Z0,") {
        handle_breakpoint(sim, args, true)?;
        return Ok(Some("OK".to_string()));
    }
    if let Some(args) = packet.strip_prefix("z0,") {
        handle_breakpoint(sim, args, false)?;
        return Ok(Some("OK".to_string()));
    }
    if packet == "k" {
        return Ok(None);
    }
    if packet.starts_with("qSupported") {
        return Ok(Some("qXfer:features:read+;PacketSize=1000".to_string()));
    }
    if let Some(args) = packet.strip_prefix("qXfer:") {
        return Ok(Some(handle_xfer_features(args)?));
    }
    // Unrecognized query/vendor packets: an empty reply tells gdb this
    // stub doesn't implement it, which is itself a valid RSP response.
    Ok(Some(String::new()))
}

fn serve_connection(sim: &mut Simulator, mut stream: TcpStream) -> Result<(), EmuError> {
    loop {
        stream.set_nonblocking(false).map_err(|e| EmuError::Protocol(e.to_string()))?;
        let Some(raw) = read_packet(&mut stream)? else {
            return Ok(());
        };
        let packet = String::from_utf8_lossy(&raw).into_owned();
        log::debug!("gdb: <- {packet}");
        stream.set_nonblocking(true).map_err(|e| EmuError::Protocol(e.to_string()))?;
        match dispatch(sim, &mut stream, &packet)? {
            Some(reply) => {
                log::debug!("gdb: -> {reply}");
                send_packet(&mut stream, reply.as_bytes())?;
            }
            None => return Ok(()),
        }
    }
}

/// Accepts one GDB connection at a time on `addr`, serving each to
/// completion before accepting the next (spec §5: single logical thread,
/// no multi-client support).
pub fn serve(sim: &mut Simulator, addr: &str) -> Result<(), EmuError> {
    let listener = TcpListener::bind(addr)
        .map_err(|source| EmuError::GdbBind { addr: addr.to_string(), source })?;
    log::info!("gdb: listening on {addr}");
    for stream in listener.incoming() {
        let stream = stream.map_err(|e| EmuError::Protocol(e.to_string()))?;
        log::info!("gdb: client connected");
        serve_connection(sim, stream)?;
        log::info!("gdb: client disconnected");
    }
    Ok(())
}
