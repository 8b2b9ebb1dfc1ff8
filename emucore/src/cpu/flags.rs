//! Flag arithmetic shared by the data-processing handlers (spec §4.6).
//!
//! The source's subtractive carry derivation disagrees between its two
//! independent core implementations — one uses `a >= b`, the other
//! `!(b + borrow > a)`. This module adopts `a >= b + borrow_in` as
//! authoritative (spec §9, "possibly-buggy source behavior").

/// Result of an arithmetic op that sets all four flags.
pub struct FlagResult {
    pub value: u32,
    pub n: bool,
    pub z: bool,
    pub c: bool,
    pub v: bool,
}

fn nz(value: u32) -> (bool, bool) {
    (value & 0x8000_0000 != 0, value == 0)
}

/// Plain addition (ADD, CMN): carry-out of the 33-bit unsigned sum, signed
/// overflow via `~(a^b) & (a^result)`.
pub fn add(a: u32, b: u32) -> FlagResult {
    let (value, carry) = a.overflowing_add(b);
    let (n, z) = nz(value);
    let v = (!(a ^ b) & (a ^ value)) & 0x8000_0000 != 0;
    FlagResult { value, n, z, c: carry, v }
}

/// Addition with carry-in (ADC).
pub fn adc(a: u32, b: u32, carry_in: bool) -> FlagResult {
    let wide = a as u64 + b as u64 + carry_in as u64;
    let value = wide as u32;
    let (n, z) = nz(value);
    let c = wide > 0xFFFF_FFFF;
    let v = (!(a ^ b) & (a ^ value)) & 0x8000_0000 != 0;
    FlagResult { value, n, z, c, v }
}

/// Plain subtraction (SUB, CMP, NEG with a=0): `C` means "no borrow", i.e.
/// `a >= b`.
pub fn sub(a: u32, b: u32) -> FlagResult {
    let value = a.wrapping_sub(b);
    let (n, z) = nz(value);
    let c = a >= b;
    let v = ((a ^ b) & (a ^ value)) & 0x8000_0000 != 0;
    FlagResult { value, n, z, c, v }
}

/// Subtraction with borrow-in (SBC): `borrow_in = !carry_in`, authoritative
/// carry-out is `a >= b + borrow_in`.
pub fn sbc(a: u32, b: u32, carry_in: bool) -> FlagResult {
    let borrow_in: u64 = if carry_in { 0 } else { 1 };
    let value = a.wrapping_sub(b).wrapping_sub(borrow_in as u32);
    let (n, z) = nz(value);
    let c = a as u64 >= b as u64 + borrow_in;
    let v = ((a ^ b) & (a ^ value)) & 0x8000_0000 != 0;
    FlagResult { value, n, z, c, v }
}

/// Logical ops (AND, ORR, EOR, BIC, MVN, TST, LSL/LSR/ASR/ROR-by-register
/// result, MUL): N and Z only, caller supplies C unchanged or shift-derived.
pub fn logical(value: u32) -> (bool, bool) {
    nz(value)
}

/// LSL by an immediate 0..=31. Per spec, an immediate distance of 0 is a
/// plain move (C unchanged).
pub fn lsl_imm(value: u32, imm5: u32, carry_in: bool) -> (u32, bool) {
    if imm5 == 0 {
        (value, carry_in)
    } else {
        let carry = (value >> (32 - imm5)) & 1 != 0;
        (value << imm5, carry)
    }
}

/// LSR by an immediate 0..=31; an encoded 0 means a shift distance of 32
/// (spec §4.6).
pub fn lsr_imm(value: u32, imm5: u32) -> (u32, bool) {
    let n = if imm5 == 0 { 32 } else { imm5 };
    if n == 32 {
        (0, value & 0x8000_0000 != 0)
    } else {
        (value >> n, (value >> (n - 1)) & 1 != 0)
    }
}

/// ASR by an immediate 0..=31; an encoded 0 means a shift distance of 32.
pub fn asr_imm(value: u32, imm5: u32) -> (u32, bool) {
    let n = if imm5 == 0 { 32 } else { imm5 };
    let signed = value as i32;
    if n >= 32 {
        let result = if signed < 0 { 0xFFFF_FFFFu32 } else { 0 };
        (result, value & 0x8000_0000 != 0)
    } else {
        ((signed >> n) as u32, (value >> (n - 1)) & 1 != 0)
    }
}

/// LSL/LSR/ASR/ROR by a register-held amount (the low byte of the operand
/// register). A zero distance leaves both value and carry unchanged.
pub fn lsl_reg(value: u32, amount: u32, carry_in: bool) -> (u32, bool) {
    match amount {
        0 => (value, carry_in),
        1..=31 => (value << amount, (value >> (32 - amount)) & 1 != 0),
        32 => (0, value & 1 != 0),
        _ => (0, false),
    }
}

pub fn lsr_reg(value: u32, amount: u32, carry_in: bool) -> (u32, bool) {
    match amount {
        0 => (value, carry_in),
        1..=31 => (value >> amount, (value >> (amount - 1)) & 1 != 0),
        32 => (0, value & 0x8000_0000 != 0),
        _ => (0, false),
    }
}

pub fn asr_reg(value: u32, amount: u32, carry_in: bool) -> (u32, bool) {
    let signed = value as i32;
    match amount {
        0 => (value, carry_in),
        1..=31 => ((signed >> amount) as u32, (value >> (amount - 1)) & 1 != 0),
        _ => {
            let result = if signed < 0 { 0xFFFF_FFFFu32 } else { 0 };
            (result, value & 0x8000_0000 != 0)
        }
    }
}

pub fn ror_reg(value: u32, amount: u32, carry_in: bool) -> (u32, bool) {
    let n = amount % 32;
    if amount == 0 {
        (value, carry_in)
    } else if n == 0 {
        (value, value & 0x8000_0000 != 0)
    } else {
        (value.rotate_right(n), (value >> (n - 1)) & 1 != 0)
    }
}
