//! End-to-end scenarios and universal invariants (spec §8).

use emucore::cpu::{R_LR, R_SP, R_XPSR};
use emucore::status::Status;
use emucore::usart::OutputSink;
use emucore::{bus, Simulator};

fn vector_table(sp: u32, entry: u32) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[0..4].copy_from_slice(&sp.to_le_bytes());
    out[4..8].copy_from_slice(&entry.to_le_bytes());
    out
}

fn put16(image: &mut Vec<u8>, offset: usize, word: u16) {
    if image.len() < offset + 2 {
        image.resize(offset + 2, 0);
    }
    image[offset..offset + 2].copy_from_slice(&word.to_le_bytes());
}

fn put32(image: &mut Vec<u8>, offset: usize, word: u32) {
    if image.len() < offset + 4 {
        image.resize(offset + 4, 0);
    }
    image[offset..offset + 4].copy_from_slice(&word.to_le_bytes());
}

fn mov_imm(rd: u8, imm8: u8) -> u16 {
    0x2000 | ((rd as u16) << 8) | imm8 as u16
}

fn add_reg(rd: u8, rs: u8, rn: u8) -> u16 {
    0x1800 | ((rn as u16) << 6) | ((rs as u16) << 3) | rd as u16
}

fn sub_reg(rd: u8, rs: u8, rn: u8) -> u16 {
    0x1A00 | ((rn as u16) << 6) | ((rs as u16) << 3) | rd as u16
}

fn bx(rs: u8) -> u16 {
    0x4700 | (((rs >> 3) as u16) << 6) | (((rs & 0x7) as u16) << 3)
}

/// Unconditional B encoding (format 18) from `at` to `target`.
fn b_uncond(at: u32, target: u32) -> u16 {
    let offset = target.wrapping_sub(at.wrapping_add(4)) as i32;
    let imm11 = ((offset >> 1) as i16 as u16) & 0x7FF;
    0xE000 | imm11
}

/// BEQ encoding (format 16) from `at` to `target`.
fn beq(at: u32, target: u32) -> u16 {
    let offset = target.wrapping_sub(at.wrapping_add(4)) as i32;
    let imm8 = ((offset >> 1) as i16 as u16) & 0xFF;
    0xD000 | imm8
}

/// BL encoding (32-bit Thumb-2) from `at` to `target`; returns (hi, lo).
fn bl(at: u32, target: u32) -> (u16, u16) {
    let offset = target.wrapping_sub(at.wrapping_add(4)) as i32 as u32;
    let imm25 = offset & 0x01FF_FFFF;
    let s = (imm25 >> 24) & 1;
    let i1 = (imm25 >> 23) & 1;
    let i2 = (imm25 >> 22) & 1;
    let imm10 = (imm25 >> 12) & 0x3FF;
    let imm11 = (imm25 >> 1) & 0x7FF;
    let j1 = 1 - (i1 ^ s);
    let j2 = 1 - (i2 ^ s);
    let hi = 0xF000 | ((s as u16) << 10) | imm10 as u16;
    let lo = 0xD000 | ((j1 as u16) << 13) | ((j2 as u16) << 11) | imm11 as u16;
    (hi, lo)
}

fn flash_base() -> u32 {
    bus::FLASH_BASE
}

fn sim_with(image: Vec<u8>) -> Simulator {
    let mut sim = Simulator::new(Box::new(Vec::<u8>::new()));
    sim.load(&image);
    sim
}

#[test]
fn scenario_1_arithmetic_and_flags() {
    let base = flash_base();
    let mut image = vector_table(0x2000_4FF0, base + 9).to_vec();
    put16(&mut image, 8, mov_imm(0, 100));
    put16(&mut image, 10, mov_imm(1, 50));
    put16(&mut image, 12, add_reg(2, 0, 1)); // R2 = R0 + R1
    put16(&mut image, 14, sub_reg(3, 0, 2)); // R3 = R0 - R2
    let mut sim = sim_with(image);

    for _ in 0..4 {
        assert_eq!(sim.step(), Status::Ok);
    }
    assert_eq!(sim.core.register(2), 150);
    assert_eq!(sim.core.register(3), 0xFFFF_FFCE);
    assert!(sim.core.n());
    assert!(!sim.core.c());
}

#[test]
fn scenario_2_conditional_branch_taken() {
    let base = flash_base();
    let mut image = vector_table(0x2000_4FF0, base + 9).to_vec();
    put16(&mut image, 8, mov_imm(0, 10));
    put16(&mut image, 10, mov_imm(1, 10));
    put16(&mut image, 12, 0x4000 | (0xA << 6) | (1 << 3)); // CMP R0, R1
    put16(&mut image, 14, beq(base + 14, base + 18)); // skip the MOV R2 at +16
    put16(&mut image, 16, mov_imm(2, 0xFF));
    put16(&mut image, 18, mov_imm(3, 1));
    let mut sim = sim_with(image);

    for _ in 0..5 {
        assert_eq!(sim.step(), Status::Ok);
    }
    assert_eq!(sim.core.register(2), 0);
    assert_eq!(sim.core.register(3), 1);
    assert!(sim.core.z());
}

#[test]
fn scenario_3_call_and_return() {
    let mut image = vector_table(0x2000_4FF0, 0x0800_0081).to_vec();
    let call_site = 0x0800_0080u32;
    let target = 0x0800_008Cu32;
    let (hi, lo) = bl(call_site, target);
    put16(&mut image, 0x80, hi);
    put16(&mut image, 0x82, lo);
    put16(&mut image, 0x8C, mov_imm(0, 0xAA));
    put16(&mut image, 0x8E, bx(R_LR as u8));
    let mut sim = sim_with(image);

    assert_eq!(sim.step(), Status::Ok); // BL
    assert_eq!(sim.core.pc(), target);
    assert_eq!(sim.core.register(R_LR), 0x0800_0085);
    assert_eq!(sim.step(), Status::Ok); // MOV R0, #0xAA
    assert_eq!(sim.core.register(0), 0xAA);
    assert_eq!(sim.step(), Status::Ok); // BX LR
    assert_eq!(sim.core.pc(), 0x0800_0084);
}

#[test]
fn scenario_4_timer_irq_plumbing() {
    let mut image = vector_table(0x2000_4FF0, 0x0800_0081).to_vec();
    put32(&mut image, (16 + 28) * 4, 0x0800_00C1); // IRQ 28 vector
    put16(&mut image, 0x80, mov_imm(4, 0));
    put16(&mut image, 0x82, b_uncond(0x0800_0082, 0x0800_0082)); // B . (self loop)
    put16(&mut image, 0xC0, mov_imm(4, 1));
    put16(&mut image, 0xC2, bx(R_LR as u8));
    let mut sim = sim_with(image);

    // ARR=5, PSC=0, update-interrupt-enable, counter-enable.
    sim.bus.write(bus::TIMER_BASE + 0x2C, 5, 4); // ARR
    sim.bus.write(bus::TIMER_BASE + 0x0C, 1, 4); // DIER.UIE
    sim.bus.write(bus::TIMER_BASE + 0x00, 1, 4); // CR.CEN
    sim.ic.enable(28);
    sim.ic.set_priority(28, 1);

    let mut handled = false;
    for _ in 0..200 {
        sim.step();
        if sim.core.register(4) == 1 && sim.core.current_irq() == 0 {
            handled = true;
            break;
        }
    }
    assert!(handled, "timer never raised and unwound its IRQ");
    assert_eq!(sim.core.pc(), 0x0800_0082);
    let sr = sim.bus.read(bus::TIMER_BASE + 0x10, 4);
    assert_eq!(sr & 1, 1, "UIF set");
}

#[test]
fn scenario_5_breakpoint_halt() {
    let mut image = vector_table(0x2000_4FF0, 0x0800_0009).to_vec();
    put16(&mut image, 8, mov_imm(0, 0));
    put16(&mut image, 10, 0x3001); // ADD R0, #1
    put16(&mut image, 12, 0x3001);
    put16(&mut image, 14, 0x3001);
    put16(&mut image, 16, b_uncond(0x0800_0010, 0x0800_0010));
    let mut sim = sim_with(image);
    sim.add_breakpoint(0x0800_000E);

    assert_eq!(sim.run(), Status::BreakpointHit);
    assert_eq!(sim.core.pc(), 0x0800_000E);
    assert_eq!(sim.core.register(0), 2);
    assert!(sim.is_halted());
}

#[test]
fn scenario_6_usart_transmit() {
    struct SharedSink(std::rc::Rc<std::cell::RefCell<Vec<u8>>>);
    impl OutputSink for SharedSink {
        fn transmit(&mut self, byte: u8) {
            self.0.borrow_mut().push(byte);
        }
    }

    let received = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let mut sim = Simulator::new(Box::new(SharedSink(received.clone())));

    sim.bus.write(bus::USART_BASE + 0x0C, (1 << 13) | (1 << 3), 4); // UE|TXEN
    sim.bus.write(bus::USART_BASE + 0x04, b'Q' as u32, 4);
    sim.step();

    assert_eq!(&*received.borrow(), &[b'Q']);
    let sr = sim.bus.read(bus::USART_BASE + 0x00, 4);
    assert_ne!(sr & (1 << 7), 0, "TXE set");
    assert_ne!(sr & (1 << 6), 0, "TC set");
}

#[test]
fn invariant_pc_stays_two_byte_aligned_and_thumb_bit_sticks() {
    let mut image = vector_table(0x2000_4FF0, 0x0800_0009).to_vec();
    put16(&mut image, 8, mov_imm(0, 1));
    put16(&mut image, 10, mov_imm(1, 2));
    put16(&mut image, 12, add_reg(2, 0, 1));
    let mut sim = sim_with(image);
    for _ in 0..3 {
        sim.step();
        assert_eq!(sim.core.pc() & 1, 0);
        assert_eq!(sim.core.register(R_XPSR) & (1 << 24), 1 << 24, "xPSR.T stays set");
    }
}

#[test]
fn invariant_non_branching_instruction_advances_pc_by_its_size() {
    let mut image = vector_table(0x2000_4FF0, 0x0800_0009).to_vec();
    put16(&mut image, 8, mov_imm(0, 7));
    let mut sim = sim_with(image);
    let before = sim.core.pc();
    sim.step();
    assert_eq!(sim.core.pc(), before + 2);
}

#[test]
fn invariant_push_pop_round_trips_registers() {
    let mut image = vector_table(0x2000_4FF0, 0x0800_0009).to_vec();
    put16(&mut image, 8, mov_imm(0, 0x11));
    put16(&mut image, 10, mov_imm(1, 0x22));
    put16(&mut image, 12, 0xB403); // PUSH {R0, R1}
    put16(&mut image, 14, mov_imm(0, 0));
    put16(&mut image, 16, mov_imm(1, 0));
    put16(&mut image, 18, 0xBC03); // POP {R0, R1}
    let mut sim = sim_with(image);
    let sp_before = sim.core.register(R_SP);

    for _ in 0..6 {
        assert_eq!(sim.step(), Status::Ok);
    }
    assert_eq!(sim.core.register(0), 0x11);
    assert_eq!(sim.core.register(1), 0x22);
    assert_eq!(sim.core.register(R_SP), sp_before);
}

#[test]
fn invariant_sram_round_trip_and_byte_order() {
    let mut sim = Simulator::new(Box::new(Vec::<u8>::new()));
    sim.write_memory(bus::SRAM_BASE, &0xDEAD_BEEFu32.to_le_bytes());
    let mut out = [0u8; 4];
    sim.read_memory(bus::SRAM_BASE, &mut out);
    assert_eq!(out, [0xEF, 0xBE, 0xAD, 0xDE]);
}
