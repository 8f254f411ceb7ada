//! Classic BPF programs
//!
//! Just enough of the instruction set to express port filters: absolute and
//! indexed loads, the IPv4 header-length load, conditional jumps and return.
//! The same program is attached to sockets by the kernel and run here for
//! sources that have no kernel behind them.

use std::fmt;

// Instruction classes and modes from <linux/filter.h>
pub const BPF_LD: u16 = 0x00;
pub const BPF_LDX: u16 = 0x01;
pub const BPF_JMP: u16 = 0x05;
pub const BPF_RET: u16 = 0x06;

pub const BPF_W: u16 = 0x00;
pub const BPF_H: u16 = 0x08;
pub const BPF_B: u16 = 0x10;

pub const BPF_ABS: u16 = 0x20;
pub const BPF_IND: u16 = 0x40;
pub const BPF_MSH: u16 = 0xa0;

pub const BPF_JEQ: u16 = 0x10;
pub const BPF_JSET: u16 = 0x40;
pub const BPF_K: u16 = 0x00;

/// One instruction, laid out like `struct sock_filter`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub code: u16,
    pub jt: u8,
    pub jf: u8,
    pub k: u32,
}

impl Instruction {
    pub const fn stmt(code: u16, k: u32) -> Self {
        Self {
            code,
            jt: 0,
            jf: 0,
            k,
        }
    }

    pub const fn jump(code: u16, k: u32, jt: u8, jf: u8) -> Self {
        Self { code, jt, jf, k }
    }
}

/// A straight-line filter program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    instructions: Vec<Instruction>,
}

impl Program {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Run the program over `packet`. Returns the number of bytes to keep;
    /// 0 means drop. Out-of-bounds loads drop the packet, as in the kernel.
    pub fn run(&self, packet: &[u8]) -> u32 {
        let mut a: u32 = 0;
        let mut x: u32 = 0;
        let mut pc = 0usize;

        while let Some(insn) = self.instructions.get(pc) {
            pc += 1;
            match insn.code {
                c if c == BPF_LD | BPF_W | BPF_ABS => match load(packet, insn.k as usize, 4) {
                    Some(v) => a = v,
                    None => return 0,
                },
                c if c == BPF_LD | BPF_H | BPF_ABS => match load(packet, insn.k as usize, 2) {
                    Some(v) => a = v,
                    None => return 0,
                },
                c if c == BPF_LD | BPF_B | BPF_ABS => match load(packet, insn.k as usize, 1) {
                    Some(v) => a = v,
                    None => return 0,
                },
                c if c == BPF_LD | BPF_H | BPF_IND => {
                    let offset = x.wrapping_add(insn.k) as usize;
                    match load(packet, offset, 2) {
                        Some(v) => a = v,
                        None => return 0,
                    }
                }
                c if c == BPF_LDX | BPF_B | BPF_MSH => match load(packet, insn.k as usize, 1) {
                    Some(v) => x = (v & 0x0f) * 4,
                    None => return 0,
                },
                c if c == BPF_JMP | BPF_JEQ | BPF_K => {
                    let skip = if a == insn.k { insn.jt } else { insn.jf };
                    pc += skip as usize;
                }
                c if c == BPF_JMP | BPF_JSET | BPF_K => {
                    let skip = if a & insn.k != 0 { insn.jt } else { insn.jf };
                    pc += skip as usize;
                }
                c if c == BPF_RET | BPF_K => return insn.k,
                // Unknown opcode: the kernel would have rejected the program
                _ => return 0,
            }
        }

        0
    }

    pub fn matches(&self, packet: &[u8]) -> bool {
        self.run(packet) != 0
    }
}

fn load(packet: &[u8], offset: usize, size: usize) -> Option<u32> {
    let bytes = packet.get(offset..offset.checked_add(size)?)?;
    Some(bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32))
}

/// `tcpdump -d` style listing
impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (pc, insn) in self.instructions.iter().enumerate() {
            let next = pc + 1;
            let code = insn.code;
            write!(f, "({:03}) ", pc)?;
            if code == BPF_LD | BPF_W | BPF_ABS {
                writeln!(f, "ld       [{}]", insn.k)?;
            } else if code == BPF_LD | BPF_H | BPF_ABS {
                writeln!(f, "ldh      [{}]", insn.k)?;
            } else if code == BPF_LD | BPF_B | BPF_ABS {
                writeln!(f, "ldb      [{}]", insn.k)?;
            } else if code == BPF_LD | BPF_H | BPF_IND {
                writeln!(f, "ldh      [x + {}]", insn.k)?;
            } else if code == BPF_LDX | BPF_B | BPF_MSH {
                writeln!(f, "ldxb     4*([{}]&0xf)", insn.k)?;
            } else if code == BPF_JMP | BPF_JEQ | BPF_K || code == BPF_JMP | BPF_JSET | BPF_K {
                let op = if code & 0xf0 == BPF_JEQ { "jeq" } else { "jset" };
                writeln!(
                    f,
                    "{:<8} #{:#x}{:<10}jt {}\tjf {}",
                    op,
                    insn.k,
                    "",
                    next + insn.jt as usize,
                    next + insn.jf as usize
                )?;
            } else if code == BPF_RET | BPF_K {
                writeln!(f, "ret      #{}", insn.k)?;
            } else {
                writeln!(f, "unimp    {:#06x}", code)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accept_if_first_byte(value: u32) -> Program {
        Program::new(vec![
            Instruction::stmt(BPF_LD | BPF_B | BPF_ABS, 0),
            Instruction::jump(BPF_JMP | BPF_JEQ | BPF_K, value, 0, 1),
            Instruction::stmt(BPF_RET | BPF_K, 0xffff),
            Instruction::stmt(BPF_RET | BPF_K, 0),
        ])
    }

    #[test]
    fn test_jeq_branches() {
        let prog = accept_if_first_byte(0x45);
        assert_eq!(prog.run(&[0x45, 0x00]), 0xffff);
        assert_eq!(prog.run(&[0x60, 0x00]), 0);
    }

    #[test]
    fn test_out_of_bounds_load_drops() {
        let prog = Program::new(vec![
            Instruction::stmt(BPF_LD | BPF_H | BPF_ABS, 10),
            Instruction::stmt(BPF_RET | BPF_K, 1),
        ]);
        assert!(!prog.matches(&[0u8; 11]));
        assert!(prog.matches(&[0u8; 12]));
    }

    #[test]
    fn test_msh_and_indirect_load() {
        // X = 4 * (pkt[0] & 0xf); A = pkt[X + 2..X + 4]
        let prog = Program::new(vec![
            Instruction::stmt(BPF_LDX | BPF_B | BPF_MSH, 0),
            Instruction::stmt(BPF_LD | BPF_H | BPF_IND, 2),
            Instruction::jump(BPF_JMP | BPF_JEQ | BPF_K, 0xbeef, 0, 1),
            Instruction::stmt(BPF_RET | BPF_K, 1),
            Instruction::stmt(BPF_RET | BPF_K, 0),
        ]);

        let mut pkt = vec![0x01, 0, 0, 0, 0, 0, 0xbe, 0xef];
        assert!(prog.matches(&pkt));
        pkt[0] = 0x02;
        assert!(!prog.matches(&pkt));
    }

    #[test]
    fn test_jset() {
        let prog = Program::new(vec![
            Instruction::stmt(BPF_LD | BPF_H | BPF_ABS, 0),
            Instruction::jump(BPF_JMP | BPF_JSET | BPF_K, 0x1fff, 1, 0),
            Instruction::stmt(BPF_RET | BPF_K, 1),
            Instruction::stmt(BPF_RET | BPF_K, 0),
        ]);
        assert!(prog.matches(&[0x40, 0x00]));
        assert!(!prog.matches(&[0x00, 0x08]));
    }

    #[test]
    fn test_falling_off_the_end_drops() {
        let prog = Program::new(vec![Instruction::stmt(BPF_LD | BPF_B | BPF_ABS, 0)]);
        assert_eq!(prog.run(&[1]), 0);
    }

    #[test]
    fn test_display_listing() {
        let listing = accept_if_first_byte(0x45).to_string();
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines[0], "(000) ldb      [0]");
        assert!(lines[1].starts_with("(001) jeq      #0x45"));
        assert!(lines[1].ends_with("jt 2\tjf 3"));
        assert_eq!(lines[3], "(003) ret      #0");
    }
}
