//! Shared helpers for the integration tests.
//!
//! Besides compiling typed units, this module carries a small interpreter for
//! the NASM subset cubec emits, so end-to-end tests can run the generated
//! assembly without an external assembler. The `io` library functions and
//! `puts` are built in; calling them clobbers every caller-saved register the
//! way a real call may.

#![allow(dead_code)]

use bumpalo::Bump;
use cubec::{CompilationSession, CompileResult, CompiledUnit, Compiler, CompilerConfig, Unit};
use hashbrown::HashMap;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Compile `units` together with `config`.
pub fn compile_with(units: Vec<Unit>, config: CompilerConfig) -> CompileResult<Vec<CompiledUnit>> {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut compiler = Compiler::new(&session, config);
    compiler.compile(units)
}

pub fn compile(units: Vec<Unit>) -> CompileResult<Vec<CompiledUnit>> {
    compile_with(units, CompilerConfig::default())
}

/// Result of running a program to completion.
#[derive(Debug, Clone)]
pub struct Execution {
    pub stdout: String,
    /// Low 32 bits of `rax` when `main` returned.
    pub exit_code: i32,
    pub steps: u64,
}

/// Link the units' text and run `main`.
pub fn execute(units: &[CompiledUnit]) -> Execution {
    let text: Vec<&str> = units.iter().map(|unit| unit.assembly.as_str()).collect();
    let program = Program::parse(&text).unwrap_or_else(|err| panic!("parse error: {}", err));
    let mut machine = Machine::new(&program);
    machine
        .run("main")
        .unwrap_or_else(|err| panic!("execution error: {}", err));
    Execution {
        stdout: machine.stdout,
        exit_code: machine.regs[RAX] as u32 as i32,
        steps: machine.steps,
    }
}

const RAX: usize = 0;
const RCX: usize = 1;
const RDX: usize = 2;
const RBX: usize = 3;
const RSP: usize = 4;
const RBP: usize = 5;
const RSI: usize = 6;
const RDI: usize = 7;

const REGISTER_NAMES: [[&str; 4]; 16] = [
    ["rax", "eax", "ax", "al"],
    ["rcx", "ecx", "cx", "cl"],
    ["rdx", "edx", "dx", "dl"],
    ["rbx", "ebx", "bx", "bl"],
    ["rsp", "esp", "sp", "spl"],
    ["rbp", "ebp", "bp", "bpl"],
    ["rsi", "esi", "si", "sil"],
    ["rdi", "edi", "di", "dil"],
    ["r8", "r8d", "r8w", "r8b"],
    ["r9", "r9d", "r9w", "r9b"],
    ["r10", "r10d", "r10w", "r10b"],
    ["r11", "r11d", "r11w", "r11b"],
    ["r12", "r12d", "r12w", "r12b"],
    ["r13", "r13d", "r13w", "r13b"],
    ["r14", "r14d", "r14w", "r14b"],
    ["r15", "r15d", "r15w", "r15b"],
];

const CALLER_SAVED: [usize; 9] = [0, 1, 2, 6, 7, 8, 9, 10, 11];
const CLOBBER: u64 = 0xdead_beef_dead_beef;
const STEP_LIMIT: u64 = 500_000_000;
const MEMORY_SIZE: usize = 1 << 20;
const DATA_BASE: u64 = 0x1000;
const RETURN_SENTINEL: u64 = u64::MAX;

fn register(name: &str) -> Option<(usize, u8)> {
    // iced spells the low byte of r8..r15 either way.
    let name = match name.strip_suffix('l') {
        Some(stem) if stem.starts_with('r') && stem[1..].parse::<u8>().is_ok() => {
            return register(&format!("{}b", stem));
        }
        _ => name,
    };
    for (index, names) in REGISTER_NAMES.iter().enumerate() {
        for (slot, width) in [8u8, 4, 2, 1].iter().enumerate() {
            if names[slot] == name {
                return Some((index, *width));
            }
        }
    }
    None
}

fn size_of_keyword(word: &str) -> Option<u8> {
    match word {
        "BYTE" => Some(1),
        "WORD" => Some(2),
        "DWORD" => Some(4),
        "QWORD" => Some(8),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Arg {
    Reg(usize, u8),
    Imm(i64),
    Mem {
        size: Option<u8>,
        base: usize,
        disp: i64,
        index: Option<(usize, u8)>,
    },
    Label(String),
    /// A linked code label.
    Target(usize),
}

impl Arg {
    fn width(&self) -> Option<u8> {
        match self {
            Arg::Reg(_, width) => Some(*width),
            Arg::Mem { size, .. } => *size,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cond {
    E,
    Ne,
    L,
    Le,
    G,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Mov,
    Movsx,
    Lea,
    Add,
    Sub,
    Cmp,
    Imul,
    Idiv,
    Neg,
    Inc,
    Dec,
    Sal,
    Cbw,
    Cwd,
    Cdq,
    Cqo,
    Push,
    Pop,
    Call,
    Ret,
    Leave,
    Jmp,
    J(Cond),
}

fn opcode(mnemonic: &str) -> Option<Op> {
    Some(match mnemonic {
        "mov" => Op::Mov,
        "movsx" | "movsxd" => Op::Movsx,
        "lea" => Op::Lea,
        "add" => Op::Add,
        "sub" => Op::Sub,
        "cmp" => Op::Cmp,
        "imul" => Op::Imul,
        "idiv" => Op::Idiv,
        "neg" => Op::Neg,
        "inc" => Op::Inc,
        "dec" => Op::Dec,
        "sal" | "shl" => Op::Sal,
        "cbw" => Op::Cbw,
        "cwd" => Op::Cwd,
        "cdq" => Op::Cdq,
        "cqo" => Op::Cqo,
        "push" => Op::Push,
        "pop" => Op::Pop,
        "call" => Op::Call,
        "ret" => Op::Ret,
        "leave" => Op::Leave,
        "jmp" => Op::Jmp,
        "je" => Op::J(Cond::E),
        "jne" => Op::J(Cond::Ne),
        "jl" => Op::J(Cond::L),
        "jle" => Op::J(Cond::Le),
        "jg" => Op::J(Cond::G),
        "jge" => Op::J(Cond::Ge),
        _ => return None,
    })
}

#[derive(Debug, Clone)]
struct Instruction {
    op: Op,
    args: Vec<Arg>,
    text: String,
}

/// Parsed, linked program text.
#[derive(Debug, Default)]
pub struct Program {
    code: Vec<Instruction>,
    labels: HashMap<String, usize>,
    data: Vec<u8>,
    data_labels: HashMap<String, u64>,
}

impl Program {
    /// Parse and link the text of several units.
    pub fn parse(units: &[&str]) -> Result<Self, String> {
        let mut program = Program::default();
        for text in units {
            program.parse_unit(text)?;
        }
        program.link()?;
        Ok(program)
    }

    fn parse_unit(&mut self, text: &str) -> Result<(), String> {
        let mut function = String::new();
        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty()
                || line.starts_with(';')
                || line.starts_with("section")
                || line.starts_with("global")
                || line.starts_with("extern")
                || line.starts_with("%include")
            {
                continue;
            }

            if let Some((label, bytes)) = line.split_once(": db ") {
                let address = DATA_BASE + self.data.len() as u64;
                self.data_labels.insert(label.to_string(), address);
                self.data.extend(parse_db(bytes)?);
                continue;
            }

            if let Some(label) = line.strip_suffix(':') {
                let name = if label.starts_with('.') {
                    format!("{}{}", function, label)
                } else {
                    function = label.to_string();
                    label.to_string()
                };
                if self.labels.insert(name.clone(), self.code.len()).is_some() {
                    return Err(format!("duplicate label `{}`", name));
                }
                continue;
            }

            let (mnemonic, rest) = line.split_once(' ').unwrap_or((line, ""));
            let op = opcode(mnemonic).ok_or_else(|| format!("unknown instruction `{}`", line))?;
            let mut args = Vec::new();
            for part in split_operands(rest) {
                let mut arg = parse_arg(part)?;
                if let Arg::Label(name) = &arg {
                    if name.starts_with('.') {
                        arg = Arg::Label(format!("{}{}", function, name));
                    }
                }
                args.push(arg);
            }
            self.code.push(Instruction {
                op,
                args,
                text: line.to_string(),
            });
        }
        Ok(())
    }

    /// Replace jump and call labels by code indices; calls to unknown
    /// labels are left for the library.
    fn link(&mut self) -> Result<(), String> {
        for instruction in &mut self.code {
            let Some(Arg::Label(target)) = instruction.args.first() else {
                continue;
            };
            match (instruction.op, self.labels.get(target)) {
                (Op::Jmp | Op::J(_) | Op::Call, Some(&index)) => {
                    instruction.args[0] = Arg::Target(index);
                }
                (Op::Jmp | Op::J(_), None) => {
                    return Err(format!("undefined jump target `{}`", target));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Mnemonic and operand text of every instruction, for shape checks.
    pub fn instructions(&self) -> Vec<&str> {
        self.code.iter().map(|instruction| instruction.text.as_str()).collect()
    }
}

fn split_operands(rest: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0;
    let mut start = 0;
    for (i, c) in rest.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(rest[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = rest[start..].trim();
    if !last.is_empty() {
        parts.push(last);
    }
    parts
}

fn parse_arg(text: &str) -> Result<Arg, String> {
    let (size, rest) = match text.split_once(' ') {
        Some((word, rest)) if size_of_keyword(word).is_some() => (size_of_keyword(word), rest.trim()),
        _ => (None, text),
    };
    if let Some(inner) = rest.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        return parse_memory(inner, size);
    }
    if let Some((index, width)) = register(rest) {
        return Ok(Arg::Reg(index, width));
    }
    if let Ok(value) = rest.parse::<i64>() {
        return Ok(Arg::Imm(value));
    }
    Ok(Arg::Label(rest.to_string()))
}

fn parse_memory(inner: &str, size: Option<u8>) -> Result<Arg, String> {
    let mut tokens = inner.split_whitespace();
    let base = tokens
        .next()
        .and_then(register)
        .map(|(index, _)| index)
        .ok_or_else(|| format!("bad base in `[{}]`", inner))?;
    let mut disp = 0;
    let mut index = None;
    while let Some(sign) = tokens.next() {
        let term = tokens
            .next()
            .ok_or_else(|| format!("dangling `{}` in `[{}]`", sign, inner))?;
        let negative = match sign {
            "+" => false,
            "-" => true,
            _ => return Err(format!("bad operator `{}` in `[{}]`", sign, inner)),
        };
        if let Some((reg, scale)) = term.split_once('*') {
            let (reg, _) = register(reg).ok_or_else(|| format!("bad index in `[{}]`", inner))?;
            let scale = scale.parse::<u8>().map_err(|err| err.to_string())?;
            index = Some((reg, scale));
        } else {
            let value = term.parse::<i64>().map_err(|err| err.to_string())?;
            disp += if negative { -value } else { value };
        }
    }
    Ok(Arg::Mem {
        size,
        base,
        disp,
        index,
    })
}

/// `"hi",10,0` into bytes.
fn parse_db(items: &str) -> Result<Vec<u8>, String> {
    let mut bytes = Vec::new();
    let mut chars = items.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                for c in chars.by_ref() {
                    if c == '"' {
                        break;
                    }
                    let mut buf = [0; 4];
                    bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                }
            }
            ',' | ' ' => {}
            digit if digit.is_ascii_digit() => {
                let mut number = digit.to_string();
                while let Some(next) = chars.peek().filter(|c| c.is_ascii_digit()) {
                    number.push(*next);
                    chars.next();
                }
                bytes.push(number.parse::<u8>().map_err(|err| err.to_string())?);
            }
            other => return Err(format!("unexpected `{}` in db `{}`", other, items)),
        }
    }
    Ok(bytes)
}

fn mask(width: u8) -> u64 {
    match width {
        8 => u64::MAX,
        w => (1u64 << (w as u32 * 8)) - 1,
    }
}

fn sign_extend(value: u64, width: u8) -> i64 {
    let shift = 64 - width as u32 * 8;
    ((value << shift) as i64) >> shift
}

/// Interpreter state.
pub struct Machine<'p> {
    program: &'p Program,
    regs: [u64; 16],
    memory: Vec<u8>,
    /// Signed operands of the last `cmp`.
    compared: (i64, i64),
    rip: usize,
    pub stdout: String,
    pub steps: u64,
}

impl<'p> Machine<'p> {
    pub fn new(program: &'p Program) -> Self {
        let mut memory = vec![0; MEMORY_SIZE];
        let start = DATA_BASE as usize;
        memory[start..start + program.data.len()].copy_from_slice(&program.data);
        let mut regs = [0; 16];
        regs[RSP] = MEMORY_SIZE as u64 - 64;
        Self {
            program,
            regs,
            memory,
            compared: (0, 0),
            rip: 0,
            stdout: String::new(),
            steps: 0,
        }
    }

    pub fn run(&mut self, entry: &str) -> Result<(), String> {
        self.rip = self.jump_target(entry)?;
        self.push(RETURN_SENTINEL)?;
        loop {
            if self.steps >= STEP_LIMIT {
                return Err("step limit exceeded".to_string());
            }
            self.steps += 1;
            let program = self.program;
            let instruction = program
                .code
                .get(self.rip)
                .ok_or_else(|| format!("fell off the end of the code at {}", self.rip))?;
            self.rip += 1;
            if !self
                .step(instruction)
                .map_err(|err| format!("{} (at `{}`)", err, instruction.text))?
            {
                return Ok(());
            }
        }
    }

    fn jump_target(&self, label: &str) -> Result<usize, String> {
        self.program
            .labels
            .get(label)
            .copied()
            .ok_or_else(|| format!("undefined label `{}`", label))
    }

    fn reg(&self, index: usize, width: u8) -> u64 {
        self.regs[index] & mask(width)
    }

    fn set_reg(&mut self, index: usize, width: u8, value: u64) {
        self.regs[index] = match width {
            8 => value,
            4 => value & mask(4),
            w => (self.regs[index] & !mask(w)) | (value & mask(w)),
        };
    }

    fn address(&self, arg: &Arg) -> Result<u64, String> {
        match arg {
            Arg::Mem {
                base, disp, index, ..
            } => {
                let mut address = self.regs[*base].wrapping_add(*disp as u64);
                if let Some((reg, scale)) = index {
                    address = address.wrapping_add(self.regs[*reg].wrapping_mul(*scale as u64));
                }
                Ok(address)
            }
            other => Err(format!("{:?} is not a memory operand", other)),
        }
    }

    fn load(&self, address: u64, width: u8) -> Result<u64, String> {
        let start = address as usize;
        let bytes = self
            .memory
            .get(start..start + width as usize)
            .ok_or_else(|| format!("load outside memory at {:#x}", address))?;
        let mut buf = [0u8; 8];
        buf[..width as usize].copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    fn store(&mut self, address: u64, width: u8, value: u64) -> Result<(), String> {
        let start = address as usize;
        if start < DATA_BASE as usize + self.program.data.len() {
            return Err(format!("store into code or data at {:#x}", address));
        }
        let bytes = self
            .memory
            .get_mut(start..start + width as usize)
            .ok_or_else(|| format!("store outside memory at {:#x}", address))?;
        bytes.copy_from_slice(&value.to_le_bytes()[..width as usize]);
        Ok(())
    }

    fn read(&self, arg: &Arg, width: u8) -> Result<u64, String> {
        match arg {
            Arg::Reg(index, _) => Ok(self.reg(*index, width)),
            Arg::Imm(value) => Ok(*value as u64 & mask(width)),
            Arg::Mem { .. } => self.load(self.address(arg)?, width),
            Arg::Label(name) => self
                .program
                .data_labels
                .get(name)
                .copied()
                .ok_or_else(|| format!("undefined data label `{}`", name)),
            Arg::Target(index) => Ok(*index as u64),
        }
    }

    fn write(&mut self, arg: &Arg, width: u8, value: u64) -> Result<(), String> {
        match arg {
            Arg::Reg(index, _) => {
                self.set_reg(*index, width, value);
                Ok(())
            }
            Arg::Mem { .. } => {
                let address = self.address(arg)?;
                self.store(address, width, value)
            }
            other => Err(format!("cannot write to {:?}", other)),
        }
    }

    fn push(&mut self, value: u64) -> Result<(), String> {
        self.regs[RSP] = self.regs[RSP].wrapping_sub(8);
        self.store(self.regs[RSP], 8, value)
    }

    fn pop(&mut self) -> Result<u64, String> {
        let value = self.load(self.regs[RSP], 8)?;
        self.regs[RSP] = self.regs[RSP].wrapping_add(8);
        Ok(value)
    }

    fn arg<'i>(instruction: &'i Instruction, i: usize) -> Result<&'i Arg, String> {
        instruction
            .args
            .get(i)
            .ok_or_else(|| format!("missing operand {}", i))
    }

    /// Width of a two-operand instruction.
    fn width(instruction: &Instruction) -> Result<u8, String> {
        instruction
            .args
            .iter()
            .find_map(Arg::width)
            .ok_or_else(|| "operand size unknown".to_string())
    }

    /// Execute one instruction; `false` once `main` has returned.
    fn step(&mut self, instruction: &Instruction) -> Result<bool, String> {
        match instruction.op {
            Op::Mov => {
                let width = match (Self::arg(instruction, 0)?, Self::arg(instruction, 1)?) {
                    (_, Arg::Label(_)) => 8,
                    _ => Self::width(instruction)?,
                };
                let value = self.read(Self::arg(instruction, 1)?, width)?;
                self.write(Self::arg(instruction, 0)?, width, value)?;
            }
            Op::Movsx => {
                let src = Self::arg(instruction, 1)?;
                let width = src.width().ok_or("movsx source size unknown")?;
                let value = sign_extend(self.read(src, width)?, width);
                let target = Self::arg(instruction, 0)?.width().ok_or("movsx target size unknown")?;
                self.write(Self::arg(instruction, 0)?, target, value as u64)?;
            }
            Op::Lea => {
                let address = self.address(Self::arg(instruction, 1)?)?;
                self.write(Self::arg(instruction, 0)?, 8, address)?;
            }
            Op::Add | Op::Sub | Op::Cmp => {
                let width = Self::width(instruction)?;
                let left = self.read(Self::arg(instruction, 0)?, width)?;
                let right = self.read(Self::arg(instruction, 1)?, width)?;
                match instruction.op {
                    Op::Add => self.write(Self::arg(instruction, 0)?, width, left.wrapping_add(right))?,
                    Op::Sub => self.write(Self::arg(instruction, 0)?, width, left.wrapping_sub(right))?,
                    _ => self.compared = (sign_extend(left, width), sign_extend(right, width)),
                }
            }
            Op::Imul => {
                let width = Self::width(instruction)?;
                let (left, right) = match instruction.args.len() {
                    3 => (Self::arg(instruction, 1)?, Self::arg(instruction, 2)?),
                    _ => (Self::arg(instruction, 0)?, Self::arg(instruction, 1)?),
                };
                let product = sign_extend(self.read(left, width)?, width)
                    .wrapping_mul(sign_extend(self.read(right, width)?, width));
                self.write(Self::arg(instruction, 0)?, width, product as u64)?;
            }
            Op::Idiv => {
                let width = Self::width(instruction)?;
                let divisor = sign_extend(self.read(Self::arg(instruction, 0)?, width)?, width) as i128;
                if divisor == 0 {
                    return Err("division by zero".to_string());
                }
                let bits = width as u32 * 8;
                let (high, low) = match width {
                    1 => (self.reg(RAX, 2) >> 8, self.reg(RAX, 1)),
                    w => (self.reg(RDX, w), self.reg(RAX, w)),
                };
                let dividend = ((sign_extend(high, width) as i128) << bits) | low as i128;
                let quotient = (dividend / divisor) as u64;
                let remainder = (dividend % divisor) as u64;
                match width {
                    1 => {
                        let ax = ((remainder & 0xff) << 8) | (quotient & 0xff);
                        self.set_reg(RAX, 2, ax);
                    }
                    w => {
                        self.set_reg(RAX, w, quotient);
                        self.set_reg(RDX, w, remainder);
                    }
                }
            }
            Op::Neg | Op::Inc | Op::Dec => {
                let width = Self::width(instruction)?;
                let value = self.read(Self::arg(instruction, 0)?, width)?;
                let result = match instruction.op {
                    Op::Neg => 0u64.wrapping_sub(value),
                    Op::Inc => value.wrapping_add(1),
                    _ => value.wrapping_sub(1),
                };
                self.write(Self::arg(instruction, 0)?, width, result)?;
            }
            Op::Sal => {
                let width = Self::width(instruction)?;
                let shift = self.read(Self::arg(instruction, 1)?, 1)? as u32;
                let value = self.read(Self::arg(instruction, 0)?, width)?;
                self.write(Self::arg(instruction, 0)?, width, value << shift)?;
            }
            Op::Cbw => {
                let value = sign_extend(self.reg(RAX, 1), 1);
                self.set_reg(RAX, 2, value as u64);
            }
            Op::Cwd | Op::Cdq | Op::Cqo => {
                let width = match instruction.op {
                    Op::Cwd => 2,
                    Op::Cdq => 4,
                    _ => 8,
                };
                let high = if sign_extend(self.reg(RAX, width), width) < 0 {
                    u64::MAX
                } else {
                    0
                };
                self.set_reg(RDX, width, high);
            }
            Op::Push => {
                let value = self.read(Self::arg(instruction, 0)?, 8)?;
                self.push(value)?;
            }
            Op::Pop => {
                let value = self.pop()?;
                self.write(Self::arg(instruction, 0)?, 8, value)?;
            }
            Op::Call => match Self::arg(instruction, 0)? {
                Arg::Target(target) => {
                    self.push(self.rip as u64)?;
                    self.rip = *target;
                }
                Arg::Label(name) => {
                    if !self.builtin(name)? {
                        return Err(format!("call to undefined function `{}`", name));
                    }
                    for reg in CALLER_SAVED {
                        if reg != RAX {
                            self.regs[reg] = CLOBBER;
                        }
                    }
                }
                other => return Err(format!("indirect call through {:?}", other)),
            },
            Op::Ret => {
                let target = self.pop()?;
                if target == RETURN_SENTINEL {
                    return Ok(false);
                }
                self.rip = target as usize;
            }
            Op::Leave => {
                self.regs[RSP] = self.regs[RBP];
                self.regs[RBP] = self.pop()?;
            }
            Op::Jmp | Op::J(_) => {
                let Arg::Target(target) = Self::arg(instruction, 0)? else {
                    return Err("unlinked jump".to_string());
                };
                let (left, right) = self.compared;
                let taken = match instruction.op {
                    Op::J(Cond::E) => left == right,
                    Op::J(Cond::Ne) => left != right,
                    Op::J(Cond::L) => left < right,
                    Op::J(Cond::Le) => left <= right,
                    Op::J(Cond::G) => left > right,
                    Op::J(Cond::Ge) => left >= right,
                    _ => true,
                };
                if taken {
                    self.rip = *target;
                }
            }
        }
        Ok(true)
    }

    /// Run a library function; `false` if `name` is not one.
    fn builtin(&mut self, name: &str) -> Result<bool, String> {
        let printed = match name {
            "printI8" => format!("{}\n", sign_extend(self.reg(RDI, 1), 1)),
            "printI16" => format!("{}\n", sign_extend(self.reg(RDI, 2), 2)),
            "printI32" => format!("{}\n", sign_extend(self.reg(RDI, 4), 4)),
            "printI64" => format!("{}\n", self.regs[RDI] as i64),
            "printChar" => (self.reg(RDI, 1) as u8 as char).to_string(),
            "printPointer" => format!("{:#x}\n", self.regs[RDI]),
            "puts" => {
                let mut text = String::new();
                let mut address = self.regs[RDI];
                loop {
                    let byte = self.load(address, 1)? as u8;
                    if byte == 0 {
                        break;
                    }
                    text.push(byte as char);
                    address += 1;
                }
                text.push('\n');
                text
            }
            _ => return Ok(false),
        };
        self.stdout.push_str(&printed);
        self.regs[RAX] = CLOBBER;
        Ok(true)
    }
}
