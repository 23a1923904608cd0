use std::fmt;

/// Access width of a register view or memory operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Width {
    Byte,
    Word,
    Dword,
    Qword,
}

impl Width {
    pub const fn bytes(self) -> usize {
        match self {
            Width::Byte => 1,
            Width::Word => 2,
            Width::Dword => 4,
            Width::Qword => 8,
        }
    }

    pub const fn mask(self) -> u64 {
        match self {
            Width::Byte => 0xFF,
            Width::Word => 0xFFFF,
            Width::Dword => 0xFFFF_FFFF,
            Width::Qword => u64::MAX,
        }
    }

    pub const fn sign_bit(self) -> u64 {
        1 << (self.bytes() * 8 - 1)
    }

    pub fn from_keyword(keyword: &str) -> Option<Width> {
        match keyword {
            "byte" => Some(Width::Byte),
            "word" => Some(Width::Word),
            "dword" => Some(Width::Dword),
            "qword" => Some(Width::Qword),
            _ => None,
        }
    }

    pub const fn keyword(self) -> &'static str {
        match self {
            Width::Byte => "byte",
            Width::Word => "word",
            Width::Dword => "dword",
            Width::Qword => "qword",
        }
    }
}

macro_rules! registers {
    ($($variant:ident => $name:literal,)*) => {
        /// Every 64-bit register slot of the virtual CPU. Flags are stored as
        /// full registers holding 0 or 1.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum RegisterId {
            $($variant,)*
        }

        impl RegisterId {
            pub const ALL: &'static [RegisterId] = &[$(RegisterId::$variant,)*];

            pub const fn name(self) -> &'static str {
                match self {
                    $(RegisterId::$variant => $name,)*
                }
            }

            pub fn from_name(name: &str) -> Option<RegisterId> {
                match name {
                    $($name => Some(RegisterId::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

registers! {
    Rdi => "rdi",
    Rsi => "rsi",
    Rsp => "rsp",
    Rbp => "rbp",
    Rax => "rax",
    Rbx => "rbx",
    Rcx => "rcx",
    Rdx => "rdx",
    Rip => "rip",
    R8 => "r8",
    R9 => "r9",
    R10 => "r10",
    R11 => "r11",
    R12 => "r12",
    R13 => "r13",
    R14 => "r14",
    R15 => "r15",
    Cs => "cs",
    Ds => "ds",
    Fs => "fs",
    Ss => "ss",
    Es => "es",
    Gs => "gs",
    Cf => "cf",
    Zf => "zf",
    Pf => "pf",
    Af => "af",
    Sf => "sf",
    Tf => "tf",
    If => "if",
    Df => "df",
    Of => "of",
    Rflags => "rflags",
}

impl fmt::Display for RegisterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// Sub-width views onto a parent register.
const ALIASES: &[(&str, RegisterId, Width)] = &[
    ("edi", RegisterId::Rdi, Width::Dword),
    ("esi", RegisterId::Rsi, Width::Dword),
    ("esp", RegisterId::Rsp, Width::Dword),
    ("ebp", RegisterId::Rbp, Width::Dword),
    ("eax", RegisterId::Rax, Width::Dword),
    ("ebx", RegisterId::Rbx, Width::Dword),
    ("ecx", RegisterId::Rcx, Width::Dword),
    ("edx", RegisterId::Rdx, Width::Dword),
    ("eip", RegisterId::Rip, Width::Dword),
    ("eflags", RegisterId::Rflags, Width::Dword),
    ("r8d", RegisterId::R8, Width::Dword),
    ("r9d", RegisterId::R9, Width::Dword),
    ("r10d", RegisterId::R10, Width::Dword),
    ("r11d", RegisterId::R11, Width::Dword),
    ("r12d", RegisterId::R12, Width::Dword),
    ("r13d", RegisterId::R13, Width::Dword),
    ("r14d", RegisterId::R14, Width::Dword),
    ("r15d", RegisterId::R15, Width::Dword),
    ("ax", RegisterId::Rax, Width::Word),
    ("bx", RegisterId::Rbx, Width::Word),
    ("cx", RegisterId::Rcx, Width::Word),
    ("dx", RegisterId::Rdx, Width::Word),
    ("si", RegisterId::Rsi, Width::Word),
    ("di", RegisterId::Rdi, Width::Word),
    ("sp", RegisterId::Rsp, Width::Word),
    ("bp", RegisterId::Rbp, Width::Word),
    ("ip", RegisterId::Rip, Width::Word),
    ("flags", RegisterId::Rflags, Width::Word),
    ("r8w", RegisterId::R8, Width::Word),
    ("r9w", RegisterId::R9, Width::Word),
    ("r10w", RegisterId::R10, Width::Word),
    ("r11w", RegisterId::R11, Width::Word),
    ("r12w", RegisterId::R12, Width::Word),
    ("r13w", RegisterId::R13, Width::Word),
    ("r14w", RegisterId::R14, Width::Word),
    ("r15w", RegisterId::R15, Width::Word),
    ("al", RegisterId::Rax, Width::Byte),
    ("bl", RegisterId::Rbx, Width::Byte),
    ("cl", RegisterId::Rcx, Width::Byte),
    ("dl", RegisterId::Rdx, Width::Byte),
    ("sil", RegisterId::Rsi, Width::Byte),
    ("dil", RegisterId::Rdi, Width::Byte),
    ("spl", RegisterId::Rsp, Width::Byte),
    ("bpl", RegisterId::Rbp, Width::Byte),
    ("r8b", RegisterId::R8, Width::Byte),
    ("r9b", RegisterId::R9, Width::Byte),
    ("r10b", RegisterId::R10, Width::Byte),
    ("r11b", RegisterId::R11, Width::Byte),
    ("r12b", RegisterId::R12, Width::Byte),
    ("r13b", RegisterId::R13, Width::Byte),
    ("r14b", RegisterId::R14, Width::Byte),
    ("r15b", RegisterId::R15, Width::Byte),
];

/// A register operand: a parent register seen through a width.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RegisterRef {
    pub id: RegisterId,
    pub width: Width,
    name: &'static str,
}

impl RegisterRef {
    pub const fn full(id: RegisterId) -> Self {
        Self {
            id,
            width: Width::Qword,
            name: id.name(),
        }
    }

    /// Looks up a 64-bit name first, then the alias table. `name` must
    /// already be lowercase.
    pub fn lookup(name: &str) -> Option<RegisterRef> {
        if let Some(id) = RegisterId::from_name(name) {
            return Some(Self::full(id));
        }
        ALIASES
            .iter()
            .find(|(alias, _, _)| *alias == name)
            .map(|(alias, id, width)| RegisterRef {
                id: *id,
                width: *width,
                name: *alias,
            })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for RegisterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct RegisterFile {
    values: [u64; RegisterId::ALL.len()],
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RegisterFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for id in RegisterId::ALL {
            map.entry(&id.name(), &format_args!("0x{:016X}", self.get(*id)));
        }
        map.finish()
    }
}

impl RegisterFile {
    pub fn new() -> Self {
        RegisterFile {
            values: [0; RegisterId::ALL.len()],
        }
    }

    pub fn get(&self, id: RegisterId) -> u64 {
        self.values[id as usize]
    }

    pub fn set(&mut self, id: RegisterId, value: u64) {
        self.values[id as usize] = value;
    }

    /// Reads through a view: the parent's low bits, zero-extended.
    pub fn read(&self, reg: RegisterRef) -> u64 {
        self.get(reg.id) & reg.width.mask()
    }

    /// Writes through a view: the value is masked to the view's width and
    /// stored into the parent, clearing the bits above the mask.
    pub fn write(&mut self, reg: RegisterRef, value: u64) {
        self.set(reg.id, value & reg.width.mask());
    }

    pub fn flag(&self, id: RegisterId) -> bool {
        self.get(id) != 0
    }

    pub fn set_flag(&mut self, id: RegisterId, on: bool) {
        self.set(id, on as u64);
    }

    pub fn iter(&self) -> impl Iterator<Item = (RegisterId, u64)> + '_ {
        RegisterId::ALL.iter().map(|id| (*id, self.get(*id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_prefers_full_registers() {
        let rax = RegisterRef::lookup("rax").unwrap();
        assert_eq!(rax.id, RegisterId::Rax);
        assert_eq!(rax.width, Width::Qword);

        let eax = RegisterRef::lookup("eax").unwrap();
        assert_eq!(eax.id, RegisterId::Rax);
        assert_eq!(eax.width, Width::Dword);
        assert_eq!(eax.name(), "eax");

        let sil = RegisterRef::lookup("sil").unwrap();
        assert_eq!((sil.id, sil.width), (RegisterId::Rsi, Width::Byte));

        assert!(RegisterRef::lookup("xmm0").is_none());
    }

    #[test]
    fn every_register_name_round_trips() {
        for id in RegisterId::ALL {
            assert_eq!(RegisterId::from_name(id.name()), Some(*id));
        }
    }

    #[test]
    fn dword_view_masks_reads_and_writes() {
        let mut regs = RegisterFile::new();
        let rax = RegisterRef::full(RegisterId::Rax);
        let eax = RegisterRef::lookup("eax").unwrap();

        regs.write(eax, 0x1_0000_0001);
        assert_eq!(regs.read(eax), 0x0000_0001);
        assert_eq!(regs.read(rax), 0x0000_0001);

        regs.write(rax, 0xDEAD_BEEF_CAFE_F00D);
        assert_eq!(regs.read(eax), 0xCAFE_F00D);

        regs.write(eax, 0xFFFF_FFFF);
        assert_eq!(regs.read(rax), 0xFFFF_FFFF);
    }

    #[test]
    fn byte_and_word_views() {
        let mut regs = RegisterFile::new();
        let al = RegisterRef::lookup("al").unwrap();
        let ax = RegisterRef::lookup("ax").unwrap();
        regs.write(ax, 0x1234_5678);
        assert_eq!(regs.read(ax), 0x5678);
        assert_eq!(regs.read(al), 0x78);
        regs.write(al, 0x1FF);
        assert_eq!(regs.get(RegisterId::Rax), 0xFF);
    }

    #[test]
    fn width_masks_and_sign_bits() {
        assert_eq!(Width::Byte.sign_bit(), 0x80);
        assert_eq!(Width::Dword.sign_bit(), 0x8000_0000);
        assert_eq!(Width::Qword.sign_bit(), 1 << 63);
        assert_eq!(Width::Word.mask(), 0xFFFF);
        assert_eq!(Width::from_keyword("dword"), Some(Width::Dword));
        assert_eq!(Width::from_keyword("tbyte"), None);
    }
}
