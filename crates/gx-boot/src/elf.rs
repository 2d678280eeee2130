//! ELF executable parser (32-bit big-endian PowerPC)

use crate::executable::{in_mem1, in_mem2, ExecutableReader};
use crate::symbols::SymbolIndex;
use gx_core::error::LoaderError;
use gx_core::Result;
use gx_memory::MemoryManager;
use std::sync::Arc;
use tracing::{debug, info};

/// ELF magic bytes
pub const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];

/// The PowerPC machine type
const EM_PPC: u16 = 20;

/// ELF file header (32-bit)
#[derive(Debug, Clone, Copy, Default)]
pub struct Elf32Header {
    pub e_ident: [u8; 16],
    pub e_type: u16,
    pub e_machine: u16,
    pub e_version: u32,
    pub e_entry: u32,
    pub e_phoff: u32,
    pub e_shoff: u32,
    pub e_flags: u32,
    pub e_ehsize: u16,
    pub e_phentsize: u16,
    pub e_phnum: u16,
    pub e_shentsize: u16,
    pub e_shnum: u16,
    pub e_shstrndx: u16,
}

/// ELF program header (32-bit)
#[derive(Debug, Clone, Copy, Default)]
pub struct Elf32Phdr {
    pub p_type: u32,
    pub p_offset: u32,
    pub p_vaddr: u32,
    pub p_paddr: u32,
    pub p_filesz: u32,
    pub p_memsz: u32,
    pub p_flags: u32,
    pub p_align: u32,
}

/// ELF section header (32-bit)
#[derive(Debug, Clone, Copy, Default)]
pub struct Elf32Shdr {
    pub sh_name: u32,
    pub sh_type: u32,
    pub sh_flags: u32,
    pub sh_addr: u32,
    pub sh_offset: u32,
    pub sh_size: u32,
    pub sh_link: u32,
    pub sh_info: u32,
    pub sh_addralign: u32,
    pub sh_entsize: u32,
}

/// Program header types
pub mod pt {
    pub const NULL: u32 = 0;
    pub const LOAD: u32 = 1;
    pub const NOTE: u32 = 4;
}

/// Section header types
pub mod sht {
    pub const SYMTAB: u32 = 2;
    pub const STRTAB: u32 = 3;
    pub const DYNSYM: u32 = 11;
}

/// Symbol type for functions (low nibble of st_info)
const STT_FUNC: u8 = 2;

fn be16(bytes: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([bytes[at], bytes[at + 1]])
}

fn be32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// ELF executable
pub struct ElfExecutable {
    bytes: Vec<u8>,
    header: Elf32Header,
    phdrs: Vec<Elf32Phdr>,
    shdrs: Vec<Elf32Shdr>,
    wii: bool,
}

impl ElfExecutable {
    pub fn new(bytes: Vec<u8>) -> std::result::Result<Self, LoaderError> {
        let header = Self::parse_header(&bytes)?;
        let phdrs = Self::parse_phdrs(&bytes, &header)?;
        let shdrs = Self::parse_shdrs(&bytes, &header);

        let wii = phdrs
            .iter()
            .filter(|p| p.p_type == pt::LOAD && p.p_filesz > 0)
            .any(|p| in_mem2(p.p_vaddr, 1))
            || in_mem2(header.e_entry, 1);

        info!(
            "ELF parsed: entry=0x{:08x}, phdrs={}, shdrs={}, {}",
            header.e_entry,
            phdrs.len(),
            shdrs.len(),
            if wii { "Wii" } else { "GC" }
        );

        Ok(Self {
            bytes,
            header,
            phdrs,
            shdrs,
            wii,
        })
    }

    fn parse_header(bytes: &[u8]) -> std::result::Result<Elf32Header, LoaderError> {
        if bytes.len() < 52 {
            return Err(LoaderError::InvalidElf(format!(
                "file too small for an ELF32 header: {} bytes",
                bytes.len()
            )));
        }

        let mut header = Elf32Header::default();
        header.e_ident.copy_from_slice(&bytes[0..16]);

        if header.e_ident[0..4] != ELF_MAGIC {
            return Err(LoaderError::InvalidElf("bad magic bytes".to_string()));
        }
        // ELFCLASS32
        if header.e_ident[4] != 1 {
            return Err(LoaderError::InvalidElf(format!(
                "not a 32-bit ELF (class={})",
                header.e_ident[4]
            )));
        }
        // ELFDATA2MSB: the console CPU is big-endian
        if header.e_ident[5] != 2 {
            return Err(LoaderError::InvalidElf(format!(
                "not big-endian (encoding={})",
                header.e_ident[5]
            )));
        }

        header.e_type = be16(bytes, 16);
        header.e_machine = be16(bytes, 18);
        header.e_version = be32(bytes, 20);
        header.e_entry = be32(bytes, 24);
        header.e_phoff = be32(bytes, 28);
        header.e_shoff = be32(bytes, 32);
        header.e_flags = be32(bytes, 36);
        header.e_ehsize = be16(bytes, 40);
        header.e_phentsize = be16(bytes, 42);
        header.e_phnum = be16(bytes, 44);
        header.e_shentsize = be16(bytes, 46);
        header.e_shnum = be16(bytes, 48);
        header.e_shstrndx = be16(bytes, 50);

        if header.e_machine != EM_PPC {
            return Err(LoaderError::InvalidElf(format!(
                "machine type {} is not PowerPC",
                header.e_machine
            )));
        }

        Ok(header)
    }

    fn parse_phdrs(
        bytes: &[u8],
        header: &Elf32Header,
    ) -> std::result::Result<Vec<Elf32Phdr>, LoaderError> {
        let table_end =
            header.e_phoff as u64 + header.e_phnum as u64 * header.e_phentsize as u64;
        if header.e_phnum > 0 && (header.e_phentsize < 32 || table_end > bytes.len() as u64) {
            return Err(LoaderError::InvalidElf(format!(
                "program header table ends at 0x{:x} but file is {} bytes",
                table_end,
                bytes.len()
            )));
        }

        let mut phdrs = Vec::with_capacity(header.e_phnum as usize);
        for i in 0..header.e_phnum as usize {
            let at = header.e_phoff as usize + i * header.e_phentsize as usize;
            let phdr = Elf32Phdr {
                p_type: be32(bytes, at),
                p_offset: be32(bytes, at + 4),
                p_vaddr: be32(bytes, at + 8),
                p_paddr: be32(bytes, at + 12),
                p_filesz: be32(bytes, at + 16),
                p_memsz: be32(bytes, at + 20),
                p_flags: be32(bytes, at + 24),
                p_align: be32(bytes, at + 28),
            };

            if phdr.p_type == pt::LOAD {
                let seg_end = phdr.p_offset as u64 + phdr.p_filesz as u64;
                if seg_end > bytes.len() as u64 {
                    return Err(LoaderError::InvalidElf(format!(
                        "segment {} data ends at 0x{:x} but file is {} bytes",
                        i,
                        seg_end,
                        bytes.len()
                    )));
                }
            }
            phdrs.push(phdr);
        }
        Ok(phdrs)
    }

    /// Section headers are optional for execution; anything out of bounds
    /// just disables the symbol harvest.
    fn parse_shdrs(bytes: &[u8], header: &Elf32Header) -> Vec<Elf32Shdr> {
        if header.e_shoff == 0 || header.e_shnum == 0 || header.e_shentsize < 40 {
            return Vec::new();
        }
        let table_end =
            header.e_shoff as u64 + header.e_shnum as u64 * header.e_shentsize as u64;
        if table_end > bytes.len() as u64 {
            debug!("Section header table out of bounds, skipping");
            return Vec::new();
        }

        (0..header.e_shnum as usize)
            .map(|i| {
                let at = header.e_shoff as usize + i * header.e_shentsize as usize;
                Elf32Shdr {
                    sh_name: be32(bytes, at),
                    sh_type: be32(bytes, at + 4),
                    sh_flags: be32(bytes, at + 8),
                    sh_addr: be32(bytes, at + 12),
                    sh_offset: be32(bytes, at + 16),
                    sh_size: be32(bytes, at + 20),
                    sh_link: be32(bytes, at + 24),
                    sh_info: be32(bytes, at + 28),
                    sh_addralign: be32(bytes, at + 32),
                    sh_entsize: be32(bytes, at + 36),
                }
            })
            .collect()
    }

    fn section_bytes(&self, shdr: &Elf32Shdr) -> Option<&[u8]> {
        let start = shdr.sh_offset as usize;
        let end = start.checked_add(shdr.sh_size as usize)?;
        self.bytes.get(start..end)
    }
}

impl ExecutableReader for ElfExecutable {
    fn entry_point(&self) -> u32 {
        self.header.e_entry
    }

    fn is_valid(&self) -> bool {
        // Construction already validated magic, class, and machine
        true
    }

    fn is_wii(&self) -> bool {
        self.wii
    }

    fn load_into_memory(&self, memory: &Arc<MemoryManager>, only_in_mem1: bool) -> Result<()> {
        for (i, phdr) in self.phdrs.iter().enumerate() {
            if phdr.p_type != pt::LOAD || phdr.p_memsz == 0 {
                continue;
            }
            let target = phdr.p_vaddr;
            if only_in_mem1 && !in_mem1(target, phdr.p_memsz) {
                debug!(
                    "Skipping segment {} at 0x{:08x}: outside MEM1 on a constrained boot",
                    i, target
                );
                continue;
            }

            debug!(
                "Loading segment {}: vaddr=0x{:08x}, filesz=0x{:x}, memsz=0x{:x}",
                i, target, phdr.p_filesz, phdr.p_memsz
            );

            if phdr.p_filesz > 0 {
                let data = &self.bytes
                    [phdr.p_offset as usize..(phdr.p_offset + phdr.p_filesz) as usize];
                memory.write_bytes(target, data)?;
            }
            if phdr.p_memsz > phdr.p_filesz {
                memory.clear_range(target + phdr.p_filesz, phdr.p_memsz - phdr.p_filesz)?;
            }
        }
        Ok(())
    }

    fn load_symbols(&self, index: &mut SymbolIndex) -> bool {
        let symtab = match self
            .shdrs
            .iter()
            .find(|sh| sh.sh_type == sht::SYMTAB || sh.sh_type == sht::DYNSYM)
        {
            Some(sh) => sh,
            None => {
                debug!("No symbol table present");
                return false;
            }
        };
        let strtab = match self
            .shdrs
            .get(symtab.sh_link as usize)
            .filter(|sh| sh.sh_type == sht::STRTAB)
        {
            Some(sh) => sh,
            None => return false,
        };

        let (symbols, strings) = match (self.section_bytes(symtab), self.section_bytes(strtab)) {
            (Some(sy), Some(st)) => (sy, st),
            _ => return false,
        };

        let mut added = 0usize;
        for entry in symbols.chunks_exact(16) {
            let st_name = be32(entry, 0) as usize;
            let st_value = be32(entry, 4);
            let st_size = be32(entry, 8);
            let st_info = entry[12];

            if st_info & 0xF != STT_FUNC || st_value == 0 {
                continue;
            }
            let name_end = strings[st_name.min(strings.len())..]
                .iter()
                .position(|&b| b == 0)
                .map(|p| st_name + p)
                .unwrap_or(strings.len());
            let name = match strings.get(st_name..name_end) {
                Some(raw) if !raw.is_empty() => String::from_utf8_lossy(raw).to_string(),
                _ => continue,
            };

            index.add(name, st_value, st_size);
            added += 1;
        }

        info!("Harvested {} function symbols", added);
        added > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hand-assembled ELF32 with one loadable segment, a symtab with one
    /// function symbol, and its string table.
    pub(crate) fn make_elf(entry: u32, vaddr: u32) -> Vec<u8> {
        let mut elf = vec![0u8; 0x400];

        // e_ident
        elf[0..4].copy_from_slice(&ELF_MAGIC);
        elf[4] = 1; // ELFCLASS32
        elf[5] = 2; // big-endian
        elf[6] = 1; // version

        let put16 = |b: &mut [u8], at: usize, v: u16| b[at..at + 2].copy_from_slice(&v.to_be_bytes());
        let put32 = |b: &mut [u8], at: usize, v: u32| b[at..at + 4].copy_from_slice(&v.to_be_bytes());

        put16(&mut elf, 16, 2); // ET_EXEC
        put16(&mut elf, 18, EM_PPC);
        put32(&mut elf, 24, entry);
        put32(&mut elf, 28, 0x34); // phoff
        put32(&mut elf, 32, 0x60); // shoff
        put16(&mut elf, 42, 32); // phentsize
        put16(&mut elf, 44, 1); // phnum
        put16(&mut elf, 46, 40); // shentsize
        put16(&mut elf, 48, 3); // shnum: null, symtab, strtab

        // Program header: 0x40 bytes of data at file offset 0x200
        put32(&mut elf, 0x34, pt::LOAD);
        put32(&mut elf, 0x38, 0x200); // offset
        put32(&mut elf, 0x3C, vaddr);
        put32(&mut elf, 0x40, vaddr);
        put32(&mut elf, 0x44, 0x40); // filesz
        put32(&mut elf, 0x48, 0x80); // memsz (trailing bss)
        put32(&mut elf, 0x4C, 5); // flags r-x

        // Section headers start at 0x60; entry 0 stays null
        // symtab at index 1: one null entry + one function symbol, at 0x280
        let sh1 = 0x60 + 40;
        put32(&mut elf, sh1 + 4, sht::SYMTAB);
        put32(&mut elf, sh1 + 16, 0x280); // offset
        put32(&mut elf, sh1 + 20, 32); // two 16-byte entries
        put32(&mut elf, sh1 + 24, 2); // strtab link
        put32(&mut elf, sh1 + 36, 16); // entsize

        // strtab at index 2: "\0main\0" at 0x2C0
        let sh2 = 0x60 + 80;
        put32(&mut elf, sh2 + 4, sht::STRTAB);
        put32(&mut elf, sh2 + 16, 0x2C0);
        put32(&mut elf, sh2 + 20, 6);

        // Segment payload
        for b in &mut elf[0x200..0x240] {
            *b = 0xCC;
        }

        // Symbol 1: name offset 1, value = entry, size 0x20, STT_FUNC
        put32(&mut elf, 0x290, 1);
        put32(&mut elf, 0x294, entry);
        put32(&mut elf, 0x298, 0x20);
        elf[0x29C] = STT_FUNC;

        elf[0x2C0] = 0;
        elf[0x2C1..0x2C5].copy_from_slice(b"main");
        elf[0x2C5] = 0;

        elf
    }

    #[test]
    fn test_parse_and_load() {
        let elf = ElfExecutable::new(make_elf(0x8000_4000, 0x8000_4000)).unwrap();
        assert!(elf.is_valid());
        assert!(!elf.is_wii());
        assert_eq!(elf.entry_point(), 0x8000_4000);

        let memory = MemoryManager::new();
        elf.load_into_memory(&memory, false).unwrap();
        assert_eq!(memory.read_u8(0x8000_4000).unwrap(), 0xCC);
        // bss tail is zero
        assert_eq!(memory.read_u8(0x8000_4040).unwrap(), 0x00);
    }

    #[test]
    fn test_mem2_segment_marks_wii() {
        let elf = ElfExecutable::new(make_elf(0x9000_0100, 0x9000_0100)).unwrap();
        assert!(elf.is_wii());
    }

    #[test]
    fn test_reject_wrong_machine() {
        let mut bytes = make_elf(0x8000_4000, 0x8000_4000);
        bytes[18..20].copy_from_slice(&62u16.to_be_bytes()); // x86-64
        assert!(matches!(
            ElfExecutable::new(bytes),
            Err(LoaderError::InvalidElf(_))
        ));
    }

    #[test]
    fn test_reject_little_endian() {
        let mut bytes = make_elf(0x8000_4000, 0x8000_4000);
        bytes[5] = 1;
        assert!(matches!(
            ElfExecutable::new(bytes),
            Err(LoaderError::InvalidElf(_))
        ));
    }

    #[test]
    fn test_reject_truncated_segment() {
        let mut bytes = make_elf(0x8000_4000, 0x8000_4000);
        bytes.truncate(0x210);
        assert!(matches!(
            ElfExecutable::new(bytes),
            Err(LoaderError::InvalidElf(_))
        ));
    }

    #[test]
    fn test_symbol_harvest() {
        let elf = ElfExecutable::new(make_elf(0x8000_4000, 0x8000_4000)).unwrap();
        let mut index = SymbolIndex::new();
        assert!(elf.load_symbols(&mut index));
        let main = index.lookup("main").unwrap();
        assert_eq!(main.address, 0x8000_4000);
        assert_eq!(main.size, 0x20);
    }
}
