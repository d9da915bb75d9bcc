//! Memory subsystem for 14-bit PIC parts
//!
//! Program memory holds 14-bit instruction words. The configuration space
//! sits above it at word address 0x2000:
//! - 0x2000 - 0x2003: User ID locations
//! - 0x2006: Device ID
//! - 0x2007: Configuration word 1
//! - 0x2008: Configuration word 2 (parts that have one)
//!
//! Data RAM (general purpose registers) is stored linearly; the bus maps
//! banked addresses onto it.

/// Address constants
pub mod addr {
    /// Start of configuration space (word address)
    pub const CONFIG_SPACE: u16 = 0x2000;
    /// Size of configuration space in words
    pub const CONFIG_SPACE_SIZE: usize = 0x10;
    /// Device ID location
    pub const DEVICE_ID: u16 = 0x2006;
    /// First configuration word
    pub const CONFIG1: u16 = 0x2007;
    /// Second configuration word
    pub const CONFIG2: u16 = 0x2008;
    /// Word mask for 14-bit cores
    pub const WORD_MASK: u16 = 0x3FFF;
}

/// Program flash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramMemory {
    /// Instruction words (erased = 0x3FFF)
    words: Vec<u16>,
    /// Configuration space 0x2000..0x2010
    config: [u16; addr::CONFIG_SPACE_SIZE],
}

impl ProgramMemory {
    /// Create erased program memory of `size` words
    pub fn new(size: usize, device_id: u16) -> Self {
        let mut config = [addr::WORD_MASK; addr::CONFIG_SPACE_SIZE];
        config[(addr::DEVICE_ID - addr::CONFIG_SPACE) as usize] = device_id;
        Self {
            words: vec![addr::WORD_MASK; size],
            config,
        }
    }

    /// Number of program words
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Fetch an instruction word. Addresses wrap at the memory size.
    #[inline]
    pub fn fetch(&self, pc: u16) -> u16 {
        if self.words.is_empty() {
            return addr::WORD_MASK;
        }
        self.words[pc as usize % self.words.len()]
    }

    /// Read program or configuration space; unimplemented reads 0
    pub fn read(&self, address: u16) -> u16 {
        if (address as usize) < self.words.len() {
            self.words[address as usize]
        } else if let Some(word) = self.config_index(address).map(|i| self.config[i]) {
            word
        } else {
            0
        }
    }

    /// Store a word, masked to 14 bits. Returns false outside memory.
    pub fn write(&mut self, address: u16, word: u16) -> bool {
        if (address as usize) < self.words.len() {
            self.words[address as usize] = word & addr::WORD_MASK;
            true
        } else if let Some(i) = self.config_index(address) {
            if address == addr::DEVICE_ID {
                return false;
            }
            self.config[i] = word & addr::WORD_MASK;
            true
        } else {
            false
        }
    }

    /// Erase `block` words starting at the block containing `address`
    pub fn erase_block(&mut self, address: u16, block: usize) {
        if block == 0 {
            return;
        }
        let start = (address as usize / block) * block;
        let end = (start + block).min(self.words.len());
        if start < end {
            self.words[start..end].fill(addr::WORD_MASK);
        }
    }

    /// Replace program words from address 0, padding with erased words
    pub fn load(&mut self, words: &[u16]) {
        for (i, slot) in self.words.iter_mut().enumerate() {
            *slot = words.get(i).map(|w| w & addr::WORD_MASK).unwrap_or(addr::WORD_MASK);
        }
    }

    pub fn config_word(&self, index: usize) -> u16 {
        self.read(addr::CONFIG1 + index as u16)
    }

    pub fn set_config_word(&mut self, index: usize, word: u16) {
        self.write(addr::CONFIG1 + index as u16, word);
    }

    pub fn words(&self) -> &[u16] {
        &self.words
    }

    fn config_index(&self, address: u16) -> Option<usize> {
        address
            .checked_sub(addr::CONFIG_SPACE)
            .map(usize::from)
            .filter(|i| *i < addr::CONFIG_SPACE_SIZE)
    }
}

/// General purpose register file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRam {
    data: Vec<u8>,
}

impl DataRam {
    pub fn new(size: usize) -> Self {
        Self { data: vec![0; size] }
    }

    #[inline]
    pub fn read(&self, index: usize) -> u8 {
        self.data.get(index).copied().unwrap_or(0)
    }

    #[inline]
    pub fn write(&mut self, index: usize, value: u8) {
        if let Some(cell) = self.data.get_mut(index) {
            *cell = value;
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// GPR contents are undefined at power-on; the simulator clears them
    pub fn reset(&mut self) {
        self.data.fill(0);
    }
}
