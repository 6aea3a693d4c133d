//! Access Port registers for the AHB-AP memory access port: CSW, TAR, DRW,
//! IDR, BASE.

use bitfield::bitfield;

use super::Register;

/// Transfer size field of CSW, as the wire encodes it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DataSize {
    U8,
    U16,
    U32,
}

impl DataSize {
    fn bits(self) -> u8 {
        match self {
            DataSize::U8 => 0b000,
            DataSize::U16 => 0b001,
            DataSize::U32 => 0b010,
        }
    }

    fn from_bits(bits: u8) -> DataSize {
        match bits {
            0b000 => DataSize::U8,
            0b001 => DataSize::U16,
            _ => DataSize::U32,
        }
    }
}

bitfield! {
    #[derive(Clone)]
    pub struct Csw(u32);
    impl Debug;
    pub dbg_sw_enable, set_dbg_sw_enable: 31;
    pub prot, set_prot: 30, 28;
    pub cacheable, set_cacheable: 27;
    pub spiden, _: 23;
    pub u8, mode, set_mode: 7, 4;
    pub addr_inc, set_addr_inc: 5, 4;
    pub device_en, set_device_en: 6;
    pub u8, size_raw, set_size_raw: 2, 0;
}

impl Csw {
    pub fn size(&self) -> DataSize {
        DataSize::from_bits(self.size_raw())
    }

    pub fn set_size(&mut self, size: DataSize) {
        self.set_size_raw(size.bits());
    }

    /// The conservative, widely-supported configuration: byte lane masking
    /// off, auto-increment single, word size, privileged debug access.
    pub fn for_word_access() -> Csw {
        let mut csw = Csw(0);
        csw.set_dbg_sw_enable(true);
        csw.set_addr_inc(0b01);
        csw.set_size(DataSize::U32);
        csw
    }
}

impl Default for Csw {
    fn default() -> Self {
        Csw::for_word_access()
    }
}

impl From<u32> for Csw {
    fn from(raw: u32) -> Self {
        Csw(raw)
    }
}

impl From<Csw> for u32 {
    fn from(raw: Csw) -> Self {
        raw.0
    }
}

impl Register for Csw {
    const ADDRESS: u8 = 0x00;
    const NAME: &'static str = "CSW";
}

bitfield! {
    #[derive(Clone)]
    pub struct Tar(u32);
    impl Debug;
    pub u32, address, set_address: 31, 0;
}

impl Default for Tar {
    fn default() -> Self {
        Tar(0)
    }
}

impl From<u32> for Tar {
    fn from(raw: u32) -> Self {
        Tar(raw)
    }
}

impl From<Tar> for u32 {
    fn from(raw: Tar) -> Self {
        raw.0
    }
}

impl Register for Tar {
    const ADDRESS: u8 = 0x04;
    const NAME: &'static str = "TAR";
}

bitfield! {
    #[derive(Clone)]
    pub struct Drw(u32);
    impl Debug;
    pub u32, data, set_data: 31, 0;
}

impl Default for Drw {
    fn default() -> Self {
        Drw(0)
    }
}

impl From<u32> for Drw {
    fn from(raw: u32) -> Self {
        Drw(raw)
    }
}

impl From<Drw> for u32 {
    fn from(raw: Drw) -> Self {
        raw.0
    }
}

impl Register for Drw {
    const ADDRESS: u8 = 0x0C;
    const NAME: &'static str = "DRW";
}

bitfield! {
    #[derive(Clone)]
    pub struct Idr(u32);
    impl Debug;
    pub u8, revision, _: 31, 28;
    pub u16, designer, _: 27, 17;
    pub class, _: 16, 13;
    pub u8, variant, _: 7, 4;
    pub u8, ap_type, _: 3, 0;
}

impl From<u32> for Idr {
    fn from(raw: u32) -> Self {
        Idr(raw)
    }
}

impl From<Idr> for u32 {
    fn from(raw: Idr) -> Self {
        raw.0
    }
}

impl Register for Idr {
    const ADDRESS: u8 = 0xFC;
    const NAME: &'static str = "IDR";
}

bitfield! {
    #[derive(Clone)]
    pub struct Base(u32);
    impl Debug;
    pub u32, base_address, _: 31, 12;
    pub format_adiv5, _: 1;
    pub present, _: 0;
}

impl From<u32> for Base {
    fn from(raw: u32) -> Self {
        Base(raw)
    }
}

impl From<Base> for u32 {
    fn from(raw: Base) -> Self {
        raw.0
    }
}

impl Register for Base {
    const ADDRESS: u8 = 0xF8;
    const NAME: &'static str = "BASE";
}
