use packed_struct::prelude::*;

pub const ACN_PID: [u8; 12] = *b"ASC-E1.17\0\0\0";

pub const ROOT_LAYER_SIZE: usize = 22;
pub const FRAMING_TAIL_OFFSET: usize = 108;
pub const FRAMING_TAIL_SIZE: usize = 18;

/// First DMX slot after the start code. Anything shorter is not an E1.31
/// data packet.
pub const DMX_DATA_OFFSET: usize = FRAMING_TAIL_OFFSET + FRAMING_TAIL_SIZE;
pub const DMX_MAX_SLOTS: usize = 512;
pub const E131_MAX_PACKET_SIZE: usize = DMX_DATA_OFFSET + DMX_MAX_SLOTS;

pub const SACN_PORT: u16 = 5568;

const ROOT_VECTOR_DATA: u32 = 0x0000_0004;
const FRAMING_VECTOR_DATA: u32 = 0x0000_0002;
const DMP_VECTOR_SET_PROPERTY: u8 = 0x02;
const FLAGS: u16 = 0x7000;

// E1.31 Root Layer:
// Byte #  | Definition
// 0..=1   | Preamble size (0x0010)
// 2..=3   | Postamble size (0x0000)
// 4..=15  | ACN packet identifier "ASC-E1.17\0\0\0"
// 16..=17 | Flags and length
// 18..=21 | Vector (VECTOR_ROOT_E131_DATA)
#[derive(PackedStruct, Default, Debug, PartialEq, Clone)]
#[packed_struct(bit_numbering = "msb0", size = "22")]
pub struct RootLayerPack {
    #[packed_field(bytes = "0..=1", endian = "msb")]
    pub preamble_size: u16,
    #[packed_field(bytes = "2..=3", endian = "msb")]
    pub postamble_size: u16,
    #[packed_field(bytes = "4..=15")]
    pub acn_pid: [u8; 12],
    #[packed_field(bytes = "16..=17", endian = "msb")]
    pub flags_length: u16,
    #[packed_field(bytes = "18..=21", endian = "msb")]
    pub vector: u32,
}

// Tail of the framing layer plus the DMP layer, packet bytes 108..126:
// Byte #  | Packet | Definition
// 0       | 108    | Priority
// 1..=2   | 109    | Synchronization address
// 3       | 111    | Sequence number
// 4       | 112    | Options
// 5..=6   | 113    | Universe
// 7..=8   | 115    | DMP flags and length
// 9       | 117    | DMP vector (0x02)
// 10      | 118    | Address type and data type (0xA1)
// 11..=12 | 119    | First property address (0x0000)
// 13..=14 | 121    | Address increment (0x0001)
// 15..=16 | 123    | Property value count (slots + 1)
// 17      | 125    | DMX start code
#[derive(PackedStruct, Default, Debug, PartialEq, Clone)]
#[packed_struct(bit_numbering = "msb0", size = "18")]
pub struct FramingTailPack {
    #[packed_field(bytes = "0")]
    pub priority: u8,
    #[packed_field(bytes = "1..=2", endian = "msb")]
    pub sync_address: u16,
    #[packed_field(bytes = "3")]
    pub sequence: u8,
    #[packed_field(bytes = "4")]
    pub options: u8,
    #[packed_field(bytes = "5..=6", endian = "msb")]
    pub universe: u16,
    #[packed_field(bytes = "7..=8", endian = "msb")]
    pub dmp_flags_length: u16,
    #[packed_field(bytes = "9")]
    pub dmp_vector: u8,
    #[packed_field(bytes = "10")]
    pub address_type: u8,
    #[packed_field(bytes = "11..=12", endian = "msb")]
    pub first_address: u16,
    #[packed_field(bytes = "13..=14", endian = "msb")]
    pub address_increment: u16,
    #[packed_field(bytes = "15..=16", endian = "msb")]
    pub property_count: u16,
    #[packed_field(bytes = "17")]
    pub start_code: u8,
}

impl RootLayerPack {
    pub fn unpack_from(packet: &[u8]) -> Result<Self, PackingError> {
        let bytes: &[u8; ROOT_LAYER_SIZE] = packet
            .get(..ROOT_LAYER_SIZE)
            .and_then(|slice| slice.try_into().ok())
            .ok_or(PackingError::BufferTooSmall)?;
        Self::unpack(bytes)
    }
}

impl FramingTailPack {
    pub fn unpack_from(packet: &[u8]) -> Result<Self, PackingError> {
        let bytes: &[u8; FRAMING_TAIL_SIZE] = packet
            .get(FRAMING_TAIL_OFFSET..DMX_DATA_OFFSET)
            .and_then(|slice| slice.try_into().ok())
            .ok_or(PackingError::BufferTooSmall)?;
        Self::unpack(bytes)
    }
}

/// Build a complete E1.31 data packet. `slots` is truncated to 512.
pub fn build_packet(
    universe: u16,
    sequence: u8,
    source_name: &str,
    slots: &[u8],
) -> Result<Vec<u8>, PackingError> {
    let slots = &slots[..slots.len().min(DMX_MAX_SLOTS)];
    let total = DMX_DATA_OFFSET + slots.len();

    let root = RootLayerPack {
        preamble_size: 0x0010,
        postamble_size: 0,
        acn_pid: ACN_PID,
        flags_length: FLAGS | (total - 16) as u16,
        vector: ROOT_VECTOR_DATA,
    };
    let tail = FramingTailPack {
        priority: 100,
        sync_address: 0,
        sequence,
        options: 0,
        universe,
        dmp_flags_length: FLAGS | (total - 115) as u16,
        dmp_vector: DMP_VECTOR_SET_PROPERTY,
        address_type: 0xA1,
        first_address: 0,
        address_increment: 1,
        property_count: slots.len() as u16 + 1,
        start_code: 0,
    };

    let mut packet = Vec::with_capacity(total);
    packet.extend_from_slice(&root.pack()?);
    // Component identifier, left as the nil CID
    packet.extend_from_slice(&[0; 16]);
    packet.extend_from_slice(&(FLAGS | (total - 38) as u16).to_be_bytes());
    packet.extend_from_slice(&FRAMING_VECTOR_DATA.to_be_bytes());
    let mut name = [0u8; 64];
    let len = source_name.len().min(63);
    name[..len].copy_from_slice(&source_name.as_bytes()[..len]);
    packet.extend_from_slice(&name);
    packet.extend_from_slice(&tail.pack()?);
    packet.extend_from_slice(slots);

    Ok(packet)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_layer_pack() -> Result<(), PackingError> {
        let root = RootLayerPack {
            preamble_size: 0x0010,
            postamble_size: 0,
            acn_pid: ACN_PID,
            flags_length: 0x726e,
            vector: 4,
        };
        let bytes = root.pack()?;
        assert_eq!(&bytes[0..4], &[0x00, 0x10, 0x00, 0x00]);
        assert_eq!(&bytes[4..16], b"ASC-E1.17\0\0\0");
        assert_eq!(&bytes[16..22], &[0x72, 0x6e, 0, 0, 0, 4]);
        Ok(())
    }

    #[test]
    fn test_built_packet_offsets() -> Result<(), PackingError> {
        let packet = build_packet(0x0102, 7, "test", &[1, 2, 3])?;
        assert_eq!(packet.len(), DMX_DATA_OFFSET + 3);
        assert_eq!(packet[111], 7);
        assert_eq!(&packet[113..115], &[0x01, 0x02]);
        assert_eq!(packet[125], 0);
        assert_eq!(&packet[126..], &[1, 2, 3]);
        assert_eq!(&packet[44..48], b"test");

        let tail = FramingTailPack::unpack_from(&packet)?;
        assert_eq!(tail.universe, 0x0102);
        assert_eq!(tail.property_count, 4);
        Ok(())
    }

    #[test]
    fn test_unpack_short_buffer() {
        assert!(RootLayerPack::unpack_from(&[0; 10]).is_err());
        assert!(FramingTailPack::unpack_from(&[0; 120]).is_err());
    }
}
