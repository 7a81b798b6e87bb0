//! The fixed header every arena begins with. Laid out exactly as the
//! on-wire shape: `{ magic:4, version:2, header_len:2, free_lists_offset:8,
//! root_table_offset:8 }`, little-endian, so a producer and consumer
//! mapping the same bytes at different base addresses agree on where the
//! free lists and root table start without needing to exchange anything
//! beyond the mapping itself.

pub const ARENA_MAGIC: [u8; 4] = *b"YNAR";
pub const ARENA_VERSION: u16 = 1;
pub const HEADER_LEN: u16 = 24;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct ArenaHeader {
    pub magic: [u8; 4],
    pub version: u16,
    pub header_len: u16,
    pub free_lists_offset: u64,
    pub root_table_offset: u64,
}

impl ArenaHeader {
    pub const fn new(free_lists_offset: u64, root_table_offset: u64) -> Self {
        Self {
            magic: ARENA_MAGIC,
            version: ARENA_VERSION,
            header_len: HEADER_LEN,
            free_lists_offset,
            root_table_offset,
        }
    }

    pub fn encode(&self) -> [u8; 24] {
        let mut out = [0u8; 24];
        out[0..4].copy_from_slice(&self.magic);
        out[4..6].copy_from_slice(&self.version.to_le_bytes());
        out[6..8].copy_from_slice(&self.header_len.to_le_bytes());
        out[8..16].copy_from_slice(&self.free_lists_offset.to_le_bytes());
        out[16..24].copy_from_slice(&self.root_table_offset.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 24 {
            return None;
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        if magic != ARENA_MAGIC {
            return None;
        }
        let version = u16::from_le_bytes(bytes[4..6].try_into().ok()?);
        if version != ARENA_VERSION {
            return None;
        }
        let header_len = u16::from_le_bytes(bytes[6..8].try_into().ok()?);
        let free_lists_offset = u64::from_le_bytes(bytes[8..16].try_into().ok()?);
        let root_table_offset = u64::from_le_bytes(bytes[16..24].try_into().ok()?);
        Some(Self {
            magic,
            version,
            header_len,
            free_lists_offset,
            root_table_offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let header = ArenaHeader::new(24, 24 + 512);
        let bytes = header.encode();
        let decoded = ArenaHeader::decode(&bytes).unwrap();
        assert_eq!(decoded.free_lists_offset, 24);
        assert_eq!(decoded.root_table_offset, 24 + 512);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = ArenaHeader::new(0, 0).encode();
        bytes[0] = b'X';
        assert!(ArenaHeader::decode(&bytes).is_none());
    }
}
