use super::PacketError;

pub const HEADER_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct UDPHeader {
    pub source_port: u16,
    pub destination_port: u16,
    pub length: u16,
    pub checksum: u16,
}

impl UDPHeader {
    pub fn parse(data: &[u8]) -> Result<(Self, &[u8]), PacketError> {
        if data.len() < HEADER_LEN {
            return Err(PacketError::Malformed("UDPヘッダーが短すぎます"));
        }

        let source_port = u16::from_be_bytes([data[0], data[1]]);
        let destination_port = u16::from_be_bytes([data[2], data[3]]);
        let length = u16::from_be_bytes([data[4], data[5]]);
        let checksum = u16::from_be_bytes([data[6], data[7]]);

        let end = match length as usize {
            len if len >= HEADER_LEN && len <= data.len() => len,
            _ => data.len(),
        };

        Ok((
            Self {
                source_port,
                destination_port,
                length,
                checksum,
            },
            &data[HEADER_LEN..end],
        ))
    }
}
