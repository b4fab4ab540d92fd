use super::PacketError;

pub const MIN_HEADER_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpFlags(pub u8);

impl TcpFlags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;

    pub fn is_syn(self) -> bool {
        self.0 & Self::SYN != 0
    }

    pub fn is_ack(self) -> bool {
        self.0 & Self::ACK != 0
    }

    pub fn is_fin(self) -> bool {
        self.0 & Self::FIN != 0
    }

    pub fn is_rst(self) -> bool {
        self.0 & Self::RST != 0
    }
}

#[derive(Debug, Clone)]
pub struct TCPHeader {
    pub source_port: u16,
    pub destination_port: u16,
    pub sequence_number: u32,
    pub acknowledgment_number: u32,
    pub data_offset: u8,
    pub flags: TcpFlags,
    pub window_size: u16,
}

impl TCPHeader {
    pub fn parse(data: &[u8]) -> Result<(Self, &[u8]), PacketError> {
        if data.len() < MIN_HEADER_LEN {
            return Err(PacketError::Malformed("TCPヘッダーが短すぎます"));
        }

        let source_port = u16::from_be_bytes([data[0], data[1]]);
        let destination_port = u16::from_be_bytes([data[2], data[3]]);
        let sequence_number = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let acknowledgment_number = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);
        let data_offset = (data[12] >> 4) & 0xf;
        let flags = TcpFlags(data[13]);
        let window_size = u16::from_be_bytes([data[14], data[15]]);

        let header_len = data_offset as usize * 4;
        if header_len < MIN_HEADER_LEN {
            return Err(PacketError::Malformed("TCPデータオフセットが20バイト未満です"));
        }
        if header_len > data.len() {
            return Err(PacketError::Malformed("TCPヘッダー長がセグメント長を超えています"));
        }

        Ok((
            Self {
                source_port,
                destination_port,
                sequence_number,
                acknowledgment_number,
                data_offset,
                flags,
                window_size,
            },
            &data[header_len..],
        ))
    }

    pub fn header_len(&self) -> usize {
        self.data_offset as usize * 4
    }
}
