use super::PacketError;
use std::net::Ipv4Addr;

pub const MIN_HEADER_LEN: usize = 20;

#[derive(Debug, Clone)]
pub struct IPv4Header {
    pub version: u8,
    pub ihl: u8,
    pub total_length: u16,
    pub fragment_offset: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
}

impl IPv4Header {
    /// ヘッダーと、その後ろに続くデータグラム本体を返す。
    pub fn parse(data: &[u8]) -> Result<(Self, &[u8]), PacketError> {
        if data.len() < MIN_HEADER_LEN {
            return Err(PacketError::Malformed("IPv4ヘッダーが短すぎます"));
        }

        let version = (data[0] >> 4) & 0xf;
        if version != 4 {
            return Err(PacketError::Malformed("IPv4ではありません"));
        }

        let ihl = data[0] & 0xf;
        let header_len = ihl as usize * 4;
        if header_len < MIN_HEADER_LEN {
            return Err(PacketError::Malformed("IPv4ヘッダー長が20バイト未満です"));
        }
        if header_len > data.len() {
            return Err(PacketError::Malformed("IPv4ヘッダー長がパケット長を超えています"));
        }

        let total_length = u16::from_be_bytes([data[2], data[3]]);
        let fragment_offset = u16::from_be_bytes([data[6] & 0x1f, data[7]]);
        let ttl = data[8];
        let protocol = data[9];
        let source = Ipv4Addr::new(data[12], data[13], data[14], data[15]);
        let destination = Ipv4Addr::new(data[16], data[17], data[18], data[19]);

        // 合計長が矛盾していなければリンク層のパディングを除外する
        let end = match total_length as usize {
            len if len >= header_len && len <= data.len() => len,
            _ => data.len(),
        };

        Ok((
            Self {
                version,
                ihl,
                total_length,
                fragment_offset,
                ttl,
                protocol,
                source,
                destination,
            },
            &data[header_len..end],
        ))
    }

    pub fn header_len(&self) -> usize {
        self.ihl as usize * 4
    }

    // 2番目以降のフラグメントにはトランスポートヘッダーが無い
    pub fn is_trailing_fragment(&self) -> bool {
        self.fragment_offset != 0
    }
}
