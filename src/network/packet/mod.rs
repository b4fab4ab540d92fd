pub mod ipv4;
pub mod ipv6;
pub mod tcp;
pub mod udp;

use crate::network::packet::ipv4::IPv4Header;
use crate::network::packet::ipv6::IPv6Header;
use crate::network::packet::tcp::{TCPHeader, TcpFlags};
use crate::network::packet::udp::UDPHeader;
use pnet::packet::ip::IpNextHeaderProtocols;
use std::net::IpAddr;
use thiserror::Error;

const PROTOCOL_TCP: u8 = IpNextHeaderProtocols::Tcp.0;
const PROTOCOL_UDP: u8 = IpNextHeaderProtocols::Udp.0;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketError {
    #[error("不正なパケット: {0}")]
    Malformed(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpVersion {
    V4,
    V6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportProtocol {
    Udp,
    Tcp,
    Other(u8),
}

/// 1つのIPデータグラムに対する読み取り専用のビュー。
///
/// 元のバイト列は借用せず、ペイロードの位置だけを保持する。転送時は常に
/// 読み取ったバッファをそのまま書き出すため、解析が転送内容に影響することはない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPacket {
    pub ip_version: IpVersion,
    pub transport: TransportProtocol,
    pub source: IpAddr,
    pub destination: IpAddr,
    pub source_port: u16,
    pub destination_port: u16,
    pub tcp_flags: Option<TcpFlags>,
    pub payload_offset: usize,
    pub payload_length: usize,
}

impl ParsedPacket {
    pub fn parse(data: &[u8]) -> Result<Self, PacketError> {
        let first = *data
            .first()
            .ok_or(PacketError::Malformed("空のパケットです"))?;

        match first >> 4 {
            4 => {
                let (ip, body) = IPv4Header::parse(data)?;
                Self::with_transport(
                    IpVersion::V4,
                    IpAddr::V4(ip.source),
                    IpAddr::V4(ip.destination),
                    ip.protocol,
                    !ip.is_trailing_fragment(),
                    ip.header_len(),
                    body,
                )
            }
            6 => {
                let (ip, body) = IPv6Header::parse(data)?;
                Self::with_transport(
                    IpVersion::V6,
                    IpAddr::V6(ip.source),
                    IpAddr::V6(ip.destination),
                    ip.next_header,
                    true,
                    ipv6::HEADER_LEN,
                    body,
                )
            }
            _ => Err(PacketError::Malformed("未サポートのIPバージョンです")),
        }
    }

    // has_transport_headerがfalseのときは後続フラグメントなので上位層を解析しない
    fn with_transport(
        ip_version: IpVersion,
        source: IpAddr,
        destination: IpAddr,
        protocol: u8,
        has_transport_header: bool,
        offset: usize,
        body: &[u8],
    ) -> Result<Self, PacketError> {
        let other = || Self {
            ip_version,
            transport: TransportProtocol::Other(protocol),
            source,
            destination,
            source_port: 0,
            destination_port: 0,
            tcp_flags: None,
            payload_offset: offset,
            payload_length: body.len(),
        };

        if !has_transport_header {
            return Ok(other());
        }

        match protocol {
            PROTOCOL_UDP => {
                let (udp, payload) = UDPHeader::parse(body)?;
                Ok(Self {
                    ip_version,
                    transport: TransportProtocol::Udp,
                    source,
                    destination,
                    source_port: udp.source_port,
                    destination_port: udp.destination_port,
                    tcp_flags: None,
                    payload_offset: offset + udp::HEADER_LEN,
                    payload_length: payload.len(),
                })
            }
            PROTOCOL_TCP => {
                let (tcp, payload) = TCPHeader::parse(body)?;
                Ok(Self {
                    ip_version,
                    transport: TransportProtocol::Tcp,
                    source,
                    destination,
                    source_port: tcp.source_port,
                    destination_port: tcp.destination_port,
                    tcp_flags: Some(tcp.flags),
                    payload_offset: offset + tcp.header_len(),
                    payload_length: payload.len(),
                })
            }
            _ => Ok(other()),
        }
    }

    /// 元のパケットからペイロード部分を切り出す。
    pub fn payload<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        data.get(self.payload_offset..self.payload_offset + self.payload_length)
            .unwrap_or(&[])
    }

    pub fn is_udp_to(&self, port: u16) -> bool {
        self.transport == TransportProtocol::Udp && self.destination_port == port
    }

    pub fn is_tcp_to(&self, port: u16) -> bool {
        self.transport == TransportProtocol::Tcp && self.destination_port == port
    }

    pub fn is_syn(&self) -> bool {
        self.tcp_flags.map(TcpFlags::is_syn).unwrap_or(false)
    }
}

pub fn parse(data: &[u8]) -> Result<ParsedPacket, PacketError> {
    ParsedPacket::parse(data)
}
