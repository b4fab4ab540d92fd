#![allow(dead_code)]

use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::ipv4::{self, MutableIpv4Packet};
use pnet::packet::ipv6::MutableIpv6Packet;
use pnet::packet::tcp::MutableTcpPacket;
use pnet::packet::udp::MutableUdpPacket;
use std::net::{Ipv4Addr, Ipv6Addr};

pub use tun_domain_filter::network::packet::tcp::TcpFlags;

pub const CLIENT: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
pub const RESOLVER: Ipv4Addr = Ipv4Addr::new(8, 8, 8, 8);
pub const SERVER: Ipv4Addr = Ipv4Addr::new(142, 250, 196, 110);

pub fn ipv4_packet(
    source: Ipv4Addr,
    destination: Ipv4Addr,
    protocol: IpNextHeaderProtocol,
    transport: &[u8],
) -> Vec<u8> {
    let total = 20 + transport.len();
    let mut buffer = vec![0u8; total];
    {
        let mut packet = MutableIpv4Packet::new(&mut buffer).unwrap();
        packet.set_version(4);
        packet.set_header_length(5);
        packet.set_total_length(total as u16);
        packet.set_ttl(64);
        packet.set_next_level_protocol(protocol);
        packet.set_source(source);
        packet.set_destination(destination);
        packet.set_payload(transport);
        let checksum = ipv4::checksum(&packet.to_immutable());
        packet.set_checksum(checksum);
    }
    buffer
}

pub fn ipv6_packet(
    source: Ipv6Addr,
    destination: Ipv6Addr,
    protocol: IpNextHeaderProtocol,
    transport: &[u8],
) -> Vec<u8> {
    let mut buffer = vec![0u8; 40 + transport.len()];
    {
        let mut packet = MutableIpv6Packet::new(&mut buffer).unwrap();
        packet.set_version(6);
        packet.set_payload_length(transport.len() as u16);
        packet.set_next_header(protocol);
        packet.set_hop_limit(64);
        packet.set_source(source);
        packet.set_destination(destination);
        packet.set_payload(transport);
    }
    buffer
}

pub fn udp_segment(source_port: u16, destination_port: u16, payload: &[u8]) -> Vec<u8> {
    let mut buffer = vec![0u8; 8 + payload.len()];
    {
        let mut segment = MutableUdpPacket::new(&mut buffer).unwrap();
        segment.set_source(source_port);
        segment.set_destination(destination_port);
        segment.set_length((8 + payload.len()) as u16);
        segment.set_payload(payload);
    }
    buffer
}

pub fn tcp_segment(source_port: u16, destination_port: u16, flags: u8, payload: &[u8]) -> Vec<u8> {
    let mut buffer = vec![0u8; 20 + payload.len()];
    {
        let mut segment = MutableTcpPacket::new(&mut buffer).unwrap();
        segment.set_source(source_port);
        segment.set_destination(destination_port);
        segment.set_sequence(1);
        segment.set_data_offset(5);
        segment.set_flags(flags.into());
        segment.set_window(65535);
        segment.set_payload(payload);
    }
    buffer
}

pub fn dns_query(name: &str) -> Vec<u8> {
    let mut message = vec![0x1f, 0x2e, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
    for label in name.split('.') {
        message.push(label.len() as u8);
        message.extend_from_slice(label.as_bytes());
    }
    message.push(0);
    // QTYPE=A, QCLASS=IN
    message.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]);
    message
}

pub fn client_hello(host: &str) -> Vec<u8> {
    let name = host.as_bytes();

    let mut server_name = Vec::new();
    server_name.extend_from_slice(&((name.len() + 3) as u16).to_be_bytes());
    server_name.push(0);
    server_name.extend_from_slice(&(name.len() as u16).to_be_bytes());
    server_name.extend_from_slice(name);

    let mut extensions = Vec::new();
    // supported_versions
    extensions.extend_from_slice(&[0x00, 0x2b, 0x00, 0x03, 0x02, 0x03, 0x04]);
    extensions.extend_from_slice(&[0x00, 0x00]);
    extensions.extend_from_slice(&(server_name.len() as u16).to_be_bytes());
    extensions.extend_from_slice(&server_name);

    let mut body = vec![0x03, 0x03];
    body.extend_from_slice(&[0x5a; 32]);
    body.push(32);
    body.extend_from_slice(&[0x11; 32]);
    body.extend_from_slice(&[0x00, 0x04, 0x13, 0x01, 0x13, 0x02]);
    body.extend_from_slice(&[0x01, 0x00]);
    body.extend_from_slice(&(extensions.len() as u16).to_be_bytes());
    body.extend_from_slice(&extensions);

    let mut handshake = vec![0x01];
    handshake.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
    handshake.extend_from_slice(&body);

    let mut record = vec![0x16, 0x03, 0x01];
    record.extend_from_slice(&(handshake.len() as u16).to_be_bytes());
    record.extend_from_slice(&handshake);
    record
}

pub fn http_request(host: &str) -> Vec<u8> {
    format!(
        "GET /index.html HTTP/1.1\r\nHost: {}\r\nUser-Agent: test\r\nAccept: */*\r\n\r\n",
        host
    )
    .into_bytes()
}

pub fn dns_packet(name: &str) -> Vec<u8> {
    ipv4_packet(
        CLIENT,
        RESOLVER,
        IpNextHeaderProtocols::Udp,
        &udp_segment(53124, 53, &dns_query(name)),
    )
}

pub fn syn_packet(destination: Ipv4Addr, port: u16) -> Vec<u8> {
    ipv4_packet(
        CLIENT,
        destination,
        IpNextHeaderProtocols::Tcp,
        &tcp_segment(41000, port, TcpFlags::SYN, &[]),
    )
}

pub fn tls_packet(destination: Ipv4Addr, host: &str) -> Vec<u8> {
    ipv4_packet(
        CLIENT,
        destination,
        IpNextHeaderProtocols::Tcp,
        &tcp_segment(41000, 443, TcpFlags::PSH | TcpFlags::ACK, &client_hello(host)),
    )
}

pub fn http_packet(destination: Ipv4Addr, host: &str) -> Vec<u8> {
    ipv4_packet(
        CLIENT,
        destination,
        IpNextHeaderProtocols::Tcp,
        &tcp_segment(41002, 80, TcpFlags::PSH | TcpFlags::ACK, &http_request(host)),
    )
}
