//! DNSクエリからの問い合わせホスト名の抽出 (RFC 1035)
//!
//! ```text
//! +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! |                      ID                       |
//! |QR|   Opcode  |AA|TC|RD|RA|   Z    |   RCODE   |
//! |                    QDCOUNT                    |
//! |              ANCOUNT / NSCOUNT / ARCOUNT      |
//! +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! |          QNAME (ラベル列) / QTYPE / QCLASS      |
//! ```
//!
//! 圧縮ポインタは解釈しない。ポインタを含むクエリは`None`になる。

pub const PORT: u16 = 53;

const HEADER_LEN: usize = 12;
const MAX_QUESTIONS: u16 = 50;
const MAX_LABELS: usize = 50;
const POINTER_MASK: u8 = 0xc0;

pub fn extract(payload: &[u8]) -> Option<String> {
    if payload.len() < HEADER_LEN {
        return None;
    }

    let flags = u16::from_be_bytes([payload[2], payload[3]]);
    // レスポンス(QR=1)は対象外
    if flags >> 15 != 0 {
        return None;
    }

    let qdcount = u16::from_be_bytes([payload[4], payload[5]]);
    if qdcount == 0 || qdcount > MAX_QUESTIONS {
        return None;
    }

    let mut pos = HEADER_LEN;
    let mut labels: Vec<&str> = Vec::new();

    loop {
        let len = *payload.get(pos)?;
        pos += 1;

        if len == 0 {
            break;
        }
        if len & POINTER_MASK != 0 {
            return None;
        }
        if labels.len() == MAX_LABELS {
            return None;
        }

        let label = payload.get(pos..pos + len as usize)?;
        labels.push(std::str::from_utf8(label).ok()?);
        pos += len as usize;
    }

    if labels.is_empty() {
        return None;
    }

    // QTYPE + QCLASS まで揃っていない質問は切り詰められている
    payload.get(pos..pos + 4)?;

    Some(labels.join(".").to_ascii_lowercase())
}
