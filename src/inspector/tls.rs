//! TLS ClientHelloからのSNI抽出
//!
//! 1つのTLSレコードに収まったClientHelloだけを扱う。複数のセグメントに
//! 分割されたClientHelloは再構築せず`None`を返す。

pub const PORT: u16 = 443;

const CONTENT_TYPE_HANDSHAKE: u8 = 0x16;
const HANDSHAKE_CLIENT_HELLO: u8 = 0x01;
const EXTENSION_SERVER_NAME: u16 = 0x0000;
const NAME_TYPE_HOST_NAME: u8 = 0x00;
const RECORD_HEADER_LEN: usize = 5;

// 境界チェック付きの読み取り位置
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    fn u8(&mut self) -> Option<u8> {
        let value = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(value)
    }

    fn u16(&mut self) -> Option<u16> {
        let bytes = self.bytes(2)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn u24(&mut self) -> Option<usize> {
        let bytes = self.bytes(3)?;
        Some(((bytes[0] as usize) << 16) | ((bytes[1] as usize) << 8) | bytes[2] as usize)
    }

    fn bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let bytes = self.data.get(self.pos..self.pos.checked_add(len)?)?;
        self.pos += len;
        Some(bytes)
    }

    fn skip(&mut self, len: usize) -> Option<()> {
        self.bytes(len).map(|_| ())
    }
}

pub fn extract(payload: &[u8]) -> Option<String> {
    if payload.len() < RECORD_HEADER_LEN + 1 {
        return None;
    }
    if payload[0] != CONTENT_TYPE_HANDSHAKE || payload[5] != HANDSHAKE_CLIENT_HELLO {
        return None;
    }

    let record_len = u16::from_be_bytes([payload[3], payload[4]]) as usize;
    if RECORD_HEADER_LEN + record_len > payload.len() {
        return None;
    }

    let mut reader = Reader::new(payload, RECORD_HEADER_LEN + 1);
    reader.u24()?;

    // client_version + random
    reader.skip(2 + 32)?;

    let session_id_len = reader.u8()? as usize;
    reader.skip(session_id_len)?;

    let cipher_suites_len = reader.u16()? as usize;
    reader.skip(cipher_suites_len)?;

    let compression_methods_len = reader.u8()? as usize;
    reader.skip(compression_methods_len)?;

    let extensions_len = reader.u16()? as usize;
    let extensions = reader.bytes(extensions_len)?;
    let mut reader = Reader::new(extensions, 0);

    while reader.pos < extensions.len() {
        let extension_type = reader.u16()?;
        let extension_len = reader.u16()? as usize;
        let body = reader.bytes(extension_len)?;

        if extension_type == EXTENSION_SERVER_NAME {
            return server_name(body);
        }
    }

    None
}

fn server_name(body: &[u8]) -> Option<String> {
    let mut reader = Reader::new(body, 0);

    // server_name_list の長さ
    reader.u16()?;
    if reader.u8()? != NAME_TYPE_HOST_NAME {
        return None;
    }

    let name_len = reader.u16()? as usize;
    let name = reader.bytes(name_len)?;
    if name.is_empty() {
        return None;
    }

    std::str::from_utf8(name).ok().map(str::to_string)
}
