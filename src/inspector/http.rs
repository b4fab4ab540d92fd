pub const PORT: u16 = 80;

const MAX_SCAN_LEN: usize = 1024;
const HOST_HEADER: &[u8] = b"host:";

// 平文HTTPリクエストの先頭1024バイトからHostヘッダーの値を探す
pub fn extract(payload: &[u8]) -> Option<String> {
    if payload.is_empty() {
        return None;
    }

    // 窓の端で切れた行は値が途中で終わっている可能性があるので捨てる
    let window = if payload.len() > MAX_SCAN_LEN {
        let window = &payload[..MAX_SCAN_LEN];
        let end = window.iter().rposition(|&b| b == b'\n')?;
        &window[..end]
    } else {
        payload
    };

    window
        .split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .find_map(|line| {
            let name = line.get(..HOST_HEADER.len())?;
            if !name.eq_ignore_ascii_case(HOST_HEADER) {
                return None;
            }
            let value = String::from_utf8_lossy(&line[HOST_HEADER.len()..]);
            let value = value.trim();
            if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            }
        })
}
