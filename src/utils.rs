/// Renders a frame for logs: printable ASCII as-is, line endings escaped and
/// anything else as `<hex>` runs.
pub(crate) fn format_frame(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "<empty>".to_string();
    }

    let mut rendered = String::with_capacity(bytes.len());
    let mut opaque = Vec::new();
    for &byte in bytes {
        let escaped = match byte {
            b'\r' => Some("\\r"),
            b'\n' => Some("\\n"),
            b'\t' => Some("\\t"),
            _ => None,
        };
        if escaped.is_none() && !(byte == b' ' || byte.is_ascii_graphic()) {
            opaque.push(byte);
            continue;
        }
        flush_opaque(&mut rendered, &mut opaque);
        match escaped {
            Some(escape) => rendered.push_str(escape),
            None => rendered.push(char::from(byte)),
        }
    }
    flush_opaque(&mut rendered, &mut opaque);
    rendered
}

fn flush_opaque(rendered: &mut String, opaque: &mut Vec<u8>) {
    if opaque.is_empty() {
        return;
    }
    rendered.push('<');
    rendered.push_str(&hex::encode_upper(&*opaque));
    rendered.push('>');
    opaque.clear();
}
