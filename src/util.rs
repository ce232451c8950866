use std::ascii;

/// Escapes arbitrary bytes into a printable string for logging.
pub fn bytes_to_human_str(input: &[u8]) -> String {
    input
        .iter()
        .flat_map(|&c| ascii::escape_default(c))
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_control_bytes() {
        assert_eq!(bytes_to_human_str(b"status 1"), "status 1");
        assert_eq!(bytes_to_human_str(b"a\r\n\xff"), "a\\r\\n\\xff");
    }
}
