/// Line terminator used by an instrument's ASCII protocol.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Terminator {
    Cr,
    CrLf,
}

/// First line found in a response buffer.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Line<'a> {
    /// A terminated line, without the terminator or surrounding whitespace.
    Complete(&'a str),
    /// No terminator yet.
    Partial,
    /// Terminated, but not printable ASCII.
    Garbled,
}

impl Terminator {
    #[must_use]
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::Cr => b"\r",
            Self::CrLf => b"\r\n",
        }
    }

    /// Encodes `body` as one terminated request line.
    #[must_use]
    pub fn frame(self, body: &str) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(body.len() + 2);
        bytes.extend_from_slice(body.as_bytes());
        bytes.extend_from_slice(self.as_bytes());
        bytes
    }

    /// Splits off the first terminated line of `buffer`.
    ///
    /// A stray line feed left over from a previous CR-LF response is skipped.
    ///
    /// ```
    /// use spectro::{Line, Terminator};
    ///
    /// assert_eq!(Line::Complete("OK00"), Terminator::Cr.split(b"\nOK00\r"));
    /// assert_eq!(Line::Partial, Terminator::CrLf.split(b"00 SN 123\r"));
    /// ```
    #[must_use]
    pub fn split(self, buffer: &[u8]) -> Line<'_> {
        let terminator = self.as_bytes();
        let Some(end) = buffer
            .windows(terminator.len())
            .position(|window| window == terminator)
        else {
            return Line::Partial;
        };
        let raw = &buffer[..end];
        if !raw
            .iter()
            .all(|byte| byte.is_ascii_graphic() || byte.is_ascii_whitespace())
        {
            return Line::Garbled;
        }
        match std::str::from_utf8(raw) {
            Ok(line) => Line::Complete(line.trim()),
            Err(_) => Line::Garbled,
        }
    }
}
